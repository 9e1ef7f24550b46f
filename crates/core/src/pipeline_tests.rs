// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::unwrap_used)]

use super::*;
use crate::error::Error;

#[test]
fn empty_pipeline_passes_values_through() {
    let pipeline = Pipeline::<i64>::new();
    assert!(pipeline.is_empty());
    assert_eq!(pipeline.run(4).unwrap(), Some(4));
}

#[test]
fn steps_run_in_order() {
    let pipeline = Pipeline::new().through(|n: i64| Ok(n + 1)).through(|n| Ok(n * 10));
    assert_eq!(pipeline.run(1).unwrap(), Some(20));
}

#[test]
fn filter_drops_values() {
    let pipeline = Pipeline::new()
        .through(|n: i64| Ok(n * 2))
        .with_filter(|n| *n > 4);
    assert_eq!(pipeline.run(1).unwrap(), None);
    assert_eq!(pipeline.run(3).unwrap(), Some(6));
}

#[test]
fn step_errors_abort() {
    let pipeline = Pipeline::new()
        .through(|_: i64| Err(Error::Pipeline("nope".into())))
        .through(|n| Ok(n + 1));
    assert!(pipeline.run(1).is_err());
}

#[test]
fn stream_is_lazy_and_filters() {
    let pipeline = Pipeline::new().with_filter(|n: &i64| n % 2 == 0);
    let input = vec![Ok(1), Ok(2), Err(Error::Pipeline("bad".into())), Ok(4)];
    let out: Vec<_> = pipeline.stream(input.into_iter()).collect();
    assert_eq!(out.len(), 3);
    assert_eq!(out[0].as_ref().unwrap(), &2);
    assert!(out[1].is_err());
    assert_eq!(out[2].as_ref().unwrap(), &4);
}
