// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Composable transform chains with an optional terminal filter.

use std::sync::Arc;

use crate::error::Result;

type Step<T> = Arc<dyn Fn(T) -> Result<T> + Send + Sync>;
type Filter<T> = Arc<dyn Fn(&T) -> bool + Send + Sync>;

pub struct Pipeline<T> {
    steps: Vec<Step<T>>,
    filter: Option<Filter<T>>,
}

impl<T> Default for Pipeline<T> {
    fn default() -> Self {
        Pipeline {
            steps: Vec::new(),
            filter: None,
        }
    }
}

impl<T> Clone for Pipeline<T> {
    fn clone(&self) -> Self {
        Pipeline {
            steps: self.steps.clone(),
            filter: self.filter.clone(),
        }
    }
}

impl<T: 'static> Pipeline<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn through<F>(mut self, step: F) -> Self
    where
        F: Fn(T) -> Result<T> + Send + Sync + 'static,
    {
        self.steps.push(Arc::new(step));
        self
    }

    /// Values the filter rejects are dropped after the last step.
    pub fn with_filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Arc::new(filter));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty() && self.filter.is_none()
    }

    pub fn run(&self, value: T) -> Result<Option<T>> {
        let mut value = value;
        for step in &self.steps {
            value = step(value)?;
        }
        match &self.filter {
            Some(filter) if !filter(&value) => Ok(None),
            _ => Ok(Some(value)),
        }
    }

    /// Runs each value lazily, skipping filtered ones and passing errors through.
    pub fn stream<I>(&self, values: I) -> impl Iterator<Item = Result<T>> + Send + 'static
    where
        I: Iterator<Item = Result<T>> + Send + 'static,
        T: Send,
    {
        let pipeline = self.clone();
        values.filter_map(move |value| match value {
            Ok(value) => pipeline.run(value).transpose(),
            Err(err) => Some(Err(err)),
        })
    }
}

#[cfg(test)]
#[path = "pipeline_tests.rs"]
mod tests;
