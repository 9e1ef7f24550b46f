// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

use serde_json::Value;

use super::{HttpRequest, HttpResponse};
use crate::error::{Error, Result};

/// Records from one response and the request for the next page, if any.
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    pub records: Vec<Value>,
    pub next: Option<HttpRequest>,
}

/// Splits list responses into records and follow-up requests.
pub trait Pager: Send + Sync {
    /// Adjusts the first request of a list read.
    fn first(&self, request: HttpRequest) -> HttpRequest {
        request
    }

    fn page(&self, request: &HttpRequest, response: HttpResponse) -> Result<Page>;
}

/// Treats the whole response as one page.
#[derive(Debug, Clone, Copy, Default)]
pub struct SinglePage;

impl Pager for SinglePage {
    fn page(&self, _request: &HttpRequest, response: HttpResponse) -> Result<Page> {
        let records = match response.body {
            Value::Array(items) => items,
            Value::Null => Vec::new(),
            other => vec![other],
        };
        Ok(Page {
            records,
            next: None,
        })
    }
}

/// Reads records from `items_key` and the next page URL from `next_key`.
#[derive(Debug, Clone)]
pub struct JsonNextLinkPager {
    items_key: String,
    next_key: String,
}

impl JsonNextLinkPager {
    pub fn new(items_key: &str, next_key: &str) -> Self {
        JsonNextLinkPager {
            items_key: items_key.to_string(),
            next_key: next_key.to_string(),
        }
    }
}

impl Default for JsonNextLinkPager {
    fn default() -> Self {
        JsonNextLinkPager::new("data", "next")
    }
}

impl Pager for JsonNextLinkPager {
    fn page(&self, request: &HttpRequest, response: HttpResponse) -> Result<Page> {
        let Value::Object(mut body) = response.body else {
            return Err(Error::Transport(format!(
                "expected an object with '{}' from {}",
                self.items_key, request.url
            )));
        };
        let records = match body.remove(&self.items_key) {
            Some(Value::Array(items)) => items,
            Some(Value::Null) | None => Vec::new(),
            Some(_) => {
                return Err(Error::Transport(format!(
                    "'{}' is not a list in response from {}",
                    self.items_key, request.url
                )))
            }
        };
        // The next link carries its own query string.
        let next = body
            .get(&self.next_key)
            .and_then(Value::as_str)
            .filter(|url| !url.is_empty())
            .map(|url| HttpRequest {
                url: url.to_string(),
                query: Vec::new(),
                ..request.clone()
            });
        Ok(Page { records, next })
    }
}
