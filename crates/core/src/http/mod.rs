// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP backends: request and response types, the client seam, response
//! caching and pagination.
//!
//! Transport is supplied by the application through [`HttpClient`]; this
//! module only shapes requests and interprets responses.

mod cache;
mod definition;
mod pager;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use url::Url;

use crate::error::{Error, Result};
use crate::operation::SyncOperation;

pub use cache::CachingHttpClient;
pub use definition::HttpDefinition;
pub use pager::{JsonNextLinkPager, Page, Pager, SinglePage};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
        }
    }

    /// Verb for an operation; list variants share the singular verb.
    pub fn for_operation(operation: SyncOperation) -> Self {
        match operation.singular() {
            SyncOperation::Create => HttpMethod::Post,
            SyncOperation::Update => HttpMethod::Put,
            SyncOperation::Delete => HttpMethod::Delete,
            _ => HttpMethod::Get,
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How long a cached response stays valid.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Expiry {
    #[default]
    Never,
    For(Duration),
    Forever,
}

/// Caching instructions attached to a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheSpec {
    pub expiry: Expiry,
    /// Header names whose values distinguish cached responses.
    pub vary: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    pub body: Option<Value>,
    pub cache: Option<CacheSpec>,
}

impl HttpRequest {
    pub fn new(method: HttpMethod, url: impl Into<String>) -> Self {
        HttpRequest {
            method,
            url: url.into(),
            query: Vec::new(),
            headers: Vec::new(),
            body: None,
            cache: None,
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// The URL with the query string appended.
    pub fn target(&self) -> Result<String> {
        let mut url = Url::parse(&self.url)
            .map_err(|e| Error::Transport(format!("invalid URL '{}': {e}", self.url)))?;
        if !self.query.is_empty() {
            url.query_pairs_mut().extend_pairs(self.query.iter());
        }
        Ok(url.into())
    }

    /// SHA-256 over the verb, target and the headers named by the cache spec.
    pub fn cache_key(&self) -> Result<String> {
        let mut hasher = Sha256::new();
        hasher.update(self.method.as_str().as_bytes());
        hasher.update([0]);
        hasher.update(self.target()?.as_bytes());
        if let Some(spec) = &self.cache {
            let mut vary: Vec<String> = spec.vary.iter().map(|h| h.to_lowercase()).collect();
            vary.sort();
            for name in vary {
                hasher.update([0]);
                hasher.update(name.as_bytes());
                hasher.update(b":");
                hasher.update(self.header(&name).unwrap_or_default().as_bytes());
            }
        }
        Ok(hex::encode(hasher.finalize()))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Value,
}

impl HttpResponse {
    pub fn ok(body: Value) -> Self {
        HttpResponse {
            status: 200,
            headers: Vec::new(),
            body,
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Converts a non-2xx response into [`Error::Http`].
    pub fn error_for_status(self) -> Result<Self> {
        if self.is_success() {
            return Ok(self);
        }
        let message = match &self.body {
            Value::String(s) => s.clone(),
            Value::Object(map) => map
                .get("message")
                .or_else(|| map.get("error"))
                .and_then(Value::as_str)
                .unwrap_or("request failed")
                .to_string(),
            _ => "request failed".to_string(),
        };
        Err(Error::Http {
            status: self.status,
            message,
        })
    }
}

/// Sends requests to a backend. Retries, redirects and timeouts belong here.
pub trait HttpClient: Send + Sync {
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse>;
}

impl<C: HttpClient + ?Sized> HttpClient for Arc<C> {
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse> {
        (**self).send(request)
    }
}

/// Connection settings shared by every definition of an HTTP provider.
#[derive(Clone)]
pub struct HttpBackend {
    pub(crate) base_url: String,
    pub(crate) client: Arc<dyn HttpClient>,
    pub(crate) headers: Vec<(String, String)>,
    pub(crate) cache_headers: Vec<String>,
    pub(crate) expiry: Expiry,
    pub(crate) pager: Arc<dyn Pager>,
}

impl HttpBackend {
    pub fn new(base_url: &str, client: Arc<dyn HttpClient>) -> Self {
        HttpBackend {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            headers: Vec::new(),
            cache_headers: Vec::new(),
            expiry: Expiry::Never,
            pager: Arc::new(SinglePage),
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    /// Names a header whose value must be part of the cache key.
    pub fn with_cache_header(mut self, name: &str) -> Self {
        self.cache_headers.push(name.to_string());
        self
    }

    pub fn with_expiry(mut self, expiry: Expiry) -> Self {
        self.expiry = expiry;
        self
    }

    pub fn with_pager(mut self, pager: Arc<dyn Pager>) -> Self {
        self.pager = pager;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub(crate) fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }
}

impl fmt::Debug for HttpBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpBackend")
            .field("base_url", &self.base_url)
            .field("expiry", &self.expiry)
            .finish()
    }
}

#[cfg(test)]
#[path = "http_tests.rs"]
mod tests;
