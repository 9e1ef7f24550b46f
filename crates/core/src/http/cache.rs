// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

use std::collections::HashMap;
use std::time::Instant;

use parking_lot::Mutex;
use tracing::debug;

use super::{Expiry, HttpClient, HttpMethod, HttpRequest, HttpResponse};
use crate::error::Result;

/// In-memory cache for GET responses in front of another client.
///
/// Only requests carrying a [`CacheSpec`](super::CacheSpec) with an expiry
/// other than [`Expiry::Never`] are cached, and only successful responses
/// are stored.
pub struct CachingHttpClient<C> {
    inner: C,
    entries: Mutex<HashMap<String, (Option<Instant>, HttpResponse)>>,
}

impl<C: HttpClient> CachingHttpClient<C> {
    pub fn new(inner: C) -> Self {
        CachingHttpClient {
            inner,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn inner(&self) -> &C {
        &self.inner
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

impl<C: HttpClient> HttpClient for CachingHttpClient<C> {
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse> {
        let expiry = match (&request.method, &request.cache) {
            (HttpMethod::Get, Some(spec)) if spec.expiry != Expiry::Never => spec.expiry,
            _ => return self.inner.send(request),
        };

        let key = request.cache_key()?;
        let now = Instant::now();
        if let Some((expires, response)) = self.entries.lock().get(&key) {
            if expires.map_or(true, |at| at > now) {
                debug!(url = %request.url, "http cache hit");
                return Ok(response.clone());
            }
        }

        let response = self.inner.send(request)?;
        if response.is_success() {
            let expires = match expiry {
                Expiry::For(ttl) => Some(now + ttl),
                _ => None,
            };
            self.entries.lock().insert(key, (expires, response.clone()));
        }
        Ok(response)
    }
}
