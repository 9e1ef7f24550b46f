// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::debug;

use super::{
    CacheSpec, Expiry, HttpBackend, HttpClient, HttpMethod, HttpRequest, HttpResponse, Pager,
};
use crate::context::Context;
use crate::definition::{DefinitionBase, DefinitionBuilder, QueryFn, SyncDefinition};
use crate::entity::{EntityHandle, EntityId};
use crate::error::{Error, Result};
use crate::introspect::EntityInfo;
use crate::operation::{
    EntityStream, OperationArgs, OperationClosure, OperationOutput, SyncOperation,
};
use crate::pipeline::Pipeline;
use crate::provider::SyncProvider;
use crate::serialize::{serialize, SerializeRules};
use crate::sync_error::{SyncError, SyncErrorType};

struct HttpSettings {
    backend: HttpBackend,
    path: String,
    paths: HashMap<SyncOperation, String>,
    methods: HashMap<SyncOperation, HttpMethod>,
    query: Option<QueryFn>,
    expiry: Expiry,
    pager: Arc<dyn Pager>,
    to_backend: Pipeline<Value>,
    from_backend: Pipeline<Value>,
    rules: SerializeRules,
}

/// Definition for HTTP providers.
///
/// Operations without an override or declared method are composed from a
/// serialize pipeline, one HTTP call per entity (or a paged GET for list
/// reads) and a response pipeline feeding entity construction.
pub struct HttpDefinition {
    base: DefinitionBase,
    settings: Arc<HttpSettings>,
}

impl HttpDefinition {
    pub(crate) fn new(
        base: DefinitionBase,
        backend: HttpBackend,
        builder: DefinitionBuilder,
    ) -> Self {
        let settings = HttpSettings {
            path: builder.path.unwrap_or_default(),
            paths: builder.paths,
            methods: builder.methods,
            query: builder.query,
            expiry: builder.expiry.unwrap_or(backend.expiry),
            pager: builder.pager.unwrap_or_else(|| Arc::clone(&backend.pager)),
            to_backend: builder.to_backend,
            from_backend: builder.from_backend,
            rules: builder.rules,
            backend,
        };
        HttpDefinition {
            base,
            settings: Arc::new(settings),
        }
    }

    fn generic(&self, operation: SyncOperation) -> OperationClosure {
        let settings = Arc::clone(&self.settings);
        let entity = Arc::clone(self.base.entity());
        Arc::new(move |provider, ctx, args| settings.run(provider, &entity, operation, ctx, args))
    }
}

impl SyncDefinition for HttpDefinition {
    fn entity(&self) -> &Arc<EntityInfo> {
        self.base.entity()
    }

    fn operation_closure(&self, operation: SyncOperation) -> Option<OperationClosure> {
        self.base.resolve(operation, || Some(self.generic(operation)))
    }
}

impl HttpSettings {
    fn run(
        self: &Arc<Self>,
        provider: &Arc<SyncProvider>,
        entity: &Arc<EntityInfo>,
        operation: SyncOperation,
        ctx: &Context,
        args: OperationArgs,
    ) -> Result<OperationOutput> {
        match operation {
            SyncOperation::ReadList => {
                let request = self.pager.first(self.request(operation, None, ctx, None)?);
                debug!(entity = entity.name(), url = %request.url, "http list read");
                let records = HttpRecords {
                    client: Arc::clone(&self.backend.client),
                    pager: Arc::clone(&self.pager),
                    next: Some(request),
                    buffer: VecDeque::new(),
                };
                let records = self.from_backend.stream(records);
                Ok(OperationOutput::Many(provider.provide_list(entity.name(), ctx, records)))
            }
            SyncOperation::CreateList | SyncOperation::UpdateList | SyncOperation::DeleteList => {
                let settings = Arc::clone(self);
                let provider = Arc::clone(provider);
                let entity = Arc::clone(entity);
                let ctx = ctx.clone();
                let stream = args
                    .entities
                    .into_iter()
                    .map(move |handle| {
                        settings.mutate(&provider, &entity, operation, &ctx, handle)
                    });
                Ok(OperationOutput::Many(EntityStream::new(stream)))
            }
            SyncOperation::Create | SyncOperation::Update => {
                let handle = args.entity.ok_or_else(|| Error::InvalidArguments {
                    operation,
                    reason: "an entity is required".into(),
                })?;
                self.mutate(provider, entity, operation, ctx, handle)
                    .map(OperationOutput::One)
            }
            SyncOperation::Delete => match args.entity {
                Some(handle) => self
                    .mutate(provider, entity, operation, ctx, handle)
                    .map(OperationOutput::One),
                None => self.delete_by_id(provider, entity, ctx, args.id),
            },
            SyncOperation::Read => self.read(provider, entity, ctx, args.id),
        }
    }

    fn read(
        &self,
        provider: &Arc<SyncProvider>,
        entity: &EntityInfo,
        ctx: &Context,
        id: Option<EntityId>,
    ) -> Result<OperationOutput> {
        let request = self.request(SyncOperation::Read, id.as_ref(), ctx, None)?;
        let response = self.send(&request)?;
        let not_found = || {
            provider.report(
                SyncError::new(
                    SyncErrorType::EntityNotFound,
                    format!("{} returned no {}", request.url, entity.noun()),
                )
                .with_entity(entity.name(), id.clone()),
            )
        };
        let record = match response.body {
            Value::Array(mut records) => match records.len() {
                0 => return Err(not_found()),
                1 => records.remove(0),
                n => {
                    return Err(provider.report(
                        SyncError::new(
                            SyncErrorType::EntityNotUnique,
                            format!("{} returned {n} records", request.url),
                        )
                        .with_entity(entity.name(), id.clone()),
                    ))
                }
            },
            Value::Null => return Err(not_found()),
            record => record,
        };
        let Some(record) = self.from_backend.run(record)? else {
            return Err(not_found());
        };
        provider
            .provide(entity.name(), ctx, record)
            .map(OperationOutput::One)
    }

    fn delete_by_id(
        &self,
        provider: &Arc<SyncProvider>,
        entity: &EntityInfo,
        ctx: &Context,
        id: Option<EntityId>,
    ) -> Result<OperationOutput> {
        let id = id.ok_or_else(|| Error::InvalidArguments {
            operation: SyncOperation::Delete,
            reason: "an identifier or entity is required".into(),
        })?;
        let request = self.request(SyncOperation::Delete, Some(&id), ctx, None)?;
        let response = self.send(&request)?;
        let record = match response.body {
            Value::Null => {
                let mut record = Map::new();
                record.insert(entity.id_field().to_string(), id.to_value());
                Value::Object(record)
            }
            body => body,
        };
        provider
            .provide(entity.name(), ctx, record)
            .map(OperationOutput::One)
    }

    // One request for one entity; an empty response keeps the sent entity.
    fn mutate(
        &self,
        provider: &Arc<SyncProvider>,
        entity: &EntityInfo,
        operation: SyncOperation,
        ctx: &Context,
        handle: EntityHandle,
    ) -> Result<EntityHandle> {
        let singular = operation.singular();
        let id = match singular {
            SyncOperation::Create => None,
            _ => Some(handle.id().ok_or_else(|| Error::InvalidArguments {
                operation,
                reason: format!("{} has no identifier", handle.label()),
            })?),
        };
        let body = match singular {
            SyncOperation::Delete => None,
            _ => match self.to_backend.run(serialize(&handle, &self.rules))? {
                Some(body) => Some(body),
                None => return Ok(handle),
            },
        };

        let request = self.request(operation, id.as_ref(), ctx, body)?;
        let response = self.send(&request)?;
        match response.body {
            Value::Null => Ok(handle),
            Value::String(s) if s.is_empty() => Ok(handle),
            record => match self.from_backend.run(record)? {
                Some(record) => provider.provide(entity.name(), ctx, record),
                None => Ok(handle),
            },
        }
    }

    fn request(
        &self,
        operation: SyncOperation,
        id: Option<&EntityId>,
        ctx: &Context,
        body: Option<Value>,
    ) -> Result<HttpRequest> {
        let method = self
            .methods
            .get(&operation)
            .or_else(|| self.methods.get(&operation.singular()))
            .copied()
            .unwrap_or_else(|| HttpMethod::for_operation(operation));
        let path = self
            .paths
            .get(&operation)
            .or_else(|| self.paths.get(&operation.singular()))
            .unwrap_or(&self.path);
        let path = resource_path(path, id);

        let mut request = HttpRequest::new(method, self.backend.url(&path));
        request.headers = self.backend.headers.clone();
        request.body = body;
        if method == HttpMethod::Get {
            request.query = filter_query(ctx);
            if self.expiry != Expiry::Never {
                request.cache = Some(CacheSpec {
                    expiry: self.expiry,
                    vary: self.backend.cache_headers.clone(),
                });
            }
        }
        if let Some(query) = &self.query {
            request.query.extend(query(ctx, operation));
        }
        Ok(request)
    }

    fn send(&self, request: &HttpRequest) -> Result<HttpResponse> {
        self.backend.client.send(request)?.error_for_status()
    }
}

/// Substitutes `:id`, or appends the identifier when the path has no placeholder.
fn resource_path(template: &str, id: Option<&EntityId>) -> String {
    let Some(id) = id else {
        return template.replace("/:id", "").replace(":id", "");
    };
    let encoded: String = url::form_urlencoded::byte_serialize(id.to_string().as_bytes()).collect();
    if template.contains(":id") {
        template.replace(":id", &encoded)
    } else {
        format!("{}/{encoded}", template.trim_end_matches('/'))
    }
}

/// Context filters as query parameters; lists are comma-joined.
fn filter_query(ctx: &Context) -> Vec<(String, String)> {
    ctx.filters()
        .iter()
        .filter_map(|(key, value)| query_value(value).map(|v| (key.clone(), v)))
        .collect()
}

fn query_value(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Array(items) => Some(
            items
                .iter()
                .filter_map(query_value)
                .collect::<Vec<_>>()
                .join(","),
        ),
        other => Some(other.to_string()),
    }
}

struct HttpRecords {
    client: Arc<dyn HttpClient>,
    pager: Arc<dyn Pager>,
    next: Option<HttpRequest>,
    buffer: VecDeque<Value>,
}

impl Iterator for HttpRecords {
    type Item = Result<Value>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(record) = self.buffer.pop_front() {
                return Some(Ok(record));
            }
            let request = self.next.take()?;
            let page = self
                .client
                .send(&request)
                .and_then(HttpResponse::error_for_status)
                .and_then(|response| self.pager.page(&request, response));
            match page {
                Ok(page) => {
                    self.buffer.extend(page.records);
                    self.next = page.next;
                }
                Err(err) => return Some(Err(err)),
            }
        }
    }
}

#[cfg(test)]
#[path = "definition_tests.rs"]
mod tests;
