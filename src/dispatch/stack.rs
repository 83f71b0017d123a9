//! Dispatch state machine
//!
//! Walks the segments left after path resolution and the HTTP method,
//! transitioning between three states:
//!
//! - `class`: a provider is resolved, nothing fetched yet
//! - `entities`: zero, one or many entities fetched
//! - `mixed`: the unconstrained result of an operation call
//!
//! Operation names are resolved by convention against the explicit
//! operation tables of providers and entities.

use crate::core::auth::Caller;
use crate::core::entity::{EntityRef, read_property};
use crate::core::error::{DispatchError, RequestError, RestResult};
use crate::core::filter::{Filter, SortKey};
use crate::core::naming;
use crate::core::operation::{Arguments, Operation, OperationKind, Operations};
use crate::core::provider::ProviderRef;
use crate::core::value::Value;
use crate::dispatch::context::DispatchContext;
use crate::dispatch::path::{PathResolver, Segment};
use crate::dispatch::setter::{ArgumentBinder, PropertySetter, resolve_hrefs};
use crate::dispatch::translate::FilterTranslator;
use crate::request::RequestView;
use axum::http::Method;
use indexmap::IndexMap;
use std::cmp::Ordering;

/// Current content of the dispatch stack
#[derive(Clone)]
pub enum Stack {
    Provider(ProviderRef),
    Entities(Vec<EntityRef>),
    Mixed(Value),
}

impl Stack {
    pub fn state_name(&self) -> &'static str {
        match self {
            Stack::Provider(_) => "class",
            Stack::Entities(_) => "entities",
            Stack::Mixed(_) => "mixed",
        }
    }
}

/// How the final stack is turned into a result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnType {
    /// First entity of the stack, or null
    OneEntity,
    /// The stack content unchanged
    AsIs,
}

/// Result of a dispatch, ready for shaping
#[derive(Debug, Clone)]
pub struct DispatchOutcome {
    pub value: Value,
    /// Collection size before pagination, when known
    pub total: Option<u64>,
    pub offset: usize,
    pub limit: usize,
}

/// Walks one request through the state machine
pub struct DispatchStack<'a> {
    ctx: &'a DispatchContext,
    view: &'a RequestView,
    caller: &'a Caller,
    provider: ProviderRef,
    stack: Stack,
    return_type: ReturnType,
    total: Option<u64>,
}

impl<'a> DispatchStack<'a> {
    /// Resolve the request path and run every transition
    pub async fn dispatch(
        ctx: &'a DispatchContext,
        view: &'a RequestView,
        caller: &'a Caller,
    ) -> RestResult<DispatchOutcome> {
        let resolved = PathResolver::resolve(ctx, view.resource_path())?;
        let mut stack = DispatchStack {
            ctx,
            view,
            caller,
            provider: resolved.provider.clone(),
            stack: Stack::Provider(resolved.provider.clone()),
            return_type: ReturnType::OneEntity,
            total: None,
        };

        for segment in &resolved.secondary {
            stack.apply_secondary(segment).await?;
        }
        stack.apply_final(&resolved.last).await?;
        Ok(stack.finish())
    }

    fn finish(self) -> DispatchOutcome {
        let value = match (self.return_type, self.stack) {
            (ReturnType::OneEntity, Stack::Entities(entities)) => entities
                .into_iter()
                .next()
                .map(Value::Entity)
                .unwrap_or_default(),
            (ReturnType::OneEntity, Stack::Mixed(value)) => value,
            (_, Stack::Provider(_)) => Value::Null,
            (ReturnType::AsIs, Stack::Entities(entities)) => {
                Value::List(entities.into_iter().map(Value::Entity).collect())
            }
            (ReturnType::AsIs, Stack::Mixed(value)) => value,
        };
        DispatchOutcome {
            value,
            total: self.total,
            offset: self.view.offset(),
            limit: self.view.limit(),
        }
    }

    fn transition(&mut self, stack: Stack, return_type: ReturnType) {
        tracing::debug!(
            from = self.stack.state_name(),
            to = stack.state_name(),
            ?return_type,
            "stack transition"
        );
        self.stack = stack;
        self.return_type = return_type;
    }

    fn bad_transition(&self, action: impl Into<String>) -> crate::core::error::RestError {
        let action = action.into();
        tracing::debug!(state = self.stack.state_name(), %action, "illegal transition");
        DispatchError::BadStateTransition {
            state: self.stack.state_name(),
            action,
        }
        .into()
    }

    /// The single entity of an `entities` stack
    fn single_entity(&self, action: &str) -> RestResult<EntityRef> {
        match &self.stack {
            Stack::Entities(entities) if entities.len() == 1 => Ok(entities[0].clone()),
            _ => Err(self.bad_transition(action)),
        }
    }

    // =========================================================================
    // Secondary segments
    // =========================================================================

    async fn apply_secondary(&mut self, segment: &Segment) -> RestResult<()> {
        match segment {
            Segment::Id(id) => match self.stack {
                Stack::Provider(_) => {
                    let entity = self.fetch_checked(*id).await?;
                    self.transition(Stack::Entities(vec![entity]), ReturnType::OneEntity);
                    Ok(())
                }
                _ => Err(self.bad_transition(format!("fetch of {}", segment.describe()))),
            },
            Segment::Name(name) => {
                let Stack::Entities(entities) = &self.stack else {
                    return Err(self.bad_transition(format!("lookup of {}", segment.describe())));
                };
                let found = entities
                    .iter()
                    .find(|e| e.name().as_deref() == Some(name.as_str()))
                    .cloned()
                    .ok_or_else(|| DispatchError::NotFound {
                        kind: self.provider.kind().to_string(),
                        id: format!("[{}]", name),
                    })?;
                let return_type = self.return_type;
                self.transition(Stack::Entities(vec![found]), return_type);
                Ok(())
            }
            Segment::Word(word) => {
                let entity = self.single_entity(&format!("getter '{}'", word))?;
                let operation = find_getter(entity.operations(), word, entity.kind())?;
                let args = ArgumentBinder::bind(self.ctx, operation, &IndexMap::new()).await?;
                let result = entity.invoke(&operation.name, args).await?;
                self.replace_with_result(result);
                Ok(())
            }
            Segment::Empty => Err(self.bad_transition("empty segment")),
        }
    }

    // =========================================================================
    // Final segment
    // =========================================================================

    async fn apply_final(&mut self, segment: &Segment) -> RestResult<()> {
        let method = self.view.method().clone();
        match method {
            Method::GET => self.apply_get(segment).await,
            Method::POST => self.apply_post(segment).await,
            Method::PUT => self.apply_put(segment).await,
            Method::DELETE => self.apply_delete(segment).await,
            other => Err(RequestError::MethodNotAllowed {
                method: other.to_string(),
            }
            .into()),
        }
    }

    async fn apply_get(&mut self, segment: &Segment) -> RestResult<()> {
        match (segment, &self.stack) {
            (Segment::Id(id), Stack::Provider(_)) => {
                let entity = self.fetch_checked(*id).await?;
                self.transition(Stack::Entities(vec![entity]), ReturnType::OneEntity);
                Ok(())
            }
            (Segment::Empty, Stack::Provider(_)) => self.fetch_collection().await,
            (Segment::Word(word), Stack::Provider(provider)) => {
                let provider = provider.clone();
                let operation = find_getter(provider.operations(), word, provider.kind())?;
                let params = self.parameters().await?;
                let args = ArgumentBinder::bind(self.ctx, operation, &params).await?;
                let result = provider.invoke(&operation.name, args).await?;
                let result = self.paginate_getter_result(operation, result);
                self.replace_with_result(result);
                Ok(())
            }
            (Segment::Word(word), Stack::Entities(_)) => {
                let entity = self.single_entity(&format!("GET '{}'", word))?;
                let operation = find_getter(entity.operations(), word, entity.kind())?;
                let params = self.parameters().await?;
                let args = ArgumentBinder::bind(self.ctx, operation, &params).await?;
                let result = entity.invoke(&operation.name, args).await?;
                self.replace_with_result(result);
                Ok(())
            }
            _ => Err(self.bad_transition(format!("GET {}", segment.describe()))),
        }
    }

    async fn apply_post(&mut self, segment: &Segment) -> RestResult<()> {
        match (segment, &self.stack) {
            (Segment::Empty, Stack::Provider(provider)) => {
                let provider = provider.clone();
                let body = self.body().await?;
                let created = provider.create_instance(body.clone()).await?;
                self.accept_created(created, &body).await
            }
            (Segment::Word(word), Stack::Provider(provider)) => {
                let provider = provider.clone();
                let operation = find_prefixed(
                    provider.operations(),
                    word,
                    OperationKind::Creator,
                    provider.kind(),
                )?;
                let body = self.body().await?;
                let named = named_arguments(operation, &body);
                let args = ArgumentBinder::bind(self.ctx, operation, &named).await?;
                let created = provider.invoke(&operation.name, args).await?;
                self.accept_created(created, &body).await
            }
            (Segment::Word(word), Stack::Entities(_)) => {
                let entity = self.single_entity(&format!("POST '{}'", word))?;
                let operation =
                    find_prefixed(entity.operations(), word, OperationKind::Adder, entity.kind())?;
                let body = self.body().await?;
                let named = named_arguments(operation, &body);
                let args = ArgumentBinder::bind(self.ctx, operation, &named).await?;
                let result = entity.invoke(&operation.name, args).await?;
                self.replace_with_result(result);
                self.return_type = ReturnType::AsIs;
                Ok(())
            }
            (Segment::Id(id), Stack::Provider(_)) => {
                let entity = self.fetch_checked(*id).await?;
                let body = self.body().await?;
                let mut added = 0;
                if let Value::Map(map) = &body {
                    for (key, value) in map {
                        added += self.add_to_entity(&entity, key, value.clone()).await?;
                    }
                }
                self.transition(Stack::Mixed(Value::Int(added)), ReturnType::AsIs);
                Ok(())
            }
            _ => Err(self.bad_transition(format!("POST {}", segment.describe()))),
        }
    }

    async fn apply_put(&mut self, segment: &Segment) -> RestResult<()> {
        match (segment, &self.stack) {
            (Segment::Id(id), Stack::Provider(_)) if *id >= 1 => {
                let entity = self.fetch_checked(*id).await?;
                let body = self.body().await?;
                if let Value::Map(values) = &body {
                    PropertySetter::apply(self.ctx, &entity, values).await?;
                }
                self.transition(Stack::Entities(vec![entity]), ReturnType::OneEntity);
                Ok(())
            }
            (Segment::Word(word), Stack::Provider(provider)) => {
                let provider = provider.clone();
                if let Some(operation) = provider
                    .operations()
                    .get(&naming::prefixed("set", word))
                    .filter(|op| op.kind == OperationKind::StaticSetter)
                {
                    let body = self.body().await?;
                    let param = operation
                        .first_param()
                        .map(|p| p.name.clone())
                        .unwrap_or_else(|| "data".to_string());
                    provider
                        .invoke(&operation.name, Arguments::single(param, body))
                        .await?;
                    self.transition(Stack::Mixed(Value::Null), ReturnType::AsIs);
                    return Ok(());
                }
                self.fetch_collection().await?;
                self.put_specifications(word).await
            }
            (Segment::Word(word), Stack::Entities(_)) => self.put_specifications(word).await,
            _ => Err(self.bad_transition(format!("PUT {}", segment.describe()))),
        }
    }

    async fn apply_delete(&mut self, segment: &Segment) -> RestResult<()> {
        match (segment, &self.stack) {
            (Segment::Id(id), Stack::Provider(_)) if *id >= 1 => {
                let entity = self.fetch_checked(*id).await?;
                entity.delete().await?;
                tracing::info!(kind = entity.kind(), id = entity.id(), "entity deleted");
                self.transition(Stack::Entities(vec![entity]), ReturnType::OneEntity);
                Ok(())
            }
            _ => Err(self.bad_transition(format!("DELETE {}", segment.describe()))),
        }
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    /// Fetch by id, then verify the caller may read it
    async fn fetch_checked(&self, id: i64) -> RestResult<EntityRef> {
        let provider = &self.provider;
        let entity = provider
            .get(id)
            .await?
            .ok_or_else(|| not_found(provider.kind(), id))?;

        let mut filters = provider.read_filters_for_caller(self.caller).await?;
        if !filters.is_empty() {
            filters.push(Filter::equals("id", id));
            if provider.get_instances(&filters).await?.is_empty() {
                tracing::warn!(kind = provider.kind(), id, "entity not readable by caller");
                return Err(not_found(provider.kind(), id));
            }
        }
        Ok(entity)
    }

    /// Active-instance collection with caller, request and page filters
    async fn fetch_collection(&mut self) -> RestResult<()> {
        let provider = self.provider.clone();
        let mut filters = provider.read_filters_for_caller(self.caller).await?;
        let translation = FilterTranslator::translate(self.view.filters())?;
        filters.extend(translation.filters);
        filters.push(Filter::MaxRowCount(self.view.limit()));
        filters.push(Filter::RowOffset(self.view.offset()));

        let mut entities = if filters.iter().any(|f| f.is_on("state")) {
            provider.get_instances(&filters).await?
        } else {
            provider.get_active_instances(&filters).await?
        };
        self.total = Some(provider.get_active_instance_count().await?);

        if !translation.after_sort.is_empty() {
            entities = sort_entities(entities, &translation.after_sort).await?;
        }
        self.transition(Stack::Entities(entities), ReturnType::AsIs);
        Ok(())
    }

    /// Slice a list returned by a provider getter to the requested page
    fn paginate_getter_result(&mut self, operation: &Operation, result: Value) -> Value {
        let limit = self.view.limit();
        match result {
            Value::List(items) if limit > 0 && !operation.self_paginating => {
                self.total = Some(items.len() as u64);
                Value::List(
                    items
                        .into_iter()
                        .skip(self.view.offset())
                        .take(limit)
                        .collect(),
                )
            }
            other => other,
        }
    }

    /// Entities stay walkable; anything else becomes mixed
    fn replace_with_result(&mut self, result: Value) {
        match result {
            Value::Entity(entity) => {
                self.transition(Stack::Entities(vec![entity]), ReturnType::OneEntity)
            }
            Value::List(items)
                if !items.is_empty() && items.iter().all(|v| matches!(v, Value::Entity(_))) =>
            {
                let entities = items
                    .into_iter()
                    .filter_map(|v| match v {
                        Value::Entity(e) => Some(e),
                        _ => None,
                    })
                    .collect();
                self.transition(Stack::Entities(entities), ReturnType::AsIs)
            }
            other => self.transition(Stack::Mixed(other), ReturnType::AsIs),
        }
    }

    /// Wrap a created entity and apply the body to it
    async fn accept_created(&mut self, created: Value, body: &Value) -> RestResult<()> {
        let Value::Entity(entity) = created else {
            self.transition(Stack::Mixed(created), ReturnType::AsIs);
            return Ok(());
        };

        let body_map = body.as_map();
        let mark_seen = body_map
            .and_then(|m| m.get("markSeen"))
            .is_some_and(Value::is_truthy);
        if mark_seen && entity.operations().contains("markSeen") {
            entity.invoke("markSeen", Arguments::new()).await?;
        }

        let properties = match body_map.and_then(|m| m.get("data")) {
            Some(Value::Map(data)) => Some(data),
            Some(_) => None,
            None => body_map,
        };
        if let Some(values) = properties {
            PropertySetter::apply(self.ctx, &entity, values).await?;
        }
        tracing::info!(kind = entity.kind(), id = entity.id(), "entity created");
        self.transition(Stack::Entities(vec![entity]), ReturnType::OneEntity);
        Ok(())
    }

    /// `add<Key>` on an entity; returns the number of added items
    async fn add_to_entity(&self, entity: &EntityRef, key: &str, value: Value) -> RestResult<i64> {
        let method = naming::prefixed("add", key);
        let operation = entity.operations().get(&method).ok_or_else(|| {
            DispatchError::MethodNotFound {
                method: method.clone(),
                target: entity.kind().to_string(),
            }
        })?;
        let args = match operation.first_param() {
            Some(param) => Arguments::single(
                param.name.clone(),
                ArgumentBinder::normalize(self.ctx, param, value).await?,
            ),
            None => Arguments::new(),
        };
        let result = entity.invoke(&method, args).await?;
        Ok(match result {
            Value::Bool(b) => i64::from(b),
            other => other.as_i64().unwrap_or(0),
        })
    }

    /// `set<Word>Specifications` on the first entity of the stack
    async fn put_specifications(&mut self, word: &str) -> RestResult<()> {
        let Stack::Entities(entities) = &self.stack else {
            return Err(self.bad_transition(format!("PUT '{}'", word)));
        };
        let Some(entity) = entities.first().cloned() else {
            self.transition(Stack::Entities(Vec::new()), ReturnType::OneEntity);
            return Ok(());
        };

        let method = naming::specifications_setter_name(word);
        let operation = entity.operations().get(&method).ok_or_else(|| {
            DispatchError::MethodNotFound {
                method: method.clone(),
                target: entity.kind().to_string(),
            }
        })?;
        let param = operation
            .first_param()
            .map(|p| p.name.clone())
            .unwrap_or_else(|| "data".to_string());
        let body = self.body().await?;
        entity.invoke(&method, Arguments::single(param, body)).await?;
        self.transition(Stack::Entities(vec![entity]), ReturnType::OneEntity);
        Ok(())
    }

    /// Query parameters with hrefs resolved to entities
    async fn parameters(&self) -> RestResult<IndexMap<String, Value>> {
        let resolved = resolve_hrefs(self.ctx, Value::Map(self.view.parameters().clone())).await?;
        Ok(match resolved {
            Value::Map(map) => map,
            _ => IndexMap::new(),
        })
    }

    /// Request body with hrefs resolved to entities
    async fn body(&self) -> RestResult<Value> {
        resolve_hrefs(self.ctx, self.view.body().clone()).await
    }
}

/// Exact operation marked as getter, else `get<Word>`
fn find_getter<'o>(ops: &'o Operations, word: &str, target: &str) -> RestResult<&'o Operation> {
    if let Some(operation) = ops.get(word).filter(|op| op.is_getter) {
        return Ok(operation);
    }
    let name = naming::getter_name(word);
    ops.get(&name).ok_or_else(|| {
        DispatchError::MethodNotFound {
            method: name,
            target: target.to_string(),
        }
        .into()
    })
}

/// The raw word, else `<prefix><Word>`, as long as it is an operation of `kind`
fn find_prefixed<'o>(
    ops: &'o Operations,
    word: &str,
    kind: OperationKind,
    target: &str,
) -> RestResult<&'o Operation> {
    let prefixed = naming::prefixed(kind.prefix().unwrap_or_default(), word);
    [word, prefixed.as_str()]
        .into_iter()
        .filter_map(|name| ops.get(name))
        .find(|op| op.kind == kind)
        .ok_or_else(|| {
            DispatchError::MethodNotFound {
                method: format!("{} (nor {})", word, prefixed),
                target: target.to_string(),
            }
            .into()
        })
}

/// A map body binds by key; any other body binds to a sole parameter
fn named_arguments(operation: &Operation, body: &Value) -> IndexMap<String, Value> {
    match body {
        Value::Map(map) => map.clone(),
        Value::Null => IndexMap::new(),
        other => match operation.params.as_slice() {
            [param] => IndexMap::from([(param.name.clone(), other.clone())]),
            _ => IndexMap::new(),
        },
    }
}

fn not_found(kind: &str, id: i64) -> crate::core::error::RestError {
    DispatchError::NotFound {
        kind: kind.to_string(),
        id: id.to_string(),
    }
    .into()
}

/// In-memory multi-key sort over entity properties
async fn sort_entities(entities: Vec<EntityRef>, keys: &[SortKey]) -> RestResult<Vec<EntityRef>> {
    let mut keyed = Vec::with_capacity(entities.len());
    for entity in entities {
        let mut values = Vec::with_capacity(keys.len());
        for key in keys {
            values.push(read_property(entity.as_ref(), &key.field).await?);
        }
        keyed.push((values, entity));
    }
    keyed.sort_by(|(a, _), (b, _)| {
        keys.iter()
            .zip(a.iter().zip(b.iter()))
            .map(|(key, (x, y))| {
                let ordering = x.compare(y);
                if key.descending {
                    ordering.reverse()
                } else {
                    ordering
                }
            })
            .find(|o| *o != Ordering::Equal)
            .unwrap_or(Ordering::Equal)
    });
    Ok(keyed.into_iter().map(|(_, entity)| entity).collect())
}
