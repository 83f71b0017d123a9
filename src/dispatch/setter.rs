//! Applying request data to entities and operations
//!
//! - [`PropertySetter`] writes a body map onto an entity's declared setters,
//!   resolving embedded `{href, ...}` objects into entities first
//! - [`ArgumentBinder`] binds named request values to an operation's
//!   parameters, normalizing each to its declared type

use crate::core::entity::EntityRef;
use crate::core::error::{DispatchError, RequestError, RestResult};
use crate::core::operation::{Arguments, Operation, ParamType, Parameter};
use crate::core::value::Value;
use crate::dispatch::context::DispatchContext;
use futures::future::{BoxFuture, FutureExt};
use indexmap::IndexMap;

/// Replace every href string inside `value` with the entity it points at
pub fn resolve_hrefs<'a>(ctx: &'a DispatchContext, value: Value) -> BoxFuture<'a, RestResult<Value>> {
    async move {
        Ok(match value {
            Value::Str(s) => match ctx.resolve_href(&s).await? {
                Some(entity) => Value::Entity(entity),
                None => Value::Str(s),
            },
            Value::List(items) => {
                let mut resolved = Vec::with_capacity(items.len());
                for item in items {
                    resolved.push(resolve_hrefs(ctx, item).await?);
                }
                Value::List(resolved)
            }
            Value::Map(map) => {
                let mut resolved = IndexMap::with_capacity(map.len());
                for (key, item) in map {
                    resolved.insert(key, resolve_hrefs(ctx, item).await?);
                }
                Value::Map(resolved)
            }
            other => other,
        })
    }
    .boxed()
}

pub struct PropertySetter;

impl PropertySetter {
    /// Apply `values` to the entity's REST properties
    ///
    /// Keys that are not properties, or properties without a setter, are
    /// skipped. Runs the entity's after-set hook once done.
    pub fn apply<'a>(
        ctx: &'a DispatchContext,
        entity: &'a EntityRef,
        values: &'a IndexMap<String, Value>,
    ) -> BoxFuture<'a, RestResult<()>> {
        async move {
            for (name, value) in values {
                let Some(setter) = entity
                    .rest_properties()
                    .get(name)
                    .and_then(|access| access.setter.clone())
                else {
                    continue;
                };

                let value = Self::resolve_embedded(ctx, value.clone()).await?;
                let (param_name, value) = match entity
                    .operations()
                    .get(&setter)
                    .and_then(Operation::first_param)
                {
                    Some(param) => (
                        param.name.clone(),
                        ArgumentBinder::normalize(ctx, param, value).await?,
                    ),
                    None => (name.clone(), value),
                };

                tracing::debug!(kind = entity.kind(), id = entity.id(), %setter, "setting property");
                entity
                    .invoke(&setter, Arguments::single(param_name, value))
                    .await?;
            }
            entity.after_setting().await?;
            Ok(())
        }
        .boxed()
    }

    /// `{href, ...rest}` becomes the referenced entity with `rest` applied to it
    async fn resolve_embedded(ctx: &DispatchContext, value: Value) -> RestResult<Value> {
        let Value::Map(map) = &value else {
            return Ok(value);
        };
        let embedded = match map.get("href") {
            Some(Value::Entity(entity)) => Some(entity.clone()),
            Some(Value::Str(href)) => ctx.resolve_href(href).await?,
            _ => None,
        };
        match embedded {
            Some(entity) => {
                Self::apply(ctx, &entity, map).await?;
                Ok(Value::Entity(entity))
            }
            None => Ok(value),
        }
    }
}

pub struct ArgumentBinder;

impl ArgumentBinder {
    /// Bind named values to every declared parameter of `operation`
    ///
    /// Missing required parameters fail with `MissingArgument`; missing
    /// optional ones take their default.
    pub async fn bind(
        ctx: &DispatchContext,
        operation: &Operation,
        named: &IndexMap<String, Value>,
    ) -> RestResult<Arguments> {
        let mut args = Arguments::new();
        for param in &operation.params {
            let value = match named.get(&param.name) {
                Some(value) => Self::normalize(ctx, param, value.clone()).await?,
                None if param.required => {
                    return Err(DispatchError::MissingArgument {
                        operation: operation.name.clone(),
                        argument: param.name.clone(),
                    }
                    .into());
                }
                None => param.default.clone().unwrap_or_default(),
            };
            args.push(param.name.clone(), value);
        }
        Ok(args)
    }

    /// Normalize a value to the declared parameter type
    pub async fn normalize(
        ctx: &DispatchContext,
        param: &Parameter,
        value: Value,
    ) -> RestResult<Value> {
        match &param.ty {
            ParamType::Entity(kind) => Self::to_entity(ctx, &param.name, kind, value).await,
            other => Ok(other.coerce(&param.name, value)?),
        }
    }

    async fn to_entity(
        ctx: &DispatchContext,
        argument: &str,
        kind: &str,
        value: Value,
    ) -> RestResult<Value> {
        let id = match &value {
            Value::Null | Value::Entity(_) => return Ok(value),
            Value::Int(id) => *id,
            Value::Str(s) => match s.parse::<i64>() {
                Ok(id) => id,
                Err(_) => {
                    return match ctx.resolve_href(s).await? {
                        Some(entity) => Ok(Value::Entity(entity)),
                        None => Err(invalid_reference(argument, kind)),
                    };
                }
            },
            Value::Map(map) => {
                return match map.get("href") {
                    Some(Value::Entity(entity)) => Ok(Value::Entity(entity.clone())),
                    Some(Value::Str(href)) => match ctx.resolve_href(href).await? {
                        Some(entity) => Ok(Value::Entity(entity)),
                        None => Err(invalid_reference(argument, kind)),
                    },
                    _ => Err(invalid_reference(argument, kind)),
                };
            }
            _ => return Err(invalid_reference(argument, kind)),
        };

        let provider = ctx.provider(kind).ok_or_else(|| invalid_reference(argument, kind))?;
        match provider.get(id).await? {
            Some(entity) => Ok(Value::Entity(entity)),
            None => Err(DispatchError::NotFound {
                kind: kind.to_string(),
                id: id.to_string(),
            }
            .into()),
        }
    }
}

fn invalid_reference(argument: &str, kind: &str) -> crate::core::error::RestError {
    RequestError::InvalidArgument {
        argument: argument.to_string(),
        message: format!("expected an id or href of a {}", kind),
    }
    .into()
}
