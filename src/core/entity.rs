//! Entity trait defining the core abstraction for addressable resources

use crate::core::operation::{Arguments, Operations, RestProperties};
use crate::core::value::Value;
use anyhow::Result;
use async_trait::async_trait;
use indexmap::IndexMap;
use std::sync::Arc;

/// State of an entity that is visible in active listings
pub const STATE_ACTIVE: i64 = 1;

/// State of a soft-deleted entity
pub const STATE_DELETED: i64 = -1;

/// Shared handle to an entity
pub type EntityRef = Arc<dyn Entity>;

/// A single addressable resource owned by a provider.
///
/// All entities have:
/// - id: positive numeric identifier, unique per kind
/// - kind: the provider identity this entity belongs to (e.g. "user")
/// - state: lifecycle state, see [`STATE_ACTIVE`]
///
/// Everything else an entity exposes goes through its [`Operations`] table and
/// is invoked by name.
#[async_trait]
pub trait Entity: Send + Sync {
    /// Unique identifier of this instance
    fn id(&self) -> i64;

    /// Kind (provider identity) of this instance
    fn kind(&self) -> &str;

    /// Current lifecycle state
    fn state(&self) -> i64;

    async fn set_state(&self, state: i64) -> Result<()>;

    /// Remove the entity from its provider
    async fn delete(&self) -> Result<()>;

    /// Name used by `[name]` path segments
    fn name(&self) -> Option<String> {
        None
    }

    /// Properties exposed in responses and writable from request bodies
    fn rest_properties(&self) -> &RestProperties;

    /// Operations callable by name
    fn operations(&self) -> &Operations;

    /// Invoke a named operation with bound arguments
    async fn invoke(&self, operation: &str, args: Arguments) -> Result<Value>;

    /// Called once the property map of this entity has been read
    async fn after_getting(&self, _values: &mut IndexMap<String, Value>) -> Result<()> {
        Ok(())
    }

    /// Called once a request body has been applied to this entity
    async fn after_setting(&self) -> Result<()> {
        Ok(())
    }

    /// Check if the entity shows up in active listings
    fn is_active(&self) -> bool {
        self.state() == STATE_ACTIVE
    }
}

/// Read one property by name; `id` and `state` are always available
pub async fn read_property(entity: &dyn Entity, name: &str) -> Result<Value> {
    match name {
        "id" => Ok(Value::Int(entity.id())),
        "state" => Ok(Value::Int(entity.state())),
        _ => match entity
            .rest_properties()
            .get(name)
            .and_then(|access| access.getter.as_deref())
        {
            Some(getter) => entity.invoke(getter, Arguments::new()).await,
            None => Ok(Value::Null),
        },
    }
}

/// Read `id`, `state` and every readable REST property, then run the
/// after-get hook
pub async fn read_properties(entity: &dyn Entity) -> Result<IndexMap<String, Value>> {
    let mut values = IndexMap::new();
    values.insert("id".to_string(), Value::Int(entity.id()));
    values.insert("state".to_string(), Value::Int(entity.state()));
    for (name, access) in entity.rest_properties().iter() {
        if let Some(getter) = &access.getter {
            let value = entity.invoke(getter, Arguments::new()).await?;
            values.insert(name.clone(), value);
        }
    }
    entity.after_getting(&mut values).await?;
    Ok(values)
}
