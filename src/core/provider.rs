//! Provider trait: the storage-facing side of a resource kind

use crate::core::auth::Caller;
use crate::core::entity::EntityRef;
use crate::core::filter::Filter;
use crate::core::operation::{Arguments, Operations, RestProperties};
use crate::core::value::Value;
use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// Shared handle to a provider
pub type ProviderRef = Arc<dyn Provider>;

/// Owner of every entity of one kind
///
/// Implementations wrap whatever storage engine backs the kind. Filters arrive
/// in canonical form (see [`Filter`]); evaluating them is up to the provider.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Provider identity, also usable as a resource path
    fn kind(&self) -> &str;

    /// Fetch a single entity regardless of its state
    async fn get(&self, id: i64) -> Result<Option<EntityRef>>;

    /// Fetch every entity matching the filters, in any state
    async fn get_instances(&self, filters: &[Filter]) -> Result<Vec<EntityRef>>;

    /// Fetch active entities matching the filters
    async fn get_active_instances(&self, filters: &[Filter]) -> Result<Vec<EntityRef>>;

    /// Number of active entities, ignoring any filter
    async fn get_active_instance_count(&self) -> Result<u64>;

    /// Filters selecting the entities `caller` may read; empty means all
    async fn read_filters_for_caller(&self, caller: &Caller) -> Result<Vec<Filter>>;

    /// Create a new instance from request data
    async fn create_instance(&self, data: Value) -> Result<Value>;

    /// Properties of the entities this provider owns
    fn rest_properties(&self) -> &RestProperties;

    /// Provider-level operations callable by name
    fn operations(&self) -> &Operations;

    /// Invoke a provider-level operation with bound arguments
    async fn invoke(&self, operation: &str, args: Arguments) -> Result<Value>;

    /// Preload data connected to `entities` before they are expanded
    ///
    /// Default implementation does nothing.
    async fn fetch_connected(&self, _entities: &[EntityRef]) -> Result<()> {
        Ok(())
    }
}
