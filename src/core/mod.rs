//! Core module containing the fundamental traits and types of the engine

pub mod auth;
pub mod entity;
pub mod error;
pub mod filter;
pub mod memory;
pub mod naming;
pub mod operation;
pub mod provider;
pub mod value;

pub use auth::{Authenticator, Caller, NoAuthenticator, PublicPaths};
pub use entity::{Entity, EntityRef, STATE_ACTIVE, STATE_DELETED};
pub use error::{RestError, RestResult};
pub use filter::{Filter, FilterOp, SortKey};
pub use memory::MemoryGuard;
pub use operation::{
    Arguments, Operation, OperationKind, Operations, ParamType, Parameter, PropertyAccess,
    RestProperties,
};
pub use provider::{Provider, ProviderRef};
pub use value::{Capability, RestObject, Value};
