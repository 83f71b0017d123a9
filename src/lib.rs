//! # restack
//!
//! A convention-based REST dispatch engine. Resource paths such as
//! `/v1/users/42/friends` are resolved against registered entity providers,
//! walked segment by segment through a small state machine, and the result is
//! shaped into JSON.
//!
//! ## Features
//!
//! - **Path resolution**: longest path prefix naming a provider, by configured
//!   mapping or by provider kind
//! - **Operation registry**: path words map to declared getters, creators,
//!   adders and setters, with typed parameters
//! - **Query grammar**: `field>=18`, `name^=A`, `sort=name`, `fields=id,name`,
//!   `expand=friends(avatar)`, `limit`/`offset`
//! - **Response shaping**: entity hrefs, expansion with batched loading, field
//!   selection, collection headers, ETags
//! - **Pluggable auth**: bearer tokens verified by an [`core::Authenticator`]
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use restack::prelude::*;
//!
//! let store = InMemoryStore::new();
//! let users = store.provider(
//!     RecordSchema::new("user")
//!         .property("name", ParamType::Text)
//!         .references("friends", "user"),
//! );
//! users.insert([("name", Value::from("Ann"))])?;
//!
//! let app = ServerBuilder::new()
//!     .with_config(RestConfig::default().with_path("users", "user"))
//!     .with_provider(users)
//!     .build()?;
//!
//! // GET /v1/users?name^=A&fields=id,name
//! ```

pub mod config;
pub mod core;
pub mod dispatch;
pub mod request;
pub mod response;
pub mod server;
pub mod storage;

/// Re-exports of commonly used types and traits
pub mod prelude {
    // === Core Traits ===
    pub use crate::core::{
        Arguments, Authenticator, Caller, Capability, Entity, EntityRef, Filter, FilterOp,
        NoAuthenticator, Operation, Operations, ParamType, Parameter, Provider, ProviderRef,
        RestError, RestObject, RestProperties, RestResult, STATE_ACTIVE, STATE_DELETED, SortKey,
        Value,
    };

    // === Dispatch ===
    pub use crate::dispatch::{DispatchContext, DispatchOutcome, ProviderRegistry, dispatch};

    // === Request / Response ===
    pub use crate::request::{RequestParser, RequestView};
    pub use crate::response::{ResponseShaper, RestResponse};

    // === Storage ===
    #[cfg(feature = "in-memory")]
    pub use crate::storage::{InMemoryProvider, InMemoryStore, RecordSchema};

    // === Config ===
    pub use crate::config::RestConfig;

    // === Server ===
    pub use crate::server::{ServerBuilder, ServerHost, init_tracing};

    // === External dependencies ===
    pub use anyhow::Result;
    pub use async_trait::async_trait;
}
