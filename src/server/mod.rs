//! Server module wiring the dispatch engine into an axum router
//!
//! - [`ServerBuilder`] assembles configuration, providers and authenticator
//! - [`ServerHost`] runs requests through parse, auth, dispatch and shaping
//! - [`RestExposure`] routes every request into the host

pub mod builder;
pub mod exposure;
pub mod host;
pub mod telemetry;

pub use builder::ServerBuilder;
pub use exposure::RestExposure;
pub use host::ServerHost;
pub use telemetry::init_tracing;
