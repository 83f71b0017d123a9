//! Storage collaborators

#[cfg(feature = "in-memory")]
pub mod in_memory;

#[cfg(feature = "in-memory")]
pub use in_memory::{InMemoryProvider, InMemoryStore, Record, RecordSchema};
