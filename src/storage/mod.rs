//! Storage implementations for different backends

pub mod filter;
#[cfg(feature = "in-memory")]
pub mod in_memory;
#[cfg(feature = "mongodb_backend")]
pub mod mongodb;

#[cfg(feature = "in-memory")]
pub use in_memory::{InMemoryConnection, InMemoryDatastore};
#[cfg(feature = "mongodb_backend")]
pub use mongodb::{MongoConnection, MongoDatastore};
