//! # crudlify
//!
//! Auto-generated REST CRUD endpoints for named document collections, on top
//! of an axum `Router` and a document datastore.
//!
//! ## Features
//!
//! - **Eight generic routes**: create, read, list, replace, patch and delete,
//!   plus `_byquery` bulk patch and delete
//! - **Pluggable validation**: declarative rules, JSON Schema, or Rust types
//!   checked through `validator`
//! - **Query translation**: query-to-mongo URL DSL with a raw JSON override
//!   (`?q={...}&h={...}`)
//! - **Lifecycle hooks**: before/after callbacks per collection and verb
//! - **Swappable storage**: in-memory and MongoDB datastores, reconfigurable
//!   at runtime
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use crudlify::prelude::*;
//!
//! let crud = CrudlifyBuilder::new()
//!     .with_datastore(InMemoryDatastore::new())
//!     .with_collection("books", json!({
//!         "title": {"type": "string", "required": true},
//!         "pages": "integer"
//!     }))
//!     .build()?;
//!
//! crud.hooks().before_post("books", |doc| async move {
//!     tracing::info!(?doc, "new book");
//!     Ok(())
//! });
//!
//! let app = Router::new().nest("/api", crud.router());
//! ```

pub mod config;
pub mod core;
pub mod server;
pub mod storage;

/// Re-exports of commonly used types and traits
pub mod prelude {
    // === Core ===
    pub use crate::core::{
        Connection, CrudError, Datastore, DatastoreHandle, Document, HookMediator, Phase,
        QueryDescriptor, QueryLanguage, QueryTranslator, RawSchema, RawSchemaMap, SchemaBackend,
        SchemaStrategy, StorageError, TypedSchema, ValidationError, ValidationMode, Verb,
    };

    // === Config ===
    pub use crate::config::{CrudConfig, CrudOptions};

    // === Server ===
    pub use crate::server::{Crudlify, CrudlifyBuilder, Dispatcher, crudlify};

    // === Storage ===
    #[cfg(feature = "in-memory")]
    pub use crate::storage::InMemoryDatastore;
    #[cfg(feature = "mongodb_backend")]
    pub use crate::storage::MongoDatastore;

    // === External dependencies ===
    pub use async_trait::async_trait;
    pub use serde::{Deserialize, Serialize};
    pub use serde_json::{Value, json};

    // === Axum ===
    pub use axum::Router;
}
