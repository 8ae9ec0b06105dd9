//! Core module containing the dispatch engine's building blocks

pub mod document;
pub mod error;
pub mod hooks;
pub mod query;
pub mod schema;
pub mod service;

pub use document::{Document, ID_FIELD};
pub use error::{
    ConfigError, CrudError, FieldValidationError, HookError, QueryParseError, RequestError,
    StorageError, ValidationError,
};
pub use hooks::{HookMediator, Phase, Verb};
pub use query::{Q2mTranslator, QueryDescriptor, QueryLanguage, QueryTranslator};
pub use schema::{
    CompiledSchema, RawSchema, RawSchemaMap, SchemaBackend, SchemaEntry, SchemaMap,
    SchemaStrategy, TypedSchema, ValidationMode,
};
pub use service::{Connection, Datastore, DatastoreHandle, StorageResult};
