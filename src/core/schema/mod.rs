//! Pluggable schema validation
//!
//! A [`SchemaStrategy`] implements the three-operation contract used by the
//! dispatcher:
//!
//! - `prepare` compiles the raw schema map once, before serving requests
//! - `validate` checks a document and resolves to the document or a
//!   structured [`ValidationError`]
//! - `cast` normalizes a validated document (type coercions, defaults)
//!
//! The backend is picked once at setup from an explicit [`SchemaBackend`]
//! selector and applies to every collection for the lifetime of the process.

pub mod declarative;
pub mod json_schema;
pub mod typed;

pub use declarative::{DeclarativeSchema, DeclarativeStrategy, FieldRule, FieldType};
pub use json_schema::{CompiledJsonSchema, JsonSchemaStrategy};
pub use typed::{TypedSchema, TypedStrategy};

use crate::core::document::Document;
use crate::core::error::{ConfigError, ValidationError};
use async_trait::async_trait;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// How much of a schema applies to a write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationMode {
    /// Whole documents (create, replace): required fields and defaults apply
    Full,
    /// Patches: only the fields present are checked, no defaults are filled
    Partial,
}

/// Schema as supplied by the host application, before compilation
#[derive(Clone)]
pub enum RawSchema {
    /// A JSON rule document (declarative rules or a JSON Schema)
    Rules(Value),
    /// A runtime type-checked parser built from a Rust type
    Typed(TypedSchema),
}

impl fmt::Debug for RawSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RawSchema::Rules(v) => f.debug_tuple("Rules").field(v).finish(),
            RawSchema::Typed(t) => f.debug_tuple("Typed").field(t).finish(),
        }
    }
}

impl From<Value> for RawSchema {
    fn from(value: Value) -> Self {
        RawSchema::Rules(value)
    }
}

impl From<TypedSchema> for RawSchema {
    fn from(schema: TypedSchema) -> Self {
        RawSchema::Typed(schema)
    }
}

/// Collection name to raw schema; `None` reserves the name without validation
pub type RawSchemaMap = IndexMap<String, Option<RawSchema>>;

/// A schema compiled by one of the backends
#[derive(Clone)]
pub enum CompiledSchema {
    Declarative(Arc<DeclarativeSchema>),
    JsonSchema(Arc<CompiledJsonSchema>),
    Typed(TypedSchema),
}

impl fmt::Debug for CompiledSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompiledSchema::Declarative(s) => f.debug_tuple("Declarative").field(s).finish(),
            CompiledSchema::JsonSchema(s) => f.debug_tuple("JsonSchema").field(s).finish(),
            CompiledSchema::Typed(s) => f.debug_tuple("Typed").field(s).finish(),
        }
    }
}

/// What the schema map says about a collection
#[derive(Debug, Clone, Copy)]
pub enum SchemaEntry<'a> {
    /// The map is empty: every collection is accepted without validation
    Unconstrained,
    /// Declared with an explicit null: accepted without validation
    Reserved,
    /// Declared with a schema
    Compiled(&'a CompiledSchema),
    /// The map is non-empty and does not declare the collection
    Unknown,
}

impl SchemaEntry<'_> {
    pub fn is_known(&self) -> bool {
        !matches!(self, SchemaEntry::Unknown)
    }
}

/// Compiled schema map, immutable once built
#[derive(Debug, Clone, Default)]
pub struct SchemaMap {
    entries: IndexMap<String, Option<CompiledSchema>>,
}

impl SchemaMap {
    /// An empty map: every collection name is accepted
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_entries(entries: IndexMap<String, Option<CompiledSchema>>) -> Self {
        Self { entries }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Declared collection names, in declaration order
    pub fn collections(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Resolve the entry for a collection
    pub fn resolve(&self, collection: &str) -> SchemaEntry<'_> {
        if self.entries.is_empty() {
            return SchemaEntry::Unconstrained;
        }
        match self.entries.get(collection) {
            None => SchemaEntry::Unknown,
            Some(None) => SchemaEntry::Reserved,
            Some(Some(schema)) => SchemaEntry::Compiled(schema),
        }
    }
}

/// The prepare/validate/cast contract shared by every validation backend
#[async_trait]
pub trait SchemaStrategy: Send + Sync {
    /// Backend name, as used by [`SchemaBackend`]
    fn name(&self) -> &'static str;

    /// Compile one collection's schema
    fn compile(&self, collection: &str, raw: RawSchema) -> Result<CompiledSchema, ConfigError>;

    /// Compile the whole schema map; explicit nulls stay reserved
    fn prepare(&self, schemas: RawSchemaMap) -> Result<SchemaMap, ConfigError> {
        let mut entries = IndexMap::with_capacity(schemas.len());
        for (collection, raw) in schemas {
            let compiled = match raw {
                Some(raw) => Some(self.compile(&collection, raw)?),
                None => None,
            };
            entries.insert(collection, compiled);
        }
        tracing::debug!(backend = self.name(), collections = entries.len(), "schemas prepared");
        Ok(SchemaMap::from_entries(entries))
    }

    /// Check a document against a compiled schema
    async fn validate(
        &self,
        schema: &CompiledSchema,
        document: Document,
        mode: ValidationMode,
    ) -> Result<Document, ValidationError>;

    /// Normalize a validated document; never fails
    fn cast(&self, schema: &CompiledSchema, document: Document, mode: ValidationMode) -> Document;
}

/// Selector for the built-in validation backends
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SchemaBackend {
    /// Per-field rule objects with coercion and defaults
    #[default]
    Declarative,
    /// JSON Schema documents
    JsonSchema,
    /// Rust types checked at runtime through serde and `validator`
    Typed,
}

impl SchemaBackend {
    /// Resolve the selector into a strategy
    pub fn strategy(self) -> Arc<dyn SchemaStrategy> {
        match self {
            SchemaBackend::Declarative => Arc::new(DeclarativeStrategy),
            SchemaBackend::JsonSchema => Arc::new(JsonSchemaStrategy),
            SchemaBackend::Typed => Arc::new(TypedStrategy),
        }
    }
}

/// Error for a raw schema the backend cannot compile
pub(crate) fn unsupported_schema(backend: &str, collection: &str, message: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field: format!("collections.{}", collection),
        value: backend.to_string(),
        message: message.to_string(),
    }
}
