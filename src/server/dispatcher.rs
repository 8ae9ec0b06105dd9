//! Transport-agnostic CRUD dispatch
//!
//! Every operation starts with the collection check: when the schema map
//! declares collections, any other name fails with
//! [`CrudError::UnknownCollection`] before storage is touched.
//!
//! Writes then run their stages strictly in order:
//!
//! ```text
//! validate + cast ─▶ before hook ─▶ storage call ─▶ after hook ─▶ result
//! ```
//!
//! A validation failure stops before any hook or storage call. A failing
//! after hook fails the request even though the write already happened.
//!
//! Update operators (`$set`, `$inc`, ...) are only accepted for collections
//! without a schema.

use super::host::CrudHost;
use crate::core::document::{Document, ID_FIELD, into_document, operator_key};
use crate::core::error::{CrudError, RequestError};
use crate::core::hooks::Verb;
use crate::core::query::QueryDescriptor;
use crate::core::schema::{SchemaEntry, ValidationMode};
use axum::http::HeaderMap;
use serde_json::{Value, json};
use std::sync::Arc;

/// The eight CRUD operations over a [`CrudHost`]
#[derive(Debug, Clone)]
pub struct Dispatcher {
    host: Arc<CrudHost>,
}

impl Dispatcher {
    pub fn new(host: Arc<CrudHost>) -> Self {
        Self { host }
    }

    pub fn host(&self) -> &Arc<CrudHost> {
        &self.host
    }

    /// Create a document; the stored document carries its `_id`
    pub async fn create(&self, collection: &str, body: Value) -> Result<Document, CrudError> {
        let document = self
            .prepare_write(collection, body, ValidationMode::Full)
            .await?;

        self.host
            .hooks
            .fire_before(collection, Verb::Post, Value::Object(document.clone()))
            .await?;

        let conn = self.host.datastore.open().await?;
        let stored = conn.insert_one(collection, document).await?;
        tracing::debug!(collection, id = ?stored.get(ID_FIELD), "document created");

        self.host
            .hooks
            .fire_after(collection, Verb::Post, Value::Object(stored.clone()))
            .await?;
        Ok(stored)
    }

    pub async fn read_one(&self, collection: &str, id: &str) -> Result<Document, CrudError> {
        self.ensure_collection(collection)?;
        let conn = self.host.datastore.open().await?;
        Ok(conn.get_one(collection, id).await?)
    }

    pub async fn read_many(
        &self,
        collection: &str,
        params: &[(String, String)],
        headers: &HeaderMap,
    ) -> Result<Vec<Document>, CrudError> {
        self.ensure_collection(collection)?;
        let query = self.translate(params, headers)?;
        let conn = self.host.datastore.open().await?;
        let documents = conn.get_many(collection, &query).await?;
        tracing::debug!(collection, count = documents.len(), "documents read");
        Ok(documents)
    }

    /// Replace a whole document
    pub async fn replace(
        &self,
        collection: &str,
        id: &str,
        body: Value,
    ) -> Result<Document, CrudError> {
        let document = self
            .prepare_write(collection, body, ValidationMode::Full)
            .await?;

        self.host
            .hooks
            .fire_before(collection, Verb::Put, Value::Object(document.clone()))
            .await?;

        let conn = self.host.datastore.open().await?;
        let stored = conn.replace_one(collection, id, document).await?;
        tracing::debug!(collection, id, "document replaced");

        self.host
            .hooks
            .fire_after(collection, Verb::Put, Value::Object(stored.clone()))
            .await?;
        Ok(stored)
    }

    /// Apply a partial update to one document
    pub async fn patch_one(
        &self,
        collection: &str,
        id: &str,
        body: Value,
    ) -> Result<Document, CrudError> {
        let patch = self
            .prepare_write(collection, body, ValidationMode::Partial)
            .await?;

        self.host
            .hooks
            .fire_before(collection, Verb::Patch, Value::Object(patch.clone()))
            .await?;

        let conn = self.host.datastore.open().await?;
        let updated = conn.update_one(collection, id, patch).await?;
        tracing::debug!(collection, id, "document patched");

        self.host
            .hooks
            .fire_after(collection, Verb::Patch, Value::Object(updated.clone()))
            .await?;
        Ok(updated)
    }

    /// Apply a partial update to every document the query selects
    pub async fn patch_many(
        &self,
        collection: &str,
        params: &[(String, String)],
        headers: &HeaderMap,
        body: Value,
    ) -> Result<u64, CrudError> {
        let patch = self
            .prepare_write(collection, body, ValidationMode::Partial)
            .await?;
        let query = self.translate(params, headers)?;

        self.host
            .hooks
            .fire_before(collection, Verb::Patch, Value::Object(patch.clone()))
            .await?;

        let conn = self.host.datastore.open().await?;
        let count = conn.update_many(collection, patch, &query).await?;
        tracing::debug!(collection, count, "documents patched by query");

        self.host
            .hooks
            .fire_after(collection, Verb::Patch, json!({ "count": count }))
            .await?;
        Ok(count)
    }

    /// Remove one document and return it
    pub async fn delete_one(&self, collection: &str, id: &str) -> Result<Document, CrudError> {
        self.ensure_collection(collection)?;

        self.host
            .hooks
            .fire_before(collection, Verb::Delete, json!({ ID_FIELD: id }))
            .await?;

        let conn = self.host.datastore.open().await?;
        let removed = conn.remove_one(collection, id).await?;
        tracing::debug!(collection, id, "document deleted");

        self.host
            .hooks
            .fire_after(collection, Verb::Delete, Value::Object(removed.clone()))
            .await?;
        Ok(removed)
    }

    /// Remove every document the query selects
    pub async fn delete_many(
        &self,
        collection: &str,
        params: &[(String, String)],
        headers: &HeaderMap,
    ) -> Result<u64, CrudError> {
        self.ensure_collection(collection)?;
        let query = self.translate(params, headers)?;

        self.host
            .hooks
            .fire_before(collection, Verb::Delete, query.to_value())
            .await?;

        let conn = self.host.datastore.open().await?;
        let count = conn.remove_many(collection, &query).await?;
        tracing::debug!(collection, count, "documents deleted by query");

        self.host
            .hooks
            .fire_after(collection, Verb::Delete, json!({ "count": count }))
            .await?;
        Ok(count)
    }

    /// Reject collections the schema map does not declare
    pub fn ensure_collection(&self, collection: &str) -> Result<SchemaEntry<'_>, CrudError> {
        let entry = self.host.schemas.resolve(collection);
        if entry.is_known() {
            Ok(entry)
        } else {
            Err(CrudError::UnknownCollection {
                collection: collection.to_string(),
            })
        }
    }

    fn translate(
        &self,
        params: &[(String, String)],
        headers: &HeaderMap,
    ) -> Result<QueryDescriptor, CrudError> {
        Ok(self.host.translator.translate(params, headers)?)
    }

    /// Collection check, body shape, then validate and cast when a schema applies
    async fn prepare_write(
        &self,
        collection: &str,
        body: Value,
        mode: ValidationMode,
    ) -> Result<Document, CrudError> {
        let entry = self.ensure_collection(collection)?;
        let document = into_document(body)?;

        let SchemaEntry::Compiled(schema) = entry else {
            tracing::debug!(collection, "no schema, storing document as sent");
            return Ok(document);
        };
        // Operator keys would reach storage without passing the schema
        if let Some(key) = operator_key(&document) {
            return Err(RequestError::InvalidBody {
                message: format!(
                    "update operator '{}' is not allowed on schema-governed collection '{}'",
                    key, collection
                ),
            }
            .into());
        }

        let strategy = &self.host.strategy;
        let validated = strategy.validate(schema, document, mode).await?;
        let cast = strategy.cast(schema, validated, mode);
        tracing::debug!(collection, backend = strategy.name(), ?mode, "document validated");
        Ok(cast)
    }
}
