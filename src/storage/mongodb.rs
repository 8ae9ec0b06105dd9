//! MongoDB datastore using the official MongoDB async driver.
//!
//! # Feature flag
//!
//! This module is gated behind the `mongodb_backend` feature flag:
//! ```toml
//! [dependencies]
//! crudlify = { version = "0.1", features = ["mongodb_backend"] }
//! ```
//!
//! # Storage model
//!
//! Each crudlify collection maps to the MongoDB collection of the same name.
//! Documents are converted through `serde_json::Value`; identifiers are
//! stored as strings under `_id` (UUID v4 when the client sends none).
//!
//! Query descriptors map onto `find` options one to one. `update_many` and
//! `remove_many` honor `sort`/`offset`/`limit` by selecting the target ids
//! first, since the driver's bulk primitives have no limit.

use crate::core::document::{Document, ID_FIELD, document_id};
use crate::core::error::StorageError;
use crate::core::query::QueryDescriptor;
use crate::core::service::{Connection, Datastore, StorageResult};
use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::bson::{self, Bson, doc};
use mongodb::options::ReturnDocument;
use mongodb::{Client, Database};
use serde_json::{Map, Value};
use std::sync::Arc;
use uuid::Uuid;

const BACKEND: &str = "mongodb";

// ---------------------------------------------------------------------------
// Conversion helpers
// ---------------------------------------------------------------------------

fn to_bson_document(map: &Map<String, Value>) -> StorageResult<bson::Document> {
    match bson::to_bson(map) {
        Ok(Bson::Document(d)) => Ok(d),
        Ok(_) => Err(StorageError::backend(BACKEND, "expected a BSON document")),
        Err(e) => Err(StorageError::backend(
            BACKEND,
            format!("Failed to convert JSON to BSON: {}", e),
        )),
    }
}

fn from_bson_document(document: bson::Document) -> Document {
    match Bson::Document(document).into_relaxed_extjson() {
        Value::Object(map) => map,
        _ => Document::new(),
    }
}

fn by_id(id: &str) -> bson::Document {
    doc! { ID_FIELD: id }
}

/// Wrap plain patches in `$set`, and keep `_id` out of every update
fn update_document(patch: Document) -> StorageResult<bson::Document> {
    let mut update = if patch.keys().any(|k| k.starts_with('$')) {
        patch
    } else {
        let mut wrapped = Map::new();
        wrapped.insert("$set".to_string(), Value::Object(patch));
        wrapped
    };
    for fields in update.values_mut() {
        if let Value::Object(fields) = fields {
            fields.remove(ID_FIELD);
        }
    }
    to_bson_document(&update)
}

fn driver_error(action: &str, e: mongodb::error::Error) -> StorageError {
    StorageError::backend(BACKEND, format!("Failed to {}: {}", action, e))
}

// ---------------------------------------------------------------------------
// MongoDatastore
// ---------------------------------------------------------------------------

/// Datastore backed by a MongoDB database.
///
/// # Example
///
/// ```rust,ignore
/// use crudlify::storage::MongoDatastore;
///
/// let datastore = MongoDatastore::connect("mongodb://localhost:27017", "library").await?;
/// let crud = crudlify(datastore, schemas, CrudOptions::default())?;
/// ```
#[derive(Clone, Debug)]
pub struct MongoDatastore {
    database: Database,
}

impl MongoDatastore {
    /// Create a datastore over an existing database handle.
    pub fn new(database: Database) -> Self {
        Self { database }
    }

    /// Connect to a server and select a database.
    pub async fn connect(uri: &str, database: &str) -> StorageResult<Self> {
        let client = Client::with_uri_str(uri)
            .await
            .map_err(|e| driver_error("connect", e))?;
        Ok(Self::new(client.database(database)))
    }

    /// Get a reference to the underlying database.
    pub fn database(&self) -> &Database {
        &self.database
    }
}

#[async_trait]
impl Datastore for MongoDatastore {
    fn name(&self) -> &'static str {
        BACKEND
    }

    async fn open(&self) -> StorageResult<Arc<dyn Connection>> {
        Ok(Arc::new(MongoConnection {
            database: self.database.clone(),
        }))
    }
}

/// Connection over a MongoDB database handle
#[derive(Clone, Debug)]
pub struct MongoConnection {
    database: Database,
}

impl MongoConnection {
    fn collection(&self, name: &str) -> mongodb::Collection<bson::Document> {
        self.database.collection(name)
    }

    async fn find(
        &self,
        collection: &str,
        query: &QueryDescriptor,
        projection: Option<bson::Document>,
    ) -> StorageResult<Vec<bson::Document>> {
        let mut find = self
            .collection(collection)
            .find(to_bson_document(&query.filter)?);
        if let Some(sort) = &query.sort {
            find = find.sort(to_bson_document(sort)?);
        }
        if let Some(offset) = query.offset {
            find = find.skip(offset);
        }
        if let Some(limit) = query.limit {
            find = find.limit(i64::try_from(limit).unwrap_or(i64::MAX));
        }
        if let Some(projection) = projection {
            find = find.projection(projection);
        }

        let cursor = find.await.map_err(|e| driver_error("query documents", e))?;
        cursor
            .try_collect()
            .await
            .map_err(|e| driver_error("collect documents", e))
    }

    /// Filter selecting the documents a bulk operation applies to
    async fn bulk_filter(
        &self,
        collection: &str,
        query: &QueryDescriptor,
    ) -> StorageResult<bson::Document> {
        if query.sort.is_none() && query.offset.is_none() && query.limit.is_none() {
            return to_bson_document(&query.filter);
        }
        let ids: Vec<Bson> = self
            .find(collection, query, Some(doc! { ID_FIELD: 1 }))
            .await?
            .into_iter()
            .filter_map(|mut d| d.remove(ID_FIELD))
            .collect();
        Ok(doc! { ID_FIELD: { "$in": ids } })
    }
}

#[async_trait]
impl Connection for MongoConnection {
    async fn insert_one(&self, collection: &str, mut document: Document) -> StorageResult<Document> {
        let id = document_id(&document).unwrap_or_else(|| Uuid::new_v4().to_string());
        document.insert(ID_FIELD.to_string(), Value::String(id));

        self.collection(collection)
            .insert_one(to_bson_document(&document)?)
            .await
            .map_err(|e| driver_error("insert document", e))?;
        Ok(document)
    }

    async fn get_one(&self, collection: &str, id: &str) -> StorageResult<Document> {
        self.collection(collection)
            .find_one(by_id(id))
            .await
            .map_err(|e| driver_error("get document", e))?
            .map(from_bson_document)
            .ok_or_else(|| StorageError::not_found(collection, id))
    }

    async fn get_many(
        &self,
        collection: &str,
        query: &QueryDescriptor,
    ) -> StorageResult<Vec<Document>> {
        let projection = query.projection.as_ref().map(to_bson_document).transpose()?;
        Ok(self
            .find(collection, query, projection)
            .await?
            .into_iter()
            .map(from_bson_document)
            .collect())
    }

    async fn replace_one(
        &self,
        collection: &str,
        id: &str,
        mut document: Document,
    ) -> StorageResult<Document> {
        document.insert(ID_FIELD.to_string(), Value::String(id.to_string()));
        self.collection(collection)
            .find_one_and_replace(by_id(id), to_bson_document(&document)?)
            .return_document(ReturnDocument::After)
            .await
            .map_err(|e| driver_error("replace document", e))?
            .map(from_bson_document)
            .ok_or_else(|| StorageError::not_found(collection, id))
    }

    async fn update_one(
        &self,
        collection: &str,
        id: &str,
        patch: Document,
    ) -> StorageResult<Document> {
        self.collection(collection)
            .find_one_and_update(by_id(id), update_document(patch)?)
            .return_document(ReturnDocument::After)
            .await
            .map_err(|e| driver_error("update document", e))?
            .map(from_bson_document)
            .ok_or_else(|| StorageError::not_found(collection, id))
    }

    async fn update_many(
        &self,
        collection: &str,
        patch: Document,
        query: &QueryDescriptor,
    ) -> StorageResult<u64> {
        let filter = self.bulk_filter(collection, query).await?;
        let result = self
            .collection(collection)
            .update_many(filter, update_document(patch)?)
            .await
            .map_err(|e| driver_error("update documents", e))?;
        Ok(result.matched_count)
    }

    async fn remove_one(&self, collection: &str, id: &str) -> StorageResult<Document> {
        self.collection(collection)
            .find_one_and_delete(by_id(id))
            .await
            .map_err(|e| driver_error("delete document", e))?
            .map(from_bson_document)
            .ok_or_else(|| StorageError::not_found(collection, id))
    }

    async fn remove_many(&self, collection: &str, query: &QueryDescriptor) -> StorageResult<u64> {
        let filter = self.bulk_filter(collection, query).await?;
        let result = self
            .collection(collection)
            .delete_many(filter)
            .await
            .map_err(|e| driver_error("delete documents", e))?;
        Ok(result.deleted_count)
    }
}
