//! Storage traits consumed by the dispatcher
//!
//! A [`Datastore`] is a factory for [`Connection`]s. The dispatcher opens a
//! connection per request through the shared [`DatastoreHandle`], which the
//! host can repoint at a new datastore at runtime with
//! [`DatastoreHandle::reconfigure`].
//!
//! The framework is agnostic to the underlying storage mechanism: every
//! primitive takes a collection name plus a document, an id, or a
//! [`QueryDescriptor`].

use crate::core::document::Document;
use crate::core::error::StorageError;
use crate::core::query::QueryDescriptor;
use async_trait::async_trait;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

/// Result type for storage primitives
pub type StorageResult<T> = Result<T, StorageError>;

/// Factory for storage connections
#[async_trait]
pub trait Datastore: Send + Sync {
    /// Backend name used in logs
    fn name(&self) -> &'static str;

    /// Open (or reuse) a connection
    async fn open(&self) -> StorageResult<Arc<dyn Connection>>;
}

/// CRUD primitives on schemaless documents
#[async_trait]
pub trait Connection: Send + Sync {
    /// Insert a document, assigning an `_id` when it has none
    async fn insert_one(&self, collection: &str, document: Document) -> StorageResult<Document>;

    /// Fetch one document by id
    async fn get_one(&self, collection: &str, id: &str) -> StorageResult<Document>;

    /// Fetch every document matching the descriptor
    async fn get_many(
        &self,
        collection: &str,
        query: &QueryDescriptor,
    ) -> StorageResult<Vec<Document>>;

    /// Replace a whole document, keeping its id
    async fn replace_one(
        &self,
        collection: &str,
        id: &str,
        document: Document,
    ) -> StorageResult<Document>;

    /// Apply a patch to one document and return the updated document
    async fn update_one(&self, collection: &str, id: &str, patch: Document)
    -> StorageResult<Document>;

    /// Apply a patch to every matching document, returning how many matched
    async fn update_many(
        &self,
        collection: &str,
        patch: Document,
        query: &QueryDescriptor,
    ) -> StorageResult<u64>;

    /// Remove one document and return it
    async fn remove_one(&self, collection: &str, id: &str) -> StorageResult<Document>;

    /// Remove every matching document, returning how many were removed
    async fn remove_many(&self, collection: &str, query: &QueryDescriptor) -> StorageResult<u64>;
}

/// Shared, swappable reference to the active datastore
#[derive(Clone)]
pub struct DatastoreHandle {
    inner: Arc<RwLock<Arc<dyn Datastore>>>,
}

impl fmt::Debug for DatastoreHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatastoreHandle")
            .field("backend", &self.current().name())
            .finish()
    }
}

impl DatastoreHandle {
    pub fn new(datastore: Arc<dyn Datastore>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(datastore)),
        }
    }

    /// The datastore in use right now
    pub fn current(&self) -> Arc<dyn Datastore> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Swap in a new datastore; requests already in flight keep the old one
    pub fn reconfigure(&self, datastore: Arc<dyn Datastore>) {
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        tracing::info!(from = guard.name(), to = datastore.name(), "datastore reconfigured");
        *guard = datastore;
    }

    /// Open a connection on the current datastore
    pub async fn open(&self) -> StorageResult<Arc<dyn Connection>> {
        let datastore = self.current();
        datastore.open().await
    }
}
