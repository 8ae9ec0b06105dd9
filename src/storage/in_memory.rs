//! In-memory datastore for testing and development

use super::filter;
use crate::core::document::{Document, ID_FIELD, document_id};
use crate::core::error::StorageError;
use crate::core::query::QueryDescriptor;
use crate::core::service::{Connection, Datastore, StorageResult};
use async_trait::async_trait;
use indexmap::IndexMap;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use uuid::Uuid;

type Collections = HashMap<String, IndexMap<String, Document>>;

const BACKEND: &str = "memory";

/// In-memory datastore
///
/// Every `open` returns the same shared connection, so data survives for
/// the lifetime of the datastore. Documents keep insertion order.
#[derive(Clone, Default)]
pub struct InMemoryDatastore {
    connection: Arc<InMemoryConnection>,
}

impl InMemoryDatastore {
    /// Create a new in-memory datastore
    pub fn new() -> Self {
        Self::default()
    }

    /// Direct access to the shared connection
    pub fn connection(&self) -> Arc<InMemoryConnection> {
        self.connection.clone()
    }
}

#[async_trait]
impl Datastore for InMemoryDatastore {
    fn name(&self) -> &'static str {
        BACKEND
    }

    async fn open(&self) -> StorageResult<Arc<dyn Connection>> {
        Ok(self.connection.clone())
    }
}

/// Connection over `RwLock`ed collections
#[derive(Default)]
pub struct InMemoryConnection {
    collections: RwLock<Collections>,
}

impl InMemoryConnection {
    /// Number of documents stored in a collection
    pub fn count(&self, collection: &str) -> StorageResult<usize> {
        Ok(self.read()?.get(collection).map_or(0, IndexMap::len))
    }

    fn read(&self) -> StorageResult<RwLockReadGuard<'_, Collections>> {
        self.collections
            .read()
            .map_err(|e| StorageError::backend(BACKEND, format!("Failed to acquire read lock: {}", e)))
    }

    fn write(&self) -> StorageResult<RwLockWriteGuard<'_, Collections>> {
        self.collections
            .write()
            .map_err(|e| StorageError::backend(BACKEND, format!("Failed to acquire write lock: {}", e)))
    }
}

/// Ids of matching documents after sort, offset and limit
fn select_ids(documents: &IndexMap<String, Document>, query: &QueryDescriptor) -> Vec<String> {
    let mut matching: Vec<Document> = documents
        .values()
        .filter(|doc| filter::matches(doc, &query.filter))
        .cloned()
        .collect();

    if let Some(sort) = &query.sort {
        filter::sort_documents(&mut matching, sort);
    }

    window(matching.iter(), query)
        .filter_map(document_id)
        .collect()
}

fn window<'a>(
    documents: impl Iterator<Item = &'a Document>,
    query: &QueryDescriptor,
) -> impl Iterator<Item = &'a Document> {
    let offset = query.offset.unwrap_or(0) as usize;
    let limit = query.limit.map_or(usize::MAX, |l| l as usize);
    documents.skip(offset).take(limit)
}

#[async_trait]
impl Connection for InMemoryConnection {
    async fn insert_one(&self, collection: &str, mut document: Document) -> StorageResult<Document> {
        let id = document_id(&document).unwrap_or_else(|| Uuid::new_v4().to_string());
        document.insert(ID_FIELD.to_string(), Value::String(id.clone()));

        let mut collections = self.write()?;
        let documents = collections.entry(collection.to_string()).or_default();
        if documents.contains_key(&id) {
            return Err(StorageError::backend(
                BACKEND,
                format!("duplicate _id '{}' in collection '{}'", id, collection),
            ));
        }
        documents.insert(id, document.clone());
        Ok(document)
    }

    async fn get_one(&self, collection: &str, id: &str) -> StorageResult<Document> {
        self.read()?
            .get(collection)
            .and_then(|documents| documents.get(id))
            .cloned()
            .ok_or_else(|| StorageError::not_found(collection, id))
    }

    async fn get_many(
        &self,
        collection: &str,
        query: &QueryDescriptor,
    ) -> StorageResult<Vec<Document>> {
        let collections = self.read()?;
        let Some(documents) = collections.get(collection) else {
            return Ok(Vec::new());
        };

        let ids = select_ids(documents, query);
        Ok(ids
            .iter()
            .filter_map(|id| documents.get(id))
            .cloned()
            .map(|doc| match &query.projection {
                Some(projection) => filter::project(doc, projection),
                None => doc,
            })
            .collect())
    }

    async fn replace_one(
        &self,
        collection: &str,
        id: &str,
        mut document: Document,
    ) -> StorageResult<Document> {
        let mut collections = self.write()?;
        let stored = collections
            .get_mut(collection)
            .and_then(|documents| documents.get_mut(id))
            .ok_or_else(|| StorageError::not_found(collection, id))?;

        document.insert(ID_FIELD.to_string(), Value::String(id.to_string()));
        *stored = document.clone();
        Ok(document)
    }

    async fn update_one(
        &self,
        collection: &str,
        id: &str,
        patch: Document,
    ) -> StorageResult<Document> {
        let mut collections = self.write()?;
        let stored = collections
            .get_mut(collection)
            .and_then(|documents| documents.get_mut(id))
            .ok_or_else(|| StorageError::not_found(collection, id))?;

        let mut updated = stored.clone();
        filter::apply_update(&mut updated, &patch)?;
        *stored = updated.clone();
        Ok(updated)
    }

    async fn update_many(
        &self,
        collection: &str,
        patch: Document,
        query: &QueryDescriptor,
    ) -> StorageResult<u64> {
        let mut collections = self.write()?;
        let Some(documents) = collections.get_mut(collection) else {
            return Ok(0);
        };

        let ids = select_ids(documents, query);
        // Apply to copies first so a failing update leaves the collection untouched
        let mut updated = Vec::with_capacity(ids.len());
        for id in &ids {
            if let Some(doc) = documents.get(id) {
                let mut doc = doc.clone();
                filter::apply_update(&mut doc, &patch)?;
                updated.push((id.clone(), doc));
            }
        }

        let count = updated.len() as u64;
        for (id, doc) in updated {
            documents.insert(id, doc);
        }
        Ok(count)
    }

    async fn remove_one(&self, collection: &str, id: &str) -> StorageResult<Document> {
        self.write()?
            .get_mut(collection)
            .and_then(|documents| documents.shift_remove(id))
            .ok_or_else(|| StorageError::not_found(collection, id))
    }

    async fn remove_many(&self, collection: &str, query: &QueryDescriptor) -> StorageResult<u64> {
        let mut collections = self.write()?;
        let Some(documents) = collections.get_mut(collection) else {
            return Ok(0);
        };

        let ids = select_ids(documents, query);
        let count = ids
            .iter()
            .filter(|id| documents.shift_remove(id.as_str()).is_some())
            .count();
        Ok(count as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    fn descriptor(value: Value) -> QueryDescriptor {
        serde_json::from_value(value).unwrap()
    }

    async fn seeded() -> Arc<dyn Connection> {
        let conn = InMemoryDatastore::new().open().await.unwrap();
        for (id, year) in [("a", 1965), ("b", 1951), ("c", 1984), ("d", 1932)] {
            conn.insert_one("books", doc(json!({"_id": id, "year": year, "kind": "novel"})))
                .await
                .unwrap();
        }
        conn
    }

    #[tokio::test]
    async fn test_insert_assigns_uuid() {
        let conn = InMemoryDatastore::new().open().await.unwrap();
        let stored = conn
            .insert_one("books", doc(json!({"title": "Dune"})))
            .await
            .unwrap();
        let id = stored["_id"].as_str().unwrap();
        assert!(Uuid::parse_str(id).is_ok());
        assert_eq!(conn.get_one("books", id).await.unwrap()["title"], "Dune");
    }

    #[tokio::test]
    async fn test_duplicate_id_is_rejected() {
        let conn = seeded().await;
        let err = conn
            .insert_one("books", doc(json!({"_id": "a"})))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Backend { .. }));
    }

    #[tokio::test]
    async fn test_missing_documents_are_not_found() {
        let conn = seeded().await;
        for result in [
            conn.get_one("books", "zz").await,
            conn.get_one("ghosts", "a").await,
            conn.replace_one("books", "zz", Document::new()).await,
            conn.update_one("books", "zz", Document::new()).await,
            conn.remove_one("books", "zz").await,
        ] {
            assert!(matches!(result, Err(StorageError::NotFound { .. })));
        }
    }

    #[tokio::test]
    async fn test_get_many_applies_descriptor() {
        let conn = seeded().await;
        let found = conn
            .get_many(
                "books",
                &descriptor(json!({
                    "filter": {"year": {"$gt": 1940}},
                    "sort": {"year": -1},
                    "offset": 1,
                    "limit": 1,
                    "projection": {"year": 1}
                })),
            )
            .await
            .unwrap();
        assert_eq!(found, vec![doc(json!({"_id": "a", "year": 1965}))]);

        let none = conn.get_many("ghosts", &QueryDescriptor::default()).await.unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn test_replace_keeps_id() {
        let conn = seeded().await;
        let replaced = conn
            .replace_one("books", "a", doc(json!({"_id": "other", "title": "Dune"})))
            .await
            .unwrap();
        assert_eq!(Value::Object(replaced), json!({"_id": "a", "title": "Dune"}));
        assert!(conn.get_one("books", "a").await.unwrap().get("year").is_none());
    }

    #[tokio::test]
    async fn test_update_one_and_many() {
        let conn = seeded().await;
        let updated = conn
            .update_one("books", "b", doc(json!({"$inc": {"year": 1}})))
            .await
            .unwrap();
        assert_eq!(updated["year"], 1952);

        let count = conn
            .update_many(
                "books",
                doc(json!({"classic": true})),
                &descriptor(json!({"filter": {"year": {"$lt": 1960}}})),
            )
            .await
            .unwrap();
        assert_eq!(count, 2);
        assert_eq!(conn.get_one("books", "d").await.unwrap()["classic"], true);
        assert!(conn.get_one("books", "c").await.unwrap().get("classic").is_none());
    }

    #[tokio::test]
    async fn test_update_many_counts_unchanged_matches() {
        let conn = seeded().await;
        let patch = json!({"classic": true});
        let query = descriptor(json!({"filter": {"year": {"$lt": 1960}}}));

        conn.update_many("books", doc(patch.clone()), &query).await.unwrap();
        let again = conn.update_many("books", doc(patch), &query).await.unwrap();
        assert_eq!(again, 2);
    }

    #[tokio::test]
    async fn test_failed_update_many_changes_nothing() {
        let conn = seeded().await;
        conn.update_one("books", "c", doc(json!({"kind": 1})))
            .await
            .unwrap();
        let result = conn
            .update_many(
                "books",
                doc(json!({"$inc": {"kind": 1}})),
                &QueryDescriptor::default(),
            )
            .await;
        assert!(result.is_err());
        assert_eq!(conn.get_one("books", "c").await.unwrap()["kind"], 1);
    }

    #[tokio::test]
    async fn test_remove_many_respects_limit() {
        let datastore = InMemoryDatastore::new();
        let conn = datastore.open().await.unwrap();
        for i in 0..8 {
            conn.insert_one("logs", doc(json!({"n": i}))).await.unwrap();
        }
        let removed = conn
            .remove_many("logs", &QueryDescriptor::default().with_limit(5))
            .await
            .unwrap();
        assert_eq!(removed, 5);
        assert_eq!(datastore.connection().count("logs").unwrap(), 3);

        let first = conn
            .get_many("logs", &QueryDescriptor::default())
            .await
            .unwrap()
            .remove(0);
        let id = document_id(&first).unwrap();
        let removed = conn.remove_one("logs", &id).await.unwrap();
        assert_eq!(removed["n"], 5);
    }
}
