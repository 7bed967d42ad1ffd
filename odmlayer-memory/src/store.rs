//! In-memory storage implementation for document stores.
//!
//! This module provides a simple in-memory backend that keeps every collection
//! as an insertion-ordered list of BSON documents behind an async-safe
//! read-write lock, and evaluates the wire documents rendered by the query
//! builder against them.

use async_trait::async_trait;
use bson::{Bson, Document, oid::ObjectId};
use log::debug;
use mea::rwlock::RwLock;
use std::{collections::HashMap, sync::Arc};

use odmlayer_core::{
    backend::{FindSpec, StoreBackend, StoreBackendBuilder, UpdateFlags, WriteAck},
    config::SafeMode,
    error::{StoreError, StoreResult},
};

use crate::evaluator::{
    DocumentEvaluator, apply_set_on_insert, apply_update, compare_rows, project, upsert_seed,
};

type Collection = Vec<Document>;
type StoreMap = HashMap<String, Collection>;

/// Thread-safe in-memory document storage backend.
///
/// This struct implements the [`StoreBackend`] trait to provide a fully functional
/// document store that operates entirely in memory using async-aware read-write locks.
///
/// # Thread Safety
///
/// `InMemoryStore` is cloneable and uses an `Arc`-wrapped internal state, allowing
/// it to be safely shared across async tasks. Multiple clones of the same instance
/// share the same underlying data.
///
/// # Performance
///
/// Queries scan all documents in a collection (no indexing). For small to medium
/// datasets this is typically acceptable. For larger datasets, use the MongoDB
/// backend.
///
/// # Example
///
/// ```ignore
/// use odmlayer_memory::InMemoryStore;
/// use odmlayer::backend::{FindSpec, StoreBackend};
/// use bson::doc;
///
/// let store = InMemoryStore::new();
/// store.insert("users", doc! { "name": "Alice", "age": 30 }, &true.into()).await?;
///
/// let rows = store.find("users", &FindSpec::new(doc! { "age": { "$gt": 18 } })).await?;
/// assert_eq!(rows.len(), 1);
/// ```
#[derive(Default, Clone, Debug)]
pub struct InMemoryStore {
    /// collection_name -> rows in insertion order
    store: Arc<RwLock<StoreMap>>,
}

impl InMemoryStore {
    /// Creates a new empty in-memory document store.
    pub fn new() -> Self {
        Self {
            store: Arc::new(RwLock::new(StoreMap::new())),
        }
    }

    /// Creates a builder for constructing an `InMemoryStore`.
    ///
    /// ```ignore
    /// let store = InMemoryStore::builder().build().await?;
    /// ```
    pub fn builder() -> InMemoryStoreBuilder {
        InMemoryStoreBuilder::default()
    }

    /// Names of the collections that received at least one write.
    pub async fn list_collections(&self) -> Vec<String> {
        self.store.read().await.keys().cloned().collect()
    }

    /// Drops every row of `collection`.
    pub async fn drop_collection(&self, collection: &str) {
        self.store.write().await.remove(collection);
    }
}

fn ack(safe: &SafeMode, n: u64, updated_existing: bool, upserted: Option<Bson>) -> WriteAck {
    WriteAck {
        acknowledged: safe.enabled,
        n,
        updated_existing,
        upserted,
    }
}

#[async_trait]
impl StoreBackend for InMemoryStore {
    async fn find(&self, collection: &str, spec: &FindSpec) -> StoreResult<Vec<Document>> {
        let store = self.store.read().await;
        let rows = match store.get(collection) {
            Some(rows) => rows,
            None => return Ok(vec![]),
        };

        let mut matched = DocumentEvaluator::filter_documents(rows, &spec.filter)?;
        if !spec.sort.is_empty() {
            matched.sort_by(|a, b| compare_rows(a, b, &spec.sort));
        }

        Ok(matched
            .into_iter()
            .skip(spec.skip as usize)
            .take(spec.limit.map_or(usize::MAX, |limit| limit as usize))
            .map(|row| match &spec.projection {
                Some(projection) => project(row, projection),
                None => row.clone(),
            })
            .collect())
    }

    async fn count(&self, collection: &str, filter: &Document) -> StoreResult<u64> {
        let store = self.store.read().await;
        match store.get(collection) {
            Some(rows) => Ok(DocumentEvaluator::filter_documents(rows, filter)?.len() as u64),
            None => Ok(0),
        }
    }

    async fn insert(
        &self,
        collection: &str,
        mut document: Document,
        _safe: &SafeMode,
    ) -> StoreResult<Bson> {
        let id = match document.get("_id") {
            Some(id) if !matches!(id, Bson::Null) => id.clone(),
            _ => {
                let id = Bson::ObjectId(ObjectId::new());
                let mut with_id = Document::new();
                with_id.insert("_id", id.clone());
                for (key, value) in document {
                    if key != "_id" {
                        with_id.insert(key, value);
                    }
                }
                document = with_id;
                id
            }
        };

        let mut store = self.store.write().await;
        let rows = store.entry(collection.to_string()).or_default();
        if rows.iter().any(|row| row.get("_id") == Some(&id)) {
            return Err(StoreError::Backend(format!(
                "E11000 duplicate key error collection: {collection} _id: {id}"
            )));
        }

        debug!("Inserted {id} into \"{collection}\"");
        rows.push(document);
        Ok(id)
    }

    async fn update(
        &self,
        collection: &str,
        filter: Document,
        update: Document,
        flags: UpdateFlags,
        safe: &SafeMode,
    ) -> StoreResult<WriteAck> {
        let mut store = self.store.write().await;
        let rows = store.entry(collection.to_string()).or_default();

        let mut n = 0;
        for row in rows.iter_mut() {
            if !DocumentEvaluator::new(row).matches(&filter)? {
                continue;
            }

            let mut updated = row.clone();
            apply_update(&mut updated, &update)?;
            if updated.get("_id") != row.get("_id") {
                return Err(StoreError::Backend(format!(
                    "Cannot change the _id of a document in \"{collection}\""
                )));
            }
            *row = updated;
            n += 1;
            if !flags.multi {
                break;
            }
        }

        if n > 0 || !flags.upsert {
            return Ok(ack(safe, n, n > 0, None));
        }

        let mut seeded = upsert_seed(&filter);
        apply_update(&mut seeded, &update)?;
        apply_set_on_insert(&mut seeded, &update)?;
        let id = match seeded.get("_id") {
            Some(id) => id.clone(),
            None => {
                let id = Bson::ObjectId(ObjectId::new());
                seeded.insert("_id", id.clone());
                id
            }
        };
        if rows.iter().any(|row| row.get("_id") == Some(&id)) {
            return Err(StoreError::Backend(format!(
                "E11000 duplicate key error collection: {collection} _id: {id}"
            )));
        }

        debug!("Upserted {id} into \"{collection}\"");
        rows.push(seeded);
        Ok(ack(safe, 1, false, Some(id)))
    }

    async fn remove(
        &self,
        collection: &str,
        filter: Document,
        safe: &SafeMode,
    ) -> StoreResult<WriteAck> {
        let mut store = self.store.write().await;
        let rows = match store.get_mut(collection) {
            Some(rows) => rows,
            None => return Ok(ack(safe, 0, false, None)),
        };

        let mut kept = Vec::with_capacity(rows.len());
        let mut n = 0;
        for row in rows.drain(..) {
            if DocumentEvaluator::new(&row).matches(&filter)? {
                n += 1;
            } else {
                kept.push(row);
            }
        }
        *rows = kept;
        Ok(ack(safe, n, false, None))
    }
}

/// Builder for constructing [`InMemoryStore`] instances.
///
/// ```ignore
/// use odmlayer_memory::InMemoryStore;
/// use odmlayer::backend::StoreBackendBuilder;
///
/// let store = InMemoryStore::builder().build().await?;
/// ```
#[derive(Default)]
pub struct InMemoryStoreBuilder;

#[async_trait]
impl StoreBackendBuilder for InMemoryStoreBuilder {
    type Backend = InMemoryStore;

    /// Always succeeds and returns a freshly initialized store.
    async fn build(self) -> StoreResult<Self::Backend> {
        Ok(InMemoryStore::new())
    }
}
