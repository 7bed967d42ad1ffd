//! Storage backend abstraction.
//!
//! This module defines the traits that abstract over the document store the mapper
//! talks to, so the same schemas and queries run against the official MongoDB driver
//! or the in-memory store used in development and tests.
//!
//! # Overview
//!
//! The [`StoreBackend`] trait receives fully rendered MongoDB-style wire documents:
//! the query builder has already folded selectors, modifiers and cursor steps into
//! a [`FindSpec`] or a filter/update pair. Backends only evaluate them.
//!
//! # Traits
//!
//! - [`StoreBackend`]: The core trait for storage backends
//! - [`StoreBackendBuilder`]: Factory trait for creating backend instances
//!
//! # Examples
//!
//! ```ignore
//! use odmlayer::backend::{FindSpec, StoreBackend};
//! use bson::doc;
//!
//! let spec = FindSpec::new(doc! { "age": { "$gt": 18 } }).sort(vec![("age".into(), -1)]).limit(10);
//! let rows = backend.find("users", &spec).await?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use async_trait::async_trait;
use bson::{Bson, Document, doc};
use std::fmt::Debug;

use crate::{config::SafeMode, error::StoreResult};

/// Folded configuration of a read cursor.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindSpec {
    /// Query document.
    pub filter: Document,
    /// Inclusion or exclusion projection.
    pub projection: Option<Document>,
    /// Sort keys with their direction (`1` or `-1`), most significant first.
    pub sort: Vec<(String, i32)>,
    pub skip: u64,
    pub limit: Option<u64>,
}

impl FindSpec {
    pub fn new(filter: Document) -> Self {
        FindSpec {
            filter,
            ..Default::default()
        }
    }

    pub fn projection(mut self, projection: Option<Document>) -> Self {
        self.projection = projection;
        self
    }

    /// Appends sort keys.
    pub fn sort(mut self, keys: Vec<(String, i32)>) -> Self {
        self.sort.extend(keys);
        self
    }

    pub fn skip(mut self, skip: u64) -> Self {
        self.skip = skip;
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Flags of an update operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpdateFlags {
    /// Update every matching document instead of the first one.
    pub multi: bool,
    /// Insert a document when nothing matches.
    pub upsert: bool,
}

impl Default for UpdateFlags {
    fn default() -> Self {
        UpdateFlags {
            multi: true,
            upsert: false,
        }
    }
}

/// Acknowledgement of a write.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteAck {
    /// Whether the store confirmed the write.
    pub acknowledged: bool,
    /// Number of documents matched or removed.
    pub n: u64,
    /// Whether an update touched an existing document.
    pub updated_existing: bool,
    /// Identity of the document inserted by an upsert.
    pub upserted: Option<Bson>,
}

impl WriteAck {
    /// Raw acknowledgement document in the shape of `getLastError`.
    pub fn to_document(&self) -> Document {
        let ok = if self.acknowledged { 1.0 } else { 0.0 };
        let n = self.n as i64;
        let mut ack = doc! {
            "ok": ok,
            "n": n,
            "updatedExisting": self.updated_existing,
        };
        if let Some(upserted) = &self.upserted {
            ack.insert("upserted", upserted.clone());
        }
        ack
    }
}

/// Abstract interface for document storage backends.
///
/// Implementers receive wire documents rendered by the query builder and are
/// responsible for evaluating them. All failures are reported as
/// [`StoreError`](crate::error::StoreError) and surface to callers unmodified.
///
/// # Thread Safety
///
/// All implementations must be thread-safe and support concurrent access from multiple
/// async tasks.
#[async_trait]
pub trait StoreBackend: Send + Sync + Debug {
    /// Runs a query and returns every matching document.
    ///
    /// # Arguments
    ///
    /// * `collection` - The name of the collection to query
    /// * `spec` - Filter, projection, sort, skip and limit
    async fn find(&self, collection: &str, spec: &FindSpec) -> StoreResult<Vec<Document>>;

    /// Counts the documents matching `filter`, ignoring any skip or limit.
    async fn count(&self, collection: &str, filter: &Document) -> StoreResult<u64>;

    /// Inserts one document and returns its identity.
    ///
    /// Backends generate an identity when the document carries none.
    ///
    /// # Arguments
    ///
    /// * `collection` - The name of the collection. Created automatically if it doesn't exist.
    /// * `document` - The document to insert
    /// * `safe` - Acknowledged-write policy of this call
    async fn insert(
        &self,
        collection: &str,
        document: Document,
        safe: &SafeMode,
    ) -> StoreResult<Bson>;

    /// Applies update operators to the documents matching `filter`.
    ///
    /// # Arguments
    ///
    /// * `collection` - The name of the collection
    /// * `filter` - Query document selecting the documents to update
    /// * `update` - Update operators, e.g. `{"$set": {"name": "bob"}}`
    /// * `flags` - `multi` and `upsert`
    /// * `safe` - Acknowledged-write policy of this call
    async fn update(
        &self,
        collection: &str,
        filter: Document,
        update: Document,
        flags: UpdateFlags,
        safe: &SafeMode,
    ) -> StoreResult<WriteAck>;

    /// Removes every document matching `filter`. An empty filter removes everything.
    async fn remove(
        &self,
        collection: &str,
        filter: Document,
        safe: &SafeMode,
    ) -> StoreResult<WriteAck>;

    /// Cleanly shuts down the backend, releasing all resources.
    ///
    /// The default implementation is a no-op, but backends with external
    /// connections should override this.
    async fn shutdown(self) -> StoreResult<()>
    where
        Self: Sized,
    {
        Ok(())
    }
}

#[async_trait]
impl<B> StoreBackend for &B
where
    B: StoreBackend,
{
    async fn find(&self, collection: &str, spec: &FindSpec) -> StoreResult<Vec<Document>> {
        (*self).find(collection, spec).await
    }

    async fn count(&self, collection: &str, filter: &Document) -> StoreResult<u64> {
        (*self).count(collection, filter).await
    }

    async fn insert(
        &self,
        collection: &str,
        document: Document,
        safe: &SafeMode,
    ) -> StoreResult<Bson> {
        (*self).insert(collection, document, safe).await
    }

    async fn update(
        &self,
        collection: &str,
        filter: Document,
        update: Document,
        flags: UpdateFlags,
        safe: &SafeMode,
    ) -> StoreResult<WriteAck> {
        (*self)
            .update(collection, filter, update, flags, safe)
            .await
    }

    async fn remove(
        &self,
        collection: &str,
        filter: Document,
        safe: &SafeMode,
    ) -> StoreResult<WriteAck> {
        (*self).remove(collection, filter, safe).await
    }
}

#[async_trait]
pub trait StoreBackendBuilder {
    type Backend: StoreBackend;

    async fn build(self) -> StoreResult<Self::Backend>;
}
