//! Collection handles and read cursors.
//!
//! A [`CollectionHandle`] names one collection of a backend. Reads go through a
//! [`Cursor`], configured step by step (`sort`, `skip`, `limit`) without any I/O,
//! then drained with [`Cursor::next`] or [`Cursor::fetch_all`]. Rows are fetched
//! once and buffered until the cursor is rewound.
//!
//! # Example
//!
//! ```ignore
//! let users = db.model("User")?.collection();
//! let mut cursor = users
//!     .find(doc! { "age": { "$gt": 18 } }, None)
//!     .sort(vec![("age".into(), -1)])
//!     .limit(10);
//!
//! while let Some(row) = cursor.next().await? {
//!     println!("{row}");
//! }
//! ```

use bson::{Bson, Document};
use std::collections::VecDeque;

use crate::{
    backend::{FindSpec, StoreBackend, UpdateFlags, WriteAck},
    config::SafeMode,
    error::StoreResult,
};

/// One collection of a storage backend.
///
/// # Type Parameters
///
/// * `'a` - Lifetime of the backend reference
/// * `B` - The storage backend type
#[derive(Debug)]
pub struct CollectionHandle<'a, B: StoreBackend> {
    name: String,
    backend: &'a B,
}

impl<B: StoreBackend> Clone for CollectionHandle<'_, B> {
    fn clone(&self) -> Self {
        CollectionHandle {
            name: self.name.clone(),
            backend: self.backend,
        }
    }
}

impl<'a, B: StoreBackend> CollectionHandle<'a, B> {
    pub(crate) fn new(name: impl Into<String>, backend: &'a B) -> Self {
        Self {
            name: name.into(),
            backend,
        }
    }

    /// Returns the name of this collection.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Opens a cursor over the documents matching `filter`. No I/O happens here.
    pub fn find(&self, filter: Document, projection: Option<Document>) -> Cursor<'a, B> {
        Cursor {
            collection: self.clone(),
            spec: FindSpec::new(filter).projection(projection),
            rows: None,
        }
    }

    /// Counts the documents matching `filter`.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`](crate::error::StoreError) if the operation fails.
    pub async fn count(&self, filter: &Document) -> StoreResult<u64> {
        self.backend.count(&self.name, filter).await
    }

    /// Inserts one document and returns its identity.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`](crate::error::StoreError) if the operation fails.
    pub async fn insert(&self, document: Document, safe: &SafeMode) -> StoreResult<Bson> {
        self.backend.insert(&self.name, document, safe).await
    }

    /// Applies update operators to the documents matching `filter`.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`](crate::error::StoreError) if the operation fails.
    pub async fn update(
        &self,
        filter: Document,
        update: Document,
        flags: UpdateFlags,
        safe: &SafeMode,
    ) -> StoreResult<WriteAck> {
        self.backend
            .update(&self.name, filter, update, flags, safe)
            .await
    }

    /// Removes the documents matching `filter`.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`](crate::error::StoreError) if the operation fails.
    pub async fn remove(&self, filter: Document, safe: &SafeMode) -> StoreResult<WriteAck> {
        self.backend.remove(&self.name, filter, safe).await
    }
}

/// A lazily executed read over one collection.
#[derive(Debug)]
pub struct Cursor<'a, B: StoreBackend> {
    collection: CollectionHandle<'a, B>,
    spec: FindSpec,
    rows: Option<VecDeque<Document>>,
}

impl<'a, B: StoreBackend> Cursor<'a, B> {
    /// Appends sort keys.
    pub fn sort(mut self, keys: Vec<(String, i32)>) -> Self {
        self.spec = self.spec.sort(keys);
        self
    }

    pub fn skip(mut self, skip: u64) -> Self {
        self.spec = self.spec.skip(skip);
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.spec = self.spec.limit(limit);
        self
    }

    pub fn spec(&self) -> &FindSpec {
        &self.spec
    }

    pub fn collection(&self) -> &CollectionHandle<'a, B> {
        &self.collection
    }

    /// Counts the documents matching the cursor's filter.
    pub async fn count(&self) -> StoreResult<u64> {
        self.collection.count(&self.spec.filter).await
    }

    async fn load(&mut self) -> StoreResult<&mut VecDeque<Document>> {
        if self.rows.is_none() {
            let rows = self
                .collection
                .backend
                .find(&self.collection.name, &self.spec)
                .await?;
            self.rows = Some(rows.into());
        }
        Ok(self.rows.get_or_insert_with(VecDeque::new))
    }

    /// Returns the next row, running the query on first use.
    pub async fn next(&mut self) -> StoreResult<Option<Document>> {
        Ok(self.load().await?.pop_front())
    }

    /// Drains every remaining row.
    pub async fn fetch_all(&mut self) -> StoreResult<Vec<Document>> {
        Ok(self.load().await?.drain(..).collect())
    }

    /// Forgets the fetched rows; the next read runs the query again.
    pub fn rewind(&mut self) {
        self.rows = None;
    }
}
