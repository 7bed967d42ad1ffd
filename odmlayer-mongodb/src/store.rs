//! MongoDB-backed implementation of [`StoreBackend`].
//!
//! Wire documents rendered by the query builder are passed to the driver as is,
//! apart from legacy update operators (see [`server_update`]). Cursor steps
//! become [`FindOptions`] and the acknowledged-write policy becomes a
//! [`WriteConcern`].

use async_trait::async_trait;
use bson::{Bson, Document, doc};
use futures::TryStreamExt;
use log::debug;
use mongodb::{
    Client, Collection as MongoCollection,
    action::Action,
    options::{Acknowledgment, ClientOptions, FindOptions, WriteConcern},
};
use std::time::Duration;

use odmlayer_core::{
    backend::{FindSpec, StoreBackend, StoreBackendBuilder, UpdateFlags, WriteAck},
    config::SafeMode,
    error::{StoreError, StoreResult},
};

fn backend_error(err: mongodb::error::Error) -> StoreError {
    StoreError::Backend(err.to_string())
}

/// Translates an acknowledged-write policy into a driver write concern.
///
/// A disabled policy maps to `w: 0`. Enabled without options leaves the server
/// default in place. `fsync` maps to journaling, which is what the server
/// does for it.
pub fn write_concern(safe: &SafeMode) -> Option<WriteConcern> {
    if !safe.enabled {
        return Some(WriteConcern::builder().w(Acknowledgment::Nodes(0)).build());
    }
    if safe.options.is_empty() {
        return None;
    }

    let mut concern = WriteConcern::default();
    for (option, value) in &safe.options {
        match (option.as_str(), value) {
            ("w", Bson::Int32(n)) => concern.w = Some(Acknowledgment::Nodes(*n as u32)),
            ("w", Bson::Int64(n)) => concern.w = Some(Acknowledgment::Nodes(*n as u32)),
            ("w", Bson::String(tag)) => concern.w = Some(Acknowledgment::from(tag.clone())),
            ("wtimeout", Bson::Int32(ms)) => {
                concern.w_timeout = Some(Duration::from_millis(*ms as u64))
            }
            ("wtimeout", Bson::Int64(ms)) => {
                concern.w_timeout = Some(Duration::from_millis(*ms as u64))
            }
            ("j" | "fsync", Bson::Boolean(journal)) => concern.journal = Some(*journal),
            _ => {}
        }
    }
    Some(concern)
}

/// Converts a folded cursor configuration into driver find options.
pub fn find_options(spec: &FindSpec) -> FindOptions {
    let mut options = FindOptions::default();

    if let Some(limit) = spec.limit {
        options.limit = Some(limit as i64);
    }
    if spec.skip > 0 {
        options.skip = Some(spec.skip);
    }
    if !spec.sort.is_empty() {
        options.sort = Some(
            spec.sort
                .iter()
                .map(|(field, direction)| (field.clone(), Bson::Int32(*direction)))
                .collect(),
        );
    }
    options.projection = spec.projection.clone();
    options
}

/// Rewrites update operators that current servers no longer accept.
///
/// `$pushAll` was removed in MongoDB 3.6; each entry becomes a `$push` with
/// `$each`, merged into any `$push` already in the update.
pub fn server_update(mut update: Document) -> Document {
    let Some(Bson::Document(push_all)) = update.remove("$pushAll") else {
        return update;
    };

    let mut push = match update.remove("$push") {
        Some(Bson::Document(push)) => push,
        _ => Document::new(),
    };
    for (field, values) in push_all {
        push.insert(field, doc! { "$each": values });
    }
    update.insert("$push", push);
    update
}

#[derive(Debug)]
pub struct MongoDbStore {
    client: Client,
    database: String,
}

impl MongoDbStore {
    pub fn new(client: Client, database: String) -> Self {
        Self { client, database }
    }

    pub fn builder(dsn: &str, database: &str) -> MongoDbStoreBuilder {
        MongoDbStoreBuilder::new(dsn, database)
    }

    fn get_collection(&self, collection_name: &str) -> MongoCollection<Document> {
        self.client
            .database(&self.database)
            .collection(collection_name)
    }

    fn acknowledged(safe: &SafeMode) -> bool {
        safe.enabled
    }
}

#[async_trait]
impl StoreBackend for MongoDbStore {
    async fn find(&self, collection: &str, spec: &FindSpec) -> StoreResult<Vec<Document>> {
        self.get_collection(collection)
            .find(spec.filter.clone())
            .with_options(find_options(spec))
            .await
            .map_err(backend_error)?
            .try_collect::<Vec<Document>>()
            .await
            .map_err(backend_error)
    }

    async fn count(&self, collection: &str, filter: &Document) -> StoreResult<u64> {
        self.get_collection(collection)
            .count_documents(filter.clone())
            .await
            .map_err(backend_error)
    }

    async fn insert(
        &self,
        collection: &str,
        document: Document,
        safe: &SafeMode,
    ) -> StoreResult<Bson> {
        let result = self
            .get_collection(collection)
            .insert_one(document)
            .optional(write_concern(safe), |action, concern| {
                action.write_concern(concern)
            })
            .await
            .map_err(backend_error)?;

        debug!("Inserted {} into \"{}\"", result.inserted_id, collection);
        Ok(result.inserted_id)
    }

    async fn update(
        &self,
        collection: &str,
        filter: Document,
        update: Document,
        flags: UpdateFlags,
        safe: &SafeMode,
    ) -> StoreResult<WriteAck> {
        let target = self.get_collection(collection);
        let update = server_update(update);
        let action = if flags.multi {
            target.update_many(filter, update)
        } else {
            target.update_one(filter, update)
        };

        let result = action
            .upsert(flags.upsert)
            .optional(write_concern(safe), |action, concern| {
                action.write_concern(concern)
            })
            .await
            .map_err(backend_error)?;

        let upserted = result.upserted_id;
        Ok(WriteAck {
            acknowledged: Self::acknowledged(safe),
            n: if upserted.is_some() { 1 } else { result.matched_count },
            updated_existing: result.matched_count > 0,
            upserted,
        })
    }

    async fn remove(
        &self,
        collection: &str,
        filter: Document,
        safe: &SafeMode,
    ) -> StoreResult<WriteAck> {
        let result = self
            .get_collection(collection)
            .delete_many(filter)
            .optional(write_concern(safe), |action, concern| {
                action.write_concern(concern)
            })
            .await
            .map_err(backend_error)?;

        Ok(WriteAck {
            acknowledged: Self::acknowledged(safe),
            n: result.deleted_count,
            ..Default::default()
        })
    }

    async fn shutdown(self) -> StoreResult<()> {
        self.client.shutdown().await;

        Ok(())
    }
}

pub struct MongoDbStoreBuilder {
    dsn: String,
    database: String,
}

impl MongoDbStoreBuilder {
    pub fn new(dsn: &str, database: &str) -> Self {
        Self {
            dsn: dsn.to_string(),
            database: database.to_string(),
        }
    }
}

#[async_trait]
impl StoreBackendBuilder for MongoDbStoreBuilder {
    type Backend = MongoDbStore;

    async fn build(self) -> StoreResult<Self::Backend> {
        Ok(MongoDbStore::new(
            Client::with_options(
                ClientOptions::parse(&self.dsn)
                    .await
                    .map_err(|e| StoreError::Initialization(e.to_string()))?,
            )
            .map_err(|e| StoreError::Initialization(e.to_string()))?,
            self.database,
        ))
    }
}
