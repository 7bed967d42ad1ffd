//! Schema registry of one logical database.
//!
//! A [`Database`] is built once at startup from its configuration, the schemas
//! that belong to it and a storage backend. Registration resolves every schema's
//! collection alias and publishes the schema under both its name and its alias,
//! so [`Database::model`] finds it either way.
//!
//! # Example
//!
//! ```ignore
//! use odmlayer::prelude::*;
//!
//! let user = Schema::builder("User")
//!     .field(Field::string("name"))
//!     .field(Field::integer("age"))
//!     .build()?;
//!
//! let db = Database::new(DatabaseConfig::new("chat"), vec![user], InMemoryStore::new())?;
//! let users = db.model("users")?;
//! let adults = users.filter(Filter::new().field("age", gte(18)?))?.data().await?;
//! ```

use bson::{Bson, Document, doc, oid::ObjectId};
use indexmap::IndexMap;
use log::debug;
use std::{fmt, sync::Arc};

use crate::{
    backend::{StoreBackend, UpdateFlags, WriteAck},
    collection::CollectionHandle,
    config::{DatabaseConfig, SafeMode},
    error::{OdmResult, QueryError, SchemaError},
    naming::{check_alias, plural},
    query::{Filter, Query},
    schema::{ID_FIELD, Record, Schema},
};

/// Source of client-side record identities.
pub trait IdGenerator: Send + Sync + fmt::Debug {
    fn generate(&self) -> Bson;
}

/// Generates a fresh [`ObjectId`] per record.
#[derive(Debug, Clone, Copy, Default)]
pub struct ObjectIdGenerator;

impl IdGenerator for ObjectIdGenerator {
    fn generate(&self) -> Bson {
        Bson::ObjectId(ObjectId::new())
    }
}

/// Registry of the schemas bound to one logical store.
#[derive(Debug)]
pub struct Database<B: StoreBackend> {
    config: DatabaseConfig,
    backend: B,
    collections: IndexMap<String, Arc<Schema>>,
    published: IndexMap<String, String>,
    id_generator: Box<dyn IdGenerator>,
}

impl<B: StoreBackend> Database<B> {
    /// Registers `schemas` and binds them to `backend`.
    ///
    /// Schemas that declare no field, or that are pinned to another database,
    /// are skipped.
    ///
    /// # Errors
    ///
    /// - [`SchemaError::MetadataNaming`] for aliases starting with `_`
    /// - [`SchemaError::CollectionBinding`] if a name or alias is already published
    /// - [`InitializationError::SafeOptions`](crate::error::InitializationError::SafeOptions)
    ///   for malformed safe-write options
    pub fn new(config: DatabaseConfig, schemas: Vec<Schema>, backend: B) -> OdmResult<Self> {
        config.safe.validate()?;

        let mut db = Database {
            config,
            backend,
            collections: IndexMap::new(),
            published: IndexMap::new(),
            id_generator: Box::new(ObjectIdGenerator),
        };

        for schema in schemas {
            db.register(schema)?;
        }
        Ok(db)
    }

    fn register(&mut self, schema: Schema) -> Result<(), SchemaError> {
        if schema.declared() == 0 {
            debug!("Skipping schema \"{}\": no fields declared", schema.name());
            return Ok(());
        }
        if let Some(database) = schema.database().filter(|db| *db != self.config.name) {
            debug!(
                "Skipping schema \"{}\": bound to database \"{}\"",
                schema.name(),
                database
            );
            return Ok(());
        }

        let alias = match schema.alias() {
            Some(alias) => alias.to_string(),
            None => plural(schema.name()),
        };
        check_alias(&alias, schema.name())?;

        for taken in [schema.name(), alias.as_str()] {
            if self.published.contains_key(taken) {
                return Err(SchemaError::collection_binding(schema.name(), &alias, taken));
            }
        }

        debug!(
            "Registered schema \"{}\" as \"{}\" in database \"{}\" ({})",
            schema.name(),
            alias,
            self.config.name,
            schema.field_names().collect::<Vec<_>>().join(", ")
        );

        self.published
            .insert(schema.name().to_string(), alias.clone());
        self.published.insert(alias.clone(), alias.clone());
        self.collections
            .insert(alias.clone(), Arc::new(schema.with_alias(alias)));
        Ok(())
    }

    /// Replaces the identity generator used for new records.
    pub fn with_id_generator(mut self, generator: impl IdGenerator + 'static) -> Self {
        self.id_generator = Box::new(generator);
        self
    }

    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Registered schemas by provider name.
    pub fn schemas(&self) -> impl Iterator<Item = (&str, &Arc<Schema>)> {
        self.collections
            .iter()
            .map(|(provider, schema)| (provider.as_str(), schema))
    }

    /// Looks a schema up by name or alias.
    ///
    /// # Errors
    ///
    /// [`SchemaError::UnknownSchema`] if nothing is published under `name`.
    pub fn model(&self, name: &str) -> Result<Model<'_, B>, SchemaError> {
        self.published
            .get(name)
            .and_then(|provider| self.collections.get(provider))
            .map(|schema| Model {
                db: self,
                schema: Arc::clone(schema),
            })
            .ok_or_else(|| SchemaError::UnknownSchema {
                name: name.to_string(),
                database: self.config.name.clone(),
            })
    }

    /// Model of a registered schema, checked by identity of the registered descriptor.
    pub(crate) fn model_of(&self, schema: &Schema) -> Result<Model<'_, B>, SchemaError> {
        let provider = schema.alias().unwrap_or(schema.name());
        match self.collections.get(provider) {
            Some(registered) if registered.as_ref() == schema => Ok(Model {
                db: self,
                schema: Arc::clone(registered),
            }),
            _ => Err(SchemaError::Unbound {
                schema: schema.name().to_string(),
                database: self.config.name.clone(),
            }),
        }
    }

    /// Handle on the collection published as `provider`.
    pub fn collection(&self, provider: &str) -> CollectionHandle<'_, B> {
        CollectionHandle::new(provider, &self.backend)
    }

    /// A fresh identity, if client-side generation is enabled.
    pub fn make_id(&self) -> Option<Bson> {
        self.config.gen_ids.then(|| self.id_generator.generate())
    }

    /// Write policy of one call.
    pub(crate) fn safe_mode(&self, overriding: Option<&SafeMode>) -> SafeMode {
        self.config.safe.resolve(overriding)
    }

    /// Debug trace of an executed store operation.
    pub(crate) fn trace(&self, safe: Option<&SafeMode>, operation: &str) {
        if self.config.quiet {
            return;
        }
        let safe = safe.map(SafeMode::trace).unwrap_or_default();
        debug!("Mongo query (db='{}'{}): {}", self.config.name, safe, operation);
    }

    /// Shuts the backend down.
    pub async fn shutdown(self) -> OdmResult<()> {
        Ok(self.backend.shutdown().await?)
    }
}

impl<B: StoreBackend> fmt::Display for Database<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<Database(")?;
        if self.collections.is_empty() {
            write!(f, "no collections")?;
        } else {
            let entries = self
                .collections
                .iter()
                .map(|(provider, schema)| {
                    format!(
                        "\"{}\": {}({})",
                        provider,
                        schema.name(),
                        schema.field_names().collect::<Vec<_>>().join(", ")
                    )
                })
                .collect::<Vec<_>>();
            write!(f, "{{\n    {}\n}}", entries.join(",\n    "))?;
        }
        write!(
            f,
            ", {}@{}:{})>",
            self.config.name, self.config.host, self.config.port
        )
    }
}

/// A registered schema bound to its database: the entry point of queries.
#[derive(Debug)]
pub struct Model<'a, B: StoreBackend> {
    db: &'a Database<B>,
    schema: Arc<Schema>,
}

impl<B: StoreBackend> Clone for Model<'_, B> {
    fn clone(&self) -> Self {
        Model {
            db: self.db,
            schema: Arc::clone(&self.schema),
        }
    }
}

impl<'a, B: StoreBackend> Model<'a, B> {
    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn database(&self) -> &'a Database<B> {
        self.db
    }

    /// Collection name the schema is published under.
    pub fn provider(&self) -> &str {
        self.schema.alias().unwrap_or(self.schema.name())
    }

    /// Handle on the schema's collection.
    pub fn collection(&self) -> CollectionHandle<'a, B> {
        self.db.collection(self.provider())
    }

    /// A fresh query in its initial state.
    pub fn query(&self) -> Query<'a, B> {
        Query::new(self.clone())
    }

    pub fn filter(&self, filter: impl Into<Filter>) -> OdmResult<Query<'a, B>> {
        self.query().filter(filter)
    }

    /// Unfiltered query over the whole collection.
    pub fn all(&self) -> Query<'a, B> {
        Query::new(self.clone()).unfiltered()
    }

    /// First record matching `filter`.
    ///
    /// # Errors
    ///
    /// [`QueryError::NoResult`] if nothing matches.
    pub async fn one(&self, filter: impl Into<Filter>) -> OdmResult<Record> {
        self.query().one(filter).await
    }

    pub async fn count(&self) -> OdmResult<u64> {
        self.query().count().await
    }

    /// Validates and inserts a new record.
    pub async fn create(&self, fields: Document) -> OdmResult<Record> {
        self.query().create(fields).await
    }

    /// Builds a new, unsaved record. Its identity is generated when enabled.
    pub fn new_record(&self, fields: Document) -> OdmResult<Record> {
        Record::instantiate(Arc::clone(&self.schema), fields, true, true, || self.db.make_id())
    }

    /// Rebuilds a record from a stored document.
    pub fn load(&self, document: Document) -> OdmResult<Record> {
        Record::instantiate(Arc::clone(&self.schema), document, false, false, || None)
    }
}

impl Record {
    /// Writes the record.
    ///
    /// With an identity the record is updated by identity, inserting it if the
    /// store does not have it yet. Without one it is inserted and the identity
    /// assigned by the store is back-filled. With `drop_null`, null fields are
    /// left untouched in the store.
    ///
    /// # Errors
    ///
    /// - [`SchemaError::Unbound`] if the record's schema is not registered in `db`
    /// - [`ValidationError`](crate::error::ValidationError) if the record is invalid
    /// - [`StoreError`](crate::error::StoreError) if the write fails
    pub async fn save<B: StoreBackend>(
        &mut self,
        db: &Database<B>,
        drop_null: bool,
    ) -> OdmResult<()> {
        let model = db.model_of(self.schema())?;
        self.validate()?;

        let collection = model.collection();
        let safe = db.safe_mode(None);
        let mut document = self.to_document(drop_null);

        match self.id().cloned() {
            Some(id) => {
                document.remove(ID_FIELD);
                let update = if document.is_empty() {
                    doc! { "$setOnInsert": { ID_FIELD: id.clone() } }
                } else {
                    doc! { "$set": document }
                };
                let filter = doc! { ID_FIELD: id };
                db.trace(
                    Some(&safe),
                    &format!(
                        "db.{}.update({}, {}, true, false)",
                        collection.name(),
                        filter,
                        update
                    ),
                );
                let flags = UpdateFlags {
                    multi: false,
                    upsert: true,
                };
                collection.update(filter, update, flags, &safe).await?;
            }
            None => {
                db.trace(
                    Some(&safe),
                    &format!("db.{}.insert({})", collection.name(), document),
                );
                let id = collection.insert(document, &safe).await?;
                self.set_id(id);
            }
        }

        self.mark_stored();
        Ok(())
    }

    /// Removes the record from the store by identity.
    ///
    /// # Errors
    ///
    /// [`QueryError::MissingIdentity`] if the record has no identity.
    pub async fn remove<B: StoreBackend>(&self, db: &Database<B>) -> OdmResult<WriteAck> {
        let model = db.model_of(self.schema())?;
        let id = self.id().cloned().ok_or_else(|| QueryError::MissingIdentity {
            action: "remove".to_string(),
            schema: self.schema().name().to_string(),
        })?;

        let collection = model.collection();
        let safe = db.safe_mode(None);
        let filter = doc! { ID_FIELD: id };
        db.trace(
            Some(&safe),
            &format!("db.{}.remove({})", collection.name(), filter),
        );
        Ok(collection.remove(filter, &safe).await?)
    }
}
