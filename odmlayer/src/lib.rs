//! Main odmlayer crate: a schema-driven object-document mapper for MongoDB-style stores.
//!
//! This crate is the primary entry point for users of the odmlayer framework.
//! It re-exports the core types and functionality from the sub-crates and provides
//! convenient access to the storage backends.
//!
//! # Features
//!
//! - **Declarative schemas** - Typed field descriptors with constraints and captions
//! - **Selector algebra** - Composable predicates (`eq`, `gt`, `in_`, `and_`, `or_`, ...)
//!   rendered to MongoDB query documents
//! - **Modifier algebra** - Update operators (`set`, `inc`, `push`, `pull`, ...) checked
//!   against the kind of the field they target
//! - **Checked query builder** - Lazily executed queries that reject illegal call orders
//! - **Multiple backends** - In-memory and MongoDB storage behind one trait
//!
//! # Quick Start
//!
//! ```ignore
//! use odmlayer::{prelude::*, memory::InMemoryStore};
//! use odmlayer::bson::doc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), OdmError> {
//!     let user = Schema::builder("User")
//!         .field(Field::string("name"))
//!         .field(Field::integer("age").range(0, 150))
//!         .build()?;
//!
//!     let db = Database::new(
//!         DatabaseConfig::new("chat"),
//!         vec![user],
//!         InMemoryStore::builder().build().await?,
//!     )?;
//!     let users = db.model("User")?;
//!
//!     users.create(doc! { "name": "alice", "age": 30 }).await?;
//!     users.create(doc! { "name": "bob", "age": 20 }).await?;
//!
//!     // Queries are lazy: nothing runs until the rows are needed.
//!     let mut adults = users
//!         .filter(Filter::new().field("age", gte(18)?))?
//!         .sort(["-age"])?
//!         .limit(10)?;
//!
//!     for user in adults.data().await? {
//!         println!("{:?}", user.get("name"));
//!     }
//!
//!     // Literal values become `set` modifiers.
//!     users
//!         .filter(Filter::new().field("name", "bob"))?
//!         .update(UpdateSpec::new().field("age", inc(1)).field("name", "robert"))
//!         .await?;
//!
//!     db.shutdown().await
//! }
//! ```
//!
//! # Call order
//!
//! Builder methods check the previously accepted one, so `users.query().sort(..)`
//! fails with a [`QueryError::ForbiddenMethod`](error::QueryError::ForbiddenMethod)
//! naming both methods. See [`query`] for the full table.
//!
//! # Backends
//!
//! - [`memory`] - In-memory storage for development and testing
//! - `mongodb` - Persistent MongoDB backend (requires the `mongodb` feature)

pub mod prelude;

pub use odmlayer_core::{
    backend, collection, config, database, error, field, modifier, naming, query, schema,
    selector,
};

// Re-export BSON types and the backend trait macro for convenience
pub use async_trait::async_trait;
pub use bson;

/// Selector constructors.
pub mod selectors {
    pub use odmlayer_core::selector::{
        Logic, Operand, Selector, all, and_, eq, exists, gt, gte, in_, lt, lte, modulo, ne, nin,
        nor, or_, size,
    };
}

/// Modifier constructors.
pub mod modifiers {
    pub use odmlayer_core::modifier::{
        Modifier, UpdateSpec, add_to_set, add_to_set_each, inc, pop, pull, pull_all, push,
        push_all, set,
    };
}

/// In-memory storage backend implementations.
pub mod memory {
    pub use odmlayer_memory::{InMemoryStore, InMemoryStoreBuilder};
}

/// MongoDB storage backend implementations.
///
/// This module is only available when the `mongodb` feature is enabled.
#[cfg(feature = "mongodb")]
pub mod mongodb {
    pub use odmlayer_mongodb::{MongoDbStore, MongoDbStoreBuilder};
}
