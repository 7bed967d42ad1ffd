//! A schema-driven object-document mapper for MongoDB-style document stores.
//!
//! This crate is the core of the odmlayer project and provides:
//!
//! - **Schemas and records** ([`schema`], [`field`]) - Typed field declarations and the records built from them
//! - **Selectors** ([`selector`]) - Composable query predicates rendered to the wire format
//! - **Modifiers** ([`modifier`]) - Update operators bound to schema fields
//! - **Query builder** ([`query`]) - Call-order checked, lazily executed queries
//! - **Database registry** ([`database`]) - Schema registration, collection aliases and models
//! - **Store backend abstraction** ([`backend`]) - Traits for implementing different storage backends
//! - **Collections interface** ([`collection`]) - Collection handles and read cursors
//! - **Configuration** ([`config`]) - Connection settings and acknowledged-write policy
//! - **Error handling** ([`error`]) - Error kinds and result types
//!
//! # Example
//!
//! ```ignore
//! use odmlayer::prelude::*;
//! use bson::doc;
//!
//! let user = Schema::builder("User")
//!     .field(Field::string("name").max_length(64))
//!     .field(Field::integer("age").optional())
//!     .build()?;
//!
//! let db = Database::new(DatabaseConfig::new("chat"), vec![user], InMemoryStore::new())?;
//! let users = db.model("User")?;
//!
//! users.create(doc! { "name": "alice", "age": 30 }).await?;
//! users
//!     .filter(Filter::new().field("name", "alice"))?
//!     .update(UpdateSpec::new().field("age", inc(1)))
//!     .await?;
//! ```

#[allow(unused_extern_crates)]
extern crate self as odmlayer_core;

pub mod backend;
pub mod collection;
pub mod config;
pub mod database;
pub mod error;
pub mod field;
pub mod modifier;
pub mod naming;
pub mod query;
pub mod schema;
pub mod selector;
