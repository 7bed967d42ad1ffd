//! In-memory document storage backend for odmlayer.
//!
//! This crate provides a thread-safe, in-memory implementation of the `StoreBackend` trait.
//! It uses async-aware read-write locks for concurrent access and is ideal for development
//! and testing.
//!
//! # Features
//!
//! - **Thread-safe access** - Concurrent reads and writes using async-aware RwLock
//! - **Wire-compatible evaluation** - Runs the same query, projection and update
//!   documents the MongoDB backend sends to the server
//! - **Upserts** - Seeds new rows from the equality parts of the filter
//!
//! # Quick Start
//!
//! ```ignore
//! use odmlayer::prelude::*;
//! use odmlayer::memory::InMemoryStore;
//! use bson::doc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let user = Schema::builder("User").field(Field::string("name")).build()?;
//!     let backend = InMemoryStore::builder().build().await?;
//!     let db = Database::new(DatabaseConfig::default(), vec![user], backend)?;
//!
//!     db.model("User")?.create(doc! { "name": "Alice" }).await?;
//!
//!     Ok(())
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as odmlayer_memory;

pub mod evaluator;
pub mod store;

pub use store::{InMemoryStore, InMemoryStoreBuilder};
