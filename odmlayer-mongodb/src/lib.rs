//! MongoDB backend implementation for odmlayer.
//!
//! This crate provides a MongoDB-based implementation of the `StoreBackend` trait
//! over the official async driver.
//!
//! To use this backend, include the `mongodb` feature in your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! odmlayer = { version = "x.y.z", features = ["mongodb"] }
//! ```
//!
//! # Features
//!
//! - **Persistent storage** - Data is persisted to MongoDB Atlas or self-hosted MongoDB
//! - **Server-side evaluation** - Query, projection and update documents run on the server
//! - **Write concerns** - The acknowledged-write policy of each call maps to a driver write concern
//!
//! # Example
//!
//! ```ignore
//! use odmlayer::{backend::StoreBackendBuilder, mongodb::MongoDbStore};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = DatabaseConfig::new("chat");
//!     let store = MongoDbStore::builder(&config.dsn(), &config.name)
//!         .build()
//!         .await?;
//!
//!     Ok(())
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as odmlayer_mongodb;

pub mod store;

pub use store::{MongoDbStore, MongoDbStoreBuilder};
