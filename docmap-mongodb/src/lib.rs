//! MongoDB storage driver for docmap.
//!
//! This crate provides a MongoDB-based implementation of the `StoreBackend` trait.
//! Selectors are handed to MongoDB verbatim, so every operator the server understands
//! can be used in criteria.
//!
//! To use this driver, include the `mongodb` feature in your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! docmap = { version = "x.y.z", features = ["mongodb"] }
//! ```
//!
//! # Features
//!
//! - **Persistent storage** - Data is persisted to MongoDB Atlas or self-hosted MongoDB
//! - **Native queries** - Selectors and sort/skip/limit options map directly onto MongoDB's
//! - **Per-namespace databases** - Classes bound to an explicit database are stored there
//! - **Indexing** - Declared indexes are created through `IndexModel`s
//!
//! # Example
//!
//! ```ignore
//! use docmap::{backend::StoreBackendBuilder, mongodb::MongoDbStore};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = MongoDbStore::builder("mongodb://localhost:27017", "my_database")
//!         .build()
//!         .await?;
//!
//!     let mapper = DocumentMapper::builder(registry).backend(store).build()?;
//!
//!     Ok(())
//! }
//! ```

pub mod store;

pub use store::{MongoDbStore, MongoDbStoreBuilder};
