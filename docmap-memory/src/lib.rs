//! In-memory document storage driver for docmap.
//!
//! This crate provides a thread-safe, in-memory implementation of the `StoreBackend` trait.
//! It uses async-aware read-write locks for concurrent access and is ideal for development
//! and testing.
//!
//! # Features
//!
//! - **Thread-safe access** - Concurrent reads and writes using async-aware RwLock
//! - **Mongo-style selectors** - Equality, comparison, membership and logical operators
//! - **Query options** - Sorting, skipping and limiting
//! - **Lookup accounting** - Counts round trips so batching can be observed
//!
//! # Quick Start
//!
//! ```ignore
//! use docmap::prelude::*;
//! use docmap::memory::InMemoryStore;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let registry = Registry::builder()
//!         .define(ClassDef::new("User").field("name", FieldType::String))?
//!         .build();
//!
//!     let mapper = DocumentMapper::builder(registry)
//!         .backend(InMemoryStore::builder().build().await?)
//!         .build()?;
//!
//!     let mut user = mapper.new_instance("User")?;
//!     user.set("name", "Alice")?;
//!     mapper.save(&mut user).await?;
//!
//!     Ok(())
//! }
//! ```

pub mod store;
mod evaluator;

pub use store::{InMemoryStore, InMemoryStoreBuilder};
