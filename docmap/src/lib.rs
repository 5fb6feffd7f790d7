//! Main docmap crate providing an object-document mapper over schemaless document stores.
//!
//! This crate is the primary entry point for users of docmap. It re-exports the core
//! types and functionality from the sub-crates and provides convenient access to the
//! different storage backends.
//!
//! # Features
//!
//! - **Declared classes** - Classes with typed fields, defaults, inheritance and named scopes
//! - **Polymorphic reads** - A discriminator stored with every document restores the right subclass
//! - **Lazy criteria** - Immutable query descriptors that compose and merge, executed on demand
//! - **Batched references** - Cross-document links resolved with one lookup per collection
//! - **Multiple backends** - In-memory and MongoDB storage behind one driver trait
//!
//! # Quick Start
//!
//! ```ignore
//! use docmap::{prelude::*, memory::InMemoryStore};
//! use bson::doc;
//!
//! #[tokio::main]
//! async fn main() -> DocMapResult<()> {
//!     let registry = Registry::builder()
//!         .define(
//!             ClassDef::new("Shape")
//!                 .field_with_default("color", FieldType::String, "black")
//!                 .scope("red", |criteria, _| Ok(criteria.filter(doc! { "color": "red" }))),
//!         )?
//!         .define(ClassDef::new("Circle").extends("Shape").field("radius", FieldType::Float))?
//!         .build();
//!
//!     let mapper = DocumentMapper::builder(registry)
//!         .backend(InMemoryStore::new())
//!         .build()?;
//!
//!     let mut circle = mapper.new_instance("Circle")?;
//!     circle.set("color", "red")?;
//!     circle.set("radius", 2)?;
//!     mapper.save(&mut circle).await?;
//!
//!     // Read back through the root class: the stored discriminator restores a Circle
//!     let red = mapper.scope("Shape", "red", &[])?.all().await?;
//!     println!("{} red shape(s), first is a {}", red.len(), red[0].class_name());
//!
//!     mapper.shutdown().await
//! }
//! ```
//!
//! # Backends
//!
//! - [`memory`] - Fast in-memory storage for development and testing
//! - [`mongodb`] - Persistent MongoDB backend (requires `mongodb` feature)

pub mod prelude;

pub use docmap_core::{
    backend, caster, class, criteria, embedded, error, field, instance, mapper, page, reference,
    registry, resolver, value, DISCRIMINATOR_KEY, ID_KEY,
};

// Re-export BSON types for convenience
pub use bson;

/// In-memory storage backend implementations.
pub mod memory {
    pub use docmap_memory::{InMemoryStore, InMemoryStoreBuilder};
}

/// MongoDB storage backend implementations.
///
/// This module is only available when the `mongodb` feature is enabled.
#[cfg(feature = "mongodb")]
pub mod mongodb {
    pub use docmap_mongodb::{MongoDbStore, MongoDbStoreBuilder};
}
