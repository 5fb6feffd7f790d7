//! An object-document mapping core sitting between application classes and a schemaless
//! document store.
//!
//! This crate is the core of the docmap project and provides:
//!
//! - **Class registry** ([`class`], [`registry`], [`field`]) - Mapped classes, their typed
//!   fields, defaults, collection bindings, indexes and named scopes
//! - **Values** ([`value`], [`embedded`]) - The in-memory side of the mapping, including
//!   custom embeddable types
//! - **Type casting** ([`caster`]) - Conversion between in-memory values and storage
//!   documents, driven by declared field types
//! - **Instantiation** ([`instance`], [`resolver`]) - Polymorphic instantiation through a
//!   stored discriminator
//! - **Criteria** ([`criteria`], [`page`]) - Lazy, immutable, composable query descriptors
//! - **References** ([`reference`]) - Cross-document links and their batched resolution
//! - **Mapper** ([`mapper`]) - The entry point binding a registry to storage drivers
//! - **Store backend abstraction** ([`backend`]) - Traits for implementing storage drivers
//! - **Error handling** ([`error`]) - Error types and result types
//!
//! # Example
//!
//! ```ignore
//! use docmap_core::{class::ClassDef, field::FieldType, mapper::DocumentMapper, registry::Registry};
//! use bson::doc;
//!
//! let registry = Registry::builder()
//!     .define(
//!         ClassDef::new("Shape")
//!             .field_with_default("color", FieldType::String, "black")
//!             .scope("red", |criteria, _| Ok(criteria.filter(doc! { "color": "red" }))),
//!     )?
//!     .define(ClassDef::new("Circle").extends("Shape").field("radius", FieldType::Float))?
//!     .build();
//!
//! let mapper = DocumentMapper::builder(registry).backend(backend).build()?;
//! let red_shapes = mapper.scope("Shape", "red", &[])?.all().await?;
//! ```

pub mod backend;
pub mod caster;
pub mod class;
pub mod criteria;
pub mod embedded;
pub mod error;
pub mod field;
pub mod instance;
pub mod mapper;
pub mod page;
pub mod reference;
pub mod registry;
pub mod resolver;
pub mod value;

pub use instance::{DISCRIMINATOR_KEY, ID_KEY};
