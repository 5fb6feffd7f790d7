//! Convenient re-exports of commonly used types from docmap.
//!
//! Import this prelude module to quickly access the most frequently used types
//! and traits without needing to import from multiple sub-modules:
//!
//! ```ignore
//! use docmap::prelude::*;
//! ```

pub use docmap_core::{
    backend::{StoreBackend, DynStoreBackend, StoreBackendBuilder, Namespace},
    class::{ClassDef, CollectionBinding, IndexSpec, MappedClass},
    criteria::{Criteria, InstanceCursor},
    embedded::Embeddable,
    error::{DocMapError, DocMapResult},
    field::{FieldDefinition, FieldType},
    instance::Instance,
    mapper::{DocumentMapper, DocumentMapperBuilder},
    page::Page,
    reference::{Reference, ReferenceResolver},
    registry::{Registry, RegistryBuilder},
    value::Value,
};
