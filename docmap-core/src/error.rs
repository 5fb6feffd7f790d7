//! Error types and result types for mapper operations.
//!
//! This module provides error handling for every layer of the mapper: field casting,
//! polymorphic resolution, registry construction and the storage drivers underneath.
//! Use [`DocMapResult<T>`] as the return type for fallible operations.
//!
//! A reference pointing at a document that no longer exists is deliberately *not* an
//! error; resolution yields [`Value::Null`](crate::value::Value::Null) for it instead.

use bson::{Bson, error::Error as BsonError};
use thiserror::Error;

/// Represents all possible errors that can occur when mapping documents.
#[derive(Error, Debug)]
pub enum DocMapError {
    /// A value could not be interpreted under a field's declared type.
    #[error("Cannot cast field `{field}` from {value}")]
    TypeCast {
        /// The field (or path within a field) being cast.
        field: String,
        /// The offending value, in its storage representation.
        value: Bson,
    },
    /// A stored discriminator names a class that is unknown or outside the lineage
    /// of the class issuing the read.
    #[error("Discriminator `{discriminator}` cannot be instantiated as `{class}`")]
    Resolution {
        /// The discriminator found in the stored document.
        discriminator: String,
        /// The class that issued the read.
        class: String,
    },
    /// No class with the given name is registered.
    #[error("Unknown class: {0}")]
    UnknownClass(String),
    /// The class declares no field with the given name.
    #[error("Class {class} has no field `{field}`")]
    UnknownField {
        /// The class being accessed.
        class: String,
        /// The missing field name.
        field: String,
    },
    /// The class exposes no scope with the given name.
    #[error("Class {class} has no scope `{scope}`")]
    UnknownScope {
        /// The class being queried.
        class: String,
        /// The missing scope name.
        scope: String,
    },
    /// No registered class is bound to the given collection.
    #[error("No class is bound to collection {0}")]
    UnknownCollection(String),
    /// A collection binding names a connection the mapper was not configured with.
    #[error("Unknown connection: {0}")]
    UnknownConnection(String),
    /// An identity was assigned to an instance that already has one.
    #[error("Identity of {0} is immutable once assigned")]
    ImmutableIdentity(String),
    /// The registry definition is inconsistent (duplicate class, unknown parent, ...).
    #[error("Registry error: {0}")]
    Registry(String),
    /// An argument passed to an operation is out of range.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    /// Serialization/deserialization error when converting between document formats.
    #[error("Serialization error: {0}")]
    Serialization(String),
    /// Error during driver initialization or connection setup.
    #[error("Initialization error: {0}")]
    Initialization(String),
    /// A document with the given ID already exists in the collection.
    /// The first argument is the document ID, the second is the collection name.
    #[error("Document {0} already exists in collection {1}")]
    DocumentAlreadyExists(String, String),
    /// The requested document was not found in the collection.
    /// The first argument is the document ID, the second is the collection name.
    #[error("Document not found {0} in collection {1}")]
    DocumentNotFound(String, String),
    /// The document has an invalid structure.
    #[error("Invalid document: {0}")]
    InvalidDocument(String),
    /// An error surfaced by the underlying storage driver.
    #[error("Backend error: {0}")]
    Backend(String),
}

impl DocMapError {
    pub(crate) fn type_cast(field: impl Into<String>, value: Bson) -> Self {
        let field = field.into();
        log::error!("Cannot cast field `{}` from {}", field, value);

        DocMapError::TypeCast { field, value }
    }
}

/// A specialized `Result` type for mapper operations.
pub type DocMapResult<T> = Result<T, DocMapError>;

impl From<BsonError> for DocMapError {
    fn from(err: BsonError) -> Self {
        DocMapError::Serialization(err.to_string())
    }
}
