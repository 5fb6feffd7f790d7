//! Storage driver abstraction underneath the mapper.
//!
//! The mapper never talks to a database directly. Everything it needs from storage goes
//! through the [`StoreBackend`] trait: identity-keyed writes, identity-set lookups and
//! selector queries. Selectors and options are opaque documents handed through unchanged;
//! interpreting them is entirely up to the driver.
//!
//! # Traits
//!
//! - [`StoreBackend`]: The core trait for storage drivers
//! - [`DynStoreBackend`]: A trait for dynamic dispatch over driver implementations
//! - [`StoreBackendBuilder`]: Factory trait for creating driver instances
//!
//! # Examples
//!
//! ```ignore
//! use docmap::backend::{Namespace, StoreBackend};
//! use bson::{Uuid, doc};
//!
//! let backend = MyBackendImpl::new();
//! let shapes = Namespace::new("shapes");
//!
//! let id = Uuid::new();
//! backend.insert_documents(vec![(id, doc! { "_id": id, "color": "red" })], &shapes).await?;
//!
//! let red = backend
//!     .find_documents(doc! { "color": "red" }, doc! { "limit": 10 }, &shapes)
//!     .await?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use async_trait::async_trait;
use bson::{Document, Uuid};
use std::{any::Any, fmt::{self, Debug}};

use crate::{class::IndexSpec, error::DocMapResult};

/// The address of a collection as seen by a driver.
///
/// `database` is `None` for collections living in the driver's default database.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Namespace {
    pub database: Option<String>,
    pub collection: String,
}

impl Namespace {
    pub fn new(collection: impl Into<String>) -> Self {
        Self {
            database: None,
            collection: collection.into(),
        }
    }

    pub fn in_database(database: impl Into<String>, collection: impl Into<String>) -> Self {
        Self {
            database: Some(database.into()),
            collection: collection.into(),
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.database {
            Some(database) => write!(f, "{}.{}", database, self.collection),
            None => f.write_str(&self.collection),
        }
    }
}

/// Abstract interface for document storage drivers.
///
/// Every stored document carries its identity under the `_id` key, and every document a
/// driver returns must too.
///
/// # Thread Safety
///
/// All implementations must be thread-safe and support concurrent access from multiple
/// async tasks.
///
/// # Error Handling
///
/// Driver failures are reported as [`DocMapError`](crate::error::DocMapError) values and
/// propagate to the caller unchanged; the mapper adds no retry policy of its own.
#[async_trait]
pub trait StoreBackend: Send + Sync + Debug {
    /// Inserts new documents into a collection.
    ///
    /// # Arguments
    ///
    /// * `documents` - A vector of (identity, document) pairs to insert
    /// * `namespace` - The collection to insert into. Created automatically if it doesn't exist.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentAlreadyExists`](crate::error::DocMapError::DocumentAlreadyExists)
    /// if a document with the same identity is already stored.
    async fn insert_documents(
        &self,
        documents: Vec<(Uuid, Document)>,
        namespace: &Namespace,
    ) -> DocMapResult<()>;

    /// Replaces documents entirely, inserting those that do not exist yet.
    ///
    /// # Arguments
    ///
    /// * `documents` - A vector of (identity, document) pairs with the new content
    /// * `namespace` - The collection containing the documents
    async fn update_documents(
        &self,
        documents: Vec<(Uuid, Document)>,
        namespace: &Namespace,
    ) -> DocMapResult<()>;

    /// Deletes documents by identity. Missing identities are skipped.
    async fn delete_documents(&self, ids: Vec<Uuid>, namespace: &Namespace) -> DocMapResult<()>;

    /// Retrieves documents by identity in a single lookup.
    ///
    /// Documents are returned in storage order, which need not match the request order.
    /// Identities that do not exist are simply omitted from the results.
    async fn get_documents(
        &self,
        ids: Vec<Uuid>,
        namespace: &Namespace,
    ) -> DocMapResult<Vec<Document>>;

    /// Finds documents matching a selector.
    ///
    /// # Arguments
    ///
    /// * `selector` - The filter document, passed through verbatim
    /// * `options` - Query options such as `sort`, `skip` and `limit`; unknown keys are ignored
    /// * `namespace` - The collection to query
    async fn find_documents(
        &self,
        selector: Document,
        options: Document,
        namespace: &Namespace,
    ) -> DocMapResult<Vec<Document>>;

    /// Counts documents matching a selector.
    async fn count_documents(&self, selector: Document, namespace: &Namespace) -> DocMapResult<u64>;

    /// Creates an index described by a declared [`IndexSpec`].
    ///
    /// Drivers without index support may treat this as a no-op.
    async fn create_index(&self, namespace: &Namespace, index: &IndexSpec) -> DocMapResult<()>;

    /// Drops a collection and all its documents.
    ///
    /// # Warning
    ///
    /// This operation is irreversible.
    async fn drop_collection(&self, namespace: &Namespace) -> DocMapResult<()>;

    /// Cleanly shuts down the driver, releasing all resources.
    ///
    /// The default implementation is a no-op, but drivers with external connections
    /// should override this.
    async fn shutdown(self) -> DocMapResult<()>
    where
        Self: Sized,
    {
        Ok(())
    }
}

#[async_trait]
pub trait DynStoreBackend: Send + Sync + Debug {
    async fn insert_documents(
        &self,
        documents: Vec<(Uuid, Document)>,
        namespace: &Namespace,
    ) -> DocMapResult<()>;
    async fn update_documents(
        &self,
        documents: Vec<(Uuid, Document)>,
        namespace: &Namespace,
    ) -> DocMapResult<()>;
    async fn delete_documents(&self, ids: Vec<Uuid>, namespace: &Namespace) -> DocMapResult<()>;
    async fn get_documents(
        &self,
        ids: Vec<Uuid>,
        namespace: &Namespace,
    ) -> DocMapResult<Vec<Document>>;
    async fn find_documents(
        &self,
        selector: Document,
        options: Document,
        namespace: &Namespace,
    ) -> DocMapResult<Vec<Document>>;
    async fn count_documents(&self, selector: Document, namespace: &Namespace) -> DocMapResult<u64>;
    async fn create_index(&self, namespace: &Namespace, index: &IndexSpec) -> DocMapResult<()>;
    async fn drop_collection(&self, namespace: &Namespace) -> DocMapResult<()>;
    async fn shutdown_boxed(self: Box<Self>) -> DocMapResult<()>;

    fn as_any(&self) -> &dyn Any;
}

#[async_trait]
impl<B: StoreBackend + Send + Sync + 'static> DynStoreBackend for B {
    async fn insert_documents(
        &self,
        documents: Vec<(Uuid, Document)>,
        namespace: &Namespace,
    ) -> DocMapResult<()> {
        StoreBackend::insert_documents(self, documents, namespace).await
    }

    async fn update_documents(
        &self,
        documents: Vec<(Uuid, Document)>,
        namespace: &Namespace,
    ) -> DocMapResult<()> {
        StoreBackend::update_documents(self, documents, namespace).await
    }

    async fn delete_documents(&self, ids: Vec<Uuid>, namespace: &Namespace) -> DocMapResult<()> {
        StoreBackend::delete_documents(self, ids, namespace).await
    }

    async fn get_documents(
        &self,
        ids: Vec<Uuid>,
        namespace: &Namespace,
    ) -> DocMapResult<Vec<Document>> {
        StoreBackend::get_documents(self, ids, namespace).await
    }

    async fn find_documents(
        &self,
        selector: Document,
        options: Document,
        namespace: &Namespace,
    ) -> DocMapResult<Vec<Document>> {
        StoreBackend::find_documents(self, selector, options, namespace).await
    }

    async fn count_documents(&self, selector: Document, namespace: &Namespace) -> DocMapResult<u64> {
        StoreBackend::count_documents(self, selector, namespace).await
    }

    async fn create_index(&self, namespace: &Namespace, index: &IndexSpec) -> DocMapResult<()> {
        StoreBackend::create_index(self, namespace, index).await
    }

    async fn drop_collection(&self, namespace: &Namespace) -> DocMapResult<()> {
        StoreBackend::drop_collection(self, namespace).await
    }

    async fn shutdown_boxed(self: Box<Self>) -> DocMapResult<()> {
        StoreBackend::shutdown(*self).await
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[async_trait]
pub trait StoreBackendBuilder {
    type Backend: StoreBackend;

    async fn build(self) -> DocMapResult<Self::Backend>;
}
