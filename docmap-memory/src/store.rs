//! In-memory storage implementation for the mapper.
//!
//! This module provides a simple but complete in-memory driver that stores
//! documents in insertion-ordered maps behind async-safe read-write locks.

use std::{
    collections::{HashMap, HashSet},
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};
use async_trait::async_trait;
use indexmap::IndexMap;
use mea::rwlock::RwLock;
use bson::{Document, Uuid};

use docmap_core::{
    backend::{Namespace, StoreBackend, StoreBackendBuilder},
    class::IndexSpec,
    error::{DocMapError, DocMapResult},
};

use crate::evaluator::DocumentEvaluator;

type CollectionMap = IndexMap<Uuid, Document>;
type StoreMap = HashMap<Namespace, CollectionMap>;


/// Thread-safe in-memory document storage driver.
///
/// This struct implements the [`StoreBackend`] trait to provide a fully functional
/// document store that operates entirely in memory using async-aware read-write locks.
/// Documents are kept in insertion order, indexed by their identity.
///
/// # Thread Safety
///
/// `InMemoryStore` is cloneable and uses an `Arc`-wrapped internal state, allowing
/// it to be safely shared across async tasks. Multiple clones of the same instance
/// share the same underlying data, so a test can keep a clone around to inspect
/// the store after handing the original to a mapper.
///
/// # Performance
///
/// Queries scan all documents in a collection. Declared indexes are recorded but
/// not used or enforced.
///
/// # Example
///
/// ```ignore
/// use docmap_memory::InMemoryStore;
/// use docmap::backend::{Namespace, StoreBackend};
/// use bson::{Uuid, doc};
///
/// let store = InMemoryStore::new();
/// let users = Namespace::new("users");
///
/// let id = Uuid::new();
/// store.insert_documents(vec![(id, doc! { "_id": id, "name": "Alice" })], &users).await?;
///
/// let docs = store.get_documents(vec![id], &users).await?;
/// assert_eq!(docs.len(), 1);
/// assert_eq!(store.lookup_count(), 1);
/// ```
#[derive(Default, Clone, Debug)]
pub struct InMemoryStore {
    /// The main storage map: namespace -> (document id -> document)
    store: Arc<RwLock<StoreMap>>,
    /// Declared indexes per namespace
    indexes: Arc<RwLock<HashMap<Namespace, Vec<IndexSpec>>>>,
    /// Number of identity-set lookups and queries served
    lookups: Arc<AtomicUsize>,
}

impl InMemoryStore {
    /// Creates a new empty in-memory document store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a builder for constructing an `InMemoryStore`.
    pub fn builder() -> InMemoryStoreBuilder {
        InMemoryStoreBuilder::default()
    }

    /// Returns the number of `get_documents` and `find_documents` calls served so far,
    /// across every clone of this store.
    pub fn lookup_count(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }

    /// Resets the lookup counter to zero.
    pub fn reset_lookup_count(&self) {
        self.lookups.store(0, Ordering::SeqCst);
    }

    /// Returns the indexes declared on a namespace.
    pub async fn indexes(&self, namespace: &Namespace) -> Vec<IndexSpec> {
        self.indexes
            .read()
            .await
            .get(namespace)
            .cloned()
            .unwrap_or_default()
    }

    /// Returns the number of documents stored in a namespace.
    pub async fn len(&self, namespace: &Namespace) -> usize {
        self.store
            .read()
            .await
            .get(namespace)
            .map_or(0, IndexMap::len)
    }
}


#[async_trait]
impl StoreBackend for InMemoryStore {
    async fn insert_documents(&self, documents: Vec<(Uuid, Document)>, namespace: &Namespace) -> DocMapResult<()> {
        let mut store = self.store.write().await;
        let collection_map = store
            .entry(namespace.clone())
            .or_default();

        if let Some((id, _)) = documents
            .iter()
            .find(|(id, _)| collection_map.contains_key(id))
        {
            return Err(DocMapError::DocumentAlreadyExists(id.to_string(), namespace.to_string()));
        }

        for (id, doc) in documents {
            collection_map.insert(id, doc);
        }

        Ok(())
    }

    async fn update_documents(&self, documents: Vec<(Uuid, Document)>, namespace: &Namespace) -> DocMapResult<()> {
        let mut store = self.store.write().await;
        let collection_map = store
            .entry(namespace.clone())
            .or_default();

        for (id, doc) in documents {
            collection_map.insert(id, doc);
        }

        Ok(())
    }

    async fn delete_documents(&self, ids: Vec<Uuid>, namespace: &Namespace) -> DocMapResult<()> {
        let mut store = self.store.write().await;

        if let Some(collection_map) = store.get_mut(namespace) {
            for id in ids {
                collection_map.shift_remove(&id);
            }
        }

        Ok(())
    }

    async fn get_documents(&self, ids: Vec<Uuid>, namespace: &Namespace) -> DocMapResult<Vec<Document>> {
        self.lookups.fetch_add(1, Ordering::SeqCst);

        let store = self.store.read().await;
        let collection_map = match store.get(namespace) {
            Some(col) => col,
            None => return Ok(vec![]),
        };

        let wanted: HashSet<Uuid> = ids.into_iter().collect();

        Ok(
            collection_map
                .iter()
                .filter(|(id, _)| wanted.contains(*id))
                .map(|(_, doc)| doc.clone())
                .collect()
        )
    }

    async fn find_documents(
        &self,
        selector: Document,
        options: Document,
        namespace: &Namespace,
    ) -> DocMapResult<Vec<Document>> {
        self.lookups.fetch_add(1, Ordering::SeqCst);

        let store = self.store.read().await;
        let collection_map = match store.get(namespace) {
            Some(col) => col,
            None => return Ok(vec![]),
        };

        let matched = DocumentEvaluator::filter_documents(collection_map.values(), &selector)?;

        DocumentEvaluator::apply_options(matched, &options)
    }

    async fn count_documents(&self, selector: Document, namespace: &Namespace) -> DocMapResult<u64> {
        let store = self.store.read().await;
        let collection_map = match store.get(namespace) {
            Some(col) => col,
            None => return Ok(0),
        };

        Ok(DocumentEvaluator::filter_documents(collection_map.values(), &selector)?.len() as u64)
    }

    async fn create_index(&self, namespace: &Namespace, index: &IndexSpec) -> DocMapResult<()> {
        let mut indexes = self.indexes.write().await;
        let declared = indexes
            .entry(namespace.clone())
            .or_default();

        // Indexes are recorded, never enforced
        log::debug!("Recording index {} on {}", index.name(), namespace);

        declared.retain(|existing| existing.name() != index.name());
        declared.push(index.clone());

        Ok(())
    }

    async fn drop_collection(&self, namespace: &Namespace) -> DocMapResult<()> {
        log::debug!("Dropping {}", namespace);

        self.store.write().await.remove(namespace);
        self.indexes.write().await.remove(namespace);

        Ok(())
    }
}


/// Builder for constructing [`InMemoryStore`] instances.
///
/// The builder can seed collections with documents, which is convenient for
/// tests reading pre-existing data.
///
/// # Example
///
/// ```ignore
/// use docmap_memory::InMemoryStore;
/// use docmap::backend::{Namespace, StoreBackendBuilder};
///
/// let store = InMemoryStore::builder()
///     .seed(Namespace::new("colors"), vec![(id, doc! { "_id": id, "name": "red" })])
///     .build()
///     .await?;
/// ```
#[derive(Default)]
pub struct InMemoryStoreBuilder {
    seed: StoreMap,
}

impl InMemoryStoreBuilder {
    /// Adds documents to a namespace of the store being built.
    pub fn seed(mut self, namespace: Namespace, documents: Vec<(Uuid, Document)>) -> Self {
        self.seed
            .entry(namespace)
            .or_default()
            .extend(documents);
        self
    }
}

#[async_trait]
impl StoreBackendBuilder for InMemoryStoreBuilder {
    type Backend = InMemoryStore;

    /// Builds and returns a new [`InMemoryStore`] holding the seeded documents.
    async fn build(self) -> DocMapResult<Self::Backend> {
        let store = InMemoryStore::new();
        *store.store.write().await = self.seed;

        Ok(store)
    }
}
