//! The main entry point: a registry bound to storage drivers.
//!
//! A [`DocumentMapper`] owns the frozen [`Registry`] of mapped classes, a default storage
//! driver, and any number of named extra connections for classes bound to them through
//! [`CollectionBinding::Full`]. Everything else (criteria, reference resolution,
//! persistence) goes through it.
//!
//! # Example
//!
//! ```ignore
//! use docmap::prelude::*;
//!
//! let registry = Registry::builder()
//!     .define(ClassDef::new("Shape").field("color", FieldType::String))?
//!     .define(ClassDef::new("Circle").extends("Shape").field("radius", FieldType::Float))?
//!     .build();
//!
//! let mapper = DocumentMapper::builder(registry)
//!     .backend(InMemoryStore::new())
//!     .build()?;
//!
//! let mut circle = mapper.new_instance("Circle")?;
//! circle.set("radius", 2.0)?;
//! mapper.save(&mut circle).await?;
//!
//! let shapes = mapper.criteria("Shape")?.all().await?;
//! assert_eq!(shapes[0].class_name(), "Circle");
//! ```

use bson::{Bson, Document, Uuid};
use std::{collections::HashMap, sync::Arc};

use crate::{
    backend::{DynStoreBackend, Namespace, StoreBackend},
    class::{CollectionBinding, MappedClass},
    criteria::Criteria,
    error::{DocMapError, DocMapResult},
    instance::{ID_KEY, Instance},
    reference::ReferenceResolver,
    registry::Registry,
    resolver::Instantiator,
    value::Value,
};

/// A registry of mapped classes bound to storage drivers.
#[derive(Debug)]
pub struct DocumentMapper {
    registry: Arc<Registry>,
    backend: Box<dyn DynStoreBackend>,
    connections: HashMap<String, Box<dyn DynStoreBackend>>,
}

impl DocumentMapper {
    pub fn builder(registry: Arc<Registry>) -> DocumentMapperBuilder {
        DocumentMapperBuilder::new(registry)
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Returns the default driver.
    pub fn backend(&self) -> &dyn DynStoreBackend {
        &*self.backend
    }

    /// Returns the driver and namespace a collection binding addresses.
    ///
    /// # Errors
    ///
    /// Returns [`DocMapError::UnknownConnection`] if the binding names a connection the
    /// mapper was not built with.
    pub fn backend_for(&self, binding: &CollectionBinding) -> DocMapResult<(&dyn DynStoreBackend, Namespace)> {
        let backend = match binding.connection() {
            None => &*self.backend,
            Some(connection) => &**self
                .connections
                .get(connection)
                .ok_or_else(|| DocMapError::UnknownConnection(connection.to_string()))?,
        };

        Ok((backend, binding.namespace()))
    }

    fn class(&self, name: &str) -> DocMapResult<Arc<MappedClass>> {
        self.registry.class(name).cloned()
    }

    /// Builds a blank instance of a class, with every default applied.
    pub fn new_instance(&self, class: &str) -> DocMapResult<Instance> {
        Ok(Instance::new(self.registry.class(class)?))
    }

    /// Starts an empty criteria targeting a class.
    pub fn criteria(&self, class: &str) -> DocMapResult<Criteria<'_>> {
        Ok(Criteria::new(self, self.class(class)?))
    }

    /// Starts a criteria targeting a class, refined by one of its named scopes.
    pub fn scope(&self, class: &str, name: &str, args: &[Bson]) -> DocMapResult<Criteria<'_>> {
        self.criteria(class)?.scope(name, args)
    }

    /// Finds a document by identity, read through `class`.
    pub async fn find(&self, class: &str, id: Uuid) -> DocMapResult<Option<Instance>> {
        let class = self.class(class)?;
        let (backend, namespace) = self.backend_for(class.binding())?;

        backend
            .get_documents(vec![id], &namespace)
            .await?
            .first()
            .map(|raw| Instantiator::new(&self.registry).instantiate(raw, &class))
            .transpose()
    }

    /// Persists an instance.
    ///
    /// A new instance is inserted and gets its identity assigned; an instance that
    /// already has one is replaced entirely, so every field it holds is written.
    pub async fn save(&self, instance: &mut Instance) -> DocMapResult<()> {
        let (backend, namespace) = self.backend_for(instance.class().binding())?;

        match instance.id() {
            Some(id) => {
                let document = instance.to_document()?;

                log::debug!("Replacing {} {} in {}", instance.class_name(), id, namespace);

                backend
                    .update_documents(vec![(id, document)], &namespace)
                    .await
            }
            None => {
                let id = Uuid::new();
                let mut document = Document::new();
                document.insert(ID_KEY, id);
                for (key, value) in instance.to_document()? {
                    document.insert(key, value);
                }

                log::debug!("Inserting {} {} into {}", instance.class_name(), id, namespace);

                backend
                    .insert_documents(vec![(id, document)], &namespace)
                    .await?;

                instance.assign_id(id)
            }
        }
    }

    /// Deletes the stored document of an instance. Unsaved instances are ignored.
    pub async fn remove(&self, instance: &Instance) -> DocMapResult<()> {
        let Some(id) = instance.id() else {
            return Ok(());
        };
        let (backend, namespace) = self.backend_for(instance.class().binding())?;

        log::debug!("Removing {} {} from {}", instance.class_name(), id, namespace);

        backend
            .delete_documents(vec![id], &namespace)
            .await
    }

    /// Instantiates a raw document read through `class`.
    pub fn instantiate(&self, raw: &Document, class: &str) -> DocMapResult<Instance> {
        Instantiator::new(&self.registry).instantiate(raw, self.registry.class(class)?)
    }

    /// Builds the stored representation of an instance.
    pub fn to_document(&self, instance: &Instance) -> DocMapResult<Document> {
        instance.to_document()
    }

    /// Resolves every reference contained in a value. See [`ReferenceResolver`].
    pub async fn resolve(&self, value: &Value) -> DocMapResult<Value> {
        ReferenceResolver::new(self).resolve(value).await
    }

    /// Resolves the references held by a field of an instance.
    ///
    /// An absent field resolves to [`Value::Null`].
    pub async fn resolve_field(&self, instance: &Instance, field: &str) -> DocMapResult<Value> {
        if instance.class().field(field).is_none() {
            return Err(DocMapError::UnknownField {
                class: instance.class_name().to_string(),
                field: field.to_string(),
            });
        }

        match instance.get(field) {
            Some(value) => self.resolve(value).await,
            None => Ok(Value::Null),
        }
    }

    /// Creates the indexes declared on a class.
    pub async fn ensure_indexes(&self, class: &str) -> DocMapResult<()> {
        let class = self.class(class)?;
        let (backend, namespace) = self.backend_for(class.binding())?;

        for index in class.indexes() {
            log::debug!("Creating index {} on {}", index.name(), namespace);

            backend.create_index(&namespace, index).await?;
        }

        Ok(())
    }

    /// Shuts down the default driver and every named connection.
    pub async fn shutdown(self) -> DocMapResult<()> {
        for (_, backend) in self.connections {
            backend.shutdown_boxed().await?;
        }

        self.backend.shutdown_boxed().await
    }
}

/// Builder for a [`DocumentMapper`].
#[derive(Debug)]
pub struct DocumentMapperBuilder {
    registry: Arc<Registry>,
    backend: Option<Box<dyn DynStoreBackend>>,
    connections: HashMap<String, Box<dyn DynStoreBackend>>,
}

impl DocumentMapperBuilder {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self {
            registry,
            backend: None,
            connections: HashMap::new(),
        }
    }

    /// Sets the default driver.
    pub fn backend<B: StoreBackend + 'static>(mut self, backend: B) -> Self {
        self.backend = Some(Box::new(backend));
        self
    }

    /// Sets the default driver from a boxed trait object.
    pub fn boxed_backend(mut self, backend: Box<dyn DynStoreBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Adds a named connection, addressed by [`CollectionBinding::Full`] bindings.
    pub fn connection<B: StoreBackend + 'static>(mut self, name: impl Into<String>, backend: B) -> Self {
        self.connections.insert(name.into(), Box::new(backend));
        self
    }

    /// Builds the mapper.
    ///
    /// # Errors
    ///
    /// Returns [`DocMapError::Initialization`] if no default driver was set, or if a
    /// registered class is bound to a connection that was not added.
    pub fn build(self) -> DocMapResult<DocumentMapper> {
        let backend = self
            .backend
            .ok_or_else(|| DocMapError::Initialization("no default backend configured".to_string()))?;

        if let Some(connection) = self
            .registry
            .classes()
            .filter_map(|class| class.binding().connection())
            .find(|connection| !self.connections.contains_key(*connection))
        {
            return Err(DocMapError::Initialization(format!(
                "no backend configured for connection {}",
                connection
            )));
        }

        Ok(DocumentMapper {
            registry: self.registry,
            backend,
            connections: self.connections,
        })
    }
}
