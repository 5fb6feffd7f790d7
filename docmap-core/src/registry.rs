//! The class registry.
//!
//! All mapped classes are registered once, through a [`RegistryBuilder`], and then frozen
//! into an immutable [`Registry`] shared behind an `Arc`. The registry is what the
//! instantiator consults to turn a stored discriminator into a class, and what answers
//! lineage questions ("is `Circle` a descendant of `Shape`?") through explicit parent
//! pointers.
//!
//! Inheritance is by value: a subclass copies its parent's fields, indexes and scopes at
//! the moment it is defined. Declaring a field on the parent afterwards does not reach
//! the subclass, and redeclaring a field on the subclass never touches the parent.
//!
//! A registry is typically built once at startup, or lazily behind a
//! [`std::sync::OnceLock`]:
//!
//! ```ignore
//! static REGISTRY: OnceLock<Arc<Registry>> = OnceLock::new();
//!
//! fn registry() -> &'static Arc<Registry> {
//!     REGISTRY.get_or_init(|| {
//!         Registry::builder()
//!             .define(ClassDef::new("Shape").field("color", FieldType::String))
//!             .and_then(|builder| builder.define(ClassDef::new("Circle").extends("Shape")))
//!             .expect("valid registry")
//!             .build()
//!     })
//! }
//! ```

use indexmap::IndexMap;
use std::{collections::HashMap, sync::Arc};

use crate::{
    class::{ClassDef, CollectionBinding, MappedClass, default_collection_name},
    error::{DocMapError, DocMapResult},
    field::FieldDefinition,
};

/// Immutable set of mapped classes.
#[derive(Debug, Default)]
pub struct Registry {
    classes: IndexMap<String, Arc<MappedClass>>,
    discriminators: HashMap<String, String>,
}

impl Registry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    pub fn get(&self, name: &str) -> Option<&Arc<MappedClass>> {
        self.classes.get(name)
    }

    /// Returns the class with the given name, or [`DocMapError::UnknownClass`].
    pub fn class(&self, name: &str) -> DocMapResult<&Arc<MappedClass>> {
        self.get(name)
            .ok_or_else(|| DocMapError::UnknownClass(name.to_string()))
    }

    /// Returns the class stored under the given discriminator value.
    pub fn by_discriminator(&self, discriminator: &str) -> Option<&Arc<MappedClass>> {
        self.discriminators
            .get(discriminator)
            .and_then(|name| self.classes.get(name))
    }

    pub fn classes(&self) -> impl Iterator<Item = &Arc<MappedClass>> {
        self.classes.values()
    }

    /// Returns `true` if `class` is `ancestor` or inherits from it, directly or not.
    pub fn is_descendant_of(&self, class: &str, ancestor: &str) -> bool {
        let mut current = self.get(class);

        while let Some(mapped) = current {
            if mapped.name() == ancestor {
                return true;
            }
            current = mapped.parent().and_then(|parent| self.get(parent));
        }

        false
    }

    /// Returns `class` and every registered class inheriting from it.
    pub fn descendants(&self, class: &str) -> Vec<&Arc<MappedClass>> {
        self.classes
            .values()
            .filter(|mapped| self.is_descendant_of(mapped.name(), class))
            .collect()
    }

    /// Returns the class that owns a collection: the topmost class bound to it.
    pub fn root_for_collection(&self, collection: &str) -> Option<&Arc<MappedClass>> {
        self.classes.values().find(|mapped| {
            mapped.collection_name() == collection
                && mapped
                    .parent()
                    .and_then(|parent| self.get(parent))
                    .is_none_or(|parent| parent.collection_name() != collection)
        })
    }
}

/// Collects class definitions and freezes them into a [`Registry`].
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    classes: IndexMap<String, MappedClass>,
}

impl RegistryBuilder {
    /// Registers a class.
    ///
    /// A subclass inherits, by value, the fields, indexes and scopes its parent has at
    /// this point, and the parent's collection binding unless it declares its own.
    /// A root class without an explicit binding is stored in a collection named after
    /// it (see [`default_collection_name`]).
    ///
    /// # Errors
    ///
    /// Returns [`DocMapError::Registry`] if the class name or discriminator is already
    /// taken, or if the parent has not been registered yet.
    pub fn define(mut self, def: ClassDef) -> DocMapResult<Self> {
        if self.classes.contains_key(&def.name) {
            return Err(DocMapError::Registry(format!("class {} is already defined", def.name)));
        }

        let discriminator = def.discriminator.unwrap_or_else(|| def.name.clone());

        if self
            .classes
            .values()
            .any(|mapped| mapped.discriminator == discriminator)
        {
            return Err(DocMapError::Registry(format!("discriminator {} is already in use", discriminator)));
        }

        let mapped = match def.parent.clone() {
            Some(parent_name) => {
                let parent = self
                    .classes
                    .get(&parent_name)
                    .ok_or_else(|| DocMapError::Registry(format!(
                        "parent {} of {} is not defined",
                        parent_name, def.name
                    )))?;

                let mut fields = parent.fields.clone();
                fields.extend(def.fields);

                let mut indexes = parent.indexes.clone();
                indexes.extend(def.indexes);

                let mut scopes = parent.scopes.clone();
                scopes.extend(def.scopes);

                let mut ancestors = vec![parent_name.clone()];
                ancestors.extend(parent.ancestors.iter().cloned());

                MappedClass {
                    binding: def.binding.unwrap_or_else(|| parent.binding.clone()),
                    name: def.name,
                    parent: Some(parent_name),
                    ancestors,
                    fields,
                    discriminator,
                    indexes,
                    scopes,
                }
            }
            None => MappedClass {
                binding: def
                    .binding
                    .unwrap_or_else(|| CollectionBinding::Named(default_collection_name(&def.name))),
                name: def.name,
                parent: None,
                ancestors: Vec::new(),
                fields: def.fields,
                discriminator,
                indexes: def.indexes,
                scopes: def.scopes,
            },
        };

        log::debug!(
            "Defined class {} ({} field(s)) in collection {}",
            mapped.name,
            mapped.fields.len(),
            mapped.binding.name()
        );

        self.classes.insert(mapped.name.clone(), mapped);

        Ok(self)
    }

    /// Declares a field on an already defined class, replacing a field with the same name.
    ///
    /// Subclasses defined earlier are not affected.
    pub fn declare_field(&mut self, class: &str, field: FieldDefinition) -> DocMapResult<&mut Self> {
        self.classes
            .get_mut(class)
            .ok_or_else(|| DocMapError::UnknownClass(class.to_string()))?
            .fields
            .insert(field.name().to_string(), field);

        Ok(self)
    }

    /// Freezes the registered classes.
    pub fn build(self) -> Arc<Registry> {
        let discriminators = self
            .classes
            .values()
            .map(|mapped| (mapped.discriminator.clone(), mapped.name.clone()))
            .collect();

        Arc::new(Registry {
            classes: self
                .classes
                .into_iter()
                .map(|(name, mapped)| (name, Arc::new(mapped)))
                .collect(),
            discriminators,
        })
    }
}
