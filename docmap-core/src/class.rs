//! Mapped class declarations.
//!
//! A [`ClassDef`] is the declaration an application writes for one of its document
//! types: its fields, where it is stored, its discriminator, its indexes and its named
//! scopes. Registering it in a [`RegistryBuilder`](crate::registry::RegistryBuilder)
//! freezes it into a [`MappedClass`], with inheritance and collection defaults applied.
//!
//! # Example
//!
//! ```ignore
//! use bson::doc;
//! use docmap_core::{class::{ClassDef, IndexSpec}, field::FieldType};
//!
//! let shape = ClassDef::new("Shape")
//!     .field("color", FieldType::String)
//!     .index(IndexSpec::new("by_color").key("color"))
//!     .scope("red", |criteria, _| Ok(criteria.filter(doc! { "color": "red" })));
//!
//! let circle = ClassDef::new("Circle")
//!     .extends("Shape")
//!     .field_with_default("radius", FieldType::Float, 1.0);
//! ```

use bson::{Bson, Document};
use indexmap::IndexMap;
use std::{fmt, sync::Arc};

use crate::{
    backend::Namespace,
    criteria::Criteria,
    error::DocMapResult,
    field::{FieldDefinition, FieldType},
    value::Value,
};

/// A named, reusable query fragment exposed by a mapped class.
///
/// A scope receives the criteria it refines plus caller-supplied arguments. Scopes may
/// call other scopes, so a class can build a library of composable finders.
pub type Scope = Arc<dyn for<'a> Fn(Criteria<'a>, &[Bson]) -> DocMapResult<Criteria<'a>> + Send + Sync>;

/// Where the documents of a class live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CollectionBinding {
    /// A collection on the mapper's default connection and database.
    Named(String),
    /// A collection on an explicitly named connection and database.
    Full {
        connection: String,
        database: String,
        name: String,
    },
}

impl CollectionBinding {
    pub fn named(name: impl Into<String>) -> Self {
        CollectionBinding::Named(name.into())
    }

    pub fn full(
        connection: impl Into<String>,
        database: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        CollectionBinding::Full {
            connection: connection.into(),
            database: database.into(),
            name: name.into(),
        }
    }

    /// The collection name, which is also the namespace references point into.
    pub fn name(&self) -> &str {
        match self {
            CollectionBinding::Named(name) => name,
            CollectionBinding::Full { name, .. } => name,
        }
    }

    /// The connection name, or `None` for the default connection.
    pub fn connection(&self) -> Option<&str> {
        match self {
            CollectionBinding::Named(_) => None,
            CollectionBinding::Full { connection, .. } => Some(connection),
        }
    }

    /// The driver-level namespace for this binding.
    pub fn namespace(&self) -> Namespace {
        match self {
            CollectionBinding::Named(name) => Namespace::new(name.clone()),
            CollectionBinding::Full { database, name, .. } => {
                Namespace::in_database(database.clone(), name.clone())
            }
        }
    }
}

/// A declared index: an ordered key list plus a uniqueness flag.
///
/// The mapper only carries index declarations; creating them is up to the driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSpec {
    name: String,
    keys: Vec<(String, i32)>,
    unique: bool,
}

impl IndexSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            keys: Vec::new(),
            unique: false,
        }
    }

    /// Adds an ascending key.
    pub fn key(mut self, field: impl Into<String>) -> Self {
        self.keys.push((field.into(), 1));
        self
    }

    /// Adds a descending key.
    pub fn key_desc(mut self, field: impl Into<String>) -> Self {
        self.keys.push((field.into(), -1));
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn keys(&self) -> &[(String, i32)] {
        &self.keys
    }

    pub fn is_unique(&self) -> bool {
        self.unique
    }

    /// The key specification as a document, e.g. `{ "color": 1, "radius": -1 }`.
    pub fn keys_document(&self) -> Document {
        self.keys
            .iter()
            .map(|(field, direction)| (field.clone(), Bson::Int32(*direction)))
            .collect()
    }
}

/// The declaration of a mapped class, before registration.
#[derive(Clone)]
pub struct ClassDef {
    pub(crate) name: String,
    pub(crate) parent: Option<String>,
    pub(crate) fields: IndexMap<String, FieldDefinition>,
    pub(crate) binding: Option<CollectionBinding>,
    pub(crate) discriminator: Option<String>,
    pub(crate) indexes: Vec<IndexSpec>,
    pub(crate) scopes: IndexMap<String, Scope>,
}

impl ClassDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parent: None,
            fields: IndexMap::new(),
            binding: None,
            discriminator: None,
            indexes: Vec::new(),
            scopes: IndexMap::new(),
        }
    }

    /// Makes this class a subclass of an already registered class.
    pub fn extends(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    /// Declares a field with no default.
    pub fn field(self, name: impl Into<String>, field_type: FieldType) -> Self {
        self.declare(FieldDefinition::new(name, field_type))
    }

    /// Declares a field with a fixed default.
    pub fn field_with_default(
        self,
        name: impl Into<String>,
        field_type: FieldType,
        default: impl Into<Value>,
    ) -> Self {
        self.declare(FieldDefinition::new(name, field_type).with_default(default))
    }

    /// Declares a field whose default is produced per instance.
    pub fn field_with<F>(self, name: impl Into<String>, field_type: FieldType, producer: F) -> Self
    where
        F: Fn() -> Value + Send + Sync + 'static,
    {
        self.declare(FieldDefinition::new(name, field_type).with_producer(producer))
    }

    /// Declares a field, replacing any earlier declaration with the same name.
    pub fn declare(mut self, field: FieldDefinition) -> Self {
        self.fields.insert(field.name().to_string(), field);
        self
    }

    /// Stores this class in the named collection on the default connection.
    pub fn collection(mut self, name: impl Into<String>) -> Self {
        self.binding = Some(CollectionBinding::named(name));
        self
    }

    /// Stores this class according to an explicit binding.
    pub fn bind(mut self, binding: CollectionBinding) -> Self {
        self.binding = Some(binding);
        self
    }

    pub fn discriminator(mut self, value: impl Into<String>) -> Self {
        self.discriminator = Some(value.into());
        self
    }

    pub fn index(mut self, index: IndexSpec) -> Self {
        self.indexes.push(index);
        self
    }

    /// Registers a named scope.
    pub fn scope<F>(mut self, name: impl Into<String>, scope: F) -> Self
    where
        F: for<'a> Fn(Criteria<'a>, &[Bson]) -> DocMapResult<Criteria<'a>> + Send + Sync + 'static,
    {
        self.scopes.insert(name.into(), Arc::new(scope));
        self
    }
}

impl fmt::Debug for ClassDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassDef")
            .field("name", &self.name)
            .field("parent", &self.parent)
            .field("fields", &self.fields)
            .field("binding", &self.binding)
            .field("discriminator", &self.discriminator)
            .field("indexes", &self.indexes)
            .field("scopes", &self.scopes.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// A registered class: immutable metadata shared by every instance of the class.
pub struct MappedClass {
    pub(crate) name: String,
    pub(crate) parent: Option<String>,
    /// Every ancestor, nearest first.
    pub(crate) ancestors: Vec<String>,
    pub(crate) fields: IndexMap<String, FieldDefinition>,
    pub(crate) binding: CollectionBinding,
    pub(crate) discriminator: String,
    pub(crate) indexes: Vec<IndexSpec>,
    pub(crate) scopes: IndexMap<String, Scope>,
}

impl MappedClass {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parent(&self) -> Option<&str> {
        self.parent.as_deref()
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    /// Returns `true` if this class is `class` or inherits from it.
    pub fn is_a(&self, class: &str) -> bool {
        self.name == class || self.ancestors.iter().any(|ancestor| ancestor == class)
    }

    pub fn field(&self, name: &str) -> Option<&FieldDefinition> {
        self.fields.get(name)
    }

    /// Declared fields, in declaration order (inherited fields first).
    pub fn fields(&self) -> impl Iterator<Item = &FieldDefinition> {
        self.fields.values()
    }

    pub fn binding(&self) -> &CollectionBinding {
        &self.binding
    }

    pub fn collection_name(&self) -> &str {
        self.binding.name()
    }

    pub fn discriminator(&self) -> &str {
        &self.discriminator
    }

    pub fn indexes(&self) -> &[IndexSpec] {
        &self.indexes
    }

    pub fn scope(&self, name: &str) -> Option<&Scope> {
        self.scopes.get(name)
    }

    pub fn scope_names(&self) -> impl Iterator<Item = &str> {
        self.scopes.keys().map(String::as_str)
    }
}

impl fmt::Debug for MappedClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MappedClass")
            .field("name", &self.name)
            .field("parent", &self.parent)
            .field("binding", &self.binding)
            .field("discriminator", &self.discriminator)
            .finish_non_exhaustive()
    }
}

/// Derives the default collection name of a root class: snake case, pluralized.
///
/// ```ignore
/// assert_eq!(default_collection_name("Shape"), "shapes");
/// assert_eq!(default_collection_name("LineItem"), "line_items");
/// assert_eq!(default_collection_name("Category"), "categories");
/// assert_eq!(default_collection_name("Box"), "boxes");
/// ```
pub fn default_collection_name(class: &str) -> String {
    let mut snake = String::with_capacity(class.len() + 4);

    for (i, ch) in class.chars().enumerate() {
        if ch.is_uppercase() {
            if i > 0 {
                snake.push('_');
            }
            snake.extend(ch.to_lowercase());
        } else {
            snake.push(ch);
        }
    }

    if snake.ends_with('y')
        && !snake
            .chars()
            .rev()
            .nth(1)
            .is_some_and(|ch| "aeiou".contains(ch))
    {
        snake.pop();
        snake.push_str("ies");
    } else if ["s", "x", "z", "ch", "sh"]
        .iter()
        .any(|suffix| snake.ends_with(suffix))
    {
        snake.push_str("es");
    } else {
        snake.push('s');
    }

    snake
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn test_default_collection_name() {
        assert_eq!(default_collection_name("Shape"), "shapes");
        assert_eq!(default_collection_name("LineItem"), "line_items");
        assert_eq!(default_collection_name("Category"), "categories");
        assert_eq!(default_collection_name("Day"), "days");
        assert_eq!(default_collection_name("Box"), "boxes");
        assert_eq!(default_collection_name("Match"), "matches");
    }

    #[test]
    fn test_index_spec_keys() {
        let index = IndexSpec::new("color_radius")
            .key("color")
            .key_desc("radius")
            .unique();

        assert!(index.is_unique());
        assert_eq!(index.keys_document(), doc! { "color": 1, "radius": -1 });
    }

    #[test]
    fn test_binding_namespace() {
        let binding = CollectionBinding::full("analytics", "reports", "events");

        assert_eq!(binding.name(), "events");
        assert_eq!(binding.connection(), Some("analytics"));
        assert_eq!(binding.namespace(), Namespace::in_database("reports", "events"));
        assert_eq!(CollectionBinding::named("shapes").namespace(), Namespace::new("shapes"));
    }

    #[test]
    fn test_redeclaring_a_field_replaces_it() {
        let class = ClassDef::new("Shape")
            .field("color", FieldType::String)
            .field_with_default("color", FieldType::String, "red");

        assert_eq!(class.fields.len(), 1);
        assert!(class.fields["color"].default_value().produce().is_some());
    }
}
