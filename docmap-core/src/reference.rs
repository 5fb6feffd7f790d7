//! Cross-document references and their resolution.
//!
//! A [`Reference`] only *names* another document: a collection plus an identity. It is
//! stored as a two-entry mapping `{"$ref": <collection>, "$id": <uuid>}` and restored as a
//! `Reference` value, never as the target instance. Turning references into instances is
//! the job of the [`ReferenceResolver`], which walks any value shape (a single reference,
//! or references nested in arrays and maps at any depth) and issues one batched lookup per
//! distinct target collection.
//!
//! Dangling references resolve to [`Value::Null`]; they never fail a resolution.

use bson::{Bson, Document, Uuid, de::deserialize_from_bson, ser::serialize_to_bson};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, fmt, sync::Arc};

use crate::{
    class::MappedClass,
    error::{DocMapError, DocMapResult},
    instance::{DISCRIMINATOR_KEY, Instance},
    mapper::DocumentMapper,
    registry::Registry,
    resolver::Instantiator,
    value::Value,
};

/// Key holding the target collection in the stored representation.
pub const REFERENCE_NAMESPACE_KEY: &str = "$ref";
/// Key holding the target identity in the stored representation.
pub const REFERENCE_ID_KEY: &str = "$id";

/// A link to another document, by collection name and identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Reference {
    #[serde(rename = "$ref")]
    namespace: String,
    #[serde(rename = "$id")]
    id: Uuid,
}

impl Reference {
    pub fn new(namespace: impl Into<String>, id: Uuid) -> Self {
        Self { namespace: namespace.into(), id }
    }

    /// The name of the collection holding the target document.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// The identity of the target document.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Converts this reference to its stored representation.
    pub fn to_bson(&self) -> DocMapResult<Bson> {
        Ok(serialize_to_bson(self)?)
    }

    /// Restores a reference from a raw value, if the value is reference-shaped.
    pub fn from_bson(raw: &Bson) -> Option<Self> {
        match raw {
            Bson::Document(document) => Self::from_document(document),
            _ => None,
        }
    }

    /// Restores a reference from a raw mapping with exactly the namespace and identity keys.
    pub fn from_document(document: &Document) -> Option<Self> {
        if !is_reference_shaped(document) {
            return None;
        }

        deserialize_from_bson(Bson::Document(document.clone())).ok()
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.id)
    }
}

/// Returns `true` if a raw mapping has the shape of a stored reference.
pub fn is_reference_shaped(document: &Document) -> bool {
    document.len() == 2
        && document.contains_key(REFERENCE_NAMESPACE_KEY)
        && document.contains_key(REFERENCE_ID_KEY)
}

/// Resolves references inside arbitrary value shapes into live instances.
///
/// Resolution is read-only and uncached: every call performs its own lookups.
#[derive(Debug)]
pub struct ReferenceResolver<'a> {
    mapper: &'a DocumentMapper,
}

impl<'a> ReferenceResolver<'a> {
    pub fn new(mapper: &'a DocumentMapper) -> Self {
        Self { mapper }
    }

    /// Resolves every reference contained in `value`.
    ///
    /// - a [`Value::Reference`] becomes the target [`Value::Instance`], or [`Value::Null`]
    ///   when the target does not exist;
    /// - arrays and maps are rebuilt with the same order and keys, their references
    ///   resolved and every other element passed through unchanged;
    /// - any other value is returned as is.
    ///
    /// All references are grouped by namespace and fetched with one identity-set lookup
    /// per namespace.
    pub async fn resolve(&self, value: &Value) -> DocMapResult<Value> {
        let mut groups: IndexMap<String, Vec<Uuid>> = IndexMap::new();
        collect_references(value, &mut groups);

        if groups.is_empty() {
            return Ok(value.clone());
        }

        let mut found: HashMap<Reference, Instance> = HashMap::new();

        let registry = self.mapper.registry();
        let instantiator = Instantiator::new(registry);

        for (namespace, ids) in groups {
            let root = registry
                .root_for_collection(&namespace)
                .ok_or_else(|| DocMapError::UnknownCollection(namespace.clone()))?;
            let (backend, target) = self.mapper.backend_for(root.binding())?;

            log::debug!("Resolving {} reference(s) into {}", ids.len(), target);

            for raw in backend.get_documents(ids, &target).await? {
                let instance = instantiator.instantiate(&raw, owning_class(registry, root, &raw))?;

                if let Some(id) = instance.id() {
                    found.insert(Reference::new(namespace.clone(), id), instance);
                }
            }
        }

        Ok(substitute(value, &found))
    }
}

/// Picks the class a document fetched from `root`'s collection is read through.
///
/// Unrelated classes may share a collection, so a document is read through the class its
/// discriminator names when that class is stored alongside `root`. Anything else is read
/// through `root`, which rejects unknown discriminators.
fn owning_class<'r>(registry: &'r Registry, root: &'r Arc<MappedClass>, raw: &Document) -> &'r Arc<MappedClass> {
    raw.get(DISCRIMINATOR_KEY)
        .and_then(Bson::as_str)
        .and_then(|discriminator| registry.by_discriminator(discriminator))
        .filter(|class| class.binding() == root.binding())
        .unwrap_or(root)
}

fn collect_references(value: &Value, groups: &mut IndexMap<String, Vec<Uuid>>) {
    match value {
        Value::Reference(reference) => {
            let ids = groups
                .entry(reference.namespace().to_string())
                .or_default();

            if !ids.contains(&reference.id()) {
                ids.push(reference.id());
            }
        }
        Value::Array(items) => items
            .iter()
            .for_each(|item| collect_references(item, groups)),
        Value::Map(entries) => entries
            .values()
            .for_each(|entry| collect_references(entry, groups)),
        _ => {}
    }
}

fn substitute(value: &Value, found: &HashMap<Reference, Instance>) -> Value {
    match value {
        Value::Reference(reference) => match found.get(reference) {
            Some(instance) => Value::Instance(Box::new(instance.clone())),
            None => {
                log::debug!("Dangling reference {}", reference);
                Value::Null
            }
        },
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| substitute(item, found))
                .collect()
        ),
        Value::Map(entries) => Value::Map(
            entries
                .iter()
                .map(|(key, entry)| (key.clone(), substitute(entry, found)))
                .collect()
        ),
        other => other.clone(),
    }
}
