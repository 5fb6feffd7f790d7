//! Polymorphic instantiation of stored documents.
//!
//! Every stored document carries the discriminator of the class it was saved as. Reading
//! it back through a class higher up the hierarchy (say, reading a `Circle` through
//! `Shape`) yields an instance of the stored subclass. The class issuing the read bounds
//! what may come back:
//!
//! | stored discriminator                | result                                |
//! |-------------------------------------|---------------------------------------|
//! | absent                              | the issuing class                     |
//! | the issuing class or a descendant   | that class                            |
//! | an ancestor of the issuing class    | the issuing class (logged as warning) |
//! | unknown, unrelated or not a string  | [`DocMapError::Resolution`]           |

use bson::{Bson, Document, spec::BinarySubtype};
use std::sync::Arc;

use crate::{
    caster::TypeCaster,
    class::MappedClass,
    error::{DocMapError, DocMapResult},
    instance::{DISCRIMINATOR_KEY, ID_KEY, Instance},
    registry::Registry,
};

/// Builds instances from raw stored documents.
#[derive(Debug, Clone, Copy)]
pub struct Instantiator<'r> {
    registry: &'r Registry,
}

impl<'r> Instantiator<'r> {
    pub fn new(registry: &'r Registry) -> Self {
        Self { registry }
    }

    /// Picks the concrete class of a raw document read through `issuing`.
    pub fn resolve_class(&self, raw: &Document, issuing: &Arc<MappedClass>) -> DocMapResult<Arc<MappedClass>> {
        let discriminator = match raw.get(DISCRIMINATOR_KEY) {
            None | Some(Bson::Null) => return Ok(issuing.clone()),
            Some(Bson::String(discriminator)) => discriminator,
            Some(other) => {
                return Err(DocMapError::Resolution {
                    discriminator: other.to_string(),
                    class: issuing.name().to_string(),
                });
            }
        };

        match self.registry.by_discriminator(discriminator) {
            Some(class) if self.registry.is_descendant_of(class.name(), issuing.name()) => Ok(class.clone()),
            Some(class) if self.registry.is_descendant_of(issuing.name(), class.name()) => {
                log::warn!(
                    "Document discriminated as {} read through subclass {}, instantiating as {}",
                    discriminator,
                    issuing.name(),
                    issuing.name()
                );
                Ok(issuing.clone())
            }
            _ => Err(DocMapError::Resolution {
                discriminator: discriminator.clone(),
                class: issuing.name().to_string(),
            }),
        }
    }

    /// Builds an instance from a raw document read through `issuing`.
    ///
    /// Defaults of the resolved class are applied first, then declared keys are cast over
    /// them and every other key is kept as an undeclared attribute. The identity, if
    /// present, is assigned last.
    ///
    /// # Errors
    ///
    /// Returns [`DocMapError::Resolution`] if the discriminator cannot be instantiated
    /// through `issuing`, and [`DocMapError::TypeCast`] if a declared field or the
    /// identity cannot be cast.
    pub fn instantiate(&self, raw: &Document, issuing: &Arc<MappedClass>) -> DocMapResult<Instance> {
        let class = self.resolve_class(raw, issuing)?;
        let caster = TypeCaster::new(self.registry);
        let mut instance = Instance::new(&class);

        for (key, value) in raw {
            if key == ID_KEY || key == DISCRIMINATOR_KEY {
                continue;
            }

            match class.field(key) {
                Some(field) => instance.insert_field(key, caster.from_storage(key, value, field.field_type())?),
                None => instance.insert_attribute(key, value.clone()),
            }
        }

        match raw.get(ID_KEY) {
            None | Some(Bson::Null) => {}
            Some(Bson::Binary(binary)) if binary.subtype == BinarySubtype::Uuid => {
                let id = binary
                    .to_uuid()
                    .map_err(|_| DocMapError::type_cast(ID_KEY, Bson::Binary(binary.clone())))?;

                instance.assign_id(id)?;
            }
            Some(other) => return Err(DocMapError::type_cast(ID_KEY, other.clone())),
        }

        Ok(instance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::{Uuid, doc};

    use crate::{class::ClassDef, field::FieldType, value::Value};

    fn registry() -> Arc<Registry> {
        Registry::builder()
            .define(ClassDef::new("Shape").field_with_default("color", FieldType::String, "black"))
            .unwrap()
            .define(
                ClassDef::new("Circle")
                    .extends("Shape")
                    .field_with("tags", FieldType::array(), || Value::Array(Vec::new()))
                    .field("radius", FieldType::Float),
            )
            .unwrap()
            .define(ClassDef::new("Color").field("name", FieldType::String))
            .unwrap()
            .build()
    }

    #[test]
    fn test_subclass_read_back_through_parent() {
        let registry = registry();
        let shape = registry.class("Shape").unwrap();
        let id = Uuid::new();
        let raw = doc! { "_id": id, "_type": "Circle", "color": "red", "radius": 2 };

        let instance = Instantiator::new(&registry).instantiate(&raw, shape).unwrap();

        assert_eq!(instance.class_name(), "Circle");
        assert_eq!(instance.id(), Some(id));
        assert_eq!(instance.get("color"), Some(&Value::from("red")));
        assert_eq!(instance.get("radius"), Some(&Value::Float(2.0)));
        assert_eq!(instance.get("tags"), Some(&Value::Array(Vec::new())));
    }

    #[test]
    fn test_missing_discriminator_uses_issuing_class() {
        let registry = registry();
        let raw = doc! { "radius": 1.0 };

        let instance = Instantiator::new(&registry)
            .instantiate(&raw, registry.class("Circle").unwrap())
            .unwrap();

        assert_eq!(instance.class_name(), "Circle");
        assert!(instance.is_new());
    }

    #[test]
    fn test_ancestor_discriminator_falls_back_to_issuing_class() {
        let registry = registry();
        let raw = doc! { "_type": "Shape", "color": "red" };

        let instance = Instantiator::new(&registry)
            .instantiate(&raw, registry.class("Circle").unwrap())
            .unwrap();

        assert_eq!(instance.class_name(), "Circle");
    }

    #[test]
    fn test_unrelated_or_unknown_discriminators_fail() {
        let registry = registry();
        let instantiator = Instantiator::new(&registry);
        let shape = registry.class("Shape").unwrap();

        for raw in [
            doc! { "_type": "Color" },
            doc! { "_type": "Hexagon" },
            doc! { "_type": 7 },
        ] {
            assert!(matches!(
                instantiator.instantiate(&raw, shape),
                Err(DocMapError::Resolution { .. })
            ));
        }
    }

    #[test]
    fn test_undeclared_keys_become_attributes() {
        let registry = registry();
        let raw = doc! { "_type": "Shape", "color": "red", "legacy": { "nested": [1, 2] } };

        let instance = Instantiator::new(&registry)
            .instantiate(&raw, registry.class("Shape").unwrap())
            .unwrap();

        assert_eq!(
            instance.attribute("legacy"),
            Some(&Bson::Document(doc! { "nested": [1, 2] }))
        );
        assert!(instance.get("legacy").is_none());
    }

    #[test]
    fn test_invalid_identity_fails_with_type_cast() {
        let registry = registry();
        let raw = doc! { "_id": "not-a-uuid", "_type": "Shape" };

        match Instantiator::new(&registry).instantiate(&raw, registry.class("Shape").unwrap()) {
            Err(DocMapError::TypeCast { field, .. }) => assert_eq!(field, ID_KEY),
            other => panic!("expected a cast error, got {:?}", other),
        }
    }

    #[test]
    fn test_instantiated_producer_defaults_are_isolated() {
        let registry = registry();
        let circle = registry.class("Circle").unwrap();
        let instantiator = Instantiator::new(&registry);

        let mut first = instantiator.instantiate(&doc! {}, circle).unwrap();
        let second = instantiator.instantiate(&doc! {}, circle).unwrap();

        first
            .get_mut("tags")
            .and_then(Value::as_array_mut)
            .unwrap()
            .push(Value::Integer(1));

        assert_eq!(second.get("tags"), Some(&Value::Array(Vec::new())));
    }
}
