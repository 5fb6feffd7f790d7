//! Conversion between in-memory [`Value`]s and their storage representation.
//!
//! Casting is driven by the declared [`FieldType`] of a field:
//!
//! - scalar types apply the same coercion in both directions (a declared `Float` widens
//!   integers, a declared `Integer` accepts integral floats and decimal strings, ...), so
//!   a value written and read back under the same type is unchanged;
//! - arrays and maps are converted element by element, under the declared element type or
//!   under the untyped rules when none is declared;
//! - embeddable types go through their [`Embeddable`](crate::embedded::Embeddable)
//!   capability;
//! - mapped classes are stored as nested documents carrying their own discriminator and
//!   restored through the [`Instantiator`], so a stored subtype comes back as the subtype;
//! - references are stored as `{"$ref", "$id"}` mappings and restored as [`Reference`]
//!   values, never resolved eagerly.
//!
//! Under the untyped rules, a mapped instance with an identity is stored as a reference to
//! it, and one without an identity as a nested document. A raw mapping that is
//! reference-shaped comes back as a reference, and one carrying a known discriminator comes
//! back as an instance of that class.
//!
//! A raw value that cannot be interpreted under the declared type fails with
//! [`DocMapError::TypeCast`]; `null` is accepted by every type.

use bson::{Bson, DateTime, Document, Uuid, spec::BinarySubtype};
use chrono::Utc;

use crate::{
    DISCRIMINATOR_KEY,
    error::{DocMapError, DocMapResult},
    field::FieldType,
    reference::Reference,
    registry::Registry,
    resolver::Instantiator,
    value::Value,
};

/// Converts a value to its storage representation under a declared type.
///
/// `field` names the value in error reports.
pub fn to_storage(field: &str, value: &Value, field_type: &FieldType) -> DocMapResult<Bson> {
    if value.is_null() {
        return Ok(Bson::Null);
    }

    match field_type {
        FieldType::Any => untyped_to_storage(field, value),
        FieldType::String
        | FieldType::Integer
        | FieldType::Float
        | FieldType::Boolean
        | FieldType::DateTime
        | FieldType::Uuid => coerce(value, field_type)
            .map(scalar_to_bson)
            .ok_or_else(|| mismatch(field, value)),
        FieldType::Array(element) => match value {
            Value::Array(items) => Ok(Bson::Array(
                items
                    .iter()
                    .enumerate()
                    .map(|(i, item)| {
                        element_to_storage(&format!("{}.{}", field, i), item, element.as_deref())
                    })
                    .collect::<DocMapResult<Vec<_>>>()?,
            )),
            _ => Err(mismatch(field, value)),
        },
        FieldType::Map(element) => match value {
            Value::Map(entries) => Ok(Bson::Document(
                entries
                    .iter()
                    .map(|(key, entry)| {
                        element_to_storage(&format!("{}.{}", field, key), entry, element.as_deref())
                            .map(|raw| (key.clone(), raw))
                    })
                    .collect::<DocMapResult<Document>>()?,
            )),
            _ => Err(mismatch(field, value)),
        },
        FieldType::Embedded(embedded_type) => match value {
            Value::Embedded(embedded) if embedded_type.accepts(embedded) => Ok(embedded.to_storage()),
            _ => Err(mismatch(field, value)),
        },
        FieldType::Model(class) => match value {
            Value::Instance(instance) if instance.class().is_a(class) => {
                Ok(Bson::Document(instance.to_document()?))
            }
            _ => Err(mismatch(field, value)),
        },
        FieldType::Reference => match value {
            Value::Reference(reference) => reference.to_bson(),
            Value::Instance(instance) => instance
                .to_reference()
                .ok_or_else(|| mismatch(field, value))?
                .to_bson(),
            _ => Err(mismatch(field, value)),
        },
    }
}

/// Checks a value about to be assigned to a field and brings it into the shape a
/// read-back would produce.
///
/// Scalars get the declared type's coercion (an integer assigned to a `Float` field is
/// held as a float), elements of typed containers are normalized recursively, and an
/// instance assigned to a `Reference` field is held as a reference to it.
pub fn normalize(field: &str, value: Value, field_type: &FieldType) -> DocMapResult<Value> {
    if value.is_null() {
        return Ok(Value::Null);
    }

    match (field_type, value) {
        (
            FieldType::String
            | FieldType::Integer
            | FieldType::Float
            | FieldType::Boolean
            | FieldType::DateTime
            | FieldType::Uuid,
            value,
        ) => coerce(&value, field_type).ok_or_else(|| mismatch(field, &value)),
        (FieldType::Array(Some(element)), Value::Array(items)) => Ok(Value::Array(
            items
                .into_iter()
                .enumerate()
                .map(|(i, item)| normalize(&format!("{}.{}", field, i), item, element))
                .collect::<DocMapResult<Vec<_>>>()?,
        )),
        (FieldType::Map(Some(element)), Value::Map(entries)) => Ok(Value::Map(
            entries
                .into_iter()
                .map(|(key, entry)| {
                    normalize(&format!("{}.{}", field, key), entry, element).map(|value| (key, value))
                })
                .collect::<DocMapResult<_>>()?,
        )),
        (FieldType::Reference, Value::Instance(instance)) => match instance.to_reference() {
            Some(reference) => Ok(Value::Reference(reference)),
            None => Err(mismatch(field, &Value::Instance(instance))),
        },
        (field_type, value) => {
            to_storage(field, &value, field_type)?;
            Ok(value)
        }
    }
}

fn element_to_storage(field: &str, value: &Value, element: Option<&FieldType>) -> DocMapResult<Bson> {
    match element {
        Some(field_type) => to_storage(field, value, field_type),
        None => untyped_to_storage(field, value),
    }
}

fn untyped_to_storage(field: &str, value: &Value) -> DocMapResult<Bson> {
    Ok(match value {
        Value::Null => Bson::Null,
        Value::Boolean(_)
        | Value::Integer(_)
        | Value::Float(_)
        | Value::String(_)
        | Value::DateTime(_)
        | Value::Uuid(_) => scalar_to_bson(value.clone()),
        Value::Array(items) => Bson::Array(
            items
                .iter()
                .enumerate()
                .map(|(i, item)| untyped_to_storage(&format!("{}.{}", field, i), item))
                .collect::<DocMapResult<Vec<_>>>()?,
        ),
        Value::Map(entries) => Bson::Document(
            entries
                .iter()
                .map(|(key, entry)| {
                    untyped_to_storage(&format!("{}.{}", field, key), entry)
                        .map(|raw| (key.clone(), raw))
                })
                .collect::<DocMapResult<Document>>()?,
        ),
        Value::Embedded(embedded) => embedded.to_storage(),
        Value::Reference(reference) => reference.to_bson()?,
        Value::Instance(instance) => match instance.to_reference() {
            Some(reference) => reference.to_bson()?,
            None => Bson::Document(instance.to_document()?),
        },
        Value::Raw(raw) => raw.clone(),
    })
}

/// Restores values from their storage representation.
///
/// Restoring nested mapped documents needs the registry, so unlike [`to_storage`] this
/// direction is bound to one.
#[derive(Debug, Clone, Copy)]
pub struct TypeCaster<'r> {
    registry: &'r Registry,
}

impl<'r> TypeCaster<'r> {
    pub fn new(registry: &'r Registry) -> Self {
        Self { registry }
    }

    /// Restores a raw storage value under a declared type.
    ///
    /// # Errors
    ///
    /// Returns [`DocMapError::TypeCast`] naming `field` and `raw` if the raw value cannot
    /// be interpreted under `field_type`, and propagates resolution errors from nested
    /// mapped documents.
    pub fn from_storage(&self, field: &str, raw: &Bson, field_type: &FieldType) -> DocMapResult<Value> {
        if matches!(raw, Bson::Null | Bson::Undefined) {
            return Ok(Value::Null);
        }

        match field_type {
            FieldType::Any => self.untyped_from_storage(field, raw),
            FieldType::String
            | FieldType::Integer
            | FieldType::Float
            | FieldType::Boolean
            | FieldType::DateTime
            | FieldType::Uuid => coerce(&natural(raw), field_type)
                .ok_or_else(|| DocMapError::type_cast(field, raw.clone())),
            FieldType::Array(element) => match raw {
                Bson::Array(items) => Ok(Value::Array(
                    items
                        .iter()
                        .enumerate()
                        .map(|(i, item)| {
                            self.element_from_storage(&format!("{}.{}", field, i), item, element.as_deref())
                        })
                        .collect::<DocMapResult<Vec<_>>>()?,
                )),
                _ => Err(DocMapError::type_cast(field, raw.clone())),
            },
            FieldType::Map(element) => match raw {
                Bson::Document(entries) => Ok(Value::Map(
                    entries
                        .iter()
                        .map(|(key, entry)| {
                            self.element_from_storage(&format!("{}.{}", field, key), entry, element.as_deref())
                                .map(|value| (key.clone(), value))
                        })
                        .collect::<DocMapResult<_>>()?,
                )),
                _ => Err(DocMapError::type_cast(field, raw.clone())),
            },
            FieldType::Embedded(embedded_type) => embedded_type
                .cast_from_storage(raw)
                .map(Value::Embedded)
                .ok_or_else(|| DocMapError::type_cast(field, raw.clone())),
            FieldType::Model(class) => match raw {
                Bson::Document(document) => {
                    let class = self.registry.class(class)?;

                    Ok(Value::Instance(Box::new(
                        Instantiator::new(self.registry).instantiate(document, class)?,
                    )))
                }
                _ => Err(DocMapError::type_cast(field, raw.clone())),
            },
            FieldType::Reference => Reference::from_bson(raw)
                .map(Value::Reference)
                .ok_or_else(|| DocMapError::type_cast(field, raw.clone())),
        }
    }

    fn element_from_storage(&self, field: &str, raw: &Bson, element: Option<&FieldType>) -> DocMapResult<Value> {
        match element {
            Some(field_type) => self.from_storage(field, raw, field_type),
            None => self.untyped_from_storage(field, raw),
        }
    }

    fn untyped_from_storage(&self, field: &str, raw: &Bson) -> DocMapResult<Value> {
        match raw {
            Bson::Array(items) => Ok(Value::Array(
                items
                    .iter()
                    .enumerate()
                    .map(|(i, item)| self.untyped_from_storage(&format!("{}.{}", field, i), item))
                    .collect::<DocMapResult<Vec<_>>>()?,
            )),
            Bson::Document(document) => {
                if let Some(reference) = Reference::from_document(document) {
                    return Ok(Value::Reference(reference));
                }

                let class = document
                    .get(DISCRIMINATOR_KEY)
                    .and_then(Bson::as_str)
                    .and_then(|discriminator| self.registry.by_discriminator(discriminator));

                if let Some(class) = class {
                    return Ok(Value::Instance(Box::new(
                        Instantiator::new(self.registry).instantiate(document, class)?,
                    )));
                }

                Ok(Value::Map(
                    document
                        .iter()
                        .map(|(key, entry)| {
                            self.untyped_from_storage(&format!("{}.{}", field, key), entry)
                                .map(|value| (key.clone(), value))
                        })
                        .collect::<DocMapResult<_>>()?,
                ))
            }
            other => Ok(natural(other)),
        }
    }
}

/// Maps a raw scalar onto the value variant it naturally corresponds to.
fn natural(raw: &Bson) -> Value {
    match raw {
        Bson::Null | Bson::Undefined => Value::Null,
        Bson::Boolean(value) => Value::Boolean(*value),
        Bson::Int32(value) => Value::Integer(*value as i64),
        Bson::Int64(value) => Value::Integer(*value),
        Bson::Double(value) => Value::Float(*value),
        Bson::String(value) => Value::String(value.clone()),
        Bson::DateTime(value) => Value::DateTime(*value),
        Bson::Binary(binary) if binary.subtype == BinarySubtype::Uuid => binary
            .to_uuid()
            .map(Value::Uuid)
            .unwrap_or_else(|_| Value::Raw(raw.clone())),
        other => Value::Raw(other.clone()),
    }
}

/// Applies the coercion rule of a declared scalar type, or `None` if the value cannot be
/// interpreted under it.
fn coerce(value: &Value, field_type: &FieldType) -> Option<Value> {
    match (field_type, value) {
        (FieldType::String, Value::String(_)) => Some(value.clone()),
        (FieldType::String, Value::Integer(i)) => Some(Value::String(i.to_string())),
        (FieldType::String, Value::Float(f)) => Some(Value::String(f.to_string())),
        (FieldType::String, Value::Boolean(b)) => Some(Value::String(b.to_string())),
        (FieldType::String, Value::Uuid(uuid)) => Some(Value::String(uuid.to_string())),

        (FieldType::Integer, Value::Integer(_)) => Some(value.clone()),
        (FieldType::Integer, Value::Float(f))
            if f.fract() == 0.0 && *f >= i64::MIN as f64 && *f <= i64::MAX as f64 =>
        {
            Some(Value::Integer(*f as i64))
        }
        (FieldType::Integer, Value::String(s)) => s.trim().parse().ok().map(Value::Integer),

        (FieldType::Float, Value::Float(_)) => Some(value.clone()),
        (FieldType::Float, Value::Integer(i)) => Some(Value::Float(*i as f64)),
        (FieldType::Float, Value::String(s)) => s.trim().parse().ok().map(Value::Float),

        (FieldType::Boolean, Value::Boolean(_)) => Some(value.clone()),
        (FieldType::Boolean, Value::Integer(0)) => Some(Value::Boolean(false)),
        (FieldType::Boolean, Value::Integer(1)) => Some(Value::Boolean(true)),
        (FieldType::Boolean, Value::String(s)) => match s.trim() {
            "true" | "1" => Some(Value::Boolean(true)),
            "false" | "0" => Some(Value::Boolean(false)),
            _ => None,
        },

        (FieldType::DateTime, Value::DateTime(_)) => Some(value.clone()),
        (FieldType::DateTime, Value::Integer(millis)) => Some(Value::DateTime(DateTime::from_millis(*millis))),
        (FieldType::DateTime, Value::String(s)) => chrono::DateTime::parse_from_rfc3339(s.trim())
            .ok()
            .map(|parsed| Value::DateTime(DateTime::from_chrono(parsed.with_timezone(&Utc)))),

        (FieldType::Uuid, Value::Uuid(_)) => Some(value.clone()),
        (FieldType::Uuid, Value::String(s)) => Uuid::parse_str(s.trim()).ok().map(Value::Uuid),

        _ => None,
    }
}

fn scalar_to_bson(value: Value) -> Bson {
    match value {
        Value::Boolean(value) => Bson::Boolean(value),
        Value::Integer(value) => Bson::Int64(value),
        Value::Float(value) => Bson::Double(value),
        Value::String(value) => Bson::String(value),
        Value::DateTime(value) => Bson::DateTime(value),
        Value::Uuid(value) => Bson::from(value),
        _ => Bson::Null,
    }
}

/// Builds the cast error for an in-memory value that does not fit its declared type.
fn mismatch(field: &str, value: &Value) -> DocMapError {
    let raw = untyped_to_storage(field, value)
        .unwrap_or_else(|_| Bson::String(format!("{:?}", value)));

    DocMapError::type_cast(field, raw)
}
