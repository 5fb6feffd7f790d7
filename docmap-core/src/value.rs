//! In-memory values held by mapped instances.
//!
//! A [`Value`] is what application code reads and writes on an [`Instance`]. It is the
//! "live" side of the mapping: nested instances, embeddable objects and unresolved
//! references all have their own variants here, while the storage side is always plain
//! [`Bson`]. Conversion between the two is the job of the [`caster`](crate::caster).

use bson::{Bson, DateTime, Uuid};
use indexmap::IndexMap;

use crate::{embedded::{Embeddable, EmbeddedValue}, instance::Instance, reference::Reference};

/// A value stored in a declared field of an [`Instance`].
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Absent or explicitly null.
    Null,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(String),
    DateTime(DateTime),
    Uuid(Uuid),
    /// An ordered sequence.
    Array(Vec<Value>),
    /// A keyed mapping, preserving key order.
    Map(IndexMap<String, Value>),
    /// A value of a custom type implementing [`Embeddable`].
    Embedded(EmbeddedValue),
    /// A nested mapped instance.
    Instance(Box<Instance>),
    /// An unresolved link to another document.
    Reference(Reference),
    /// A storage value the mapper does not model (ObjectId, Decimal128, ...), kept verbatim.
    Raw(Bson),
}

impl Value {
    /// Wraps an embeddable object.
    pub fn embedded<T: Embeddable>(value: T) -> Self {
        Value::Embedded(EmbeddedValue::new(value))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&Vec<Value>> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_array_mut(&mut self) -> Option<&mut Vec<Value>> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&IndexMap<String, Value>> {
        match self {
            Value::Map(entries) => Some(entries),
            _ => None,
        }
    }

    pub fn as_instance(&self) -> Option<&Instance> {
        match self {
            Value::Instance(instance) => Some(instance),
            _ => None,
        }
    }

    pub fn as_reference(&self) -> Option<&Reference> {
        match self {
            Value::Reference(reference) => Some(reference),
            _ => None,
        }
    }

    /// Attempts to view an embedded value as a concrete embeddable type.
    pub fn as_embedded<T: Embeddable>(&self) -> Option<&T> {
        match self {
            Value::Embedded(value) => value.downcast_ref::<T>(),
            _ => None,
        }
    }

    /// Returns `true` if any reference occurs in this value, looking through
    /// arrays and maps but not into nested instances.
    pub fn contains_reference(&self) -> bool {
        match self {
            Value::Reference(_) => true,
            Value::Array(items) => items.iter().any(Value::contains_reference),
            Value::Map(entries) => entries.values().any(Value::contains_reference),
            _ => false,
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Boolean(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Integer(value as i64)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Integer(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<DateTime> for Value {
    fn from(value: DateTime) -> Self {
        Value::DateTime(value)
    }
}

impl From<Uuid> for Value {
    fn from(value: Uuid) -> Self {
        Value::Uuid(value)
    }
}

impl From<uuid::Uuid> for Value {
    fn from(value: uuid::Uuid) -> Self {
        Value::Uuid(Uuid::from(value))
    }
}

impl From<Reference> for Value {
    fn from(value: Reference) -> Self {
        Value::Reference(value)
    }
}

impl From<Instance> for Value {
    fn from(value: Instance) -> Self {
        Value::Instance(Box::new(value))
    }
}

impl From<EmbeddedValue> for Value {
    fn from(value: EmbeddedValue) -> Self {
        Value::Embedded(value)
    }
}

impl<V: Into<Value>> From<Vec<V>> for Value {
    fn from(items: Vec<V>) -> Self {
        Value::Array(items.into_iter().map(Into::into).collect())
    }
}

impl<V: Into<Value>> From<IndexMap<String, V>> for Value {
    fn from(entries: IndexMap<String, V>) -> Self {
        Value::Map(
            entries
                .into_iter()
                .map(|(key, value)| (key, value.into()))
                .collect()
        )
    }
}

impl<V: Into<Value>> From<Option<V>> for Value {
    fn from(value: Option<V>) -> Self {
        value.map(Into::into).unwrap_or(Value::Null)
    }
}
