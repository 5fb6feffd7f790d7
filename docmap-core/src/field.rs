//! Declared field types and field definitions.

use std::{fmt, sync::Arc};

use crate::{
    embedded::{Embeddable, EmbeddedType},
    value::Value,
};

/// The semantic type a field is declared with.
///
/// The declared type drives the [`caster`](crate::caster) in both directions.
#[derive(Debug, Clone)]
pub enum FieldType {
    /// No declared type; values follow the untyped casting rules.
    Any,
    String,
    Integer,
    Float,
    Boolean,
    DateTime,
    Uuid,
    /// An ordered sequence, optionally with a declared element type.
    Array(Option<Box<FieldType>>),
    /// A keyed mapping, optionally with a declared value type.
    Map(Option<Box<FieldType>>),
    /// A custom type implementing [`Embeddable`].
    Embedded(EmbeddedType),
    /// A mapped class, stored as a nested document with its own discriminator.
    Model(String),
    /// A link to a document in another collection.
    Reference,
}

impl FieldType {
    /// An array whose elements follow the untyped casting rules.
    pub fn array() -> Self {
        FieldType::Array(None)
    }

    /// An array whose elements are all of type `element`.
    pub fn array_of(element: FieldType) -> Self {
        FieldType::Array(Some(Box::new(element)))
    }

    /// A map whose values follow the untyped casting rules.
    pub fn map() -> Self {
        FieldType::Map(None)
    }

    /// A map whose values are all of type `value`.
    pub fn map_of(value: FieldType) -> Self {
        FieldType::Map(Some(Box::new(value)))
    }

    pub fn embedded<T: Embeddable>() -> Self {
        FieldType::Embedded(EmbeddedType::of::<T>())
    }

    pub fn model(class: impl Into<String>) -> Self {
        FieldType::Model(class.into())
    }
}

/// How the initial value of a field is produced for a new instance.
#[derive(Clone, Default)]
pub enum DefaultValue {
    /// The field starts out absent.
    #[default]
    None,
    /// The field starts out with a copy of a fixed value.
    Fixed(Value),
    /// The field starts out with the result of calling the producer, once per instance.
    Producer(Arc<dyn Fn() -> Value + Send + Sync>),
}

impl DefaultValue {
    /// Produces a fresh default value, or `None` if the field has no default.
    pub fn produce(&self) -> Option<Value> {
        match self {
            DefaultValue::None => None,
            DefaultValue::Fixed(value) => Some(value.clone()),
            DefaultValue::Producer(producer) => Some(producer()),
        }
    }
}

impl fmt::Debug for DefaultValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DefaultValue::None => f.write_str("None"),
            DefaultValue::Fixed(value) => f.debug_tuple("Fixed").field(value).finish(),
            DefaultValue::Producer(_) => f.write_str("Producer(..)"),
        }
    }
}

/// A field declared on a mapped class.
#[derive(Debug, Clone)]
pub struct FieldDefinition {
    name: String,
    field_type: FieldType,
    default: DefaultValue,
}

impl FieldDefinition {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            default: DefaultValue::None,
        }
    }

    /// Sets a fixed default, copied into every new instance.
    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.default = DefaultValue::Fixed(value.into());
        self
    }

    /// Sets a default producer, invoked for every new instance.
    pub fn with_producer<F>(mut self, producer: F) -> Self
    where
        F: Fn() -> Value + Send + Sync + 'static,
    {
        self.default = DefaultValue::Producer(Arc::new(producer));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn field_type(&self) -> &FieldType {
        &self.field_type
    }

    pub fn default_value(&self) -> &DefaultValue {
        &self.default
    }
}
