//! Custom value types that take part in field casting without being mapped classes.
//!
//! Any type implementing [`Embeddable`] can be used as a field's declared type through
//! [`FieldType::embedded`](crate::field::FieldType::embedded). The capability is checked by
//! the trait bound at declaration time, so a type missing either operation never reaches
//! the caster.
//!
//! # Example
//!
//! ```ignore
//! use bson::{Bson, doc};
//! use docmap_core::embedded::Embeddable;
//!
//! #[derive(Debug, Clone, PartialEq)]
//! struct Point { x: f64, y: f64 }
//!
//! impl Embeddable for Point {
//!     fn to_storage(&self) -> Bson {
//!         Bson::Array(vec![self.x.into(), self.y.into()])
//!     }
//!
//!     fn cast_from_storage(raw: &Bson) -> Option<Self> {
//!         match raw.as_array()?.as_slice() {
//!             [Bson::Double(x), Bson::Double(y)] => Some(Point { x: *x, y: *y }),
//!             _ => None,
//!         }
//!     }
//! }
//! ```

use bson::Bson;
use std::{
    any::{Any, TypeId},
    fmt::{self, Debug},
    marker::PhantomData,
    sync::Arc,
};

/// The two-operation capability letting a custom type participate in casting.
pub trait Embeddable: Debug + Clone + PartialEq + Send + Sync + 'static {
    /// Converts this value to its storage representation.
    fn to_storage(&self) -> Bson;

    /// Restores a value from its storage representation.
    ///
    /// Must be total over any raw shape: return `None` for `Bson::Null` and for shapes
    /// the type cannot interpret. The caster reports the latter as a cast error.
    fn cast_from_storage(raw: &Bson) -> Option<Self>;
}

/// Object-safe view of an [`Embeddable`] value.
pub trait EmbeddedObject: Debug + Send + Sync {
    fn type_name(&self) -> &'static str;
    fn to_storage(&self) -> Bson;
    fn as_any(&self) -> &dyn Any;
    fn clone_box(&self) -> Box<dyn EmbeddedObject>;
    fn dyn_eq(&self, other: &dyn EmbeddedObject) -> bool;
}

impl<T: Embeddable> EmbeddedObject for T {
    fn type_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }

    fn to_storage(&self) -> Bson {
        Embeddable::to_storage(self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn clone_box(&self) -> Box<dyn EmbeddedObject> {
        Box::new(self.clone())
    }

    fn dyn_eq(&self, other: &dyn EmbeddedObject) -> bool {
        other
            .as_any()
            .downcast_ref::<T>()
            .is_some_and(|other| self == other)
    }
}

impl Clone for Box<dyn EmbeddedObject> {
    fn clone(&self) -> Box<dyn EmbeddedObject> {
        self.clone_box()
    }
}

/// A type-erased embeddable value held inside a [`Value`](crate::value::Value).
#[derive(Debug, Clone)]
pub struct EmbeddedValue(Box<dyn EmbeddedObject>);

impl EmbeddedValue {
    pub fn new<T: Embeddable>(value: T) -> Self {
        Self(Box::new(value))
    }

    pub fn type_name(&self) -> &'static str {
        self.0.type_name()
    }

    pub fn to_storage(&self) -> Bson {
        self.0.to_storage()
    }

    /// Attempts to downcast to a concrete embeddable type.
    pub fn downcast_ref<T: Embeddable>(&self) -> Option<&T> {
        self.0.as_any().downcast_ref::<T>()
    }

    fn type_id(&self) -> TypeId {
        self.0.as_any().type_id()
    }
}

impl PartialEq for EmbeddedValue {
    fn eq(&self, other: &Self) -> bool {
        self.0.dyn_eq(other.0.as_ref())
    }
}

trait EmbeddedCodec: Send + Sync {
    fn type_name(&self) -> &'static str;
    fn type_id(&self) -> TypeId;
    fn cast_from_storage(&self, raw: &Bson) -> Option<EmbeddedValue>;
}

struct Codec<T>(PhantomData<fn() -> T>);

impl<T: Embeddable> EmbeddedCodec for Codec<T> {
    fn type_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }

    fn type_id(&self) -> TypeId {
        TypeId::of::<T>()
    }

    fn cast_from_storage(&self, raw: &Bson) -> Option<EmbeddedValue> {
        T::cast_from_storage(raw).map(EmbeddedValue::new)
    }
}

/// Class-level handle of an embeddable type, used as a declared field type.
#[derive(Clone)]
pub struct EmbeddedType(Arc<dyn EmbeddedCodec>);

impl EmbeddedType {
    pub fn of<T: Embeddable>() -> Self {
        Self(Arc::new(Codec::<T>(PhantomData)))
    }

    pub fn type_name(&self) -> &'static str {
        self.0.type_name()
    }

    /// Returns `true` if `value` holds an instance of this type.
    pub fn accepts(&self, value: &EmbeddedValue) -> bool {
        value.type_id() == self.0.type_id()
    }

    pub fn cast_from_storage(&self, raw: &Bson) -> Option<EmbeddedValue> {
        self.0.cast_from_storage(raw)
    }
}

impl Debug for EmbeddedType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("EmbeddedType")
            .field(&self.type_name())
            .finish()
    }
}
