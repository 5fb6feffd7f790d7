//! Live instances of mapped classes.
//!
//! An [`Instance`] holds three things: an optional identity, the values of its declared
//! fields, and any undeclared attributes found in storage. Declared fields go through the
//! [`caster`](crate::caster) on the way in and out; undeclared attributes are kept as raw
//! storage values and written back verbatim.
//!
//! A new instance starts out with every field default applied. Producer defaults are
//! invoked once per instance, so two instances never share a default container.
//!
//! ```ignore
//! let mut circle = mapper.new_instance("Circle")?;
//! circle.set("radius", 2.5)?;
//! circle.set_attribute("legacy_flag", true)?;
//!
//! mapper.save(&mut circle).await?;
//! assert!(circle.id().is_some());
//! ```

use bson::{Bson, Document, Uuid};
use indexmap::IndexMap;
use std::{fmt, sync::Arc};

use crate::{
    caster::{normalize, to_storage},
    class::MappedClass,
    error::{DocMapError, DocMapResult},
    reference::Reference,
    value::Value,
};

/// Key holding the identity of a stored document.
pub const ID_KEY: &str = "_id";
/// Key holding the discriminator of a stored document.
pub const DISCRIMINATOR_KEY: &str = "_type";

/// An instance of a mapped class.
#[derive(Clone)]
pub struct Instance {
    class: Arc<MappedClass>,
    id: Option<Uuid>,
    fields: IndexMap<String, Value>,
    attributes: Document,
}

impl Instance {
    /// Builds a blank instance with every field default applied.
    pub fn new(class: &Arc<MappedClass>) -> Self {
        let fields = class
            .fields()
            .filter_map(|field| {
                field
                    .default_value()
                    .produce()
                    .map(|value| (field.name().to_string(), value))
            })
            .collect();

        Self {
            class: class.clone(),
            id: None,
            fields,
            attributes: Document::new(),
        }
    }

    pub fn class(&self) -> &Arc<MappedClass> {
        &self.class
    }

    pub fn class_name(&self) -> &str {
        self.class.name()
    }

    /// The identity, once the instance has been saved or read from storage.
    pub fn id(&self) -> Option<Uuid> {
        self.id
    }

    /// Returns `true` if the instance has never been saved.
    pub fn is_new(&self) -> bool {
        self.id.is_none()
    }

    /// Returns the value of a declared field, or `None` if it is absent.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Value> {
        self.fields.get_mut(name)
    }

    /// Declared fields holding a value, in the order they were set.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields
            .iter()
            .map(|(name, value)| (name.as_str(), value))
    }

    /// Assigns a declared field.
    ///
    /// # Errors
    ///
    /// Returns [`DocMapError::UnknownField`] if the class declares no such field, and
    /// [`DocMapError::TypeCast`] if the value does not fit the declared type.
    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> DocMapResult<()> {
        let field = self
            .class
            .field(name)
            .ok_or_else(|| DocMapError::UnknownField {
                class: self.class.name().to_string(),
                field: name.to_string(),
            })?;

        let value = normalize(name, value.into(), field.field_type())?;
        self.fields.insert(name.to_string(), value);

        Ok(())
    }

    /// Removes the value of a declared field, leaving it absent.
    pub fn unset(&mut self, name: &str) -> Option<Value> {
        self.fields.shift_remove(name)
    }

    /// Returns an undeclared attribute.
    pub fn attribute(&self, name: &str) -> Option<&Bson> {
        self.attributes.get(name)
    }

    pub fn attributes(&self) -> &Document {
        &self.attributes
    }

    /// Sets an undeclared attribute, stored verbatim without casting.
    ///
    /// # Errors
    ///
    /// Returns [`DocMapError::InvalidArgument`] if `name` is a declared field or one of
    /// the reserved identity and discriminator keys.
    pub fn set_attribute(&mut self, name: &str, raw: impl Into<Bson>) -> DocMapResult<()> {
        if name == ID_KEY || name == DISCRIMINATOR_KEY || self.class.field(name).is_some() {
            return Err(DocMapError::InvalidArgument(format!(
                "`{}` is not an undeclared attribute of {}",
                name,
                self.class.name()
            )));
        }

        self.attributes.insert(name, raw.into());

        Ok(())
    }

    /// Returns a reference to this instance, if it has an identity.
    pub fn to_reference(&self) -> Option<Reference> {
        self.id
            .map(|id| Reference::new(self.class.collection_name(), id))
    }

    /// Builds the stored representation: identity, discriminator, declared fields and
    /// undeclared attributes, in that order.
    pub fn to_document(&self) -> DocMapResult<Document> {
        let mut document = Document::new();

        if let Some(id) = self.id {
            document.insert(ID_KEY, id);
        }
        document.insert(DISCRIMINATOR_KEY, self.class.discriminator());

        for (name, value) in &self.fields {
            let field_type = self
                .class
                .field(name)
                .map(|field| field.field_type())
                .ok_or_else(|| DocMapError::UnknownField {
                    class: self.class.name().to_string(),
                    field: name.clone(),
                })?;

            document.insert(name.clone(), to_storage(name, value, field_type)?);
        }

        for (name, raw) in &self.attributes {
            document.insert(name.clone(), raw.clone());
        }

        Ok(document)
    }

    /// Assigns the identity. An identity can only be assigned once.
    pub(crate) fn assign_id(&mut self, id: Uuid) -> DocMapResult<()> {
        match self.id {
            Some(current) if current != id => Err(DocMapError::ImmutableIdentity(format!(
                "{} {}",
                self.class.name(),
                current
            ))),
            _ => {
                self.id = Some(id);
                Ok(())
            }
        }
    }

    /// Stores an already cast field value, bypassing assignment checks.
    pub(crate) fn insert_field(&mut self, name: &str, value: Value) {
        self.fields.insert(name.to_string(), value);
    }

    pub(crate) fn insert_attribute(&mut self, name: &str, raw: Bson) {
        self.attributes.insert(name, raw);
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance")
            .field("class", &self.class.name())
            .field("id", &self.id)
            .field("fields", &self.fields)
            .field("attributes", &self.attributes)
            .finish()
    }
}

impl PartialEq for Instance {
    fn eq(&self, other: &Self) -> bool {
        self.class.name() == other.class.name()
            && self.id == other.id
            && self.fields == other.fields
            && self.attributes == other.attributes
    }
}
