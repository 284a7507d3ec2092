//! Entity contract and attribute container.
//!
//! # Responsibility
//! - Define the capability set any domain type needs to be persisted.
//! - Provide typed attribute readers for `Entity::from_attributes`.
//!
//! # Invariants
//! - Entities are values: identity is assigned by returning a new value
//!   (`with_id`), never by mutating one handed to the repository.
//! - Keys an entity does not read are ignored on construction.

use crate::error::{ModelError, ModelResult};
use crate::model::value::{EntityId, Value};
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::btree_map;
use std::collections::BTreeMap;
use uuid::Uuid;

/// Domain object persisted through a repository.
pub trait Entity: Clone + Send + Sync + 'static {
    /// Identity, `None` until persisted.
    fn id(&self) -> Option<EntityId>;

    /// Returns a copy of this entity carrying `id`.
    fn with_id(&self, id: EntityId) -> Self;

    /// Attribute values keyed by attribute name. `id` is read separately.
    fn to_attributes(&self) -> Attributes;

    /// Builds an entity from attribute values keyed by attribute name.
    ///
    /// The identity, when known, is present under the `id` key.
    fn from_attributes(attributes: Attributes) -> ModelResult<Self>;

    /// Two entities are the same iff both carry the same non-null id.
    fn same_entity(&self, other: &Self) -> bool {
        matches!((self.id(), other.id()), (Some(left), Some(right)) if left == right)
    }
}

/// Attribute name to value mapping passed across the entity boundary.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Attributes(BTreeMap<String, Value>);

impl Attributes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(name, value);
        self
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.0.remove(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, Value> {
        self.0.iter()
    }

    /// Reads the `id` key.
    pub fn id(&self) -> ModelResult<Option<EntityId>> {
        self.integer("id")
    }

    pub fn integer(&self, name: &str) -> ModelResult<Option<i64>> {
        match self.present(name) {
            None => Ok(None),
            Some(Value::Integer(value)) => Ok(Some(*value)),
            Some(other) => Err(mismatch(name, "integer", other)),
        }
    }

    pub fn float(&self, name: &str) -> ModelResult<Option<f64>> {
        match self.present(name) {
            None => Ok(None),
            Some(Value::Float(value)) => Ok(Some(*value)),
            Some(Value::Integer(value)) => Ok(Some(*value as f64)),
            Some(other) => Err(mismatch(name, "float", other)),
        }
    }

    pub fn text(&self, name: &str) -> ModelResult<Option<String>> {
        match self.present(name) {
            None => Ok(None),
            Some(Value::Text(value)) => Ok(Some(value.clone())),
            Some(other) => Err(mismatch(name, "text", other)),
        }
    }

    pub fn boolean(&self, name: &str) -> ModelResult<Option<bool>> {
        match self.present(name) {
            None => Ok(None),
            Some(Value::Boolean(value)) => Ok(Some(*value)),
            Some(other) => Err(mismatch(name, "boolean", other)),
        }
    }

    pub fn date(&self, name: &str) -> ModelResult<Option<NaiveDate>> {
        match self.present(name) {
            None => Ok(None),
            Some(Value::Date(value)) => Ok(Some(*value)),
            Some(other) => Err(mismatch(name, "date", other)),
        }
    }

    pub fn timestamp(&self, name: &str) -> ModelResult<Option<DateTime<Utc>>> {
        match self.present(name) {
            None => Ok(None),
            Some(Value::Timestamp(value)) => Ok(Some(*value)),
            Some(other) => Err(mismatch(name, "timestamp", other)),
        }
    }

    pub fn uuid(&self, name: &str) -> ModelResult<Option<Uuid>> {
        match self.present(name) {
            None => Ok(None),
            Some(Value::Uuid(value)) => Ok(Some(*value)),
            Some(other) => Err(mismatch(name, "uuid", other)),
        }
    }

    fn present(&self, name: &str) -> Option<&Value> {
        self.0.get(name).filter(|value| !value.is_null())
    }
}

impl FromIterator<(String, Value)> for Attributes {
    fn from_iter<T: IntoIterator<Item = (String, Value)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for Attributes {
    type Item = (String, Value);
    type IntoIter = btree_map::IntoIter<String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

fn mismatch(name: &str, expected: &str, actual: &Value) -> ModelError {
    ModelError::InvalidData(format!(
        "attribute `{name}` expected {expected}, got {}",
        actual.kind()
    ))
}
