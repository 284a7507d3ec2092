//! Immutable runtime form of the mapping.
//!
//! Built once by `MappingBuilder::compile`; every lookup after that is a
//! hash-map read on shared data, so concurrent readers need no locking.

use crate::error::{ModelError, ModelResult};
use crate::mapping::types::AttributeType;
use crate::mapping::IDENTITY_ATTRIBUTE;
use crate::model::Entity;
use std::any::{type_name, TypeId};
use std::collections::HashMap;

/// One attribute coercion rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeRule {
    name: String,
    kind: AttributeType,
    column: String,
}

impl AttributeRule {
    pub(crate) fn new(name: String, kind: AttributeType, column: String) -> Self {
        Self { name, kind, column }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> AttributeType {
        self.kind
    }

    pub fn column(&self) -> &str {
        &self.column
    }
}

/// Compiled mapping of one collection.
#[derive(Debug, Clone)]
pub struct CollectionMapping {
    name: String,
    entity_type: &'static str,
    identity: AttributeRule,
    attributes: Vec<AttributeRule>,
    by_attribute: HashMap<String, usize>,
    by_column: HashMap<String, usize>,
}

impl CollectionMapping {
    pub(crate) fn new(
        name: String,
        entity_type: &'static str,
        identity_column: String,
        attributes: Vec<AttributeRule>,
    ) -> Self {
        let by_attribute = attributes
            .iter()
            .enumerate()
            .map(|(index, rule)| (rule.name.clone(), index))
            .collect();
        let by_column = attributes
            .iter()
            .enumerate()
            .map(|(index, rule)| (rule.column.clone(), index))
            .collect();

        Self {
            name,
            entity_type,
            identity: AttributeRule::new(
                IDENTITY_ATTRIBUTE.to_string(),
                AttributeType::Integer,
                identity_column,
            ),
            attributes,
            by_attribute,
            by_column,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn entity_type(&self) -> &'static str {
        self.entity_type
    }

    pub fn identity_column(&self) -> &str {
        &self.identity.column
    }

    /// Declared attributes in declaration order, identity excluded.
    pub fn attributes(&self) -> &[AttributeRule] {
        &self.attributes
    }

    /// Looks up a rule by attribute name; `id` resolves to the identity rule.
    pub fn attribute(&self, name: &str) -> ModelResult<&AttributeRule> {
        if name == IDENTITY_ATTRIBUTE {
            return Ok(&self.identity);
        }
        self.by_attribute
            .get(name)
            .map(|index| &self.attributes[*index])
            .ok_or_else(|| self.unmapped(name))
    }

    pub fn column_for(&self, attribute: &str) -> ModelResult<&str> {
        self.attribute(attribute).map(AttributeRule::column)
    }

    pub fn attribute_for(&self, column: &str) -> ModelResult<&str> {
        if column == self.identity.column {
            return Ok(IDENTITY_ATTRIBUTE);
        }
        self.by_column
            .get(column)
            .map(|index| self.attributes[*index].name())
            .ok_or_else(|| self.unmapped(column))
    }

    /// Identity column followed by attribute columns in declaration order.
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.identity.column.as_str())
            .chain(self.attributes.iter().map(AttributeRule::column))
    }

    fn unmapped(&self, name: &str) -> ModelError {
        ModelError::UnmappedAttribute {
            collection: self.name.clone(),
            name: name.to_string(),
        }
    }
}

/// Read-only lookup over every compiled collection.
#[derive(Debug, Clone, Default)]
pub struct CompiledMapping {
    collections: HashMap<String, CollectionMapping>,
    by_entity: HashMap<TypeId, String>,
}

impl CompiledMapping {
    pub(crate) fn new(
        collections: HashMap<String, CollectionMapping>,
        by_entity: HashMap<TypeId, String>,
    ) -> Self {
        Self {
            collections,
            by_entity,
        }
    }

    pub fn mapping_for(&self, collection: &str) -> ModelResult<&CollectionMapping> {
        self.collections
            .get(collection)
            .ok_or_else(|| ModelError::UnmappedCollection {
                collection: collection.to_string(),
            })
    }

    /// Collection bound to entity type `E`.
    pub fn collection_for<E: Entity>(&self) -> ModelResult<&CollectionMapping> {
        let name = self
            .by_entity
            .get(&TypeId::of::<E>())
            .ok_or(ModelError::UnmappedEntity {
                entity_type: type_name::<E>(),
            })?;
        self.mapping_for(name)
    }

    pub fn column_for<E: Entity>(&self, attribute: &str) -> ModelResult<&str> {
        self.collection_for::<E>()?.column_for(attribute)
    }

    pub fn attribute_for(&self, collection: &str, column: &str) -> ModelResult<&str> {
        self.mapping_for(collection)?.attribute_for(column)
    }

    /// Collection names, sorted.
    pub fn collection_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.collections.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.collections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.collections.is_empty()
    }
}
