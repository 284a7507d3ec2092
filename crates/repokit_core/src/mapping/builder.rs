//! Declarative collection mapping builder.
//!
//! # Responsibility
//! - Accumulate collection/entity/attribute declarations as plain data.
//! - Validate declarations and produce an immutable `CompiledMapping`.
//!
//! # Invariants
//! - One declaration per collection name and per entity type.
//! - Attribute and column names are unique inside a collection; `id` is
//!   reserved for the identity attribute.
//! - Collection and column names are plain SQL identifiers.

use crate::error::{ModelError, ModelResult};
use crate::mapping::compiled::{AttributeRule, CollectionMapping, CompiledMapping};
use crate::mapping::types::AttributeType;
use crate::mapping::{is_valid_identifier, IDENTITY_ATTRIBUTE};
use crate::model::Entity;
use std::any::{type_name, TypeId};
use std::collections::{HashMap, HashSet};

const DEFAULT_IDENTITY_COLUMN: &str = "id";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct EntityBinding {
    type_id: TypeId,
    type_name: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct AttributeDeclaration {
    name: String,
    kind: AttributeType,
    column: Option<String>,
}

/// Declaration of one collection, built inside `MappingBuilder::collection`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionDeclaration {
    name: String,
    entity: Option<EntityBinding>,
    identity_column: String,
    attributes: Vec<AttributeDeclaration>,
}

impl CollectionDeclaration {
    fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entity: None,
            identity_column: DEFAULT_IDENTITY_COLUMN.to_string(),
            attributes: Vec::new(),
        }
    }

    /// Binds the entity type materialized from this collection.
    pub fn entity<E: Entity>(mut self) -> Self {
        self.entity = Some(EntityBinding {
            type_id: TypeId::of::<E>(),
            type_name: type_name::<E>(),
        });
        self
    }

    /// Overrides the identity column (defaults to `id`).
    pub fn identity(mut self, column: impl Into<String>) -> Self {
        self.identity_column = column.into();
        self
    }

    /// Maps an attribute to a column of the same name.
    pub fn attribute(self, name: impl Into<String>, kind: AttributeType) -> Self {
        self.push_attribute(name.into(), kind, None)
    }

    /// Maps an attribute to a differently named column.
    pub fn attribute_column(
        self,
        name: impl Into<String>,
        kind: AttributeType,
        column: impl Into<String>,
    ) -> Self {
        self.push_attribute(name.into(), kind, Some(column.into()))
    }

    fn push_attribute(mut self, name: String, kind: AttributeType, column: Option<String>) -> Self {
        self.attributes.push(AttributeDeclaration { name, kind, column });
        self
    }

    fn compile(&self) -> ModelResult<(TypeId, CollectionMapping)> {
        let invalid = |reason: String| ModelError::InvalidMapping {
            collection: self.name.clone(),
            reason,
        };

        if !is_valid_identifier(&self.name) {
            return Err(invalid("collection name is not a valid identifier".to_string()));
        }
        let entity = self
            .entity
            .ok_or_else(|| invalid("no entity type declared".to_string()))?;
        if !is_valid_identifier(&self.identity_column) {
            return Err(invalid(format!(
                "identity column `{}` is not a valid identifier",
                self.identity_column
            )));
        }

        let mut names = HashSet::new();
        let mut columns = HashSet::from([self.identity_column.clone()]);
        let mut rules = Vec::with_capacity(self.attributes.len());
        for declaration in &self.attributes {
            if declaration.name == IDENTITY_ATTRIBUTE {
                return Err(invalid(
                    "`id` is reserved for the identity attribute; use identity(column)".to_string(),
                ));
            }
            if !names.insert(declaration.name.clone()) {
                return Err(invalid(format!(
                    "attribute `{}` declared twice",
                    declaration.name
                )));
            }

            let column = declaration
                .column
                .clone()
                .unwrap_or_else(|| declaration.name.clone());
            if !is_valid_identifier(&column) {
                return Err(invalid(format!("column `{column}` is not a valid identifier")));
            }
            if !columns.insert(column.clone()) {
                return Err(invalid(format!("column `{column}` mapped twice")));
            }

            rules.push(AttributeRule::new(
                declaration.name.clone(),
                declaration.kind,
                column,
            ));
        }

        let mapping = CollectionMapping::new(
            self.name.clone(),
            entity.type_name,
            self.identity_column.clone(),
            rules,
        );
        Ok((entity.type_id, mapping))
    }
}

/// Accumulates collection declarations until `compile`.
#[derive(Debug, Clone, Default)]
pub struct MappingBuilder {
    collections: Vec<CollectionDeclaration>,
}

impl MappingBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares one collection.
    ///
    /// ```
    /// # use repokit_core::{AttributeType, MappingBuilder};
    /// # #[derive(Clone)] struct User;
    /// # impl repokit_core::Entity for User {
    /// #     fn id(&self) -> Option<i64> { None }
    /// #     fn with_id(&self, _: i64) -> Self { User }
    /// #     fn to_attributes(&self) -> repokit_core::Attributes { Default::default() }
    /// #     fn from_attributes(_: repokit_core::Attributes) -> repokit_core::ModelResult<Self> { Ok(User) }
    /// # }
    /// let mut builder = MappingBuilder::new();
    /// builder.collection("users", |c| {
    ///     c.entity::<User>()
    ///         .attribute("name", AttributeType::String)
    ///         .attribute_column("age", AttributeType::Integer, "user_age")
    /// });
    /// assert!(builder.compile().is_ok());
    /// ```
    pub fn collection(
        &mut self,
        name: impl Into<String>,
        declare: impl FnOnce(CollectionDeclaration) -> CollectionDeclaration,
    ) -> &mut Self {
        self.collections
            .push(declare(CollectionDeclaration::new(name)));
        self
    }

    pub fn len(&self) -> usize {
        self.collections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.collections.is_empty()
    }

    /// Validates every declaration and builds the runtime lookup form.
    pub fn compile(&self) -> ModelResult<CompiledMapping> {
        let mut collections = HashMap::with_capacity(self.collections.len());
        let mut by_entity = HashMap::with_capacity(self.collections.len());

        for declaration in &self.collections {
            let (type_id, mapping) = declaration.compile()?;
            if collections.contains_key(mapping.name()) {
                return Err(ModelError::InvalidMapping {
                    collection: mapping.name().to_string(),
                    reason: "collection declared twice".to_string(),
                });
            }
            if let Some(existing) = by_entity.get(&type_id) {
                return Err(ModelError::InvalidMapping {
                    collection: mapping.name().to_string(),
                    reason: format!(
                        "entity type `{}` is already mapped to `{existing}`",
                        mapping.entity_type()
                    ),
                });
            }

            by_entity.insert(type_id, mapping.name().to_string());
            collections.insert(mapping.name().to_string(), mapping);
        }

        Ok(CompiledMapping::new(collections, by_entity))
    }
}
