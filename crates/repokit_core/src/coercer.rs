//! Record ↔ entity translation.
//!
//! # Responsibility
//! - Turn adapter records into entities through the compiled mapping.
//! - Turn entities into column-keyed primitive records for writes.
//!
//! # Invariants
//! - Only mapped attributes cross the boundary; unmapped columns in a record
//!   and unmapped keys in entity attributes are ignored.
//! - A missing column leaves the attribute absent (null).
//! - `to_record` includes the identity column only when the entity has an id.

use crate::error::{ModelError, ModelResult};
use crate::mapping::{AttributeRule, CollectionMapping, CompiledMapping};
use crate::model::{Attributes, Entity, Record, Value};

/// Coerces records for every collection in a compiled mapping.
#[derive(Debug, Clone, Copy)]
pub struct RecordCoercer<'m> {
    mapping: &'m CompiledMapping,
}

impl<'m> RecordCoercer<'m> {
    pub fn new(mapping: &'m CompiledMapping) -> Self {
        Self { mapping }
    }

    /// Builds an entity from a record of `collection`.
    pub fn to_entity<E: Entity>(&self, collection: &str, record: &Record) -> ModelResult<E> {
        to_entity(self.mapping.mapping_for(collection)?, record)
    }

    /// Builds the storage record of `entity` for its mapped collection.
    pub fn to_record<E: Entity>(&self, entity: &E) -> ModelResult<Record> {
        to_record(self.mapping.collection_for::<E>()?, entity)
    }

    /// Converts every record, aborting on the first failure.
    pub fn to_entities<E: Entity>(
        &self,
        collection: &str,
        records: &[Record],
    ) -> ModelResult<Vec<E>> {
        let collection = self.mapping.mapping_for(collection)?;
        records
            .iter()
            .map(|record| to_entity(collection, record))
            .collect()
    }
}

pub(crate) fn to_entity<E: Entity>(
    collection: &CollectionMapping,
    record: &Record,
) -> ModelResult<E> {
    let identity = collection.attribute("id")?;
    let mut attributes = Attributes::new();

    for rule in std::iter::once(identity).chain(collection.attributes()) {
        let Some(raw) = record.get(rule.column()) else {
            continue;
        };
        let value = rule
            .kind()
            .load(raw)
            .ok_or_else(|| coercion_error(collection, rule, raw))?;
        attributes.set(rule.name(), value);
    }

    E::from_attributes(attributes)
}

pub(crate) fn to_record<E: Entity>(
    collection: &CollectionMapping,
    entity: &E,
) -> ModelResult<Record> {
    let attributes = entity.to_attributes();
    let mut record = Record::new();

    if let Some(id) = entity.id() {
        record.insert(collection.identity_column().to_string(), Value::Integer(id));
    }

    for rule in collection.attributes() {
        let value = match attributes.get(rule.name()) {
            Some(value) => rule
                .kind()
                .dump(value)
                .ok_or_else(|| coercion_error(collection, rule, value))?,
            None => Value::Null,
        };
        record.insert(rule.column().to_string(), value);
    }

    Ok(record)
}

fn coercion_error(collection: &CollectionMapping, rule: &AttributeRule, raw: &Value) -> ModelError {
    ModelError::Coercion {
        collection: collection.name().to_string(),
        attribute: rule.name().to_string(),
        expected: rule.kind(),
        raw: raw.clone(),
    }
}
