//! Error taxonomy shared by mapping, query, adapter and repository layers.
//!
//! # Responsibility
//! - Report every failure to the immediate caller with structured context.
//! - Keep adapter transport errors distinct from semantic errors.
//!
//! # Invariants
//! - Errors are never swallowed or retried inside the core.
//! - Every variant carries enough context (collection, attribute, id,
//!   operation) to build an actionable message.

use crate::mapping::AttributeType;
use crate::model::{EntityId, Value};
use crate::query::QueryOperation;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type ModelResult<T> = Result<T, ModelError>;

/// Error type for mapping, coercion, query and persistence operations.
#[derive(Debug)]
pub enum ModelError {
    /// Runtime access before the mapping was compiled.
    NotCompiled,
    /// Declaration or recompilation attempted after compile.
    FrozenMapping,
    UnmappedCollection {
        collection: String,
    },
    /// Entity type has no collection bound to it.
    UnmappedEntity {
        entity_type: &'static str,
    },
    /// Attribute or column lookup miss inside a known collection.
    UnmappedAttribute {
        collection: String,
        name: String,
    },
    InvalidMapping {
        collection: String,
        reason: String,
    },
    Coercion {
        collection: String,
        attribute: String,
        expected: AttributeType,
        raw: Value,
    },
    UnsupportedQueryOperation {
        adapter: &'static str,
        operation: QueryOperation,
    },
    EntityNotFound {
        collection: String,
        id: EntityId,
        operation: &'static str,
    },
    /// Insert with an explicit id that is already stored.
    DuplicateIdentity {
        collection: String,
        id: EntityId,
    },
    /// Write that requires a persisted entity received one without id.
    MissingIdentity {
        collection: String,
        operation: &'static str,
    },
    InvalidConfig(String),
    InvalidData(String),
    Sqlite(rusqlite::Error),
}

impl ModelError {
    /// Stable snake_case code used in log events.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotCompiled => "not_compiled",
            Self::FrozenMapping => "frozen_mapping",
            Self::UnmappedCollection { .. } => "unmapped_collection",
            Self::UnmappedEntity { .. } => "unmapped_entity",
            Self::UnmappedAttribute { .. } => "unmapped_attribute",
            Self::InvalidMapping { .. } => "invalid_mapping",
            Self::Coercion { .. } => "coercion_failed",
            Self::UnsupportedQueryOperation { .. } => "unsupported_query_operation",
            Self::EntityNotFound { .. } => "entity_not_found",
            Self::DuplicateIdentity { .. } => "duplicate_identity",
            Self::MissingIdentity { .. } => "missing_identity",
            Self::InvalidConfig(_) => "invalid_config",
            Self::InvalidData(_) => "invalid_data",
            Self::Sqlite(_) => "sqlite_error",
        }
    }
}

impl Display for ModelError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotCompiled => write!(f, "mapping has not been compiled"),
            Self::FrozenMapping => write!(f, "mapping is already compiled and cannot change"),
            Self::UnmappedCollection { collection } => {
                write!(f, "collection `{collection}` is not mapped")
            }
            Self::UnmappedEntity { entity_type } => {
                write!(f, "entity type `{entity_type}` is not mapped to any collection")
            }
            Self::UnmappedAttribute { collection, name } => {
                write!(f, "`{name}` is not mapped in collection `{collection}`")
            }
            Self::InvalidMapping { collection, reason } => {
                write!(f, "invalid mapping for collection `{collection}`: {reason}")
            }
            Self::Coercion {
                collection,
                attribute,
                expected,
                raw,
            } => write!(
                f,
                "cannot coerce {collection}.{attribute} value {raw:?} to {expected}"
            ),
            Self::UnsupportedQueryOperation { adapter, operation } => {
                write!(f, "{adapter} adapter does not support query operation `{operation}`")
            }
            Self::EntityNotFound {
                collection,
                id,
                operation,
            } => write!(f, "{operation} failed: no record with id {id} in `{collection}`"),
            Self::DuplicateIdentity { collection, id } => {
                write!(f, "record with id {id} already exists in `{collection}`")
            }
            Self::MissingIdentity {
                collection,
                operation,
            } => write!(
                f,
                "{operation} requires a persisted entity but `{collection}` entity has no id"
            ),
            Self::InvalidConfig(message) => write!(f, "invalid adapter config: {message}"),
            Self::InvalidData(message) => write!(f, "invalid stored data: {message}"),
            Self::Sqlite(err) => write!(f, "{err}"),
        }
    }
}

impl Error for ModelError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sqlite(err) => Some(err),
            _ => None,
        }
    }
}

impl From<rusqlite::Error> for ModelError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}
