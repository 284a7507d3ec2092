//! Storage adapter contract and bundled implementations.
//!
//! # Responsibility
//! - Define the capability set repositories and queries need from storage.
//! - Keep backend details (SQL text, in-process scans) behind one trait.
//!
//! # Invariants
//! - Adapters receive resolved queries: column names and primitive values.
//! - Adapters never cache results; each call is one storage round-trip.
//! - Adapters own their internal concurrency discipline (`Send + Sync`).

pub mod memory;
pub mod sqlite;

pub use memory::MemoryAdapter;
pub use sqlite::SqliteAdapter;

use crate::error::ModelResult;
use crate::mapping::CollectionMapping;
use crate::model::{EntityId, Record, Value};
use crate::query::{Aggregate, QueryOperation, QuerySpec};
use serde::{Deserialize, Serialize};

/// Behavior of `delete` for an id with no stored record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeletePolicy {
    /// Deleting a missing record is a no-op.
    #[default]
    Ignore,
    /// Deleting a missing record fails with `EntityNotFound`.
    Require,
}

/// Backend-native form of a query, for inspection and logging.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub text: String,
    pub params: Vec<Value>,
}

/// Storage backend consumed by repositories.
pub trait Adapter: Send + Sync {
    /// Short backend name used in errors and log events.
    fn name(&self) -> &'static str;

    /// Whether this adapter can execute `operation`.
    fn supports(&self, operation: QueryOperation) -> bool;

    fn delete_policy(&self) -> DeletePolicy;

    /// Returns matching records in query order.
    fn select(&self, collection: &CollectionMapping, query: &QuerySpec) -> ModelResult<Vec<Record>>;

    /// Evaluates one aggregate over the matching records.
    ///
    /// Empty input yields `Value::Null` except for `Count`.
    fn aggregate(
        &self,
        collection: &CollectionMapping,
        query: &QuerySpec,
        aggregate: &Aggregate,
    ) -> ModelResult<Value>;

    /// Stores `record` and returns its identity.
    ///
    /// A record already carrying the identity column keeps that id.
    fn insert(&self, collection: &CollectionMapping, record: Record) -> ModelResult<EntityId>;

    /// Overwrites the record `id`. Returns `false` when it does not exist.
    fn update(&self, collection: &CollectionMapping, id: EntityId, record: Record)
        -> ModelResult<bool>;

    /// Removes the record `id`. Returns `false` when it did not exist.
    fn delete(&self, collection: &CollectionMapping, id: EntityId) -> ModelResult<bool>;

    /// Removes every record and returns how many were removed.
    fn clear(&self, collection: &CollectionMapping) -> ModelResult<u64>;

    /// Translates a query into the backend-native statement `select` runs.
    fn compile_query(
        &self,
        collection: &CollectionMapping,
        query: &QuerySpec,
    ) -> ModelResult<Statement>;
}
