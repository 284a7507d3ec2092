//! Persistence mapping layer: entities, repositories and storage adapters.
//!
//! A `Mapping` is declared and compiled once at startup. `Repository<E>`
//! values bound to an `Adapter` then translate between typed entities and
//! adapter records, and compose lazy `Query<E>` values for named finders.

pub mod adapter;
pub mod coercer;
pub mod config;
pub mod error;
pub mod logging;
pub mod mapping;
pub mod model;
pub mod query;
pub mod repo;

pub use adapter::{Adapter, DeletePolicy, MemoryAdapter, SqliteAdapter, Statement};
pub use coercer::RecordCoercer;
pub use config::{AdapterConfig, SqliteConfig};
pub use error::{ModelError, ModelResult};
pub use logging::{default_log_level, init_logging, logging_status, LoggingError};
pub use mapping::{
    global_mapping, AttributeType, CollectionMapping, CompiledMapping, Mapping, MappingBuilder,
};
pub use model::{Attributes, Entity, EntityId, Record, Value};
pub use query::{Direction, Query};
pub use repo::{PublicRepository, Repository};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
