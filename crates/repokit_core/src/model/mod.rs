//! Entity contract and storage-neutral values.
//!
//! # Responsibility
//! - Define what a persistable domain object must provide.
//! - Define the value/record shapes exchanged with adapters.
//!
//! # Invariants
//! - Every persisted entity is identified by an adapter-assigned `EntityId`.

pub mod entity;
pub mod value;

pub use entity::{Attributes, Entity};
pub use value::{EntityId, Record, Value};
