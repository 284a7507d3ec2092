//! Repository layer.
//!
//! # Responsibility
//! - Mediate between entities and adapters through the compiled mapping.
//! - Separate the CRUD surface from query composition.
//!
//! # Invariants
//! - Repositories hold no mutable state; any number of them may share one
//!   adapter.
//! - Query composition is a capability (`QueryBuilder`), not part of the
//!   public CRUD surface (`PublicRepository`).

mod repository;

pub use repository::{PublicRepository, QueryBuilder, Repository};
