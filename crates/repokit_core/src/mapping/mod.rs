//! Mapping registry: collection ↔ entity type ↔ attribute coercion rules.
//!
//! # Responsibility
//! - Collect declarations during the load phase.
//! - Compile them exactly once into an immutable lookup shared by every
//!   repository and adapter.
//!
//! # Invariants
//! - Declaring or compiling after a successful compile fails with
//!   `FrozenMapping` and leaves the compiled state untouched.
//! - Runtime reads (`compiled`) never take a lock.
//! - Reading before compile fails with `NotCompiled`.

mod builder;
mod compiled;
mod types;

pub use builder::{CollectionDeclaration, MappingBuilder};
pub use compiled::{AttributeRule, CollectionMapping, CompiledMapping};
pub use types::AttributeType;

use crate::error::{ModelError, ModelResult};
use log::{error, info};
use once_cell::sync::{Lazy, OnceCell};
use parking_lot::Mutex;
use regex::Regex;
use std::sync::Arc;
use std::time::Instant;

/// Attribute name reserved for entity identity.
pub const IDENTITY_ATTRIBUTE: &str = "id";

static IDENTIFIER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid identifier regex"));

static GLOBAL_MAPPING: Lazy<Arc<Mapping>> = Lazy::new(|| Arc::new(Mapping::new()));

pub(crate) fn is_valid_identifier(value: &str) -> bool {
    IDENTIFIER_RE.is_match(value)
}

/// Process-wide registry for applications that keep one mapping per process.
pub fn global_mapping() -> Arc<Mapping> {
    Arc::clone(&GLOBAL_MAPPING)
}

/// Two-phase mapping registry.
///
/// Load phase: `collection` appends declarations (serialized by a lock).
/// Runtime phase: after `compile`, `compiled` hands out the shared
/// `CompiledMapping` without synchronization.
#[derive(Debug, Default)]
pub struct Mapping {
    pending: Mutex<MappingBuilder>,
    compiled: OnceCell<CompiledMapping>,
}

impl Mapping {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts from an already populated builder.
    pub fn from_builder(builder: MappingBuilder) -> Self {
        Self {
            pending: Mutex::new(builder),
            compiled: OnceCell::new(),
        }
    }

    /// Declares one collection. See `MappingBuilder::collection`.
    pub fn collection(
        &self,
        name: impl Into<String>,
        declare: impl FnOnce(CollectionDeclaration) -> CollectionDeclaration,
    ) -> ModelResult<()> {
        let mut pending = self.pending.lock();
        if self.compiled.get().is_some() {
            return Err(ModelError::FrozenMapping);
        }
        pending.collection(name, declare);
        Ok(())
    }

    /// Finalizes all declarations.
    ///
    /// # Errors
    /// - `FrozenMapping` when already compiled.
    /// - `InvalidMapping` when a declaration is inconsistent; declarations
    ///   stay pending so the failure can be reported and the process stopped.
    pub fn compile(&self) -> ModelResult<&CompiledMapping> {
        let started_at = Instant::now();
        let mut pending = self.pending.lock();
        if self.compiled.get().is_some() {
            error!("event=mapping_compile module=mapping status=error error_code=frozen_mapping");
            return Err(ModelError::FrozenMapping);
        }

        let compiled = match pending.compile() {
            Ok(compiled) => compiled,
            Err(err) => {
                error!(
                    "event=mapping_compile module=mapping status=error duration_ms={} error_code={} error={}",
                    started_at.elapsed().as_millis(),
                    err.code(),
                    err
                );
                return Err(err);
            }
        };
        let collections = compiled.len();
        if self.compiled.set(compiled).is_err() {
            return Err(ModelError::FrozenMapping);
        }
        *pending = MappingBuilder::new();

        info!(
            "event=mapping_compile module=mapping status=ok collections={} duration_ms={}",
            collections,
            started_at.elapsed().as_millis()
        );
        self.compiled()
    }

    /// Returns the compiled lookup.
    pub fn compiled(&self) -> ModelResult<&CompiledMapping> {
        self.compiled.get().ok_or(ModelError::NotCompiled)
    }

    pub fn is_compiled(&self) -> bool {
        self.compiled.get().is_some()
    }
}
