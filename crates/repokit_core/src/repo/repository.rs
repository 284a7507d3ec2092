//! Generic repository over one entity type.
//!
//! # Responsibility
//! - Provide the stable command/query API (`PublicRepository`).
//! - Provide scoped query composition (`QueryBuilder`) for named finders.
//!
//! # Invariants
//! - Every method resolves the compiled mapping first, so all of them fail
//!   with `NotCompiled` before `Mapping::compile`.
//! - Each write is exactly one adapter round-trip; nothing is batched.
//! - Entities handed in are never mutated; `create` returns a new value.

use crate::adapter::{Adapter, DeletePolicy};
use crate::coercer;
use crate::error::{ModelError, ModelResult};
use crate::mapping::{CollectionMapping, Mapping, IDENTITY_ATTRIBUTE};
use crate::model::{Entity, EntityId};
use crate::query::Query;
use log::{debug, error};
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Instant;

/// Command/query surface exposed to repository callers.
pub trait PublicRepository<E: Entity> {
    /// Creates when `entity` has no id, updates otherwise.
    fn persist(&self, entity: &E) -> ModelResult<E>;
    /// Inserts `entity` and returns a copy carrying the generated id.
    fn create(&self, entity: &E) -> ModelResult<E>;
    /// Overwrites the stored record of `entity`.
    fn update(&self, entity: &E) -> ModelResult<E>;
    /// Removes the stored record of `entity`.
    fn delete(&self, entity: &E) -> ModelResult<()>;
    /// Loads one entity; `EntityNotFound` when absent.
    fn find(&self, id: EntityId) -> ModelResult<E>;
    fn find_optional(&self, id: EntityId) -> ModelResult<Option<E>>;
    fn all(&self) -> ModelResult<Vec<E>>;
    fn first(&self) -> ModelResult<Option<E>>;
    fn last(&self) -> ModelResult<Option<E>>;
    fn count(&self) -> ModelResult<u64>;
    /// Removes every record of the collection; returns how many.
    fn clear(&self) -> ModelResult<u64>;
}

/// Query composition capability used to implement named finders.
///
/// Kept apart from `PublicRepository` so a domain repository can expose
/// only intention-revealing methods: wrap a `Repository<E>` privately and
/// hand out `&impl PublicRepository<E>` for plain CRUD.
pub trait QueryBuilder<E: Entity> {
    /// Fresh query over this repository's collection.
    fn scope(&self) -> ModelResult<Query<E>>;

    /// Applies `compose` to a fresh scoped query.
    fn query(&self, compose: impl FnOnce(Query<E>) -> Query<E>) -> ModelResult<Query<E>> {
        Ok(compose(self.scope()?))
    }
}

/// Binds entity type `E` to one adapter and the shared mapping.
pub struct Repository<E> {
    mapping: Arc<Mapping>,
    adapter: Arc<dyn Adapter>,
    _entity: PhantomData<fn() -> E>,
}

impl<E> Clone for Repository<E> {
    fn clone(&self) -> Self {
        Self {
            mapping: Arc::clone(&self.mapping),
            adapter: Arc::clone(&self.adapter),
            _entity: PhantomData,
        }
    }
}

impl<E: Entity> Repository<E> {
    /// Binding is static; the mapping may still be in its load phase.
    pub fn new(mapping: Arc<Mapping>, adapter: Arc<dyn Adapter>) -> Self {
        Self {
            mapping,
            adapter,
            _entity: PhantomData,
        }
    }

    pub fn adapter(&self) -> &Arc<dyn Adapter> {
        &self.adapter
    }

    /// Compiled mapping of `E`'s collection.
    pub fn collection(&self) -> ModelResult<&CollectionMapping> {
        self.mapping.compiled()?.collection_for::<E>()
    }

    fn require_id(
        collection: &CollectionMapping,
        entity: &E,
        operation: &'static str,
    ) -> ModelResult<EntityId> {
        entity.id().ok_or_else(|| ModelError::MissingIdentity {
            collection: collection.name().to_string(),
            operation,
        })
    }

    fn write<T>(
        &self,
        operation: &'static str,
        run: impl FnOnce(&CollectionMapping) -> ModelResult<T>,
    ) -> ModelResult<T> {
        let started_at = Instant::now();
        let collection = self.collection()?;
        let result = run(collection);

        match &result {
            Ok(_) => debug!(
                "event=repo_write module=repo status=ok adapter={} collection={} operation={} duration_ms={}",
                self.adapter.name(),
                collection.name(),
                operation,
                started_at.elapsed().as_millis()
            ),
            Err(err) => error!(
                "event=repo_write module=repo status=error adapter={} collection={} operation={} duration_ms={} error_code={} error={}",
                self.adapter.name(),
                collection.name(),
                operation,
                started_at.elapsed().as_millis(),
                err.code(),
                err
            ),
        }
        result
    }
}

impl<E: Entity> QueryBuilder<E> for Repository<E> {
    fn scope(&self) -> ModelResult<Query<E>> {
        let collection = self.collection()?;
        Ok(Query::new(
            Arc::clone(&self.mapping),
            Arc::clone(&self.adapter),
            collection.name(),
        ))
    }
}

impl<E: Entity> PublicRepository<E> for Repository<E> {
    fn persist(&self, entity: &E) -> ModelResult<E> {
        match entity.id() {
            None => self.create(entity),
            Some(_) => self.update(entity),
        }
    }

    fn create(&self, entity: &E) -> ModelResult<E> {
        self.write("create", |collection| {
            let record = coercer::to_record(collection, entity)?;
            let id = self.adapter.insert(collection, record)?;
            Ok(entity.with_id(id))
        })
    }

    fn update(&self, entity: &E) -> ModelResult<E> {
        self.write("update", |collection| {
            let id = Self::require_id(collection, entity, "update")?;
            let record = coercer::to_record(collection, entity)?;
            if !self.adapter.update(collection, id, record)? {
                return Err(ModelError::EntityNotFound {
                    collection: collection.name().to_string(),
                    id,
                    operation: "update",
                });
            }
            Ok(entity.clone())
        })
    }

    fn delete(&self, entity: &E) -> ModelResult<()> {
        self.write("delete", |collection| {
            let id = Self::require_id(collection, entity, "delete")?;
            let removed = self.adapter.delete(collection, id)?;
            if !removed && self.adapter.delete_policy() == DeletePolicy::Require {
                return Err(ModelError::EntityNotFound {
                    collection: collection.name().to_string(),
                    id,
                    operation: "delete",
                });
            }
            Ok(())
        })
    }

    fn find(&self, id: EntityId) -> ModelResult<E> {
        self.find_optional(id)?
            .ok_or_else(|| match self.collection() {
                Ok(collection) => ModelError::EntityNotFound {
                    collection: collection.name().to_string(),
                    id,
                    operation: "find",
                },
                Err(err) => err,
            })
    }

    fn find_optional(&self, id: EntityId) -> ModelResult<Option<E>> {
        self.scope()?.where_eq(IDENTITY_ATTRIBUTE, id).first()
    }

    fn all(&self) -> ModelResult<Vec<E>> {
        self.scope()?.to_vec()
    }

    fn first(&self) -> ModelResult<Option<E>> {
        self.scope()?.first()
    }

    fn last(&self) -> ModelResult<Option<E>> {
        self.scope()?.last()
    }

    fn count(&self) -> ModelResult<u64> {
        self.scope()?.count()
    }

    fn clear(&self) -> ModelResult<u64> {
        self.write("clear", |collection| self.adapter.clear(collection))
    }
}
