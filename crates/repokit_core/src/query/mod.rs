//! Lazy, composable queries bound to one collection and adapter.
//!
//! # Responsibility
//! - Offer the chaining vocabulary used to build named finders.
//! - Execute on terminal calls only, coercing records into entities.
//!
//! # Invariants
//! - Composition never touches storage.
//! - Every terminal call is exactly one adapter round-trip; nothing is cached.
//! - Operations the bound adapter does not support fail with
//!   `UnsupportedQueryOperation` before any storage access.
//! - Ordered queries run with the identity as the last key, so `last` and
//!   `to_vec().last()` agree on ties.

mod spec;

pub use spec::{
    Aggregate, Comparison, Direction, OrderKey, Predicate, QueryOperation, QuerySpec,
};

use crate::adapter::{Adapter, Statement};
use crate::coercer;
use crate::error::{ModelError, ModelResult};
use crate::mapping::{CollectionMapping, Mapping, IDENTITY_ATTRIBUTE};
use crate::model::{Entity, Value};
use log::{debug, error};
use std::fmt::{Debug, Formatter};
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Instant;

/// Query over the collection mapped to `E`.
///
/// Each operation consumes the query and returns the extended one; clone a
/// query to keep it as a reusable building block.
pub struct Query<E> {
    mapping: Arc<Mapping>,
    adapter: Arc<dyn Adapter>,
    collection: String,
    spec: QuerySpec,
    _entity: PhantomData<fn() -> E>,
}

impl<E> Clone for Query<E> {
    fn clone(&self) -> Self {
        Self {
            mapping: Arc::clone(&self.mapping),
            adapter: Arc::clone(&self.adapter),
            collection: self.collection.clone(),
            spec: self.spec.clone(),
            _entity: PhantomData,
        }
    }
}

impl<E> Debug for Query<E> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Query")
            .field("collection", &self.collection)
            .field("adapter", &self.adapter.name())
            .field("spec", &self.spec)
            .finish()
    }
}

impl<E: Entity> Query<E> {
    pub(crate) fn new(
        mapping: Arc<Mapping>,
        adapter: Arc<dyn Adapter>,
        collection: impl Into<String>,
    ) -> Self {
        Self {
            mapping,
            adapter,
            collection: collection.into(),
            spec: QuerySpec::new(),
            _entity: PhantomData,
        }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn spec(&self) -> &QuerySpec {
        &self.spec
    }

    fn map_spec(mut self, change: impl FnOnce(QuerySpec) -> QuerySpec) -> Self {
        self.spec = change(self.spec);
        self
    }

    fn compare(self, field: &str, op: Comparison, value: impl Into<Value>) -> Self {
        let predicate = Predicate::Compare {
            field: field.to_string(),
            op,
            value: value.into(),
        };
        self.map_spec(|spec| spec.filter(predicate))
    }

    /// Adds an arbitrary predicate to the conjunction.
    pub fn filter(self, predicate: Predicate) -> Self {
        self.map_spec(|spec| spec.filter(predicate))
    }

    /// `field = value`.
    pub fn where_eq(self, field: &str, value: impl Into<Value>) -> Self {
        self.compare(field, Comparison::Eq, value)
    }

    pub fn where_not_eq(self, field: &str, value: impl Into<Value>) -> Self {
        self.compare(field, Comparison::NotEq, value)
    }

    pub fn where_gt(self, field: &str, value: impl Into<Value>) -> Self {
        self.compare(field, Comparison::Gt, value)
    }

    pub fn where_gte(self, field: &str, value: impl Into<Value>) -> Self {
        self.compare(field, Comparison::Gte, value)
    }

    pub fn where_lt(self, field: &str, value: impl Into<Value>) -> Self {
        self.compare(field, Comparison::Lt, value)
    }

    pub fn where_lte(self, field: &str, value: impl Into<Value>) -> Self {
        self.compare(field, Comparison::Lte, value)
    }

    pub fn where_in<V: Into<Value>>(self, field: &str, values: impl IntoIterator<Item = V>) -> Self {
        let predicate = Predicate::In {
            field: field.to_string(),
            values: values.into_iter().map(Into::into).collect(),
        };
        self.map_spec(|spec| spec.filter(predicate))
    }

    pub fn where_null(self, field: &str) -> Self {
        let predicate = Predicate::IsNull {
            field: field.to_string(),
        };
        self.map_spec(|spec| spec.filter(predicate))
    }

    /// SQL `LIKE` match; not available on every adapter.
    pub fn where_like(self, field: &str, pattern: impl Into<String>) -> Self {
        let predicate = Predicate::Like {
            field: field.to_string(),
            pattern: pattern.into(),
        };
        self.map_spec(|spec| spec.filter(predicate))
    }

    /// Rows matching this query or `other`.
    pub fn or(self, other: &Query<E>) -> Self {
        let other = other.spec.clone();
        self.map_spec(|spec| spec.or(&other))
    }

    /// Rows of this query for which `other`'s filters do not hold.
    pub fn exclude(self, other: &Query<E>) -> Self {
        let other = other.spec.clone();
        self.map_spec(|spec| spec.exclude(&other))
    }

    pub fn order(self, field: &str, direction: Direction) -> Self {
        self.map_spec(|spec| spec.order_by(field, direction))
    }

    pub fn asc(self, field: &str) -> Self {
        self.order(field, Direction::Asc)
    }

    pub fn desc(self, field: &str) -> Self {
        self.order(field, Direction::Desc)
    }

    pub fn limit(self, limit: u64) -> Self {
        self.map_spec(|spec| spec.with_limit(limit))
    }

    pub fn offset(self, offset: u64) -> Self {
        self.map_spec(|spec| spec.with_offset(offset))
    }

    /// Executes the query and materializes every matching entity.
    pub fn to_vec(&self) -> ModelResult<Vec<E>> {
        self.fetch(&self.spec)
    }

    /// Alias of `to_vec`.
    pub fn all(&self) -> ModelResult<Vec<E>> {
        self.to_vec()
    }

    /// First entity in query order.
    pub fn first(&self) -> ModelResult<Option<E>> {
        let limit = self.spec.limit().map_or(1, |limit| limit.min(1));
        let entities = self.fetch(&self.spec.clone().with_limit(limit))?;
        Ok(entities.into_iter().next())
    }

    /// Last entity in query order; identity order when unordered.
    pub fn last(&self) -> ModelResult<Option<E>> {
        if self.spec.has_window() {
            return Ok(self.fetch(&self.spec)?.pop());
        }
        let reversed = self.spec.clone().reversed(IDENTITY_ATTRIBUTE).with_limit(1);
        Ok(self.fetch(&reversed)?.into_iter().next())
    }

    pub fn exists(&self) -> ModelResult<bool> {
        Ok(self.first()?.is_some())
    }

    /// Values of one attribute, coerced to its declared type.
    pub fn pluck(&self, attribute: &str) -> ModelResult<Vec<Value>> {
        self.execute("pluck", &self.spec, None, |adapter, collection, resolved| {
            let rule = collection.attribute(attribute)?;
            adapter
                .select(collection, resolved)?
                .iter()
                .map(|record| {
                    let raw = record.get(rule.column()).unwrap_or(&Value::Null);
                    rule.kind().load(raw).ok_or_else(|| ModelError::Coercion {
                        collection: collection.name().to_string(),
                        attribute: attribute.to_string(),
                        expected: rule.kind(),
                        raw: raw.clone(),
                    })
                })
                .collect()
        })
    }

    pub fn count(&self) -> ModelResult<u64> {
        match self.aggregate(Aggregate::Count)? {
            Value::Integer(count) => u64::try_from(count)
                .map_err(|_| ModelError::InvalidData(format!("negative count {count}"))),
            other => Err(ModelError::InvalidData(format!(
                "count returned {}",
                other.kind()
            ))),
        }
    }

    /// Sum of a numeric attribute; `Null` when nothing matches.
    pub fn sum(&self, attribute: &str) -> ModelResult<Value> {
        self.aggregate(Aggregate::Sum(attribute.to_string()))
    }

    /// Arithmetic mean as `Float`; `Null` when nothing matches.
    pub fn average(&self, attribute: &str) -> ModelResult<Value> {
        self.aggregate(Aggregate::Average(attribute.to_string()))
    }

    /// Smallest value, coerced to the attribute type.
    pub fn min(&self, attribute: &str) -> ModelResult<Value> {
        self.typed_aggregate(Aggregate::Min(attribute.to_string()), attribute)
    }

    /// Largest value, coerced to the attribute type.
    pub fn max(&self, attribute: &str) -> ModelResult<Value> {
        self.typed_aggregate(Aggregate::Max(attribute.to_string()), attribute)
    }

    /// Backend-native statement this query runs as.
    pub fn to_statement(&self) -> ModelResult<Statement> {
        let compiled = self.mapping.compiled()?;
        let collection = compiled.mapping_for(&self.collection)?;
        let resolved = settled(&self.spec).resolve(collection)?;
        self.ensure_supported(&resolved, None)?;
        self.adapter.compile_query(collection, &resolved)
    }

    fn typed_aggregate(&self, aggregate: Aggregate, attribute: &str) -> ModelResult<Value> {
        let raw = self.aggregate(aggregate)?;
        let compiled = self.mapping.compiled()?;
        let rule = compiled.mapping_for(&self.collection)?.attribute(attribute)?;
        rule.kind().load(&raw).ok_or_else(|| ModelError::Coercion {
            collection: self.collection.clone(),
            attribute: attribute.to_string(),
            expected: rule.kind(),
            raw,
        })
    }

    fn aggregate(&self, aggregate: Aggregate) -> ModelResult<Value> {
        let operation = aggregate.operation();
        self.execute(
            operation.as_str(),
            &self.spec,
            Some(operation),
            |adapter, collection, resolved| {
                let aggregate = aggregate.resolve(collection)?;
                adapter.aggregate(collection, resolved, &aggregate)
            },
        )
    }

    fn fetch(&self, spec: &QuerySpec) -> ModelResult<Vec<E>> {
        self.execute("select", spec, None, |adapter, collection, resolved| {
            adapter
                .select(collection, resolved)?
                .iter()
                .map(|record| coercer::to_entity(collection, record))
                .collect()
        })
    }

    fn execute<T>(
        &self,
        operation: &'static str,
        spec: &QuerySpec,
        extra: Option<QueryOperation>,
        run: impl FnOnce(&dyn Adapter, &CollectionMapping, &QuerySpec) -> ModelResult<T>,
    ) -> ModelResult<T> {
        let started_at = Instant::now();
        let compiled = self.mapping.compiled()?;
        let collection = compiled.mapping_for(&self.collection)?;

        let result = settled(spec)
            .resolve(collection)
            .and_then(|resolved| {
                self.ensure_supported(&resolved, extra)?;
                Ok(resolved)
            })
            .and_then(|resolved| run(self.adapter.as_ref(), collection, &resolved));

        match &result {
            Ok(_) => debug!(
                "event=query_execute module=query status=ok adapter={} collection={} operation={} duration_ms={}",
                self.adapter.name(),
                self.collection,
                operation,
                started_at.elapsed().as_millis()
            ),
            Err(err) => error!(
                "event=query_execute module=query status=error adapter={} collection={} operation={} duration_ms={} error_code={} error={}",
                self.adapter.name(),
                self.collection,
                operation,
                started_at.elapsed().as_millis(),
                err.code(),
                err
            ),
        }
        result
    }

    fn ensure_supported(&self, spec: &QuerySpec, extra: Option<QueryOperation>) -> ModelResult<()> {
        let unsupported = spec
            .operations()
            .into_iter()
            .chain(extra)
            .find(|operation| !self.adapter.supports(*operation));

        match unsupported {
            Some(operation) => Err(ModelError::UnsupportedQueryOperation {
                adapter: self.adapter.name(),
                operation,
            }),
            None => Ok(()),
        }
    }
}

fn settled(spec: &QuerySpec) -> QuerySpec {
    spec.clone().with_identity_tiebreak(IDENTITY_ATTRIBUTE)
}
