//! In-process adapter over ordered record vectors.
//!
//! Suitable for tests and ephemeral data. Queries are direct
//! filter/sort/slice passes over the collection; SQL-only operations
//! (`like`) are reported as unsupported.
//!
//! # Thread safety
//! Collections live behind one reader/writer lock: reads run concurrently,
//! each write holds the lock for exactly one record operation.

use crate::adapter::{Adapter, DeletePolicy, Statement};
use crate::error::{ModelError, ModelResult};
use crate::mapping::CollectionMapping;
use crate::model::{EntityId, Record, Value};
use crate::query::{
    Aggregate, Comparison, Direction, OrderKey, Predicate, QueryOperation, QuerySpec,
};
use parking_lot::RwLock;
use std::cmp::Ordering;
use std::collections::HashMap;

const ADAPTER_NAME: &str = "memory";

#[derive(Debug)]
struct MemoryCollection {
    next_id: EntityId,
    records: Vec<Record>,
}

impl Default for MemoryCollection {
    fn default() -> Self {
        Self {
            next_id: 1,
            records: Vec::new(),
        }
    }
}

/// Adapter storing every collection in process memory.
#[derive(Debug, Default)]
pub struct MemoryAdapter {
    collections: RwLock<HashMap<String, MemoryCollection>>,
    delete_policy: DeletePolicy,
}

impl MemoryAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delete_policy(delete_policy: DeletePolicy) -> Self {
        Self {
            collections: RwLock::default(),
            delete_policy,
        }
    }

    /// Number of stored records in `collection`.
    pub fn len(&self, collection: &str) -> usize {
        self.collections
            .read()
            .get(collection)
            .map_or(0, |stored| stored.records.len())
    }

    pub fn is_empty(&self, collection: &str) -> bool {
        self.len(collection) == 0
    }

    fn matching(&self, collection: &CollectionMapping, query: &QuerySpec) -> ModelResult<Vec<Record>> {
        let collections = self.collections.read();
        let Some(stored) = collections.get(collection.name()) else {
            return Ok(Vec::new());
        };

        let mut matched = Vec::new();
        for record in &stored.records {
            if matches_all(query.predicates(), record)? {
                matched.push(record.clone());
            }
        }
        drop(collections);

        if !query.order().is_empty() {
            matched.sort_by(|left, right| compare_records(query.order(), left, right));
        }

        let offset = query.offset().map_or(0, saturating_usize);
        let limit = query.limit().map_or(usize::MAX, saturating_usize);
        Ok(matched.into_iter().skip(offset).take(limit).collect())
    }
}

impl Adapter for MemoryAdapter {
    fn name(&self) -> &'static str {
        ADAPTER_NAME
    }

    fn supports(&self, operation: QueryOperation) -> bool {
        !matches!(operation, QueryOperation::Like)
    }

    fn delete_policy(&self) -> DeletePolicy {
        self.delete_policy
    }

    fn select(&self, collection: &CollectionMapping, query: &QuerySpec) -> ModelResult<Vec<Record>> {
        self.matching(collection, query)
    }

    fn aggregate(
        &self,
        collection: &CollectionMapping,
        query: &QuerySpec,
        aggregate: &Aggregate,
    ) -> ModelResult<Value> {
        let records = self.matching(collection, query)?;
        let column = aggregate.field().unwrap_or_default();
        let values: Vec<&Value> = records
            .iter()
            .filter_map(|record| record.get(column))
            .filter(|value| !value.is_null())
            .collect();

        match aggregate {
            Aggregate::Count => Ok(Value::Integer(records.len() as i64)),
            Aggregate::Sum(_) => sum(collection, column, &values),
            Aggregate::Average(_) => {
                if values.is_empty() {
                    return Ok(Value::Null);
                }
                let total = numeric_values(collection, column, &values)?
                    .into_iter()
                    .sum::<f64>();
                Ok(Value::Float(total / values.len() as f64))
            }
            Aggregate::Min(_) => Ok(extreme(&values, Ordering::Less)),
            Aggregate::Max(_) => Ok(extreme(&values, Ordering::Greater)),
        }
    }

    fn insert(&self, collection: &CollectionMapping, mut record: Record) -> ModelResult<EntityId> {
        let identity = collection.identity_column();
        let mut collections = self.collections.write();
        let stored = collections.entry(collection.name().to_string()).or_default();

        let id = match record.get(identity) {
            Some(Value::Integer(id)) => {
                let exists = stored
                    .records
                    .iter()
                    .any(|existing| record_id(existing, identity) == Some(*id));
                if exists {
                    return Err(ModelError::DuplicateIdentity {
                        collection: collection.name().to_string(),
                        id: *id,
                    });
                }
                *id
            }
            _ => stored.next_id,
        };

        stored.next_id = stored.next_id.max(id.saturating_add(1));
        record.insert(identity.to_string(), Value::Integer(id));
        stored.records.push(record);
        Ok(id)
    }

    fn update(
        &self,
        collection: &CollectionMapping,
        id: EntityId,
        mut record: Record,
    ) -> ModelResult<bool> {
        let identity = collection.identity_column();
        let mut collections = self.collections.write();
        let Some(stored) = collections.get_mut(collection.name()) else {
            return Ok(false);
        };
        let Some(existing) = stored
            .records
            .iter_mut()
            .find(|existing| record_id(existing, identity) == Some(id))
        else {
            return Ok(false);
        };

        record.insert(identity.to_string(), Value::Integer(id));
        for (column, value) in record {
            existing.insert(column, value);
        }
        Ok(true)
    }

    fn delete(&self, collection: &CollectionMapping, id: EntityId) -> ModelResult<bool> {
        let identity = collection.identity_column();
        let mut collections = self.collections.write();
        let Some(stored) = collections.get_mut(collection.name()) else {
            return Ok(false);
        };

        let before = stored.records.len();
        stored
            .records
            .retain(|existing| record_id(existing, identity) != Some(id));
        Ok(stored.records.len() != before)
    }

    fn clear(&self, collection: &CollectionMapping) -> ModelResult<u64> {
        let mut collections = self.collections.write();
        let removed = collections
            .get_mut(collection.name())
            .map_or(0, |stored| std::mem::take(&mut stored.records).len());
        Ok(removed as u64)
    }

    fn compile_query(
        &self,
        collection: &CollectionMapping,
        query: &QuerySpec,
    ) -> ModelResult<Statement> {
        let mut params = Vec::new();
        let mut text = format!("SCAN {}", collection.name());

        if !query.predicates().is_empty() {
            let rendered = query
                .predicates()
                .iter()
                .map(|predicate| render(predicate, &mut params))
                .collect::<ModelResult<Vec<_>>>()?;
            text.push_str(" FILTER ");
            text.push_str(&rendered.join(" AND "));
        }
        if !query.order().is_empty() {
            let keys: Vec<String> = query
                .order()
                .iter()
                .map(|key| format!("{} {}", key.field, key.direction.as_sql()))
                .collect();
            text.push_str(" SORT ");
            text.push_str(&keys.join(", "));
        }
        if let Some(offset) = query.offset() {
            text.push_str(&format!(" SKIP {offset}"));
        }
        if let Some(limit) = query.limit() {
            text.push_str(&format!(" TAKE {limit}"));
        }

        Ok(Statement { text, params })
    }
}

fn record_id(record: &Record, identity: &str) -> Option<EntityId> {
    match record.get(identity) {
        Some(Value::Integer(id)) => Some(*id),
        _ => None,
    }
}

fn saturating_usize(value: u64) -> usize {
    usize::try_from(value).unwrap_or(usize::MAX)
}

fn matches_all(predicates: &[Predicate], record: &Record) -> ModelResult<bool> {
    for predicate in predicates {
        if !matches(predicate, record)? {
            return Ok(false);
        }
    }
    Ok(true)
}

fn matches(predicate: &Predicate, record: &Record) -> ModelResult<bool> {
    let field_value = |field: &str| record.get(field).unwrap_or(&Value::Null).clone();

    let matched = match predicate {
        Predicate::Compare { field, op, value } => {
            let ordering = field_value(field).compare(value);
            match op {
                Comparison::Eq => ordering == Some(Ordering::Equal),
                Comparison::NotEq => matches!(ordering, Some(Ordering::Less | Ordering::Greater)),
                Comparison::Gt => ordering == Some(Ordering::Greater),
                Comparison::Gte => matches!(ordering, Some(Ordering::Greater | Ordering::Equal)),
                Comparison::Lt => ordering == Some(Ordering::Less),
                Comparison::Lte => matches!(ordering, Some(Ordering::Less | Ordering::Equal)),
            }
        }
        Predicate::In { field, values } => {
            let current = field_value(field);
            values.iter().any(|candidate| current.matches(candidate))
        }
        Predicate::IsNull { field } => field_value(field).is_null(),
        Predicate::Like { .. } => {
            return Err(ModelError::UnsupportedQueryOperation {
                adapter: ADAPTER_NAME,
                operation: QueryOperation::Like,
            });
        }
        Predicate::And(children) => matches_all(children, record)?,
        Predicate::Or(children) => {
            let mut any = false;
            for child in children {
                if matches(child, record)? {
                    any = true;
                    break;
                }
            }
            any
        }
        Predicate::Not(inner) => !matches(inner, record)?,
    };
    Ok(matched)
}

/// Nulls sort first, like SQLite ascending order.
fn compare_records(order: &[OrderKey], left: &Record, right: &Record) -> Ordering {
    for key in order {
        let left_value = left.get(&key.field).unwrap_or(&Value::Null);
        let right_value = right.get(&key.field).unwrap_or(&Value::Null);
        let ordering = match (left_value.is_null(), right_value.is_null()) {
            (true, true) => Ordering::Equal,
            (true, false) => Ordering::Less,
            (false, true) => Ordering::Greater,
            (false, false) => left_value
                .compare(right_value)
                .unwrap_or_else(|| left_value.kind().cmp(right_value.kind())),
        };
        let ordering = match key.direction {
            Direction::Asc => ordering,
            Direction::Desc => ordering.reverse(),
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

fn numeric_values(
    collection: &CollectionMapping,
    column: &str,
    values: &[&Value],
) -> ModelResult<Vec<f64>> {
    values
        .iter()
        .map(|value| {
            value.as_f64().ok_or_else(|| {
                ModelError::InvalidData(format!(
                    "cannot aggregate non-numeric {} value in {}.{column}",
                    value.kind(),
                    collection.name()
                ))
            })
        })
        .collect()
}

fn sum(collection: &CollectionMapping, column: &str, values: &[&Value]) -> ModelResult<Value> {
    if values.is_empty() {
        return Ok(Value::Null);
    }

    let mut integer_total: Option<i64> = Some(0);
    for value in values {
        integer_total = match (integer_total, value) {
            (Some(total), Value::Integer(current)) => total.checked_add(*current),
            _ => None,
        };
    }
    if let Some(total) = integer_total {
        return Ok(Value::Integer(total));
    }

    let total = numeric_values(collection, column, values)?.into_iter().sum();
    Ok(Value::Float(total))
}

fn extreme(values: &[&Value], wanted: Ordering) -> Value {
    let mut best: Option<&Value> = None;
    for value in values {
        best = match best {
            Some(current) if value.compare(current) != Some(wanted) => Some(current),
            _ => Some(*value),
        };
    }
    best.cloned().unwrap_or(Value::Null)
}

fn render(predicate: &Predicate, params: &mut Vec<Value>) -> ModelResult<String> {
    let rendered = match predicate {
        Predicate::Compare { field, op, value } => {
            params.push(value.clone());
            format!("{field} {} ?", op.as_sql())
        }
        Predicate::In { field, values } => {
            params.extend(values.iter().cloned());
            let slots = vec!["?"; values.len()].join(", ");
            format!("{field} IN ({slots})")
        }
        Predicate::IsNull { field } => format!("{field} IS NULL"),
        Predicate::Like { .. } => {
            return Err(ModelError::UnsupportedQueryOperation {
                adapter: ADAPTER_NAME,
                operation: QueryOperation::Like,
            });
        }
        Predicate::And(children) => join(children, " AND ", "TRUE", params)?,
        Predicate::Or(children) => join(children, " OR ", "FALSE", params)?,
        Predicate::Not(inner) => format!("NOT {}", render(inner, params)?),
    };
    Ok(rendered)
}

fn join(
    children: &[Predicate],
    separator: &str,
    empty: &str,
    params: &mut Vec<Value>,
) -> ModelResult<String> {
    if children.is_empty() {
        return Ok(empty.to_string());
    }
    let parts = children
        .iter()
        .map(|child| render(child, params))
        .collect::<ModelResult<Vec<_>>>()?;
    Ok(format!("({})", parts.join(separator)))
}
