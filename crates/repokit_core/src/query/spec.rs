//! Storage-agnostic query description.
//!
//! # Responsibility
//! - Accumulate filter, ordering and window operations as plain data.
//! - Resolve attribute names to columns and filter values to primitive
//!   storage values before an adapter sees the query.
//!
//! # Invariants
//! - Top-level predicates are a conjunction.
//! - `exclude` negates the other query's whole predicate set, never its rows.
//! - Ordering keys are unique: re-ordering a key replaces its direction but
//!   keeps its original tie-break position (first declared, first compared).
//! - An executed ordered query ends with the identity key, so rows tied on
//!   every declared key keep insertion order.

use crate::error::{ModelError, ModelResult};
use crate::mapping::CollectionMapping;
use crate::model::Value;
use std::collections::BTreeSet;
use std::fmt::{Display, Formatter};

/// Comparison operator of a `Predicate::Compare`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Eq,
    NotEq,
    Gt,
    Gte,
    Lt,
    Lte,
}

impl Comparison {
    pub fn as_sql(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::NotEq => "<>",
            Self::Gt => ">",
            Self::Gte => ">=",
            Self::Lt => "<",
            Self::Lte => "<=",
        }
    }
}

/// Filter predicate over one collection.
///
/// `field` is an attribute name while composing and a column name once
/// resolved for an adapter.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Compare {
        field: String,
        op: Comparison,
        value: Value,
    },
    In {
        field: String,
        values: Vec<Value>,
    },
    IsNull {
        field: String,
    },
    /// SQL `LIKE` pattern match.
    Like {
        field: String,
        pattern: String,
    },
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
    /// Two-valued negation: rows where the inner predicate is not true.
    Not(Box<Predicate>),
}

impl Predicate {
    fn collect_operations(&self, operations: &mut BTreeSet<QueryOperation>) {
        match self {
            Self::Compare { .. } | Self::In { .. } | Self::IsNull { .. } => {
                operations.insert(QueryOperation::Where);
            }
            Self::Like { .. } => {
                operations.insert(QueryOperation::Like);
            }
            Self::And(children) => {
                for child in children {
                    child.collect_operations(operations);
                }
            }
            Self::Or(children) => {
                operations.insert(QueryOperation::Or);
                for child in children {
                    child.collect_operations(operations);
                }
            }
            Self::Not(inner) => {
                operations.insert(QueryOperation::Exclude);
                inner.collect_operations(operations);
            }
        }
    }

    fn resolve(&self, collection: &CollectionMapping) -> ModelResult<Predicate> {
        let resolved = match self {
            Self::Compare { field, op, value } => {
                let (column, value) = resolve_value(collection, field, value)?;
                Self::Compare {
                    field: column,
                    op: *op,
                    value,
                }
            }
            Self::In { field, values } => {
                let column = collection.column_for(field)?.to_string();
                let values = values
                    .iter()
                    .map(|value| resolve_value(collection, field, value).map(|(_, value)| value))
                    .collect::<ModelResult<Vec<_>>>()?;
                Self::In {
                    field: column,
                    values,
                }
            }
            Self::IsNull { field } => Self::IsNull {
                field: collection.column_for(field)?.to_string(),
            },
            Self::Like { field, pattern } => Self::Like {
                field: collection.column_for(field)?.to_string(),
                pattern: pattern.clone(),
            },
            Self::And(children) => Self::And(resolve_all(collection, children)?),
            Self::Or(children) => Self::Or(resolve_all(collection, children)?),
            Self::Not(inner) => Self::Not(Box::new(inner.resolve(collection)?)),
        };
        Ok(resolved)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

impl Direction {
    pub fn reversed(self) -> Self {
        match self {
            Self::Asc => Self::Desc,
            Self::Desc => Self::Asc,
        }
    }

    pub fn as_sql(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderKey {
    pub field: String,
    pub direction: Direction,
}

/// Aggregate selector evaluated by an adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Aggregate {
    Count,
    Sum(String),
    Average(String),
    Min(String),
    Max(String),
}

impl Aggregate {
    pub fn operation(&self) -> QueryOperation {
        match self {
            Self::Count => QueryOperation::Count,
            Self::Sum(_) => QueryOperation::Sum,
            Self::Average(_) => QueryOperation::Average,
            Self::Min(_) => QueryOperation::Min,
            Self::Max(_) => QueryOperation::Max,
        }
    }

    pub fn field(&self) -> Option<&str> {
        match self {
            Self::Count => None,
            Self::Sum(field) | Self::Average(field) | Self::Min(field) | Self::Max(field) => {
                Some(field.as_str())
            }
        }
    }

    pub(crate) fn resolve(&self, collection: &CollectionMapping) -> ModelResult<Aggregate> {
        let column = |field: &str| collection.column_for(field).map(str::to_string);
        Ok(match self {
            Self::Count => Self::Count,
            Self::Sum(field) => Self::Sum(column(field)?),
            Self::Average(field) => Self::Average(column(field)?),
            Self::Min(field) => Self::Min(column(field)?),
            Self::Max(field) => Self::Max(column(field)?),
        })
    }
}

/// Named query capability, used to report unsupported operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum QueryOperation {
    Where,
    Or,
    Exclude,
    Like,
    Order,
    Limit,
    Offset,
    Count,
    Sum,
    Average,
    Min,
    Max,
}

impl QueryOperation {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Where => "where",
            Self::Or => "or",
            Self::Exclude => "exclude",
            Self::Like => "like",
            Self::Order => "order",
            Self::Limit => "limit",
            Self::Offset => "offset",
            Self::Count => "count",
            Self::Sum => "sum",
            Self::Average => "average",
            Self::Min => "min",
            Self::Max => "max",
        }
    }
}

impl Display for QueryOperation {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Accumulated query operations.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QuerySpec {
    predicates: Vec<Predicate>,
    order: Vec<OrderKey>,
    limit: Option<u64>,
    offset: Option<u64>,
}

impl QuerySpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn predicates(&self) -> &[Predicate] {
        &self.predicates
    }

    pub fn order(&self) -> &[OrderKey] {
        &self.order
    }

    pub fn limit(&self) -> Option<u64> {
        self.limit
    }

    pub fn offset(&self) -> Option<u64> {
        self.offset
    }

    pub fn has_window(&self) -> bool {
        self.limit.is_some() || self.offset.is_some()
    }

    pub fn filter(mut self, predicate: Predicate) -> Self {
        self.predicates.push(predicate);
        self
    }

    /// Replaces the conjunction with `self OR other`.
    pub fn or(mut self, other: &QuerySpec) -> Self {
        let left = Predicate::And(std::mem::take(&mut self.predicates));
        let right = Predicate::And(other.predicates.clone());
        self.predicates.push(Predicate::Or(vec![left, right]));
        self
    }

    /// Keeps rows for which `other`'s predicate set does not hold.
    pub fn exclude(mut self, other: &QuerySpec) -> Self {
        let negated = Predicate::And(other.predicates.clone());
        self.predicates.push(Predicate::Not(Box::new(negated)));
        self
    }

    /// Adds or re-directs one ordering key.
    pub fn order_by(mut self, field: impl Into<String>, direction: Direction) -> Self {
        let field = field.into();
        match self.order.iter_mut().find(|key| key.field == field) {
            Some(existing) => existing.direction = direction,
            None => self.order.push(OrderKey { field, direction }),
        }
        self
    }

    pub fn with_limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Appends `identity_field ASC` as the final key of an ordered query.
    ///
    /// Unordered queries and queries already keyed on the identity are
    /// returned unchanged.
    pub fn with_identity_tiebreak(mut self, identity_field: &str) -> Self {
        let keyed = self.order.iter().any(|key| key.field == identity_field);
        if !self.order.is_empty() && !keyed {
            self.order.push(OrderKey {
                field: identity_field.to_string(),
                direction: Direction::Asc,
            });
        }
        self
    }

    /// Same query with every ordering key flipped, identity tie-break included.
    ///
    /// An unordered query becomes `id DESC` so "last" follows insertion.
    pub fn reversed(self, identity_field: &str) -> Self {
        let mut spec = if self.order.is_empty() {
            self.order_by(identity_field, Direction::Asc)
        } else {
            self.with_identity_tiebreak(identity_field)
        };
        for key in &mut spec.order {
            key.direction = key.direction.reversed();
        }
        spec
    }

    /// Every operation this query needs from an adapter.
    pub fn operations(&self) -> BTreeSet<QueryOperation> {
        let mut operations = BTreeSet::new();
        for predicate in &self.predicates {
            predicate.collect_operations(&mut operations);
        }
        if !self.order.is_empty() {
            operations.insert(QueryOperation::Order);
        }
        if self.limit.is_some() {
            operations.insert(QueryOperation::Limit);
        }
        if self.offset.is_some() {
            operations.insert(QueryOperation::Offset);
        }
        operations
    }

    /// Rewrites attribute names to columns and dumps filter values.
    pub fn resolve(&self, collection: &CollectionMapping) -> ModelResult<QuerySpec> {
        let order = self
            .order
            .iter()
            .map(|key| {
                Ok(OrderKey {
                    field: collection.column_for(&key.field)?.to_string(),
                    direction: key.direction,
                })
            })
            .collect::<ModelResult<Vec<_>>>()?;

        Ok(QuerySpec {
            predicates: resolve_all(collection, &self.predicates)?,
            order,
            limit: self.limit,
            offset: self.offset,
        })
    }
}

fn resolve_all(
    collection: &CollectionMapping,
    predicates: &[Predicate],
) -> ModelResult<Vec<Predicate>> {
    predicates
        .iter()
        .map(|predicate| predicate.resolve(collection))
        .collect()
}

fn resolve_value(
    collection: &CollectionMapping,
    attribute: &str,
    value: &Value,
) -> ModelResult<(String, Value)> {
    let rule = collection.attribute(attribute)?;
    let dumped = rule.kind().dump(value).ok_or_else(|| ModelError::Coercion {
        collection: collection.name().to_string(),
        attribute: attribute.to_string(),
        expected: rule.kind(),
        raw: value.clone(),
    })?;
    Ok((rule.column().to_string(), dumped))
}

#[cfg(test)]
mod tests {
    use super::{Comparison, Direction, Predicate, QueryOperation, QuerySpec};
    use crate::model::Value;

    fn eq(field: &str, value: i64) -> Predicate {
        Predicate::Compare {
            field: field.to_string(),
            op: Comparison::Eq,
            value: Value::Integer(value),
        }
    }

    #[test]
    fn reordering_a_key_keeps_its_priority() {
        let spec = QuerySpec::new()
            .order_by("published_at", Direction::Asc)
            .order_by("title", Direction::Asc)
            .order_by("published_at", Direction::Desc);

        let fields: Vec<_> = spec
            .order()
            .iter()
            .map(|key| (key.field.as_str(), key.direction))
            .collect();
        assert_eq!(
            fields,
            vec![("published_at", Direction::Desc), ("title", Direction::Asc)]
        );
    }

    #[test]
    fn exclude_negates_the_other_predicate_set() {
        let published = QuerySpec::new().filter(eq("state", 1));
        let drafts = QuerySpec::new().exclude(&published);
        assert_eq!(
            drafts.predicates(),
            &[Predicate::Not(Box::new(Predicate::And(vec![eq("state", 1)])))]
        );
    }

    #[test]
    fn or_wraps_both_conjunctions() {
        let left = QuerySpec::new().filter(eq("a", 1)).filter(eq("b", 2));
        let right = QuerySpec::new().filter(eq("c", 3));
        let combined = left.or(&right);
        assert_eq!(combined.predicates().len(), 1);
        assert!(matches!(&combined.predicates()[0], Predicate::Or(children) if children.len() == 2));
    }

    #[test]
    fn reversed_unordered_query_orders_by_identity_desc() {
        let spec = QuerySpec::new().reversed("id");
        assert_eq!(spec.order()[0].field, "id");
        assert_eq!(spec.order()[0].direction, Direction::Desc);
    }

    #[test]
    fn identity_breaks_ties_in_both_directions() {
        let spec = QuerySpec::new().order_by("age", Direction::Asc);

        let forward = spec.clone().with_identity_tiebreak("id");
        let keys: Vec<_> = forward
            .order()
            .iter()
            .map(|key| (key.field.as_str(), key.direction))
            .collect();
        assert_eq!(keys, vec![("age", Direction::Asc), ("id", Direction::Asc)]);

        let backward = spec.reversed("id");
        let keys: Vec<_> = backward
            .order()
            .iter()
            .map(|key| (key.field.as_str(), key.direction))
            .collect();
        assert_eq!(keys, vec![("age", Direction::Desc), ("id", Direction::Desc)]);
    }

    #[test]
    fn explicit_identity_order_is_not_duplicated() {
        let spec = QuerySpec::new()
            .order_by("id", Direction::Desc)
            .with_identity_tiebreak("id");
        assert_eq!(spec.order().len(), 1);
        assert_eq!(spec.order()[0].direction, Direction::Desc);
        assert!(QuerySpec::new().with_identity_tiebreak("id").order().is_empty());
    }

    #[test]
    fn operations_lists_every_capability_used() {
        let other = QuerySpec::new().filter(Predicate::Like {
            field: "title".to_string(),
            pattern: "%rust%".to_string(),
        });
        let spec = QuerySpec::new()
            .filter(eq("a", 1))
            .exclude(&other)
            .order_by("a", Direction::Asc)
            .with_limit(3);
        let operations = spec.operations();
        for expected in [
            QueryOperation::Where,
            QueryOperation::Exclude,
            QueryOperation::Like,
            QueryOperation::Order,
            QueryOperation::Limit,
        ] {
            assert!(operations.contains(&expected), "missing {expected}");
        }
        assert!(!operations.contains(&QueryOperation::Offset));
    }
}
