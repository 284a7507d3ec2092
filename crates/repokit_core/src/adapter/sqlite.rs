//! SQLite adapter built on rusqlite.
//!
//! # Responsibility
//! - Open and configure one SQLite connection.
//! - Translate resolved queries into parametrized SQL and rows into records.
//!
//! # Invariants
//! - Every statement binds values through parameters; identifiers are
//!   validated at mapping compile time and always double-quoted.
//! - The identity column is expected to be an `INTEGER PRIMARY KEY`, so
//!   `last_insert_rowid` is the generated identity.
//! - One connection checkout per call; calls never interleave on it.
//! - Schema ownership stays outside this adapter (`execute_batch` is the
//!   hook for whoever creates tables).

use crate::adapter::{Adapter, DeletePolicy, Statement};
use crate::error::{ModelError, ModelResult};
use crate::mapping::CollectionMapping;
use crate::model::{EntityId, Record, Value};
use crate::query::{Aggregate, Predicate, QueryOperation, QuerySpec};
use chrono::SecondsFormat;
use log::{error, info};
use parking_lot::Mutex;
use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{params_from_iter, Connection, Row};
use std::path::Path;
use std::time::{Duration, Instant};

const ADAPTER_NAME: &str = "sqlite";

/// Default time a statement waits on a locked database file.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Adapter over a single SQLite connection.
pub struct SqliteAdapter {
    conn: Mutex<Connection>,
    delete_policy: DeletePolicy,
}

impl SqliteAdapter {
    /// Opens (or creates) a database file.
    ///
    /// # Side effects
    /// - Emits `adapter_open` logging events with duration and status.
    pub fn open(path: impl AsRef<Path>) -> ModelResult<Self> {
        Self::open_with(Some(path.as_ref()), DEFAULT_BUSY_TIMEOUT)
    }

    /// Opens a private in-memory database.
    pub fn open_in_memory() -> ModelResult<Self> {
        Self::open_with(None, DEFAULT_BUSY_TIMEOUT)
    }

    /// Opens a file database, or an in-memory one when `path` is `None`.
    pub fn open_with(path: Option<&Path>, busy_timeout: Duration) -> ModelResult<Self> {
        let started_at = Instant::now();
        let mode = if path.is_some() { "file" } else { "memory" };
        info!("event=adapter_open module=adapter status=start adapter={ADAPTER_NAME} mode={mode}");

        let opened = match path {
            Some(path) => Connection::open(path),
            None => Connection::open_in_memory(),
        };
        let conn = match opened {
            Ok(conn) => conn,
            Err(err) => {
                error!(
                    "event=adapter_open module=adapter status=error adapter={} mode={} duration_ms={} error_code=db_open_failed error={}",
                    ADAPTER_NAME,
                    mode,
                    started_at.elapsed().as_millis(),
                    err
                );
                return Err(err.into());
            }
        };

        match configure_connection(&conn, busy_timeout) {
            Ok(()) => {
                info!(
                    "event=adapter_open module=adapter status=ok adapter={} mode={} duration_ms={}",
                    ADAPTER_NAME,
                    mode,
                    started_at.elapsed().as_millis()
                );
                Ok(Self::from_connection(conn))
            }
            Err(err) => {
                error!(
                    "event=adapter_open module=adapter status=error adapter={} mode={} duration_ms={} error_code=db_configure_failed error={}",
                    ADAPTER_NAME,
                    mode,
                    started_at.elapsed().as_millis(),
                    err
                );
                Err(err.into())
            }
        }
    }

    /// Wraps an already configured connection.
    pub fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
            delete_policy: DeletePolicy::default(),
        }
    }

    pub fn with_delete_policy(mut self, delete_policy: DeletePolicy) -> Self {
        self.delete_policy = delete_policy;
        self
    }

    /// Runs schema or seed SQL supplied by the schema owner.
    pub fn execute_batch(&self, sql: &str) -> ModelResult<()> {
        self.conn.lock().execute_batch(sql)?;
        Ok(())
    }

    /// Runs `f` with the connection checked out.
    pub fn with_connection<T>(
        &self,
        f: impl FnOnce(&Connection) -> rusqlite::Result<T>,
    ) -> ModelResult<T> {
        Ok(f(&self.conn.lock())?)
    }
}

impl Adapter for SqliteAdapter {
    fn name(&self) -> &'static str {
        ADAPTER_NAME
    }

    fn supports(&self, _operation: QueryOperation) -> bool {
        true
    }

    fn delete_policy(&self) -> DeletePolicy {
        self.delete_policy
    }

    fn select(&self, collection: &CollectionMapping, query: &QuerySpec) -> ModelResult<Vec<Record>> {
        let statement = build_select(collection, query);
        let columns: Vec<&str> = collection.columns().collect();

        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&statement.text)?;
        let mut rows = stmt.query(params_from_iter(statement.params.iter().map(to_sql_value)))?;
        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            records.push(parse_record(row, &columns)?);
        }

        Ok(records)
    }

    fn aggregate(
        &self,
        collection: &CollectionMapping,
        query: &QuerySpec,
        aggregate: &Aggregate,
    ) -> ModelResult<Value> {
        let inner = build_select(collection, query);
        let expression = match aggregate {
            Aggregate::Count => "COUNT(*)".to_string(),
            Aggregate::Sum(column) => format!("SUM({})", quote(column)),
            Aggregate::Average(column) => format!("AVG({})", quote(column)),
            Aggregate::Min(column) => format!("MIN({})", quote(column)),
            Aggregate::Max(column) => format!("MAX({})", quote(column)),
        };
        let sql = format!("SELECT {expression} FROM ({}) AS scoped;", inner.text);

        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(inner.params.iter().map(to_sql_value)))?;
        match rows.next()? {
            Some(row) => from_sql_value(row.get_ref(0)?, "aggregate"),
            None => Ok(Value::Null),
        }
    }

    fn insert(&self, collection: &CollectionMapping, record: Record) -> ModelResult<EntityId> {
        let explicit_id = match record.get(collection.identity_column()) {
            Some(Value::Integer(id)) => Some(*id),
            _ => None,
        };

        let table = quote(collection.name());
        let sql = if record.is_empty() {
            format!("INSERT INTO {table} DEFAULT VALUES;")
        } else {
            let columns: Vec<String> = record.keys().map(|column| quote(column)).collect();
            let slots = vec!["?"; record.len()].join(", ");
            format!(
                "INSERT INTO {table} ({}) VALUES ({slots});",
                columns.join(", ")
            )
        };

        let conn = self.conn.lock();
        if let Some(id) = explicit_id {
            let exists_sql = format!(
                "SELECT 1 FROM {table} WHERE {} = ?1;",
                quote(collection.identity_column())
            );
            if conn.prepare(&exists_sql)?.exists([id])? {
                return Err(ModelError::DuplicateIdentity {
                    collection: collection.name().to_string(),
                    id,
                });
            }
        }
        conn.execute(&sql, params_from_iter(record.values().map(to_sql_value)))?;
        Ok(explicit_id.unwrap_or_else(|| conn.last_insert_rowid()))
    }

    fn update(
        &self,
        collection: &CollectionMapping,
        id: EntityId,
        record: Record,
    ) -> ModelResult<bool> {
        let identity = collection.identity_column();
        let mut assignments = Vec::new();
        let mut bind_values = Vec::new();
        for (column, value) in &record {
            if column == identity {
                continue;
            }
            assignments.push(format!("{} = ?", quote(column)));
            bind_values.push(to_sql_value(value));
        }
        if assignments.is_empty() {
            assignments.push(format!("{0} = {0}", quote(identity)));
        }
        bind_values.push(SqlValue::Integer(id));

        let sql = format!(
            "UPDATE {} SET {} WHERE {} = ?;",
            quote(collection.name()),
            assignments.join(", "),
            quote(identity)
        );
        let changed = self
            .conn
            .lock()
            .execute(&sql, params_from_iter(bind_values))?;
        Ok(changed > 0)
    }

    fn delete(&self, collection: &CollectionMapping, id: EntityId) -> ModelResult<bool> {
        let sql = format!(
            "DELETE FROM {} WHERE {} = ?1;",
            quote(collection.name()),
            quote(collection.identity_column())
        );
        let changed = self.conn.lock().execute(&sql, [id])?;
        Ok(changed > 0)
    }

    fn clear(&self, collection: &CollectionMapping) -> ModelResult<u64> {
        let sql = format!("DELETE FROM {};", quote(collection.name()));
        let changed = self.conn.lock().execute(&sql, [])?;
        Ok(changed as u64)
    }

    fn compile_query(
        &self,
        collection: &CollectionMapping,
        query: &QuerySpec,
    ) -> ModelResult<Statement> {
        Ok(build_select(collection, query))
    }
}

fn configure_connection(conn: &Connection, busy_timeout: Duration) -> rusqlite::Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(busy_timeout)?;
    Ok(())
}

fn quote(identifier: &str) -> String {
    format!("\"{identifier}\"")
}

fn build_select(collection: &CollectionMapping, query: &QuerySpec) -> Statement {
    let columns: Vec<String> = collection.columns().map(quote).collect();
    let mut sql = format!(
        "SELECT {} FROM {}",
        columns.join(", "),
        quote(collection.name())
    );
    let mut params = Vec::new();

    if !query.predicates().is_empty() {
        let conditions: Vec<String> = query
            .predicates()
            .iter()
            .map(|predicate| render_predicate(predicate, &mut params))
            .collect();
        sql.push_str(" WHERE ");
        sql.push_str(&conditions.join(" AND "));
    }

    if !query.order().is_empty() {
        let keys: Vec<String> = query
            .order()
            .iter()
            .map(|key| format!("{} {}", quote(&key.field), key.direction.as_sql()))
            .collect();
        sql.push_str(" ORDER BY ");
        sql.push_str(&keys.join(", "));
    }

    match (query.limit(), query.offset()) {
        (Some(limit), offset) => {
            sql.push_str(" LIMIT ?");
            params.push(Value::Integer(clamp_i64(limit)));
            if let Some(offset) = offset {
                sql.push_str(" OFFSET ?");
                params.push(Value::Integer(clamp_i64(offset)));
            }
        }
        (None, Some(offset)) => {
            sql.push_str(" LIMIT -1 OFFSET ?");
            params.push(Value::Integer(clamp_i64(offset)));
        }
        (None, None) => {}
    }

    Statement { text: sql, params }
}

/// Renders one predicate; `NOT` is null-safe so exclusion is an exact
/// complement.
fn render_predicate(predicate: &Predicate, params: &mut Vec<Value>) -> String {
    match predicate {
        Predicate::Compare { field, op, value } => {
            params.push(value.clone());
            format!("{} {} ?", quote(field), op.as_sql())
        }
        Predicate::In { field, values } => {
            if values.is_empty() {
                return "0".to_string();
            }
            params.extend(values.iter().cloned());
            let slots = vec!["?"; values.len()].join(", ");
            format!("{} IN ({slots})", quote(field))
        }
        Predicate::IsNull { field } => format!("{} IS NULL", quote(field)),
        Predicate::Like { field, pattern } => {
            params.push(Value::Text(pattern.clone()));
            format!("{} LIKE ?", quote(field))
        }
        Predicate::And(children) => render_group(children, " AND ", "1", params),
        Predicate::Or(children) => render_group(children, " OR ", "0", params),
        Predicate::Not(inner) => format!("NOT COALESCE({}, 0)", render_predicate(inner, params)),
    }
}

fn render_group(
    children: &[Predicate],
    separator: &str,
    empty: &str,
    params: &mut Vec<Value>,
) -> String {
    if children.is_empty() {
        return empty.to_string();
    }
    let parts: Vec<String> = children
        .iter()
        .map(|child| render_predicate(child, params))
        .collect();
    format!("({})", parts.join(separator))
}

fn clamp_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn to_sql_value(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Integer(value) => SqlValue::Integer(*value),
        Value::Float(value) => SqlValue::Real(*value),
        Value::Text(value) => SqlValue::Text(value.clone()),
        Value::Boolean(value) => SqlValue::Integer(i64::from(*value)),
        Value::Date(value) => SqlValue::Text(value.format("%Y-%m-%d").to_string()),
        Value::Timestamp(value) => {
            SqlValue::Text(value.to_rfc3339_opts(SecondsFormat::Nanos, true))
        }
        Value::Uuid(value) => SqlValue::Text(value.hyphenated().to_string()),
    }
}

fn from_sql_value(value: ValueRef<'_>, column: &str) -> ModelResult<Value> {
    match value {
        ValueRef::Null => Ok(Value::Null),
        ValueRef::Integer(value) => Ok(Value::Integer(value)),
        ValueRef::Real(value) => Ok(Value::Float(value)),
        ValueRef::Text(bytes) => String::from_utf8(bytes.to_vec())
            .map(Value::Text)
            .map_err(|_| ModelError::InvalidData(format!("non UTF-8 text in column `{column}`"))),
        ValueRef::Blob(_) => Err(ModelError::InvalidData(format!(
            "blob values are not mapped (column `{column}`)"
        ))),
    }
}

fn parse_record(row: &Row<'_>, columns: &[&str]) -> ModelResult<Record> {
    let mut record = Record::new();
    for (index, column) in columns.iter().enumerate() {
        let value = from_sql_value(row.get_ref(index)?, column)?;
        record.insert((*column).to_string(), value);
    }
    Ok(record)
}
