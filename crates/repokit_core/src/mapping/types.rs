//! Declared attribute types and their coercion rules.
//!
//! # Invariants
//! - `load` accepts both typed values and the primitive forms `dump` emits,
//!   so `load(dump(v)) == v` for every loadable `v`.
//! - `dump` only emits `Null`, `Integer`, `Float`, `Text` and `Boolean`.
//! - Timestamps dump to fixed-width RFC 3339 UTC text so text ordering
//!   equals chronological ordering.

use crate::model::Value;
use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use uuid::Uuid;

const DATE_FORMAT: &str = "%Y-%m-%d";
const NAIVE_DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

/// Semantic type of a mapped attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeType {
    Integer,
    Float,
    String,
    Boolean,
    /// Calendar date, stored as `YYYY-MM-DD`.
    Date,
    /// UTC instant, stored as RFC 3339 text. Epoch milliseconds also load.
    DateTime,
    /// Stored as hyphenated text.
    Uuid,
}

impl AttributeType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Integer => "integer",
            Self::Float => "float",
            Self::String => "string",
            Self::Boolean => "boolean",
            Self::Date => "date",
            Self::DateTime => "datetime",
            Self::Uuid => "uuid",
        }
    }

    /// Converts a raw storage value into this type.
    ///
    /// Returns `None` when the value cannot be represented.
    pub fn load(self, raw: &Value) -> Option<Value> {
        if raw.is_null() {
            return Some(Value::Null);
        }

        match self {
            Self::Integer => load_integer(raw),
            Self::Float => match raw {
                Value::Integer(_) | Value::Float(_) => raw.as_f64().map(Value::Float),
                Value::Text(text) => text.trim().parse::<f64>().ok().map(Value::Float),
                _ => None,
            },
            Self::String => match raw {
                Value::Text(text) => Some(Value::Text(text.clone())),
                Value::Integer(_) | Value::Float(_) | Value::Boolean(_) | Value::Uuid(_) => {
                    Some(Value::Text(raw.to_string()))
                }
                _ => None,
            },
            Self::Boolean => load_boolean(raw),
            Self::Date => match raw {
                Value::Date(date) => Some(Value::Date(*date)),
                Value::Timestamp(instant) => Some(Value::Date(instant.date_naive())),
                Value::Text(text) => NaiveDate::parse_from_str(text.trim(), DATE_FORMAT)
                    .ok()
                    .map(Value::Date),
                _ => None,
            },
            Self::DateTime => load_datetime(raw),
            Self::Uuid => match raw {
                Value::Uuid(id) => Some(Value::Uuid(*id)),
                Value::Text(text) => Uuid::parse_str(text.trim()).ok().map(Value::Uuid),
                _ => None,
            },
        }
    }

    /// Converts a value of this type into its primitive storage form.
    ///
    /// Accepts anything `load` accepts, so callers may filter with raw forms.
    pub fn dump(self, value: &Value) -> Option<Value> {
        let typed = self.load(value)?;
        let primitive = match typed {
            Value::Date(date) => Value::Text(date.format(DATE_FORMAT).to_string()),
            Value::Timestamp(instant) => {
                Value::Text(instant.to_rfc3339_opts(SecondsFormat::Nanos, true))
            }
            Value::Uuid(id) => Value::Text(id.hyphenated().to_string()),
            other => other,
        };
        Some(primitive)
    }
}

impl Display for AttributeType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

fn load_integer(raw: &Value) -> Option<Value> {
    match raw {
        Value::Integer(value) => Some(Value::Integer(*value)),
        // i64::MAX as f64 rounds up to 2^63, so the upper bound is exclusive.
        Value::Float(value)
            if value.fract() == 0.0 && *value >= i64::MIN as f64 && *value < i64::MAX as f64 =>
        {
            Some(Value::Integer(*value as i64))
        }
        Value::Boolean(value) => Some(Value::Integer(i64::from(*value))),
        Value::Text(text) => text.trim().parse::<i64>().ok().map(Value::Integer),
        _ => None,
    }
}

fn load_boolean(raw: &Value) -> Option<Value> {
    match raw {
        Value::Boolean(value) => Some(Value::Boolean(*value)),
        Value::Integer(0) => Some(Value::Boolean(false)),
        Value::Integer(1) => Some(Value::Boolean(true)),
        Value::Text(text) => match text.trim().to_ascii_lowercase().as_str() {
            "true" | "t" | "1" => Some(Value::Boolean(true)),
            "false" | "f" | "0" => Some(Value::Boolean(false)),
            _ => None,
        },
        _ => None,
    }
}

fn load_datetime(raw: &Value) -> Option<Value> {
    match raw {
        Value::Timestamp(instant) => Some(Value::Timestamp(*instant)),
        Value::Integer(millis) => {
            DateTime::<Utc>::from_timestamp_millis(*millis).map(Value::Timestamp)
        }
        Value::Text(text) => {
            let text = text.trim();
            if let Ok(instant) = DateTime::parse_from_rfc3339(text) {
                return Some(Value::Timestamp(instant.with_timezone(&Utc)));
            }
            NaiveDateTime::parse_from_str(text, NAIVE_DATETIME_FORMAT)
                .ok()
                .map(|naive| Value::Timestamp(naive.and_utc()))
        }
        _ => None,
    }
}
