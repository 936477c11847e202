//! Shared JSON value helpers for upstream alert records.
//!
//! Upstream feeds are loosely typed: the same field may arrive as a
//! number, a numeric string, or be missing entirely. These helpers
//! centralize the coercions the normalizer relies on.

use chrono::DateTime;
use serde_json::{Map, Value};

/// Returns the value if it is "set": not null, `false`, zero, or an
/// empty string/array/object.
#[must_use]
pub fn present(value: &Value) -> Option<&Value> {
    let empty = match value {
        Value::Null | Value::Bool(false) => true,
        Value::Bool(true) => false,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
    };
    if empty { None } else { Some(value) }
}

/// Tries each field name in order and returns the first set value.
#[must_use]
pub fn first_present<'a>(record: &'a Map<String, Value>, fields: &[&str]) -> Option<&'a Value> {
    fields
        .iter()
        .find_map(|field| record.get(*field).and_then(present))
}

/// Tries each field name in order and returns the first non-null value.
#[must_use]
pub fn first_non_null<'a>(record: &'a Map<String, Value>, fields: &[&str]) -> Option<&'a Value> {
    fields
        .iter()
        .find_map(|field| record.get(*field).filter(|v| !v.is_null()))
}

/// Converts a number or numeric string to a finite `f64`.
#[must_use]
pub fn to_f64(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|v| v.is_finite())
}

/// Converts a number or numeric string to an `i64`, truncating any
/// fractional part.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn to_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>().ok().or_else(|| {
                s.parse::<f64>()
                    .ok()
                    .filter(|f| f.is_finite())
                    .map(|f| f as i64)
            })
        }
        _ => None,
    }
}

/// Converts an epoch value to an integer. Accepts numbers, numeric
/// strings, and RFC 3339 strings (converted to milliseconds).
#[must_use]
pub fn to_epoch(value: &Value) -> Option<i64> {
    to_i64(value).or_else(|| {
        let s = value.as_str()?;
        DateTime::parse_from_rfc3339(s.trim())
            .ok()
            .map(|dt| dt.timestamp_millis())
    })
}

/// Renders a scalar value as text. Strings are returned as-is, numbers
/// and booleans are stringified, everything else is `None`.
#[must_use]
pub fn to_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Returns the first field that renders to non-empty text.
#[must_use]
pub fn first_text(record: &Map<String, Value>, fields: &[&str]) -> Option<String> {
    fields
        .iter()
        .filter_map(|field| record.get(*field).and_then(to_text))
        .find(|s| !s.is_empty())
}
