//! # Record Transformation
//!
//! Coerces raw API records against the stream's JSON Schema before they are
//! emitted:
//!
//! - top-level fields deselected in the catalog metadata are removed;
//! - properties not declared in the schema are removed, at every depth;
//! - each value is tried against the declared types in order and the first
//!   type it can be coerced to wins (numeric strings become numbers, `"false"`
//!   becomes `false`, `date-time` strings are normalized to UTC);
//! - integers are never read as timestamps.
//!
//! A value that fits none of its declared types is a schema mismatch and fails
//! the whole record.

use serde_json::{Map, Number, Value};
use thiserror::Error;

use crate::singer::catalog::StreamMetadata;
use crate::utils::datetime::{format_record_datetime, parse_datetime};

/// Raised when a record does not fit its schema.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum TransformError {
    /// One or more values could not be coerced; each entry names the path and the problem.
    #[error("Record does not match schema: {}", .0.join("; "))]
    SchemaMismatch(Vec<String>),
}

/// Transforms one record: metadata filtering, then schema coercion.
pub fn transform_record(
    record: Map<String, Value>,
    schema: &Value,
    metadata: &StreamMetadata,
) -> Result<Map<String, Value>, TransformError> {
    let mut errors = Vec::new();
    let mut removed = Vec::new();

    let filtered: Map<String, Value> = record
        .into_iter()
        .filter(|(k, _)| {
            let keep = metadata.is_field_selected(k);
            if !keep {
                removed.push(k.clone());
            }
            keep
        })
        .collect();

    let result = match schema.get("properties").and_then(Value::as_object) {
        Some(props) => transform_object(filtered, props, "", &mut errors, &mut removed),
        None => filtered,
    };

    if !removed.is_empty() {
        log::debug!("Removed paths list: {:?}", removed);
    }

    if errors.is_empty() {
        Ok(result)
    } else {
        Err(TransformError::SchemaMismatch(errors))
    }
}

fn join_path(parent: &str, key: &str) -> String {
    if parent.is_empty() {
        key.to_string()
    } else {
        format!("{}.{}", parent, key)
    }
}

fn transform_object(
    data: Map<String, Value>,
    properties: &Map<String, Value>,
    path: &str,
    errors: &mut Vec<String>,
    removed: &mut Vec<String>,
) -> Map<String, Value> {
    let mut out = Map::new();
    for (key, value) in data {
        let child_path = join_path(path, &key);
        match properties.get(&key) {
            Some(sub_schema) => match transform_value(value, sub_schema, &child_path, errors, removed) {
                Some(v) => {
                    out.insert(key, v);
                }
                None => errors.push(format!(
                    "{}: does not match {}",
                    child_path,
                    sub_schema.get("type").unwrap_or(&Value::Null)
                )),
            },
            None => removed.push(child_path),
        }
    }
    out
}

fn declared_types(schema: &Value) -> Option<Vec<&str>> {
    match schema.get("type") {
        Some(Value::String(t)) => Some(vec![t.as_str()]),
        Some(Value::Array(ts)) => Some(ts.iter().filter_map(Value::as_str).collect()),
        _ => None,
    }
}

/// Returns `None` when the value fits no declared type. Errors for nested
/// values are pushed onto `errors` directly.
fn transform_value(
    value: Value,
    schema: &Value,
    path: &str,
    errors: &mut Vec<String>,
    removed: &mut Vec<String>,
) -> Option<Value> {
    if let Some(any_of) = schema.get("anyOf").and_then(Value::as_array) {
        for candidate in any_of {
            let mut scratch_errors = Vec::new();
            let mut scratch_removed = Vec::new();
            if let Some(v) = transform_value(value.clone(), candidate, path, &mut scratch_errors, &mut scratch_removed) {
                if scratch_errors.is_empty() {
                    removed.extend(scratch_removed);
                    return Some(v);
                }
            }
        }
        return None;
    }

    let Some(types) = declared_types(schema) else {
        return Some(value);
    };

    if value.is_null() {
        return types.contains(&"null").then_some(Value::Null);
    }

    for typ in types {
        let coerced = match typ {
            "object" => match value {
                Value::Object(ref map) => match schema.get("properties").and_then(Value::as_object) {
                    Some(props) => Some(Value::Object(transform_object(map.clone(), props, path, errors, removed))),
                    None => Some(value.clone()),
                },
                _ => None,
            },
            "array" => match value {
                Value::Array(ref items) => {
                    let item_schema = schema.get("items").cloned().unwrap_or(Value::Null);
                    let mut out = Vec::with_capacity(items.len());
                    for (i, item) in items.iter().enumerate() {
                        let item_path = format!("{}[{}]", path, i);
                        match transform_value(item.clone(), &item_schema, &item_path, errors, removed) {
                            Some(v) => out.push(v),
                            None => errors.push(format!("{}: does not match item schema", item_path)),
                        }
                    }
                    Some(Value::Array(out))
                }
                _ => None,
            },
            "string" => coerce_string(&value, schema),
            "integer" => coerce_integer(&value),
            "number" => coerce_number(&value),
            "boolean" => coerce_boolean(&value),
            _ => None,
        };
        if coerced.is_some() {
            return coerced;
        }
    }

    None
}

fn coerce_string(value: &Value, schema: &Value) -> Option<Value> {
    let is_datetime = schema.get("format").and_then(Value::as_str) == Some("date-time");
    match value {
        Value::String(s) if is_datetime => parse_datetime(s)
            .ok()
            .map(|dt| Value::String(format_record_datetime(&dt))),
        // Integers are never read as timestamps.
        _ if is_datetime => None,
        Value::String(s) => Some(Value::String(s.clone())),
        Value::Number(n) => Some(Value::String(n.to_string())),
        Value::Bool(b) => Some(Value::String(b.to_string())),
        _ => None,
    }
}

fn coerce_integer(value: &Value) -> Option<Value> {
    match value {
        Value::Number(n) if n.is_i64() || n.is_u64() => Some(value.clone()),
        Value::Number(n) => n.as_f64().filter(|f| f.is_finite()).map(|f| Value::from(f.trunc() as i64)),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|f| f.is_finite())
            .map(|f| Value::from(f.trunc() as i64)),
        _ => None,
    }
}

fn coerce_number(value: &Value) -> Option<Value> {
    match value {
        Value::Number(_) => Some(value.clone()),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number),
        _ => None,
    }
}

fn coerce_boolean(value: &Value) -> Option<Value> {
    match value {
        Value::Bool(_) => Some(value.clone()),
        Value::String(s) if s.eq_ignore_ascii_case("false") => Some(Value::Bool(false)),
        Value::String(s) => Some(Value::Bool(!s.is_empty())),
        Value::Number(n) => Some(Value::Bool(n.as_f64().map(|f| f != 0.0).unwrap_or(false))),
        _ => None,
    }
}
