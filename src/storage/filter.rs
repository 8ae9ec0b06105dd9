//! Mongo-style query evaluation over in-memory documents
//!
//! Supports the subset of the query language produced by the query
//! translator:
//!
//! - comparisons: `$eq`, `$ne`, `$gt`, `$gte`, `$lt`, `$lte`
//! - sets: `$in`, `$nin`
//! - `$exists`, `$regex` (with `$options`), `$not`
//! - logical: `$and`, `$or`, `$nor`
//!
//! Field names may be dotted paths (`author.name`, `tags.0`). A scalar
//! condition on an array field matches when any element matches.
//!
//! Update documents accept `$set`, `$unset` and `$inc`; a document with no
//! operator keys is treated as `$set`.

use crate::core::document::{Document, ID_FIELD};
use crate::core::error::StorageError;
use regex::RegexBuilder;
use serde_json::{Map, Number, Value};
use std::cmp::Ordering;

// ---------------------------------------------------------------------------
// Matching
// ---------------------------------------------------------------------------

/// Whether `document` satisfies `filter`
pub fn matches(document: &Document, filter: &Map<String, Value>) -> bool {
    filter.iter().all(|(key, condition)| match key.as_str() {
        "$and" => clauses(condition).iter().all(|c| matches(document, c)),
        "$or" => clauses(condition).iter().any(|c| matches(document, c)),
        "$nor" => !clauses(condition).iter().any(|c| matches(document, c)),
        path => field_matches(lookup(document, path), condition),
    })
}

fn clauses(value: &Value) -> Vec<&Map<String, Value>> {
    value
        .as_array()
        .map(|items| items.iter().filter_map(Value::as_object).collect())
        .unwrap_or_default()
}

fn is_operator_object(value: &Value) -> bool {
    value
        .as_object()
        .is_some_and(|m| !m.is_empty() && m.keys().all(|k| k.starts_with('$')))
}

fn field_matches(actual: Option<&Value>, condition: &Value) -> bool {
    match condition.as_object() {
        Some(ops) if is_operator_object(condition) => ops
            .iter()
            .all(|(op, operand)| operator_matches(actual, op, operand, ops)),
        _ => equals(actual, condition),
    }
}

fn operator_matches(
    actual: Option<&Value>,
    op: &str,
    operand: &Value,
    siblings: &Map<String, Value>,
) -> bool {
    match op {
        "$eq" => equals(actual, operand),
        "$ne" => !equals(actual, operand),
        "$gt" => compares(actual, operand, |o| o == Ordering::Greater),
        "$gte" => compares(actual, operand, |o| o != Ordering::Less),
        "$lt" => compares(actual, operand, |o| o == Ordering::Less),
        "$lte" => compares(actual, operand, |o| o != Ordering::Greater),
        "$in" => operand
            .as_array()
            .is_some_and(|items| items.iter().any(|item| equals(actual, item))),
        "$nin" => !operand
            .as_array()
            .is_some_and(|items| items.iter().any(|item| equals(actual, item))),
        "$exists" => actual.is_some() == truthy(operand),
        "$regex" => {
            let options = siblings.get("$options").and_then(Value::as_str).unwrap_or("");
            regex_matches(actual, operand, options)
        }
        "$options" => true,
        "$not" => !field_matches(actual, operand),
        _ => false,
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::Null => false,
        _ => true,
    }
}

/// Equality with Mongo's array semantics
fn equals(actual: Option<&Value>, expected: &Value) -> bool {
    match actual {
        None => expected.is_null(),
        Some(value) if values_equal(value, expected) => true,
        Some(Value::Array(items)) => items.iter().any(|item| values_equal(item, expected)),
        Some(_) => false,
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

fn compares(actual: Option<&Value>, operand: &Value, accept: impl Fn(Ordering) -> bool) -> bool {
    let check = |value: &Value| comparable(value, operand).is_some_and(&accept);
    match actual {
        None => false,
        Some(Value::Array(items)) if !operand.is_array() => items.iter().any(check),
        Some(value) => check(value),
    }
}

/// Ordering between values of the same kind, `None` across kinds
fn comparable(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        _ => None,
    }
}

fn regex_matches(actual: Option<&Value>, pattern: &Value, options: &str) -> bool {
    let Some(pattern) = pattern.as_str() else {
        return false;
    };
    let Ok(re) = RegexBuilder::new(pattern)
        .case_insensitive(options.contains('i'))
        .multi_line(options.contains('m'))
        .dot_matches_new_line(options.contains('s'))
        .ignore_whitespace(options.contains('x'))
        .build()
    else {
        return false;
    };
    match actual {
        Some(Value::String(s)) => re.is_match(s),
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .any(|s| re.is_match(s)),
        _ => false,
    }
}

/// Resolve a dotted path
pub fn lookup<'a>(document: &'a Document, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let mut current = document.get(segments.next()?)?;
    for segment in segments {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

// ---------------------------------------------------------------------------
// Sorting and projection
// ---------------------------------------------------------------------------

/// Sort in place by `{field: 1 | -1}` hints, in key order
pub fn sort_documents(documents: &mut [Document], sort: &Map<String, Value>) {
    if sort.is_empty() {
        return;
    }
    documents.sort_by(|a, b| {
        for (path, direction) in sort {
            let ordering = total_order(lookup(a, path), lookup(b, path));
            let ordering = if direction.as_f64().is_some_and(|d| d < 0.0) {
                ordering.reverse()
            } else {
                ordering
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    });
}

fn type_rank(value: Option<&Value>) -> u8 {
    match value {
        None | Some(Value::Null) => 0,
        Some(Value::Number(_)) => 1,
        Some(Value::String(_)) => 2,
        Some(Value::Object(_)) => 3,
        Some(Value::Array(_)) => 4,
        Some(Value::Bool(_)) => 5,
    }
}

fn total_order(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    let (ra, rb) = (type_rank(a), type_rank(b));
    if ra != rb {
        return ra.cmp(&rb);
    }
    match (a, b) {
        (Some(x), Some(y)) => comparable(x, y)
            .unwrap_or_else(|| x.to_string().cmp(&y.to_string())),
        _ => Ordering::Equal,
    }
}

/// Apply a top-level inclusion (`1`) or exclusion (`0`) projection
///
/// Inclusion keeps `_id` unless it is explicitly excluded.
pub fn project(document: Document, projection: &Map<String, Value>) -> Document {
    if projection.is_empty() {
        return document;
    }
    let inclusive = projection
        .iter()
        .any(|(field, flag)| field != ID_FIELD && truthy(flag));

    if inclusive {
        let keep_id = projection.get(ID_FIELD).is_none_or(truthy);
        document
            .into_iter()
            .filter(|(field, _)| {
                if field == ID_FIELD {
                    keep_id
                } else {
                    projection.get(field).is_some_and(truthy)
                }
            })
            .collect()
    } else {
        document
            .into_iter()
            .filter(|(field, _)| projection.get(field).is_none_or(truthy))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Updates
// ---------------------------------------------------------------------------

/// Apply an update document in place; `_id` is never modified
pub fn apply_update(document: &mut Document, update: &Document) -> Result<(), StorageError> {
    if !update.keys().any(|k| k.starts_with('$')) {
        set_fields(document, update);
        return Ok(());
    }

    for (op, fields) in update {
        let fields = fields.as_object().ok_or_else(|| {
            StorageError::backend("memory", format!("{} expects an object", op))
        })?;
        match op.as_str() {
            "$set" => set_fields(document, fields),
            "$unset" => {
                for path in fields.keys().filter(|p| p.as_str() != ID_FIELD) {
                    remove_path(document, path);
                }
            }
            "$inc" => {
                for (path, delta) in fields.iter().filter(|(p, _)| p.as_str() != ID_FIELD) {
                    increment(document, path, delta)?;
                }
            }
            other => {
                return Err(StorageError::backend(
                    "memory",
                    format!("unsupported update operator {}", other),
                ));
            }
        }
    }
    Ok(())
}

fn set_fields(document: &mut Document, fields: &Map<String, Value>) {
    for (path, value) in fields.iter().filter(|(p, _)| p.as_str() != ID_FIELD) {
        set_path(document, path, value.clone());
    }
}

fn set_path(document: &mut Document, path: &str, value: Value) {
    match path.split_once('.') {
        None => {
            document.insert(path.to_string(), value);
        }
        Some((head, rest)) => {
            let child = document
                .entry(head.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !child.is_object() {
                *child = Value::Object(Map::new());
            }
            if let Value::Object(map) = child {
                set_path(map, rest, value);
            }
        }
    }
}

fn remove_path(document: &mut Document, path: &str) {
    match path.split_once('.') {
        None => {
            document.remove(path);
        }
        Some((head, rest)) => {
            if let Some(Value::Object(map)) = document.get_mut(head) {
                remove_path(map, rest);
            }
        }
    }
}

fn increment(document: &mut Document, path: &str, delta: &Value) -> Result<(), StorageError> {
    let invalid = || StorageError::backend("memory", format!("cannot $inc non-numeric field {}", path));
    let Value::Number(delta) = delta else {
        return Err(invalid());
    };
    let next = match lookup(document, path) {
        None | Some(Value::Null) => Value::Number(delta.clone()),
        Some(Value::Number(current)) => add(current, delta).ok_or_else(invalid)?,
        Some(_) => return Err(invalid()),
    };
    set_path(document, path, next);
    Ok(())
}

fn add(a: &Number, b: &Number) -> Option<Value> {
    if let (Some(x), Some(y)) = (a.as_i64(), b.as_i64()) {
        if let Some(sum) = x.checked_add(y) {
            return Some(Value::from(sum));
        }
    }
    Number::from_f64(a.as_f64()? + b.as_f64()?).map(Value::Number)
}
