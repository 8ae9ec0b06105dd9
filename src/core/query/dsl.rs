//! Query-to-mongo style URL query DSL
//!
//! Parses decoded query-string pairs into Mongo-like `criteria` plus
//! `options` (projection, sort, limit, skip).
//!
//! ```text
//! ?status=active&age>=18&tags=a,b&sort=-created,name&fields=name,age&limit=10
//! ```
//!
//! becomes
//!
//! ```text
//! criteria: {"status": "active", "age": {"$gte": 18}, "tags": {"$in": ["a", "b"]}}
//! options:  {sort: {"created": -1, "name": 1}, fields: {"name": 1, "age": 1}, limit: 10}
//! ```

use regex::Regex;
use serde_json::{Map, Number, Value};
use std::sync::LazyLock;

static REGEX_LITERAL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^/(.*)/([imsx]*)$").expect("regex literal pattern is valid")
});

/// Parameters that never become field filters
const RESERVED: &[&str] = &["q", "h"];

/// Parsed DSL query
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DslQuery {
    pub criteria: Map<String, Value>,
    pub options: DslOptions,
}

/// Non-filter options recognized by the DSL
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DslOptions {
    pub fields: Option<Map<String, Value>>,
    pub sort: Option<Map<String, Value>>,
    pub limit: Option<u64>,
    pub skip: Option<u64>,
}

/// Parse query-string pairs
///
/// Unrecognized shapes and non-numeric `limit`/`skip` values are ignored.
pub fn parse(params: &[(String, String)]) -> DslQuery {
    let mut query = DslQuery::default();

    for (key, value) in params {
        match key.as_str() {
            k if RESERVED.contains(&k) => {}
            "fields" => {
                let fields = query.options.fields.get_or_insert_with(Map::new);
                fields.extend(projection_from_list(value, 1));
            }
            "omit" => {
                let fields = query.options.fields.get_or_insert_with(Map::new);
                fields.extend(projection_from_list(value, 0));
            }
            "sort" => {
                let sort = query.options.sort.get_or_insert_with(Map::new);
                sort.extend(sort_from_list(value));
            }
            "limit" => {
                // zero means no limit
                if let Ok(n) = value.trim().parse::<u64>() {
                    query.options.limit = (n > 0).then_some(n);
                }
            }
            "skip" | "offset" => {
                if let Ok(n) = value.trim().parse() {
                    query.options.skip = Some(n);
                }
            }
            _ => {
                if let Some((field, constraint)) = parse_criterion(key, value) {
                    merge_constraint(&mut query.criteria, field, constraint);
                }
            }
        }
    }

    query
}

/// Build a projection from a comma-separated field list
pub(crate) fn projection_from_list(list: &str, flag: i64) -> Map<String, Value> {
    split_list(list)
        .map(|field| (field.to_string(), Value::from(flag)))
        .collect()
}

/// Build sort hints from `-a,b,+c`
pub(crate) fn sort_from_list(list: &str) -> Map<String, Value> {
    split_list(list)
        .map(|entry| match entry.strip_prefix('-') {
            Some(field) => (field.to_string(), Value::from(-1)),
            None => (entry.trim_start_matches('+').to_string(), Value::from(1)),
        })
        .filter(|(field, _)| !field.is_empty())
        .collect()
}

fn split_list(list: &str) -> impl Iterator<Item = &str> {
    list.split(',').map(str::trim).filter(|s| !s.is_empty())
}

fn parse_criterion(key: &str, value: &str) -> Option<(String, Value)> {
    if key.is_empty() {
        return None;
    }

    if value.is_empty() {
        // `age>18` arrives as a key with no value
        if let Some(pos) = key.find(['>', '<']) {
            let (field, rest) = key.split_at(pos);
            let op = if rest.starts_with('>') { "$gt" } else { "$lt" };
            let rhs = &rest[1..];
            if field.is_empty() || rhs.is_empty() {
                return None;
            }
            return Some((field.to_string(), operator(op, typed_value(rhs))));
        }
        if let Some(field) = key.strip_prefix('!') {
            return (!field.is_empty())
                .then(|| (field.to_string(), operator("$exists", Value::Bool(false))));
        }
        return Some((key.to_string(), operator("$exists", Value::Bool(true))));
    }

    if let Some(field) = key.strip_suffix('!') {
        let constraint = if value.contains(',') {
            operator("$nin", typed_list(value))
        } else {
            operator("$ne", typed_value(value))
        };
        return Some((field.to_string(), constraint));
    }
    if let Some(field) = key.strip_suffix('>') {
        return Some((field.to_string(), operator("$gte", typed_value(value))));
    }
    if let Some(field) = key.strip_suffix('<') {
        return Some((field.to_string(), operator("$lte", typed_value(value))));
    }

    if let Some(caps) = REGEX_LITERAL.captures(value) {
        let mut regex = Map::new();
        regex.insert("$regex".to_string(), Value::String(caps[1].to_string()));
        if !caps[2].is_empty() {
            regex.insert("$options".to_string(), Value::String(caps[2].to_string()));
        }
        return Some((key.to_string(), Value::Object(regex)));
    }

    if value.contains(',') {
        return Some((key.to_string(), operator("$in", typed_list(value))));
    }

    Some((key.to_string(), typed_value(value)))
}

fn operator(op: &str, value: Value) -> Value {
    let mut map = Map::new();
    map.insert(op.to_string(), value);
    Value::Object(map)
}

fn is_operator_object(value: &Value) -> bool {
    value
        .as_object()
        .is_some_and(|m| !m.is_empty() && m.keys().all(|k| k.starts_with('$')))
}

/// Several constraints on one field merge into a single operator object
fn merge_constraint(criteria: &mut Map<String, Value>, field: String, constraint: Value) {
    match criteria.get_mut(&field) {
        Some(existing) if is_operator_object(existing) && is_operator_object(&constraint) => {
            if let (Some(target), Value::Object(ops)) = (existing.as_object_mut(), constraint) {
                target.extend(ops);
            }
        }
        _ => {
            criteria.insert(field, constraint);
        }
    }
}

fn typed_list(raw: &str) -> Value {
    Value::Array(split_list(raw).map(typed_value).collect())
}

/// Interpret a raw query-string value as the most specific JSON scalar
pub(crate) fn typed_value(raw: &str) -> Value {
    match raw {
        "true" => return Value::Bool(true),
        "false" => return Value::Bool(false),
        "null" => return Value::Null,
        _ => {}
    }
    if let Ok(n) = raw.parse::<i64>() {
        return Value::Number(n.into());
    }
    if let Ok(f) = raw.parse::<f64>() {
        if let Some(n) = Number::from_f64(f).filter(|_| f.is_finite()) {
            return Value::Number(n);
        }
    }
    Value::String(raw.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn pairs(raw: &[(&str, &str)]) -> Vec<(String, String)> {
        raw.iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_equality_is_typed() {
        let q = parse(&pairs(&[
            ("name", "Dune"),
            ("pages", "412"),
            ("rating", "4.5"),
            ("available", "true"),
            ("editor", "null"),
        ]));
        assert_eq!(
            Value::Object(q.criteria),
            json!({"name": "Dune", "pages": 412, "rating": 4.5, "available": true, "editor": null})
        );
    }

    #[test]
    fn test_comparison_operators() {
        let q = parse(&pairs(&[("age>", "18"), ("age<", "65"), ("score>9", "")]));
        assert_eq!(q.criteria["age"], json!({"$gte": 18, "$lte": 65}));
        assert_eq!(q.criteria["score"], json!({"$gt": 9}));
    }

    #[test]
    fn test_lists_and_negation() {
        let q = parse(&pairs(&[("tag", "a,b"), ("status!", "draft"), ("kind!", "x,y")]));
        assert_eq!(q.criteria["tag"], json!({"$in": ["a", "b"]}));
        assert_eq!(q.criteria["status"], json!({"$ne": "draft"}));
        assert_eq!(q.criteria["kind"], json!({"$nin": ["x", "y"]}));
    }

    #[test]
    fn test_exists_and_regex() {
        let q = parse(&pairs(&[("cover", ""), ("!deleted", ""), ("title", "/^du/i")]));
        assert_eq!(q.criteria["cover"], json!({"$exists": true}));
        assert_eq!(q.criteria["deleted"], json!({"$exists": false}));
        assert_eq!(q.criteria["title"], json!({"$regex": "^du", "$options": "i"}));
    }

    #[test]
    fn test_options() {
        let q = parse(&pairs(&[
            ("fields", "title,author"),
            ("omit", "secret"),
            ("sort", "-year,title"),
            ("limit", "5"),
            ("offset", "10"),
        ]));
        assert!(q.criteria.is_empty());
        assert_eq!(
            Value::Object(q.options.fields.unwrap()),
            json!({"title": 1, "author": 1, "secret": 0})
        );
        assert_eq!(
            Value::Object(q.options.sort.unwrap()),
            json!({"year": -1, "title": 1})
        );
        assert_eq!(q.options.limit, Some(5));
        assert_eq!(q.options.skip, Some(10));
    }

    #[test]
    fn test_invalid_numbers_and_reserved_keys_are_ignored() {
        let q = parse(&pairs(&[("limit", "lots"), ("skip", "-1"), ("q", "{}"), ("h", "{}")]));
        assert_eq!(q, DslQuery::default());
    }

    #[test]
    fn test_typed_value_keeps_non_finite_as_strings() {
        assert_eq!(typed_value("inf"), json!("inf"));
        assert_eq!(typed_value("NaN"), json!("NaN"));
        assert_eq!(typed_value("-3"), json!(-3));
    }
}
