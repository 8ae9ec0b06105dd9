//! Query translation: HTTP query parameters to storage query descriptors
//!
//! The translator runs in one of two mutually exclusive modes:
//!
//! - **Raw mode**, selected when `q` or `h` is present. `q` holds a
//!   JSON-encoded filter object, `h` a JSON-encoded hints object
//!   (`limit`, `offset`, `fields`/`projection`, `sort`).
//! - **DSL mode** for everything else: the query-to-mongo DSL in [`dsl`]
//!   turns every parameter into criteria and options.
//!
//! # Example
//!
//! ```text
//! GET /books?q={"author":"Herbert"}&h={"limit":2}
//! GET /books?author=Herbert&limit=2&sort=-year
//! ```

pub mod dsl;

use crate::core::error::QueryParseError;
use axum::http::HeaderMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;

/// Normalized filter/limit/offset/projection bundle consumed by storage
///
/// Absent options are omitted when serialized, so the descriptor for
/// `?limit=5` is exactly `{"filter": {}, "limit": 5}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryDescriptor {
    /// Mongo-style predicate object
    #[serde(default)]
    pub filter: Map<String, Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<u64>,

    /// Field inclusion (`1`) or exclusion (`0`) map
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub projection: Option<Map<String, Value>>,

    /// Field to direction (`1` ascending, `-1` descending)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort: Option<Map<String, Value>>,
}

impl QueryDescriptor {
    /// Create a descriptor with only a filter
    pub fn new(filter: Map<String, Value>) -> Self {
        Self {
            filter,
            ..Default::default()
        }
    }

    pub fn with_limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    /// The descriptor as a JSON value (used as hook payload)
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    fn apply_options(&mut self, options: dsl::DslOptions) {
        self.limit = options.limit;
        self.offset = options.skip;
        self.projection = options.fields;
        self.sort = options.sort;
    }

    fn apply_hints(&mut self, hints: &Map<String, Value>) {
        self.limit = hints
            .get("limit")
            .and_then(Value::as_u64)
            .filter(|n| *n > 0);
        self.offset = hints
            .get("offset")
            .or_else(|| hints.get("skip"))
            .and_then(Value::as_u64);
        self.projection = hints
            .get("fields")
            .or_else(|| hints.get("projection"))
            .and_then(|v| field_map(v, dsl::projection_from_list));
        self.sort = hints
            .get("sort")
            .and_then(|v| field_map(v, |list, _| dsl::sort_from_list(list)));
    }
}

/// Accept `"a,b"`, `["a", "b"]` or `{"a": 1, "b": 1}` for field maps
fn field_map(
    value: &Value,
    from_list: impl Fn(&str, i64) -> Map<String, Value>,
) -> Option<Map<String, Value>> {
    match value {
        Value::Object(map) => Some(map.clone()),
        Value::String(list) => Some(from_list(list, 1)),
        Value::Array(items) => {
            let list: Vec<&str> = items.iter().filter_map(Value::as_str).collect();
            Some(from_list(&list.join(","), 1))
        }
        _ => None,
    }
}

/// Translates request query parameters into a [`QueryDescriptor`]
///
/// Implementations must be pure: the same parameters always yield the
/// same descriptor.
pub trait QueryTranslator: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    /// Translate decoded query-string pairs (in request order)
    fn translate(
        &self,
        params: &[(String, String)],
        headers: &HeaderMap,
    ) -> Result<QueryDescriptor, QueryParseError>;
}

/// Selector for the built-in query languages
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryLanguage {
    /// Query-to-mongo URL DSL with `q`/`h` raw override
    #[default]
    Q2m,
}

impl QueryLanguage {
    /// Resolve the selector into a translator
    pub fn translator(self) -> Arc<dyn QueryTranslator> {
        match self {
            QueryLanguage::Q2m => Arc::new(Q2mTranslator),
        }
    }
}

/// Query-to-mongo translator with raw JSON override
#[derive(Debug, Clone, Copy, Default)]
pub struct Q2mTranslator;

impl QueryTranslator for Q2mTranslator {
    fn name(&self) -> &'static str {
        "q2m"
    }

    fn translate(
        &self,
        params: &[(String, String)],
        _headers: &HeaderMap,
    ) -> Result<QueryDescriptor, QueryParseError> {
        let raw_filter = first_param(params, "q");
        let raw_hints = first_param(params, "h");

        if raw_filter.is_none() && raw_hints.is_none() {
            let parsed = dsl::parse(params);
            let mut descriptor = QueryDescriptor::new(parsed.criteria);
            descriptor.apply_options(parsed.options);
            tracing::debug!(?descriptor, "translated DSL query");
            return Ok(descriptor);
        }

        let filter = parse_object("q", raw_filter.unwrap_or_default())?;
        let mut descriptor = QueryDescriptor::new(filter);
        match raw_hints {
            Some(raw) => descriptor.apply_hints(&parse_object("h", raw)?),
            // Without explicit hints, DSL options still apply; DSL criteria never do
            None => descriptor.apply_options(dsl::parse(params).options),
        }
        tracing::debug!(?descriptor, "translated raw query");
        Ok(descriptor)
    }
}

fn first_param<'a>(params: &'a [(String, String)], name: &str) -> Option<&'a str> {
    params
        .iter()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.as_str())
}

fn parse_object(parameter: &str, raw: &str) -> Result<Map<String, Value>, QueryParseError> {
    if raw.trim().is_empty() {
        return Ok(Map::new());
    }
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(QueryParseError::new(
            parameter,
            format!(
                "expected a JSON object, got {}",
                crate::core::document::json_kind(&other)
            ),
        )),
        Err(e) => Err(QueryParseError::new(parameter, e.to_string())),
    }
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

    fn translate(raw: &[(&str, &str)]) -> Result<QueryDescriptor, QueryParseError> {
        Q2mTranslator.translate(&pairs(raw), &HeaderMap::new())
    }

    #[test]
    fn test_limit_only_descriptor() {
        let descriptor = translate(&[("limit", "5")]).unwrap();
        assert_eq!(
            serde_json::to_value(&descriptor).unwrap(),
            json!({"filter": {}, "limit": 5})
        );
    }

    #[test]
    fn test_raw_filter_descriptor() {
        let descriptor = translate(&[("q", r#"{"a":1}"#)]).unwrap();
        assert_eq!(
            serde_json::to_value(&descriptor).unwrap(),
            json!({"filter": {"a": 1}})
        );
    }

    #[test]
    fn test_raw_mode_ignores_dsl_criteria() {
        let descriptor = translate(&[
            ("author", "Herbert"),
            ("q", r#"{"year":1965}"#),
            ("limit", "3"),
        ])
        .unwrap();
        assert_eq!(Value::Object(descriptor.filter), json!({"year": 1965}));
        assert_eq!(descriptor.limit, Some(3));
    }

    #[test]
    fn test_raw_hints() {
        let descriptor = translate(&[
            ("h", r#"{"limit":2,"offset":4,"fields":"title,year","sort":{"year":-1}}"#),
            ("limit", "99"),
        ])
        .unwrap();
        assert!(descriptor.filter.is_empty());
        assert_eq!(descriptor.limit, Some(2));
        assert_eq!(descriptor.offset, Some(4));
        assert_eq!(
            Value::Object(descriptor.projection.unwrap()),
            json!({"title": 1, "year": 1})
        );
        assert_eq!(Value::Object(descriptor.sort.unwrap()), json!({"year": -1}));
    }

    #[test]
    fn test_raw_hints_projection_alias() {
        let descriptor = translate(&[("h", r#"{"projection":{"secret":0}}"#)]).unwrap();
        assert_eq!(
            Value::Object(descriptor.projection.unwrap()),
            json!({"secret": 0})
        );
    }

    #[test]
    fn test_zero_limit_means_no_limit() {
        assert_eq!(translate(&[("limit", "0")]).unwrap().limit, None);
        assert_eq!(translate(&[("h", r#"{"limit":0}"#)]).unwrap().limit, None);
        assert_eq!(
            translate(&[("q", "{}"), ("limit", "0")]).unwrap().limit,
            None
        );
    }

    #[test]
    fn test_malformed_raw_filter() {
        let err = translate(&[("q", "{not json")]).unwrap_err();
        assert_eq!(err.parameter, "q");
        assert!(!err.message.is_empty());
    }

    #[test]
    fn test_non_object_hints_rejected() {
        let err = translate(&[("h", "[1,2]")]).unwrap_err();
        assert_eq!(err.parameter, "h");
        assert!(err.message.contains("array"));
    }

    #[test]
    fn test_dsl_mode_maps_options() {
        let descriptor = translate(&[
            ("status", "active"),
            ("fields", "title"),
            ("skip", "20"),
            ("sort", "title"),
        ])
        .unwrap();
        assert_eq!(Value::Object(descriptor.filter.clone()), json!({"status": "active"}));
        assert_eq!(descriptor.offset, Some(20));
        assert_eq!(descriptor.limit, None);
        assert_eq!(
            Value::Object(descriptor.projection.unwrap()),
            json!({"title": 1})
        );
    }

    #[test]
    fn test_translation_is_deterministic() {
        let params = [("b", "2"), ("a", "x,y"), ("sort", "-b"), ("limit", "1")];
        assert_eq!(translate(&params).unwrap(), translate(&params).unwrap());
    }

    #[test]
    fn test_language_selector_deserializes() {
        let lang: QueryLanguage = serde_json::from_value(json!("q2m")).unwrap();
        assert_eq!(lang.translator().name(), "q2m");
    }
}
