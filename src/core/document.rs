//! Untyped documents flowing between requests and storage

use crate::core::error::RequestError;
use serde_json::{Map, Value};

/// A schemaless document: field name to JSON value
pub type Document = Map<String, Value>;

/// Name of the identifier field carried by stored documents
pub const ID_FIELD: &str = "_id";

/// Turn a request body into a document
///
/// Write endpoints only accept JSON objects.
pub fn into_document(value: Value) -> Result<Document, RequestError> {
    match value {
        Value::Object(map) => Ok(map),
        other => Err(RequestError::InvalidBody {
            message: format!("expected a JSON object, got {}", json_kind(&other)),
        }),
    }
}

/// Read the identifier of a stored document as a string
pub fn document_id(document: &Document) -> Option<String> {
    match document.get(ID_FIELD)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// First top-level key that is a `$` operator, if any
pub fn operator_key(document: &Document) -> Option<&str> {
    document
        .keys()
        .map(String::as_str)
        .find(|key| key.starts_with('$'))
}

/// Human-readable name of a JSON value's kind
pub fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
