//! Typed error handling for the crudlify dispatch engine
//!
//! Every failure that can surface from a CRUD request is represented by
//! [`CrudError`]. Each variant knows its HTTP status code and a stable
//! error code, so handlers can simply return `Result<_, CrudError>` and let
//! the [`IntoResponse`] implementation build the response body.
//!
//! # Error Categories
//!
//! - [`CrudError::UnknownCollection`]: collection not declared in a non-empty schema map
//! - [`ValidationError`]: structured field errors from the validation strategy
//! - [`QueryParseError`]: malformed raw `q`/`h` query parameters
//! - [`RequestError`]: unusable request payloads
//! - [`StorageError`]: failures raised by the storage backend
//! - [`HookError`]: failures raised by a before/after lifecycle hook
//! - [`ConfigError`]: setup-time configuration problems
//!
//! # Example
//!
//! ```rust,ignore
//! match dispatcher.read_one("books", "42").await {
//!     Ok(doc) => println!("Found: {}", doc),
//!     Err(CrudError::Storage(StorageError::NotFound { id, .. })) => {
//!         println!("Document {} not found", id);
//!     }
//!     Err(e) => eprintln!("Other error: {}", e),
//! }
//! ```

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use std::fmt;

/// The main error type for crudlify
#[derive(Debug)]
pub enum CrudError {
    /// The schema map is non-empty and does not declare this collection
    UnknownCollection { collection: String },

    /// The document was rejected by the validation strategy
    Validation(ValidationError),

    /// The raw query or hints parameter could not be parsed
    Query(QueryParseError),

    /// The request payload is unusable
    Request(RequestError),

    /// The storage backend failed
    Storage(StorageError),

    /// A lifecycle hook failed
    Hook(HookError),

    /// Setup-time configuration error
    Config(ConfigError),
}

impl fmt::Display for CrudError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CrudError::UnknownCollection { collection } => {
                write!(f, "Collection not found: {}", collection)
            }
            CrudError::Validation(e) => write!(f, "{}", e),
            CrudError::Query(e) => write!(f, "{}", e),
            CrudError::Request(e) => write!(f, "{}", e),
            CrudError::Storage(e) => write!(f, "{}", e),
            CrudError::Hook(e) => write!(f, "{}", e),
            CrudError::Config(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for CrudError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CrudError::UnknownCollection { .. } => None,
            CrudError::Validation(e) => Some(e),
            CrudError::Query(e) => Some(e),
            CrudError::Request(e) => Some(e),
            CrudError::Storage(e) => Some(e),
            CrudError::Hook(e) => Some(e),
            CrudError::Config(e) => Some(e),
        }
    }
}

/// Error response structure for HTTP responses
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error code for programmatic handling
    pub code: String,
    /// Human-readable error message
    pub message: String,
    /// Optional additional details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl CrudError {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            CrudError::UnknownCollection { .. } => StatusCode::NOT_FOUND,
            CrudError::Validation(_) => StatusCode::BAD_REQUEST,
            CrudError::Query(_) => StatusCode::BAD_REQUEST,
            CrudError::Request(_) => StatusCode::BAD_REQUEST,
            CrudError::Storage(e) => e.status_code(),
            CrudError::Hook(_) => StatusCode::INTERNAL_SERVER_ERROR,
            CrudError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the error code for this error
    pub fn error_code(&self) -> &'static str {
        match self {
            CrudError::UnknownCollection { .. } => "COLLECTION_NOT_FOUND",
            CrudError::Validation(_) => "VALIDATION_ERROR",
            CrudError::Query(_) => "QUERY_PARSE_ERROR",
            CrudError::Request(e) => e.error_code(),
            CrudError::Storage(e) => e.error_code(),
            CrudError::Hook(_) => "HOOK_FAILED",
            CrudError::Config(_) => "CONFIG_ERROR",
        }
    }

    /// Whether the error was caused by the client (4xx)
    pub fn is_client_error(&self) -> bool {
        self.status_code().is_client_error()
    }

    /// Convert to an error response
    pub fn to_response(&self) -> ErrorResponse {
        ErrorResponse {
            code: self.error_code().to_string(),
            message: self.to_string(),
            details: self.details(),
        }
    }

    fn details(&self) -> Option<serde_json::Value> {
        match self {
            CrudError::UnknownCollection { collection } => {
                Some(serde_json::json!({ "collection": collection }))
            }
            CrudError::Validation(e) => Some(serde_json::json!({ "fields": e.errors() })),
            CrudError::Storage(StorageError::NotFound { collection, id }) => {
                Some(serde_json::json!({ "collection": collection, "id": id }))
            }
            _ => None,
        }
    }
}

impl IntoResponse for CrudError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(self.to_response());
        (status, body).into_response()
    }
}

// =============================================================================
// Validation Errors
// =============================================================================

/// A single field validation error
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldValidationError {
    pub field: String,
    pub message: String,
}

impl FieldValidationError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Structured validation failure produced by a schema strategy
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// Single field validation error
    FieldError { field: String, message: String },

    /// Multiple field validation errors
    FieldErrors(Vec<FieldValidationError>),

    /// The compiled schema does not belong to the active backend
    SchemaMismatch { backend: &'static str },
}

impl ValidationError {
    /// Build from a list of field errors, collapsing a single entry
    pub fn from_fields(mut errors: Vec<FieldValidationError>) -> Self {
        if errors.len() == 1 {
            let e = errors.remove(0);
            ValidationError::FieldError {
                field: e.field,
                message: e.message,
            }
        } else {
            ValidationError::FieldErrors(errors)
        }
    }

    /// All field-level errors carried by this error
    pub fn errors(&self) -> Vec<FieldValidationError> {
        match self {
            ValidationError::FieldError { field, message } => {
                vec![FieldValidationError::new(field.clone(), message.clone())]
            }
            ValidationError::FieldErrors(errors) => errors.clone(),
            ValidationError::SchemaMismatch { .. } => Vec::new(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::FieldError { field, message } => {
                write!(f, "Validation error for field '{}': {}", field, message)
            }
            ValidationError::FieldErrors(errors) => {
                let msgs: Vec<String> = errors
                    .iter()
                    .map(|e| format!("{}: {}", e.field, e.message))
                    .collect();
                write!(f, "Validation errors: {}", msgs.join(", "))
            }
            ValidationError::SchemaMismatch { backend } => {
                write!(f, "Schema was not compiled by the {} backend", backend)
            }
        }
    }
}

impl std::error::Error for ValidationError {}

impl From<ValidationError> for CrudError {
    fn from(err: ValidationError) -> Self {
        CrudError::Validation(err)
    }
}

// =============================================================================
// Query Errors
// =============================================================================

/// Malformed raw filter (`q`) or hints (`h`) parameter
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("Invalid {parameter} parameter: {message}")]
pub struct QueryParseError {
    pub parameter: String,
    pub message: String,
}

impl QueryParseError {
    pub fn new(parameter: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            parameter: parameter.into(),
            message: message.into(),
        }
    }
}

impl From<QueryParseError> for CrudError {
    fn from(err: QueryParseError) -> Self {
        CrudError::Query(err)
    }
}

// =============================================================================
// Request Errors
// =============================================================================

/// Errors related to the incoming request payload
#[derive(Debug)]
pub enum RequestError {
    /// Invalid request body
    InvalidBody { message: String },
}

impl fmt::Display for RequestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestError::InvalidBody { message } => write!(f, "Invalid body: {}", message),
        }
    }
}

impl std::error::Error for RequestError {}

impl RequestError {
    pub fn error_code(&self) -> &'static str {
        match self {
            RequestError::InvalidBody { .. } => "INVALID_BODY",
        }
    }
}

impl From<RequestError> for CrudError {
    fn from(err: RequestError) -> Self {
        CrudError::Request(err)
    }
}

// =============================================================================
// Storage Errors
// =============================================================================

/// Errors raised by a storage backend
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The targeted document does not exist
    #[error("Document '{id}' not found in collection '{collection}'")]
    NotFound { collection: String, id: String },

    /// Any other backend fault (connectivity, constraint violation, ...)
    #[error("{backend} storage error: {message}")]
    Backend { backend: String, message: String },
}

impl StorageError {
    pub fn not_found(collection: &str, id: &str) -> Self {
        StorageError::NotFound {
            collection: collection.to_string(),
            id: id.to_string(),
        }
    }

    pub fn backend(backend: &str, message: impl fmt::Display) -> Self {
        StorageError::Backend {
            backend: backend.to_string(),
            message: message.to_string(),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            StorageError::NotFound { .. } => StatusCode::NOT_FOUND,
            StorageError::Backend { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            StorageError::NotFound { .. } => "DOCUMENT_NOT_FOUND",
            StorageError::Backend { .. } => "STORAGE_ERROR",
        }
    }
}

impl From<StorageError> for CrudError {
    fn from(err: StorageError) -> Self {
        CrudError::Storage(err)
    }
}

// =============================================================================
// Hook Errors
// =============================================================================

/// A lifecycle hook returned an error
#[derive(Debug, thiserror::Error)]
#[error("{phase} {verb} hook for '{collection}' failed: {source}")]
pub struct HookError {
    pub collection: String,
    pub verb: String,
    pub phase: String,
    #[source]
    pub source: anyhow::Error,
}

impl From<HookError> for CrudError {
    fn from(err: HookError) -> Self {
        CrudError::Hook(err)
    }
}

// =============================================================================
// Config Errors
// =============================================================================

/// Errors related to configuration
#[derive(Debug)]
pub enum ConfigError {
    /// Failed to parse configuration
    ParseError {
        file: Option<String>,
        message: String,
    },

    /// Missing required component
    MissingField { field: String, context: String },

    /// Invalid value in configuration
    InvalidValue {
        field: String,
        value: String,
        message: String,
    },

    /// IO error while reading configuration
    IoError { message: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::ParseError { file, message } => {
                if let Some(file) = file {
                    write!(f, "Failed to parse config file '{}': {}", file, message)
                } else {
                    write!(f, "Failed to parse config: {}", message)
                }
            }
            ConfigError::MissingField { field, context } => {
                write!(f, "Missing required field '{}' in {}", field, context)
            }
            ConfigError::InvalidValue {
                field,
                value,
                message,
            } => {
                write!(
                    f,
                    "Invalid value '{}' for field '{}': {}",
                    value, field, message
                )
            }
            ConfigError::IoError { message } => write!(f, "IO error: {}", message),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<ConfigError> for CrudError {
    fn from(err: ConfigError) -> Self {
        CrudError::Config(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_collection_returns_404() {
        let err = CrudError::UnknownCollection {
            collection: "ghosts".to_string(),
        };
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(err.error_code(), "COLLECTION_NOT_FOUND");
        assert!(err.is_client_error());
    }

    #[test]
    fn test_storage_not_found_is_split_from_backend_faults() {
        let missing: CrudError = StorageError::not_found("books", "42").into();
        let broken: CrudError = StorageError::backend("memory", "poisoned lock").into();

        assert_eq!(missing.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(broken.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(broken.error_code(), "STORAGE_ERROR");
    }

    #[test]
    fn test_validation_details_list_fields() {
        let err: CrudError = ValidationError::from_fields(vec![
            FieldValidationError::new("title", "is required"),
            FieldValidationError::new("pages", "must be a number"),
        ])
        .into();

        let response = err.to_response();
        assert_eq!(response.code, "VALIDATION_ERROR");
        let fields = &response.details.unwrap()["fields"];
        assert_eq!(fields[0]["field"], "title");
        assert_eq!(fields[1]["field"], "pages");
    }

    #[test]
    fn test_single_field_error_collapses() {
        let err = ValidationError::from_fields(vec![FieldValidationError::new(
            "title",
            "is required",
        )]);
        assert!(matches!(err, ValidationError::FieldError { .. }));
        assert!(err.to_string().contains("title"));
    }

    #[test]
    fn test_hook_error_message_names_hook() {
        let err = HookError {
            collection: "books".to_string(),
            verb: "POST".to_string(),
            phase: "before".to_string(),
            source: anyhow::anyhow!("nope"),
        };
        let msg = CrudError::from(err).to_string();
        assert!(msg.contains("before POST"));
        assert!(msg.contains("nope"));
    }

    #[test]
    fn test_query_parse_error_is_client_error() {
        let err: CrudError = QueryParseError::new("q", "expected value at line 1").into();
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(err.error_code(), "QUERY_PARSE_ERROR");
    }
}
