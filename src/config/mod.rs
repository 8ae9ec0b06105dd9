//! Configuration structures for crudlify
//!
//! A configuration file declares the engine options and the schema of each
//! collection:
//!
//! ```yaml
//! options:
//!   schema: declarative   # declarative | json-schema | typed
//!   query: q2m
//!   prefix: /api
//! collections:
//!   books:
//!     title: { type: string, required: true }
//!     pages: integer
//!   logs: ~               # reserved, no validation
//! ```
//!
//! An empty (or absent) `collections` map accepts every collection name.

use crate::core::error::ConfigError;
use crate::core::query::QueryLanguage;
use crate::core::schema::{RawSchema, RawSchemaMap, SchemaBackend};
use anyhow::Result;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;

/// Engine options chosen once at setup
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CrudOptions {
    /// Validation backend applied to every collection
    pub schema: SchemaBackend,

    /// Query-string language
    pub query: QueryLanguage,

    /// Path the routes are nested under (e.g. `/api`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
}

impl CrudOptions {
    pub fn with_schema(mut self, schema: SchemaBackend) -> Self {
        self.schema = schema;
        self
    }

    pub fn with_query(mut self, query: QueryLanguage) -> Self {
        self.query = query;
        self
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    /// Check the options for values the router cannot use
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(prefix) = &self.prefix {
            if !prefix.starts_with('/') || prefix.len() < 2 || prefix.ends_with('/') {
                return Err(ConfigError::InvalidValue {
                    field: "options.prefix".to_string(),
                    value: prefix.clone(),
                    message: "must start with '/', and be neither '/' nor end with '/'"
                        .to_string(),
                });
            }
        }
        Ok(())
    }
}

/// Complete configuration file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CrudConfig {
    pub options: CrudOptions,

    /// Collection name to schema rules; `null` reserves a collection
    pub collections: IndexMap<String, Option<Value>>,
}

impl CrudConfig {
    /// Load configuration from a YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::IoError {
            message: format!("Failed to read config file {}: {}", path.display(), e),
        })?;
        let config = Self::parse_yaml(&content, Some(path.display().to_string()))?;
        Ok(config)
    }

    /// Load configuration from a YAML string
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        Ok(Self::parse_yaml(yaml, None)?)
    }

    /// Load configuration from a JSON string
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json).map_err(|e| ConfigError::ParseError {
            file: None,
            message: e.to_string(),
        })?;
        config.options.validate()?;
        Ok(config)
    }

    fn parse_yaml(yaml: &str, file: Option<String>) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(yaml).map_err(|e| ConfigError::ParseError {
            file,
            message: e.to_string(),
        })?;
        config.options.validate()?;
        Ok(config)
    }

    /// Split into the raw schema map and the options
    pub fn into_parts(self) -> (RawSchemaMap, CrudOptions) {
        let schemas = self
            .collections
            .into_iter()
            .map(|(name, rules)| (name, rules.map(RawSchema::Rules)))
            .collect();
        (schemas, self.options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const YAML: &str = r#"
options:
  schema: json-schema
  prefix: /api
collections:
  books:
    type: object
    required: [title]
  logs: ~
"#;

    #[test]
    fn test_yaml_config() {
        let config = CrudConfig::from_yaml_str(YAML).unwrap();
        assert_eq!(config.options.schema, SchemaBackend::JsonSchema);
        assert_eq!(config.options.query, QueryLanguage::Q2m);
        assert_eq!(config.options.prefix.as_deref(), Some("/api"));

        let (schemas, _) = config.into_parts();
        assert_eq!(schemas.keys().collect::<Vec<_>>(), vec!["books", "logs"]);
        assert!(schemas["logs"].is_none());
        match &schemas["books"] {
            Some(RawSchema::Rules(rules)) => assert_eq!(rules["required"], json!(["title"])),
            other => panic!("unexpected schema: {:?}", other),
        }
    }

    #[test]
    fn test_defaults() {
        let config = CrudConfig::from_yaml_str("{}").unwrap();
        assert_eq!(config.options, CrudOptions::default());
        assert_eq!(config.options.schema, SchemaBackend::Declarative);
        assert!(config.collections.is_empty());
    }

    #[test]
    fn test_json_config() {
        let config =
            CrudConfig::from_json_str(r#"{"collections": {"books": {"title": "string"}}}"#)
                .unwrap();
        assert_eq!(config.collections.len(), 1);
    }

    #[test]
    fn test_invalid_prefix_rejected() {
        for prefix in ["api", "/", "/api/"] {
            let options = CrudOptions::default().with_prefix(prefix);
            assert!(options.validate().is_err(), "prefix {prefix} accepted");
        }
        assert!(CrudOptions::default().with_prefix("/v1/crud").validate().is_ok());
    }

    #[test]
    fn test_unknown_backend_rejected() {
        let err = CrudConfig::from_yaml_str("options:\n  schema: xml\n").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ConfigError>(),
            Some(ConfigError::ParseError { file: None, .. })
        ));
        assert!(err.to_string().contains("xml"));
    }

    #[test]
    fn test_malformed_json_is_parse_error() {
        let err = CrudConfig::from_json_str("{\"options\": ").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ConfigError>(),
            Some(ConfigError::ParseError { .. })
        ));
    }
}
