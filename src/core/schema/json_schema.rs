//! JSON Schema validation backend
//!
//! Each collection maps to a JSON Schema document. In partial mode the
//! top-level `required` keyword is ignored so that patches only need to
//! carry the fields they change.

use super::{CompiledSchema, RawSchema, SchemaStrategy, ValidationMode, unsupported_schema};
use crate::core::document::Document;
use crate::core::error::{ConfigError, FieldValidationError, ValidationError};
use async_trait::async_trait;
use jsonschema::Validator;
use jsonschema::error::ValidationErrorKind;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// A compiled JSON Schema together with its source document
pub struct CompiledJsonSchema {
    schema: Value,
    validator: Validator,
}

impl fmt::Debug for CompiledJsonSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledJsonSchema")
            .field("schema", &self.schema)
            .finish_non_exhaustive()
    }
}

impl CompiledJsonSchema {
    pub fn compile(collection: &str, schema: Value) -> Result<Self, ConfigError> {
        let validator = jsonschema::validator_for(&schema).map_err(|e| {
            unsupported_schema("json-schema", collection, &e.to_string())
        })?;
        Ok(Self { schema, validator })
    }

    /// The source schema document
    pub fn schema(&self) -> &Value {
        &self.schema
    }

    fn check(&self, document: &Document, mode: ValidationMode) -> Vec<FieldValidationError> {
        let instance = Value::Object(document.clone());
        self.validator
            .iter_errors(&instance)
            .filter_map(|error| {
                let path = error.instance_path.to_string();
                if let ValidationErrorKind::Required { property } = &error.kind {
                    if mode == ValidationMode::Partial && path.is_empty() {
                        return None;
                    }
                    let field = match property {
                        Value::String(name) => join_path(&path, name),
                        other => join_path(&path, &other.to_string()),
                    };
                    return Some(FieldValidationError::new(field, error.to_string()));
                }
                Some(FieldValidationError::new(pointer_to_field(&path), error.to_string()))
            })
            .collect()
    }

    /// Fill top-level `properties.*.default` values for missing fields
    fn fill_defaults(&self, mut document: Document) -> Document {
        let Some(properties) = self.schema.get("properties").and_then(Value::as_object) else {
            return document;
        };
        for (name, property) in properties {
            if let Some(default) = property.get("default") {
                if !document.contains_key(name) {
                    document.insert(name.clone(), default.clone());
                }
            }
        }
        document
    }
}

/// `/a/0` becomes `a.0`; the root becomes `$`
fn pointer_to_field(pointer: &str) -> String {
    let trimmed = pointer.trim_start_matches('/');
    if trimmed.is_empty() {
        return "$".to_string();
    }
    trimmed
        .split('/')
        .map(|segment| segment.replace("~1", "/").replace("~0", "~"))
        .collect::<Vec<_>>()
        .join(".")
}

fn join_path(pointer: &str, name: &str) -> String {
    if pointer.trim_start_matches('/').is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", pointer_to_field(pointer), name)
    }
}

/// The JSON Schema backend
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSchemaStrategy;

#[async_trait]
impl SchemaStrategy for JsonSchemaStrategy {
    fn name(&self) -> &'static str {
        "json-schema"
    }

    fn compile(&self, collection: &str, raw: RawSchema) -> Result<CompiledSchema, ConfigError> {
        match raw {
            RawSchema::Rules(schema) => Ok(CompiledSchema::JsonSchema(Arc::new(
                CompiledJsonSchema::compile(collection, schema)?,
            ))),
            RawSchema::Typed(_) => Err(unsupported_schema(
                self.name(),
                collection,
                "typed schemas require the typed backend",
            )),
        }
    }

    async fn validate(
        &self,
        schema: &CompiledSchema,
        document: Document,
        mode: ValidationMode,
    ) -> Result<Document, ValidationError> {
        let CompiledSchema::JsonSchema(schema) = schema else {
            return Err(ValidationError::SchemaMismatch {
                backend: self.name(),
            });
        };
        let errors = schema.check(&document, mode);
        if errors.is_empty() {
            Ok(document)
        } else {
            Err(ValidationError::from_fields(errors))
        }
    }

    fn cast(&self, schema: &CompiledSchema, document: Document, mode: ValidationMode) -> Document {
        match (schema, mode) {
            (CompiledSchema::JsonSchema(schema), ValidationMode::Full) => {
                schema.fill_defaults(document)
            }
            _ => document,
        }
    }
}
