//! Typed validation backend
//!
//! Schemas are Rust types. A document is valid when it deserializes into the
//! type and the type's [`validator::Validate`] rules pass. The stored
//! document is the type serialized back, so unknown fields are dropped and
//! serde defaults are applied during validation.
//!
//! ```rust,ignore
//! #[derive(Serialize, Deserialize, Validate)]
//! struct Book {
//!     #[validate(length(min = 1))]
//!     title: String,
//!     pages: Option<u32>,
//! }
//!
//! schemas.insert("books".into(), Some(TypedSchema::of::<Book>().into()));
//! ```

use super::{CompiledSchema, RawSchema, SchemaStrategy, ValidationMode};
use crate::core::document::Document;
use crate::core::error::{ConfigError, FieldValidationError, ValidationError};
use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use validator::Validate;

type Parser = Arc<dyn Fn(Document) -> Result<Document, Vec<FieldValidationError>> + Send + Sync>;

/// A runtime type check built from a Rust type
#[derive(Clone)]
pub struct TypedSchema {
    type_name: &'static str,
    full: Parser,
    partial: Option<Parser>,
}

impl fmt::Debug for TypedSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypedSchema")
            .field("type_name", &self.type_name)
            .field("partial", &self.partial.is_some())
            .finish()
    }
}

impl TypedSchema {
    /// Check whole documents against `T`
    pub fn of<T>() -> Self
    where
        T: DeserializeOwned + Serialize + Validate + 'static,
    {
        Self {
            type_name: std::any::type_name::<T>(),
            full: parser::<T>(),
            partial: None,
        }
    }

    /// Check patches against `P`, typically a struct of optional fields
    ///
    /// Without a patch type, patches are stored as sent.
    pub fn with_partial<P>(mut self) -> Self
    where
        P: DeserializeOwned + Serialize + Validate + 'static,
    {
        self.partial = Some(parser::<P>());
        self
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    fn check(&self, document: Document, mode: ValidationMode) -> Result<Document, ValidationError> {
        let parser = match mode {
            ValidationMode::Full => &self.full,
            ValidationMode::Partial => match &self.partial {
                Some(parser) => parser,
                None => return Ok(document),
            },
        };
        parser(document).map_err(ValidationError::from_fields)
    }
}

fn parser<T>() -> Parser
where
    T: DeserializeOwned + Serialize + Validate + 'static,
{
    Arc::new(|document: Document| {
        let value: T = serde_json::from_value(Value::Object(document))
            .map_err(|e| vec![serde_failure(&e)])?;
        value.validate().map_err(|e| rule_failures(&e))?;
        match serde_json::to_value(&value) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(_) => Ok(Document::new()),
            Err(e) => Err(vec![FieldValidationError::new("$", e.to_string())]),
        }
    })
}

/// Map serde messages like ``missing field `title` `` onto the field they name
fn serde_failure(error: &serde_json::Error) -> FieldValidationError {
    let message = error.to_string();
    let field = ["missing field `", "unknown field `"]
        .iter()
        .find_map(|prefix| {
            let rest = message.strip_prefix(prefix)?;
            rest.split('`').next().map(str::to_string)
        })
        .unwrap_or_else(|| "$".to_string());
    FieldValidationError::new(field, message)
}

fn rule_failures(errors: &validator::ValidationErrors) -> Vec<FieldValidationError> {
    let mut failures: Vec<FieldValidationError> = errors
        .field_errors()
        .into_iter()
        .flat_map(|(field, errors)| {
            let field = field.to_string();
            errors.iter().map(move |e| {
                let message = match &e.message {
                    Some(message) => message.to_string(),
                    None => format!("{} failed the '{}' rule", field, e.code),
                };
                FieldValidationError::new(field.clone(), message)
            })
        })
        .collect();
    failures.sort_by(|a, b| a.field.cmp(&b.field));
    failures
}

/// The typed backend
#[derive(Debug, Clone, Copy, Default)]
pub struct TypedStrategy;

#[async_trait]
impl SchemaStrategy for TypedStrategy {
    fn name(&self) -> &'static str {
        "typed"
    }

    fn compile(&self, collection: &str, raw: RawSchema) -> Result<CompiledSchema, ConfigError> {
        match raw {
            RawSchema::Typed(schema) => Ok(CompiledSchema::Typed(schema)),
            RawSchema::Rules(_) => Err(super::unsupported_schema(
                self.name(),
                collection,
                "the typed backend needs a TypedSchema, not a JSON rule document",
            )),
        }
    }

    async fn validate(
        &self,
        schema: &CompiledSchema,
        document: Document,
        mode: ValidationMode,
    ) -> Result<Document, ValidationError> {
        match schema {
            CompiledSchema::Typed(schema) => schema.check(document, mode),
            _ => Err(ValidationError::SchemaMismatch {
                backend: self.name(),
            }),
        }
    }

    fn cast(&self, _schema: &CompiledSchema, document: Document, _mode: ValidationMode) -> Document {
        document
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Serialize, Deserialize, Validate)]
    struct Book {
        #[validate(length(min = 1, max = 20))]
        title: String,
        #[validate(range(min = 1))]
        pages: Option<u32>,
    }

    #[derive(Serialize, Deserialize, Validate)]
    struct BookPatch {
        #[serde(skip_serializing_if = "Option::is_none")]
        #[validate(length(min = 1))]
        title: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        pages: Option<u32>,
    }

    fn schema() -> CompiledSchema {
        TypedStrategy
            .compile("books", TypedSchema::of::<Book>().with_partial::<BookPatch>().into())
            .unwrap()
    }

    fn doc(value: Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_valid_document_is_normalized() {
        let validated = TypedStrategy
            .validate(
                &schema(),
                doc(json!({"title": "Dune", "extra": 1})),
                ValidationMode::Full,
            )
            .await
            .unwrap();
        assert_eq!(Value::Object(validated), json!({"title": "Dune", "pages": null}));
    }

    #[tokio::test]
    async fn test_missing_field_names_the_field() {
        let err = TypedStrategy
            .validate(&schema(), doc(json!({"pages": 3})), ValidationMode::Full)
            .await
            .unwrap_err();
        assert_eq!(err.errors()[0].field, "title");
    }

    #[tokio::test]
    async fn test_validator_rules_apply() {
        let err = TypedStrategy
            .validate(&schema(), doc(json!({"title": "", "pages": 0})), ValidationMode::Full)
            .await
            .unwrap_err();
        let fields: Vec<String> = err.errors().into_iter().map(|e| e.field).collect();
        assert_eq!(fields, vec!["pages", "title"]);
    }

    #[tokio::test]
    async fn test_partial_uses_patch_type() {
        let patch = TypedStrategy
            .validate(&schema(), doc(json!({"pages": 10})), ValidationMode::Partial)
            .await
            .unwrap();
        assert_eq!(Value::Object(patch), json!({"pages": 10}));

        let without_patch_type = TypedStrategy
            .compile("books", TypedSchema::of::<Book>().into())
            .unwrap();
        let patch = TypedStrategy
            .validate(&without_patch_type, doc(json!({"anything": 1})), ValidationMode::Partial)
            .await
            .unwrap();
        assert_eq!(patch["anything"], 1);
    }

    #[test]
    fn test_rules_are_rejected() {
        assert!(TypedStrategy.compile("books", json!({}).into()).is_err());
    }
}
