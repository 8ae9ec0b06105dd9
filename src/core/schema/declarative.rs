//! Declarative per-field rules, the default validation backend
//!
//! A schema is a JSON object mapping field names to rules. A rule is either
//! a bare type name or a rule object:
//!
//! ```json
//! {
//!   "title":  { "type": "string", "required": true, "max_length": 200 },
//!   "pages":  { "type": "integer", "min": 1 },
//!   "status": { "type": "string", "one_of": ["draft", "published"], "default": "draft" },
//!   "tags":   "array"
//! }
//! ```
//!
//! Values are checked as they will be after casting, so `"412"` satisfies an
//! `integer` rule and is stored as `412`. Fields without a rule are kept.

use super::{
    CompiledSchema, RawSchema, SchemaStrategy, ValidationMode, unsupported_schema,
};
use crate::core::document::{Document, json_kind};
use crate::core::error::{ConfigError, FieldValidationError, ValidationError};
use async_trait::async_trait;
use indexmap::IndexMap;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};
use std::collections::HashMap;
use std::sync::Arc;

/// Expected type of a field
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Number,
    Integer,
    Boolean,
    Object,
    Array,
    #[default]
    Any,
}

impl FieldType {
    fn article_name(self) -> &'static str {
        match self {
            FieldType::String => "a string",
            FieldType::Number => "a number",
            FieldType::Integer => "an integer",
            FieldType::Boolean => "a boolean",
            FieldType::Object => "an object",
            FieldType::Array => "an array",
            FieldType::Any => "any value",
        }
    }

    /// Coerce a value to this type, `None` when impossible
    fn coerce(self, value: &Value) -> Option<Value> {
        match (self, value) {
            (FieldType::Any, v) => Some(v.clone()),
            (FieldType::String, Value::String(_)) => Some(value.clone()),
            (FieldType::String, Value::Number(n)) => Some(Value::String(n.to_string())),
            (FieldType::String, Value::Bool(b)) => Some(Value::String(b.to_string())),
            (FieldType::Number, Value::Number(_)) => Some(value.clone()),
            (FieldType::Number, Value::String(s)) => parse_number(s.trim()),
            (FieldType::Integer, Value::Number(n)) => integer_of(n).map(Value::from),
            (FieldType::Integer, Value::String(s)) => s.trim().parse::<i64>().ok().map(Value::from),
            (FieldType::Boolean, Value::Bool(_)) => Some(value.clone()),
            (FieldType::Boolean, Value::String(s)) => match s.trim() {
                "true" | "1" => Some(Value::Bool(true)),
                "false" | "0" => Some(Value::Bool(false)),
                _ => None,
            },
            (FieldType::Boolean, Value::Number(n)) => match n.as_i64() {
                Some(1) => Some(Value::Bool(true)),
                Some(0) => Some(Value::Bool(false)),
                _ => None,
            },
            (FieldType::Object, Value::Object(_)) => Some(value.clone()),
            (FieldType::Array, Value::Array(_)) => Some(value.clone()),
            _ => None,
        }
    }
}

fn parse_number(s: &str) -> Option<Value> {
    if let Ok(i) = s.parse::<i64>() {
        return Some(Value::from(i));
    }
    let f = s.parse::<f64>().ok().filter(|f| f.is_finite())?;
    Number::from_f64(f).map(Value::Number)
}

fn integer_of(n: &Number) -> Option<i64> {
    n.as_i64().or_else(|| {
        n.as_f64()
            .filter(|f| f.fract() == 0.0 && f.abs() < i64::MAX as f64)
            .map(|f| f as i64)
    })
}

/// Rule for one field
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FieldRule {
    #[serde(rename = "type", default)]
    pub kind: FieldType,

    #[serde(default)]
    pub required: bool,

    #[serde(default)]
    pub nullable: bool,

    /// Filled in by `cast` when the field is missing
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,

    /// Inclusive numeric bounds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,

    /// Length bounds for strings (characters) and arrays (items)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_length: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub one_of: Option<Vec<Value>>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RuleSpec {
    Type(FieldType),
    Rule(FieldRule),
}

/// A compiled declarative schema
#[derive(Debug)]
pub struct DeclarativeSchema {
    fields: IndexMap<String, FieldRule>,
    patterns: HashMap<String, Regex>,
}

impl DeclarativeSchema {
    /// Compile a rule document
    pub fn compile(collection: &str, rules: &Value) -> Result<Self, ConfigError> {
        let object = rules.as_object().ok_or_else(|| {
            unsupported_schema(
                "declarative",
                collection,
                &format!("expected an object of field rules, got {}", json_kind(rules)),
            )
        })?;

        let mut fields = IndexMap::with_capacity(object.len());
        let mut patterns = HashMap::new();

        for (name, spec) in object {
            let rule = match serde_json::from_value::<RuleSpec>(spec.clone()) {
                Ok(RuleSpec::Type(kind)) => FieldRule {
                    kind,
                    ..Default::default()
                },
                Ok(RuleSpec::Rule(rule)) => rule,
                Err(e) => {
                    return Err(ConfigError::InvalidValue {
                        field: format!("collections.{}.{}", collection, name),
                        value: spec.to_string(),
                        message: e.to_string(),
                    });
                }
            };

            if let Some(pattern) = &rule.pattern {
                let re = Regex::new(pattern).map_err(|e| ConfigError::InvalidValue {
                    field: format!("collections.{}.{}.pattern", collection, name),
                    value: pattern.clone(),
                    message: e.to_string(),
                })?;
                patterns.insert(name.clone(), re);
            }

            fields.insert(name.clone(), rule);
        }

        Ok(Self { fields, patterns })
    }

    /// Rules by field name
    pub fn fields(&self) -> &IndexMap<String, FieldRule> {
        &self.fields
    }

    fn check(&self, document: &Document, mode: ValidationMode) -> Vec<FieldValidationError> {
        let mut errors = Vec::new();

        for (name, rule) in &self.fields {
            match document.get(name) {
                None => {
                    if mode == ValidationMode::Full && rule.required && rule.default.is_none() {
                        errors.push(FieldValidationError::new(name, format!("{} is required", name)));
                    }
                }
                Some(Value::Null) => {
                    if !rule.nullable {
                        let message = if rule.required {
                            format!("{} is required", name)
                        } else {
                            format!("{} cannot be null", name)
                        };
                        errors.push(FieldValidationError::new(name, message));
                    }
                }
                Some(value) => match rule.kind.coerce(value) {
                    Some(coerced) => self.check_constraints(name, rule, &coerced, &mut errors),
                    None => errors.push(FieldValidationError::new(
                        name,
                        format!(
                            "{} must be {}, got {}",
                            name,
                            rule.kind.article_name(),
                            json_kind(value)
                        ),
                    )),
                },
            }
        }

        errors
    }

    fn check_constraints(
        &self,
        name: &str,
        rule: &FieldRule,
        value: &Value,
        errors: &mut Vec<FieldValidationError>,
    ) {
        if let Some(n) = value.as_f64() {
            if let Some(min) = rule.min.filter(|min| n < *min) {
                errors.push(FieldValidationError::new(name, format!("{} must be at least {}", name, min)));
            }
            if let Some(max) = rule.max.filter(|max| n > *max) {
                errors.push(FieldValidationError::new(name, format!("{} must be at most {}", name, max)));
            }
        }

        let length = match value {
            Value::String(s) => Some(s.chars().count()),
            Value::Array(items) => Some(items.len()),
            _ => None,
        };
        if let Some(len) = length {
            if let Some(min) = rule.min_length.filter(|min| len < *min) {
                errors.push(FieldValidationError::new(
                    name,
                    format!("{} must have a length of at least {}", name, min),
                ));
            }
            if let Some(max) = rule.max_length.filter(|max| len > *max) {
                errors.push(FieldValidationError::new(
                    name,
                    format!("{} must have a length of at most {}", name, max),
                ));
            }
        }

        if let (Some(re), Some(s)) = (self.patterns.get(name), value.as_str()) {
            if !re.is_match(s) {
                errors.push(FieldValidationError::new(
                    name,
                    format!("{} does not match the required pattern", name),
                ));
            }
        }

        if let Some(allowed) = &rule.one_of {
            if !allowed.contains(value) {
                errors.push(FieldValidationError::new(
                    name,
                    format!("{} must be one of: {}", name, Value::Array(allowed.clone())),
                ));
            }
        }
    }

    fn apply(&self, mut document: Document, mode: ValidationMode) -> Document {
        for (name, rule) in &self.fields {
            match document.get_mut(name) {
                Some(value) if !value.is_null() => {
                    if let Some(coerced) = rule.kind.coerce(value) {
                        *value = coerced;
                    }
                }
                Some(_) => {}
                None => {
                    if let (ValidationMode::Full, Some(default)) = (mode, &rule.default) {
                        document.insert(name.clone(), default.clone());
                    }
                }
            }
        }
        document
    }
}

/// The declarative backend
#[derive(Debug, Clone, Copy, Default)]
pub struct DeclarativeStrategy;

#[async_trait]
impl SchemaStrategy for DeclarativeStrategy {
    fn name(&self) -> &'static str {
        "declarative"
    }

    fn compile(&self, collection: &str, raw: RawSchema) -> Result<CompiledSchema, ConfigError> {
        match raw {
            RawSchema::Rules(rules) => Ok(CompiledSchema::Declarative(Arc::new(
                DeclarativeSchema::compile(collection, &rules)?,
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
        let CompiledSchema::Declarative(schema) = schema else {
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
        match schema {
            CompiledSchema::Declarative(schema) => schema.apply(document, mode),
            _ => document,
        }
    }
}
