//! JSON Schema validation for model output.
//!
//! Adapters ask the model for JSON. Before any of it is mapped into
//! typed values it must validate against one of the embedded schemas
//! below; anything else is treated as a malformed response.

use std::sync::OnceLock;

use serde_json::Value as JsonValue;
use thiserror::Error;

const FIELD_SUGGESTIONS_SCHEMA_JSON: &str = r#"{
  "$schema": "http://json-schema.org/draft-07/schema#",
  "type": "array",
  "items": {
    "type": "object",
    "required": ["fieldId", "importance", "message"],
    "properties": {
      "fieldId": { "type": "string", "minLength": 1 },
      "importance": { "enum": ["info", "warning", "error"] },
      "message": { "type": "string", "minLength": 1 }
    }
  }
}"#;

const LEGAL_TERMS_SCHEMA_JSON: &str = r#"{
  "$schema": "http://json-schema.org/draft-07/schema#",
  "type": "array",
  "items": {
    "type": "object",
    "required": ["term", "explanation"],
    "properties": {
      "term": { "type": "string", "minLength": 1 },
      "explanation": { "type": "string" }
    }
  }
}"#;

static FIELD_SUGGESTIONS: OnceLock<Result<jsonschema::Validator, String>> = OnceLock::new();
static LEGAL_TERMS: OnceLock<Result<jsonschema::Validator, String>> = OnceLock::new();

/// Errors from schema validation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    #[error("Failed to load schema: {0}")]
    LoadError(String),

    #[error("Output does not match schema: {}", .0.join("; "))]
    Invalid(Vec<String>),
}

/// Which embedded schema to validate against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputSchema {
    FieldSuggestions,
    LegalTerms,
}

impl OutputSchema {
    fn source(&self) -> &'static str {
        match self {
            OutputSchema::FieldSuggestions => FIELD_SUGGESTIONS_SCHEMA_JSON,
            OutputSchema::LegalTerms => LEGAL_TERMS_SCHEMA_JSON,
        }
    }

    fn cell(&self) -> &'static OnceLock<Result<jsonschema::Validator, String>> {
        match self {
            OutputSchema::FieldSuggestions => &FIELD_SUGGESTIONS,
            OutputSchema::LegalTerms => &LEGAL_TERMS,
        }
    }

    fn validator(&self) -> Result<&'static jsonschema::Validator, SchemaError> {
        let compiled = self.cell().get_or_init(|| {
            let schema_value: JsonValue = serde_json::from_str(self.source())
                .map_err(|e| format!("Invalid schema JSON: {}", e))?;
            jsonschema::options()
                .build(&schema_value)
                .map_err(|e| format!("Failed to compile schema: {}", e))
        });

        compiled
            .as_ref()
            .map_err(|e| SchemaError::LoadError(e.clone()))
    }
}

/// Validate a value against an embedded schema, collecting every error.
pub fn validate_output(schema: OutputSchema, value: &JsonValue) -> Result<(), SchemaError> {
    let validator = schema.validator()?;

    let errors: Vec<String> = validator
        .iter_errors(value)
        .map(|e| format!("{} at {}", e, e.instance_path))
        .collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(SchemaError::Invalid(errors))
    }
}
