//! JSON Schema for rule files.
//!
//! Rule YAML is converted to a JSON value and checked against this schema
//! before typed deserialisation and before any merge.

use jsonschema::{Draft, JSONSchema};
use serde_json::{json, Value};

use crate::domain::{EvalError, Result};

fn rule_file_schema() -> Value {
    json!({
        "$schema": "http://json-schema.org/draft-07/schema#",
        "title": "persona proposition file",
        "type": "object",
        "required": ["dimension", "propositions"],
        "additionalProperties": false,
        "properties": {
            "dimension": {
                "enum": ["adherence", "consistency", "fluency", "convergence", "ideas_quantity"]
            },
            "target_type": { "enum": ["agent", "environment"] },
            "include_personas": { "type": "boolean" },
            "hard": { "type": "boolean" },
            "first_n": { "type": ["integer", "null"], "minimum": 0 },
            "last_n": { "type": ["integer", "null"], "minimum": 0 },
            "propositions": {
                "type": "array",
                "items": {
                    "type": "object",
                    "required": ["id", "claim"],
                    "additionalProperties": false,
                    "properties": {
                        "id": { "type": "string", "minLength": 1 },
                        "claim": { "type": "string", "minLength": 1 },
                        "weight": { "type": "number", "minimum": 0 },
                        "inverted": { "type": "boolean" },
                        "recommendations_for_improvement": { "type": "string" }
                    }
                }
            }
        }
    })
}

/// Validate a parsed rule document, collecting every violation.
pub fn validate_rule_document(origin: &str, document: &Value) -> Result<()> {
    let schema = rule_file_schema();
    let compiled = JSONSchema::options()
        .with_draft(Draft::Draft7)
        .compile(&schema)
        .map_err(|e| EvalError::validation(origin, format!("rule schema did not compile: {e}")))?;

    if let Err(errors) = compiled.validate(document) {
        let msgs: Vec<String> = errors
            .map(|e| {
                let path = e.instance_path.to_string();
                if path.is_empty() {
                    e.to_string()
                } else {
                    format!("{path}: {e}")
                }
            })
            .collect();
        return Err(EvalError::validation(origin, msgs.join("; ")));
    }
    Ok(())
}
