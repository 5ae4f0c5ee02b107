//! JSON Schema validation, drafts 4 through 2020-12.
//!
//! Draft selection follows the schema's `$schema` declaration; findings
//! are collected into a list with the failing instance path, mirroring
//! how the XML validators report.

use crate::parse::parse;
use crate::JsonError;

/// One schema violation.
#[derive(PartialEq, Eq, Clone, Debug)]
pub struct SchemaViolation {
    /// JSON Pointer into the instance.
    pub instance_path: String,
    pub message: String,
}

impl std::fmt::Display for SchemaViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.instance_path.is_empty() {
            write!(f, "{}", self.message)
        } else {
            write!(f, "{}: {}", self.instance_path, self.message)
        }
    }
}

/// Check that `text` parses as strict JSON; returns at most one finding.
pub fn validate_wellformed(text: &str) -> Vec<SchemaViolation> {
    match serde_json::from_str::<serde_json::Value>(text) {
        Ok(_) => Vec::new(),
        Err(e) => vec![SchemaViolation {
            instance_path: String::new(),
            message: format!("line {} column {}: {}", e.line(), e.column(), e),
        }],
    }
}

/// Validate `text` against `schema_text`. The instance may be any
/// tolerated dialect; the schema must be strict JSON. Schema compile
/// problems are errors; instance violations are collected.
pub fn validate_against_schema(
    text: &str,
    schema_text: &str,
) -> Result<Vec<SchemaViolation>, JsonError> {
    let schema: serde_json::Value =
        serde_json::from_str(schema_text).map_err(|e| JsonError::Schema {
            message: format!("schema is not valid JSON: {e}"),
        })?;
    let instance = parse(text)?.value;
    let compiled = jsonschema::JSONSchema::compile(&schema).map_err(|e| JsonError::Schema {
        message: format!("schema compilation failed: {e}"),
    })?;
    let mut violations = Vec::new();
    if let Err(errors) = compiled.validate(&instance) {
        for error in errors {
            violations.push(SchemaViolation {
                instance_path: error.instance_path.to_string(),
                message: error.to_string(),
            });
        }
    }
    Ok(violations)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCHEMA: &str = r#"{
        "$schema": "http://json-schema.org/draft-07/schema#",
        "type": "object",
        "required": ["name", "age"],
        "properties": {
            "name": {"type": "string", "minLength": 1},
            "age": {"type": "integer", "minimum": 0}
        }
    }"#;

    #[test]
    fn valid_instance_has_no_violations() {
        let violations =
            validate_against_schema(r#"{"name": "Ada", "age": 36}"#, SCHEMA).unwrap();
        assert!(violations.is_empty());
    }

    #[test]
    fn violations_carry_instance_paths() {
        let violations =
            validate_against_schema(r#"{"name": "", "age": -1}"#, SCHEMA).unwrap();
        assert_eq!(violations.len(), 2);
        let paths: Vec<&str> = violations.iter().map(|v| v.instance_path.as_str()).collect();
        assert!(paths.contains(&"/name"));
        assert!(paths.contains(&"/age"));
    }

    #[test]
    fn missing_required_member_is_reported() {
        let violations = validate_against_schema(r#"{"name": "Ada"}"#, SCHEMA).unwrap();
        assert_eq!(violations.len(), 1);
        assert!(violations[0].message.contains("age"));
    }

    #[test]
    fn jsonc_instances_are_tolerated() {
        let violations =
            validate_against_schema("{\"name\": \"Ada\", /* ok */ \"age\": 36}", SCHEMA).unwrap();
        assert!(violations.is_empty());
    }

    #[test]
    fn broken_schema_is_an_error() {
        assert!(validate_against_schema("{}", "{not json").is_err());
    }

    #[test]
    fn wellformed_check_is_strict_json() {
        assert!(validate_wellformed(r#"{"a": 1}"#).is_empty());
        assert_eq!(validate_wellformed("{a: 1}").len(), 1);
    }
}
