//! JSON engine: tolerant parsing (JSON, JSONC, JSON5), order-preserving
//! formatting, JSONPath queries and JSON Schema validation.

pub mod format;
pub mod parse;
pub mod path;
pub mod schema;

pub use format::{format, format_value};
pub use parse::{parse, DetectedFormat, Parsed};
pub use path::execute as execute_jsonpath;
pub use schema::{validate_against_schema, validate_wellformed, SchemaViolation};

#[derive(Debug, thiserror::Error)]
pub enum JsonError {
    #[error("JSON parse error at {line}:{column}: {message}")]
    Parse {
        line: u32,
        column: u32,
        message: String,
    },
    #[error("JSONPath error: {message}")]
    Path { message: String },
    #[error("JSON Schema error: {message}")]
    Schema { message: String },
    #[error("internal error: {detail}")]
    Internal { detail: String },
}

impl JsonError {
    pub(crate) fn from_serde(e: serde_json::Error) -> JsonError {
        JsonError::Parse {
            line: e.line() as u32,
            column: e.column() as u32,
            message: e.to_string(),
        }
    }
}
