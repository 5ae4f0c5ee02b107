//! Formatting and minification.
//!
//! Output is always strict JSON regardless of the input dialect; key
//! order is preserved end to end.

use crate::parse::parse;
use crate::JsonError;
use serde::Serialize;
use serde_json::ser::PrettyFormatter;
use serde_json::Value;

/// Re-serialize `text` with `indent` spaces per level; `indent == 0`
/// produces a minified single line.
pub fn format(text: &str, indent: usize) -> Result<String, JsonError> {
    let parsed = parse(text)?;
    format_value(&parsed.value, indent)
}

pub fn format_value(value: &Value, indent: usize) -> Result<String, JsonError> {
    if indent == 0 {
        return serde_json::to_string(value).map_err(JsonError::from_serde);
    }
    let indent_bytes = vec![b' '; indent];
    let formatter = PrettyFormatter::with_indent(&indent_bytes);
    let mut out = Vec::new();
    let mut serializer = serde_json::Serializer::with_formatter(&mut out, formatter);
    value
        .serialize(&mut serializer)
        .map_err(JsonError::from_serde)?;
    String::from_utf8(out).map_err(|_| JsonError::Internal {
        detail: "formatter produced invalid UTF-8".to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIFIED: &str = r#"{"a":1,"b":[2,3]}"#;

    #[test]
    fn round_trip_preserves_key_order_and_content() {
        let pretty = format(MINIFIED, 2).unwrap();
        assert!(pretty.contains("\n"));
        let back = format(&pretty, 0).unwrap();
        assert_eq!(back, MINIFIED);
    }

    #[test]
    fn formatting_is_idempotent() {
        let once = format(MINIFIED, 2).unwrap();
        let twice = format(&once, 2).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn jsonc_input_formats_to_plain_json() {
        let formatted = format("{\"a\": 1, // note\n \"b\": 2,}", 0).unwrap();
        assert_eq!(formatted, r#"{"a":1,"b":2}"#);
    }

    #[test]
    fn indent_width_is_respected(){
        let four = format(MINIFIED, 4).unwrap();
        assert!(four.contains("\n    \"a\""), "got {four:?}");
    }
}
