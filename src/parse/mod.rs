//! Guarded deserialization of JSON-shaped text.
//!
//! Structured text from the model (or the user) goes through
//! [`safe_json_parse`]: size is checked before parsing, nesting depth
//! after, and dangerous object keys are stripped recursively so a
//! parsed structure can never smuggle prototype-style pollution into
//! whatever it is merged with downstream.

use serde_json::Value;

use crate::config::{DEFAULT_MAX_JSON_BYTES, DEFAULT_MAX_JSON_DEPTH};
use crate::error::{ParseGuardError, ParseGuardErrorKind};
use crate::patterns;

/// Options for a guarded parse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseOptions {
    /// Maximum input size in bytes, checked before parsing.
    pub max_size: usize,
    /// Maximum nesting depth of the parsed value.
    pub max_depth: usize,
    /// Keep dangerous keys instead of stripping them.
    pub allow_dangerous_keys: bool,
    /// Raise `SECURITY_VIOLATION` on the first dangerous key instead of
    /// stripping. Ignored when `allow_dangerous_keys` is set.
    pub reject_dangerous_keys: bool,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            max_size: DEFAULT_MAX_JSON_BYTES,
            max_depth: DEFAULT_MAX_JSON_DEPTH,
            allow_dangerous_keys: false,
            reject_dangerous_keys: false,
        }
    }
}

/// Parse JSON-shaped text under size, depth, and key guards.
///
/// # Errors
///
/// Returns [`ParseGuardError`] with the matching closed-set kind:
/// `EMPTY_INPUT`, `TOO_LARGE` (before any parsing), `SYNTAX_ERROR`
/// (with the underlying parser message), `TOO_DEEP`, or
/// `SECURITY_VIOLATION` when `reject_dangerous_keys` is set and a
/// dangerous key is present.
pub fn safe_json_parse(text: &str, options: &ParseOptions) -> Result<Value, ParseGuardError> {
    if text.trim().is_empty() {
        return Err(reject(
            ParseGuardError::new(ParseGuardErrorKind::EmptyInput, "input is blank"),
            0,
        ));
    }

    if text.len() > options.max_size {
        return Err(reject(
            ParseGuardError::new(
                ParseGuardErrorKind::TooLarge,
                format!("{} bytes exceeds limit of {}", text.len(), options.max_size),
            ),
            text.len(),
        ));
    }

    let mut value: Value = serde_json::from_str(text.trim()).map_err(|e| {
        reject(
            ParseGuardError::new(ParseGuardErrorKind::SyntaxError, e.to_string()),
            text.len(),
        )
    })?;

    let depth = value_depth(&value);
    if depth > options.max_depth {
        return Err(reject(
            ParseGuardError::new(
                ParseGuardErrorKind::TooDeep,
                format!("depth {depth} exceeds limit of {}", options.max_depth),
            ),
            text.len(),
        ));
    }

    if !options.allow_dangerous_keys {
        if options.reject_dangerous_keys {
            if let Some(key) = find_dangerous_key(&value) {
                return Err(reject(
                    ParseGuardError::new(
                        ParseGuardErrorKind::SecurityViolation,
                        format!("dangerous key '{key}' present"),
                    ),
                    text.len(),
                ));
            }
        } else {
            strip_dangerous_keys(&mut value);
        }
    }

    Ok(value)
}

/// Parse JSON-shaped text, returning `fallback` instead of propagating
/// any guard error.
#[must_use]
pub fn safe_json_parse_with_fallback(text: &str, fallback: Value, options: &ParseOptions) -> Value {
    match safe_json_parse(text, options) {
        Ok(value) => value,
        Err(error) => {
            tracing::warn!(
                kind = error.kind.as_str(),
                input_bytes = text.len(),
                "guarded parse failed, returning fallback"
            );
            fallback
        }
    }
}

fn reject(error: ParseGuardError, input_bytes: usize) -> ParseGuardError {
    tracing::warn!(
        kind = error.kind.as_str(),
        input_bytes,
        "structured text rejected"
    );
    error
}

/// Maximum nesting depth: scalars count 0, each containing object or
/// array adds 1.
fn value_depth(value: &Value) -> usize {
    match value {
        Value::Object(map) => 1 + map.values().map(value_depth).max().unwrap_or(0),
        Value::Array(items) => 1 + items.iter().map(value_depth).max().unwrap_or(0),
        Value::Null | Value::Bool(_) | Value::Number(_) | Value::String(_) => 0,
    }
}

fn strip_dangerous_keys(value: &mut Value) {
    match value {
        Value::Object(map) => {
            let dangerous: Vec<String> = map
                .keys()
                .filter(|key| patterns::is_dangerous_key(key))
                .cloned()
                .collect();
            for key in dangerous {
                map.remove(&key);
                tracing::warn!(key = %key, "removed dangerous key from parsed object");
            }
            for child in map.values_mut() {
                strip_dangerous_keys(child);
            }
        }
        Value::Array(items) => {
            for item in items {
                strip_dangerous_keys(item);
            }
        }
        Value::Null | Value::Bool(_) | Value::Number(_) | Value::String(_) => {}
    }
}

fn find_dangerous_key(value: &Value) -> Option<&str> {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                if patterns::is_dangerous_key(key) {
                    return Some(key);
                }
                if let Some(found) = find_dangerous_key(child) {
                    return Some(found);
                }
            }
            None
        }
        Value::Array(items) => items.iter().find_map(find_dangerous_key),
        Value::Null | Value::Bool(_) | Value::Number(_) | Value::String(_) => None,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use serde_json::json;

    fn parse(text: &str) -> Result<Value, ParseGuardError> {
        safe_json_parse(text, &ParseOptions::default())
    }

    #[test]
    fn test_basic_object() {
        let value = parse(r#"{"a":1}"#).unwrap();
        assert_eq!(value["a"], json!(1));
    }

    #[test]
    fn test_empty_input_rejected() {
        assert_eq!(
            parse("   ").unwrap_err().kind,
            ParseGuardErrorKind::EmptyInput
        );
    }

    #[test]
    fn test_two_mib_input_rejected() {
        let text = format!("\"{}\"", "x".repeat(2 * 1024 * 1024));
        assert_eq!(parse(&text).unwrap_err().kind, ParseGuardErrorKind::TooLarge);
    }

    #[test]
    fn test_size_checked_before_parsing() {
        // Oversized and syntactically broken: the size guard must win
        let text = "{".repeat(2 * 1024 * 1024);
        assert_eq!(parse(&text).unwrap_err().kind, ParseGuardErrorKind::TooLarge);
    }

    #[test]
    fn test_syntax_error_carries_parser_message() {
        let err = parse("{broken").unwrap_err();
        assert_eq!(err.kind, ParseGuardErrorKind::SyntaxError);
        assert!(!err.message.is_empty());
    }

    #[test]
    fn test_default_depth_limit() {
        let nested = format!("{}1{}", "[".repeat(120), "]".repeat(120));
        assert_eq!(
            parse(&nested).unwrap_err().kind,
            ParseGuardErrorKind::TooDeep
        );

        let shallow = format!("{}1{}", "[".repeat(100), "]".repeat(100));
        assert!(parse(&shallow).is_ok());
    }

    #[test]
    fn test_custom_depth_limit() {
        let options = ParseOptions {
            max_depth: 3,
            ..ParseOptions::default()
        };
        assert!(safe_json_parse("[[[1]]]", &options).is_ok());
        assert_eq!(
            safe_json_parse("[[[[1]]]]", &options).unwrap_err().kind,
            ParseGuardErrorKind::TooDeep
        );
    }

    #[test]
    fn test_value_depth() {
        assert_eq!(value_depth(&json!(1)), 0);
        assert_eq!(value_depth(&json!({"a": 1})), 1);
        assert_eq!(value_depth(&json!({"a": {"b": 1}})), 2);
        assert_eq!(value_depth(&json!([{"a": [1]}])), 3);
        assert_eq!(value_depth(&json!({})), 1);
    }

    #[test]
    fn test_proto_key_stripped() {
        let value = parse(r#"{"__proto__":{"x":1},"safe":2}"#).unwrap();
        let map = value.as_object().unwrap();
        assert!(!map.contains_key("__proto__"));
        assert_eq!(map["safe"], json!(2));
    }

    #[test]
    fn test_nested_dangerous_keys_stripped() {
        let value = parse(r#"{"outer":{"constructor":1,"keep":2},"list":[{"prototype":3}]}"#)
            .unwrap();
        assert!(value["outer"].get("constructor").is_none());
        assert_eq!(value["outer"]["keep"], json!(2));
        assert!(value["list"][0].get("prototype").is_none());
    }

    #[test]
    fn test_accessor_keys_stripped() {
        let value = parse(r#"{"__defineGetter__":1,"__lookupSetter__":2,"name":"ok"}"#).unwrap();
        let map = value.as_object().unwrap();
        assert_eq!(map.len(), 1);
        assert_eq!(map["name"], json!("ok"));
    }

    #[test]
    fn test_allow_dangerous_keys() {
        let options = ParseOptions {
            allow_dangerous_keys: true,
            ..ParseOptions::default()
        };
        let value = safe_json_parse(r#"{"__proto__":{"x":1}}"#, &options).unwrap();
        assert_eq!(value["__proto__"]["x"], json!(1));
    }

    #[test]
    fn test_reject_dangerous_keys() {
        let options = ParseOptions {
            reject_dangerous_keys: true,
            ..ParseOptions::default()
        };
        let err = safe_json_parse(r#"{"nested":{"__proto__":1}}"#, &options).unwrap_err();
        assert_eq!(err.kind, ParseGuardErrorKind::SecurityViolation);
        assert!(err.message.contains("__proto__"));
    }

    #[test]
    fn test_allow_wins_over_reject() {
        let options = ParseOptions {
            allow_dangerous_keys: true,
            reject_dangerous_keys: true,
            ..ParseOptions::default()
        };
        assert!(safe_json_parse(r#"{"__proto__":1}"#, &options).is_ok());
    }

    #[test]
    fn test_fallback_on_success_returns_parsed() {
        let value = safe_json_parse_with_fallback(
            r#"{"a":1}"#,
            json!({"fallback": true}),
            &ParseOptions::default(),
        );
        assert_eq!(value["a"], json!(1));
    }

    #[test]
    fn test_fallback_on_failure_returns_fallback() {
        for bad in ["", "{broken", "not json at all {{{"] {
            let value = safe_json_parse_with_fallback(
                bad,
                json!({"fallback": true}),
                &ParseOptions::default(),
            );
            assert_eq!(value, json!({"fallback": true}));
        }
    }

    #[test]
    fn test_scalar_and_array_roots() {
        assert_eq!(parse("42").unwrap(), json!(42));
        assert_eq!(parse("[1,2,3]").unwrap(), json!([1, 2, 3]));
        assert_eq!(parse("\"text\"").unwrap(), json!("text"));
    }

    proptest! {
        #[test]
        fn prop_parse_never_panics(text in ".{0,300}") {
            let _ = parse(&text);
        }

        #[test]
        fn prop_parsed_objects_never_expose_dangerous_keys(
            payload in "[a-z]{1,10}"
        ) {
            let text = format!(
                r#"{{"__proto__":{{"x":1}},"constructor":2,"{payload}":3}}"#
            );
            if let Ok(value) = parse(&text) {
                let map = value.as_object().unwrap();
                prop_assert!(!map.contains_key("__proto__"));
                prop_assert!(!map.contains_key("constructor"));
            }
        }
    }
}
