//! Canonical JSON serialization.
//!
//! Produces compact JSON with object keys sorted lexicographically at every
//! nesting level, so that structurally equal snapshot contents always hash
//! to the same snapshot id regardless of key insertion order.
//!
//! Rules:
//! - Compact: no whitespace between tokens.
//! - Object keys sorted lexicographically (recursive at every depth).
//! - Arrays preserve element order.
//! - Numbers, strings, booleans, and null serialized normally.

use serde_json::Value;

/// Produce a canonical JSON string from a [`serde_json::Value`].
///
/// # Examples
///
/// ```
/// use serde_json::json;
/// use lix_core::snapshot::canonical::canonicalize_json;
///
/// let val = json!({"z": 1, "a": {"c": 3, "b": 2}});
/// assert_eq!(canonicalize_json(&val), r#"{"a":{"b":2,"c":3},"z":1}"#);
/// ```
#[must_use]
pub fn canonicalize_json(value: &Value) -> String {
    let mut buf = String::new();
    write_canonical(value, &mut buf);
    buf
}

fn write_string(s: &str, buf: &mut String) {
    // Value's Display impl applies serde_json's string escaping.
    buf.push_str(&Value::String(s.to_owned()).to_string());
}

fn write_canonical(value: &Value, buf: &mut String) {
    match value {
        Value::Null => buf.push_str("null"),
        Value::Bool(b) => buf.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => buf.push_str(&n.to_string()),
        Value::String(s) => write_string(s, buf),
        Value::Array(arr) => {
            buf.push('[');
            for (i, item) in arr.iter().enumerate() {
                if i > 0 {
                    buf.push(',');
                }
                write_canonical(item, buf);
            }
            buf.push(']');
        }
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));

            buf.push('{');
            for (i, (key, val)) in entries.into_iter().enumerate() {
                if i > 0 {
                    buf.push(',');
                }
                write_string(key, buf);
                buf.push(':');
                write_canonical(val, buf);
            }
            buf.push('}');
        }
    }
}
