//! JSON path resolution.
//!
//! Resolves paths like "credentials.username", "items.0.user" or
//! "items[0].user" against a captured request body.

use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value;

lazy_static! {
    /// `name[3]` segment
    static ref INDEXED_SEGMENT: Regex = Regex::new(r"^([^\[\]]+)\[(\d+)\]$").unwrap();
}

/// Resolve a path to a value in JSON.
///
/// # Examples
/// ```
/// use serde_json::json;
/// use decoyflow_core::extraction::json_path::resolve_json_path;
///
/// let body = json!({"credentials": {"username": "admin"}});
/// assert_eq!(resolve_json_path(&body, "credentials.username"), Some(&json!("admin")));
/// ```
pub fn resolve_json_path<'a>(data: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return Some(data);
    }

    let mut current = data;
    for part in path.split('.') {
        if let Some(caps) = INDEXED_SEGMENT.captures(part) {
            let index: usize = caps[2].parse().ok()?;
            current = current.get(&caps[1])?.get(index)?;
            continue;
        }
        match current {
            Value::Object(obj) => {
                current = obj.get(part)?;
            }
            Value::Array(arr) => {
                let index: usize = part.parse().ok()?;
                current = arr.get(index)?;
            }
            _ => return None,
        }
    }
    Some(current)
}

/// Render a scalar as the string an attacker typed.
///
/// Numbers and booleans are accepted since clients often send `123456` as a
/// number; objects, arrays and null are not credentials.
pub fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

/// First path in `paths` that resolves to a scalar.
pub fn first_scalar(data: &Value, paths: &[&str]) -> Option<String> {
    paths
        .iter()
        .filter_map(|path| resolve_json_path(data, path))
        .find_map(scalar_to_string)
}
