//! Canonical JSON form and content hashing.
//!
//! Object keys are sorted recursively; array element order is never touched.
//! The hash of a definition is `sha256:` followed by the lowercase hex
//! SHA-256 digest of its canonical compact serialization, so two definitions
//! that differ only in key order or source whitespace hash identically.

use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

/// Prefix carried by every workflow hash.
pub const HASH_PREFIX: &str = "sha256:";

/// Rebuild `value` with every object's keys in ascending order.
///
/// Arrays are mapped element-wise and keep their order.
pub fn sort_keys_deep(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(sort_map_deep(map)),
        Value::Array(items) => Value::Array(items.iter().map(sort_keys_deep).collect()),
        other => other.clone(),
    }
}

/// Key-sorted deep copy of a JSON object.
pub fn sort_map_deep(map: &Map<String, Value>) -> Map<String, Value> {
    let mut keys: Vec<&String> = map.keys().collect();
    keys.sort();
    let mut sorted = Map::new();
    for key in keys {
        sorted.insert(key.clone(), sort_keys_deep(&map[key]));
    }
    sorted
}

/// Compact serialization of `value` after deep key sorting.
pub fn canonical_json(value: &Value) -> Result<String, serde_json::Error> {
    serde_json::to_string(&sort_keys_deep(value))
}

/// Lowercase hex SHA-256 of `content`.
pub fn sha256_hex(content: &str) -> String {
    let digest = Sha256::digest(content.as_bytes());
    format!("{:x}", digest)
}

/// `sha256:<hex>` over the canonical serialization of `value`.
pub fn content_hash(value: &Value) -> Result<String, serde_json::Error> {
    let canonical = canonical_json(value)?;
    Ok(format!("{HASH_PREFIX}{}", sha256_hex(&canonical)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn sorts_nested_object_keys() {
        let value = json!({ "b": { "z": 1, "a": 2 }, "a": [ { "y": 1, "x": 2 } ] });
        let canonical = canonical_json(&value).unwrap();
        assert_eq!(canonical, r#"{"a":[{"x":2,"y":1}],"b":{"a":2,"z":1}}"#);
    }

    #[test]
    fn preserves_array_order() {
        let value = json!({ "steps": ["c", "a", "b"] });
        assert_eq!(canonical_json(&value).unwrap(), r#"{"steps":["c","a","b"]}"#);
    }

    #[test]
    fn hash_ignores_key_order_and_whitespace() {
        let a: Value =
            serde_json::from_str(r#"{ "x": 1,   "y": { "q": true, "p": null } }"#).unwrap();
        let b: Value = serde_json::from_str(r#"{"y":{"p":null,"q":true},"x":1}"#).unwrap();
        assert_eq!(content_hash(&a).unwrap(), content_hash(&b).unwrap());
    }

    #[test]
    fn hash_is_prefixed_lowercase_hex() {
        let hash = content_hash(&json!({})).unwrap();
        let hex = hash.strip_prefix(HASH_PREFIX).expect("prefix");
        assert_eq!(hex.len(), 64);
        assert!(hex.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn sha256_known_value() {
        assert_eq!(
            sha256_hex(""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }
}
