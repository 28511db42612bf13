// src/core/hashing.rs

use serde_json::{Map, Value};

/// Number of hex characters shown when a hash is printed for humans.
const DISPLAY_HASH_LENGTH: usize = 12;

/// Hashes a byte slice with blake3 and returns the full hex digest.
pub fn hash_bytes(content: &[u8]) -> String {
    hex::encode(blake3::hash(content).as_bytes())
}

/// Rebuilds a JSON value with every object's keys in sorted order.
///
/// Resolution output is hashed through this form so that two configurations
/// with the same content always produce the same hash, no matter the key
/// order of the documents they were parsed from.
pub fn canonical_form(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut sorted = Map::new();
            for key in keys {
                if let Some(inner) = map.get(key) {
                    sorted.insert(key.clone(), canonical_form(inner));
                }
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonical_form).collect()),
        other => other.clone(),
    }
}

/// Hashes the canonical serialization of a JSON value.
pub fn hash_value(value: &Value) -> String {
    // Serializing a `Value` cannot fail: every key is a string.
    let bytes = serde_json::to_vec(&canonical_form(value)).unwrap_or_default();
    hash_bytes(&bytes)
}

/// Shortens a hash for display.
pub fn short(hash: &str) -> &str {
    hash.get(..DISPLAY_HASH_LENGTH).unwrap_or(hash)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_hash_bytes_is_full_blake3_hex() {
        let hash = hash_bytes(b"hello world");
        // blake3("hello world")
        assert!(hash.starts_with("d74981efa70a0c880b8d8c1985d075db"));
        assert_eq!(hash.len(), 64);
    }

    #[test]
    fn test_hash_value_ignores_key_order() {
        let a: Value = serde_json::from_str(r#"{"b": 1, "a": {"y": 2, "x": [3, 4]}}"#).unwrap();
        let b: Value = serde_json::from_str(r#"{"a": {"x": [3, 4], "y": 2}, "b": 1}"#).unwrap();
        assert_eq!(hash_value(&a), hash_value(&b));
    }

    #[test]
    fn test_hash_value_sees_list_order() {
        assert_ne!(hash_value(&json!([1, 2])), hash_value(&json!([2, 1])));
    }

    #[test]
    fn test_short_handles_short_input() {
        assert_eq!(short("abc"), "abc");
        assert_eq!(short("0123456789abcdef"), "0123456789ab");
    }
}
