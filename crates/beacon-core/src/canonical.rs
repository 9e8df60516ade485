//! Canonical JSON serialization, hashing, and commitment helpers.
//!
//! Canonical form is JSON with lexicographically sorted keys and the
//! minimal `(",", ":")` separators. It is the only representation ever
//! signed or hashed, so that two logically-equal documents always
//! produce the same bytes regardless of field insertion order.

use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::error::{BeaconError, Result};

/// Reorder all object keys in a JSON value, recursively, so that
/// serializing it afterward is stable across equivalent inputs.
fn sort_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> =
                map.into_iter().map(|(k, v)| (k, sort_keys(v))).collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            let mut sorted = serde_json::Map::new();
            for (k, v) in entries {
                sorted.insert(k, v);
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.into_iter().map(sort_keys).collect()),
        other => other,
    }
}

/// Serialize a value to canonical JSON bytes (sorted keys, no whitespace).
pub fn to_canonical_bytes<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let v = serde_json::to_value(value)?;
    let sorted = sort_keys(v);
    serde_json::to_vec(&sorted).map_err(BeaconError::Serialization)
}

/// Serialize a value to a canonical JSON string.
pub fn to_canonical_string<T: Serialize>(value: &T) -> Result<String> {
    let bytes = to_canonical_bytes(value)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Canonicalize a raw `serde_json::Value` (used when signing a struct
/// minus one field, e.g. an envelope with `sig` removed).
pub fn canonical_value_bytes(value: Value) -> Vec<u8> {
    let sorted = sort_keys(value);
    // Canonical separators: serde_json's default compact writer already
    // uses "," and ":" with no extra whitespace.
    serde_json::to_vec(&sorted).expect("canonicalized value must serialize")
}

/// SHA-256 of raw bytes, hex-encoded.
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// SHA-256 of raw bytes.
pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// `commitment_hash`: canonicalize-then-hash for any serializable value.
/// Two values that map the same keys to the same values always produce
/// the same hash, independent of field order.
pub fn commitment_hash<T: Serialize>(value: &T) -> Result<String> {
    let bytes = to_canonical_bytes(value)?;
    Ok(sha256_hex(&bytes))
}

/// `commitment_hash` over a UTF-8 string payload (the `anchor` string path).
pub fn commitment_hash_str(data: &str) -> String {
    sha256_hex(data.as_bytes())
}

/// `commitment_hash` over raw bytes.
pub fn commitment_hash_bytes(data: &[u8]) -> String {
    sha256_hex(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn canonicalization_is_key_order_invariant() {
        let a = json!({"b": 1, "a": 2});
        let b = json!({"a": 2, "b": 1});
        assert_eq!(commitment_hash(&a).unwrap(), commitment_hash(&b).unwrap());
    }

    #[test]
    fn nested_objects_and_arrays_are_sorted() {
        let a = json!({"z": [{"y": 1, "x": 2}], "a": 1});
        let b = json!({"a": 1, "z": [{"x": 2, "y": 1}]});
        assert_eq!(
            to_canonical_string(&a).unwrap(),
            to_canonical_string(&b).unwrap()
        );
    }

    #[test]
    fn different_values_hash_differently() {
        let a = json!({"a": 1});
        let b = json!({"a": 2});
        assert_ne!(commitment_hash(&a).unwrap(), commitment_hash(&b).unwrap());
    }
}
