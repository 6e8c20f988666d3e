//! Canonical job-parameter hashing
//!
//! Identical parameter sets must hash identically regardless of key order or
//! formatting, so the dedup cache canonicalizes before hashing: objects are
//! re-serialized with keys sorted (recursively), then the canonical string is
//! SHA-256 hashed and hex encoded.

use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Deterministic, key-sorted string form of a JSON value
pub fn canonicalize(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => out.push_str(&n.to_string()),
        // serde_json handles escaping; a bare string is always serializable
        Value::String(s) => out.push_str(&Value::String(s.clone()).to_string()),
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        Value::Object(map) => {
            // Sort keys; nested objects are canonicalized recursively
            let sorted: BTreeMap<&String, &Value> = map.iter().collect();
            out.push('{');
            for (i, (key, val)) in sorted.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String((*key).clone()).to_string());
                out.push(':');
                write_canonical(val, out);
            }
            out.push('}');
        }
    }
}

/// Content hash of normalized job parameters (hex SHA-256)
pub fn hash_params(params: &Value) -> String {
    let canonical = canonicalize(params);
    let digest = Sha256::digest(canonical.as_bytes());
    format!("{:x}", digest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_hash_is_order_independent() {
        let a = json!({"a": 1, "b": 2});
        let b = json!({"b": 2, "a": 1});
        assert_eq!(hash_params(&a), hash_params(&b));
    }

    #[test]
    fn test_nested_objects_are_canonicalized() {
        let a = json!({"outer": {"x": [1, 2], "y": "s"}, "z": null});
        let b = json!({"z": null, "outer": {"y": "s", "x": [1, 2]}});
        assert_eq!(hash_params(&a), hash_params(&b));
    }

    #[test]
    fn test_different_values_differ() {
        let a = json!({"sequence": "ATGC", "evalue": 0.01});
        let b = json!({"sequence": "ATGG", "evalue": 0.01});
        assert_ne!(hash_params(&a), hash_params(&b));
    }

    #[test]
    fn test_array_order_matters() {
        // Arrays are positional data; only object key order is normalized
        let a = json!({"ids": [1, 2]});
        let b = json!({"ids": [2, 1]});
        assert_ne!(hash_params(&a), hash_params(&b));
    }

    #[test]
    fn test_canonical_form_is_stable() {
        let v = json!({"b": {"d": 1, "c": true}, "a": "x"});
        assert_eq!(canonicalize(&v), r#"{"a":"x","b":{"c":true,"d":1}}"#);
    }
}
