//! Canonical JSON encoding and content hashing.
//!
//! The canonical form sorts object keys recursively and drops insignificant
//! whitespace, matching the ingress contract: "sorts object keys recursively
//! and uses `\n`-free compact encoding".

use serde_json::Value;
use sha2::{Digest, Sha256};

/// Render `value` as compact JSON with object keys sorted recursively.
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&serde_json::to_string(key).expect("string keys always serialize"));
                out.push(':');
                write_canonical(&map[*key], out);
            }
            out.push('}');
        }
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
        other => out.push_str(&other.to_string()),
    }
}

/// `content_hash = sha256(canonical_json(payload))`, hex-encoded.
pub fn content_hash(payload: &Value) -> String {
    let canonical = canonical_json(payload);
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn key_order_does_not_affect_canonical_form() {
        let a = json!({ "b": 1, "a": 2 });
        let b = json!({ "a": 2, "b": 1 });
        assert_eq!(canonical_json(&a), canonical_json(&b));
    }

    #[test]
    fn canonical_form_has_no_insignificant_whitespace() {
        let value = json!({ "a": [1, 2, 3] });
        let canonical = canonical_json(&value);
        assert!(!canonical.contains(' '));
        assert!(!canonical.contains('\n'));
    }

    #[test]
    fn content_hash_is_stable_across_key_order() {
        let a = json!({ "x": "y", "n": 1 });
        let b = json!({ "n": 1, "x": "y" });
        assert_eq!(content_hash(&a), content_hash(&b));
    }

    #[test]
    fn content_hash_is_64_hex_chars() {
        let hash = content_hash(&json!({}));
        assert_eq!(hash.len(), 64);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn different_payloads_hash_differently() {
        let a = content_hash(&json!({ "v": 1 }));
        let b = content_hash(&json!({ "v": 2 }));
        assert_ne!(a, b);
    }

    #[test]
    fn nested_object_key_order_is_also_normalized() {
        let a = json!({ "outer": { "b": 1, "a": 2 } });
        let b = json!({ "outer": { "a": 2, "b": 1 } });
        assert_eq!(content_hash(&a), content_hash(&b));
    }
}
