//! JCS-style canonicalization.
//!
//! Produces the exact byte sequence a signature is computed over: sorted
//! object keys at every depth, no insignificant whitespace, UTF-8, no BOM.
//! Implemented by hand over `serde_json::Value` rather than pulling in a
//! canonical-JSON crate — this is the one place in the workspace where an
//! auditable, dependency-free algorithm beats an opaque one, since it sits
//! directly on the signing path.

use serde_json::Value;

/// Removes the top-level `signature` field (it must never be part of what
/// it signs) and serializes the rest in canonical form.
pub fn canonicalize(document: &Value) -> Vec<u8> {
    let mut stripped = document.clone();
    if let Value::Object(map) = &mut stripped {
        map.remove("signature");
    }
    let mut out = Vec::new();
    write_canonical(&stripped, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut Vec<u8>) {
    match value {
        Value::Null => out.extend_from_slice(b"null"),
        Value::Bool(b) => out.extend_from_slice(if *b { b"true" } else { b"false" }),
        Value::Number(n) => out.extend_from_slice(canonical_number(n).as_bytes()),
        Value::String(s) => write_canonical_string(s, out),
        Value::Array(items) => {
            out.push(b'[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                write_canonical(item, out);
            }
            out.push(b']');
        }
        Value::Object(map) => {
            out.push(b'{');
            // `serde_json::Map` is a `BTreeMap` in this workspace (the
            // `preserve_order` feature is never enabled), so iteration
            // order is already lexicographic by key.
            for (i, (key, val)) in map.iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                write_canonical_string(key, out);
                out.push(b':');
                write_canonical(val, out);
            }
            out.push(b'}');
        }
    }
}

/// `serde_json`'s own number formatting already produces the shortest
/// round-trip representation for both integers and floats.
fn canonical_number(n: &serde_json::Number) -> String {
    n.to_string()
}

fn write_canonical_string(s: &str, out: &mut Vec<u8>) {
    // serde_json's string serializer already performs minimal, correct
    // JSON escaping; reuse it instead of reimplementing escape rules.
    let encoded = serde_json::to_string(s).expect("string always serializes");
    out.extend_from_slice(encoded.as_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn sorts_keys_at_every_depth() {
        let value = json!({ "b": 1, "a": { "z": 1, "y": 2 } });
        let bytes = canonicalize(&value);
        assert_eq!(
            String::from_utf8(bytes).unwrap(),
            r#"{"a":{"y":2,"z":1},"b":1}"#
        );
    }

    #[test]
    fn strips_signature_before_canonicalizing() {
        let value = json!({ "a": 1, "signature": { "value": "xyz" } });
        let bytes = canonicalize(&value);
        assert_eq!(String::from_utf8(bytes).unwrap(), r#"{"a":1}"#);
    }

    #[test]
    fn canonicalization_is_idempotent() {
        let value = json!({ "b": [3, 1, 2], "a": "hi" });
        let once = canonicalize(&value);
        let reparsed: Value = serde_json::from_slice(&once).unwrap();
        let twice = canonicalize(&reparsed);
        assert_eq!(once, twice);
    }
}
