//! Generic operations over resource payload documents
//!
//! Payloads are loosely structured JSON documents whose shape varies per
//! resource type. Everything the cache and push engine need from them —
//! canonical hashing, read-only field stripping, key extraction — is
//! implemented here as generic `serde_json::Value` operations so the type
//! registry stays pure configuration data.

use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::registry::{READONLY_FIELDS, ResourceDef};

/// Render a document canonically: object keys sorted recursively, compact
/// separators. Two documents that differ only in field order render
/// identically.
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
                out.push_str(&Value::String((*key).clone()).to_string());
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

/// SHA-256 hex digest of the canonical rendering. This is the change-detection
/// hash stored alongside every cached payload.
pub fn content_hash(value: &Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(canonical_json(value).as_bytes());
    let digest = hasher.finalize();
    let mut hex = String::with_capacity(64);
    for byte in digest {
        use std::fmt::Write;
        let _ = write!(hex, "{:02x}", byte);
    }
    hex
}

/// Copy of the document with read-only fields removed from the top level.
/// Identifiers, modification stamps, and computed fields never take part in
/// comparisons or pushes.
pub fn strip_readonly(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .filter(|(k, _)| !READONLY_FIELDS.contains(&k.as_str()))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Extract the natural key (usually `name`) used to match a baseline entry to
/// an existing target resource across environments.
pub fn natural_key(def: &ResourceDef, payload: &Value) -> Option<String> {
    field_as_string(payload, def.natural_key)
}

/// Extract the remote identifier from a payload. Remote APIs use numeric ids
/// for most types, so numbers are coerced to their string form.
pub fn remote_id(def: &ResourceDef, payload: &Value) -> Option<String> {
    field_as_string(payload, def.id_field)
}

fn field_as_string(payload: &Value, field: &str) -> Option<String> {
    match payload.get(field)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
