//! Identifier remapping
//!
//! Source and target environments assign different identifiers to the same
//! logical resource. As entries are created or matched during a push, a
//! source→target mapping accumulates here and is applied to the reference
//! fields of every not-yet-pushed payload.

use serde_json::{Number, Value};
use std::collections::HashMap;

use crate::registry::ResourceDef;

/// Push-run-scoped source→target identifier mapping.
#[derive(Debug, Default)]
pub struct IdentifierMap {
    map: HashMap<String, String>,
}

impl IdentifierMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, source_id: &str, target_id: &str) {
        self.map.insert(source_id.to_string(), target_id.to_string());
    }

    pub fn resolve(&self, source_id: &str) -> Option<&str> {
        self.map.get(source_id).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

/// Result of rewriting a payload's reference fields.
#[derive(Debug)]
pub struct Rewritten {
    pub payload: Value,
    /// Source ids found in reference fields with no mapping yet. A non-empty
    /// list means the payload must be requeued for a later pass.
    pub unresolved: Vec<String>,
}

/// Rewrite every reference field of `payload` through the identifier map.
/// Reference values may be a scalar id, an object with an `id` key, or a
/// list of either. Fields not named in the type's reference list are left
/// untouched.
pub fn rewrite_references(def: &ResourceDef, payload: &Value, map: &IdentifierMap) -> Rewritten {
    let mut rewritten = payload.clone();
    let mut unresolved = Vec::new();

    if let Value::Object(fields) = &mut rewritten {
        for field in def.reference_fields {
            if let Some(value) = fields.get_mut(*field) {
                rewrite_value(value, map, &mut unresolved);
            }
        }
    }

    unresolved.sort();
    unresolved.dedup();
    Rewritten { payload: rewritten, unresolved }
}

fn rewrite_value(value: &mut Value, map: &IdentifierMap, unresolved: &mut Vec<String>) {
    match value {
        Value::Array(items) => {
            for item in items {
                rewrite_value(item, map, unresolved);
            }
        }
        Value::Object(obj) => {
            if let Some(id_value) = obj.get_mut("id") {
                rewrite_id(id_value, map, unresolved);
            }
        }
        Value::String(_) | Value::Number(_) => rewrite_id(value, map, unresolved),
        _ => {}
    }
}

/// Replace one id value through the map, preserving its JSON type.
fn rewrite_id(value: &mut Value, map: &IdentifierMap, unresolved: &mut Vec<String>) {
    let source_id = match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        _ => return,
    };

    match map.resolve(&source_id) {
        Some(target_id) => {
            *value = if value.is_number() {
                match target_id.parse::<i64>() {
                    Ok(n) => Value::Number(Number::from(n)),
                    Err(_) => Value::String(target_id.to_string()),
                }
            } else {
                Value::String(target_id.to_string())
            };
        }
        None => unresolved.push(source_id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry;
    use serde_json::json;

    fn firewall() -> &'static ResourceDef {
        registry::lookup("firewall_rule").unwrap()
    }

    #[test]
    fn test_rewrites_object_list_references() {
        let mut map = IdentifierMap::new();
        map.register("101", "9001");

        let payload = json!({
            "name": "allow-dns",
            "labels": [{"id": 101, "name": "L1"}],
            "action": "ALLOW"
        });
        let result = rewrite_references(firewall(), &payload, &map);

        assert!(result.unresolved.is_empty());
        assert_eq!(result.payload["labels"][0]["id"], json!(9001));
        // Non-reference fields untouched.
        assert_eq!(result.payload["action"], "ALLOW");
    }

    #[test]
    fn test_rewrites_scalar_and_string_ids() {
        let mut map = IdentifierMap::new();
        map.register("5", "77");

        let def = registry::lookup("network_svc_group").unwrap();
        let numeric = json!({"name": "g", "services": [5]});
        let result = rewrite_references(def, &numeric, &map);
        assert_eq!(result.payload["services"][0], json!(77));

        let stringly = json!({"name": "g", "services": ["5"]});
        let result = rewrite_references(def, &stringly, &map);
        assert_eq!(result.payload["services"][0], json!("77"));
    }

    #[test]
    fn test_unmapped_reference_is_reported_unresolved() {
        let map = IdentifierMap::new();
        let payload = json!({"name": "r", "labels": [{"id": 101}], "locations": [{"id": 101}]});
        let result = rewrite_references(firewall(), &payload, &map);
        // Deduplicated across fields.
        assert_eq!(result.unresolved, vec!["101".to_string()]);
    }

    #[test]
    fn test_id_outside_reference_fields_is_not_touched() {
        let mut map = IdentifierMap::new();
        map.register("42", "9");

        let payload = json!({"name": "r", "extra": {"id": 42}});
        let result = rewrite_references(firewall(), &payload, &map);
        assert_eq!(result.payload["extra"]["id"], json!(42));
        assert!(result.unresolved.is_empty());
    }

    #[test]
    fn test_missing_reference_field_is_fine() {
        let map = IdentifierMap::new();
        let payload = json!({"name": "bare"});
        let result = rewrite_references(firewall(), &payload, &map);
        assert!(result.unresolved.is_empty());
        assert_eq!(result.payload, payload);
    }
}
