//! Baseline envelope
//!
//! The portable JSON document produced by snapshot export and consumed by the
//! push engine. Tenant-agnostic: it carries a product tag and the resource
//! list; no identifier in it is assumed valid in any target.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use super::Snapshot;
use crate::document;
use crate::registry;

/// One baseline resource. `id` is the identifier in the environment the
/// baseline was exported from; it only serves as a reference key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaselineEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub raw_config: Value,
}

impl BaselineEntry {
    /// Natural key for cross-environment matching: explicit name, else the
    /// type's natural-key field from the payload.
    pub fn natural_key(&self, def: &registry::ResourceDef) -> Option<String> {
        self.name
            .clone()
            .filter(|n| !n.is_empty())
            .or_else(|| document::natural_key(def, &self.raw_config))
    }
}

/// Exported baseline: product tag plus resources grouped by type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaselineEnvelope {
    pub product: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(default)]
    pub resource_count: usize,
    pub resources: BTreeMap<String, Vec<BaselineEntry>>,
}

impl BaselineEnvelope {
    /// Structural validation. A failure here is fatal to a push.
    pub fn validate(&self) -> Result<(), String> {
        if self.product != registry::PRODUCT {
            return Err(format!(
                "envelope product '{}' does not match '{}'",
                self.product,
                registry::PRODUCT
            ));
        }
        for (rtype, entries) in &self.resources {
            for entry in entries {
                if !entry.raw_config.is_object() {
                    return Err(format!(
                        "{}: entry '{}' has a non-object payload",
                        rtype,
                        entry.name.as_deref().unwrap_or("?")
                    ));
                }
            }
        }
        Ok(())
    }

    pub fn entry_count(&self) -> usize {
        self.resources.values().map(Vec::len).sum()
    }
}

/// Build the portable export document from a stored snapshot.
pub fn export(snapshot: &Snapshot) -> BaselineEnvelope {
    let resources = snapshot
        .data
        .resources
        .iter()
        .map(|(rtype, entries)| {
            let converted = entries
                .iter()
                .map(|e| BaselineEntry {
                    id: Some(e.id.clone()),
                    name: e.name.clone(),
                    raw_config: e.raw_config.clone(),
                })
                .collect();
            (rtype.clone(), converted)
        })
        .collect();

    BaselineEnvelope {
        product: snapshot.product.clone(),
        snapshot_name: Some(snapshot.name.clone()),
        comment: snapshot.comment.clone(),
        resource_count: snapshot.resource_count as usize,
        resources,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn envelope_json() -> &'static str {
        r#"{
            "product": "swg",
            "snapshot_name": "golden",
            "resource_count": 2,
            "resources": {
                "rule_label": [
                    {"id": "101", "name": "L1", "raw_config": {"id": 101, "name": "L1"}}
                ],
                "firewall_rule": [
                    {"id": "201", "name": "allow-dns",
                     "raw_config": {"id": 201, "name": "allow-dns", "labels": [{"id": 101}]}}
                ]
            }
        }"#
    }

    #[test]
    fn test_envelope_parses_and_validates() {
        let envelope: BaselineEnvelope = serde_json::from_str(envelope_json()).unwrap();
        envelope.validate().unwrap();
        assert_eq!(envelope.entry_count(), 2);
        assert_eq!(envelope.resources["rule_label"][0].id.as_deref(), Some("101"));
    }

    #[test]
    fn test_wrong_product_is_rejected() {
        let mut envelope: BaselineEnvelope = serde_json::from_str(envelope_json()).unwrap();
        envelope.product = "ztna".to_string();
        assert!(envelope.validate().is_err());
    }

    #[test]
    fn test_non_object_payload_is_rejected() {
        let mut envelope: BaselineEnvelope = serde_json::from_str(envelope_json()).unwrap();
        envelope
            .resources
            .get_mut("rule_label")
            .unwrap()
            .push(BaselineEntry {
                id: None,
                name: Some("bad".to_string()),
                raw_config: json!("not an object"),
            });
        assert!(envelope.validate().is_err());
    }

    #[test]
    fn test_natural_key_falls_back_to_payload() {
        let def = registry::lookup("rule_label").unwrap();
        let entry = BaselineEntry {
            id: None,
            name: None,
            raw_config: json!({"name": "from-payload"}),
        };
        assert_eq!(entry.natural_key(def).as_deref(), Some("from-payload"));
    }
}
