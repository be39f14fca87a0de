//! Snapshot diffing
//!
//! Compares two snapshot-shaped inventories per resource key: added, removed,
//! changed (expanded into field-level changes), unchanged. Volatile stamp
//! fields carry no configuration signal and are excluded from field diffs.

use serde_json::Value;
use std::collections::BTreeMap;

use super::{SnapshotData, SnapshotEntry};
use crate::document;

/// Fields excluded from field-level diffs.
pub const IGNORED_FIELDS: &[&str] = &[
    "modifiedBy",
    "modifiedTime",
    "modifiedAt",
    "modifiedByUser",
    "creationTime",
    "createdAt",
    "createdByUser",
    "lastModifiedTime",
];

/// One field-level change inside a changed resource.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldChange {
    pub field: String,
    pub old: Option<Value>,
    pub new: Option<Value>,
}

/// A resource present in both snapshots with differing content.
#[derive(Debug, Clone)]
pub struct ChangedEntry {
    pub id: String,
    pub name: Option<String>,
    pub field_changes: Vec<FieldChange>,
}

/// Per-type diff buckets.
#[derive(Debug, Clone, Default)]
pub struct ResourceDiff {
    pub resource_type: String,
    pub added: Vec<SnapshotEntry>,
    pub removed: Vec<SnapshotEntry>,
    pub changed: Vec<ChangedEntry>,
    pub unchanged: usize,
}

/// Complete diff between two snapshots. Only types with at least one
/// add/remove/change appear in `resource_diffs`.
#[derive(Debug, Clone, Default)]
pub struct DiffResult {
    pub resource_diffs: Vec<ResourceDiff>,
    pub total_unchanged: usize,
}

impl DiffResult {
    pub fn total_added(&self) -> usize {
        self.resource_diffs.iter().map(|d| d.added.len()).sum()
    }

    pub fn total_removed(&self) -> usize {
        self.resource_diffs.iter().map(|d| d.removed.len()).sum()
    }

    pub fn total_changed(&self) -> usize {
        self.resource_diffs.iter().map(|d| d.changed.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.total_added() == 0 && self.total_removed() == 0 && self.total_changed() == 0
    }
}

/// Diff `a` (base/older) against `b` (current/newer).
pub fn compute(a: &SnapshotData, b: &SnapshotData) -> DiffResult {
    let mut all_types: Vec<&String> = a.resources.keys().chain(b.resources.keys()).collect();
    all_types.sort();
    all_types.dedup();

    let mut result = DiffResult::default();

    for rtype in all_types {
        let a_by_id = index_by_id(a.entries(rtype));
        let b_by_id = index_by_id(b.entries(rtype));

        let mut diff = ResourceDiff {
            resource_type: rtype.clone(),
            ..Default::default()
        };

        for (id, entry) in &b_by_id {
            if !a_by_id.contains_key(id) {
                diff.added.push((*entry).clone());
            }
        }
        for (id, entry) in &a_by_id {
            if !b_by_id.contains_key(id) {
                diff.removed.push((*entry).clone());
            }
        }

        for (id, a_entry) in &a_by_id {
            let Some(b_entry) = b_by_id.get(id) else { continue };

            // Hash comparison short-circuits the common unchanged case.
            if document::content_hash(&a_entry.raw_config)
                == document::content_hash(&b_entry.raw_config)
            {
                diff.unchanged += 1;
                continue;
            }

            let field_changes = field_changes(&a_entry.raw_config, &b_entry.raw_config);
            if field_changes.is_empty() {
                // Only ignored stamp fields moved.
                diff.unchanged += 1;
                continue;
            }

            diff.changed.push(ChangedEntry {
                id: (*id).clone(),
                name: b_entry.name.clone().or_else(|| a_entry.name.clone()),
                field_changes,
            });
        }

        result.total_unchanged += diff.unchanged;
        if !diff.added.is_empty() || !diff.removed.is_empty() || !diff.changed.is_empty() {
            result.resource_diffs.push(diff);
        }
    }

    result
}

fn index_by_id(entries: &[SnapshotEntry]) -> BTreeMap<&String, &SnapshotEntry> {
    entries.iter().map(|e| (&e.id, e)).collect()
}

/// Field-level changes between two payloads, skipping ignored fields.
fn field_changes(old: &Value, new: &Value) -> Vec<FieldChange> {
    let empty = serde_json::Map::new();
    let old_map = old.as_object().unwrap_or(&empty);
    let new_map = new.as_object().unwrap_or(&empty);

    let mut keys: Vec<&String> = old_map.keys().chain(new_map.keys()).collect();
    keys.sort();
    keys.dedup();

    keys.into_iter()
        .filter(|k| !IGNORED_FIELDS.contains(&k.as_str()))
        .filter_map(|key| {
            let old_val = old_map.get(key);
            let new_val = new_map.get(key);
            if old_val == new_val {
                None
            } else {
                Some(FieldChange {
                    field: key.clone(),
                    old: old_val.cloned(),
                    new: new_val.cloned(),
                })
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entry(id: &str, name: &str, raw: Value) -> SnapshotEntry {
        SnapshotEntry {
            id: id.to_string(),
            name: Some(name.to_string()),
            raw_config: raw,
        }
    }

    fn data(rtype: &str, entries: Vec<SnapshotEntry>) -> SnapshotData {
        let mut d = SnapshotData::default();
        d.resources.insert(rtype.to_string(), entries);
        d
    }

    #[test]
    fn test_added_and_removed() {
        let a = data("rule_label", vec![entry("1", "L1", json!({"name": "L1"}))]);
        let b = data("rule_label", vec![entry("2", "L2", json!({"name": "L2"}))]);

        let diff = compute(&a, &b);
        assert_eq!(diff.total_added(), 1);
        assert_eq!(diff.total_removed(), 1);
        assert_eq!(diff.resource_diffs[0].added[0].id, "2");
        assert_eq!(diff.resource_diffs[0].removed[0].id, "1");
    }

    #[test]
    fn test_changed_expands_field_level() {
        let a = data(
            "firewall_rule",
            vec![entry("1", "r", json!({"name": "r", "action": "ALLOW", "rank": 7}))],
        );
        let b = data(
            "firewall_rule",
            vec![entry("1", "r", json!({"name": "r", "action": "BLOCK", "rank": 7}))],
        );

        let diff = compute(&a, &b);
        assert_eq!(diff.total_changed(), 1);
        let changes = &diff.resource_diffs[0].changed[0].field_changes;
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].field, "action");
        assert_eq!(changes[0].old, Some(json!("ALLOW")));
        assert_eq!(changes[0].new, Some(json!("BLOCK")));
    }

    #[test]
    fn test_stamp_only_change_counts_as_unchanged() {
        let a = data(
            "rule_label",
            vec![entry("1", "L1", json!({"name": "L1", "lastModifiedTime": 100}))],
        );
        let b = data(
            "rule_label",
            vec![entry("1", "L1", json!({"name": "L1", "lastModifiedTime": 200}))],
        );

        let diff = compute(&a, &b);
        assert!(diff.is_empty());
        assert_eq!(diff.total_unchanged, 1);
    }

    #[test]
    fn test_identical_snapshots_are_empty_diff() {
        let a = data("rule_label", vec![entry("1", "L1", json!({"name": "L1"}))]);
        let diff = compute(&a, &a.clone());
        assert!(diff.is_empty());
        assert_eq!(diff.total_unchanged, 1);
    }

    #[test]
    fn test_type_only_in_one_side() {
        let a = SnapshotData::default();
        let b = data("location", vec![entry("5", "HQ", json!({"name": "HQ"}))]);
        let diff = compute(&a, &b);
        assert_eq!(diff.total_added(), 1);
        assert_eq!(diff.resource_diffs[0].resource_type, "location");
    }
}
