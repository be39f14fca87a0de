//! Baseline classification
//!
//! After the target import, every baseline entry is resolved against the
//! target's live state by natural key: skipped outright (predefined or
//! environment-bound type), skipped as identical, or planned as a create or
//! update. Read-only fields are stripped from both sides before comparison.

use anyhow::Result;
use log::warn;
use serde_json::Value;
use sqlx::SqlitePool;
use std::collections::HashMap;

use super::remap::IdentifierMap;
use super::{PushOutcome, PushRecord};
use crate::config::repository::resources;
use crate::document;
use crate::registry::{self, ResourceDef};
use crate::snapshot::BaselineEnvelope;
use crate::snapshot::envelope::BaselineEntry;

/// Planned remote action for a non-skipped entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanAction {
    Create,
    Update { target_id: String },
}

/// One baseline entry marked for create/update.
#[derive(Debug, Clone)]
pub struct PlannedPush {
    pub def: &'static ResourceDef,
    pub source_key: String,
    pub source_id: Option<String>,
    pub entry: BaselineEntry,
    pub action: PlanAction,
}

/// Classification output: entries already terminal, entries planned for the
/// push passes (in push order), and merge-type entries handled separately.
#[derive(Debug, Default)]
pub struct Classification {
    pub terminal: Vec<PushRecord>,
    pub planned: Vec<PlannedPush>,
    pub merges: Vec<(&'static ResourceDef, BaselineEntry)>,
}

/// One live target resource, keyed by natural key in the index.
#[derive(Debug, Clone)]
pub struct TargetEntry {
    pub target_id: String,
    pub payload: Value,
}

/// type → natural key → live target entry.
pub type TargetIndex = HashMap<String, HashMap<String, TargetEntry>>;

/// Build the natural-key index from the freshly imported cache. Read-only:
/// never touches the remote source.
pub async fn build_target_index(pool: &SqlitePool, tenant_id: i64) -> Result<TargetIndex> {
    let mut index = TargetIndex::new();
    for def in registry::RESOURCE_DEFINITIONS {
        let rows = resources::by_type(pool, tenant_id, def.resource_type).await?;
        if rows.is_empty() {
            continue;
        }
        let mut by_key = HashMap::new();
        for row in rows {
            let key = row
                .name
                .clone()
                .filter(|n| !n.is_empty())
                .or_else(|| document::natural_key(def, &row.payload));
            if let Some(key) = key {
                by_key.insert(key, TargetEntry { target_id: row.remote_id, payload: row.payload });
            }
        }
        index.insert(def.resource_type.to_string(), by_key);
    }
    Ok(index)
}

/// Classify every envelope entry. Identifier mappings are registered for
/// every entry resolved against an existing target resource so that later
/// entries' references resolve without a remote call.
pub fn classify(
    envelope: &BaselineEnvelope,
    index: &TargetIndex,
    ids: &mut IdentifierMap,
) -> Classification {
    let mut result = Classification::default();

    // Push-ordered types first, then whatever else the envelope carries
    // (those all classify as skipped or merge).
    let mut ordered: Vec<&String> = Vec::new();
    for rtype in registry::PUSH_ORDER {
        if let Some(key) = envelope.resources.keys().find(|k| k.as_str() == *rtype) {
            ordered.push(key);
        }
    }
    for rtype in envelope.resources.keys() {
        if !registry::PUSH_ORDER.contains(&rtype.as_str()) {
            ordered.push(rtype);
        }
    }

    for rtype in ordered {
        let entries = &envelope.resources[rtype];
        let Some(def) = registry::lookup(rtype) else {
            warn!("baseline contains unknown resource type '{}' — skipping", rtype);
            for entry in entries {
                let key = entry.name.clone().unwrap_or_else(|| "?".to_string());
                result.terminal.push(
                    PushRecord::new(rtype, &key, PushOutcome::SkippedType)
                        .source_id(entry.id.clone()),
                );
            }
            continue;
        };

        for entry in entries {
            classify_entry(def, entry, index, ids, &mut result);
        }
    }

    result
}

fn classify_entry(
    def: &'static ResourceDef,
    entry: &BaselineEntry,
    index: &TargetIndex,
    ids: &mut IdentifierMap,
    result: &mut Classification,
) {
    let rtype = def.resource_type;
    let source_id = entry
        .id
        .clone()
        .or_else(|| document::remote_id(def, &entry.raw_config));
    let key = entry.natural_key(def);
    let target = key
        .as_deref()
        .and_then(|k| index.get(rtype).and_then(|by_key| by_key.get(k)));

    // Predefined/system instances are skipped by content, regardless of any
    // diff outcome.
    if registry::is_predefined_skip_type(rtype) && is_predefined(def, entry, key.as_deref()) {
        if let Some(sid) = &source_id {
            // Map to the target's instance when present so references to it
            // still resolve; identity otherwise.
            let tid = target.map(|t| t.target_id.clone()).unwrap_or_else(|| sid.clone());
            ids.register(sid, &tid);
        }
        result.terminal.push(
            PushRecord::new(rtype, key.as_deref().unwrap_or("?"), PushOutcome::SkippedPredefined)
                .source_id(source_id)
                .target_id(target.map(|t| t.target_id.clone())),
        );
        return;
    }

    if registry::is_skip_type(rtype) {
        result.terminal.push(
            PushRecord::new(rtype, key.as_deref().unwrap_or("?"), PushOutcome::SkippedType)
                .source_id(source_id),
        );
        return;
    }

    // Merge singletons carry no natural key; the engine matches them by type.
    if def.is_merge() {
        result.merges.push((def, entry.clone()));
        return;
    }

    let Some(key) = key else {
        result.terminal.push(
            PushRecord::failed(rtype, "?", "entry has no natural key for matching")
                .source_id(source_id),
        );
        return;
    };

    match target {
        Some(existing) => {
            if let Some(sid) = &source_id {
                ids.register(sid, &existing.target_id);
            }
            let baseline_stripped = document::strip_readonly(&entry.raw_config);
            let target_stripped = document::strip_readonly(&existing.payload);

            if document::canonical_json(&baseline_stripped)
                == document::canonical_json(&target_stripped)
            {
                result.terminal.push(
                    PushRecord::new(rtype, &key, PushOutcome::SkippedIdentical)
                        .source_id(source_id)
                        .target_id(Some(existing.target_id.clone())),
                );
            } else {
                result.planned.push(PlannedPush {
                    def,
                    source_key: key,
                    source_id,
                    entry: entry.clone(),
                    action: PlanAction::Update { target_id: existing.target_id.clone() },
                });
            }
        }
        None => {
            result.planned.push(PlannedPush {
                def,
                source_key: key,
                source_id,
                entry: entry.clone(),
                action: PlanAction::Create,
            });
        }
    }
}

/// Recognition rule for predefined instances: an explicit payload flag, or a
/// known system name for the type.
fn is_predefined(def: &ResourceDef, entry: &BaselineEntry, key: Option<&str>) -> bool {
    entry.raw_config.get("predefined") == Some(&Value::Bool(true))
        || key.is_some_and(|k| registry::is_known_system_name(def.resource_type, k))
}
