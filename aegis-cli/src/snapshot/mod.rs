//! Snapshot store
//!
//! Point-in-time copies of a tenant's cached resource inventory. DB-only —
//! no API calls. Snapshots feed diffing and export; the "current state" side
//! of a diff is a synthetic snapshot-shaped view over the live cache, never
//! materialized.

pub mod diff;
pub mod envelope;

use anyhow::Result;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::SqlitePool;
use std::collections::BTreeMap;

use crate::config::repository::{resources, snapshots};
use crate::registry;

pub use crate::config::repository::snapshots::Snapshot;
pub use diff::{DiffResult, FieldChange, ResourceDiff};
pub use envelope::{BaselineEntry, BaselineEnvelope};

/// One resource inside a snapshot: remote id, display name, full payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotEntry {
    pub id: String,
    pub name: Option<String>,
    pub raw_config: Value,
}

/// Snapshot-shaped inventory: resource type → entries.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SnapshotData {
    pub resources: BTreeMap<String, Vec<SnapshotEntry>>,
}

impl SnapshotData {
    pub fn resource_count(&self) -> usize {
        self.resources.values().map(Vec::len).sum()
    }

    pub fn entries(&self, resource_type: &str) -> &[SnapshotEntry] {
        self.resources
            .get(resource_type)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

/// Synthetic snapshot view over the current cache for a tenant. Reads every
/// registry type; types with no rows are omitted.
pub async fn live_view(pool: &SqlitePool, tenant_id: i64) -> Result<SnapshotData> {
    let mut data = SnapshotData::default();
    for def in registry::RESOURCE_DEFINITIONS {
        let rows = resources::by_type(pool, tenant_id, def.resource_type).await?;
        if rows.is_empty() {
            continue;
        }
        let entries = rows
            .into_iter()
            .map(|row| SnapshotEntry {
                id: row.remote_id,
                name: row.name,
                raw_config: row.payload,
            })
            .collect();
        data.resources.insert(def.resource_type.to_string(), entries);
    }
    Ok(data)
}

/// Capture the current cache state as a named snapshot. With no name given,
/// a UTC timestamp is used.
pub async fn save(
    pool: &SqlitePool,
    tenant_id: i64,
    name: Option<&str>,
    comment: Option<&str>,
) -> Result<Snapshot> {
    let data = live_view(pool, tenant_id).await?;
    let name = match name {
        Some(n) => n.to_string(),
        None => Utc::now().format("%Y-%m-%dT%H-%M-%SZ").to_string(),
    };
    snapshots::insert(pool, tenant_id, registry::PRODUCT, &name, comment, &data).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn setup() -> (SqlitePool, i64) {
        let pool = crate::config::connect_memory().await.unwrap();
        let tenant = crate::config::repository::tenants::add(&pool, "t", "https://a", "swg")
            .await
            .unwrap();
        (pool, tenant)
    }

    #[tokio::test]
    async fn test_live_view_skips_tombstones() {
        let (pool, tenant) = setup().await;
        let now = Utc::now();
        resources::upsert(&pool, tenant, "rule_label", "1", Some("L1"), &json!({"id": 1}), now)
            .await
            .unwrap();
        resources::upsert(&pool, tenant, "rule_label", "2", Some("L2"), &json!({"id": 2}), now)
            .await
            .unwrap();
        resources::mark_missing(
            &pool,
            tenant,
            "rule_label",
            &["1".to_string()].into_iter().collect(),
        )
        .await
        .unwrap();

        let view = live_view(&pool, tenant).await.unwrap();
        assert_eq!(view.resource_count(), 1);
        assert_eq!(view.entries("rule_label")[0].id, "1");
    }

    #[tokio::test]
    async fn test_save_and_reload() {
        let (pool, tenant) = setup().await;
        let now = Utc::now();
        resources::upsert(
            &pool,
            tenant,
            "firewall_rule",
            "10",
            Some("allow-dns"),
            &json!({"id": 10, "name": "allow-dns"}),
            now,
        )
        .await
        .unwrap();

        let snap = save(&pool, tenant, Some("before-change"), Some("pre-window")).await.unwrap();
        assert_eq!(snap.resource_count, 1);

        let loaded = snapshots::get_by_name(&pool, tenant, "before-change")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(loaded.data.entries("firewall_rule").len(), 1);
        assert_eq!(loaded.comment.as_deref(), Some("pre-window"));
    }
}
