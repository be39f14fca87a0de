//! Content cache repository
//!
//! One row per (tenant, resource_type, remote_id) holding the last observed
//! payload and its content hash. Rows are tombstoned, never physically
//! removed, so historical diffs stay meaningful. The hash is recomputed in
//! the same statement that writes the payload.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{Row, SqlitePool};
use std::collections::HashSet;

use crate::document;

/// One remote object as last observed.
#[derive(Debug, Clone)]
pub struct CachedResource {
    pub id: i64,
    pub tenant_id: i64,
    pub resource_type: String,
    pub remote_id: String,
    pub name: Option<String>,
    pub payload: Value,
    pub content_hash: String,
    pub last_synced_at: DateTime<Utc>,
    pub is_deleted: bool,
}

/// Result of an upsert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// Payload was absent or its hash differed; row written.
    Written { created: bool },
    /// Stored hash matches; nothing written.
    Unchanged,
}

/// Insert or update one observed resource. Writes only when the content hash
/// differs from the stored one; re-observing a tombstoned id resurrects it.
pub async fn upsert(
    pool: &SqlitePool,
    tenant_id: i64,
    resource_type: &str,
    remote_id: &str,
    name: Option<&str>,
    payload: &Value,
    synced_at: DateTime<Utc>,
) -> Result<UpsertOutcome> {
    let new_hash = document::content_hash(payload);

    let existing = sqlx::query(
        "SELECT content_hash, is_deleted FROM cached_resources
         WHERE tenant_id = ? AND resource_type = ? AND remote_id = ?",
    )
    .bind(tenant_id)
    .bind(resource_type)
    .bind(remote_id)
    .fetch_optional(pool)
    .await
    .context("Failed to read cached resource")?;

    match existing {
        None => {
            sqlx::query(
                "INSERT INTO cached_resources
                 (tenant_id, resource_type, remote_id, name, payload, content_hash,
                  first_seen_at, last_synced_at, is_deleted)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, 0)",
            )
            .bind(tenant_id)
            .bind(resource_type)
            .bind(remote_id)
            .bind(name)
            .bind(payload.to_string())
            .bind(&new_hash)
            .bind(synced_at)
            .bind(synced_at)
            .execute(pool)
            .await
            .context("Failed to insert cached resource")?;
            Ok(UpsertOutcome::Written { created: true })
        }
        Some(row) => {
            let stored_hash: String = row.try_get("content_hash")?;
            let is_deleted: bool = row.try_get("is_deleted")?;

            if stored_hash == new_hash {
                if is_deleted {
                    // Same content, but the id is live again.
                    sqlx::query(
                        "UPDATE cached_resources SET is_deleted = 0, last_synced_at = ?
                         WHERE tenant_id = ? AND resource_type = ? AND remote_id = ?",
                    )
                    .bind(synced_at)
                    .bind(tenant_id)
                    .bind(resource_type)
                    .bind(remote_id)
                    .execute(pool)
                    .await
                    .context("Failed to resurrect cached resource")?;
                }
                return Ok(UpsertOutcome::Unchanged);
            }

            sqlx::query(
                "UPDATE cached_resources
                 SET name = ?, payload = ?, content_hash = ?, last_synced_at = ?, is_deleted = 0
                 WHERE tenant_id = ? AND resource_type = ? AND remote_id = ?",
            )
            .bind(name)
            .bind(payload.to_string())
            .bind(&new_hash)
            .bind(synced_at)
            .bind(tenant_id)
            .bind(resource_type)
            .bind(remote_id)
            .execute(pool)
            .await
            .context("Failed to update cached resource")?;
            Ok(UpsertOutcome::Written { created: false })
        }
    }
}

/// Tombstone previously cached ids of a type that are absent from the latest
/// full fetch. Only called for types where absence is a deletion signal.
/// Returns the number of rows tombstoned.
pub async fn mark_missing(
    pool: &SqlitePool,
    tenant_id: i64,
    resource_type: &str,
    present_ids: &HashSet<String>,
) -> Result<u64> {
    let rows = sqlx::query(
        "SELECT remote_id FROM cached_resources
         WHERE tenant_id = ? AND resource_type = ? AND is_deleted = 0",
    )
    .bind(tenant_id)
    .bind(resource_type)
    .fetch_all(pool)
    .await
    .context("Failed to list cached ids")?;

    let mut tombstoned = 0;
    for row in rows {
        let remote_id: String = row.try_get("remote_id")?;
        if present_ids.contains(&remote_id) {
            continue;
        }
        sqlx::query(
            "UPDATE cached_resources SET is_deleted = 1
             WHERE tenant_id = ? AND resource_type = ? AND remote_id = ?",
        )
        .bind(tenant_id)
        .bind(resource_type)
        .bind(&remote_id)
        .execute(pool)
        .await
        .context("Failed to tombstone cached resource")?;
        tombstoned += 1;
    }
    Ok(tombstoned)
}

/// All non-deleted rows of a type, ordered by name. Never touches the remote
/// source.
pub async fn by_type(
    pool: &SqlitePool,
    tenant_id: i64,
    resource_type: &str,
) -> Result<Vec<CachedResource>> {
    let rows = sqlx::query(
        "SELECT id, tenant_id, resource_type, remote_id, name, payload, content_hash,
                last_synced_at, is_deleted
         FROM cached_resources
         WHERE tenant_id = ? AND resource_type = ? AND is_deleted = 0
         ORDER BY name, remote_id",
    )
    .bind(tenant_id)
    .bind(resource_type)
    .fetch_all(pool)
    .await
    .context("Failed to query cached resources")?;

    rows.into_iter().map(from_row).collect()
}

/// Non-deleted rows matching an optional type equality and case-insensitive
/// name substring.
pub async fn query(
    pool: &SqlitePool,
    tenant_id: i64,
    resource_type: Option<&str>,
    name_contains: Option<&str>,
) -> Result<Vec<CachedResource>> {
    let mut sql = String::from(
        "SELECT id, tenant_id, resource_type, remote_id, name, payload, content_hash,
                last_synced_at, is_deleted
         FROM cached_resources
         WHERE tenant_id = ? AND is_deleted = 0",
    );
    if resource_type.is_some() {
        sql.push_str(" AND resource_type = ?");
    }
    if name_contains.is_some() {
        sql.push_str(" AND name LIKE ? COLLATE NOCASE");
    }
    sql.push_str(" ORDER BY resource_type, name, remote_id");

    let mut q = sqlx::query(&sql).bind(tenant_id);
    if let Some(rtype) = resource_type {
        q = q.bind(rtype);
    }
    if let Some(needle) = name_contains {
        q = q.bind(format!("%{}%", needle));
    }

    let rows = q
        .fetch_all(pool)
        .await
        .context("Failed to query cached resources")?;

    rows.into_iter().map(from_row).collect()
}

fn from_row(row: sqlx::sqlite::SqliteRow) -> Result<CachedResource> {
    let payload_text: String = row.try_get("payload")?;
    Ok(CachedResource {
        id: row.try_get("id")?,
        tenant_id: row.try_get("tenant_id")?,
        resource_type: row.try_get("resource_type")?,
        remote_id: row.try_get("remote_id")?,
        name: row.try_get("name")?,
        payload: serde_json::from_str(&payload_text).context("Corrupt cached payload")?,
        content_hash: row.try_get("content_hash")?,
        last_synced_at: row.try_get("last_synced_at")?,
        is_deleted: row.try_get("is_deleted")?,
    })
}
