//! Snapshot repository
//!
//! Rows are immutable after insert and deletable only as a whole unit.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};

use crate::snapshot::SnapshotData;

#[derive(Debug, Clone)]
pub struct Snapshot {
    pub id: i64,
    pub tenant_id: i64,
    pub product: String,
    pub name: String,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
    pub resource_count: i64,
    pub data: SnapshotData,
}

pub async fn insert(
    pool: &SqlitePool,
    tenant_id: i64,
    product: &str,
    name: &str,
    comment: Option<&str>,
    data: &SnapshotData,
) -> Result<Snapshot> {
    let data_json = serde_json::to_string(data).context("Failed to serialize snapshot data")?;
    let resource_count = data.resource_count() as i64;

    let result = sqlx::query(
        "INSERT INTO snapshots (tenant_id, product, name, comment, created_at, resource_count, data)
         VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(tenant_id)
    .bind(product)
    .bind(name)
    .bind(comment)
    .bind(Utc::now())
    .bind(resource_count)
    .bind(data_json)
    .execute(pool)
    .await
    .with_context(|| format!("Failed to save snapshot '{}'", name))?;

    get(pool, result.last_insert_rowid())
        .await?
        .context("Snapshot vanished after insert")
}

pub async fn get(pool: &SqlitePool, id: i64) -> Result<Option<Snapshot>> {
    let row = sqlx::query(
        "SELECT id, tenant_id, product, name, comment, created_at, resource_count, data
         FROM snapshots WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(pool)
    .await
    .context("Failed to get snapshot")?;

    row.map(from_row).transpose()
}

pub async fn get_by_name(
    pool: &SqlitePool,
    tenant_id: i64,
    name: &str,
) -> Result<Option<Snapshot>> {
    let row = sqlx::query(
        "SELECT id, tenant_id, product, name, comment, created_at, resource_count, data
         FROM snapshots WHERE tenant_id = ? AND name = ?",
    )
    .bind(tenant_id)
    .bind(name)
    .fetch_optional(pool)
    .await
    .context("Failed to get snapshot by name")?;

    row.map(from_row).transpose()
}

/// All snapshots for a tenant, newest first, without their resource data
/// (the `data` column can be large).
pub async fn list(pool: &SqlitePool, tenant_id: i64) -> Result<Vec<Snapshot>> {
    let rows = sqlx::query(
        "SELECT id, tenant_id, product, name, comment, created_at, resource_count, '{\"resources\":{}}' AS data
         FROM snapshots WHERE tenant_id = ?
         ORDER BY created_at DESC, id DESC",
    )
    .bind(tenant_id)
    .fetch_all(pool)
    .await
    .context("Failed to list snapshots")?;

    rows.into_iter().map(from_row).collect()
}

pub async fn delete(pool: &SqlitePool, tenant_id: i64, name: &str) -> Result<bool> {
    let result = sqlx::query("DELETE FROM snapshots WHERE tenant_id = ? AND name = ?")
        .bind(tenant_id)
        .bind(name)
        .execute(pool)
        .await
        .context("Failed to delete snapshot")?;
    Ok(result.rows_affected() > 0)
}

fn from_row(row: sqlx::sqlite::SqliteRow) -> Result<Snapshot> {
    let data_text: String = row.try_get("data")?;
    Ok(Snapshot {
        id: row.try_get("id")?,
        tenant_id: row.try_get("tenant_id")?,
        product: row.try_get("product")?,
        name: row.try_get("name")?,
        comment: row.try_get("comment")?,
        created_at: row.try_get("created_at")?,
        resource_count: row.try_get("resource_count")?,
        data: serde_json::from_str(&data_text).context("Corrupt snapshot data")?,
    })
}
