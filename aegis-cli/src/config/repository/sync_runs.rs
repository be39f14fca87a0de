//! Import run log
//!
//! Append-only record of every import execution with per-type counters.
//! Rows are immutable once finalized.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool};
use std::collections::BTreeMap;

/// Final status of an import run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Success,
    Partial,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Partial => "partial",
            Self::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "success" => Some(Self::Success),
            "partial" => Some(Self::Partial),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// Per-type counters accumulated during an import.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeCounters {
    pub fetched: u64,
    pub written: u64,
    pub unchanged: u64,
    pub errored: u64,
    pub deleted: u64,
}

impl TypeCounters {
    pub fn add(&mut self, other: &TypeCounters) {
        self.fetched += other.fetched;
        self.written += other.written;
        self.unchanged += other.unchanged;
        self.errored += other.errored;
        self.deleted += other.deleted;
    }
}

/// One import execution.
#[derive(Debug, Clone)]
pub struct SyncRun {
    pub id: i64,
    pub tenant_id: i64,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub status: RunStatus,
    /// Explicit type subset for targeted imports; None means all.
    pub resource_types_requested: Option<Vec<String>>,
    pub type_counters: BTreeMap<String, TypeCounters>,
    pub error_detail: Option<String>,
}

impl SyncRun {
    /// Aggregate counters across all types.
    pub fn totals(&self) -> TypeCounters {
        let mut total = TypeCounters::default();
        for counters in self.type_counters.values() {
            total.add(counters);
        }
        total
    }
}

/// Open a run in `running` state; finalize makes it immutable.
pub async fn start(
    pool: &SqlitePool,
    tenant_id: i64,
    requested: Option<&[String]>,
) -> Result<i64> {
    let requested_json = requested
        .map(serde_json::to_string)
        .transpose()
        .context("Failed to serialize requested types")?;

    let result = sqlx::query(
        "INSERT INTO sync_runs (tenant_id, started_at, status, resource_types_requested)
         VALUES (?, ?, 'running', ?)",
    )
    .bind(tenant_id)
    .bind(Utc::now())
    .bind(requested_json)
    .execute(pool)
    .await
    .context("Failed to start sync run")?;

    Ok(result.last_insert_rowid())
}

pub async fn finalize(
    pool: &SqlitePool,
    run_id: i64,
    status: RunStatus,
    type_counters: &BTreeMap<String, TypeCounters>,
    error_detail: Option<&str>,
) -> Result<SyncRun> {
    let mut totals = TypeCounters::default();
    for counters in type_counters.values() {
        totals.add(counters);
    }
    let counters_json =
        serde_json::to_string(type_counters).context("Failed to serialize type counters")?;

    sqlx::query(
        "UPDATE sync_runs
         SET completed_at = ?, status = ?, fetched = ?, written = ?, unchanged = ?,
             errored = ?, deleted = ?, type_counters = ?, error_detail = ?
         WHERE id = ? AND status = 'running'",
    )
    .bind(Utc::now())
    .bind(status.as_str())
    .bind(totals.fetched as i64)
    .bind(totals.written as i64)
    .bind(totals.unchanged as i64)
    .bind(totals.errored as i64)
    .bind(totals.deleted as i64)
    .bind(counters_json)
    .bind(error_detail)
    .bind(run_id)
    .execute(pool)
    .await
    .context("Failed to finalize sync run")?;

    get(pool, run_id)
        .await?
        .context("Sync run vanished during finalize")
}

pub async fn get(pool: &SqlitePool, run_id: i64) -> Result<Option<SyncRun>> {
    let row = sqlx::query(
        "SELECT id, tenant_id, started_at, completed_at, status,
                resource_types_requested, type_counters, error_detail
         FROM sync_runs WHERE id = ?",
    )
    .bind(run_id)
    .fetch_optional(pool)
    .await
    .context("Failed to get sync run")?;

    row.map(from_row).transpose()
}

pub async fn list_recent(pool: &SqlitePool, tenant_id: i64, limit: i64) -> Result<Vec<SyncRun>> {
    let rows = sqlx::query(
        "SELECT id, tenant_id, started_at, completed_at, status,
                resource_types_requested, type_counters, error_detail
         FROM sync_runs WHERE tenant_id = ?
         ORDER BY started_at DESC, id DESC LIMIT ?",
    )
    .bind(tenant_id)
    .bind(limit)
    .fetch_all(pool)
    .await
    .context("Failed to list sync runs")?;

    rows.into_iter().map(from_row).collect()
}

fn from_row(row: sqlx::sqlite::SqliteRow) -> Result<SyncRun> {
    let status_text: String = row.try_get("status")?;
    let requested_text: Option<String> = row.try_get("resource_types_requested")?;
    let counters_text: Option<String> = row.try_get("type_counters")?;

    Ok(SyncRun {
        id: row.try_get("id")?,
        tenant_id: row.try_get("tenant_id")?,
        started_at: row.try_get("started_at")?,
        completed_at: row.try_get("completed_at")?,
        status: RunStatus::parse(&status_text).unwrap_or(RunStatus::Failed),
        resource_types_requested: requested_text
            .map(|t| serde_json::from_str(&t))
            .transpose()
            .context("Corrupt requested types")?,
        type_counters: counters_text
            .map(|t| serde_json::from_str(&t))
            .transpose()
            .context("Corrupt type counters")?
            .unwrap_or_default(),
        error_detail: row.try_get("error_detail")?,
    })
}
