//! Import execution
//!
//! One run fetches each requested resource type, upserts payloads into the
//! content cache with hash-based change detection, tombstones absent ids for
//! deletion-by-absence types, and records a SyncRun. A failure in one type
//! never aborts the run; only a tenant-level failure does.

use anyhow::{Context, Result, anyhow};
use chrono::Utc;
use futures::StreamExt;
use log::{info, warn};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crate::api::{ApiError, RemoteResourceSource, ResilienceConfig};
use crate::audit::{AuditEvent, AuditSink};
use crate::cancel::CancellationFlag;
use crate::config::repository::sync_runs::{RunStatus, SyncRun, TypeCounters};
use crate::config::repository::{disabled, resources, sync_runs};
use crate::document;
use crate::registry::{self, ResourceDef};
use sqlx::SqlitePool;

/// Called after each resource type completes: (type, done, total).
pub type ProgressCallback = Arc<dyn Fn(&str, usize, usize) + Send + Sync>;

/// Outcome of one type's fetch-and-upsert.
enum TypeOutcome {
    Counters(TypeCounters),
    /// Entitlement gap: disabled for future runs, zero counters recorded.
    Disabled(String),
    /// Transient or unexpected per-type failure, surfaced in counters.
    Errored(String),
    /// Tenant-level failure; aborts the whole run.
    Fatal(String),
    /// Cancelled before this type began; nothing recorded.
    Cancelled,
}

pub struct ImportEngine {
    pool: SqlitePool,
    source: Arc<dyn RemoteResourceSource>,
    audit: Arc<dyn AuditSink>,
    config: ResilienceConfig,
    cancel: CancellationFlag,
}

impl ImportEngine {
    pub fn new(
        pool: SqlitePool,
        source: Arc<dyn RemoteResourceSource>,
        audit: Arc<dyn AuditSink>,
        config: ResilienceConfig,
        cancel: CancellationFlag,
    ) -> Self {
        Self { pool, source, audit, config, cancel }
    }

    /// Run an import for one tenant. `resource_types` restricts the run to a
    /// subset; `None` means every registry type.
    pub async fn run(
        &self,
        tenant_id: i64,
        resource_types: Option<&[String]>,
        progress: Option<ProgressCallback>,
    ) -> Result<SyncRun> {
        let defs = requested_defs(resource_types)?;
        let run_id = sync_runs::start(&self.pool, tenant_id, resource_types).await?;
        let disabled_types = disabled::list(&self.pool, tenant_id).await?;

        let active: Vec<&ResourceDef> = defs
            .iter()
            .filter(|d| !disabled_types.contains(d.resource_type))
            .copied()
            .collect();
        let total = active.len();
        let done = AtomicUsize::new(0);
        let fatal_seen = AtomicBool::new(false);

        info!(
            "import: tenant {} — {} types requested, {} disabled",
            tenant_id,
            defs.len(),
            defs.len() - total
        );

        let results: Vec<(&ResourceDef, TypeOutcome)> = futures::stream::iter(
            active.iter().map(|def| {
                let done = &done;
                let fatal_seen = &fatal_seen;
                let progress = progress.clone();
                async move {
                    let outcome = if self.cancel.is_cancelled()
                        || fatal_seen.load(Ordering::SeqCst)
                    {
                        TypeOutcome::Cancelled
                    } else {
                        let outcome = self.import_type(tenant_id, def).await;
                        if matches!(outcome, TypeOutcome::Fatal(_)) {
                            fatal_seen.store(true, Ordering::SeqCst);
                        }
                        outcome
                    };
                    let finished = done.fetch_add(1, Ordering::SeqCst) + 1;
                    if let Some(cb) = progress.as_deref() {
                        cb(def.resource_type, finished, total);
                    }
                    (*def, outcome)
                }
            }),
        )
        .buffer_unordered(self.config.max_concurrent_types.max(1))
        .collect()
        .await;

        let mut counters: BTreeMap<String, TypeCounters> = BTreeMap::new();
        let mut errors: Vec<String> = Vec::new();
        let mut fatal: Option<String> = None;
        let mut attempted = 0usize;
        let mut errored_types = 0usize;

        for (def, outcome) in results {
            match outcome {
                TypeOutcome::Counters(c) => {
                    attempted += 1;
                    counters.insert(def.resource_type.to_string(), c);
                }
                TypeOutcome::Disabled(reason) => {
                    counters.insert(def.resource_type.to_string(), TypeCounters::default());
                    warn!("import: {} disabled — {}", def.resource_type, reason);
                }
                TypeOutcome::Errored(detail) => {
                    attempted += 1;
                    errored_types += 1;
                    counters.insert(
                        def.resource_type.to_string(),
                        TypeCounters { errored: 1, ..Default::default() },
                    );
                    errors.push(format!("{}: {}", def.resource_type, detail));
                }
                TypeOutcome::Fatal(detail) => {
                    fatal.get_or_insert(detail);
                }
                TypeOutcome::Cancelled => {}
            }
        }

        if let Some(detail) = fatal {
            sync_runs::finalize(&self.pool, run_id, RunStatus::Failed, &counters, Some(&detail))
                .await?;
            return Err(anyhow!("import aborted: {}", detail));
        }

        let status = if attempted > 0 && errored_types == attempted {
            RunStatus::Failed
        } else if errored_types > 0 {
            RunStatus::Partial
        } else {
            RunStatus::Success
        };

        let error_detail = if errors.is_empty() { None } else { Some(errors.join("\n")) };
        let run = sync_runs::finalize(
            &self.pool,
            run_id,
            status,
            &counters,
            error_detail.as_deref(),
        )
        .await?;

        let totals = run.totals();
        info!(
            "import: tenant {} {} — fetched {}, written {}, unchanged {}, deleted {}, errored {}",
            tenant_id,
            status.as_str(),
            totals.fetched,
            totals.written,
            totals.unchanged,
            totals.deleted,
            totals.errored
        );
        Ok(run)
    }

    /// Explicit reset of auto-disabled types for a tenant.
    pub async fn clear_disabled(&self, tenant_id: i64) -> Result<u64> {
        disabled::clear_all(&self.pool, tenant_id).await
    }

    async fn import_type(&self, tenant_id: i64, def: &ResourceDef) -> TypeOutcome {
        let listing = tokio::time::timeout(self.config.request_timeout, self.source.list(def))
            .await
            .unwrap_or_else(|_| {
                Err(ApiError::Transient(format!(
                    "list {} timed out after {:?}",
                    def.resource_type, self.config.request_timeout
                )))
            });

        let records = match listing {
            Ok(records) => records,
            Err(err) if err.is_entitlement() => {
                let reason = err.to_string();
                if let Err(db_err) =
                    disabled::disable(&self.pool, tenant_id, def.resource_type, &reason).await
                {
                    return TypeOutcome::Errored(db_err.to_string());
                }
                self.audit
                    .record(
                        AuditEvent::new("import_config", "DISABLE", "N/A")
                            .tenant(tenant_id)
                            .resource(def.resource_type, None, None)
                            .error(&reason),
                    )
                    .await;
                return TypeOutcome::Disabled(reason);
            }
            Err(ApiError::Fatal(detail)) => return TypeOutcome::Fatal(detail),
            Err(err) => return TypeOutcome::Errored(err.to_string()),
        };

        match self.upsert_records(tenant_id, def, records).await {
            Ok(counters) => TypeOutcome::Counters(counters),
            Err(err) => TypeOutcome::Errored(err.to_string()),
        }
    }

    async fn upsert_records(
        &self,
        tenant_id: i64,
        def: &ResourceDef,
        records: Vec<serde_json::Value>,
    ) -> Result<TypeCounters> {
        let now = Utc::now();
        let mut counters = TypeCounters::default();
        let mut present_ids: HashSet<String> = HashSet::new();

        for record in records {
            if !record.is_object() {
                continue;
            }
            let Some(remote_id) = document::remote_id(def, &record) else {
                continue;
            };
            counters.fetched += 1;
            present_ids.insert(remote_id.clone());

            let name = document::natural_key(def, &record);
            let outcome = resources::upsert(
                &self.pool,
                tenant_id,
                def.resource_type,
                &remote_id,
                name.as_deref(),
                &record,
                now,
            )
            .await
            .with_context(|| format!("upsert {} {}", def.resource_type, remote_id))?;

            match outcome {
                resources::UpsertOutcome::Written { .. } => counters.written += 1,
                resources::UpsertOutcome::Unchanged => counters.unchanged += 1,
            }
        }

        if def.deletion_by_absence {
            counters.deleted =
                resources::mark_missing(&self.pool, tenant_id, def.resource_type, &present_ids)
                    .await?;
        }

        Ok(counters)
    }
}

fn requested_defs(resource_types: Option<&[String]>) -> Result<Vec<&'static ResourceDef>> {
    match resource_types {
        None => Ok(registry::RESOURCE_DEFINITIONS.iter().collect()),
        Some(requested) => requested
            .iter()
            .map(|rtype| {
                registry::lookup(rtype)
                    .ok_or_else(|| anyhow!("unknown resource type '{}'", rtype))
            })
            .collect(),
    }
}
