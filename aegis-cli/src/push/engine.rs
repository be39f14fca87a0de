//! Push execution
//!
//! Ordered multi-pass loop over the classified baseline. Entries whose
//! references are not yet mapped are requeued instead of pushed; passes
//! repeat until everything resolves or the pending set stops shrinking.
//! The pending-set check is the primary termination condition; the pass cap
//! bounds the loop if a classification bug ever reintroduces an entry.

use anyhow::{Context, Result, anyhow};
use log::{debug, info, warn};
use serde_json::{Value, json};
use sqlx::SqlitePool;
use std::collections::BTreeSet;
use std::sync::Arc;

use super::classify::{self, Classification, PlanAction, PlannedPush};
use super::remap::{self, IdentifierMap};
use super::report::PushReport;
use super::{PushOutcome, PushRecord};
use crate::api::{ApiError, RemoteResourceSource, ResilienceConfig};
use crate::audit::{AuditEvent, AuditSink};
use crate::cancel::CancellationFlag;
use crate::config::repository::resources;
use crate::document;
use crate::import::ImportEngine;
use crate::registry::ResourceDef;
use crate::snapshot::BaselineEnvelope;
use crate::snapshot::envelope::BaselineEntry;

/// Safety bound on push passes. Stabilization normally terminates the loop
/// long before this.
const MAX_PASSES: usize = 10;

/// An entry still awaiting push, with why it was requeued last.
struct PendingItem {
    plan: PlannedPush,
    unresolved: Vec<String>,
    last_error: Option<String>,
}

enum AttemptOutcome {
    Done(PushRecord),
    Requeue { unresolved: Vec<String>, error: Option<String> },
}

pub struct PushEngine {
    pool: SqlitePool,
    source: Arc<dyn RemoteResourceSource>,
    audit: Arc<dyn AuditSink>,
    config: ResilienceConfig,
    cancel: CancellationFlag,
}

impl PushEngine {
    pub fn new(
        pool: SqlitePool,
        source: Arc<dyn RemoteResourceSource>,
        audit: Arc<dyn AuditSink>,
        config: ResilienceConfig,
        cancel: CancellationFlag,
    ) -> Self {
        Self { pool, source, audit, config, cancel }
    }

    /// Classification only: fresh target import plus Step 2, no writes to the
    /// target. Backs the CLI dry run.
    pub async fn plan(
        &self,
        tenant_id: i64,
        envelope: &BaselineEnvelope,
    ) -> Result<Classification> {
        envelope
            .validate()
            .map_err(|e| anyhow!("malformed baseline envelope: {}", e))?;
        self.import_target(tenant_id).await?;
        let index = classify::build_target_index(&self.pool, tenant_id).await?;
        let mut ids = IdentifierMap::new();
        Ok(classify::classify(envelope, &index, &mut ids))
    }

    /// Full push run: import, classify, ordered retried passes, merges,
    /// report.
    pub async fn run(&self, tenant_id: i64, envelope: &BaselineEnvelope) -> Result<PushReport> {
        envelope
            .validate()
            .map_err(|e| anyhow!("malformed baseline envelope: {}", e))?;

        info!(
            "push: tenant {} — {} baseline entries across {} types",
            tenant_id,
            envelope.entry_count(),
            envelope.resources.len()
        );

        // Step 1 — classification must never run against stale data.
        self.import_target(tenant_id).await?;

        // Step 2 — classify against the fresh target index.
        let index = classify::build_target_index(&self.pool, tenant_id).await?;
        let mut ids = IdentifierMap::new();
        let classification = classify::classify(envelope, &index, &mut ids);
        let mut records = classification.terminal;

        // Step 3 — ordered multi-pass push over the planned entries.
        let mut pending: Vec<PendingItem> = classification
            .planned
            .into_iter()
            .map(|plan| PendingItem { plan, unresolved: Vec::new(), last_error: None })
            .collect();

        let mut passes = 0;
        while !pending.is_empty() && passes < MAX_PASSES {
            if self.cancel.is_cancelled() {
                break;
            }
            passes += 1;
            let before = pending.len();
            let mut requeued: Vec<PendingItem> = Vec::new();
            let mut halted = false;
            let mut current_type = "";

            for mut item in pending {
                // Cooperative cancellation: the type in flight completes,
                // no further type begins.
                if item.plan.def.resource_type != current_type {
                    current_type = item.plan.def.resource_type;
                    if self.cancel.is_cancelled() {
                        halted = true;
                    }
                }
                if halted {
                    requeued.push(item);
                    continue;
                }

                match self.attempt(tenant_id, &item.plan, &mut ids).await? {
                    AttemptOutcome::Done(record) => records.push(record),
                    AttemptOutcome::Requeue { unresolved, error } => {
                        item.unresolved = unresolved;
                        item.last_error = error;
                        requeued.push(item);
                    }
                }
            }

            pending = requeued;
            if halted {
                break;
            }
            if pending.len() >= before {
                debug!("push: pass {} made no progress ({} pending)", passes, pending.len());
                break;
            }
        }

        // Survivors of the loop are final failures.
        for item in pending {
            let detail = if self.cancel.is_cancelled() {
                "cancelled before attempt".to_string()
            } else if !item.unresolved.is_empty() {
                format!(
                    "unresolved reference to source id(s) {} after {} passes",
                    item.unresolved.join(", "),
                    passes
                )
            } else {
                item.last_error
                    .unwrap_or_else(|| "no progress after retry passes".to_string())
            };
            records.push(
                PushRecord::failed(item.plan.def.resource_type, &item.plan.source_key, &detail)
                    .source_id(item.plan.source_id.clone()),
            );
        }

        // Step 4 — merge-only singletons: additions only, never removal.
        for (def, entry) in classification.merges {
            if self.cancel.is_cancelled() {
                records.push(PushRecord::failed(
                    def.resource_type,
                    def.resource_type,
                    "cancelled before attempt",
                ));
                continue;
            }
            records.push(self.push_merge(tenant_id, def, &entry).await?);
        }

        // Step 5 — report; the cache mirrors the target, so re-import what
        // this run mutated.
        let report = PushReport::new(records, passes);
        if report.needs_activation && !self.cancel.is_cancelled() {
            let mutated: Vec<String> = report
                .records
                .iter()
                .filter(|r| r.outcome.is_mutation())
                .map(|r| r.resource_type.clone())
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect();
            let import = self.import_engine();
            if let Err(err) = import.run(tenant_id, Some(&mutated), None).await {
                warn!("post-push re-import failed: {}", err);
            }
        }

        let totals = report.totals();
        info!(
            "push: tenant {} done in {} passes — {} created, {} updated, {} skipped, {} failed",
            tenant_id,
            report.passes,
            totals.created,
            totals.updated,
            totals.skipped_identical + totals.skipped_predefined + totals.skipped_type,
            totals.failed
        );
        Ok(report)
    }

    fn import_engine(&self) -> ImportEngine {
        ImportEngine::new(
            self.pool.clone(),
            self.source.clone(),
            self.audit.clone(),
            self.config.clone(),
            self.cancel.clone(),
        )
    }

    async fn import_target(&self, tenant_id: i64) -> Result<()> {
        self.import_engine()
            .run(tenant_id, None, None)
            .await
            .context("target import before push failed")?;
        Ok(())
    }

    /// One create/update attempt. Returns `Requeue` for unresolved references
    /// and transient failures; everything else is terminal.
    async fn attempt(
        &self,
        tenant_id: i64,
        plan: &PlannedPush,
        ids: &mut IdentifierMap,
    ) -> Result<AttemptOutcome> {
        let stripped = document::strip_readonly(&plan.entry.raw_config);
        let rewritten = remap::rewrite_references(plan.def, &stripped, ids);
        if !rewritten.unresolved.is_empty() {
            debug!(
                "push: requeueing {} '{}' — unmapped reference(s) {}",
                plan.def.resource_type,
                plan.source_key,
                rewritten.unresolved.join(", ")
            );
            return Ok(AttemptOutcome::Requeue {
                unresolved: rewritten.unresolved,
                error: None,
            });
        }
        let payload = rewritten.payload;

        match &plan.action {
            PlanAction::Create => match self.call_create(plan.def, &payload).await {
                Ok(created) => {
                    let target_id = document::remote_id(plan.def, &created);
                    if let (Some(sid), Some(tid)) = (&plan.source_id, &target_id) {
                        ids.register(sid, tid);
                    }
                    self.audit_push(tenant_id, plan, "CREATE", "SUCCESS", None).await;
                    Ok(AttemptOutcome::Done(
                        PushRecord::new(plan.def.resource_type, &plan.source_key, PushOutcome::Created)
                            .source_id(plan.source_id.clone())
                            .target_id(target_id),
                    ))
                }
                Err(ApiError::Conflict(detail)) => {
                    // Race since the target import: a same-named resource
                    // appeared. Secondary path; classification normally
                    // resolves these.
                    warn!(
                        "push: create conflict for {} '{}', falling back to name lookup ({})",
                        plan.def.resource_type, plan.source_key, detail
                    );
                    self.conflict_fallback(tenant_id, plan, &payload, ids).await
                }
                Err(ApiError::Transient(detail)) => {
                    Ok(AttemptOutcome::Requeue { unresolved: Vec::new(), error: Some(detail) })
                }
                Err(ApiError::Fatal(detail)) => Err(anyhow!("push aborted: {}", detail)),
                Err(err) => {
                    let detail = err.to_string();
                    self.audit_push(tenant_id, plan, "CREATE", "FAILURE", Some(&detail)).await;
                    Ok(AttemptOutcome::Done(
                        PushRecord::failed(plan.def.resource_type, &plan.source_key, &detail)
                            .source_id(plan.source_id.clone()),
                    ))
                }
            },
            PlanAction::Update { target_id } => {
                match self.call_update(plan.def, target_id, &payload).await {
                    Ok(()) => {
                        self.audit_push(tenant_id, plan, "UPDATE", "SUCCESS", None).await;
                        Ok(AttemptOutcome::Done(
                            PushRecord::new(plan.def.resource_type, &plan.source_key, PushOutcome::Updated)
                                .source_id(plan.source_id.clone())
                                .target_id(Some(target_id.clone())),
                        ))
                    }
                    Err(ApiError::Transient(detail)) => {
                        Ok(AttemptOutcome::Requeue { unresolved: Vec::new(), error: Some(detail) })
                    }
                    Err(ApiError::Fatal(detail)) => Err(anyhow!("push aborted: {}", detail)),
                    Err(err) => {
                        let detail = err.to_string();
                        self.audit_push(tenant_id, plan, "UPDATE", "FAILURE", Some(&detail)).await;
                        Ok(AttemptOutcome::Done(
                            PushRecord::failed(plan.def.resource_type, &plan.source_key, &detail)
                                .source_id(plan.source_id.clone()),
                        ))
                    }
                }
            }
        }
    }

    /// 409 fallback: locate the same-named target resource and update it.
    async fn conflict_fallback(
        &self,
        tenant_id: i64,
        plan: &PlannedPush,
        payload: &Value,
        ids: &mut IdentifierMap,
    ) -> Result<AttemptOutcome> {
        let found = self.find_by_key(plan.def, &plan.source_key).await;
        let Some(found_id) = found else {
            let detail = "conflict on create, but no same-named target resource found";
            self.audit_push(tenant_id, plan, "CREATE", "FAILURE", Some(detail)).await;
            return Ok(AttemptOutcome::Done(
                PushRecord::failed(plan.def.resource_type, &plan.source_key, detail)
                    .source_id(plan.source_id.clone()),
            ));
        };

        if let Some(sid) = &plan.source_id {
            ids.register(sid, &found_id);
        }

        match self.call_update(plan.def, &found_id, payload).await {
            Ok(()) => {
                self.audit_push(tenant_id, plan, "UPDATE", "SUCCESS", None).await;
                Ok(AttemptOutcome::Done(
                    PushRecord::new(plan.def.resource_type, &plan.source_key, PushOutcome::Updated)
                        .source_id(plan.source_id.clone())
                        .target_id(Some(found_id)),
                ))
            }
            Err(err) => {
                let detail = format!("update after conflict failed: {}", err);
                self.audit_push(tenant_id, plan, "UPDATE", "FAILURE", Some(&detail)).await;
                Ok(AttemptOutcome::Done(
                    PushRecord::failed(plan.def.resource_type, &plan.source_key, &detail)
                        .source_id(plan.source_id.clone()),
                ))
            }
        }
    }

    /// Merge-only singleton: entries present in baseline but absent from the
    /// target are added; nothing is ever removed.
    async fn push_merge(
        &self,
        tenant_id: i64,
        def: &'static ResourceDef,
        entry: &BaselineEntry,
    ) -> Result<PushRecord> {
        let field = def
            .merge_field
            .ok_or_else(|| anyhow!("{} routed to merge without a merge field", def.resource_type))?;

        let baseline_items = string_list(&entry.raw_config, field);
        if baseline_items.is_empty() {
            return Ok(PushRecord::new(
                def.resource_type,
                def.resource_type,
                PushOutcome::SkippedIdentical,
            ));
        }

        let live = resources::by_type(&self.pool, tenant_id, def.resource_type).await?;
        let (target_id, target_items) = match live.first() {
            Some(row) => (Some(row.remote_id.clone()), string_list(&row.payload, field)),
            None => (None, Vec::new()),
        };

        let additions: Vec<String> = baseline_items
            .iter()
            .filter(|item| !target_items.contains(item))
            .cloned()
            .collect();
        if additions.is_empty() && target_id.is_some() {
            return Ok(PushRecord::new(
                def.resource_type,
                def.resource_type,
                PushOutcome::SkippedIdentical,
            )
            .target_id(target_id));
        }

        let mut merged = target_items;
        merged.extend(additions);
        let payload = json!({ field: merged });

        let outcome = match &target_id {
            Some(id) => self.call_update(def, id, &payload).await.map(|_| {
                PushRecord::new(def.resource_type, def.resource_type, PushOutcome::Updated)
                    .target_id(target_id.clone())
            }),
            None => self.call_create(def, &payload).await.map(|created| {
                PushRecord::new(def.resource_type, def.resource_type, PushOutcome::Created)
                    .target_id(document::remote_id(def, &created))
            }),
        };

        match outcome {
            Ok(record) => {
                let action = if record.outcome == PushOutcome::Created { "CREATE" } else { "UPDATE" };
                self.audit
                    .record(
                        AuditEvent::new("push_baseline", action, "SUCCESS")
                            .tenant(tenant_id)
                            .resource(def.resource_type, record.target_id.as_deref(), None),
                    )
                    .await;
                Ok(record)
            }
            Err(ApiError::Fatal(detail)) => Err(anyhow!("push aborted: {}", detail)),
            Err(err) => {
                let detail = err.to_string();
                self.audit
                    .record(
                        AuditEvent::new("push_baseline", "UPDATE", "FAILURE")
                            .tenant(tenant_id)
                            .resource(def.resource_type, target_id.as_deref(), None)
                            .error(&detail),
                    )
                    .await;
                Ok(PushRecord::failed(def.resource_type, def.resource_type, &detail))
            }
        }
    }

    async fn call_create(&self, def: &ResourceDef, payload: &Value) -> Result<Value, ApiError> {
        tokio::time::timeout(self.config.request_timeout, self.source.create(def, payload))
            .await
            .unwrap_or_else(|_| {
                Err(ApiError::Transient(format!(
                    "create {} timed out after {:?}",
                    def.resource_type, self.config.request_timeout
                )))
            })
    }

    async fn call_update(
        &self,
        def: &ResourceDef,
        id: &str,
        payload: &Value,
    ) -> Result<(), ApiError> {
        tokio::time::timeout(self.config.request_timeout, self.source.update(def, id, payload))
            .await
            .unwrap_or_else(|_| {
                Err(ApiError::Transient(format!(
                    "update {} timed out after {:?}",
                    def.resource_type, self.config.request_timeout
                )))
            })
    }

    /// Name lookup against the live target (not the cache — conflicts mean
    /// the cache is already behind).
    async fn find_by_key(&self, def: &'static ResourceDef, key: &str) -> Option<String> {
        let listing = tokio::time::timeout(self.config.request_timeout, self.source.list(def))
            .await
            .ok()?
            .ok()?;
        listing.iter().find_map(|item| {
            (document::natural_key(def, item).as_deref() == Some(key))
                .then(|| document::remote_id(def, item))
                .flatten()
        })
    }

    async fn audit_push(
        &self,
        tenant_id: i64,
        plan: &PlannedPush,
        action: &str,
        status: &str,
        error: Option<&str>,
    ) {
        let mut event = AuditEvent::new("push_baseline", action, status)
            .tenant(tenant_id)
            .resource(
                plan.def.resource_type,
                plan.source_id.as_deref(),
                Some(&plan.source_key),
            );
        if let Some(detail) = error {
            event = event.error(detail);
        }
        self.audit.record(event).await;
    }
}

fn string_list(payload: &Value, field: &str) -> Vec<String> {
    payload
        .get(field)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::NoopAuditSink;
    use crate::registry;
    use crate::snapshot::envelope::BaselineEntry;
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::{BTreeMap, HashMap, VecDeque};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicI64, Ordering};

    /// Stateful mock target: listings mirror created/updated resources so the
    /// engine's imports observe its own pushes, like a real tenant would.
    struct MockSource {
        /// Live listing per type.
        state: Mutex<HashMap<String, Vec<Value>>>,
        /// One-shot listings consumed before `state` is consulted.
        staged_listings: Mutex<HashMap<String, VecDeque<Vec<Value>>>>,
        /// Failures popped per create call, per type.
        create_failures: Mutex<HashMap<String, VecDeque<ApiError>>>,
        created: Mutex<Vec<(String, Value)>>,
        updated: Mutex<Vec<(String, String, Value)>>,
        next_id: AtomicI64,
    }

    impl MockSource {
        fn new() -> Self {
            Self {
                state: Mutex::new(HashMap::new()),
                staged_listings: Mutex::new(HashMap::new()),
                create_failures: Mutex::new(HashMap::new()),
                created: Mutex::new(Vec::new()),
                updated: Mutex::new(Vec::new()),
                next_id: AtomicI64::new(9000),
            }
        }

        fn seed(&self, rtype: &str, items: Vec<Value>) {
            self.state.lock().unwrap().insert(rtype.to_string(), items);
        }

        fn stage_listing(&self, rtype: &str, items: Vec<Value>) {
            self.staged_listings
                .lock()
                .unwrap()
                .entry(rtype.to_string())
                .or_default()
                .push_back(items);
        }

        fn fail_next_create(&self, rtype: &str, err: ApiError) {
            self.create_failures
                .lock()
                .unwrap()
                .entry(rtype.to_string())
                .or_default()
                .push_back(err);
        }

        fn created_of(&self, rtype: &str) -> Vec<Value> {
            self.created
                .lock()
                .unwrap()
                .iter()
                .filter(|(t, _)| t == rtype)
                .map(|(_, v)| v.clone())
                .collect()
        }

        fn updates_of(&self, rtype: &str) -> Vec<(String, Value)> {
            self.updated
                .lock()
                .unwrap()
                .iter()
                .filter(|(t, _, _)| t == rtype)
                .map(|(_, id, v)| (id.clone(), v.clone()))
                .collect()
        }
    }

    #[async_trait]
    impl RemoteResourceSource for MockSource {
        async fn list(&self, def: &ResourceDef) -> Result<Vec<Value>, ApiError> {
            if let Some(queue) = self.staged_listings.lock().unwrap().get_mut(def.resource_type) {
                if let Some(items) = queue.pop_front() {
                    return Ok(items);
                }
            }
            Ok(self
                .state
                .lock()
                .unwrap()
                .get(def.resource_type)
                .cloned()
                .unwrap_or_default())
        }

        async fn create(&self, def: &ResourceDef, payload: &Value) -> Result<Value, ApiError> {
            if let Some(queue) = self.create_failures.lock().unwrap().get_mut(def.resource_type) {
                if let Some(err) = queue.pop_front() {
                    return Err(err);
                }
            }
            let id = self.next_id.fetch_add(1, Ordering::SeqCst);
            let mut stored = payload.clone();
            stored
                .as_object_mut()
                .expect("create payload must be an object")
                .insert("id".to_string(), json!(id));
            self.state
                .lock()
                .unwrap()
                .entry(def.resource_type.to_string())
                .or_default()
                .push(stored.clone());
            self.created
                .lock()
                .unwrap()
                .push((def.resource_type.to_string(), stored.clone()));
            Ok(stored)
        }

        async fn update(&self, def: &ResourceDef, id: &str, payload: &Value) -> Result<(), ApiError> {
            let mut stored = payload.clone();
            if let Some(obj) = stored.as_object_mut() {
                if let Ok(n) = id.parse::<i64>() {
                    obj.insert("id".to_string(), json!(n));
                } else {
                    obj.insert("id".to_string(), json!(id));
                }
            }
            if let Some(items) = self.state.lock().unwrap().get_mut(def.resource_type) {
                for item in items.iter_mut() {
                    if document::remote_id(def, item).as_deref() == Some(id) {
                        *item = stored.clone();
                    }
                }
            }
            self.updated
                .lock()
                .unwrap()
                .push((def.resource_type.to_string(), id.to_string(), payload.clone()));
            Ok(())
        }
    }

    fn entry(id: i64, name: &str, raw: Value) -> BaselineEntry {
        BaselineEntry {
            id: Some(id.to_string()),
            name: Some(name.to_string()),
            raw_config: raw,
        }
    }

    fn envelope(groups: Vec<(&str, Vec<BaselineEntry>)>) -> BaselineEnvelope {
        let mut resources = BTreeMap::new();
        for (rtype, entries) in groups {
            resources.insert(rtype.to_string(), entries);
        }
        BaselineEnvelope {
            product: registry::PRODUCT.to_string(),
            snapshot_name: None,
            comment: None,
            resource_count: 0,
            resources,
        }
    }

    async fn setup(source: Arc<MockSource>) -> (SqlitePool, i64, PushEngine) {
        let pool = crate::config::connect_memory().await.unwrap();
        let tenant = crate::config::repository::tenants::add(&pool, "target", "https://t", "swg")
            .await
            .unwrap();
        let engine = PushEngine::new(
            pool.clone(),
            source,
            Arc::new(NoopAuditSink),
            ResilienceConfig::disabled(),
            CancellationFlag::new(),
        );
        (pool, tenant, engine)
    }

    #[tokio::test]
    async fn test_end_to_end_label_then_referencing_rule() {
        let source = Arc::new(MockSource::new());
        let (pool, tenant, engine) = setup(source.clone()).await;

        let baseline = envelope(vec![
            (
                "rule_label",
                vec![entry(101, "L1", json!({"id": 101, "name": "L1"}))],
            ),
            (
                "firewall_rule",
                vec![entry(
                    201,
                    "needs-label",
                    json!({"id": 201, "name": "needs-label", "action": "ALLOW",
                           "labels": [{"id": 101}]}),
                )],
            ),
        ]);

        let report = engine.run(tenant, &baseline).await.unwrap();
        let totals = report.totals();
        assert_eq!(totals.created, 2);
        assert_eq!(totals.failed, 0);
        assert_eq!(report.passes, 1);
        assert!(report.needs_activation);

        // The rule's label reference was rewritten to the target-assigned id.
        let label_id = source.created_of("rule_label")[0]["id"].as_i64().unwrap();
        let rule = &source.created_of("firewall_rule")[0];
        assert_eq!(rule["labels"][0]["id"].as_i64().unwrap(), label_id);
        // Read-only fields never reach the wire.
        assert!(rule.get("lastModifiedTime").is_none());

        // Pushes trigger a re-import: the cache now mirrors the target.
        let cached = resources::by_type(&pool, tenant, "firewall_rule").await.unwrap();
        assert_eq!(cached.len(), 1);
        assert_eq!(cached[0].remote_id, label_id.checked_add(1).unwrap().to_string());
    }

    #[tokio::test]
    async fn test_requeued_reference_resolves_on_second_pass() {
        let source = Arc::new(MockSource::new());
        // First create of a rule_label fails transiently, so L1 lands in
        // pass 2 and the referencing rule must requeue exactly once.
        source.fail_next_create("rule_label", ApiError::Transient("HTTP 503".into()));
        let (_pool, tenant, engine) = setup(source.clone()).await;

        let baseline = envelope(vec![
            (
                "rule_label",
                vec![
                    entry(101, "L1", json!({"id": 101, "name": "L1"})),
                    entry(102, "L2", json!({"id": 102, "name": "L2"})),
                ],
            ),
            (
                "firewall_rule",
                vec![entry(
                    201,
                    "needs-label",
                    json!({"id": 201, "name": "needs-label", "labels": [{"id": 101}]}),
                )],
            ),
        ]);

        let report = engine.run(tenant, &baseline).await.unwrap();
        let totals = report.totals();
        assert_eq!(totals.created, 3);
        assert_eq!(totals.failed, 0);
        assert_eq!(report.passes, 2);

        let l1_id = source
            .created_of("rule_label")
            .iter()
            .find(|v| v["name"] == "L1")
            .unwrap()["id"]
            .as_i64()
            .unwrap();
        let rule = &source.created_of("firewall_rule")[0];
        assert_eq!(rule["labels"][0]["id"].as_i64().unwrap(), l1_id);
    }

    #[tokio::test]
    async fn test_missing_reference_stabilizes_as_failed() {
        let source = Arc::new(MockSource::new());
        let (_pool, tenant, engine) = setup(source.clone()).await;

        let baseline = envelope(vec![(
            "firewall_rule",
            vec![entry(
                201,
                "dangling",
                json!({"id": 201, "name": "dangling", "labels": [{"id": 999}]}),
            )],
        )]);

        // The loop must terminate even though the reference can never resolve.
        let report = engine.run(tenant, &baseline).await.unwrap();
        assert_eq!(report.totals().failed, 1);
        assert_eq!(report.totals().created, 0);

        let failed = report.failed();
        let detail = failed[0].error_detail.as_deref().unwrap();
        assert!(detail.contains("unresolved reference"), "got: {}", detail);
        assert!(detail.contains("999"));
        assert!(source.created_of("firewall_rule").is_empty());
    }

    #[tokio::test]
    async fn test_conflict_falls_back_to_name_lookup_update() {
        let source = Arc::new(MockSource::new());
        // The import sees an empty target, but by push time a same-named
        // label exists: create conflicts, fallback finds and updates it.
        source.seed("rule_label", vec![json!({"id": 9100, "name": "L1", "color": "OLD"})]);
        source.stage_listing("rule_label", vec![]);
        source.fail_next_create("rule_label", ApiError::Conflict("already exists".into()));
        let (_pool, tenant, engine) = setup(source.clone()).await;

        let baseline = envelope(vec![(
            "rule_label",
            vec![entry(101, "L1", json!({"id": 101, "name": "L1", "color": "NEW"}))],
        )]);

        let report = engine.run(tenant, &baseline).await.unwrap();
        let totals = report.totals();
        assert_eq!(totals.updated, 1);
        assert_eq!(totals.failed, 0);

        let updates = source.updates_of("rule_label");
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].0, "9100");
        assert_eq!(updates[0].1["color"], "NEW");
    }

    #[tokio::test]
    async fn test_identical_entry_makes_no_api_call() {
        let source = Arc::new(MockSource::new());
        source.seed(
            "rule_label",
            vec![json!({"id": 9100, "name": "L1", "color": "RED", "lastModifiedTime": 5})],
        );
        let (_pool, tenant, engine) = setup(source.clone()).await;

        let baseline = envelope(vec![(
            "rule_label",
            vec![entry(
                101,
                "L1",
                json!({"id": 101, "name": "L1", "color": "RED", "lastModifiedTime": 99}),
            )],
        )]);

        let report = engine.run(tenant, &baseline).await.unwrap();
        assert_eq!(report.totals().skipped_identical, 1);
        assert!(!report.needs_activation);
        assert!(source.created_of("rule_label").is_empty());
        assert!(source.updates_of("rule_label").is_empty());
    }

    #[tokio::test]
    async fn test_changed_entry_updates_matched_target() {
        let source = Arc::new(MockSource::new());
        source.seed("rule_label", vec![json!({"id": 9100, "name": "L1", "color": "BLUE"})]);
        let (_pool, tenant, engine) = setup(source.clone()).await;

        let baseline = envelope(vec![(
            "rule_label",
            vec![entry(101, "L1", json!({"id": 101, "name": "L1", "color": "RED"}))],
        )]);

        let report = engine.run(tenant, &baseline).await.unwrap();
        assert_eq!(report.totals().updated, 1);

        let updates = source.updates_of("rule_label");
        assert_eq!(updates[0].0, "9100");
        assert_eq!(updates[0].1["color"], "RED");
    }

    #[tokio::test]
    async fn test_predefined_entry_is_never_pushed() {
        let source = Arc::new(MockSource::new());
        let (_pool, tenant, engine) = setup(source.clone()).await;

        let baseline = envelope(vec![(
            "dlp_engine",
            vec![entry(
                7,
                "PCI",
                json!({"id": 7, "name": "PCI", "threshold": 42}),
            )],
        )]);

        let report = engine.run(tenant, &baseline).await.unwrap();
        assert_eq!(report.totals().skipped_predefined, 1);
        assert!(source.created_of("dlp_engine").is_empty());
    }

    #[tokio::test]
    async fn test_allowlist_merge_adds_without_removing() {
        let source = Arc::new(MockSource::new());
        source.seed(
            "allowlist",
            vec![json!({"id": 1, "allowlistUrls": ["b.com", "c.com"]})],
        );
        let (_pool, tenant, engine) = setup(source.clone()).await;

        let baseline = envelope(vec![(
            "allowlist",
            vec![BaselineEntry {
                id: Some("1".to_string()),
                name: None,
                raw_config: json!({"id": 1, "allowlistUrls": ["a.com", "b.com"]}),
            }],
        )]);

        let report = engine.run(tenant, &baseline).await.unwrap();
        assert_eq!(report.totals().updated, 1);

        let updates = source.updates_of("allowlist");
        assert_eq!(updates.len(), 1);
        let merged: Vec<&str> = updates[0].1["allowlistUrls"]
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_str().unwrap())
            .collect();
        // c.com preserved, a.com added, b.com not duplicated.
        assert_eq!(merged, vec!["b.com", "c.com", "a.com"]);
    }

    #[tokio::test]
    async fn test_merge_with_no_additions_is_skipped() {
        let source = Arc::new(MockSource::new());
        source.seed(
            "allowlist",
            vec![json!({"id": 1, "allowlistUrls": ["b.com", "c.com"]})],
        );
        let (_pool, tenant, engine) = setup(source.clone()).await;

        let baseline = envelope(vec![(
            "allowlist",
            vec![BaselineEntry {
                id: Some("1".to_string()),
                name: None,
                raw_config: json!({"id": 1, "allowlistUrls": ["b.com"]}),
            }],
        )]);

        let report = engine.run(tenant, &baseline).await.unwrap();
        assert_eq!(report.totals().skipped_identical, 1);
        assert!(source.updates_of("allowlist").is_empty());
    }

    #[tokio::test]
    async fn test_malformed_envelope_is_fatal() {
        let source = Arc::new(MockSource::new());
        let (_pool, tenant, engine) = setup(source).await;

        let mut bad = envelope(vec![]);
        bad.product = "ztna".to_string();
        let err = engine.run(tenant, &bad).await.unwrap_err();
        assert!(err.to_string().contains("malformed baseline envelope"));
    }

    #[tokio::test]
    async fn test_cancelled_run_pushes_nothing_and_reports_everything() {
        let source = Arc::new(MockSource::new());
        let pool = crate::config::connect_memory().await.unwrap();
        let tenant = crate::config::repository::tenants::add(&pool, "target", "https://t", "swg")
            .await
            .unwrap();
        let cancel = CancellationFlag::new();
        cancel.cancel();
        let engine = PushEngine::new(
            pool,
            source.clone(),
            Arc::new(NoopAuditSink),
            ResilienceConfig::disabled(),
            cancel,
        );

        let baseline = envelope(vec![(
            "rule_label",
            vec![entry(101, "L1", json!({"id": 101, "name": "L1"}))],
        )]);

        let report = engine.run(tenant, &baseline).await.unwrap();
        assert_eq!(report.records.len(), 1);
        assert_eq!(report.totals().failed, 1);
        assert!(
            report.failed()[0]
                .error_detail
                .as_deref()
                .unwrap()
                .contains("cancelled")
        );
        assert!(source.created_of("rule_label").is_empty());
    }

    #[tokio::test]
    async fn test_plan_is_a_dry_run() {
        let source = Arc::new(MockSource::new());
        let (_pool, tenant, engine) = setup(source.clone()).await;

        let baseline = envelope(vec![(
            "rule_label",
            vec![entry(101, "L1", json!({"id": 101, "name": "L1"}))],
        )]);

        let plan = engine.plan(tenant, &baseline).await.unwrap();
        assert_eq!(plan.planned.len(), 1);
        assert!(source.created_of("rule_label").is_empty());
    }
}
