//! Audit trail
//!
//! Every mutating action (push create/update, per-type disable during import)
//! is recorded once. Recording is fire-and-forget: a sink failure is logged
//! and swallowed, never surfaced to the operation being audited.

use async_trait::async_trait;
use chrono::Utc;
use log::warn;
use sqlx::SqlitePool;

/// One auditable event.
#[derive(Debug, Clone, Default)]
pub struct AuditEvent {
    pub tenant_id: Option<i64>,
    pub operation: String,
    pub action: String,
    pub status: String,
    pub resource_type: Option<String>,
    pub resource_id: Option<String>,
    pub resource_name: Option<String>,
    pub error_detail: Option<String>,
}

impl AuditEvent {
    pub fn new(operation: &str, action: &str, status: &str) -> Self {
        Self {
            operation: operation.to_string(),
            action: action.to_string(),
            status: status.to_string(),
            ..Default::default()
        }
    }

    pub fn tenant(mut self, tenant_id: i64) -> Self {
        self.tenant_id = Some(tenant_id);
        self
    }

    pub fn resource(mut self, resource_type: &str, id: Option<&str>, name: Option<&str>) -> Self {
        self.resource_type = Some(resource_type.to_string());
        self.resource_id = id.map(str::to_string);
        self.resource_name = name.map(str::to_string);
        self
    }

    pub fn error(mut self, detail: &str) -> Self {
        self.error_detail = Some(detail.to_string());
        self
    }
}

/// Sink consumed by the engines. Infallible by contract.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, event: AuditEvent);
}

/// Writes events to the local audit_logs table.
pub struct SqliteAuditSink {
    pool: SqlitePool,
}

impl SqliteAuditSink {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuditSink for SqliteAuditSink {
    async fn record(&self, event: AuditEvent) {
        let result = sqlx::query(
            "INSERT INTO audit_logs
             (tenant_id, timestamp, operation, action, status,
              resource_type, resource_id, resource_name, error_detail)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(event.tenant_id)
        .bind(Utc::now())
        .bind(&event.operation)
        .bind(&event.action)
        .bind(&event.status)
        .bind(&event.resource_type)
        .bind(&event.resource_id)
        .bind(&event.resource_name)
        .bind(&event.error_detail)
        .execute(&self.pool)
        .await;

        if let Err(err) = result {
            warn!("audit write failed ({} {}): {}", event.operation, event.action, err);
        }
    }
}

/// Discards everything. For tests and dry runs.
pub struct NoopAuditSink;

#[async_trait]
impl AuditSink for NoopAuditSink {
    async fn record(&self, _event: AuditEvent) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::Row;

    #[tokio::test]
    async fn test_sqlite_sink_writes_rows() {
        let pool = crate::config::connect_memory().await.unwrap();
        let sink = SqliteAuditSink::new(pool.clone());

        sink.record(
            AuditEvent::new("push_baseline", "CREATE", "SUCCESS")
                .tenant(1)
                .resource("rule_label", Some("42"), Some("L1")),
        )
        .await;

        let row = sqlx::query("SELECT operation, action, status, resource_id FROM audit_logs")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(row.get::<String, _>("operation"), "push_baseline");
        assert_eq!(row.get::<String, _>("action"), "CREATE");
        assert_eq!(row.get::<String, _>("resource_id"), "42");
    }
}
