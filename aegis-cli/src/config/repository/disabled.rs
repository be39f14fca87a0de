//! Disabled resource types
//!
//! A type that returned an authorization failure is excluded from subsequent
//! imports for that tenant until explicitly reset. Set on failure, cleared
//! only by reset — reads always go through these lookups.

use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::{Row, SqlitePool};
use std::collections::HashSet;

/// Record a type as disabled for a tenant. Idempotent.
pub async fn disable(
    pool: &SqlitePool,
    tenant_id: i64,
    resource_type: &str,
    reason: &str,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO disabled_resource_types (tenant_id, resource_type, reason, disabled_at)
         VALUES (?, ?, ?, ?)
         ON CONFLICT(tenant_id, resource_type) DO NOTHING",
    )
    .bind(tenant_id)
    .bind(resource_type)
    .bind(reason)
    .bind(Utc::now())
    .execute(pool)
    .await
    .context("Failed to disable resource type")?;
    Ok(())
}

/// All disabled types for a tenant.
pub async fn list(pool: &SqlitePool, tenant_id: i64) -> Result<HashSet<String>> {
    let rows = sqlx::query(
        "SELECT resource_type FROM disabled_resource_types WHERE tenant_id = ?",
    )
    .bind(tenant_id)
    .fetch_all(pool)
    .await
    .context("Failed to list disabled resource types")?;

    rows.into_iter()
        .map(|row| row.try_get::<String, _>("resource_type").map_err(Into::into))
        .collect()
}

/// Explicit reset: clear every disabled type for a tenant. Returns how many
/// were cleared.
pub async fn clear_all(pool: &SqlitePool, tenant_id: i64) -> Result<u64> {
    let result = sqlx::query("DELETE FROM disabled_resource_types WHERE tenant_id = ?")
        .bind(tenant_id)
        .execute(pool)
        .await
        .context("Failed to clear disabled resource types")?;
    Ok(result.rows_affected())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_disable_is_idempotent_and_scoped() {
        let pool = crate::config::connect_memory().await.unwrap();
        let t1 = crate::config::repository::tenants::add(&pool, "a", "https://a", "swg")
            .await
            .unwrap();
        let t2 = crate::config::repository::tenants::add(&pool, "b", "https://b", "swg")
            .await
            .unwrap();

        disable(&pool, t1, "dlp_engine", "HTTP 403").await.unwrap();
        disable(&pool, t1, "dlp_engine", "HTTP 403 again").await.unwrap();

        let disabled = list(&pool, t1).await.unwrap();
        assert_eq!(disabled.len(), 1);
        assert!(disabled.contains("dlp_engine"));

        // Other tenant unaffected.
        assert!(list(&pool, t2).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_clear_all() {
        let pool = crate::config::connect_memory().await.unwrap();
        let tenant = crate::config::repository::tenants::add(&pool, "a", "https://a", "swg")
            .await
            .unwrap();

        disable(&pool, tenant, "dlp_engine", "403").await.unwrap();
        disable(&pool, tenant, "user", "401").await.unwrap();

        assert_eq!(clear_all(&pool, tenant).await.unwrap(), 2);
        assert!(list(&pool, tenant).await.unwrap().is_empty());
    }
}
