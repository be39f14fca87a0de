//! Command handlers

pub mod import;
pub mod push;
pub mod snapshot;
pub mod tenant;

use anyhow::{Context, Result, anyhow};
use sqlx::SqlitePool;
use std::sync::Arc;

use crate::api::{HttpResourceSource, RateLimiter, ResilienceConfig};
use crate::cancel::CancellationFlag;
use crate::config::repository::tenants::{self, Tenant};

/// Resolve a tenant by name or fail with a hint.
pub async fn resolve_tenant(pool: &SqlitePool, name: &str) -> Result<Tenant> {
    tenants::get_by_name(pool, name)
        .await?
        .ok_or_else(|| anyhow!("unknown tenant '{}' — add it with 'aegis tenant add'", name))
}

/// Build the HTTP source for a tenant with the default resilience policy.
pub fn build_source(
    tenant: &Tenant,
    config: &ResilienceConfig,
) -> Result<Arc<HttpResourceSource>> {
    let limiter = Arc::new(RateLimiter::new(config.rate_limit.clone()));
    let source =
        HttpResourceSource::from_env(&tenant.base_url, limiter, config.request_timeout)
            .context("could not construct API client")?;
    Ok(Arc::new(source))
}

/// Cancellation flag wired to Ctrl-C: the pass in flight completes, nothing
/// further begins.
pub fn cancellation_on_ctrl_c() -> CancellationFlag {
    let flag = CancellationFlag::new();
    let handle = flag.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("cancellation requested — finishing in-flight work");
            handle.cancel();
        }
    });
    flag
}
