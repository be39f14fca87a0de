//! Import command handler

use anyhow::Result;
use clap::Args;
use colored::*;
use std::sync::Arc;
use std::time::Instant;

use super::{build_source, cancellation_on_ctrl_c, resolve_tenant};
use crate::api::ResilienceConfig;
use crate::audit::SqliteAuditSink;
use crate::config;
use crate::config::repository::sync_runs::RunStatus;
use crate::import::ImportEngine;

#[derive(Args)]
pub struct ImportArgs {
    /// Tenant to import from
    pub tenant: String,

    /// Comma-separated resource type subset (default: all)
    #[arg(long, value_delimiter = ',')]
    pub types: Option<Vec<String>>,

    /// Clear auto-disabled resource types before importing
    #[arg(long)]
    pub reset_disabled: bool,
}

pub async fn handle(args: ImportArgs) -> Result<()> {
    let pool = config::connect().await?;
    let tenant = resolve_tenant(&pool, &args.tenant).await?;

    let resilience = ResilienceConfig::default();
    let source = build_source(&tenant, &resilience)?;
    let audit = Arc::new(SqliteAuditSink::new(pool.clone()));
    let cancel = cancellation_on_ctrl_c();
    let engine = ImportEngine::new(pool.clone(), source, audit, resilience, cancel);

    if args.reset_disabled {
        let cleared = engine.clear_disabled(tenant.id).await?;
        println!("{} cleared {} disabled resource type(s)", "✓".green(), cleared);
    }

    let start = Instant::now();
    let progress: crate::import::ProgressCallback = Arc::new(|rtype, done, total| {
        println!("  [{:>2}/{}] {}", done, total, rtype);
    });

    let run = engine
        .run(tenant.id, args.types.as_deref(), Some(progress))
        .await?;

    let totals = run.totals();
    let status = match run.status {
        RunStatus::Success => "success".green().bold(),
        RunStatus::Partial => "partial".yellow().bold(),
        RunStatus::Failed => "failed".red().bold(),
    };
    println!();
    println!(
        "Import {} in {:.1}s — fetched {}, written {}, unchanged {}, deleted {}, errored {}",
        status,
        start.elapsed().as_secs_f64(),
        totals.fetched,
        totals.written,
        totals.unchanged,
        totals.deleted,
        totals.errored
    );

    if let Some(detail) = &run.error_detail {
        println!();
        for line in detail.lines() {
            println!("  {} {}", "!".red(), line);
        }
    }

    Ok(())
}
