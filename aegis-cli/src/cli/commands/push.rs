//! Push command handler

use anyhow::{Context, Result};
use clap::Args;
use colored::*;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use super::{build_source, cancellation_on_ctrl_c, resolve_tenant};
use crate::api::ResilienceConfig;
use crate::audit::SqliteAuditSink;
use crate::config;
use crate::push::{PlanAction, PushEngine};
use crate::snapshot::BaselineEnvelope;

#[derive(Args)]
pub struct PushArgs {
    /// Target tenant
    pub tenant: String,

    /// Baseline envelope JSON file (from 'aegis snapshot export')
    #[arg(long)]
    pub baseline: PathBuf,

    /// Classify only — show what would be pushed without writing anything
    #[arg(long)]
    pub dry_run: bool,
}

pub async fn handle(args: PushArgs) -> Result<()> {
    let pool = config::connect().await?;
    let tenant = resolve_tenant(&pool, &args.tenant).await?;

    let text = fs::read_to_string(&args.baseline)
        .with_context(|| format!("Failed to read {}", args.baseline.display()))?;
    let envelope: BaselineEnvelope =
        serde_json::from_str(&text).context("baseline file is not a valid envelope")?;

    let resilience = ResilienceConfig::default();
    let source = build_source(&tenant, &resilience)?;
    let audit = Arc::new(SqliteAuditSink::new(pool.clone()));
    let cancel = cancellation_on_ctrl_c();
    let engine = PushEngine::new(pool.clone(), source, audit, resilience, cancel);

    println!(
        "Pushing {} entries into '{}'{}",
        envelope.entry_count(),
        tenant.name.bold(),
        if args.dry_run { " (dry run)".dimmed().to_string() } else { String::new() }
    );

    let start = Instant::now();

    if args.dry_run {
        let plan = engine.plan(tenant.id, &envelope).await?;
        let creates = plan
            .planned
            .iter()
            .filter(|p| p.action == PlanAction::Create)
            .count();
        let updates = plan.planned.len() - creates;
        println!();
        println!(
            "Would create {}, update {}, merge {}; {} entries already terminal",
            creates.to_string().green(),
            updates.to_string().yellow(),
            plan.merges.len(),
            plan.terminal.len()
        );
        for item in &plan.planned {
            let verb = match &item.action {
                PlanAction::Create => "create".green(),
                PlanAction::Update { .. } => "update".yellow(),
            };
            println!("  {} {} '{}'", verb, item.def.resource_type, item.source_key);
        }
        return Ok(());
    }

    let report = engine.run(tenant.id, &envelope).await?;
    let totals = report.totals();

    println!();
    println!(
        "Push finished in {:.1}s ({} passes)",
        start.elapsed().as_secs_f64(),
        report.passes
    );
    println!(
        "  {} created, {} updated, {} identical, {} predefined, {} skipped types, {} failed",
        totals.created.to_string().green(),
        totals.updated.to_string().green(),
        totals.skipped_identical,
        totals.skipped_predefined,
        totals.skipped_type,
        totals.failed.to_string().red()
    );

    println!();
    for (rtype, counts) in report.counts_by_type() {
        println!(
            "  {:<24} +{} ~{} ={} !{}",
            rtype,
            counts.created,
            counts.updated,
            counts.skipped_identical + counts.skipped_predefined + counts.skipped_type,
            counts.failed
        );
    }

    let failed = report.failed();
    if !failed.is_empty() {
        println!();
        println!("{}", "Failed records:".red().bold());
        for record in failed {
            println!(
                "  {} {} '{}': {}",
                "✗".red(),
                record.resource_type,
                record.source_key,
                record.error_detail.as_deref().unwrap_or("unknown error")
            );
        }
    }

    if report.needs_activation {
        println!();
        println!(
            "{} configuration changed — remember to activate pending changes in the target tenant",
            "→".yellow()
        );
    }

    Ok(())
}
