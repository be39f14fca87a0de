//! Snapshot command handlers

use anyhow::{Context, Result, anyhow};
use clap::Subcommand;
use colored::*;
use std::fs;
use std::path::PathBuf;

use super::resolve_tenant;
use crate::config;
use crate::config::repository::snapshots;
use crate::snapshot::{self, diff, envelope};

#[derive(Subcommand)]
pub enum SnapshotCommands {
    /// Capture the current cached inventory as a snapshot
    Save {
        tenant: String,
        /// Snapshot name (default: UTC timestamp)
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        comment: Option<String>,
    },
    /// List snapshots for a tenant, newest first
    List { tenant: String },
    /// Diff two snapshots, or a snapshot against the current cache
    Diff {
        tenant: String,
        /// Base snapshot name
        a: String,
        /// Newer snapshot name (default: current cache)
        b: Option<String>,
    },
    /// Export a snapshot as a portable baseline envelope
    Export {
        tenant: String,
        name: String,
        /// Output file
        #[arg(long)]
        out: PathBuf,
    },
    /// Delete a snapshot
    Delete { tenant: String, name: String },
}

pub async fn handle(command: SnapshotCommands) -> Result<()> {
    let pool = config::connect().await?;

    match command {
        SnapshotCommands::Save { tenant, name, comment } => {
            let tenant = resolve_tenant(&pool, &tenant).await?;
            let snap =
                snapshot::save(&pool, tenant.id, name.as_deref(), comment.as_deref()).await?;
            println!(
                "{} snapshot '{}' saved ({} resources)",
                "✓".green(),
                snap.name.bold(),
                snap.resource_count
            );
        }
        SnapshotCommands::List { tenant } => {
            let tenant = resolve_tenant(&pool, &tenant).await?;
            let all = snapshots::list(&pool, tenant.id).await?;
            if all.is_empty() {
                println!("No snapshots for '{}'.", tenant.name);
                return Ok(());
            }
            for snap in all {
                println!(
                    "{}  {}  {} resources  {}",
                    snap.name.bold(),
                    snap.created_at.format("%Y-%m-%d %H:%M").to_string().dimmed(),
                    snap.resource_count,
                    snap.comment.as_deref().unwrap_or("").dimmed()
                );
            }
        }
        SnapshotCommands::Diff { tenant, a, b } => {
            let tenant = resolve_tenant(&pool, &tenant).await?;
            let base = load_snapshot(&pool, tenant.id, &a).await?;
            let (newer, newer_label) = match &b {
                Some(name) => (load_snapshot(&pool, tenant.id, name).await?.data, name.clone()),
                None => (snapshot::live_view(&pool, tenant.id).await?, "current".to_string()),
            };

            let result = diff::compute(&base.data, &newer);
            print_diff(&a, &newer_label, &result);
        }
        SnapshotCommands::Export { tenant, name, out } => {
            let tenant = resolve_tenant(&pool, &tenant).await?;
            let snap = load_snapshot(&pool, tenant.id, &name).await?;
            let envelope = envelope::export(&snap);
            let json = serde_json::to_string_pretty(&envelope)
                .context("Failed to serialize envelope")?;
            fs::write(&out, json)
                .with_context(|| format!("Failed to write {}", out.display()))?;
            println!(
                "{} exported '{}' ({} resources) to {}",
                "✓".green(),
                snap.name.bold(),
                snap.resource_count,
                out.display()
            );
        }
        SnapshotCommands::Delete { tenant, name } => {
            let tenant = resolve_tenant(&pool, &tenant).await?;
            if snapshots::delete(&pool, tenant.id, &name).await? {
                println!("{} snapshot '{}' deleted", "✓".green(), name);
            } else {
                anyhow::bail!("no snapshot named '{}'", name);
            }
        }
    }
    Ok(())
}

async fn load_snapshot(
    pool: &sqlx::SqlitePool,
    tenant_id: i64,
    name: &str,
) -> Result<snapshots::Snapshot> {
    snapshots::get_by_name(pool, tenant_id, name)
        .await?
        .ok_or_else(|| anyhow!("no snapshot named '{}'", name))
}

fn print_diff(a: &str, b: &str, result: &diff::DiffResult) {
    println!("Diff {} → {}", a.bold(), b.bold());
    if result.is_empty() {
        println!("{} no differences", "✓".green());
        return;
    }
    println!(
        "{} added, {} removed, {} changed, {} unchanged",
        result.total_added().to_string().green(),
        result.total_removed().to_string().red(),
        result.total_changed().to_string().yellow(),
        result.total_unchanged
    );
    for rd in &result.resource_diffs {
        println!();
        println!("{}", rd.resource_type.bold());
        for entry in &rd.added {
            println!("  {} {}", "+".green(), entry.name.as_deref().unwrap_or(&entry.id));
        }
        for entry in &rd.removed {
            println!("  {} {}", "-".red(), entry.name.as_deref().unwrap_or(&entry.id));
        }
        for changed in &rd.changed {
            println!(
                "  {} {}",
                "~".yellow(),
                changed.name.as_deref().unwrap_or(&changed.id)
            );
            for change in &changed.field_changes {
                println!(
                    "      {}: {} → {}",
                    change.field,
                    render(&change.old).dimmed(),
                    render(&change.new)
                );
            }
        }
    }
}

fn render(value: &Option<serde_json::Value>) -> String {
    match value {
        Some(v) => v.to_string(),
        None => "∅".to_string(),
    }
}
