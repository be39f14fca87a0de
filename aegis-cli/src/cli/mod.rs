//! Command-line interface

pub mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{import, push, snapshot, tenant};

#[derive(Parser)]
#[command(
    name = "aegis",
    about = "Multi-tenant cloud security configuration sync",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Manage tenant connections
    Tenant {
        #[command(subcommand)]
        command: tenant::TenantCommands,
    },
    /// Import a tenant's live configuration into the local cache
    Import(import::ImportArgs),
    /// Save, list, diff, export, and delete configuration snapshots
    Snapshot {
        #[command(subcommand)]
        command: snapshot::SnapshotCommands,
    },
    /// Push a baseline envelope into a target tenant
    Push(push::PushArgs),
}

pub async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Tenant { command } => tenant::handle(command).await,
        Commands::Import(args) => import::handle(args).await,
        Commands::Snapshot { command } => snapshot::handle(command).await,
        Commands::Push(args) => push::handle(args).await,
    }
}
