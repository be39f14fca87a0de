//! Tenant management commands

use anyhow::Result;
use clap::Subcommand;
use colored::*;

use crate::config;
use crate::config::repository::tenants;
use crate::registry;

#[derive(Subcommand)]
pub enum TenantCommands {
    /// Register a tenant
    Add {
        /// Tenant name used in other commands
        name: String,
        /// API base URL, e.g. https://api.example.com
        #[arg(long)]
        base_url: String,
    },
    /// List registered tenants
    List,
    /// Remove a tenant registration (cached data is kept)
    Remove { name: String },
}

pub async fn handle(command: TenantCommands) -> Result<()> {
    let pool = config::connect().await?;

    match command {
        TenantCommands::Add { name, base_url } => {
            tenants::add(&pool, &name, &base_url, registry::PRODUCT).await?;
            println!("{} tenant '{}' added", "✓".green(), name.bold());
        }
        TenantCommands::List => {
            let all = tenants::list(&pool).await?;
            if all.is_empty() {
                println!("No tenants registered.");
                return Ok(());
            }
            for tenant in all {
                println!(
                    "{}  {}  {}",
                    tenant.name.bold(),
                    tenant.base_url.dimmed(),
                    tenant.created_at.format("%Y-%m-%d").to_string().dimmed()
                );
            }
        }
        TenantCommands::Remove { name } => {
            if tenants::remove(&pool, &name).await? {
                println!("{} tenant '{}' removed", "✓".green(), name);
            } else {
                anyhow::bail!("unknown tenant '{}'", name);
            }
        }
    }
    Ok(())
}
