//! Local database bootstrap and repository layer

pub mod repository;

use anyhow::{Context, Result};
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::path::PathBuf;

/// Resolve the database file location: `AEGIS_DB_PATH` override, else
/// `<config dir>/aegis/aegis.db`.
pub fn db_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var("AEGIS_DB_PATH") {
        return Ok(PathBuf::from(path));
    }
    let base = dirs::config_dir().context("Could not determine user config directory")?;
    Ok(base.join("aegis").join("aegis.db"))
}

/// Open (creating if missing) the database and apply migrations.
pub async fn connect() -> Result<SqlitePool> {
    let path = db_path()?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }

    let options = SqliteConnectOptions::new()
        .filename(&path)
        .create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
        .with_context(|| format!("Failed to open database at {}", path.display()))?;

    repository::migrations::run(&pool).await?;
    Ok(pool)
}

/// In-memory database for tests. A single connection keeps every query on
/// the same memory instance.
pub async fn connect_memory() -> Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .context("Failed to open in-memory database")?;
    repository::migrations::run(&pool).await?;
    Ok(pool)
}
