//! Tenant registry repository
//!
//! Connection secrets are deliberately absent: the API token is read from the
//! environment at client construction time.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};

#[derive(Debug, Clone)]
pub struct Tenant {
    pub id: i64,
    pub name: String,
    pub base_url: String,
    pub product: String,
    pub created_at: DateTime<Utc>,
}

pub async fn add(pool: &SqlitePool, name: &str, base_url: &str, product: &str) -> Result<i64> {
    let result = sqlx::query(
        "INSERT INTO tenants (name, base_url, product, created_at) VALUES (?, ?, ?, ?)",
    )
    .bind(name)
    .bind(base_url)
    .bind(product)
    .bind(Utc::now())
    .execute(pool)
    .await
    .with_context(|| format!("Failed to add tenant '{}'", name))?;

    Ok(result.last_insert_rowid())
}

pub async fn get_by_name(pool: &SqlitePool, name: &str) -> Result<Option<Tenant>> {
    let row = sqlx::query(
        "SELECT id, name, base_url, product, created_at FROM tenants WHERE name = ?",
    )
    .bind(name)
    .fetch_optional(pool)
    .await
    .context("Failed to look up tenant")?;

    row.map(from_row).transpose()
}

pub async fn list(pool: &SqlitePool) -> Result<Vec<Tenant>> {
    let rows = sqlx::query(
        "SELECT id, name, base_url, product, created_at FROM tenants ORDER BY name",
    )
    .fetch_all(pool)
    .await
    .context("Failed to list tenants")?;

    rows.into_iter().map(from_row).collect()
}

pub async fn remove(pool: &SqlitePool, name: &str) -> Result<bool> {
    let result = sqlx::query("DELETE FROM tenants WHERE name = ?")
        .bind(name)
        .execute(pool)
        .await
        .context("Failed to remove tenant")?;
    Ok(result.rows_affected() > 0)
}

fn from_row(row: sqlx::sqlite::SqliteRow) -> Result<Tenant> {
    Ok(Tenant {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        base_url: row.try_get("base_url")?,
        product: row.try_get("product")?,
        created_at: row.try_get("created_at")?,
    })
}
