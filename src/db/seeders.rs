//! Startup seeding for the read-only department directory.

use anyhow::Result;
use sqlx::SqlitePool;
use tracing::info;
use uuid::Uuid;

use super::now_timestamp;

/// Departments installed into an empty database so the directory has
/// content before an administrator curates the list.
const DEFAULT_DEPARTMENTS: &[&str] = &[
    "Engineering",
    "Finance",
    "Human Resources",
    "Marketing",
    "Operations",
    "Sales",
];

/// Seed the built-in departments. Runs on every startup but only touches
/// an empty table; a curated list is never overwritten.
pub async fn seed_departments(pool: &SqlitePool) -> Result<()> {
    let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM departments")
        .fetch_one(pool)
        .await?;
    if count.0 > 0 {
        return Ok(());
    }

    let now = now_timestamp();
    for name in DEFAULT_DEPARTMENTS {
        sqlx::query("INSERT INTO departments (id, name, created_at) VALUES (?, ?, ?)")
            .bind(Uuid::new_v4().to_string())
            .bind(name)
            .bind(&now)
            .execute(pool)
            .await?;
    }

    info!(count = DEFAULT_DEPARTMENTS.len(), "Seeded built-in departments");
    Ok(())
}
