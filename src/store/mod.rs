//! Typed persistence over Postgres.
//!
//! One module per table, free functions over a shared `PgPool`, multi-row
//! writes in a single transaction per call.

pub mod cycles;
pub mod models;
pub mod notifications;
pub mod observations;
pub mod preferences;

use anyhow::Context;
use sqlx::PgPool;
use tracing::info;

use crate::error::Result;

/// Observation and cycle rows older than this are reaped.
pub const RETENTION_DAYS: i64 = 30;

/// Apply pending migrations. Fatal at startup when the database is
/// unreachable or the schema cannot be brought up to date.
pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    sqlx::migrate!()
        .run(pool)
        .await
        .context("failed to run database migrations")?;
    Ok(())
}

/// Reap observation and cycle rows past the retention window.
pub async fn reap(pool: &PgPool, days: i64) -> Result<()> {
    let observations = observations::reap(pool, days).await?;
    let cycles = cycles::reap(pool, days).await?;
    if observations > 0 || cycles > 0 {
        info!(observations, cycles, days, "reaped old rows");
    }
    Ok(())
}
