//! Query functions for cycle summaries.

use anyhow::Context;
use sqlx::PgPool;

use super::models::{CycleRecord, NewCycleRecord};
use crate::error::Result;

/// Persist one finished cycle's summary.
pub async fn record_cycle(pool: &PgPool, record: &NewCycleRecord) -> Result<i64> {
    let (id,): (i64,) = sqlx::query_as(
        r#"
        INSERT INTO cached_cycles
            (check_kind, user_email, availability, courses_checked,
             date_start, date_end, total_slots, new_slots,
             duration_seconds, success, error)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        RETURNING id
        "#,
    )
    .bind(&record.check_kind)
    .bind(&record.user_email)
    .bind(&record.availability)
    .bind(&record.courses_checked)
    .bind(record.date_start)
    .bind(record.date_end)
    .bind(record.total_slots)
    .bind(record.new_slots)
    .bind(record.duration_seconds)
    .bind(record.success)
    .bind(&record.error)
    .fetch_one(pool)
    .await
    .context("failed to record cycle summary")?;
    Ok(id)
}

/// Most recent cycle summary, if any.
pub async fn latest(pool: &PgPool) -> Result<Option<CycleRecord>> {
    sqlx::query_as::<_, CycleRecord>(
        "SELECT * FROM cached_cycles ORDER BY check_timestamp DESC LIMIT 1",
    )
    .fetch_optional(pool)
    .await
    .context("failed to query latest cycle")
}

/// Delete cycle summaries older than `days`.
pub async fn reap(pool: &PgPool, days: i64) -> Result<u64> {
    let result = sqlx::query(
        "DELETE FROM cached_cycles WHERE check_timestamp < now() - make_interval(days => $1)",
    )
    .bind(days as i32)
    .execute(pool)
    .await
    .context("failed to reap old cycles")?;
    Ok(result.rows_affected())
}
