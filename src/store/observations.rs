//! Query functions for scraped availability observations.

use anyhow::Context;
use sqlx::PgPool;

use super::models::{NewObservation, Observation};
use crate::error::Result;
use crate::prefs::UserPreferences;

/// Bulk-insert a batch of observations in one transaction.
///
/// Rows that collide on (course_key, date, hhmm, observed_at) are silently
/// skipped, so replaying a cycle is harmless. Returns the number of rows
/// actually written.
pub async fn save_observations(pool: &PgPool, batch: &[NewObservation]) -> Result<u64> {
    if batch.is_empty() {
        return Ok(0);
    }

    let mut tx = pool.begin().await.context("failed to begin transaction")?;
    let mut inserted = 0u64;

    for obs in batch {
        let result = sqlx::query(
            r#"
            INSERT INTO scraped_times (course_key, date, hhmm, seats_available, observed_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (course_key, date, hhmm, observed_at) DO NOTHING
            "#,
        )
        .bind(&obs.course_key)
        .bind(obs.date)
        .bind(&obs.hhmm)
        .bind(obs.seats_available)
        .bind(obs.observed_at)
        .execute(&mut *tx)
        .await
        .context("failed to insert observation")?;
        inserted += result.rows_affected();
    }

    tx.commit().await.context("failed to commit observations")?;
    Ok(inserted)
}

/// Latest observation per (course, date, hhmm) for the user's selected
/// courses over the half-open horizon `[today, today + days_ahead)`.
pub async fn latest_for_user(pool: &PgPool, prefs: &UserPreferences) -> Result<Vec<Observation>> {
    let courses: Vec<String> = prefs.selected_courses.iter().cloned().collect();
    if courses.is_empty() {
        return Ok(Vec::new());
    }

    sqlx::query_as::<_, Observation>(
        r#"
        SELECT DISTINCT ON (course_key, date, hhmm)
            id, course_key, date, hhmm, seats_available, observed_at, metadata
        FROM scraped_times
        WHERE course_key = ANY($1)
          AND date >= CURRENT_DATE
          AND date < CURRENT_DATE + $2::int
        ORDER BY course_key, date, hhmm, observed_at DESC
        "#,
    )
    .bind(&courses)
    .bind(prefs.days_ahead as i32)
    .fetch_all(pool)
    .await
    .context("failed to query latest observations")
}

/// Recent observations not yet covered by an incremental notification to
/// this user. Seat filtering happens here so a slot that never met the
/// user's minimum does not count as "already seen".
pub async fn new_for_user(
    pool: &PgPool,
    prefs: &UserPreferences,
    hours_back: i64,
) -> Result<Vec<Observation>> {
    let courses: Vec<String> = prefs.selected_courses.iter().cloned().collect();
    if courses.is_empty() {
        return Ok(Vec::new());
    }

    sqlx::query_as::<_, Observation>(
        r#"
        SELECT DISTINCT ON (st.course_key, st.date, st.hhmm)
            st.id, st.course_key, st.date, st.hhmm, st.seats_available,
            st.observed_at, st.metadata
        FROM scraped_times st
        LEFT JOIN sent_notifications sn ON (
            sn.user_email = $1
            AND sn.course_key = st.course_key
            AND sn.date = st.date
            AND sn.hhmm = st.hhmm
            AND sn.kind = 'incremental'
        )
        WHERE st.course_key = ANY($2)
          AND st.date >= CURRENT_DATE
          AND st.date < CURRENT_DATE + $3::int
          AND st.seats_available >= $4
          AND st.observed_at >= now() - make_interval(hours => $5)
          AND sn.id IS NULL
        ORDER BY st.course_key, st.date, st.hhmm, st.observed_at DESC
        "#,
    )
    .bind(&prefs.email)
    .bind(&courses)
    .bind(prefs.days_ahead as i32)
    .bind(prefs.min_seats as i32)
    .bind(hours_back as i32)
    .fetch_all(pool)
    .await
    .context("failed to query new observations")
}

/// Delete observations older than `days`. Returns the number reaped.
pub async fn reap(pool: &PgPool, days: i64) -> Result<u64> {
    let result = sqlx::query(
        "DELETE FROM scraped_times WHERE observed_at < now() - make_interval(days => $1)",
    )
    .bind(days as i32)
    .execute(pool)
    .await
    .context("failed to reap old observations")?;
    Ok(result.rows_affected())
}
