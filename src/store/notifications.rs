//! Query functions for the sent-notification ledger.

use std::collections::HashSet;

use anyhow::Context;
use chrono::NaiveDate;
use sqlx::PgPool;

use super::models::NotificationKind;
use crate::error::Result;

/// Record that a slot was included in an email. The unique index makes this
/// idempotent; replays are silently dropped.
pub async fn record_sent(
    pool: &PgPool,
    user_email: &str,
    course_key: &str,
    date: NaiveDate,
    hhmm: &str,
    kind: NotificationKind,
    subject: &str,
    body_preview: &str,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO sent_notifications
            (user_email, course_key, date, hhmm, kind, subject, body_preview)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        ON CONFLICT (user_email, course_key, date, hhmm, kind) DO NOTHING
        "#,
    )
    .bind(user_email)
    .bind(course_key)
    .bind(date)
    .bind(hhmm)
    .bind(kind)
    .bind(subject)
    .bind(body_preview)
    .execute(pool)
    .await
    .context("failed to record sent notification")?;
    Ok(())
}

/// The set of (course_key, date, hhmm) tuples already notified to this user
/// for a given kind. Used to post-filter outgoing emails.
pub async fn sent_keys(
    pool: &PgPool,
    user_email: &str,
    kind: NotificationKind,
) -> Result<HashSet<(String, NaiveDate, String)>> {
    let rows: Vec<(String, NaiveDate, String)> = sqlx::query_as(
        "SELECT course_key, date, hhmm FROM sent_notifications WHERE user_email = $1 AND kind = $2",
    )
    .bind(user_email)
    .bind(kind)
    .fetch_all(pool)
    .await
    .context("failed to query sent notifications")?;

    Ok(rows.into_iter().collect())
}
