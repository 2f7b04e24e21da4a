//! Query functions for user preferences.
//!
//! The full preference record lives in a JSONB column; email and name are
//! lifted into columns for lookups and joins.

use std::collections::BTreeMap;

use anyhow::Context;
use sqlx::PgPool;

use crate::error::Result;
use crate::prefs::UserPreferences;

#[derive(sqlx::FromRow)]
struct PreferenceRow {
    email: String,
    preferences: serde_json::Value,
}

fn decode(row: PreferenceRow) -> Result<UserPreferences> {
    serde_json::from_value(row.preferences)
        .with_context(|| format!("corrupt preference record for {}", row.email))
}

/// All user preferences keyed by email.
pub async fn get_all(pool: &PgPool) -> Result<BTreeMap<String, UserPreferences>> {
    let rows = sqlx::query_as::<_, PreferenceRow>(
        "SELECT email, preferences FROM user_preferences ORDER BY email",
    )
    .fetch_all(pool)
    .await
    .context("failed to list user preferences")?;

    let mut users = BTreeMap::new();
    for row in rows {
        let email = row.email.clone();
        users.insert(email, decode(row)?);
    }
    Ok(users)
}

/// One user's preferences, if present.
pub async fn get(pool: &PgPool, email: &str) -> Result<Option<UserPreferences>> {
    let row = sqlx::query_as::<_, PreferenceRow>(
        "SELECT email, preferences FROM user_preferences WHERE email = $1",
    )
    .bind(email)
    .fetch_optional(pool)
    .await
    .context("failed to get user preferences")?;

    row.map(decode).transpose()
}

/// Upsert a (validated, normalized) preference record.
pub async fn put(pool: &PgPool, prefs: &UserPreferences) -> Result<()> {
    let json = serde_json::to_value(prefs).context("failed to encode preferences")?;

    sqlx::query(
        r#"
        INSERT INTO user_preferences (email, name, preferences)
        VALUES ($1, $2, $3)
        ON CONFLICT (email) DO UPDATE
            SET name = EXCLUDED.name,
                preferences = EXCLUDED.preferences,
                updated_at = now()
        "#,
    )
    .bind(&prefs.email)
    .bind(&prefs.name)
    .bind(json)
    .execute(pool)
    .await
    .context("failed to upsert user preferences")?;
    Ok(())
}

/// Delete a user. Returns false when no such user existed.
pub async fn delete(pool: &PgPool, email: &str) -> Result<bool> {
    let result = sqlx::query("DELETE FROM user_preferences WHERE email = $1")
        .bind(email)
        .execute(pool)
        .await
        .context("failed to delete user preferences")?;
    Ok(result.rows_affected() > 0)
}

/// Number of registered users.
pub async fn count(pool: &PgPool) -> Result<i64> {
    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM user_preferences")
        .fetch_one(pool)
        .await
        .context("failed to count users")?;
    Ok(count)
}
