//! Row types for the persistence layer.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;

/// One scraped availability record: what was free at a tee time when we
/// looked. Append-only; the latest row per (course, date, hhmm) wins.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Observation {
    pub id: i64,
    pub course_key: String,
    pub date: NaiveDate,
    pub hhmm: String,
    pub seats_available: i32,
    pub observed_at: DateTime<Utc>,
    pub metadata: Value,
}

/// An observation about to be inserted.
#[derive(Debug, Clone)]
pub struct NewObservation {
    pub course_key: String,
    pub date: NaiveDate,
    pub hhmm: String,
    pub seats_available: i32,
    pub observed_at: DateTime<Utc>,
}

/// Which cadence produced an email.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "notification_kind", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Daily,
    Incremental,
}

impl NotificationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Daily => "daily",
            Self::Incremental => "incremental",
        }
    }
}

/// A sent-notification ledger row; the unique key over
/// (user, course, date, hhmm, kind) is what makes emails idempotent.
#[derive(Debug, Clone, FromRow)]
pub struct SentNotification {
    pub id: i64,
    pub user_email: String,
    pub course_key: String,
    pub date: NaiveDate,
    pub hhmm: String,
    pub kind: NotificationKind,
    pub sent_at: DateTime<Utc>,
    pub subject: Option<String>,
    pub body_preview: Option<String>,
}

/// Summary of one finished scheduler cycle.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct CycleRecord {
    pub id: i64,
    pub check_kind: String,
    pub user_email: Option<String>,
    pub availability: Value,
    pub courses_checked: Vec<String>,
    pub date_start: NaiveDate,
    pub date_end: NaiveDate,
    pub total_slots: i32,
    pub new_slots: i32,
    pub duration_seconds: f64,
    pub success: bool,
    pub error: Option<String>,
    pub check_timestamp: DateTime<Utc>,
}

/// A cycle summary about to be recorded.
#[derive(Debug, Clone)]
pub struct NewCycleRecord {
    pub check_kind: String,
    pub user_email: Option<String>,
    pub availability: Value,
    pub courses_checked: Vec<String>,
    pub date_start: NaiveDate,
    pub date_end: NaiveDate,
    pub total_slots: i32,
    pub new_slots: i32,
    pub duration_seconds: f64,
    pub success: bool,
    pub error: Option<String>,
}
