use chrono::{DateTime, NaiveDate, Utc};
use sqlx::PgPool;

use teewatch::prefs::{TimePreferences, TimeWindow, UserPreferences};

/// Build a preference record with sensible defaults for one course.
pub fn make_user(email: &str, courses: &[&str], min_seats: u32, window: &str) -> UserPreferences {
    UserPreferences {
        name: email.split('@').next().unwrap_or("user").to_string(),
        email: email.to_string(),
        selected_courses: courses.iter().map(|c| c.to_string()).collect(),
        min_seats,
        days_ahead: 7,
        time_preferences: TimePreferences::SameAllDays {
            windows: vec![window.parse::<TimeWindow>().unwrap()],
        },
    }
}

/// Insert an observation row directly via SQL, returning its ID.
#[allow(dead_code)]
pub async fn insert_observation(
    pool: &PgPool,
    course_key: &str,
    date: NaiveDate,
    hhmm: &str,
    seats: i32,
    observed_at: DateTime<Utc>,
) -> i64 {
    let (id,): (i64,) = sqlx::query_as(
        "INSERT INTO scraped_times (course_key, date, hhmm, seats_available, observed_at)
         VALUES ($1, $2, $3, $4, $5)
         RETURNING id",
    )
    .bind(course_key)
    .bind(date)
    .bind(hhmm)
    .bind(seats)
    .bind(observed_at)
    .fetch_one(pool)
    .await
    .unwrap();
    id
}

/// Today's date plus an offset, matching the horizon queries that compare
/// against CURRENT_DATE.
#[allow(dead_code)]
pub fn today_plus(days: i64) -> NaiveDate {
    Utc::now().date_naive() + chrono::Duration::days(days)
}
