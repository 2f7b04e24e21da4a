//! Stateless matching of observations against user preferences.

use chrono::{NaiveDate, NaiveTime, Timelike};

use crate::prefs::{UserPreferences, parse_hhmm};
use crate::store::models::Observation;

/// Minutes of slack before a tee time is considered too late to book today.
pub const BOOKING_BUFFER_MINUTES: u16 = 15;

/// Does one scraped slot qualify for this user?
///
/// A slot qualifies when the course is selected, seats meet the minimum, the
/// date lies in `[today, today + days_ahead)`, the time falls inside the
/// window union for that date's bucket, and (for today) the tee time has not
/// already slipped inside the booking buffer. Monotone in seats and horizon.
pub fn matches_slot(
    prefs: &UserPreferences,
    course_key: &str,
    date: NaiveDate,
    hhmm: &str,
    seats: u32,
    today: NaiveDate,
    now: NaiveTime,
) -> bool {
    if !prefs.selected_courses.contains(course_key) {
        return false;
    }
    if seats < prefs.min_seats {
        return false;
    }
    if date < today || date >= today + chrono::Days::new(prefs.days_ahead as u64) {
        return false;
    }

    let Some(minute) = parse_hhmm(hhmm) else {
        return false;
    };
    if !prefs
        .time_preferences
        .windows_for(date)
        .iter()
        .any(|window| window.contains(minute))
    {
        return false;
    }

    if date == today {
        let now_minute = (now.hour() * 60 + now.minute()) as u16;
        if minute <= now_minute.saturating_add(BOOKING_BUFFER_MINUTES) {
            return false;
        }
    }

    true
}

/// Observation-level convenience over [`matches_slot`].
pub fn matches(
    prefs: &UserPreferences,
    obs: &Observation,
    today: NaiveDate,
    now: NaiveTime,
) -> bool {
    matches_slot(
        prefs,
        &obs.course_key,
        obs.date,
        &obs.hhmm,
        obs.seats_available.max(0) as u32,
        today,
        now,
    )
}

/// Qualifying observations for one user, stable-sorted by
/// (date, hhmm, course_key).
pub fn filter_for_user<'a>(
    prefs: &UserPreferences,
    observations: &'a [Observation],
    today: NaiveDate,
    now: NaiveTime,
) -> Vec<&'a Observation> {
    let mut qualifying: Vec<&Observation> = observations
        .iter()
        .filter(|obs| matches(prefs, obs, today, now))
        .collect();
    qualifying.sort_by(|a, b| {
        (a.date, &a.hhmm, &a.course_key).cmp(&(b.date, &b.hhmm, &b.course_key))
    });
    qualifying
}
