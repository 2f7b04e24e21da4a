//! User preference types: time windows, weekday/weekend buckets, and the
//! per-user record stored as JSONB and served over the API.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::catalog::Catalog;

pub const MINUTES_PER_DAY: u16 = 24 * 60;

/// Maximum planning horizon a user may select.
pub const MAX_DAYS_AHEAD: u32 = 14;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PreferenceError {
    #[error("invalid time window format '{0}', expected HH:MM-HH:MM")]
    WindowFormat(String),
    #[error("time window end must be after start")]
    WindowOrder,
    #[error("time window minute out of range")]
    WindowRange,
    #[error("unknown course key '{0}'")]
    UnknownCourse(String),
    #[error("min_seats must be at least 1")]
    MinSeats,
    #[error("days_ahead must be between 1 and {MAX_DAYS_AHEAD}")]
    DaysAhead,
    #[error("email must not be empty")]
    Email,
}

/// A half-open interval of local minutes, `[start_minute, end_minute)`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, TS,
)]
#[ts(export)]
pub struct TimeWindow {
    pub start_minute: u16,
    pub end_minute: u16,
}

impl TimeWindow {
    pub fn new(start_minute: u16, end_minute: u16) -> Result<Self, PreferenceError> {
        if start_minute >= MINUTES_PER_DAY || end_minute > MINUTES_PER_DAY {
            return Err(PreferenceError::WindowRange);
        }
        if start_minute >= end_minute {
            return Err(PreferenceError::WindowOrder);
        }
        Ok(Self {
            start_minute,
            end_minute,
        })
    }

    /// Half-open containment: a tee time at exactly `end_minute` is excluded.
    pub fn contains(&self, minute: u16) -> bool {
        self.start_minute <= minute && minute < self.end_minute
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02}:{:02}-{:02}:{:02}",
            self.start_minute / 60,
            self.start_minute % 60,
            self.end_minute / 60,
            self.end_minute % 60
        )
    }
}

impl FromStr for TimeWindow {
    type Err = PreferenceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (start, end) = s
            .split_once('-')
            .ok_or_else(|| PreferenceError::WindowFormat(s.to_string()))?;
        let start = parse_hhmm(start).ok_or_else(|| PreferenceError::WindowFormat(s.to_string()))?;
        let end = parse_hhmm(end).ok_or_else(|| PreferenceError::WindowFormat(s.to_string()))?;
        Self::new(start, end)
    }
}

/// Parse `HH:MM` into minutes from midnight. `24:00` is accepted as an
/// exclusive window end.
pub fn parse_hhmm(s: &str) -> Option<u16> {
    let (h, m) = s.trim().split_once(':')?;
    let h: u16 = h.parse().ok()?;
    let m: u16 = m.parse().ok()?;
    if m >= 60 {
        return None;
    }
    let minutes = h.checked_mul(60)?.checked_add(m)?;
    (minutes <= MINUTES_PER_DAY).then_some(minutes)
}

/// Per-user time preferences, either one window set for every day or split
/// weekday/weekend sets. Each set is a union of windows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(tag = "mode", rename_all = "snake_case")]
#[ts(export)]
pub enum TimePreferences {
    SameAllDays { windows: Vec<TimeWindow> },
    Split {
        weekdays: Vec<TimeWindow>,
        weekends: Vec<TimeWindow>,
    },
}

impl TimePreferences {
    /// Canonical two-bucket form. `SameAllDays` becomes a `Split` with
    /// identical buckets; `Split` is returned unchanged.
    pub fn normalize(self) -> Self {
        match self {
            Self::SameAllDays { windows } => Self::Split {
                weekdays: windows.clone(),
                weekends: windows,
            },
            split @ Self::Split { .. } => split,
        }
    }

    /// The window union applicable to `date` (Saturday and Sunday use the
    /// weekend bucket).
    pub fn windows_for(&self, date: NaiveDate) -> &[TimeWindow] {
        match self {
            Self::SameAllDays { windows } => windows,
            Self::Split { weekdays, weekends } => {
                if is_weekend(date) {
                    weekends
                } else {
                    weekdays
                }
            }
        }
    }

    pub fn iter_all(&self) -> impl Iterator<Item = &TimeWindow> {
        let (a, b): (&[TimeWindow], &[TimeWindow]) = match self {
            Self::SameAllDays { windows } => (windows, &[]),
            Self::Split { weekdays, weekends } => (weekdays, weekends),
        };
        a.iter().chain(b.iter())
    }
}

pub fn is_weekend(date: NaiveDate) -> bool {
    matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

/// One user's monitoring profile, keyed by email.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct UserPreferences {
    pub name: String,
    pub email: String,
    #[ts(type = "Array<string>")]
    pub selected_courses: BTreeSet<String>,
    #[serde(default = "default_min_seats")]
    pub min_seats: u32,
    #[serde(default = "default_days_ahead")]
    pub days_ahead: u32,
    pub time_preferences: TimePreferences,
}

fn default_min_seats() -> u32 {
    1
}

fn default_days_ahead() -> u32 {
    4
}

impl UserPreferences {
    /// Reject records the scheduler must never see: unknown course keys,
    /// degenerate windows, out-of-range seat and horizon values.
    pub fn validate(&self, catalog: &Catalog) -> Result<(), PreferenceError> {
        if self.email.trim().is_empty() {
            return Err(PreferenceError::Email);
        }
        if self.min_seats < 1 {
            return Err(PreferenceError::MinSeats);
        }
        if self.days_ahead < 1 || self.days_ahead > MAX_DAYS_AHEAD {
            return Err(PreferenceError::DaysAhead);
        }
        for key in &self.selected_courses {
            if !catalog.contains(key) {
                return Err(PreferenceError::UnknownCourse(key.clone()));
            }
        }
        for window in self.time_preferences.iter_all() {
            // Round-trips the invariant for windows built via serde.
            TimeWindow::new(window.start_minute, window.end_minute)?;
        }
        Ok(())
    }

    /// Returns the record with time preferences in canonical two-bucket form.
    pub fn normalized(mut self) -> Self {
        self.time_preferences = self.time_preferences.normalize();
        self
    }
}
