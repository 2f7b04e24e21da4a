//! Email notification formatting and dispatch.
//!
//! The notifier is the only component that turns seat counts back into
//! human-readable text. Outgoing emails are post-filtered against the
//! sent-notification ledger, so a (user, course, date, time, kind) tuple is
//! emailed at most once regardless of which cadence produced it.

mod mailer;

pub use mailer::{MailError, Mailer, SendOutcome, SmtpSettings};

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{Datelike, Local, NaiveDate};
use sqlx::PgPool;
use tracing::{debug, error, info};

use crate::catalog::Catalog;
use crate::error::Result;
use crate::prefs::UserPreferences;
use crate::store::models::NotificationKind;
use crate::store::notifications;

const WEEKDAY_NAMES_NO: [&str; 7] = [
    "Mandag", "Tirsdag", "Onsdag", "Torsdag", "Fredag", "Lørdag", "Søndag",
];

/// How much of the rendered body is kept in the ledger.
const BODY_PREVIEW_CHARS: usize = 1000;

/// One qualifying tee time headed for an email.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchedSlot {
    pub course_key: String,
    pub date: NaiveDate,
    pub hhmm: String,
    pub seats: u32,
}

pub struct Notifier {
    pool: PgPool,
    mailer: Mailer,
    catalog: Arc<Catalog>,
}

impl Notifier {
    pub fn new(pool: PgPool, mailer: Mailer, catalog: Arc<Catalog>) -> Self {
        Self {
            pool,
            mailer,
            catalog,
        }
    }

    /// Format and send one email covering `slots`, recording every included
    /// tuple on success. Returns the number of slots actually notified.
    ///
    /// Nothing is recorded when the send fails (including SMTP auth
    /// rejection), so the same slots are retried on the next cadence.
    pub async fn dispatch(
        &self,
        user: &UserPreferences,
        slots: Vec<MatchedSlot>,
        kind: NotificationKind,
    ) -> Result<usize> {
        if slots.is_empty() {
            return Ok(0);
        }

        let sent = notifications::sent_keys(&self.pool, &user.email, kind).await?;
        let mut fresh: Vec<MatchedSlot> = slots
            .into_iter()
            .filter(|slot| {
                !sent.contains(&(slot.course_key.clone(), slot.date, slot.hhmm.clone()))
            })
            .collect();
        fresh.sort_by(|a, b| {
            (a.date, &a.hhmm, &a.course_key).cmp(&(b.date, &b.hhmm, &b.course_key))
        });

        if fresh.is_empty() {
            debug!(user = %user.email, kind = kind.as_str(), "all slots already notified");
            return Ok(0);
        }

        let today = Local::now().date_naive();
        let (subject, body) = match kind {
            NotificationKind::Daily => format_daily(user, &fresh, &self.catalog, today),
            NotificationKind::Incremental => {
                format_incremental(user, &fresh, &self.catalog, today)
            }
        };

        match self.mailer.send(&user.email, &subject, &body).await {
            Ok(SendOutcome::Sent) => {
                let preview: String = body.chars().take(BODY_PREVIEW_CHARS).collect();
                for slot in &fresh {
                    notifications::record_sent(
                        &self.pool,
                        &user.email,
                        &slot.course_key,
                        slot.date,
                        &slot.hhmm,
                        kind,
                        &subject,
                        &preview,
                    )
                    .await?;
                }
                info!(
                    user = %user.email,
                    kind = kind.as_str(),
                    slots = fresh.len(),
                    "notification sent"
                );
                Ok(fresh.len())
            }
            Ok(SendOutcome::Disabled) => {
                debug!(user = %user.email, kind = kind.as_str(), "email disabled, nothing sent");
                Ok(0)
            }
            Err(MailError::Auth(e)) => {
                error!(
                    user = %user.email,
                    kind = kind.as_str(),
                    error = %e,
                    "SMTP authentication failed, will retry next cycle"
                );
                Ok(0)
            }
            Err(e) => {
                error!(user = %user.email, kind = kind.as_str(), error = %e, "email send failed");
                Ok(0)
            }
        }
    }
}

/// "I dag", "I morgen", or "Mandag 18.08".
fn display_date(date: NaiveDate, today: NaiveDate) -> String {
    if date == today {
        "I dag".to_string()
    } else if date == today + chrono::Days::new(1) {
        "I morgen".to_string()
    } else {
        let weekday = WEEKDAY_NAMES_NO[date.weekday().num_days_from_monday() as usize];
        format!("{weekday} {}", date.format("%d.%m"))
    }
}

fn display_course<'a>(catalog: &'a Catalog, key: &'a str) -> &'a str {
    catalog
        .lookup(key)
        .map(|club| club.display_name)
        .unwrap_or(key)
}

type Grouped<'a> = BTreeMap<&'a str, BTreeMap<NaiveDate, Vec<&'a MatchedSlot>>>;

fn group_by_course<'a>(slots: &'a [MatchedSlot], catalog: &'a Catalog) -> Grouped<'a> {
    let mut grouped: Grouped<'a> = BTreeMap::new();
    for slot in slots {
        grouped
            .entry(display_course(catalog, &slot.course_key))
            .or_default()
            .entry(slot.date)
            .or_default()
            .push(slot);
    }
    grouped
}

fn format_daily(
    user: &UserPreferences,
    slots: &[MatchedSlot],
    catalog: &Catalog,
    today: NaiveDate,
) -> (String, String) {
    let subject = format!(
        "⛳ Daglig golfrapport for {} - {} tilgjengelige tider",
        user.name,
        slots.len()
    );

    let mut lines = vec![
        format!("Hei {}!", user.name),
        String::new(),
        "Her er din daglige oversikt over tilgjengelige golftider som matcher dine preferanser:"
            .to_string(),
        String::new(),
    ];

    for (course, dates) in group_by_course(slots, catalog) {
        lines.push(format!("🏌️ {course}:"));
        for (date, times) in dates {
            lines.push(format!("  📅 {} ({date}):", display_date(date, today)));
            for slot in times {
                lines.push(format!("    ⏰ {} - {} plasser", slot.hhmm, slot.seats));
            }
            lines.push(String::new());
        }
    }

    lines.extend([
        "Lykke til med å booke! 🍀".to_string(),
        String::new(),
        "Mvh,".to_string(),
        "Golf Availability Monitor".to_string(),
        String::new(),
        "---".to_string(),
        format!("Denne rapporten ble sendt til {}", user.email),
    ]);

    (subject, lines.join("\n"))
}

fn format_incremental(
    user: &UserPreferences,
    slots: &[MatchedSlot],
    catalog: &Catalog,
    today: NaiveDate,
) -> (String, String) {
    let subject = format!(
        "🚨 Nye golftider tilgjengelig for {} - {} nye plasser!",
        user.name,
        slots.len()
    );

    let mut lines = vec![
        format!("Hei {}!", user.name),
        String::new(),
        format!(
            "Vi har funnet {} nye golftider som matcher dine preferanser:",
            slots.len()
        ),
        String::new(),
    ];

    for (course, dates) in group_by_course(slots, catalog) {
        lines.push(format!("🏌️ {course}:"));
        for (date, times) in dates {
            for slot in times {
                lines.push(format!(
                    "  📅 {} kl. {} - {} plasser",
                    display_date(date, today),
                    slot.hhmm,
                    slot.seats
                ));
            }
        }
        lines.push(String::new());
    }

    lines.extend([
        "⚡ Disse tidene er nylig blitt tilgjengelige, så vær rask med å booke!".to_string(),
        String::new(),
        "Lykke til! 🍀".to_string(),
        String::new(),
        "Mvh,".to_string(),
        "Golf Availability Monitor".to_string(),
        String::new(),
        "---".to_string(),
        format!("Denne varslingen ble sendt til {}", user.email),
    ]);

    (subject, lines.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prefs::{TimePreferences, TimeWindow};

    fn user() -> UserPreferences {
        UserPreferences {
            name: "Kari".to_string(),
            email: "kari@example.com".to_string(),
            selected_courses: ["oslo_golfklubb".to_string()].into(),
            min_seats: 1,
            days_ahead: 7,
            time_preferences: TimePreferences::SameAllDays {
                windows: vec!["07:00-17:00".parse::<TimeWindow>().unwrap()],
            },
        }
    }

    fn slot(course: &str, date: NaiveDate, hhmm: &str, seats: u32) -> MatchedSlot {
        MatchedSlot {
            course_key: course.to_string(),
            date,
            hhmm: hhmm.to_string(),
            seats,
        }
    }

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 8, d).unwrap()
    }

    #[test]
    fn daily_report_groups_by_course_and_date() {
        let catalog = Catalog::builtin();
        let slots = vec![
            slot("oslo_golfklubb", date(18), "09:00", 4),
            slot("oslo_golfklubb", date(19), "10:00", 2),
            slot("haga_gk", date(18), "11:00", 3),
        ];
        let (subject, body) = format_daily(&user(), &slots, &catalog, date(18));

        assert_eq!(subject, "⛳ Daglig golfrapport for Kari - 3 tilgjengelige tider");
        assert!(body.contains("🏌️ Oslo Golfklubb:"));
        assert!(body.contains("🏌️ Haga GK:"));
        assert!(body.contains("I dag (2025-08-18)"));
        assert!(body.contains("I morgen (2025-08-19)"));
        assert!(body.contains("⏰ 09:00 - 4 plasser"));
        assert!(body.contains("Denne rapporten ble sendt til kari@example.com"));
        // Courses come out in display-name order.
        assert!(body.find("Haga GK").unwrap() < body.find("Oslo Golfklubb").unwrap());
    }

    #[test]
    fn incremental_alert_names_each_slot() {
        let catalog = Catalog::builtin();
        let slots = vec![slot("oslo_golfklubb", date(25), "09:00", 2)];
        let (subject, body) = format_incremental(&user(), &slots, &catalog, date(18));

        assert_eq!(subject, "🚨 Nye golftider tilgjengelig for Kari - 1 nye plasser!");
        // 2025-08-25 is a Monday, a week out.
        assert!(body.contains("📅 Mandag 25.08 kl. 09:00 - 2 plasser"));
        assert!(body.contains("vær rask med å booke"));
    }

    #[test]
    fn unknown_course_keys_fall_back_to_the_key() {
        let catalog = Catalog::builtin();
        let slots = vec![slot("mystery_course", date(19), "09:00", 2)];
        let (_, body) = format_incremental(&user(), &slots, &catalog, date(18));
        assert!(body.contains("🏌️ mystery_course:"));
    }

    #[test]
    fn display_date_names() {
        assert_eq!(display_date(date(18), date(18)), "I dag");
        assert_eq!(display_date(date(19), date(18)), "I morgen");
        assert_eq!(display_date(date(23), date(18)), "Lørdag 23.08");
    }
}
