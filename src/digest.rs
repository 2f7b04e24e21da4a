//! Digest worker: daily morning reports and ten-minute incremental scans.
//!
//! Runs alongside the monitor and shares only the database with it. The
//! daily digest fires once per calendar day in the 07:0x window; the
//! incremental scan fires whenever the minute is a multiple of ten and
//! covers observations from the last 24 hours that were never notified.

use std::sync::Arc;
use std::time::Duration;

use chrono::{Local, Timelike};
use sqlx::PgPool;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::monitor::matcher;
use crate::notify::{MatchedSlot, Notifier};
use crate::services::Service;
use crate::store;
use crate::store::models::{NotificationKind, Observation};

/// Local hour of the daily digest.
const DAILY_DIGEST_HOUR: u32 = 7;

/// The digest still fires if the loop wakes a few minutes late.
const DAILY_DIGEST_MINUTE_SLACK: u32 = 9;

const INCREMENTAL_PERIOD_MINUTES: u32 = 10;

const INCREMENTAL_LOOKBACK_HOURS: i64 = 24;

const TICK: Duration = Duration::from_secs(60);

/// Pause after a loop error before trying again.
const ERROR_BACKOFF: Duration = Duration::from_secs(300);

pub struct DigestService {
    db_pool: PgPool,
    notifier: Arc<Notifier>,
    cancel: CancellationToken,
    last_daily: Option<chrono::NaiveDate>,
}

impl DigestService {
    pub fn new(db_pool: PgPool, notifier: Arc<Notifier>) -> Self {
        Self {
            db_pool,
            notifier,
            cancel: CancellationToken::new(),
            last_daily: None,
        }
    }

    fn to_slots(observations: &[&Observation]) -> Vec<MatchedSlot> {
        observations
            .iter()
            .map(|obs| MatchedSlot {
                course_key: obs.course_key.clone(),
                date: obs.date,
                hhmm: obs.hhmm.clone(),
                seats: obs.seats_available.max(0) as u32,
            })
            .collect()
    }

    /// Morning summary of everything currently qualifying per user.
    async fn send_daily_reports(&self) -> crate::error::Result<()> {
        let users = store::preferences::get_all(&self.db_pool).await?;
        let now = Local::now();
        let today = now.date_naive();

        info!(users = users.len(), "running daily digest");

        for user in users.values() {
            let observations =
                store::observations::latest_for_user(&self.db_pool, user).await?;
            let matched = matcher::filter_for_user(user, &observations, today, now.time());
            if matched.is_empty() {
                debug!(user = %user.email, "no qualifying slots for daily digest");
                continue;
            }
            self.notifier
                .dispatch(user, Self::to_slots(&matched), NotificationKind::Daily)
                .await?;
        }
        Ok(())
    }

    /// Alert on recent observations that never made it into an email.
    async fn send_incremental_alerts(&self) -> crate::error::Result<()> {
        let users = store::preferences::get_all(&self.db_pool).await?;
        let now = Local::now();
        let today = now.date_naive();

        for user in users.values() {
            let observations = store::observations::new_for_user(
                &self.db_pool,
                user,
                INCREMENTAL_LOOKBACK_HOURS,
            )
            .await?;
            let matched = matcher::filter_for_user(user, &observations, today, now.time());
            if matched.is_empty() {
                continue;
            }
            debug!(user = %user.email, slots = matched.len(), "incremental candidates found");
            self.notifier
                .dispatch(user, Self::to_slots(&matched), NotificationKind::Incremental)
                .await?;
        }
        Ok(())
    }

    async fn tick(&mut self) -> crate::error::Result<()> {
        let now = Local::now();
        let today = now.date_naive();

        let daily_due = now.hour() == DAILY_DIGEST_HOUR
            && now.minute() <= DAILY_DIGEST_MINUTE_SLACK
            && self.last_daily != Some(today);
        if daily_due {
            self.send_daily_reports().await?;
            self.last_daily = Some(today);
            // Housekeeping piggybacks on the daily gate.
            store::reap(&self.db_pool, store::RETENTION_DAYS).await?;
        }

        if now.minute() % INCREMENTAL_PERIOD_MINUTES == 0 {
            self.send_incremental_alerts().await?;
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl Service for DigestService {
    fn name(&self) -> &'static str {
        "digest"
    }

    async fn run(&mut self) -> Result<(), anyhow::Error> {
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(TICK) => {}
            }

            if let Err(e) = self.tick().await {
                error!(error = ?e, "digest loop error, backing off");
                tokio::select! {
                    _ = self.cancel.cancelled() => break,
                    _ = tokio::time::sleep(ERROR_BACKOFF) => {}
                }
            }
        }

        info!("digest worker exited cleanly");
        Ok(())
    }

    async fn shutdown(&mut self) -> Result<(), anyhow::Error> {
        self.cancel.cancel();
        Ok(())
    }
}
