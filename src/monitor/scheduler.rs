//! The monitor service: periodic multi-course, multi-day scan cycles.
//!
//! Each cycle runs scrape, persist, diff, match, notify, record, commit in
//! that order. Per-course failures are skipped; only a store write failure
//! aborts the service.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{Local, NaiveDate, Timelike, Utc};
use futures::StreamExt;
use rand::Rng;
use serde_json::json;
use sqlx::PgPool;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::catalog::{Catalog, rewrite_date};
use crate::grid::{GridParser, seats_from_labels};
use crate::monitor::diff::{ChangeDetector, SeatMap};
use crate::monitor::matcher::{self, BOOKING_BUFFER_MINUTES};
use crate::notify::{MatchedSlot, Notifier};
use crate::prefs::{TimeWindow, UserPreferences, parse_hhmm};
use crate::services::Service;
use crate::session::GolfboxSession;
use crate::store;
use crate::store::models::{NewCycleRecord, NewObservation, NotificationKind};

/// Simultaneous grid fetches within one cycle.
const FETCH_CONCURRENCY: usize = 4;

/// Consecutive fully-failed cycles before the interval starts doubling.
const FAILURES_BEFORE_BACKOFF: u32 = 3;

/// Backoff never stretches the interval beyond this factor.
const MAX_BACKOFF_MULTIPLIER: u32 = 4;

/// Global monitor knobs, CLI-overridable.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Global scrape filter window; per-user windows narrow further.
    pub time_window: TimeWindow,
    pub interval: Duration,
    pub jitter: Duration,
    pub days_ahead: u32,
    pub min_seats: u32,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            time_window: TimeWindow::new(8 * 60, 17 * 60).unwrap(),
            interval: Duration::from_secs(300),
            jitter: Duration::from_secs(20),
            days_ahead: 4,
            min_seats: 1,
        }
    }
}

/// Request for an out-of-schedule cycle, e.g. from the web API.
#[derive(Debug, Clone, Copy)]
pub struct CheckTrigger;

struct PairScrape {
    course_key: String,
    date: NaiveDate,
    /// Raw parser output. `None` when every fetch attempt failed; distinct
    /// from an empty map, which means the scrape succeeded and found
    /// nothing.
    parsed: Option<BTreeMap<String, Vec<String>>>,
}

struct CycleOutcome {
    all_failed: bool,
}

pub struct MonitorService {
    db_pool: PgPool,
    session: Arc<GolfboxSession>,
    catalog: Arc<Catalog>,
    parser: GridParser,
    notifier: Arc<Notifier>,
    config: MonitorConfig,
    /// Synthetic single-user profile used in `--local` mode instead of
    /// stored preferences.
    local_user: Option<UserPreferences>,
    trigger_rx: mpsc::Receiver<CheckTrigger>,
    detector: ChangeDetector,
    cancel: CancellationToken,
    consecutive_failures: u32,
    cycle: u64,
}

impl MonitorService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        db_pool: PgPool,
        session: Arc<GolfboxSession>,
        catalog: Arc<Catalog>,
        parser: GridParser,
        notifier: Arc<Notifier>,
        config: MonitorConfig,
        local_user: Option<UserPreferences>,
        trigger_rx: mpsc::Receiver<CheckTrigger>,
    ) -> Self {
        Self {
            db_pool,
            session,
            catalog,
            parser,
            notifier,
            config,
            local_user,
            trigger_rx,
            detector: ChangeDetector::new(),
            cancel: CancellationToken::new(),
            consecutive_failures: 0,
            cycle: 0,
        }
    }

    /// Loaded users, or the synthetic local profile.
    async fn users(&self) -> Vec<UserPreferences> {
        if let Some(user) = &self.local_user {
            return vec![user.clone()];
        }
        match store::preferences::get_all(&self.db_pool).await {
            Ok(users) => users.into_values().collect(),
            Err(e) => {
                warn!(error = ?e, "failed to load user preferences, using fallback set");
                Vec::new()
            }
        }
    }

    /// Union of all users' courses, restricted to the catalog; falls back to
    /// the static default list when nobody has preferences.
    fn monitored_keys(&self, users: &[UserPreferences]) -> Vec<String> {
        let mut keys: BTreeSet<String> = users
            .iter()
            .flat_map(|user| user.selected_courses.iter())
            .filter(|key| self.catalog.contains(key))
            .cloned()
            .collect();

        if keys.is_empty() {
            keys = Catalog::default_club_keys()
                .iter()
                .map(|k| k.to_string())
                .collect();
        }
        keys.into_iter().collect()
    }

    /// Reduce a parsed grid to `hhmm -> seats` entries that pass the global
    /// window, seat minimum, and (for today) the elapsed-time buffer.
    fn globally_filtered(
        &self,
        parsed: BTreeMap<String, Vec<String>>,
        date: NaiveDate,
        today: NaiveDate,
        now_minute: u16,
    ) -> SeatMap {
        parsed
            .into_iter()
            .filter_map(|(hhmm, labels)| {
                let minute = parse_hhmm(&hhmm)?;
                if !self.config.time_window.contains(minute) {
                    return None;
                }
                if date == today && minute <= now_minute.saturating_add(BOOKING_BUFFER_MINUTES) {
                    return None;
                }
                let seats = seats_from_labels(&labels);
                (seats >= self.config.min_seats).then_some((hhmm, seats))
            })
            .collect()
    }

    async fn run_cycle(&mut self, check_kind: &str) -> crate::error::Result<CycleOutcome> {
        let started = Instant::now();
        self.cycle += 1;

        let now = Local::now();
        let today = now.date_naive();
        let now_time = now.time();
        let now_minute = (now_time.hour() * 60 + now_time.minute()) as u16;

        let users = self.users().await;
        let monitored = self.monitored_keys(&users);
        let dates: Vec<NaiveDate> = (0..self.config.days_ahead)
            .map(|i| today + chrono::Days::new(i as u64))
            .collect();

        info!(
            cycle = self.cycle,
            kind = check_kind,
            courses = monitored.len(),
            days = dates.len(),
            users = users.len(),
            "cycle started"
        );

        // One URL per club, materialized once and date-rewritten per day.
        let mut pairs = Vec::new();
        for key in &monitored {
            let Some(club) = self.catalog.lookup(key) else {
                continue;
            };
            let base_url = club.url_for_date(today, None);
            for &date in &dates {
                pairs.push((key.clone(), rewrite_date(&base_url, date), date));
            }
        }

        let session = self.session.clone();
        let parser = self.parser;
        let results: Vec<PairScrape> = futures::stream::iter(pairs.into_iter().map(
            |(course_key, url, date)| {
                let session = session.clone();
                async move {
                    match session.fetch(&url).await {
                        Ok(html) => {
                            let parsed = parser.parse(&html);
                            debug!(course = %course_key, %date, times = parsed.len(), "grid parsed");
                            PairScrape {
                                course_key,
                                date,
                                parsed: Some(parsed),
                            }
                        }
                        Err(e) => {
                            warn!(course = %course_key, %date, error = %e, "grid fetch failed, skipping");
                            PairScrape {
                                course_key,
                                date,
                                parsed: None,
                            }
                        }
                    }
                }
            },
        ))
        .buffer_unordered(FETCH_CONCURRENCY)
        .collect()
        .await;

        if self.cancel.is_cancelled() {
            return Ok(CycleOutcome { all_failed: false });
        }

        let attempted = results.len();
        let failed = results.iter().filter(|r| r.parsed.is_none()).count();

        // Apply the global filters once, before persistence and diffing.
        let filtered: Vec<(String, NaiveDate, Option<SeatMap>)> = results
            .into_iter()
            .map(|scrape| {
                let seats = scrape
                    .parsed
                    .map(|parsed| self.globally_filtered(parsed, scrape.date, today, now_minute));
                (scrape.course_key, scrape.date, seats)
            })
            .collect();

        // Persist successful scrapes. Failed pairs record nothing, so the
        // previous successful observation stays the latest.
        let observed_at = Utc::now();
        let batch: Vec<NewObservation> = filtered
            .iter()
            .filter_map(|(course_key, date, seats)| seats.as_ref().map(|s| (course_key, date, s)))
            .flat_map(|(course_key, date, seats)| {
                seats.iter().map(move |(hhmm, &count)| NewObservation {
                    course_key: course_key.clone(),
                    date: *date,
                    hhmm: hhmm.clone(),
                    seats_available: count as i32,
                    observed_at,
                })
            })
            .collect();
        let total_slots = batch.len();
        store::observations::save_observations(&self.db_pool, &batch).await?;

        // Diff against the previous cycle. A failed pair is ingested as
        // empty, matching "no availability seen".
        for (course_key, date, seats) in &filtered {
            self.detector
                .ingest(course_key.clone(), *date, seats.clone().unwrap_or_default());
        }
        let deltas = self.detector.diff();
        let new_slots: usize = deltas
            .values()
            .map(|d| d.added.len() + d.increased.len())
            .sum();

        if new_slots > 0 {
            info!(cycle = self.cycle, new_slots, "new availability detected");
        }

        // Per-user incremental notifications for slots that appeared or grew
        // into qualifying this cycle.
        for user in &users {
            let mut slots: Vec<MatchedSlot> = Vec::new();
            for ((course_key, date), delta) in &deltas {
                let candidates = delta
                    .added
                    .iter()
                    .map(|(hhmm, seats)| (hhmm, *seats))
                    .chain(delta.increased.iter().map(|(hhmm, _, seats)| (hhmm, *seats)));
                for (hhmm, seats) in candidates {
                    if matcher::matches_slot(user, course_key, *date, hhmm, seats, today, now_time)
                    {
                        slots.push(MatchedSlot {
                            course_key: course_key.clone(),
                            date: *date,
                            hhmm: hhmm.clone(),
                            seats,
                        });
                    }
                }
            }
            if slots.is_empty() {
                continue;
            }
            if let Err(e) = self
                .notifier
                .dispatch(user, slots, NotificationKind::Incremental)
                .await
            {
                warn!(user = %user.email, error = ?e, "incremental dispatch failed");
            }
        }

        // Cycle summary row.
        let availability: serde_json::Map<String, serde_json::Value> = filtered
            .iter()
            .filter_map(|(course_key, date, seats)| {
                seats
                    .as_ref()
                    .map(|s| (format!("{course_key}|{date}"), json!(s)))
            })
            .collect();
        let all_failed = attempted > 0 && failed == attempted;
        let record = NewCycleRecord {
            check_kind: check_kind.to_string(),
            user_email: None,
            availability: serde_json::Value::Object(availability),
            courses_checked: monitored,
            date_start: today,
            date_end: dates.last().copied().unwrap_or(today),
            total_slots: total_slots as i32,
            new_slots: new_slots as i32,
            duration_seconds: started.elapsed().as_secs_f64(),
            success: !all_failed,
            error: all_failed.then(|| "all course fetches failed".to_string()),
        };
        store::cycles::record_cycle(&self.db_pool, &record).await?;

        self.detector.commit();

        info!(
            cycle = self.cycle,
            kind = check_kind,
            attempted,
            failed,
            total_slots,
            new_slots,
            duration = ?started.elapsed(),
            "cycle finished"
        );

        Ok(CycleOutcome { all_failed })
    }

    /// Sleep length before the next cycle: base interval, stretched by
    /// backoff after repeated fully-failed cycles, with uniform jitter in
    /// `[-jitter/2, +jitter]`.
    fn next_delay(&self) -> Duration {
        let multiplier = if self.consecutive_failures < FAILURES_BEFORE_BACKOFF {
            1
        } else {
            let doublings = self.consecutive_failures - FAILURES_BEFORE_BACKOFF + 1;
            (1u32 << doublings.min(8)).min(MAX_BACKOFF_MULTIPLIER)
        };

        let base = self.config.interval * multiplier;
        let jitter_ms = self.config.jitter.as_millis() as i64;
        let offset = if jitter_ms > 0 {
            rand::rng().random_range(-jitter_ms / 2..=jitter_ms)
        } else {
            0
        };

        let total = base.as_millis() as i64 + offset;
        Duration::from_millis(total.max(1000) as u64)
    }
}

#[async_trait::async_trait]
impl Service for MonitorService {
    fn name(&self) -> &'static str {
        "monitor"
    }

    async fn run(&mut self) -> Result<(), anyhow::Error> {
        // Without authentication every grid fetch would bounce to the login
        // page, so failing to establish a session here is fatal.
        self.session.ensure_logged_in().await?;
        info!("monitor authenticated and running");

        let mut delay = Duration::ZERO;
        loop {
            let check_kind = tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(delay) => "scheduled",
                Some(CheckTrigger) = self.trigger_rx.recv() => {
                    info!("immediate check requested");
                    "immediate"
                }
            };

            match self.run_cycle(check_kind).await {
                Ok(outcome) => {
                    if outcome.all_failed {
                        self.consecutive_failures += 1;
                        warn!(
                            consecutive = self.consecutive_failures,
                            "cycle failed for every course"
                        );
                    } else {
                        self.consecutive_failures = 0;
                    }
                }
                // Store write failures abort the loop: continuing would
                // silently lose observations.
                Err(e) => {
                    self.session.close();
                    return Err(e.context("cycle aborted on store failure"));
                }
            }

            if self.cancel.is_cancelled() {
                break;
            }
            delay = self.next_delay();
            debug!(delay = ?delay, "sleeping until next cycle");
        }

        self.session.close();
        info!("monitor exited cleanly");
        Ok(())
    }

    async fn shutdown(&mut self) -> Result<(), anyhow::Error> {
        self.cancel.cancel();
        Ok(())
    }
}
