//! Store integration tests. Each test runs against its own freshly migrated
//! database provisioned by `#[sqlx::test]`.

mod helpers;

use chrono::{Duration, Utc};
use sqlx::PgPool;

use helpers::{insert_observation, make_user, today_plus};
use teewatch::store::models::{NewCycleRecord, NewObservation, NotificationKind};
use teewatch::store::{cycles, notifications, observations, preferences};

// ── observations ────────────────────────────────────────────────────────

#[sqlx::test]
async fn save_observations_skips_duplicates(pool: PgPool) {
    let observed_at = Utc::now();
    let obs = NewObservation {
        course_key: "oslo_golfklubb".to_string(),
        date: today_plus(1),
        hhmm: "09:00".to_string(),
        seats_available: 4,
        observed_at,
    };

    let written = observations::save_observations(&pool, &[obs.clone(), obs.clone()])
        .await
        .unwrap();
    assert_eq!(written, 1, "identical rows in one batch collapse");

    // Replaying the same batch writes nothing new.
    let written = observations::save_observations(&pool, &[obs]).await.unwrap();
    assert_eq!(written, 0);

    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM scraped_times")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(count, 1);
}

#[sqlx::test]
async fn latest_for_user_returns_most_recent_per_slot(pool: PgPool) {
    let user = make_user("kari@example.com", &["oslo_golfklubb"], 1, "07:00-18:00");
    preferences::put(&pool, &user).await.unwrap();

    let earlier = Utc::now() - Duration::hours(2);
    let later = Utc::now();
    insert_observation(&pool, "oslo_golfklubb", today_plus(1), "09:00", 2, earlier).await;
    insert_observation(&pool, "oslo_golfklubb", today_plus(1), "09:00", 4, later).await;
    // Another course the user did not select.
    insert_observation(&pool, "haga_gk", today_plus(1), "09:00", 4, later).await;

    let rows = observations::latest_for_user(&pool, &user).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].seats_available, 4, "latest scrape wins");
    assert_eq!(rows[0].course_key, "oslo_golfklubb");
}

#[sqlx::test]
async fn latest_for_user_horizon_is_half_open(pool: PgPool) {
    let mut user = make_user("kari@example.com", &["oslo_golfklubb"], 1, "07:00-18:00");
    user.days_ahead = 2;
    preferences::put(&pool, &user).await.unwrap();

    let now = Utc::now();
    insert_observation(&pool, "oslo_golfklubb", today_plus(0), "09:00", 4, now).await;
    insert_observation(&pool, "oslo_golfklubb", today_plus(1), "09:00", 4, now).await;
    insert_observation(&pool, "oslo_golfklubb", today_plus(2), "09:00", 4, now).await;
    insert_observation(&pool, "oslo_golfklubb", today_plus(-1), "09:00", 4, now).await;

    let rows = observations::latest_for_user(&pool, &user).await.unwrap();
    let dates: Vec<_> = rows.iter().map(|o| o.date).collect();
    // days_ahead = 2 scans today and tomorrow only.
    assert_eq!(dates, vec![today_plus(0), today_plus(1)]);
}

#[sqlx::test]
async fn new_for_user_excludes_already_notified(pool: PgPool) {
    let user = make_user("kari@example.com", &["oslo_golfklubb"], 2, "07:00-18:00");
    preferences::put(&pool, &user).await.unwrap();

    let now = Utc::now();
    insert_observation(&pool, "oslo_golfklubb", today_plus(1), "09:00", 4, now).await;
    insert_observation(&pool, "oslo_golfklubb", today_plus(1), "10:00", 3, now).await;
    // Below the user's seat minimum.
    insert_observation(&pool, "oslo_golfklubb", today_plus(1), "11:00", 1, now).await;

    notifications::record_sent(
        &pool,
        "kari@example.com",
        "oslo_golfklubb",
        today_plus(1),
        "09:00",
        NotificationKind::Incremental,
        "subject",
        "preview",
    )
    .await
    .unwrap();

    let rows = observations::new_for_user(&pool, &user, 24).await.unwrap();
    let times: Vec<_> = rows.iter().map(|o| o.hhmm.as_str()).collect();
    assert_eq!(times, vec!["10:00"]);
}

#[sqlx::test]
async fn new_for_user_ignores_daily_ledger_entries(pool: PgPool) {
    let user = make_user("kari@example.com", &["oslo_golfklubb"], 1, "07:00-18:00");
    preferences::put(&pool, &user).await.unwrap();

    insert_observation(&pool, "oslo_golfklubb", today_plus(1), "09:00", 4, Utc::now()).await;
    notifications::record_sent(
        &pool,
        "kari@example.com",
        "oslo_golfklubb",
        today_plus(1),
        "09:00",
        NotificationKind::Daily,
        "subject",
        "preview",
    )
    .await
    .unwrap();

    // A daily digest mention does not suppress the incremental alert.
    let rows = observations::new_for_user(&pool, &user, 24).await.unwrap();
    assert_eq!(rows.len(), 1);
}

#[sqlx::test]
async fn reap_removes_only_old_rows(pool: PgPool) {
    let user = make_user("kari@example.com", &["oslo_golfklubb"], 1, "07:00-18:00");
    preferences::put(&pool, &user).await.unwrap();

    insert_observation(
        &pool,
        "oslo_golfklubb",
        today_plus(0),
        "09:00",
        4,
        Utc::now() - Duration::days(40),
    )
    .await;
    insert_observation(&pool, "oslo_golfklubb", today_plus(0), "10:00", 4, Utc::now()).await;

    let reaped = observations::reap(&pool, 30).await.unwrap();
    assert_eq!(reaped, 1);

    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM scraped_times")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(count, 1);
}

// ── sent notifications ──────────────────────────────────────────────────

#[sqlx::test]
async fn sent_notifications_are_unique_per_tuple(pool: PgPool) {
    let user = make_user("kari@example.com", &["oslo_golfklubb"], 1, "07:00-18:00");
    preferences::put(&pool, &user).await.unwrap();

    for _ in 0..3 {
        notifications::record_sent(
            &pool,
            "kari@example.com",
            "oslo_golfklubb",
            today_plus(1),
            "09:00",
            NotificationKind::Incremental,
            "subject",
            "preview",
        )
        .await
        .unwrap();
    }
    // Same tuple, different kind: a separate row.
    notifications::record_sent(
        &pool,
        "kari@example.com",
        "oslo_golfklubb",
        today_plus(1),
        "09:00",
        NotificationKind::Daily,
        "subject",
        "preview",
    )
    .await
    .unwrap();

    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM sent_notifications")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(count, 2);

    let keys = notifications::sent_keys(&pool, "kari@example.com", NotificationKind::Incremental)
        .await
        .unwrap();
    assert_eq!(keys.len(), 1);
    assert!(keys.contains(&("oslo_golfklubb".to_string(), today_plus(1), "09:00".to_string())));
}

#[sqlx::test]
async fn deleting_a_user_cascades_to_their_ledger(pool: PgPool) {
    let user = make_user("kari@example.com", &["oslo_golfklubb"], 1, "07:00-18:00");
    preferences::put(&pool, &user).await.unwrap();
    notifications::record_sent(
        &pool,
        "kari@example.com",
        "oslo_golfklubb",
        today_plus(1),
        "09:00",
        NotificationKind::Daily,
        "subject",
        "preview",
    )
    .await
    .unwrap();

    assert!(preferences::delete(&pool, "kari@example.com").await.unwrap());

    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM sent_notifications")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(count, 0);
}

// ── preferences ─────────────────────────────────────────────────────────

#[sqlx::test]
async fn preference_round_trip_preserves_record(pool: PgPool) {
    let user = make_user("kari@example.com", &["oslo_golfklubb", "haga_gk"], 2, "07:00-12:00")
        .normalized();
    preferences::put(&pool, &user).await.unwrap();

    let loaded = preferences::get(&pool, "kari@example.com").await.unwrap().unwrap();
    assert_eq!(loaded, user);

    assert!(preferences::get(&pool, "nobody@example.com").await.unwrap().is_none());
    assert_eq!(preferences::count(&pool).await.unwrap(), 1);
}

#[sqlx::test]
async fn put_is_an_upsert(pool: PgPool) {
    let mut user = make_user("kari@example.com", &["oslo_golfklubb"], 1, "07:00-12:00");
    preferences::put(&pool, &user).await.unwrap();

    user.min_seats = 3;
    preferences::put(&pool, &user).await.unwrap();

    let all = preferences::get_all(&pool).await.unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all["kari@example.com"].min_seats, 3);
}

// ── cycles ──────────────────────────────────────────────────────────────

#[sqlx::test]
async fn cycle_records_round_trip(pool: PgPool) {
    let record = NewCycleRecord {
        check_kind: "scheduled".to_string(),
        user_email: None,
        availability: serde_json::json!({"oslo_golfklubb|2025-08-19": {"09:00": 4}}),
        courses_checked: vec!["oslo_golfklubb".to_string()],
        date_start: today_plus(0),
        date_end: today_plus(3),
        total_slots: 1,
        new_slots: 0,
        duration_seconds: 2.5,
        success: true,
        error: None,
    };

    let id = cycles::record_cycle(&pool, &record).await.unwrap();
    assert!(id > 0);

    let latest = cycles::latest(&pool).await.unwrap().unwrap();
    assert_eq!(latest.check_kind, "scheduled");
    assert_eq!(latest.total_slots, 1);
    assert!(latest.success);
    assert_eq!(latest.courses_checked, vec!["oslo_golfklubb".to_string()]);
}

#[sqlx::test]
async fn empty_store_has_no_latest_cycle(pool: PgPool) {
    assert!(cycles::latest(&pool).await.unwrap().is_none());
}
