use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use sqlx::postgres::PgPoolOptions;
use tokio::signal;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use teewatch::catalog::Catalog;
use teewatch::cli::Args;
use teewatch::config::Config;
use teewatch::digest::DigestService;
use teewatch::grid::GridParser;
use teewatch::logging::setup_logging;
use teewatch::monitor::MonitorService;
use teewatch::notify::{Mailer, Notifier};
use teewatch::prefs::{TimePreferences, UserPreferences};
use teewatch::services::manager::ServiceManager;
use teewatch::services::web::WebService;
use teewatch::services::ServiceResult;
use teewatch::session::{GolfboxSession, SessionConfig, SessionError};
use teewatch::state::AppState;
use teewatch::store;

/// Exit code when authentication could not be established.
const EXIT_AUTH: u8 = 2;
/// Exit code for unrecoverable configuration or database errors.
const EXIT_FATAL: u8 = 1;

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    let args = Args::parse();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("invalid configuration: {e}");
            return ExitCode::from(EXIT_FATAL);
        }
    };

    setup_logging(&config, args.tracing);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        environment = if cfg!(debug_assertions) {
            "development"
        } else {
            "production"
        },
        "starting teewatch"
    );

    let db_pool = match PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await
    {
        Ok(pool) => pool,
        Err(e) => {
            error!(error = %e, "database unreachable");
            return ExitCode::from(EXIT_FATAL);
        }
    };

    if let Err(e) = store::run_migrations(&db_pool).await {
        error!(error = ?e, "migrations failed");
        return ExitCode::from(EXIT_FATAL);
    }

    let Some(credentials) = config.credentials() else {
        error!("GOLFBOX_USER and GOLFBOX_PASS must be set");
        return ExitCode::from(EXIT_AUTH);
    };

    let session = match GolfboxSession::new(SessionConfig {
        credentials,
        cookie_jar_path: config.cookie_jar_path.clone(),
    }) {
        Ok(session) => Arc::new(session),
        Err(e) => {
            error!(error = ?e, "failed to create portal session");
            return ExitCode::from(EXIT_FATAL);
        }
    };

    let catalog = Arc::new(Catalog::builtin());
    let parser = GridParser::new(config.tee_capacity);

    let mailer = match config.smtp_settings() {
        Some(settings) => match Mailer::from_settings(&settings) {
            Ok(mailer) => mailer,
            Err(e) => {
                error!(error = ?e, "invalid SMTP configuration");
                return ExitCode::from(EXIT_FATAL);
            }
        },
        None => {
            info!("email delivery disabled");
            Mailer::disabled()
        }
    };
    let notifier = Arc::new(Notifier::new(db_pool.clone(), mailer, catalog.clone()));

    let monitor_config = args.monitor_config();
    info!(
        time_window = %monitor_config.time_window,
        interval = ?monitor_config.interval,
        days_ahead = monitor_config.days_ahead,
        min_seats = monitor_config.min_seats,
        port = config.port,
        shutdown_timeout = ?config.shutdown_timeout,
        local = args.local,
        "configuration loaded"
    );

    // Local mode monitors the default club set for a single synthetic user
    // built from the CLI filters, without the web API.
    let local_user = if args.local {
        let email = config
            .email_to
            .as_deref()
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .find(|addr| !addr.is_empty())
            .unwrap_or("local@teewatch")
            .to_string();
        let user = UserPreferences {
            name: "Local monitor".to_string(),
            email,
            selected_courses: Catalog::default_club_keys()
                .iter()
                .map(|k| k.to_string())
                .collect(),
            min_seats: args.players,
            days_ahead: args.days,
            time_preferences: TimePreferences::SameAllDays {
                windows: vec![args.time_window],
            },
        }
        .normalized();

        // The sent-notification ledger references user_preferences, so the
        // synthetic profile must exist as a row too.
        if let Err(e) = store::preferences::put(&db_pool, &user).await {
            error!(error = ?e, "failed to persist local profile");
            return ExitCode::from(EXIT_FATAL);
        }
        info!(user = %user.email, "running in local mode");
        Some(user)
    } else {
        None
    };

    let (check_tx, check_rx) = mpsc::channel(1);

    let mut manager = ServiceManager::new();
    manager.register(
        "monitor",
        Box::new(MonitorService::new(
            db_pool.clone(),
            session,
            catalog.clone(),
            parser,
            notifier.clone(),
            monitor_config,
            local_user,
            check_rx,
        )),
    );
    manager.register("digest", Box::new(DigestService::new(db_pool.clone(), notifier)));
    if !args.local {
        let app_state = AppState::new(db_pool.clone(), catalog.clone(), check_tx);
        manager.register("web", Box::new(WebService::new(config.port, app_state)));
    }
    manager.spawn_all();

    let shutdown_timeout = config.shutdown_timeout;

    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install CTRL+C signal handler");
        info!("received ctrl+c, shutting down");
    };

    #[cfg(unix)]
    let sigterm = async {
        use tokio::signal::unix::{SignalKind, signal};
        let mut sigterm_stream =
            signal(SignalKind::terminate()).expect("failed to install SIGTERM signal handler");
        sigterm_stream.recv().await;
        info!("received SIGTERM, shutting down");
    };

    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    let mut exit_code: u8 = 0;

    tokio::select! {
        (service_name, result) = manager.wait_any() => {
            match result {
                ServiceResult::GracefulShutdown => {
                    info!(service = service_name, "service completed gracefully");
                }
                ServiceResult::NormalCompletion => {
                    warn!(service = service_name, "service completed unexpectedly");
                    exit_code = EXIT_FATAL;
                }
                ServiceResult::Error(e) => {
                    error!(service = service_name, error = ?e, "service failed");
                    exit_code = if is_auth_failure(&e) { EXIT_AUTH } else { EXIT_FATAL };
                }
            }

            if let Err(pending) = manager.shutdown(shutdown_timeout).await {
                warn!(pending = ?pending, "some services did not stop in time");
                if exit_code == 0 {
                    exit_code = EXIT_FATAL;
                }
            }
        }
        _ = ctrl_c => {
            if let Err(pending) = manager.shutdown(shutdown_timeout).await {
                warn!(pending = ?pending, "some services did not stop in time");
            }
        }
        _ = sigterm => {
            if let Err(pending) = manager.shutdown(shutdown_timeout).await {
                warn!(pending = ?pending, "some services did not stop in time");
            }
        }
    }

    db_pool.close().await;
    info!(exit_code, "shutdown complete");
    ExitCode::from(exit_code)
}

/// Did this service error bottom out in a failed authentication?
fn is_auth_failure(error: &anyhow::Error) -> bool {
    error
        .chain()
        .any(|cause| matches!(cause.downcast_ref::<SessionError>(), Some(SessionError::AuthFailed(_))))
}
