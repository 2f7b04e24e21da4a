use clap::Parser;

use crate::monitor::MonitorConfig;
use crate::prefs::TimeWindow;

/// Golf tee-time availability monitor
///
/// Periodically scrapes GolfBox booking grids for the monitored clubs,
/// detects newly available tee times, and emails users whose preferences
/// they match.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Global time window to monitor
    #[arg(long, default_value = "08:00-17:00")]
    pub time_window: TimeWindow,

    /// Check interval in seconds
    #[arg(long, default_value_t = 300)]
    pub interval: u64,

    /// Minimum number of free seats required
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..))]
    pub players: u32,

    /// Number of days to scan from today
    #[arg(long, default_value_t = 4, value_parser = clap::value_parser!(u32).range(1..=14))]
    pub days: u32,

    /// Local mode: skip stored user preferences and the web API, monitor the
    /// default club set with the CLI filters only
    #[arg(long)]
    pub local: bool,

    /// Log formatter to use
    #[arg(long, value_enum, default_value_t = default_tracing_format())]
    pub tracing: TracingFormat,
}

impl Args {
    /// Monitor knobs derived from the command line.
    pub fn monitor_config(&self) -> MonitorConfig {
        MonitorConfig {
            time_window: self.time_window,
            interval: std::time::Duration::from_secs(self.interval.max(1)),
            days_ahead: self.days,
            min_seats: self.players,
            ..MonitorConfig::default()
        }
    }
}

#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq)]
pub enum TracingFormat {
    /// Human-readable output (default in debug builds)
    Pretty,
    /// Line-delimited JSON (default in release builds)
    Json,
}

#[cfg(debug_assertions)]
const DEFAULT_TRACING_FORMAT: TracingFormat = TracingFormat::Pretty;
#[cfg(not(debug_assertions))]
const DEFAULT_TRACING_FORMAT: TracingFormat = TracingFormat::Json;

fn default_tracing_format() -> TracingFormat {
    DEFAULT_TRACING_FORMAT
}
