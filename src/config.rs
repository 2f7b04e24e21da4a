//! Configuration loading.
//!
//! Everything comes from environment variables (plus `.env` in development)
//! through figment. Durations accept both bare seconds and unit strings
//! ("30s", "2m") via fundu.

use std::path::PathBuf;
use std::time::Duration;

use fundu::{DurationParser, TimeUnit};
use serde::{Deserialize, Deserializer};

use crate::notify::SmtpSettings;
use crate::session::Credentials;

/// Main application configuration.
#[derive(Debug, Deserialize)]
pub struct Config {
    /// Log level for this application's own targets. One of trace, debug,
    /// info, warn, error. Defaults to "info".
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Port for the web server (default: 8080).
    #[serde(default = "default_port")]
    pub port: u16,

    /// Database connection URL. Required; the process exits without it.
    pub database_url: String,

    /// Graceful shutdown timeout (default: 8 seconds).
    #[serde(
        default = "default_shutdown_timeout",
        deserialize_with = "deserialize_duration"
    )]
    pub shutdown_timeout: Duration,

    /// GolfBox portal credentials.
    #[serde(default)]
    pub golfbox_user: Option<String>,
    #[serde(default)]
    pub golfbox_pass: Option<String>,

    /// Where session cookies are persisted between runs.
    #[serde(default = "default_cookie_jar_path")]
    pub cookie_jar_path: PathBuf,

    /// Seats per tee time when the grid does not say (default: 4).
    #[serde(default = "default_tee_capacity")]
    pub tee_capacity: u32,

    // SMTP delivery settings. Email is off unless EMAIL_ENABLED is set and
    // the host/user/pass/from quartet is complete.
    #[serde(default)]
    pub email_enabled: bool,
    #[serde(default)]
    pub smtp_host: Option<String>,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    #[serde(default)]
    pub smtp_user: Option<String>,
    #[serde(default)]
    pub smtp_pass: Option<String>,
    #[serde(default)]
    pub email_from: Option<String>,
    /// Extra comma-separated recipients copied on every notification.
    #[serde(default)]
    pub email_to: Option<String>,
    #[serde(default)]
    pub smtp_ssl: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_shutdown_timeout() -> Duration {
    Duration::from_secs(8)
}

fn default_cookie_jar_path() -> PathBuf {
    PathBuf::from("golfbox_cookies.json")
}

fn default_tee_capacity() -> u32 {
    4
}

fn default_smtp_port() -> u16 {
    587
}

impl Config {
    /// Load from the process environment.
    pub fn from_env() -> Result<Self, figment::Error> {
        use figment::providers::Env;
        figment::Figment::new().merge(Env::raw()).extract()
    }

    /// Portal credentials, if both halves are present.
    pub fn credentials(&self) -> Option<Credentials> {
        match (&self.golfbox_user, &self.golfbox_pass) {
            (Some(username), Some(password)) => Some(Credentials {
                username: username.clone(),
                password: password.clone(),
            }),
            _ => None,
        }
    }

    /// Resolved SMTP settings, or `None` when email is disabled or
    /// incompletely configured.
    pub fn smtp_settings(&self) -> Option<SmtpSettings> {
        if !self.email_enabled {
            return None;
        }
        let (host, username, password, from) = match (
            &self.smtp_host,
            &self.smtp_user,
            &self.smtp_pass,
            &self.email_from,
        ) {
            (Some(host), Some(user), Some(pass), Some(from)) => (host, user, pass, from),
            _ => return None,
        };

        let extra_recipients = self
            .email_to
            .as_deref()
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|addr| !addr.is_empty())
            .map(str::to_string)
            .collect();

        Some(SmtpSettings {
            host: host.clone(),
            port: self.smtp_port,
            username: username.clone(),
            password: password.clone(),
            from: from.clone(),
            extra_recipients,
            ssl: self.smtp_ssl,
        })
    }
}

/// Duration parser: seconds by default, also accepts ms and minutes, with
/// optional whitespace between number and unit.
const DURATION_PARSER: DurationParser<'static> = DurationParser::builder()
    .time_units(&[TimeUnit::Second, TimeUnit::MilliSecond, TimeUnit::Minute])
    .allow_time_unit_delimiter()
    .disable_infinity()
    .disable_fraction()
    .disable_exponent()
    .default_unit(TimeUnit::Second)
    .build();

/// Parse a duration string like "30s", "1500ms", "2m", or bare seconds.
fn parse_duration(text: &str) -> Result<Duration, String> {
    DURATION_PARSER
        .parse(text)
        .map_err(|e| {
            format!("invalid duration '{text}': {e}. Examples: '5' (seconds), '1500ms', '30s', '2m'")
        })?
        .try_into()
        .map_err(|e| format!("duration '{text}' out of range: {e}"))
}

/// A duration field as it arrives from the environment: either a bare
/// number of seconds or a unit string for [`parse_duration`].
#[derive(Deserialize)]
#[serde(untagged)]
enum RawDuration {
    Seconds(u64),
    Text(String),
}

fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    match RawDuration::deserialize(deserializer)? {
        RawDuration::Seconds(secs) => Ok(Duration::from_secs(secs)),
        RawDuration::Text(text) => parse_duration(&text).map_err(serde::de::Error::custom),
    }
}
