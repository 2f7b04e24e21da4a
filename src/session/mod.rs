//! Authenticated HTTP session against the GolfBox portal.
//!
//! One shared `reqwest` client with a disk-persisted cookie jar serves every
//! grid fetch. Login happens lazily and at most once at a time; fetches that
//! land on a login page re-authenticate once and retry.

mod cookies;
mod errors;
mod login;

pub use cookies::PersistentJar;
pub use errors::SessionError;
pub use login::{Credentials, HeuristicStrategy, LoginStrategy};

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::Client;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

const PORTAL_HOME_URL: &str = "https://www.golfbox.no/site/my_golfbox/myFrontPage.asp";
const PORTAL_LOGIN_URL: &str = "https://golfbox.golf/#/";

/// Retries per fetch before the cycle gives up on a course.
const FETCH_ATTEMPTS: usize = 3;

const HTTP_TIMEOUT: Duration = Duration::from_secs(15);

fn user_agent() -> &'static str {
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36"
}

/// Construction parameters for [`GolfboxSession`].
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub credentials: Credentials,
    pub cookie_jar_path: PathBuf,
}

/// Thread-safe authenticated fetcher. Cloneable via `Arc`; concurrent
/// `fetch` calls share the client, while logins serialize behind a mutex.
pub struct GolfboxSession {
    client: Client,
    jar: Arc<PersistentJar>,
    credentials: Credentials,
    strategies: Vec<Box<dyn LoginStrategy>>,
    // Holds whether a login has been verified this process lifetime.
    login_state: Mutex<bool>,
}

impl GolfboxSession {
    pub fn new(config: SessionConfig) -> Result<Self> {
        let jar = Arc::new(PersistentJar::load_or_default(config.cookie_jar_path));

        let client = Client::builder()
            .cookie_provider(jar.clone())
            .user_agent(user_agent())
            .connect_timeout(HTTP_TIMEOUT)
            .read_timeout(HTTP_TIMEOUT)
            .timeout(Duration::from_secs(30))
            .tcp_keepalive(Some(Duration::from_secs(5 * 60)))
            .build()
            .context("failed to create HTTP client")?;

        Ok(Self {
            client,
            jar,
            credentials: config.credentials,
            strategies: vec![Box::new(HeuristicStrategy)],
            login_state: Mutex::new(false),
        })
    }

    /// Ensure the session is authenticated. Idempotent; a persisted cookie
    /// jar that still verifies skips the login flow entirely.
    pub async fn ensure_logged_in(&self) -> Result<(), SessionError> {
        let mut logged_in = self.login_state.lock().await;
        if *logged_in {
            return Ok(());
        }

        // A jar restored from disk often makes login unnecessary.
        if !self.jar.is_empty() && self.probe_home().await.unwrap_or(false) {
            info!("reusing persisted session cookies");
            *logged_in = true;
            return Ok(());
        }

        for strategy in &self.strategies {
            debug!(strategy = strategy.name(), "attempting login");
            match strategy
                .attempt(&self.client, PORTAL_LOGIN_URL, PORTAL_HOME_URL, &self.credentials)
                .await
            {
                Ok(true) => {
                    info!(strategy = strategy.name(), "login verified");
                    if let Err(e) = self.jar.persist() {
                        warn!(error = %e, "failed to persist session cookies");
                    }
                    *logged_in = true;
                    return Ok(());
                }
                Ok(false) => {
                    debug!(strategy = strategy.name(), "login not verified");
                }
                Err(e) => {
                    warn!(strategy = strategy.name(), error = %e, "login attempt errored");
                }
            }
        }

        Err(SessionError::AuthFailed(
            "all login strategies exhausted".to_string(),
        ))
    }

    /// Drop the verified flag so the next fetch re-authenticates.
    pub async fn invalidate(&self) {
        *self.login_state.lock().await = false;
    }

    /// Fetch a page, retrying transport errors with exponential backoff and
    /// re-authenticating once when a login page is detected mid-session.
    pub async fn fetch(&self, url: &str) -> Result<String, SessionError> {
        let mut relogged = false;
        let mut last_error: Option<reqwest::Error> = None;

        for attempt in 1..=FETCH_ATTEMPTS {
            match self.fetch_once(url).await {
                Ok(FetchOutcome::Page(body)) => return Ok(body),
                Ok(FetchOutcome::LoginPage) if !relogged => {
                    warn!(url, "login page encountered mid-session, re-authenticating");
                    relogged = true;
                    self.invalidate().await;
                    self.ensure_logged_in().await?;
                }
                Ok(FetchOutcome::LoginPage) => {
                    return Err(SessionError::AuthFailed(format!(
                        "still redirected to login after re-authentication for {url}"
                    )));
                }
                Err(e) => {
                    debug!(url, attempt, error = %e, "fetch attempt failed");
                    last_error = Some(e);
                    if attempt < FETCH_ATTEMPTS {
                        tokio::time::sleep(Duration::from_secs(1 << (attempt - 1))).await;
                    }
                }
            }
        }

        match last_error {
            Some(source) => Err(SessionError::Transport {
                url: url.to_string(),
                attempts: FETCH_ATTEMPTS,
                source,
            }),
            // Only reachable when every attempt landed on a login page.
            None => Err(SessionError::AuthFailed(format!(
                "could not fetch {url} as an authenticated user"
            ))),
        }
    }

    async fn fetch_once(&self, url: &str) -> Result<FetchOutcome, reqwest::Error> {
        let response = self
            .client
            .get(url)
            .header(reqwest::header::REFERER, PORTAL_HOME_URL)
            .header(reqwest::header::CACHE_CONTROL, "no-cache, no-store, must-revalidate")
            .send()
            .await?
            .error_for_status()?;

        let final_url = response.url().to_string();
        let body = response.text().await?;

        if login::is_login_url(&final_url) && !login::looks_logged_in(&body) {
            return Ok(FetchOutcome::LoginPage);
        }
        Ok(FetchOutcome::Page(body))
    }

    async fn probe_home(&self) -> Result<bool> {
        let response = self.client.get(PORTAL_HOME_URL).send().await?;
        let final_url = response.url().to_string();
        let body = response.text().await?;
        Ok(!login::is_login_url(&final_url) && login::looks_logged_in(&body))
    }

    /// Flush session state; called on shutdown.
    pub fn close(&self) {
        if let Err(e) = self.jar.persist() {
            warn!(error = %e, "failed to flush cookie jar on close");
        }
    }
}

enum FetchOutcome {
    Page(String),
    LoginPage,
}
