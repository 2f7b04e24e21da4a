//! Pluggable login strategies.
//!
//! The session tries each strategy in order until one verifies. Only the
//! heuristic form strategy ships here; selector-proposing strategies (e.g.
//! LLM-assisted) plug in through the same trait.

use std::collections::HashMap;
use std::sync::LazyLock;

use anyhow::{Context, Result};
use async_trait::async_trait;
use html_scraper::{ElementRef, Html, Selector};
use reqwest::Client;
use tracing::{debug, warn};

/// Login credentials for the booking portal.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// Markers that appear in page text only after a successful login.
pub const LOGGED_IN_MARKERS: &[&str] =
    &["logout", "logg ut", "min side", "dashboard", "velkommen"];

/// URL fragments that identify a login (or login-help) page.
pub const LOGIN_URL_MARKERS: &[&str] = &["login", "logg_inn"];

const USERNAME_KEYWORDS: &[&str] = &["email", "user", "login", "brukernavn"];
const PASSWORD_KEYWORDS: &[&str] = &["password", "pass", "passord", "pwd"];
const SUBMIT_KEYWORDS: &[&str] = &["logg inn", "login", "sign in", "submit"];

/// Endpoints probed when the login page carries no parseable form.
const FALLBACK_LOGIN_PATHS: &[&str] = &["/api/login", "/login", "/auth/login"];

/// Does this response look like an authenticated page?
pub fn looks_logged_in(body: &str) -> bool {
    let lower = body.to_lowercase();
    LOGGED_IN_MARKERS.iter().any(|marker| lower.contains(marker))
}

/// Does this final URL point at a login flow?
pub fn is_login_url(url: &str) -> bool {
    let lower = url.to_lowercase();
    LOGIN_URL_MARKERS.iter().any(|marker| lower.contains(marker))
}

/// A single way of getting the session authenticated.
#[async_trait]
pub trait LoginStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Attempt a login through `client` (which carries the shared cookie
    /// jar). Returns `Ok(true)` when the post-login verification passed.
    async fn attempt(
        &self,
        client: &Client,
        login_url: &str,
        home_url: &str,
        credentials: &Credentials,
    ) -> Result<bool>;
}

static FORM_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("form").unwrap());
static INPUT_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("input").unwrap());
static SUBMIT_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("button, input[type='submit']").unwrap());

/// Classifies visible form inputs by keyword and posts the form.
pub struct HeuristicStrategy;

/// Everything needed to replay a login form, extracted before any await so
/// the non-`Send` DOM handle never crosses a suspension point.
struct FormPlan {
    action: Option<String>,
    method: String,
    fields: Vec<(String, String)>,
}

impl HeuristicStrategy {
    fn classify_input(input: ElementRef, credentials: &Credentials) -> Option<(String, String)> {
        let value = input.value();
        let name = value.attr("name")?.to_string();
        let input_type = value.attr("type").unwrap_or("text").to_lowercase();
        let haystack = format!(
            "{} {} {} {}",
            name.to_lowercase(),
            value.attr("id").unwrap_or_default().to_lowercase(),
            value.attr("placeholder").unwrap_or_default().to_lowercase(),
            input_type,
        );

        if input_type == "password" || PASSWORD_KEYWORDS.iter().any(|k| haystack.contains(k)) {
            return Some((name, credentials.password.clone()));
        }
        if matches!(input_type.as_str(), "email" | "text")
            && USERNAME_KEYWORDS.iter().any(|k| haystack.contains(k))
        {
            return Some((name, credentials.username.clone()));
        }
        if matches!(input_type.as_str(), "hidden" | "submit") {
            return Some((name, value.attr("value").unwrap_or_default().to_string()));
        }
        None
    }

    /// Parse the login page into a replayable form, or `None` when the page
    /// carries no form at all.
    fn plan_form(body: &str, credentials: &Credentials) -> Option<FormPlan> {
        let doc = Html::parse_document(body);
        let form = doc.select(&FORM_SEL).next()?;

        let mut fields: Vec<(String, String)> = Vec::new();
        let mut saw_password = false;

        for input in form.select(&INPUT_SEL) {
            if let Some((name, value)) = Self::classify_input(input, credentials) {
                saw_password |= value == credentials.password;
                fields.push((name, value));
            }
        }

        if !saw_password {
            debug!("login form has no recognizable password field");
        }

        // The submit control is informational here (the POST target is the
        // form action), but a named submit button must be included in the
        // payload the way a browser would.
        for button in form.select(&SUBMIT_SEL) {
            let value = button.value();
            let text: String = button.text().collect::<String>().to_lowercase();
            let is_submit = value.attr("type").is_some_and(|t| t.eq_ignore_ascii_case("submit"))
                || SUBMIT_KEYWORDS.iter().any(|k| text.contains(k));
            if is_submit
                && let Some(name) = value.attr("name")
                && !fields.iter().any(|(n, _)| n == name)
            {
                fields.push((name.to_string(), value.attr("value").unwrap_or_default().to_string()));
            }
        }

        Some(FormPlan {
            action: form.value().attr("action").map(str::to_string),
            method: form
                .value()
                .attr("method")
                .unwrap_or("post")
                .to_lowercase(),
            fields,
        })
    }

    fn resolve_action(login_url: &str, action: Option<&str>) -> String {
        match action {
            None | Some("") => login_url.to_string(),
            Some(action) if action.starts_with("http") => action.to_string(),
            Some(action) => match url::Url::parse(login_url).and_then(|base| base.join(action)) {
                Ok(joined) => joined.to_string(),
                Err(_) => login_url.to_string(),
            },
        }
    }

    async fn verify(client: &Client, home_url: &str) -> Result<bool> {
        let response = client.get(home_url).send().await.context("verification fetch failed")?;
        let final_url = response.url().to_string();
        let body = response.text().await.context("verification body unreadable")?;
        Ok(!is_login_url(&final_url) && looks_logged_in(&body))
    }
}

#[async_trait]
impl LoginStrategy for HeuristicStrategy {
    fn name(&self) -> &'static str {
        "heuristic"
    }

    async fn attempt(
        &self,
        client: &Client,
        login_url: &str,
        home_url: &str,
        credentials: &Credentials,
    ) -> Result<bool> {
        let response = client
            .get(login_url)
            .send()
            .await
            .context("failed to load login page")?;
        let body = response.text().await.context("login page unreadable")?;

        if looks_logged_in(&body) {
            debug!("persisted session still valid, skipping login");
            return Ok(true);
        }

        match Self::plan_form(&body, credentials) {
            Some(plan) => {
                let action = Self::resolve_action(login_url, plan.action.as_deref());
                debug!(action = %action, method = %plan.method, "submitting login form");

                let request = if plan.method == "get" {
                    client.get(&action).query(&plan.fields)
                } else {
                    client.post(&action).form(&plan.fields)
                };
                request
                    .header(reqwest::header::REFERER, login_url)
                    .send()
                    .await
                    .context("login form submission failed")?;

                Self::verify(client, home_url).await
            }
            None => {
                // No form at all (script-rendered page): probe the known
                // login endpoints with a permissive payload.
                let base = url::Url::parse(login_url).context("invalid login url")?;
                let payload: HashMap<&str, &str> = HashMap::from([
                    ("email", credentials.username.as_str()),
                    ("username", credentials.username.as_str()),
                    ("user", credentials.username.as_str()),
                    ("brukernavn", credentials.username.as_str()),
                    ("password", credentials.password.as_str()),
                    ("passord", credentials.password.as_str()),
                ]);

                for path in FALLBACK_LOGIN_PATHS {
                    let Ok(endpoint) = base.join(path) else { continue };
                    let sent = client
                        .post(endpoint.clone())
                        .form(&payload)
                        .header(reqwest::header::REFERER, login_url)
                        .send()
                        .await;
                    match sent {
                        Ok(response) if response.status().is_success() => {
                            if Self::verify(client, home_url).await? {
                                return Ok(true);
                            }
                        }
                        Ok(_) => {}
                        Err(e) => warn!(endpoint = %endpoint, error = %e, "fallback login endpoint failed"),
                    }
                }
                Ok(false)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn creds() -> Credentials {
        Credentials {
            username: "golfer@example.com".to_string(),
            password: "hunter2".to_string(),
        }
    }

    #[test]
    fn classifies_norwegian_form_fields() {
        let html = r#"
            <form action="/portal/login.asp" method="post">
              <input type="text" name="brukernavn" placeholder="Brukernavn">
              <input type="password" name="passord">
              <input type="hidden" name="csrf" value="tok123">
              <button type="submit">Logg inn</button>
            </form>
        "#;
        let plan = HeuristicStrategy::plan_form(html, &creds()).unwrap();
        assert_eq!(plan.action.as_deref(), Some("/portal/login.asp"));
        assert_eq!(plan.method, "post");
        assert!(plan.fields.contains(&("brukernavn".to_string(), "golfer@example.com".to_string())));
        assert!(plan.fields.contains(&("passord".to_string(), "hunter2".to_string())));
        assert!(plan.fields.contains(&("csrf".to_string(), "tok123".to_string())));
    }

    #[test]
    fn password_type_wins_over_name() {
        let html = r#"
            <form>
              <input type="email" name="email">
              <input type="password" name="login_secret">
            </form>
        "#;
        let plan = HeuristicStrategy::plan_form(html, &creds()).unwrap();
        assert!(plan.fields.contains(&("login_secret".to_string(), "hunter2".to_string())));
        assert!(plan.fields.contains(&("email".to_string(), "golfer@example.com".to_string())));
    }

    #[test]
    fn pages_without_forms_yield_no_plan() {
        assert!(HeuristicStrategy::plan_form("<html><body>App shell</body></html>", &creds()).is_none());
    }

    #[test]
    fn action_resolution() {
        assert_eq!(
            HeuristicStrategy::resolve_action("https://golfbox.golf/login", Some("/api/auth")),
            "https://golfbox.golf/api/auth"
        );
        assert_eq!(
            HeuristicStrategy::resolve_action("https://golfbox.golf/login", Some("https://other/x")),
            "https://other/x"
        );
        assert_eq!(
            HeuristicStrategy::resolve_action("https://golfbox.golf/login", None),
            "https://golfbox.golf/login"
        );
    }

    #[test]
    fn login_markers() {
        assert!(looks_logged_in("<a>Logg ut</a>"));
        assert!(looks_logged_in("Velkommen tilbake"));
        assert!(!looks_logged_in("<h1>Logg inn</h1>"));
        assert!(is_login_url("https://golfbox.golf/portal/login/help.asp"));
        assert!(!is_login_url("https://golfbox.golf/myFrontPage.asp"));
    }
}
