//! SMTP delivery via lettre.

use std::time::Duration;

use anyhow::{Context, Result};
use lettre::message::Mailbox;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials as SmtpCredentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::debug;

const SMTP_TIMEOUT: Duration = Duration::from_secs(30);

/// SMTP reply codes that indicate rejected credentials.
const AUTH_REJECTED_CODES: &[&str] = &["530", "534", "535"];

/// Resolved SMTP configuration.
#[derive(Debug, Clone)]
pub struct SmtpSettings {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub from: String,
    /// Additional comma-separated recipients copied on every email.
    pub extra_recipients: Vec<String>,
    pub ssl: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("invalid email address '{0}'")]
    Address(String),
    #[error("smtp authentication rejected")]
    Auth(#[source] lettre::transport::smtp::Error),
    #[error("smtp transport failed")]
    Transport(#[source] lettre::transport::smtp::Error),
    #[error(transparent)]
    Message(#[from] lettre::error::Error),
}

/// Whether a send actually went out on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Sent,
    /// Email delivery is disabled by configuration.
    Disabled,
}

/// Thin async SMTP wrapper. A `Mailer` without a transport swallows sends,
/// which keeps the notification pipeline exercisable without credentials.
pub struct Mailer {
    transport: Option<AsyncSmtpTransport<Tokio1Executor>>,
    from: Option<Mailbox>,
    extra_recipients: Vec<Mailbox>,
}

impl Mailer {
    /// A mailer that logs instead of sending.
    pub fn disabled() -> Self {
        Self {
            transport: None,
            from: None,
            extra_recipients: Vec::new(),
        }
    }

    pub fn from_settings(settings: &SmtpSettings) -> Result<Self> {
        let builder = if settings.ssl {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&settings.host)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&settings.host)
        }
        .with_context(|| format!("invalid SMTP relay {}", settings.host))?;

        let transport = builder
            .port(settings.port)
            .credentials(SmtpCredentials::new(
                settings.username.clone(),
                settings.password.clone(),
            ))
            .timeout(Some(SMTP_TIMEOUT))
            .build();

        let from: Mailbox = settings
            .from
            .parse()
            .map_err(|_| anyhow::anyhow!("invalid EMAIL_FROM address '{}'", settings.from))?;

        let extra_recipients = settings
            .extra_recipients
            .iter()
            .filter(|addr| !addr.trim().is_empty())
            .map(|addr| {
                addr.trim()
                    .parse::<Mailbox>()
                    .map_err(|_| anyhow::anyhow!("invalid EMAIL_TO address '{addr}'"))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            transport: Some(transport),
            from: Some(from),
            extra_recipients,
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.transport.is_some()
    }

    /// Send a plain-text email to `to` (plus configured extra recipients).
    pub async fn send(&self, to: &str, subject: &str, body: &str) -> Result<SendOutcome, MailError> {
        let (Some(transport), Some(from)) = (&self.transport, &self.from) else {
            debug!(to, subject, "email disabled, skipping send");
            return Ok(SendOutcome::Disabled);
        };

        let recipient: Mailbox = to
            .parse()
            .map_err(|_| MailError::Address(to.to_string()))?;

        let mut builder = Message::builder()
            .from(from.clone())
            .to(recipient)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN);
        for extra in &self.extra_recipients {
            builder = builder.cc(extra.clone());
        }

        let message = builder.body(body.to_string())?;
        transport.send(message).await.map_err(classify_smtp_error)?;
        Ok(SendOutcome::Sent)
    }
}

fn classify_smtp_error(error: lettre::transport::smtp::Error) -> MailError {
    let auth_rejected = error
        .status()
        .map(|code| AUTH_REJECTED_CODES.contains(&code.to_string().as_str()))
        .unwrap_or(false);
    if auth_rejected {
        MailError::Auth(error)
    } else {
        MailError::Transport(error)
    }
}
