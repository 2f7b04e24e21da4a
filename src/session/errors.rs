//! Error taxonomy for the GolfBox session.

/// Failures surfaced by [`super::GolfboxSession`].
///
/// Transport errors are retried internally; `AuthFailed` means every login
/// strategy was exhausted and the caller should treat the session as dead.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("authentication could not be established: {0}")]
    AuthFailed(String),
    #[error("request to {url} failed after {attempts} attempts")]
    Transport {
        url: String,
        attempts: usize,
        #[source]
        source: reqwest::Error,
    },
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
