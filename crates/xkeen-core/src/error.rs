// ── Core error types ──
//
// User-facing errors from xkeen-core. Consumers never match on HTTP
// plumbing directly: the `From<xkeen_api::Error>` impl translates
// transport-layer errors into domain variants.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Connection errors ────────────────────────────────────────────
    #[error("Cannot connect to panel at {url}: {reason}")]
    ConnectionFailed { url: String, reason: String },

    #[error("Panel request timed out")]
    Timeout,

    // ── Session errors ───────────────────────────────────────────────
    #[error("Login failed: {message}")]
    AuthenticationFailed { message: String },

    #[error("Session expired -- log in again")]
    SessionExpired,

    #[error("Not logged in")]
    NotLoggedIn,

    #[error("Session closed")]
    SessionClosed,

    // ── Operation errors ─────────────────────────────────────────────
    #[error("Panel rejected the request (HTTP {status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Validation failed: {message}")]
    ValidationFailed { message: String },

    #[error("Server not found: {id}")]
    ServerNotFound { id: u32 },

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    // ── Internal errors ──────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// The session credential is gone; only a new login helps.
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, Self::SessionExpired | Self::NotLoggedIn)
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<xkeen_api::Error> for CoreError {
    fn from(err: xkeen_api::Error) -> Self {
        match err {
            xkeen_api::Error::Authentication { message } => {
                CoreError::AuthenticationFailed { message }
            }
            xkeen_api::Error::SessionExpired => CoreError::SessionExpired,
            xkeen_api::Error::NoCredential => CoreError::NotLoggedIn,
            xkeen_api::Error::Transport(ref e) => {
                if e.is_timeout() {
                    CoreError::Timeout
                } else {
                    CoreError::ConnectionFailed {
                        url: e
                            .url()
                            .map(|u| u.origin().ascii_serialization())
                            .unwrap_or_else(|| "<unknown>".into()),
                        reason: e.to_string(),
                    }
                }
            }
            xkeen_api::Error::InvalidUrl(e) => CoreError::Config {
                message: format!("Invalid URL: {e}"),
            },
            xkeen_api::Error::Tls(msg) => CoreError::ConnectionFailed {
                url: String::new(),
                reason: format!("TLS error: {msg}"),
            },
            xkeen_api::Error::Api { status, message } => CoreError::Rejected { status, message },
            xkeen_api::Error::StreamClosed => CoreError::ConnectionFailed {
                url: String::new(),
                reason: "event stream closed by panel".into(),
            },
            xkeen_api::Error::Deserialization { message, body: _ } => {
                CoreError::Internal(format!("Unexpected panel response: {message}"))
            }
        }
    }
}
