use thiserror::Error;

/// Top-level error type for the `xkeen-api` crate.
///
/// Covers every failure mode of the control API and its event streams:
/// authentication, transport, request rejection, and payload decoding.
/// `xkeen-core` maps these into user-facing errors.
#[derive(Debug, Error)]
pub enum Error {
    // ── Authentication ──────────────────────────────────────────────
    /// Login was rejected (wrong username, password, or TOTP code).
    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    /// The panel answered 401 to an authenticated call. The stored
    /// credential has already been cleared when this is returned.
    #[error("Session expired -- log in again")]
    SessionExpired,

    /// An authenticated call was attempted without a stored credential.
    #[error("Not logged in")]
    NoCredential,

    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// TLS setup error (unreadable or invalid CA certificate).
    #[error("TLS error: {0}")]
    Tls(String),

    // ── Control API ─────────────────────────────────────────────────
    /// Non-2xx response carrying the panel's `{"error": ...}` message.
    #[error("Panel API error (HTTP {status}): {message}")]
    Api { status: u16, message: String },

    // ── Event streams ───────────────────────────────────────────────
    /// The server ended an event stream.
    #[error("Event stream closed by server")]
    StreamClosed,

    // ── Data ────────────────────────────────────────────────────────
    /// JSON deserialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },
}

impl Error {
    /// Returns `true` if the session credential is gone and only a new
    /// login can recover.
    pub fn is_auth_expired(&self) -> bool {
        matches!(self, Self::SessionExpired | Self::NoCredential)
    }

    /// Returns `true` if this is a transient error worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_timeout() || e.is_connect() || e.is_body(),
            Self::StreamClosed => true,
            Self::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// HTTP status carried by the error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            Self::SessionExpired => Some(401),
            Self::Transport(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}
