//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` into user-facing errors with
//! actionable help text and stable exit codes.

use miette::Diagnostic;
use thiserror::Error;

use xkeen_config::ConfigError;
use xkeen_core::CoreError;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const NOT_FOUND: i32 = 4;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────
    #[error("Could not connect to the panel at {url}")]
    #[diagnostic(
        code(xkeen::connection_failed),
        help(
            "Check that the router is reachable and the panel is running.\n\
             Self-signed certificate? Try --insecure (-k)."
        )
    )]
    ConnectionFailed {
        url: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Request timed out")]
    #[diagnostic(
        code(xkeen::timeout),
        help("Increase the timeout with --timeout or check the router's load.")
    )]
    Timeout,

    // ── Authentication ───────────────────────────────────────────────
    #[error("Login failed: {message}")]
    #[diagnostic(
        code(xkeen::auth_failed),
        help("Check the username, password and the current TOTP code.")
    )]
    AuthFailed { message: String },

    #[error("Not logged in to profile '{profile}'")]
    #[diagnostic(
        code(xkeen::not_logged_in),
        help("Run: xkeen login --profile {profile}\nOr set XKEEN_TOKEN.")
    )]
    NotLoggedIn { profile: String },

    #[error("Session expired")]
    #[diagnostic(
        code(xkeen::session_expired),
        help("The panel rejected the stored token. Run: xkeen login")
    )]
    SessionExpired,

    #[error("The panel at {url} has no account yet")]
    #[diagnostic(
        code(xkeen::setup_required),
        help("Create the first account with: xkeen setup")
    )]
    SetupRequired { url: String },

    #[error("The panel at {url} is already set up")]
    #[diagnostic(code(xkeen::already_set_up), help("Log in with: xkeen login"))]
    AlreadySetUp { url: String },

    // ── Resources ────────────────────────────────────────────────────
    #[error("{resource_type} '{identifier}' not found")]
    #[diagnostic(
        code(xkeen::not_found),
        help("Run: xkeen {list_command} to see available {resource_type}s")
    )]
    NotFound {
        resource_type: String,
        identifier: String,
        list_command: String,
    },

    // ── API ──────────────────────────────────────────────────────────
    #[error("Panel error (HTTP {status}): {message}")]
    #[diagnostic(code(xkeen::api_error))]
    ApiError { status: u16, message: String },

    #[error("{message}")]
    #[diagnostic(code(xkeen::internal))]
    Internal { message: String },

    // ── Validation ───────────────────────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(xkeen::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error("Profile '{name}' not found in configuration")]
    #[diagnostic(
        code(xkeen::profile_not_found),
        help(
            "Available profiles: {available}\n\
             Create one with: xkeen login --panel <URL> --profile {name}"
        )
    )]
    ProfileNotFound { name: String, available: String },

    #[error("No panel configured")]
    #[diagnostic(
        code(xkeen::no_config),
        help(
            "Log in once with: xkeen login --panel <URL>\n\
             Or pass --panel / set XKEEN_PANEL. Config file: {path}"
        )
    )]
    NoConfig { path: String },

    #[error(transparent)]
    #[diagnostic(code(xkeen::config))]
    Config(Box<ConfigError>),

    // ── IO / Serialization ───────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Validation { field, reason } => Self::Validation { field, reason },
            other => Self::Config(Box::new(other)),
        }
    }
}

impl From<dialoguer::Error> for CliError {
    fn from(err: dialoguer::Error) -> Self {
        Self::Io(std::io::Error::other(err))
    }
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } => exit_code::CONNECTION,
            Self::AuthFailed { .. }
            | Self::NotLoggedIn { .. }
            | Self::SessionExpired
            | Self::SetupRequired { .. } => exit_code::AUTH,
            Self::NotFound { .. } => exit_code::NOT_FOUND,
            Self::Timeout => exit_code::TIMEOUT,
            Self::Validation { .. } => exit_code::USAGE,
            _ => exit_code::GENERAL,
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::ConnectionFailed { url, reason } => CliError::ConnectionFailed {
                url,
                source: reason.into(),
            },

            CoreError::Timeout => CliError::Timeout,

            CoreError::AuthenticationFailed { message } => CliError::AuthFailed { message },

            CoreError::SessionExpired => CliError::SessionExpired,

            CoreError::NotLoggedIn => CliError::NotLoggedIn {
                profile: "current".into(),
            },

            CoreError::SessionClosed => CliError::Internal {
                message: "the session was closed".into(),
            },

            CoreError::Rejected { status, message } => CliError::ApiError { status, message },

            CoreError::ValidationFailed { message } => CliError::Validation {
                field: "input".into(),
                reason: message,
            },

            CoreError::ServerNotFound { id } => CliError::NotFound {
                resource_type: "server".into(),
                identifier: id.to_string(),
                list_command: "servers".into(),
            },

            CoreError::Config { message } => CliError::Validation {
                field: "configuration".into(),
                reason: message,
            },

            CoreError::Internal(message) => CliError::Internal { message },
        }
    }
}
