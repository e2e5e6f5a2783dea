// ── Runtime session configuration ──
//
// These types describe *how* to talk to a panel and how the session
// behaves once connected. They never touch disk: the CLI (or any other
// consumer) builds a `SessionConfig` and hands it in.

use std::path::PathBuf;
use std::time::Duration;

use url::Url;
use xkeen_api::{TlsMode, TransportConfig};

/// Fixed delay between a lost push connection and the next attempt.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_millis(3000);

/// Most recent log lines kept in the session cache.
pub const DEFAULT_LOG_CAPACITY: usize = 200;

/// Log lines requested by the initial `logs` fetch.
pub const DEFAULT_INITIAL_LOG_LINES: usize = 50;

/// TLS verification strategy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TlsVerification {
    /// System CA store (strict).
    #[default]
    SystemDefaults,
    /// Custom CA certificate file.
    CustomCa(PathBuf),
    /// Skip verification (self-signed certs on the router).
    DangerAcceptInvalid,
}

/// Configuration for one panel session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Panel URL (e.g., `http://192.168.1.1:8080`).
    pub url: Url,
    pub tls: TlsVerification,
    /// Total timeout of request/response calls. Event streams have none.
    pub timeout: Duration,
    /// Delay before reconnecting the persistent push channel.
    pub reconnect_delay: Duration,
    /// Upper bound of the cached `logs` entry.
    pub log_capacity: usize,
    /// Lines asked for when `logs` is fetched.
    pub initial_log_lines: usize,
    /// Extra attempts after a failed refetch. Authentication failures are
    /// never retried.
    pub refetch_retries: u32,
}

impl SessionConfig {
    pub fn new(url: Url) -> Self {
        Self {
            url,
            tls: TlsVerification::default(),
            timeout: Duration::from_secs(30),
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            log_capacity: DEFAULT_LOG_CAPACITY,
            initial_log_lines: DEFAULT_INITIAL_LOG_LINES,
            refetch_retries: 1,
        }
    }

    pub(crate) fn transport(&self) -> TransportConfig {
        TransportConfig {
            tls: match &self.tls {
                TlsVerification::SystemDefaults => TlsMode::System,
                TlsVerification::CustomCa(path) => TlsMode::CustomCa(path.clone()),
                TlsVerification::DangerAcceptInvalid => TlsMode::DangerAcceptInvalid,
            },
            timeout: self.timeout,
            ..TransportConfig::default()
        }
    }
}
