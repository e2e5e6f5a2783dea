// Control API wire types
//
// Shapes exchanged with the panel's `/api/*` endpoints and carried in the
// payloads of its event streams. Unknown fields are ignored everywhere; the
// panel adds fields between releases.

use std::fmt;

use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

// ── Latency ──────────────────────────────────────────────────────────

/// A measured round trip in milliseconds, or "not measured".
///
/// On the wire this is an integer where `-1` means not measured. Any other
/// negative value is rejected when decoding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct Latency(Option<u32>);

/// A latency value below `-1` (or above `u32::MAX`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid latency value {0} (expected -1 or a non-negative count of milliseconds)")]
pub struct InvalidLatency(pub i64);

impl Latency {
    pub const UNMEASURED: Self = Self(None);

    pub fn from_millis(ms: u32) -> Self {
        Self(Some(ms))
    }

    pub fn millis(self) -> Option<u32> {
        self.0
    }

    pub fn is_measured(self) -> bool {
        self.0.is_some()
    }
}

impl TryFrom<i64> for Latency {
    type Error = InvalidLatency;

    fn try_from(raw: i64) -> Result<Self, Self::Error> {
        match raw {
            -1 => Ok(Self(None)),
            n => u32::try_from(n).map(|ms| Self(Some(ms))).map_err(|_| InvalidLatency(n)),
        }
    }
}

impl From<Latency> for i64 {
    fn from(latency: Latency) -> Self {
        latency.0.map_or(-1, i64::from)
    }
}

impl fmt::Display for Latency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(ms) => write!(f, "{ms} ms"),
            None => f.write_str("-"),
        }
    }
}

// ── Status ───────────────────────────────────────────────────────────

/// Connection and daemon status from `GET /api/status` and the `status`
/// push event.
#[allow(clippy::struct_excessive_bools)]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    pub connected: bool,
    /// The panel calls this `xray_running`.
    #[serde(rename = "xray_running", alias = "daemon_running")]
    pub daemon_running: bool,
    #[serde(default)]
    pub restarting: bool,
    #[serde(default)]
    pub current_server: String,
    #[serde(default)]
    pub protocol: String,
    pub latency_ms: Latency,
    #[serde(default)]
    pub uptime: String,
    #[serde(default)]
    pub last_check: Option<DateTime<Utc>>,
    #[serde(default)]
    pub watchdog_active: bool,
}

// ── Servers ──────────────────────────────────────────────────────────

/// Outbound protocol of a subscription server.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Protocol {
    Vless,
    Vmess,
    Trojan,
    Shadowsocks,
}

/// One server parsed from the subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Server {
    pub id: u32,
    pub name: String,
    pub address: String,
    pub port: u16,
    pub protocol: Protocol,
    #[serde(default)]
    pub active: bool,
    #[serde(default)]
    pub latency_ms: Latency,
}

/// `GET /api/servers`. The panel sends `null` for an empty list.
#[derive(Debug, Deserialize)]
pub struct ServersResponse {
    #[serde(default)]
    pub servers: Option<Vec<Server>>,
}

// ── Logs ─────────────────────────────────────────────────────────────

/// `GET /api/logs?lines=N`. The panel sends `null` for no lines.
#[derive(Debug, Deserialize)]
pub struct LogsResponse {
    #[serde(default)]
    pub lines: Option<Vec<String>>,
}

// ── Subscription ─────────────────────────────────────────────────────

/// `GET /api/subscription`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionInfo {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub last_updated: Option<DateTime<Utc>>,
    #[serde(default)]
    pub server_count: u32,
}

#[derive(Debug, Serialize)]
pub struct UpdateSubscriptionRequest<'a> {
    pub url: &'a str,
}

/// Answer of `POST /api/subscription` and `POST /api/subscription/refresh`.
#[derive(Debug, Clone, Deserialize)]
pub struct SubscriptionUpdate {
    pub server_count: u32,
    #[serde(default)]
    pub servers: Option<Vec<Server>>,
}

// ── Commands ─────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct SelectServerRequest {
    pub id: u32,
}

/// Answer of `POST /api/servers/select`. The daemon restart it triggers
/// runs in the background.
#[derive(Debug, Clone, Deserialize)]
pub struct SelectServerResponse {
    #[serde(default)]
    pub success: bool,
    pub server: Server,
    #[serde(default)]
    pub restarting: bool,
}

/// Answer of `POST /api/xkeen/restart` and `POST /api/xkeen/update`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DaemonOutput {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub output: String,
}

/// Body and answer of `POST /api/watchdog/toggle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchdogState {
    pub active: bool,
}

// ── Auth ─────────────────────────────────────────────────────────────

/// `GET /api/auth/status`.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct AuthStatus {
    pub setup_required: bool,
}

#[derive(Debug, Serialize)]
pub struct LoginRequest<'a> {
    pub username: &'a str,
    pub password: &'a str,
    pub totp_code: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub token: String,
}

#[derive(Debug, Serialize)]
pub struct SetupRequest<'a> {
    pub username: &'a str,
    pub password: &'a str,
}

#[derive(Debug, Serialize)]
pub struct SetupConfirmRequest<'a> {
    pub code: &'a str,
}

/// Answer of `POST /api/auth/setup`: the TOTP secret the first account
/// must enroll before `POST /api/auth/setup/confirm`.
#[derive(Debug, Deserialize)]
pub struct TotpEnrollment {
    pub totp_secret: SecretString,
}

impl TotpEnrollment {
    /// Issuer the panel registers its codes under.
    pub const ISSUER: &'static str = "XKeen Panel";

    /// `otpauth://` URI for authenticator apps that accept a pasted link.
    pub fn otpauth_uri(&self, username: &str) -> Result<Url, url::ParseError> {
        let mut uri = Url::parse("otpauth://totp/")?;
        uri.set_path(&format!("/{}:{username}", Self::ISSUER));
        uri.set_query(Some(&format!(
            "secret={}&issuer={}",
            self.totp_secret.expose_secret(),
            Self::ISSUER.replace(' ', "%20"),
        )));
        Ok(uri)
    }
}

// ── Push payloads ────────────────────────────────────────────────────

/// Payload of the `restart` event on the persistent channel.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct RestartNotice {
    pub restarting: bool,
}

/// Payload of the `latency` event on the latency-check channel.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct LatencyReport {
    pub id: u32,
    pub latency_ms: Latency,
}

/// Error body of any non-2xx answer.
#[derive(Debug, Deserialize)]
pub(crate) struct ErrorBody {
    #[serde(default)]
    pub error: Option<String>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    #[test]
    fn latency_minus_one_is_unmeasured() {
        let l: Latency = serde_json::from_value(json!(-1)).unwrap();
        assert_eq!(l, Latency::UNMEASURED);
        assert_eq!(serde_json::to_value(l).unwrap(), json!(-1));

        let l: Latency = serde_json::from_value(json!(80)).unwrap();
        assert_eq!(l.millis(), Some(80));
    }

    #[test]
    fn other_negative_latency_is_rejected() {
        assert!(serde_json::from_value::<Latency>(json!(-5)).is_err());
        assert!(serde_json::from_value::<LatencyReport>(json!({"id": 1, "latency_ms": -2})).is_err());
    }

    #[test]
    fn status_uses_panel_field_names() {
        let status: Status = serde_json::from_value(json!({
            "connected": true,
            "xray_running": true,
            "restarting": false,
            "current_server": "NL-1",
            "protocol": "vless",
            "latency_ms": 120,
            "uptime": "2h",
            "last_check": "2025-03-01T12:00:00+03:00",
            "watchdog_active": true,
            "something_new": 1
        }))
        .unwrap();

        assert!(status.daemon_running);
        assert_eq!(status.latency_ms, Latency::from_millis(120));
        assert_eq!(
            status.last_check.unwrap().to_rfc3339(),
            "2025-03-01T09:00:00+00:00"
        );
    }

    #[test]
    fn null_lists_decode_as_none() {
        let servers: ServersResponse = serde_json::from_value(json!({"servers": null})).unwrap();
        assert!(servers.servers.is_none());
        let logs: LogsResponse = serde_json::from_value(json!({"lines": null})).unwrap();
        assert!(logs.lines.is_none());
    }

    #[test]
    fn protocol_parses_lowercase() {
        let server: Server = serde_json::from_value(json!({
            "id": 3, "name": "DE", "address": "de.example", "port": 443,
            "protocol": "shadowsocks", "active": false, "latency_ms": -1,
            "raw_uri": "ss://..."
        }))
        .unwrap();
        assert_eq!(server.protocol, Protocol::Shadowsocks);
        assert_eq!("trojan".parse::<Protocol>().unwrap(), Protocol::Trojan);
    }

    #[test]
    fn enrollment_uri_names_issuer_and_account() {
        let enrollment: TotpEnrollment = serde_json::from_value(json!({
            "totp_secret": "JBSWY3DPEHPK3PXP",
            "totp_qr": "iVBORw0KGgo="
        }))
        .unwrap();

        let uri = enrollment.otpauth_uri("admin").unwrap();
        assert_eq!(
            uri.as_str(),
            "otpauth://totp/XKeen%20Panel:admin?secret=JBSWY3DPEHPK3PXP&issuer=XKeen%20Panel"
        );
    }
}
