// Control API HTTP client
//
// Wraps `reqwest::Client` with panel URL construction, bearer
// authentication from a `CredentialStore`, and the panel's error body
// convention (`{"error": "..."}`). A 401 on any authenticated call clears
// the stored credential before the error is returned.

use std::sync::Arc;

use reqwest::header::ACCEPT;
use reqwest::{RequestBuilder, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};
use url::Url;

use crate::auth::CredentialStore;
use crate::error::Error;
use crate::models::{
    AuthStatus, DaemonOutput, ErrorBody, LoginRequest, LogsResponse, SelectServerRequest,
    SelectServerResponse, Server, ServersResponse, SetupConfirmRequest, SetupRequest, Status,
    SubscriptionInfo, SubscriptionUpdate, TokenResponse, TotpEnrollment, UpdateSubscriptionRequest,
    WatchdogState,
};
use crate::sse::{EventStream, EventTransport, StreamEndpoint, decode_body};
use crate::transport::TransportConfig;

/// HTTP client for the panel's `/api` surface.
///
/// Request/response calls use a client with a total timeout; event streams
/// use a second client without one. Both share TLS settings.
pub struct ApiClient {
    http: reqwest::Client,
    stream_http: reqwest::Client,
    base_url: Url,
    credentials: Arc<dyn CredentialStore>,
}

impl ApiClient {
    /// Create a client for the panel at `base_url`.
    pub fn new(
        base_url: Url,
        credentials: Arc<dyn CredentialStore>,
        transport: &TransportConfig,
    ) -> Result<Self, Error> {
        Ok(Self {
            http: transport.build_client()?,
            stream_http: transport.build_stream_client()?,
            base_url: normalize(base_url),
            credentials,
        })
    }

    /// Create a client around a pre-built `reqwest::Client`, used for both
    /// calls and streams.
    pub fn from_reqwest(
        base_url: &str,
        http: reqwest::Client,
        credentials: Arc<dyn CredentialStore>,
    ) -> Result<Self, Error> {
        Ok(Self {
            stream_http: http.clone(),
            http,
            base_url: normalize(Url::parse(base_url)?),
            credentials,
        })
    }

    /// The panel base URL (always ends with `/`).
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// The credential store consulted on every call.
    pub fn credentials(&self) -> &Arc<dyn CredentialStore> {
        &self.credentials
    }

    fn url(&self, path: &str) -> Result<Url, Error> {
        Ok(self.base_url.join(path)?)
    }

    // ── Request helpers ──────────────────────────────────────────────

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        match self.credentials.token() {
            Some(token) => builder.bearer_auth(token.expose_secret()),
            None => builder,
        }
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, Error> {
        let url = self.url(path)?;
        debug!("GET {}", url);
        self.execute(self.authorized(self.http.get(url))).await
    }

    async fn post<T: DeserializeOwned>(
        &self,
        path: &str,
        body: Option<&(impl Serialize + ?Sized)>,
    ) -> Result<T, Error> {
        let url = self.url(path)?;
        debug!("POST {}", url);
        let mut builder = self.authorized(self.http.post(url));
        if let Some(body) = body {
            builder = builder.json(body);
        }
        self.execute(builder).await
    }

    /// Send an authenticated request. A 401 clears the credential.
    async fn execute<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T, Error> {
        let resp = builder.send().await?;
        if resp.status() == StatusCode::UNAUTHORIZED {
            self.expire_session();
            return Err(Error::SessionExpired);
        }
        decode(resp).await
    }

    fn expire_session(&self) {
        if self.credentials.is_present() {
            warn!("panel rejected the session token, clearing credential");
        }
        self.credentials.clear();
    }

    // ── Auth ─────────────────────────────────────────────────────────

    /// Whether the panel still needs its first-run setup.
    pub async fn auth_status(&self) -> Result<AuthStatus, Error> {
        let url = self.url("api/auth/status")?;
        debug!("GET {}", url);
        decode(self.http.get(url).send().await?).await
    }

    /// Exchange username, password and TOTP code for a session token and
    /// store it. A rejection is [`Error::Authentication`]; the stored
    /// credential is left alone.
    pub async fn login(&self, username: &str, password: &str, totp_code: &str) -> Result<(), Error> {
        let url = self.url("api/auth/login")?;
        debug!("POST {}", url);
        let resp = self
            .http
            .post(url)
            .json(&LoginRequest {
                username,
                password,
                totp_code,
            })
            .send()
            .await?;

        if resp.status() == StatusCode::UNAUTHORIZED {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Authentication {
                message: error_message(&body).unwrap_or_else(|| "invalid credentials".into()),
            });
        }

        let TokenResponse { token } = decode(resp).await?;
        self.credentials.store(SecretString::from(token));
        Ok(())
    }

    /// Create the pending first account. The returned secret must be
    /// enrolled in an authenticator before [`setup_confirm`](Self::setup_confirm).
    pub async fn setup(&self, username: &str, password: &str) -> Result<TotpEnrollment, Error> {
        let url = self.url("api/auth/setup")?;
        debug!("POST {}", url);
        let resp = self
            .http
            .post(url)
            .json(&SetupRequest { username, password })
            .send()
            .await?;
        decode(resp).await
    }

    /// Activate the pending account with a code from the enrolled
    /// authenticator and store the issued token. A wrong code is
    /// [`Error::Authentication`].
    pub async fn setup_confirm(&self, code: &str) -> Result<(), Error> {
        let url = self.url("api/auth/setup/confirm")?;
        debug!("POST {}", url);
        let resp = self
            .http
            .post(url)
            .json(&SetupConfirmRequest { code })
            .send()
            .await?;

        let TokenResponse { token } = match decode(resp).await {
            Err(Error::Api { status: 400, message }) if message.contains("TOTP") => {
                return Err(Error::Authentication { message });
            }
            other => other?,
        };
        self.credentials.store(SecretString::from(token));
        Ok(())
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub async fn status(&self) -> Result<Status, Error> {
        self.get("api/status").await
    }

    pub async fn servers(&self) -> Result<Vec<Server>, Error> {
        let resp: ServersResponse = self.get("api/servers").await?;
        Ok(resp.servers.unwrap_or_default())
    }

    /// The last `lines` log lines, oldest first.
    pub async fn logs(&self, lines: usize) -> Result<Vec<String>, Error> {
        let resp: LogsResponse = self.get(&format!("api/logs?lines={lines}")).await?;
        Ok(resp.lines.unwrap_or_default())
    }

    pub async fn subscription(&self) -> Result<SubscriptionInfo, Error> {
        self.get("api/subscription").await
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Make server `id` the active outbound. The panel restarts the daemon
    /// in the background.
    pub async fn select_server(&self, id: u32) -> Result<SelectServerResponse, Error> {
        self.post("api/servers/select", Some(&SelectServerRequest { id }))
            .await
    }

    pub async fn restart_daemon(&self) -> Result<DaemonOutput, Error> {
        self.post("api/xkeen/restart", None::<&()>).await
    }

    pub async fn update_daemon(&self) -> Result<DaemonOutput, Error> {
        self.post("api/xkeen/update", None::<&()>).await
    }

    pub async fn toggle_watchdog(&self, active: bool) -> Result<WatchdogState, Error> {
        self.post("api/watchdog/toggle", Some(&WatchdogState { active }))
            .await
    }

    /// Replace the subscription URL and reload its servers.
    pub async fn update_subscription(&self, url: &str) -> Result<SubscriptionUpdate, Error> {
        self.post("api/subscription", Some(&UpdateSubscriptionRequest { url }))
            .await
    }

    pub async fn refresh_subscription(&self) -> Result<SubscriptionUpdate, Error> {
        self.post("api/subscription/refresh", None::<&()>).await
    }

    // ── Event streams ────────────────────────────────────────────────

    /// Open one of the panel's event streams.
    ///
    /// The token travels as a query parameter. Fails with
    /// [`Error::NoCredential`] when no token is stored and with
    /// [`Error::SessionExpired`] (credential cleared) on a 401 handshake.
    pub async fn open_event_stream(&self, endpoint: StreamEndpoint) -> Result<EventStream, Error> {
        let token = self.credentials.token().ok_or(Error::NoCredential)?;
        let mut url = self.url(endpoint.path())?;
        url.query_pairs_mut()
            .append_pair("token", token.expose_secret());

        debug!(%endpoint, "opening event stream");
        let resp = self
            .stream_http
            .get(url)
            .header(ACCEPT, "text/event-stream")
            .send()
            .await?;

        let status = resp.status();
        if status == StatusCode::UNAUTHORIZED {
            self.expire_session();
            return Err(Error::SessionExpired);
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(api_error(status, &body));
        }

        Ok(decode_body(resp.bytes_stream()))
    }
}

impl EventTransport for ApiClient {
    fn open(
        &self,
        endpoint: StreamEndpoint,
    ) -> futures_util::future::BoxFuture<'_, Result<EventStream, Error>> {
        Box::pin(self.open_event_stream(endpoint))
    }
}

// ── Response decoding ────────────────────────────────────────────────

async fn decode<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, Error> {
    let status = resp.status();
    let body = resp.text().await?;

    if !status.is_success() {
        return Err(api_error(status, &body));
    }

    serde_json::from_str(&body).map_err(|e| Error::Deserialization {
        message: e.to_string(),
        body,
    })
}

fn api_error(status: StatusCode, body: &str) -> Error {
    let message = error_message(body).unwrap_or_else(|| {
        status
            .canonical_reason()
            .unwrap_or("request failed")
            .to_owned()
    });
    Error::Api {
        status: status.as_u16(),
        message,
    }
}

fn error_message(body: &str) -> Option<String> {
    serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|b| b.error)
        .filter(|m| !m.is_empty())
}

/// `Url::join` drops the last path segment unless it ends with `/`.
fn normalize(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn base_url_gains_trailing_slash() {
        let url = normalize(Url::parse("http://192.168.1.1:8080/panel").unwrap());
        assert_eq!(url.join("api/status").unwrap().path(), "/panel/api/status");
    }

    #[test]
    fn error_body_message_wins_over_status_text() {
        let err = api_error(StatusCode::BAD_REQUEST, r#"{"error":"сервер не найден"}"#);
        assert!(matches!(err, Error::Api { status: 400, ref message } if message == "сервер не найден"));

        let err = api_error(StatusCode::BAD_GATEWAY, "<html>nginx</html>");
        assert!(matches!(err, Error::Api { status: 502, ref message } if message == "Bad Gateway"));
    }
}
