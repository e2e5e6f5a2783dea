// ── Request client ──
//
// Core-side wrapper over `xkeen_api::ApiClient`. Translates errors into
// `CoreError` and raises the session's logout signal whenever a call
// finds the credential rejected or missing.

use std::future::Future;
use std::sync::Arc;

use xkeen_api::ApiClient;
use xkeen_api::models::{DaemonOutput, SelectServerResponse, SubscriptionUpdate, WatchdogState};

use crate::error::CoreError;
use crate::model::{Server, Status, SubscriptionInfo};
use crate::signal::{LogoutReason, SessionSignal};

/// Request/response calls against the panel. Cheap to clone.
#[derive(Clone)]
pub struct RequestClient {
    api: Arc<ApiClient>,
    signal: SessionSignal,
}

impl RequestClient {
    pub fn new(api: Arc<ApiClient>, signal: SessionSignal) -> Self {
        Self { api, signal }
    }

    /// The underlying API client.
    pub fn api(&self) -> &Arc<ApiClient> {
        &self.api
    }

    async fn call<T>(
        &self,
        request: impl Future<Output = Result<T, xkeen_api::Error>>,
    ) -> Result<T, CoreError> {
        match request.await {
            Ok(value) => Ok(value),
            Err(e) => {
                if e.is_auth_expired() {
                    self.signal.force_logout(LogoutReason::Unauthorized);
                }
                Err(e.into())
            }
        }
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub async fn status(&self) -> Result<Status, CoreError> {
        self.call(self.api.status()).await
    }

    pub async fn servers(&self) -> Result<Vec<Server>, CoreError> {
        self.call(self.api.servers()).await
    }

    pub async fn logs(&self, lines: usize) -> Result<Vec<String>, CoreError> {
        self.call(self.api.logs(lines)).await
    }

    pub async fn subscription(&self) -> Result<SubscriptionInfo, CoreError> {
        self.call(self.api.subscription()).await
    }

    // ── Commands ─────────────────────────────────────────────────────

    pub async fn select_server(&self, id: u32) -> Result<SelectServerResponse, CoreError> {
        self.call(self.api.select_server(id)).await
    }

    pub async fn restart_daemon(&self) -> Result<DaemonOutput, CoreError> {
        self.call(self.api.restart_daemon()).await
    }

    pub async fn update_daemon(&self) -> Result<DaemonOutput, CoreError> {
        self.call(self.api.update_daemon()).await
    }

    pub async fn toggle_watchdog(&self, active: bool) -> Result<WatchdogState, CoreError> {
        self.call(self.api.toggle_watchdog(active)).await
    }

    pub async fn update_subscription(&self, url: &str) -> Result<SubscriptionUpdate, CoreError> {
        self.call(self.api.update_subscription(url)).await
    }

    pub async fn refresh_subscription(&self) -> Result<SubscriptionUpdate, CoreError> {
        self.call(self.api.refresh_subscription()).await
    }
}
