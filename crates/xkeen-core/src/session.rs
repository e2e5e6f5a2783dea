// ── Session ──
//
// Owns one logged-in conversation with a panel: the query cache, the
// request client, the persistent push channel, the latency probe and the
// mutation coordinator. Everything is torn down together, either on
// request or when any component finds the credential gone.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use secrecy::{ExposeSecret, SecretString};
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use xkeen_api::models::{AuthStatus, TotpEnrollment};
use xkeen_api::{ApiClient, CredentialStore, EventTransport};

use crate::command::{Command, CommandResult, MutationCoordinator, PendingMutation};
use crate::config::SessionConfig;
use crate::error::CoreError;
use crate::probe::LatencyProbe;
use crate::push::{ChannelState, PushChannel, StreamContext};
use crate::request::RequestClient;
use crate::signal::{LogoutReason, SessionSignal};
use crate::store::refresh::{load, spawn_refetcher};
use crate::store::{CacheKey, Query, QueryCache};
use crate::stream::{CacheStream, ListenerHandle};

/// Shortest password, in bytes, the panel accepts for its first account.
pub const MIN_PASSWORD_LEN: usize = 8;

/// The main entry point for consumers.
///
/// Cheaply cloneable. A session is single-use: once closed (explicitly or
/// by a forced logout) it stays closed, and a new login needs a new
/// session.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    config: SessionConfig,
    cache: Arc<QueryCache>,
    client: RequestClient,
    credentials: Arc<dyn CredentialStore>,
    signal: SessionSignal,
    cancel: CancellationToken,
    push: PushChannel,
    probe: LatencyProbe,
    mutations: MutationCoordinator,
    started: AtomicBool,
    task_handles: Mutex<Vec<JoinHandle<()>>>,
}

impl Session {
    /// Create a session for the panel in `config`. Nothing runs until
    /// [`start()`](Self::start).
    pub fn new(config: SessionConfig, credentials: Arc<dyn CredentialStore>) -> Result<Self, CoreError> {
        let api = Arc::new(ApiClient::new(
            config.url.clone(),
            credentials,
            &config.transport(),
        )?);
        let transport: Arc<dyn EventTransport> = api.clone();
        Ok(Self::with_transport(config, api, transport))
    }

    /// Create a session around an existing API client, opening push
    /// streams through `transport`.
    pub fn with_transport(
        config: SessionConfig,
        api: Arc<ApiClient>,
        transport: Arc<dyn EventTransport>,
    ) -> Self {
        let credentials = Arc::clone(api.credentials());
        let cache = Arc::new(QueryCache::new());
        let signal = SessionSignal::new();
        let cancel = CancellationToken::new();
        let client = RequestClient::new(api, signal.clone());

        let ctx = StreamContext {
            transport,
            cache: Arc::clone(&cache),
            credentials: Arc::clone(&credentials),
            signal: signal.clone(),
        };
        let push = PushChannel::new(
            ctx.clone(),
            config.reconnect_delay,
            config.log_capacity,
            cancel.child_token(),
        );
        let probe = LatencyProbe::new(ctx, cancel.clone());
        let mutations = MutationCoordinator::new(Arc::clone(&cache), client.clone());

        Self {
            inner: Arc::new(SessionInner {
                config,
                cache,
                client,
                credentials,
                signal,
                cancel,
                push,
                probe,
                mutations,
                started: AtomicBool::new(false),
                task_handles: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    pub fn client(&self) -> &RequestClient {
        &self.inner.client
    }

    pub fn cache(&self) -> &Arc<QueryCache> {
        &self.inner.cache
    }

    // ── Authentication ───────────────────────────────────────────

    /// Whether the panel still needs its first account.
    pub async fn auth_status(&self) -> Result<AuthStatus, CoreError> {
        Ok(self.inner.client.api().auth_status().await?)
    }

    /// Exchange credentials for a token and store it.
    pub async fn login(&self, username: &str, password: &SecretString, totp_code: &str) -> Result<(), CoreError> {
        if self.is_closed() {
            return Err(CoreError::SessionClosed);
        }
        self.inner
            .client
            .api()
            .login(username, password.expose_secret(), totp_code)
            .await?;
        info!(username, "logged in");
        Ok(())
    }

    /// Create the first account on a fresh panel. Returns the TOTP secret
    /// to enroll; [`confirm_setup`](Self::confirm_setup) finishes the setup.
    pub async fn setup(&self, username: &str, password: &SecretString) -> Result<TotpEnrollment, CoreError> {
        if self.is_closed() {
            return Err(CoreError::SessionClosed);
        }
        let password = password.expose_secret();
        if username.trim().is_empty() {
            return Err(CoreError::ValidationFailed {
                message: "username is required".into(),
            });
        }
        if password.len() < MIN_PASSWORD_LEN {
            return Err(CoreError::ValidationFailed {
                message: format!("password must be at least {MIN_PASSWORD_LEN} characters"),
            });
        }
        Ok(self.inner.client.api().setup(username.trim(), password).await?)
    }

    /// Activate the account created by [`setup`](Self::setup) and store
    /// the token the panel issues for it.
    pub async fn confirm_setup(&self, code: &str) -> Result<(), CoreError> {
        if self.is_closed() {
            return Err(CoreError::SessionClosed);
        }
        self.inner.client.api().setup_confirm(code.trim()).await?;
        info!("first account activated");
        Ok(())
    }

    pub fn is_logged_in(&self) -> bool {
        self.inner.credentials.is_present()
    }

    // ── Lifecycle ────────────────────────────────────────────────

    /// Start background work: the refetcher, the push channel and the
    /// logout watcher. Idempotent. Returns whether the push channel
    /// connected (it stays idle without a credential).
    pub async fn start(&self) -> bool {
        if self.is_closed() || self.inner.started.swap(true, Ordering::AcqRel) {
            return false;
        }

        let mut handles = self.inner.task_handles.lock().await;
        handles.push(spawn_refetcher(
            Arc::clone(&self.inner.cache),
            self.inner.client.clone(),
            self.inner.config.clone(),
            self.inner.cancel.child_token(),
        ));
        handles.push(tokio::spawn(logout_watcher(
            Arc::downgrade(&self.inner),
            self.inner.signal.clone(),
            self.inner.cancel.clone(),
        )));

        let connected = self.inner.push.start();
        info!(url = %self.inner.config.url, push = connected, "session started");
        connected
    }

    /// Forget the credential and close the session.
    pub fn logout(&self) {
        self.inner.signal.force_logout(LogoutReason::UserRequested);
        self.inner.credentials.clear();
        self.inner.close();
    }

    /// Stop every channel and drop the cache. Idempotent.
    pub fn close(&self) {
        self.inner.close();
    }

    /// [`close()`](Self::close), then wait for background tasks to exit.
    pub async fn teardown(&self) {
        self.inner.close();

        let mut handles = self.inner.task_handles.lock().await;
        handles.extend(self.inner.push.take_task());
        for handle in handles.drain(..) {
            let _ = handle.await;
        }
        debug!("session torn down");
    }

    pub fn is_closed(&self) -> bool {
        self.inner.cancel.is_cancelled()
    }

    /// Run `f` against a fresh session without push channels, then tear
    /// it down.
    pub async fn oneshot<F, Fut, T>(
        config: SessionConfig,
        credentials: Arc<dyn CredentialStore>,
        f: F,
    ) -> Result<T, CoreError>
    where
        F: FnOnce(Session) -> Fut,
        Fut: Future<Output = Result<T, CoreError>>,
    {
        let session = Session::new(config, credentials)?;
        let result = f(session.clone()).await;
        session.teardown().await;
        result
    }

    // ── Commands ─────────────────────────────────────────────────

    /// Speculate, commit and settle `command`.
    pub async fn execute(&self, command: Command) -> Result<CommandResult, CoreError> {
        self.ensure_open()?;
        self.inner.mutations.execute(command).await
    }

    /// Apply `command`'s speculation and hand back the pending mutation.
    pub fn speculate(&self, command: Command) -> Result<PendingMutation, CoreError> {
        self.ensure_open()?;
        Ok(self.inner.mutations.speculate(command))
    }

    // ── Latency probe ────────────────────────────────────────────

    /// Start a latency check of every server. `false` if one is already
    /// running or nobody is logged in.
    pub fn check_latency(&self) -> bool {
        self.inner.probe.start()
    }

    pub fn latency_checking(&self) -> watch::Receiver<bool> {
        self.inner.probe.checking()
    }

    // ── Queries ──────────────────────────────────────────────────

    /// Fetch `K` from the panel into the cache and return it.
    pub async fn load<K: Query>(&self) -> Result<Arc<K::Value>, CoreError> {
        self.ensure_open()?;
        load::<K>(&self.inner.cache, &self.inner.client, &self.inner.config).await
    }

    pub fn get<K: CacheKey>(&self) -> Option<Arc<K::Value>> {
        self.inner.cache.get::<K>()
    }

    pub fn subscribe<K: CacheKey>(&self) -> CacheStream<K::Value> {
        self.inner.cache.subscribe::<K>()
    }

    pub fn listen<K, F>(&self, listener: F) -> ListenerHandle
    where
        K: CacheKey,
        F: Fn(&Arc<K::Value>) + Send + Sync + 'static,
    {
        self.inner.cache.listen::<K, F>(listener)
    }

    // ── State observation ────────────────────────────────────────

    pub fn channel_state(&self) -> watch::Receiver<ChannelState> {
        self.inner.push.state()
    }

    /// Resolves once the session has been logged out.
    pub async fn logged_out(&self) -> LogoutReason {
        self.inner.signal.logged_out().await
    }

    pub fn logout_reason(&self) -> Option<LogoutReason> {
        self.inner.signal.reason()
    }

    fn ensure_open(&self) -> Result<(), CoreError> {
        if self.is_closed() {
            Err(CoreError::SessionClosed)
        } else {
            Ok(())
        }
    }
}

impl SessionInner {
    fn close(&self) {
        if self.cancel.is_cancelled() {
            return;
        }
        self.cancel.cancel();
        self.push.close();
        self.probe.close();
        self.cache.clear();
        debug!("session closed");
    }
}

impl Drop for SessionInner {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Close the session once any component forces a logout.
async fn logout_watcher(session: Weak<SessionInner>, signal: SessionSignal, cancel: CancellationToken) {
    let reason = tokio::select! {
        biased;
        () = cancel.cancelled() => return,
        reason = signal.logged_out() => reason,
    };

    if let Some(inner) = session.upgrade() {
        info!(%reason, "session logged out");
        inner.credentials.clear();
        inner.close();
    }
}
