// ── Persistent push channel ──
//
// Keeps one live `/api/events` stream per session and folds its events
// into the query cache. Reconnects after a fixed delay for as long as a
// credential is present.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures_util::StreamExt;
use serde::de::DeserializeOwned;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};
use xkeen_api::models::RestartNotice;
use xkeen_api::{CredentialStore, EventTransport, SseEvent, StreamEndpoint};

use crate::model::{LogBuffer, Status, with_restarting};
use crate::signal::{LogoutReason, SessionSignal};
use crate::store::{LogsKey, QueryCache, StatusKey};

/// Connection state of the persistent push channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum ChannelState {
    Idle,
    Connecting,
    Connected,
    Reconnecting,
    Closed,
}

/// Everything a push stream needs from its session.
#[derive(Clone)]
pub(crate) struct StreamContext {
    pub transport: Arc<dyn EventTransport>,
    pub cache: Arc<QueryCache>,
    pub credentials: Arc<dyn CredentialStore>,
    pub signal: SessionSignal,
}

impl StreamContext {
    /// Called once a stream failed: with the credential gone the session
    /// has to end. Returns whether it did.
    pub(crate) fn logout_if_unauthenticated(&self, error: &xkeen_api::Error) -> bool {
        if self.credentials.is_present() {
            return false;
        }
        let reason = if error.is_auth_expired() {
            LogoutReason::Unauthorized
        } else {
            LogoutReason::CredentialMissing
        };
        self.signal.force_logout(reason);
        true
    }
}

/// The session's persistent push connection.
pub struct PushChannel {
    ctx: StreamContext,
    reconnect_delay: Duration,
    log_capacity: usize,
    state: Arc<watch::Sender<ChannelState>>,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl PushChannel {
    pub(crate) fn new(
        ctx: StreamContext,
        reconnect_delay: Duration,
        log_capacity: usize,
        cancel: CancellationToken,
    ) -> Self {
        let (state, _) = watch::channel(ChannelState::Idle);
        Self {
            ctx,
            reconnect_delay,
            log_capacity,
            state: Arc::new(state),
            cancel,
            task: Mutex::new(None),
        }
    }

    /// Leave `Idle` and connect. Stays `Idle` (and returns `false`) when no
    /// credential is stored; later calls are no-ops.
    pub fn start(&self) -> bool {
        if !self.ctx.credentials.is_present() {
            debug!("push channel not started: no credential");
            return false;
        }
        let started = self.state.send_if_modified(|state| {
            if *state != ChannelState::Idle {
                return false;
            }
            *state = ChannelState::Connecting;
            true
        });
        if !started {
            return false;
        }

        let handle = tokio::spawn(push_loop(
            self.ctx.clone(),
            Arc::clone(&self.state),
            self.cancel.clone(),
            self.reconnect_delay,
            self.log_capacity,
        ));
        *self.task.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);
        true
    }

    /// Tear the channel down from any state. Idempotent.
    pub fn close(&self) {
        self.cancel.cancel();
        transition(&self.state, ChannelState::Closed);
    }

    pub fn state(&self) -> watch::Receiver<ChannelState> {
        self.state.subscribe()
    }

    pub fn current_state(&self) -> ChannelState {
        *self.state.borrow()
    }

    pub(crate) fn take_task(&self) -> Option<JoinHandle<()>> {
        self.task.lock().unwrap_or_else(PoisonError::into_inner).take()
    }
}

/// Move to `next` unless the channel is already closed.
fn transition(state: &watch::Sender<ChannelState>, next: ChannelState) {
    state.send_if_modified(|current| {
        if *current == ChannelState::Closed || *current == next {
            return false;
        }
        trace!(from = %current, to = %next, "push channel state");
        *current = next;
        true
    });
}

// ── Background loop ──────────────────────────────────────────────────

async fn push_loop(
    ctx: StreamContext,
    state: Arc<watch::Sender<ChannelState>>,
    cancel: CancellationToken,
    reconnect_delay: Duration,
    log_capacity: usize,
) {
    loop {
        transition(&state, ChannelState::Connecting);

        let error = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            e = connect_and_read(&ctx, &state, log_capacity) => e,
        };

        transition(&state, ChannelState::Reconnecting);
        if ctx.logout_if_unauthenticated(&error) {
            info!(error = %error, "push channel closed: not authenticated");
            transition(&state, ChannelState::Closed);
            break;
        }

        warn!(
            error = %error,
            delay_ms = u64::try_from(reconnect_delay.as_millis()).unwrap_or(u64::MAX),
            "push channel lost, reconnecting"
        );
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            () = tokio::time::sleep(reconnect_delay) => {}
        }
    }

    debug!("push loop exiting");
}

/// Open the stream and apply events until it fails. Always ends in an
/// error; a stream the server closed is `StreamClosed`.
async fn connect_and_read(
    ctx: &StreamContext,
    state: &watch::Sender<ChannelState>,
    log_capacity: usize,
) -> xkeen_api::Error {
    let mut stream = match ctx.transport.open(StreamEndpoint::Events).await {
        Ok(stream) => stream,
        Err(e) => return e,
    };
    transition(state, ChannelState::Connected);
    info!("push channel connected");

    while let Some(item) = stream.next().await {
        match item {
            Ok(event) => apply_push_event(&ctx.cache, &event, log_capacity),
            Err(e) => return e,
        }
    }
    xkeen_api::Error::StreamClosed
}

// ── Event application ────────────────────────────────────────────────

/// Fold one push event into the cache. Malformed payloads and unknown
/// events leave the cache untouched.
pub fn apply_push_event(cache: &QueryCache, event: &SseEvent, log_capacity: usize) {
    match event.event.as_str() {
        "status" => {
            if let Some(status) = decode::<Status>(event) {
                cache.set::<StatusKey>(status);
            }
        }
        "log" => {
            // Lines usually arrive as raw text.
            let line = serde_json::from_str::<String>(&event.data)
                .unwrap_or_else(|_| event.data.clone());
            cache.patch::<LogsKey, _>(|logs| Some(LogBuffer::with_line(logs, line, log_capacity)));
        }
        "restart" => {
            if let Some(notice) = decode::<RestartNotice>(event) {
                cache.patch::<StatusKey, _>(|status| {
                    status.and_then(|s| with_restarting(s, notice.restarting))
                });
            }
        }
        other => trace!(event = other, "ignoring push event"),
    }
}

pub(crate) fn decode<T: DeserializeOwned>(event: &SseEvent) -> Option<T> {
    match serde_json::from_str(&event.data) {
        Ok(value) => Some(value),
        Err(e) => {
            debug!(event = %event.event, error = %e, "dropping malformed payload");
            None
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use pretty_assertions::assert_eq;
    use xkeen_api::Error;

    use super::*;
    use crate::config::{DEFAULT_LOG_CAPACITY, DEFAULT_RECONNECT_DELAY};
    use crate::model::Latency;
    use crate::model::fixtures::status;
    use crate::testing::{Harness, Script, event};

    fn channel(harness: &Harness) -> PushChannel {
        PushChannel::new(
            harness.context(),
            DEFAULT_RECONNECT_DELAY,
            DEFAULT_LOG_CAPACITY,
            CancellationToken::new(),
        )
    }

    const STATUS_JSON: &str = r#"{
        "connected": true,
        "xray_running": true,
        "restarting": false,
        "current_server": "nl-1",
        "protocol": "vless",
        "latency_ms": 120,
        "uptime": "2h"
    }"#;

    #[tokio::test(start_paused = true)]
    async fn status_event_replaces_status() {
        let harness = Harness::logged_in();
        harness
            .transport
            .script(StreamEndpoint::Events, Script::Events(vec![event("status", STATUS_JSON)]));
        let push = channel(&harness);
        let mut states = push.state();

        assert!(push.start());
        states.wait_for(|s| *s == ChannelState::Reconnecting).await.unwrap();

        let status = harness.cache.get::<StatusKey>().unwrap();
        assert!(status.connected);
        assert_eq!(status.latency_ms, Latency::from_millis(120));
        push.close();
    }

    #[tokio::test(start_paused = true)]
    async fn log_buffer_keeps_the_newest_lines() {
        let harness = Harness::logged_in();
        let events = (0..205).map(|i| event("log", &format!("line {i}"))).collect();
        harness
            .transport
            .script(StreamEndpoint::Events, Script::Events(events));
        let push = channel(&harness);
        let mut states = push.state();

        push.start();
        states.wait_for(|s| *s == ChannelState::Reconnecting).await.unwrap();

        let logs = harness.cache.get::<LogsKey>().unwrap();
        assert_eq!(logs.len(), 200);
        assert_eq!(logs.first().map(String::as_str), Some("line 5"));
        assert_eq!(logs.last().map(String::as_str), Some("line 204"));
        push.close();
    }

    #[test]
    fn json_encoded_log_lines_are_unquoted() {
        let cache = QueryCache::new();
        apply_push_event(&cache, &event("log", r#""[Info] started""#), 10);
        apply_push_event(&cache, &event("log", "plain {not json"), 10);

        let logs = cache.get::<LogsKey>().unwrap();
        assert_eq!(logs.lines(), ["[Info] started", "plain {not json"]);
    }

    #[test]
    fn restart_touches_only_the_restarting_flag() {
        let cache = QueryCache::new();
        cache.set::<StatusKey>(status());
        let before = cache.get::<StatusKey>().unwrap();

        apply_push_event(&cache, &event("restart", r#"{"restarting": true}"#), 10);

        let after = cache.get::<StatusKey>().unwrap();
        assert!(after.restarting);
        assert_eq!(Status { restarting: false, ..(*after).clone() }, *before);
    }

    #[test]
    fn restart_without_status_is_a_no_op() {
        let cache = QueryCache::new();
        apply_push_event(&cache, &event("restart", r#"{"restarting": true}"#), 10);
        assert!(cache.get::<StatusKey>().is_none());
    }

    #[test]
    fn malformed_and_unknown_events_are_dropped() {
        let cache = QueryCache::new();
        cache.set::<StatusKey>(status());
        let notified = Arc::new(AtomicUsize::new(0));
        let _handle = {
            let notified = Arc::clone(&notified);
            cache.listen::<StatusKey, _>(move |_| {
                notified.fetch_add(1, Ordering::SeqCst);
            })
        };

        apply_push_event(&cache, &event("status", "{\"connected\": tru"), 10);
        apply_push_event(&cache, &event("restart", "[]"), 10);
        apply_push_event(&cache, &event("heartbeat", "{}"), 10);

        assert_eq!(notified.load(Ordering::SeqCst), 0);
        assert_eq!(*cache.get::<StatusKey>().unwrap(), status());
    }

    #[tokio::test(start_paused = true)]
    async fn reconnects_after_the_delay_once_per_error() {
        let harness = Harness::logged_in();
        harness.transport.script(
            StreamEndpoint::Events,
            Script::Fail(Error::Api {
                status: 502,
                message: "Bad Gateway".into(),
            }),
        );
        harness
            .transport
            .script(StreamEndpoint::Events, Script::Events(Vec::new()));
        let push = channel(&harness);
        let mut states = push.state();

        push.start();
        tokio::time::sleep(Duration::from_secs(20)).await;

        let opens = harness.transport.opens(StreamEndpoint::Events);
        assert_eq!(opens.len(), 3);
        for pair in opens.windows(2) {
            assert!(pair[1] - pair[0] >= DEFAULT_RECONNECT_DELAY);
        }
        assert_eq!(*states.borrow_and_update(), ChannelState::Connected);
        push.close();
    }

    #[tokio::test(start_paused = true)]
    async fn unauthorized_handshake_closes_and_logs_out() {
        let harness = Harness::logged_in();
        harness
            .transport
            .script(StreamEndpoint::Events, Script::Unauthorized);
        let push = channel(&harness);
        let mut states = push.state();

        push.start();
        states.wait_for(|s| *s == ChannelState::Closed).await.unwrap();
        tokio::time::sleep(Duration::from_secs(10)).await;

        assert!(!harness.credentials.is_present());
        assert_eq!(harness.signal.reason(), Some(LogoutReason::Unauthorized));
        assert_eq!(harness.transport.opens(StreamEndpoint::Events).len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn lost_credential_ends_the_session() {
        let harness = Harness::logged_in();
        let live = harness.transport.live(StreamEndpoint::Events);
        let push = channel(&harness);
        let mut states = push.state();

        push.start();
        states.wait_for(|s| *s == ChannelState::Connected).await.unwrap();
        harness.credentials.clear();
        drop(live);

        states.wait_for(|s| *s == ChannelState::Closed).await.unwrap();
        assert_eq!(harness.signal.reason(), Some(LogoutReason::CredentialMissing));
    }

    #[tokio::test(start_paused = true)]
    async fn close_cancels_the_pending_reconnect() {
        let harness = Harness::logged_in();
        harness
            .transport
            .script(StreamEndpoint::Events, Script::Events(Vec::new()));
        let push = channel(&harness);
        let mut states = push.state();

        push.start();
        states.wait_for(|s| *s == ChannelState::Reconnecting).await.unwrap();
        push.close();
        push.close();
        push.take_task().unwrap().await.unwrap();

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(push.current_state(), ChannelState::Closed);
        assert_eq!(harness.transport.opens(StreamEndpoint::Events).len(), 1);
        assert!(!push.start());
    }

    #[tokio::test(start_paused = true)]
    async fn stays_idle_without_a_credential() {
        let harness = Harness::logged_out();
        let push = channel(&harness);

        assert!(!push.start());
        tokio::task::yield_now().await;

        assert_eq!(push.current_state(), ChannelState::Idle);
        assert!(harness.transport.opens(StreamEndpoint::Events).is_empty());
        assert!(!harness.signal.is_logged_out());
    }
}
