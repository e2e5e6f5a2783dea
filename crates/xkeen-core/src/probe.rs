// ── Latency probe ──
//
// Short-lived `/api/servers/check` stream: the panel measures every
// server and reports each result as a `latency` event, then says `done`.

use std::sync::{Arc, Mutex, PoisonError};

use futures_util::StreamExt;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};
use xkeen_api::models::LatencyReport;
use xkeen_api::{SseEvent, StreamEndpoint};

use crate::model::apply_latency;
use crate::push::{StreamContext, decode};
use crate::store::{QueryCache, ServersKey};

/// At most one latency check in flight per session.
pub struct LatencyProbe {
    ctx: StreamContext,
    checking: Arc<watch::Sender<bool>>,
    parent: CancellationToken,
    current: Mutex<Option<CancellationToken>>,
}

impl LatencyProbe {
    pub(crate) fn new(ctx: StreamContext, parent: CancellationToken) -> Self {
        let (checking, _) = watch::channel(false);
        Self {
            ctx,
            checking: Arc::new(checking),
            parent,
            current: Mutex::new(None),
        }
    }

    /// Begin a latency check. Returns `false` without doing anything when
    /// a check is already running, no credential is stored, or the session
    /// is shutting down.
    pub fn start(&self) -> bool {
        if self.parent.is_cancelled() || !self.ctx.credentials.is_present() {
            return false;
        }
        let claimed = self.checking.send_if_modified(|checking| {
            if *checking {
                return false;
            }
            *checking = true;
            true
        });
        if !claimed {
            debug!("latency check already in flight");
            return false;
        }

        let cancel = self.parent.child_token();
        *self.current.lock().unwrap_or_else(PoisonError::into_inner) = Some(cancel.clone());
        tokio::spawn(probe_task(
            self.ctx.clone(),
            Arc::clone(&self.checking),
            cancel,
        ));
        true
    }

    /// Whether a check is in flight, as a watch.
    pub fn checking(&self) -> watch::Receiver<bool> {
        self.checking.subscribe()
    }

    pub fn is_checking(&self) -> bool {
        *self.checking.borrow()
    }

    /// Abort the running check, if any.
    pub fn close(&self) {
        if let Some(cancel) = self
            .current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            cancel.cancel();
        }
        self.checking.send_replace(false);
    }
}

enum Outcome {
    Finished,
    Failed(xkeen_api::Error),
}

async fn probe_task(ctx: StreamContext, checking: Arc<watch::Sender<bool>>, cancel: CancellationToken) {
    let outcome = tokio::select! {
        biased;
        () = cancel.cancelled() => None,
        outcome = run_probe(&ctx) => Some(outcome),
    };

    match outcome {
        Some(Outcome::Finished) => info!("latency check finished"),
        Some(Outcome::Failed(e)) => {
            warn!(error = %e, "latency check failed");
            ctx.logout_if_unauthenticated(&e);
        }
        None => debug!("latency check cancelled"),
    }
    checking.send_replace(false);
}

async fn run_probe(ctx: &StreamContext) -> Outcome {
    let mut stream = match ctx.transport.open(StreamEndpoint::LatencyCheck).await {
        Ok(stream) => stream,
        Err(e) => return Outcome::Failed(e),
    };

    while let Some(item) = stream.next().await {
        let event = match item {
            Ok(event) => event,
            Err(e) => return Outcome::Failed(e),
        };
        if apply_probe_event(&ctx.cache, &event) {
            return Outcome::Finished;
        }
    }
    Outcome::Failed(xkeen_api::Error::StreamClosed)
}

/// Apply one latency-check event. Returns `true` on a terminal event.
fn apply_probe_event(cache: &QueryCache, event: &SseEvent) -> bool {
    match event.event.as_str() {
        "latency" => {
            if let Some(report) = decode::<LatencyReport>(event) {
                let changed = cache.patch::<ServersKey, _>(|servers| {
                    servers.and_then(|s| apply_latency(s, report.id, report.latency_ms))
                });
                trace!(id = report.id, latency = %report.latency_ms, changed, "latency report");
            }
            false
        }
        "done" | "close" => true,
        other => {
            trace!(event = other, "ignoring latency-check event");
            false
        }
    }
}
