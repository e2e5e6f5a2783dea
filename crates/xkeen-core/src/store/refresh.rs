// ── Query refetching ──
//
// Owns the queries behind the cache entries: listens for invalidations
// and overwrites stale entries with the panel's authoritative values.

use std::future::Future;
use std::ops::ControlFlow;
use std::sync::Arc;

use strum::IntoEnumIterator;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::QueryCache;
use super::keys::{CacheKey, LogsKey, QueryKey, ServersKey, StatusKey, SubscriptionKey};
use crate::config::SessionConfig;
use crate::error::CoreError;
use crate::model::LogBuffer;
use crate::request::RequestClient;

/// A cache key with an authoritative fetch.
pub trait Query: CacheKey {
    fn fetch(
        client: &RequestClient,
        config: &SessionConfig,
    ) -> impl Future<Output = Result<Self::Value, CoreError>> + Send;
}

impl Query for StatusKey {
    async fn fetch(client: &RequestClient, _config: &SessionConfig) -> Result<Self::Value, CoreError> {
        client.status().await
    }
}

impl Query for LogsKey {
    async fn fetch(client: &RequestClient, config: &SessionConfig) -> Result<Self::Value, CoreError> {
        let lines = client.logs(config.initial_log_lines).await?;
        Ok(LogBuffer::new(lines, config.log_capacity))
    }
}

impl Query for ServersKey {
    async fn fetch(client: &RequestClient, _config: &SessionConfig) -> Result<Self::Value, CoreError> {
        client.servers().await
    }
}

impl Query for SubscriptionKey {
    async fn fetch(client: &RequestClient, _config: &SessionConfig) -> Result<Self::Value, CoreError> {
        client.subscription().await
    }
}

/// Fetch `K` once and store the result. Returns the value the entry holds
/// afterwards.
pub(crate) async fn load<K: Query>(
    cache: &QueryCache,
    client: &RequestClient,
    config: &SessionConfig,
) -> Result<Arc<K::Value>, CoreError> {
    let generation = cache.begin_fetch::<K>();
    let value = K::fetch(client, config).await?;
    Ok(cache.resolve::<K>(generation, value))
}

/// Refetch `K` if stale, retrying transient failures up to
/// `config.refetch_retries` times. Breaks once the session is no longer
/// authenticated.
async fn refetch<K: Query>(
    cache: &QueryCache,
    client: &RequestClient,
    config: &SessionConfig,
) -> ControlFlow<()> {
    if !cache.is_stale::<K>() {
        return ControlFlow::Continue(());
    }

    let mut attempt = 0;
    loop {
        match load::<K>(cache, client, config).await {
            Ok(_) => {
                debug!(key = %K::KEY, "query settled");
                return ControlFlow::Continue(());
            }
            Err(e) if e.is_auth_failure() => {
                debug!(key = %K::KEY, "refetch stopped: not authenticated");
                return ControlFlow::Break(());
            }
            Err(e) if attempt < config.refetch_retries => {
                attempt += 1;
                warn!(key = %K::KEY, error = %e, attempt, "refetch failed, retrying");
            }
            Err(e) => {
                warn!(key = %K::KEY, error = %e, "refetch failed");
                return ControlFlow::Continue(());
            }
        }
    }
}

async fn refetch_key(
    key: QueryKey,
    cache: &QueryCache,
    client: &RequestClient,
    config: &SessionConfig,
) -> ControlFlow<()> {
    match key {
        QueryKey::Status => refetch::<StatusKey>(cache, client, config).await,
        QueryKey::Logs => refetch::<LogsKey>(cache, client, config).await,
        QueryKey::Servers => refetch::<ServersKey>(cache, client, config).await,
        QueryKey::Subscription => refetch::<SubscriptionKey>(cache, client, config).await,
    }
}

/// Spawn the background refetcher: refetch every stale entry as
/// invalidations arrive, until cancelled or the credential is rejected.
///
/// Subscribes before returning, so no invalidation issued after this call
/// is missed. Entries that already exist are checked first.
pub(crate) fn spawn_refetcher(
    cache: Arc<QueryCache>,
    client: RequestClient,
    config: SessionConfig,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    let rx = cache.invalidations();
    let existing: Vec<QueryKey> = QueryKey::iter().filter(|k| cache.contains(*k)).collect();
    tokio::spawn(refetch_loop(cache, client, config, cancel, rx, existing))
}

async fn refetch_loop(
    cache: Arc<QueryCache>,
    client: RequestClient,
    config: SessionConfig,
    cancel: CancellationToken,
    mut rx: broadcast::Receiver<QueryKey>,
    mut pending: Vec<QueryKey>,
) {
    loop {
        for key in pending.drain(..) {
            let flow = tokio::select! {
                biased;
                () = cancel.cancelled() => return,
                flow = refetch_key(key, &cache, &client, &config) => flow,
            };
            if flow.is_break() {
                debug!("refetcher exiting: not authenticated");
                return;
            }
        }

        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            msg = rx.recv() => match msg {
                Ok(key) => pending.push(key),
                Err(RecvError::Lagged(skipped)) => {
                    debug!(skipped, "invalidations lagged, checking every entry");
                    pending.extend(QueryKey::iter().filter(|k| cache.contains(*k)));
                }
                Err(RecvError::Closed) => break,
            }
        }
    }

    debug!("refetcher exiting");
}
