// ── Reactive cache subscriptions ──
//
// Two ways to observe a cache entry: a `CacheStream` (watch-based, lagging
// consumers see the latest snapshot) and a synchronous listener kept alive
// by its `ListenerHandle`.

use std::pin::Pin;
use std::sync::{Arc, Weak};
use std::task::{Context, Poll, ready};

use futures_core::Stream;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;

/// A subscription to one cache entry.
///
/// Provides point-in-time access and change notification via
/// [`changed()`](Self::changed) or by converting into a `Stream`. The
/// subscription ends when the session cache is torn down.
pub struct CacheStream<T: Send + Sync + 'static> {
    current: Option<Arc<T>>,
    receiver: watch::Receiver<Option<Arc<T>>>,
}

impl<T: Send + Sync + 'static> CacheStream<T> {
    pub(crate) fn new(mut receiver: watch::Receiver<Option<Arc<T>>>) -> Self {
        let current = receiver.borrow_and_update().clone();
        Self { current, receiver }
    }

    /// The value seen at creation or at the last [`changed()`](Self::changed).
    pub fn current(&self) -> Option<&Arc<T>> {
        self.current.as_ref()
    }

    /// The latest value (may have changed since the last poll).
    pub fn latest(&self) -> Option<Arc<T>> {
        self.receiver.borrow().clone()
    }

    /// Wait for the next change. Returns `None` once the entry is gone.
    pub async fn changed(&mut self) -> Option<Arc<T>> {
        loop {
            self.receiver.changed().await.ok()?;
            if let Some(value) = self.receiver.borrow_and_update().clone() {
                self.current = Some(Arc::clone(&value));
                return Some(value);
            }
        }
    }

    /// Convert into a `Stream` that yields the current value (if any) and
    /// then every change.
    pub fn into_stream(self) -> CacheWatchStream<T> {
        CacheWatchStream {
            inner: WatchStream::new(self.receiver),
        }
    }
}

/// `Stream` adapter backed by a `watch::Receiver`.
pub struct CacheWatchStream<T: Send + Sync + 'static> {
    inner: WatchStream<Option<Arc<T>>>,
}

impl<T: Send + Sync + 'static> Stream for CacheWatchStream<T> {
    type Item = Arc<T>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            match ready!(Pin::new(&mut self.inner).poll_next(cx)) {
                Some(Some(value)) => return Poll::Ready(Some(value)),
                Some(None) => {}
                None => return Poll::Ready(None),
            }
        }
    }
}

// ── Listeners ────────────────────────────────────────────────────────

pub(crate) trait Unlisten: Send + Sync {
    fn unlisten(&self, id: u64);
}

/// Keeps a cache listener registered. Dropping the handle unsubscribes.
#[must_use = "dropping the handle unsubscribes the listener"]
pub struct ListenerHandle {
    entry: Weak<dyn Unlisten>,
    id: u64,
}

impl ListenerHandle {
    pub(crate) fn new(entry: Weak<dyn Unlisten>, id: u64) -> Self {
        Self { entry, id }
    }

    /// Stop receiving callbacks.
    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl Drop for ListenerHandle {
    fn drop(&mut self) {
        if let Some(entry) = self.entry.upgrade() {
            entry.unlisten(self.id);
        }
    }
}

impl std::fmt::Debug for ListenerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerHandle").field("id", &self.id).finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use futures_util::StreamExt;

    use crate::model::fixtures::status;
    use crate::model::{SubscriptionInfo, with_restarting};
    use crate::store::{QueryCache, StatusKey, SubscriptionKey};

    #[tokio::test]
    async fn stream_starts_with_the_current_value_then_follows_changes() {
        let cache = QueryCache::new();
        cache.set::<StatusKey>(status());
        let mut stream = cache.subscribe::<StatusKey>().into_stream();

        let first = stream.next().await.unwrap();
        assert!(!first.restarting);

        cache.patch::<StatusKey, _>(|s| s.and_then(|s| with_restarting(s, true)));
        assert!(stream.next().await.unwrap().restarting);

        cache.clear();
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn empty_entry_yields_nothing_until_set() {
        let cache = QueryCache::new();
        let mut stream = cache.subscribe::<SubscriptionKey>().into_stream();

        cache.set::<SubscriptionKey>(SubscriptionInfo {
            url: "https://example.test/sub".into(),
            last_updated: None,
            server_count: 4,
        });
        let info = stream.next().await.unwrap();
        assert_eq!(info.server_count, 4);
    }
}
