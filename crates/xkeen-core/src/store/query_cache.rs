// ── Session query cache ──
//
// Keyed store of the four panel entities. Every component reconciles into
// it: the push channel, the latency probe, mutation speculation, and the
// refetcher. Entries are created lazily and live until `clear()`.

use std::any::Any;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use dashmap::DashMap;
use tokio::sync::broadcast;
use tracing::trace;

use super::entry::Entry;
use super::keys::{CacheKey, LogsKey, QueryKey, ServersKey, StatusKey, SubscriptionKey};
use crate::stream::{CacheStream, ListenerHandle, Unlisten};

const INVALIDATION_CHANNEL_SIZE: usize = 64;

type ErasedEntry = Arc<dyn Any + Send + Sync>;

/// Session-scoped reactive cache.
///
/// Thread-safe: values are immutable `Arc` snapshots, writes to one key
/// are serialized by that key's `watch` channel, and `patch` is an atomic
/// read-modify-write. Invalidations are broadcast by name to whoever owns
/// the queries (the refetcher).
pub struct QueryCache {
    entries: DashMap<QueryKey, ErasedEntry>,
    invalidations: broadcast::Sender<QueryKey>,
    closed: AtomicBool,
}

impl Default for QueryCache {
    fn default() -> Self {
        Self::new()
    }
}

impl QueryCache {
    pub fn new() -> Self {
        let (invalidations, _) = broadcast::channel(INVALIDATION_CHANNEL_SIZE);
        Self {
            entries: DashMap::new(),
            invalidations,
            closed: AtomicBool::new(false),
        }
    }

    // ── Reads ────────────────────────────────────────────────────────

    /// Current value, or `None` while the entry has never been written.
    pub fn get<K: CacheKey>(&self) -> Option<Arc<K::Value>> {
        self.entry::<K>().get()
    }

    /// Whether an entry exists for `key`. Does not create one.
    pub fn contains(&self, key: QueryKey) -> bool {
        self.entries.contains_key(&key)
    }

    // ── Writes ───────────────────────────────────────────────────────

    /// Replace the value and notify every subscriber.
    pub fn set<K: CacheKey>(&self, value: impl Into<Arc<K::Value>>) {
        self.entry::<K>().set(value.into());
    }

    /// Functional update of the value.
    ///
    /// The updater sees the current value (if any) and returns the next
    /// one, or `None` to leave the entry as it is. Subscribers are notified
    /// only when the returned `Arc` differs from the stored one. Returns
    /// whether the entry changed.
    pub fn patch<K, F>(&self, updater: F) -> bool
    where
        K: CacheKey,
        F: FnOnce(Option<&Arc<K::Value>>) -> Option<Arc<K::Value>>,
    {
        self.entry::<K>().patch(updater)
    }

    // ── Staleness ────────────────────────────────────────────────────

    /// Mark the entry stale and ask its owning query to refetch.
    pub fn invalidate<K: CacheKey>(&self) {
        if self.closed.load(Ordering::Acquire) {
            return;
        }
        let (entry, created) = self.entry_created::<K>();
        // Creation already announced the entry's initial fetch.
        if !created {
            let generation = entry.invalidate();
            trace!(key = %K::KEY, generation, "invalidated");
            let _ = self.invalidations.send(K::KEY);
        }
    }

    /// [`invalidate`](Self::invalidate) by runtime name.
    pub fn invalidate_key(&self, key: QueryKey) {
        match key {
            QueryKey::Status => self.invalidate::<StatusKey>(),
            QueryKey::Logs => self.invalidate::<LogsKey>(),
            QueryKey::Servers => self.invalidate::<ServersKey>(),
            QueryKey::Subscription => self.invalidate::<SubscriptionKey>(),
        }
    }

    pub fn is_stale<K: CacheKey>(&self) -> bool {
        self.entry::<K>().is_stale()
    }

    pub fn is_stale_key(&self, key: QueryKey) -> bool {
        match key {
            QueryKey::Status => self.is_stale::<StatusKey>(),
            QueryKey::Logs => self.is_stale::<LogsKey>(),
            QueryKey::Servers => self.is_stale::<ServersKey>(),
            QueryKey::Subscription => self.is_stale::<SubscriptionKey>(),
        }
    }

    /// Receive the name of every invalidated (or newly created) entry.
    pub fn invalidations(&self) -> broadcast::Receiver<QueryKey> {
        self.invalidations.subscribe()
    }

    pub(crate) fn begin_fetch<K: CacheKey>(&self) -> u64 {
        self.entry::<K>().begin_fetch()
    }

    pub(crate) fn resolve<K: CacheKey>(&self, generation: u64, value: K::Value) -> Arc<K::Value> {
        self.entry::<K>().resolve(generation, value)
    }

    // ── Subscriptions ────────────────────────────────────────────────

    /// Subscribe to the entry through a `watch`-backed stream.
    pub fn subscribe<K: CacheKey>(&self) -> CacheStream<K::Value> {
        self.entry::<K>().subscribe()
    }

    /// Register a callback run synchronously after every change of the
    /// entry. The callback stays registered while the handle lives.
    pub fn listen<K, F>(&self, listener: F) -> ListenerHandle
    where
        K: CacheKey,
        F: Fn(&Arc<K::Value>) + Send + Sync + 'static,
    {
        let entry = self.entry::<K>();
        let id = entry.listen(Arc::new(listener));
        let unlisten: Arc<dyn Unlisten> = entry;
        ListenerHandle::new(Arc::downgrade(&unlisten), id)
    }

    // ── Teardown ─────────────────────────────────────────────────────

    /// Drop every entry. Outstanding streams end and listeners are
    /// released; later invalidations are ignored.
    pub fn clear(&self) {
        self.closed.store(true, Ordering::Release);
        for item in self.entries.iter() {
            clear_listeners(item.key(), item.value());
        }
        self.entries.clear();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    // ── Private helpers ──────────────────────────────────────────────

    fn entry<K: CacheKey>(&self) -> Arc<Entry<K::Value>> {
        self.entry_created::<K>().0
    }

    /// Get or lazily create the entry for `K`. Creation broadcasts the
    /// key so the entry's initial fetch happens.
    fn entry_created<K: CacheKey>(&self) -> (Arc<Entry<K::Value>>, bool) {
        if let Some(existing) = self.entries.get(&K::KEY) {
            return (downcast::<K>(Arc::clone(existing.value())), false);
        }

        let mut created = false;
        let erased = Arc::clone(
            self.entries
                .entry(K::KEY)
                .or_insert_with(|| {
                    created = true;
                    let fresh: ErasedEntry = Arc::new(Entry::<K::Value>::new());
                    fresh
                })
                .value(),
        );

        if created && !self.is_closed() {
            trace!(key = %K::KEY, "cache entry created");
            let _ = self.invalidations.send(K::KEY);
        }
        (downcast::<K>(erased), created)
    }
}

fn downcast<K: CacheKey>(erased: ErasedEntry) -> Arc<Entry<K::Value>> {
    erased
        .downcast::<Entry<K::Value>>()
        .unwrap_or_else(|_| unreachable!("cache entry type is fixed by its key"))
}

fn clear_listeners(key: &QueryKey, erased: &ErasedEntry) {
    match key {
        QueryKey::Status => downcast::<StatusKey>(Arc::clone(erased)).clear_listeners(),
        QueryKey::Logs => downcast::<LogsKey>(Arc::clone(erased)).clear_listeners(),
        QueryKey::Servers => downcast::<ServersKey>(Arc::clone(erased)).clear_listeners(),
        QueryKey::Subscription => {
            downcast::<SubscriptionKey>(Arc::clone(erased)).clear_listeners();
        }
    }
}
