// ── Single cache entry ──
//
// One named entity: the current snapshot in a `watch` channel, the
// synchronous listeners, and the staleness generations that drive the
// refetcher.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;

use crate::stream::{CacheStream, Unlisten};

pub(crate) type Listener<T> = Arc<dyn Fn(&Arc<T>) + Send + Sync>;

pub(crate) struct Entry<T: Send + Sync + 'static> {
    value: watch::Sender<Option<Arc<T>>>,
    listeners: Mutex<Vec<(u64, Listener<T>)>>,
    /// Values stored but not yet handed to the listeners, in write order.
    outbox: Mutex<Outbox<T>>,
    next_listener: AtomicU64,
    /// Bumped by every invalidation. Starts at 1: a new entry needs its
    /// initial fetch.
    requested: AtomicU64,
    /// The `requested` generation the last completed fetch started from.
    settled: AtomicU64,
}

impl<T: Send + Sync + 'static> Entry<T> {
    pub(crate) fn new() -> Self {
        let (value, _) = watch::channel(None);
        Self {
            value,
            listeners: Mutex::new(Vec::new()),
            outbox: Mutex::new(Outbox::default()),
            next_listener: AtomicU64::new(0),
            requested: AtomicU64::new(1),
            settled: AtomicU64::new(0),
        }
    }

    pub(crate) fn get(&self) -> Option<Arc<T>> {
        self.value.borrow().clone()
    }

    /// Unconditional replace. Always notifies.
    pub(crate) fn set(&self, value: Arc<T>) {
        let mut outbox = self.lock_outbox();
        self.value.send_replace(Some(Arc::clone(&value)));
        outbox.queue.push_back(value);
        self.deliver(outbox);
    }

    /// Atomic read-modify-write. The updater returns `None` (or the same
    /// `Arc`) to leave the entry untouched; subscribers are notified only
    /// when the stored reference changes.
    pub(crate) fn patch<F>(&self, updater: F) -> bool
    where
        F: FnOnce(Option<&Arc<T>>) -> Option<Arc<T>>,
    {
        let mut outbox = self.lock_outbox();
        let mut changed = None;
        self.value.send_if_modified(|slot| match updater(slot.as_ref()) {
            Some(next) if !slot.as_ref().is_some_and(|old| Arc::ptr_eq(old, &next)) => {
                *slot = Some(Arc::clone(&next));
                changed = Some(next);
                true
            }
            _ => false,
        });

        match changed {
            Some(value) => {
                outbox.queue.push_back(value);
                self.deliver(outbox);
                true
            }
            None => false,
        }
    }

    pub(crate) fn subscribe(&self) -> CacheStream<T> {
        CacheStream::new(self.value.subscribe())
    }

    pub(crate) fn listen(&self, listener: Listener<T>) -> u64 {
        let id = self.next_listener.fetch_add(1, Ordering::Relaxed);
        self.lock_listeners().push((id, listener));
        id
    }

    pub(crate) fn clear_listeners(&self) {
        self.lock_listeners().clear();
    }

    // ── Staleness ────────────────────────────────────────────────────

    pub(crate) fn invalidate(&self) -> u64 {
        self.requested.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub(crate) fn is_stale(&self) -> bool {
        self.settled.load(Ordering::Acquire) < self.requested.load(Ordering::Acquire)
    }

    /// Generation a fetch starting now will settle.
    pub(crate) fn begin_fetch(&self) -> u64 {
        self.requested.load(Ordering::Acquire)
    }

    /// Store the result of a fetch that started at `generation`, unless a
    /// fetch that started later has already landed. Returns the value now
    /// held by the entry.
    pub(crate) fn resolve(&self, generation: u64, value: T) -> Arc<T> {
        let previous = self.settled.fetch_max(generation, Ordering::AcqRel);
        if previous > generation {
            if let Some(current) = self.get() {
                return current;
            }
        }
        let value = Arc::new(value);
        self.set(Arc::clone(&value));
        value
    }

    // ── Private helpers ──────────────────────────────────────────────

    /// Hand queued values to the listeners in the order they were stored.
    ///
    /// Values are queued under the same lock as the store, and a single
    /// caller drains the queue at a time. A write made from inside a
    /// listener, or racing on another thread, is queued behind the value
    /// being delivered and reaches every listener after it.
    fn deliver<'a>(&'a self, mut outbox: MutexGuard<'a, Outbox<T>>) {
        if outbox.draining {
            return;
        }
        outbox.draining = true;

        loop {
            let Some(value) = outbox.queue.pop_front() else {
                outbox.draining = false;
                return;
            };
            drop(outbox);

            // Listeners run without any lock held so they may touch the cache.
            let listeners: Vec<Listener<T>> = self
                .lock_listeners()
                .iter()
                .map(|(_, l)| Arc::clone(l))
                .collect();
            for listener in listeners {
                listener(&value);
            }

            outbox = self.lock_outbox();
        }
    }

    fn lock_listeners(&self) -> MutexGuard<'_, Vec<(u64, Listener<T>)>> {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_outbox(&self) -> MutexGuard<'_, Outbox<T>> {
        self.outbox.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

struct Outbox<T> {
    queue: VecDeque<Arc<T>>,
    draining: bool,
}

impl<T> Default for Outbox<T> {
    fn default() -> Self {
        Self {
            queue: VecDeque::new(),
            draining: false,
        }
    }
}

impl<T: Send + Sync + 'static> Unlisten for Entry<T> {
    fn unlisten(&self, id: u64) {
        self.lock_listeners().retain(|(lid, _)| *lid != id);
    }
}
