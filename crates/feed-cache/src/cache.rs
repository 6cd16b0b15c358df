//! TTL cache with per-key request coalescing
//!
//! Each key maps to at most one slot. A slot is either `Pending` (one shared
//! in-flight fetch that every concurrent caller attaches to) or `Ready` (a
//! value with an absolute expiry). Expiry is evaluated under the same lock as
//! the read, so no caller ever observes a value past its `expires_at`.

use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt, Shared};
use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::NetworkError;
use crate::fetcher::RemoteFetcher;
use crate::metrics::MetricsSink;

const EVENT_CHANNEL_CAPACITY: usize = 64;

type SharedFetch<V> = Shared<BoxFuture<'static, Result<Arc<V>, NetworkError>>>;

/// Observable state of a cache entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryStatus {
    Empty,
    Pending,
    Ready,
    Expired,
}

/// Broadcast whenever a fetch populates the cache
#[derive(Debug)]
pub enum CacheEvent<K, V> {
    Refreshed { key: K, value: Arc<V> },
}

// Derived Clone would demand `V: Clone`; the payload is shared, not copied.
impl<K: Clone, V> Clone for CacheEvent<K, V> {
    fn clone(&self) -> Self {
        match self {
            CacheEvent::Refreshed { key, value } => CacheEvent::Refreshed {
                key: key.clone(),
                value: Arc::clone(value),
            },
        }
    }
}

enum Slot<V> {
    Pending {
        generation: u64,
        fetch: SharedFetch<V>,
    },
    Ready {
        value: Arc<V>,
        expires_at: Instant,
    },
}

struct Entries<K, V> {
    slots: HashMap<K, Slot<V>>,
    next_generation: u64,
}

impl<K: Eq + Hash, V> Entries<K, V> {
    /// Drop every `Ready` slot past its expiry, returning how many went
    fn purge_expired(&mut self, now: Instant) -> usize {
        let before = self.slots.len();
        self.slots.retain(|_, slot| match slot {
            Slot::Ready { expires_at, .. } => now <= *expires_at,
            Slot::Pending { .. } => true,
        });
        before - self.slots.len()
    }
}

/// Reports the end of a dispatched fetch to the metrics sink, also when the
/// fetch is dropped before completing.
struct InFlight {
    metrics: Arc<dyn MetricsSink>,
}

impl InFlight {
    fn start(metrics: &Arc<dyn MetricsSink>) -> Self {
        metrics.record_network_call();
        metrics.record_fetch_started();
        Self {
            metrics: Arc::clone(metrics),
        }
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.metrics.record_fetch_finished();
    }
}

enum Lookup<V> {
    Hit(Arc<V>),
    Attach(SharedFetch<V>),
    Miss,
}

struct CacheState<K, V> {
    entries: Mutex<Entries<K, V>>,
    ttl: Duration,
    events: broadcast::Sender<CacheEvent<K, V>>,
}

impl<K, V> CacheState<K, V>
where
    K: Clone + Eq + Hash + Debug + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    fn lock(&self) -> MutexGuard<'_, Entries<K, V>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Apply a finished fetch, unless the slot has since been invalidated or
    /// taken over by a newer fetch.
    fn settle(&self, key: K, generation: u64, outcome: &Result<Arc<V>, NetworkError>) {
        let mut entries = self.lock();

        let current = matches!(
            entries.slots.get(&key),
            Some(Slot::Pending { generation: g, .. }) if *g == generation
        );
        if !current {
            debug!(key = ?key, generation, "Discarding result of superseded fetch");
            return;
        }

        match outcome {
            Ok(value) => {
                let expires_at = Instant::now() + self.ttl;
                entries.slots.insert(
                    key.clone(),
                    Slot::Ready {
                        value: Arc::clone(value),
                        expires_at,
                    },
                );
                drop(entries);

                debug!(key = ?key, generation, "Cached fetched collection");
                // No subscribers is fine
                let _ = self.events.send(CacheEvent::Refreshed {
                    key,
                    value: Arc::clone(value),
                });
            }
            Err(e) => {
                entries.slots.remove(&key);
                warn!(key = ?key, generation, error = %e, "Fetch failed, entry cleared");
            }
        }
    }
}

/// Time-bounded cache of remote collections.
///
/// At most one fetch per key is in flight at any time; concurrent `get` calls
/// for a pending key share its outcome. Failures are propagated to every
/// attached caller but never cached.
pub struct TtlCache<K, V> {
    state: Arc<CacheState<K, V>>,
    fetcher: Arc<dyn RemoteFetcher<K, V>>,
    metrics: Arc<dyn MetricsSink>,
}

impl<K, V> TtlCache<K, V>
where
    K: Clone + Eq + Hash + Debug + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    pub fn new(
        fetcher: Arc<dyn RemoteFetcher<K, V>>,
        metrics: Arc<dyn MetricsSink>,
        ttl: Duration,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        Self {
            state: Arc::new(CacheState {
                entries: Mutex::new(Entries {
                    slots: HashMap::new(),
                    next_generation: 0,
                }),
                ttl,
                events,
            }),
            fetcher,
            metrics,
        }
    }

    /// Get the collection for `key`, fetching it if absent or expired
    pub async fn get(&self, key: &K) -> Result<Arc<V>, NetworkError> {
        let fetch = {
            let mut entries = self.state.lock();
            let now = Instant::now();

            let lookup = match entries.slots.get(key) {
                Some(Slot::Ready { value, expires_at }) if now <= *expires_at => {
                    Lookup::Hit(Arc::clone(value))
                }
                Some(Slot::Pending { fetch, .. }) => Lookup::Attach(fetch.clone()),
                _ => Lookup::Miss,
            };

            match lookup {
                Lookup::Hit(value) => {
                    debug!(key = ?key, "Cache hit");
                    return Ok(value);
                }
                Lookup::Attach(fetch) => {
                    debug!(key = ?key, "Attaching to in-flight fetch");
                    fetch
                }
                Lookup::Miss => self.dispatch(&mut entries, key),
            }
        };

        fetch.await
    }

    /// Discard any cached value for `key`, then fetch it again
    pub async fn get_fresh(&self, key: &K) -> Result<Arc<V>, NetworkError> {
        self.invalidate(key);
        self.get(key).await
    }

    /// Drop the entry for `key` so the next `get` fetches again.
    ///
    /// A fetch already in flight still resolves for the callers attached to
    /// it, but its result is not stored. Returns whether an entry existed.
    pub fn invalidate(&self, key: &K) -> bool {
        let removed = self.state.lock().slots.remove(key).is_some();
        if removed {
            info!(key = ?key, "Invalidated cache entry");
        }
        removed
    }

    /// The current value for `key` if it is cached and still valid. Never
    /// fetches.
    pub fn peek(&self, key: &K) -> Option<Arc<V>> {
        match self.state.lock().slots.get(key) {
            Some(Slot::Ready { value, expires_at }) if Instant::now() <= *expires_at => {
                Some(Arc::clone(value))
            }
            _ => None,
        }
    }

    /// Remove expired entries for every key. Returns the number removed.
    pub fn purge_expired(&self) -> usize {
        self.state.lock().purge_expired(Instant::now())
    }

    /// Number of keys holding a slot, pending or ready
    pub fn len(&self) -> usize {
        self.state.lock().slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn invalidate_all(&self) {
        let mut entries = self.state.lock();
        let count = entries.slots.len();
        entries.slots.clear();
        info!(count, "Invalidated all cache entries");
    }

    pub fn status(&self, key: &K) -> EntryStatus {
        let entries = self.state.lock();
        match entries.slots.get(key) {
            None => EntryStatus::Empty,
            Some(Slot::Pending { .. }) => EntryStatus::Pending,
            Some(Slot::Ready { expires_at, .. }) if Instant::now() <= *expires_at => {
                EntryStatus::Ready
            }
            Some(Slot::Ready { .. }) => EntryStatus::Expired,
        }
    }

    /// Number of keys with a fetch in flight
    pub fn pending_count(&self) -> usize {
        self.state
            .lock()
            .slots
            .values()
            .filter(|slot| matches!(slot, Slot::Pending { .. }))
            .count()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CacheEvent<K, V>> {
        self.state.events.subscribe()
    }

    fn dispatch(&self, entries: &mut Entries<K, V>, key: &K) -> SharedFetch<V> {
        // Keys nobody reads again would otherwise keep their expired slot
        let purged = entries.purge_expired(Instant::now());
        if purged > 0 {
            debug!(purged, "Purged expired cache entries");
        }

        let generation = entries.next_generation;
        entries.next_generation += 1;

        let fetcher = Arc::clone(&self.fetcher);
        let state: Weak<CacheState<K, V>> = Arc::downgrade(&self.state);
        let owned_key = key.clone();
        let in_flight = InFlight::start(&self.metrics);

        let fetch = async move {
            let outcome = fetcher.fetch_collection(&owned_key).await.map(Arc::new);
            drop(in_flight);
            if let Some(state) = state.upgrade() {
                state.settle(owned_key, generation, &outcome);
            }
            outcome
        }
        .boxed()
        .shared();

        entries.slots.insert(
            key.clone(),
            Slot::Pending {
                generation,
                fetch: fetch.clone(),
            },
        );

        info!(key = ?key, generation, "Dispatching fetch");

        fetch
    }
}
