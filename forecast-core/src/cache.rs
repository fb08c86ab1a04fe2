//! Deduplicating query cache.
//!
//! Each key has at most one in-flight fetch. Callers that arrive while a
//! fetch is pending subscribe to the same outcome; a successful value is
//! served from memory until the key is invalidated or, once the cache is
//! full, evicted as the least recently used idle entry. A failed entry is
//! replaced by the next request for the same key.

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{broadcast, watch};

use crate::error::ForecastError;

const EVENT_CAPACITY: usize = 64;
const DEFAULT_CAPACITY: usize = 64;

/// Deterministic cache key: endpoint plus parameters sorted by name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QueryKey(String);

impl QueryKey {
    pub fn new<K, V>(endpoint: &str, params: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: ToString,
    {
        let sorted: BTreeMap<String, String> = params
            .into_iter()
            .map(|(k, v)| (k.into(), v.to_string()))
            .collect();

        let query = sorted
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("&");

        Self(format!("{endpoint}?{query}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for QueryKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum QueryState<T> {
    Pending,
    Success(T),
    Error(ForecastError),
}

impl<T> QueryState<T> {
    pub fn status(&self) -> QueryStatus {
        match self {
            QueryState::Pending => QueryStatus::Pending,
            QueryState::Success(_) => QueryStatus::Success,
            QueryState::Error(_) => QueryStatus::Error,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryStatus {
    Pending,
    Success,
    Error,
}

/// Point-in-time view of one cache entry.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry<T> {
    pub key: QueryKey,
    pub status: QueryStatus,
    pub value: Option<T>,
    pub error_message: Option<String>,
    pub subscriber_count: usize,
}

/// Emitted on every state transition of every key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEvent {
    pub key: QueryKey,
    pub status: QueryStatus,
}

/// Handle to the outcome of a cached request.
#[derive(Debug)]
pub struct Subscription<T> {
    key: QueryKey,
    rx: watch::Receiver<QueryState<T>>,
}

impl<T: Clone> Subscription<T> {
    pub fn key(&self) -> &QueryKey {
        &self.key
    }

    pub fn current(&self) -> QueryState<T> {
        self.rx.borrow().clone()
    }

    /// Wait until the entry leaves `Pending`.
    pub async fn settled(&mut self) -> Result<T, ForecastError> {
        let state = self
            .rx
            .wait_for(|s| !matches!(s, QueryState::Pending))
            .await
            .map_err(|_| ForecastError::RequestFailed)?;

        match &*state {
            QueryState::Success(v) => Ok(v.clone()),
            QueryState::Error(e) => Err(e.clone()),
            QueryState::Pending => Err(ForecastError::RequestFailed),
        }
    }
}

type Slot<T> = Arc<watch::Sender<QueryState<T>>>;

#[derive(Debug)]
struct Entry<T> {
    slot: Slot<T>,
    last_used: u64,
}

impl<T> Entry<T> {
    /// Settled and nobody is holding a subscription.
    fn is_idle(&self) -> bool {
        !matches!(*self.slot.borrow(), QueryState::Pending) && self.slot.receiver_count() == 0
    }
}

#[derive(Debug)]
struct Entries<T> {
    map: HashMap<QueryKey, Entry<T>>,
    tick: u64,
    capacity: usize,
}

impl<T> Entries<T> {
    /// Evict least recently used idle entries until a new key fits.
    /// Pending or subscribed entries are never evicted, so the map may
    /// temporarily exceed its capacity.
    fn make_room(&mut self) {
        while self.map.len() >= self.capacity {
            let victim = self
                .map
                .iter()
                .filter(|(_, e)| e.is_idle())
                .min_by_key(|(_, e)| e.last_used)
                .map(|(k, _)| k.clone());

            let Some(victim) = victim else {
                break;
            };
            tracing::debug!(key = %victim, "evicting idle query");
            self.map.remove(&victim);
        }
    }
}

#[derive(Debug)]
pub struct QueryCache<T> {
    entries: Arc<Mutex<Entries<T>>>,
    events: broadcast::Sender<CacheEvent>,
}

impl<T> Clone for QueryCache<T> {
    fn clone(&self) -> Self {
        Self {
            entries: Arc::clone(&self.entries),
            events: self.events.clone(),
        }
    }
}

impl<T> Default for QueryCache<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> QueryCache<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Cache holding at most `capacity` idle entries.
    pub fn with_capacity(capacity: usize) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            entries: Arc::new(Mutex::new(Entries {
                map: HashMap::new(),
                tick: 0,
                capacity: capacity.max(1),
            })),
            events,
        }
    }

    /// Subscribe to `key`, starting `fetcher` only if no pending or
    /// successful entry exists. Must be called within a tokio runtime.
    pub fn request<F, Fut>(&self, key: QueryKey, fetcher: F) -> Subscription<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, ForecastError>> + Send + 'static,
    {
        let slot = {
            let mut entries = self.entries.lock();
            entries.tick += 1;
            let tick = entries.tick;

            if let Some(entry) = entries.map.get_mut(&key) {
                let reusable = !matches!(*entry.slot.borrow(), QueryState::Error(_));
                if reusable {
                    entry.last_used = tick;
                    tracing::debug!(key = %key, "query cache hit");
                    let rx = entry.slot.subscribe();
                    return Subscription { key, rx };
                }
            } else {
                entries.make_room();
            }

            let (tx, _) = watch::channel(QueryState::Pending);
            let slot = Arc::new(tx);
            entries.map.insert(
                key.clone(),
                Entry {
                    slot: Arc::clone(&slot),
                    last_used: tick,
                },
            );
            slot
        };

        let rx = slot.subscribe();
        self.notify(&key, QueryStatus::Pending);
        tracing::debug!(key = %key, "query cache miss, fetching");

        let fut = fetcher();
        let events = self.events.clone();
        let task_key = key.clone();
        tokio::spawn(async move {
            let state = match fut.await {
                Ok(value) => QueryState::Success(value),
                Err(e) => {
                    tracing::warn!(key = %task_key, error = %e, "query failed");
                    QueryState::Error(e)
                }
            };
            let status = state.status();
            // Subscribers of an invalidated slot still receive their outcome.
            slot.send_replace(state);
            let _ = events.send(CacheEvent { key: task_key, status });
        });

        Subscription { key, rx }
    }

    pub fn entry(&self, key: &QueryKey) -> Option<CacheEntry<T>> {
        let entries = self.entries.lock();
        let slot = &entries.map.get(key)?.slot;
        let state = slot.borrow();
        let (value, error_message) = match &*state {
            QueryState::Pending => (None, None),
            QueryState::Success(v) => (Some(v.clone()), None),
            QueryState::Error(e) => (None, Some(e.user_message())),
        };

        Some(CacheEntry {
            key: key.clone(),
            status: state.status(),
            value,
            error_message,
            subscriber_count: slot.receiver_count(),
        })
    }

    /// Observe every transition of every key.
    pub fn events(&self) -> broadcast::Receiver<CacheEvent> {
        self.events.subscribe()
    }

    /// Drop `key` so the next request fetches again.
    pub fn invalidate(&self, key: &QueryKey) -> bool {
        self.entries.lock().map.remove(key).is_some()
    }

    pub fn clear(&self) {
        self.entries.lock().map.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn notify(&self, key: &QueryKey, status: QueryStatus) {
        let _ = self.events.send(CacheEvent {
            key: key.clone(),
            status,
        });
    }
}
