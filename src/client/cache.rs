//! Query cache: tag registry, observer registry, request deduplication and pollers
//!
//! All bookkeeping lives in one `Registry` behind a `std::sync::Mutex`. The lock is
//! never held across an `.await`; each transition (mount, unmount, write-back,
//! invalidation) happens inside one critical section. Network work runs in spawned
//! tasks that only hold a `Weak` reference back to the store.

use chrono::Utc;
use futures::future::{BoxFuture, FutureExt, Shared};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use super::query::{Erased, LifecycleEvent, QueryKey, Snapshot, SubscribeOptions, Tag};
use crate::domain::CatalogError;
use crate::infrastructure::transport::Transport;

pub(crate) type SharedFetch = Shared<BoxFuture<'static, Result<Erased, CatalogError>>>;

pub(crate) type ObserverId = u64;

struct InFlight {
    id: u64,
    future: SharedFetch,
    /// Invalidated while in flight: fetch again once this one lands
    refetch_after: bool,
}

struct Poller {
    period: Duration,
    task: JoinHandle<()>,
}

impl Drop for Poller {
    fn drop(&mut self) {
        self.task.abort();
    }
}

struct Entry {
    state: watch::Sender<Snapshot>,
    in_flight: Option<InFlight>,
    observers: HashMap<ObserverId, SubscribeOptions>,
    poller: Option<Poller>,
}

impl Entry {
    fn new() -> Self {
        let (state, _) = watch::channel(Snapshot::default());
        Self {
            state,
            in_flight: None,
            observers: HashMap::new(),
            poller: None,
        }
    }
}

#[derive(Default)]
struct Registry {
    entries: HashMap<QueryKey, Entry>,
    tags: HashMap<Tag, HashSet<QueryKey>>,
    closed: bool,
}

impl Registry {
    fn entry(&mut self, key: QueryKey) -> &mut Entry {
        for tag in key.provides() {
            self.tags.entry(*tag).or_default().insert(key);
        }
        self.entries.entry(key).or_insert_with(Entry::new)
    }
}

pub(crate) struct CacheStore {
    transport: Arc<dyn Transport>,
    runtime: Handle,
    registry: Mutex<Registry>,
    next_id: AtomicU64,
}

impl CacheStore {
    pub(crate) fn new(transport: Arc<dyn Transport>, runtime: Handle) -> Self {
        Self {
            transport,
            runtime,
            registry: Mutex::new(Registry::default()),
            next_id: AtomicU64::new(1),
        }
    }

    pub(crate) fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    fn lock(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Mount an observer. Fetches when nothing fresh is cached or the observer asks for it.
    pub(crate) fn subscribe(
        self: &Arc<Self>,
        key: QueryKey,
        options: SubscribeOptions,
    ) -> Result<(ObserverId, watch::Receiver<Snapshot>), CatalogError> {
        let mut registry = self.lock();
        if registry.closed {
            return Err(CatalogError::Unavailable);
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let entry = registry.entry(key);
        entry.observers.insert(id, options);
        let rx = entry.state.subscribe();

        let needs_fetch = {
            let snapshot = entry.state.borrow();
            snapshot.data.is_none() || snapshot.is_stale || options.refetch_on_mount
        };
        if needs_fetch {
            self.start_fetch(key, entry);
        }
        self.sync_poller(key, entry);

        tracing::debug!(
            "Observer #{} mounted on {:?} ({} active)",
            id,
            key,
            entry.observers.len()
        );
        Ok((id, rx))
    }

    pub(crate) fn unsubscribe(self: &Arc<Self>, key: QueryKey, id: ObserverId) {
        let mut registry = self.lock();
        let Some(entry) = registry.entries.get_mut(&key) else {
            return;
        };
        if entry.observers.remove(&id).is_none() {
            return;
        }

        // The in-flight request stays registered so a remount joins it instead of
        // sending a second one; `complete` drops its result if nobody is left.
        if entry.observers.is_empty() && entry.in_flight.is_some() {
            tracing::debug!("Last observer left {:?}; in-flight response will be discarded", key);
        }
        self.sync_poller(key, entry);
    }

    /// Current snapshot without mounting an observer
    pub(crate) fn peek(&self, key: QueryKey) -> Option<Snapshot> {
        self.lock()
            .entries
            .get(&key)
            .map(|entry| entry.state.borrow().clone())
    }

    pub(crate) fn observer_count(&self, key: QueryKey) -> usize {
        self.lock()
            .entries
            .get(&key)
            .map_or(0, |entry| entry.observers.len())
    }

    /// Deduplicated fetch for an observed key
    pub(crate) fn refetch(self: &Arc<Self>, key: QueryKey) -> Option<SharedFetch> {
        let mut registry = self.lock();
        let entry = registry.entries.get_mut(&key)?;
        if entry.observers.is_empty() {
            return None;
        }
        Some(self.start_fetch(key, entry))
    }

    /// Mark every query carrying one of `tags` stale and refetch the observed ones
    pub(crate) fn invalidate(self: &Arc<Self>, tags: &[Tag]) {
        let mut registry = self.lock();
        let keys: HashSet<QueryKey> = tags
            .iter()
            .filter_map(|tag| registry.tags.get(tag))
            .flatten()
            .copied()
            .collect();

        for key in keys {
            let Some(entry) = registry.entries.get_mut(&key) else {
                continue;
            };
            entry.state.send_modify(|s| s.is_stale = true);

            if entry.observers.is_empty() {
                tracing::debug!("Invalidated {:?}; no observers, refresh deferred", key);
                continue;
            }
            match entry.in_flight.as_mut() {
                Some(in_flight) => {
                    tracing::debug!("Invalidated {:?} mid-flight; queueing refetch", key);
                    in_flight.refetch_after = true;
                }
                None => {
                    tracing::debug!("Invalidated {:?}; refetching", key);
                    self.start_fetch(key, entry);
                }
            }
        }
    }

    pub(crate) fn notify(self: &Arc<Self>, event: LifecycleEvent) {
        let mut registry = self.lock();
        for (key, entry) in registry.entries.iter_mut() {
            if entry.observers.values().any(|o| o.wants(event)) {
                tracing::debug!("{:?} event; refetching {:?}", event, key);
                self.start_fetch(*key, entry);
            }
        }
    }

    /// Stop pollers and drop every cached value; outstanding responses are discarded
    pub(crate) fn shutdown(&self) {
        let mut registry = self.lock();
        registry.closed = true;
        registry.entries.clear();
        registry.tags.clear();
        tracing::debug!("Query cache shut down");
    }

    fn start_fetch(self: &Arc<Self>, key: QueryKey, entry: &mut Entry) -> SharedFetch {
        if let Some(in_flight) = &entry.in_flight {
            return in_flight.future.clone();
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let transport = Arc::clone(&self.transport);
        let store = Arc::downgrade(self);
        let future = async move {
            let result = match transport.execute(key.request()).await {
                Ok(body) => key.decode(body),
                Err(e) => Err(e),
            };
            if let Some(store) = store.upgrade() {
                store.complete(key, id, &result);
            }
            result
        }
        .boxed()
        .shared();

        entry.in_flight = Some(InFlight {
            id,
            future: future.clone(),
            refetch_after: false,
        });
        entry.state.send_modify(|s| s.is_fetching = true);
        self.runtime.spawn(future.clone().map(|_| ()));

        tracing::debug!("Fetching {:?} (request #{})", key, id);
        future
    }

    fn complete(self: &Arc<Self>, key: QueryKey, id: u64, result: &Result<Erased, CatalogError>) {
        let mut registry = self.lock();
        let Some(entry) = registry.entries.get_mut(&key) else {
            tracing::debug!("Discarding response #{} for {:?}: cache cleared", id, key);
            return;
        };
        let Some(InFlight { refetch_after, .. }) = entry.in_flight.take_if(|f| f.id == id) else {
            tracing::debug!("Discarding superseded response #{} for {:?}", id, key);
            return;
        };

        if entry.observers.is_empty() {
            tracing::debug!("Discarding response #{} for {:?}: no observers", id, key);
            entry.state.send_modify(|s| s.is_fetching = false);
            return;
        }

        match result {
            Ok(data) => {
                tracing::debug!("Fetched {:?} (request #{})", key, id);
                entry.state.send_modify(|s| {
                    s.data = Some(Arc::clone(data));
                    s.error = None;
                    s.is_stale = refetch_after;
                    s.is_fetching = refetch_after;
                    s.fetched_at = Some(Utc::now());
                });
            }
            Err(e) => {
                tracing::warn!("Fetching {:?} failed: {}", key, e);
                entry.state.send_modify(|s| {
                    s.error = Some(e.clone());
                    s.is_stale = true;
                    s.is_fetching = refetch_after;
                });
            }
        }

        if refetch_after {
            self.start_fetch(key, entry);
        }
    }

    fn sync_poller(self: &Arc<Self>, key: QueryKey, entry: &mut Entry) {
        let period = entry
            .observers
            .values()
            .filter_map(|o| o.polling_interval)
            .min();

        if let (Some(poller), Some(period)) = (&entry.poller, period)
            && poller.period == period
        {
            return;
        }

        entry.poller = period.map(|period| {
            tracing::debug!("Polling {:?} every {:?}", key, period);
            Poller {
                period,
                task: self.spawn_poller(key, period),
            }
        });
    }

    fn spawn_poller(self: &Arc<Self>, key: QueryKey, period: Duration) -> JoinHandle<()> {
        let store: Weak<Self> = Arc::downgrade(self);
        self.runtime.spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(store) = store.upgrade() else {
                    break;
                };
                tracing::debug!("Poll tick for {:?}", key);
                store.refetch(key);
            }
        })
    }
}
