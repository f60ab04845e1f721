//! Remote Resource Client
//!
//! Single point of access to the catalog backend. Reads go through a shared cache
//! (`watch` mounts an observer, `list_books`/`borrow_summary` are one-shot reads);
//! writes go straight to the backend and invalidate the tags they affect:
//!
//! | Mutation      | Invalidates |
//! |---------------|-------------|
//! | create_book   | `book`      |
//! | update_book   | `book`      |
//! | delete_book   | `book`      |
//! | create_borrow | `borrow`    |
//!
//! A borrow leaves the cached book list untouched, so `copies` shown from the cache
//! stay at their pre-borrow value until the list is refetched for another reason.

mod cache;
pub mod query;
#[cfg(test)]
pub(crate) mod testing;

use serde_json::Value;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::watch;

use crate::domain::CatalogError;
use crate::infrastructure::config::Config;
use crate::infrastructure::transport::{book_path, decode_body, ApiRequest, HttpTransport, Transport};
use crate::models::{Book, BookUpdate, BorrowSummary, NewBook, NewBorrow};
use cache::{CacheStore, ObserverId};
use query::Snapshot;

pub use query::{
    LifecycleEvent, ListBooks, ListBorrowSummary, Query, QueryKey, QueryState, SubscribeOptions,
    Tag,
};

/// Handle to the catalog backend and its query cache.
///
/// Cloning is cheap and every clone shares the same cache. Must be created inside a
/// tokio runtime; fetches and pollers are spawned onto it.
#[derive(Clone)]
pub struct CatalogClient {
    store: Arc<CacheStore>,
    poll_interval: Duration,
}

impl CatalogClient {
    pub fn new(config: &Config) -> Result<Self, CatalogError> {
        let transport = HttpTransport::new(config)?;
        Self::with_transport(Arc::new(transport), config.poll_interval)
    }

    pub fn with_transport(
        transport: Arc<dyn Transport>,
        poll_interval: Duration,
    ) -> Result<Self, CatalogError> {
        let runtime = Handle::try_current().map_err(|_| {
            CatalogError::Config("CatalogClient must be created inside a tokio runtime".into())
        })?;

        Ok(Self {
            store: Arc::new(CacheStore::new(transport, runtime)),
            poll_interval,
        })
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Options the catalog views mount their lists with
    pub fn live_options(&self) -> SubscribeOptions {
        SubscribeOptions::live(self.poll_interval)
    }

    /// Mount an observer on `Q`. Dropping the handle unmounts it.
    pub fn watch<Q: Query>(&self, options: SubscribeOptions) -> Result<QueryHandle<Q>, CatalogError> {
        let (observer, rx) = self.store.subscribe(Q::KEY, options)?;
        Ok(QueryHandle {
            store: Arc::clone(&self.store),
            observer,
            rx,
            _query: PhantomData,
        })
    }

    /// Cached state of `Q`, without mounting an observer or fetching
    pub fn cached<Q: Query>(&self) -> Option<QueryState<Q::Output>> {
        self.store
            .peek(Q::KEY)
            .map(|snapshot| QueryState::from_snapshot(&snapshot))
    }

    pub fn observer_count(&self, key: QueryKey) -> usize {
        self.store.observer_count(key)
    }

    pub async fn list_books(&self) -> Result<Arc<Vec<Book>>, CatalogError> {
        self.read::<ListBooks>().await
    }

    pub async fn borrow_summary(&self) -> Result<Arc<Vec<BorrowSummary>>, CatalogError> {
        self.read::<ListBorrowSummary>().await
    }

    pub async fn create_book(&self, book: &NewBook) -> Result<Book, CatalogError> {
        let request = ApiRequest::post("/books", serde_json::to_value(book)?);
        let body = self.mutate(request, &[Tag::Book]).await?;
        decode_body(body)
    }

    /// Sends `updates` as-is; `available` is only changed if the caller sets it
    pub async fn update_book(&self, id: &str, updates: &BookUpdate) -> Result<Book, CatalogError> {
        let request = ApiRequest::put(book_path(id), serde_json::to_value(updates)?);
        let body = self.mutate(request, &[Tag::Book]).await?;
        decode_body(body)
    }

    pub async fn delete_book(&self, id: &str) -> Result<(), CatalogError> {
        self.mutate(ApiRequest::delete(book_path(id)), &[Tag::Book])
            .await
            .map(|_| ())
    }

    /// Invalidates `borrow` only; cached book copy counts are not refreshed
    pub async fn create_borrow(&self, borrow: &NewBorrow) -> Result<(), CatalogError> {
        let request = ApiRequest::post("/borrow", serde_json::to_value(borrow)?);
        self.mutate(request, &[Tag::Borrow]).await.map(|_| ())
    }

    pub fn invalidate(&self, tags: &[Tag]) {
        self.store.invalidate(tags);
    }

    /// Forward a focus/reconnect signal to observers that opted into it
    pub fn notify(&self, event: LifecycleEvent) {
        self.store.notify(event);
    }

    /// Stop all pollers and drop cached state. Later reads fail with `Unavailable`.
    pub fn shutdown(&self) {
        self.store.shutdown();
    }

    async fn read<Q: Query>(&self) -> Result<Arc<Q::Output>, CatalogError> {
        let mut handle = self.watch::<Q>(SubscribeOptions::default())?;
        handle.settled().await?.into_result()
    }

    async fn mutate(&self, request: ApiRequest, invalidates: &[Tag]) -> Result<Value, CatalogError> {
        let method = request.method.clone();
        let path = request.path.clone();

        match self.store.transport().execute(request).await {
            Ok(body) => {
                tracing::debug!("{} {} succeeded; invalidating {:?}", method, path, invalidates);
                self.store.invalidate(invalidates);
                Ok(body)
            }
            Err(e) => {
                tracing::warn!("{} {} failed: {}", method, path, e);
                Err(e)
            }
        }
    }
}

/// A mounted observer of one query
pub struct QueryHandle<Q: Query> {
    store: Arc<CacheStore>,
    observer: ObserverId,
    rx: watch::Receiver<Snapshot>,
    _query: PhantomData<fn() -> Q>,
}

impl<Q: Query> QueryHandle<Q> {
    pub fn state(&self) -> QueryState<Q::Output> {
        QueryState::from_snapshot(&self.rx.borrow())
    }

    /// Wait for the next state change
    pub async fn changed(&mut self) -> Result<QueryState<Q::Output>, CatalogError> {
        self.rx
            .changed()
            .await
            .map_err(|_| CatalogError::Unavailable)?;
        Ok(QueryState::from_snapshot(&self.rx.borrow_and_update()))
    }

    /// Wait until no fetch is outstanding
    pub async fn settled(&mut self) -> Result<QueryState<Q::Output>, CatalogError> {
        let snapshot = self
            .rx
            .wait_for(|s| !s.is_fetching)
            .await
            .map_err(|_| CatalogError::Unavailable)?;
        Ok(QueryState::from_snapshot(&snapshot))
    }

    /// Force a fetch (joining any in-flight one) and wait for its result
    pub async fn refetch(&self) -> Result<Arc<Q::Output>, CatalogError> {
        let fetch = self.store.refetch(Q::KEY).ok_or(CatalogError::Unavailable)?;
        let data = fetch.await?;
        data.downcast::<Q::Output>()
            .map_err(|_| CatalogError::Decode(format!("unexpected payload for {:?}", Q::KEY)))
    }
}

impl<Q: Query> Drop for QueryHandle<Q> {
    fn drop(&mut self) {
        self.store.unsubscribe(Q::KEY, self.observer);
    }
}
