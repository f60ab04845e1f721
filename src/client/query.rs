//! Query identities, tags and the state observers see

use chrono::{DateTime, Utc};
use serde_json::Value;
use std::any::Any;
use std::sync::Arc;
use std::time::Duration;

use crate::domain::CatalogError;
use crate::infrastructure::transport::{decode_body, ApiRequest};
use crate::models::{Book, BorrowSummary};

/// Type-erased cached payload; handles downcast it back to `Query::Output`
pub(crate) type Erased = Arc<dyn Any + Send + Sync>;

/// Label used to batch-invalidate cached queries
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Tag {
    Book,
    Borrow,
}

/// Identity of a cached read. No read takes arguments, so the operation is the key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum QueryKey {
    Books,
    BorrowSummary,
}

impl QueryKey {
    pub fn provides(self) -> &'static [Tag] {
        match self {
            QueryKey::Books => &[Tag::Book],
            QueryKey::BorrowSummary => &[Tag::Borrow],
        }
    }

    pub(crate) fn request(self) -> ApiRequest {
        match self {
            QueryKey::Books => ApiRequest::get("/books"),
            QueryKey::BorrowSummary => ApiRequest::get("/borrow"),
        }
    }

    pub(crate) fn decode(self, value: Value) -> Result<Erased, CatalogError> {
        let data: Erased = match self {
            QueryKey::Books => Arc::new(decode_body::<Vec<Book>>(value)?),
            QueryKey::BorrowSummary => Arc::new(decode_body::<Vec<BorrowSummary>>(value)?),
        };
        Ok(data)
    }
}

/// Typed view over a `QueryKey`
pub trait Query: Send + Sync + 'static {
    type Output: Send + Sync + 'static;
    const KEY: QueryKey;
}

pub struct ListBooks;

impl Query for ListBooks {
    type Output = Vec<Book>;
    const KEY: QueryKey = QueryKey::Books;
}

pub struct ListBorrowSummary;

impl Query for ListBorrowSummary {
    type Output = Vec<BorrowSummary>;
    const KEY: QueryKey = QueryKey::BorrowSummary;
}

/// Per-observer refetch triggers
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SubscribeOptions {
    pub polling_interval: Option<Duration>,
    pub refetch_on_focus: bool,
    pub refetch_on_reconnect: bool,
    /// Refetch on mount even when a fresh cached value exists
    pub refetch_on_mount: bool,
}

impl SubscribeOptions {
    /// Polling plus every lifecycle trigger, as the catalog views mount their lists
    pub fn live(polling_interval: Duration) -> Self {
        Self {
            polling_interval: Some(polling_interval),
            refetch_on_focus: true,
            refetch_on_reconnect: true,
            refetch_on_mount: true,
        }
    }

    pub(crate) fn wants(&self, event: LifecycleEvent) -> bool {
        match event {
            LifecycleEvent::Focus => self.refetch_on_focus,
            LifecycleEvent::Reconnect => self.refetch_on_reconnect,
        }
    }
}

/// Application lifecycle signals forwarded by the host
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LifecycleEvent {
    Focus,
    Reconnect,
}

#[derive(Clone, Default)]
pub(crate) struct Snapshot {
    pub data: Option<Erased>,
    pub error: Option<CatalogError>,
    pub is_fetching: bool,
    pub is_stale: bool,
    pub fetched_at: Option<DateTime<Utc>>,
}

/// What an observer sees of a cached query
#[derive(Debug)]
pub struct QueryState<T> {
    /// Last good value; kept across failed refetches
    pub data: Option<Arc<T>>,
    /// Error of the most recent fetch, cleared by the next success
    pub error: Option<CatalogError>,
    pub is_fetching: bool,
    pub is_stale: bool,
    pub fetched_at: Option<DateTime<Utc>>,
}

impl<T> Clone for QueryState<T> {
    fn clone(&self) -> Self {
        Self {
            data: self.data.clone(),
            error: self.error.clone(),
            is_fetching: self.is_fetching,
            is_stale: self.is_stale,
            fetched_at: self.fetched_at,
        }
    }
}

impl<T: Send + Sync + 'static> QueryState<T> {
    pub(crate) fn from_snapshot(snapshot: &Snapshot) -> Self {
        Self {
            data: snapshot
                .data
                .clone()
                .and_then(|data| data.downcast::<T>().ok()),
            error: snapshot.error.clone(),
            is_fetching: snapshot.is_fetching,
            is_stale: snapshot.is_stale,
            fetched_at: snapshot.fetched_at,
        }
    }
}

impl<T> QueryState<T> {
    /// First fetch still outstanding
    pub fn is_loading(&self) -> bool {
        self.is_fetching && self.data.is_none()
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Latest outcome: the error if the last fetch failed, otherwise the data
    pub fn into_result(self) -> Result<Arc<T>, CatalogError> {
        match (self.error, self.data) {
            (Some(err), _) => Err(err),
            (None, Some(data)) => Ok(data),
            (None, None) => Err(CatalogError::Unavailable),
        }
    }
}
