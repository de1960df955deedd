//! Graph store interface consumed by the engine, plus an in-memory store.
//!
//! The engine only ever reads the store: it asks for handler rows matching a
//! [ResolutionQuery], subscribes to single links, and looks links up in the
//! local cache.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::path::Path;
use std::pin::Pin;
use std::sync::{Mutex, PoisonError, RwLock};

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;
use tracing::{debug, instrument};

use crate::error::StoreError;
use crate::types::{HandlerRecord, HandlerSelector, Link, LinkId, LinkValue, ResolutionQuery};

/// How many recent resolution queries a [MemoryStore] remembers.
pub const QUERY_LOG_LIMIT: usize = 256;

/// Live list of links matching a subscription. Dropping it ends the subscription.
pub type LinkSubscription = Pin<Box<dyn Stream<Item = Vec<Link>> + Send>>;

/// The external graph store.
#[async_trait]
pub trait GraphStore: Send + Sync {
  /// Rows of the `handlers` relation matching `query`, in store order.
  async fn select_handlers(&self, query: &ResolutionQuery)
  -> Result<Vec<HandlerRecord>, StoreError>;

  /// Subscribes to link `id`. Yields the current list first, then every change.
  fn subscribe(&self, id: LinkId) -> LinkSubscription;

  /// Looks a link up in the local cache.
  fn link(&self, id: LinkId) -> Option<Link>;
}

/// One row of the `handlers` relation, with its provider classification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandlerRow {
  pub handler_id: LinkId,
  pub dist_id: LinkId,
  pub src_id: LinkId,
  pub execution_provider_id: LinkId,
  pub isolation_provider_id: LinkId,
}

impl HandlerRow {
  pub fn record(&self) -> HandlerRecord {
    HandlerRecord {
      handler_id: self.handler_id,
      dist_id: self.dist_id,
      src_id: self.src_id,
    }
  }
}

/// Serializable contents of a [MemoryStore].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreSnapshot {
  #[serde(default)]
  pub links: Vec<Link>,
  #[serde(default)]
  pub handlers: Vec<HandlerRow>,
}

#[derive(Default)]
struct Inner {
  links: BTreeMap<LinkId, Link>,
  handlers: Vec<HandlerRow>,
  watchers: HashMap<LinkId, watch::Sender<Vec<Link>>>,
}

impl Inner {
  fn current(&self, id: LinkId) -> Vec<Link> {
    self.links.get(&id).cloned().into_iter().collect()
  }

  fn notify(&mut self, id: LinkId) {
    let Some(tx) = self.watchers.get(&id) else {
      return;
    };
    if tx.receiver_count() == 0 {
      self.watchers.remove(&id);
      return;
    }
    tx.send_replace(self.current(id));
  }

  /// Drops watchers whose subscriptions have all been released.
  fn prune(&mut self) {
    self.watchers.retain(|_, tx| tx.receiver_count() > 0);
  }

  fn matches(&self, row: &HandlerRow, query: &ResolutionQuery) -> bool {
    if row.execution_provider_id != query.execution_provider_id
      || row.isolation_provider_id != query.isolation_provider_id
    {
      return false;
    }
    match &query.selector {
      HandlerSelector::Exact(id) => row.handler_id == *id,
      HandlerSelector::Context { type_id, from_ids } => self.links.values().any(|l| {
        l.type_id == *type_id && l.to_id == row.handler_id && from_ids.contains(&l.from_id)
      }),
    }
  }
}

/// In-process store with push updates.
#[derive(Default)]
pub struct MemoryStore {
  inner: RwLock<Inner>,
  queries: Mutex<VecDeque<ResolutionQuery>>,
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn from_snapshot(snapshot: StoreSnapshot) -> Self {
    let store = Self::new();
    {
      let mut inner = store.write();
      inner.links = snapshot.links.into_iter().map(|l| (l.id, l)).collect();
      inner.handlers = snapshot.handlers;
    }
    store
  }

  pub fn from_json(json: &str) -> Result<Self, StoreError> {
    let snapshot: StoreSnapshot =
      serde_json::from_str(json).map_err(|e| StoreError::Fixture(e.to_string()))?;
    Ok(Self::from_snapshot(snapshot))
  }

  /// Loads a JSON snapshot file.
  #[instrument(level = "trace", skip(path))]
  pub fn load(path: &Path) -> Result<Self, StoreError> {
    let json = std::fs::read_to_string(path)
      .map_err(|e| StoreError::Fixture(format!("{}: {}", path.display(), e)))?;
    Self::from_json(&json)
  }

  pub fn snapshot(&self) -> StoreSnapshot {
    let inner = self.read();
    StoreSnapshot {
      links: inner.links.values().cloned().collect(),
      handlers: inner.handlers.clone(),
    }
  }

  /// Inserts or replaces a link and notifies its subscribers.
  pub fn upsert_link(&self, link: Link) {
    let id = link.id;
    let mut inner = self.write();
    inner.links.insert(id, link);
    inner.notify(id);
  }

  /// Replaces the value payload of link `id`. Returns false if the link does not exist.
  pub fn set_value(&self, id: LinkId, value: Option<Value>) -> bool {
    let mut inner = self.write();
    let Some(link) = inner.links.get_mut(&id) else {
      return false;
    };
    link.value = value.map(|value| LinkValue { value });
    inner.notify(id);
    debug!(link_id = id, "link value updated");
    true
  }

  pub fn remove_link(&self, id: LinkId) -> Option<Link> {
    let mut inner = self.write();
    let removed = inner.links.remove(&id);
    inner.notify(id);
    removed
  }

  pub fn add_handler(&self, row: HandlerRow) {
    self.write().handlers.push(row);
  }

  /// Number of live subscriptions on link `id`.
  pub fn subscriber_count(&self, id: LinkId) -> usize {
    self
      .read()
      .watchers
      .get(&id)
      .map(|tx| tx.receiver_count())
      .unwrap_or(0)
  }

  /// The last [QUERY_LOG_LIMIT] queries received, oldest first.
  pub fn queries(&self) -> Vec<ResolutionQuery> {
    self
      .queries
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .iter()
      .cloned()
      .collect()
  }

  #[cfg(test)]
  pub(crate) fn watched_links(&self) -> usize {
    self.read().watchers.len()
  }

  fn read(&self) -> std::sync::RwLockReadGuard<'_, Inner> {
    self.inner.read().unwrap_or_else(PoisonError::into_inner)
  }

  fn write(&self) -> std::sync::RwLockWriteGuard<'_, Inner> {
    self.inner.write().unwrap_or_else(PoisonError::into_inner)
  }
}

#[async_trait]
impl GraphStore for MemoryStore {
  #[instrument(level = "trace", skip(self))]
  async fn select_handlers(
    &self,
    query: &ResolutionQuery,
  ) -> Result<Vec<HandlerRecord>, StoreError> {
    {
      let mut log = self.queries.lock().unwrap_or_else(PoisonError::into_inner);
      if log.len() == QUERY_LOG_LIMIT {
        log.pop_front();
      }
      log.push_back(query.clone());
    }
    let inner = self.read();
    Ok(
      inner
        .handlers
        .iter()
        .filter(|row| inner.matches(row, query))
        .map(HandlerRow::record)
        .collect(),
    )
  }

  fn subscribe(&self, id: LinkId) -> LinkSubscription {
    let mut inner = self.write();
    inner.prune();
    let current = inner.current(id);
    let rx = inner
      .watchers
      .entry(id)
      .or_insert_with(|| watch::channel(current).0)
      .subscribe();
    debug!(link_id = id, "link subscription opened");
    Box::pin(WatchStream::new(rx))
  }

  fn link(&self, id: LinkId) -> Option<Link> {
    self.read().links.get(&id).cloned()
  }
}
