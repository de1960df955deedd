//! Tests for `HandlerResolver`.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Notify;

use crate::config::EngineConfig;
use crate::error::{ResolveError, StoreError};
use crate::resolver::{HandlerResolver, ResolveInputs, ResolverState};
use crate::store::{GraphStore, HandlerRow, LinkSubscription, MemoryStore};
use crate::types::{HandlerRecord, HandlerSelector, Link, LinkId, ResolutionQuery};

const CONTEXT_TYPE: u64 = 102;

fn config() -> Arc<EngineConfig> {
  Arc::new(EngineConfig {
    execution_provider_id: 100,
    isolation_provider_id: 101,
    context_type_id: CONTEXT_TYPE,
    ..EngineConfig::default()
  })
}

fn row(handler_id: u64, dist_id: u64) -> HandlerRow {
  HandlerRow {
    handler_id,
    dist_id,
    src_id: dist_id - 1,
    execution_provider_id: 100,
    isolation_provider_id: 101,
  }
}

fn record(handler_id: u64, dist_id: u64) -> HandlerRecord {
  HandlerRecord {
    handler_id,
    dist_id,
    src_id: dist_id - 1,
  }
}

fn setup() -> (Arc<MemoryStore>, HandlerResolver) {
  let store = Arc::new(MemoryStore::new());
  let resolver = HandlerResolver::new(store.clone(), config());
  (store, resolver)
}

#[tokio::test]
async fn exact_resolution_is_cached() {
  let (store, resolver) = setup();
  store.add_handler(row(7, 42));
  assert_eq!(resolver.state(), ResolverState::Idle);
  let r = resolver.resolve(ResolveInputs::handler(7)).await.unwrap();
  assert_eq!(r, Some(record(7, 42)));
  assert_eq!(resolver.state(), ResolverState::Resolved(record(7, 42)));
  let again = resolver.resolve(ResolveInputs::handler(7)).await.unwrap();
  assert_eq!(again, Some(record(7, 42)));
  assert_eq!(store.queries().len(), 1);
}

#[tokio::test]
async fn handler_id_never_uses_context_query() {
  let (store, resolver) = setup();
  store.add_handler(row(7, 42));
  let inputs = ResolveInputs {
    handler_id: Some(7),
    context: vec![1, 2],
  };
  resolver.resolve(inputs).await.unwrap();
  let queries = store.queries();
  assert_eq!(queries.len(), 1);
  assert_eq!(queries[0].selector, HandlerSelector::Exact(7));
}

#[tokio::test]
async fn context_resolution_never_uses_exact_query() {
  let (store, resolver) = setup();
  store.add_handler(row(8, 52));
  store.upsert_link(Link::connecting(500, CONTEXT_TYPE, 3, 8));
  let r = resolver.resolve(ResolveInputs::context(vec![3])).await.unwrap();
  assert_eq!(r, Some(record(8, 52)));
  assert!(store.queries().iter().all(|q| !q.is_exact()));
}

#[tokio::test]
async fn empty_result_stays_querying_until_retried() {
  let (store, resolver) = setup();
  let r = resolver.resolve(ResolveInputs::handler(7)).await.unwrap();
  assert_eq!(r, None);
  assert_eq!(resolver.state(), ResolverState::Querying);
  store.add_handler(row(7, 42));
  let r = resolver.resolve(ResolveInputs::handler(7)).await.unwrap();
  assert_eq!(r, Some(record(7, 42)));
  assert_eq!(store.queries().len(), 2);
}

#[tokio::test]
async fn changed_inputs_requery() {
  let (store, resolver) = setup();
  store.add_handler(row(7, 42));
  store.add_handler(row(8, 52));
  resolver.resolve(ResolveInputs::handler(7)).await.unwrap();
  let r = resolver.resolve(ResolveInputs::handler(8)).await.unwrap();
  assert_eq!(r, Some(record(8, 52)));
  assert_eq!(store.queries().len(), 2);
}

#[tokio::test]
async fn several_rows_use_the_first() {
  let (store, resolver) = setup();
  store.add_handler(row(8, 52));
  store.add_handler(row(9, 62));
  store.upsert_link(Link::connecting(500, CONTEXT_TYPE, 3, 8));
  store.upsert_link(Link::connecting(501, CONTEXT_TYPE, 3, 9));
  let r = resolver.resolve(ResolveInputs::context(vec![3])).await.unwrap();
  assert_eq!(r, Some(record(8, 52)));
}

#[tokio::test]
async fn zero_handler_id_is_rejected() {
  let (_store, resolver) = setup();
  let err = resolver.resolve(ResolveInputs::handler(0)).await.unwrap_err();
  assert_eq!(err, ResolveError::InvalidHandlerId);
}

#[tokio::test]
async fn empty_inputs_skip_the_query() {
  let (store, resolver) = setup();
  let r = resolver.resolve(ResolveInputs::default()).await.unwrap();
  assert_eq!(r, None);
  assert_eq!(resolver.state(), ResolverState::Idle);
  assert!(store.queries().is_empty());
}

#[tokio::test]
async fn reset_forgets_record() {
  let (store, resolver) = setup();
  store.add_handler(row(7, 42));
  resolver.resolve(ResolveInputs::handler(7)).await.unwrap();
  resolver.reset();
  assert_eq!(resolver.current(), None);
  resolver.resolve(ResolveInputs::handler(7)).await.unwrap();
  assert_eq!(store.queries().len(), 2);
}

/// Store whose queries for handler 1 wait until released.
struct GatedStore {
  gate: Notify,
}

#[async_trait]
impl GraphStore for GatedStore {
  async fn select_handlers(
    &self,
    query: &ResolutionQuery,
  ) -> Result<Vec<HandlerRecord>, StoreError> {
    let HandlerSelector::Exact(id) = query.selector else {
      return Ok(vec![]);
    };
    if id == 1 {
      self.gate.notified().await;
    }
    Ok(vec![record(id, id * 10 + 1)])
  }

  fn subscribe(&self, _id: LinkId) -> LinkSubscription {
    Box::pin(futures::stream::pending())
  }

  fn link(&self, _id: LinkId) -> Option<Link> {
    None
  }
}

#[tokio::test]
async fn overlapping_resolution_last_started_wins() {
  let store = Arc::new(GatedStore {
    gate: Notify::new(),
  });
  let resolver = Arc::new(HandlerResolver::new(store.clone(), config()));

  let slow_resolver = resolver.clone();
  let slow = tokio::spawn(async move { slow_resolver.resolve(ResolveInputs::handler(1)).await });
  tokio::task::yield_now().await;

  let fast = resolver.resolve(ResolveInputs::handler(2)).await.unwrap();
  assert_eq!(fast, Some(record(2, 21)));

  store.gate.notify_one();
  let slow_result = slow.await.unwrap().unwrap();
  assert_eq!(slow_result, None);
  assert_eq!(resolver.current(), Some(record(2, 21)));
}

#[tokio::test]
async fn overlapping_same_inputs_both_resolve() {
  let store = Arc::new(GatedStore {
    gate: Notify::new(),
  });
  let resolver = Arc::new(HandlerResolver::new(store.clone(), config()));

  let first_resolver = resolver.clone();
  let first = tokio::spawn(async move { first_resolver.resolve(ResolveInputs::handler(1)).await });
  tokio::task::yield_now().await;
  let second_resolver = resolver.clone();
  let second = tokio::spawn(async move { second_resolver.resolve(ResolveInputs::handler(1)).await });
  tokio::task::yield_now().await;
  assert_eq!(resolver.state(), ResolverState::Querying);

  store.gate.notify_one();
  store.gate.notify_one();
  assert_eq!(first.await.unwrap().unwrap(), Some(record(1, 11)));
  assert_eq!(second.await.unwrap().unwrap(), Some(record(1, 11)));
  assert_eq!(resolver.state(), ResolverState::Resolved(record(1, 11)));
}

#[tokio::test]
async fn store_errors_propagate() {
  struct Down;
  #[async_trait]
  impl GraphStore for Down {
    async fn select_handlers(
      &self,
      _query: &ResolutionQuery,
    ) -> Result<Vec<HandlerRecord>, StoreError> {
      Err(StoreError::Unavailable("offline".to_string()))
    }
    fn subscribe(&self, _id: LinkId) -> LinkSubscription {
      Box::pin(futures::stream::pending())
    }
    fn link(&self, _id: LinkId) -> Option<Link> {
      None
    }
  }
  let resolver = HandlerResolver::new(Arc::new(Down), config());
  let err = resolver.resolve(ResolveInputs::handler(3)).await.unwrap_err();
  assert_eq!(
    err,
    ResolveError::Store(StoreError::Unavailable("offline".to_string()))
  );
}
