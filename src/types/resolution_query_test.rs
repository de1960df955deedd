//! Tests for `ResolutionQuery`.

use super::{HandlerSelector, ResolutionQuery};
use crate::config::EngineConfig;

fn config() -> EngineConfig {
  EngineConfig {
    execution_provider_id: 11,
    isolation_provider_id: 12,
    context_type_id: 13,
    ..EngineConfig::default()
  }
}

#[test]
fn handler_id_builds_exact_query_only() {
  let q = ResolutionQuery::for_inputs(&config(), Some(7), &[1, 2, 3]);
  assert_eq!(q.selector, HandlerSelector::Exact(7));
  assert!(q.is_exact());
  assert_eq!(q.execution_provider_id, 11);
  assert_eq!(q.isolation_provider_id, 12);
}

#[test]
fn missing_handler_id_builds_context_query() {
  let q = ResolutionQuery::for_inputs(&config(), None, &[1, 2]);
  assert!(!q.is_exact());
  assert_eq!(
    q.selector,
    HandlerSelector::Context {
      type_id: 13,
      from_ids: vec![1, 2],
    }
  );
}

#[test]
fn serializes_selector_tag() {
  let q = ResolutionQuery::exact(&config(), 7);
  let json = serde_json::to_value(&q).unwrap();
  assert_eq!(json["selector"]["exact"], 7);
}
