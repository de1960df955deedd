//! Classification filter sent to the graph store when looking up a handler.

use serde::Serialize;

use super::LinkId;
use crate::config::EngineConfig;

/// Which handlers a query selects, besides the provider constraints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HandlerSelector {
  /// Exact `handler_id` match.
  Exact(LinkId),
  /// Handler linked from one of `from_ids` by a link of type `type_id`.
  Context { type_id: LinkId, from_ids: Vec<LinkId> },
}

/// Query against the `handlers` relation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolutionQuery {
  pub execution_provider_id: LinkId,
  pub isolation_provider_id: LinkId,
  pub selector: HandlerSelector,
}

impl ResolutionQuery {
  /// Exact-match query for `handler_id`.
  pub fn exact(config: &EngineConfig, handler_id: LinkId) -> Self {
    Self {
      execution_provider_id: config.execution_provider_id,
      isolation_provider_id: config.isolation_provider_id,
      selector: HandlerSelector::Exact(handler_id),
    }
  }

  /// Context query: handlers reachable from `context` through the configured context type.
  pub fn context(config: &EngineConfig, context: &[LinkId]) -> Self {
    Self {
      execution_provider_id: config.execution_provider_id,
      isolation_provider_id: config.isolation_provider_id,
      selector: HandlerSelector::Context {
        type_id: config.context_type_id,
        from_ids: context.to_vec(),
      },
    }
  }

  /// Builds the query for the given inputs; an explicit handler id always wins over context.
  pub fn for_inputs(config: &EngineConfig, handler_id: Option<LinkId>, context: &[LinkId]) -> Self {
    match handler_id {
      Some(id) => Self::exact(config, id),
      None => Self::context(config, context),
    }
  }

  pub fn is_exact(&self) -> bool {
    matches!(self.selector, HandlerSelector::Exact(_))
  }
}
