//! Handler resolver: finds the handler row applicable to an explicit handler id
//! or to a set of context nodes.
//!
//! States: `Idle → Querying → Resolved`. A resolved record is reused while the
//! inputs stay the same. An empty result keeps the resolver in `Querying`;
//! the host retries by calling [HandlerResolver::resolve] again.
//!
//! Each call takes a generation ticket. A result for inputs that have since
//! changed is never stored.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, instrument, warn};

use crate::config::EngineConfig;
use crate::error::ResolveError;
use crate::store::GraphStore;
use crate::types::{HandlerRecord, LinkId, ResolutionQuery};

/// What a resolution is keyed by.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ResolveInputs {
  pub handler_id: Option<LinkId>,
  pub context: Vec<LinkId>,
}

impl ResolveInputs {
  pub fn handler(handler_id: LinkId) -> Self {
    Self {
      handler_id: Some(handler_id),
      context: Vec::new(),
    }
  }

  pub fn context(context: impl Into<Vec<LinkId>>) -> Self {
    Self {
      handler_id: None,
      context: context.into(),
    }
  }

  /// True when there is nothing to select a handler by.
  pub fn is_empty(&self) -> bool {
    self.handler_id.is_none() && self.context.is_empty()
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolverState {
  Idle,
  Querying,
  Resolved(HandlerRecord),
}

#[derive(Debug)]
struct Inner {
  inputs: Option<ResolveInputs>,
  state: ResolverState,
  /// Bumped by every resolution that issues (or skips) a query.
  generation: u64,
}

/// Resolves handler rows against a [GraphStore].
pub struct HandlerResolver {
  store: Arc<dyn GraphStore>,
  config: Arc<EngineConfig>,
  inner: Mutex<Inner>,
}

impl HandlerResolver {
  pub fn new(store: Arc<dyn GraphStore>, config: Arc<EngineConfig>) -> Self {
    Self {
      store,
      config,
      inner: Mutex::new(Inner {
        inputs: None,
        state: ResolverState::Idle,
        generation: 0,
      }),
    }
  }

  pub fn state(&self) -> ResolverState {
    self.lock().state
  }

  /// The resolved record, if any.
  pub fn current(&self) -> Option<HandlerRecord> {
    match self.lock().state {
      ResolverState::Resolved(record) => Some(record),
      _ => None,
    }
  }

  /// Forgets the current inputs and record; results still in flight become stale.
  pub fn reset(&self) {
    let mut inner = self.lock();
    inner.inputs = None;
    inner.state = ResolverState::Idle;
    inner.generation += 1;
  }

  /// Resolves `inputs` to a handler record. `Ok(None)` means no handler is available yet.
  #[instrument(level = "trace", skip(self))]
  pub async fn resolve(&self, inputs: ResolveInputs) -> Result<Option<HandlerRecord>, ResolveError> {
    if inputs.handler_id == Some(0) {
      return Err(ResolveError::InvalidHandlerId);
    }

    let ticket = {
      let mut inner = self.lock();
      if inner.inputs.as_ref() == Some(&inputs) {
        if let ResolverState::Resolved(record) = inner.state {
          return Ok(Some(record));
        }
      } else {
        inner.inputs = Some(inputs.clone());
      }
      inner.generation += 1;
      if inputs.is_empty() {
        inner.state = ResolverState::Idle;
        return Ok(None);
      }
      inner.state = ResolverState::Querying;
      inner.generation
    };

    let query = ResolutionQuery::for_inputs(&self.config, inputs.handler_id, &inputs.context);
    let rows = self.store.select_handlers(&query).await?;
    if rows.len() > 1 {
      warn!(
        rows = rows.len(),
        handler_id = rows[0].handler_id,
        "several handlers match; using the first"
      );
    }
    let record = rows.first().copied();

    let mut inner = self.lock();
    if inner.generation != ticket {
      if inner.inputs.as_ref() != Some(&inputs) {
        debug!(ticket, current = inner.generation, "discarding stale resolution");
        return Ok(None);
      }
      // A newer resolution of the same inputs is in flight; the result is still valid for it.
      if let ResolverState::Resolved(current) = inner.state {
        return Ok(Some(current));
      }
    }
    match record {
      Some(record) => {
        debug!(handler_id = record.handler_id, dist_id = record.dist_id, "handler resolved");
        inner.state = ResolverState::Resolved(record);
      }
      None => debug!("no handler yet"),
    }
    Ok(record)
  }

  fn lock(&self) -> MutexGuard<'_, Inner> {
    self.inner.lock().unwrap_or_else(PoisonError::into_inner)
  }
}
