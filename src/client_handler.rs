//! Client handler: resolves a handler, follows its source text, evaluates each
//! version and renders the latest accepted component.
//!
//! All the work happens in one background task per handler:
//!
//! ```text
//! inputs ──► HandlerResolver ──► subscribe_source(dist_id) ──► EvaluationPipeline ──► outcomes
//! ```
//!
//! Changing the inputs re-enters resolution. Dropping the handle aborts the
//! task, which releases the store subscription.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::config::EngineConfig;
use crate::evaluator::{EvalInput, Evaluator};
use crate::pipeline::{EvaluationPipeline, PipelineState};
use crate::render;
use crate::resolver::{HandlerResolver, ResolveInputs};
use crate::store::GraphStore;
use crate::subscriber::subscribe_source;
use crate::types::{Component, HandlerRecord, HandlerValue, LinkId, RenderProps, Rendered};

/// What a client handler is mounted with.
#[derive(Debug, Clone, Default)]
pub struct ClientHandlerProps {
  /// Link the handler is displayed for; passed to the component as `link`.
  pub link_id: Option<LinkId>,
  pub handler_id: Option<LinkId>,
  pub context: Vec<LinkId>,
  /// Extra evaluator inputs bound next to `require`.
  pub input: EvalInput,
}

impl ClientHandlerProps {
  pub fn handler(handler_id: LinkId) -> Self {
    Self {
      handler_id: Some(handler_id),
      ..Self::default()
    }
  }

  pub fn context(context: impl Into<Vec<LinkId>>) -> Self {
    Self {
      context: context.into(),
      ..Self::default()
    }
  }

  pub fn link_id(mut self, link_id: LinkId) -> Self {
    self.link_id = Some(link_id);
    self
  }

  pub fn input(mut self, input: EvalInput) -> Self {
    self.input = input;
    self
  }

  fn resolve_inputs(&self) -> ResolveInputs {
    ResolveInputs {
      handler_id: self.handler_id,
      context: self.context.clone(),
    }
  }
}

/// Spawns client handlers.
pub struct ClientHandler;

impl ClientHandler {
  /// Starts a client handler on the current tokio runtime.
  #[instrument(level = "trace", skip(store, evaluator, config))]
  pub fn spawn(
    store: Arc<dyn GraphStore>,
    evaluator: Arc<dyn Evaluator>,
    config: Arc<EngineConfig>,
    props: ClientHandlerProps,
  ) -> ClientHandlerHandle {
    let render_timeout = config.render_timeout();
    let (inputs_tx, inputs_rx) = watch::channel(props.resolve_inputs());
    let (outcomes_tx, outcomes_rx) = watch::channel(PipelineState::default());
    let (record_tx, record_rx) = watch::channel(None);

    let pipeline = EvaluationPipeline::with_sender(evaluator, props.input.clone(), outcomes_tx);
    let driver = Driver {
      resolver: HandlerResolver::new(store.clone(), config.clone()),
      store: store.clone(),
      config,
      pipeline,
      inputs: inputs_rx,
      record: record_tx,
    };
    let task = tokio::spawn(driver.run());
    info!(link_id = ?props.link_id, handler_id = ?props.handler_id, "client handler started");

    ClientHandlerHandle {
      store,
      link_id: props.link_id,
      render_timeout,
      inputs: inputs_tx,
      outcomes: outcomes_rx,
      record: record_rx,
      task,
    }
  }
}

/// Handle to a running client handler. Dropping it stops the handler.
pub struct ClientHandlerHandle {
  store: Arc<dyn GraphStore>,
  link_id: Option<LinkId>,
  render_timeout: Duration,
  inputs: watch::Sender<ResolveInputs>,
  outcomes: watch::Receiver<PipelineState>,
  record: watch::Receiver<Option<HandlerRecord>>,
  task: JoinHandle<()>,
}

impl ClientHandlerHandle {
  /// Replaces the resolution inputs. Identical inputs are ignored.
  pub fn update_inputs(&self, handler_id: Option<LinkId>, context: Vec<LinkId>) {
    let next = ResolveInputs {
      handler_id,
      context,
    };
    let changed = self.inputs.send_if_modified(|current| {
      if *current == next {
        return false;
      }
      *current = next;
      true
    });
    debug!(changed, "client handler inputs updated");
  }

  /// Live pipeline state.
  pub fn outcomes(&self) -> watch::Receiver<PipelineState> {
    self.outcomes.clone()
  }

  /// Snapshot of the pipeline state.
  pub fn state(&self) -> PipelineState {
    self.outcomes.borrow().clone()
  }

  /// Currently resolved handler record.
  pub fn record(&self) -> Option<HandlerRecord> {
    *self.record.borrow()
  }

  /// Waits until a component is accepted. `None` if the handler stopped first.
  pub async fn wait_for_component(&self) -> Option<Arc<dyn Component>> {
    let mut rx = self.outcomes.clone();
    let state = rx
      .wait_for(|s| s.accepted.as_ref().is_some_and(HandlerValue::is_component))
      .await
      .ok()?;
    let component = state.accepted.as_ref().and_then(HandlerValue::as_component).cloned();
    component
  }

  /// Waits until the latest attempt has settled (or the source was cleared)
  /// and returns that state. `None` if the handler stopped first.
  pub async fn wait_settled(&self) -> Option<PipelineState> {
    let mut rx = self.outcomes.clone();
    let state = rx.wait_for(|s| s.epoch > 0 && s.is_current()).await.ok()?;
    Some((*state).clone())
  }

  /// Renders the accepted value with `props` plus the `link` record, if cached.
  /// A render outlasting the configured render timeout renders empty.
  pub async fn render(&self, mut props: RenderProps) -> Rendered {
    if !props.extra.contains_key("link") {
      if let Some(link) = self.link_id.and_then(|id| link_prop(self.store.as_ref(), id)) {
        props = props.prop("link", link);
      }
    }
    let accepted = self.outcomes.borrow().accepted.clone();
    render::mount_within(accepted.as_ref(), props, self.render_timeout).await
  }

  /// Whether the background task has finished.
  pub fn is_finished(&self) -> bool {
    self.task.is_finished()
  }
}

impl Drop for ClientHandlerHandle {
  fn drop(&mut self) {
    self.task.abort();
    debug!(link_id = ?self.link_id, "client handler stopped");
  }
}

/// Why the driver woke up.
enum Wake {
  InputsChanged,
  /// New inputs were resolved while following; carries their record.
  Resolved(Option<HandlerRecord>),
  Retry,
  SourcesEnded,
  Closed,
}

struct Driver {
  resolver: HandlerResolver,
  store: Arc<dyn GraphStore>,
  config: Arc<EngineConfig>,
  pipeline: EvaluationPipeline,
  inputs: watch::Receiver<ResolveInputs>,
  record: watch::Sender<Option<HandlerRecord>>,
}

impl Driver {
  async fn run(mut self) {
    let mut resolved = resolve_latest(&self.resolver, &mut self.inputs, &self.record).await;
    loop {
      let wake = match resolved {
        Some(record) => self.follow(record).await,
        None => {
          if self.pipeline.epoch() > 0 {
            self.pipeline.clear();
          }
          self.wait_retry().await
        }
      };
      resolved = match wake {
        Wake::Resolved(record) => record,
        Wake::InputsChanged | Wake::Retry => {
          resolve_latest(&self.resolver, &mut self.inputs, &self.record).await
        }
        Wake::SourcesEnded => match self.inputs.changed().await {
          Ok(()) => resolve_latest(&self.resolver, &mut self.inputs, &self.record).await,
          Err(_) => break,
        },
        Wake::Closed => break,
      };
    }
    debug!("client handler task finished");
  }

  /// Runs the pipeline over the record's source. Input changes are resolved
  /// while the pipeline keeps running; the same record keeps the current run.
  async fn follow(&mut self, record: HandlerRecord) -> Wake {
    debug!(handler_id = record.handler_id, dist_id = record.dist_id, "following handler source");
    let Driver {
      resolver,
      store,
      pipeline,
      inputs,
      record: record_tx,
      ..
    } = self;
    let run = pipeline.run(subscribe_source(store.as_ref(), Some(record.dist_id)));
    tokio::pin!(run);

    loop {
      tokio::select! {
        _ = &mut run => return Wake::SourcesEnded,
        changed = inputs.changed() => {
          if changed.is_err() {
            return Wake::Closed;
          }
        }
      }

      let resolving = resolve_latest(resolver, inputs, record_tx);
      tokio::pin!(resolving);
      let next = tokio::select! {
        next = &mut resolving => next,
        _ = &mut run => return Wake::Resolved(resolving.await),
      };
      if next != Some(record) {
        return Wake::Resolved(next);
      }
      debug!(handler_id = record.handler_id, "inputs resolve to the same handler");
    }
  }

  /// Waits for new inputs, or for the retry interval when one is configured.
  async fn wait_retry(&mut self) -> Wake {
    let changed = match self.config.resolve_retry() {
      Some(interval) => tokio::select! {
        changed = self.inputs.changed() => changed,
        _ = tokio::time::sleep(interval) => return Wake::Retry,
      },
      None => self.inputs.changed().await,
    };
    match changed {
      Ok(()) => Wake::InputsChanged,
      Err(_) => Wake::Closed,
    }
  }
}

/// Resolves the latest inputs and publishes the record. Resolution errors are
/// logged and treated as no handler yet.
async fn resolve_latest(
  resolver: &HandlerResolver,
  inputs: &mut watch::Receiver<ResolveInputs>,
  record_tx: &watch::Sender<Option<HandlerRecord>>,
) -> Option<HandlerRecord> {
  let current = inputs.borrow_and_update().clone();
  let record = match resolver.resolve(current).await {
    Ok(record) => record,
    Err(e) => {
      warn!(error = %e, "handler resolution failed");
      None
    }
  };
  record_tx.send_if_modified(|published| {
    let changed = *published != record;
    *published = record;
    changed
  });
  record
}

/// `link` prop value for `link_id`, as handed to components.
fn link_prop(store: &dyn GraphStore, link_id: LinkId) -> Option<Value> {
  store
    .link(link_id)
    .and_then(|link| serde_json::to_value(link).ok())
}
