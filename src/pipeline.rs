//! Evaluation pipeline: turns source deliveries into one accepted outcome.
//!
//! Every delivery advances the epoch. An evaluation result is accepted only
//! if its epoch is still the latest when it completes, so the accepted outcome
//! always belongs to the most recently started attempt, whatever order the
//! attempts finish in. Attempts are never cancelled; stale results are dropped.

use std::sync::Arc;

use futures::future::BoxFuture;
use futures::stream::FuturesUnordered;
use futures::{FutureExt, Stream, StreamExt};
use tokio::sync::watch;
use tracing::{debug, info, instrument};

use crate::error::EvalError;
use crate::evaluator::{EvalInput, EvalOutcome, Evaluator};
use crate::types::HandlerValue;

/// Observable state of a pipeline.
#[derive(Debug, Clone, Default)]
pub struct PipelineState {
  /// Latest epoch handed out.
  pub epoch: u64,
  /// Epoch of the accepted outcome, if any.
  pub accepted_epoch: Option<u64>,
  /// Accepted executable value. `None` after a failure or a cleared source.
  pub accepted: Option<HandlerValue>,
  /// Error of the accepted attempt, when it failed.
  pub last_error: Option<EvalError>,
  /// Evaluations started.
  pub evaluations: u64,
  /// Completed evaluations dropped as outdated.
  pub discarded: u64,
}

impl PipelineState {
  /// True once the attempt of the latest epoch has settled (or the source was cleared).
  pub fn is_current(&self) -> bool {
    self.accepted_epoch == Some(self.epoch)
  }
}

type Attempt = BoxFuture<'static, (u64, EvalOutcome)>;

/// Bridges source deliveries to evaluator attempts.
pub struct EvaluationPipeline {
  evaluator: Arc<dyn Evaluator>,
  input: EvalInput,
  epoch: u64,
  state: watch::Sender<PipelineState>,
}

impl EvaluationPipeline {
  pub fn new(evaluator: Arc<dyn Evaluator>, input: EvalInput) -> (Self, watch::Receiver<PipelineState>) {
    let (tx, rx) = watch::channel(PipelineState::default());
    (Self::with_sender(evaluator, input, tx), rx)
  }

  /// Pipeline publishing into an existing channel. Its epoch starts over at 0
  /// and the published state is reset.
  pub fn with_sender(
    evaluator: Arc<dyn Evaluator>,
    input: EvalInput,
    state: watch::Sender<PipelineState>,
  ) -> Self {
    state.send_replace(PipelineState::default());
    Self {
      evaluator,
      input,
      epoch: 0,
      state,
    }
  }

  pub fn subscribe(&self) -> watch::Receiver<PipelineState> {
    self.state.subscribe()
  }

  pub fn epoch(&self) -> u64 {
    self.epoch
  }

  /// Consumes `sources` until it ends, then waits for attempts still in flight.
  #[instrument(level = "trace", skip(self, sources))]
  pub async fn run<S>(&mut self, sources: S)
  where
    S: Stream<Item = Option<String>> + Send,
  {
    let mut sources = Box::pin(sources);
    let mut in_flight: FuturesUnordered<Attempt> = FuturesUnordered::new();
    let mut open = true;
    loop {
      tokio::select! {
        delivery = sources.next(), if open => match delivery {
          Some(text) => {
            if let Some(attempt) = self.on_delivery(text) {
              in_flight.push(attempt);
            }
          }
          None => {
            debug!(in_flight = in_flight.len(), "source stream ended");
            open = false;
          }
        },
        Some((epoch, outcome)) = in_flight.next(), if !in_flight.is_empty() => {
          self.on_complete(epoch, outcome);
        }
        else => break,
      }
    }
  }

  /// Clears the accepted outcome. Attempts still in flight become outdated.
  pub fn clear(&mut self) {
    self.epoch += 1;
    let epoch = self.epoch;
    debug!(epoch, "source cleared");
    self.state.send_modify(|s| {
      s.epoch = epoch;
      s.accepted_epoch = Some(epoch);
      s.accepted = None;
      s.last_error = None;
    });
  }

  /// Handles one delivery; returns the attempt to run, if any.
  fn on_delivery(&mut self, text: Option<String>) -> Option<Attempt> {
    let Some(source) = text else {
      self.clear();
      return None;
    };
    self.epoch += 1;
    let epoch = self.epoch;
    debug!(epoch, source_len = source.len(), "starting evaluation");
    self.state.send_modify(|s| {
      s.epoch = epoch;
      s.evaluations += 1;
    });
    let evaluator = self.evaluator.clone();
    let input = self.input.clone();
    Some(
      async move {
        let outcome = evaluator.evaluate(&source, &input).await;
        (epoch, outcome)
      }
      .boxed(),
    )
  }

  fn on_complete(&mut self, epoch: u64, outcome: EvalOutcome) {
    if epoch != self.epoch {
      debug!(epoch, latest = self.epoch, "discarding outdated evaluation");
      self.state.send_modify(|s| s.discarded += 1);
      return;
    }
    match outcome {
      Ok(value) => {
        info!(epoch, component = value.is_component(), "evaluation accepted");
        self.state.send_modify(|s| {
          s.accepted_epoch = Some(epoch);
          s.accepted = Some(value);
          s.last_error = None;
        });
      }
      Err(e) => {
        info!(epoch, error = %e, "evaluation failed");
        self.state.send_modify(|s| {
          s.accepted_epoch = Some(epoch);
          s.accepted = None;
          s.last_error = Some(e);
        });
      }
    }
  }
}
