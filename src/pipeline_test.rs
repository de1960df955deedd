//! Tests for `EvaluationPipeline`.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use proptest::prelude::*;
use serde_json::json;
use tokio::sync::{mpsc, oneshot};
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::error::EvalError;
use crate::evaluator::{EvalInput, EvalOutcome, Evaluator};
use crate::pipeline::{EvaluationPipeline, PipelineState};
use crate::types::HandlerValue;

type Call = (String, oneshot::Sender<EvalOutcome>);

/// Evaluator whose attempts finish only when the test answers them.
struct GatedEvaluator {
  calls: mpsc::UnboundedSender<Call>,
  started: AtomicUsize,
}

#[async_trait]
impl Evaluator for GatedEvaluator {
  async fn evaluate(&self, source: &str, _input: &EvalInput) -> EvalOutcome {
    self.started.fetch_add(1, Ordering::SeqCst);
    let (tx, rx) = oneshot::channel();
    let _ = self.calls.send((source.to_string(), tx));
    rx.await
      .unwrap_or_else(|_| Err(EvalError::Runtime("test dropped the attempt".into())))
  }
}

struct Harness {
  evaluator: Arc<GatedEvaluator>,
  calls: mpsc::UnboundedReceiver<Call>,
  sources: Option<mpsc::UnboundedSender<Option<String>>>,
  state: tokio::sync::watch::Receiver<PipelineState>,
  task: tokio::task::JoinHandle<EvaluationPipeline>,
}

impl Harness {
  fn start() -> Self {
    let (calls_tx, calls) = mpsc::unbounded_channel();
    let evaluator = Arc::new(GatedEvaluator {
      calls: calls_tx,
      started: AtomicUsize::new(0),
    });
    let (mut pipeline, state) = EvaluationPipeline::new(evaluator.clone(), EvalInput::new());
    let (tx, rx) = mpsc::unbounded_channel();
    let task = tokio::spawn(async move {
      pipeline.run(UnboundedReceiverStream::new(rx)).await;
      pipeline
    });
    Self {
      evaluator,
      calls,
      sources: Some(tx),
      state,
      task,
    }
  }

  fn deliver(&self, text: Option<&str>) {
    if let Some(tx) = &self.sources {
      tx.send(text.map(str::to_string)).unwrap();
    }
  }

  async fn next_call(&mut self) -> Call {
    self.calls.recv().await.unwrap()
  }

  async fn wait(&mut self, f: impl FnMut(&PipelineState) -> bool) -> PipelineState {
    self.state.wait_for(f).await.unwrap().clone()
  }

  async fn finish(mut self) -> PipelineState {
    self.sources = None;
    let pipeline = self.task.await.unwrap();
    let state = pipeline.subscribe().borrow().clone();
    state
  }
}

fn data(value: &HandlerValue) -> serde_json::Value {
  match value {
    HandlerValue::Data(v) => v.clone(),
    other => panic!("expected data, got {:?}", other),
  }
}

#[tokio::test]
async fn accepts_single_result() {
  let mut h = Harness::start();
  h.deliver(Some("a"));
  let (source, reply) = h.next_call().await;
  assert_eq!(source, "a");
  reply.send(Ok(HandlerValue::Data(json!("a")))).unwrap();
  let state = h.wait(|s| s.accepted.is_some()).await;
  assert_eq!(state.epoch, 1);
  assert_eq!(state.accepted_epoch, Some(1));
  assert!(state.is_current());
  assert_eq!(data(state.accepted.as_ref().unwrap()), json!("a"));
}

#[tokio::test]
async fn slow_earlier_result_is_discarded() {
  let mut h = Harness::start();
  h.deliver(Some("A"));
  let (_, reply_a) = h.next_call().await;
  h.deliver(Some("B"));
  let (_, reply_b) = h.next_call().await;

  reply_b.send(Ok(HandlerValue::Data(json!("B")))).unwrap();
  let state = h.wait(|s| s.accepted.is_some()).await;
  assert_eq!(state.accepted_epoch, Some(2));

  reply_a.send(Ok(HandlerValue::Data(json!("A")))).unwrap();
  let state = h.wait(|s| s.discarded == 1).await;
  assert_eq!(data(state.accepted.as_ref().unwrap()), json!("B"));
  assert_eq!(state.accepted_epoch, Some(2));
}

#[tokio::test]
async fn failure_clears_previous_value() {
  let mut h = Harness::start();
  h.deliver(Some("ok"));
  let (_, reply) = h.next_call().await;
  reply.send(Ok(HandlerValue::Data(json!(1)))).unwrap();
  h.wait(|s| s.accepted.is_some()).await;

  h.deliver(Some("bad"));
  let (_, reply) = h.next_call().await;
  reply.send(Err(EvalError::Syntax("unexpected token".into()))).unwrap();
  let state = h.wait(|s| s.accepted_epoch == Some(2)).await;
  assert!(state.accepted.is_none());
  assert_eq!(
    state.last_error,
    Some(EvalError::Syntax("unexpected token".into()))
  );
}

#[tokio::test]
async fn absent_text_clears_without_evaluating() {
  let mut h = Harness::start();
  h.deliver(Some("a"));
  let (_, reply) = h.next_call().await;
  reply.send(Ok(HandlerValue::Data(json!("a")))).unwrap();
  h.wait(|s| s.accepted.is_some()).await;

  h.deliver(None);
  let state = h.wait(|s| s.epoch == 2).await;
  assert!(state.accepted.is_none());
  assert!(state.is_current());
  assert_eq!(state.evaluations, 1);
  assert_eq!(h.evaluator.started.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn absent_text_outdates_attempt_in_flight() {
  let mut h = Harness::start();
  h.deliver(Some("a"));
  let (_, reply) = h.next_call().await;
  h.deliver(None);
  h.wait(|s| s.epoch == 2).await;
  reply.send(Ok(HandlerValue::Data(json!("a")))).unwrap();
  let state = h.finish().await;
  assert!(state.accepted.is_none());
  assert_eq!(state.discarded, 1);
}

#[tokio::test]
async fn drains_in_flight_attempts_after_sources_end() {
  let mut h = Harness::start();
  h.deliver(Some("last"));
  let (_, reply) = h.next_call().await;
  let sources = h.sources.take();
  drop(sources);
  reply.send(Ok(HandlerValue::Data(json!("last")))).unwrap();
  let state = h.finish().await;
  assert_eq!(data(state.accepted.as_ref().unwrap()), json!("last"));
}

fn completion_orders() -> impl Strategy<Value = Vec<usize>> {
  (1usize..7).prop_flat_map(|n| Just((0..n).collect::<Vec<_>>()).prop_shuffle())
}

proptest! {
  #[test]
  fn converges_on_last_delivery(order in completion_orders()) {
    let rt = tokio::runtime::Builder::new_current_thread()
      .enable_all()
      .build()
      .unwrap();
    let (accepted, discarded) = rt.block_on(async {
      let mut h = Harness::start();
      let mut replies = Vec::new();
      for i in 0..order.len() {
        h.deliver(Some(format!("v{}", i).as_str()));
        replies.push(Some(h.next_call().await));
      }
      for &i in &order {
        let (source, reply) = replies[i].take().unwrap();
        reply.send(Ok(HandlerValue::Data(json!(source)))).unwrap();
      }
      let state = h.finish().await;
      (state.accepted.map(|v| data(&v)), state.discarded)
    });
    prop_assert_eq!(accepted, Some(json!(format!("v{}", order.len() - 1))));
    prop_assert_eq!(discarded as usize, order.len() - 1);
  }
}
