//! Evaluator: runs handler source against an input environment and returns a
//! value or an error. Faults of the evaluated code never escape as panics.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use tracing::{debug, instrument};

use crate::config::{DEFAULT_MAX_SOURCE_BYTES, EngineConfig};
use crate::error::EvalError;
use crate::js_runtime::{self, RuntimeSetup};
use crate::registry::ModuleRegistry;
use crate::types::HandlerValue;

/// Result of one evaluation attempt.
pub type EvalOutcome = Result<HandlerValue, EvalError>;

static IDENTIFIER: Lazy<Regex> =
  Lazy::new(|| Regex::new(r"^[A-Za-z_$][A-Za-z0-9_$]*$").expect("identifier pattern"));

/// Names that can never be bound as inputs.
const RESERVED: &[&str] = &[
  "require", "eval", "arguments", "await", "break", "case", "catch", "class", "const",
  "continue", "debugger", "default", "delete", "do", "else", "enum", "export", "extends", "false",
  "finally", "for", "function", "if", "implements", "import", "in", "instanceof", "interface",
  "let", "new", "null", "package", "private", "protected", "public", "return", "static", "super",
  "switch", "this", "throw", "true", "try", "typeof", "undefined", "var", "void", "while", "with",
  "yield",
];

/// Extra caller inputs, bound as free variables next to `require`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EvalInput {
  values: Map<String, Value>,
}

impl EvalInput {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
    self.values.insert(name.into(), value.into());
    self
  }

  pub fn names(&self) -> impl Iterator<Item = &str> {
    self.values.keys().map(String::as_str)
  }

  pub fn values(&self) -> &Map<String, Value> {
    &self.values
  }

  /// Checks every input name is a bindable identifier.
  pub fn validate(&self) -> Result<(), EvalError> {
    match self
      .names()
      .find(|name| !IDENTIFIER.is_match(name) || RESERVED.contains(name))
    {
      Some(bad) => Err(EvalError::InvalidInputName(bad.to_string())),
      None => Ok(()),
    }
  }
}

/// Evaluates handler source text.
#[async_trait]
pub trait Evaluator: Send + Sync {
  /// Evaluates `source` with `require` and `input` as its only free variables.
  async fn evaluate(&self, source: &str, input: &EvalInput) -> EvalOutcome;
}

/// Resource limits of one sandbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SandboxLimits {
  pub max_source_bytes: usize,
  /// How long the caller waits. The sandbox thread itself is not stopped.
  pub timeout: Option<Duration>,
  pub loop_iteration_limit: Option<u64>,
  pub recursion_limit: Option<usize>,
}

impl Default for SandboxLimits {
  fn default() -> Self {
    Self {
      max_source_bytes: DEFAULT_MAX_SOURCE_BYTES,
      timeout: None,
      loop_iteration_limit: None,
      recursion_limit: None,
    }
  }
}

impl SandboxLimits {
  pub fn from_config(config: &EngineConfig) -> Self {
    Self {
      max_source_bytes: config.max_source_bytes,
      timeout: config.eval_timeout(),
      loop_iteration_limit: config.loop_iteration_limit,
      recursion_limit: config.recursion_limit,
    }
  }
}

/// JavaScript evaluator: one fresh boa context per evaluation.
#[derive(Debug, Clone)]
pub struct JsEvaluator {
  registry: Arc<ModuleRegistry>,
  limits: SandboxLimits,
}

impl JsEvaluator {
  pub fn new(registry: Arc<ModuleRegistry>) -> Self {
    Self {
      registry,
      limits: SandboxLimits::default(),
    }
  }

  pub fn from_config(registry: Arc<ModuleRegistry>, config: &EngineConfig) -> Self {
    Self::new(registry).with_limits(SandboxLimits::from_config(config))
  }

  pub fn with_limits(mut self, limits: SandboxLimits) -> Self {
    self.limits = limits;
    self
  }

  pub fn registry(&self) -> &Arc<ModuleRegistry> {
    &self.registry
  }
}

#[async_trait]
impl Evaluator for JsEvaluator {
  #[instrument(level = "trace", skip(self, source, input), fields(source_len = source.len()))]
  async fn evaluate(&self, source: &str, input: &EvalInput) -> EvalOutcome {
    if source.len() > self.limits.max_source_bytes {
      return Err(EvalError::SourceTooLarge {
        max: self.limits.max_source_bytes,
        actual: source.len(),
      });
    }
    input.validate()?;

    let setup = RuntimeSetup {
      source: source.to_string(),
      input: input.values().clone(),
      registry: self.registry.clone(),
      limits: self.limits,
    };
    let run = js_runtime::spawn_handler_runtime(setup);
    let outcome = match self.limits.timeout {
      Some(limit) => tokio::time::timeout(limit, run)
        .await
        .unwrap_or(Err(EvalError::Timeout(limit))),
      None => run.await,
    };
    match &outcome {
      Ok(value) => debug!(component = value.is_component(), "handler evaluated"),
      Err(e) => debug!(error = %e, "handler evaluation failed"),
    }
    outcome
  }
}
