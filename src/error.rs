//! Error kinds of the handler engine.
//!
//! Errors raised by untrusted handler code ([EvalError], [RenderFault]) are
//! contained where they occur and turned into values or empty renders. Errors
//! of the trusted engine ([StoreError], [ResolveError], [ConfigError]) propagate.

use std::time::Duration;

use thiserror::Error;

/// Sandboxed code asked for a capability that is not registered.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Module not found: Can't resolve {name}")]
pub struct ModuleNotFoundError {
  /// Exact name that was requested.
  pub name: String,
}

impl ModuleNotFoundError {
  pub fn new(name: impl Into<String>) -> Self {
    Self { name: name.into() }
  }
}

/// Handler source failed to evaluate.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EvalError {
  #[error(transparent)]
  ModuleNotFound(#[from] ModuleNotFoundError),

  #[error("syntax error: {0}")]
  Syntax(String),

  #[error("{name}: {message}")]
  Thrown { name: String, message: String },

  #[error("source too large: {actual} bytes (max {max})")]
  SourceTooLarge { max: usize, actual: usize },

  #[error("invalid input name: {0}")]
  InvalidInputName(String),

  #[error("handler promise never settled")]
  Unsettled,

  #[error("evaluation timed out after {0:?}")]
  Timeout(Duration),

  #[error("sandbox runtime failure: {0}")]
  Runtime(String),
}

/// A mounted component failed while rendering.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RenderFault {
  #[error("{name}: {message}")]
  Thrown { name: String, message: String },

  #[error("component panicked while rendering")]
  Panicked,

  #[error("component runtime closed")]
  RuntimeClosed,

  #[error("render timed out after {0:?}")]
  Timeout(Duration),

  #[error("sandbox runtime failure: {0}")]
  Runtime(String),
}

/// The graph store could not answer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
  #[error("store unavailable: {0}")]
  Unavailable(String),

  #[error("invalid store fixture: {0}")]
  Fixture(String),
}

/// Handler resolution failed for a reason other than "no rows yet".
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
  #[error("handler id 0 does not name a handler")]
  InvalidHandlerId,

  #[error(transparent)]
  Store(#[from] StoreError),
}

/// Configuration could not be loaded.
#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("reading config {path}: {source}")]
  Io {
    path: String,
    #[source]
    source: std::io::Error,
  },

  #[error("parsing config: {0}")]
  Parse(#[from] serde_json::Error),

  #[error("invalid value for {key}: {value}")]
  Env { key: String, value: String },
}
