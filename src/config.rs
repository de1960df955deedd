//! Engine configuration: provider constants, sandbox limits and retry policy.
//!
//! Loaded from JSON (all keys optional) and then overridden by
//! `CLIENT_HANDLER_*` environment variables.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::error::ConfigError;
use crate::types::LinkId;

/// Default cap on handler source size (1 MiB).
pub const DEFAULT_MAX_SOURCE_BYTES: usize = 1_000_000;

/// Default bound on one component render.
pub const DEFAULT_RENDER_TIMEOUT_MS: u64 = 5_000;

pub const ENV_EXECUTION_PROVIDER_ID: &str = "CLIENT_HANDLER_EXECUTION_PROVIDER_ID";
pub const ENV_ISOLATION_PROVIDER_ID: &str = "CLIENT_HANDLER_ISOLATION_PROVIDER_ID";
pub const ENV_CONTEXT_TYPE_ID: &str = "CLIENT_HANDLER_CONTEXT_TYPE_ID";
pub const ENV_EVAL_TIMEOUT_MS: &str = "CLIENT_HANDLER_EVAL_TIMEOUT_MS";
pub const ENV_RENDER_TIMEOUT_MS: &str = "CLIENT_HANDLER_RENDER_TIMEOUT_MS";

/// Engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
  /// Id of the execution provider that runs this platform's handler code.
  pub execution_provider_id: LinkId,
  /// Id of the client-side isolation provider.
  pub isolation_provider_id: LinkId,
  /// Type of the links that attach a handler to a context node.
  pub context_type_id: LinkId,
  pub max_source_bytes: usize,
  /// How long to wait for one evaluation. `None` waits forever.
  pub eval_timeout_ms: Option<u64>,
  pub loop_iteration_limit: Option<u64>,
  pub recursion_limit: Option<usize>,
  /// How long one render may take before it renders empty.
  pub render_timeout_ms: u64,
  /// Re-query interval while no handler row matches. `None` only re-queries on input change.
  pub resolve_retry_ms: Option<u64>,
}

impl Default for EngineConfig {
  fn default() -> Self {
    Self {
      execution_provider_id: 0,
      isolation_provider_id: 0,
      context_type_id: 0,
      max_source_bytes: DEFAULT_MAX_SOURCE_BYTES,
      eval_timeout_ms: None,
      loop_iteration_limit: None,
      recursion_limit: None,
      render_timeout_ms: DEFAULT_RENDER_TIMEOUT_MS,
      resolve_retry_ms: None,
    }
  }
}

impl EngineConfig {
  /// Parses a JSON config document.
  pub fn from_json(json: &str) -> Result<Self, ConfigError> {
    Ok(serde_json::from_str(json)?)
  }

  /// Loads a JSON config file.
  #[instrument(level = "trace", skip(path))]
  pub fn load(path: &Path) -> Result<Self, ConfigError> {
    let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
      path: path.display().to_string(),
      source,
    })?;
    Self::from_json(&json)
  }

  /// Applies `CLIENT_HANDLER_*` overrides from the process environment.
  pub fn with_env_overrides(self) -> Result<Self, ConfigError> {
    self.with_overrides(|key| std::env::var(key).ok())
  }

  /// Applies overrides from `lookup` (keyed by environment variable name).
  pub fn with_overrides(
    mut self,
    lookup: impl Fn(&str) -> Option<String>,
  ) -> Result<Self, ConfigError> {
    if let Some(v) = parse_override(&lookup, ENV_EXECUTION_PROVIDER_ID)? {
      self.execution_provider_id = v;
    }
    if let Some(v) = parse_override(&lookup, ENV_ISOLATION_PROVIDER_ID)? {
      self.isolation_provider_id = v;
    }
    if let Some(v) = parse_override(&lookup, ENV_CONTEXT_TYPE_ID)? {
      self.context_type_id = v;
    }
    if let Some(v) = parse_override(&lookup, ENV_EVAL_TIMEOUT_MS)? {
      self.eval_timeout_ms = Some(v);
    }
    if let Some(v) = parse_override(&lookup, ENV_RENDER_TIMEOUT_MS)? {
      self.render_timeout_ms = v;
    }
    Ok(self)
  }

  pub fn eval_timeout(&self) -> Option<Duration> {
    self.eval_timeout_ms.map(Duration::from_millis)
  }

  pub fn render_timeout(&self) -> Duration {
    Duration::from_millis(self.render_timeout_ms)
  }

  pub fn resolve_retry(&self) -> Option<Duration> {
    self.resolve_retry_ms.map(Duration::from_millis)
  }
}

fn parse_override(
  lookup: &impl Fn(&str) -> Option<String>,
  key: &str,
) -> Result<Option<u64>, ConfigError> {
  match lookup(key) {
    None => Ok(None),
    Some(raw) => raw
      .trim()
      .parse::<u64>()
      .map(Some)
      .map_err(|_| ConfigError::Env {
        key: key.to_string(),
        value: raw,
      }),
  }
}
