//! Module registry: the closed set of capabilities sandboxed handler code can `require`.
//!
//! A registry is built once and never mutated. It is handed to the evaluator
//! explicitly; [install_global] additionally publishes one instance for the
//! whole process.

use std::collections::BTreeMap;
use std::sync::Arc;

use once_cell::sync::OnceCell;
use serde_json::Value;
use tracing::{debug, instrument};

use crate::builtins;
use crate::error::ModuleNotFoundError;

/// Pre-vetted implementation exposed under a module name.
#[derive(Debug, Clone, PartialEq)]
pub enum Capability {
  /// Plain data, exposed frozen.
  Data(Value),
  /// Sandbox-language expression producing the module object.
  Script(String),
}

/// Closed, read-only name → capability table.
#[derive(Debug, Clone, Default)]
pub struct ModuleRegistry {
  modules: BTreeMap<String, Capability>,
}

impl ModuleRegistry {
  pub fn builder() -> ModuleRegistryBuilder {
    ModuleRegistryBuilder::default()
  }

  /// Registry holding only the built-in capabilities.
  pub fn with_builtins() -> Self {
    Self::builder().builtins().build()
  }

  /// Returns the capability registered under `name`.
  #[instrument(level = "trace", skip(self))]
  pub fn resolve(&self, name: &str) -> Result<&Capability, ModuleNotFoundError> {
    self
      .modules
      .get(name)
      .ok_or_else(|| ModuleNotFoundError::new(name))
  }

  pub(crate) fn iter(&self) -> impl Iterator<Item = (&str, &Capability)> {
    self.modules.iter().map(|(k, v)| (k.as_str(), v))
  }
}

/// Collects capabilities before the registry is frozen.
#[derive(Debug, Default)]
pub struct ModuleRegistryBuilder {
  modules: BTreeMap<String, Capability>,
}

impl ModuleRegistryBuilder {
  pub fn data(self, name: impl Into<String>, value: Value) -> Self {
    self.capability(name, Capability::Data(value))
  }

  pub fn script(self, name: impl Into<String>, source: impl Into<String>) -> Self {
    self.capability(name, Capability::Script(source.into()))
  }

  /// Registers `capability`, replacing an earlier entry of the same name.
  pub fn capability(mut self, name: impl Into<String>, capability: Capability) -> Self {
    self.modules.insert(name.into(), capability);
    self
  }

  /// Adds `react`, `classnames` and `lodash`.
  pub fn builtins(self) -> Self {
    self
      .script("react", builtins::REACT)
      .script("classnames", builtins::CLASSNAMES)
      .script("lodash", builtins::LODASH)
  }

  pub fn build(self) -> ModuleRegistry {
    debug!(modules = self.modules.len(), "module registry built");
    ModuleRegistry {
      modules: self.modules,
    }
  }
}

static GLOBAL_REGISTRY: OnceCell<Arc<ModuleRegistry>> = OnceCell::new();

/// Publishes `registry` as the process-wide registry. Fails if one is already installed.
pub fn install_global(registry: ModuleRegistry) -> Result<Arc<ModuleRegistry>, ModuleRegistry> {
  let shared = Arc::new(registry);
  if GLOBAL_REGISTRY.set(shared.clone()).is_err() {
    return Err(Arc::try_unwrap(shared).unwrap_or_else(|arc| (*arc).clone()));
  }
  Ok(shared)
}

/// The process-wide registry, if one was installed.
pub fn global() -> Option<Arc<ModuleRegistry>> {
  GLOBAL_REGISTRY.get().cloned()
}
