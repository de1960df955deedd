//! What a handler evaluates to.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::RenderFault;

/// Result of invoking a component once.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderOutput {
  /// Element tree produced by the component; `None` when it returned nothing.
  pub tree: Option<Value>,
  /// Whether the component called `onClose` while rendering.
  pub close_requested: bool,
}

/// An invocable renderable unit produced by evaluating handler source.
#[async_trait]
pub trait Component: Send + Sync + fmt::Debug {
  /// Invokes the component with normalized props.
  async fn render(&self, props: Value) -> Result<RenderOutput, RenderFault>;
}

/// Executable value produced by the evaluator.
#[derive(Clone)]
pub enum HandlerValue {
  /// A renderable component.
  Component(Arc<dyn Component>),
  /// Any other value, as plain data. Never rendered.
  Data(Value),
}

impl HandlerValue {
  pub fn as_component(&self) -> Option<&Arc<dyn Component>> {
    match self {
      HandlerValue::Component(c) => Some(c),
      HandlerValue::Data(_) => None,
    }
  }

  pub fn is_component(&self) -> bool {
    self.as_component().is_some()
  }
}

impl fmt::Debug for HandlerValue {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      HandlerValue::Component(c) => f.debug_tuple("Component").field(c).finish(),
      HandlerValue::Data(v) => f.debug_tuple("Data").field(v).finish(),
    }
  }
}
