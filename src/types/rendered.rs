//! Output of the render bridge.

use serde::Serialize;
use serde_json::Value;

/// What the host mounts.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "tree", rename_all = "snake_case")]
pub enum Rendered {
  /// Empty placeholder.
  Empty,
  /// Element tree produced by a handler component.
  Element(Value),
}

impl Rendered {
  pub fn is_empty(&self) -> bool {
    matches!(self, Rendered::Empty)
  }
}
