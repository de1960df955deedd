//! A link (node) of the external graph store.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Identifier of a link in the graph store. `0` never names a real link.
pub type LinkId = u64;

/// Value payload attached to a link.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkValue {
  pub value: Value,
}

/// A link of the graph store. Read-only to this crate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Link {
  pub id: LinkId,
  #[serde(default)]
  pub type_id: LinkId,
  #[serde(default)]
  pub from_id: LinkId,
  #[serde(default)]
  pub to_id: LinkId,
  #[serde(default)]
  pub value: Option<LinkValue>,
}

impl Link {
  pub fn new(id: LinkId, type_id: LinkId) -> Self {
    Self {
      id,
      type_id,
      from_id: 0,
      to_id: 0,
      value: None,
    }
  }

  /// Link connecting `from_id` to `to_id`.
  pub fn connecting(id: LinkId, type_id: LinkId, from_id: LinkId, to_id: LinkId) -> Self {
    Self {
      id,
      type_id,
      from_id,
      to_id,
      value: None,
    }
  }

  pub fn with_value(mut self, value: impl Into<Value>) -> Self {
    self.value = Some(LinkValue {
      value: value.into(),
    });
    self
  }

  /// Text held in `.value.value`, if it is a non-empty string.
  pub fn text(&self) -> Option<&str> {
    self
      .value
      .as_ref()
      .and_then(|v| v.value.as_str())
      .filter(|s| !s.is_empty())
  }
}
