//! Props handed to a mounted handler component.

use std::fmt;
use std::sync::Arc;

use serde_json::{Map, Value};

/// Host callback fired when a handler asks to be closed.
pub type OnClose = Arc<dyn Fn() + Send + Sync>;

/// Caller-facing render props: `{fillSize, onClose, style?, ...arbitrary}`.
#[derive(Clone, Default)]
pub struct RenderProps {
  pub fill_size: bool,
  pub on_close: Option<OnClose>,
  pub style: Option<Map<String, Value>>,
  pub extra: Map<String, Value>,
}

impl fmt::Debug for RenderProps {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("RenderProps")
      .field("fill_size", &self.fill_size)
      .field("on_close", &self.on_close.is_some())
      .field("style", &self.style)
      .field("extra", &self.extra)
      .finish()
  }
}

impl RenderProps {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn fill_size(mut self, fill_size: bool) -> Self {
    self.fill_size = fill_size;
    self
  }

  pub fn on_close(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
    self.on_close = Some(Arc::new(f));
    self
  }

  pub fn style(mut self, style: Map<String, Value>) -> Self {
    self.style = Some(style);
    self
  }

  /// Adds one arbitrary prop. `fillSize` and `style` are routed to their dedicated fields.
  pub fn prop(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
    let key = key.into();
    let value = value.into();
    match key.as_str() {
      "fillSize" => self.fill_size = value.as_bool().unwrap_or(false),
      "style" => self.style = value.as_object().cloned(),
      "onClose" => {}
      _ => {
        self.extra.insert(key, value);
      }
    }
    self
  }

  /// Builds props from a JSON object; non-objects give empty props.
  pub fn from_json(value: Value) -> Self {
    let Value::Object(map) = value else {
      return Self::default();
    };
    map
      .into_iter()
      .fold(Self::default(), |props, (k, v)| props.prop(k, v))
  }

  /// Style applied under the caller's explicit style when `fill_size` is set.
  pub(crate) fn fill_style() -> Map<String, Value> {
    let mut style = Map::new();
    style.insert("width".to_string(), Value::String("100%".to_string()));
    style.insert("height".to_string(), Value::String("100%".to_string()));
    style
  }

  /// Normalized prop object passed to the component (without `onClose`, which the
  /// sandbox binds itself).
  pub fn normalized(&self) -> Value {
    let mut props = self.extra.clone();
    props.insert("fillSize".to_string(), Value::Bool(self.fill_size));
    let mut style = if self.fill_size {
      Self::fill_style()
    } else {
      Map::new()
    };
    if let Some(explicit) = &self.style {
      for (k, v) in explicit {
        style.insert(k.clone(), v.clone());
      }
    }
    props.insert("style".to_string(), Value::Object(style));
    Value::Object(props)
  }
}
