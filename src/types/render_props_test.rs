//! Tests for `RenderProps`.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde_json::{Map, Value, json};

use super::RenderProps;

fn style(v: Value) -> Map<String, Value> {
  v.as_object().cloned().unwrap()
}

#[test]
fn fill_size_adds_full_size_style() {
  let p = RenderProps::new().fill_size(true).normalized();
  assert_eq!(p["fillSize"], json!(true));
  assert_eq!(p["style"], json!({"width": "100%", "height": "100%"}));
}

#[test]
fn no_fill_size_leaves_style_empty() {
  let p = RenderProps::new().normalized();
  assert_eq!(p["fillSize"], json!(false));
  assert_eq!(p["style"], json!({}));
}

#[test]
fn explicit_style_wins_over_fill_style() {
  let p = RenderProps::new()
    .fill_size(true)
    .style(style(json!({"height": "50px", "color": "red"})))
    .normalized();
  assert_eq!(
    p["style"],
    json!({"width": "100%", "height": "50px", "color": "red"})
  );
}

#[test]
fn explicit_style_without_fill_size() {
  let p = RenderProps::new()
    .style(style(json!({"width": "10px"})))
    .normalized();
  assert_eq!(p["style"], json!({"width": "10px"}));
}

#[test]
fn extra_props_are_kept() {
  let p = RenderProps::new().prop("title", "hi").prop("n", 3).normalized();
  assert_eq!(p["title"], json!("hi"));
  assert_eq!(p["n"], json!(3));
}

#[test]
fn from_json_routes_reserved_keys() {
  let props = RenderProps::from_json(json!({
    "fillSize": true,
    "style": {"color": "blue"},
    "onClose": "ignored",
    "label": "x"
  }));
  assert!(props.fill_size);
  assert_eq!(props.style, Some(style(json!({"color": "blue"}))));
  assert!(!props.extra.contains_key("onClose"));
  assert_eq!(props.extra.get("label"), Some(&json!("x")));
}

#[test]
fn from_json_non_object_is_default() {
  let props = RenderProps::from_json(json!([1, 2]));
  assert!(!props.fill_size);
  assert!(props.extra.is_empty());
}

#[test]
fn on_close_is_callable() {
  let fired = Arc::new(AtomicBool::new(false));
  let f = fired.clone();
  let props = RenderProps::new().on_close(move || f.store(true, Ordering::SeqCst));
  (props.on_close.unwrap())();
  assert!(fired.load(Ordering::SeqCst));
}
