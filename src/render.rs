//! Render bridge: mounts an accepted handler value and never lets a render
//! fault reach the host.

use std::panic::AssertUnwindSafe;
use std::time::Duration;

use futures::FutureExt;
use tracing::{debug, instrument, warn};

use crate::config::DEFAULT_RENDER_TIMEOUT_MS;
use crate::error::RenderFault;
use crate::types::{HandlerValue, RenderProps, Rendered};

/// Mounts `value` with `props`, bounded by the default render timeout.
pub async fn mount(value: Option<&HandlerValue>, props: RenderProps) -> Rendered {
  mount_within(value, props, Duration::from_millis(DEFAULT_RENDER_TIMEOUT_MS)).await
}

/// Mounts `value` with `props`.
///
/// Non-components and absent values render [Rendered::Empty]. Thrown errors,
/// runtime failures, panics and renders outlasting `limit` are logged and also
/// render `Empty`. If the component called `onClose`, the host callback runs
/// once the render has returned.
#[instrument(level = "trace", skip(value, props))]
pub async fn mount_within(
  value: Option<&HandlerValue>,
  props: RenderProps,
  limit: Duration,
) -> Rendered {
  let Some(component) = value.and_then(HandlerValue::as_component) else {
    debug!("nothing renderable");
    return Rendered::Empty;
  };

  let normalized = props.normalized();
  let render = AssertUnwindSafe(component.render(normalized)).catch_unwind();
  let result = match tokio::time::timeout(limit, render).await {
    Ok(Ok(result)) => result,
    Ok(Err(_)) => Err(RenderFault::Panicked),
    Err(_) => Err(RenderFault::Timeout(limit)),
  };

  match result {
    Ok(output) => {
      if output.close_requested {
        match &props.on_close {
          Some(on_close) => on_close(),
          None => debug!("onClose called without a host callback"),
        }
      }
      match output.tree {
        Some(tree) => Rendered::Element(tree),
        None => Rendered::Empty,
      }
    }
    Err(fault) => {
      warn!(error = %fault, "handler render failed");
      Rendered::Empty
    }
  }
}
