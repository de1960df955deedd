//! JavaScript sandbox runtime backed by boa_engine.
//!
//! Each evaluation gets a fresh [Context] on a dedicated blocking thread. The
//! context only sees the JavaScript builtins, the `require` resolver generated
//! from the [ModuleRegistry], and the caller's inputs. When the handler source
//! evaluates to a function, the thread stays alive and serves render requests
//! for the returned [JsComponent] until the last handle is dropped.
//!
//! Values cross the boundary as JSON text, so no engine value ever leaves the
//! runtime thread.

use std::fmt::Write as _;
use std::sync::Arc;

use async_trait::async_trait;
use boa_engine::{Context, Source};
use serde::Deserialize;
use serde_json::{Map, Value};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, trace};

use crate::error::{EvalError, ModuleNotFoundError, RenderFault};
use crate::evaluator::{EvalOutcome, SandboxLimits};
use crate::registry::{Capability, ModuleRegistry};
use crate::types::{Component, HandlerValue, RenderOutput};

/// Helpers installed before any handler code runs.
const SUPPORT: &str = r#"
function __ch_describe__(e) {
  if (e !== null && typeof e === "object") {
    return {
      name: String(e.name || "Error"),
      message: String(e.message === undefined ? e : e.message),
      module: e.module === undefined ? null : String(e.module)
    };
  }
  return { name: "Error", message: String(e), module: null };
}
function __ch_classify__(v) {
  if (typeof v === "function") {
    globalThis.__ch_handler__ = v;
    return { ok: true, kind: "component" };
  }
  return { ok: true, kind: "data", data: v === undefined ? null : v };
}
function __ch_settle__(value) {
  if (value !== null && (typeof value === "object" || typeof value === "function")
      && typeof value.then === "function") {
    globalThis.__ch_pending__ = true;
    value.then(
      function (v) {
        globalThis.__ch_pending__ = false;
        globalThis.__ch_outcome__ = __ch_classify__(v);
      },
      function (e) {
        globalThis.__ch_pending__ = false;
        globalThis.__ch_outcome__ = { ok: false, error: __ch_describe__(e) };
      }
    );
    return JSON.stringify({ pending: true });
  }
  return JSON.stringify(__ch_classify__(value));
}
"#;

const SETTLED_REPORT: &str = r#"(function () {
  if (globalThis.__ch_pending__) {
    return JSON.stringify({ pending: true });
  }
  return JSON.stringify(globalThis.__ch_outcome__);
})()"#;

/// Everything a runtime thread needs to evaluate one handler source.
#[derive(Debug, Clone)]
pub(crate) struct RuntimeSetup {
  pub source: String,
  pub input: Map<String, Value>,
  pub registry: Arc<ModuleRegistry>,
  pub limits: SandboxLimits,
}

#[derive(Debug)]
enum RuntimeCommand {
  Render {
    props: Value,
    resp: oneshot::Sender<Result<RenderOutput, RenderFault>>,
  },
  Shutdown,
}

#[derive(Debug)]
enum Ready {
  Component,
  Data(Value),
  Failed(EvalError),
}

/// Error reported by sandboxed code.
#[derive(Debug, Deserialize)]
struct JsFailure {
  name: String,
  message: String,
  #[serde(default)]
  module: Option<String>,
}

impl JsFailure {
  fn into_eval_error(self) -> EvalError {
    match (self.name.as_str(), self.module) {
      ("ModuleNotFoundError", Some(module)) => ModuleNotFoundError::new(module).into(),
      ("SyntaxError", _) => EvalError::Syntax(self.message),
      _ => EvalError::Thrown {
        name: self.name,
        message: self.message,
      },
    }
  }

  fn into_render_fault(self) -> RenderFault {
    RenderFault::Thrown {
      name: self.name,
      message: self.message,
    }
  }
}

#[derive(Debug, Deserialize)]
struct EvalReport {
  #[serde(default)]
  pending: bool,
  #[serde(default)]
  ok: bool,
  #[serde(default)]
  kind: Option<String>,
  #[serde(default)]
  data: Option<Value>,
  #[serde(default)]
  error: Option<JsFailure>,
}

#[derive(Debug, Deserialize)]
struct RenderReport {
  ok: bool,
  #[serde(default)]
  closed: bool,
  #[serde(default)]
  tree: Option<Value>,
  #[serde(default)]
  error: Option<JsFailure>,
}

/// Handle to a component living in its own sandbox runtime.
#[derive(Debug)]
pub struct JsComponent {
  tx: mpsc::Sender<RuntimeCommand>,
}

#[async_trait]
impl Component for JsComponent {
  async fn render(&self, props: Value) -> Result<RenderOutput, RenderFault> {
    let (resp_tx, resp_rx) = oneshot::channel();
    self
      .tx
      .send(RuntimeCommand::Render {
        props,
        resp: resp_tx,
      })
      .await
      .map_err(|_| RenderFault::RuntimeClosed)?;
    resp_rx.await.map_err(|_| RenderFault::RuntimeClosed)?
  }
}

impl Drop for JsComponent {
  fn drop(&mut self) {
    let _ = self.tx.try_send(RuntimeCommand::Shutdown);
  }
}

/// Evaluates `setup.source` on a new runtime thread.
pub(crate) async fn spawn_handler_runtime(setup: RuntimeSetup) -> EvalOutcome {
  let (cmd_tx, cmd_rx) = mpsc::channel::<RuntimeCommand>(16);
  let (ready_tx, ready_rx) = oneshot::channel::<Ready>();

  tokio::task::spawn_blocking(move || run_runtime(setup, ready_tx, cmd_rx));

  match ready_rx.await {
    Ok(Ready::Component) => Ok(HandlerValue::Component(Arc::new(JsComponent { tx: cmd_tx }))),
    Ok(Ready::Data(value)) => Ok(HandlerValue::Data(value)),
    Ok(Ready::Failed(e)) => Err(e),
    Err(_) => Err(EvalError::Runtime(
      "sandbox thread exited before reporting".to_string(),
    )),
  }
}

fn run_runtime(
  setup: RuntimeSetup,
  ready_tx: oneshot::Sender<Ready>,
  mut cmd_rx: mpsc::Receiver<RuntimeCommand>,
) {
  let mut context = Context::default();
  apply_limits(&mut context, &setup.limits);

  let ready = match evaluate_handler(&mut context, &setup) {
    Ok(ready) => ready,
    Err(e) => Ready::Failed(e),
  };
  let serve = matches!(ready, Ready::Component);
  if ready_tx.send(ready).is_err() || !serve {
    return;
  }

  trace!("handler runtime serving renders");
  while let Some(cmd) = cmd_rx.blocking_recv() {
    match cmd {
      RuntimeCommand::Render { props, resp } => {
        let _ = resp.send(render_component(&mut context, &props));
      }
      RuntimeCommand::Shutdown => break,
    }
  }
  debug!("handler runtime stopped");
}

fn apply_limits(context: &mut Context, limits: &SandboxLimits) {
  if let Some(n) = limits.loop_iteration_limit {
    context.runtime_limits_mut().set_loop_iteration_limit(n);
  }
  if let Some(n) = limits.recursion_limit {
    context.runtime_limits_mut().set_recursion_limit(n);
  }
}

fn evaluate_handler(context: &mut Context, setup: &RuntimeSetup) -> Result<Ready, EvalError> {
  context
    .eval(Source::from_bytes(SUPPORT))
    .map_err(|e| EvalError::Runtime(e.to_string()))?;
  let prelude = build_prelude(&setup.registry)?;
  context
    .eval(Source::from_bytes(&prelude))
    .map_err(|e| EvalError::Runtime(e.to_string()))?;

  let entry = build_entry(&setup.source, &setup.input)?;
  let mut report = eval_report(context, &entry)?;
  if report.pending {
    context.run_jobs();
    report = eval_report(context, SETTLED_REPORT)?;
  }
  if report.pending {
    return Err(EvalError::Unsettled);
  }
  if !report.ok {
    return Err(
      report
        .error
        .map(JsFailure::into_eval_error)
        .unwrap_or_else(|| EvalError::Runtime("evaluation failed without an error".to_string())),
    );
  }
  match report.kind.as_deref() {
    Some("component") => Ok(Ready::Component),
    _ => Ok(Ready::Data(report.data.unwrap_or(Value::Null))),
  }
}

fn render_component(context: &mut Context, props: &Value) -> Result<RenderOutput, RenderFault> {
  let props_json = to_js_literal(props).map_err(RenderFault::Runtime)?;
  let script = format!(
    r#"(function () {{
  var props = {props_json};
  var closed = false;
  props.onClose = function () {{ closed = true; }};
  try {{
    var out = globalThis.__ch_handler__(props);
    if (out !== null && typeof out === "object" && typeof out.then === "function") {{
      throw new TypeError("components must render synchronously");
    }}
    return JSON.stringify({{ ok: true, closed: closed, tree: out === undefined ? null : out }});
  }} catch (e) {{
    return JSON.stringify({{ ok: false, closed: closed, error: __ch_describe__(e) }});
  }}
}})()"#
  );
  let text = eval_to_string(context, &script).map_err(RenderFault::Runtime)?;
  let report: RenderReport =
    serde_json::from_str(&text).map_err(|e| RenderFault::Runtime(e.to_string()))?;
  if !report.ok {
    return Err(
      report
        .error
        .map(JsFailure::into_render_fault)
        .unwrap_or_else(|| RenderFault::Runtime("render failed without an error".to_string())),
    );
  }
  Ok(RenderOutput {
    tree: report.tree.filter(|t| !t.is_null()),
    close_requested: report.closed,
  })
}

/// Generates the `require` resolver for `registry`.
pub(crate) fn build_prelude(registry: &ModuleRegistry) -> Result<String, EvalError> {
  let mut table = String::new();
  for (name, capability) in registry.iter() {
    let key = to_js_literal(&Value::String(name.to_string())).map_err(EvalError::Runtime)?;
    let body = match capability {
      Capability::Data(value) => format!(
        "Object.freeze({})",
        to_js_literal(value).map_err(EvalError::Runtime)?
      ),
      Capability::Script(source) => format!("({source}\n)"),
    };
    let _ = writeln!(table, "  table[{key}] = function () {{ return {body}; }};");
  }
  Ok(format!(
    r#"var __ch_require__ = (function () {{
  var table = Object.create(null);
{table}  var cache = Object.create(null);
  return function require(name) {{
    var key = String(name);
    if (key in cache) {{
      return cache[key];
    }}
    var load = table[key];
    if (typeof load !== "function") {{
      var err = new Error("Module not found: Can't resolve " + key);
      err.name = "ModuleNotFoundError";
      err.module = key;
      throw err;
    }}
    var mod = load();
    cache[key] = mod;
    return mod;
  }};
}})();
"#
  ))
}

/// Script that evaluates `source` with `require` and the inputs as its only free variables.
fn build_entry(source: &str, input: &Map<String, Value>) -> Result<String, EvalError> {
  let source_lit = to_js_literal(&Value::String(source.to_string())).map_err(EvalError::Runtime)?;
  let input_lit = to_js_literal(&Value::Object(input.clone())).map_err(EvalError::Runtime)?;
  let params: Vec<&str> = std::iter::once("require")
    .chain(input.keys().map(String::as_str))
    .collect();
  let args: Vec<String> = std::iter::once("__ch_require__".to_string())
    .chain(input.keys().map(|k| format!("__ch_input__[{}]", quote(k))))
    .collect();
  Ok(format!(
    r#"var __ch_source__ = {source_lit};
var __ch_input__ = {input_lit};
(function () {{
  var result;
  try {{
    result = (function ({params}) {{ return eval(__ch_source__); }})({args});
  }} catch (e) {{
    return JSON.stringify({{ ok: false, error: __ch_describe__(e) }});
  }}
  return __ch_settle__(result);
}})()"#,
    params = params.join(", "),
    args = args.join(", "),
  ))
}

fn eval_report(context: &mut Context, script: &str) -> Result<EvalReport, EvalError> {
  let text = eval_to_string(context, script).map_err(EvalError::Runtime)?;
  serde_json::from_str(&text).map_err(|e| EvalError::Runtime(format!("bad sandbox report: {e}")))
}

fn eval_to_string(context: &mut Context, code: &str) -> Result<String, String> {
  let value = context
    .eval(Source::from_bytes(code))
    .map_err(|e| e.to_string())?;
  value
    .as_string()
    .map(|s| s.to_std_string_escaped())
    .ok_or_else(|| "sandbox returned a non-string report".to_string())
}

fn to_js_literal(value: &Value) -> Result<String, String> {
  serde_json::to_string(value).map_err(|e| e.to_string())
}

fn quote(s: &str) -> String {
  serde_json::to_string(s).unwrap_or_else(|_| "\"\"".to_string())
}
