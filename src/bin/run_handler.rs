//! CLI: run a client handler against a store fixture and print what it renders.
//!
//! Loads a JSON store snapshot, resolves the handler (by `--handler-id` or by
//! `--context`), evaluates its current source and prints the rendered output
//! as JSON.
//!
//! Usage: `run_handler [OPTIONS] <path-to-store-json>`
//! Example: run_handler --handler-id 7 tests/fixtures/null_handler.json
//!
//! Set RUST_LOG=client_handler=trace for TRACE-level span enter/exit and events.

use clap::Parser;
use client_handler::{
  ClientHandler, ClientHandlerProps, EngineConfig, EvalInput, JsEvaluator, MemoryStore,
  ModuleRegistry, RenderProps, registry,
};
use serde_json::Value;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt::format::FmtSpan};

/// Run a client handler from a store fixture.
#[derive(Parser, Debug)]
#[command(name = "run_handler")]
#[command(
  after_help = r#"Environment variables (override the config file when set):
  CLIENT_HANDLER_EXECUTION_PROVIDER_ID   Execution provider of handler rows.
  CLIENT_HANDLER_ISOLATION_PROVIDER_ID   Isolation provider of handler rows.
  CLIENT_HANDLER_CONTEXT_TYPE_ID         Type of handler-to-context links.
  CLIENT_HANDLER_EVAL_TIMEOUT_MS         Per-evaluation timeout.
  CLIENT_HANDLER_RENDER_TIMEOUT_MS       Per-render timeout.

Examples:
  run_handler --handler-id 7 tests/fixtures/null_handler.json
  run_handler --context 5,6 --link-id 500 --fill-size tests/fixtures/context_handler.json"#
)]
struct Args {
  /// JSON engine config. Defaults apply when omitted.
  #[arg(long, value_name = "FILE")]
  config: Option<PathBuf>,

  /// Explicit handler id.
  #[arg(long, value_name = "ID")]
  handler_id: Option<u64>,

  /// Context node ids (comma-separated), used when no handler id is given.
  #[arg(long, value_name = "IDS", value_delimiter = ',')]
  context: Vec<u64>,

  /// Link passed to the component as `link`.
  #[arg(long, value_name = "ID")]
  link_id: Option<u64>,

  /// Render with `fillSize` set.
  #[arg(long)]
  fill_size: bool,

  /// Extra evaluator input as NAME=JSON. Repeatable.
  #[arg(long = "input", value_name = "NAME=JSON")]
  inputs: Vec<String>,

  /// Data capability as NAME=FILE (JSON). Repeatable.
  #[arg(long = "data", value_name = "NAME=FILE")]
  data: Vec<String>,

  /// How long to wait for the handler to settle.
  #[arg(long, value_name = "MS", default_value_t = 5000)]
  timeout_ms: u64,

  /// Path to the JSON store fixture
  #[arg(value_name = "path-to-store-json")]
  store_path: PathBuf,
}

fn fail(msg: impl std::fmt::Display) -> ! {
  eprintln!("Error: {}", msg);
  process::exit(1);
}

fn split_pair(arg: &str) -> (&str, &str) {
  match arg.split_once('=') {
    Some(pair) => pair,
    None => fail(format!("expected NAME=VALUE, got {:?}", arg)),
  }
}

fn build_inputs(args: &[String]) -> EvalInput {
  args.iter().fold(EvalInput::new(), |input, arg| {
    let (name, json) = split_pair(arg);
    let value: Value = serde_json::from_str(json)
      .unwrap_or_else(|e| fail(format!("input {}: {}", name, e)));
    input.with(name, value)
  })
}

fn build_registry(args: &[String]) -> ModuleRegistry {
  args
    .iter()
    .fold(ModuleRegistry::builder().builtins(), |builder, arg| {
      let (name, path) = split_pair(arg);
      let text = std::fs::read_to_string(path)
        .unwrap_or_else(|e| fail(format!("reading {}: {}", path, e)));
      let value: Value =
        serde_json::from_str(&text).unwrap_or_else(|e| fail(format!("parsing {}: {}", path, e)));
      builder.data(name, value)
    })
    .build()
}

#[tokio::main]
async fn main() {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .with_span_events(FmtSpan::ENTER | FmtSpan::EXIT)
    .with_writer(std::io::stderr)
    .init();

  info!("run_handler starting");
  let args = Args::parse();

  let config = match &args.config {
    Some(path) => EngineConfig::load(path).unwrap_or_else(|e| fail(e)),
    None => EngineConfig::default(),
  };
  let config = config.with_env_overrides().unwrap_or_else(|e| fail(e));
  info!(?config, "engine config");

  let store = MemoryStore::load(&args.store_path).unwrap_or_else(|e| fail(e));
  let registry = registry::install_global(build_registry(&args.data)).unwrap_or_else(Arc::new);
  let evaluator = JsEvaluator::from_config(registry, &config);

  let props = ClientHandlerProps {
    link_id: args.link_id,
    handler_id: args.handler_id,
    context: args.context.clone(),
    input: build_inputs(&args.inputs),
  };
  let handle = ClientHandler::spawn(
    Arc::new(store),
    Arc::new(evaluator),
    Arc::new(config),
    props,
  );

  let wait = Duration::from_millis(args.timeout_ms);
  match tokio::time::timeout(wait, handle.wait_settled()).await {
    Ok(Some(state)) => {
      info!(epoch = state.epoch, discarded = state.discarded, "handler settled");
      if let Some(e) = &state.last_error {
        eprintln!("Handler error: {}", e);
      }
    }
    Ok(None) => warn!("client handler stopped before settling"),
    Err(_) => warn!(timeout_ms = args.timeout_ms, "handler did not settle; rendering placeholder"),
  }

  let render_props = RenderProps::new()
    .fill_size(args.fill_size)
    .on_close(|| info!("handler requested close"));
  let rendered = handle.render(render_props).await;
  match serde_json::to_string_pretty(&rendered) {
    Ok(json) => println!("{}", json),
    Err(e) => fail(e),
  }
}
