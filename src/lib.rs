//! # client-handler
//!
//! Runs user-authored handler code held in a graph store and renders what it
//! produces.
//!
//! ## Architecture
//!
//! A client handler resolves which handler applies (by explicit id or by
//! context nodes), subscribes to the link holding its source text, evaluates
//! every version in a sandboxed JavaScript runtime and mounts the latest
//! accepted component:
//!
//! ```text
//! HandlerResolver → subscribe_source → EvaluationPipeline → JsEvaluator (+ ModuleRegistry) → mount
//! ```
//!
//! Faults of handler code are contained: users see empty placeholders, never
//! raw errors.

pub(crate) mod builtins;
pub mod client_handler;
pub mod config;
pub mod error;
pub mod evaluator;
pub(crate) mod js_runtime;
pub mod pipeline;
#[cfg(test)]
mod pipeline_test;
pub mod registry;
pub mod render;
pub mod resolver;
#[cfg(test)]
mod resolver_test;
pub mod store;
pub mod subscriber;
pub mod types;

pub use client_handler::{ClientHandler, ClientHandlerHandle, ClientHandlerProps};
pub use config::EngineConfig;
pub use error::{ConfigError, EvalError, ModuleNotFoundError, RenderFault, ResolveError, StoreError};
pub use evaluator::{EvalInput, EvalOutcome, Evaluator, JsEvaluator, SandboxLimits};
pub use js_runtime::JsComponent;
pub use pipeline::{EvaluationPipeline, PipelineState};
pub use registry::{Capability, ModuleRegistry, ModuleRegistryBuilder};
pub use render::{mount, mount_within};
pub use resolver::{HandlerResolver, ResolveInputs, ResolverState};
pub use store::{GraphStore, HandlerRow, LinkSubscription, MemoryStore, StoreSnapshot};
pub use subscriber::{SourceSubscription, subscribe_source};
pub use types::{
  Component, HandlerRecord, HandlerValue, Link, LinkId, RenderProps, Rendered, ResolutionQuery,
};
