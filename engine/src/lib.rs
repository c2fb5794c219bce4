//! # workflow-engine
//!
//! A scheduler/executor for user-declared directed graphs of computational
//! nodes. A caller declares nodes with a [`graph::Registry`], connects them
//! with static or dynamic edges, and [`graph::Registry::compile`]s the
//! declaration into a [`scheduler::Runnable`]. Running it drives nodes to
//! completion under concurrency, timeout, visit-count, cancellation, and
//! merge-synchronization constraints, while emitting a structured event
//! stream for observation.
//!
//! ## Main modules
//!
//! - [`graph`]: node declarations, the registry/validator, the frozen plan,
//!   and the node executor.
//! - [`scheduler`]: [`scheduler::Runnable`], the top-level orchestrator.
//! - [`event`]: the pub/sub event bus ([`event::EventBus`]).
//! - [`thread_pool`]: per-chain ordered task queues with a completion latch.
//! - [`middleware`]: the sequential `(name, input)` transform chain.
//! - [`context`]: run options, node history, and the handle passed to a
//!   running node body.
//! - [`error`]: the two-tier [`error::ConfigError`] / [`error::ExecError`]
//!   taxonomy.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use serde_json::{Map, Value};
//! use workflow_engine::graph::Registry;
//! use workflow_engine::context::RunOptionsOverrides;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let mut registry = Registry::new();
//! registry
//!     .add_node(
//!         "double",
//!         std::sync::Arc::new(|input: Value, _ctx| {
//!             Box::pin(async move { Ok(Value::from(input.as_i64().unwrap_or(0) * 2)) })
//!         }),
//!         Map::new(),
//!     )
//!     .unwrap();
//! let runnable = registry.compile("double", None).unwrap();
//! let result = runnable.run(Value::from(21), RunOptionsOverrides::default()).await;
//! assert_eq!(result.output, Some(Value::from(42)));
//! # }
//! ```

pub mod context;
pub mod error;
pub mod event;
pub mod graph;
pub mod middleware;
pub mod scheduler;
pub mod thread_pool;

pub use context::{NodeContext, NodeHistory, RunOptions, RunOptionsOverrides};
pub use error::{ConfigError, ContextMap, ExecError};
pub use event::{Event, EventBus, EventHandler, SubscriptionId};
pub use graph::{NodeBody, NodeDeclaration, NodeError, NodeKind, Registry, Router, RouterOutput};
pub use middleware::{Middleware, MiddlewareError};
pub use scheduler::{Runnable, RunResult};
pub use thread_pool::ThreadPool;
