//! Middleware that prints node enter/exit to stderr around each scheduled node.
//!
//! Distinct from the library's own [`workflow_engine::middleware::LoggingMiddleware`]
//! (which logs through `tracing` for operators); this one is the CLI's
//! human-readable demo trace, in the same spirit as the teacher CLI's own
//! `LoggingMiddleware` that printed node enter/exit around each node run.

use async_trait::async_trait;
use serde_json::Value;
use workflow_engine::{Middleware, MiddlewareError};

pub struct LoggingMiddleware;

#[async_trait]
impl Middleware for LoggingMiddleware {
    async fn handle(
        &self,
        name: &str,
        input: &Value,
    ) -> Result<Option<(String, Value)>, MiddlewareError> {
        eprintln!("[node] enter node={name} input={input}");
        Ok(None)
    }
}
