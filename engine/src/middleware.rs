//! Middleware chain: sequentially transforms `(name, input)` before
//! execution (spec.md §4.3).
//!
//! spec.md §9 flags the source's CPS `next()` continuation as a pattern to
//! re-architect: rather than threading a `next` closure through each
//! middleware, the chain driver ([`run_chain`]) inlines the control flow —
//! each middleware either leaves the pair unchanged or returns a rewritten
//! one, and the driver folds the list in registration order. Behaviorally
//! identical to the CPS version; simpler in a language without exceptions.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::ExecError;

/// Error type a user middleware may return; wrapped into
/// [`ExecError::MiddlewareFail`] by the chain driver.
pub type MiddlewareError = Box<dyn std::error::Error + Send + Sync>;

/// A single middleware. Runs once per scheduled node, before the node body.
#[async_trait]
pub trait Middleware: Send + Sync {
    /// Returns `Ok(None)` to leave `(name, input)` unchanged, or
    /// `Ok(Some((name', input')))` to redirect/rewrite it for the rest of
    /// the chain and, ultimately, the node executor.
    async fn handle(
        &self,
        name: &str,
        input: &Value,
    ) -> Result<Option<(String, Value)>, MiddlewareError>;
}

/// Runs `middlewares` in order over `(name, input)`. Does not itself apply
/// the built-in exit check — callers run that first (see
/// [`crate::scheduler::Runnable`]) since its failure mode (`EXIT`) is
/// distinct from a user middleware's (`MIDDLEWARE_FAIL`).
pub async fn run_chain(
    middlewares: &[std::sync::Arc<dyn Middleware>],
    name: String,
    input: Value,
) -> Result<(String, Value), ExecError> {
    let mut current = (name, input);
    for mw in middlewares {
        match mw.handle(&current.0, &current.1).await {
            Ok(None) => {}
            Ok(Some(next)) => current = next,
            Err(e) => {
                return Err(ExecError::MiddlewareFail {
                    node: current.0,
                    message: e.to_string(),
                    input: current.1,
                })
            }
        }
    }
    Ok(current)
}

/// Logs node enter/exit around the middleware pass via `tracing` (or
/// `eprintln!` without the `tracing` feature). Grounded in the teacher
/// crate's `LoggingMiddleware`; opt-in via `Runnable::use_mw`, not installed
/// by default.
pub struct LoggingMiddleware;

#[async_trait]
impl Middleware for LoggingMiddleware {
    async fn handle(
        &self,
        name: &str,
        _input: &Value,
    ) -> Result<Option<(String, Value)>, MiddlewareError> {
        crate::graph::logging::log_node_start(name, "-");
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    struct PassThrough;
    #[async_trait]
    impl Middleware for PassThrough {
        async fn handle(
            &self,
            _name: &str,
            _input: &Value,
        ) -> Result<Option<(String, Value)>, MiddlewareError> {
            Ok(None)
        }
    }

    struct Redirect;
    #[async_trait]
    impl Middleware for Redirect {
        async fn handle(
            &self,
            name: &str,
            input: &Value,
        ) -> Result<Option<(String, Value)>, MiddlewareError> {
            if name == "start" && input.as_i64().unwrap_or(0) > 10 {
                Ok(Some(("special".to_string(), input.clone())))
            } else {
                Ok(None)
            }
        }
    }

    struct Failing;
    #[async_trait]
    impl Middleware for Failing {
        async fn handle(
            &self,
            _name: &str,
            _input: &Value,
        ) -> Result<Option<(String, Value)>, MiddlewareError> {
            Err("kaboom".into())
        }
    }

    #[tokio::test]
    async fn chain_passes_through_unchanged_by_default() {
        let chain: Vec<Arc<dyn Middleware>> = vec![Arc::new(PassThrough)];
        let (name, input) = run_chain(&chain, "start".into(), Value::from(15)).await.unwrap();
        assert_eq!(name, "start");
        assert_eq!(input, Value::from(15));
    }

    #[tokio::test]
    async fn middleware_can_redirect_node_and_input() {
        let chain: Vec<Arc<dyn Middleware>> = vec![Arc::new(Redirect)];
        let (name, _) = run_chain(&chain, "start".into(), Value::from(15)).await.unwrap();
        assert_eq!(name, "special");

        let (name, _) = run_chain(&chain, "start".into(), Value::from(5)).await.unwrap();
        assert_eq!(name, "start");
    }

    #[tokio::test]
    async fn failing_middleware_surfaces_as_middleware_fail_with_original_input() {
        let chain: Vec<Arc<dyn Middleware>> = vec![Arc::new(Failing)];
        let err = run_chain(&chain, "start".into(), Value::from(5))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "MIDDLEWARE_FAIL");
        match err {
            ExecError::MiddlewareFail { node, input, .. } => {
                assert_eq!(node, "start");
                assert_eq!(input, Value::from(5));
            }
            _ => panic!("expected MiddlewareFail"),
        }
    }

    #[tokio::test]
    async fn middlewares_run_sequentially_in_registration_order() {
        struct Appender(char);
        #[async_trait]
        impl Middleware for Appender {
            async fn handle(
                &self,
                name: &str,
                input: &Value,
            ) -> Result<Option<(String, Value)>, MiddlewareError> {
                let _ = input;
                Ok(Some((format!("{name}{}", self.0), Value::Null)))
            }
        }
        let chain: Vec<Arc<dyn Middleware>> =
            vec![Arc::new(Appender('a')), Arc::new(Appender('b'))];
        let (name, _) = run_chain(&chain, "n".into(), Value::Null).await.unwrap();
        assert_eq!(name, "nab");
    }
}
