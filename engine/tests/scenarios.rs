//! Integration tests exercising full runs through the public API, not just
//! individual component units (companion to the inline unit tests in
//! `src/scheduler.rs` and friends).

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};
use workflow_engine::{Middleware, MiddlewareError, NodeBody, Registry, RunOptionsOverrides};

fn identity() -> NodeBody {
    Arc::new(|input: Value, _ctx| Box::pin(async move { Ok(input) }))
}

struct RedirectOverTen;

#[async_trait]
impl Middleware for RedirectOverTen {
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

#[tokio::test]
async fn middleware_redirects_execution_to_a_different_node() {
    let mut registry = Registry::new();
    registry.add_node("start", identity(), Map::new()).unwrap();
    registry.add_node("normal", identity(), Map::new()).unwrap();
    registry.add_node("special", identity(), Map::new()).unwrap();
    registry.edge("start", vec!["normal".into()]).unwrap();

    let runnable = registry.compile("start", None).unwrap();
    runnable.use_mw(Arc::new(RedirectOverTen));

    let result = runnable.run(Value::from(15), RunOptionsOverrides::default()).await;

    assert!(result.is_ok);
    let names: Vec<&str> = result.histories.iter().map(|h| h.name.as_str()).collect();
    assert_eq!(names, vec!["special"]);
    assert!(!names.contains(&"normal"));
}

#[tokio::test]
async fn node_failure_is_wrapped_into_node_execution_failed() {
    let mut registry = Registry::new();
    let failing: NodeBody =
        Arc::new(|_input, _ctx| Box::pin(async move { Err("synthetic failure".into()) }));
    registry.add_node("boom", failing, Map::new()).unwrap();
    let runnable = registry.compile("boom", None).unwrap();

    let result = runnable.run(Value::Null, RunOptionsOverrides::default()).await;

    assert!(!result.is_ok);
    let error = result.error.unwrap();
    assert_eq!(error.code(), "NODE_EXECUTION_FAILED");
    assert!(error.to_string().contains("synthetic failure"));
    assert_eq!(result.histories.len(), 1);
    assert!(!result.histories[0].is_ok);
}

#[tokio::test]
async fn zero_max_node_visits_fails_the_first_scheduled_node() {
    let mut registry = Registry::new();
    registry.add_node("only", identity(), Map::new()).unwrap();
    let runnable = registry.compile("only", None).unwrap();

    let result = runnable
        .run(
            Value::from(1),
            RunOptionsOverrides {
                max_node_visits: Some(0),
                ..Default::default()
            },
        )
        .await;

    assert!(!result.is_ok);
    assert_eq!(result.error.unwrap().code(), "MAX_NODE_VISITS_EXCEEDED");
    assert!(result.histories.is_empty());
}
