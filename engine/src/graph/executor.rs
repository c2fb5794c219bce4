//! Node executor: runs exactly one node invocation (spec.md §4.4).
//!
//! The executor never decides concurrency — it only reports successors back
//! to the scheduler, which owns all thread_id allocation and merge bookkeeping.

use chrono::Utc;
use serde_json::Value;
use uuid::Uuid;

use crate::context::{ExecutionState, NodeContext, NodeHistory};
use crate::error::ExecError;
use crate::event::Event;
use crate::graph::node::{EdgeDecl, RouterOutput};
use crate::graph::plan::Plan;

/// What the scheduler does next: dispatch `output` to each name in `successors`.
pub struct NodeOutcome {
    pub successors: Vec<String>,
    pub output: Value,
}

/// Runs `name` with `input` to completion (spec.md §4.4 steps 1-8).
#[allow(clippy::too_many_arguments)]
pub async fn execute_node(
    plan: &Plan,
    bus: &crate::event::EventBus,
    state: &ExecutionState,
    execution_id: &str,
    thread_id: &str,
    name: &str,
    input: Value,
) -> Result<NodeOutcome, ExecError> {
    let node_execution_id = Uuid::new_v4().to_string();
    let started_at = Utc::now();

    bus.publish(Event::NodeStart {
        execution_id: execution_id.to_string(),
        node_execution_id: node_execution_id.clone(),
        thread_id: thread_id.to_string(),
        started_at,
        name: name.to_string(),
        input: input.clone(),
    })
    .await;

    let decl = match plan.node(name) {
        Some(d) => d,
        None => {
            let err = ExecError::NodeExecutionFailed {
                node: name.to_string(),
                message: "Node not found".to_string(),
                context: Default::default(),
            };
            record_failure(
                bus,
                state,
                execution_id,
                thread_id,
                &node_execution_id,
                started_at,
                name,
                input,
                &err,
            )
            .await;
            return Err(err);
        }
    };

    let ctx = NodeContext {
        execution_id: execution_id.to_string(),
        thread_id: thread_id.to_string(),
        node_execution_id: node_execution_id.clone(),
        name: name.to_string(),
        metadata: std::sync::Arc::new(decl.metadata.clone()),
        bus: bus.clone(),
    };

    let output = match (decl.body)(input.clone(), ctx).await {
        Ok(output) => output,
        Err(body_err) => {
            let err = ExecError::NodeExecutionFailed {
                node: name.to_string(),
                message: body_err.to_string(),
                context: Default::default(),
            };
            record_failure(
                bus,
                state,
                execution_id,
                thread_id,
                &node_execution_id,
                started_at,
                name,
                input,
                &err,
            )
            .await;
            return Err(err);
        }
    };

    let mut successors = match &decl.edge {
        None => Vec::new(),
        Some(EdgeDecl::Direct { targets }) => targets.clone(),
        Some(EdgeDecl::Dynamic { router, .. }) => match router(output.clone()).await {
            RouterOutput::None => Vec::new(),
            RouterOutput::One(target) => vec![target],
            RouterOutput::Many(targets) => targets,
            RouterOutput::Invalid => {
                let err = ExecError::InvalidDynamicEdgeResult {
                    node: name.to_string(),
                };
                record_failure(
                    bus,
                    state,
                    execution_id,
                    thread_id,
                    &node_execution_id,
                    started_at,
                    name,
                    input,
                    &err,
                )
                .await;
                return Err(err);
            }
        },
    };

    // Direct- and no-edge merge branch sources already carry their merge
    // target after `Plan::build`'s compile-time augmentation (spec.md §3
    // invariant 5); this fallback only still matters for a dynamic-edge
    // source whose router returned empty (spec.md §4.4 step 5) — dynamic
    // edges are left un-augmented, so without this the merge would hang.
    let reached_end = plan.end.as_deref() == Some(name);
    if reached_end {
        successors.clear();
    } else if successors.is_empty() {
        let implicit = plan.implicit_merge_targets(name);
        if !implicit.is_empty() {
            successors = implicit.to_vec();
        }
    }

    let ended_at = Utc::now();
    state.append_history(NodeHistory {
        node_execution_id: node_execution_id.clone(),
        thread_id: thread_id.to_string(),
        started_at,
        ended_at,
        name: name.to_string(),
        input: input.clone(),
        output: Some(output.clone()),
        is_ok: true,
        error: None,
    });
    bus.publish(Event::NodeEnd {
        execution_id: execution_id.to_string(),
        node_execution_id,
        thread_id: thread_id.to_string(),
        started_at,
        ended_at,
        is_ok: true,
        error: None,
        name: name.to_string(),
        input,
        output: Some(output.clone()),
    })
    .await;

    Ok(NodeOutcome { successors, output })
}

#[allow(clippy::too_many_arguments)]
async fn record_failure(
    bus: &crate::event::EventBus,
    state: &ExecutionState,
    execution_id: &str,
    thread_id: &str,
    node_execution_id: &str,
    started_at: chrono::DateTime<Utc>,
    name: &str,
    input: Value,
    error: &ExecError,
) {
    let ended_at = Utc::now();
    state.append_history(NodeHistory {
        node_execution_id: node_execution_id.to_string(),
        thread_id: thread_id.to_string(),
        started_at,
        ended_at,
        name: name.to_string(),
        input: input.clone(),
        output: None,
        is_ok: false,
        error: Some(error.clone()),
    });
    bus.publish(Event::NodeEnd {
        execution_id: execution_id.to_string(),
        node_execution_id: node_execution_id.to_string(),
        thread_id: thread_id.to_string(),
        started_at,
        ended_at,
        is_ok: false,
        error: Some(error.clone()),
        name: name.to_string(),
        input,
        output: None,
    })
    .await;
}
