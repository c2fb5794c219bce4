//! Error taxonomy for graph configuration and run-time execution.
//!
//! [`ConfigError`] covers everything that can go wrong while a [`crate::Registry`]
//! is being built or compiled (thrown synchronously, fatal to the build).
//! [`ExecError`] covers everything captured inside a [`crate::Runnable::run`]
//! call; it never escapes `run()` — it is captured into the result's
//! `error` field instead.

use std::fmt;

use serde_json::{Map, Value};
use thiserror::Error;

/// Error raised while declaring nodes/edges or compiling a [`crate::Registry`].
///
/// All variants carry the offending node name where one is meaningful, so
/// callers can report precisely which part of the declaration is invalid.
#[derive(Debug, Error, Clone)]
pub enum ConfigError {
    /// A node name was empty.
    #[error("invalid node name: {0:?}")]
    InvalidNodeName(String),

    /// `add_node`/`add_merge_node` was called with a name already registered.
    #[error("duplicate node name: {0}")]
    DuplicateNodeName(String),

    /// An edge or dynamic edge referenced a `from` node that was never added.
    #[error("node not found: {0}")]
    NodeNotFound(String),

    /// `edge`/`dynamic_edge` was called twice for the same `from` node.
    #[error("node {0} already has an outgoing edge")]
    DuplicateEdge(String),

    /// A merge node's `branch` list is empty or contains a duplicate name.
    #[error("merge node {0} has an invalid branch list: {1}")]
    MergeNodeMissingBranch(String, String),

    /// A direct edge or merge branch named a node that does not exist in the plan.
    #[error("node {from} references missing node {missing}")]
    MissingSourceNode {
        /// The node that declared the bad reference.
        from: String,
        /// The name that could not be resolved.
        missing: String,
    },

    /// An edge declaration was structurally invalid (e.g. empty target list).
    #[error("invalid edge on node {0}: {1}")]
    InvalidEdge(String, String),

    /// Reserved: cycle detection is not performed by this implementation.
    /// Loops are bounded at run time by `max_node_visits` instead (spec.md §8).
    #[error("circular dependency detected: {0}")]
    CircularDependency(String),
}

impl ConfigError {
    /// Stable taxonomy code, for programmatic matching independent of message text.
    pub fn code(&self) -> &'static str {
        match self {
            ConfigError::InvalidNodeName(_) => "INVALID_NODE_NAME",
            ConfigError::DuplicateNodeName(_) => "DUPLICATE_NODE_NAME",
            ConfigError::NodeNotFound(_) => "NODE_NOT_FOUND",
            ConfigError::DuplicateEdge(_) => "DUPLICATE_EDGE",
            ConfigError::MergeNodeMissingBranch(_, _) => "MERGE_NODE_MISSING_BRANCH",
            ConfigError::MissingSourceNode { .. } => "MISSING_SOURCE_NODE",
            ConfigError::InvalidEdge(_, _) => "INVALID_EDGE",
            ConfigError::CircularDependency(_) => "CIRCULAR_DEPENDENCY",
        }
    }
}

/// Error captured during a `run()`. Never propagated as a Rust `Err` out of
/// `run()` itself — it ends up in `RunResult::error` (spec.md §7 propagation policy).
#[derive(Debug, Error, Clone)]
pub enum ExecError {
    /// A node body returned an error, or a referenced node was missing at dispatch time.
    #[error("node {node} execution failed: {message}")]
    NodeExecutionFailed {
        node: String,
        message: String,
        context: ContextMap,
    },

    /// `visits_remaining` went below zero for `node`.
    #[error("max node visits ({max}) exceeded at node {node}")]
    MaxNodeVisitsExceeded { node: String, max: u64 },

    /// The whole `run()` future exceeded `options.timeout`.
    #[error("execution timed out")]
    ExecutionTimeout,

    /// A dynamic router returned something other than `null`/string/`string[]`.
    #[error("dynamic edge router on node {node} returned an invalid result")]
    InvalidDynamicEdgeResult { node: String },

    /// The thread pool's completion latch rejected (wraps the first task error
    /// observed; in practice this implementation surfaces the inner error directly,
    /// so this variant is reserved for pool-level bookkeeping failures).
    #[error("thread pool failure: {0}")]
    ThreadPoolFailure(String),

    /// The run was aborted by the runtime (reserved for host-triggered aborts
    /// distinct from a user-requested `exit()`).
    #[error("execution aborted: {0}")]
    ExecutionAborted(String),

    /// A middleware raised an error while transforming `(name, input)`.
    #[error("middleware failed on node {node}: {message}")]
    MiddlewareFail {
        node: String,
        message: String,
        input: Value,
    },

    /// `Runnable::exit(reason)` was called; observed at the next node boundary.
    #[error("execution exited: {0}")]
    Exit(String),
}

impl ExecError {
    /// Stable taxonomy code, for programmatic matching independent of message text.
    pub fn code(&self) -> &'static str {
        match self {
            ExecError::NodeExecutionFailed { .. } => "NODE_EXECUTION_FAILED",
            ExecError::MaxNodeVisitsExceeded { .. } => "MAX_NODE_VISITS_EXCEEDED",
            ExecError::ExecutionTimeout => "EXECUTION_TIMEOUT",
            ExecError::InvalidDynamicEdgeResult { .. } => "INVALID_DYNAMIC_EDGE_RESULT",
            ExecError::ThreadPoolFailure(_) => "THREAD_POOL_FAILURE",
            ExecError::ExecutionAborted(_) => "EXECUTION_ABORTED",
            ExecError::MiddlewareFail { .. } => "MIDDLEWARE_FAIL",
            ExecError::Exit(_) => "EXIT",
        }
    }

    /// The node name this error is attached to, if any.
    pub fn node(&self) -> Option<&str> {
        match self {
            ExecError::NodeExecutionFailed { node, .. } => Some(node),
            ExecError::MaxNodeVisitsExceeded { node, .. } => Some(node),
            ExecError::InvalidDynamicEdgeResult { node } => Some(node),
            ExecError::MiddlewareFail { node, .. } => Some(node),
            _ => None,
        }
    }
}

/// Opaque context mapping carried by some execution errors (spec.md §7: "an
/// optional context mapping"). Thin wrapper so `ExecError` stays `Clone`
/// without pulling `serde_json::Map` semantics into every call site.
#[derive(Debug, Clone, Default)]
pub struct ContextMap(pub Map<String, Value>);

impl fmt::Display for ContextMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", Value::Object(self.0.clone()))
    }
}

impl From<Map<String, Value>> for ContextMap {
    fn from(m: Map<String, Value>) -> Self {
        ContextMap(m)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_codes_match_taxonomy() {
        assert_eq!(
            ConfigError::DuplicateNodeName("a".into()).code(),
            "DUPLICATE_NODE_NAME"
        );
        assert_eq!(
            ConfigError::MissingSourceNode {
                from: "a".into(),
                missing: "b".into()
            }
            .code(),
            "MISSING_SOURCE_NODE"
        );
    }

    #[test]
    fn exec_error_codes_and_node_accessor() {
        let e = ExecError::MaxNodeVisitsExceeded {
            node: "a".into(),
            max: 5,
        };
        assert_eq!(e.code(), "MAX_NODE_VISITS_EXCEEDED");
        assert_eq!(e.node(), Some("a"));

        let e = ExecError::Exit("stop".into());
        assert_eq!(e.code(), "EXIT");
        assert_eq!(e.node(), None);
        assert!(e.to_string().contains("stop"));
    }
}
