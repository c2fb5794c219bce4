//! Node declaration types: the registry's value type (spec.md §3).
//!
//! Modeled as a tagged union (`NodeKind`, `EdgeDecl`) rather than a struct
//! with optional fields read conditionally — spec.md §9 calls out exactly
//! this as a place to prefer a discriminated union over a polymorphic entry.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::context::NodeContext;

/// A node body's error type. Any error type implementing the standard
/// `Error` trait works; the executor wraps it into
/// `ExecError::NodeExecutionFailed` (spec.md §4.4/§7: "wraps the body's
/// error") so node bodies never need to know about the scheduler's own
/// error taxonomy (e.g. they cannot accidentally return `EXIT` or
/// `MAX_NODE_VISITS_EXCEEDED`, which are scheduler-internal signals).
pub type NodeError = Box<dyn std::error::Error + Send + Sync>;

/// A node body: `(input, ctx) -> output`, run to completion by the executor.
pub type NodeBody = Arc<
    dyn Fn(Value, NodeContext) -> Pin<Box<dyn Future<Output = Result<Value, NodeError>> + Send>>
        + Send
        + Sync,
>;

/// Result of a dynamic router before normalization (spec.md §4.4 step 4).
pub enum RouterOutput {
    /// Equivalent to the router returning `undefined`/`null`.
    None,
    /// A single target name.
    One(String),
    /// Multiple target names, in order. May contain duplicates (spec.md §9
    /// open question: duplicates are scheduled as distinct successors).
    Many(Vec<String>),
    /// The router produced something that is not a string or an array of strings.
    Invalid,
}

/// A dynamic edge's router: `output -> target_spec`.
pub type Router = Arc<
    dyn Fn(Value) -> Pin<Box<dyn Future<Output = RouterOutput> + Send>> + Send + Sync,
>;

/// A node's single outgoing edge declaration.
#[derive(Clone)]
pub enum EdgeDecl {
    /// Unconditional fan-out to every listed target.
    Direct { targets: Vec<String> },
    /// Target(s) computed at run time by `router`.
    Dynamic {
        possible_targets: Vec<String>,
        router: Router,
    },
}

impl fmt::Debug for EdgeDecl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EdgeDecl::Direct { targets } => f.debug_struct("Direct").field("targets", targets).finish(),
            EdgeDecl::Dynamic {
                possible_targets, ..
            } => f
                .debug_struct("Dynamic")
                .field("possible_targets", possible_targets)
                .field("router", &"<fn>")
                .finish(),
        }
    }
}

/// Whether a node is a plain node or a fan-in (merge) node.
#[derive(Clone, Debug)]
pub enum NodeKind {
    Regular,
    /// Ordered, duplicate-free list of source names that must all complete
    /// before this node may execute (spec.md §3 invariant 4).
    Merge { branch: Vec<String> },
}

/// One registered node: name, kind, body, optional outgoing edge, metadata.
#[derive(Clone)]
pub struct NodeDeclaration {
    pub name: String,
    pub kind: NodeKind,
    pub body: NodeBody,
    pub edge: Option<EdgeDecl>,
    pub metadata: Map<String, Value>,
}

impl fmt::Debug for NodeDeclaration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeDeclaration")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("edge", &self.edge)
            .field("metadata", &self.metadata)
            .finish()
    }
}

impl NodeDeclaration {
    pub fn is_merge(&self) -> bool {
        matches!(self.kind, NodeKind::Merge { .. })
    }

    pub fn branch(&self) -> Option<&[String]> {
        match &self.kind {
            NodeKind::Merge { branch } => Some(branch),
            NodeKind::Regular => None,
        }
    }
}
