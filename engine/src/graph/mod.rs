//! Graph model: node declarations, the registry/validator, the frozen plan,
//! and the node executor (spec.md §3, §4.1, §4.4).

pub mod executor;
pub mod logging;
pub mod node;
pub mod plan;
pub mod registry;

pub use executor::{execute_node, NodeOutcome};
pub use node::{EdgeDecl, NodeBody, NodeDeclaration, NodeError, NodeKind, Router, RouterOutput};
pub use plan::{NodeStructure, Plan};
pub use registry::Registry;
