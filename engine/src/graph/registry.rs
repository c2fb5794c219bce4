//! Registry / validator: build-time graph declaration (spec.md §4.1).
//!
//! Mutable only during build; `compile()` freezes it into a [`Plan`] bound
//! inside a [`crate::scheduler::Runnable`].

use std::collections::HashMap;

use serde_json::{Map, Value};

use crate::error::ConfigError;
use crate::graph::node::{EdgeDecl, NodeBody, NodeDeclaration, NodeKind, Router};
use crate::graph::plan::Plan;
use crate::scheduler::Runnable;

/// Builder for a node graph. Add nodes and edges, then [`Registry::compile`].
pub struct Registry {
    nodes: HashMap<String, NodeDeclaration>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    pub fn new() -> Self {
        Self {
            nodes: HashMap::new(),
        }
    }

    /// Registers a regular node. Fails with `DUPLICATE_NODE_NAME` if `name`
    /// is already registered, `INVALID_NODE_NAME` if `name` is empty.
    pub fn add_node(
        &mut self,
        name: impl Into<String>,
        body: NodeBody,
        metadata: Map<String, Value>,
    ) -> Result<(), ConfigError> {
        let name = name.into();
        self.check_new_name(&name)?;
        self.nodes.insert(
            name.clone(),
            NodeDeclaration {
                name,
                kind: NodeKind::Regular,
                body,
                edge: None,
                metadata,
            },
        );
        Ok(())
    }

    /// Registers a fan-in (merge) node. `branch` must be non-empty and
    /// duplicate-free (spec.md §3 invariant 4).
    pub fn add_merge_node(
        &mut self,
        name: impl Into<String>,
        branch: Vec<String>,
        body: NodeBody,
        metadata: Map<String, Value>,
    ) -> Result<(), ConfigError> {
        let name = name.into();
        self.check_new_name(&name)?;
        if branch.is_empty() {
            return Err(ConfigError::MergeNodeMissingBranch(
                name,
                "branch list is empty".into(),
            ));
        }
        let mut seen = std::collections::HashSet::new();
        for b in &branch {
            if !seen.insert(b.clone()) {
                return Err(ConfigError::MergeNodeMissingBranch(
                    name,
                    format!("duplicate branch source {b}"),
                ));
            }
        }
        self.nodes.insert(
            name.clone(),
            NodeDeclaration {
                name,
                kind: NodeKind::Merge { branch },
                body,
                edge: None,
                metadata,
            },
        );
        Ok(())
    }

    /// Sets an unconditional outgoing edge from `from` to every name in `to`.
    /// Fails with `NODE_NOT_FOUND` if `from` is not registered, or
    /// `DUPLICATE_EDGE` if `from` already has an outgoing edge.
    pub fn edge(&mut self, from: &str, to: Vec<String>) -> Result<(), ConfigError> {
        let node = self
            .nodes
            .get_mut(from)
            .ok_or_else(|| ConfigError::NodeNotFound(from.to_string()))?;
        if node.edge.is_some() {
            return Err(ConfigError::DuplicateEdge(from.to_string()));
        }
        if to.is_empty() {
            return Err(ConfigError::InvalidEdge(
                from.to_string(),
                "target list is empty".into(),
            ));
        }
        node.edge = Some(EdgeDecl::Direct { targets: to });
        Ok(())
    }

    /// Sets a dynamic outgoing edge from `from`, computed at run time by
    /// `router`. `possible_targets` is informational only (for
    /// `get_structure()`/visualization); it does not constrain what the
    /// router may return at run time (spec.md §4.1).
    pub fn dynamic_edge(
        &mut self,
        from: &str,
        possible_targets: Vec<String>,
        router: Router,
    ) -> Result<(), ConfigError> {
        let node = self
            .nodes
            .get_mut(from)
            .ok_or_else(|| ConfigError::NodeNotFound(from.to_string()))?;
        if node.edge.is_some() {
            return Err(ConfigError::DuplicateEdge(from.to_string()));
        }
        node.edge = Some(EdgeDecl::Dynamic {
            possible_targets,
            router,
        });
        Ok(())
    }

    /// Validates the declaration and freezes it into a runnable plan
    /// (spec.md §4.1 compile steps 1-4, augmentation step 5 applied inside
    /// [`Plan::build`]).
    pub fn compile(self, start: &str, end: Option<&str>) -> Result<Runnable, ConfigError> {
        if !self.nodes.contains_key(start) {
            return Err(ConfigError::NodeNotFound(start.to_string()));
        }
        if let Some(e) = end {
            if !self.nodes.contains_key(e) {
                return Err(ConfigError::NodeNotFound(e.to_string()));
            }
        }

        for node in self.nodes.values() {
            if let NodeKind::Merge { branch } = &node.kind {
                for source in branch {
                    if !self.nodes.contains_key(source) {
                        return Err(ConfigError::MergeNodeMissingBranch(
                            node.name.clone(),
                            format!("branch source {source} does not exist"),
                        ));
                    }
                }
            }
            if let Some(EdgeDecl::Direct { targets }) = &node.edge {
                for target in targets {
                    if !self.nodes.contains_key(target) {
                        return Err(ConfigError::MissingSourceNode {
                            from: node.name.clone(),
                            missing: target.clone(),
                        });
                    }
                }
            }
        }

        let plan = Plan::build(self.nodes, start.to_string(), end.map(String::from));
        Ok(Runnable::new(plan))
    }

    fn check_new_name(&self, name: &str) -> Result<(), ConfigError> {
        if name.is_empty() {
            return Err(ConfigError::InvalidNodeName(name.to_string()));
        }
        if self.nodes.contains_key(name) {
            return Err(ConfigError::DuplicateNodeName(name.to_string()));
        }
        Ok(())
    }
}
