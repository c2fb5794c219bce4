//! Frozen, validated graph (spec.md §4.1 compile output).
//!
//! A [`Plan`] is produced once by [`crate::graph::registry::Registry::compile`]
//! and never mutated again; every [`crate::scheduler::Runnable::run`] call
//! reads the same `Plan` through an `Arc`.

use std::collections::HashMap;

use serde_json::{Map, Value};

use crate::graph::node::{EdgeDecl, NodeDeclaration, NodeKind};

/// One node's shape, as exposed by [`Plan::get_structure`] (spec.md §4.6).
#[derive(Clone, Debug, serde::Serialize)]
pub struct NodeStructure {
    pub name: String,
    pub is_merge: bool,
    pub branch: Vec<String>,
    pub direct_targets: Vec<String>,
    pub dynamic_possible_targets: Vec<String>,
    pub metadata: Map<String, Value>,
}

/// Validated, immutable graph plus the reverse index merge synchronization
/// needs at run time.
pub struct Plan {
    pub start: String,
    pub end: Option<String>,
    nodes: HashMap<String, NodeDeclaration>,
    /// source node name -> merge nodes that list it in their branch
    /// (spec.md §4.1 invariant 5: "every merge branch source implicitly also
    /// has an edge to that merge node, even if not separately declared").
    source_to_merge_targets: HashMap<String, Vec<String>>,
}

impl Plan {
    /// Builds the reverse merge index and freezes `nodes` into a `Plan`.
    /// Assumes `nodes` already passed [`crate::graph::registry::Registry::compile`]'s
    /// validation — this constructor does not re-validate.
    ///
    /// Also applies the merge-source edge augmentation (spec.md §3 invariant
    /// 5): a branch source with no edge is given a direct edge to the merge
    /// node; one with an existing direct edge gets the merge node appended to
    /// its target set; a dynamic-edge source is left alone (its router is
    /// responsible for reaching the merge node itself).
    pub fn build(mut nodes: HashMap<String, NodeDeclaration>, start: String, end: Option<String>) -> Self {
        let mut source_to_merge_targets: HashMap<String, Vec<String>> = HashMap::new();
        for node in nodes.values() {
            if let NodeKind::Merge { branch } = &node.kind {
                for source in branch {
                    source_to_merge_targets
                        .entry(source.clone())
                        .or_default()
                        .push(node.name.clone());
                }
            }
        }

        for (source, merge_targets) in &source_to_merge_targets {
            if let Some(decl) = nodes.get_mut(source) {
                match &mut decl.edge {
                    None => {
                        decl.edge = Some(EdgeDecl::Direct {
                            targets: merge_targets.clone(),
                        });
                    }
                    Some(EdgeDecl::Direct { targets }) => {
                        for mt in merge_targets {
                            if !targets.contains(mt) {
                                targets.push(mt.clone());
                            }
                        }
                    }
                    Some(EdgeDecl::Dynamic { .. }) => {}
                }
            }
        }

        Self {
            start,
            end,
            nodes,
            source_to_merge_targets,
        }
    }

    pub fn node(&self, name: &str) -> Option<&NodeDeclaration> {
        self.nodes.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.nodes.contains_key(name)
    }

    /// Merge nodes that implicitly receive an edge from `source` by virtue of
    /// listing it in their branch (spec.md §4.1 invariant 5). Empty if `source`
    /// feeds no merge node.
    pub fn implicit_merge_targets(&self, source: &str) -> &[String] {
        self.source_to_merge_targets
            .get(source)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// `true` once all of `merge_node`'s declared branch sources have
    /// produced an output in `merge_state`.
    pub fn merge_is_complete(
        &self,
        merge_node: &str,
        merge_state: &HashMap<String, Vec<crate::context::MergeSlot>>,
    ) -> bool {
        match merge_state.get(merge_node) {
            Some(slots) => !slots.is_empty() && slots.iter().all(|s| !s.pending),
            None => false,
        }
    }

    /// Read-only structural snapshot for visualization/introspection
    /// (spec.md §4.6 `get_structure()`).
    pub fn get_structure(&self) -> Vec<NodeStructure> {
        let mut names: Vec<&String> = self.nodes.keys().collect();
        names.sort();
        names
            .into_iter()
            .map(|name| {
                let decl = &self.nodes[name];
                let (direct_targets, dynamic_possible_targets) = match &decl.edge {
                    Some(EdgeDecl::Direct { targets }) => (targets.clone(), Vec::new()),
                    Some(EdgeDecl::Dynamic {
                        possible_targets, ..
                    }) => (Vec::new(), possible_targets.clone()),
                    None => (Vec::new(), Vec::new()),
                };
                NodeStructure {
                    name: decl.name.clone(),
                    is_merge: decl.is_merge(),
                    branch: decl.branch().map(|b| b.to_vec()).unwrap_or_default(),
                    direct_targets,
                    dynamic_possible_targets,
                    metadata: decl.metadata.clone(),
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::node::NodeDeclaration;
    use std::sync::Arc;

    fn decl(name: &str, kind: NodeKind, edge: Option<EdgeDecl>) -> NodeDeclaration {
        NodeDeclaration {
            name: name.to_string(),
            kind,
            body: Arc::new(|input, _ctx| Box::pin(async move { Ok(input) })),
            edge,
            metadata: Map::new(),
        }
    }

    #[test]
    fn implicit_merge_targets_reverse_indexes_branch_sources() {
        let mut nodes = HashMap::new();
        nodes.insert("a".to_string(), decl("a", NodeKind::Regular, None));
        nodes.insert("b".to_string(), decl("b", NodeKind::Regular, None));
        nodes.insert(
            "m".to_string(),
            decl(
                "m",
                NodeKind::Merge {
                    branch: vec!["a".into(), "b".into()],
                },
                None,
            ),
        );
        let plan = Plan::build(nodes, "a".into(), None);
        assert_eq!(plan.implicit_merge_targets("a"), &["m".to_string()]);
        assert_eq!(plan.implicit_merge_targets("b"), &["m".to_string()]);
        assert!(plan.implicit_merge_targets("m").is_empty());
    }

    #[test]
    fn build_augments_no_edge_source_with_direct_edge_to_merge() {
        let mut nodes = HashMap::new();
        nodes.insert("a".to_string(), decl("a", NodeKind::Regular, None));
        nodes.insert(
            "m".to_string(),
            decl(
                "m",
                NodeKind::Merge {
                    branch: vec!["a".into()],
                },
                None,
            ),
        );
        let plan = Plan::build(nodes, "a".into(), None);
        match &plan.node("a").unwrap().edge {
            Some(EdgeDecl::Direct { targets }) => assert_eq!(targets, &["m".to_string()]),
            other => panic!("expected augmented direct edge, got {other:?}"),
        }
    }

    #[test]
    fn build_appends_merge_target_to_existing_direct_edge() {
        let mut nodes = HashMap::new();
        nodes.insert(
            "a".to_string(),
            decl(
                "a",
                NodeKind::Regular,
                Some(EdgeDecl::Direct {
                    targets: vec!["b".into()],
                }),
            ),
        );
        nodes.insert("b".to_string(), decl("b", NodeKind::Regular, None));
        nodes.insert(
            "m".to_string(),
            decl(
                "m",
                NodeKind::Merge {
                    branch: vec!["a".into()],
                },
                None,
            ),
        );
        let plan = Plan::build(nodes, "a".into(), None);
        match &plan.node("a").unwrap().edge {
            Some(EdgeDecl::Direct { targets }) => {
                assert_eq!(targets, &["b".to_string(), "m".to_string()])
            }
            other => panic!("expected direct edge with merge target appended, got {other:?}"),
        }
    }

    #[test]
    fn build_leaves_dynamic_edge_source_alone() {
        let router: crate::graph::node::Router =
            Arc::new(|_v| Box::pin(async move { crate::graph::node::RouterOutput::None }));
        let mut nodes = HashMap::new();
        nodes.insert(
            "a".to_string(),
            decl(
                "a",
                NodeKind::Regular,
                Some(EdgeDecl::Dynamic {
                    possible_targets: vec![],
                    router,
                }),
            ),
        );
        nodes.insert(
            "m".to_string(),
            decl(
                "m",
                NodeKind::Merge {
                    branch: vec!["a".into()],
                },
                None,
            ),
        );
        let plan = Plan::build(nodes, "a".into(), None);
        assert!(matches!(
            &plan.node("a").unwrap().edge,
            Some(EdgeDecl::Dynamic { .. })
        ));
    }

    #[test]
    fn get_structure_reports_edges_and_merge_branch() {
        let mut nodes = HashMap::new();
        nodes.insert(
            "a".to_string(),
            decl(
                "a",
                NodeKind::Regular,
                Some(EdgeDecl::Direct {
                    targets: vec!["b".into()],
                }),
            ),
        );
        nodes.insert("b".to_string(), decl("b", NodeKind::Regular, None));
        let plan = Plan::build(nodes, "a".into(), Some("b".into()));
        let structure = plan.get_structure();
        assert_eq!(structure.len(), 2);
        let a = structure.iter().find(|n| n.name == "a").unwrap();
        assert_eq!(a.direct_targets, vec!["b".to_string()]);
        assert!(!a.is_merge);
    }

    #[test]
    fn merge_is_complete_requires_every_slot_non_pending() {
        use crate::context::MergeSlot;
        let mut state = HashMap::new();
        state.insert(
            "m".to_string(),
            vec![
                MergeSlot {
                    source: "a".into(),
                    output: Some(Value::from(1)),
                    pending: false,
                },
                MergeSlot {
                    source: "b".into(),
                    output: None,
                    pending: true,
                },
            ],
        );
        let nodes = HashMap::new();
        let plan = Plan::build(nodes, "a".into(), None);
        assert!(!plan.merge_is_complete("m", &state));

        state.get_mut("m").unwrap()[1].pending = false;
        assert!(plan.merge_is_complete("m", &state));
    }
}
