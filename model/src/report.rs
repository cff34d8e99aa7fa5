//! Serializable snapshot of the model graph for diagnostics.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::core::path::ModelPath;
use crate::core::types::{NodeState, Phase, RuleDescriptor};
use crate::registry::ModelRegistry;

/// Every node of a registry, sorted by path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelReport {
    pub nodes: Vec<NodeReport>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeReport {
    pub path: ModelPath,
    pub state: NodeState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_type: Option<String>,
    /// View types the node can be projected as.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub views: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub creators: Vec<RuleDescriptor>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<String>,
    /// Container elements and their declared types.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elements: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub rules: BTreeMap<Phase, Vec<RuleDescriptor>>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub failed: bool,
}

impl ModelReport {
    pub(crate) fn capture(registry: &ModelRegistry) -> Self {
        let nodes = registry
            .nodes
            .values()
            .map(|node| NodeReport {
                path: node.path.clone(),
                state: node.state(),
                value_type: node.value_type.map(|ty| ty.name().to_string()),
                views: node
                    .projections
                    .types()
                    .iter()
                    .map(|ty| ty.name().to_string())
                    .collect(),
                creators: node
                    .creators
                    .iter()
                    .map(|creator| creator.descriptor().clone())
                    .collect(),
                children: node.children.iter().cloned().collect(),
                elements: node.container.as_ref().map(|index| {
                    index
                        .borrow()
                        .elements()
                        .iter()
                        .map(|(name, declared)| (name.clone(), declared.name().to_string()))
                        .collect()
                }),
                rules: node
                    .rules
                    .iter()
                    .filter(|(_, bindings)| !bindings.is_empty())
                    .map(|(phase, bindings)| {
                        let descriptors = bindings
                            .iter()
                            .map(|binding| binding.descriptor().clone())
                            .collect();
                        (*phase, descriptors)
                    })
                    .collect(),
                failed: node.failed,
            })
            .collect();
        Self { nodes }
    }

    pub fn node(&self, path: &ModelPath) -> Option<&NodeReport> {
        self.nodes.iter().find(|node| &node.path == path)
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("serialize model report")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::CreationRule;
    use crate::test_support::path;

    #[test]
    fn report_lists_nodes_in_path_order() {
        let mut registry = ModelRegistry::new();
        registry
            .register(path("b"), CreationRule::value("create b", || 2_u32))
            .expect("register b");
        registry
            .register(path("a"), CreationRule::value("create a", || 1_u32))
            .expect("register a");
        registry
            .bind_rule(path("a"), Phase::Mutate, [], "bump a", |_| Ok(()))
            .expect("bind");
        registry.close().expect("close");

        let report = registry.report();
        let paths: Vec<String> = report.nodes.iter().map(|n| n.path.to_string()).collect();
        assert_eq!(paths, vec!["<root>", "a", "b"]);

        let a = report.node(&path("a")).expect("a");
        assert_eq!(a.state, NodeState::GraphClosed);
        assert_eq!(a.value_type.as_deref(), Some("u32"));
        assert_eq!(a.views, vec!["u32".to_string()]);
        assert_eq!(a.rules[&Phase::Mutate], vec![RuleDescriptor::new("bump a")]);
    }

    #[test]
    fn json_uses_dotted_paths_and_phase_names() {
        let mut registry = ModelRegistry::new();
        registry
            .register(path("a"), CreationRule::value("create a", || ()))
            .expect("register a");
        registry
            .register(path("a.b"), CreationRule::value("create b", || ()))
            .expect("register b");
        registry
            .bind_rule(path("a.b"), Phase::Finalize, [], "seal", |_| Ok(()))
            .expect("bind");

        let json = registry.report().to_json().expect("json");
        let parsed: serde_json::Value = serde_json::from_str(&json).expect("parse");
        assert_eq!(parsed["nodes"][2]["path"], "a.b");
        assert_eq!(parsed["nodes"][2]["state"], "registered");
        assert_eq!(parsed["nodes"][2]["rules"]["finalize"][0], "seal");
        assert_eq!(parsed["nodes"][1]["children"][0], "b");
    }
}
