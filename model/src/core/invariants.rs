//! Structural invariants of a model snapshot.

use std::collections::BTreeMap;

use crate::core::path::ModelPath;
use crate::core::types::NodeState;
use crate::report::{ModelReport, NodeReport};

/// Check invariants the scheduler must maintain:
/// - every non-root node at `created` or later has a value type
/// - a created node's parent is created
/// - a graph-closed node only has graph-closed children
/// - listed children and container elements exist as nodes
pub fn validate_invariants(report: &ModelReport) -> Vec<String> {
    let by_path: BTreeMap<&ModelPath, &NodeReport> =
        report.nodes.iter().map(|node| (&node.path, node)).collect();
    let mut errors = Vec::new();
    for node in &report.nodes {
        validate_node(node, &by_path, &mut errors);
    }
    errors
}

fn validate_node(
    node: &NodeReport,
    by_path: &BTreeMap<&ModelPath, &NodeReport>,
    errors: &mut Vec<String>,
) {
    let path = &node.path;
    if path.is_root() {
        if node.value_type.is_some() {
            errors.push(format!("{path}: root must not hold a value"));
        }
    } else if node.state >= NodeState::Created && node.value_type.is_none() {
        errors.push(format!("{path}: state {} without a value", node.state));
    }

    if let Some(parent) = path.parent() {
        match by_path.get(&parent) {
            None => errors.push(format!("{path}: parent {parent} is missing")),
            Some(parent_node) => {
                if node.state >= NodeState::Created && parent_node.state < NodeState::Created {
                    errors.push(format!(
                        "{path}: created before parent {parent} ({})",
                        parent_node.state
                    ));
                }
            }
        }
    }

    for name in &node.children {
        let child = path.child(name.as_str());
        match by_path.get(&child) {
            None => errors.push(format!("{path}: child {child} is missing")),
            Some(child_node) => {
                if node.state == NodeState::GraphClosed && child_node.state < NodeState::GraphClosed
                {
                    errors.push(format!(
                        "{path}: graph-closed with open child {child} ({})",
                        child_node.state
                    ));
                }
            }
        }
    }

    if let Some(elements) = &node.elements {
        for name in elements.keys() {
            if !node.children.contains(name) {
                errors.push(format!("{path}: element '{name}' is not a child"));
            }
        }
    }
}
