//! Graph vertices owned by the registry.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;

use crate::container::ContainerIndex;
use crate::core::path::ModelPath;
use crate::core::types::{ModelType, NodeState, Phase};
use crate::projection::Projections;
use crate::rule::{CreationRule, RuleBinding};

/// One node of the model graph.
pub(crate) struct Node {
    pub(crate) path: ModelPath,
    pub(crate) state: Rc<Cell<NodeState>>,
    pub(crate) value: Option<Rc<dyn Any>>,
    pub(crate) value_type: Option<ModelType>,
    pub(crate) children: BTreeSet<String>,
    pub(crate) projections: Projections,
    pub(crate) creators: Vec<Rc<CreationRule>>,
    pub(crate) rules: BTreeMap<Phase, Vec<Rc<RuleBinding>>>,
    pub(crate) container: Option<Rc<RefCell<ContainerIndex>>>,
    pub(crate) failed: bool,
}

impl Node {
    pub(crate) fn new(path: ModelPath) -> Self {
        Self {
            path,
            state: Rc::new(Cell::new(NodeState::Registered)),
            value: None,
            value_type: None,
            children: BTreeSet::new(),
            projections: Projections::default(),
            creators: Vec::new(),
            rules: BTreeMap::new(),
            container: None,
            failed: false,
        }
    }

    pub(crate) fn state(&self) -> NodeState {
        self.state.get()
    }

    pub(crate) fn set_state(&self, state: NodeState) {
        debug_assert!(state >= self.state.get(), "node states only move forward");
        self.state.set(state);
    }

    pub(crate) fn rules_for(&self, phase: Phase) -> &[Rc<RuleBinding>] {
        self.rules.get(&phase).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Whether a rule for `phase` can still be bound.
    pub(crate) fn accepts(&self, phase: Phase) -> bool {
        self.state() < phase.completion_state()
    }

    /// Whether children may still be added below this node.
    pub(crate) fn accepts_children(&self) -> bool {
        self.state() < NodeState::GraphClosed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_node_is_registered_and_open() {
        let node = Node::new(ModelPath::root().child("a"));
        assert_eq!(node.state(), NodeState::Registered);
        assert!(node.value.is_none());
        assert!(node.accepts(Phase::Create));
        assert!(node.accepts_children());
        assert!(node.rules_for(Phase::Mutate).is_empty());
    }

    #[test]
    fn phases_close_once_their_state_is_reached() {
        let node = Node::new(ModelPath::root().child("a"));
        node.set_state(NodeState::Mutated);
        assert!(!node.accepts(Phase::Defaults));
        assert!(!node.accepts(Phase::Mutate));
        assert!(node.accepts(Phase::Finalize));
        node.set_state(NodeState::GraphClosed);
        assert!(!node.accepts_children());
    }
}
