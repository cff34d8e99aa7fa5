//! Shared deterministic types for the model core.

use std::any::{TypeId, type_name};
use std::fmt;

use serde::{Deserialize, Serialize};

/// Rule execution phase, in the total order rules are applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Create,
    Defaults,
    Mutate,
    Finalize,
}

impl Phase {
    pub const ALL: [Phase; 4] = [
        Phase::Create,
        Phase::Defaults,
        Phase::Mutate,
        Phase::Finalize,
    ];

    /// State a node reaches once every rule of this phase has run.
    pub fn completion_state(self) -> NodeState {
        match self {
            Phase::Create => NodeState::Created,
            Phase::Defaults => NodeState::DefaultsApplied,
            Phase::Mutate => NodeState::Mutated,
            Phase::Finalize => NodeState::Finalized,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Phase::Create => "create",
            Phase::Defaults => "defaults",
            Phase::Mutate => "mutate",
            Phase::Finalize => "finalize",
        };
        f.write_str(label)
    }
}

/// Lifecycle state of a node. Transitions are strictly forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeState {
    Registered,
    Creating,
    Created,
    DefaultsApplied,
    Mutated,
    Finalized,
    SelfClosed,
    GraphClosed,
}

impl NodeState {
    pub fn next(self) -> Option<NodeState> {
        let next = match self {
            NodeState::Registered => NodeState::Creating,
            NodeState::Creating => NodeState::Created,
            NodeState::Created => NodeState::DefaultsApplied,
            NodeState::DefaultsApplied => NodeState::Mutated,
            NodeState::Mutated => NodeState::Finalized,
            NodeState::Finalized => NodeState::SelfClosed,
            NodeState::SelfClosed => NodeState::GraphClosed,
            NodeState::GraphClosed => return None,
        };
        Some(next)
    }

    /// Phase whose rules run on the way into this state, if any.
    pub fn entered_by(self) -> Option<Phase> {
        match self {
            NodeState::Created => Some(Phase::Create),
            NodeState::DefaultsApplied => Some(Phase::Defaults),
            NodeState::Mutated => Some(Phase::Mutate),
            NodeState::Finalized => Some(Phase::Finalize),
            _ => None,
        }
    }

    /// Whether the node's value may still be mutated.
    pub fn is_mutable(self) -> bool {
        self < NodeState::Finalized
    }
}

impl fmt::Display for NodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            NodeState::Registered => "registered",
            NodeState::Creating => "creating",
            NodeState::Created => "created",
            NodeState::DefaultsApplied => "defaults-applied",
            NodeState::Mutated => "mutated",
            NodeState::Finalized => "finalized",
            NodeState::SelfClosed => "self-closed",
            NodeState::GraphClosed => "graph-closed",
        };
        f.write_str(label)
    }
}

/// Type token identifying a value or view type in the model.
///
/// Works for unsized types too, so trait objects such as `dyn ComponentSpec`
/// can be used as view types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ModelType {
    id: TypeId,
    name: &'static str,
}

impl ModelType {
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: type_name::<T>(),
        }
    }

    pub fn id(&self) -> TypeId {
        self.id
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl fmt::Display for ModelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Human-readable origin of a rule, used in diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuleDescriptor(String);

impl RuleDescriptor {
    pub fn new(origin: impl Into<String>) -> Self {
        Self(origin.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RuleDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RuleDescriptor {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for RuleDescriptor {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// When container elements are realized relative to their creation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementCreation {
    /// Elements stay `Registered` until something realizes them.
    #[default]
    Lazy,
    /// Elements are realized to `Created` as soon as they are declared.
    Eager,
}
