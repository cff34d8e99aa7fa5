//! Error taxonomy for model registration, binding and realization.

use crate::core::path::ModelPath;
use crate::core::types::{NodeState, Phase, RuleDescriptor};

/// Errors raised by the model registry.
///
/// Every variant names the offending path; rule failures also carry the
/// phase and the descriptor of the rule that raised.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    /// No node is registered at the path.
    #[error("unknown model path '{path}'")]
    UnknownPath { path: ModelPath },

    /// A creation rule is already registered for the path.
    #[error("duplicate registration at '{path}': already created by {existing}")]
    DuplicateRegistration {
        path: ModelPath,
        existing: RuleDescriptor,
    },

    /// The container already holds an element with this name.
    #[error("container '{container}' already has an element named '{name}'")]
    DuplicateElement { container: ModelPath, name: String },

    /// No factory can create the requested element type.
    #[error("container '{container}' has no factory for element type {requested}")]
    UnknownFactory {
        container: ModelPath,
        requested: &'static str,
    },

    /// The node was declared (e.g. by a binding) but nothing creates it.
    #[error("no creation rule for '{path}'")]
    NoCreationRule { path: ModelPath },

    /// More than one rule claims to create the node.
    #[error("multiple creation rules for '{path}': {}", .descriptors.join(", "))]
    MultipleCreationRules {
        path: ModelPath,
        descriptors: Vec<String>,
    },

    /// The subject is past the point where the change is allowed.
    #[error("'{path}' is frozen (state {state}){}", render_phase(.phase))]
    FrozenSubject {
        path: ModelPath,
        phase: Option<Phase>,
        state: NodeState,
    },

    /// No registered projection can serve the requested view type.
    #[error("'{path}' has no projection for {requested}")]
    NoSuchProjection {
        path: ModelPath,
        requested: &'static str,
    },

    /// Several unrelated projections match and none is most specific.
    #[error("ambiguous projection of '{path}' as {requested}: {}", .candidates.join(", "))]
    AmbiguousProjection {
        path: ModelPath,
        requested: &'static str,
        candidates: Vec<&'static str>,
    },

    /// A mutable view was requested where only reads are allowed.
    #[error("'{path}' cannot be viewed mutably as {requested} (state {state})")]
    ReadOnlyViolation {
        path: ModelPath,
        requested: &'static str,
        state: NodeState,
    },

    /// The value is borrowed in a way that conflicts with the request,
    /// e.g. a caller still holds a view borrow while a rule mutates it.
    #[error("'{path}' is borrowed elsewhere and cannot be accessed as {requested}")]
    BorrowConflict {
        path: ModelPath,
        requested: &'static str,
    },

    /// Realization re-entered a path that is already being realized.
    #[error("cyclic dependency: {}", render_chain(.chain))]
    CyclicDependency { chain: Vec<ModelPath> },

    /// A rule action or creator raised.
    #[error("rule {descriptor} failed for '{path}' during {phase}")]
    RuleExecutionFailed {
        path: ModelPath,
        phase: Phase,
        descriptor: RuleDescriptor,
        #[source]
        cause: anyhow::Error,
    },

    /// Dotted text could not be parsed as a path.
    #[error("invalid model path '{input}': {reason}")]
    InvalidPath { input: String, reason: String },

    /// A type is not assignable to the type a container or node requires.
    #[error("'{path}': {actual} is not assignable to {expected}")]
    IncompatibleType {
        path: ModelPath,
        actual: &'static str,
        expected: &'static str,
    },

    /// An adapter for the same view type and mutability already exists.
    #[error("'{path}' already has a {} projection for {view}", mutability(.mutable))]
    DuplicateProjection {
        path: ModelPath,
        view: &'static str,
        mutable: bool,
    },

    /// Container operation on a node that is not a container.
    #[error("'{path}' is not a polymorphic container")]
    NotAContainer { path: ModelPath },

    /// Realization nested deeper than the configured limit.
    #[error("realization of '{path}' exceeded depth limit {limit}")]
    DepthExceeded { path: ModelPath, limit: usize },

    /// A rule on the node failed earlier in this run.
    #[error("'{path}' failed earlier in this configuration run")]
    PreviouslyFailed { path: ModelPath },
}

impl ModelError {
    /// The path the error is about. For cycles this is the repeated path.
    pub fn path(&self) -> Option<&ModelPath> {
        match self {
            ModelError::UnknownPath { path }
            | ModelError::DuplicateRegistration { path, .. }
            | ModelError::NoCreationRule { path }
            | ModelError::MultipleCreationRules { path, .. }
            | ModelError::FrozenSubject { path, .. }
            | ModelError::NoSuchProjection { path, .. }
            | ModelError::AmbiguousProjection { path, .. }
            | ModelError::ReadOnlyViolation { path, .. }
            | ModelError::BorrowConflict { path, .. }
            | ModelError::RuleExecutionFailed { path, .. }
            | ModelError::IncompatibleType { path, .. }
            | ModelError::DuplicateProjection { path, .. }
            | ModelError::NotAContainer { path }
            | ModelError::DepthExceeded { path, .. }
            | ModelError::PreviouslyFailed { path } => Some(path),
            ModelError::DuplicateElement { container, .. }
            | ModelError::UnknownFactory { container, .. } => Some(container),
            ModelError::CyclicDependency { chain } => chain.last(),
            ModelError::InvalidPath { .. } => None,
        }
    }

    /// Follow nested rule failures down to the model error that started them.
    ///
    /// Returns `self` when the innermost cause is not a [`ModelError`].
    pub fn innermost(&self) -> &ModelError {
        let mut current = self;
        while let ModelError::RuleExecutionFailed { cause, .. } = current {
            match cause.downcast_ref::<ModelError>() {
                Some(inner) => current = inner,
                None => break,
            }
        }
        current
    }
}

fn render_phase(phase: &Option<Phase>) -> String {
    phase
        .map(|p| format!(", cannot bind {p} rule"))
        .unwrap_or_default()
}

fn mutability(mutable: &bool) -> &'static str {
    if *mutable { "mutable" } else { "read" }
}

fn render_chain(chain: &[ModelPath]) -> String {
    chain
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" -> ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(text: &str) -> ModelPath {
        ModelPath::parse(text).expect("path")
    }

    #[test]
    fn cycle_message_lists_chain() {
        let err = ModelError::CyclicDependency {
            chain: vec![path("a"), path("b"), path("a")],
        };
        assert_eq!(err.to_string(), "cyclic dependency: a -> b -> a");
        assert_eq!(err.path(), Some(&path("a")));
    }

    #[test]
    fn rule_failure_keeps_cause_as_source() {
        let err = ModelError::RuleExecutionFailed {
            path: path("suites.unit1"),
            phase: Phase::Mutate,
            descriptor: RuleDescriptor::new("test rule"),
            cause: anyhow::anyhow!("boom"),
        };
        let message = err.to_string();
        assert!(message.contains("suites.unit1"));
        assert!(message.contains("mutate"));
        assert!(message.contains("test rule"));
        assert!(!message.contains("boom"));
        let source = std::error::Error::source(&err).expect("source");
        assert_eq!(source.to_string(), "boom");

        let chain = format!("{:#}", anyhow::Error::new(err));
        assert_eq!(chain.matches("boom").count(), 1, "{chain}");
    }

    #[test]
    fn innermost_unwraps_nested_model_errors() {
        let inner = ModelError::UnknownPath { path: path("b") };
        let outer = ModelError::RuleExecutionFailed {
            path: path("a"),
            phase: Phase::Defaults,
            descriptor: RuleDescriptor::new("outer"),
            cause: anyhow::Error::new(inner),
        };
        assert!(matches!(
            outer.innermost(),
            ModelError::UnknownPath { path } if path.to_string() == "b"
        ));
    }

    #[test]
    fn frozen_subject_mentions_phase_when_known() {
        let err = ModelError::FrozenSubject {
            path: path("a"),
            phase: Some(Phase::Defaults),
            state: NodeState::Mutated,
        };
        assert_eq!(
            err.to_string(),
            "'a' is frozen (state mutated), cannot bind defaults rule"
        );
    }
}
