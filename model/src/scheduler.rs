//! Realization: bringing a node to a required state.
//!
//! A node advances one state at a time. Before it moves, every declared input
//! of the rules that will run is realized, so inputs always settle before the
//! subject that reads them. Re-entering a path that is still on the
//! realization stack is a cycle.

use std::rc::Rc;

use tracing::{debug, instrument, trace, warn};

use crate::core::path::ModelPath;
use crate::core::types::{NodeState, Phase, RuleDescriptor};
use crate::error::ModelError;
use crate::registry::ModelRegistry;
use crate::rule::{RuleContext, RuleInput};

impl ModelRegistry {
    /// Bring the node at `path` to at least `required`.
    ///
    /// Idempotent: a node already at or beyond `required` is left alone. A
    /// node whose realization failed is never retried.
    #[instrument(skip_all, fields(path = %path, required = %required))]
    pub fn realize(&mut self, path: &ModelPath, required: NodeState) -> Result<(), ModelError> {
        let node = self.node(path)?;
        if node.failed {
            return Err(ModelError::PreviouslyFailed { path: path.clone() });
        }
        if node.state() >= required {
            return Ok(());
        }
        if let Some(first) = self.stack.iter().position(|active| active == path) {
            let mut chain = self.stack[first..].to_vec();
            chain.push(path.clone());
            return Err(ModelError::CyclicDependency { chain });
        }
        let limit = self.config().max_depth;
        if self.stack.len() >= limit {
            return Err(ModelError::DepthExceeded {
                path: path.clone(),
                limit,
            });
        }

        self.stack.push(path.clone());
        let result = self.advance(path, required);
        self.stack.pop();
        if let Err(err) = &result {
            debug!(path = %path, error = %err, "realization failed");
            if let Some(node) = self.nodes.get_mut(path) {
                node.failed = true;
            }
        }
        result
    }

    fn advance(&mut self, path: &ModelPath, required: NodeState) -> Result<(), ModelError> {
        if required >= NodeState::Created {
            if let Some(parent) = path.parent().filter(|parent| !parent.is_root()) {
                self.realize(&parent, NodeState::Created)?;
            }
        }
        self.realize_declared_inputs(path, required)?;

        loop {
            let state = self.node(path)?.state();
            if state >= required {
                return Ok(());
            }
            let Some(next) = state.next() else {
                return Ok(());
            };
            match next {
                NodeState::Created => self.create(path)?,
                NodeState::DefaultsApplied | NodeState::Mutated | NodeState::Finalized => {
                    if let Some(phase) = next.entered_by() {
                        self.run_phase(path, phase)?;
                    }
                }
                NodeState::GraphClosed => self.close_children(path)?,
                NodeState::Registered | NodeState::Creating | NodeState::SelfClosed => {}
            }
            self.node(path)?.set_state(next);
            debug!(path = %path, state = %next, "node advanced");
        }
    }

    /// Realize the inputs of the creator and of every rule that runs on the
    /// way to `required`.
    fn realize_declared_inputs(
        &mut self,
        path: &ModelPath,
        required: NodeState,
    ) -> Result<(), ModelError> {
        let node = self.node(path)?;
        let mut inputs: Vec<RuleInput> = Vec::new();
        if required >= NodeState::Created && node.state() < NodeState::Created {
            for creator in &node.creators {
                inputs.extend(creator.inputs().iter().cloned());
            }
        }
        for phase in Phase::ALL {
            if phase.completion_state() <= required && node.accepts(phase) {
                for binding in node.rules_for(phase) {
                    inputs.extend(binding.inputs().iter().cloned());
                }
            }
        }
        for input in inputs {
            self.realize(&input.path, input.state)?;
        }
        Ok(())
    }

    fn create(&mut self, path: &ModelPath) -> Result<(), ModelError> {
        let node = self.node(path)?;
        let creator = match node.creators.as_slice() {
            [] => return Err(ModelError::NoCreationRule { path: path.clone() }),
            [creator] => Rc::clone(creator),
            many => {
                return Err(ModelError::MultipleCreationRules {
                    path: path.clone(),
                    descriptors: many
                        .iter()
                        .map(|creator| creator.descriptor().to_string())
                        .collect(),
                });
            }
        };
        for input in creator.inputs() {
            self.realize(&input.path, input.state)?;
        }

        let value = self.execute(path, Phase::Create, creator.descriptor(), |ctx| {
            creator.create(ctx)
        })?;
        let node = self.node_mut(path)?;
        node.value = Some(value);
        node.value_type = Some(creator.value_type());
        debug!(path = %path, value = %creator.value_type(), "value created");

        self.run_phase(path, Phase::Create)
    }

    /// Run the rules of `phase` in registration order. Rules bound while the
    /// phase is running are picked up by the same pass.
    fn run_phase(&mut self, path: &ModelPath, phase: Phase) -> Result<(), ModelError> {
        let mut ran = 0;
        while let Some(binding) = self.node(path)?.rules_for(phase).get(ran).cloned() {
            ran += 1;
            for input in binding.inputs() {
                self.realize(&input.path, input.state)?;
            }
            self.execute(path, phase, binding.descriptor(), |ctx| binding.run(ctx))?;
        }
        if ran > 0 {
            debug!(path = %path, phase = %phase, rules = ran, "phase complete");
        }
        Ok(())
    }

    /// Close children until none is left open; closing one child may
    /// declare siblings.
    fn close_children(&mut self, path: &ModelPath) -> Result<(), ModelError> {
        loop {
            let pending: Vec<ModelPath> = self
                .node(path)?
                .children
                .iter()
                .map(|name| path.child(name.as_str()))
                .filter(|child| {
                    self.state(child)
                        .is_some_and(|state| state < NodeState::GraphClosed)
                })
                .collect();
            if pending.is_empty() {
                return Ok(());
            }
            for child in pending {
                self.realize(&child, NodeState::GraphClosed)?;
            }
        }
    }

    fn execute<T>(
        &mut self,
        path: &ModelPath,
        phase: Phase,
        descriptor: &RuleDescriptor,
        run: impl FnOnce(&mut RuleContext<'_>) -> anyhow::Result<T>,
    ) -> Result<T, ModelError> {
        trace!(path = %path, phase = %phase, rule = %descriptor, "running rule");
        let mut ctx = RuleContext::new(self, path.clone(), phase, descriptor.clone());
        run(&mut ctx).map_err(|cause| {
            warn!(
                path = %path,
                phase = %phase,
                rule = %descriptor,
                error = %format!("{cause:#}"),
                "rule failed"
            );
            ModelError::RuleExecutionFailed {
                path: path.clone(),
                phase,
                descriptor: descriptor.clone(),
                cause,
            }
        })
    }
}
