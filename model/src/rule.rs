//! Rule bindings, creation rules and the context rules execute in.

use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::core::path::ModelPath;
use crate::core::types::{ModelType, NodeState, Phase, RuleDescriptor};
use crate::error::ModelError;
use crate::projection::{ProjectionEntry, View, ViewMut};
use crate::registry::ModelRegistry;

type Action = Box<dyn Fn(&mut RuleContext<'_>) -> anyhow::Result<()>>;
type Create = Box<dyn Fn(&mut RuleContext<'_>) -> anyhow::Result<Rc<dyn Any>>>;

/// A path a rule reads, and the state it must reach before the rule runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleInput {
    pub path: ModelPath,
    pub state: NodeState,
}

impl RuleInput {
    /// Input realized to `GraphClosed` (the default for read inputs).
    pub fn closed(path: ModelPath) -> Self {
        Self {
            path,
            state: NodeState::GraphClosed,
        }
    }

    pub fn at(path: ModelPath, state: NodeState) -> Self {
        Self { path, state }
    }
}

impl From<ModelPath> for RuleInput {
    fn from(path: ModelPath) -> Self {
        Self::closed(path)
    }
}

impl From<&ModelPath> for RuleInput {
    fn from(path: &ModelPath) -> Self {
        Self::closed(path.clone())
    }
}

/// An immutable rule bound to a subject path for one phase.
pub struct RuleBinding {
    subject: ModelPath,
    phase: Phase,
    inputs: Vec<RuleInput>,
    descriptor: RuleDescriptor,
    action: Action,
}

impl RuleBinding {
    pub fn new<F>(
        subject: ModelPath,
        phase: Phase,
        descriptor: impl Into<RuleDescriptor>,
        action: F,
    ) -> Self
    where
        F: Fn(&mut RuleContext<'_>) -> anyhow::Result<()> + 'static,
    {
        Self {
            subject,
            phase,
            inputs: Vec::new(),
            descriptor: descriptor.into(),
            action: Box::new(action),
        }
    }

    pub fn with_input(mut self, input: impl Into<RuleInput>) -> Self {
        self.inputs.push(input.into());
        self
    }

    pub fn with_inputs<I>(mut self, inputs: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<RuleInput>,
    {
        self.inputs.extend(inputs.into_iter().map(Into::into));
        self
    }

    pub fn subject(&self) -> &ModelPath {
        &self.subject
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn inputs(&self) -> &[RuleInput] {
        &self.inputs
    }

    pub fn descriptor(&self) -> &RuleDescriptor {
        &self.descriptor
    }

    pub(crate) fn run(&self, ctx: &mut RuleContext<'_>) -> anyhow::Result<()> {
        (self.action)(ctx)
    }
}

impl fmt::Debug for RuleBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuleBinding")
            .field("subject", &self.subject)
            .field("phase", &self.phase)
            .field("inputs", &self.inputs)
            .field("descriptor", &self.descriptor)
            .finish_non_exhaustive()
    }
}

/// The rule that produces a node's value.
///
/// Installs the identity projection for the created type when registered.
pub struct CreationRule {
    descriptor: RuleDescriptor,
    inputs: Vec<RuleInput>,
    ty: ModelType,
    identity: ProjectionEntry,
    create: Create,
}

impl CreationRule {
    pub fn new<T, F>(descriptor: impl Into<RuleDescriptor>, create: F) -> Self
    where
        T: 'static,
        F: Fn(&mut RuleContext<'_>) -> anyhow::Result<T> + 'static,
    {
        Self {
            descriptor: descriptor.into(),
            inputs: Vec::new(),
            ty: ModelType::of::<T>(),
            identity: ProjectionEntry::identity::<T>(),
            create: erase(move |ctx| {
                let value = create(ctx)?;
                Ok(Rc::new(RefCell::new(value)) as Rc<dyn Any>)
            }),
        }
    }

    /// Creation rule for a value that needs no inputs.
    pub fn value<T, F>(descriptor: impl Into<RuleDescriptor>, make: F) -> Self
    where
        T: 'static,
        F: Fn() -> T + 'static,
    {
        Self::new(descriptor, move |_| Ok(make()))
    }

    pub fn with_input(mut self, input: impl Into<RuleInput>) -> Self {
        self.inputs.push(input.into());
        self
    }

    pub fn descriptor(&self) -> &RuleDescriptor {
        &self.descriptor
    }

    pub fn inputs(&self) -> &[RuleInput] {
        &self.inputs
    }

    pub fn value_type(&self) -> ModelType {
        self.ty
    }

    pub(crate) fn identity(&self) -> &ProjectionEntry {
        &self.identity
    }

    pub(crate) fn create(&self, ctx: &mut RuleContext<'_>) -> anyhow::Result<Rc<dyn Any>> {
        (self.create)(ctx)
    }
}

fn erase<F>(create: F) -> Create
where
    F: Fn(&mut RuleContext<'_>) -> anyhow::Result<Rc<dyn Any>> + 'static,
{
    Box::new(create)
}

impl fmt::Debug for CreationRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CreationRule")
            .field("descriptor", &self.descriptor)
            .field("type", &self.ty.name())
            .field("inputs", &self.inputs)
            .finish_non_exhaustive()
    }
}

/// What a running rule can see and do.
///
/// The context borrows the registry mutably, so a rule may register nodes,
/// bind further rules and create container elements while it runs.
pub struct RuleContext<'a> {
    registry: &'a mut ModelRegistry,
    path: ModelPath,
    phase: Phase,
    descriptor: RuleDescriptor,
}

impl<'a> RuleContext<'a> {
    pub(crate) fn new(
        registry: &'a mut ModelRegistry,
        path: ModelPath,
        phase: Phase,
        descriptor: RuleDescriptor,
    ) -> Self {
        Self {
            registry,
            path,
            phase,
            descriptor,
        }
    }

    /// The subject path of the running rule.
    pub fn path(&self) -> &ModelPath {
        &self.path
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn descriptor(&self) -> &RuleDescriptor {
        &self.descriptor
    }

    /// Read the subject as it is now, without advancing it.
    pub fn subject<V: ?Sized + 'static>(&self) -> Result<View<V>, ModelError> {
        self.registry.current_view::<V>(&self.path)
    }

    pub fn subject_mut<V: ?Sized + 'static>(&self) -> Result<ViewMut<V>, ModelError> {
        self.registry.current_view_mut::<V>(&self.path)
    }

    /// Realize `path` for reading and view it as `V`.
    pub fn input<V: ?Sized + 'static>(&mut self, path: &ModelPath) -> Result<View<V>, ModelError> {
        self.registry.get::<V>(path)
    }

    pub fn registry(&mut self) -> &mut ModelRegistry {
        &mut *self.registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binding_collects_inputs_in_order() {
        let a = ModelPath::parse("a").expect("path");
        let b = ModelPath::parse("b").expect("path");
        let binding = RuleBinding::new(a.clone(), Phase::Mutate, "test", |_| Ok(()))
            .with_input(&b)
            .with_inputs([RuleInput::at(a.clone(), NodeState::Created)]);

        assert_eq!(binding.subject(), &a);
        assert_eq!(binding.phase(), Phase::Mutate);
        assert_eq!(
            binding.inputs(),
            &[
                RuleInput::closed(b),
                RuleInput::at(a, NodeState::Created)
            ]
        );
        assert_eq!(binding.descriptor().as_str(), "test");
    }

    #[test]
    fn creation_rule_records_value_type() {
        let rule = CreationRule::value("numbers", Vec::<u32>::new);
        assert_eq!(rule.value_type(), ModelType::of::<Vec<u32>>());
        assert!(rule.inputs().is_empty());
        assert!(format!("{rule:?}").contains("numbers"));
    }
}
