//! The registry facade: the single entry point for extensions and consumers.
//!
//! Extensions register nodes and bind rules; consumers ask for typed views.
//! Realization itself lives in [`crate::scheduler`].

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use tracing::debug;

use crate::container::{ContainerIndex, FilteredElements, PolymorphicContainer};
use crate::core::path::{ModelPath, invalid_segment};
use crate::core::schema::ModelSchema;
use crate::core::types::{ElementCreation, ModelType, NodeState, Phase, RuleDescriptor};
use crate::error::ModelError;
use crate::io::config::RegistryConfig;
use crate::node::Node;
use crate::projection::{ProjectionEntry, View, ViewMut};
use crate::report::ModelReport;
use crate::rule::{CreationRule, RuleBinding, RuleContext, RuleInput};

/// Owns every node of one configuration run.
pub struct ModelRegistry {
    pub(crate) nodes: BTreeMap<ModelPath, Node>,
    pub(crate) stack: Vec<ModelPath>,
    schema: ModelSchema,
    config: RegistryConfig,
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::with_config(RegistryConfig::default())
    }

    pub fn with_config(config: RegistryConfig) -> Self {
        let root = Node::new(ModelPath::root());
        root.set_state(NodeState::Created);
        let mut nodes = BTreeMap::new();
        nodes.insert(ModelPath::root(), root);
        Self {
            nodes,
            stack: Vec::new(),
            schema: ModelSchema::new(),
            config,
        }
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// The subtype relation used for projections and containers.
    pub fn schema(&self) -> &ModelSchema {
        &self.schema
    }

    /// Register the rule that creates the node at `path`.
    pub fn register(&mut self, path: ModelPath, rule: CreationRule) -> Result<(), ModelError> {
        if path.is_root() {
            return Err(ModelError::DuplicateRegistration {
                path,
                existing: RuleDescriptor::new("registry root"),
            });
        }
        if let Some(existing) = self
            .nodes
            .get(&path)
            .and_then(|node| node.creators.first())
        {
            return Err(ModelError::DuplicateRegistration {
                path,
                existing: existing.descriptor().clone(),
            });
        }
        self.ensure_node(&path)?;
        debug!(path = %path, creator = %rule.descriptor(), value = %rule.value_type(), "registering node");
        self.attach_creator(&path, rule)
    }

    /// Bind a rule to its subject. Binding to an unknown path whose parent is
    /// known declares a placeholder node that still needs a creator.
    pub fn bind(&mut self, binding: RuleBinding) -> Result<(), ModelError> {
        let path = binding.subject().clone();
        let phase = binding.phase();
        self.ensure_node(&path)?;
        let node = self.node_mut(&path)?;
        if !node.accepts(phase) {
            return Err(ModelError::FrozenSubject {
                path,
                phase: Some(phase),
                state: node.state(),
            });
        }
        debug!(
            path = %path,
            phase = %phase,
            rule = %binding.descriptor(),
            inputs = binding.inputs().len(),
            "binding rule"
        );
        node.rules.entry(phase).or_default().push(Rc::new(binding));
        Ok(())
    }

    pub fn bind_rule<F>(
        &mut self,
        path: ModelPath,
        phase: Phase,
        inputs: impl IntoIterator<Item = RuleInput>,
        descriptor: impl Into<RuleDescriptor>,
        action: F,
    ) -> Result<(), ModelError>
    where
        F: Fn(&mut RuleContext<'_>) -> anyhow::Result<()> + 'static,
    {
        self.bind(RuleBinding::new(path, phase, descriptor, action).with_inputs(inputs))
    }

    /// Bind a rule whose action mutates the subject viewed as `V`.
    ///
    /// The subject stays mutably borrowed while `f` runs, so reading it again
    /// through the context from inside `f` fails with `BorrowConflict`. A
    /// borrow held by a caller when the rule runs fails the rule the same way.
    pub fn mutate<V, F>(
        &mut self,
        path: ModelPath,
        phase: Phase,
        inputs: impl IntoIterator<Item = RuleInput>,
        descriptor: impl Into<RuleDescriptor>,
        f: F,
    ) -> Result<(), ModelError>
    where
        V: ?Sized + 'static,
        F: Fn(&mut V, &mut RuleContext<'_>) -> anyhow::Result<()> + 'static,
    {
        self.bind_rule(path, phase, inputs, descriptor, move |ctx| {
            let subject = ctx.subject_mut::<V>()?;
            let mut value = subject.borrow_mut()?;
            f(&mut *value, ctx)
        })
    }

    /// Register a read-only view of the node's `T` value as `V`.
    pub fn add_projection<T, V>(&mut self, path: &ModelPath, read: fn(&T) -> &V) -> Result<(), ModelError>
    where
        T: 'static,
        V: ?Sized + 'static,
    {
        let node = self.node_mut(path)?;
        node.projections
            .add(path, ProjectionEntry::read_only::<T, V>(read))?;
        debug!(path = %path, view = %ModelType::of::<V>(), "added read projection");
        Ok(())
    }

    /// Register a read/write view of the node's `T` value as `V`.
    pub fn add_mut_projection<T, V>(
        &mut self,
        path: &ModelPath,
        read: fn(&T) -> &V,
        write: fn(&mut T) -> &mut V,
    ) -> Result<(), ModelError>
    where
        T: 'static,
        V: ?Sized + 'static,
    {
        let node = self.node_mut(path)?;
        node.projections
            .add(path, ProjectionEntry::mutable::<T, V>(read, write))?;
        debug!(path = %path, view = %ModelType::of::<V>(), "added mutable projection");
        Ok(())
    }

    /// Realize `path` for reading and view it as `V`.
    pub fn get<V: ?Sized + 'static>(&mut self, path: &ModelPath) -> Result<View<V>, ModelError> {
        let required = if self.config.close_on_read {
            NodeState::GraphClosed
        } else {
            NodeState::Finalized
        };
        self.realize(path, required)?;
        self.current_view(path)
    }

    /// Realize `path` through its mutate phase and view it mutably as `V`.
    pub fn get_mut<V: ?Sized + 'static>(&mut self, path: &ModelPath) -> Result<ViewMut<V>, ModelError> {
        let state = self.node(path)?.state();
        if !state.is_mutable() {
            return Err(ModelError::ReadOnlyViolation {
                path: path.clone(),
                requested: ModelType::of::<V>().name(),
                state,
            });
        }
        self.realize(path, NodeState::Mutated)?;
        self.current_view_mut(path)
    }

    pub fn state(&self, path: &ModelPath) -> Option<NodeState> {
        self.nodes.get(path).map(Node::state)
    }

    pub fn contains(&self, path: &ModelPath) -> bool {
        self.nodes.contains_key(path)
    }

    /// Direct children of `path`, in name order.
    pub fn children(&self, path: &ModelPath) -> Result<Vec<ModelPath>, ModelError> {
        let node = self.node(path)?;
        Ok(node
            .children
            .iter()
            .map(|name| path.child(name.as_str()))
            .collect())
    }

    /// End the configuration run: bring every node to `graph-closed`.
    pub fn close(&mut self) -> Result<(), ModelError> {
        self.realize(&ModelPath::root(), NodeState::GraphClosed)
    }

    pub fn report(&self) -> ModelReport {
        ModelReport::capture(self)
    }

    /// Register a polymorphic container whose elements are viewed as `E`.
    pub fn register_container<E: ?Sized + 'static>(
        &mut self,
        path: ModelPath,
        descriptor: impl Into<RuleDescriptor>,
    ) -> Result<(), ModelError> {
        let creation = self.config.element_creation;
        self.register_container_with::<E>(path, descriptor, creation)
    }

    /// Like [`Self::register_container`] with an explicit creation policy.
    pub fn register_container_with<E: ?Sized + 'static>(
        &mut self,
        path: ModelPath,
        descriptor: impl Into<RuleDescriptor>,
        creation: ElementCreation,
    ) -> Result<(), ModelError> {
        let index = Rc::new(RefCell::new(ContainerIndex::new(
            path.clone(),
            ModelType::of::<E>(),
            creation,
        )));
        let shared = Rc::clone(&index);
        let schema = self.schema.clone();
        let rule = CreationRule::value(descriptor, move || {
            PolymorphicContainer::new(Rc::clone(&shared), schema.clone())
        });
        self.register(path.clone(), rule)?;
        self.node_mut(&path)?.container = Some(index);
        Ok(())
    }

    /// Register the factory used to create `S` elements of a container.
    pub fn register_factory<S, F>(&mut self, container: &ModelPath, ctor: F) -> Result<(), ModelError>
    where
        S: 'static,
        F: Fn(&str) -> S + 'static,
    {
        let index = self.container_index(container)?;
        let element_type = index.borrow().element_type();
        let actual = ModelType::of::<S>();
        if !self.schema.is_assignable(actual, element_type) {
            return Err(ModelError::IncompatibleType {
                path: container.clone(),
                actual: actual.name(),
                expected: element_type.name(),
            });
        }
        debug!(container = %container, factory = %actual, "registering element factory");
        index.borrow_mut().add_factory(ctor);
        Ok(())
    }

    /// Declare element `name` of type `S` in a container.
    ///
    /// `configure` runs as a create-phase rule on the element, right after its
    /// factory. Returns the element path.
    pub fn create_element<S, F>(
        &mut self,
        container: &ModelPath,
        name: &str,
        configure: F,
    ) -> Result<ModelPath, ModelError>
    where
        S: ?Sized + 'static,
        F: Fn(&mut S, &mut RuleContext<'_>) -> anyhow::Result<()> + 'static,
    {
        let element = container.try_child(name)?;
        let index = self.container_index(container)?;
        if index.borrow().contains(name) {
            return Err(ModelError::DuplicateElement {
                container: container.clone(),
                name: name.to_string(),
            });
        }
        let requested = ModelType::of::<S>();
        let Some((declared, factory)) = index.borrow().factory_for(&self.schema, requested) else {
            return Err(ModelError::UnknownFactory {
                container: container.clone(),
                requested: requested.name(),
            });
        };

        self.ensure_node(&element)?;
        self.attach_creator(&element, factory.rule_for(container, name))?;
        index.borrow_mut().insert(name, declared);
        self.mutate::<S, F>(
            element.clone(),
            Phase::Create,
            [],
            format!("{container} configure {name}"),
            configure,
        )?;
        debug!(container = %container, element = name, declared = %declared, "created element");

        let creation = index.borrow().creation();
        if creation == ElementCreation::Eager {
            self.realize(&element, NodeState::Created)?;
        }
        Ok(element)
    }

    /// Return the element `name`, creating it as `S` if it does not exist yet.
    pub fn maybe_create<S: ?Sized + 'static>(
        &mut self,
        container: &ModelPath,
        name: &str,
    ) -> Result<ModelPath, ModelError> {
        if self.container_index(container)?.borrow().contains(name) {
            return Ok(container.child(name));
        }
        self.create_element::<S, _>(container, name, |_, _| Ok(()))
    }

    /// Lazy view over the elements whose declared type is assignable to `S`.
    pub fn with_type<S: ?Sized + 'static>(
        &self,
        container: &ModelPath,
    ) -> Result<FilteredElements, ModelError> {
        let index = self.container_index(container)?;
        Ok(FilteredElements::new(
            index,
            self.schema.clone(),
            ModelType::of::<S>(),
        ))
    }

    /// Realize every element assignable to `V` and view it as `V`.
    pub fn elements<V: ?Sized + 'static>(
        &mut self,
        container: &ModelPath,
    ) -> Result<Vec<(String, View<V>)>, ModelError> {
        let filtered = self.with_type::<V>(container)?;
        let mut views = Vec::new();
        for element in &filtered {
            let view = self.get::<V>(&element.path)?;
            views.push((element.name, view));
        }
        Ok(views)
    }

    pub(crate) fn node(&self, path: &ModelPath) -> Result<&Node, ModelError> {
        self.nodes
            .get(path)
            .ok_or_else(|| ModelError::UnknownPath { path: path.clone() })
    }

    pub(crate) fn node_mut(&mut self, path: &ModelPath) -> Result<&mut Node, ModelError> {
        self.nodes
            .get_mut(path)
            .ok_or_else(|| ModelError::UnknownPath { path: path.clone() })
    }

    /// View the node as it is now, without realizing it further.
    pub(crate) fn current_view<V: ?Sized + 'static>(
        &self,
        path: &ModelPath,
    ) -> Result<View<V>, ModelError> {
        let node = self.node(path)?;
        let value = node.value.as_ref().ok_or_else(|| ModelError::NoSuchProjection {
            path: path.clone(),
            requested: ModelType::of::<V>().name(),
        })?;
        let source = node
            .projections
            .source::<V>(path, &self.schema, value, false, node.state())?;
        Ok(View::new(path.clone(), Rc::clone(value), source))
    }

    pub(crate) fn current_view_mut<V: ?Sized + 'static>(
        &self,
        path: &ModelPath,
    ) -> Result<ViewMut<V>, ModelError> {
        let node = self.node(path)?;
        let state = node.state();
        let requested = ModelType::of::<V>().name();
        if !state.is_mutable() {
            return Err(ModelError::ReadOnlyViolation {
                path: path.clone(),
                requested,
                state,
            });
        }
        let value = node.value.as_ref().ok_or_else(|| ModelError::NoSuchProjection {
            path: path.clone(),
            requested,
        })?;
        let source = node
            .projections
            .source::<V>(path, &self.schema, value, true, state)?;
        let view = View::new(path.clone(), Rc::clone(value), source);
        Ok(ViewMut::new(view, Rc::clone(&node.state)))
    }

    pub(crate) fn container_index(
        &self,
        path: &ModelPath,
    ) -> Result<Rc<RefCell<ContainerIndex>>, ModelError> {
        self.node(path)?
            .container
            .clone()
            .ok_or_else(|| ModelError::NotAContainer { path: path.clone() })
    }

    /// Make sure a node exists at `path`, declaring a placeholder under a
    /// known, still open parent.
    fn ensure_node(&mut self, path: &ModelPath) -> Result<(), ModelError> {
        if self.nodes.contains_key(path) {
            return Ok(());
        }
        let (Some(parent), Some(name)) = (path.parent(), path.name()) else {
            return Err(ModelError::UnknownPath { path: path.clone() });
        };
        if let Some(reason) = invalid_segment(name) {
            return Err(ModelError::InvalidPath {
                input: path.to_string(),
                reason: reason.to_string(),
            });
        }
        let parent_node = self.node_mut(&parent)?;
        if !parent_node.accepts_children() {
            return Err(ModelError::FrozenSubject {
                path: parent,
                phase: None,
                state: parent_node.state(),
            });
        }
        parent_node.children.insert(name.to_string());
        debug!(path = %path, "declared node");
        self.nodes.insert(path.clone(), Node::new(path.clone()));
        Ok(())
    }

    fn attach_creator(&mut self, path: &ModelPath, rule: CreationRule) -> Result<(), ModelError> {
        let node = self.node_mut(path)?;
        if node.state() >= NodeState::Creating {
            return Err(ModelError::FrozenSubject {
                path: path.clone(),
                phase: Some(Phase::Create),
                state: node.state(),
            });
        }
        let identity = rule.identity();
        if !node.projections.contains(identity.ty(), identity.is_mutable()) {
            node.projections.add(path, identity.clone())?;
        }
        node.creators.push(Rc::new(rule));
        Ok(())
    }
}

impl std::fmt::Debug for ModelRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelRegistry")
            .field("nodes", &self.nodes.len())
            .field("realizing", &self.stack)
            .field("schema", &self.schema)
            .field("config", &self.config)
            .finish()
    }
}
