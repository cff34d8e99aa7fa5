//! Polymorphic containers: named collections whose element types come from a
//! per-subtype factory table.
//!
//! The index (factories and element names) lives beside the node rather than
//! inside its value, so elements can be declared while the container value is
//! borrowed by a rule. Element values are child nodes of the container.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use crate::core::path::ModelPath;
use crate::core::schema::ModelSchema;
use crate::core::types::{ElementCreation, ModelType};
use crate::rule::CreationRule;

type Factory = Rc<dyn Fn(&ModelPath, &str) -> CreationRule>;

pub(crate) struct ContainerIndex {
    path: ModelPath,
    element_type: ModelType,
    creation: ElementCreation,
    factories: Vec<(ModelType, Factory)>,
    elements: BTreeMap<String, ModelType>,
}

impl ContainerIndex {
    pub(crate) fn new(path: ModelPath, element_type: ModelType, creation: ElementCreation) -> Self {
        Self {
            path,
            element_type,
            creation,
            factories: Vec::new(),
            elements: BTreeMap::new(),
        }
    }

    pub(crate) fn element_type(&self) -> ModelType {
        self.element_type
    }

    pub(crate) fn creation(&self) -> ElementCreation {
        self.creation
    }

    pub(crate) fn contains(&self, name: &str) -> bool {
        self.elements.contains_key(name)
    }

    pub(crate) fn elements(&self) -> &BTreeMap<String, ModelType> {
        &self.elements
    }

    /// Register `ctor` as the factory for `S`. A later factory for the same
    /// type replaces the earlier one.
    pub(crate) fn add_factory<S, F>(&mut self, ctor: F)
    where
        S: 'static,
        F: Fn(&str) -> S + 'static,
    {
        let ty = ModelType::of::<S>();
        let ctor = Rc::new(ctor);
        let factory: Factory = Rc::new(move |container: &ModelPath, name: &str| {
            let ctor = Rc::clone(&ctor);
            let element = name.to_string();
            CreationRule::value(format!("{container} factory for {}", ty.name()), move || {
                ctor(element.as_str())
            })
        });
        self.factories.retain(|(existing, _)| *existing != ty);
        self.factories.push((ty, factory));
    }

    /// Find the factory for `requested`: an exact match, else the first
    /// registered factory whose type is a declared subtype of `requested`.
    pub(crate) fn factory_for(
        &self,
        schema: &ModelSchema,
        requested: ModelType,
    ) -> Option<(ModelType, CreationRuleFactory)> {
        let exact = self.factories.iter().find(|(ty, _)| *ty == requested);
        let found = exact.or_else(|| {
            self.factories
                .iter()
                .find(|(ty, _)| schema.is_assignable(*ty, requested))
        })?;
        Some((found.0, CreationRuleFactory(Rc::clone(&found.1))))
    }

    pub(crate) fn insert(&mut self, name: &str, declared: ModelType) {
        self.elements.insert(name.to_string(), declared);
    }

    pub(crate) fn creatable_types(&self) -> Vec<ModelType> {
        self.factories.iter().map(|(ty, _)| *ty).collect()
    }
}

/// Handle to a factory, detached from the index borrow.
pub(crate) struct CreationRuleFactory(Factory);

impl CreationRuleFactory {
    pub(crate) fn rule_for(&self, container: &ModelPath, name: &str) -> CreationRule {
        (self.0)(container, name)
    }
}

/// Value held by a container node.
///
/// Read-only window onto the container's index; elements are created through
/// the registry (`ModelRegistry::create_element`) because they become nodes.
#[derive(Clone)]
pub struct PolymorphicContainer {
    index: Rc<RefCell<ContainerIndex>>,
    schema: ModelSchema,
}

impl PolymorphicContainer {
    pub(crate) fn new(index: Rc<RefCell<ContainerIndex>>, schema: ModelSchema) -> Self {
        Self { index, schema }
    }

    pub fn path(&self) -> ModelPath {
        self.index.borrow().path.clone()
    }

    pub fn element_type(&self) -> ModelType {
        self.index.borrow().element_type
    }

    /// Element names in lexicographic order.
    pub fn names(&self) -> Vec<String> {
        self.index.borrow().elements.keys().cloned().collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.borrow().contains(name)
    }

    pub fn len(&self) -> usize {
        self.index.borrow().elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.borrow().elements.is_empty()
    }

    pub fn creatable_types(&self) -> Vec<ModelType> {
        self.index.borrow().creatable_types()
    }

    /// Elements whose declared type is assignable to `S`.
    pub fn with_type<S: ?Sized + 'static>(&self) -> FilteredElements {
        FilteredElements {
            index: Rc::clone(&self.index),
            schema: self.schema.clone(),
            filter: ModelType::of::<S>(),
        }
    }
}

impl std::fmt::Debug for PolymorphicContainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let index = self.index.borrow();
        f.debug_struct("PolymorphicContainer")
            .field("path", &index.path)
            .field("element_type", &index.element_type.name())
            .field("elements", &index.elements.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// One element of a container as seen by a filtered traversal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementRef {
    pub name: String,
    pub path: ModelPath,
    pub declared: ModelType,
}

/// Lazy, read-only filtered view of a container's elements.
///
/// Nothing is cached: each `iter()` takes a snapshot of the elements present
/// at that moment, so elements added afterwards show up in the next
/// traversal but not in one already started.
#[derive(Clone)]
pub struct FilteredElements {
    index: Rc<RefCell<ContainerIndex>>,
    schema: ModelSchema,
    filter: ModelType,
}

impl FilteredElements {
    pub(crate) fn new(
        index: Rc<RefCell<ContainerIndex>>,
        schema: ModelSchema,
        filter: ModelType,
    ) -> Self {
        Self {
            index,
            schema,
            filter,
        }
    }

    pub fn filter_type(&self) -> ModelType {
        self.filter
    }

    pub fn iter(&self) -> std::vec::IntoIter<ElementRef> {
        let index = self.index.borrow();
        index
            .elements
            .iter()
            .filter(|(_, declared)| self.schema.is_assignable(**declared, self.filter))
            .map(|(name, declared)| ElementRef {
                name: name.clone(),
                path: index.path.child(name.as_str()),
                declared: *declared,
            })
            .collect::<Vec<_>>()
            .into_iter()
    }

    pub fn names(&self) -> Vec<String> {
        self.iter().map(|element| element.name).collect()
    }

    pub fn len(&self) -> usize {
        self.iter().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl IntoIterator for &FilteredElements {
    type Item = ElementRef;
    type IntoIter = std::vec::IntoIter<ElementRef>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    trait Suite {}

    struct CUnit;
    impl Suite for CUnit {}

    struct GoogleTest;
    impl Suite for GoogleTest {}

    fn index() -> Rc<RefCell<ContainerIndex>> {
        Rc::new(RefCell::new(ContainerIndex::new(
            ModelPath::parse("suites").expect("path"),
            ModelType::of::<dyn Suite>(),
            ElementCreation::Lazy,
        )))
    }

    fn schema() -> ModelSchema {
        let schema = ModelSchema::new();
        schema
            .extends::<CUnit, dyn Suite>(|s| s, |s| s)
            .extends::<GoogleTest, dyn Suite>(|s| s, |s| s);
        schema
    }

    #[test]
    fn factory_lookup_prefers_exact_then_subtype() {
        let index = index();
        let schema = schema();
        index.borrow_mut().add_factory(|_| CUnit);

        let (exact, _) = index
            .borrow()
            .factory_for(&schema, ModelType::of::<CUnit>())
            .expect("exact");
        assert_eq!(exact, ModelType::of::<CUnit>());

        let (sub, _) = index
            .borrow()
            .factory_for(&schema, ModelType::of::<dyn Suite>())
            .expect("subtype");
        assert_eq!(sub, ModelType::of::<CUnit>());

        assert!(
            index
                .borrow()
                .factory_for(&schema, ModelType::of::<GoogleTest>())
                .is_none()
        );
    }

    #[test]
    fn filtered_view_snapshots_at_iteration_start() {
        let index = index();
        let container = PolymorphicContainer::new(Rc::clone(&index), schema());
        index.borrow_mut().insert("a", ModelType::of::<CUnit>());
        index.borrow_mut().insert("b", ModelType::of::<GoogleTest>());

        let cunit = container.with_type::<CUnit>();
        let all = container.with_type::<dyn Suite>();
        assert_eq!(cunit.names(), vec!["a".to_string()]);
        assert_eq!(all.len(), 2);

        let mut started = all.iter();
        index.borrow_mut().insert("c", ModelType::of::<CUnit>());
        assert_eq!(started.by_ref().count(), 2);
        assert_eq!(all.len(), 3);
        assert_eq!(cunit.names(), vec!["a".to_string(), "c".to_string()]);
    }

    #[test]
    fn element_refs_carry_child_paths() {
        let index = index();
        index.borrow_mut().insert("unit1", ModelType::of::<CUnit>());
        let filtered = FilteredElements::new(index, schema(), ModelType::of::<CUnit>());
        let element = filtered.iter().next().expect("element");
        assert_eq!(element.path.to_string(), "suites.unit1");
        assert_eq!(element.declared, ModelType::of::<CUnit>());
    }
}
