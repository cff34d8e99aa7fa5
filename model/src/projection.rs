//! Typed views over node values.
//!
//! A node stores its value once, as `Rc<RefCell<T>>` erased to `Rc<dyn Any>`.
//! Projections adapt that value into view types: the identity projection for
//! `T`, and any number of consumer-registered views (`&T -> &V`). Requests are
//! resolved against the registered views through the [`ModelSchema`], picking
//! the most specific candidate and upcasting it to the requested type.

use std::any::Any;
use std::cell::{BorrowError, BorrowMutError, Cell, Ref, RefCell, RefMut};
use std::fmt;
use std::rc::Rc;

use crate::core::path::ModelPath;
use crate::core::schema::ModelSchema;
use crate::core::types::{ModelType, NodeState};
use crate::error::ModelError;

/// Borrowable source of a `V` view.
///
/// Borrows never panic: a conflicting borrow is an `Err`, and `write`
/// returns `Ok(None)` when the adapter has no mutable form.
pub(crate) trait Source<V: ?Sized> {
    fn read(&self) -> Result<Ref<'_, V>, BorrowError>;
    fn write(&self) -> Result<Option<RefMut<'_, V>>, BorrowMutError>;
}

struct Direct<T, V: ?Sized> {
    cell: Rc<RefCell<T>>,
    read: fn(&T) -> &V,
    write: Option<fn(&mut T) -> &mut V>,
}

impl<T, V: ?Sized> Source<V> for Direct<T, V> {
    fn read(&self) -> Result<Ref<'_, V>, BorrowError> {
        self.cell.try_borrow().map(|value| Ref::map(value, self.read))
    }

    fn write(&self) -> Result<Option<RefMut<'_, V>>, BorrowMutError> {
        let Some(write) = self.write else {
            return Ok(None);
        };
        self.cell
            .try_borrow_mut()
            .map(|value| Some(RefMut::map(value, write)))
    }
}

/// A view reached through a declared upcast.
pub(crate) struct Lifted<S: ?Sized, G: ?Sized> {
    inner: Rc<dyn Source<S>>,
    up: fn(&S) -> &G,
    up_mut: Option<fn(&mut S) -> &mut G>,
}

impl<S: ?Sized, G: ?Sized> Lifted<S, G> {
    pub(crate) fn new(
        inner: Rc<dyn Source<S>>,
        up: fn(&S) -> &G,
        up_mut: Option<fn(&mut S) -> &mut G>,
    ) -> Self {
        Self { inner, up, up_mut }
    }
}

impl<S: ?Sized, G: ?Sized> Source<G> for Lifted<S, G> {
    fn read(&self) -> Result<Ref<'_, G>, BorrowError> {
        self.inner.read().map(|inner| Ref::map(inner, self.up))
    }

    fn write(&self) -> Result<Option<RefMut<'_, G>>, BorrowMutError> {
        let Some(up_mut) = self.up_mut else {
            return Ok(None);
        };
        Ok(self
            .inner
            .write()?
            .map(|inner| RefMut::map(inner, up_mut)))
    }
}

type MakeSource = Rc<dyn Fn(&Rc<dyn Any>) -> Option<Box<dyn Any>>>;

/// One registered adapter: value type `T` viewed as `ty`.
#[derive(Clone)]
pub(crate) struct ProjectionEntry {
    ty: ModelType,
    mutable: bool,
    make: MakeSource,
}

impl ProjectionEntry {
    pub(crate) fn read_only<T: 'static, V: ?Sized + 'static>(read: fn(&T) -> &V) -> Self {
        Self::new(read, None)
    }

    pub(crate) fn mutable<T: 'static, V: ?Sized + 'static>(
        read: fn(&T) -> &V,
        write: fn(&mut T) -> &mut V,
    ) -> Self {
        Self::new(read, Some(write))
    }

    fn new<T: 'static, V: ?Sized + 'static>(
        read: fn(&T) -> &V,
        write: Option<fn(&mut T) -> &mut V>,
    ) -> Self {
        let make: MakeSource = Rc::new(move |value: &Rc<dyn Any>| {
            let cell = Rc::clone(value).downcast::<RefCell<T>>().ok()?;
            let source: Rc<dyn Source<V>> = Rc::new(Direct { cell, read, write });
            Some(Box::new(source) as Box<dyn Any>)
        });
        Self {
            ty: ModelType::of::<V>(),
            mutable: write.is_some(),
            make,
        }
    }

    pub(crate) fn identity<T: 'static>() -> Self {
        Self::mutable::<T, T>(|value| value, |value| value)
    }

    pub(crate) fn ty(&self) -> ModelType {
        self.ty
    }

    pub(crate) fn is_mutable(&self) -> bool {
        self.mutable
    }
}

/// The projections registered on one node.
#[derive(Clone, Default)]
pub(crate) struct Projections {
    entries: Vec<ProjectionEntry>,
}

impl Projections {
    pub(crate) fn add(&mut self, path: &ModelPath, entry: ProjectionEntry) -> Result<(), ModelError> {
        if self.contains(entry.ty, entry.mutable) {
            return Err(ModelError::DuplicateProjection {
                path: path.clone(),
                view: entry.ty.name(),
                mutable: entry.mutable,
            });
        }
        self.entries.push(entry);
        Ok(())
    }

    pub(crate) fn contains(&self, ty: ModelType, mutable: bool) -> bool {
        self.entries
            .iter()
            .any(|entry| entry.ty == ty && entry.mutable == mutable)
    }

    /// Distinct view types, in registration order.
    pub(crate) fn types(&self) -> Vec<ModelType> {
        let mut types: Vec<ModelType> = Vec::new();
        for entry in &self.entries {
            if !types.contains(&entry.ty) {
                types.push(entry.ty);
            }
        }
        types
    }

    /// Pick the adapter serving a request for `requested`.
    ///
    /// Candidates are adapters whose type is assignable to the request; the
    /// winner must be assignable to every other candidate.
    fn resolve(
        &self,
        path: &ModelPath,
        schema: &ModelSchema,
        requested: ModelType,
        mutable: bool,
        state: NodeState,
    ) -> Result<&ProjectionEntry, ModelError> {
        let matching: Vec<&ProjectionEntry> = self
            .entries
            .iter()
            .filter(|entry| schema.is_assignable(entry.ty, requested))
            .collect();
        if matching.is_empty() {
            return Err(ModelError::NoSuchProjection {
                path: path.clone(),
                requested: requested.name(),
            });
        }

        let candidates: Vec<&ProjectionEntry> = if mutable {
            matching
                .into_iter()
                .filter(|entry| {
                    entry.mutable && schema.upcast_chain(entry.ty, requested, true).is_some()
                })
                .collect()
        } else {
            matching
        };
        if candidates.is_empty() {
            return Err(ModelError::ReadOnlyViolation {
                path: path.clone(),
                requested: requested.name(),
                state,
            });
        }

        let most_specific = candidates.iter().find(|candidate| {
            candidates
                .iter()
                .all(|other| schema.is_assignable(candidate.ty, other.ty))
        });
        match most_specific {
            Some(entry) => Ok(*entry),
            None => {
                let mut names: Vec<&'static str> = Vec::new();
                for candidate in &candidates {
                    if !names.contains(&candidate.ty.name()) {
                        names.push(candidate.ty.name());
                    }
                }
                Err(ModelError::AmbiguousProjection {
                    path: path.clone(),
                    requested: requested.name(),
                    candidates: names,
                })
            }
        }
    }

    /// Build a `V` source over `value`.
    pub(crate) fn source<V: ?Sized + 'static>(
        &self,
        path: &ModelPath,
        schema: &ModelSchema,
        value: &Rc<dyn Any>,
        mutable: bool,
        state: NodeState,
    ) -> Result<Rc<dyn Source<V>>, ModelError> {
        let requested = ModelType::of::<V>();
        let entry = self.resolve(path, schema, requested, mutable, state)?;
        let no_projection = || ModelError::NoSuchProjection {
            path: path.clone(),
            requested: requested.name(),
        };
        let chain = schema
            .upcast_chain(entry.ty, requested, mutable)
            .ok_or_else(no_projection)?;
        let mut erased = (entry.make)(value).ok_or_else(no_projection)?;
        for lift in chain {
            erased = lift.lift(erased).ok_or_else(no_projection)?;
        }
        erased
            .downcast::<Rc<dyn Source<V>>>()
            .map(|source| *source)
            .map_err(|_| no_projection())
    }
}

/// Read view of a node's value as `V`.
pub struct View<V: ?Sized + 'static> {
    path: ModelPath,
    value: Rc<dyn Any>,
    source: Rc<dyn Source<V>>,
}

impl<V: ?Sized + 'static> View<V> {
    pub(crate) fn new(path: ModelPath, value: Rc<dyn Any>, source: Rc<dyn Source<V>>) -> Self {
        Self {
            path,
            value,
            source,
        }
    }

    pub fn path(&self) -> &ModelPath {
        &self.path
    }

    /// Borrow the viewed value.
    ///
    /// Panics if the value is mutably borrowed elsewhere; see
    /// [`Self::try_borrow`].
    pub fn borrow(&self) -> Ref<'_, V> {
        match self.try_borrow() {
            Ok(value) => value,
            Err(err) => panic!("{err}"),
        }
    }

    /// Borrow the viewed value, failing with `BorrowConflict` while a
    /// mutable borrow of it is alive.
    pub fn try_borrow(&self) -> Result<Ref<'_, V>, ModelError> {
        self.source.read().map_err(|_| self.conflict())
    }

    fn conflict(&self) -> ModelError {
        ModelError::BorrowConflict {
            path: self.path.clone(),
            requested: ModelType::of::<V>().name(),
        }
    }

    /// True if both views adapt the same backing value.
    pub fn same_value<U: ?Sized + 'static>(&self, other: &View<U>) -> bool {
        Rc::ptr_eq(&self.value, &other.value)
    }
}

impl<V: ?Sized + 'static> Clone for View<V> {
    fn clone(&self) -> Self {
        Self {
            path: self.path.clone(),
            value: Rc::clone(&self.value),
            source: Rc::clone(&self.source),
        }
    }
}

impl<V: ?Sized + 'static> fmt::Debug for View<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("View")
            .field("path", &self.path)
            .field("type", &ModelType::of::<V>().name())
            .finish()
    }
}

/// Mutable view of a node's value as `V`.
///
/// Mutation is re-checked against the node's live state, so a view obtained
/// before the node finalized cannot change it afterwards.
pub struct ViewMut<V: ?Sized + 'static> {
    view: View<V>,
    state: Rc<Cell<NodeState>>,
}

impl<V: ?Sized + 'static> ViewMut<V> {
    pub(crate) fn new(view: View<V>, state: Rc<Cell<NodeState>>) -> Self {
        Self { view, state }
    }

    pub fn path(&self) -> &ModelPath {
        self.view.path()
    }

    pub fn borrow(&self) -> Ref<'_, V> {
        self.view.borrow()
    }

    pub fn try_borrow(&self) -> Result<Ref<'_, V>, ModelError> {
        self.view.try_borrow()
    }

    /// Mutably borrow the value. Fails with `ReadOnlyViolation` once the node
    /// is finalized and with `BorrowConflict` while another borrow is alive.
    pub fn borrow_mut(&self) -> Result<RefMut<'_, V>, ModelError> {
        let state = self.state.get();
        let violation = || ModelError::ReadOnlyViolation {
            path: self.view.path.clone(),
            requested: ModelType::of::<V>().name(),
            state,
        };
        if !state.is_mutable() {
            return Err(violation());
        }
        match self.view.source.write() {
            Ok(Some(value)) => Ok(value),
            Ok(None) => Err(violation()),
            Err(_) => Err(self.view.conflict()),
        }
    }

    /// Downgrade to a read view over the same value.
    pub fn view(&self) -> View<V> {
        self.view.clone()
    }
}

impl<V: ?Sized + 'static> fmt::Debug for ViewMut<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ViewMut")
            .field("path", &self.view.path)
            .field("type", &ModelType::of::<V>().name())
            .field("state", &self.state.get())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default)]
    struct Library {
        name: String,
        sources: Vec<String>,
    }

    trait Component {
        fn name(&self) -> &str;
    }

    impl Component for Library {
        fn name(&self) -> &str {
            &self.name
        }
    }

    struct Unrelated;

    fn value_of<T: 'static>(value: T) -> Rc<dyn Any> {
        Rc::new(RefCell::new(value))
    }

    fn path() -> ModelPath {
        ModelPath::parse("components.lib").expect("path")
    }

    #[test]
    fn identity_projection_reads_and_writes() {
        let mut projections = Projections::default();
        projections
            .add(&path(), ProjectionEntry::identity::<Library>())
            .expect("add");
        let value = value_of(Library::default());
        let schema = ModelSchema::new();

        let source = projections
            .source::<Library>(&path(), &schema, &value, true, NodeState::Created)
            .expect("source");
        source
            .write()
            .expect("not borrowed")
            .expect("writable")
            .name = "core".to_string();
        assert_eq!(source.read().expect("not borrowed").name, "core");
    }

    #[test]
    fn field_projection_narrows_value() {
        let mut projections = Projections::default();
        projections
            .add(
                &path(),
                ProjectionEntry::mutable::<Library, Vec<String>>(
                    |lib| &lib.sources,
                    |lib| &mut lib.sources,
                ),
            )
            .expect("add");
        let value = value_of(Library::default());
        let schema = ModelSchema::new();

        let source = projections
            .source::<Vec<String>>(&path(), &schema, &value, true, NodeState::Created)
            .expect("source");
        source
            .write()
            .expect("not borrowed")
            .expect("writable")
            .push("main.c".to_string());
        let lib = Rc::clone(&value).downcast::<RefCell<Library>>().expect("library");
        assert_eq!(lib.borrow().sources, vec!["main.c".to_string()]);
    }

    #[test]
    fn request_for_supertype_is_upcast_from_registered_subtype() {
        let mut projections = Projections::default();
        projections
            .add(&path(), ProjectionEntry::identity::<Library>())
            .expect("add");
        let schema = ModelSchema::new();
        schema.extends::<Library, dyn Component>(|lib| lib, |lib| lib);
        let value = value_of(Library {
            name: "core".to_string(),
            sources: Vec::new(),
        });

        let source = projections
            .source::<dyn Component>(&path(), &schema, &value, false, NodeState::Created)
            .expect("source");
        assert_eq!(source.read().expect("not borrowed").name(), "core");
    }

    #[test]
    fn unrelated_request_has_no_projection() {
        let mut projections = Projections::default();
        projections
            .add(&path(), ProjectionEntry::identity::<Library>())
            .expect("add");
        let value = value_of(Library::default());
        let err = projections
            .source::<Unrelated>(&path(), &ModelSchema::new(), &value, false, NodeState::Created)
            .err()
            .expect("no projection");
        assert!(matches!(err, ModelError::NoSuchProjection { .. }));
    }

    #[test]
    fn read_only_adapter_rejects_mutable_request() {
        let mut projections = Projections::default();
        projections
            .add(
                &path(),
                ProjectionEntry::read_only::<Library, str>(|lib| lib.name.as_str()),
            )
            .expect("add");
        let value = value_of(Library::default());
        let err = projections
            .source::<str>(&path(), &ModelSchema::new(), &value, true, NodeState::Created)
            .err()
            .expect("read only");
        assert!(matches!(err, ModelError::ReadOnlyViolation { .. }));
    }

    #[test]
    fn conflicting_borrows_are_errors() {
        let mut projections = Projections::default();
        projections
            .add(&path(), ProjectionEntry::identity::<Library>())
            .expect("add");
        let value = value_of(Library::default());
        let schema = ModelSchema::new();
        let source = projections
            .source::<Library>(&path(), &schema, &value, true, NodeState::Created)
            .expect("source");
        let view = View::new(path(), Rc::clone(&value), Rc::clone(&source));
        let writer = ViewMut::new(view.clone(), Rc::new(Cell::new(NodeState::Created)));

        let held = view.try_borrow().expect("first read");
        assert!(matches!(
            writer.borrow_mut(),
            Err(ModelError::BorrowConflict { .. })
        ));
        drop(held);

        let write = writer.borrow_mut().expect("free again");
        assert!(matches!(view.try_borrow(), Err(ModelError::BorrowConflict { .. })));
        drop(write);
        assert!(view.try_borrow().is_ok());
    }

    #[test]
    fn duplicate_adapter_for_same_mutability_is_rejected() {
        let mut projections = Projections::default();
        projections
            .add(&path(), ProjectionEntry::identity::<Library>())
            .expect("add");
        let err = projections
            .add(&path(), ProjectionEntry::identity::<Library>())
            .expect_err("duplicate");
        assert!(matches!(err, ModelError::DuplicateProjection { mutable: true, .. }));
        projections
            .add(
                &path(),
                ProjectionEntry::read_only::<Library, Library>(|lib| lib),
            )
            .expect("read adapter alongside mutable one");
        assert_eq!(projections.types(), vec![ModelType::of::<Library>()]);
    }
}
