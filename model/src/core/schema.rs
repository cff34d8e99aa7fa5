//! Declared subtype relation between model types.
//!
//! Rust has no subtyping between plugin value types, so each configuration
//! run declares the relation explicitly: `S extends G` together with a typed
//! upcast `fn(&S) -> &G`. The relation drives projection specificity,
//! container factory lookup and `with_type` filtering, and the upcasts let a
//! view registered for `S` serve a request for `G` without unchecked casts.

use std::any::Any;
use std::cell::RefCell;
use std::collections::{BTreeSet, VecDeque};
use std::fmt;
use std::rc::Rc;

use tracing::debug;

use crate::core::types::ModelType;
use crate::projection::{Lifted, Source};

/// Converts an erased `Rc<dyn Source<S>>` into an erased `Rc<dyn Source<G>>`.
pub(crate) trait Lift {
    fn lift(&self, source: Box<dyn Any>) -> Option<Box<dyn Any>>;
}

struct Upcast<S: ?Sized, G: ?Sized> {
    up: fn(&S) -> &G,
    up_mut: Option<fn(&mut S) -> &mut G>,
}

impl<S: ?Sized + 'static, G: ?Sized + 'static> Lift for Upcast<S, G> {
    fn lift(&self, source: Box<dyn Any>) -> Option<Box<dyn Any>> {
        let inner = source.downcast::<Rc<dyn Source<S>>>().ok()?;
        let lifted: Rc<dyn Source<G>> = Rc::new(Lifted::new(*inner, self.up, self.up_mut));
        Some(Box::new(lifted))
    }
}

#[derive(Clone)]
struct SchemaEdge {
    sub: ModelType,
    sup: ModelType,
    mutable: bool,
    lift: Rc<dyn Lift>,
}

/// Shared handle to the subtype relation of one registry.
///
/// Cloning the handle shares the relation; declarations made through any
/// clone are visible to all of them.
#[derive(Clone, Default)]
pub struct ModelSchema {
    edges: Rc<RefCell<Vec<SchemaEdge>>>,
}

impl ModelSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare `S` a subtype of `G` with read and mutable upcasts.
    pub fn extends<S, G>(&self, up: fn(&S) -> &G, up_mut: fn(&mut S) -> &mut G) -> &Self
    where
        S: ?Sized + 'static,
        G: ?Sized + 'static,
    {
        self.declare::<S, G>(up, Some(up_mut))
    }

    /// Declare `S` a subtype of `G` that can only be viewed as `G` for reads.
    pub fn extends_read<S, G>(&self, up: fn(&S) -> &G) -> &Self
    where
        S: ?Sized + 'static,
        G: ?Sized + 'static,
    {
        self.declare::<S, G>(up, None)
    }

    fn declare<S, G>(&self, up: fn(&S) -> &G, up_mut: Option<fn(&mut S) -> &mut G>) -> &Self
    where
        S: ?Sized + 'static,
        G: ?Sized + 'static,
    {
        let sub = ModelType::of::<S>();
        let sup = ModelType::of::<G>();
        let mut edges = self.edges.borrow_mut();
        if edges.iter().any(|edge| edge.sub == sub && edge.sup == sup) {
            debug!(sub = %sub, sup = %sup, "subtype already declared");
            return self;
        }
        debug!(sub = %sub, sup = %sup, "declaring subtype");
        edges.push(SchemaEdge {
            sub,
            sup,
            mutable: up_mut.is_some(),
            lift: Rc::new(Upcast { up, up_mut }),
        });
        drop(edges);
        self
    }

    /// Reflexive, transitive subtype check.
    pub fn is_assignable(&self, from: ModelType, to: ModelType) -> bool {
        from == to || self.upcast_chain(from, to, false).is_some()
    }

    /// Direct supertypes of `ty`, in declaration order.
    pub fn supertypes(&self, ty: ModelType) -> Vec<ModelType> {
        self.edges
            .borrow()
            .iter()
            .filter(|edge| edge.sub == ty)
            .map(|edge| edge.sup)
            .collect()
    }

    /// Shortest chain of upcasts from `from` to `to`, breadth first over
    /// edges in declaration order. An empty chain means `from == to`.
    pub(crate) fn upcast_chain(
        &self,
        from: ModelType,
        to: ModelType,
        mutable: bool,
    ) -> Option<Vec<Rc<dyn Lift>>> {
        if from == to {
            return Some(Vec::new());
        }
        let edges = self.edges.borrow();
        let mut seen = BTreeSet::new();
        let mut queue = VecDeque::new();
        seen.insert(from.id());
        queue.push_back((from, Vec::<Rc<dyn Lift>>::new()));
        while let Some((current, chain)) = queue.pop_front() {
            for edge in edges.iter() {
                if edge.sub != current || (mutable && !edge.mutable) {
                    continue;
                }
                let mut next = chain.clone();
                next.push(Rc::clone(&edge.lift));
                if edge.sup == to {
                    return Some(next);
                }
                if seen.insert(edge.sup.id()) {
                    queue.push_back((edge.sup, next));
                }
            }
        }
        None
    }
}

impl fmt::Debug for ModelSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let edges = self.edges.borrow();
        f.debug_list()
            .entries(
                edges
                    .iter()
                    .map(|edge| format!("{} <: {}", edge.sub, edge.sup)),
            )
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    trait Shape {
        fn sides(&self) -> u32;
    }

    struct Square;

    impl Shape for Square {
        fn sides(&self) -> u32 {
            4
        }
    }

    struct Named;

    #[test]
    fn assignability_is_reflexive_and_transitive() {
        let schema = ModelSchema::new();
        schema
            .extends_read::<Square, dyn Shape>(|s| s)
            .extends_read::<Named, Square>(|_| &Square);

        let square = ModelType::of::<Square>();
        let shape = ModelType::of::<dyn Shape>();
        let named = ModelType::of::<Named>();

        assert!(schema.is_assignable(square, square));
        assert!(schema.is_assignable(square, shape));
        assert!(schema.is_assignable(named, shape));
        assert!(!schema.is_assignable(shape, square));
        assert_eq!(schema.supertypes(named), vec![square]);
    }

    #[test]
    fn mutable_chains_skip_read_only_edges() {
        let schema = ModelSchema::new();
        schema.extends_read::<Square, dyn Shape>(|s| s);

        let square = ModelType::of::<Square>();
        let shape = ModelType::of::<dyn Shape>();
        assert!(schema.upcast_chain(square, shape, false).is_some());
        assert!(schema.upcast_chain(square, shape, true).is_none());
    }

    #[test]
    fn clones_share_declarations() {
        let schema = ModelSchema::new();
        let other = schema.clone();
        other.extends::<Square, dyn Shape>(|s| s, |s| s);
        assert!(schema.is_assignable(ModelType::of::<Square>(), ModelType::of::<dyn Shape>()));
        assert_eq!(Square.sides(), 4);
    }
}
