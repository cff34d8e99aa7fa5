//! Deterministic, pure building blocks of the model.
//!
//! Nothing in here touches the filesystem or the registry's mutable state;
//! everything operates on values and returns deterministic results.

pub mod invariants;
pub mod path;
pub mod schema;
pub mod types;
