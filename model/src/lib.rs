//! Declarative configuration model.
//!
//! A tree of addressable nodes, each lazily realized into a value of a
//! plugin-defined type and shaped by rules contributed by independent
//! extensions. Rules run in a fixed phase order (create, defaults, mutate,
//! finalize) no matter in which order they were bound, and a rule's declared
//! inputs are realized before its subject.
//!
//! - **[`core`]**: pure building blocks (paths, states, the subtype schema,
//!   snapshot invariants).
//! - **[`registry`]** and **[`scheduler`]**: registration, binding and
//!   realization.
//! - **[`projection`]** and **[`container`]**: typed views over node values
//!   and polymorphic element collections.
//! - **[`io`]**: configuration files.

pub mod container;
pub mod core;
pub mod error;
pub mod io;
pub mod logging;
mod node;
pub mod projection;
pub mod registry;
pub mod report;
pub mod rule;
pub mod scheduler;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use crate::container::{ElementRef, FilteredElements, PolymorphicContainer};
pub use crate::core::path::ModelPath;
pub use crate::core::schema::ModelSchema;
pub use crate::core::types::{ElementCreation, ModelType, NodeState, Phase, RuleDescriptor};
pub use crate::error::ModelError;
pub use crate::io::config::RegistryConfig;
pub use crate::projection::{View, ViewMut};
pub use crate::registry::ModelRegistry;
pub use crate::report::{ModelReport, NodeReport};
pub use crate::rule::{CreationRule, RuleBinding, RuleContext, RuleInput};
