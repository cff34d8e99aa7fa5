//! Native build conventions expressed as model rules.
//!
//! Three extensions, each applied to a [`model::ModelRegistry`]:
//!
//! - [`NativeComponentRules`]: the `components` container, `buildTypes`,
//!   `buildDir`, and one binary per component and build type.
//! - [`CUnitRules`]: CUnit test suites with generated launcher sources.
//! - [`VisualStudioRules`]: one IDE project per component and test suite.

pub mod component;
pub mod components;
pub mod cunit;
pub mod visual_studio;

pub use crate::component::{
    BinaryKind, CUnitTestSuiteSpec, ComponentKind, ComponentSpec, HasBinaries, HasSources,
    NativeBinarySpec, NativeExecutableSpec, NativeLibrarySpec, SourceSet,
};
pub use crate::components::{BuildTypes, NativeComponentRules};
pub use crate::cunit::{CUnitRules, TaskKind, TaskSpec, Tasks};
pub use crate::visual_studio::{
    ProjectConfiguration, VisualStudioExtension, VisualStudioProject, VisualStudioRules,
};
