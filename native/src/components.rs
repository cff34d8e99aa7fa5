//! Base native rules: the `components` container, build types and binaries.

use model::{
    CreationRule, ModelError, ModelPath, ModelRegistry, Phase, RuleContext, RuleInput,
};
use serde::Serialize;
use tracing::debug;

use crate::component::{
    ComponentSpec, HasBinaries, NativeBinarySpec, NativeExecutableSpec, NativeLibrarySpec,
    declare_types,
};

pub const COMPONENTS: &str = "components";
pub const BUILD_TYPES: &str = "buildTypes";
pub const BUILD_DIR: &str = "buildDir";

/// Top-level node path for one of the names above.
pub fn top(name: &str) -> ModelPath {
    ModelPath::root().child(name)
}

/// Build types binaries are produced for, in declaration order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildTypes(pub Vec<String>);

impl Default for BuildTypes {
    fn default() -> Self {
        Self(vec!["debug".to_string(), "release".to_string()])
    }
}

/// Rules every native build starts from.
pub struct NativeComponentRules;

impl NativeComponentRules {
    pub fn apply(registry: &mut ModelRegistry) -> Result<(), ModelError> {
        declare_types(registry.schema());

        registry.register(
            top(BUILD_TYPES),
            CreationRule::value("native build types", BuildTypes::default),
        )?;
        registry.register(
            top(BUILD_DIR),
            CreationRule::value("native build dir", || String::from("build")),
        )?;

        let components = top(COMPONENTS);
        registry.register_container::<dyn ComponentSpec>(components.clone(), "native components")?;
        registry.register_factory(&components, NativeLibrarySpec::new)?;
        registry.register_factory(&components, NativeExecutableSpec::new)?;
        registry.bind_rule(
            components,
            Phase::Finalize,
            [RuleInput::from(top(BUILD_TYPES))],
            "native component binaries",
            create_binaries,
        )
    }

    pub fn library(registry: &mut ModelRegistry, name: &str) -> Result<ModelPath, ModelError> {
        registry.create_element::<NativeLibrarySpec, _>(&top(COMPONENTS), name, |_, _| Ok(()))
    }

    pub fn executable(registry: &mut ModelRegistry, name: &str) -> Result<ModelPath, ModelError> {
        registry.create_element::<NativeExecutableSpec, _>(&top(COMPONENTS), name, |_, _| Ok(()))
    }
}

/// One binary per component per build type, for components that declared
/// none themselves.
fn create_binaries(ctx: &mut RuleContext<'_>) -> anyhow::Result<()> {
    let build_types = ctx.input::<BuildTypes>(&top(BUILD_TYPES))?.try_borrow()?.0.clone();
    let components = ctx.path().clone();
    let filtered = ctx.registry().with_type::<dyn ComponentSpec>(&components)?;
    for element in &filtered {
        // Mutable views stop at `mutated`; a read view would close the element.
        let kind = ctx
            .registry()
            .get_mut::<dyn ComponentSpec>(&element.path)?
            .try_borrow()?
            .kind();
        let binaries = ctx.registry().get_mut::<dyn HasBinaries>(&element.path)?;
        let mut binaries = binaries.borrow_mut()?;
        if !binaries.binaries().is_empty() {
            continue;
        }
        for build_type in &build_types {
            for binary_kind in kind.binary_kinds() {
                binaries
                    .binaries_mut()
                    .push(NativeBinarySpec::new(&element.name, build_type, *binary_kind));
            }
        }
        debug!(component = %element.name, count = binaries.binaries().len(), "created binaries");
    }
    Ok(())
}
