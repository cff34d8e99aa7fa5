//! CUnit test suites: the `testSuites` container, launcher source sets and
//! launcher generation tasks.
//!
//! Expects [`crate::NativeComponentRules`] to be applied first; the rules
//! here read `components`, `buildTypes` and `buildDir`.

use std::collections::BTreeMap;

use anyhow::Context;
use model::{
    CreationRule, ModelError, ModelPath, ModelRegistry, Phase, PolymorphicContainer, RuleContext,
    RuleInput,
};
use serde::Serialize;
use tracing::debug;

use crate::component::{
    BinaryKind, ComponentSpec, CUnitTestSuiteSpec, HasBinaries, HasSources, NativeBinarySpec,
    declare_types,
};
use crate::components::{BUILD_DIR, BUILD_TYPES, BuildTypes, COMPONENTS, top};

pub const TEST_SUITES: &str = "testSuites";
pub const TASKS: &str = "tasks";
pub const LAUNCHER_SOURCE_SET: &str = "cunitLauncher";
pub const TEST_SOURCE_SET: &str = "c";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    GenerateCUnitLauncher,
}

/// A task declared in the model. Nothing executes it here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskSpec {
    pub name: String,
    pub kind: TaskKind,
    pub suite: String,
    pub source_dir: String,
    pub header_dir: String,
}

/// The `tasks` node: declared tasks by name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Tasks(pub BTreeMap<String, TaskSpec>);

pub struct CUnitRules;

impl CUnitRules {
    pub fn apply(registry: &mut ModelRegistry) -> Result<(), ModelError> {
        declare_types(registry.schema());

        let tasks = top(TASKS);
        if !registry.contains(&tasks) {
            registry.register(tasks.clone(), CreationRule::value("tasks", Tasks::default))?;
        }

        let suites = top(TEST_SUITES);
        registry.register_container::<dyn ComponentSpec>(suites.clone(), "cunit test suites")?;
        registry.register_factory(&suites, CUnitTestSuiteSpec::new)?;
        registry.bind_rule(
            suites.clone(),
            Phase::Defaults,
            [RuleInput::from(top(COMPONENTS))],
            "cunit tested components",
            wire_tested_components,
        )?;
        registry.bind_rule(
            suites.clone(),
            Phase::Finalize,
            [
                RuleInput::from(top(COMPONENTS)),
                RuleInput::from(top(BUILD_TYPES)),
                RuleInput::from(top(BUILD_DIR)),
            ],
            "cunit launcher sources",
            configure_suites,
        )?;
        registry.mutate::<Tasks, _>(
            tasks,
            Phase::Mutate,
            [RuleInput::from(suites)],
            "cunit launcher tasks",
            create_launcher_tasks,
        )
    }

    /// Declare a CUnit suite. Without an explicit tested component, a suite
    /// named `<component>Test` tests `<component>`.
    pub fn suite(
        registry: &mut ModelRegistry,
        name: &str,
        tested_component: Option<&str>,
    ) -> Result<ModelPath, ModelError> {
        let tested = tested_component.map(str::to_string);
        registry.create_element::<CUnitTestSuiteSpec, _>(&top(TEST_SUITES), name, move |suite, _| {
            suite.tested_component.clone_from(&tested);
            Ok(())
        })
    }
}

fn wire_tested_components(ctx: &mut RuleContext<'_>) -> anyhow::Result<()> {
    let components = ctx.input::<PolymorphicContainer>(&top(COMPONENTS))?;
    let suites = ctx.path().clone();
    let filtered = ctx.registry().with_type::<CUnitTestSuiteSpec>(&suites)?;
    for element in &filtered {
        let view = ctx.registry().get_mut::<CUnitTestSuiteSpec>(&element.path)?;
        let mut suite = view.borrow_mut()?;
        if suite.tested_component.is_some() {
            continue;
        }
        let Some(base) = element.name.strip_suffix("Test") else {
            continue;
        };
        if components.try_borrow()?.contains(base) {
            debug!(suite = %element.name, component = base, "wired tested component");
            suite.tested_component = Some(base.to_string());
        }
    }
    Ok(())
}

/// Add the launcher and test source sets to every suite, link them, and
/// declare one test binary per build type.
fn configure_suites(ctx: &mut RuleContext<'_>) -> anyhow::Result<()> {
    let build_dir = ctx.input::<String>(&top(BUILD_DIR))?.try_borrow()?.clone();
    let build_types = ctx.input::<BuildTypes>(&top(BUILD_TYPES))?.try_borrow()?.0.clone();
    let suites = ctx.path().clone();
    let filtered = ctx.registry().with_type::<CUnitTestSuiteSpec>(&suites)?;
    for element in &filtered {
        let view = ctx.registry().get_mut::<CUnitTestSuiteSpec>(&element.path)?;
        let mut suite = view.borrow_mut()?;
        let name = element.name.as_str();

        let launcher = suite.maybe_create_source_set(LAUNCHER_SOURCE_SET);
        if launcher.source_dirs.is_empty() {
            let base = format!("{build_dir}/src/{name}/cunitLauncher");
            launcher.source_dirs.push(format!("{base}/c"));
            launcher.header_dirs.push(format!("{base}/headers"));
        }

        let tests = suite.maybe_create_source_set(TEST_SOURCE_SET);
        if tests.source_dirs.is_empty() {
            tests.source_dirs.push(format!("src/{name}/c"));
            tests.header_dirs.push(format!("src/{name}/headers"));
        }
        if !tests.libs.iter().any(|lib| lib == LAUNCHER_SOURCE_SET) {
            tests.libs.push(LAUNCHER_SOURCE_SET.to_string());
        }

        if !suite.binaries().is_empty() {
            continue;
        }
        let tested_binaries = match suite.tested_component.clone() {
            Some(component) => {
                let path = top(COMPONENTS).child(component);
                ctx.registry()
                    .get::<dyn HasBinaries>(&path)?
                    .try_borrow()?
                    .binaries()
                    .to_vec()
            }
            None => Vec::new(),
        };
        for build_type in &build_types {
            let mut binary = NativeBinarySpec::new(name, build_type, BinaryKind::CUnitExecutable);
            binary.tested_binary = tested_binaries
                .iter()
                .find(|tested| {
                    tested.kind == BinaryKind::StaticLibrary && &tested.build_type == build_type
                })
                .map(|tested| tested.name.clone());
            suite.binaries_mut().push(binary);
        }
    }
    Ok(())
}

fn create_launcher_tasks(tasks: &mut Tasks, ctx: &mut RuleContext<'_>) -> anyhow::Result<()> {
    let suites = top(TEST_SUITES);
    let filtered = ctx.registry().with_type::<CUnitTestSuiteSpec>(&suites)?;
    for element in &filtered {
        let view = ctx.registry().get::<CUnitTestSuiteSpec>(&element.path)?;
        let suite = view.try_borrow()?;
        let launcher = suite
            .sources()
            .get(LAUNCHER_SOURCE_SET)
            .with_context(|| format!("suite {} has no launcher sources", element.name))?;
        let name = format!("{}CUnitLauncher", element.name);
        let task = TaskSpec {
            name: name.clone(),
            kind: TaskKind::GenerateCUnitLauncher,
            suite: element.name.clone(),
            source_dir: launcher.source_dirs.first().cloned().unwrap_or_default(),
            header_dir: launcher.header_dirs.first().cloned().unwrap_or_default(),
        };
        tasks.0.insert(name, task);
    }
    Ok(())
}
