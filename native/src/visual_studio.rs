//! Visual Studio projects modelled from native components and CUnit test
//! suites. No solution or project files are written; the projects only exist
//! as model nodes.

use model::{
    CreationRule, ModelError, ModelPath, ModelRegistry, Phase, PolymorphicContainer, RuleContext,
    RuleInput, View,
};
use serde::Serialize;
use tracing::debug;

use crate::component::{ComponentSpec, HasBinaries};
use crate::components::{COMPONENTS, top};
use crate::cunit::TEST_SUITES;

pub const VISUAL_STUDIO: &str = "visualStudio";
pub const PROJECTS: &str = "projects";
pub const PLATFORM: &str = "Win32";

/// One build configuration of a project, backed by one binary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProjectConfiguration {
    /// `<buildType>|<platform>`, as the IDE names configurations.
    pub name: String,
    pub binary: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VisualStudioProject {
    pub name: String,
    pub component: String,
    pub configurations: Vec<ProjectConfiguration>,
}

impl VisualStudioProject {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }
}

/// The `visualStudio` node; `projects` lives under it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct VisualStudioExtension;

pub struct VisualStudioRules;

impl VisualStudioRules {
    pub fn apply(registry: &mut ModelRegistry) -> Result<(), ModelError> {
        let extension = top(VISUAL_STUDIO);
        registry.register(
            extension.clone(),
            CreationRule::value("visual studio extension", || VisualStudioExtension),
        )?;
        let projects = extension.child(PROJECTS);
        registry.register_container::<VisualStudioProject>(projects.clone(), "visual studio projects")?;
        registry.register_factory(&projects, VisualStudioProject::new)?;
        registry.bind_rule(
            projects,
            Phase::Mutate,
            [RuleInput::from(top(COMPONENTS))],
            "visual studio projects for components and test suites",
            create_projects,
        )
    }
}

/// `testSuites` is read only when the CUnit rules are applied, whatever
/// order the extensions were applied in.
fn create_projects(ctx: &mut RuleContext<'_>) -> anyhow::Result<()> {
    let projects = ctx.path().clone();
    for container in [top(COMPONENTS), top(TEST_SUITES)] {
        if !ctx.registry().contains(&container) {
            continue;
        }
        // Suite binaries are added when the container finalizes.
        ctx.input::<PolymorphicContainer>(&container)?;
        for (name, component) in ctx.registry().elements::<dyn ComponentSpec>(&container)? {
            declare_project(ctx, &projects, name, &component)?;
        }
    }
    Ok(())
}

fn declare_project(
    ctx: &mut RuleContext<'_>,
    projects: &ModelPath,
    name: String,
    component: &View<dyn ComponentSpec>,
) -> anyhow::Result<()> {
    let kind = component.try_borrow()?.kind();
    let binaries = ctx
        .registry()
        .get::<dyn HasBinaries>(component.path())?
        .try_borrow()?
        .binaries()
        .to_vec();
    let configurations: Vec<ProjectConfiguration> = binaries
        .iter()
        .map(|binary| ProjectConfiguration {
            name: format!("{}|{PLATFORM}", binary.build_type),
            binary: binary.name.clone(),
        })
        .collect();
    let project_name = format!("{name}{}", kind.project_suffix());
    debug!(project = %project_name, configurations = configurations.len(), "declaring project");
    ctx.registry().create_element::<VisualStudioProject, _>(
        projects,
        &project_name,
        move |project, _| {
            project.component.clone_from(&name);
            project.configurations.clone_from(&configurations);
            Ok(())
        },
    )?;
    Ok(())
}
