//! Native component specs and the capability traits rules see them through.

use std::collections::BTreeMap;
use std::fmt;

use model::ModelSchema;
use serde::Serialize;

/// What a component builds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentKind {
    Library,
    Executable,
    TestSuite,
}

impl ComponentKind {
    /// Binary kinds produced per build type.
    pub fn binary_kinds(self) -> &'static [BinaryKind] {
        match self {
            ComponentKind::Library => &[BinaryKind::SharedLibrary, BinaryKind::StaticLibrary],
            ComponentKind::Executable => &[BinaryKind::Executable],
            ComponentKind::TestSuite => &[BinaryKind::CUnitExecutable],
        }
    }

    /// Suffix of the IDE project generated for a component of this kind.
    pub fn project_suffix(self) -> &'static str {
        match self {
            ComponentKind::Library => "Lib",
            ComponentKind::Executable => "Exe",
            ComponentKind::TestSuite => "Test",
        }
    }
}

impl fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ComponentKind::Library => "library",
            ComponentKind::Executable => "executable",
            ComponentKind::TestSuite => "test suite",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BinaryKind {
    SharedLibrary,
    StaticLibrary,
    Executable,
    CUnitExecutable,
}

impl BinaryKind {
    fn suffix(self) -> &'static str {
        match self {
            BinaryKind::SharedLibrary => "SharedLibrary",
            BinaryKind::StaticLibrary => "StaticLibrary",
            BinaryKind::Executable => "Executable",
            BinaryKind::CUnitExecutable => "CUnitExe",
        }
    }
}

/// One buildable output of a component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NativeBinarySpec {
    pub name: String,
    pub kind: BinaryKind,
    pub build_type: String,
    /// For test binaries: the binary under test.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tested_binary: Option<String>,
}

impl NativeBinarySpec {
    /// Binary named `<buildType><Component><Kind>`, e.g. `debugMainExecutable`.
    pub fn new(component: &str, build_type: &str, kind: BinaryKind) -> Self {
        Self {
            name: format!("{build_type}{}{}", capitalize(component), kind.suffix()),
            kind,
            build_type: build_type.to_string(),
            tested_binary: None,
        }
    }
}

/// A named set of C sources with exported headers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SourceSet {
    pub name: String,
    pub source_dirs: Vec<String>,
    pub header_dirs: Vec<String>,
    /// Source sets whose headers this one compiles against.
    pub libs: Vec<String>,
}

impl SourceSet {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }
}

pub trait ComponentSpec {
    fn name(&self) -> &str;
    fn kind(&self) -> ComponentKind;
}

pub trait HasSources {
    fn sources(&self) -> &BTreeMap<String, SourceSet>;
    fn sources_mut(&mut self) -> &mut BTreeMap<String, SourceSet>;

    /// The source set `name`, created empty if missing.
    fn maybe_create_source_set(&mut self, name: &str) -> &mut SourceSet {
        self.sources_mut()
            .entry(name.to_string())
            .or_insert_with(|| SourceSet::new(name))
    }
}

pub trait HasBinaries {
    fn binaries(&self) -> &[NativeBinarySpec];
    fn binaries_mut(&mut self) -> &mut Vec<NativeBinarySpec>;
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct NativeLibrarySpec {
    pub name: String,
    pub sources: BTreeMap<String, SourceSet>,
    pub binaries: Vec<NativeBinarySpec>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct NativeExecutableSpec {
    pub name: String,
    pub sources: BTreeMap<String, SourceSet>,
    pub binaries: Vec<NativeBinarySpec>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CUnitTestSuiteSpec {
    pub name: String,
    /// Name of the component in `components` this suite tests.
    pub tested_component: Option<String>,
    pub sources: BTreeMap<String, SourceSet>,
    pub binaries: Vec<NativeBinarySpec>,
}

impl NativeLibrarySpec {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }
}

impl NativeExecutableSpec {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }
}

impl CUnitTestSuiteSpec {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }
}

macro_rules! component_spec {
    ($ty:ty, $kind:expr) => {
        impl ComponentSpec for $ty {
            fn name(&self) -> &str {
                &self.name
            }

            fn kind(&self) -> ComponentKind {
                $kind
            }
        }

        impl HasSources for $ty {
            fn sources(&self) -> &BTreeMap<String, SourceSet> {
                &self.sources
            }

            fn sources_mut(&mut self) -> &mut BTreeMap<String, SourceSet> {
                &mut self.sources
            }
        }

        impl HasBinaries for $ty {
            fn binaries(&self) -> &[NativeBinarySpec] {
                &self.binaries
            }

            fn binaries_mut(&mut self) -> &mut Vec<NativeBinarySpec> {
                &mut self.binaries
            }
        }
    };
}

component_spec!(NativeLibrarySpec, ComponentKind::Library);
component_spec!(NativeExecutableSpec, ComponentKind::Executable);
component_spec!(CUnitTestSuiteSpec, ComponentKind::TestSuite);

/// Declare each concrete spec as a subtype of the capability traits.
pub fn declare_types(schema: &ModelSchema) {
    declare::<NativeLibrarySpec>(schema);
    declare::<NativeExecutableSpec>(schema);
    declare::<CUnitTestSuiteSpec>(schema);
}

fn declare<T>(schema: &ModelSchema)
where
    T: ComponentSpec + HasSources + HasBinaries + 'static,
{
    schema
        .extends::<T, dyn ComponentSpec>(|spec| spec, |spec| spec)
        .extends::<T, dyn HasSources>(|spec| spec, |spec| spec)
        .extends::<T, dyn HasBinaries>(|spec| spec, |spec| spec);
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use model::ModelType;

    #[test]
    fn binary_names_follow_build_type_and_kind() {
        let binary = NativeBinarySpec::new("main", "debug", BinaryKind::Executable);
        assert_eq!(binary.name, "debugMainExecutable");
        let binary = NativeBinarySpec::new("hello", "release", BinaryKind::StaticLibrary);
        assert_eq!(binary.name, "releaseHelloStaticLibrary");
    }

    #[test]
    fn maybe_create_keeps_existing_source_set() {
        let mut lib = NativeLibrarySpec::new("hello");
        lib.maybe_create_source_set("c")
            .source_dirs
            .push("src/hello/c".to_string());
        lib.maybe_create_source_set("c");
        assert_eq!(lib.sources.len(), 1);
        assert_eq!(lib.sources["c"].source_dirs, vec!["src/hello/c"]);
    }

    #[test]
    fn declared_types_are_assignable_to_capabilities() {
        let schema = ModelSchema::new();
        declare_types(&schema);
        let suite = ModelType::of::<CUnitTestSuiteSpec>();
        assert!(schema.is_assignable(suite, ModelType::of::<dyn ComponentSpec>()));
        assert!(schema.is_assignable(suite, ModelType::of::<dyn HasBinaries>()));
        assert!(!schema.is_assignable(
            ModelType::of::<NativeLibrarySpec>(),
            ModelType::of::<NativeExecutableSpec>()
        ));
    }
}
