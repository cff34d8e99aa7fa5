//! View resolution tests: narrowing, upcasting and rejection of requests no
//! projection can serve.

use model::test_support::path;
use model::{CreationRule, ModelError, ModelRegistry};

#[derive(Debug, Default)]
struct Library {
    name: String,
    sources: Vec<String>,
    summary: Summary,
}

#[derive(Debug, Default)]
struct Summary {
    text: String,
}

trait Describe {
    fn describe(&self) -> String;
}

impl Describe for Library {
    fn describe(&self) -> String {
        format!("library {}", self.name)
    }
}

impl Describe for Summary {
    fn describe(&self) -> String {
        self.text.clone()
    }
}

struct Unrelated;

fn registry_with_library() -> ModelRegistry {
    let mut registry = ModelRegistry::new();
    registry
        .register(
            path("lib"),
            CreationRule::value("create lib", || Library {
                name: "core".to_string(),
                sources: vec!["core.c".to_string()],
                summary: Summary {
                    text: "core summary".to_string(),
                },
            }),
        )
        .expect("register");
    registry
}

#[test]
fn field_projection_narrows_the_value() {
    let mut registry = registry_with_library();
    registry
        .add_projection::<Library, Vec<String>>(&path("lib"), |lib| &lib.sources)
        .expect("projection");

    let whole = registry.get::<Library>(&path("lib")).expect("library");
    let sources = registry.get::<Vec<String>>(&path("lib")).expect("sources");
    assert_eq!(*sources.borrow(), vec!["core.c".to_string()]);
    assert!(whole.same_value(&sources));
}

#[test]
fn unregistered_view_type_has_no_projection() {
    let mut registry = registry_with_library();
    let err = registry
        .get::<Unrelated>(&path("lib"))
        .expect_err("no projection");
    assert!(matches!(err, ModelError::NoSuchProjection { .. }));
    assert!(err.to_string().contains("Unrelated"));
}

#[test]
fn mutable_field_projection_writes_through() {
    let mut registry = registry_with_library();
    registry
        .add_mut_projection::<Library, Vec<String>>(
            &path("lib"),
            |lib| &lib.sources,
            |lib| &mut lib.sources,
        )
        .expect("projection");

    let sources = registry
        .get_mut::<Vec<String>>(&path("lib"))
        .expect("mutable sources");
    sources
        .borrow_mut()
        .expect("writable")
        .push("util.c".to_string());

    let lib = registry.get::<Library>(&path("lib")).expect("library");
    assert_eq!(lib.borrow().sources, vec!["core.c", "util.c"]);
}

#[test]
fn read_projection_refuses_mutable_request() {
    let mut registry = registry_with_library();
    registry
        .add_projection::<Library, String>(&path("lib"), |lib| &lib.name)
        .expect("projection");

    let err = registry
        .get_mut::<String>(&path("lib"))
        .expect_err("read only");
    assert!(matches!(err, ModelError::ReadOnlyViolation { .. }));
    let name = registry.get::<String>(&path("lib")).expect("read");
    assert_eq!(*name.borrow(), "core");
}

#[test]
fn supertype_request_is_served_through_declared_upcast() {
    let mut registry = registry_with_library();
    registry
        .schema()
        .extends::<Library, dyn Describe>(|lib| lib, |lib| lib);

    let view = registry.get::<dyn Describe>(&path("lib")).expect("describe");
    assert_eq!(view.borrow().describe(), "library core");
}

#[test]
fn unrelated_candidates_are_ambiguous() {
    let mut registry = registry_with_library();
    registry
        .schema()
        .extends_read::<Library, dyn Describe>(|lib| lib)
        .extends_read::<Summary, dyn Describe>(|summary| summary);
    registry
        .add_projection::<Library, Summary>(&path("lib"), |lib| &lib.summary)
        .expect("projection");

    let err = registry
        .get::<dyn Describe>(&path("lib"))
        .expect_err("ambiguous");
    match err {
        ModelError::AmbiguousProjection { candidates, .. } => {
            assert_eq!(candidates.len(), 2);
        }
        other => panic!("unexpected error: {other}"),
    }

    // Exact requests still resolve.
    let summary = registry.get::<Summary>(&path("lib")).expect("summary");
    assert_eq!(summary.borrow().describe(), "core summary");
}

#[test]
fn most_specific_candidate_wins() {
    let mut registry = registry_with_library();
    registry
        .schema()
        .extends_read::<Library, dyn Describe>(|lib| lib);
    registry
        .add_projection::<Library, dyn Describe>(&path("lib"), |lib| &lib.summary)
        .expect("projection");

    // Both the identity view and the explicit `dyn Describe` view match; the
    // identity view is a subtype of the other, so it is used.
    let view = registry.get::<dyn Describe>(&path("lib")).expect("describe");
    assert_eq!(view.borrow().describe(), "library core");
}

#[test]
fn duplicate_projection_is_rejected() {
    let mut registry = registry_with_library();
    registry
        .add_projection::<Library, String>(&path("lib"), |lib| &lib.name)
        .expect("first");
    let err = registry
        .add_projection::<Library, String>(&path("lib"), |lib| &lib.summary.text)
        .expect_err("duplicate");
    assert!(matches!(err, ModelError::DuplicateProjection { mutable: false, .. }));
}
