//! Integration tests exercising the pipeline end to end, one test per testable scenario.

use std::path::PathBuf;

use nacl_workspace::{ChangeAction, Workspace};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init()
        .ok();
}

#[test]
fn add_then_edit_then_remove() {
    init_tracing();
    let mut ws = Workspace::new("dev");

    let changes = ws.set_nacl_files(vec![(
        PathBuf::from("a.nacl"),
        "type salesforce.Account {\n  string Name {\n  }\n}".to_string(),
    )]);
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].action, ChangeAction::Add);
    assert!(ws.get_element(&changes[0].id).is_some());

    let changes = ws.set_nacl_files(vec![(
        PathBuf::from("a.nacl"),
        "type salesforce.Account {\n  string Email {\n  }\n}".to_string(),
    )]);
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].action, ChangeAction::Modify);

    let changes = ws.remove_nacl_files(&[PathBuf::from("a.nacl")]);
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].action, ChangeAction::Remove);
    assert!(ws.elements().is_empty());
}

#[test]
fn duplicate_field_across_files_is_a_merge_error_but_the_type_survives() {
    init_tracing();
    let mut ws = Workspace::new("dev");
    ws.set_nacl_files(vec![
        (PathBuf::from("a.nacl"), "type x.T {\n  string a {\n  }\n}".to_string()),
        (PathBuf::from("b.nacl"), "type x.T {\n  string a {\n  }\n}".to_string()),
    ]);

    assert!(ws.errors().iter().any(|e| matches!(e, nacl_workspace::Error::Merge(_))));
    let nacl_workspace::Element::Object(obj) = ws.get_element(&nacl_workspace::ElemId::top_level_type("x", "T")).unwrap() else {
        panic!("expected an object type");
    };
    assert_eq!(obj.fields.len(), 1);
}

#[test]
fn unresolved_reference_is_reported() {
    init_tracing();
    let mut ws = Workspace::new("dev");
    ws.set_nacl_files(vec![
        (PathBuf::from("a.nacl"), "type x.T {\n}".to_string()),
        (PathBuf::from("b.nacl"), "x.T inst {\n  ref = x.T.missing\n}".to_string()),
    ]);

    assert!(ws.errors().iter().any(|e| matches!(e, nacl_workspace::Error::Validation(
        nacl_workspace::ValidationError::UnresolvedReference { .. }
    ))));
}

#[test]
fn multi_env_override_merges_common_and_env_fragments() {
    init_tracing();
    let mut ws = Workspace::new("env1");
    ws.add_env("env2").unwrap();

    // Align writes to common, shared by every environment.
    ws.update_nacl_files(
        vec![(PathBuf::from("common.nacl"), "type x.T {\n  string a {\n  }\n}".to_string())],
        nacl_workspace::RoutingMode::Align,
    );
    // Default (env-local) adds a field only env1 sees.
    ws.update_nacl_files(
        vec![(PathBuf::from("env1.nacl"), "type x.T {\n  string b {\n  }\n}".to_string())],
        nacl_workspace::RoutingMode::Default,
    );

    let nacl_workspace::Element::Object(env1_type) =
        ws.get_element(&nacl_workspace::ElemId::top_level_type("x", "T")).unwrap()
    else {
        panic!("expected an object type");
    };
    assert!(env1_type.fields.contains_key("a"));
    assert!(env1_type.fields.contains_key("b"));

    ws.set_current_env("env2").unwrap();
    let nacl_workspace::Element::Object(env2_type) =
        ws.get_element(&nacl_workspace::ElemId::top_level_type("x", "T")).unwrap()
    else {
        panic!("expected an object type");
    };
    assert!(env2_type.fields.contains_key("a"));
    assert!(!env2_type.fields.contains_key("b"));
}

#[test]
fn removing_a_referenced_file_surfaces_an_error_and_re_adding_it_clears_it() {
    init_tracing();
    let mut ws = Workspace::new("dev");
    ws.set_nacl_files(vec![
        (PathBuf::from("a.nacl"), "type x.T {\n}".to_string()),
        (PathBuf::from("b.nacl"), "x.T inst {\n  ref = x.T.instance.other.name\n}".to_string()),
        (PathBuf::from("c.nacl"), "x.T other {\n  name = \"hi\"\n}".to_string()),
    ]);
    assert!(ws.errors().is_empty(), "{:?}", ws.errors());

    ws.remove_nacl_files(&[PathBuf::from("c.nacl")]);
    assert!(ws.errors().iter().any(|e| matches!(e, nacl_workspace::Error::Validation(
        nacl_workspace::ValidationError::UnresolvedReference { .. }
    ))));

    ws.set_nacl_files(vec![(PathBuf::from("c.nacl"), "x.T other {\n  name = \"hi\"\n}".to_string())]);
    assert!(ws.errors().is_empty(), "{:?}", ws.errors());
}

#[test]
fn clone_workspace_reflects_its_own_merged_state() {
    init_tracing();
    let mut ws = Workspace::new("dev");
    ws.set_nacl_files(vec![(PathBuf::from("a.nacl"), "type x.T {\n  string a {\n  }\n}".to_string())]);

    let cloned = ws.clone_workspace();
    assert!(cloned.get_element(&nacl_workspace::ElemId::top_level_type("x", "T")).is_some());
    assert!(cloned.errors().is_empty());
}
