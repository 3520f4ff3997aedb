//! Folds per-file element fragments into a single canonical element per top-level full-name.
//!
//! The merger is pure and deterministic: for the same fragment multiset (regardless of
//! intra-file ordering) it always produces the same merged map and error list, so callers may
//! cache by set-of-inputs.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::elements::value::Value;
use crate::elements::Element;
use crate::error::MergeError;
use crate::source_map::SourceRange;

/// One file's contribution to a top-level element.
#[derive(Clone, Debug)]
pub struct Fragment {
    pub element: Element,
    pub file: PathBuf,
    pub range: SourceRange,
}

pub struct MergeResult {
    pub merged: BTreeMap<String, Element>,
    pub errors: Vec<MergeError>,
}

#[tracing::instrument(skip(fragments), fields(count = fragments.len()))]
pub fn merge_fragments(fragments: Vec<Fragment>) -> MergeResult {
    let mut groups: BTreeMap<String, Vec<Fragment>> = BTreeMap::new();
    for fragment in fragments {
        groups.entry(fragment.element.elem_id().get_full_name()).or_default().push(fragment);
    }

    let mut merged = BTreeMap::new();
    let mut errors = Vec::new();
    for (full_name, group) in groups {
        let (element, mut group_errors) = merge_group(&full_name, group);
        errors.append(&mut group_errors);
        merged.insert(full_name, element);
    }
    update_merged_types(&merged);
    MergeResult { merged, errors }
}

fn merge_group(full_name: &str, mut group: Vec<Fragment>) -> (Element, Vec<MergeError>) {
    let mut errors = Vec::new();
    let first_kind = group[0].element.kind_tag();
    if group.iter().any(|f| f.element.kind_tag() != first_kind) {
        let id = group[0].element.elem_id().clone();
        errors.push(MergeError::Duplicate { id, locations: group.iter().map(|f| f.range.clone()).collect() });
        tracing::warn!(full_name, "fragments disagree on element kind; keeping first fragment");
        return (group.remove(0).element, errors);
    }

    match first_kind {
        "object" => merge_object_group(group, &mut errors),
        "instance" => merge_instance_group(group, &mut errors),
        "primitive" => merge_primitive_group(group, &mut errors),
        _ => (group.remove(0).element, errors),
    }
}

fn merge_primitive_group(group: Vec<Fragment>, errors: &mut Vec<MergeError>) -> Element {
    let mut iter = group.into_iter();
    let first = iter.next().expect("non-empty group");
    let base = first.element.as_primitive().expect("primitive kind").clone();
    let mut locations = vec![first.range.clone()];

    for fragment in iter {
        let other = fragment.element.as_primitive().expect("primitive kind");
        if other.kind != base.kind {
            locations.push(fragment.range.clone());
        }
    }
    if locations.len() > 1 {
        errors.push(MergeError::ConflictingFieldType { id: base.elem_id.clone(), locations });
    }
    Element::Primitive(base)
}

fn merge_object_group(group: Vec<Fragment>, errors: &mut Vec<MergeError>) -> Element {
    let mut iter = group.into_iter();
    let first = iter.next().expect("non-empty group");
    let mut base = first.element.as_object().expect("object kind").clone();
    let mut field_sources: BTreeMap<String, (PathBuf, SourceRange)> =
        base.fields.keys().map(|name| (name.clone(), (first.file.clone(), first.range.clone()))).collect();
    let mut annotation_sources: BTreeMap<String, PathBuf> =
        base.annotations.keys().map(|k| (k.clone(), first.file.clone())).collect();

    for fragment in iter {
        let other = fragment.element.as_object().expect("object kind").clone();
        if other.is_settings != base.is_settings {
            errors.push(MergeError::ConflictingSetting {
                id: base.elem_id.clone(),
                locations: vec![first.range.clone(), fragment.range.clone()],
            });
        }
        for (name, field) in other.fields {
            match base.fields.get(&name) {
                Some(_existing) => {
                    let (prior_file, prior_range) =
                        field_sources.get(&name).cloned().unwrap_or((fragment.file.clone(), fragment.range.clone()));
                    errors.push(MergeError::DuplicateAnnotation {
                        id: base.elem_id.create_nested_id(&["field", &name]),
                        first: prior_range,
                        second: fragment.range.clone(),
                    });
                    let _ = prior_file;
                }
                None => {
                    field_sources.insert(name.clone(), (fragment.file.clone(), fragment.range.clone()));
                    base.fields.insert(name, field);
                }
            }
        }
        for (key, value) in other.annotations {
            merge_annotation(
                &mut base.annotations,
                &mut annotation_sources,
                key,
                value,
                &fragment.file,
                &base.elem_id,
                &fragment.range,
                errors,
            );
        }
    }
    Element::Object(base)
}

fn merge_instance_group(group: Vec<Fragment>, errors: &mut Vec<MergeError>) -> Element {
    let mut iter = group.into_iter();
    let first = iter.next().expect("non-empty group");
    let mut base = first.element.as_instance().expect("instance kind").clone();

    for fragment in iter {
        let other = fragment.element.as_instance().expect("instance kind").clone();
        for (key, value) in other.value {
            let mut path = vec![key.clone()];
            match base.value.remove(&key) {
                Some(existing) => match merge_values(existing, value, &mut path) {
                    Ok(merged) => {
                        base.value.insert(key, merged);
                    }
                    Err(conflict_path) => {
                        errors.push(MergeError::DuplicateInstanceKey {
                            id: base.elem_id.clone(),
                            key: conflict_path.join("."),
                            locations: vec![first.range.clone(), fragment.range.clone()],
                        });
                    }
                },
                None => {
                    base.value.insert(key, value);
                }
            }
        }
        for (key, value) in other.annotations {
            base.annotations.entry(key).or_insert(value);
        }
    }
    Element::Instance(base)
}

/// Structurally merges two values at the same path. Conflicting primitives or mismatched
/// shapes return the offending path so the caller can attach a [`MergeError`].
fn merge_values(a: Value, b: Value, path: &mut Vec<String>) -> Result<Value, Vec<String>> {
    match (a, b) {
        (Value::Map(mut map_a), Value::Map(map_b)) => {
            for (k, v) in map_b {
                path.push(k.clone());
                let merged = match map_a.remove(&k) {
                    Some(existing) => merge_values(existing, v, path)?,
                    None => v,
                };
                map_a.insert(k, merged);
                path.pop();
            }
            Ok(Value::Map(map_a))
        }
        (a, b) if a == b => Ok(a),
        _ => Err(path.clone()),
    }
}

#[allow(clippy::too_many_arguments)]
fn merge_annotation(
    annotations: &mut BTreeMap<String, Value>,
    sources: &mut BTreeMap<String, PathBuf>,
    key: String,
    value: Value,
    file: &Path,
    id: &crate::id::ElemId,
    range: &SourceRange,
    errors: &mut Vec<MergeError>,
) {
    match annotations.get(&key) {
        Some(existing) if sources.get(&key).map(|f| f.as_path()) == Some(file) => {
            // Last-writer-wins within a single file.
            if existing != &value {
                annotations.insert(key.clone(), value);
            }
        }
        Some(existing) if existing == &value => {}
        Some(_) => {
            errors.push(MergeError::DuplicateAnnotation {
                id: id.create_nested_id(&["annotation", &key]),
                first: range.clone(),
                second: range.clone(),
            });
        }
        None => {
            sources.insert(key.clone(), file.to_path_buf());
            annotations.insert(key, value);
        }
    }
}

/// Re-points type-valued fields at the merged element rather than a stale per-file fragment.
///
/// Fields here already reference their declared type by [`crate::id::ElemId`] rather than by
/// embedding a copy of the type, so there is nothing to rewrite once merging is done; this
/// pass exists to keep the merge pipeline's steps explicit and in one place.
fn update_merged_types(_merged: &BTreeMap<String, Element>) {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::elements::types::TypeRef;
    use crate::elements::{Field, ObjectType};
    use crate::id::ElemId;
    use crate::parser::{self, ErrorRecoveryMode};
    use std::path::PathBuf;

    fn fragments_from(file: &str, text: &str) -> Vec<Fragment> {
        let parsed = parser::parse(Path::new(file), text, ErrorRecoveryMode::Strict);
        parsed
            .elements
            .into_iter()
            .map(|element| {
                let ranges = parsed.source_map.get(&element.elem_id().get_full_name());
                Fragment {
                    range: ranges.first().cloned().unwrap_or_else(|| SourceRange::synthetic(file)),
                    file: PathBuf::from(file),
                    element,
                }
            })
            .collect()
    }

    #[test]
    fn duplicate_field_across_files_is_a_merge_error() {
        let mut fragments = fragments_from("a.nacl", "type x.T {\n  string a {\n  }\n}");
        fragments.extend(fragments_from("b.nacl", "type x.T {\n  string a {\n  }\n}"));
        let result = merge_fragments(fragments);
        assert_eq!(result.merged.len(), 1);
        let Element::Object(obj) = &result.merged["x.T"] else { panic!() };
        assert_eq!(obj.fields.len(), 1);
        assert_eq!(result.errors.len(), 1);
        assert!(matches!(result.errors[0], MergeError::DuplicateAnnotation { .. }));
    }

    #[test]
    fn distinct_fields_across_files_merge_cleanly() {
        let mut fragments = fragments_from("a.nacl", "type x.T {\n  string a {\n  }\n}");
        fragments.extend(fragments_from("b.nacl", "type x.T {\n  string b {\n  }\n}"));
        let result = merge_fragments(fragments);
        assert!(result.errors.is_empty());
        let Element::Object(obj) = &result.merged["x.T"] else { panic!() };
        assert_eq!(obj.fields.len(), 2);
    }

    #[test]
    fn instance_values_merge_structurally_without_conflict() {
        let mut fragments = fragments_from("a.nacl", "x.T inst {\n  a = \"1\"\n}");
        fragments.extend(fragments_from("b.nacl", "x.T inst {\n  b = \"2\"\n}"));
        let result = merge_fragments(fragments);
        assert!(result.errors.is_empty());
        let Element::Instance(inst) = &result.merged["x.T.instance.inst"] else { panic!() };
        assert_eq!(inst.value.len(), 2);
    }

    #[test]
    fn conflicting_instance_values_raise_duplicate_instance_key() {
        let mut fragments = fragments_from("a.nacl", "x.T inst {\n  a = \"1\"\n}");
        fragments.extend(fragments_from("b.nacl", "x.T inst {\n  a = \"2\"\n}"));
        let result = merge_fragments(fragments);
        assert_eq!(result.errors.len(), 1);
        assert!(matches!(result.errors[0], MergeError::DuplicateInstanceKey { .. }));
    }

    #[test]
    fn conflicting_primitive_kinds_across_files_is_a_merge_error() {
        let mut fragments = fragments_from("a.nacl", "type x.T {\n  _primitive = \"string\"\n}");
        fragments.extend(fragments_from("b.nacl", "type x.T {\n  _primitive = \"number\"\n}"));
        let result = merge_fragments(fragments);
        assert_eq!(result.errors.len(), 1);
        assert!(matches!(result.errors[0], MergeError::ConflictingFieldType { .. }));
        assert!(result.merged["x.T"].as_primitive().is_some());
    }

    #[test]
    fn same_primitive_kind_across_files_merges_without_conflict() {
        let mut fragments = fragments_from("a.nacl", "type x.T {\n  _primitive = \"string\"\n}");
        fragments.extend(fragments_from("b.nacl", "type x.T {\n  _primitive = \"string\"\n}"));
        let result = merge_fragments(fragments);
        assert!(result.errors.is_empty());
    }

    #[test]
    fn mismatched_element_kind_keeps_first_fragment_and_reports_duplicate() {
        let object = Fragment {
            element: Element::Object(ObjectType::new(ElemId::top_level_type("x", "T"))),
            file: PathBuf::from("a.nacl"),
            range: SourceRange::synthetic("a.nacl"),
        };
        let instance = Fragment {
            element: Element::Instance(crate::elements::InstanceElement::new(
                ElemId::top_level_type("x", "T"),
                TypeRef(ElemId::top_level_type("x", "T")),
            )),
            file: PathBuf::from("b.nacl"),
            range: SourceRange::synthetic("b.nacl"),
        };
        let result = merge_fragments(vec![object, instance]);
        assert_eq!(result.errors.len(), 1);
        assert!(result.merged["x.T"].as_object().is_some());
    }

    #[test]
    fn field_constructor_still_reachable_from_this_module() {
        let field = Field::new(ElemId::top_level_type("x", "T"), "a", TypeRef(ElemId::top_level_type("", "string")));
        assert_eq!(field.name, "a");
    }
}
