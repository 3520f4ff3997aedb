//! Individual validation rules.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Mutex;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::elements::types::PrimitiveKind;
use crate::elements::value::{Primitive, Value};
use crate::elements::Element;
use crate::error::ValidationError;
use crate::id::ElemId;

/// Resolves a reference target to the value reached by walking from the instance (or plain
/// field path) it names in `universe`.
///
/// A target's `name_parts` either start with `"instance"` followed by the instance name and
/// the value path below it (the shape produced for references into instance data, e.g.
/// `x.T.instance.acme.Name`), or are a bare field path directly under the type (the shape
/// produced for references with no instance segment, e.g. `x.T.missing`).
pub fn resolve_reference<'a>(target: &ElemId, universe: &'a BTreeMap<String, Element>) -> Option<&'a Value> {
    let owner = reference_owner_id(target)?;
    let remaining = if target.name_parts.first().map(String::as_str) == Some("instance") {
        &target.name_parts[2..]
    } else {
        &target.name_parts[..]
    };
    match universe.get(&owner.get_full_name())? {
        Element::Instance(inst) => inst.get_value_at(remaining),
        _ => None,
    }
}

/// The element ID of the instance (or top-level type, for a bare field-path target) that owns
/// a reference target, preserving the `"instance"`/name segments rather than collapsing them
/// away. Mirrors `resolve_reference`'s own target-shape convention.
fn reference_owner_id(target: &ElemId) -> Option<ElemId> {
    if target.name_parts.first().map(String::as_str) == Some("instance") {
        let instance_name = target.name_parts.get(1)?;
        Some(ElemId::top_level_instance(target.adapter.clone(), target.type_name.clone(), instance_name.clone()))
    } else {
        Some(ElemId::top_level_type(target.adapter.clone(), target.type_name.clone()))
    }
}

pub fn check_unresolved_references(
    id: &ElemId,
    value: &Value,
    universe: &BTreeMap<String, Element>,
    errors: &mut Vec<ValidationError>,
) {
    match value {
        Value::Reference(reference) => {
            if resolve_reference(&reference.target, universe).is_none() {
                errors.push(ValidationError::UnresolvedReference {
                    id: id.clone(),
                    target: reference.target.clone(),
                    range: None,
                });
            }
        }
        Value::List(items) => {
            for item in items {
                check_unresolved_references(id, item, universe, errors);
            }
        }
        Value::Map(entries) => {
            for v in entries.values() {
                check_unresolved_references(id, v, universe, errors);
            }
        }
        _ => {}
    }
}

/// Detects reference cycles reachable from `id` by following reference chains within
/// `universe`. Only cycles through reference expressions are in scope.
pub fn check_cyclic_reference(
    id: &ElemId,
    universe: &BTreeMap<String, Element>,
    errors: &mut Vec<ValidationError>,
) {
    let mut visiting = BTreeSet::new();
    if let Some(cycle) = find_cycle(id, universe, &mut visiting, &mut Vec::new()) {
        errors.push(ValidationError::CyclicReference { id: id.clone(), cycle });
    }
}

fn find_cycle(
    id: &ElemId,
    universe: &BTreeMap<String, Element>,
    visiting: &mut BTreeSet<String>,
    stack: &mut Vec<ElemId>,
) -> Option<Vec<ElemId>> {
    let full_name = id.get_full_name();
    if let Some(pos) = stack.iter().position(|s| s.get_full_name() == full_name) {
        return Some(stack[pos..].to_vec());
    }
    if !visiting.insert(full_name) {
        return None;
    }
    stack.push(id.clone());
    let element = universe.get(&id.get_full_name())?;
    let targets = collect_direct_references(element);
    for target in targets {
        if let Some(cycle) = find_cycle(&target, universe, visiting, stack) {
            return Some(cycle);
        }
    }
    stack.pop();
    None
}

fn collect_direct_references(element: &Element) -> Vec<ElemId> {
    let mut out = Vec::new();
    if let Element::Instance(inst) = element {
        for value in inst.value.values() {
            collect_references_in_value(value, &mut out);
        }
    }
    out
}

fn collect_references_in_value(value: &Value, out: &mut Vec<ElemId>) {
    match value {
        Value::Reference(r) => {
            if let Some(owner) = reference_owner_id(&r.target) {
                out.push(owner);
            }
        }
        Value::List(items) => items.iter().for_each(|v| collect_references_in_value(v, out)),
        Value::Map(entries) => entries.values().for_each(|v| collect_references_in_value(v, out)),
        _ => {}
    }
}

pub fn check_missing_required(
    inst_id: &ElemId,
    value: &BTreeMap<String, Value>,
    object: &crate::elements::types::ObjectType,
    errors: &mut Vec<ValidationError>,
) {
    for field in object.fields.values() {
        if field.is_required() && !value.contains_key(&field.name) {
            errors.push(ValidationError::MissingRequiredField { id: inst_id.clone(), field: field.name.clone() });
        }
    }
}

pub fn check_type_conformance(
    inst_id: &ElemId,
    value: &BTreeMap<String, Value>,
    object: &crate::elements::types::ObjectType,
    universe: &BTreeMap<String, Element>,
    errors: &mut Vec<ValidationError>,
) {
    for (name, v) in value {
        let Some(field) = object.fields.get(name) else { continue };
        if !value_conforms(v, &field.field_type.0, universe) {
            errors.push(ValidationError::InvalidValue { id: inst_id.clone(), range: None });
        }
    }
}

/// Annotation names carrying value restrictions, matching the `_required`/`_settings`
/// convention used elsewhere for field metadata.
const RESTRICTION_REGEX: &str = "_restriction_regex";
const RESTRICTION_ENUM: &str = "_restriction_enum";
const RESTRICTION_MIN: &str = "_restriction_min";
const RESTRICTION_MAX: &str = "_restriction_max";

/// Compiled field-regex patterns are reused across validation passes rather than recompiled
/// per instance, keyed by the pattern text itself.
static PATTERN_CACHE: Lazy<Mutex<HashMap<String, Regex>>> = Lazy::new(|| Mutex::new(HashMap::new()));

fn matches_pattern(pattern: &str, s: &str) -> bool {
    let mut cache = PATTERN_CACHE.lock().expect("pattern cache poisoned");
    if let Some(re) = cache.get(pattern) {
        return re.is_match(s);
    }
    match Regex::new(pattern) {
        Ok(re) => {
            let matched = re.is_match(s);
            cache.insert(pattern.to_string(), re);
            matched
        }
        // An unparseable pattern can't reject anything; treat it as non-restrictive.
        Err(_) => true,
    }
}

/// Enforces regex, enum, and value-range restrictions declared as field annotations. Only
/// checks values present on the instance; a missing value is the required-field rule's
/// concern, not this one's.
pub fn check_illegal_value(
    inst_id: &ElemId,
    value: &BTreeMap<String, Value>,
    object: &crate::elements::types::ObjectType,
    errors: &mut Vec<ValidationError>,
) {
    for (name, v) in value {
        let Some(field) = object.fields.get(name) else { continue };
        let Value::Primitive(primitive) = v else { continue };

        if let Some(Value::Primitive(Primitive::String(pattern))) = field.annotations.get(RESTRICTION_REGEX) {
            if let Primitive::String(s) = primitive {
                if !matches_pattern(pattern, s) {
                    errors.push(ValidationError::IllegalValue {
                        id: inst_id.clone(),
                        field: name.clone(),
                        reason: format!("regex /{pattern}/"),
                        range: None,
                    });
                }
            }
        }

        if let Some(Value::List(allowed)) = field.annotations.get(RESTRICTION_ENUM) {
            let matches = allowed.iter().any(|a| a == v);
            if !matches {
                errors.push(ValidationError::IllegalValue {
                    id: inst_id.clone(),
                    field: name.clone(),
                    reason: "enum".to_string(),
                    range: None,
                });
            }
        }

        if let Primitive::Number(n) = primitive {
            if let Some(Value::Primitive(Primitive::Number(min))) = field.annotations.get(RESTRICTION_MIN) {
                if n < min {
                    errors.push(ValidationError::IllegalValue {
                        id: inst_id.clone(),
                        field: name.clone(),
                        reason: format!("minimum value {min}"),
                        range: None,
                    });
                }
            }
            if let Some(Value::Primitive(Primitive::Number(max))) = field.annotations.get(RESTRICTION_MAX) {
                if n > max {
                    errors.push(ValidationError::IllegalValue {
                        id: inst_id.clone(),
                        field: name.clone(),
                        reason: format!("maximum value {max}"),
                        range: None,
                    });
                }
            }
        }
    }
}

fn value_conforms(value: &Value, declared: &ElemId, universe: &BTreeMap<String, Element>) -> bool {
    // Container and object types live in the universe even when, like containers, they carry no
    // adapter; check there first so a container type isn't mistaken for a bare primitive name.
    match universe.get(&declared.get_full_name()) {
        Some(Element::Object(_)) => return matches!(value, Value::Map(_) | Value::Reference(_)),
        Some(Element::Container(container)) => return container_conforms(value, container, universe),
        Some(_) => return true,
        None => {}
    }
    if declared.adapter.is_empty() {
        let expected = match declared.type_name.as_str() {
            "string" => Some(PrimitiveKind::String),
            "number" => Some(PrimitiveKind::Number),
            "boolean" => Some(PrimitiveKind::Boolean),
            "unknown" => None,
            _ => None,
        };
        return match (expected, value) {
            (Some(PrimitiveKind::String), Value::Primitive(Primitive::String(_))) => true,
            (Some(PrimitiveKind::Number), Value::Primitive(Primitive::Number(_))) => true,
            (Some(PrimitiveKind::Boolean), Value::Primitive(Primitive::Boolean(_))) => true,
            (None, _) => true,
            // A reference's resolved shape can't be checked without resolving it; trust it.
            (_, Value::Reference(_)) => true,
            _ => false,
        };
    }
    true
}

fn container_conforms(
    value: &Value,
    container: &crate::elements::types::ContainerType,
    universe: &BTreeMap<String, Element>,
) -> bool {
    use crate::elements::types::ContainerKind;
    match (&container.kind, value) {
        (_, Value::Reference(_)) => true,
        (ContainerKind::List, Value::List(items)) => {
            items.iter().all(|item| value_conforms(item, &container.inner.0, universe))
        }
        (ContainerKind::Map, Value::Map(entries)) => {
            entries.values().all(|v| value_conforms(v, &container.inner.0, universe))
        }
        _ => false,
    }
}
