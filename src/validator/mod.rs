//! Validates merged elements against type, reference, and value constraints.
//!
//! Validation is elementwise and non-mutating: it accepts a subset of elements to check plus
//! the full element universe for reference resolution, and never writes back to either.

pub mod rules;

use std::collections::BTreeMap;

use crate::elements::Element;
use crate::error::ValidationError;
use crate::id::ElemId;

#[tracing::instrument(skip(subset, universe), fields(subset_len = subset.len()))]
pub fn validate(subset: &[ElemId], universe: &BTreeMap<String, Element>) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    for id in subset {
        let Some(element) = universe.get(&id.get_full_name()) else { continue };
        match element {
            Element::Instance(inst) => {
                for v in inst.value.values() {
                    rules::check_unresolved_references(&inst.elem_id, v, universe, &mut errors);
                }
                rules::check_cyclic_reference(&inst.elem_id, universe, &mut errors);
                let owner_full = format!("{}.{}", inst.instance_type.0.adapter, inst.instance_type.0.type_name);
                if let Some(Element::Object(object)) = universe.get(&owner_full) {
                    rules::check_missing_required(&inst.elem_id, &inst.value, object, &mut errors);
                    rules::check_type_conformance(&inst.elem_id, &inst.value, object, universe, &mut errors);
                    rules::check_illegal_value(&inst.elem_id, &inst.value, object, &mut errors);
                }
            }
            Element::Object(object) => {
                for value in object.annotations.values() {
                    rules::check_unresolved_references(&object.elem_id, value, universe, &mut errors);
                }
            }
            _ => {}
        }
    }
    if !errors.is_empty() {
        tracing::debug!(count = errors.len(), "validation produced errors");
    }
    errors
}
