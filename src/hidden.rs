//! Hidden-value overlay: a separate state store holding previously-fetched elements, including
//! fields marked `_hidden_value = true`, layered on top of the merged NaCl view after the
//! merger runs.

use std::collections::BTreeMap;

use crate::elements::value::Value;
use crate::elements::{Element, InstanceElement};
use crate::id::ElemId;

/// Previously fetched element state, keyed by full-name. Distinct from the NaCl-file-backed
/// sources: nothing here round-trips back to a `.nacl` file unless `handle_hidden_changes`
/// explicitly strips the hidden parts out and routes the rest back.
#[derive(Clone, Debug, Default)]
pub struct StateStore {
    elements: BTreeMap<String, Element>,
}

impl StateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, element: Element) {
        self.elements.insert(element.elem_id().get_full_name(), element);
    }

    pub fn get(&self, id: &ElemId) -> Option<&Element> {
        self.elements.get(&id.get_full_name())
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }
}

/// Layers hidden state on top of a merged NaCl-derived element map: the overlay contributes
/// hidden-only state values and copies hidden annotations onto matching NaCl elements.
///
/// - Elements present only in `state` (no NaCl fragment at all) are added wholesale.
/// - For elements present in both, hidden-only instance values (keys absent from the NaCl
///   element but present in state) are copied across, and hidden annotations are copied across
///   unconditionally, without touching any value the NaCl element already defines.
#[tracing::instrument(skip(merged, state))]
pub fn apply_hidden_overlay(merged: &mut BTreeMap<String, Element>, state: &StateStore) {
    for (full_name, hidden_element) in &state.elements {
        match merged.get_mut(full_name) {
            None => {
                merged.insert(full_name.clone(), hidden_element.clone());
            }
            Some(existing) => {
                if let (Element::Instance(existing_inst), Element::Instance(hidden_inst)) =
                    (existing, hidden_element)
                {
                    for (key, value) in &hidden_inst.value {
                        existing_inst.value.entry(key.clone()).or_insert_with(|| value.clone());
                    }
                    for (key, value) in &hidden_inst.annotations {
                        existing_inst.annotations.insert(key.clone(), value.clone());
                    }
                }
            }
        }
    }
}

/// Splits the routed-back changes from an editor operation into NaCl-bound changes and
/// hidden-only changes, stripping the latter before anything reaches `updateNaclFiles`.
pub fn handle_hidden_changes(instance: &InstanceElement) -> (InstanceElement, BTreeMap<String, Value>) {
    let mut visible = instance.clone();
    let mut hidden_values = BTreeMap::new();
    if instance.is_hidden() {
        hidden_values = std::mem::take(&mut visible.value);
    }
    (visible, hidden_values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::elements::types::TypeRef;
    use crate::id::ElemId;

    fn instance(full_name_parts: (&str, &str, &str)) -> InstanceElement {
        let (adapter, type_name, name) = full_name_parts;
        InstanceElement::new(
            ElemId::top_level_instance(adapter, type_name, name),
            TypeRef(ElemId::top_level_type(adapter, type_name)),
        )
    }

    #[test]
    fn hidden_only_element_is_added_wholesale() {
        let mut merged = BTreeMap::new();
        let mut state = StateStore::new();
        state.set(Element::Instance(instance(("x", "T", "secret"))));

        apply_hidden_overlay(&mut merged, &state);
        assert!(merged.contains_key("x.T.instance.secret"));
    }

    #[test]
    fn hidden_value_is_copied_onto_existing_nacl_instance_without_overwriting() {
        let mut visible = instance(("x", "T", "acme"));
        visible.value.insert("name".into(), Value::string("Acme"));
        let mut merged = BTreeMap::new();
        merged.insert(visible.elem_id.get_full_name(), Element::Instance(visible));

        let mut hidden = instance(("x", "T", "acme"));
        hidden.value.insert("name".into(), Value::string("should-not-overwrite"));
        hidden.value.insert("apiKey".into(), Value::string("hidden-secret"));
        let mut state = StateStore::new();
        state.set(Element::Instance(hidden));

        apply_hidden_overlay(&mut merged, &state);
        let Element::Instance(result) = &merged["x.T.instance.acme"] else { panic!() };
        assert_eq!(result.value.get("name"), Some(&Value::string("Acme")));
        assert_eq!(result.value.get("apiKey"), Some(&Value::string("hidden-secret")));
    }

    #[test]
    fn hidden_changes_are_stripped_before_routing_to_files() {
        let mut hidden_inst = instance(("x", "T", "acme"));
        hidden_inst.annotations.insert("_hidden_value".into(), Value::boolean(true));
        hidden_inst.value.insert("apiKey".into(), Value::string("secret"));

        let (visible, hidden_values) = handle_hidden_changes(&hidden_inst);
        assert!(visible.value.is_empty());
        assert_eq!(hidden_values.get("apiKey"), Some(&Value::string("secret")));
    }
}
