//! Instance elements.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::elements::types::TypeRef;
use crate::elements::value::Value;
use crate::id::ElemId;

/// Annotations recognized on instance elements. Only this fixed set may appear.
pub const INSTANCE_ANNOTATIONS: &[&str] = &["_depends_on", "_generated_dependencies", "_hidden_value"];

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct InstanceElement {
    pub elem_id: ElemId,
    pub instance_type: TypeRef,
    pub value: BTreeMap<String, Value>,
    pub annotations: BTreeMap<String, Value>,
    pub path: Option<Vec<String>>,
}

impl InstanceElement {
    pub fn new(elem_id: ElemId, instance_type: TypeRef) -> Self {
        Self { elem_id, instance_type, value: BTreeMap::new(), annotations: BTreeMap::new(), path: None }
    }

    pub fn is_hidden(&self) -> bool {
        matches!(
            self.annotations.get("_hidden_value"),
            Some(Value::Primitive(crate::elements::value::Primitive::Boolean(true)))
        )
    }

    pub fn get_value_at(&self, path: &[String]) -> Option<&Value> {
        let (first, rest) = path.split_first()?;
        let mut current = self.value.get(first)?;
        for segment in rest {
            current = match current {
                Value::Map(m) => m.get(segment)?,
                Value::List(l) => l.get(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_value_at_walks_nested_map() {
        let mut inst = InstanceElement::new(
            ElemId::top_level_instance("x", "T", "a"),
            TypeRef(ElemId::top_level_type("x", "T")),
        );
        let mut nested = BTreeMap::new();
        nested.insert("b".to_string(), Value::string("val"));
        inst.value.insert("a".to_string(), Value::Map(nested));
        assert_eq!(
            inst.get_value_at(&["a".to_string(), "b".to_string()]),
            Some(&Value::string("val"))
        );
        assert_eq!(inst.get_value_at(&["missing".to_string()]), None);
    }

    #[test]
    fn is_hidden_reads_hidden_value_annotation() {
        let mut inst = InstanceElement::new(
            ElemId::top_level_instance("x", "T", "a"),
            TypeRef(ElemId::top_level_type("x", "T")),
        );
        assert!(!inst.is_hidden());
        inst.annotations.insert("_hidden_value".into(), Value::boolean(true));
        assert!(inst.is_hidden());
    }
}
