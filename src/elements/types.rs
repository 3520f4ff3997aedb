//! Type elements: primitive types, object types, fields, and container types.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::elements::value::Value;
use crate::id::ElemId;
use crate::source_map::SourceRange;

/// The kind carried by a [`PrimitiveType`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PrimitiveKind {
    String,
    Number,
    Boolean,
    Unknown,
}

/// A reference to a type by ElemID, as it appears in a field declaration or container type.
/// Resolved against the element universe at validation time, not at parse/merge time.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TypeRef(pub ElemId);

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PrimitiveType {
    pub elem_id: ElemId,
    pub kind: PrimitiveKind,
    pub annotations: BTreeMap<String, Value>,
    pub annotation_types: BTreeMap<String, TypeRef>,
    pub path: Option<Vec<String>>,
}

impl PrimitiveType {
    pub fn new(elem_id: ElemId, kind: PrimitiveKind) -> Self {
        Self { elem_id, kind, annotations: BTreeMap::new(), annotation_types: BTreeMap::new(), path: None }
    }
}

/// A field declared on an [`ObjectType`]: a name, a declared type reference, and annotations.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Field {
    pub parent: ElemId,
    pub name: String,
    pub field_type: TypeRef,
    pub annotations: BTreeMap<String, Value>,
}

impl Field {
    pub fn new(parent: ElemId, name: impl Into<String>, field_type: TypeRef) -> Self {
        Self { parent, name: name.into(), field_type, annotations: BTreeMap::new() }
    }

    pub fn elem_id(&self) -> ElemId {
        self.parent.create_nested_id(&["field", &self.name])
    }

    pub fn is_required(&self) -> bool {
        matches!(self.annotations.get("_required"), Some(Value::Primitive(crate::elements::value::Primitive::Boolean(true))))
    }
}

/// An object type: a mapping from field name to [`Field`], plus its own annotations.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ObjectType {
    pub elem_id: ElemId,
    pub fields: BTreeMap<String, Field>,
    pub annotations: BTreeMap<String, Value>,
    pub annotation_types: BTreeMap<String, TypeRef>,
    pub is_settings: bool,
    pub path: Option<Vec<String>>,
}

impl ObjectType {
    pub fn new(elem_id: ElemId) -> Self {
        Self {
            elem_id,
            fields: BTreeMap::new(),
            annotations: BTreeMap::new(),
            annotation_types: BTreeMap::new(),
            is_settings: false,
            path: None,
        }
    }

    pub fn with_field(mut self, field: Field) -> Self {
        self.fields.insert(field.name.clone(), field);
        self
    }
}

/// A container type wrapping an inner type reference: `list<T>` or `map<T>`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ContainerKind {
    List,
    Map,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ContainerType {
    pub elem_id: ElemId,
    pub kind: ContainerKind,
    pub inner: TypeRef,
}

impl ContainerType {
    pub fn list(elem_id: ElemId, inner: TypeRef) -> Self {
        Self { elem_id, kind: ContainerKind::List, inner }
    }

    pub fn map(elem_id: ElemId, inner: TypeRef) -> Self {
        Self { elem_id, kind: ContainerKind::Map, inner }
    }
}

/// A fragment-level merge conflict location, attached to merge errors so the report layer can
/// show every contributing [`SourceRange`].
#[derive(Clone, Debug)]
pub struct Located<T> {
    pub value: T,
    pub range: SourceRange,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_elem_id_is_nested_under_parent() {
        let parent = ElemId::top_level_type("x", "T");
        let field = Field::new(parent.clone(), "Name", TypeRef(ElemId::top_level_type("", "string")));
        assert_eq!(field.elem_id().get_full_name(), "x.T.field.Name");
    }

    #[test]
    fn required_field_reads_required_annotation() {
        let mut field = Field::new(
            ElemId::top_level_type("x", "T"),
            "Name",
            TypeRef(ElemId::top_level_type("", "string")),
        );
        assert!(!field.is_required());
        field.annotations.insert("_required".into(), Value::boolean(true));
        assert!(field.is_required());
    }
}
