//! The element model: types, instances, and the container types that wrap them, unified
//! behind a single [`Element`] enum.

pub mod instance;
pub mod types;
pub mod value;

use serde::{Deserialize, Serialize};

use crate::id::ElemId;

pub use instance::InstanceElement;
pub use types::{ContainerType, Field, ObjectType, PrimitiveKind, PrimitiveType, TypeRef};
pub use value::{Primitive, ReferenceExpression, StaticFile, Value};

/// A top-level (or nested-field-bearing) element, as produced by the parser's lowering pass
/// and refined by the merger.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum Element {
    Primitive(PrimitiveType),
    Object(ObjectType),
    Container(ContainerType),
    Instance(InstanceElement),
}

impl Element {
    pub fn elem_id(&self) -> &ElemId {
        match self {
            Element::Primitive(p) => &p.elem_id,
            Element::Object(o) => &o.elem_id,
            Element::Container(c) => &c.elem_id,
            Element::Instance(i) => &i.elem_id,
        }
    }

    pub fn path(&self) -> Option<&[String]> {
        match self {
            Element::Primitive(p) => p.path.as_deref(),
            Element::Object(o) => o.path.as_deref(),
            Element::Container(_) => None,
            Element::Instance(i) => i.path.as_deref(),
        }
    }

    /// A short tag used by the merger to detect element-kind mismatches within a fragment
    /// group.
    pub fn kind_tag(&self) -> &'static str {
        match self {
            Element::Primitive(_) => "primitive",
            Element::Object(_) => "object",
            Element::Container(_) => "container",
            Element::Instance(_) => "instance",
        }
    }

    pub fn as_object(&self) -> Option<&ObjectType> {
        match self {
            Element::Object(o) => Some(o),
            _ => None,
        }
    }

    pub fn as_object_mut(&mut self) -> Option<&mut ObjectType> {
        match self {
            Element::Object(o) => Some(o),
            _ => None,
        }
    }

    pub fn as_instance(&self) -> Option<&InstanceElement> {
        match self {
            Element::Instance(i) => Some(i),
            _ => None,
        }
    }

    pub fn as_primitive(&self) -> Option<&PrimitiveType> {
        match self {
            Element::Primitive(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_container(&self) -> Option<&ContainerType> {
        match self {
            Element::Container(c) => Some(c),
            _ => None,
        }
    }
}
