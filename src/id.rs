//! Structured element identifiers.
//!
//! An [`ElemId`] is a tuple `(adapter, type_name, id_type, name_parts)`. Its canonical string
//! form is what the merger, validator, and on-disk cache key elements by, so equality and
//! hashing are defined in terms of that string rather than the tuple fields directly.

use std::fmt;

use serde::{Deserialize, Serialize};

pub const ID_SEPARATOR: char = '.';
pub const INSTANCE_ANNOTATION_SEPARATOR: &str = "_";

/// What kind of name a path segment chain resolves to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IdType {
    Type,
    Field,
    Attr,
    Annotation,
    Instance,
    Var,
}

impl IdType {
    fn as_str(self) -> &'static str {
        match self {
            IdType::Type => "type",
            IdType::Field => "field",
            IdType::Attr => "attr",
            IdType::Annotation => "annotation",
            IdType::Instance => "instance",
            IdType::Var => "var",
        }
    }
}

/// A structured element identifier.
///
/// `name_parts` holds everything after `(adapter, type_name)`: for a top-level type or instance
/// it is empty or a single instance name; for a nested field/attribute/annotation path it is the
/// full chain of path segments below the top-level element.
#[derive(Clone, Debug, Eq, Serialize, Deserialize)]
pub struct ElemId {
    pub adapter: String,
    pub type_name: String,
    pub id_type: IdType,
    pub name_parts: Vec<String>,
}

impl ElemId {
    pub fn new(
        adapter: impl Into<String>,
        type_name: impl Into<String>,
        id_type: IdType,
        name_parts: Vec<String>,
    ) -> Self {
        Self { adapter: adapter.into(), type_name: type_name.into(), id_type, name_parts }
    }

    /// A top-level type ID, e.g. `salesforce.Account`.
    pub fn top_level_type(adapter: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self::new(adapter, type_name, IdType::Type, Vec::new())
    }

    /// A top-level instance ID, e.g. `salesforce.Account.instance.acme`.
    pub fn top_level_instance(
        adapter: impl Into<String>,
        type_name: impl Into<String>,
        instance_name: impl Into<String>,
    ) -> Self {
        Self::new(adapter, type_name, IdType::Instance, vec![instance_name.into()])
    }

    /// The canonical stable string form of this ID.
    ///
    /// Top-level type: `adapter.typeName`.
    /// Other id types: `adapter.typeName.idType.part1.part2...`.
    pub fn get_full_name(&self) -> String {
        let mut out = String::new();
        out.push_str(&self.adapter);
        out.push(ID_SEPARATOR);
        out.push_str(&self.type_name);
        if self.id_type != IdType::Type || !self.name_parts.is_empty() {
            out.push(ID_SEPARATOR);
            out.push_str(self.id_type.as_str());
            for part in &self.name_parts {
                out.push(ID_SEPARATOR);
                out.push_str(part);
            }
        }
        out
    }

    /// Whether this ID names a top-level element (a bare type with no nested path, or an
    /// instance/var with exactly one name part).
    pub fn is_top_level(&self) -> bool {
        match self.id_type {
            IdType::Type => self.name_parts.is_empty(),
            IdType::Instance | IdType::Var => self.name_parts.len() <= 1,
            _ => false,
        }
    }

    /// The full name of the top-level element that owns this ID.
    pub fn top_level_full_name(&self) -> String {
        self.create_top_level_parent_id().0.get_full_name()
    }

    /// Appends `parts` to this ID's name parts, returning a new, more deeply nested ID.
    ///
    /// Associative: `a.create_nested_id([x]).create_nested_id([y]) == a.create_nested_id([x, y])`.
    pub fn create_nested_id(&self, parts: &[&str]) -> Self {
        let mut name_parts = self.name_parts.clone();
        name_parts.extend(parts.iter().map(|p| p.to_string()));
        Self { adapter: self.adapter.clone(), type_name: self.type_name.clone(), id_type: self.id_type, name_parts }
    }

    /// The immediate parent of this ID: drops the last name part. Returns `None` for a
    /// top-level type ID, which has no parent.
    pub fn create_parent_id(&self) -> Option<Self> {
        if self.name_parts.is_empty() {
            return None;
        }
        let mut name_parts = self.name_parts.clone();
        name_parts.pop();
        Some(Self {
            adapter: self.adapter.clone(),
            type_name: self.type_name.clone(),
            id_type: self.id_type,
            name_parts,
        })
    }

    /// Splits this ID into `(top_level_id, remaining_path)`.
    ///
    /// Idempotent at the top level: calling this on an already-top-level ID returns itself and
    /// an empty path.
    pub fn create_top_level_parent_id(&self) -> (Self, Vec<String>) {
        match self.id_type {
            IdType::Type => {
                let top = Self::top_level_type(self.adapter.clone(), self.type_name.clone());
                (top, self.name_parts.clone())
            }
            IdType::Instance | IdType::Var => {
                if self.name_parts.is_empty() {
                    (self.clone(), Vec::new())
                } else {
                    let top = Self::new(
                        self.adapter.clone(),
                        self.type_name.clone(),
                        self.id_type,
                        vec![self.name_parts[0].clone()],
                    );
                    (top, self.name_parts[1..].to_vec())
                }
            }
            _ => {
                // field/attr/annotation IDs are always nested beneath a type.
                let top = Self::top_level_type(self.adapter.clone(), self.type_name.clone());
                (top, self.name_parts.clone())
            }
        }
    }

    /// Whether `self` is an ancestor of (or equal to) `other`.
    pub fn is_parent_of(&self, other: &Self) -> bool {
        if self.adapter != other.adapter || self.type_name != other.type_name {
            return false;
        }
        if self.id_type != other.id_type {
            return false;
        }
        other.name_parts.len() > self.name_parts.len()
            && other.name_parts[..self.name_parts.len()] == self.name_parts[..]
    }

    pub fn is_equal(&self, other: &Self) -> bool {
        self == other
    }

    /// Parses a canonical full-name string back into an [`ElemId`].
    ///
    /// `fromFullName(getFullName(x)) == x` for every `x` this module constructs.
    pub fn from_full_name(full_name: &str) -> Option<Self> {
        let mut parts = full_name.split(ID_SEPARATOR);
        let adapter = parts.next()?.to_string();
        let type_name = parts.next()?.to_string();
        let rest: Vec<&str> = parts.collect();
        if rest.is_empty() {
            return Some(Self::top_level_type(adapter, type_name));
        }
        let id_type = match rest[0] {
            "type" => IdType::Type,
            "field" => IdType::Field,
            "attr" => IdType::Attr,
            "annotation" => IdType::Annotation,
            "instance" => IdType::Instance,
            "var" => IdType::Var,
            _ => return None,
        };
        let name_parts = rest[1..].iter().map(|s| s.to_string()).collect();
        Some(Self { adapter, type_name, id_type, name_parts })
    }
}

impl PartialEq for ElemId {
    fn eq(&self, other: &Self) -> bool {
        self.get_full_name() == other.get_full_name()
    }
}

impl std::hash::Hash for ElemId {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.get_full_name().hash(state);
    }
}

impl fmt::Display for ElemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.get_full_name())
    }
}

impl Ord for ElemId {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.get_full_name().cmp(&other.get_full_name())
    }
}

impl PartialOrd for ElemId {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_name_round_trips_for_type() {
        let id = ElemId::top_level_type("salesforce", "Account");
        assert_eq!(id.get_full_name(), "salesforce.Account");
        assert_eq!(ElemId::from_full_name(&id.get_full_name()).unwrap(), id);
    }

    #[test]
    fn full_name_round_trips_for_nested_field() {
        let id = ElemId::top_level_type("salesforce", "Account").create_nested_id(&["field", "Name"]);
        let full = id.get_full_name();
        assert_eq!(full, "salesforce.Account.field.Name");
        assert_eq!(ElemId::from_full_name(&full).unwrap(), id);
    }

    #[test]
    fn create_nested_id_is_associative() {
        let base = ElemId::top_level_type("x", "T");
        let a = base.create_nested_id(&["field"]).create_nested_id(&["a"]);
        let b = base.create_nested_id(&["field", "a"]);
        assert_eq!(a, b);
    }

    #[test]
    fn create_top_level_parent_id_is_idempotent_at_top_level() {
        let top = ElemId::top_level_type("x", "T");
        let (parent, path) = top.create_top_level_parent_id();
        assert_eq!(parent, top);
        assert!(path.is_empty());
    }

    #[test]
    fn create_top_level_parent_id_splits_nested_path() {
        let nested = ElemId::top_level_type("x", "T").create_nested_id(&["field", "a", "b"]);
        let (parent, path) = nested.create_top_level_parent_id();
        assert_eq!(parent, ElemId::top_level_type("x", "T"));
        assert_eq!(path, vec!["field", "a", "b"]);
    }

    #[test]
    fn is_parent_of_checks_prefix() {
        let parent = ElemId::top_level_type("x", "T").create_nested_id(&["field", "a"]);
        let child = ElemId::top_level_type("x", "T").create_nested_id(&["field", "a", "b"]);
        assert!(parent.is_parent_of(&child));
        assert!(!child.is_parent_of(&parent));
    }

    #[test]
    fn instance_top_level_and_create_parent_id() {
        let inst = ElemId::top_level_instance("x", "T", "acme");
        assert!(inst.is_top_level());
        let nested = inst.create_nested_id(&["ref", "sub"]);
        assert!(!nested.is_top_level());
        let parent = nested.create_parent_id().unwrap();
        assert_eq!(parent, inst.create_nested_id(&["ref"]));
    }

    #[test]
    fn from_full_name_rejects_unknown_id_type() {
        assert!(ElemId::from_full_name("x.T.bogus.a").is_none());
    }
}
