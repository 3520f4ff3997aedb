//! The recursive [`Value`] tagged union.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::id::ElemId;

/// A primitive scalar value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Primitive {
    String(String),
    Number(f64),
    Boolean(bool),
}

/// A reference to another element, optionally carrying a cached resolved value.
///
/// The cache is a hint, never authoritative: resolvers must be willing to ignore it and
/// re-resolve against the current merged map.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReferenceExpression {
    pub target: ElemId,
    pub resolved: Option<Box<Value>>,
}

impl ReferenceExpression {
    pub fn new(target: ElemId) -> Self {
        Self { target, resolved: None }
    }

    pub fn with_resolved(target: ElemId, resolved: Value) -> Self {
        Self { target, resolved: Some(Box::new(resolved)) }
    }
}

impl PartialEq for ReferenceExpression {
    fn eq(&self, other: &Self) -> bool {
        self.target == other.target
    }
}

/// A file whose content lives outside the NaCl source and is identified by content hash.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StaticFile {
    pub filepath: PathBuf,
    pub content_hash: String,
}

impl StaticFile {
    pub fn new(filepath: impl Into<PathBuf>, content_hash: impl Into<String>) -> Self {
        Self { filepath: filepath.into(), content_hash: content_hash.into() }
    }

    /// Builds a [`StaticFile`] from raw bytes, hashing with the same digest the on-disk cache
    /// uses to key parsed fragments.
    pub fn from_bytes(filepath: impl Into<PathBuf>, bytes: &[u8]) -> Self {
        Self::new(filepath, crate::utils::hash_bytes(bytes))
    }
}

impl PartialEq for StaticFile {
    fn eq(&self, other: &Self) -> bool {
        self.content_hash == other.content_hash
    }
}

/// A NaCl value: primitive, list, mapping, reference, or static file.
///
/// Deliberately not an untyped JSON-like blob: each variant is a distinct case so the merger,
/// validator, and transform walker can pattern-match exhaustively.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Primitive(Primitive),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
    Reference(ReferenceExpression),
    StaticFile(StaticFile),
}

impl Value {
    pub fn string(s: impl Into<String>) -> Self {
        Value::Primitive(Primitive::String(s.into()))
    }

    pub fn number(n: f64) -> Self {
        Value::Primitive(Primitive::Number(n))
    }

    pub fn boolean(b: bool) -> Self {
        Value::Primitive(Primitive::Boolean(b))
    }

    pub fn as_reference(&self) -> Option<&ReferenceExpression> {
        match self {
            Value::Reference(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(l) => Some(l),
            _ => None,
        }
    }

    /// Walks the value tree, calling `callback` at every node with its path from the root.
    /// A `None` return from the callback drops the node; empty lists/maps left behind by a
    /// drop are themselves dropped.
    ///
    /// Reference expressions are passed to the callback but never recursed into: rewriting a
    /// reference's target is the callback's job, not the walker's.
    pub fn transform(
        &self,
        path: &mut Vec<String>,
        callback: &mut dyn FnMut(&Value, &[String]) -> Option<Value>,
    ) -> Option<Value> {
        if let Value::Reference(_) = self {
            return callback(self, path);
        }
        let transformed = match self {
            Value::List(items) => {
                let mut out = Vec::new();
                for (i, item) in items.iter().enumerate() {
                    path.push(i.to_string());
                    if let Some(v) = item.transform(path, callback) {
                        out.push(v);
                    }
                    path.pop();
                }
                if out.is_empty() { None } else { Some(Value::List(out)) }
            }
            Value::Map(entries) => {
                let mut out = BTreeMap::new();
                for (k, v) in entries {
                    path.push(k.clone());
                    if let Some(v) = v.transform(path, callback) {
                        out.insert(k.clone(), v);
                    }
                    path.pop();
                }
                if out.is_empty() { None } else { Some(Value::Map(out)) }
            }
            other => Some(other.clone()),
        };
        match transformed {
            Some(v) => callback(&v, path),
            None => None,
        }
    }
}
