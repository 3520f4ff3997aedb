//! Unified error type for the workspace pipeline.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::id::ElemId;
use crate::source_map::SourceRange;

/// Severity attached to every error and warning that survives to the caller.
///
/// Distinguishes parse/merge errors (always fatal to the fragment that produced them) from
/// validation errors (which may be warnings).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl Severity {
    pub fn is_error(self) -> bool {
        matches!(self, Severity::Error)
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Error => f.write_str("error"),
            Severity::Warning => f.write_str("warning"),
            Severity::Info => f.write_str("info"),
        }
    }
}

/// A single lexer/grammar failure, anchored at a [`SourceRange`].
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
#[error("{range}: {message}")]
pub struct ParseError {
    pub range: SourceRange,
    pub message: String,
    pub severity: Severity,
}

/// Failures raised while folding fragments into merged elements.
#[derive(Debug, Clone, Error)]
pub enum MergeError {
    #[error("duplicate annotation value for {id} ({first} vs {second})")]
    DuplicateAnnotation { id: ElemId, first: SourceRange, second: SourceRange },
    #[error("conflicting definitions for {id}")]
    Duplicate { id: ElemId, locations: Vec<SourceRange> },
    #[error("duplicate instance key {key:?} on list {id}")]
    DuplicateInstanceKey { id: ElemId, key: String, locations: Vec<SourceRange> },
    #[error("conflicting field type for {id}")]
    ConflictingFieldType { id: ElemId, locations: Vec<SourceRange> },
    #[error("conflicting isSettings value for {id}")]
    ConflictingSetting { id: ElemId, locations: Vec<SourceRange> },
}

impl MergeError {
    pub fn id(&self) -> &ElemId {
        match self {
            MergeError::DuplicateAnnotation { id, .. }
            | MergeError::Duplicate { id, .. }
            | MergeError::DuplicateInstanceKey { id, .. }
            | MergeError::ConflictingFieldType { id, .. }
            | MergeError::ConflictingSetting { id, .. } => id,
        }
    }

    pub fn severity(&self) -> Severity {
        Severity::Error
    }
}

/// Failures raised while checking merged elements against type constraints.
#[derive(Debug, Clone, Error)]
pub enum ValidationError {
    #[error("{id}: value does not conform to its declared type")]
    InvalidValue { id: ElemId, range: Option<SourceRange> },
    #[error("{id}: value for field {field} violates its {reason} restriction")]
    IllegalValue { id: ElemId, field: String, reason: String, range: Option<SourceRange> },
    #[error("{id}: unresolved reference {target}")]
    UnresolvedReference { id: ElemId, target: ElemId, range: Option<SourceRange> },
    #[error("{id}: reference cycle detected")]
    CyclicReference { id: ElemId, cycle: Vec<ElemId> },
    #[error("{id}: missing required field {field}")]
    MissingRequiredField { id: ElemId, field: String },
}

impl ValidationError {
    pub fn id(&self) -> &ElemId {
        match self {
            ValidationError::InvalidValue { id, .. }
            | ValidationError::IllegalValue { id, .. }
            | ValidationError::UnresolvedReference { id, .. }
            | ValidationError::CyclicReference { id, .. }
            | ValidationError::MissingRequiredField { id, .. } => id,
        }
    }

    /// Validation errors are warnings unless they would make the element unusable downstream:
    /// unresolved references and cycles are always hard errors.
    pub fn severity(&self) -> Severity {
        match self {
            ValidationError::UnresolvedReference { .. } | ValidationError::CyclicReference { .. } => {
                Severity::Error
            }
            ValidationError::InvalidValue { .. }
            | ValidationError::IllegalValue { .. }
            | ValidationError::MissingRequiredField { .. } => Severity::Warning,
        }
    }
}

/// Failures raised by the workspace/editor-workspace state machine itself, as opposed to
/// errors surfaced about the elements it manages.
#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error("unknown environment {0:?}")]
    UnknownEnvironment(String),
    #[error("no such NaCl file: {}", .0.display())]
    NoSuchFile(PathBuf),
    #[error("io error at {}: {source}", .path.display())]
    Io { path: PathBuf, #[source] source: std::io::Error },
    #[error("cache error: {0}")]
    Cache(String),
    #[error("path {} is outside the workspace base dir", .0.display())]
    PathOutsideBaseDir(PathBuf),
}

/// The crate-wide error type. Every fallible public operation returns `Result<T>`.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Merge(#[from] MergeError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Workspace(#[from] WorkspaceError),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub fn severity(&self) -> Severity {
        match self {
            Error::Parse(e) => e.severity,
            Error::Merge(e) => e.severity(),
            Error::Validation(e) => e.severity(),
            Error::Workspace(_) | Error::Json(_) => Severity::Error,
        }
    }

    /// Groups related errors for the report layer: merge/validation errors group by the
    /// top-level element they're attached to, everything else groups by source file (or
    /// a fixed key for errors with no file at all).
    pub fn group_key(&self) -> String {
        match self {
            Error::Parse(e) => e.range.filename.display().to_string(),
            Error::Merge(e) => e.id().top_level_full_name(),
            Error::Validation(e) => e.id().top_level_full_name(),
            Error::Workspace(_) => "<workspace>".to_string(),
            Error::Json(_) => "<json>".to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source_map::Position;

    #[test]
    fn parse_error_displays_range_and_message() {
        let err = ParseError {
            range: SourceRange::new("a.nacl", Position::new(1, 2, 10), Position::new(1, 5, 13)),
            message: "unexpected token".into(),
            severity: Severity::Error,
        };
        assert_eq!(err.to_string(), "a.nacl:2:3: unexpected token");
    }

    #[test]
    fn validation_error_severity_matches_spec_rules() {
        let id = ElemId::top_level_type("x", "T");
        let unresolved = ValidationError::UnresolvedReference {
            id: id.clone(),
            target: ElemId::top_level_type("x", "Other"),
            range: None,
        };
        assert_eq!(unresolved.severity(), Severity::Error);

        let missing = ValidationError::MissingRequiredField { id, field: "name".into() };
        assert_eq!(missing.severity(), Severity::Warning);
    }
}
