//! NaCl parser frontend: tokenize, build a block tree, lower into elements.

pub mod ast;
pub mod grammar;
pub mod lexer;
pub mod lower;

use std::collections::BTreeSet;
use std::path::Path;

use crate::elements::Element;
use crate::error::ParseError;
use crate::source_map::SourceMap;

/// The result of parsing one NaCl file: its elements, a source map from full-name to
/// fragment ranges, parse errors, and the set of element full-names referenced from within
/// the file.
#[derive(Debug)]
pub struct ParsedFile {
    pub elements: Vec<Element>,
    pub source_map: SourceMap,
    pub errors: Vec<ParseError>,
    pub referenced: BTreeSet<String>,
}

/// Whether the parser session tolerates `*` wildcard expressions. This is a property of the
/// parser session, fixed at construction, never a mutable global.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorRecoveryMode {
    Strict,
    Tolerant,
}

#[tracing::instrument(skip(text), fields(filename = %filename.display(), len = text.len()))]
pub fn parse(filename: &Path, text: &str, mode: ErrorRecoveryMode) -> ParsedFile {
    let error_recovery = matches!(mode, ErrorRecoveryMode::Tolerant);
    let mut parser = grammar::Parser::new(filename, text, error_recovery);
    let items = parser.parse_file();
    let lower::LowerResult { elements, source_map, referenced, errors: lower_errors } = lower::lower_file(items);

    let mut errors = parser.errors;
    errors.extend(lower_errors);
    if !errors.is_empty() {
        tracing::debug!(count = errors.len(), "file parsed with errors");
    }
    ParsedFile { elements, source_map, errors, referenced }
}
