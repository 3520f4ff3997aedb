//! Source ranges and the map from element full-names to the fragments that produced them.

use std::{
    collections::BTreeMap,
    fmt,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

/// A single position inside a source file.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Position {
    pub line: u32,
    pub col: u32,
    pub byte: usize,
}

impl Position {
    pub const fn new(line: u32, col: u32, byte: usize) -> Self {
        Self { line, col, byte }
    }
}

/// A half-open range `[start, end)` within a single NaCl file.
///
/// `col` and `byte` are canonical; `line` is derived from the token stream
/// while scanning and is not independently authoritative.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceRange {
    pub filename: PathBuf,
    pub start: Position,
    pub end: Position,
}

impl SourceRange {
    pub fn new(filename: impl Into<PathBuf>, start: Position, end: Position) -> Self {
        Self { filename: filename.into(), start, end }
    }

    /// A zero-width range at the start of `filename`, used for synthetic elements that have no
    /// real source fragment (e.g. elements materialized purely from hidden state).
    pub fn synthetic(filename: impl Into<PathBuf>) -> Self {
        let filename = filename.into();
        Self { filename, start: Position::default(), end: Position::default() }
    }

    pub fn contains_byte(&self, byte: usize) -> bool {
        byte >= self.start.byte && byte < self.end.byte
    }
}

impl fmt::Display for SourceRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}",
            self.filename.display(),
            self.start.line + 1,
            self.start.col + 1
        )
    }
}

/// Maps an element's full-name to the ordered list of source fragments it was assembled from.
///
/// An element with more than one entry was fragmented across files or blocks; the merger is
/// what folds those fragments into one canonical element.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SourceMap {
    ranges: BTreeMap<String, Vec<SourceRange>>,
}

impl SourceMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, full_name: impl Into<String>, range: SourceRange) {
        self.ranges.entry(full_name.into()).or_default().push(range);
    }

    pub fn get(&self, full_name: &str) -> &[SourceRange] {
        self.ranges.get(full_name).map_or(&[], |v| v.as_slice())
    }

    pub fn contains(&self, full_name: &str) -> bool {
        self.ranges.contains_key(full_name)
    }

    pub fn full_names(&self) -> impl Iterator<Item = &str> {
        self.ranges.keys().map(String::as_str)
    }

    /// Merges `other` into `self`, appending fragment lists for shared keys.
    pub fn extend(&mut self, other: SourceMap) {
        for (name, mut ranges) in other.ranges {
            self.ranges.entry(name).or_default().append(&mut ranges);
        }
    }

    /// Removes every range belonging to the given source file. Used when a file is edited or
    /// removed and its fragments need to be retracted from the map.
    pub fn retain_not_in_file(&mut self, file: &Path) {
        for ranges in self.ranges.values_mut() {
            ranges.retain(|r| r.filename != file);
        }
        self.ranges.retain(|_, ranges| !ranges.is_empty());
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ranges.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn range(file: &str) -> SourceRange {
        SourceRange::new(file, Position::new(0, 0, 0), Position::new(0, 5, 5))
    }

    #[test]
    fn push_and_get_round_trips() {
        let mut map = SourceMap::new();
        map.push("x.T", range("a.nacl"));
        map.push("x.T", range("b.nacl"));
        assert_eq!(map.get("x.T").len(), 2);
        assert!(map.get("x.missing").is_empty());
    }

    #[test]
    fn retain_not_in_file_drops_stale_fragments() {
        let mut map = SourceMap::new();
        map.push("x.T", range("a.nacl"));
        map.push("x.T", range("b.nacl"));
        map.retain_not_in_file(Path::new("a.nacl"));
        assert_eq!(map.get("x.T").len(), 1);
        assert_eq!(map.get("x.T")[0].filename, PathBuf::from("b.nacl"));
    }

    #[test]
    fn retain_not_in_file_drops_empty_keys_entirely() {
        let mut map = SourceMap::new();
        map.push("x.T", range("a.nacl"));
        map.retain_not_in_file(Path::new("a.nacl"));
        assert!(!map.contains("x.T"));
    }
}
