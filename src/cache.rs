//! On-disk parse cache, keyed by file path + content hash.
//!
//! Mirrors the format-tagged, content-hash-keyed cache record pattern used for build caches in
//! this corpus: a single JSON document mapping file path to a record that round-trips through
//! [`crate::parser::parse`] without loss, so a cache hit can bypass the parser entirely.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::elements::Element;
use crate::error::{ParseError, Result};
use crate::source_map::SourceMap;
use crate::utils;

const CACHE_FORMAT: &str = "nacl-workspace-cache-v1";

/// One file's cached parse result.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CacheEntry {
    pub content_hash: String,
    pub elements: Vec<Element>,
    pub source_map: SourceMap,
    pub referenced: BTreeSet<String>,
    pub errors: Vec<ParseError>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NaclFilesCache {
    #[serde(rename = "_format")]
    format: String,
    files: BTreeMap<PathBuf, CacheEntry>,
}

impl Default for NaclFilesCache {
    fn default() -> Self {
        Self { format: CACHE_FORMAT.to_string(), files: BTreeMap::new() }
    }
}

impl NaclFilesCache {
    pub fn new() -> Self {
        Self::default()
    }

    #[tracing::instrument(fields(path = %path.display()))]
    pub fn read(path: &Path) -> Result<Self> {
        let cache: Self = utils::read_json_file(path)?;
        if cache.format != CACHE_FORMAT {
            tracing::warn!(found = %cache.format, expected = CACHE_FORMAT, "cache format mismatch, ignoring");
            return Ok(Self::new());
        }
        Ok(cache)
    }

    /// Loads the cache at `path` if present, falling back to an empty cache on any read or
    /// deserialization failure.
    pub fn read_or_default(path: &Path) -> Self {
        if !path.exists() {
            return Self::new();
        }
        Self::read(path).unwrap_or_else(|err| {
            tracing::warn!(%err, path = %path.display(), "failed to read parse cache, starting empty");
            Self::new()
        })
    }

    #[tracing::instrument(skip(self), fields(path = %path.display(), entries = self.files.len()))]
    pub fn write(&self, path: &Path) -> Result<()> {
        utils::write_json_file(self, path)
    }

    /// Returns the cached entry for `file` only if its stored content hash matches
    /// `content_hash`.
    pub fn get(&self, file: &Path, content_hash: &str) -> Option<&CacheEntry> {
        let entry = self.files.get(file)?;
        (entry.content_hash == content_hash).then_some(entry)
    }

    pub fn insert(&mut self, file: PathBuf, entry: CacheEntry) {
        self.files.insert(file, entry);
    }

    pub fn remove(&mut self, file: &Path) {
        self.files.remove(file);
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(hash: &str) -> CacheEntry {
        CacheEntry {
            content_hash: hash.to_string(),
            elements: Vec::new(),
            source_map: SourceMap::new(),
            referenced: BTreeSet::new(),
            errors: Vec::new(),
        }
    }

    #[test]
    fn get_misses_on_stale_content_hash() {
        let mut cache = NaclFilesCache::new();
        cache.insert(PathBuf::from("a.nacl"), entry("old-hash"));
        assert!(cache.get(Path::new("a.nacl"), "new-hash").is_none());
        assert!(cache.get(Path::new("a.nacl"), "old-hash").is_some());
    }

    #[test]
    fn write_then_read_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");
        let mut cache = NaclFilesCache::new();
        cache.insert(PathBuf::from("a.nacl"), entry("hash-a"));
        cache.write(&path).unwrap();

        let reloaded = NaclFilesCache::read(&path).unwrap();
        assert_eq!(reloaded.len(), 1);
        assert!(reloaded.get(Path::new("a.nacl"), "hash-a").is_some());
    }

    #[test]
    fn read_or_default_falls_back_on_missing_file() {
        let cache = NaclFilesCache::read_or_default(Path::new("/does/not/exist.json"));
        assert!(cache.is_empty());
    }
}
