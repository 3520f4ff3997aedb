//! Owns one directory of NaCl files as the source of element fragments for one environment.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use rayon::prelude::*;

use crate::cache::{CacheEntry, NaclFilesCache};
use crate::error::{ParseError, Result};
use crate::id::ElemId;
use crate::parser::{self, ErrorRecoveryMode, ParsedFile};
use crate::source_map::SourceRange;
use crate::utils;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChangeAction {
    Add,
    Modify,
    Remove,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Change {
    pub id: ElemId,
    pub action: ChangeAction,
}

/// One file's parse fragments plus the raw text it was parsed from (kept so `flush` can hash
/// it and so re-diffing on the next edit doesn't require re-reading disk).
struct FileRecord {
    text: String,
    parsed: ParsedFile,
}

/// A single directory's worth of NaCl files, reparsed incrementally as files are set/removed.
pub struct NaclFileSource {
    files: BTreeMap<PathBuf, FileRecord>,
    /// ElemID full-name -> files containing fragments of that element.
    elem_to_files: BTreeMap<String, BTreeSet<PathBuf>>,
    /// ElemID full-name -> files whose parse referenced it.
    referenced_by: BTreeMap<String, BTreeSet<PathBuf>>,
    cache: NaclFilesCache,
    cache_path: Option<PathBuf>,
    dirty: BTreeSet<PathBuf>,
}

impl NaclFileSource {
    pub fn new() -> Self {
        Self {
            files: BTreeMap::new(),
            elem_to_files: BTreeMap::new(),
            referenced_by: BTreeMap::new(),
            cache: NaclFilesCache::new(),
            cache_path: None,
            dirty: BTreeSet::new(),
        }
    }

    pub fn with_cache_path(cache_path: PathBuf) -> Self {
        let cache = NaclFilesCache::read_or_default(&cache_path);
        Self { cache_path: Some(cache_path), cache, ..Self::new() }
    }

    /// Builds a source by reading every `.nacl` file under `dir` off disk, reusing `cache_path`'s
    /// on-disk cache if it exists.
    pub fn load_from_dir(dir: &Path, cache_path: Option<PathBuf>) -> Result<Self> {
        let mut source = match cache_path {
            Some(path) => Self::with_cache_path(path),
            None => Self::new(),
        };
        let mut files = Vec::new();
        for path in utils::nacl_files_iter(dir) {
            let text = std::fs::read_to_string(&path)
                .map_err(|io_err| crate::error::Error::Workspace(crate::error::WorkspaceError::Io {
                    path: path.clone(),
                    source: io_err,
                }))?;
            files.push((path, text));
        }
        source.set_nacl_files(files);
        Ok(source)
    }

    /// Parses every file in `files`, fanning the CPU-bound parse out across `rayon`'s pool when
    /// a file isn't already cache-hit, then applies the parses to the indices one at a time so
    /// diffing against the old state stays deterministic.
    #[tracing::instrument(skip(self, files), fields(count = files.len()))]
    pub fn set_nacl_files(&mut self, files: Vec<(PathBuf, String)>) -> Vec<Change> {
        let parsed: Vec<(PathBuf, String, ParsedFile)> = files
            .into_par_iter()
            .map(|(name, buffer)| {
                let new_parsed = parse_with_cache(&self.cache, &name, &buffer);
                (name, buffer, new_parsed)
            })
            .collect();

        let mut changes: BTreeMap<String, ChangeAction> = BTreeMap::new();
        for (name, buffer, new_parsed) in parsed {
            let old = self.files.remove(&name);
            self.retract_indices(&name, old.as_ref().map(|r| &r.parsed));

            let old_full_names: BTreeSet<String> =
                old.as_ref().map(|r| r.parsed.source_map.full_names().map(str::to_string).collect()).unwrap_or_default();
            let new_full_names: BTreeSet<String> = new_parsed.source_map.full_names().map(str::to_string).collect();

            for full_name in &new_full_names {
                let action = if !old_full_names.contains(full_name) {
                    ChangeAction::Add
                } else {
                    ChangeAction::Modify
                };
                changes.insert(full_name.clone(), action);
            }
            for full_name in old_full_names.difference(&new_full_names) {
                changes.insert(full_name.clone(), ChangeAction::Remove);
            }

            self.apply_indices(&name, &new_parsed);
            self.dirty.insert(name.clone());
            self.files.insert(name, FileRecord { text: buffer, parsed: new_parsed });
        }
        changes
            .into_iter()
            .filter_map(|(full_name, action)| ElemId::from_full_name(&full_name).map(|id| Change { id, action }))
            .collect()
    }

    #[tracing::instrument(skip(self, names), fields(count = names.len()))]
    pub fn remove_nacl_files(&mut self, names: &[PathBuf]) -> Vec<Change> {
        let mut changes = Vec::new();
        for name in names {
            if let Some(record) = self.files.remove(name) {
                for full_name in record.parsed.source_map.full_names() {
                    if let Some(id) = ElemId::from_full_name(full_name) {
                        changes.push(Change { id, action: ChangeAction::Remove });
                    }
                }
                self.retract_indices(name, Some(&record.parsed));
            }
            self.cache.remove(name);
            self.dirty.insert(name.clone());
        }
        changes
    }

    fn retract_indices(&mut self, file: &Path, old: Option<&ParsedFile>) {
        let Some(old) = old else { return };
        for full_name in old.source_map.full_names() {
            if let Some(set) = self.elem_to_files.get_mut(full_name) {
                set.remove(file);
                if set.is_empty() {
                    self.elem_to_files.remove(full_name);
                }
            }
        }
        for full_name in &old.referenced {
            if let Some(set) = self.referenced_by.get_mut(full_name) {
                set.remove(file);
                if set.is_empty() {
                    self.referenced_by.remove(full_name);
                }
            }
        }
    }

    fn apply_indices(&mut self, file: &Path, parsed: &ParsedFile) {
        for full_name in parsed.source_map.full_names() {
            self.elem_to_files.entry(full_name.to_string()).or_default().insert(file.to_path_buf());
        }
        for full_name in &parsed.referenced {
            self.referenced_by.entry(full_name.clone()).or_default().insert(file.to_path_buf());
        }
    }

    pub fn get_parsed_nacl_file(&self, name: &Path) -> Option<&ParsedFile> {
        self.files.get(name).map(|r| &r.parsed)
    }

    pub fn get_source_map(&self, name: &Path) -> Option<&crate::source_map::SourceMap> {
        self.files.get(name).map(|r| &r.parsed.source_map)
    }

    pub fn get_source_ranges(&self, id: &ElemId) -> Vec<SourceRange> {
        let full_name = id.get_full_name();
        self.get_element_nacl_files(id)
            .into_iter()
            .filter_map(|file| self.files.get(&file))
            .flat_map(|record| record.parsed.source_map.get(&full_name).to_vec())
            .collect()
    }

    /// Files that contain a fragment of `id`.
    pub fn get_element_nacl_files(&self, id: &ElemId) -> BTreeSet<PathBuf> {
        self.elem_to_files.get(&id.get_full_name()).cloned().unwrap_or_default()
    }

    /// Files whose parse referenced `id` (the reverse index).
    pub fn get_element_references_to_files(&self, id: &ElemId) -> BTreeSet<PathBuf> {
        self.referenced_by.get(&id.get_full_name()).cloned().unwrap_or_default()
    }

    /// Files defining the elements that `id`'s own fragments reference.
    pub fn get_element_referenced_files(&self, id: &ElemId) -> BTreeSet<PathBuf> {
        let mut out = BTreeSet::new();
        for file in self.get_element_nacl_files(id) {
            let Some(record) = self.files.get(&file) else { continue };
            for referenced_full_name in &record.parsed.referenced {
                out.extend(self.elem_to_files.get(referenced_full_name).cloned().unwrap_or_default());
            }
        }
        out
    }

    pub fn list_nacl_files(&self) -> Vec<&PathBuf> {
        self.files.keys().collect()
    }

    pub fn contains_file(&self, name: &Path) -> bool {
        self.files.contains_key(name)
    }

    pub fn get_total_size(&self) -> usize {
        self.files.values().map(|r| r.text.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn clear(&mut self) {
        self.files.clear();
        self.elem_to_files.clear();
        self.referenced_by.clear();
        self.dirty.clear();
    }

    pub fn rename(&mut self, from: &Path, to: &Path) -> Result<()> {
        if let Some(record) = self.files.remove(from) {
            self.retract_indices(from, Some(&record.parsed));
            self.apply_indices(to, &record.parsed);
            self.dirty.insert(to.to_path_buf());
            self.files.insert(to.to_path_buf(), record);
        }
        Ok(())
    }

    /// Durably writes every dirty file's parse result to the on-disk cache keyed by content
    /// hash.
    #[tracing::instrument(skip(self), fields(dirty = self.dirty.len()))]
    pub fn flush(&mut self) -> Result<()> {
        for name in self.dirty.drain().collect::<Vec<_>>() {
            if let Some(record) = self.files.get(&name) {
                let entry = CacheEntry {
                    content_hash: utils::hash_str(&record.text),
                    elements: record.parsed.elements.clone(),
                    source_map: record.parsed.source_map.clone(),
                    referenced: record.parsed.referenced.clone(),
                    errors: record.parsed.errors.clone(),
                };
                self.cache.insert(name, entry);
            }
        }
        if let Some(path) = &self.cache_path {
            self.cache.write(path)?;
        }
        Ok(())
    }

    /// Deep-copies files and indices; the on-disk cache path is shared by reference.
    pub fn clone_source(&self) -> Self {
        Self {
            files: self
                .files
                .iter()
                .map(|(k, v)| {
                    (
                        k.clone(),
                        FileRecord {
                            text: v.text.clone(),
                            parsed: ParsedFile {
                                elements: v.parsed.elements.clone(),
                                source_map: v.parsed.source_map.clone(),
                                errors: v.parsed.errors.clone(),
                                referenced: v.parsed.referenced.clone(),
                            },
                        },
                    )
                })
                .collect(),
            elem_to_files: self.elem_to_files.clone(),
            referenced_by: self.referenced_by.clone(),
            cache: self.cache.clone(),
            cache_path: self.cache_path.clone(),
            dirty: self.dirty.clone(),
        }
    }

    pub fn all_errors(&self) -> Vec<ParseError> {
        self.files.values().flat_map(|r| r.parsed.errors.clone()).collect()
    }

    pub fn all_elements(&self) -> impl Iterator<Item = &crate::elements::Element> {
        self.files.values().flat_map(|r| r.parsed.elements.iter())
    }
}

/// Parses `buffer`, reusing `cache`'s entry for `name` when its content hash still matches.
/// Free function (rather than a `&mut self` method) so it can run behind a `rayon` `par_iter`
/// over many files while only holding an immutable borrow of the cache.
fn parse_with_cache(cache: &NaclFilesCache, name: &Path, buffer: &str) -> ParsedFile {
    let content_hash = utils::hash_str(buffer);
    if let Some(entry) = cache.get(name, &content_hash) {
        tracing::trace!(file = %name.display(), "parse cache hit");
        return ParsedFile {
            elements: entry.elements.clone(),
            source_map: entry.source_map.clone(),
            errors: entry.errors.clone(),
            referenced: entry.referenced.clone(),
        };
    }
    tracing::trace!(file = %name.display(), "parse cache miss");
    parser::parse(name, buffer, ErrorRecoveryMode::Tolerant)
}

impl Default for NaclFileSource {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_then_edit_then_remove_produces_add_modify_remove() {
        let mut source = NaclFileSource::new();
        let changes = source.set_nacl_files(vec![(
            PathBuf::from("a.nacl"),
            "type salesforce.Account {\n  string Name {\n  }\n}".to_string(),
        )]);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].action, ChangeAction::Add);

        let changes = source.set_nacl_files(vec![(
            PathBuf::from("a.nacl"),
            "type salesforce.Account {\n  string Email {\n  }\n}".to_string(),
        )]);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].action, ChangeAction::Modify);

        let changes = source.remove_nacl_files(&[PathBuf::from("a.nacl")]);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].action, ChangeAction::Remove);
        assert!(source.is_empty());
    }

    #[test]
    fn element_nacl_files_index_tracks_defining_files() {
        let mut source = NaclFileSource::new();
        source.set_nacl_files(vec![(PathBuf::from("a.nacl"), "type x.T {\n  string a {\n  }\n}".to_string())]);
        let id = ElemId::top_level_type("x", "T");
        assert_eq!(source.get_element_nacl_files(&id), BTreeSet::from([PathBuf::from("a.nacl")]));
    }

    #[test]
    fn references_to_files_index_tracks_referencing_files() {
        let mut source = NaclFileSource::new();
        source.set_nacl_files(vec![(PathBuf::from("a.nacl"), "x.T inst {\n  r = x.T.missing\n}".to_string())]);
        let target = ElemId::from_full_name("x.T.field.missing").unwrap();
        assert_eq!(source.get_element_references_to_files(&target), BTreeSet::from([PathBuf::from("a.nacl")]));
    }

    #[test]
    fn flush_then_reparse_hits_the_cache() {
        let dir = tempfile::tempdir().unwrap();
        let cache_path = dir.path().join("cache.json");
        let mut source = NaclFileSource::with_cache_path(cache_path.clone());
        let text = "type x.T {\n  string a {\n  }\n}".to_string();
        source.set_nacl_files(vec![(PathBuf::from("a.nacl"), text.clone())]);
        source.flush().unwrap();

        let mut reloaded = NaclFileSource::with_cache_path(cache_path);
        let changes = reloaded.set_nacl_files(vec![(PathBuf::from("a.nacl"), text)]);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].action, ChangeAction::Add);
    }

    #[test]
    fn load_from_dir_reads_every_nacl_file_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.nacl"), "type x.T {\n}").unwrap();
        std::fs::write(dir.path().join("b.nacl"), "type x.U {\n}").unwrap();
        std::fs::write(dir.path().join("ignore.txt"), "not nacl").unwrap();

        let source = NaclFileSource::load_from_dir(dir.path(), None).unwrap();
        assert_eq!(source.list_nacl_files().len(), 2);
    }
}
