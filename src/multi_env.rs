//! Common + per-environment NaCl sources, folded into one fragment stream.
//!
//! An environment's element view is the union of its own files and the shared `common/`
//! files. Fragments from both sources are folded through the same merger pass as a single
//! stream: an element defined partly in `common` and partly in the environment ends up with
//! fields from both, the same as if two files in one directory had defined it. A file-name
//! collision between common and an environment (same relative path set in both) is resolved
//! by dropping common's copy of that one file before fragments are collected, since the two
//! directories are expected never to literally share a path otherwise.

use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::merger::{self, Fragment, MergeResult};
use crate::nacl_file_source::{Change, NaclFileSource};
use crate::parser::ParsedFile;
use crate::source_map::SourceRange;

/// One environment's view: its own files plus the shared `common` files, ready to be folded by
/// the merger as a single stream.
pub struct MultiEnvSource {
    pub common: NaclFileSource,
    pub env: NaclFileSource,
}

impl MultiEnvSource {
    pub fn new() -> Self {
        Self { common: NaclFileSource::new(), env: NaclFileSource::new() }
    }

    pub fn set_common_files(&mut self, files: Vec<(PathBuf, String)>) -> Vec<Change> {
        self.common.set_nacl_files(files)
    }

    pub fn set_env_files(&mut self, files: Vec<(PathBuf, String)>) -> Vec<Change> {
        self.env.set_nacl_files(files)
    }

    pub fn remove_common_files(&mut self, names: &[PathBuf]) -> Vec<Change> {
        self.common.remove_nacl_files(names)
    }

    pub fn remove_env_files(&mut self, names: &[PathBuf]) -> Vec<Change> {
        self.env.remove_nacl_files(names)
    }

    /// Splits `files` by where each path currently lives: a file already present in `common`
    /// stays routed there, everything else (new files included) routes to the env. Used by
    /// `RoutingMode::Default`, which follows an element's existing home rather than forcing
    /// every update into one fixed destination.
    pub fn partition_by_current_location(
        &self,
        files: Vec<(PathBuf, String)>,
    ) -> (Vec<(PathBuf, String)>, Vec<(PathBuf, String)>) {
        let mut env_files = Vec::new();
        let mut common_files = Vec::new();
        for (path, text) in files {
            if self.common.contains_file(&path) {
                common_files.push((path, text));
            } else {
                env_files.push((path, text));
            }
        }
        (env_files, common_files)
    }

    /// Removes `names` from `common`, dropping any common-side content that would otherwise
    /// conflict with the env copy about to be written. Used by `RoutingMode::Override`.
    pub fn drop_common_files(&mut self, names: &[PathBuf]) -> Vec<Change> {
        self.common.remove_nacl_files(names)
    }

    /// Folds common and env fragments into one merged element map, as a single stream (an
    /// element split across common and the env ends up with fields from both).
    #[tracing::instrument(skip(self))]
    pub fn merge(&self) -> MergeResult {
        let env_files: std::collections::BTreeSet<&std::path::PathBuf> =
            self.env.list_nacl_files().into_iter().collect();

        let mut fragments = Vec::new();
        for file in self.common.list_nacl_files() {
            if env_files.contains(file) {
                continue;
            }
            let Some(parsed) = self.common.get_parsed_nacl_file(file) else { continue };
            fragments.extend(fragments_from(file, parsed));
        }
        for file in self.env.list_nacl_files() {
            let Some(parsed) = self.env.get_parsed_nacl_file(file) else { continue };
            fragments.extend(fragments_from(file, parsed));
        }
        merger::merge_fragments(fragments)
    }

    pub fn get_source_ranges(&self, id: &crate::id::ElemId) -> Vec<SourceRange> {
        let mut ranges = self.env.get_source_ranges(id);
        if ranges.is_empty() {
            ranges = self.common.get_source_ranges(id);
        }
        ranges
    }

    pub fn flush(&mut self) -> crate::error::Result<()> {
        self.common.flush()?;
        self.env.flush()
    }

    pub fn all_errors(&self) -> Vec<crate::error::ParseError> {
        let mut errors = self.common.all_errors();
        errors.extend(self.env.all_errors());
        errors
    }
}

impl Default for MultiEnvSource {
    fn default() -> Self {
        Self::new()
    }
}

fn fragments_from(file: &std::path::Path, parsed: &ParsedFile) -> Vec<Fragment> {
    parsed
        .elements
        .iter()
        .map(|element| {
            let full_name = element.elem_id().get_full_name();
            let range = parsed
                .source_map
                .get(&full_name)
                .first()
                .cloned()
                .unwrap_or_else(|| SourceRange::synthetic(file));
            Fragment { element: element.clone(), file: file.to_path_buf(), range }
        })
        .collect()
}

/// Builds a merged map keyed by full-name for direct lookups (used by the workspace layer,
/// which needs `getElement`/`getValue` over the folded result).
pub fn as_map(result: &MergeResult) -> &BTreeMap<String, crate::elements::Element> {
    &result.merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::elements::Element;
    use std::path::PathBuf;

    #[test]
    fn common_and_env_fragments_of_the_same_element_merge_structurally() {
        let mut source = MultiEnvSource::new();
        source.set_common_files(vec![(
            PathBuf::from("common/a.nacl"),
            "type x.T {\n  string a {\n  }\n}".to_string(),
        )]);
        source.set_env_files(vec![(
            PathBuf::from("env/a.nacl"),
            "type x.T {\n  string b {\n  }\n}".to_string(),
        )]);
        let result = source.merge();
        let Element::Object(obj) = &result.merged["x.T"] else { panic!() };
        assert_eq!(obj.fields.len(), 2);
        assert!(obj.fields.contains_key("a"));
        assert!(obj.fields.contains_key("b"));
        assert!(result.errors.is_empty());
    }

    #[test]
    fn same_path_in_both_sources_resolves_to_the_env_copy() {
        let mut source = MultiEnvSource::new();
        source.set_common_files(vec![(PathBuf::from("a.nacl"), "type x.T {\n}".to_string())]);
        source.set_env_files(vec![(PathBuf::from("a.nacl"), "type x.U {\n}".to_string())]);
        let result = source.merge();
        assert!(!result.merged.contains_key("x.T"));
        assert!(result.merged.contains_key("x.U"));
    }

    #[test]
    fn disjoint_common_and_env_elements_both_survive() {
        let mut source = MultiEnvSource::new();
        source.set_common_files(vec![(PathBuf::from("common/a.nacl"), "type x.Common {\n}".to_string())]);
        source.set_env_files(vec![(PathBuf::from("env/a.nacl"), "type x.Env {\n}".to_string())]);
        let result = source.merge();
        assert!(result.merged.contains_key("x.Common"));
        assert!(result.merged.contains_key("x.Env"));
    }
}
