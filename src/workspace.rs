//! Workspace state machine: owns one environment's source, the shared hidden-state store,
//! and the merged/validated view derived from them.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::{Duration, SystemTime};

use crate::elements::Element;
use crate::error::{Result, WorkspaceError};
use crate::hidden::{apply_hidden_overlay, StateStore};
use crate::id::ElemId;
use crate::merger::Fragment;
use crate::multi_env::MultiEnvSource;
use crate::nacl_file_source::Change;
use crate::validator;

/// How an incoming set of changes is routed across environments.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RoutingMode {
    /// Each changed file routes to wherever it currently lives: a file already in `common`
    /// stays there, anything else (including new files) lands in the current environment.
    Default,
    /// Every file is written to the current environment, even one that currently lives in
    /// `common`; `common` is left untouched.
    Isolated,
    /// Every file is written to `common`, regardless of where it currently lives.
    Align,
    /// Every file is written to the current environment, first dropping any `common` copy of
    /// that same path so the environment's version wins outright instead of merging with it.
    Override,
}

/// Freshness of a hidden-state entry relative to `now`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StateRecency {
    Nonexistent,
    Old,
    Valid,
}

const DEFAULT_STALE_THRESHOLD: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// One environment's source plus the timestamp its state was last fetched, used for
/// `getStateRecency`.
struct EnvEntry {
    source: MultiEnvSource,
    state: StateStore,
    state_fetched_at: Option<SystemTime>,
}

impl EnvEntry {
    fn new() -> Self {
        Self { source: MultiEnvSource::new(), state: StateStore::new(), state_fetched_at: None }
    }
}

pub struct Workspace {
    envs: BTreeMap<String, EnvEntry>,
    current_env: String,
    merged_cache: BTreeMap<String, Element>,
    errors: Vec<crate::error::Error>,
    stale_threshold: Duration,
}

impl Workspace {
    pub fn new(initial_env: impl Into<String>) -> Self {
        let initial_env = initial_env.into();
        let mut envs = BTreeMap::new();
        envs.insert(initial_env.clone(), EnvEntry::new());
        let mut ws = Self {
            envs,
            current_env: initial_env,
            merged_cache: BTreeMap::new(),
            errors: Vec::new(),
            stale_threshold: DEFAULT_STALE_THRESHOLD,
        };
        ws.remerge();
        ws
    }

    fn current(&self) -> &EnvEntry {
        self.envs.get(&self.current_env).expect("current_env always present")
    }

    fn current_mut(&mut self) -> &mut EnvEntry {
        self.envs.get_mut(&self.current_env).expect("current_env always present")
    }

    /// Re-merge:
    /// 1. Re-run the merger over the current env's common+env fragment stream.
    /// 2. Layer the hidden-state overlay on top.
    /// 3. Replace the merged cache atomically (never expose a partial batch).
    /// 4. Validate every element in the merged universe. The merge step above already walks
    ///    every fragment, so narrowing validation to only a "changed" subset would save no
    ///    real work while risking stale errors on untouched elements whose validity depends on
    ///    something that did change elsewhere in the universe.
    /// 5. Replace the error set atomically.
    #[tracing::instrument(skip(self))]
    fn remerge(&mut self) {
        let merge_result = self.current().source.merge();
        let mut merged = merge_result.merged;
        apply_hidden_overlay(&mut merged, &self.current().state);

        let ids: Vec<ElemId> = merged.keys().filter_map(|n| ElemId::from_full_name(n)).collect();
        let validation_errors = validator::validate(&ids, &merged);

        self.merged_cache = merged;
        self.errors = merge_result.errors.into_iter().map(crate::error::Error::Merge).collect();
        self.errors.extend(validation_errors.into_iter().map(crate::error::Error::Validation));
        self.errors.extend(self.current().source.all_errors().into_iter().map(crate::error::Error::Parse));
    }

    pub fn elements(&self) -> &BTreeMap<String, Element> {
        &self.merged_cache
    }

    pub fn errors(&self) -> &[crate::error::Error] {
        &self.errors
    }

    pub fn get_element(&self, id: &ElemId) -> Option<&Element> {
        self.merged_cache.get(&id.get_full_name())
    }

    pub fn get_value(&self, id: &ElemId) -> Option<&crate::elements::value::Value> {
        match self.merged_cache.get(&id.top_level_full_name())? {
            Element::Instance(inst) => {
                let (_, path) = id.create_top_level_parent_id();
                if path.is_empty() {
                    None
                } else {
                    inst.get_value_at(&path)
                }
            }
            _ => None,
        }
    }

    #[tracing::instrument(skip(self, files), fields(env = %self.current_env, mode = ?mode))]
    pub fn update_nacl_files(&mut self, files: Vec<(PathBuf, String)>, mode: RoutingMode) -> Vec<Change> {
        let changes = match mode {
            RoutingMode::Isolated => self.current_mut().source.set_env_files(files),
            RoutingMode::Align => self.current_mut().source.set_common_files(files),
            RoutingMode::Default => {
                let (env_files, common_files) = self.current_mut().source.partition_by_current_location(files);
                let mut changes = self.current_mut().source.set_env_files(env_files);
                changes.extend(self.current_mut().source.set_common_files(common_files));
                changes
            }
            RoutingMode::Override => {
                let names: Vec<PathBuf> = files.iter().map(|(path, _)| path.clone()).collect();
                let mut changes = self.current_mut().source.drop_common_files(&names);
                changes.extend(self.current_mut().source.set_env_files(files));
                changes
            }
        };
        self.remerge();
        changes
    }

    pub fn set_nacl_files(&mut self, files: Vec<(PathBuf, String)>) -> Vec<Change> {
        self.update_nacl_files(files, RoutingMode::Default)
    }

    pub fn remove_nacl_files(&mut self, names: &[PathBuf]) -> Vec<Change> {
        let changes = self.current_mut().source.remove_env_files(names);
        self.remerge();
        changes
    }

    pub fn get_source_map(&self, file: &std::path::Path) -> Option<&crate::source_map::SourceMap> {
        self.current().source.env.get_source_map(file).or_else(|| self.current().source.common.get_source_map(file))
    }

    pub fn get_source_ranges(&self, id: &ElemId) -> Vec<crate::source_map::SourceRange> {
        self.current().source.get_source_ranges(id)
    }

    pub fn list_nacl_files(&self) -> Vec<&PathBuf> {
        let mut files = self.current().source.common.list_nacl_files();
        files.extend(self.current().source.env.list_nacl_files());
        files
    }

    pub fn flush(&mut self) -> Result<()> {
        self.current_mut().source.flush()
    }

    pub fn clear(&mut self) {
        self.current_mut().source = MultiEnvSource::new();
        self.remerge();
    }

    /// Deep-copies every environment's source and hidden state. The on-disk cache paths
    /// embedded in each [`crate::nacl_file_source::NaclFileSource`] are shared by reference,
    /// since the cache is a durability optimization for the copy's own disk, not shared mutable
    /// state.
    pub fn clone_workspace(&self) -> Self {
        let envs = self
            .envs
            .iter()
            .map(|(name, entry)| {
                (
                    name.clone(),
                    EnvEntry {
                        source: MultiEnvSource {
                            common: entry.source.common.clone_source(),
                            env: entry.source.env.clone_source(),
                        },
                        state: entry.state.clone(),
                        state_fetched_at: entry.state_fetched_at,
                    },
                )
            })
            .collect();
        let mut cloned = Self {
            envs,
            current_env: self.current_env.clone(),
            merged_cache: self.merged_cache.clone(),
            errors: Vec::new(),
            stale_threshold: self.stale_threshold,
        };
        cloned.remerge();
        cloned
    }

    // -- environment lifecycle --

    pub fn current_env(&self) -> &str {
        &self.current_env
    }

    pub fn list_envs(&self) -> Vec<&String> {
        self.envs.keys().collect()
    }

    pub fn add_env(&mut self, name: impl Into<String>) -> Result<()> {
        let name = name.into();
        if self.envs.contains_key(&name) {
            return Err(WorkspaceError::UnknownEnvironment(format!("environment {name:?} already exists")).into());
        }
        self.envs.insert(name, EnvEntry::new());
        Ok(())
    }

    pub fn delete_env(&mut self, name: &str) -> Result<()> {
        if name == self.current_env {
            return Err(WorkspaceError::UnknownEnvironment(format!(
                "cannot delete the current environment {name:?}"
            ))
            .into());
        }
        self.envs
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| WorkspaceError::UnknownEnvironment(name.to_string()).into())
    }

    pub fn set_current_env(&mut self, name: impl Into<String>) -> Result<()> {
        let name = name.into();
        if !self.envs.contains_key(&name) {
            return Err(WorkspaceError::UnknownEnvironment(name).into());
        }
        self.current_env = name;
        self.remerge();
        Ok(())
    }

    /// Copies a merged element's fragments from the current environment into `target_env`'s
    /// env-local files, without touching `common`.
    pub fn copy_to(&mut self, id: &ElemId, target_env: &str) -> Result<()> {
        if !self.envs.contains_key(target_env) {
            return Err(WorkspaceError::UnknownEnvironment(target_env.to_string()).into());
        }
        let Some(element) = self.merged_cache.get(&id.get_full_name()).cloned() else {
            return Ok(());
        };
        let range = crate::source_map::SourceRange::synthetic(format!("{target_env}-copy.nacl"));
        let fragment = Fragment { element, file: PathBuf::from(format!("{target_env}-copy.nacl")), range };
        let target = self.envs.get_mut(target_env).expect("checked above");
        target.source.env.set_nacl_files(vec![(fragment.file.clone(), render_stub(&fragment))]);
        if target_env == self.current_env {
            self.remerge();
        }
        Ok(())
    }

    /// Promotes an element currently only in the current env's files up into `common`.
    pub fn promote(&mut self, id: &ElemId) -> Result<()> {
        let Some(element) = self.merged_cache.get(&id.get_full_name()).cloned() else {
            return Ok(());
        };
        let range = crate::source_map::SourceRange::synthetic("promoted.nacl");
        let fragment = Fragment { element, file: PathBuf::from("promoted.nacl"), range };
        self.current_mut().source.common.set_nacl_files(vec![(fragment.file.clone(), render_stub(&fragment))]);
        self.remerge();
        Ok(())
    }

    /// Demotes a `common`-defined element down into the current env's files; `demote_all`
    /// repeats this for every element currently sourced from `common`.
    pub fn demote(&mut self, id: &ElemId) -> Result<()> {
        let Some(element) = self.merged_cache.get(&id.get_full_name()).cloned() else {
            return Ok(());
        };
        let range = crate::source_map::SourceRange::synthetic("demoted.nacl");
        let fragment = Fragment { element, file: PathBuf::from("demoted.nacl"), range };
        self.current_mut().source.env.set_nacl_files(vec![(fragment.file.clone(), render_stub(&fragment))]);
        self.remerge();
        Ok(())
    }

    pub fn demote_all(&mut self) -> Result<()> {
        let ids: Vec<ElemId> = self
            .current()
            .source
            .common
            .all_elements()
            .filter_map(|e| ElemId::from_full_name(&e.elem_id().get_full_name()))
            .collect();
        for id in ids {
            self.demote(&id)?;
        }
        Ok(())
    }

    // -- hidden state --

    pub fn set_state_element(&mut self, element: Element) {
        self.current_mut().state.set(element);
        self.current_mut().state_fetched_at = Some(SystemTime::now());
        self.remerge();
    }

    /// Freshness of the current env's hidden state relative to `now`, compared against the
    /// default 7-day staleness threshold.
    pub fn get_state_recency(&self, now: SystemTime) -> StateRecency {
        let entry = self.current();
        if entry.state.is_empty() {
            return StateRecency::Nonexistent;
        }
        match entry.state_fetched_at {
            None => StateRecency::Nonexistent,
            Some(fetched_at) => match now.duration_since(fetched_at) {
                Ok(age) if age <= self.stale_threshold => StateRecency::Valid,
                Ok(_) => StateRecency::Old,
                Err(_) => StateRecency::Valid,
            },
        }
    }

    pub fn with_stale_threshold(mut self, threshold: Duration) -> Self {
        self.stale_threshold = threshold;
        self
    }
}

/// Renders a fragment back to NaCl source text so it can be re-inserted as a one-element file.
/// Used by `promote`/`demote`/`copyTo`, which move an already-merged element between file sets
/// rather than reparsing user-authored text.
fn render_stub(fragment: &Fragment) -> String {
    match &fragment.element {
        Element::Object(obj) => {
            let mut out = format!("type {} {{\n", obj.elem_id.get_full_name());
            for field in obj.fields.values() {
                out.push_str(&format!("  {} {} {{\n  }}\n", field.field_type.0.get_full_name(), field.name));
            }
            out.push_str("}\n");
            out
        }
        Element::Instance(inst) => {
            format!("{} {} {{\n}}\n", inst.instance_type.0.get_full_name(), instance_label(&inst.elem_id))
        }
        Element::Primitive(p) => {
            format!("type {} {{\n  _primitive = \"{}\"\n}}\n", p.elem_id.get_full_name(), primitive_kind_name(p.kind))
        }
        Element::Container(_) => String::new(),
    }
}

fn primitive_kind_name(kind: crate::elements::PrimitiveKind) -> &'static str {
    use crate::elements::PrimitiveKind;
    match kind {
        PrimitiveKind::String => "string",
        PrimitiveKind::Number => "number",
        PrimitiveKind::Boolean => "boolean",
        PrimitiveKind::Unknown => "unknown",
    }
}

fn instance_label(id: &ElemId) -> String {
    id.name_parts.first().cloned().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn set_then_remove_file_round_trips_through_elements() {
        let mut ws = Workspace::new("dev");
        ws.set_nacl_files(vec![(PathBuf::from("a.nacl"), "type x.T {\n  string a {\n  }\n}".to_string())]);
        assert!(ws.get_element(&ElemId::top_level_type("x", "T")).is_some());

        ws.remove_nacl_files(&[PathBuf::from("a.nacl")]);
        assert!(ws.get_element(&ElemId::top_level_type("x", "T")).is_none());
    }

    #[test]
    fn unknown_env_lookup_is_a_workspace_error() {
        let mut ws = Workspace::new("dev");
        assert!(ws.set_current_env("prod").is_err());
    }

    #[test]
    fn cannot_delete_the_current_environment() {
        let mut ws = Workspace::new("dev");
        ws.add_env("prod").unwrap();
        assert!(ws.delete_env("dev").is_err());
        assert!(ws.delete_env("prod").is_ok());
    }

    #[test]
    fn state_recency_is_nonexistent_without_any_fetch() {
        let ws = Workspace::new("dev");
        assert_eq!(ws.get_state_recency(SystemTime::now()), StateRecency::Nonexistent);
    }

    #[test]
    fn removing_a_referenced_instance_surfaces_an_unresolved_reference() {
        let mut ws = Workspace::new("dev");
        ws.set_nacl_files(vec![
            (PathBuf::from("a.nacl"), "type x.T {\n}".to_string()),
            (PathBuf::from("b.nacl"), "x.T inst {\n  ref = x.T.instance.other.name\n}".to_string()),
            (PathBuf::from("c.nacl"), "x.T other {\n  name = \"hi\"\n}".to_string()),
        ]);
        assert!(ws.errors().is_empty(), "{:?}", ws.errors());

        ws.remove_nacl_files(&[PathBuf::from("c.nacl")]);
        assert!(!ws.errors().is_empty());

        ws.set_nacl_files(vec![(PathBuf::from("c.nacl"), "x.T other {\n  name = \"hi\"\n}".to_string())]);
        assert!(ws.errors().is_empty(), "{:?}", ws.errors());
    }

    #[test]
    fn default_routing_follows_a_files_current_location() {
        let mut ws = Workspace::new("dev");
        ws.update_nacl_files(
            vec![(PathBuf::from("a.nacl"), "type x.T {\n}".to_string())],
            RoutingMode::Align,
        );
        assert_eq!(ws.current().source.common.list_nacl_files().len(), 1);

        ws.update_nacl_files(
            vec![(PathBuf::from("a.nacl"), "type x.T {\n  string name {\n  }\n}".to_string())],
            RoutingMode::Default,
        );
        assert_eq!(ws.current().source.common.list_nacl_files().len(), 1);
        assert!(ws.current().source.env.list_nacl_files().is_empty());
    }

    #[test]
    fn override_routing_drops_the_common_copy_before_writing_the_env_copy() {
        let mut ws = Workspace::new("dev");
        ws.update_nacl_files(
            vec![(PathBuf::from("a.nacl"), "type x.T {\n}".to_string())],
            RoutingMode::Align,
        );
        assert_eq!(ws.current().source.common.list_nacl_files().len(), 1);

        ws.update_nacl_files(
            vec![(PathBuf::from("a.nacl"), "type x.U {\n}".to_string())],
            RoutingMode::Override,
        );
        assert!(ws.current().source.common.list_nacl_files().is_empty());
        assert_eq!(ws.current().source.env.list_nacl_files().len(), 1);
        assert!(ws.get_element(&ElemId::top_level_type("x", "U")).is_some());
    }
}
