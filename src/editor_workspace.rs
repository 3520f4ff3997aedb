//! Editor-facing wrapper around a [`Workspace`]: path translation relative to a base directory,
//! a debounced pending-edit queue, and serialized aggregated flush operations.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use cfg_if::cfg_if;

use crate::error::{Result, WorkspaceError};
use crate::id::ElemId;
use crate::nacl_file_source::Change;
use crate::utils;
use crate::workspace::{RoutingMode, Workspace};

/// Translates editor-facing absolute paths to/from workspace-relative ones.
pub struct PathTranslator {
    base_dir: PathBuf,
}

impl PathTranslator {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self { base_dir: base_dir.into() }
    }

    /// Relative-izes an inbound absolute path against the base dir.
    pub fn relativize(&self, absolute: &Path) -> Result<PathBuf> {
        if absolute.is_relative() {
            return Ok(absolute.to_path_buf());
        }
        let relative = utils::strip_prefix(absolute, &self.base_dir);
        if relative == absolute {
            return Err(WorkspaceError::PathOutsideBaseDir(absolute.to_path_buf()).into());
        }
        Ok(relative.to_path_buf())
    }

    /// Absolutizes an outbound workspace-relative path against the base dir.
    pub fn absolutize(&self, relative: &Path) -> PathBuf {
        if relative.is_absolute() {
            relative.to_path_buf()
        } else {
            self.base_dir.join(relative)
        }
    }
}

/// The queue of edits accumulated between flushes. Last-write-wins per file: a later `set`
/// overwrites an earlier one, and a `delete` after a pending `set` drops the pending set.
#[derive(Default)]
struct PendingEdits {
    sets: BTreeMap<PathBuf, String>,
    deletes: BTreeSet<PathBuf>,
}

impl PendingEdits {
    fn record_set(&mut self, path: PathBuf, text: String) {
        self.deletes.remove(&path);
        self.sets.insert(path, text);
    }

    fn record_delete(&mut self, path: PathBuf) {
        self.sets.remove(&path);
        self.deletes.insert(path);
    }

    fn is_empty(&self) -> bool {
        self.sets.is_empty() && self.deletes.is_empty()
    }

    fn take(&mut self) -> (Vec<(PathBuf, String)>, Vec<PathBuf>) {
        let sets = std::mem::take(&mut self.sets).into_iter().collect();
        let deletes = std::mem::take(&mut self.deletes).into_iter().collect();
        (sets, deletes)
    }
}

/// Wraps a [`Workspace`] with editor-facing path translation and a debounced, serialized
/// pending-edit pipeline.
pub struct EditorWorkspace {
    workspace: Workspace,
    translator: PathTranslator,
    pending: Mutex<PendingEdits>,
    /// Serializes `run_aggregated_set_operation`: only one flush runs at a time, and an edit
    /// that arrives mid-flush is picked up by the same in-flight call rather than starting a
    /// second one.
    flush_lock: Mutex<()>,
}

impl EditorWorkspace {
    pub fn new(workspace: Workspace, base_dir: impl Into<PathBuf>) -> Self {
        Self {
            workspace,
            translator: PathTranslator::new(base_dir),
            pending: Mutex::new(PendingEdits::default()),
            flush_lock: Mutex::new(()),
        }
    }

    /// Queues a set edit for `absolute_path`. Does not touch the workspace until the next
    /// `run_aggregated_set_operation`.
    pub fn queue_set(&self, absolute_path: &Path, text: String) -> Result<()> {
        let relative = self.translator.relativize(absolute_path)?;
        self.pending.lock().expect("pending lock poisoned").record_set(relative, text);
        Ok(())
    }

    pub fn queue_delete(&self, absolute_path: &Path) -> Result<()> {
        let relative = self.translator.relativize(absolute_path)?;
        self.pending.lock().expect("pending lock poisoned").record_delete(relative);
        Ok(())
    }

    pub fn has_pending_edits(&self) -> bool {
        !self.pending.lock().expect("pending lock poisoned").is_empty()
    }

    /// Drains the pending-edit queue and applies it to the workspace: deletes first, then
    /// sets, as one aggregated batch. If new edits arrive while this call is draining the
    /// queue, it loops and drains again before returning, so the caller never needs to
    /// schedule a second flush for edits that raced this one.
    pub fn run_aggregated_set_operation(&mut self) -> Vec<Change> {
        let _guard = self.flush_lock.lock().expect("flush lock poisoned");
        let mut all_changes = Vec::new();
        loop {
            let (sets, deletes) = self.pending.lock().expect("pending lock poisoned").take();
            if sets.is_empty() && deletes.is_empty() {
                break;
            }
            if !deletes.is_empty() {
                all_changes.extend(self.workspace.remove_nacl_files(&deletes));
            }
            if !sets.is_empty() {
                all_changes.extend(self.workspace.update_nacl_files(sets, RoutingMode::Default));
            }
        }
        all_changes
    }

    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    pub fn workspace_mut(&mut self) -> &mut Workspace {
        &mut self.workspace
    }

    pub fn errors(&self) -> &[crate::error::Error] {
        self.workspace.errors()
    }

    pub fn get_element(&self, id: &ElemId) -> Option<&crate::elements::Element> {
        self.workspace.get_element(id)
    }
}

cfg_if! {
    if #[cfg(feature = "async")] {
        /// Debounces calls to a report-errors callback so bursts of edits within `window`
        /// collapse into a single publish. Each call to [`Debouncer::notify`] resets the
        /// deadline; the callback only fires once no call has arrived for the full window.
        pub struct Debouncer {
            window: std::time::Duration,
            generation: std::sync::Arc<std::sync::atomic::AtomicU64>,
        }

        impl Debouncer {
            pub fn new(window: std::time::Duration) -> Self {
                Self { window, generation: std::sync::Arc::new(std::sync::atomic::AtomicU64::new(0)) }
            }

            /// Schedules `on_fire` to run after `window` elapses with no further `notify`
            /// calls. Joins onto the in-flight timer rather than cancelling it: a `notify`
            /// mid-window replaces the pending callback instead of spawning a second timer.
            pub fn notify<F>(&self, on_fire: F)
            where
                F: Fn() + Send + 'static,
            {
                use std::sync::atomic::Ordering;
                let my_generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
                let generation = self.generation.clone();
                let window = self.window;
                tokio::spawn(async move {
                    tokio::time::sleep(window).await;
                    if generation.load(Ordering::SeqCst) == my_generation {
                        on_fire();
                    }
                });
            }
        }
    }
}
