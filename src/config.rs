//! Workspace directory layout: `salto.config/`, per-environment NaCl + state directories, and
//! the shared `common/` directory.
//!
//! Mirrors the builder-style path config used for build layouts elsewhere in this corpus: a
//! small struct owning a base directory plus a handful of named subpaths, with a `Default` that
//! matches the on-disk convention and a builder for overriding individual pieces.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

pub const CONFIG_DIR_NAME: &str = "salto.config";
pub const COMMON_ENV_NAME: &str = "common";
const CONFIG_FILE_NAME: &str = "config.json";
const ENVS_FILE_NAME: &str = "envs.json";

/// Metadata persisted under `salto.config/`: the full environment list and which one is
/// currently active. Round-trips to disk as JSON.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct WorkspaceConfig {
    pub envs: Vec<String>,
    pub current_env: String,
}

impl WorkspaceConfig {
    pub fn new(current_env: impl Into<String>) -> Self {
        let current_env = current_env.into();
        Self { envs: vec![current_env.clone()], current_env }
    }
}

/// Owns the on-disk layout of one workspace: a base directory containing `salto.config/`, a
/// `common/` directory shared by every environment, and one directory per environment.
///
/// Grounded on the builder-with-defaults pattern this corpus uses for project path config:
/// a root plus named subdirectories, each overridable, with `root_dir`-relative defaults.
#[derive(Clone, Debug)]
pub struct WorkspacePaths {
    pub root: PathBuf,
    config_dir: PathBuf,
    common_dir: PathBuf,
}

impl WorkspacePaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self { config_dir: root.join(CONFIG_DIR_NAME), common_dir: root.join(COMMON_ENV_NAME), root }
    }

    pub fn with_config_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_dir = path.into();
        self
    }

    pub fn with_common_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.common_dir = path.into();
        self
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    pub fn common_dir(&self) -> &Path {
        &self.common_dir
    }

    pub fn config_file(&self) -> PathBuf {
        self.config_dir.join(CONFIG_FILE_NAME)
    }

    pub fn envs_file(&self) -> PathBuf {
        self.config_dir.join(ENVS_FILE_NAME)
    }

    /// The directory holding `env`'s NaCl files and its state store.
    pub fn env_dir(&self, env: &str) -> PathBuf {
        self.root.join(env)
    }

    pub fn env_state_file(&self, env: &str) -> PathBuf {
        self.env_dir(env).join("state.json")
    }

    pub fn env_cache_file(&self, env: &str) -> PathBuf {
        self.config_dir.join(format!("{env}.cache.json"))
    }

    pub fn common_cache_file(&self) -> PathBuf {
        self.config_dir.join("common.cache.json")
    }

    pub fn read_config(&self) -> crate::error::Result<WorkspaceConfig> {
        crate::utils::read_json_file(&self.config_file())
    }

    pub fn write_config(&self, config: &WorkspaceConfig) -> crate::error::Result<()> {
        crate::utils::write_json_file(config, &self.config_file())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_layout_is_rooted_at_base_dir() {
        let paths = WorkspacePaths::new("/ws");
        assert_eq!(paths.config_dir(), Path::new("/ws/salto.config"));
        assert_eq!(paths.common_dir(), Path::new("/ws/common"));
        assert_eq!(paths.env_dir("dev"), Path::new("/ws/dev"));
        assert_eq!(paths.env_state_file("dev"), Path::new("/ws/dev/state.json"));
    }

    #[test]
    fn config_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let paths = WorkspacePaths::new(dir.path());
        crate::utils::create_parent_dir_all(&paths.config_file()).unwrap();
        let config = WorkspaceConfig::new("dev");
        paths.write_config(&config).unwrap();
        let reloaded = paths.read_config().unwrap();
        assert_eq!(reloaded, config);
    }
}
