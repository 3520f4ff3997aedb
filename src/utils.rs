//! Path and IO helpers shared by the cache, config, and file source modules.

use std::fs;
use std::io::Write as _;
use std::path::{Path, PathBuf};

use serde::{de::DeserializeOwned, Serialize};
use sha2::{Digest, Sha256};
use walkdir::WalkDir;

use crate::error::{Error, WorkspaceError};

/// Yields every `.nacl` file under `root`, or `root` itself if it is one. Follows symlinks.
pub fn nacl_files_iter(root: &Path) -> impl Iterator<Item = PathBuf> + '_ {
    WalkDir::new(root)
        .follow_links(true)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .filter(|e| e.path().extension().map(|ext| ext == "nacl").unwrap_or(false))
        .map(|e| e.path().to_path_buf())
}

/// Canonicalize a path, platform-agnostic (no symlink resolution differences between
/// Windows and Unix reporting).
pub fn canonicalize(path: impl AsRef<Path>) -> crate::error::Result<PathBuf> {
    let path = path.as_ref();
    let res = dunce::canonicalize(path);
    #[cfg(windows)]
    let res = res.map(|p| {
        use path_slash::PathBufExt;
        PathBuf::from(p.to_slash_lossy().as_ref())
    });
    res.map_err(|source| Error::Workspace(WorkspaceError::Io { path: path.to_path_buf(), source }))
}

pub fn canonicalized(path: impl Into<PathBuf>) -> PathBuf {
    let path = path.into();
    canonicalize(&path).unwrap_or(path)
}

/// Strips `root` from `source`, returning the relative path (or `source` unchanged if it
/// isn't under `root`).
pub fn strip_prefix<'a>(source: &'a Path, root: &Path) -> &'a Path {
    source.strip_prefix(root).unwrap_or(source)
}

/// The deepest directory common to every path in `paths`.
pub fn common_ancestor_all<I, P>(paths: I) -> Option<PathBuf>
where
    I: IntoIterator<Item = P>,
    P: AsRef<Path>,
{
    let mut iter = paths.into_iter();
    let mut ret = iter.next()?.as_ref().to_path_buf();
    for path in iter {
        ret = common_ancestor(&ret, path.as_ref())?;
    }
    Some(ret)
}

pub fn common_ancestor(a: &Path, b: &Path) -> Option<PathBuf> {
    let mut ret = PathBuf::new();
    let mut found = false;
    for (c1, c2) in a.components().zip(b.components()) {
        if c1 == c2 {
            ret.push(c1);
            found = true;
        } else {
            break;
        }
    }
    found.then_some(ret)
}

/// Content hash used to key [`crate::elements::StaticFile`] values and cache entries alike.
pub fn hash_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

pub fn hash_str(s: &str) -> String {
    hash_bytes(s.as_bytes())
}

pub fn read_json_file<T: DeserializeOwned>(path: &Path) -> crate::error::Result<T> {
    let bytes = fs::read(path)
        .map_err(|source| Error::Workspace(WorkspaceError::Io { path: path.to_path_buf(), source }))?;
    serde_json::from_slice(&bytes).map_err(Into::into)
}

pub fn write_json_file<T: Serialize>(value: &T, path: &Path) -> crate::error::Result<()> {
    create_parent_dir_all(path)?;
    let file = fs::File::create(path)
        .map_err(|source| Error::Workspace(WorkspaceError::Io { path: path.to_path_buf(), source }))?;
    let mut writer = std::io::BufWriter::new(file);
    serde_json::to_writer(&mut writer, value)?;
    writer
        .flush()
        .map_err(|source| Error::Workspace(WorkspaceError::Io { path: path.to_path_buf(), source }))
}

pub fn create_parent_dir_all(file: &Path) -> crate::error::Result<()> {
    if let Some(parent) = file.parent() {
        fs::create_dir_all(parent)
            .map_err(|source| Error::Workspace(WorkspaceError::Io { path: parent.to_path_buf(), source }))?;
    }
    Ok(())
}
