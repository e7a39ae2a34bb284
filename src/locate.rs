//! Repository root resolution.
//!
//! A run works against exactly one [`RepositoryRoot`]. It is found by looking
//! for a marker path (a directory that only exists inside a valid tree) in the
//! declared start directory, then in its parent. The process working directory
//! is never changed; the root is passed explicitly to every operation.

use crate::safety::{SafetyError, TreeGuard};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Marker used when neither the command line nor a patch set names one.
pub const DEFAULT_ROOT_MARKER: &str = "frameworks/base";

#[derive(Error, Debug)]
pub enum LocateError {
    #[error("Could not find {marker} under {start} or its parent directory")]
    RootNotFound { start: PathBuf, marker: PathBuf },

    #[error("Failed to create directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error(transparent)]
    Safety(#[from] SafetyError),
}

/// The top of the build tree. Immutable once resolved.
#[derive(Debug, Clone)]
pub struct RepositoryRoot {
    guard: TreeGuard,
}

impl RepositoryRoot {
    /// Use `path` as the root without any marker check.
    pub fn new(path: impl AsRef<Path>) -> Result<Self, SafetyError> {
        Ok(Self {
            guard: TreeGuard::new(path)?,
        })
    }

    pub fn path(&self) -> &Path {
        self.guard.root()
    }

    /// Resolve a root-relative target path to an absolute one.
    pub fn resolve(&self, relative: impl AsRef<Path>) -> Result<PathBuf, SafetyError> {
        self.guard.validate_path(relative)
    }

    /// Whether a root-relative target exists.
    pub fn exists(&self, relative: impl AsRef<Path>) -> Result<bool, SafetyError> {
        Ok(self.resolve(relative)?.exists())
    }

    /// Create every missing directory of a root-relative directory path.
    ///
    /// Creating a directory that already exists is a no-op.
    pub fn ensure_directory(&self, relative: impl AsRef<Path>) -> Result<PathBuf, LocateError> {
        let dir = self.resolve(relative)?;
        self.create_dir_all(&dir)?;
        Ok(dir)
    }

    /// Create the parent directory chain of an already-resolved target file.
    pub fn ensure_parent(&self, file: &Path) -> Result<(), LocateError> {
        match file.parent() {
            Some(parent) if parent.starts_with(self.path()) => self.create_dir_all(parent),
            _ => Err(SafetyError::OutsideTree {
                path: file.to_path_buf(),
                root: self.path().to_path_buf(),
            }
            .into()),
        }
    }

    fn create_dir_all(&self, dir: &Path) -> Result<(), LocateError> {
        if !dir.is_dir() {
            debug!(dir = %dir.display(), "creating directory");
        }
        fs::create_dir_all(dir).map_err(|source| LocateError::CreateDir {
            path: dir.to_path_buf(),
            source,
        })
    }
}

/// Resolve the repository root from a start directory and a marker path.
///
/// Checks `start/marker`, then `start/../marker` (invocation from a tooling
/// directory one level below the tree). Fails with
/// [`LocateError::RootNotFound`] before anything is touched.
pub fn resolve_root(
    start: impl AsRef<Path>,
    marker: impl AsRef<Path>,
) -> Result<RepositoryRoot, LocateError> {
    let start = start.as_ref();
    let marker = marker.as_ref();

    // A relative start such as "." has no lexical parent
    let absolute = start
        .canonicalize()
        .unwrap_or_else(|_| start.to_path_buf());

    for candidate in std::iter::once(absolute.as_path()).chain(absolute.parent()) {
        if candidate.join(marker).exists() {
            debug!(root = %candidate.display(), marker = %marker.display(), "resolved tree root");
            return Ok(RepositoryRoot::new(candidate)?);
        }
    }

    Err(LocateError::RootNotFound {
        start: start.to_path_buf(),
        marker: marker.to_path_buf(),
    })
}
