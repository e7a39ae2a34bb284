use std::path::{Component, Path, PathBuf};
use thiserror::Error;

/// Tree safety checks to prevent patches from touching files outside the
/// repository root.
///
/// Targets are frequently files that do not exist yet (stub authoring), so
/// paths are checked lexically first and then against the canonical form of
/// their nearest existing ancestor.
#[derive(Debug, Clone)]
pub struct TreeGuard {
    /// Canonical path to the repository root
    root: PathBuf,
}

#[derive(Error, Debug)]
pub enum SafetyError {
    #[error("Target path must be relative to the tree root: {0}")]
    AbsolutePath(PathBuf),

    #[error("Target path must not contain '..': {0}")]
    ParentTraversal(PathBuf),

    #[error("Target path is empty")]
    EmptyPath,

    #[error("Path is outside tree: {path} (root: {root})")]
    OutsideTree { path: PathBuf, root: PathBuf },

    #[error("Failed to canonicalize path: {0}")]
    Canonicalize(#[from] std::io::Error),
}

impl TreeGuard {
    /// Create a new guard for the given root.
    ///
    /// The root will be canonicalized to handle symlinks correctly.
    pub fn new(root: impl AsRef<Path>) -> Result<Self, SafetyError> {
        Ok(Self {
            root: root.as_ref().canonicalize()?,
        })
    }

    /// Check a root-relative target path and return its absolute form.
    pub fn validate_path(&self, relative: impl AsRef<Path>) -> Result<PathBuf, SafetyError> {
        let relative = relative.as_ref();

        if relative.as_os_str().is_empty() {
            return Err(SafetyError::EmptyPath);
        }

        for component in relative.components() {
            match component {
                Component::Normal(_) | Component::CurDir => {}
                Component::ParentDir => {
                    return Err(SafetyError::ParentTraversal(relative.to_path_buf()))
                }
                Component::RootDir | Component::Prefix(_) => {
                    return Err(SafetyError::AbsolutePath(relative.to_path_buf()))
                }
            }
        }

        let absolute = self.root.join(relative);
        self.check_existing_ancestor(&absolute)?;
        Ok(absolute)
    }

    /// Canonicalize the deepest existing ancestor and make sure symlinks do
    /// not lead out of the tree.
    fn check_existing_ancestor(&self, absolute: &Path) -> Result<(), SafetyError> {
        let Some(existing) = absolute.ancestors().find(|p| p.exists()) else {
            return Ok(());
        };
        let canonical = existing.canonicalize()?;
        if !canonical.starts_with(&self.root) {
            return Err(SafetyError::OutsideTree {
                path: canonical,
                root: self.root.clone(),
            });
        }
        Ok(())
    }

    /// Get the tree root.
    pub fn root(&self) -> &Path {
        &self.root
    }
}
