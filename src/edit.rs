use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use xxhash_rust::xxh3::xxh3_64;

/// The fundamental write primitive: whole-file replacement with verification.
///
/// Every patch operation (stub authoring, rule rewriting, guarded append)
/// compiles down to this single primitive. Intelligence lives in planning,
/// not in application.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use = "FileEdit does nothing until apply() is called"]
pub struct FileEdit {
    /// Absolute path of the target file (already resolved against the root)
    pub file: PathBuf,
    /// Full content the file should hold after the edit
    pub new_text: String,
    /// What we expect to find on disk right before writing
    pub expected_before: EditVerification,
}

/// Verification strategy for edit safety.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditVerification {
    /// The file must not exist yet
    Absent,
    /// Exact text match required
    ExactMatch(String),
    /// xxh3 hash of expected bytes (large or non-UTF-8 files)
    Hash(u64),
}

impl EditVerification {
    /// Check if the current on-disk state matches the verification criteria.
    ///
    /// `None` means the file does not exist.
    pub fn matches(&self, current: Option<&[u8]>) -> bool {
        match (self, current) {
            (EditVerification::Absent, None) => true,
            (EditVerification::Absent, Some(_)) | (_, None) => false,
            (EditVerification::ExactMatch(expected), Some(bytes)) => bytes == expected.as_bytes(),
            (EditVerification::Hash(expected_hash), Some(bytes)) => {
                xxh3_64(bytes) == *expected_hash
            }
        }
    }

    /// Create verification from file contents, hashing anything over 1KB or
    /// not valid UTF-8.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        match std::str::from_utf8(bytes) {
            Ok(text) if text.len() <= 1024 => EditVerification::ExactMatch(text.to_string()),
            _ => EditVerification::Hash(xxh3_64(bytes)),
        }
    }

    /// Create verification from a read that may have found no file.
    pub fn from_current(current: Option<&[u8]>) -> Self {
        match current {
            Some(bytes) => Self::from_bytes(bytes),
            None => EditVerification::Absent,
        }
    }
}

#[derive(Error, Debug)]
pub enum EditError {
    #[error("File changed since it was planned: {file} (expected {expected})")]
    BeforeTextMismatch { file: PathBuf, expected: String },

    #[error("Cannot write {0}: path has no parent directory")]
    MissingParent(PathBuf),

    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("UTF-8 validation error: {0}")]
    Utf8(#[from] std::str::Utf8Error),
}

/// Result of applying an edit.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use = "EditResult should be checked for success/already-applied"]
pub enum EditResult {
    /// File was written
    Applied { file: PathBuf, bytes_written: usize },
    /// File already held new_text; nothing was written
    AlreadyApplied { file: PathBuf },
}

impl FileEdit {
    /// Create an edit whose verification is derived from the text that was read.
    pub fn new(file: impl Into<PathBuf>, new_text: impl Into<String>, current: Option<&str>) -> Self {
        Self {
            file: file.into(),
            new_text: new_text.into(),
            expected_before: EditVerification::from_current(current.map(str::as_bytes)),
        }
    }

    /// Create an edit with explicit verification strategy.
    pub fn with_verification(
        file: impl Into<PathBuf>,
        new_text: impl Into<String>,
        verification: EditVerification,
    ) -> Self {
        Self {
            file: file.into(),
            new_text: new_text.into(),
            expected_before: verification,
        }
    }

    /// True when the edit brings a new file into existence.
    pub fn creates_file(&self) -> bool {
        matches!(self.expected_before, EditVerification::Absent)
    }

    fn validate(&self, current: Option<&[u8]>) -> Result<(), EditError> {
        if self.expected_before.matches(current) {
            return Ok(());
        }
        Err(EditError::BeforeTextMismatch {
            file: self.file.clone(),
            expected: match &self.expected_before {
                EditVerification::Absent => "no file".to_string(),
                EditVerification::ExactMatch(_) => "planned text".to_string(),
                EditVerification::Hash(hash) => format!("xxh3 {hash:#018x}"),
            },
        })
    }

    /// Apply this edit to the file system atomically.
    ///
    /// Uses tempfile + fsync + rename for crash safety. The parent directory
    /// must already exist.
    pub fn apply(&self) -> Result<EditResult, EditError> {
        let current = read_bytes(&self.file)?;

        // Idempotency
        if current.as_deref() == Some(self.new_text.as_bytes()) {
            return Ok(EditResult::AlreadyApplied {
                file: self.file.clone(),
            });
        }

        self.validate(current.as_deref())?;

        atomic_write(&self.file, self.new_text.as_bytes())?;

        // Update mtime to invalidate incremental builds
        let now = filetime::FileTime::now();
        filetime::set_file_mtime(&self.file, now)?;

        Ok(EditResult::Applied {
            file: self.file.clone(),
            bytes_written: self.new_text.len(),
        })
    }
}

/// Read a file's raw bytes, returning `None` when it does not exist.
pub fn read_bytes(path: &Path) -> Result<Option<Vec<u8>>, EditError> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err.into()),
    }
}

/// Read a text file, returning `None` when it does not exist.
pub fn read_text(path: &Path) -> Result<Option<String>, EditError> {
    read_bytes(path)?
        .map(|bytes| String::from_utf8(bytes).map_err(|e| EditError::Utf8(e.utf8_error())))
        .transpose()
}

/// Atomic file write: tempfile + fsync + rename.
///
/// Either the full write succeeds or nothing changes. Permissions of an
/// existing file are carried over to the replacement.
fn atomic_write(path: &Path, content: &[u8]) -> Result<(), EditError> {
    // Create tempfile in same directory to ensure same filesystem
    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .ok_or_else(|| EditError::MissingParent(path.to_path_buf()))?;

    let mut temp = tempfile::NamedTempFile::new_in(parent)?;

    temp.write_all(content)?;
    temp.as_file().sync_all()?;

    match fs::metadata(path) {
        Ok(existing) => fs::set_permissions(temp.path(), existing.permissions())?,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => set_default_permissions(temp.path())?,
        Err(err) => return Err(err.into()),
    }

    temp.persist(path).map_err(|e| e.error)?;

    Ok(())
}

#[cfg(unix)]
fn set_default_permissions(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    // tempfile creates 0600; authored sources should be world-readable
    fs::set_permissions(path, fs::Permissions::from_mode(0o644))
}

#[cfg(not(unix))]
fn set_default_permissions(_path: &Path) -> std::io::Result<()> {
    Ok(())
}
