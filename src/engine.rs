//! Patch engine: stub authoring, rule rewriting and guarded appends.
//!
//! Every operation is split in two:
//! - `plan_*` reads the target once and computes the outcome in memory,
//!   producing a [`Plan`]. Nothing is written.
//! - [`PatchEngine::commit`] performs the single atomic write a plan asks for.
//!
//! Dry runs and diffs stop after planning. The one-shot helpers
//! ([`PatchEngine::author_file`], [`PatchEngine::rewrite_file`],
//! [`PatchEngine::append_guarded`]) plan and commit in one call.

use crate::edit::{read_bytes, read_text, EditError, EditResult, EditVerification, FileEdit};
use crate::locate::{LocateError, RepositoryRoot};
use crate::rule::{RuleError, RuleSet, TransformationRule};
use crate::safety::SafetyError;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Outcome of a single patch.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use = "PatchResult should be reported"]
pub enum PatchResult {
    /// The file was created or rewritten
    Applied { file: PathBuf },
    /// An authored file already held the exact content
    Unchanged { file: PathBuf },
    /// Target file does not exist in this tree
    SkippedMissing { file: PathBuf },
    /// Guard marker already present; fragment not appended again
    SkippedPresent { file: PathBuf },
    /// Rewrite produced no change
    SkippedNoOp { file: PathBuf, reason: NoOpReason },
}

/// Why a rewrite was a no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoOpReason {
    /// No rule matched and the patch's applied marker is present
    AlreadyApplied,
    /// No rule matched and nothing confirms the patch was applied; the
    /// target may have drifted upstream
    NoRuleMatched,
    /// Rules matched but the output equals the input
    Unchanged,
}

impl PatchResult {
    pub fn file(&self) -> &Path {
        match self {
            PatchResult::Applied { file }
            | PatchResult::Unchanged { file }
            | PatchResult::SkippedMissing { file }
            | PatchResult::SkippedPresent { file }
            | PatchResult::SkippedNoOp { file, .. } => file,
        }
    }

    /// Stable short name used in reports.
    pub fn label(&self) -> &'static str {
        match self {
            PatchResult::Applied { .. } => "applied",
            PatchResult::Unchanged { .. } => "unchanged",
            PatchResult::SkippedMissing { .. } => "skipped-missing",
            PatchResult::SkippedPresent { .. } => "skipped-present",
            PatchResult::SkippedNoOp {
                reason: NoOpReason::NoRuleMatched,
                ..
            } => "no-match",
            PatchResult::SkippedNoOp { .. } => "skipped-noop",
        }
    }

    /// True when the tree already reflects the patch.
    pub fn is_settled(&self) -> bool {
        matches!(
            self,
            PatchResult::Unchanged { .. }
                | PatchResult::SkippedPresent { .. }
                | PatchResult::SkippedNoOp { .. }
        )
    }
}

impl fmt::Display for PatchResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PatchResult::Applied { file } => write!(f, "Applied to {}", file.display()),
            PatchResult::Unchanged { file } => write!(f, "Unchanged {}", file.display()),
            PatchResult::SkippedMissing { file } => {
                write!(f, "Skipped (missing target): {}", file.display())
            }
            PatchResult::SkippedPresent { file } => {
                write!(f, "Skipped (marker present): {}", file.display())
            }
            PatchResult::SkippedNoOp { file, reason } => match reason {
                NoOpReason::AlreadyApplied => {
                    write!(f, "Already applied to {}", file.display())
                }
                NoOpReason::NoRuleMatched => {
                    write!(f, "No rule matched in {}", file.display())
                }
                NoOpReason::Unchanged => {
                    write!(f, "Skipped (no change): {}", file.display())
                }
            },
        }
    }
}

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("rule configuration error: {0}")]
    Rule(#[from] RuleError),

    #[error(transparent)]
    Safety(#[from] SafetyError),

    #[error(transparent)]
    Locate(#[from] LocateError),

    #[error(transparent)]
    Edit(#[from] EditError),
}

impl EngineError {
    /// Configuration errors come from the patch definition, not the tree.
    pub fn is_configuration(&self) -> bool {
        matches!(self, EngineError::Rule(_) | EngineError::Safety(_))
    }
}

/// A write the engine intends to perform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedWrite {
    pub edit: FileEdit,
    /// Content read during planning, lossily decoded for display; `None`
    /// for a new file
    pub original: Option<String>,
}

/// The computed outcome of a patch, before anything is written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Plan {
    Write(PlannedWrite),
    Skip(PatchResult),
}

impl Plan {
    /// The result this plan would report if committed.
    pub fn expected_result(&self) -> PatchResult {
        match self {
            Plan::Write(write) => PatchResult::Applied {
                file: write.edit.file.clone(),
            },
            Plan::Skip(result) => result.clone(),
        }
    }
}

/// Applies patches beneath one repository root.
#[derive(Debug, Clone, Copy)]
pub struct PatchEngine<'r> {
    root: &'r RepositoryRoot,
}

impl<'r> PatchEngine<'r> {
    pub fn new(root: &'r RepositoryRoot) -> Self {
        Self { root }
    }

    /// Plan authoring a stub file with authoritative `content`.
    ///
    /// Existing files with different content are fully replaced, whether or
    /// not they hold valid UTF-8.
    pub fn plan_author(&self, file: impl AsRef<Path>, content: &str) -> Result<Plan, EngineError> {
        let path = self.root.resolve(file)?;
        let current = read_bytes(&path)?;

        if current.as_deref() == Some(content.as_bytes()) {
            debug!(file = %path.display(), "authored file already up to date");
            return Ok(Plan::Skip(PatchResult::Unchanged { file: path }));
        }

        let expected = EditVerification::from_current(current.as_deref());
        Ok(Plan::Write(PlannedWrite {
            edit: FileEdit::with_verification(&path, content, expected),
            original: current.map(|bytes| String::from_utf8_lossy(&bytes).into_owned()),
        }))
    }

    /// Plan rewriting an existing file with an ordered rule set.
    ///
    /// `applied_marker`, when given, is a substring whose presence confirms
    /// that the patch was applied earlier; it only affects how a no-match is
    /// reported.
    pub fn plan_rewrite(
        &self,
        file: impl AsRef<Path>,
        rules: &RuleSet,
        applied_marker: Option<&str>,
    ) -> Result<Plan, EngineError> {
        let path = self.root.resolve(file)?;
        let Some(original) = read_text(&path)? else {
            debug!(file = %path.display(), "rewrite target missing");
            return Ok(Plan::Skip(PatchResult::SkippedMissing { file: path }));
        };

        let present = rules.present_in(&original);
        if present.is_empty() {
            let reason = match applied_marker {
                Some(marker) if original.contains(marker) => NoOpReason::AlreadyApplied,
                _ => {
                    warn!(
                        file = %path.display(),
                        "no rule matched; assuming already patched"
                    );
                    NoOpReason::NoRuleMatched
                }
            };
            return Ok(Plan::Skip(PatchResult::SkippedNoOp { file: path, reason }));
        }
        debug!(file = %path.display(), rules = ?present, "rules matched");

        let rewritten = rules.apply(&original);
        if rewritten == original {
            return Ok(Plan::Skip(PatchResult::SkippedNoOp {
                file: path,
                reason: NoOpReason::Unchanged,
            }));
        }
        rules.check_idempotent(&rewritten)?;

        Ok(Plan::Write(PlannedWrite {
            edit: FileEdit::new(&path, rewritten, Some(&original)),
            original: Some(original),
        }))
    }

    /// Plan appending `fragment` unless `marker` already occurs in the file.
    pub fn plan_append(
        &self,
        file: impl AsRef<Path>,
        marker: &str,
        fragment: &str,
    ) -> Result<Plan, EngineError> {
        let path = self.root.resolve(file)?;
        let Some(original) = read_text(&path)? else {
            return Ok(Plan::Skip(PatchResult::SkippedMissing { file: path }));
        };

        if original.contains(marker) {
            debug!(file = %path.display(), marker, "guard marker present");
            return Ok(Plan::Skip(PatchResult::SkippedPresent { file: path }));
        }

        let appended = join_fragment(&original, fragment);
        Ok(Plan::Write(PlannedWrite {
            edit: FileEdit::new(&path, appended, Some(&original)),
            original: Some(original),
        }))
    }

    /// Perform the write a plan asks for.
    pub fn commit(&self, plan: Plan) -> Result<PatchResult, EngineError> {
        let write = match plan {
            Plan::Skip(result) => return Ok(result),
            Plan::Write(write) => write,
        };

        if write.edit.creates_file() {
            self.root.ensure_parent(&write.edit.file)?;
        }

        match write.edit.apply()? {
            EditResult::Applied {
                file,
                bytes_written,
            } => {
                info!(file = %file.display(), bytes_written, "wrote file");
                Ok(PatchResult::Applied { file })
            }
            EditResult::AlreadyApplied { file } => Ok(PatchResult::Unchanged { file }),
        }
    }

    /// Create or overwrite a stub file. Reports `Applied` or `Unchanged`.
    pub fn author_file(&self, file: impl AsRef<Path>, content: &str) -> Result<PatchResult, EngineError> {
        let plan = self.plan_author(file, content)?;
        self.commit(plan)
    }

    /// Rewrite an existing file. Reports `Applied`, `SkippedMissing` or
    /// `SkippedNoOp`.
    pub fn rewrite_file(
        &self,
        file: impl AsRef<Path>,
        rules: &[TransformationRule],
    ) -> Result<PatchResult, EngineError> {
        let rules = RuleSet::compile(rules)?;
        let plan = self.plan_rewrite(file, &rules, None)?;
        self.commit(plan)
    }

    /// Append a guarded fragment. Reports `Applied`, `SkippedPresent` or
    /// `SkippedMissing`.
    pub fn append_guarded(
        &self,
        file: impl AsRef<Path>,
        marker: &str,
        fragment: &str,
    ) -> Result<PatchResult, EngineError> {
        let plan = self.plan_append(file, marker, fragment)?;
        self.commit(plan)
    }
}

/// Append `fragment` to `content`, following the file's newline conventions.
///
/// A missing final newline is added before the fragment, CRLF files get CRLF
/// fragment lines, and a file that ended with a newline still does.
pub fn join_fragment(content: &str, fragment: &str) -> String {
    let crlf = content.contains("\r\n");
    let newline = if crlf { "\r\n" } else { "\n" };
    let fragment = if crlf {
        fragment.replace("\r\n", "\n").replace('\n', "\r\n")
    } else {
        fragment.to_string()
    };

    let mut out = String::with_capacity(content.len() + fragment.len() + 2);
    out.push_str(content);
    if !content.is_empty() && !content.ends_with('\n') {
        out.push_str(newline);
    }
    out.push_str(&fragment);
    if content.ends_with('\n') && !fragment.ends_with('\n') {
        out.push_str(newline);
    }
    out
}
