//! Run summaries and machine-readable output.

use crate::config::PatchReport;
use crate::engine::{NoOpReason, PatchResult};
use serde::Serialize;

/// Tallies of one run, by outcome.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub applied: usize,
    pub unchanged: usize,
    pub skipped_missing: usize,
    pub skipped_present: usize,
    pub skipped_noop: usize,
    /// Rewrites where no rule matched and nothing confirms a previous run
    pub no_match: usize,
    pub failed: usize,
}

impl RunSummary {
    pub fn from_reports<'a>(reports: impl IntoIterator<Item = &'a PatchReport>) -> Self {
        let mut summary = Self::default();
        for report in reports {
            summary.record(report.result.as_ref().ok());
        }
        summary
    }

    /// Count one outcome; `None` is a failure.
    pub fn record(&mut self, result: Option<&PatchResult>) {
        let counter = match result {
            None => &mut self.failed,
            Some(PatchResult::Applied { .. }) => &mut self.applied,
            Some(PatchResult::Unchanged { .. }) => &mut self.unchanged,
            Some(PatchResult::SkippedMissing { .. }) => &mut self.skipped_missing,
            Some(PatchResult::SkippedPresent { .. }) => &mut self.skipped_present,
            Some(PatchResult::SkippedNoOp {
                reason: NoOpReason::NoRuleMatched,
                ..
            }) => &mut self.no_match,
            Some(PatchResult::SkippedNoOp { .. }) => &mut self.skipped_noop,
        };
        *counter += 1;
    }

    pub fn total(&self) -> usize {
        self.applied
            + self.unchanged
            + self.skipped_missing
            + self.skipped_present
            + self.skipped_noop
            + self.no_match
            + self.failed
    }

    /// Patches confirmed to hold in the tree. A no-match is not confirmation.
    pub fn settled(&self) -> usize {
        self.unchanged + self.skipped_present + self.skipped_noop
    }

    /// Process exit code for the run: non-zero when any patch failed, whether
    /// from its definition or from the tree.
    pub fn exit_code(&self) -> u8 {
        u8::from(self.failed > 0)
    }
}

/// One patch in the JSON report.
#[derive(Debug, Clone, Serialize)]
pub struct ReportLine {
    pub set: String,
    pub id: String,
    pub operation: &'static str,
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ReportLine {
    pub fn new(set: &str, report: &PatchReport) -> Self {
        let (status, file, error) = match &report.result {
            Ok(result) => (
                result.label(),
                Some(result.file().display().to_string()),
                None,
            ),
            Err(error) => ("failed", None, Some(error.to_string())),
        };
        Self {
            set: set.to_string(),
            id: report.id.clone(),
            operation: report.kind,
            status,
            file,
            error,
        }
    }
}

/// Full JSON report of a run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub root: String,
    pub dry_run: bool,
    pub patches: Vec<ReportLine>,
    pub summary: RunSummary,
}

impl RunReport {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
