//! Patch applicator - runs a patch set against a repository root
//!
//! Patches run in declaration order. Each one is planned, optionally
//! committed, and reported on its own: a failure in one patch is recorded
//! against that patch and the run moves on to the next.

use crate::config::schema::{Operation, PatchConfig, PatchDefinition};
use crate::engine::{EngineError, PatchEngine, PatchResult, Plan};
use crate::locate::RepositoryRoot;
use crate::rule::{RuleSet, TransformationRule};
use std::fmt;
use std::path::PathBuf;
use tracing::{debug, info_span, warn};

/// Options controlling a single run.
#[derive(Debug, Clone, Default)]
pub struct ApplyOptions {
    /// Plan only; `Applied` then means "would apply"
    pub dry_run: bool,
    /// Keep before/after text of every planned write
    pub capture_changes: bool,
    /// Restrict the run to these patch ids (empty = all)
    pub only: Vec<String>,
}

impl ApplyOptions {
    fn selects(&self, id: &str) -> bool {
        self.only.is_empty() || self.only.iter().any(|wanted| wanted == id)
    }
}

/// Before and after text of a planned write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileChange {
    pub file: PathBuf,
    /// Empty for a file that does not exist yet
    pub before: String,
    pub after: String,
}

/// Outcome of one patch in a run.
#[derive(Debug)]
pub struct PatchReport {
    pub id: String,
    pub kind: &'static str,
    pub result: Result<PatchResult, EngineError>,
    pub change: Option<FileChange>,
}

/// Apply every selected patch of `config` beneath `root`.
pub fn apply_patches(
    config: &PatchConfig,
    root: &RepositoryRoot,
    options: &ApplyOptions,
) -> Vec<PatchReport> {
    let engine = PatchEngine::new(root);
    config
        .patches
        .iter()
        .filter(|patch| options.selects(&patch.id))
        .map(|patch| run_patch(&engine, patch, options))
        .collect()
}

/// Evaluate patch status without touching the tree.
///
/// Mirrors [`apply_patches`] result semantics, with `Applied` meaning the
/// patch is still pending.
pub fn check_patches(config: &PatchConfig, root: &RepositoryRoot) -> Vec<PatchReport> {
    let options = ApplyOptions {
        dry_run: true,
        ..ApplyOptions::default()
    };
    apply_patches(config, root, &options)
}

fn run_patch(engine: &PatchEngine<'_>, patch: &PatchDefinition, options: &ApplyOptions) -> PatchReport {
    let _span = info_span!("patch", id = %patch.id).entered();
    let kind = patch.operation.kind();

    let plan = match plan_patch(engine, patch) {
        Ok(plan) => plan,
        Err(error) => {
            warn!(%error, "patch failed");
            return PatchReport {
                id: patch.id.clone(),
                kind,
                result: Err(error),
                change: None,
            };
        }
    };

    let change = match &plan {
        Plan::Write(write) if options.capture_changes => Some(FileChange {
            file: write.edit.file.clone(),
            before: write.original.clone().unwrap_or_default(),
            after: write.edit.new_text.clone(),
        }),
        _ => None,
    };

    let result = if options.dry_run {
        debug!("dry run; not writing");
        Ok(plan.expected_result())
    } else {
        engine.commit(plan)
    };
    if let Err(error) = &result {
        warn!(%error, "patch failed");
    }

    PatchReport {
        id: patch.id.clone(),
        kind,
        result,
        change,
    }
}

/// Compute what a patch definition would do to the tree.
pub fn plan_patch(engine: &PatchEngine<'_>, patch: &PatchDefinition) -> Result<Plan, EngineError> {
    match &patch.operation {
        Operation::Author { content } => engine.plan_author(&patch.file, content),
        Operation::Rewrite {
            rules,
            applied_marker,
        } => {
            let rules: Vec<TransformationRule> = rules.iter().map(|r| r.to_rule()).collect();
            let compiled = RuleSet::compile(&rules)?;
            engine.plan_rewrite(&patch.file, &compiled, applied_marker.as_deref())
        }
        Operation::AppendGuarded { marker, fragment } => {
            engine.plan_append(&patch.file, marker, fragment)
        }
    }
}

/// A `--only` id that no loaded patch set defines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownPatch {
    pub id: String,
    pub suggestion: Option<String>,
}

impl fmt::Display for UnknownPatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown patch id '{}'", self.id)?;
        if let Some(suggestion) = &self.suggestion {
            write!(f, " (did you mean '{suggestion}'?)")?;
        }
        Ok(())
    }
}

impl std::error::Error for UnknownPatch {}

/// Check every requested id against the loaded sets.
pub fn check_selection<'a>(
    configs: impl IntoIterator<Item = &'a PatchConfig>,
    only: &[String],
) -> Result<(), UnknownPatch> {
    let known: Vec<&str> = configs
        .into_iter()
        .flat_map(|config| config.patches.iter().map(|p| p.id.as_str()))
        .collect();

    for id in only {
        if known.contains(&id.as_str()) {
            continue;
        }
        let suggestion = known
            .iter()
            .map(|candidate| (strsim::jaro_winkler(id, candidate), *candidate))
            .filter(|(score, _)| *score > 0.8)
            .max_by(|a, b| a.0.total_cmp(&b.0))
            .map(|(_, candidate)| candidate.to_string());
        return Err(UnknownPatch {
            id: id.clone(),
            suggestion,
        });
    }
    Ok(())
}
