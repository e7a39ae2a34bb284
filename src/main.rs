use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use colored::Colorize;
use similar::{ChangeTag, TextDiff};
use std::env;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;
use tree_patcher::config::{
    apply_patches, check_patches, check_selection, load_builtins, load_from_path, ApplyOptions,
    FileChange, PatchConfig, PatchReport,
};
use tree_patcher::engine::{NoOpReason, PatchResult};
use tree_patcher::locate::{resolve_root, RepositoryRoot, DEFAULT_ROOT_MARKER};
use tree_patcher::report::{ReportLine, RunReport, RunSummary};
use walkdir::WalkDir;

#[derive(Parser)]
#[command(name = "tree-patcher")]
#[command(about = "Idempotent patcher that stubs out removed subsystems in a build tree", long_about = None)]
#[command(version)]
struct Cli {
    /// Enable debug logging (overrides RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Clone)]
struct TreeArgs {
    /// Tree root, or a directory one level below it (defaults to the current directory)
    #[arg(short, long, env = "ANDROID_BUILD_TOP")]
    root: Option<PathBuf>,

    /// Path that only exists inside the tree root (defaults to the patch sets' root_marker)
    #[arg(short, long)]
    marker: Option<PathBuf>,

    /// Patch set file to load, repeatable (otherwise ./patches/*.toml, then the built-in sets)
    #[arg(short, long)]
    patches: Vec<PathBuf>,

    /// Only run the patch with this id, repeatable
    #[arg(long, value_name = "ID")]
    only: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply patches to a tree
    Apply {
        #[command(flatten)]
        tree: TreeArgs,

        /// Dry run - show what would be changed without modifying files
        #[arg(short = 'n', long)]
        dry_run: bool,

        /// Show unified diff of changes
        #[arg(short, long)]
        diff: bool,

        /// Output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// Check status of patches without applying
    Status {
        #[command(flatten)]
        tree: TreeArgs,
    },

    /// Fail unless every patch is already reflected in the tree
    Verify {
        #[command(flatten)]
        tree: TreeArgs,
    },

    /// List loaded patch sets and their patches
    List {
        /// Patch set file to load, repeatable
        #[arg(short, long)]
        patches: Vec<PathBuf>,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let outcome = match cli.command {
        Commands::Apply {
            tree,
            dry_run,
            diff,
            format,
        } => cmd_apply(&tree, dry_run, diff, format),
        Commands::Status { tree } => cmd_status(&tree),
        Commands::Verify { tree } => cmd_verify(&tree),
        Commands::List { patches } => cmd_list(&patches),
    };

    match outcome {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{} {:#}", "error:".red().bold(), e);
            ExitCode::from(1)
        }
    }
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// A loaded patch set and the name it is reported under.
struct PatchSet {
    name: String,
    config: PatchConfig,
}

/// Discover all .toml patch files directly inside `dir`, sorted by path.
fn discover_patch_files(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(dir).max_depth(1) {
        let entry = entry?;
        if entry.file_type().is_file()
            && entry.path().extension().and_then(|s| s.to_str()) == Some("toml")
        {
            files.push(entry.path().to_path_buf());
        }
    }
    files.sort();
    Ok(files)
}

/// Load patch sets.
///
/// Priority order:
/// 1. Explicit --patches files
/// 2. Every .toml in ./patches
/// 3. The built-in sets
fn load_patch_sets(explicit: &[PathBuf]) -> Result<Vec<PatchSet>> {
    let files = if explicit.is_empty() {
        discover_patch_files(Path::new("patches"))?
    } else {
        explicit.to_vec()
    };

    if files.is_empty() {
        debug!("no patch files found; using built-in sets");
        let sets = load_builtins().context("load built-in patch sets")?;
        return Ok(sets
            .into_iter()
            .map(|(name, config)| PatchSet {
                name: name.to_string(),
                config,
            })
            .collect());
    }

    files
        .iter()
        .map(|path| {
            let config = load_from_path(path)?;
            let name = if config.meta.name.is_empty() {
                path.file_stem()
                    .map(|stem| stem.to_string_lossy().into_owned())
                    .unwrap_or_else(|| path.display().to_string())
            } else {
                config.meta.name.clone()
            };
            Ok(PatchSet { name, config })
        })
        .collect()
}

/// Load patch sets, check `--only` and resolve the root. Nothing is written
/// before all three succeed.
fn prepare(tree: &TreeArgs) -> Result<(Vec<PatchSet>, RepositoryRoot)> {
    let sets = load_patch_sets(&tree.patches)?;
    check_selection(sets.iter().map(|set| &set.config), &tree.only)?;

    let start = match &tree.root {
        Some(root) => root.clone(),
        None => env::current_dir().context("read current directory")?,
    };
    let root = match &tree.marker {
        Some(marker) => resolve_root(&start, marker)?,
        None => {
            let marker = marker_from_sets(&sets);
            let root = resolve_root(&start, &marker)?;
            warn_on_absent_markers(&sets, &root, &marker);
            root
        }
    };
    Ok((sets, root))
}

/// The first declared root_marker, or the default.
fn marker_from_sets(sets: &[PatchSet]) -> PathBuf {
    sets.iter()
        .find_map(|set| set.config.meta.root_marker.as_deref())
        .map_or_else(|| PathBuf::from(DEFAULT_ROOT_MARKER), PathBuf::from)
}

/// Warn about declared markers that do not exist under the chosen root.
fn warn_on_absent_markers(sets: &[PatchSet], root: &RepositoryRoot, used: &Path) {
    let declared = sets
        .iter()
        .filter_map(|set| set.config.meta.root_marker.as_deref());
    for other in declared.filter(|other| Path::new(other) != used) {
        if root.path().join(other).exists() {
            continue;
        }
        warn!(
            using = %used.display(),
            absent = other,
            "another patch set's root marker is missing under this root; pass --marker to choose"
        );
    }
}

/// Helper: Show unified diff between original and modified content
fn display_diff(change: &FileChange) {
    let file = change.file.display();
    println!("\n{}", format!("--- {file} (original)").dimmed());
    println!("{}", format!("+++ {file} (patched)").dimmed());

    let diff = TextDiff::from_lines(&change.before, &change.after);

    for change in diff.iter_all_changes() {
        let sign = match change.tag() {
            ChangeTag::Delete => format!("-{}", change).red(),
            ChangeTag::Insert => format!("+{}", change).green(),
            ChangeTag::Equal => format!(" {}", change).normal(),
        };
        print!("{}", sign);
    }
}

fn print_report(report: &PatchReport, dry_run: bool) {
    let id = &report.id;
    match &report.result {
        Ok(PatchResult::Applied { file }) => {
            let verb = if dry_run { "Would apply to" } else { "Applied to" };
            println!("{} {}: {} {}", "✓".green(), id, verb, file.display());
        }
        Ok(
            result @ PatchResult::SkippedNoOp {
                reason: NoOpReason::NoRuleMatched,
                ..
            },
        ) => {
            println!("{} {}: {}", "⚠".yellow(), id, result);
            println!(
                "  {}",
                "No rule matched; the file may have changed upstream".dimmed()
            );
        }
        Ok(result @ PatchResult::SkippedMissing { .. }) => {
            println!("{} {}: {}", "⊘".cyan(), id, result);
        }
        Ok(result) => {
            println!("{} {}: {}", "⊙".yellow(), id, result);
        }
        Err(e) => {
            eprintln!("{} {}: Error - {}", "✗".red(), id, e);
            if e.is_configuration() {
                eprintln!("  {}", "Fix the patch definition; other patches still ran".dimmed());
            }
        }
    }
}

fn print_summary(summary: &RunSummary) {
    println!("{}", "Summary:".bold());
    println!("  {} applied", format!("{}", summary.applied).green());
    println!("  {} unchanged", format!("{}", summary.settled()).yellow());
    println!(
        "  {} skipped (missing target)",
        format!("{}", summary.skipped_missing).cyan()
    );
    if summary.no_match > 0 {
        println!(
            "  {} no rule matched",
            format!("{}", summary.no_match).yellow()
        );
    }
    println!("  {} failed", format!("{}", summary.failed).red());
}

fn cmd_apply(
    tree: &TreeArgs,
    dry_run: bool,
    show_diff: bool,
    format: OutputFormat,
) -> Result<ExitCode> {
    let (sets, root) = prepare(tree)?;
    let text = format == OutputFormat::Text;

    if text {
        println!("Tree: {}", root.path().display());
        if dry_run {
            println!("{}", "[DRY RUN - showing what would be applied]".cyan());
        }
        println!();
    }

    let options = ApplyOptions {
        dry_run,
        capture_changes: show_diff && text,
        only: tree.only.clone(),
    };

    let mut summary = RunSummary::default();
    let mut lines = Vec::new();

    for set in &sets {
        let reports = apply_patches(&set.config, &root, &options);
        if reports.is_empty() {
            continue;
        }

        if text {
            println!("{}", format!("[{}]", set.name).bold());
        }
        for report in &reports {
            summary.record(report.result.as_ref().ok());
            if text {
                print_report(report, dry_run);
                if let Some(change) = &report.change {
                    display_diff(change);
                }
            } else {
                lines.push(ReportLine::new(&set.name, report));
            }
        }
        if text {
            println!();
        }
    }

    if text {
        print_summary(&summary);
    } else {
        let run = RunReport {
            root: root.path().display().to_string(),
            dry_run,
            patches: lines,
            summary: summary.clone(),
        };
        println!("{}", run.to_json().context("serialize report")?);
    }

    Ok(ExitCode::from(summary.exit_code()))
}

fn cmd_status(tree: &TreeArgs) -> Result<ExitCode> {
    let (sets, root) = prepare(tree)?;

    println!("{}", "Patch Status Report".bold());
    println!("Tree: {}", root.path().display());
    println!();

    let options = ApplyOptions {
        dry_run: true,
        only: tree.only.clone(),
        ..ApplyOptions::default()
    };

    let mut applied = Vec::new();
    let mut pending = Vec::new();
    let mut missing = Vec::new();
    let mut failed = Vec::new();
    let mut summary = RunSummary::default();

    for set in &sets {
        for report in apply_patches(&set.config, &root, &options) {
            summary.record(report.result.as_ref().ok());
            match report.result {
                Ok(PatchResult::Applied { file }) => {
                    pending.push((report.id, file.display().to_string()));
                }
                Ok(PatchResult::SkippedMissing { file }) => {
                    missing.push((report.id, file.display().to_string()));
                }
                Ok(PatchResult::SkippedNoOp {
                    reason: NoOpReason::NoRuleMatched,
                    ..
                }) => {
                    applied.push((report.id, "no rule matched; unconfirmed".to_string()));
                }
                Ok(result) => {
                    applied.push((report.id, result.label().to_string()));
                }
                Err(e) => {
                    failed.push((report.id, e.to_string()));
                }
            }
        }
    }

    let groups = [
        ("✓".green(), "APPLIED".green().bold(), &applied),
        ("⊙".yellow(), "PENDING".yellow().bold(), &pending),
        ("⊘".cyan(), "MISSING".cyan().bold(), &missing),
        ("✗".red(), "FAILED".red().bold(), &failed),
    ];
    for (symbol, title, entries) in groups {
        if entries.is_empty() {
            continue;
        }
        println!("{} {} ({} patches)", symbol, title, entries.len());
        for (id, detail) in entries {
            println!("  - {} ({})", id, detail.dimmed());
        }
        println!();
    }

    Ok(ExitCode::from(summary.exit_code()))
}

fn cmd_verify(tree: &TreeArgs) -> Result<ExitCode> {
    let (sets, root) = prepare(tree)?;

    println!("{}", "Verifying patches...".bold());
    println!("Tree: {}", root.path().display());
    println!();

    let mut summary = RunSummary::default();

    for set in &sets {
        let reports = check_patches(&set.config, &root);
        for report in reports
            .iter()
            .filter(|r| tree.only.is_empty() || tree.only.contains(&r.id))
        {
            summary.record(report.result.as_ref().ok());
            let id = &report.id;
            match &report.result {
                Ok(PatchResult::Applied { file }) => {
                    eprintln!("{} {}: MISMATCH", "✗".red(), id);
                    eprintln!("  Expected: patch already applied");
                    eprintln!("  Found: patch not yet applied");
                    eprintln!("  Location: {}", file.display());
                }
                Ok(PatchResult::SkippedMissing { file }) => {
                    println!("{} {}: Skipped (missing {})", "⊘".cyan(), id, file.display());
                }
                Ok(
                    result @ PatchResult::SkippedNoOp {
                        reason: NoOpReason::NoRuleMatched,
                        ..
                    },
                ) => {
                    println!("{} {}: Unconfirmed ({})", "⚠".yellow(), id, result);
                }
                Ok(_) => {
                    println!("{} {}: Verified (already applied)", "✓".green(), id);
                }
                Err(e) => {
                    eprintln!("{} {}: MISMATCH", "✗".red(), id);
                    eprintln!("  Error: {}", e);
                }
            }
        }
    }

    let mismatch = summary.applied + summary.failed;
    println!();
    println!("{}", "Summary:".bold());
    println!("  {} verified", format!("{}", summary.settled()).green());
    println!("  {} unconfirmed", format!("{}", summary.no_match).yellow());
    println!("  {} mismatch", format!("{}", mismatch).red());
    println!("  {} skipped", format!("{}", summary.skipped_missing).cyan());

    Ok(ExitCode::from(u8::from(mismatch > 0)))
}

fn cmd_list(patches: &[PathBuf]) -> Result<ExitCode> {
    let sets = load_patch_sets(patches)?;

    for set in &sets {
        println!("{}", set.name.bold());
        if let Some(description) = &set.config.meta.description {
            println!("  {}", description.dimmed());
        }
        if let Some(marker) = &set.config.meta.root_marker {
            println!("  root marker: {}", marker);
        }
        for patch in &set.config.patches {
            println!(
                "  - {} [{}] {}",
                patch.id,
                patch.operation.kind().cyan(),
                patch.file
            );
            if let Some(description) = &patch.description {
                println!("      {}", description.dimmed());
            }
        }
        println!();
    }

    Ok(ExitCode::SUCCESS)
}
