//! Tree Patcher: idempotent source-tree patching for OS build trees
//!
//! Makes a large build tree compile after a subsystem has been removed, by
//! stubbing out references to it. Patches are declared as data (TOML patch
//! sets) and applied by a small engine with three operations:
//!
//! - **author**: write a whole file with authoritative content
//! - **rewrite**: run an ordered list of named text rules over an existing file
//! - **append-guarded**: append a fragment unless its marker is already present
//!
//! # Architecture
//!
//! Every operation compiles down to a single primitive: [`FileEdit`], a
//! verified whole-file replacement. The engine plans an edit in memory
//! ([`Plan`]), and committing it performs one atomic write.
//!
//! # Safety
//!
//! - The repository root is resolved once and passed explicitly
//! - Target paths are confined to the root (no `..`, no symlink escape)
//! - Writes verify the file did not change since it was read
//! - Atomic file writes (tempfile + fsync + rename)
//! - Re-running a patch set leaves the tree byte-identical
//!
//! # Example
//!
//! ```no_run
//! use tree_patcher::{resolve_root, PatchEngine, TransformationRule};
//!
//! let root = resolve_root(".", "frameworks/base")?;
//! let engine = PatchEngine::new(&root);
//!
//! let rules = [TransformationRule::literal(
//!     "can-use-provider",
//!     "SenseUtils.canUseProvider()",
//!     "false",
//! )];
//! let result = engine.rewrite_file("frameworks/base/Foo.java", &rules)?;
//! println!("{result}");
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod config;
pub mod edit;
pub mod engine;
pub mod locate;
pub mod report;
pub mod rule;
pub mod safety;

// Re-exports
pub use config::{
    apply_patches, check_patches, load_builtins, load_from_path, load_from_str, ApplyOptions,
    ConfigError, PatchConfig, PatchReport,
};
pub use edit::{EditError, EditResult, EditVerification, FileEdit};
pub use engine::{EngineError, NoOpReason, PatchEngine, PatchResult, Plan};
pub use locate::{resolve_root, LocateError, RepositoryRoot, DEFAULT_ROOT_MARKER};
pub use report::{RunReport, RunSummary};
pub use rule::{RuleError, RuleSet, TextPattern, TransformationRule};
pub use safety::{SafetyError, TreeGuard};
