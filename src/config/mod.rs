pub mod applicator;
pub mod builtin;
pub mod loader;
pub mod schema;

pub use applicator::{
    apply_patches, check_patches, check_selection, plan_patch, ApplyOptions, FileChange,
    PatchReport, UnknownPatch,
};
pub use builtin::{load_builtin, load_builtins};
pub use loader::{load_from_path, load_from_str, ConfigError};
pub use schema::{
    Metadata, Operation, PatchConfig, PatchDefinition, RuleDefinition, ValidationError,
    ValidationIssue,
};
