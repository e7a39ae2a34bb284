//! Patch sets compiled into the binary.

use crate::config::loader::{load_from_str, ConfigError};
use crate::config::schema::PatchConfig;
use std::path::Path;

const BUILTIN_SETS: &[(&str, &str)] = &[
    (
        "lineage-hardware",
        include_str!("../../patches/lineage-hardware.toml"),
    ),
    (
        "sense-biometrics",
        include_str!("../../patches/sense-biometrics.toml"),
    ),
    ("miui-camera", include_str!("../../patches/miui-camera.toml")),
];

/// Load one embedded set by name.
pub fn load_builtin(name: &str) -> Option<Result<PatchConfig, ConfigError>> {
    BUILTIN_SETS
        .iter()
        .find(|(candidate, _)| *candidate == name)
        .map(|(name, source)| parse(name, source))
}

/// Load every embedded set.
pub fn load_builtins() -> Result<Vec<(&'static str, PatchConfig)>, ConfigError> {
    BUILTIN_SETS
        .iter()
        .map(|(name, source)| Ok((*name, parse(name, source)?)))
        .collect()
}

fn parse(name: &str, source: &str) -> Result<PatchConfig, ConfigError> {
    let label = format!("builtin:{name}");
    load_from_str(source).map_err(|error| error.with_path(Path::new(&label)))
}
