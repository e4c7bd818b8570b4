//! Shared helpers for commands.

use std::path::{Path, PathBuf};

use anyhow::Context;
use patchbay_config::{EngineConfig, paths};
use patchbay_engine::NodeRegistry;

/// Loads the engine config from `explicit`, or the user default if present.
pub fn load_config(explicit: Option<&Path>) -> anyhow::Result<EngineConfig> {
    match explicit {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("loading config {}", path.display())),
        None => Ok(EngineConfig::load_or_default(paths::default_config_path())?),
    }
}

/// Registry of built-in node types using the config's defaults.
pub fn registry(config: &EngineConfig) -> NodeRegistry {
    NodeRegistry::new().with_defaults(config.node_defaults())
}

/// Resolves a patch argument, falling back to the user patch directory.
pub fn resolve_patch(arg: &Path) -> PathBuf {
    arg.to_str()
        .and_then(paths::find_patch)
        .unwrap_or_else(|| arg.to_path_buf())
}
