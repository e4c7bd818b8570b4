//! Saved patch management.
//!
//! Lists, saves and locates graph documents in the user patch directory, and
//! writes a default engine config.

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Args, Subcommand};
use patchbay_config::{EngineConfig, load_graph, paths, save_graph};

use super::common;

#[derive(Args)]
pub struct PatchesArgs {
    #[command(subcommand)]
    command: PatchesCommand,
}

#[derive(Subcommand)]
enum PatchesCommand {
    /// List saved patches
    List,

    /// Normalize a graph document and save it as a user patch
    Save {
        /// Graph document to save
        graph: PathBuf,

        /// Patch name (defaults to the file stem)
        #[arg(short, long)]
        name: Option<String>,

        /// Overwrite if the patch already exists
        #[arg(long)]
        force: bool,

        /// Engine config file
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Write a default engine config to the user config directory
    Init {
        /// Overwrite an existing config
        #[arg(long)]
        force: bool,
    },

    /// Show config and patch directories
    Paths,
}

pub fn run(args: PatchesArgs) -> anyhow::Result<()> {
    match args.command {
        PatchesCommand::List => list_patches(),
        PatchesCommand::Save {
            graph,
            name,
            force,
            config,
        } => save_patch(&graph, name.as_deref(), force, config),
        PatchesCommand::Init { force } => init_config(force),
        PatchesCommand::Paths => {
            println!("Config:  {}", paths::default_config_path().display());
            println!("Patches: {}", paths::user_patches_dir().display());
            Ok(())
        }
    }
}

fn list_patches() -> anyhow::Result<()> {
    println!("User Patches:");
    println!("=============");
    let patches = paths::list_user_patches();
    if patches.is_empty() {
        println!("  (none)");
        println!();
        println!("  Save one with: patchbay patches save <graph.json>");
        return Ok(());
    }

    let config = common::load_config(None)?;
    let registry = common::registry(&config);
    for path in patches {
        let name = paths::patch_name_from_path(&path).unwrap_or_else(|| "unknown".to_owned());
        match load_graph(&path, &registry) {
            Ok(report) => println!(
                "  {:20} - {} node(s), {} connection(s)",
                name,
                report.graph.nodes.len(),
                report.graph.connections.len()
            ),
            Err(_) => println!("  {name:20} - (error loading)"),
        }
    }
    Ok(())
}

fn save_patch(
    graph: &Path,
    name: Option<&str>,
    force: bool,
    config: Option<PathBuf>,
) -> anyhow::Result<()> {
    let name = match name {
        Some(name) => name.to_owned(),
        None => paths::patch_name_from_path(graph)
            .with_context(|| format!("cannot name a patch after {}", graph.display()))?,
    };

    let config = common::load_config(config.as_deref())?;
    let registry = common::registry(&config);
    let report =
        load_graph(graph, &registry).with_context(|| format!("loading {}", graph.display()))?;

    let dir = paths::ensure_user_patches_dir()?;
    let target = dir.join(format!("{name}.json"));
    if target.exists() && !force {
        anyhow::bail!("Patch '{name}' already exists. Use --force to overwrite.");
    }

    save_graph(&report.graph, &target)?;
    if !report.is_clean() {
        println!("Dropped {} connection(s) while saving", report.dropped.len());
    }
    println!("Saved patch '{name}' to {}", target.display());
    Ok(())
}

fn init_config(force: bool) -> anyhow::Result<()> {
    let dir = paths::ensure_user_config_dir()?;
    let target = paths::default_config_path();
    if target.exists() && !force {
        anyhow::bail!(
            "Config already exists at {}. Use --force to overwrite.",
            target.display()
        );
    }
    EngineConfig::default().save(&target)?;
    println!("Wrote default config to {}", target.display());
    tracing::debug!(dir = %dir.display(), "config directory ready");
    Ok(())
}
