//! Documents and configuration for patchbay.
//!
//! This crate is the on-disk side of the engine: graph documents that are
//! normalized on read, timeline documents for playback, and a TOML engine
//! config with platform-specific default locations.
//!
//! # Features
//!
//! - **Graph documents**: [`load_graph`] / [`save_graph`], dropping invalid
//!   connections with a report instead of failing
//! - **Timelines**: [`TimelineDocument`] with tempo changes and MIDI events
//! - **Engine config**: [`EngineConfig`] for scheduler timing, envelope
//!   resolution and voice pool size
//! - **Paths**: Platform-specific config and patch directories
//!
//! # Example
//!
//! ```rust,no_run
//! use patchbay_config::{EngineConfig, load_graph, paths};
//! use patchbay_engine::{NodeRegistry, OfflineDeviceGraph, PatchRuntime};
//!
//! let config = EngineConfig::load_or_default(paths::default_config_path())?;
//! let registry = NodeRegistry::new().with_defaults(config.node_defaults());
//!
//! let report = load_graph("patch.json", &registry)?;
//! let mut runtime = PatchRuntime::with_registry(registry, OfflineDeviceGraph::new());
//! runtime.apply(&report.graph);
//! # Ok::<(), patchbay_config::ConfigError>(())
//! ```

mod document;
mod engine_config;
mod error;
mod timeline;

/// Platform-specific paths for configuration and patches.
pub mod paths;

pub use document::{LoadReport, load_graph, parse_graph, save_graph};
pub use engine_config::{EngineConfig, EnvelopeConfig, SchedulerConfig, VoiceConfig};
pub use error::ConfigError;
pub use paths::{default_config_path, find_patch, user_config_dir, user_patches_dir};
pub use timeline::TimelineDocument;
