//! CLI command implementations.

pub mod common;
pub mod curve;
pub mod nodes;
pub mod patches;
pub mod play;
pub mod tempo;
pub mod validate;
