//! Built-in node types.
//!
//! Each module exposes a `descriptor()` and a `create` constructor for the
//! [`NodeRegistry`](crate::NodeRegistry), plus the concrete instance type so
//! hosts can inspect it through [`InstanceMap::get_as`](crate::InstanceMap::get_as).
//!
//! | Type tag | Ports | Role |
//! |----------|-------|------|
//! | `midi_source` | `midi_out` | Entry point for played or sequenced MIDI |
//! | `poly_voice` | `midi_in` → `gate_out` | Owns a voice pool |
//! | `voice_remap` | `gate_in` → `gate_out` | Renumbers voices |
//! | `envelope` | `midi_in`, `gate_in` → `audio_out` | Gate-driven ADSR |
//! | `cc_map` | `cc_in` | Turns a controller into a state value |
//! | `arpeggiator` | `midi_in` → `midi_out` | Expands notes into chords |
//! | `audio_unit` | `in`, `cv_in` → `out` | Generic signal processor |

pub mod arpeggiator;
pub mod audio_unit;
pub mod cc_map;
pub mod envelope;
pub mod midi_source;
pub mod poly_voice;
pub mod voice_remap;

pub use arpeggiator::Arpeggiator;
pub use audio_unit::AudioUnit;
pub use cc_map::CcMap;
pub use envelope::{Envelope, GateKey, GateTiming};
pub use midi_source::MidiSource;
pub use poly_voice::PolyVoice;
pub use voice_remap::VoiceRemap;

use patchbay_core::{Node, NodeId, NodeState};
use serde::de::DeserializeOwned;

use crate::error::{EngineError, HandlerError};

/// Decodes node state into a typed view.
fn decode<T: DeserializeOwned>(id: &NodeId, state: &NodeState) -> Result<T, HandlerError> {
    Ok(state.decode_for(id)?)
}

/// Decodes the state a node is created with.
fn decode_initial<T: DeserializeOwned>(node: &Node) -> Result<T, EngineError> {
    decode(&node.id, &node.state).map_err(|e| EngineError::create_instance(&node.id, e))
}
