//! Patchbay Core - data model and math for the patch graph engine
//!
//! This crate holds everything the runtime engine reasons about that does not
//! touch a live backend: the declarative graph, the events that flow through
//! it, voice pools, envelope curves and tempo maps. It performs no I/O.
//!
//! # Core Abstractions
//!
//! ## Graph Model
//!
//! - [`GraphState`] - Nodes plus typed connections, passed around as snapshots
//! - [`PortCatalog`] - Derives a node's ports from its type and state
//! - [`GraphState::normalized`] - Normalize-on-read filtering of bad wires
//! - [`StatePatch`] / [`PatchSet`] - Field patches aggregated per traversal
//!
//! ## Events
//!
//! - [`MidiMessage`] / [`MidiEvent`] - MIDI-like events on `midi`/`cc` edges
//! - [`VoiceEvent`] - Gate and trigger pulses on `gate`/`trigger` edges
//! - [`RoutedEvent`] - Either of the above, with a deduplication key
//!
//! ## Voices
//!
//! - [`VoiceAllocator`] - Fixed pool of voices with stealing policies
//! - [`VoiceMapping`] - Associative composition of per-hop voice renumbering
//!
//! ## Curves and Time
//!
//! - [`shaped_t`] / [`inv_t_from_u`] - Shaped curve and its exact inverse
//! - [`EnvelopeSpec`] - ADSR timings, segment evaluation, baking and playheads
//! - [`TempoMap`] - Piecewise-linear tick ↔ seconds conversion
//!
//! # Features
//!
//! - `tracing` - emit `tracing` debug events from graph normalization
//!
//! # Example
//!
//! ```rust
//! use patchbay_core::{EnvelopeSpec, shaped_t, inv_t_from_u};
//!
//! let u = shaped_t(0.25, 0.6);
//! assert!((inv_t_from_u(u, 0.6) - 0.25).abs() < 1e-12);
//!
//! let env = EnvelopeSpec {
//!     attack_ms: 10.0,
//!     decay_ms: 100.0,
//!     sustain_level: 0.5,
//!     ..EnvelopeSpec::default()
//! };
//! assert!((env.level_at(110.0, None) - 0.5).abs() < 1e-9);
//! ```

pub mod curve;
pub mod envelope;
pub mod event;
pub mod graph;
pub mod tempo;
pub mod voice;

pub use curve::{clamp_shape, inv_t_from_u, shaped_lerp, shaped_t};
pub use envelope::{BakedEnvelope, DEFAULT_CURVE_RESOLUTION, EnvelopePhase, EnvelopeSpec, Segment};
pub use event::{
    ALL_NOTES_OFF_CC, EventKey, MIDI_CHANNELS, MidiEvent, MidiMessage, RoutedEvent,
    TimelineEvent, Timestamp, VoiceEvent, VoiceEventKind,
};
pub use graph::{
    Connection, ConnectionId, ConnectionKey, DropReason, DroppedConnection, GraphError,
    GraphState, Node, NodeId, NodeState, PatchSet, Port, PortCatalog, PortDirection, PortId,
    PortKind, PortRef, StatePatch,
};
pub use tempo::{Breakpoint, DEFAULT_BPM, DEFAULT_TICKS_PER_BEAT, TempoChange, TempoMap};
pub use voice::{
    Allocation, AllocationMode, DEFAULT_POOL_SIZE, MAX_POOL_SIZE, VoiceAllocator, VoiceMap,
    VoiceMapping, VoiceSlot,
};
