//! Port types.
//!
//! Ports are never stored in a graph document. Each node type derives its
//! port list from the node's current state (a mixer's input count, an audio
//! unit's channel count), so ports must be recomputed whenever state changes.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier of a port, unique within its node.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PortId(pub String);

impl PortId {
    /// Creates a port identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PortId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PortId {
    fn from(id: &str) -> Self {
        Self(id.to_owned())
    }
}

impl From<String> for PortId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Signal category carried by a port and by the connections attached to it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PortKind {
    /// Audio-rate signal.
    Audio,
    /// Control voltage.
    Cv,
    /// Pitch control signal.
    Pitch,
    /// Parameter automation signal.
    Automation,
    /// Per-voice gate (on/off) events.
    Gate,
    /// Per-voice trigger pulses.
    Trigger,
    /// MIDI-like note and channel events.
    Midi,
    /// MIDI continuous-controller events.
    Cc,
}

impl PortKind {
    /// All kinds, in declaration order.
    pub const ALL: [PortKind; 8] = [
        PortKind::Audio,
        PortKind::Cv,
        PortKind::Pitch,
        PortKind::Automation,
        PortKind::Gate,
        PortKind::Trigger,
        PortKind::Midi,
        PortKind::Cc,
    ];

    /// Continuous kinds are physically wired in the device graph.
    pub const fn is_continuous(self) -> bool {
        matches!(
            self,
            PortKind::Audio | PortKind::Cv | PortKind::Pitch | PortKind::Automation
        )
    }

    /// Voice kinds carry gate/trigger events.
    pub const fn is_voice(self) -> bool {
        matches!(self, PortKind::Gate | PortKind::Trigger)
    }

    /// MIDI kinds carry note, controller and channel events.
    pub const fn is_midi(self) -> bool {
        matches!(self, PortKind::Midi | PortKind::Cc)
    }

    /// Discrete kinds are routed as events rather than wired.
    pub const fn is_discrete(self) -> bool {
        !self.is_continuous()
    }

    /// Lowercase name used in documents.
    pub const fn name(self) -> &'static str {
        match self {
            PortKind::Audio => "audio",
            PortKind::Cv => "cv",
            PortKind::Pitch => "pitch",
            PortKind::Automation => "automation",
            PortKind::Gate => "gate",
            PortKind::Trigger => "trigger",
            PortKind::Midi => "midi",
            PortKind::Cc => "cc",
        }
    }
}

impl fmt::Display for PortKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Direction of a port relative to its node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PortDirection {
    /// Receives signal or events.
    Input,
    /// Produces signal or events.
    Output,
}

/// A port derived from node state.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Port {
    /// Identifier, unique within the node.
    pub id: PortId,
    /// Display name.
    pub name: String,
    /// Signal category.
    pub kind: PortKind,
    /// Input or output.
    pub direction: PortDirection,
}

impl Port {
    /// Creates an input port whose name equals its id.
    pub fn input(id: impl Into<String>, kind: PortKind) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id: PortId(id),
            kind,
            direction: PortDirection::Input,
        }
    }

    /// Creates an output port whose name equals its id.
    pub fn output(id: impl Into<String>, kind: PortKind) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id: PortId(id),
            kind,
            direction: PortDirection::Output,
        }
    }

    /// Replaces the display name.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Returns `true` for input ports.
    pub fn is_input(&self) -> bool {
        self.direction == PortDirection::Input
    }

    /// Returns `true` for output ports.
    pub fn is_output(&self) -> bool {
        self.direction == PortDirection::Output
    }
}
