//! Discrete events routed through the graph.
//!
//! Events are immutable values that exist only on the dispatch path. Each
//! carries a [`Timestamp`] drawn from a process-wide monotonic counter, so two
//! otherwise identical events (the same note pressed twice) stay distinct for
//! deduplication while a single event reaching a node through two paths does
//! not.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::graph::PortKind;

/// MIDI controller number for "All Notes Off".
pub const ALL_NOTES_OFF_CC: u8 = 123;

/// Number of MIDI channels.
pub const MIDI_CHANNELS: u8 = 16;

/// Monotonic event identity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(pub u64);

static NEXT_TIMESTAMP: AtomicU64 = AtomicU64::new(1);

impl Timestamp {
    /// Returns a fresh timestamp, strictly greater than every earlier one.
    pub fn next() -> Self {
        Self(NEXT_TIMESTAMP.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A MIDI channel message.
///
/// Channels are 0-based (0..16). Data bytes are 7-bit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum MidiMessage {
    /// Key pressed.
    NoteOn {
        /// Channel (0-15).
        channel: u8,
        /// Note number.
        note: u8,
        /// Velocity; zero is treated as note-off by consumers.
        velocity: u8,
    },
    /// Key released.
    NoteOff {
        /// Channel (0-15).
        channel: u8,
        /// Note number.
        note: u8,
        /// Release velocity.
        #[serde(default)]
        velocity: u8,
    },
    /// Continuous controller.
    #[serde(rename = "cc")]
    ControlChange {
        /// Channel (0-15).
        channel: u8,
        /// Controller number.
        controller: u8,
        /// Controller value.
        value: u8,
    },
    /// 14-bit pitch bend, centered at 8192.
    PitchBend {
        /// Channel (0-15).
        channel: u8,
        /// Bend amount (0..16384).
        value: u16,
    },
    /// Program change.
    ProgramChange {
        /// Channel (0-15).
        channel: u8,
        /// Program number.
        program: u8,
    },
}

impl MidiMessage {
    /// Note-on on `channel`.
    pub fn note_on(channel: u8, note: u8, velocity: u8) -> Self {
        Self::NoteOn {
            channel: channel & 0x0F,
            note: note & 0x7F,
            velocity: velocity & 0x7F,
        }
    }

    /// Note-off on `channel`.
    pub fn note_off(channel: u8, note: u8) -> Self {
        Self::NoteOff {
            channel: channel & 0x0F,
            note: note & 0x7F,
            velocity: 0,
        }
    }

    /// Control change on `channel`.
    pub fn control_change(channel: u8, controller: u8, value: u8) -> Self {
        Self::ControlChange {
            channel: channel & 0x0F,
            controller: controller & 0x7F,
            value: value & 0x7F,
        }
    }

    /// "All Notes Off" on `channel`.
    pub fn all_notes_off(channel: u8) -> Self {
        Self::control_change(channel, ALL_NOTES_OFF_CC, 0)
    }

    /// Channel this message is addressed to.
    pub fn channel(&self) -> u8 {
        match *self {
            Self::NoteOn { channel, .. }
            | Self::NoteOff { channel, .. }
            | Self::ControlChange { channel, .. }
            | Self::PitchBend { channel, .. }
            | Self::ProgramChange { channel, .. } => channel,
        }
    }

    /// Returns `true` for a note-on with non-zero velocity.
    pub fn is_note_on(&self) -> bool {
        matches!(self, Self::NoteOn { velocity, .. } if *velocity > 0)
    }

    /// Returns `true` for a note-off, or a note-on with zero velocity.
    pub fn is_note_off(&self) -> bool {
        matches!(self, Self::NoteOff { .. } | Self::NoteOn { velocity: 0, .. })
    }

    /// Note number for note messages.
    pub fn note(&self) -> Option<u8> {
        match *self {
            Self::NoteOn { note, .. } | Self::NoteOff { note, .. } => Some(note),
            _ => None,
        }
    }

    /// Returns `true` for "All Notes Off".
    pub fn is_all_notes_off(&self) -> bool {
        matches!(
            self,
            Self::ControlChange {
                controller: ALL_NOTES_OFF_CC,
                ..
            }
        )
    }

    /// Parses a raw channel message. Returns `None` for system or truncated
    /// messages.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        let status = *bytes.first()?;
        let channel = status & 0x0F;
        let data = |i: usize| bytes.get(i).map(|b| b & 0x7F);
        match status & 0xF0 {
            0x80 => Some(Self::NoteOff {
                channel,
                note: data(1)?,
                velocity: data(2)?,
            }),
            0x90 => Some(Self::NoteOn {
                channel,
                note: data(1)?,
                velocity: data(2)?,
            }),
            0xB0 => Some(Self::ControlChange {
                channel,
                controller: data(1)?,
                value: data(2)?,
            }),
            0xC0 => Some(Self::ProgramChange {
                channel,
                program: data(1)?,
            }),
            0xE0 => {
                let lsb = u16::from(data(1)?);
                let msb = u16::from(data(2)?);
                Some(Self::PitchBend {
                    channel,
                    value: (msb << 7) | lsb,
                })
            }
            _ => None,
        }
    }

    /// Encodes as raw bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        match *self {
            Self::NoteOff {
                channel,
                note,
                velocity,
            } => vec![0x80 | channel, note, velocity],
            Self::NoteOn {
                channel,
                note,
                velocity,
            } => vec![0x90 | channel, note, velocity],
            Self::ControlChange {
                channel,
                controller,
                value,
            } => vec![0xB0 | channel, controller, value],
            Self::ProgramChange { channel, program } => vec![0xC0 | channel, program],
            Self::PitchBend { channel, value } => {
                let value = value.min(0x3FFF);
                vec![0xE0 | channel, (value & 0x7F) as u8, (value >> 7) as u8]
            }
        }
    }

    /// `(status, data1, data2)` triple used for event identity.
    fn identity(&self) -> (u8, u8, u16) {
        match *self {
            Self::NoteOn { channel, note, .. } => (0x90 | channel, note, 0),
            Self::NoteOff { channel, note, .. } => (0x80 | channel, note, 0),
            Self::ControlChange {
                channel,
                controller,
                value,
            } => (0xB0 | channel, controller, u16::from(value)),
            Self::PitchBend { channel, value } => (0xE0 | channel, 0, value),
            Self::ProgramChange { channel, program } => (0xC0 | channel, program, 0),
        }
    }
}

/// A MIDI message stamped for dispatch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MidiEvent {
    /// The message.
    pub message: MidiMessage,
    /// Identity for deduplication.
    pub timestamp: Timestamp,
}

impl MidiEvent {
    /// Stamps `message` with a fresh timestamp.
    pub fn new(message: MidiMessage) -> Self {
        Self {
            message,
            timestamp: Timestamp::next(),
        }
    }
}

/// Kind of a voice event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum VoiceEventKind {
    /// Gate opened on the voice.
    GateOn,
    /// Gate closed on the voice.
    GateOff,
    /// One-shot trigger on the voice.
    Trigger,
}

/// A gate or trigger pulse addressed to one voice index.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VoiceEvent {
    /// Voice index in the sender's address space.
    pub voice: usize,
    /// What happened on the voice.
    pub kind: VoiceEventKind,
    /// Identity for deduplication.
    pub timestamp: Timestamp,
}

impl VoiceEvent {
    /// Stamps a voice event with a fresh timestamp.
    pub fn new(voice: usize, kind: VoiceEventKind) -> Self {
        Self {
            voice,
            kind,
            timestamp: Timestamp::next(),
        }
    }

    /// Gate-on for `voice`.
    pub fn gate_on(voice: usize) -> Self {
        Self::new(voice, VoiceEventKind::GateOn)
    }

    /// Gate-off for `voice`.
    pub fn gate_off(voice: usize) -> Self {
        Self::new(voice, VoiceEventKind::GateOff)
    }
}

/// Any event the router can carry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RoutedEvent {
    /// MIDI-like event; travels `midi` and `cc` edges.
    Midi(MidiEvent),
    /// Voice event; travels `gate` and `trigger` edges.
    Voice(VoiceEvent),
}

/// Deduplication identity of a routed event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct EventKey {
    kind: u8,
    channel: u8,
    data: u16,
    voice: usize,
    timestamp: Timestamp,
}

impl RoutedEvent {
    /// Returns `true` if this event may traverse an edge of `kind`.
    pub fn accepts(&self, kind: PortKind) -> bool {
        match self {
            Self::Midi(_) => kind.is_midi(),
            Self::Voice(_) => kind.is_voice(),
        }
    }

    /// Identity of this event for the router's visited set.
    pub fn dedupe_key(&self) -> EventKey {
        match self {
            Self::Midi(event) => {
                let (status, data1, data2) = event.message.identity();
                EventKey {
                    kind: status & 0xF0,
                    channel: status & 0x0F,
                    data: (u16::from(data1) << 8) ^ data2,
                    voice: 0,
                    timestamp: event.timestamp,
                }
            }
            Self::Voice(event) => EventKey {
                kind: match event.kind {
                    VoiceEventKind::GateOn => 1,
                    VoiceEventKind::GateOff => 2,
                    VoiceEventKind::Trigger => 3,
                },
                channel: 0,
                data: 0,
                voice: event.voice,
                timestamp: event.timestamp,
            },
        }
    }

    /// Timestamp of the wrapped event.
    pub fn timestamp(&self) -> Timestamp {
        match self {
            Self::Midi(event) => event.timestamp,
            Self::Voice(event) => event.timestamp,
        }
    }
}

impl From<MidiEvent> for RoutedEvent {
    fn from(event: MidiEvent) -> Self {
        Self::Midi(event)
    }
}

impl From<VoiceEvent> for RoutedEvent {
    fn from(event: VoiceEvent) -> Self {
        Self::Voice(event)
    }
}

impl From<MidiMessage> for RoutedEvent {
    fn from(message: MidiMessage) -> Self {
        Self::Midi(MidiEvent::new(message))
    }
}

/// A MIDI message placed at an absolute tick on a timeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimelineEvent {
    /// Tick position.
    pub tick: u64,
    /// Message to send.
    pub message: MidiMessage,
}

impl TimelineEvent {
    /// Creates a timeline event.
    pub fn new(tick: u64, message: MidiMessage) -> Self {
        Self { tick, message }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamps_are_monotonic() {
        let a = Timestamp::next();
        let b = Timestamp::next();
        assert!(b > a);
    }

    #[test]
    fn parses_channel_messages() {
        assert_eq!(
            MidiMessage::from_bytes(&[0x91, 60, 100]),
            Some(MidiMessage::note_on(1, 60, 100))
        );
        assert_eq!(
            MidiMessage::from_bytes(&[0xE0, 0x00, 0x40]),
            Some(MidiMessage::PitchBend {
                channel: 0,
                value: 8192
            })
        );
        assert_eq!(MidiMessage::from_bytes(&[0xF8]), None);
        assert_eq!(MidiMessage::from_bytes(&[0x90, 60]), None);
    }

    #[test]
    fn encodes_pitch_bend() {
        let bend = MidiMessage::PitchBend {
            channel: 2,
            value: 8192,
        };
        assert_eq!(bend.to_bytes(), vec![0xE2, 0x00, 0x40]);
    }

    #[test]
    fn zero_velocity_note_on_is_note_off() {
        let msg = MidiMessage::note_on(0, 60, 0);
        assert!(msg.is_note_off());
        assert!(!msg.is_note_on());
    }

    #[test]
    fn all_notes_off_is_cc_123() {
        let msg = MidiMessage::all_notes_off(15);
        assert_eq!(msg.to_bytes(), vec![0xBF, 123, 0]);
        assert!(msg.is_all_notes_off());
    }

    #[test]
    fn dedupe_key_distinguishes_notes_and_stamps() {
        let first = MidiEvent::new(MidiMessage::note_on(0, 60, 100));
        let copy = RoutedEvent::Midi(first);
        assert_eq!(RoutedEvent::Midi(first).dedupe_key(), copy.dedupe_key());

        let other_note = RoutedEvent::Midi(MidiEvent {
            message: MidiMessage::note_on(0, 64, 100),
            timestamp: first.timestamp,
        });
        assert_ne!(copy.dedupe_key(), other_note.dedupe_key());

        let restamped = RoutedEvent::Midi(MidiEvent::new(first.message));
        assert_ne!(copy.dedupe_key(), restamped.dedupe_key());
    }

    #[test]
    fn edge_kind_filtering() {
        let midi = RoutedEvent::from(MidiMessage::note_on(0, 60, 1));
        let gate = RoutedEvent::from(VoiceEvent::gate_on(0));
        assert!(midi.accepts(PortKind::Midi) && midi.accepts(PortKind::Cc));
        assert!(!midi.accepts(PortKind::Gate));
        assert!(gate.accepts(PortKind::Trigger));
        assert!(!gate.accepts(PortKind::Audio));
    }

    #[test]
    fn message_json_shape() {
        let value = serde_json::to_value(MidiMessage::control_change(0, 74, 64)).unwrap();
        assert_eq!(value["type"], "cc");
        assert_eq!(value["controller"], 74);
        let back: MidiMessage =
            serde_json::from_str(r#"{"type":"noteOff","channel":0,"note":60}"#).unwrap();
        assert_eq!(back, MidiMessage::note_off(0, 60));
    }
}
