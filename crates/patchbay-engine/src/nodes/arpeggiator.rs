//! Chord expander.
//!
//! Each note on `midi_in` becomes one note per interval on `midi_out`. The
//! incoming note stops here; only the expanded notes travel on. Notes pushed
//! past the MIDI range are skipped.

use std::any::Any;

use patchbay_core::{MidiMessage, Node, NodeId, NodeState, Port, PortKind, RoutedEvent};
use serde::Deserialize;

use super::{decode, decode_initial};
use crate::error::{EngineError, HandlerError};
use crate::instance::{DeviceGraph, EventContext, HandlerOutcome, RuntimeInstance};
use crate::registry::{NodeCategory, NodeDefaults, NodeDescriptor};

/// MIDI input port.
pub const MIDI_IN: &str = "midi_in";
/// MIDI output port.
pub const MIDI_OUT: &str = "midi_out";

/// Registry descriptor.
pub fn descriptor() -> NodeDescriptor {
    NodeDescriptor {
        type_id: "arpeggiator",
        name: "Arpeggiator",
        description: "Expands each note into a chord of intervals",
        category: NodeCategory::Event,
        ports,
    }
}

fn ports(_state: &NodeState) -> Vec<Port> {
    vec![
        Port::input(MIDI_IN, PortKind::Midi).named("MIDI In"),
        Port::output(MIDI_OUT, PortKind::Midi).named("MIDI Out"),
    ]
}

/// Registry constructor.
pub fn create(
    _device: &mut dyn DeviceGraph,
    node: &Node,
    _defaults: &NodeDefaults,
) -> Result<Box<dyn RuntimeInstance>, EngineError> {
    let settings: ArpeggiatorState = decode_initial(node)?;
    Ok(Box::new(Arpeggiator {
        id: node.id.clone(),
        intervals: settings.intervals,
    }))
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct ArpeggiatorState {
    intervals: Vec<i16>,
}

impl Default for ArpeggiatorState {
    fn default() -> Self {
        Self {
            intervals: vec![0, 4, 7],
        }
    }
}

/// Live chord expander.
#[derive(Debug)]
pub struct Arpeggiator {
    id: NodeId,
    intervals: Vec<i16>,
}

impl Arpeggiator {
    /// Semitone offsets applied to each note.
    pub fn intervals(&self) -> &[i16] {
        &self.intervals
    }

    fn expand(&self, message: MidiMessage, note: u8) -> impl Iterator<Item = MidiMessage> + '_ {
        let channel = message.channel();
        self.intervals.iter().filter_map(move |interval| {
            let shifted = i16::from(note).checked_add(*interval)?;
            let shifted = u8::try_from(shifted).ok().filter(|n| *n < 128)?;
            Some(match message {
                MidiMessage::NoteOn { velocity, .. } => MidiMessage::note_on(channel, shifted, velocity),
                _ => MidiMessage::note_off(channel, shifted),
            })
        })
    }
}

impl RuntimeInstance for Arpeggiator {
    fn update_state(&mut self, state: &NodeState) -> Result<(), HandlerError> {
        let settings: ArpeggiatorState = decode(&self.id, state)?;
        self.intervals = settings.intervals;
        Ok(())
    }

    fn handle_event(
        &mut self,
        event: &RoutedEvent,
        _ctx: &EventContext<'_>,
    ) -> Result<HandlerOutcome, HandlerError> {
        let RoutedEvent::Midi(midi) = event else {
            return Ok(HandlerOutcome::pass());
        };
        let Some(note) = midi.message.note() else {
            return Ok(HandlerOutcome::pass());
        };
        let outcome = self
            .expand(midi.message, note)
            .fold(HandlerOutcome::consumed(), |outcome, message| {
                outcome.with_emit_on(MIDI_OUT, message)
            });
        Ok(outcome)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn notes(arp: &Arpeggiator, message: MidiMessage) -> Vec<MidiMessage> {
        let note = message.note().unwrap();
        arp.expand(message, note).collect()
    }

    #[test]
    fn major_triad_by_default() {
        let node = Node::new("arp", "arpeggiator", NodeState::new());
        let settings: ArpeggiatorState = decode_initial(&node).unwrap();
        let arp = Arpeggiator {
            id: node.id,
            intervals: settings.intervals,
        };
        assert_eq!(
            notes(&arp, MidiMessage::note_on(2, 60, 90)),
            vec![
                MidiMessage::note_on(2, 60, 90),
                MidiMessage::note_on(2, 64, 90),
                MidiMessage::note_on(2, 67, 90),
            ]
        );
        assert_eq!(notes(&arp, MidiMessage::note_off(2, 60)).len(), 3);
    }

    #[test]
    fn out_of_range_notes_are_skipped() {
        let arp = Arpeggiator {
            id: NodeId::from("arp"),
            intervals: vec![-12, 0, 12],
        };
        assert_eq!(
            notes(&arp, MidiMessage::note_on(0, 120, 100)),
            vec![MidiMessage::note_on(0, 108, 100), MidiMessage::note_on(0, 120, 100)]
        );
        assert_eq!(notes(&arp, MidiMessage::note_on(0, 5, 100)).len(), 2);
    }

    #[test]
    fn extreme_intervals_are_skipped() {
        let arp = Arpeggiator {
            id: NodeId::from("arp"),
            intervals: vec![i16::MAX, 0, i16::MIN],
        };
        assert_eq!(
            notes(&arp, MidiMessage::note_on(0, 127, 100)),
            vec![MidiMessage::note_on(0, 127, 100)]
        );
        assert_eq!(notes(&arp, MidiMessage::note_off(0, 0)), vec![MidiMessage::note_off(0, 0)]);
    }
}
