//! MIDI entry point.
//!
//! Routed dispatch starts at a source's `midi_out` port. When a control
//! surface delivers directly to the source, it keeps track of held notes so
//! the host can show them or release them.

use std::any::Any;
use std::collections::BTreeSet;

use patchbay_core::{MidiMessage, Node, NodeState, Port, PortKind, RoutedEvent};

use crate::error::{EngineError, HandlerError};
use crate::instance::{DeviceGraph, EventContext, HandlerOutcome, RuntimeInstance};
use crate::registry::{NodeCategory, NodeDefaults, NodeDescriptor};

/// Output port carrying MIDI.
pub const MIDI_OUT: &str = "midi_out";

/// Registry descriptor.
pub fn descriptor() -> NodeDescriptor {
    NodeDescriptor {
        type_id: "midi_source",
        name: "MIDI Source",
        description: "Keyboard or sequencer input",
        category: NodeCategory::Source,
        ports,
    }
}

fn ports(_state: &NodeState) -> Vec<Port> {
    vec![Port::output(MIDI_OUT, PortKind::Midi).named("MIDI Out")]
}

/// Registry constructor.
pub fn create(
    _device: &mut dyn DeviceGraph,
    _node: &Node,
    _defaults: &NodeDefaults,
) -> Result<Box<dyn RuntimeInstance>, EngineError> {
    Ok(Box::new(MidiSource::default()))
}

/// Live MIDI source.
#[derive(Debug, Default)]
pub struct MidiSource {
    held: BTreeSet<(u8, u8)>,
}

impl MidiSource {
    /// Held `(channel, note)` pairs, lowest first.
    pub fn held_notes(&self) -> impl Iterator<Item = (u8, u8)> + '_ {
        self.held.iter().copied()
    }

    fn track(&mut self, message: &MidiMessage) {
        let channel = message.channel();
        if message.is_all_notes_off() {
            self.held.retain(|(ch, _)| *ch != channel);
        } else if let Some(note) = message.note() {
            if message.is_note_on() {
                self.held.insert((channel, note));
            } else {
                self.held.remove(&(channel, note));
            }
        }
    }
}

impl RuntimeInstance for MidiSource {
    fn update_state(&mut self, _state: &NodeState) -> Result<(), HandlerError> {
        Ok(())
    }

    fn handle_event(
        &mut self,
        event: &RoutedEvent,
        _ctx: &EventContext<'_>,
    ) -> Result<HandlerOutcome, HandlerError> {
        if let RoutedEvent::Midi(midi) = event {
            self.track(&midi.message);
        }
        Ok(HandlerOutcome::pass())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracks_held_notes() {
        let mut source = MidiSource::default();
        source.track(&MidiMessage::note_on(0, 60, 100));
        source.track(&MidiMessage::note_on(1, 64, 100));
        source.track(&MidiMessage::note_on(0, 67, 0));
        assert_eq!(source.held_notes().collect::<Vec<_>>(), vec![(0, 60), (1, 64)]);

        source.track(&MidiMessage::note_off(0, 60));
        source.track(&MidiMessage::all_notes_off(1));
        assert_eq!(source.held_notes().count(), 0);
    }
}
