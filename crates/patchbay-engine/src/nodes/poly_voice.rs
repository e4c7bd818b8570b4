//! Voice pool owner.
//!
//! Turns notes arriving on `midi_in` into gate events on `gate_out`, one
//! voice per held note. When the pool is full a voice is stolen; its old
//! note is gated off before the new one is gated on.
//!
//! Shrinking the pool through state keeps the voices that still fit. Held
//! voices that were cut off are gated off ahead of whatever the node emits
//! for the next event it handles.

use std::any::Any;

use patchbay_core::{
    AllocationMode, Node, NodeId, NodeState, Port, PortId, PortKind, RoutedEvent, VoiceAllocator,
    VoiceEvent,
};
use serde::Deserialize;

use super::{decode, decode_initial};
use crate::error::{EngineError, HandlerError};
use crate::instance::{DeviceGraph, Emission, EventContext, HandlerOutcome, RuntimeInstance};
use crate::registry::{NodeCategory, NodeDefaults, NodeDescriptor};

/// MIDI input port.
pub const MIDI_IN: &str = "midi_in";
/// Gate output port.
pub const GATE_OUT: &str = "gate_out";

/// Registry descriptor.
pub fn descriptor() -> NodeDescriptor {
    NodeDescriptor {
        type_id: "poly_voice",
        name: "Poly Voice",
        description: "Allocates voices to notes and emits per-voice gates",
        category: NodeCategory::Voice,
        ports,
    }
}

fn ports(_state: &NodeState) -> Vec<Port> {
    vec![
        Port::input(MIDI_IN, PortKind::Midi).named("MIDI In"),
        Port::output(GATE_OUT, PortKind::Gate).named("Gate Out"),
    ]
}

/// Registry constructor.
pub fn create(
    _device: &mut dyn DeviceGraph,
    node: &Node,
    defaults: &NodeDefaults,
) -> Result<Box<dyn RuntimeInstance>, EngineError> {
    let settings: PolyVoiceState = decode_initial(node)?;
    let mut poly = PolyVoice {
        id: node.id.clone(),
        default_size: defaults.pool_size,
        allocator: VoiceAllocator::new(defaults.pool_size),
        cut_voices: Vec::new(),
    };
    poly.configure(&settings);
    Ok(Box::new(poly))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PolyVoiceState {
    voices: Option<usize>,
    mode: AllocationMode,
}

/// Live voice pool.
#[derive(Debug)]
pub struct PolyVoice {
    id: NodeId,
    default_size: usize,
    allocator: VoiceAllocator,
    /// Held voices dropped by a resize, awaiting their gate-off.
    cut_voices: Vec<usize>,
}

impl PolyVoice {
    /// The pool.
    pub fn allocator(&self) -> &VoiceAllocator {
        &self.allocator
    }

    fn configure(&mut self, settings: &PolyVoiceState) {
        let size = settings.voices.unwrap_or(self.default_size);
        let cut = self.allocator.resize(size);
        if !cut.is_empty() {
            tracing::debug!(node = %self.id, size, cut = cut.len(), "voice pool shrank under held notes");
        }
        self.cut_voices.extend(cut);
        if settings.mode != self.allocator.mode() {
            self.allocator = self.allocator.clone().with_mode(settings.mode);
        }
    }

    fn respond(&mut self, event: &RoutedEvent) -> HandlerOutcome {
        let RoutedEvent::Midi(midi) = event else {
            return HandlerOutcome::pass();
        };
        let message = midi.message;
        let channel = message.channel();

        if message.is_all_notes_off() {
            return self
                .allocator
                .release_all()
                .into_iter()
                .fold(HandlerOutcome::consumed(), |outcome, voice| {
                    outcome.with_emit_on(GATE_OUT, VoiceEvent::gate_off(voice))
                });
        }

        let Some(note) = message.note() else {
            return HandlerOutcome::pass();
        };

        if message.is_note_on() {
            let allocation = self.allocator.allocate(note, channel);
            let mut outcome = HandlerOutcome::consumed();
            if allocation.stolen.is_some() {
                outcome = outcome.with_emit_on(GATE_OUT, VoiceEvent::gate_off(allocation.voice));
            }
            return outcome.with_emit_on(GATE_OUT, VoiceEvent::gate_on(allocation.voice));
        }

        match self.allocator.release(note, channel) {
            Some(voice) => HandlerOutcome::consumed().with_emit_on(GATE_OUT, VoiceEvent::gate_off(voice)),
            None => HandlerOutcome::consumed(),
        }
    }
}

impl RuntimeInstance for PolyVoice {
    fn update_state(&mut self, state: &NodeState) -> Result<(), HandlerError> {
        let settings: PolyVoiceState = decode(&self.id, state)?;
        self.configure(&settings);
        Ok(())
    }

    fn handle_event(
        &mut self,
        event: &RoutedEvent,
        _ctx: &EventContext<'_>,
    ) -> Result<HandlerOutcome, HandlerError> {
        let mut outcome = self.respond(event);
        if !self.cut_voices.is_empty() {
            let mut emit: Vec<Emission> = self
                .cut_voices
                .drain(..)
                .map(|voice| Emission {
                    event: VoiceEvent::gate_off(voice).into(),
                    port: Some(PortId::from(GATE_OUT)),
                })
                .collect();
            emit.append(&mut outcome.emit);
            outcome.emit = emit;
        }
        Ok(outcome)
    }

    fn voice_allocator(&self) -> Option<&VoiceAllocator> {
        Some(&self.allocator)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
