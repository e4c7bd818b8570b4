//! Gate-driven ADSR envelope.
//!
//! Owns one processing unit whose output channel carries the envelope
//! signal. Gates arrive either as notes on `midi_in` or as voice events on
//! `gate_in`; each open gate is timed so the host can read the level the
//! backend is rendering at any moment.
//!
//! State is an [`EnvelopeSpec`]. Every state change re-bakes the real-time
//! curves at the registry's curve resolution.

use std::any::Any;
use std::collections::BTreeMap;

use patchbay_core::{
    BakedEnvelope, EnvelopePhase, EnvelopeSpec, Node, NodeId, NodeState, Port, PortId, PortKind,
    RoutedEvent, VoiceEvent, VoiceEventKind,
};

use super::{decode, decode_initial};
use crate::error::{EngineError, HandlerError};
use crate::instance::{DeviceGraph, Endpoint, EventContext, HandlerOutcome, RuntimeInstance, UnitId};
use crate::registry::{NodeCategory, NodeDefaults, NodeDescriptor};

/// MIDI input port.
pub const MIDI_IN: &str = "midi_in";
/// Gate input port.
pub const GATE_IN: &str = "gate_in";
/// Envelope signal output.
pub const AUDIO_OUT: &str = "audio_out";

/// Registry descriptor.
pub fn descriptor() -> NodeDescriptor {
    NodeDescriptor {
        type_id: "envelope",
        name: "Envelope",
        description: "ADSR envelope with shaped segments",
        category: NodeCategory::Modulation,
        ports,
    }
}

fn ports(_state: &NodeState) -> Vec<Port> {
    vec![
        Port::input(MIDI_IN, PortKind::Midi).named("MIDI In"),
        Port::input(GATE_IN, PortKind::Gate).named("Gate In"),
        Port::output(AUDIO_OUT, PortKind::Audio).named("Out"),
    ]
}

/// Registry constructor.
pub fn create(
    device: &mut dyn DeviceGraph,
    node: &Node,
    defaults: &NodeDefaults,
) -> Result<Box<dyn RuntimeInstance>, EngineError> {
    let spec = decode_initial::<EnvelopeSpec>(node)?.sanitized();
    let unit = device.create_unit(&format!("envelope:{}", node.id))?;
    Ok(Box::new(Envelope {
        id: node.id.clone(),
        unit,
        resolution: defaults.curve_resolution,
        baked: spec.bake(defaults.curve_resolution),
        spec,
        gates: BTreeMap::new(),
        last: None,
    }))
}

/// What opened a gate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum GateKey {
    /// A note received on `midi_in`.
    Note {
        /// MIDI channel.
        channel: u8,
        /// Note number.
        note: u8,
    },
    /// A voice received on `gate_in`.
    Voice(usize),
}

/// When a gate opened and closed, in host milliseconds.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GateTiming {
    /// Gate-on time.
    pub on_ms: f64,
    /// Gate-off time, once closed.
    pub off_ms: Option<f64>,
    /// Note behind the gate, when known.
    pub note: Option<u8>,
}

impl GateTiming {
    fn elapsed(&self, time_ms: f64) -> (f64, Option<f64>) {
        (time_ms - self.on_ms, self.off_ms.map(|off| off - self.on_ms))
    }
}

/// Live envelope.
#[derive(Debug)]
pub struct Envelope {
    id: NodeId,
    unit: UnitId,
    spec: EnvelopeSpec,
    resolution: usize,
    baked: BakedEnvelope,
    gates: BTreeMap<GateKey, GateTiming>,
    last: Option<GateKey>,
}

impl Envelope {
    /// Current parameters.
    pub fn spec(&self) -> &EnvelopeSpec {
        &self.spec
    }

    /// Curves handed to the backend.
    pub fn baked(&self) -> &BakedEnvelope {
        &self.baked
    }

    /// Timing of a gate, open or closed.
    pub fn gate(&self, key: GateKey) -> Option<&GateTiming> {
        self.gates.get(&key)
    }

    /// Most recently opened gate.
    pub fn last_gate(&self) -> Option<GateKey> {
        self.last
    }

    /// Level of the most recent gate at `time_ms`, or 0 when none opened.
    pub fn level_at(&self, time_ms: f64) -> f64 {
        self.last
            .map_or(0.0, |key| self.level_for(key, time_ms))
    }

    /// Level driven by `voice` at `time_ms`.
    pub fn level_for_voice(&self, voice: usize, time_ms: f64) -> f64 {
        self.level_for(GateKey::Voice(voice), time_ms)
    }

    /// Phase and progress of the most recent gate at `time_ms`.
    pub fn phase_at(&self, time_ms: f64) -> (EnvelopePhase, f64) {
        match self.last.and_then(|key| self.gates.get(&key)) {
            Some(timing) => {
                let (elapsed, off) = timing.elapsed(time_ms);
                self.spec.phase_at(elapsed, off)
            }
            None => (EnvelopePhase::Idle, 0.0),
        }
    }

    fn level_for(&self, key: GateKey, time_ms: f64) -> f64 {
        self.gates.get(&key).map_or(0.0, |timing| {
            let (elapsed, off) = timing.elapsed(time_ms);
            if elapsed < 0.0 {
                0.0
            } else {
                self.spec.level_at(elapsed, off)
            }
        })
    }

    fn open(&mut self, key: GateKey, timing: GateTiming) {
        tracing::trace!(node = %self.id, ?key, on_ms = timing.on_ms, "gate on");
        self.gates.insert(key, timing);
        self.last = Some(key);
    }

    fn close(&mut self, key: GateKey, time_ms: f64) {
        if let Some(timing) = self.gates.get_mut(&key)
            && timing.off_ms.is_none()
        {
            timing.off_ms = Some(time_ms);
        }
    }

    fn close_channel(&mut self, channel: u8, time_ms: f64) {
        for (key, timing) in &mut self.gates {
            if matches!(key, GateKey::Note { channel: ch, .. } if *ch == channel)
                && timing.off_ms.is_none()
            {
                timing.off_ms = Some(time_ms);
            }
        }
    }

    fn handle_voice(&mut self, voice: &VoiceEvent, ctx: &EventContext<'_>) {
        let key = GateKey::Voice(voice.voice);
        let time_ms = ctx.time_ms;
        match voice.kind {
            VoiceEventKind::GateOff => self.close(key, time_ms),
            kind => {
                let note = ctx.find_allocator(ctx.port).and_then(|found| {
                    let owner_voice = found.mapping.apply(voice.voice)?;
                    found.allocator.voice(owner_voice)?.note
                });
                let off_ms = (kind == VoiceEventKind::Trigger)
                    .then(|| time_ms + self.spec.attack_ms + self.spec.decay_ms);
                self.open(
                    key,
                    GateTiming {
                        on_ms: time_ms,
                        off_ms,
                        note,
                    },
                );
            }
        }
    }
}

impl RuntimeInstance for Envelope {
    fn update_state(&mut self, state: &NodeState) -> Result<(), HandlerError> {
        let spec = decode::<EnvelopeSpec>(&self.id, state)?.sanitized();
        if spec != self.spec {
            self.spec = spec;
            self.baked = spec.bake(self.resolution);
        }
        Ok(())
    }

    fn audio_outputs(&self, port: &PortId) -> Vec<Endpoint> {
        if port.as_str() == AUDIO_OUT {
            vec![Endpoint::new(self.unit, 0)]
        } else {
            Vec::new()
        }
    }

    fn handle_event(
        &mut self,
        event: &RoutedEvent,
        ctx: &EventContext<'_>,
    ) -> Result<HandlerOutcome, HandlerError> {
        match event {
            RoutedEvent::Voice(voice) => {
                self.handle_voice(voice, ctx);
                Ok(HandlerOutcome::consumed())
            }
            RoutedEvent::Midi(midi) => {
                let message = midi.message;
                let channel = message.channel();
                if message.is_all_notes_off() {
                    self.close_channel(channel, ctx.time_ms);
                    return Ok(HandlerOutcome::consumed());
                }
                let Some(note) = message.note() else {
                    return Ok(HandlerOutcome::pass());
                };
                let key = GateKey::Note { channel, note };
                if message.is_note_on() {
                    self.open(
                        key,
                        GateTiming {
                            on_ms: ctx.time_ms,
                            off_ms: None,
                            note: Some(note),
                        },
                    );
                } else {
                    self.close(key, ctx.time_ms);
                }
                Ok(HandlerOutcome::consumed())
            }
        }
    }

    fn on_remove(&mut self, device: &mut dyn DeviceGraph) {
        if let Err(e) = device.destroy_unit(self.unit) {
            tracing::warn!(node = %self.id, unit = %self.unit, error = %e, "failed to destroy envelope unit");
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
