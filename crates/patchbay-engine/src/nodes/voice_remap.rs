//! Voice renumbering pass-through.
//!
//! Forwards gate events from `gate_in` to `gate_out` under a state-declared
//! mapping. It owns no voices; consumers downstream find the real pool with
//! allocator discovery, which composes this node's mapping on the way up.
//!
//! State keys, composed in this order when several are present:
//!
//! - `table`: output voice `i` is driven by input voice `table[i]`
//! - `offset`: output voice is input voice plus `offset`
//! - `modulo`: input voices `0..modulo` pass through unchanged; higher ones
//!   are dropped

use std::any::Any;

use patchbay_core::{
    Node, NodeId, NodeState, Port, PortId, PortKind, RoutedEvent, VoiceEvent, VoiceMap,
    VoiceMapping,
};
use serde::Deserialize;

use super::{decode, decode_initial};
use crate::error::{EngineError, HandlerError};
use crate::instance::{DeviceGraph, EventContext, HandlerOutcome, RuntimeInstance};
use crate::registry::{NodeCategory, NodeDefaults, NodeDescriptor};

/// Gate input port.
pub const GATE_IN: &str = "gate_in";
/// Gate output port.
pub const GATE_OUT: &str = "gate_out";

/// Registry descriptor.
pub fn descriptor() -> NodeDescriptor {
    NodeDescriptor {
        type_id: "voice_remap",
        name: "Voice Remap",
        description: "Renumbers voices between a pool and its consumers",
        category: NodeCategory::Voice,
        ports,
    }
}

fn ports(_state: &NodeState) -> Vec<Port> {
    vec![
        Port::input(GATE_IN, PortKind::Gate).named("Gate In"),
        Port::output(GATE_OUT, PortKind::Gate).named("Gate Out"),
    ]
}

/// Registry constructor.
pub fn create(
    _device: &mut dyn DeviceGraph,
    node: &Node,
    _defaults: &NodeDefaults,
) -> Result<Box<dyn RuntimeInstance>, EngineError> {
    let settings: RemapState = decode_initial(node)?;
    Ok(Box::new(VoiceRemap {
        id: node.id.clone(),
        mapping: settings.mapping(),
    }))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RemapState {
    table: Option<Vec<usize>>,
    offset: i64,
    modulo: Option<usize>,
}

impl RemapState {
    /// Output-to-input mapping.
    fn mapping(&self) -> VoiceMapping {
        let mut mapping = VoiceMapping::identity();
        if let Some(table) = &self.table {
            mapping = mapping.then(VoiceMap::Table(table.clone()).into());
        }
        if self.offset != 0 {
            mapping = mapping.then(VoiceMap::Offset(self.offset.saturating_neg()).into());
        }
        if let Some(n) = self.modulo {
            mapping = mapping.then(VoiceMap::Modulo(n).into());
        }
        mapping
    }
}

/// Live remapper.
#[derive(Debug)]
pub struct VoiceRemap {
    id: NodeId,
    mapping: VoiceMapping,
}

impl VoiceRemap {
    /// Output-to-input voice mapping.
    pub fn mapping(&self) -> &VoiceMapping {
        &self.mapping
    }
}

impl RuntimeInstance for VoiceRemap {
    fn update_state(&mut self, state: &NodeState) -> Result<(), HandlerError> {
        let settings: RemapState = decode(&self.id, state)?;
        self.mapping = settings.mapping();
        Ok(())
    }

    fn handle_event(
        &mut self,
        event: &RoutedEvent,
        _ctx: &EventContext<'_>,
    ) -> Result<HandlerOutcome, HandlerError> {
        let RoutedEvent::Voice(voice) = event else {
            return Ok(HandlerOutcome::pass());
        };
        let outcome = match self.mapping.unapply(voice.voice) {
            Some(out) => HandlerOutcome::consumed()
                .with_emit_on(GATE_OUT, VoiceEvent::new(out, voice.kind)),
            None => {
                tracing::trace!(node = %self.id, voice = voice.voice, "voice has no output");
                HandlerOutcome::consumed()
            }
        };
        Ok(outcome)
    }

    fn voice_mapping_for_output(&self, port: &PortId) -> Option<VoiceMapping> {
        (port.as_str() == GATE_OUT).then(|| self.mapping.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
