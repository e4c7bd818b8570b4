//! Controller-to-state mapper.
//!
//! Listens on `cc_in` for one controller number and writes the latest value,
//! scaled to `[0, 1]`, into its own `value` state key. The write is a
//! routing patch, so a host applies it to the graph once the dispatch
//! finishes.

use std::any::Any;

use patchbay_core::{MidiMessage, Node, NodeId, NodeState, Port, PortKind, RoutedEvent, StatePatch};
use serde::Deserialize;

use super::{decode, decode_initial};
use crate::error::{EngineError, HandlerError};
use crate::instance::{DeviceGraph, EventContext, HandlerOutcome, RuntimeInstance};
use crate::registry::{NodeCategory, NodeDefaults, NodeDescriptor};

/// Controller input port.
pub const CC_IN: &str = "cc_in";

/// Registry descriptor.
pub fn descriptor() -> NodeDescriptor {
    NodeDescriptor {
        type_id: "cc_map",
        name: "CC Map",
        description: "Stores a MIDI controller value in node state",
        category: NodeCategory::Event,
        ports,
    }
}

fn ports(_state: &NodeState) -> Vec<Port> {
    vec![Port::input(CC_IN, PortKind::Cc).named("CC In")]
}

/// Registry constructor.
pub fn create(
    _device: &mut dyn DeviceGraph,
    node: &Node,
    _defaults: &NodeDefaults,
) -> Result<Box<dyn RuntimeInstance>, EngineError> {
    let settings: CcMapState = decode_initial(node)?;
    Ok(Box::new(CcMap {
        id: node.id.clone(),
        controller: settings.controller,
    }))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CcMapState {
    /// Listens to every controller when unset.
    controller: Option<u8>,
}

/// Live controller mapper.
#[derive(Debug)]
pub struct CcMap {
    id: NodeId,
    controller: Option<u8>,
}

impl CcMap {
    /// Controller number listened to.
    pub fn controller(&self) -> Option<u8> {
        self.controller
    }
}

impl RuntimeInstance for CcMap {
    fn update_state(&mut self, state: &NodeState) -> Result<(), HandlerError> {
        let settings: CcMapState = decode(&self.id, state)?;
        self.controller = settings.controller;
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
        match midi.message {
            MidiMessage::ControlChange {
                controller, value, ..
            } if self.controller.is_none_or(|c| c == controller) => {
                tracing::trace!(node = %self.id, controller, value, "controller mapped");
                Ok(HandlerOutcome::consumed()
                    .with_patch(StatePatch::new().with("value", f64::from(value) / 127.0)))
            }
            _ => Ok(HandlerOutcome::pass()),
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
