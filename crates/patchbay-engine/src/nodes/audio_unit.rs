//! Generic continuous signal node.
//!
//! Stands in for oscillators, filters, mixers and outputs: one processing
//! unit with `channels` signal channels on `in` and `out`, a single control
//! channel on `cv_in`, and an optional `sidechain_in` with its own channels.
//!
//! Input channels on the unit are laid out as `in`, then `cv_in`, then
//! `sidechain_in`. Output channels are `out` only.

use std::any::Any;

use patchbay_core::{Node, NodeId, NodeState, Port, PortId, PortKind};
use serde::Deserialize;

use super::{decode, decode_initial};
use crate::error::{EngineError, HandlerError};
use crate::instance::{ConnectedPorts, DeviceGraph, Endpoint, RuntimeInstance, UnitId};
use crate::registry::{NodeCategory, NodeDefaults, NodeDescriptor};

/// Signal input port.
pub const IN: &str = "in";
/// Signal output port.
pub const OUT: &str = "out";
/// Control input port.
pub const CV_IN: &str = "cv_in";
/// Sidechain input port, present when state sets `sidechain`.
pub const SIDECHAIN_IN: &str = "sidechain_in";

/// Largest channel count a unit accepts; state above it is clamped.
pub const MAX_CHANNELS: usize = 64;

/// Registry descriptor.
pub fn descriptor() -> NodeDescriptor {
    NodeDescriptor {
        type_id: "audio_unit",
        name: "Audio Unit",
        description: "Generic signal processor with a state-dependent channel count",
        category: NodeCategory::Signal,
        ports,
    }
}

fn ports(state: &NodeState) -> Vec<Port> {
    let mut ports = vec![
        Port::input(IN, PortKind::Audio).named("In"),
        Port::input(CV_IN, PortKind::Cv).named("CV"),
        Port::output(OUT, PortKind::Audio).named("Out"),
    ];
    if state.bool("sidechain").unwrap_or(false) {
        ports.push(Port::input(SIDECHAIN_IN, PortKind::Audio).named("Sidechain"));
    }
    ports
}

/// Registry constructor.
pub fn create(
    device: &mut dyn DeviceGraph,
    node: &Node,
    _defaults: &NodeDefaults,
) -> Result<Box<dyn RuntimeInstance>, EngineError> {
    let settings: AudioUnitState = decode_initial(node)?;
    let unit = device.create_unit(&format!("audio_unit:{}", node.id))?;
    Ok(Box::new(AudioUnit {
        id: node.id.clone(),
        unit,
        channels: settings.channel_count(),
        sidechain: settings.sidechain,
        connected: ConnectedPorts::default(),
    }))
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct AudioUnitState {
    channels: usize,
    sidechain: bool,
}

impl Default for AudioUnitState {
    fn default() -> Self {
        Self {
            channels: 1,
            sidechain: false,
        }
    }
}

impl AudioUnitState {
    fn channel_count(&self) -> usize {
        self.channels.clamp(1, MAX_CHANNELS)
    }
}

/// Live signal node.
#[derive(Debug)]
pub struct AudioUnit {
    id: NodeId,
    unit: UnitId,
    channels: usize,
    sidechain: bool,
    connected: ConnectedPorts,
}

impl AudioUnit {
    /// Backend unit.
    pub fn unit(&self) -> UnitId {
        self.unit
    }

    /// Channels on `in` and `out`.
    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Ports with live wires, as last reported.
    pub fn connected_ports(&self) -> &ConnectedPorts {
        &self.connected
    }

    fn span(&self, first: usize, count: usize) -> Vec<Endpoint> {
        (first..first.saturating_add(count))
            .map(|channel| Endpoint::new(self.unit, channel))
            .collect()
    }
}

impl RuntimeInstance for AudioUnit {
    fn update_state(&mut self, state: &NodeState) -> Result<(), HandlerError> {
        let settings: AudioUnitState = decode(&self.id, state)?;
        let channels = settings.channel_count();
        if channels != self.channels {
            tracing::debug!(node = %self.id, from = self.channels, to = channels, "channel count changed");
        }
        self.channels = channels;
        self.sidechain = settings.sidechain;
        Ok(())
    }

    fn audio_inputs(&self, port: &PortId) -> Vec<Endpoint> {
        match port.as_str() {
            IN => self.span(0, self.channels),
            CV_IN => self.span(self.channels, 1),
            SIDECHAIN_IN if self.sidechain => {
                self.span(self.channels.saturating_add(1), self.channels)
            }
            _ => Vec::new(),
        }
    }

    fn audio_outputs(&self, port: &PortId) -> Vec<Endpoint> {
        if port.as_str() == OUT {
            self.span(0, self.channels)
        } else {
            Vec::new()
        }
    }

    fn on_connections_changed(&mut self, ports: &ConnectedPorts) {
        tracing::trace!(
            node = %self.id,
            inputs = ports.inputs.len(),
            outputs = ports.outputs.len(),
            "connections changed"
        );
        self.connected = ports.clone();
    }

    fn on_remove(&mut self, device: &mut dyn DeviceGraph) {
        if let Err(e) = device.destroy_unit(self.unit) {
            tracing::warn!(node = %self.id, unit = %self.unit, error = %e, "failed to destroy unit");
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
