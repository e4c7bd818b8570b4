//! Collaborator contracts between the engine and live node instances.
//!
//! The engine never touches signal processing itself. It talks to two kinds
//! of collaborator:
//!
//! - a [`DeviceGraph`], the opaque backend that owns processing units and the
//!   wires between their channels, and
//! - one [`RuntimeInstance`] per graph node, created by an
//!   [`InstanceFactory`] and kept in an [`InstanceMap`].
//!
//! Every optional capability of an instance (signal endpoints, event
//! handling, voice pools) has a default implementation, so a node type only
//! implements what it actually does.

use std::any::Any;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use patchbay_core::{
    GraphState, Node, NodeId, NodeState, PortId, RoutedEvent, StatePatch, VoiceAllocator,
    VoiceMapping,
};

use crate::discovery::{AllocatorMatch, find_allocator};
use crate::error::{DeviceError, EngineError, HandlerError};

/// Handle to a processing unit owned by a [`DeviceGraph`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct UnitId(pub u64);

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unit#{}", self.0)
    }
}

/// One channel of a processing unit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Endpoint {
    /// Owning unit.
    pub unit: UnitId,
    /// Channel index on that unit.
    pub channel: usize,
}

impl Endpoint {
    /// Creates an endpoint.
    pub fn new(unit: UnitId, channel: usize) -> Self {
        Self { unit, channel }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.unit, self.channel)
    }
}

/// The opaque signal backend.
///
/// Implementations own the actual processing units. The engine only creates
/// and destroys units on behalf of node instances and wires their channels.
pub trait DeviceGraph {
    /// Creates a processing unit.
    fn create_unit(&mut self, label: &str) -> Result<UnitId, DeviceError>;

    /// Destroys a processing unit and any wires touching it.
    fn destroy_unit(&mut self, unit: UnitId) -> Result<(), DeviceError>;

    /// Wires an output channel to an input channel. Several outputs wired to
    /// one input are summed.
    fn connect(&mut self, output: Endpoint, input: Endpoint) -> Result<(), DeviceError>;

    /// Removes a wire.
    fn disconnect(&mut self, output: Endpoint, input: Endpoint) -> Result<(), DeviceError>;

    /// Makes sure the backend is running before events are delivered.
    fn ensure_running(&mut self) -> Result<(), DeviceError> {
        Ok(())
    }
}

/// Port ids of a node that currently carry live signal wires.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ConnectedPorts {
    /// Connected input ports.
    pub inputs: BTreeSet<PortId>,
    /// Connected output ports.
    pub outputs: BTreeSet<PortId>,
}

impl ConnectedPorts {
    /// Returns `true` if nothing is connected.
    pub fn is_empty(&self) -> bool {
        self.inputs.is_empty() && self.outputs.is_empty()
    }
}

/// A new event produced by a handler.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Emission {
    /// The event, with its own fresh timestamp.
    pub event: RoutedEvent,
    /// Output port to send it from; `None` means every output whose edges
    /// accept the event.
    pub port: Option<PortId>,
}

/// What a handler did with an event.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct HandlerOutcome {
    /// Stop the original event at this node.
    pub consumed: bool,
    /// New events to send downstream.
    pub emit: Vec<Emission>,
    /// Routing-only state change for this node, applied after the traversal.
    pub patch: Option<StatePatch>,
}

impl HandlerOutcome {
    /// Lets the original event continue downstream.
    pub fn pass() -> Self {
        Self::default()
    }

    /// Stops the original event here.
    pub fn consumed() -> Self {
        Self {
            consumed: true,
            ..Self::default()
        }
    }

    /// Adds an event sent from every matching output.
    pub fn with_emit(mut self, event: impl Into<RoutedEvent>) -> Self {
        self.emit.push(Emission {
            event: event.into(),
            port: None,
        });
        self
    }

    /// Adds an event sent from one output port.
    pub fn with_emit_on(mut self, port: impl Into<PortId>, event: impl Into<RoutedEvent>) -> Self {
        self.emit.push(Emission {
            event: event.into(),
            port: Some(port.into()),
        });
        self
    }

    /// Attaches a routing-only state patch.
    pub fn with_patch(mut self, patch: StatePatch) -> Self {
        self.patch = Some(patch);
        self
    }
}

/// Everything a handler may look at while handling one event.
///
/// `state` is the node's stored state with any ephemeral overrides merged
/// over it. `instances` holds every other node's instance; the handling
/// node's own instance is the `&mut self` of the call.
pub struct EventContext<'a> {
    /// Node receiving the event.
    pub node: &'a NodeId,
    /// Input port the event arrived on.
    pub port: &'a PortId,
    /// Effective state for this call.
    pub state: &'a NodeState,
    /// Graph snapshot being traversed.
    pub graph: &'a GraphState,
    /// Instances of the other nodes.
    pub instances: &'a InstanceMap,
    /// Dispatch time in milliseconds on the host's clock.
    pub time_ms: f64,
}

impl<'a> EventContext<'a> {
    /// Finds the voice pool feeding `input` on this node.
    pub fn find_allocator(&self, input: &PortId) -> Option<AllocatorMatch<'a>> {
        find_allocator(self.graph, self.instances, self.node, input)
    }
}

/// Live counterpart of a graph node.
pub trait RuntimeInstance: Send {
    /// Receives the node's full state after it changed.
    fn update_state(&mut self, state: &NodeState) -> Result<(), HandlerError>;

    /// Signal endpoints behind an input port.
    fn audio_inputs(&self, _port: &PortId) -> Vec<Endpoint> {
        Vec::new()
    }

    /// Signal endpoints behind an output port.
    fn audio_outputs(&self, _port: &PortId) -> Vec<Endpoint> {
        Vec::new()
    }

    /// Handles a routed or directly delivered event.
    fn handle_event(
        &mut self,
        _event: &RoutedEvent,
        _ctx: &EventContext<'_>,
    ) -> Result<HandlerOutcome, HandlerError> {
        Ok(HandlerOutcome::pass())
    }

    /// Called when the set of wired ports changed.
    fn on_connections_changed(&mut self, _ports: &ConnectedPorts) {}

    /// Voice pool owned by this node.
    fn voice_allocator(&self) -> Option<&VoiceAllocator> {
        None
    }

    /// How voice indices on `port` (an output) map to indices on the
    /// node's matching input. `None` means identity.
    fn voice_mapping_for_output(&self, _port: &PortId) -> Option<VoiceMapping> {
        None
    }

    /// Releases backend resources before the instance is dropped.
    fn on_remove(&mut self, _device: &mut dyn DeviceGraph) {}

    /// Concrete type access for hosts and tests.
    fn as_any(&self) -> &dyn Any;
}

/// Creates runtime instances for graph nodes.
pub trait InstanceFactory {
    /// Creates the instance for `node`. The caller pushes the initial state
    /// with [`RuntimeInstance::update_state`] afterwards.
    fn create(
        &self,
        device: &mut dyn DeviceGraph,
        node: &Node,
    ) -> Result<Box<dyn RuntimeInstance>, EngineError>;
}

/// Live instances keyed by node id.
#[derive(Default)]
pub struct InstanceMap {
    instances: BTreeMap<NodeId, Box<dyn RuntimeInstance>>,
}

impl fmt::Debug for InstanceMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.instances.keys()).finish()
    }
}

impl InstanceMap {
    /// Creates an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts an instance, returning the one it replaced.
    pub fn insert(
        &mut self,
        id: NodeId,
        instance: Box<dyn RuntimeInstance>,
    ) -> Option<Box<dyn RuntimeInstance>> {
        self.instances.insert(id, instance)
    }

    /// Removes an instance.
    pub fn remove(&mut self, id: &NodeId) -> Option<Box<dyn RuntimeInstance>> {
        self.instances.remove(id)
    }

    /// Returns an instance.
    pub fn get(&self, id: &NodeId) -> Option<&dyn RuntimeInstance> {
        self.instances.get(id).map(AsRef::as_ref)
    }

    /// Returns an instance mutably.
    pub fn get_mut(&mut self, id: &NodeId) -> Option<&mut (dyn RuntimeInstance + 'static)> {
        self.instances.get_mut(id).map(AsMut::as_mut)
    }

    /// Returns an instance as its concrete type.
    pub fn get_as<T: RuntimeInstance + 'static>(&self, id: &NodeId) -> Option<&T> {
        self.get(id)?.as_any().downcast_ref::<T>()
    }

    /// Returns `true` if `id` has an instance.
    pub fn contains(&self, id: &NodeId) -> bool {
        self.instances.contains_key(id)
    }

    /// Node ids with instances, in id order.
    pub fn ids(&self) -> impl Iterator<Item = &NodeId> {
        self.instances.keys()
    }

    /// Number of instances.
    pub fn len(&self) -> usize {
        self.instances.len()
    }

    /// Returns `true` if there are no instances.
    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use patchbay_core::MidiMessage;

    struct Plain(u32);

    impl RuntimeInstance for Plain {
        fn update_state(&mut self, state: &NodeState) -> Result<(), HandlerError> {
            self.0 = state.u64("n").unwrap_or(0) as u32;
            Ok(())
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    #[test]
    fn defaults_are_inert() {
        let plain = Plain(0);
        assert!(plain.audio_outputs(&PortId::from("out")).is_empty());
        assert!(plain.voice_allocator().is_none());
        assert!(plain.voice_mapping_for_output(&PortId::from("gate_out")).is_none());
    }

    #[test]
    fn downcast_through_map() {
        let mut map = InstanceMap::new();
        map.insert(NodeId::from("p"), Box::new(Plain(7)));
        assert_eq!(map.get_as::<Plain>(&NodeId::from("p")).map(|p| p.0), Some(7));
        map.get_mut(&NodeId::from("p"))
            .unwrap()
            .update_state(&NodeState::new().with("n", 3))
            .unwrap();
        assert_eq!(map.get_as::<Plain>(&NodeId::from("p")).map(|p| p.0), Some(3));
        assert!(map.remove(&NodeId::from("p")).is_some());
        assert!(map.is_empty());
    }

    #[test]
    fn outcome_builders() {
        let outcome = HandlerOutcome::consumed()
            .with_emit_on("midi_out", MidiMessage::note_on(0, 64, 90))
            .with_patch(StatePatch::new().with("value", 1));
        assert!(outcome.consumed);
        assert_eq!(outcome.emit.len(), 1);
        assert_eq!(outcome.emit[0].port, Some(PortId::from("midi_out")));
        assert!(outcome.patch.is_some());
    }
}
