//! Host-facing facade over the engine.
//!
//! [`PatchRuntime`] owns everything needed to keep a device backend in step
//! with an editor's graph: the node registry, the live instances, the
//! connection synchronizer, the event router and the MIDI queue. A host
//! calls [`apply`](PatchRuntime::apply) with every new graph snapshot and
//! routes events through [`dispatch`](PatchRuntime::dispatch).
//!
//! # Example
//!
//! ```rust
//! use patchbay_core::{Connection, GraphState, MidiMessage, Node, NodeState, PortKind, PortRef};
//! use patchbay_engine::{OfflineDeviceGraph, PatchRuntime};
//!
//! let graph = GraphState::new()
//!     .with_node(Node::new("keys", "midi_source", NodeState::new()))?
//!     .with_node(Node::new("env", "envelope", NodeState::new()))?
//!     .with_connection(Connection::new(
//!         PortKind::Midi,
//!         PortRef::new("keys", "midi_out"),
//!         PortRef::new("env", "midi_in"),
//!     ));
//!
//! let mut runtime = PatchRuntime::new(OfflineDeviceGraph::new());
//! runtime.apply(&graph);
//!
//! let (_, report) = runtime.dispatch(
//!     &PortRef::new("keys", "midi_out"),
//!     MidiMessage::note_on(0, 60, 100),
//!     0.0,
//! );
//! assert_eq!(report.deliveries.len(), 1);
//! # Ok::<(), patchbay_core::GraphError>(())
//! ```

use std::collections::BTreeMap;

use patchbay_core::{
    DroppedConnection, GraphState, MidiEvent, MidiMessage, NodeId, NodeState, PortId, PortRef,
    RoutedEvent, StatePatch,
};

use crate::error::{DeviceError, EngineError};
use crate::instance::{DeviceGraph, InstanceFactory, InstanceMap, RuntimeInstance};
use crate::queue::{MidiDispatchQueue, QueueTarget, QueuedMidi};
use crate::registry::NodeRegistry;
use crate::router::{DispatchReport, EventRouter};
use crate::sync::{ConnectionSynchronizer, SyncReport};

/// What one [`PatchRuntime::apply`] call changed.
#[derive(Debug, Default)]
pub struct ApplyReport {
    /// Nodes that got a new instance.
    pub created: Vec<NodeId>,
    /// Nodes whose instance received a new state.
    pub updated: Vec<NodeId>,
    /// Nodes whose instance could not be created or updated.
    pub failures: Vec<(NodeId, EngineError)>,
    /// Device-side changes.
    pub sync: SyncReport,
}

/// Runs a graph against a device backend.
pub struct PatchRuntime<D: DeviceGraph> {
    registry: NodeRegistry,
    device: D,
    instances: InstanceMap,
    synchronizer: ConnectionSynchronizer,
    router: EventRouter,
    queue: MidiDispatchQueue,
    graph: GraphState,
    /// Type tag and state last pushed to each instance.
    pushed: BTreeMap<NodeId, (String, NodeState)>,
}

impl<D: DeviceGraph> PatchRuntime<D> {
    /// Creates a runtime with the built-in node types.
    pub fn new(device: D) -> Self {
        Self::with_registry(NodeRegistry::new(), device)
    }

    /// Creates a runtime with a custom registry.
    pub fn with_registry(registry: NodeRegistry, device: D) -> Self {
        Self {
            registry,
            device,
            instances: InstanceMap::new(),
            synchronizer: ConnectionSynchronizer::new(),
            router: EventRouter::new(),
            queue: MidiDispatchQueue::new(),
            graph: GraphState::new(),
            pushed: BTreeMap::new(),
        }
    }

    /// Replaces the router, keeping nothing of the old one.
    pub fn with_router(mut self, router: EventRouter) -> Self {
        self.router = router;
        self
    }

    /// The node registry.
    pub fn registry(&self) -> &NodeRegistry {
        &self.registry
    }

    /// The device backend.
    pub fn device(&self) -> &D {
        &self.device
    }

    /// The device backend, mutably.
    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    /// Live instances.
    pub fn instances(&self) -> &InstanceMap {
        &self.instances
    }

    /// A live instance as its concrete type.
    pub fn instance_as<T: RuntimeInstance + 'static>(&self, id: &NodeId) -> Option<&T> {
        self.instances.get_as(id)
    }

    /// The connection synchronizer.
    pub fn synchronizer(&self) -> &ConnectionSynchronizer {
        &self.synchronizer
    }

    /// Last applied graph.
    pub fn graph(&self) -> &GraphState {
        &self.graph
    }

    /// Drops connections the registry's ports do not allow.
    pub fn normalize(&self, graph: &GraphState) -> (GraphState, Vec<DroppedConnection>) {
        graph.normalized(&self.registry)
    }

    /// Brings instances and device wiring in line with `graph`.
    ///
    /// New nodes get an instance followed by their initial state; nodes whose
    /// state changed get the new state. A node whose type tag changed is torn
    /// down and recreated. Creation and update failures are logged and
    /// reported; the node simply has no (or stale) instance until a later
    /// snapshot fixes it.
    pub fn apply(&mut self, graph: &GraphState) -> ApplyReport {
        let mut report = ApplyReport::default();

        let retyped: Vec<NodeId> = graph
            .nodes
            .iter()
            .filter(|node| {
                self.pushed
                    .get(&node.id)
                    .is_some_and(|(type_id, _)| *type_id != node.node_type)
            })
            .map(|node| node.id.clone())
            .collect();
        if !retyped.is_empty() {
            let mut interim = graph
                .clone()
                .without_connections(|c| retyped.iter().any(|id| c.touches(id)));
            interim.nodes.retain(|n| !retyped.contains(&n.id));
            self.synchronizer
                .synchronize(&interim, &mut self.instances, &mut self.device);
            for id in &retyped {
                tracing::debug!(node = %id, "node type changed, recreating");
                self.pushed.remove(id);
            }
        }

        for node in &graph.nodes {
            let pushed = self.pushed.get(&node.id);
            if pushed.is_some_and(|(_, state)| *state == node.state) {
                continue;
            }

            if let Some(instance) = self.instances.get_mut(&node.id) {
                match instance.update_state(&node.state) {
                    Ok(()) => report.updated.push(node.id.clone()),
                    Err(e) => {
                        tracing::warn!(node = %node.id, error = %e, "state update rejected");
                        report
                            .failures
                            .push((node.id.clone(), EngineError::update_state(&node.id, e)));
                    }
                }
                self.pushed
                    .insert(node.id.clone(), (node.node_type.clone(), node.state.clone()));
                continue;
            }

            match self.registry.create(&mut self.device, node) {
                Ok(mut instance) => {
                    if let Err(e) = instance.update_state(&node.state) {
                        tracing::warn!(node = %node.id, error = %e, "initial state rejected");
                    }
                    tracing::debug!(node = %node.id, node_type = %node.node_type, "instance created");
                    self.instances.insert(node.id.clone(), instance);
                    self.pushed
                        .insert(node.id.clone(), (node.node_type.clone(), node.state.clone()));
                    report.created.push(node.id.clone());
                }
                Err(e) => {
                    tracing::warn!(node = %node.id, error = %e, "failed to create instance");
                    report.failures.push((node.id.clone(), e));
                }
            }
        }

        report.sync = self
            .synchronizer
            .synchronize(graph, &mut self.instances, &mut self.device);
        self.pushed.retain(|id, _| graph.node(id).is_some());
        self.graph = graph.clone();
        report
    }

    /// Routes `event` out of `from` through the last applied graph.
    ///
    /// Routing patches are applied to the graph, and the patched snapshot is
    /// applied back to the runtime before it is returned.
    pub fn dispatch(
        &mut self,
        from: &PortRef,
        event: impl Into<RoutedEvent>,
        time_ms: f64,
    ) -> (GraphState, DispatchReport) {
        let report = self.router.dispatch(
            &self.graph,
            &mut self.instances,
            from,
            event.into(),
            time_ms,
        );
        (self.commit_patches(&report), report)
    }

    /// Delivers `event` to one node without routing, as a control surface
    /// would.
    pub fn dispatch_direct(
        &mut self,
        node: &NodeId,
        port: &PortId,
        event: impl Into<RoutedEvent>,
        time_ms: f64,
    ) -> (GraphState, DispatchReport) {
        let report = self.router.dispatch_direct(
            &self.graph,
            &mut self.instances,
            node,
            port,
            event.into(),
            time_ms,
        );
        (self.commit_patches(&report), report)
    }

    fn commit_patches(&mut self, report: &DispatchReport) -> GraphState {
        if report.patches.is_empty() {
            return self.graph.clone();
        }
        let next = report.apply_to(&self.graph);
        self.apply(&next);
        next
    }

    /// Sets an ephemeral state override seen by `node`'s handler.
    pub fn set_override(&mut self, node: NodeId, patch: StatePatch) {
        self.router.set_override(node, patch);
    }

    /// Removes `node`'s override.
    pub fn clear_override(&mut self, node: &NodeId) -> Option<StatePatch> {
        self.router.clear_override(node)
    }

    /// Queues a MIDI message for the next [`drain_midi`](Self::drain_midi).
    pub fn enqueue_midi(&mut self, target: QueueTarget, message: MidiMessage, time_ms: f64) {
        self.queue.push(QueuedMidi {
            target,
            event: MidiEvent::new(message),
            time_ms,
        });
    }

    /// Drops queued MIDI that has not been delivered.
    pub fn cancel_midi(&mut self) -> usize {
        self.queue.clear()
    }

    /// Number of queued MIDI messages.
    pub fn queued_midi(&self) -> usize {
        self.queue.len()
    }

    /// Delivers every queued message in order, starting the backend first.
    ///
    /// If the backend cannot start, nothing is delivered and the queue is
    /// kept.
    pub fn drain_midi(&mut self) -> Result<Vec<DispatchReport>, DeviceError> {
        let device = &mut self.device;
        let mut items = Vec::new();
        self.queue
            .drain(|| device.ensure_running(), |item| items.push(item))?;

        let mut reports = Vec::with_capacity(items.len());
        for item in items {
            let (_, report) = match &item.target {
                QueueTarget::Routed { node, port } => self.dispatch(
                    &PortRef::new(node.clone(), port.clone()),
                    item.event,
                    item.time_ms,
                ),
                QueueTarget::Direct { node, port } => {
                    self.dispatch_direct(node, port, item.event, item.time_ms)
                }
            };
            reports.push(report);
        }
        Ok(reports)
    }
}
