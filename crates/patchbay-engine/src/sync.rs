//! Connection synchronizer.
//!
//! Reconciles the continuous-signal connections of a [`GraphState`] against
//! the wires actually present in a [`DeviceGraph`]. Each call computes the
//! desired set, disconnects live wires that are no longer wanted, connects
//! the new ones, tells instances whose connected-port sets changed, and only
//! then tears down instances of nodes that left the graph.
//!
//! Connections whose endpoints have no instance yet, or no endpoints behind
//! the port, are reported as pending and picked up by a later call. Calling
//! [`ConnectionSynchronizer::synchronize`] twice with the same graph issues no
//! device operations the second time.

use std::collections::{BTreeMap, HashSet};

use patchbay_core::{ConnectionKey, GraphState, NodeId, PortKind};

use crate::instance::{ConnectedPorts, DeviceGraph, Endpoint, InstanceMap};

/// A connection that is currently wired.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LiveConnection {
    /// Signal kind of the connection.
    pub kind: PortKind,
    /// Channel pairs actually wired for it.
    pub wires: Vec<(Endpoint, Endpoint)>,
}

/// What one reconciliation did.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Connections wired by this call.
    pub connected: Vec<ConnectionKey>,
    /// Connections unwired by this call.
    pub disconnected: Vec<ConnectionKey>,
    /// Desired connections that could not be wired yet.
    pub pending: Vec<ConnectionKey>,
    /// Nodes told that their connected ports changed.
    pub notified: Vec<NodeId>,
    /// Nodes whose instances were torn down.
    pub removed: Vec<NodeId>,
    /// Device calls that failed.
    pub device_errors: usize,
}

impl SyncReport {
    /// Returns `true` if the call changed nothing.
    pub fn is_noop(&self) -> bool {
        self.connected.is_empty()
            && self.disconnected.is_empty()
            && self.notified.is_empty()
            && self.removed.is_empty()
    }
}

/// Pairs output channels with input channels.
///
/// One output fans out to every input; many outputs into one input are
/// summed there; otherwise channels pair index for index and the excess on
/// the longer side stays unconnected.
pub fn pair_channels(outputs: &[Endpoint], inputs: &[Endpoint]) -> Vec<(Endpoint, Endpoint)> {
    match (outputs, inputs) {
        ([], _) | (_, []) => Vec::new(),
        ([out], _) => inputs.iter().map(|&inp| (*out, inp)).collect(),
        (_, [inp]) => outputs.iter().map(|&out| (out, *inp)).collect(),
        _ => outputs.iter().copied().zip(inputs.iter().copied()).collect(),
    }
}

/// Incremental reconciler between a graph and a device graph.
#[derive(Debug, Default)]
pub struct ConnectionSynchronizer {
    live: BTreeMap<ConnectionKey, LiveConnection>,
    ports: BTreeMap<NodeId, ConnectedPorts>,
}

impl ConnectionSynchronizer {
    /// Creates a synchronizer with nothing live.
    pub fn new() -> Self {
        Self::default()
    }

    /// Live connections, in key order.
    pub fn live(&self) -> impl Iterator<Item = (&ConnectionKey, &LiveConnection)> {
        self.live.iter()
    }

    /// Returns `true` if `key` is wired.
    pub fn is_live(&self, key: &ConnectionKey) -> bool {
        self.live.contains_key(key)
    }

    /// Number of live connections.
    pub fn live_count(&self) -> usize {
        self.live.len()
    }

    /// Ports of `node` carrying live wires after the last call.
    pub fn connected_ports(&self, node: &NodeId) -> Option<&ConnectedPorts> {
        self.ports.get(node)
    }

    /// Reconciles `device` with the continuous connections of `graph`.
    pub fn synchronize(
        &mut self,
        graph: &GraphState,
        instances: &mut InstanceMap,
        device: &mut dyn DeviceGraph,
    ) -> SyncReport {
        let mut report = SyncReport::default();
        let node_ids: HashSet<&NodeId> = graph.nodes.iter().map(|n| &n.id).collect();

        let mut desired: BTreeMap<ConnectionKey, PortKind> = BTreeMap::new();
        for conn in &graph.connections {
            if conn.kind.is_continuous()
                && node_ids.contains(&conn.from.node_id)
                && node_ids.contains(&conn.to.node_id)
            {
                desired.entry(conn.key()).or_insert(conn.kind);
            }
        }

        let stale: Vec<ConnectionKey> = self
            .live
            .keys()
            .filter(|key| !desired.contains_key(*key))
            .cloned()
            .collect();
        for key in stale {
            if let Some(live) = self.live.remove(&key) {
                report.device_errors += unwire(&key, &live.wires, device);
                report.disconnected.push(key);
            }
        }

        for (key, &kind) in &desired {
            let Some(wires) = resolve(key, instances) else {
                if !self.live.contains_key(key) {
                    tracing::debug!(connection = %key, "endpoints not ready");
                    report.pending.push(key.clone());
                }
                continue;
            };

            match self.live.get(key) {
                Some(live) if live.wires == wires => continue,
                Some(_) => {
                    // Channel layout changed behind an existing connection.
                    if let Some(old) = self.live.remove(key) {
                        report.device_errors += unwire(key, &old.wires, device);
                        report.disconnected.push(key.clone());
                    }
                }
                None => {}
            }

            match wire(key, &wires, device) {
                Ok(()) => {
                    self.live.insert(key.clone(), LiveConnection { kind, wires });
                    report.connected.push(key.clone());
                }
                Err(errors) => {
                    report.device_errors += errors;
                    report.pending.push(key.clone());
                }
            }
        }

        let mut next: BTreeMap<NodeId, ConnectedPorts> = BTreeMap::new();
        for key in self.live.keys() {
            next.entry(key.from.node_id.clone())
                .or_default()
                .outputs
                .insert(key.from.port_id.clone());
            next.entry(key.to.node_id.clone())
                .or_default()
                .inputs
                .insert(key.to.port_id.clone());
        }

        let empty = ConnectedPorts::default();
        for node in &graph.nodes {
            let before = self.ports.get(&node.id).unwrap_or(&empty);
            let after = next.get(&node.id).unwrap_or(&empty);
            if before != after
                && let Some(instance) = instances.get_mut(&node.id)
            {
                instance.on_connections_changed(after);
                report.notified.push(node.id.clone());
            }
        }
        self.ports = next;

        let gone: Vec<NodeId> = instances
            .ids()
            .filter(|id| !node_ids.contains(id))
            .cloned()
            .collect();
        for id in gone {
            if let Some(mut instance) = instances.remove(&id) {
                instance.on_remove(device);
                tracing::debug!(node = %id, "instance removed");
                report.removed.push(id);
            }
        }

        report
    }
}

/// Resolves both ends of `key` to wire pairs. `None` while either side has
/// no instance or no endpoints.
fn resolve(key: &ConnectionKey, instances: &InstanceMap) -> Option<Vec<(Endpoint, Endpoint)>> {
    let outputs = instances.get(&key.from.node_id)?.audio_outputs(&key.from.port_id);
    let inputs = instances.get(&key.to.node_id)?.audio_inputs(&key.to.port_id);
    let wires = pair_channels(&outputs, &inputs);
    (!wires.is_empty()).then_some(wires)
}

/// Wires every pair, rolling back on the first failure. Returns the number
/// of failed device calls on error.
fn wire(
    key: &ConnectionKey,
    wires: &[(Endpoint, Endpoint)],
    device: &mut dyn DeviceGraph,
) -> Result<(), usize> {
    for (i, &(output, input)) in wires.iter().enumerate() {
        if let Err(err) = device.connect(output, input) {
            tracing::warn!(connection = %key, %output, %input, error = %err, "connect failed");
            let rollback_errors = unwire(key, &wires[..i], device);
            return Err(1 + rollback_errors);
        }
    }
    tracing::debug!(connection = %key, wires = wires.len(), "connected");
    Ok(())
}

/// Removes every pair, continuing past failures. Returns the failure count.
fn unwire(key: &ConnectionKey, wires: &[(Endpoint, Endpoint)], device: &mut dyn DeviceGraph) -> usize {
    let mut errors = 0;
    for &(output, input) in wires {
        if let Err(err) = device.disconnect(output, input) {
            tracing::warn!(connection = %key, %output, %input, error = %err, "disconnect failed");
            errors += 1;
        }
    }
    tracing::debug!(connection = %key, wires = wires.len(), "disconnected");
    errors
}
