//! Graph snapshots and normalize-on-read.
//!
//! [`GraphState`] is an immutable-by-convention snapshot: engine operations
//! take the snapshot they act on as an argument, and edits (including the
//! router's aggregated patches) produce a new snapshot instead of mutating a
//! shared one.

use std::collections::{HashMap, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use super::GraphError;
use super::connection::{Connection, PortRef};
use super::node::{Node, NodeId, NodeState, PatchSet};
use super::port::{Port, PortDirection, PortId, PortKind};

/// Derives a node's ports from its type and state.
///
/// Implemented by the node-type registry. Unknown node types return no ports,
/// which makes every connection touching them droppable on load.
pub trait PortCatalog {
    /// Ports of `node` given its current state.
    fn ports(&self, node: &Node) -> Vec<Port>;
}

/// Why a connection was dropped during normalization.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DropReason {
    /// An endpoint references a node that is not in the graph.
    MissingNode,
    /// An endpoint references a port its node does not have.
    MissingPort,
    /// `from` is not an output or `to` is not an input.
    WrongDirection,
    /// The connection kind differs from an endpoint port's kind.
    KindMismatch,
    /// Another connection already has the same kind and endpoints.
    Duplicate,
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            DropReason::MissingNode => "endpoint node does not exist",
            DropReason::MissingPort => "endpoint port does not exist",
            DropReason::WrongDirection => "endpoints are not output → input",
            DropReason::KindMismatch => "connection kind does not match port kind",
            DropReason::Duplicate => "duplicate connection",
        };
        f.write_str(text)
    }
}

/// A connection removed by [`GraphState::normalized`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DroppedConnection {
    /// The offending connection.
    pub connection: Connection,
    /// Why it was dropped.
    pub reason: DropReason,
}

/// Nodes plus typed connections.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphState {
    /// Nodes in declaration order.
    #[serde(default)]
    pub nodes: Vec<Node>,
    /// Connections in declaration order; routing ties follow this order.
    #[serde(default)]
    pub connections: Vec<Connection>,
}

impl GraphState {
    /// Creates an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a node, returning the updated graph.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::DuplicateNode`] if the id is already present.
    pub fn with_node(mut self, node: Node) -> Result<Self, GraphError> {
        if self.node(&node.id).is_some() {
            return Err(GraphError::DuplicateNode(node.id));
        }
        self.nodes.push(node);
        Ok(self)
    }

    /// Adds a connection, returning the updated graph.
    ///
    /// Endpoints are not validated here; see [`normalized`](Self::normalized).
    pub fn with_connection(mut self, connection: Connection) -> Self {
        self.connections.push(connection);
        self
    }

    /// Removes a node and every connection touching it.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::NodeNotFound`] if the node is absent.
    pub fn without_node(mut self, id: &NodeId) -> Result<Self, GraphError> {
        let before = self.nodes.len();
        self.nodes.retain(|n| &n.id != id);
        if self.nodes.len() == before {
            return Err(GraphError::NodeNotFound(id.clone()));
        }
        self.connections.retain(|c| !c.touches(id));
        Ok(self)
    }

    /// Removes every connection matching `predicate`.
    pub fn without_connections(mut self, predicate: impl Fn(&Connection) -> bool) -> Self {
        self.connections.retain(|c| !predicate(c));
        self
    }

    /// Replaces a node's state wholesale.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::NodeNotFound`] if the node is absent.
    pub fn with_state(mut self, id: &NodeId, state: NodeState) -> Result<Self, GraphError> {
        let node = self
            .nodes
            .iter_mut()
            .find(|n| &n.id == id)
            .ok_or_else(|| GraphError::NodeNotFound(id.clone()))?;
        node.state = state;
        Ok(self)
    }

    /// Looks up a node.
    pub fn node(&self, id: &NodeId) -> Option<&Node> {
        self.nodes.iter().find(|n| &n.id == id)
    }

    /// Connections leaving `(node, port)`, in declaration order.
    pub fn outgoing<'a, 'k>(
        &'a self,
        node: &'k NodeId,
        port: &'k PortId,
    ) -> impl Iterator<Item = &'a Connection> + use<'a, 'k> {
        self.connections
            .iter()
            .filter(move |c| &c.from.node_id == node && &c.from.port_id == port)
    }

    /// Connections leaving any port of `node`, in declaration order.
    pub fn outgoing_from<'a, 'k>(
        &'a self,
        node: &'k NodeId,
    ) -> impl Iterator<Item = &'a Connection> + use<'a, 'k> {
        self.connections.iter().filter(move |c| &c.from.node_id == node)
    }

    /// Connections arriving at `(node, port)`, in declaration order.
    pub fn incoming<'a, 'k>(
        &'a self,
        node: &'k NodeId,
        port: &'k PortId,
    ) -> impl Iterator<Item = &'a Connection> + use<'a, 'k> {
        self.connections
            .iter()
            .filter(move |c| &c.to.node_id == node && &c.to.port_id == port)
    }

    /// Returns a new snapshot with aggregated patches merged into node state.
    ///
    /// Patches for nodes no longer in the graph are ignored.
    pub fn with_patches(&self, patches: &PatchSet) -> Self {
        if patches.is_empty() {
            return self.clone();
        }
        let nodes = self
            .nodes
            .iter()
            .map(|node| match patches.get(&node.id) {
                Some(patch) => Node {
                    state: node.state.patched(patch),
                    ..node.clone()
                },
                None => node.clone(),
            })
            .collect();
        Self {
            nodes,
            connections: self.connections.clone(),
        }
    }

    /// Drops every connection that references a missing node or port, has
    /// the wrong direction, disagrees with its ports' kind, or duplicates an
    /// earlier `(kind, from, to)` triple.
    ///
    /// Returns the cleaned snapshot and what was dropped. Nodes are kept
    /// unchanged, including nodes of unknown type.
    pub fn normalized(&self, catalog: &dyn PortCatalog) -> (Self, Vec<DroppedConnection>) {
        let ports: HashMap<&NodeId, Vec<Port>> = self
            .nodes
            .iter()
            .map(|node| (&node.id, catalog.ports(node)))
            .collect();

        let mut seen: HashSet<(PortKind, &PortRef, &PortRef)> = HashSet::new();
        let mut kept = Vec::with_capacity(self.connections.len());
        let mut dropped = Vec::new();

        for conn in &self.connections {
            let verdict = check_endpoint(&ports, &conn.from, conn.kind, PortDirection::Output)
                .and_then(|()| check_endpoint(&ports, &conn.to, conn.kind, PortDirection::Input))
                .and_then(|()| {
                    if seen.insert((conn.kind, &conn.from, &conn.to)) {
                        Ok(())
                    } else {
                        Err(DropReason::Duplicate)
                    }
                });
            match verdict {
                Ok(()) => kept.push(conn.clone()),
                Err(reason) => {
                    #[cfg(feature = "tracing")]
                    tracing::debug!(connection = %conn.id, %reason, "dropping connection");
                    dropped.push(DroppedConnection {
                        connection: conn.clone(),
                        reason,
                    });
                }
            }
        }

        let graph = Self {
            nodes: self.nodes.clone(),
            connections: kept,
        };
        (graph, dropped)
    }
}

fn check_endpoint(
    ports: &HashMap<&NodeId, Vec<Port>>,
    end: &PortRef,
    kind: PortKind,
    direction: PortDirection,
) -> Result<(), DropReason> {
    let node_ports = ports.get(&end.node_id).ok_or(DropReason::MissingNode)?;
    let port = node_ports
        .iter()
        .find(|p| p.id == end.port_id)
        .ok_or(DropReason::MissingPort)?;
    if port.direction != direction {
        return Err(DropReason::WrongDirection);
    }
    if port.kind != kind {
        return Err(DropReason::KindMismatch);
    }
    Ok(())
}
