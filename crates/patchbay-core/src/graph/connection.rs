//! Connection types.
//!
//! A [`Connection`] is a directed, typed edge from an output port to an input
//! port. Connections are immutable; edits replace them wholesale.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::node::NodeId;
use super::port::{PortId, PortKind};

/// Unique identifier for a connection in a graph document.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(pub String);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ConnectionId {
    fn from(id: &str) -> Self {
        Self(id.to_owned())
    }
}

/// One end of a connection: a port on a node.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortRef {
    /// Node owning the port.
    pub node_id: NodeId,
    /// Port on that node.
    pub port_id: PortId,
}

impl PortRef {
    /// Creates a port reference.
    pub fn new(node_id: impl Into<NodeId>, port_id: impl Into<PortId>) -> Self {
        Self {
            node_id: node_id.into(),
            port_id: port_id.into(),
        }
    }
}

impl fmt::Display for PortRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.node_id, self.port_id)
    }
}

/// Identity of a wire independent of its connection id and kind.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConnectionKey {
    /// Output end.
    pub from: PortRef,
    /// Input end.
    pub to: PortRef,
}

impl fmt::Display for ConnectionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} → {}", self.from, self.to)
    }
}

/// A typed edge from an output port to an input port.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Connection {
    /// Stable identifier.
    pub id: ConnectionId,
    /// Signal category; must match both endpoint ports.
    pub kind: PortKind,
    /// Output end.
    pub from: PortRef,
    /// Input end.
    pub to: PortRef,
}

impl Connection {
    /// Creates a connection with an id derived from its endpoints.
    pub fn new(kind: PortKind, from: PortRef, to: PortRef) -> Self {
        let id = ConnectionId(format!("{from}->{to}:{kind}"));
        Self { id, kind, from, to }
    }

    /// Replaces the identifier.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = ConnectionId(id.into());
        self
    }

    /// Endpoint identity used for reconciliation.
    pub fn key(&self) -> ConnectionKey {
        ConnectionKey {
            from: self.from.clone(),
            to: self.to.clone(),
        }
    }

    /// Returns `true` if either end is on `node`.
    pub fn touches(&self, node: &NodeId) -> bool {
        &self.from.node_id == node || &self.to.node_id == node
    }
}
