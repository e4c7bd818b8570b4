//! Declarative graph model for patchbay.
//!
//! A graph document is a list of [`Node`]s plus typed [`Connection`]s between
//! their ports. The model is deliberately passive:
//!
//! - **Ports are derived, not stored.** A [`PortCatalog`] (the engine's node
//!   registry) computes each node's ports from its current state.
//! - **Normalize on read.** [`GraphState::normalized`] filters connections
//!   that reference missing nodes or ports, point the wrong way, disagree on
//!   kind, or duplicate an earlier wire. Nothing in a loaded document can
//!   make the engine fail.
//! - **Snapshots, not shared mutation.** Engine operations take the
//!   [`GraphState`] they act on; edits build a new snapshot. Multi-node side
//!   effects of one event dispatch are collected in a [`PatchSet`] and applied
//!   with [`GraphState::with_patches`] after the traversal.
//!
//! # Example
//!
//! ```rust
//! use patchbay_core::graph::{Connection, GraphState, Node, NodeState, PortKind, PortRef};
//!
//! let graph = GraphState::new()
//!     .with_node(Node::new("keys", "midi_source", NodeState::new()))?
//!     .with_node(Node::new("env", "envelope", NodeState::new().with("attackMs", 10.0)))?
//!     .with_connection(Connection::new(
//!         PortKind::Midi,
//!         PortRef::new("keys", "midi_out"),
//!         PortRef::new("env", "midi_in"),
//!     ));
//! assert_eq!(graph.connections.len(), 1);
//! # Ok::<(), patchbay_core::graph::GraphError>(())
//! ```

pub mod connection;
pub mod node;
pub mod port;
pub mod state;

use thiserror::Error;

pub use connection::{Connection, ConnectionId, ConnectionKey, PortRef};
pub use node::{Node, NodeId, NodeState, PatchSet, StatePatch};
pub use port::{Port, PortDirection, PortId, PortKind};
pub use state::{DropReason, DroppedConnection, GraphState, PortCatalog};

/// Errors from explicit graph edits.
///
/// Loading never produces these: inconsistent documents are normalized
/// instead of rejected.
#[derive(Debug, Error)]
pub enum GraphError {
    /// The specified node was not found in the graph.
    #[error("node '{0}' not found")]
    NodeNotFound(NodeId),

    /// A node with this id already exists.
    #[error("node '{0}' already exists")]
    DuplicateNode(NodeId),

    /// A node's state could not be decoded into its typed form.
    #[error("invalid state for node '{node}': {source}")]
    InvalidState {
        /// Node whose state failed to decode.
        node: NodeId,
        /// Underlying decode error.
        #[source]
        source: serde_json::Error,
    },
}
