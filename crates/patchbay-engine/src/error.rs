//! Error types for the runtime engine.
//!
//! None of these abort the engine. Device and handler errors are logged and
//! skipped at the boundary where they occur; [`EngineError`] is only returned
//! from explicit setup calls (creating instances, spawning the playback
//! worker).

use patchbay_core::{GraphError, NodeId};
use thiserror::Error;

use crate::instance::{Endpoint, UnitId};

/// Errors reported by a [`DeviceGraph`](crate::DeviceGraph) backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeviceError {
    /// The unit does not exist (never created, or already destroyed).
    #[error("unknown unit {0}")]
    UnknownUnit(UnitId),

    /// The endpoints are already wired together.
    #[error("{output} is already connected to {input}")]
    AlreadyConnected {
        /// Output endpoint.
        output: Endpoint,
        /// Input endpoint.
        input: Endpoint,
    },

    /// The endpoints are not wired together.
    #[error("{output} is not connected to {input}")]
    NotConnected {
        /// Output endpoint.
        output: Endpoint,
        /// Input endpoint.
        input: Endpoint,
    },

    /// The backend is not running and could not be started.
    #[error("backend unavailable: {0}")]
    Unavailable(String),
}

/// Errors returned by a node's event handler.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// The node's state could not be decoded.
    #[error(transparent)]
    State(#[from] GraphError),

    /// A device call made by the handler failed.
    #[error(transparent)]
    Device(#[from] DeviceError),

    /// The handler refused the event.
    #[error("{0}")]
    Rejected(String),
}

impl HandlerError {
    /// Create a rejection error.
    pub fn rejected(reason: impl Into<String>) -> Self {
        HandlerError::Rejected(reason.into())
    }
}

/// Errors from engine setup operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// No node type is registered under this tag.
    #[error("unknown node type '{type_id}' for node '{node}'")]
    UnknownNodeType {
        /// Node that requested the type.
        node: NodeId,
        /// The unregistered type tag.
        type_id: String,
    },

    /// Creating a node instance failed.
    #[error("failed to create instance for node '{node}': {source}")]
    CreateInstance {
        /// Node being created.
        node: NodeId,
        /// Underlying error.
        #[source]
        source: HandlerError,
    },

    /// A live instance rejected its new state.
    #[error("node '{node}' rejected its state: {source}")]
    UpdateState {
        /// Node being updated.
        node: NodeId,
        /// Underlying error.
        #[source]
        source: HandlerError,
    },

    /// A device call failed.
    #[error(transparent)]
    Device(#[from] DeviceError),

    /// The playback worker thread could not be spawned.
    #[error("failed to spawn playback worker: {0}")]
    Spawn(#[source] std::io::Error),

    /// The playback worker has shut down.
    #[error("playback worker is not running")]
    WorkerStopped,
}

impl EngineError {
    /// Create an instance creation error.
    pub fn create_instance(node: &NodeId, source: impl Into<HandlerError>) -> Self {
        EngineError::CreateInstance {
            node: node.clone(),
            source: source.into(),
        }
    }

    /// Create a state update error.
    pub fn update_state(node: &NodeId, source: HandlerError) -> Self {
        EngineError::UpdateState {
            node: node.clone(),
            source,
        }
    }
}
