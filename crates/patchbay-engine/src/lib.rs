//! Patchbay Engine - runtime graph engine for a modular audio/MIDI editor
//!
//! The editor owns a declarative [`GraphState`](patchbay_core::GraphState);
//! this crate keeps a live backend in step with it and moves events through
//! it. Nothing here processes samples. Signal work happens behind the
//! [`DeviceGraph`] trait.
//!
//! # Subsystems
//!
//! - [`ConnectionSynchronizer`] - Reconciles continuous connections with
//!   device wiring, one diff per snapshot
//! - [`EventRouter`] - Breadth-first event delivery with consumption,
//!   emission, deduplication and deferred state patches
//! - [`find_allocator`] - Walks voice connections upstream to the pool that
//!   owns a consumer's voices, composing remaps on the way
//! - [`Scheduler`] / [`PlaybackWorker`] - Lookahead timeline playback on a
//!   tempo map, with loop, seek and tempo changes
//! - [`NodeRegistry`] - Node types, their ports and instance constructors
//! - [`PatchRuntime`] - Host facade tying the above to one backend
//!
//! # Example
//!
//! ```rust
//! use patchbay_core::{Connection, GraphState, Node, NodeState, PortKind, PortRef};
//! use patchbay_engine::{OfflineDeviceGraph, PatchRuntime};
//!
//! let graph = GraphState::new()
//!     .with_node(Node::new("osc", "audio_unit", NodeState::new().with("channels", 2)))?
//!     .with_node(Node::new("out", "audio_unit", NodeState::new().with("channels", 2)))?
//!     .with_connection(Connection::new(
//!         PortKind::Audio,
//!         PortRef::new("osc", "out"),
//!         PortRef::new("out", "in"),
//!     ));
//!
//! let mut runtime = PatchRuntime::new(OfflineDeviceGraph::new());
//! let report = runtime.apply(&graph);
//! assert_eq!(report.sync.connected.len(), 1);
//! assert_eq!(runtime.device().connect_count(), 2);
//! # Ok::<(), patchbay_core::GraphError>(())
//! ```

pub mod device;
pub mod discovery;
pub mod error;
pub mod instance;
pub mod nodes;
pub mod queue;
pub mod registry;
pub mod router;
pub mod runtime;
pub mod scheduler;
pub mod sync;

pub use device::{DeviceOp, OfflineDeviceGraph};
pub use discovery::{AllocatorMatch, find_allocator};
pub use error::{DeviceError, EngineError, HandlerError};
pub use instance::{
    ConnectedPorts, DeviceGraph, Emission, Endpoint, EventContext, HandlerOutcome,
    InstanceFactory, InstanceMap, RuntimeInstance, UnitId,
};
pub use queue::{MidiDispatchQueue, QueueTarget, QueuedMidi};
pub use registry::{NodeCategory, NodeDefaults, NodeDescriptor, NodeRegistry};
pub use router::{Delivery, DispatchFailure, DispatchReport, EventRouter};
pub use runtime::{ApplyReport, PatchRuntime};
pub use scheduler::{
    Clock, FiredEvent, ManualClock, PlaybackCommand, PlaybackMessage, PlaybackWorker, Scheduler,
    SchedulerSettings, SystemClock, all_notes_off_sweep,
};
pub use sync::{ConnectionSynchronizer, LiveConnection, SyncReport, pair_channels};
