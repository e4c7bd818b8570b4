//! Property-based tests for patchbay-engine.
//!
//! Random graphs check two structural guarantees: routing terminates and
//! delivers each event identity to a port at most once, and synchronizing
//! the same snapshot twice issues no device calls the second time.

use std::any::Any;
use std::collections::HashSet;

use patchbay_core::{
    Connection, GraphState, MidiMessage, Node, NodeState, Port, PortKind, PortRef,
};
use patchbay_engine::{
    DeviceGraph, EngineError, NodeCategory, NodeDefaults, NodeDescriptor, NodeRegistry,
    OfflineDeviceGraph, PatchRuntime, RuntimeInstance,
};
use proptest::prelude::*;

/// MIDI pass-through used to build arbitrary event cycles.
struct Thru;

impl RuntimeInstance for Thru {
    fn update_state(&mut self, _state: &NodeState) -> Result<(), patchbay_engine::HandlerError> {
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

fn thru_ports(_state: &NodeState) -> Vec<Port> {
    vec![
        Port::input("in", PortKind::Midi),
        Port::output("out", PortKind::Midi),
    ]
}

fn thru_create(
    _device: &mut dyn DeviceGraph,
    _node: &Node,
    _defaults: &NodeDefaults,
) -> Result<Box<dyn RuntimeInstance>, EngineError> {
    Ok(Box::new(Thru))
}

fn thru_registry() -> NodeRegistry {
    let mut registry = NodeRegistry::empty();
    registry.register(
        NodeDescriptor {
            type_id: "thru",
            name: "Thru",
            description: "Passes MIDI unchanged",
            category: NodeCategory::Event,
            ports: thru_ports,
        },
        thru_create,
    );
    registry
}

/// `n` nodes of `type_id` plus edges between them, self-loops included.
fn graph_of(type_id: &str, n: usize, edges: &[(usize, usize)], kind: PortKind) -> GraphState {
    let mut graph = GraphState::new();
    for i in 0..n {
        let state = NodeState::new().with("channels", (i % 3 + 1) as u64);
        graph = graph
            .with_node(Node::new(format!("n{i}"), type_id, state))
            .unwrap();
    }
    for &(from, to) in edges {
        graph = graph.with_connection(Connection::new(
            kind,
            PortRef::new(format!("n{}", from % n), "out"),
            PortRef::new(format!("n{}", to % n), "in"),
        ));
    }
    graph
}

fn edges() -> impl Strategy<Value = Vec<(usize, usize)>> {
    prop::collection::vec((0usize..8, 0usize..8), 0..24)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// Routing through any pass-through topology terminates, and each
    /// (node, port) sees the event at most once.
    #[test]
    fn dispatch_visits_each_port_once(n in 1usize..8, edges in edges()) {
        let graph = graph_of("thru", n, &edges, PortKind::Midi);
        let mut runtime = PatchRuntime::with_registry(thru_registry(), OfflineDeviceGraph::new());
        runtime.apply(&graph);

        let (_, report) = runtime.dispatch(
            &PortRef::new("n0", "out"),
            MidiMessage::note_on(0, 60, 100),
            0.0,
        );
        prop_assert!(!report.truncated);
        let mut seen = HashSet::new();
        for delivery in &report.deliveries {
            prop_assert!(
                seen.insert((delivery.node.clone(), delivery.port.clone())),
                "{}.{} delivered twice", delivery.node, delivery.port
            );
        }
        prop_assert!(report.deliveries.len() <= n);
    }

    /// A second synchronize with the same snapshot is free.
    #[test]
    fn apply_is_idempotent(n in 1usize..8, edges in edges()) {
        let graph = graph_of("audio_unit", n, &edges, PortKind::Audio);
        let mut runtime = PatchRuntime::new(OfflineDeviceGraph::new());
        let first = runtime.apply(&graph);
        prop_assert_eq!(first.sync.device_errors, 0);
        runtime.device_mut().take_ops();

        let second = runtime.apply(&graph);
        prop_assert!(second.sync.is_noop());
        prop_assert!(runtime.device().ops().is_empty());
    }

    /// Tearing everything down leaves no wires and no live connections.
    #[test]
    fn empty_snapshot_releases_everything(n in 1usize..8, edges in edges()) {
        let graph = graph_of("audio_unit", n, &edges, PortKind::Audio);
        let mut runtime = PatchRuntime::new(OfflineDeviceGraph::new());
        runtime.apply(&graph);
        runtime.apply(&GraphState::new());

        prop_assert_eq!(runtime.synchronizer().live_count(), 0);
        prop_assert_eq!(runtime.device().wires().count(), 0);
        prop_assert_eq!(runtime.device().unit_count(), 0);
        prop_assert!(runtime.instances().is_empty());
    }
}
