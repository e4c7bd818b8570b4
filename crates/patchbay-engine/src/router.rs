//! Event router.
//!
//! Routed dispatch walks the graph breadth first from one output port,
//! following only edges whose kind accepts the event. Every `(node, port,
//! event)` triple is delivered at most once per call, which keeps cyclic
//! graphs finite and diamonds single-delivery. Handlers may stop the original
//! event, emit new events from their outputs, and return routing-only state
//! patches; patches are collected in the [`DispatchReport`] and only applied
//! after the traversal, to a new snapshot.
//!
//! Direct dispatch delivers to one node's handler without traversing.

use std::collections::{BTreeMap, HashSet, VecDeque};

use patchbay_core::{
    EventKey, GraphState, NodeId, PatchSet, PortId, PortRef, RoutedEvent, StatePatch,
};

use crate::instance::{Emission, EventContext, HandlerOutcome, InstanceMap};

/// Emission chains deeper than this are cut.
pub const MAX_EMIT_DEPTH: usize = 64;

/// Deliveries per dispatch call before the traversal stops.
pub const MAX_DELIVERIES: usize = 10_000;

/// One handler invocation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Delivery {
    /// Receiving node.
    pub node: NodeId,
    /// Input port.
    pub port: PortId,
    /// The delivered event.
    pub event: RoutedEvent,
    /// Whether the handler stopped the event.
    pub consumed: bool,
}

/// A handler error caught at the dispatch boundary.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DispatchFailure {
    /// Node whose handler failed.
    pub node: NodeId,
    /// Input port.
    pub port: PortId,
    /// Rendered error.
    pub message: String,
}

/// Everything one dispatch call did.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DispatchReport {
    /// Handler invocations, in delivery order.
    pub deliveries: Vec<Delivery>,
    /// Aggregated routing-only state patches.
    pub patches: PatchSet,
    /// New events produced by handlers, with the producing node.
    pub emitted: Vec<(NodeId, Emission)>,
    /// Caught handler errors.
    pub errors: Vec<DispatchFailure>,
    /// Set when a depth or delivery limit cut the traversal short.
    pub truncated: bool,
}

impl DispatchReport {
    /// Returns `graph` with the aggregated patches applied.
    pub fn apply_to(&self, graph: &GraphState) -> GraphState {
        graph.with_patches(&self.patches)
    }

    /// Deliveries made to `node`.
    pub fn deliveries_to<'a>(&'a self, node: &'a NodeId) -> impl Iterator<Item = &'a Delivery> + 'a {
        self.deliveries.iter().filter(move |d| &d.node == node)
    }
}

#[derive(Debug)]
struct Hop {
    node: NodeId,
    port: PortId,
    event: RoutedEvent,
    depth: usize,
}

/// Breadth-first event router with ephemeral state overrides.
#[derive(Debug)]
pub struct EventRouter {
    overrides: BTreeMap<NodeId, StatePatch>,
    max_emit_depth: usize,
    max_deliveries: usize,
}

impl Default for EventRouter {
    fn default() -> Self {
        Self {
            overrides: BTreeMap::new(),
            max_emit_depth: MAX_EMIT_DEPTH,
            max_deliveries: MAX_DELIVERIES,
        }
    }
}

impl EventRouter {
    /// Creates a router with the default limits.
    pub fn new() -> Self {
        Self::default()
    }

    /// Overrides the traversal limits.
    pub fn with_limits(mut self, max_emit_depth: usize, max_deliveries: usize) -> Self {
        self.max_emit_depth = max_emit_depth;
        self.max_deliveries = max_deliveries.max(1);
        self
    }

    /// Merges an ephemeral override over `node`'s stored state. Handlers see
    /// it until it is cleared; the graph never does.
    pub fn set_override(&mut self, node: NodeId, patch: StatePatch) {
        self.overrides.entry(node).or_default().merge(patch);
    }

    /// Drops `node`'s override, returning it.
    pub fn clear_override(&mut self, node: &NodeId) -> Option<StatePatch> {
        self.overrides.remove(node)
    }

    /// Current override for `node`.
    pub fn override_for(&self, node: &NodeId) -> Option<&StatePatch> {
        self.overrides.get(node)
    }

    /// Routes `event` out of `from` through the graph.
    pub fn dispatch(
        &self,
        graph: &GraphState,
        instances: &mut InstanceMap,
        from: &PortRef,
        event: RoutedEvent,
        time_ms: f64,
    ) -> DispatchReport {
        let mut report = DispatchReport::default();
        let mut queue = VecDeque::new();
        let mut visited: HashSet<(NodeId, PortId, EventKey)> = HashSet::new();

        enqueue(graph, &from.node_id, Some(&from.port_id), event, 0, &mut queue);

        while let Some(hop) = queue.pop_front() {
            if !visited.insert((hop.node.clone(), hop.port.clone(), hop.event.dedupe_key())) {
                continue;
            }
            if report.deliveries.len() >= self.max_deliveries {
                tracing::warn!(source = %from, limit = self.max_deliveries, "delivery limit reached");
                report.truncated = true;
                break;
            }

            let Some(outcome) = self.deliver(graph, instances, &hop, time_ms, &mut report) else {
                continue;
            };

            if !outcome.consumed {
                enqueue(graph, &hop.node, None, hop.event, hop.depth, &mut queue);
            }
            for emission in outcome.emit {
                if hop.depth >= self.max_emit_depth {
                    tracing::warn!(node = %hop.node, depth = hop.depth, "emit depth limit reached");
                    report.truncated = true;
                    continue;
                }
                enqueue(
                    graph,
                    &hop.node,
                    emission.port.as_ref(),
                    emission.event,
                    hop.depth + 1,
                    &mut queue,
                );
                report.emitted.push((hop.node.clone(), emission));
            }
        }

        report
    }

    /// Delivers `event` to `node`'s handler without traversing the graph.
    /// Emissions are reported but not routed.
    pub fn dispatch_direct(
        &self,
        graph: &GraphState,
        instances: &mut InstanceMap,
        node: &NodeId,
        port: &PortId,
        event: RoutedEvent,
        time_ms: f64,
    ) -> DispatchReport {
        let mut report = DispatchReport::default();
        let hop = Hop {
            node: node.clone(),
            port: port.clone(),
            event,
            depth: 0,
        };
        if let Some(outcome) = self.deliver(graph, instances, &hop, time_ms, &mut report) {
            report
                .emitted
                .extend(outcome.emit.into_iter().map(|e| (node.clone(), e)));
        }
        report
    }

    /// Runs one handler. `None` if the node or its instance is missing.
    fn deliver(
        &self,
        graph: &GraphState,
        instances: &mut InstanceMap,
        hop: &Hop,
        time_ms: f64,
        report: &mut DispatchReport,
    ) -> Option<HandlerOutcome> {
        let Some(node) = graph.node(&hop.node) else {
            tracing::trace!(node = %hop.node, "skipping missing node");
            return None;
        };
        let Some(mut instance) = instances.remove(&hop.node) else {
            tracing::trace!(node = %hop.node, "skipping node without instance");
            return None;
        };

        let state = match self.overrides.get(&hop.node) {
            Some(patch) => node.state.patched(patch),
            None => node.state.clone(),
        };
        let result = {
            let ctx = EventContext {
                node: &hop.node,
                port: &hop.port,
                state: &state,
                graph,
                instances,
                time_ms,
            };
            instance.handle_event(&hop.event, &ctx)
        };
        instances.insert(hop.node.clone(), instance);

        let mut outcome = match result {
            Ok(outcome) => outcome,
            Err(err) => {
                tracing::warn!(node = %hop.node, port = %hop.port, error = %err, "event handler failed");
                report.errors.push(DispatchFailure {
                    node: hop.node.clone(),
                    port: hop.port.clone(),
                    message: err.to_string(),
                });
                HandlerOutcome::consumed()
            }
        };

        if let Some(patch) = outcome.patch.take() {
            report.patches.add(hop.node.clone(), patch);
        }
        tracing::trace!(
            node = %hop.node,
            port = %hop.port,
            consumed = outcome.consumed,
            emitted = outcome.emit.len(),
            "delivered"
        );
        report.deliveries.push(Delivery {
            node: hop.node.clone(),
            port: hop.port.clone(),
            event: hop.event,
            consumed: outcome.consumed,
        });
        Some(outcome)
    }
}

/// Queues `event` on every accepting edge leaving `node`, or only those
/// leaving `port` when given.
fn enqueue(
    graph: &GraphState,
    node: &NodeId,
    port: Option<&PortId>,
    event: RoutedEvent,
    depth: usize,
    queue: &mut VecDeque<Hop>,
) {
    let edges = graph
        .outgoing_from(node)
        .filter(|c| port.is_none_or(|p| &c.from.port_id == p))
        .filter(|c| event.accepts(c.kind));
    for conn in edges {
        queue.push_back(Hop {
            node: conn.to.node_id.clone(),
            port: conn.to.port_id.clone(),
            event,
            depth,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HandlerError;
    use crate::instance::RuntimeInstance;
    use patchbay_core::{Connection, MidiMessage, Node, NodeState, PortKind, VoiceEvent};
    use std::any::Any;

    /// Scripted behavior for a test node.
    #[derive(Clone, Copy)]
    enum Script {
        Pass,
        /// Consume and emit the note transposed up an octave.
        Transpose,
        Fail,
        /// Consume and patch `level`.
        Patch,
    }

    struct Scripted {
        script: Script,
        seen: Vec<(PortId, RoutedEvent)>,
        levels: Vec<Option<f64>>,
    }

    impl Scripted {
        fn boxed(script: Script) -> Box<Self> {
            Box::new(Self {
                script,
                seen: Vec::new(),
                levels: Vec::new(),
            })
        }
    }

    impl RuntimeInstance for Scripted {
        fn update_state(&mut self, _state: &NodeState) -> Result<(), HandlerError> {
            Ok(())
        }

        fn handle_event(
            &mut self,
            event: &RoutedEvent,
            ctx: &EventContext<'_>,
        ) -> Result<HandlerOutcome, HandlerError> {
            self.seen.push((ctx.port.clone(), *event));
            self.levels.push(ctx.state.f64("level"));
            match self.script {
                Script::Pass => Ok(HandlerOutcome::pass()),
                Script::Transpose => {
                    let RoutedEvent::Midi(midi) = event else {
                        return Ok(HandlerOutcome::consumed());
                    };
                    let note = midi.message.note().unwrap_or(0).saturating_add(12);
                    Ok(HandlerOutcome::consumed()
                        .with_emit(MidiMessage::note_on(midi.message.channel(), note, 100)))
                }
                Script::Fail => Err(HandlerError::rejected("scripted failure")),
                Script::Patch => Ok(HandlerOutcome::consumed()
                    .with_patch(StatePatch::new().with("level", 0.25))),
            }
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    fn midi(from: &str, to: &str) -> Connection {
        Connection::new(
            PortKind::Midi,
            PortRef::new(from, "out"),
            PortRef::new(to, "in"),
        )
    }

    fn setup(nodes: &[(&str, Script)], connections: Vec<Connection>) -> (GraphState, InstanceMap) {
        let mut graph = GraphState::new();
        let mut instances = InstanceMap::new();
        for (id, script) in nodes {
            graph.nodes.push(Node::new(*id, "scripted", NodeState::new()));
            instances.insert(NodeId::from(*id), Scripted::boxed(*script));
        }
        graph.connections = connections;
        (graph, instances)
    }

    fn seen(instances: &InstanceMap, id: &str) -> usize {
        instances
            .get_as::<Scripted>(&NodeId::from(id))
            .map_or(0, |s| s.seen.len())
    }

    fn note() -> RoutedEvent {
        RoutedEvent::from(MidiMessage::note_on(0, 60, 100))
    }

    #[test]
    fn diamond_delivers_once() {
        let (graph, mut instances) = setup(
            &[("src", Script::Pass), ("a", Script::Pass), ("b", Script::Pass), ("sink", Script::Pass)],
            vec![midi("src", "a"), midi("src", "b"), midi("a", "sink"), midi("b", "sink")],
        );
        let report = EventRouter::new().dispatch(
            &graph,
            &mut instances,
            &PortRef::new("src", "out"),
            note(),
            0.0,
        );
        assert_eq!(seen(&instances, "sink"), 1);
        let order: Vec<&str> = report.deliveries.iter().map(|d| d.node.as_str()).collect();
        assert_eq!(order, ["a", "b", "sink"]);
    }

    #[test]
    fn cycle_terminates() {
        let (graph, mut instances) = setup(
            &[("a", Script::Pass), ("b", Script::Pass)],
            vec![midi("a", "b"), midi("b", "a")],
        );
        let report = EventRouter::new().dispatch(
            &graph,
            &mut instances,
            &PortRef::new("a", "out"),
            note(),
            0.0,
        );
        assert_eq!(report.deliveries.len(), 2);
        assert!(!report.truncated);
    }

    #[test]
    fn distinct_events_share_a_port() {
        let (graph, mut instances) = setup(&[("src", Script::Pass), ("sink", Script::Pass)], vec![midi("src", "sink")]);
        let router = EventRouter::new();
        let from = PortRef::new("src", "out");
        router.dispatch(&graph, &mut instances, &from, note(), 0.0);
        router.dispatch(&graph, &mut instances, &from, note(), 0.0);
        assert_eq!(seen(&instances, "sink"), 2);
    }

    #[test]
    fn consumed_stops_and_emission_continues() {
        let (graph, mut instances) = setup(
            &[("src", Script::Pass), ("arp", Script::Transpose), ("sink", Script::Pass)],
            vec![midi("src", "arp"), midi("arp", "sink")],
        );
        let report = EventRouter::new().dispatch(
            &graph,
            &mut instances,
            &PortRef::new("src", "out"),
            note(),
            0.0,
        );
        let sink = instances.get_as::<Scripted>(&NodeId::from("sink")).unwrap();
        assert_eq!(sink.seen.len(), 1);
        let RoutedEvent::Midi(got) = sink.seen[0].1 else {
            panic!("expected midi");
        };
        assert_eq!(got.message.note(), Some(72));
        assert_eq!(report.emitted.len(), 1);
    }

    #[test]
    fn transforming_cycle_is_cut_at_depth_limit() {
        let (graph, mut instances) = setup(
            &[("a", Script::Transpose), ("b", Script::Transpose)],
            vec![midi("a", "b"), midi("b", "a")],
        );
        let report = EventRouter::new().with_limits(8, 1000).dispatch(
            &graph,
            &mut instances,
            &PortRef::new("a", "out"),
            note(),
            0.0,
        );
        assert!(report.truncated);
        assert_eq!(report.deliveries.len(), 9);
    }

    #[test]
    fn edge_kind_filters_events() {
        let gate = Connection::new(
            PortKind::Gate,
            PortRef::new("src", "out"),
            PortRef::new("sink", "in"),
        );
        let (graph, mut instances) = setup(&[("src", Script::Pass), ("sink", Script::Pass)], vec![gate]);
        let router = EventRouter::new();
        let from = PortRef::new("src", "out");
        router.dispatch(&graph, &mut instances, &from, note(), 0.0);
        assert_eq!(seen(&instances, "sink"), 0);
        router.dispatch(&graph, &mut instances, &from, VoiceEvent::gate_on(0).into(), 0.0);
        assert_eq!(seen(&instances, "sink"), 1);
    }

    #[test]
    fn missing_nodes_and_failures_do_not_stop_traversal() {
        let (graph, mut instances) = setup(
            &[("src", Script::Pass), ("bad", Script::Fail), ("sink", Script::Pass)],
            vec![midi("src", "ghost"), midi("src", "bad"), midi("bad", "sink"), midi("src", "sink")],
        );
        let report = EventRouter::new().dispatch(
            &graph,
            &mut instances,
            &PortRef::new("src", "out"),
            note(),
            0.0,
        );
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].node, NodeId::from("bad"));
        assert_eq!(seen(&instances, "sink"), 1);
        // The failed node's instance is back in the map.
        assert!(instances.contains(&NodeId::from("bad")));
    }

    #[test]
    fn patches_are_deferred_and_overrides_win() {
        let (graph, mut instances) = setup(
            &[("src", Script::Pass), ("knob", Script::Patch)],
            vec![midi("src", "knob")],
        );
        let mut router = EventRouter::new();
        router.set_override(NodeId::from("knob"), StatePatch::new().with("level", 0.75));
        let report = router.dispatch(
            &graph,
            &mut instances,
            &PortRef::new("src", "out"),
            note(),
            0.0,
        );
        let knob = instances.get_as::<Scripted>(&NodeId::from("knob")).unwrap();
        assert_eq!(knob.levels, vec![Some(0.75)]);
        assert_eq!(graph.node(&NodeId::from("knob")).unwrap().state.f64("level"), None);

        let next = report.apply_to(&graph);
        assert_eq!(next.node(&NodeId::from("knob")).unwrap().state.f64("level"), Some(0.25));
    }

    #[test]
    fn direct_dispatch_does_not_traverse() {
        let (graph, mut instances) = setup(
            &[("pad", Script::Transpose), ("sink", Script::Pass)],
            vec![midi("pad", "sink")],
        );
        let report = EventRouter::new().dispatch_direct(
            &graph,
            &mut instances,
            &NodeId::from("pad"),
            &PortId::from("in"),
            note(),
            0.0,
        );
        assert_eq!(report.deliveries.len(), 1);
        assert_eq!(report.emitted.len(), 1);
        assert_eq!(seen(&instances, "sink"), 0);
    }
}
