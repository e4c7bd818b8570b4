//! Voice allocator discovery.
//!
//! A polyphonic consumer asks which upstream node owns the voice pool
//! driving one of its gate inputs. The walk follows voice-kind connections
//! backwards. Each pass-through node on the way contributes its local voice
//! mapping, so the result maps the consumer's voice index to the owner's.
//!
//! Nothing is cached: discovery runs per event against the snapshot it is
//! given, so pass-through nodes never hold references to their owners.

use std::collections::HashSet;

use patchbay_core::{Connection, GraphState, NodeId, PortId, VoiceAllocator, VoiceMapping};

use crate::instance::InstanceMap;

/// The pool found by [`find_allocator`].
#[derive(Debug)]
pub struct AllocatorMatch<'a> {
    /// The owning node's allocator.
    pub allocator: &'a VoiceAllocator,
    /// The owning node.
    pub source_id: NodeId,
    /// Maps a voice index seen at the consumer to the owner's index.
    pub mapping: VoiceMapping,
}

/// Finds the voice pool feeding `input` on `node`.
///
/// Returns `None` if the port has no voice-kind feed, the walk reaches a node
/// without an instance or without a fed voice input, or it revisits a node.
pub fn find_allocator<'a>(
    graph: &GraphState,
    instances: &'a InstanceMap,
    node: &NodeId,
    input: &PortId,
) -> Option<AllocatorMatch<'a>> {
    let mut visited: HashSet<&NodeId> = HashSet::from([node]);
    let mut feed = voice_feed(graph, node, input)?;
    let mut mapping = VoiceMapping::identity();

    loop {
        let current = &feed.from.node_id;
        if !visited.insert(current) {
            tracing::debug!(node = %node, at = %current, "voice source walk hit a cycle");
            return None;
        }

        let instance = instances.get(current)?;
        if let Some(allocator) = instance.voice_allocator() {
            return Some(AllocatorMatch {
                allocator,
                source_id: current.clone(),
                mapping,
            });
        }

        if let Some(local) = instance.voice_mapping_for_output(&feed.from.port_id) {
            mapping = mapping.then(local);
        }

        let upstream = matching_input(graph, current, &feed.from.port_id)?;
        feed = voice_feed(graph, current, &upstream)?;
    }
}

/// First voice-kind connection arriving at `(node, port)`.
fn voice_feed<'g>(graph: &'g GraphState, node: &NodeId, port: &PortId) -> Option<&'g Connection> {
    graph.incoming(node, port).find(|c| c.kind.is_voice())
}

/// The voice input on `node` that corresponds to `output`.
///
/// Candidates are the distinct voice inputs with incoming connections, in
/// connection order. One candidate wins outright; otherwise `x_out` pairs
/// with `x_in` (and `out` with `in`), falling back to the first.
fn matching_input(graph: &GraphState, node: &NodeId, output: &PortId) -> Option<PortId> {
    let mut candidates: Vec<&PortId> = Vec::new();
    for conn in &graph.connections {
        if &conn.to.node_id == node && conn.kind.is_voice() && !candidates.contains(&&conn.to.port_id) {
            candidates.push(&conn.to.port_id);
        }
    }

    match candidates.as_slice() {
        [] => None,
        [only] => Some((*only).clone()),
        [first, ..] => {
            let name = output.as_str();
            let wanted = match name.strip_suffix("_out") {
                Some(stem) => format!("{stem}_in"),
                None if name == "out" => "in".to_owned(),
                None => String::new(),
            };
            let chosen = candidates
                .iter()
                .find(|port| port.as_str() == wanted)
                .unwrap_or(first);
            Some((*chosen).clone())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HandlerError;
    use crate::instance::RuntimeInstance;
    use patchbay_core::{Node, NodeState, PortKind, PortRef, VoiceMap};
    use std::any::Any;

    struct Owner(VoiceAllocator);

    impl RuntimeInstance for Owner {
        fn update_state(&mut self, _state: &NodeState) -> Result<(), HandlerError> {
            Ok(())
        }

        fn voice_allocator(&self) -> Option<&VoiceAllocator> {
            Some(&self.0)
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    struct Pass(Option<VoiceMap>);

    impl RuntimeInstance for Pass {
        fn update_state(&mut self, _state: &NodeState) -> Result<(), HandlerError> {
            Ok(())
        }

        fn voice_mapping_for_output(&self, _port: &PortId) -> Option<VoiceMapping> {
            self.0.clone().map(VoiceMapping::from)
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    fn gate(from: (&str, &str), to: (&str, &str)) -> Connection {
        Connection::new(
            PortKind::Gate,
            PortRef::new(from.0, from.1),
            PortRef::new(to.0, to.1),
        )
    }

    fn graph(ids: &[&str], connections: Vec<Connection>) -> GraphState {
        GraphState {
            nodes: ids
                .iter()
                .map(|id| Node::new(*id, "test", NodeState::new()))
                .collect(),
            connections,
        }
    }

    fn lookup<'a>(g: &GraphState, map: &'a InstanceMap) -> Option<AllocatorMatch<'a>> {
        find_allocator(g, map, &NodeId::from("sink"), &PortId::from("gate_in"))
    }

    #[test]
    fn direct_owner_has_identity_mapping() {
        let g = graph(&["poly", "sink"], vec![gate(("poly", "gate_out"), ("sink", "gate_in"))]);
        let mut map = InstanceMap::new();
        map.insert(NodeId::from("poly"), Box::new(Owner(VoiceAllocator::new(4))));
        let found = lookup(&g, &map).unwrap();
        assert_eq!(found.source_id, NodeId::from("poly"));
        assert!(found.mapping.is_identity());
        assert_eq!(found.allocator.voice_count(), 4);
    }

    #[test]
    fn pass_through_mappings_accumulate() {
        let g = graph(
            &["poly", "shift", "sink"],
            vec![
                gate(("poly", "gate_out"), ("shift", "gate_in")),
                gate(("shift", "gate_out"), ("sink", "gate_in")),
            ],
        );
        let mut map = InstanceMap::new();
        map.insert(NodeId::from("poly"), Box::new(Owner(VoiceAllocator::new(8))));
        map.insert(NodeId::from("shift"), Box::new(Pass(Some(VoiceMap::Offset(-2)))));
        let found = lookup(&g, &map).unwrap();
        assert_eq!(found.mapping.apply(5), Some(3));
        assert_eq!(found.mapping.apply(1), None);
    }

    #[test]
    fn cycle_returns_none() {
        let g = graph(
            &["a", "b", "sink"],
            vec![
                gate(("a", "gate_out"), ("b", "gate_in")),
                gate(("b", "gate_out"), ("a", "gate_in")),
                gate(("b", "gate_out"), ("sink", "gate_in")),
            ],
        );
        let mut map = InstanceMap::new();
        map.insert(NodeId::from("a"), Box::new(Pass(None)));
        map.insert(NodeId::from("b"), Box::new(Pass(None)));
        assert!(lookup(&g, &map).is_none());
    }

    #[test]
    fn dead_end_returns_none() {
        let g = graph(&["p", "sink"], vec![gate(("p", "gate_out"), ("sink", "gate_in"))]);
        let mut map = InstanceMap::new();
        map.insert(NodeId::from("p"), Box::new(Pass(None)));
        assert!(lookup(&g, &map).is_none());

        // No instance behind the feed at all.
        assert!(lookup(&g, &InstanceMap::new()).is_none());
    }

    #[test]
    fn midi_feed_is_not_a_voice_source() {
        let midi = Connection::new(
            PortKind::Midi,
            PortRef::new("poly", "midi_out"),
            PortRef::new("sink", "gate_in"),
        );
        let g = graph(&["poly", "sink"], vec![midi]);
        let mut map = InstanceMap::new();
        map.insert(NodeId::from("poly"), Box::new(Owner(VoiceAllocator::new(2))));
        assert!(lookup(&g, &map).is_none());
    }

    #[test]
    fn ambiguous_inputs_follow_port_names() {
        let g = graph(
            &["left", "right", "split", "sink"],
            vec![
                gate(("left", "gate_out"), ("split", "a_in")),
                gate(("right", "gate_out"), ("split", "b_in")),
                gate(("split", "b_out"), ("sink", "gate_in")),
            ],
        );
        let mut map = InstanceMap::new();
        map.insert(NodeId::from("left"), Box::new(Owner(VoiceAllocator::new(2))));
        map.insert(NodeId::from("right"), Box::new(Owner(VoiceAllocator::new(3))));
        map.insert(NodeId::from("split"), Box::new(Pass(None)));
        assert_eq!(lookup(&g, &map).unwrap().source_id, NodeId::from("right"));
    }

    #[test]
    fn ambiguous_inputs_without_match_take_first() {
        let g = graph(
            &["left", "right", "split", "sink"],
            vec![
                gate(("left", "gate_out"), ("split", "a_in")),
                gate(("right", "gate_out"), ("split", "b_in")),
                gate(("split", "mix"), ("sink", "gate_in")),
            ],
        );
        let mut map = InstanceMap::new();
        map.insert(NodeId::from("left"), Box::new(Owner(VoiceAllocator::new(2))));
        map.insert(NodeId::from("right"), Box::new(Owner(VoiceAllocator::new(3))));
        map.insert(NodeId::from("split"), Box::new(Pass(None)));
        assert_eq!(lookup(&g, &map).unwrap().source_id, NodeId::from("left"));
    }
}
