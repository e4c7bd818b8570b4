//! Integration tests for patchbay-core.
//!
//! Exercises the public surface across modules: graph documents through JSON
//! and normalization, the curve grid, envelope evaluation against the curve
//! engine, tempo maps with multiple changes, and voice mappings against
//! explicit index tables.

use patchbay_core::{
    Connection, DropReason, EnvelopePhase, EnvelopeSpec, GraphState, MidiMessage, Node, NodeState,
    Port, PortCatalog, PortKind, PortRef, TempoChange, TempoMap, VoiceAllocator, VoiceMap,
    VoiceMapping, inv_t_from_u, shaped_t,
};

// ============================================================================
// 1. Graph documents
// ============================================================================

/// Ports keyed by node type, like a tiny registry.
struct Catalog;

impl PortCatalog for Catalog {
    fn ports(&self, node: &Node) -> Vec<Port> {
        match node.node_type.as_str() {
            "midi_source" => vec![Port::output("midi_out", PortKind::Midi)],
            "envelope" => vec![
                Port::input("midi_in", PortKind::Midi),
                Port::input("gate_in", PortKind::Gate),
                Port::output("audio_out", PortKind::Audio),
            ],
            "audio_unit" => {
                let channels = node.state.u64("channels").unwrap_or(1);
                let mut ports = vec![Port::input("in", PortKind::Audio)];
                if channels > 0 {
                    ports.push(Port::output("out", PortKind::Audio));
                }
                ports
            }
            _ => Vec::new(),
        }
    }
}

const DOCUMENT: &str = r#"{
    "nodes": [
        { "id": "keys", "type": "midi_source" },
        { "id": "env", "type": "envelope", "state": { "attackMs": 10 } },
        { "id": "vca", "type": "audio_unit", "state": { "channels": 0 } },
        { "id": "old", "type": "retired_type", "state": 42 }
    ],
    "connections": [
        { "id": "c1", "kind": "midi",
          "from": { "nodeId": "keys", "portId": "midi_out" },
          "to":   { "nodeId": "env",  "portId": "midi_in" } },
        { "id": "c2", "kind": "audio",
          "from": { "nodeId": "env", "portId": "audio_out" },
          "to":   { "nodeId": "vca", "portId": "in" } },
        { "id": "c3", "kind": "audio",
          "from": { "nodeId": "vca", "portId": "out" },
          "to":   { "nodeId": "env", "portId": "midi_in" } },
        { "id": "c4", "kind": "gate",
          "from": { "nodeId": "old", "portId": "gate_out" },
          "to":   { "nodeId": "env", "portId": "gate_in" } },
        { "id": "c5", "kind": "midi",
          "from": { "nodeId": "keys", "portId": "midi_out" },
          "to":   { "nodeId": "gone", "portId": "midi_in" } }
    ]
}"#;

#[test]
fn hand_edited_document_loads_and_normalizes() {
    let graph: GraphState = serde_json::from_str(DOCUMENT).unwrap();
    assert_eq!(graph.nodes.len(), 4);
    // Non-object state is tolerated.
    assert!(graph.nodes[3].state.as_map().is_empty());

    let (clean, dropped) = graph.normalized(&Catalog);
    let kept: Vec<&str> = clean.connections.iter().map(|c| c.id.0.as_str()).collect();
    assert_eq!(kept, vec!["c1", "c2"]);

    let reasons: Vec<(&str, DropReason)> = dropped
        .iter()
        .map(|d| (d.connection.id.0.as_str(), d.reason))
        .collect();
    assert_eq!(
        reasons,
        vec![
            // `vca` has zero channels, so its output port does not exist.
            ("c3", DropReason::MissingPort),
            ("c4", DropReason::MissingPort),
            ("c5", DropReason::MissingNode),
        ]
    );
}

#[test]
fn ports_follow_state() {
    let graph = GraphState::new()
        .with_node(Node::new("a", "audio_unit", NodeState::new().with("channels", 2)))
        .unwrap()
        .with_node(Node::new("b", "audio_unit", NodeState::new()))
        .unwrap()
        .with_connection(Connection::new(
            PortKind::Audio,
            PortRef::new("a", "out"),
            PortRef::new("b", "in"),
        ));
    let (clean, _) = graph.normalized(&Catalog);
    assert_eq!(clean.connections.len(), 1);

    let muted = graph
        .with_state(
            &"a".into(),
            NodeState::new().with("channels", 0),
        )
        .unwrap();
    let (clean, dropped) = muted.normalized(&Catalog);
    assert!(clean.connections.is_empty());
    assert_eq!(dropped.len(), 1);
}

#[test]
fn normalized_graph_round_trips_through_json() {
    let graph: GraphState = serde_json::from_str(DOCUMENT).unwrap();
    let (clean, _) = graph.normalized(&Catalog);
    let text = serde_json::to_string(&clean).unwrap();
    let back: GraphState = serde_json::from_str(&text).unwrap();
    assert_eq!(back, clean);
}

// ============================================================================
// 2. Curve engine
// ============================================================================

#[test]
fn curve_inverse_grid() {
    let shapes = [-1.0, -0.66, -0.33, 0.0, 0.33, 0.66, 1.0];
    let times = [0.0, 1.0 / 6.0, 2.0 / 6.0, 0.5, 4.0 / 6.0, 5.0 / 6.0, 1.0];
    for &shape in &shapes {
        for &t in &times {
            let back = inv_t_from_u(shaped_t(t, shape), shape);
            assert!((back - t).abs() < 1e-8, "shape={shape} t={t} back={back}");
        }
        assert_eq!(shaped_t(0.0, shape), 0.0);
        assert_eq!(shaped_t(1.0, shape), 1.0);
    }
}

// ============================================================================
// 3. Envelopes
// ============================================================================

fn scenario_envelope() -> EnvelopeSpec {
    EnvelopeSpec {
        attack_ms: 10.0,
        decay_ms: 100.0,
        sustain_level: 0.5,
        release_ms: 200.0,
        ..EnvelopeSpec::default()
    }
}

#[test]
fn envelope_reaches_peak_then_sustain() {
    let env = scenario_envelope();
    assert!((env.level_at(10.0, None) - 1.0).abs() < 1e-9);
    assert!((env.level_at(110.0, None) - 0.5).abs() < 1e-9);
    assert!((env.level_at(5_000.0, None) - 0.5).abs() < 1e-9);
    assert_eq!(env.phase_at(60.0, None).0, EnvelopePhase::Decay);
}

#[test]
fn early_release_starts_from_reached_level() {
    let env = scenario_envelope();
    // Gate closed halfway through the attack (level 0.5, linear).
    let at_gate_off = env.level_at(5.0, None);
    let just_after = env.level_at(5.0 + 1e-6, Some(5.0));
    assert!((at_gate_off - just_after).abs() < 1e-6);
    assert!(env.level_at(5.0 + 200.0, Some(5.0)).abs() < 1e-9);
}

#[test]
fn playhead_uses_inverse_curve() {
    let env = EnvelopeSpec {
        attack_shape: 0.8,
        ..scenario_envelope()
    };
    // Halfway in level under an ease-out curve is reached before halfway in time.
    let ms = env.playhead_ms(EnvelopePhase::Attack, 0.5, 0.0).unwrap();
    assert!(ms < 5.0, "playhead at {ms} ms");
    assert!((env.level_at(ms, None) - 0.5).abs() < 1e-9);
}

#[test]
fn baked_curve_has_requested_resolution() {
    let baked = scenario_envelope().bake(128);
    assert_eq!(baked.attack.len(), 128);
    assert_eq!(baked.attack[0], 0.0);
    assert!((baked.attack[127] - 1.0).abs() < 1e-6);
    assert!((baked.release[0] - 0.5).abs() < 1e-6);
}

// ============================================================================
// 4. Tempo maps
// ============================================================================

#[test]
fn tempo_changes_accumulate() {
    let map = TempoMap::new(
        &[
            TempoChange::new(0, 120.0),
            TempoChange::new(960, 60.0),
            TempoChange::new(1440, 240.0),
        ],
        480,
        1.0,
    );
    // 2 beats at 120 (1 s) + 1 beat at 60 (1 s) + 2 beats at 240 (0.5 s).
    assert!((map.tick_to_seconds(2400.0) - 2.5).abs() < 1e-12);
    assert!((map.seconds_to_tick(1.5) - 1200.0).abs() < 1e-9);
}

// ============================================================================
// 5. Voices
// ============================================================================

#[test]
fn three_hop_chain_matches_explicit_table() {
    let hops = [
        VoiceMap::Offset(2),
        VoiceMap::Table(vec![7, 6, 5, 4, 3, 2, 1, 0]),
        VoiceMap::Modulo(4),
    ];
    let composed = hops
        .iter()
        .cloned()
        .fold(VoiceMapping::identity(), |acc, hop| acc.then(hop.into()));

    // index -> +2 -> table -> mod 4, computed by hand.
    let expected = [Some(1), Some(0), Some(3), Some(2), Some(1), Some(0), None, None];
    for (index, want) in expected.iter().enumerate() {
        assert_eq!(composed.apply(index), *want, "index {index}");
    }
}

#[test]
fn allocator_serves_note_stream() {
    let mut pool = VoiceAllocator::new(2);
    let notes = [
        MidiMessage::note_on(0, 60, 100),
        MidiMessage::note_on(0, 64, 100),
        MidiMessage::note_off(0, 60),
        MidiMessage::note_on(0, 67, 100),
    ];
    let mut voices = Vec::new();
    for msg in notes {
        let note = msg.note().unwrap();
        if msg.is_note_on() {
            voices.push(pool.allocate(note, msg.channel()).voice);
        } else {
            pool.release(note, msg.channel());
        }
    }
    assert_eq!(voices, vec![0, 1, 0]);
}
