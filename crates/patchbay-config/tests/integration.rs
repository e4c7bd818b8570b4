//! Integration tests for patchbay-config.
//!
//! These tests write documents to disk, read them back, and run them
//! through the engine.

use patchbay_config::{EngineConfig, TimelineDocument, load_graph, save_graph};
use patchbay_core::{
    Connection, GraphState, MidiMessage, Node, NodeState, PortKind, PortRef, TempoChange,
    TimelineEvent,
};
use patchbay_engine::{NodeRegistry, OfflineDeviceGraph, PatchRuntime};
use tempfile::TempDir;

fn stereo_chain() -> GraphState {
    let stereo = || NodeState::new().with("channels", 2);
    GraphState::new()
        .with_node(Node::new("osc", "audio_unit", stereo()))
        .unwrap()
        .with_node(Node::new("out", "audio_unit", stereo()))
        .unwrap()
        .with_connection(Connection::new(
            PortKind::Audio,
            PortRef::new("osc", "out"),
            PortRef::new("out", "in"),
        ))
}

#[test]
fn graph_saved_and_loaded_drives_runtime() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("nested").join("chain.json");

    let graph = stereo_chain();
    save_graph(&graph, &path).unwrap();

    let registry = NodeRegistry::new();
    let report = load_graph(&path, &registry).unwrap();
    assert!(report.is_clean());
    assert_eq!(report.graph, graph);

    let mut runtime = PatchRuntime::with_registry(registry, OfflineDeviceGraph::new());
    let applied = runtime.apply(&report.graph);
    assert!(applied.failures.is_empty());
    assert_eq!(runtime.device().connect_count(), 2);
}

#[test]
fn mono_source_fans_out_after_reload() {
    // Port ids do not depend on channel count, so the connection survives
    // normalization and the single output feeds both inputs.
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("mono.json");
    let graph = stereo_chain()
        .with_state(&"osc".into(), NodeState::new().with("channels", 1))
        .unwrap();
    save_graph(&graph, &path).unwrap();

    let report = load_graph(&path, &NodeRegistry::new()).unwrap();
    assert!(report.is_clean());
    let mut runtime = PatchRuntime::new(OfflineDeviceGraph::new());
    runtime.apply(&report.graph);
    assert_eq!(runtime.device().connect_count(), 2);
}

#[test]
fn timeline_round_trip() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("song.json");

    let doc = TimelineDocument {
        ticks_per_beat: 96,
        duration_ticks: Some(384),
        tempo: vec![TempoChange::new(0, 100.0), TempoChange::new(192, 150.0)],
        events: vec![
            TimelineEvent::new(0, MidiMessage::note_on(0, 48, 100)),
            TimelineEvent::new(96, MidiMessage::note_off(0, 48)),
        ],
    };
    doc.save(&path).unwrap();

    let loaded = TimelineDocument::load(&path).unwrap();
    assert_eq!(loaded, doc);
    let map = loaded.tempo_map(120.0, 2.0);
    assert_eq!(map.ticks_per_beat(), 96);
    // One beat at 100 bpm, doubled.
    assert!((map.tick_to_seconds(96.0) - 0.3).abs() < 1e-9);
}

#[test]
fn config_save_creates_parent_and_loads_back() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("patchbay").join("config.toml");

    let mut config = EngineConfig::default();
    config.scheduler.lookahead_ms = 50;
    config.envelope.curve_resolution = 32;
    config.save(&path).unwrap();

    let loaded = EngineConfig::load(&path).unwrap();
    assert_eq!(loaded, config);
    assert_eq!(loaded.node_defaults().curve_resolution, 32);
    assert_eq!(
        loaded.scheduler_settings().lookahead,
        std::time::Duration::from_millis(50)
    );
}
