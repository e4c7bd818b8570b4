//! Graph documents on disk.
//!
//! A graph document is the JSON form of a [`GraphState`]. Loading always
//! normalizes against a [`PortCatalog`]: connections whose endpoints are
//! missing, misdirected, of the wrong kind, or duplicated are dropped and
//! reported instead of failing the load.
//!
//! ```json
//! {
//!   "nodes": [
//!     { "id": "osc", "type": "audio_unit", "state": { "channels": 2 } },
//!     { "id": "out", "type": "audio_unit", "state": { "channels": 2 } }
//!   ],
//!   "connections": [
//!     { "id": "c1", "kind": "audio",
//!       "from": { "nodeId": "osc", "portId": "out" },
//!       "to":   { "nodeId": "out", "portId": "in" } }
//!   ]
//! }
//! ```

use std::path::Path;

use patchbay_core::{DroppedConnection, GraphState, PortCatalog};

use crate::error::ConfigError;

/// A normalized graph plus what normalization removed.
#[derive(Debug, Clone)]
pub struct LoadReport {
    /// The usable graph.
    pub graph: GraphState,
    /// Connections removed on load.
    pub dropped: Vec<DroppedConnection>,
}

impl LoadReport {
    /// True if the document loaded without dropping anything.
    pub fn is_clean(&self) -> bool {
        self.dropped.is_empty()
    }
}

/// Parses and normalizes a graph document.
///
/// Duplicate node ids are an error; bad connections are not.
pub fn parse_graph(json: &str, catalog: &dyn PortCatalog) -> Result<LoadReport, ConfigError> {
    let raw: GraphState = serde_json::from_str(json)?;

    let mut checked = GraphState::new();
    for node in raw.nodes {
        checked = checked.with_node(node)?;
    }
    checked.connections = raw.connections;

    let (graph, dropped) = checked.normalized(catalog);
    for drop in &dropped {
        tracing::warn!(
            connection = %drop.connection.key(),
            reason = %drop.reason,
            "dropped connection on load"
        );
    }
    Ok(LoadReport { graph, dropped })
}

/// Reads and normalizes a graph document.
pub fn load_graph(
    path: impl AsRef<Path>,
    catalog: &dyn PortCatalog,
) -> Result<LoadReport, ConfigError> {
    let path = path.as_ref();
    let json = std::fs::read_to_string(path).map_err(|e| ConfigError::read_file(path, e))?;
    let report = parse_graph(&json, catalog)?;
    tracing::debug!(
        path = %path.display(),
        nodes = report.graph.nodes.len(),
        connections = report.graph.connections.len(),
        dropped = report.dropped.len(),
        "loaded graph"
    );
    Ok(report)
}

/// Writes `graph` as pretty JSON, creating parent directories as needed.
pub fn save_graph(graph: &GraphState, path: impl AsRef<Path>) -> Result<(), ConfigError> {
    let path = path.as_ref();
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
        && !parent.exists()
    {
        std::fs::create_dir_all(parent).map_err(|e| ConfigError::create_dir(parent, e))?;
    }
    let json = serde_json::to_string_pretty(graph)?;
    std::fs::write(path, json).map_err(|e| ConfigError::write_file(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use patchbay_core::{DropReason, GraphError};
    use patchbay_engine::NodeRegistry;

    const DOC: &str = r#"{
        "nodes": [
            { "id": "poly", "type": "poly_voice", "state": { "voices": 4 } },
            { "id": "env", "type": "envelope" }
        ],
        "connections": [
            { "id": "v", "kind": "gate",
              "from": { "nodeId": "poly", "portId": "gate_out" },
              "to": { "nodeId": "env", "portId": "gate_in" } },
            { "id": "ghost", "kind": "audio",
              "from": { "nodeId": "nowhere", "portId": "out" },
              "to": { "nodeId": "env", "portId": "gate_in" } },
            { "id": "bad-kind", "kind": "midi",
              "from": { "nodeId": "poly", "portId": "gate_out" },
              "to": { "nodeId": "env", "portId": "gate_in" } }
        ]
    }"#;

    #[test]
    fn load_drops_invalid_connections() {
        let report = parse_graph(DOC, &NodeRegistry::new()).unwrap();
        assert_eq!(report.graph.nodes.len(), 2);
        assert_eq!(report.graph.connections.len(), 1);
        assert_eq!(report.graph.connections[0].id.to_string(), "v");

        let reasons: Vec<_> = report.dropped.iter().map(|d| d.reason).collect();
        assert_eq!(reasons, [DropReason::MissingNode, DropReason::KindMismatch]);
        assert!(!report.is_clean());
    }

    #[test]
    fn duplicate_node_ids_fail() {
        let doc = r#"{ "nodes": [
            { "id": "a", "type": "envelope" },
            { "id": "a", "type": "envelope" }
        ] }"#;
        let err = parse_graph(doc, &NodeRegistry::new()).unwrap_err();
        assert!(matches!(err, ConfigError::Graph(GraphError::DuplicateNode(_))));
    }

    #[test]
    fn malformed_json_fails() {
        let err = parse_graph("{ \"nodes\": 3 }", &NodeRegistry::new()).unwrap_err();
        assert!(matches!(err, ConfigError::Json(_)));
    }
}
