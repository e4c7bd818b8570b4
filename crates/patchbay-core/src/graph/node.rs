//! Graph node types.
//!
//! A [`Node`] pairs a stable [`NodeId`] with a type tag and an opaque,
//! JSON-shaped [`NodeState`]. The engine never interprets state itself: node
//! types read it through the registry, and the router and synchronizer only
//! replace it wholesale or merge [`StatePatch`]es into it.

use std::collections::BTreeMap;
use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::GraphError;

/// Unique identifier for a node in a graph document.
///
/// Identifiers are stable across edits and serialize as plain strings.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub String);

impl NodeId {
    /// Creates a node identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(id: &str) -> Self {
        Self(id.to_owned())
    }
}

/// Opaque per-node state record.
///
/// Always a JSON object; anything else deserializes to an empty record so
/// hand-edited documents never fail to load.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct NodeState(Map<String, Value>);

impl<'de> Deserialize<'de> for NodeState {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(Self::from_value(Value::deserialize(deserializer)?))
    }
}

impl NodeState {
    /// Creates an empty state record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wraps a JSON value. Non-object values become an empty record.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(map) => Self(map),
            _ => Self::default(),
        }
    }

    /// Serializes a typed state struct into a record.
    pub fn from_typed<T: Serialize>(typed: &T) -> Result<Self, serde_json::Error> {
        serde_json::to_value(typed).map(Self::from_value)
    }

    /// Decodes the record into a typed state struct.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(Value::Object(self.0.clone()))
    }

    /// Decodes the record, tagging failures with the owning node.
    pub fn decode_for<T: DeserializeOwned>(&self, node: &NodeId) -> Result<T, GraphError> {
        self.decode().map_err(|source| GraphError::InvalidState {
            node: node.clone(),
            source,
        })
    }

    /// Returns a field.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Returns a numeric field.
    pub fn f64(&self, key: &str) -> Option<f64> {
        self.0.get(key).and_then(Value::as_f64)
    }

    /// Returns a non-negative integer field.
    pub fn u64(&self, key: &str) -> Option<u64> {
        self.0.get(key).and_then(Value::as_u64)
    }

    /// Returns a string field.
    pub fn str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    /// Returns a boolean field.
    pub fn bool(&self, key: &str) -> Option<bool> {
        self.0.get(key).and_then(Value::as_bool)
    }

    /// Sets a field, returning the updated record.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    /// Sets a field in place.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    /// Returns a copy with `patch` merged over this record.
    ///
    /// Merging is shallow: a patched field replaces the stored one entirely.
    pub fn patched(&self, patch: &StatePatch) -> Self {
        let mut next = self.clone();
        for (key, value) in &patch.0 {
            next.0.insert(key.clone(), value.clone());
        }
        next
    }

    /// Returns the underlying JSON object.
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }
}

/// A set of field overrides for one node's state.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StatePatch(Map<String, Value>);

impl StatePatch {
    /// Creates an empty patch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a field override, returning the updated patch.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    /// Adds a field override in place.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    /// Merges `other` into this patch; later fields win.
    pub fn merge(&mut self, other: StatePatch) {
        self.0.extend(other.0);
    }

    /// Returns a patched field.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Returns `true` if the patch changes nothing.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of patched fields.
    pub fn len(&self) -> usize {
        self.0.len()
    }
}

/// Patches aggregated per node, applied together after a traversal.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PatchSet(BTreeMap<NodeId, StatePatch>);

impl PatchSet {
    /// Creates an empty patch set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Merges `patch` into the entry for `node`.
    pub fn add(&mut self, node: NodeId, patch: StatePatch) {
        if patch.is_empty() {
            return;
        }
        self.0.entry(node).or_default().merge(patch);
    }

    /// Returns the aggregated patch for `node`.
    pub fn get(&self, node: &NodeId) -> Option<&StatePatch> {
        self.0.get(node)
    }

    /// Iterates `(node, patch)` pairs in node-id order.
    pub fn iter(&self) -> impl Iterator<Item = (&NodeId, &StatePatch)> {
        self.0.iter()
    }

    /// Returns `true` if no node is patched.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of patched nodes.
    pub fn len(&self) -> usize {
        self.0.len()
    }
}

/// A node in a graph document.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Stable identifier.
    pub id: NodeId,
    /// Type tag naming the node's behavior in the registry.
    #[serde(rename = "type")]
    pub node_type: String,
    /// Type-specific state.
    #[serde(default)]
    pub state: NodeState,
}

impl Node {
    /// Creates a node.
    pub fn new(id: impl Into<NodeId>, node_type: impl Into<String>, state: NodeState) -> Self {
        Self {
            id: id.into(),
            node_type: node_type.into(),
            state,
        }
    }
}

impl From<String> for NodeId {
    fn from(id: String) -> Self {
        Self(id)
    }
}
