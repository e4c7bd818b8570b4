//! Node-type registry and instance factory.
//!
//! The registry maps a node's type tag to a descriptor (display metadata and
//! a port function of the node's state) and a constructor for its runtime
//! instance. Node-type behavior lives entirely in the instances; the engine
//! only sees the registry through [`PortCatalog`] and [`InstanceFactory`].
//!
//! # Example
//!
//! ```rust
//! use patchbay_core::{Node, NodeState, PortCatalog};
//! use patchbay_engine::{NodeCategory, NodeRegistry};
//!
//! let registry = NodeRegistry::new();
//! assert!(registry.get("envelope").is_some());
//!
//! let plain = Node::new("amp", "audio_unit", NodeState::new());
//! let ducked = Node::new("amp", "audio_unit", NodeState::new().with("sidechain", true));
//! assert_eq!(registry.ports(&plain).len(), 3);
//! assert_eq!(registry.ports(&ducked).len(), 4);
//!
//! for descriptor in registry.types_in_category(NodeCategory::Voice) {
//!     println!("{}: {}", descriptor.name, descriptor.description);
//! }
//! ```

use patchbay_core::{
    DEFAULT_CURVE_RESOLUTION, DEFAULT_POOL_SIZE, Node, NodeState, Port, PortCatalog,
};

use crate::error::EngineError;
use crate::instance::{DeviceGraph, InstanceFactory, RuntimeInstance};
use crate::nodes::{arpeggiator, audio_unit, cc_map, envelope, midi_source, poly_voice, voice_remap};

/// Category of node type for organization and filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeCategory {
    /// Event sources (keyboards, sequencers).
    Source,
    /// Voice pools and voice routing.
    Voice,
    /// Event transformers and controllers.
    Event,
    /// Modulation generators.
    Modulation,
    /// Continuous signal processors.
    Signal,
}

impl NodeCategory {
    /// Returns a human-readable name for the category.
    pub const fn name(&self) -> &'static str {
        match self {
            NodeCategory::Source => "Source",
            NodeCategory::Voice => "Voice",
            NodeCategory::Event => "Event",
            NodeCategory::Modulation => "Modulation",
            NodeCategory::Signal => "Signal",
        }
    }
}

/// Settings every constructor may read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeDefaults {
    /// Voice pool size when a node's state does not set one.
    pub pool_size: usize,
    /// Points per baked envelope segment.
    pub curve_resolution: usize,
}

impl Default for NodeDefaults {
    fn default() -> Self {
        Self {
            pool_size: DEFAULT_POOL_SIZE,
            curve_resolution: DEFAULT_CURVE_RESOLUTION,
        }
    }
}

/// Port list of a node type as a function of node state.
pub type PortsFn = fn(&NodeState) -> Vec<Port>;

/// Constructor for a node type's runtime instance.
pub type InstanceConstructor =
    fn(&mut dyn DeviceGraph, &Node, &NodeDefaults) -> Result<Box<dyn RuntimeInstance>, EngineError>;

/// Describes a node type in the registry.
#[derive(Debug, Clone)]
pub struct NodeDescriptor {
    /// Type tag stored in graph documents.
    pub type_id: &'static str,
    /// Human-readable name.
    pub name: &'static str,
    /// Brief description of the node type.
    pub description: &'static str,
    /// Category for organization.
    pub category: NodeCategory,
    /// Port list for a given state.
    pub ports: PortsFn,
}

struct RegistryEntry {
    descriptor: NodeDescriptor,
    constructor: InstanceConstructor,
}

/// Registry of node types.
pub struct NodeRegistry {
    entries: Vec<RegistryEntry>,
    defaults: NodeDefaults,
}

impl Default for NodeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl NodeRegistry {
    /// Create a registry with every built-in node type.
    pub fn new() -> Self {
        let mut registry = Self::empty();
        registry.register_builtin_nodes();
        registry
    }

    /// Create a registry with no node types.
    pub fn empty() -> Self {
        Self {
            entries: Vec::new(),
            defaults: NodeDefaults::default(),
        }
    }

    /// Replaces the constructor defaults.
    pub fn with_defaults(mut self, defaults: NodeDefaults) -> Self {
        self.defaults = defaults;
        self
    }

    /// Constructor defaults.
    pub fn defaults(&self) -> &NodeDefaults {
        &self.defaults
    }

    fn register_builtin_nodes(&mut self) {
        self.register(midi_source::descriptor(), midi_source::create);
        self.register(poly_voice::descriptor(), poly_voice::create);
        self.register(voice_remap::descriptor(), voice_remap::create);
        self.register(envelope::descriptor(), envelope::create);
        self.register(cc_map::descriptor(), cc_map::create);
        self.register(arpeggiator::descriptor(), arpeggiator::create);
        self.register(audio_unit::descriptor(), audio_unit::create);
    }

    /// Registers a node type. A later registration under the same tag
    /// replaces the earlier one.
    pub fn register(&mut self, descriptor: NodeDescriptor, constructor: InstanceConstructor) {
        self.entries
            .retain(|e| e.descriptor.type_id != descriptor.type_id);
        self.entries.push(RegistryEntry {
            descriptor,
            constructor,
        });
    }

    /// Returns descriptors for all registered node types.
    pub fn all_types(&self) -> Vec<&NodeDescriptor> {
        self.entries.iter().map(|e| &e.descriptor).collect()
    }

    /// Returns descriptors for node types in a category.
    pub fn types_in_category(&self, category: NodeCategory) -> Vec<&NodeDescriptor> {
        self.entries
            .iter()
            .filter(|e| e.descriptor.category == category)
            .map(|e| &e.descriptor)
            .collect()
    }

    /// Get a descriptor by type tag.
    pub fn get(&self, type_id: &str) -> Option<&NodeDescriptor> {
        self.entry(type_id).map(|e| &e.descriptor)
    }

    /// Returns the number of registered node types.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if no node types are registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn entry(&self, type_id: &str) -> Option<&RegistryEntry> {
        self.entries.iter().find(|e| e.descriptor.type_id == type_id)
    }
}

impl PortCatalog for NodeRegistry {
    /// Unknown node types have no ports, so every connection touching them
    /// is dropped on normalize.
    fn ports(&self, node: &Node) -> Vec<Port> {
        self.entry(&node.node_type)
            .map(|e| (e.descriptor.ports)(&node.state))
            .unwrap_or_default()
    }
}

impl InstanceFactory for NodeRegistry {
    fn create(
        &self,
        device: &mut dyn DeviceGraph,
        node: &Node,
    ) -> Result<Box<dyn RuntimeInstance>, EngineError> {
        let entry = self
            .entry(&node.node_type)
            .ok_or_else(|| EngineError::UnknownNodeType {
                node: node.id.clone(),
                type_id: node.node_type.clone(),
            })?;
        (entry.constructor)(device, node, &self.defaults)
    }
}
