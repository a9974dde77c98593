//! Node type registry
//!
//! Maps node type strings to their [`NodeTypeMetadata`]. The controller uses
//! it to check invocations against the declared slot table and to merge the
//! declared parameter exclusions with the node's own.

use std::collections::HashMap;

use crate::contract::Invocation;
use crate::descriptor::{DescriptorFn, NodeGroup, NodeTypeMetadata};
use crate::error::{EngineError, Result};

/// Registry of node type metadata
#[derive(Debug, Default)]
pub struct NodeTypeRegistry {
    entries: HashMap<String, NodeTypeMetadata>,
}

impl NodeTypeRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry holding every descriptor submitted with
    /// `inventory::submit!(DescriptorFn(..))` in the linked binary
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        for descriptor in inventory::iter::<DescriptorFn> {
            registry.register((descriptor.0)());
        }
        log::debug!("Registered {} built-in node types", registry.len());
        registry
    }

    /// Register (or replace) a node type
    pub fn register(&mut self, metadata: NodeTypeMetadata) {
        self.entries.insert(metadata.node_type.clone(), metadata);
    }

    pub fn get_metadata(&self, node_type: &str) -> Option<&NodeTypeMetadata> {
        self.entries.get(node_type)
    }

    pub fn all_metadata(&self) -> Vec<&NodeTypeMetadata> {
        self.entries.values().collect()
    }

    /// Get metadata grouped by palette group
    pub fn metadata_by_group(&self) -> HashMap<NodeGroup, Vec<&NodeTypeMetadata>> {
        let mut grouped: HashMap<NodeGroup, Vec<&NodeTypeMetadata>> = HashMap::new();
        for metadata in self.entries.values() {
            grouped.entry(metadata.group.clone()).or_default().push(metadata);
        }
        grouped
    }

    pub fn has_node_type(&self, node_type: &str) -> bool {
        self.entries.contains_key(node_type)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Merge another registry into this one; `other` wins on conflicts
    pub fn merge(&mut self, other: NodeTypeRegistry) {
        self.entries.extend(other.entries);
    }

    /// Check one invocation against the declared slot table
    ///
    /// Returns the problem as a message; the caller fails that invocation.
    pub fn check_invocation(
        &self,
        node_type: &str,
        index: usize,
        invocation: &Invocation,
    ) -> Result<Option<String>> {
        let metadata = self
            .get_metadata(node_type)
            .ok_or_else(|| EngineError::UnknownNodeType(node_type.to_string()))?;

        let Some(slot) = metadata.slot_for(index) else {
            return Ok(Some(format!(
                "'{}' declares {} output slot(s), got invocation {}",
                node_type,
                metadata.outputs.len(),
                index + 1
            )));
        };

        if let Invocation::Describe(desired) = invocation {
            if desired.category != slot.category {
                return Ok(Some(format!(
                    "slot '{}' of '{}' holds {} elements, node described {}",
                    slot.id, node_type, slot.category, desired.category
                )));
            }
        }
        Ok(None)
    }
}
