//! Node type descriptor trait and metadata types
//!
//! Every node type declares its output slots statically: which element
//! category each slot produces, whether it holds a list, and which host
//! parameters are never carried over when an element is replaced. The
//! engine reads this table instead of inspecting node implementations.

use serde::{Deserialize, Serialize};

use crate::host::ElementCategory;

/// Trait for node types that can describe their metadata
///
/// ```ignore
/// impl NodeDescriptor for LevelNode {
///     fn descriptor() -> NodeTypeMetadata {
///         NodeTypeMetadata {
///             node_type: "level".to_string(),
///             group: NodeGroup::Datum,
///             label: "Level".to_string(),
///             description: "Creates an elevation datum".to_string(),
///             outputs: vec![SlotMetadata::single("level", "Level", ElementCategory::Level)],
///             excluded_parameters: Vec::new(),
///         }
///     }
/// }
///
/// inventory::submit!(element_engine::DescriptorFn(LevelNode::descriptor));
/// ```
pub trait NodeDescriptor {
    /// Get the static metadata for this node type
    fn descriptor() -> NodeTypeMetadata
    where
        Self: Sized;
}

/// Palette grouping of a node type
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeGroup {
    Geometry,
    Datum,
    Component,
    Annotation,
    Other(String),
}

/// Complete metadata for a node type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeTypeMetadata {
    /// Unique type identifier (e.g., "direct-shape")
    pub node_type: String,
    pub group: NodeGroup,
    pub label: String,
    pub description: String,
    /// Output slot definitions, in invocation order
    pub outputs: Vec<SlotMetadata>,
    /// Host parameters never copied onto a replacement element
    #[serde(default)]
    pub excluded_parameters: Vec<String>,
}

impl NodeTypeMetadata {
    /// Slot that invocation `index` lands in
    ///
    /// A trailing list slot absorbs every invocation past its position.
    pub fn slot_for(&self, index: usize) -> Option<&SlotMetadata> {
        match self.outputs.get(index) {
            Some(slot) => Some(slot),
            None => self.outputs.last().filter(|slot| slot.multiple),
        }
    }
}

/// Metadata for one output slot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotMetadata {
    pub id: String,
    pub label: String,
    /// Category every element in this slot must have
    pub category: ElementCategory,
    /// Whether the slot holds a list of elements
    pub multiple: bool,
}

impl SlotMetadata {
    pub fn new(
        id: impl Into<String>,
        label: impl Into<String>,
        category: ElementCategory,
        multiple: bool,
    ) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            category,
            multiple,
        }
    }

    /// A slot holding one element
    pub fn single(
        id: impl Into<String>,
        label: impl Into<String>,
        category: ElementCategory,
    ) -> Self {
        Self::new(id, label, category, false)
    }

    /// A slot holding a list of elements
    pub fn list(
        id: impl Into<String>,
        label: impl Into<String>,
        category: ElementCategory,
    ) -> Self {
        Self::new(id, label, category, true)
    }
}

/// Link-time registration of a node type's metadata
///
/// ```ignore
/// inventory::submit!(element_engine::DescriptorFn(DirectShapeNode::descriptor));
/// ```
pub struct DescriptorFn(pub fn() -> NodeTypeMetadata);

inventory::collect!(DescriptorFn);
