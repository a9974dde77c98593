//! Level Node
//!
//! Produces a single elevation datum. The level's name is only written
//! when the node supplies one; otherwise whatever the host or user named
//! it stays.

use element_engine::{
    sync_parameters, ElementCategory, ElementDescription, ElementNode, HostDocument,
    IdentityRef, Invocation, NodeDescriptor, NodeError, NodeGroup, NodeTypeMetadata,
    SlotMetadata,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LevelSpec {
    pub elevation: f64,
    #[serde(default)]
    pub name: Option<String>,
}

impl LevelSpec {
    pub fn new(elevation: f64) -> Self {
        Self {
            elevation,
            name: None,
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// Level Node
///
/// # Outputs
/// - `level` (Level) - the datum
#[derive(Debug, Clone, Default)]
pub struct LevelNode;

impl LevelNode {
    pub const SLOT_LEVEL: &'static str = "level";

    pub fn new() -> Self {
        Self
    }

    pub fn describe(spec: &LevelSpec) -> ElementDescription {
        let description = ElementDescription::new(ElementCategory::Level)
            .with_parameter("elevation", json!(spec.elevation));
        match &spec.name {
            Some(name) => description.with_parameter("name", json!(name)),
            None => description,
        }
    }

    pub fn invocation(spec: Option<&LevelSpec>) -> Invocation {
        match spec {
            Some(spec) if !spec.elevation.is_finite() => {
                Invocation::failed(format!("invalid elevation {}", spec.elevation))
            }
            Some(spec) => Invocation::Describe(Self::describe(spec)),
            None => Invocation::Absent,
        }
    }
}

impl NodeDescriptor for LevelNode {
    fn descriptor() -> NodeTypeMetadata {
        NodeTypeMetadata {
            node_type: "level".to_string(),
            group: NodeGroup::Datum,
            label: "Level".to_string(),
            description: "Creates an elevation datum".to_string(),
            outputs: vec![SlotMetadata::single(
                Self::SLOT_LEVEL,
                "Level",
                ElementCategory::Level,
            )],
            excluded_parameters: Vec::new(),
        }
    }
}

inventory::submit!(element_engine::DescriptorFn(LevelNode::descriptor));

impl<D: HostDocument + ?Sized> ElementNode<D> for LevelNode {
    fn reuse(
        &mut self,
        document: &mut D,
        previous: &IdentityRef,
        desired: &ElementDescription,
    ) -> Result<bool, NodeError> {
        sync_parameters(document, &previous.element(), &desired.parameters)?;
        Ok(true)
    }

    fn create(
        &mut self,
        document: &mut D,
        desired: &ElementDescription,
    ) -> Result<IdentityRef, NodeError> {
        Ok(document.create_element(&desired.category, &desired.parameters)?)
    }
}
