//! Direct Shape Node
//!
//! Produces axis-aligned box shapes. A shape's geometry can be swapped on
//! the existing element, so a changed box is always updated in place and
//! keeps whatever the user attached to it.

use element_engine::{
    sync_parameters, ElementCategory, ElementDescription, ElementNode, HostDocument,
    IdentityRef, Invocation, NodeDescriptor, NodeError, NodeGroup, NodeTypeMetadata,
    SlotMetadata,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

/// Box geometry input
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoxSpec {
    /// Minimum corner
    pub origin: [f64; 3],
    pub width: f64,
    pub depth: f64,
    pub height: f64,
}

impl BoxSpec {
    pub fn new(width: f64, depth: f64, height: f64) -> Self {
        Self {
            origin: [0.0; 3],
            width,
            depth,
            height,
        }
    }

    pub fn at(mut self, origin: [f64; 3]) -> Self {
        self.origin = origin;
        self
    }

    fn validate(&self) -> Result<(), NodeError> {
        let dims = [self.width, self.depth, self.height];
        if dims.iter().any(|d| !d.is_finite() || *d <= 0.0) {
            return Err(NodeError::invalid(format!(
                "box dimensions must be positive, got {} x {} x {}",
                self.width, self.depth, self.height
            )));
        }
        if self.origin.iter().any(|c| !c.is_finite()) {
            return Err(NodeError::invalid("box origin must be finite"));
        }
        Ok(())
    }
}

/// Direct Shape Node
///
/// # Outputs
/// - `shapes` (list of DirectShape) - one element per input box
#[derive(Debug, Clone, Default)]
pub struct DirectShapeNode;

impl DirectShapeNode {
    /// Slot ID for the produced shapes
    pub const SLOT_SHAPES: &'static str = "shapes";

    pub fn new() -> Self {
        Self
    }

    /// Element description for one box
    pub fn describe(spec: &BoxSpec) -> ElementDescription {
        ElementDescription::new(ElementCategory::DirectShape)
            .with_parameter("shape", json!("box"))
            .with_parameter("origin", json!(spec.origin))
            .with_parameter("width", json!(spec.width))
            .with_parameter("depth", json!(spec.depth))
            .with_parameter("height", json!(spec.height))
    }

    /// Invocations for one evaluation
    ///
    /// `None` entries are positions that produce nothing this time; invalid
    /// boxes fail their own position only.
    pub fn invocations(specs: &[Option<BoxSpec>]) -> Vec<Invocation> {
        specs
            .iter()
            .map(|spec| match spec {
                None => Invocation::Absent,
                Some(spec) => match spec.validate() {
                    Ok(()) => Invocation::Describe(Self::describe(spec)),
                    Err(e) => Invocation::failed(e.to_string()),
                },
            })
            .collect()
    }
}

impl NodeDescriptor for DirectShapeNode {
    fn descriptor() -> NodeTypeMetadata {
        NodeTypeMetadata {
            node_type: "direct-shape".to_string(),
            group: NodeGroup::Geometry,
            label: "Direct Shape".to_string(),
            description: "Creates box-shaped direct shape elements".to_string(),
            outputs: vec![SlotMetadata::list(
                Self::SLOT_SHAPES,
                "Shapes",
                ElementCategory::DirectShape,
            )],
            excluded_parameters: Vec::new(),
        }
    }
}

inventory::submit!(element_engine::DescriptorFn(DirectShapeNode::descriptor));

impl<D: HostDocument + ?Sized> ElementNode<D> for DirectShapeNode {
    fn reuse(
        &mut self,
        document: &mut D,
        previous: &IdentityRef,
        desired: &ElementDescription,
    ) -> Result<bool, NodeError> {
        let written = sync_parameters(document, &previous.element(), &desired.parameters)?;
        if written > 0 {
            log::debug!("DirectShapeNode: updated {} parameter(s) on {}", written, previous);
        }
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
