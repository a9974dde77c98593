//! Grid Node
//!
//! Produces grid lines. A grid's curve can be moved but not changed from a
//! line to an arc (or back), so a change of curve kind replaces the grid.

use element_engine::{
    sync_parameters, ElementCategory, ElementDescription, ElementNode, HostDocument,
    IdentityRef, Invocation, NodeDescriptor, NodeError, NodeGroup, NodeTypeMetadata,
    SlotMetadata,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

/// Grid curve geometry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GridCurve {
    Line {
        start: [f64; 2],
        end: [f64; 2],
    },
    Arc {
        center: [f64; 2],
        radius: f64,
        /// Radians
        start_angle: f64,
        end_angle: f64,
    },
}

impl GridCurve {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Line { .. } => "line",
            Self::Arc { .. } => "arc",
        }
    }

    fn validate(&self) -> Result<(), NodeError> {
        match self {
            Self::Line { start, end } if start == end => {
                Err(NodeError::invalid("grid line has zero length"))
            }
            Self::Arc { radius, .. } if *radius <= 0.0 => {
                Err(NodeError::invalid(format!("grid arc radius must be positive, got {}", radius)))
            }
            Self::Arc {
                start_angle,
                end_angle,
                ..
            } if start_angle == end_angle => Err(NodeError::invalid("grid arc has zero sweep")),
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridSpec {
    pub curve: GridCurve,
    #[serde(default)]
    pub name: Option<String>,
}

/// Grid Node
///
/// # Outputs
/// - `grids` (list of Grid)
#[derive(Debug, Clone, Default)]
pub struct GridNode;

impl GridNode {
    pub const SLOT_GRIDS: &'static str = "grids";

    pub fn new() -> Self {
        Self
    }

    pub fn describe(spec: &GridSpec) -> ElementDescription {
        let description = ElementDescription::new(ElementCategory::Grid)
            .with_parameter("curve_kind", json!(spec.curve.kind()))
            .with_parameter("curve", json!(spec.curve));
        match &spec.name {
            Some(name) => description.with_parameter("name", json!(name)),
            None => description,
        }
    }

    pub fn invocations(specs: &[Option<GridSpec>]) -> Vec<Invocation> {
        specs
            .iter()
            .map(|spec| match spec {
                None => Invocation::Absent,
                Some(spec) => match spec.curve.validate() {
                    Ok(()) => Invocation::Describe(Self::describe(spec)),
                    Err(e) => Invocation::failed(e.to_string()),
                },
            })
            .collect()
    }
}

impl NodeDescriptor for GridNode {
    fn descriptor() -> NodeTypeMetadata {
        NodeTypeMetadata {
            node_type: "grid".to_string(),
            group: NodeGroup::Datum,
            label: "Grid".to_string(),
            description: "Creates grid lines from lines or arcs".to_string(),
            outputs: vec![SlotMetadata::list(Self::SLOT_GRIDS, "Grids", ElementCategory::Grid)],
            excluded_parameters: Vec::new(),
        }
    }
}

inventory::submit!(element_engine::DescriptorFn(GridNode::descriptor));

impl<D: HostDocument + ?Sized> ElementNode<D> for GridNode {
    fn reuse(
        &mut self,
        document: &mut D,
        previous: &IdentityRef,
        desired: &ElementDescription,
    ) -> Result<bool, NodeError> {
        let current = document.parameter(&previous.element(), "curve_kind");
        if current.as_ref() != desired.parameter("curve_kind") {
            log::debug!("GridNode: curve kind changed on {}, rebuilding", previous);
            return Ok(false);
        }
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
