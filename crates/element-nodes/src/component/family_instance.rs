//! Family Instance Node
//!
//! Places instances of one family type. Moving or rotating an instance
//! updates it in place; a different family type cannot be swapped onto an
//! existing instance here, so a type change rebuilds the instance and the
//! user's instance parameters are carried over to the new one.
//!
//! The host assigns `type_id` when an instance is created. It describes the
//! type, not the instance, and is never copied between instances.

use element_engine::{
    sync_parameters, ElementCategory, ElementDescription, ElementNode, HostDocument,
    IdentityRef, InputKind, InputRequest, InputResponse, Invocation, NodeDescriptor, NodeError,
    NodeGroup, NodeTypeMetadata, SlotMetadata,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

/// Family and type name pair identifying a placeable type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FamilySymbol {
    pub family: String,
    pub type_name: String,
}

impl FamilySymbol {
    pub fn new(family: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            family: family.into(),
            type_name: type_name.into(),
        }
    }

    fn type_id(&self) -> String {
        format!("{}:{}", self.family, self.type_name)
    }
}

/// Where one instance goes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Placement {
    pub location: [f64; 3],
    /// Rotation about the vertical axis, radians
    #[serde(default)]
    pub rotation: f64,
}

impl Placement {
    pub fn at(location: [f64; 3]) -> Self {
        Self {
            location,
            rotation: 0.0,
        }
    }
}

/// Family Instance Node
///
/// # Outputs
/// - `instances` (list of FamilyInstance)
#[derive(Debug, Clone, Default)]
pub struct FamilyInstanceNode {
    symbol: Option<FamilySymbol>,
}

impl FamilyInstanceNode {
    pub const SLOT_INSTANCES: &'static str = "instances";

    /// Host parameters owned by the type rather than the instance
    pub const TYPE_PARAMETERS: &'static [&'static str] = &["type_id"];

    /// A node without a type; it can reconcile instances but not describe them
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_symbol(symbol: FamilySymbol) -> Self {
        Self {
            symbol: Some(symbol),
        }
    }

    pub fn symbol(&self) -> Option<&FamilySymbol> {
        self.symbol.as_ref()
    }

    pub fn describe(&self, placement: &Placement) -> Result<ElementDescription, NodeError> {
        let symbol = self
            .symbol
            .as_ref()
            .ok_or_else(|| NodeError::invalid("no family type selected"))?;
        Ok(ElementDescription::new(ElementCategory::FamilyInstance)
            .with_parameter("family", json!(symbol.family))
            .with_parameter("type_name", json!(symbol.type_name))
            .with_parameter("location", json!(placement.location))
            .with_parameter("rotation", json!(placement.rotation)))
    }

    pub fn invocations(&self, placements: &[Option<Placement>]) -> Vec<Invocation> {
        placements
            .iter()
            .map(|placement| match placement {
                None => Invocation::Absent,
                Some(placement) => match self.describe(placement) {
                    Ok(description) => Invocation::Describe(description),
                    Err(e) => Invocation::failed(e.to_string()),
                },
            })
            .collect()
    }

    /// Invocation that asks the user for the insertion point
    pub fn pick_location(prompt: impl Into<String>) -> Invocation {
        Invocation::AwaitInput(InputRequest::pick_point(prompt))
    }

    fn symbol_of(description: &ElementDescription) -> Result<FamilySymbol, NodeError> {
        let text = |name: &str| {
            description
                .parameter(name)
                .and_then(|v| v.as_str())
                .map(str::to_string)
                .ok_or_else(|| NodeError::invalid(format!("family instance is missing '{}'", name)))
        };
        Ok(FamilySymbol::new(text("family")?, text("type_name")?))
    }
}

impl NodeDescriptor for FamilyInstanceNode {
    fn descriptor() -> NodeTypeMetadata {
        NodeTypeMetadata {
            node_type: "family-instance".to_string(),
            group: NodeGroup::Component,
            label: "Family Instance".to_string(),
            description: "Places instances of a family type".to_string(),
            outputs: vec![SlotMetadata::list(
                Self::SLOT_INSTANCES,
                "Instances",
                ElementCategory::FamilyInstance,
            )],
            excluded_parameters: Self::TYPE_PARAMETERS.iter().map(|p| p.to_string()).collect(),
        }
    }
}

inventory::submit!(element_engine::DescriptorFn(FamilyInstanceNode::descriptor));

impl<D: HostDocument + ?Sized> ElementNode<D> for FamilyInstanceNode {
    fn reuse(
        &mut self,
        document: &mut D,
        previous: &IdentityRef,
        desired: &ElementDescription,
    ) -> Result<bool, NodeError> {
        let symbol = Self::symbol_of(desired)?;
        let current = document.parameter(&previous.element(), "type_id");
        if current != Some(json!(symbol.type_id())) {
            log::debug!(
                "FamilyInstanceNode: {} is not of type {}, rebuilding",
                previous,
                symbol.type_id()
            );
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
        let symbol = Self::symbol_of(desired)?;
        let mut parameters = desired.parameters.clone();
        parameters.insert("type_id".to_string(), json!(symbol.type_id()));
        Ok(document.create_element(&desired.category, &parameters)?)
    }

    fn excluded_parameters(&self) -> Vec<String> {
        Self::TYPE_PARAMETERS.iter().map(|p| p.to_string()).collect()
    }

    fn accept_input(
        &mut self,
        request: &InputRequest,
        response: InputResponse,
    ) -> Result<Invocation, NodeError> {
        match (request.kind, response) {
            (InputKind::PickPoint, InputResponse::Point(location)) => {
                Ok(Invocation::Describe(self.describe(&Placement::at(location))?))
            }
            (_, InputResponse::Cancelled) => Err(NodeError::Cancelled),
            (kind, other) => Err(NodeError::invalid(format!(
                "expected a response to {:?}, got {:?}",
                kind, other
            ))),
        }
    }
}
