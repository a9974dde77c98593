//! Category dispatch
//!
//! Routes each invocation to the node that knows how to build its element
//! category, for graphs where one output mixes element kinds.

use element_engine::{
    ElementCategory, ElementDescription, ElementNode, HostDocument, IdentityRef, NodeError,
};

use crate::component::FamilyInstanceNode;
use crate::datum::{GridNode, LevelNode};
use crate::geometry::DirectShapeNode;

/// Node that picks its implementation from the described category
#[derive(Debug, Clone, Default)]
pub struct CategoryDispatchNode {
    shape: DirectShapeNode,
    level: LevelNode,
    grid: GridNode,
    instance: FamilyInstanceNode,
}

impl CategoryDispatchNode {
    pub fn new() -> Self {
        Self::default()
    }

    /// Categories this node can build
    pub fn supports(category: &ElementCategory) -> bool {
        matches!(
            category,
            ElementCategory::DirectShape
                | ElementCategory::Level
                | ElementCategory::Grid
                | ElementCategory::FamilyInstance
        )
    }

    fn route<D: HostDocument + ?Sized>(
        &mut self,
        category: &ElementCategory,
    ) -> Result<&mut dyn ElementNode<D>, NodeError> {
        match category {
            ElementCategory::DirectShape => Ok(&mut self.shape),
            ElementCategory::Level => Ok(&mut self.level),
            ElementCategory::Grid => Ok(&mut self.grid),
            ElementCategory::FamilyInstance => Ok(&mut self.instance),
            other => Err(NodeError::invalid(format!("no builder for {} elements", other))),
        }
    }
}

impl<D: HostDocument + ?Sized> ElementNode<D> for CategoryDispatchNode {
    fn reuse(
        &mut self,
        document: &mut D,
        previous: &IdentityRef,
        desired: &ElementDescription,
    ) -> Result<bool, NodeError> {
        self.route::<D>(&desired.category)?
            .reuse(document, previous, desired)
    }

    fn create(
        &mut self,
        document: &mut D,
        desired: &ElementDescription,
    ) -> Result<IdentityRef, NodeError> {
        self.route::<D>(&desired.category)?.create(document, desired)
    }

    fn excluded_parameters(&self) -> Vec<String> {
        FamilyInstanceNode::TYPE_PARAMETERS
            .iter()
            .map(|p| p.to_string())
            .collect()
    }
}
