//! The contract a graph node implements to own host elements
//!
//! The engine decides *whether* to reuse, replace or delete; the node decides
//! *how*. A node only ever sees the document it targets, already inside an
//! open transaction.

use serde::{Deserialize, Serialize};

use crate::error::{HostError, NodeError};
use crate::host::{ElementCategory, HostDocument, Parameters};
use crate::identity::{ElementId, IdentityRef};
use crate::prompt::{InputRequest, InputResponse};

/// The state a node wants an element to be in
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementDescription {
    pub category: ElementCategory,
    #[serde(default)]
    pub parameters: Parameters,
}

impl ElementDescription {
    pub fn new(category: ElementCategory) -> Self {
        Self {
            category,
            parameters: Parameters::new(),
        }
    }

    pub fn with_parameter(mut self, name: impl Into<String>, value: serde_json::Value) -> Self {
        self.parameters.insert(name.into(), value);
        self
    }

    pub fn parameter(&self, name: &str) -> Option<&serde_json::Value> {
        self.parameters.get(name)
    }
}

/// What the scheduler hands the engine for one output slot entry
#[derive(Debug, Clone, PartialEq)]
pub enum Invocation {
    /// The node computed a description
    Describe(ElementDescription),
    /// The node produced nothing for this slot
    Absent,
    /// The node failed before producing a description
    Failed(String),
    /// The node needs user input before it can describe anything
    AwaitInput(InputRequest),
}

impl Invocation {
    pub fn describe(description: ElementDescription) -> Self {
        Self::Describe(description)
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

/// Node-side strategy for materializing elements
///
/// `reuse` and `create` are required. Everything else has a default that
/// suits most nodes.
pub trait ElementNode<D: HostDocument + ?Sized> {
    /// Update `previous` in place so it matches `desired`
    ///
    /// Only called when the categories match. Return `Ok(false)` when the
    /// element cannot represent `desired` and must be replaced. An unchanged
    /// description must not write anything.
    fn reuse(
        &mut self,
        document: &mut D,
        previous: &IdentityRef,
        desired: &ElementDescription,
    ) -> Result<bool, NodeError>;

    /// Create a new element for `desired`
    fn create(
        &mut self,
        document: &mut D,
        desired: &ElementDescription,
    ) -> Result<IdentityRef, NodeError>;

    /// Remove an element this node owns
    fn delete(&mut self, document: &mut D, previous: &IdentityRef) -> Result<(), NodeError> {
        document.delete_elements(&[previous.element()])?;
        Ok(())
    }

    /// Parameters never carried over from a replaced element
    ///
    /// Parameters present in the desired description are never carried over
    /// either; this list is for host-managed values such as type bindings.
    fn excluded_parameters(&self) -> Vec<String> {
        Vec::new()
    }

    /// Turn an input response into the invocation it stood in for
    fn accept_input(
        &mut self,
        _request: &InputRequest,
        _response: InputResponse,
    ) -> Result<Invocation, NodeError> {
        Err(NodeError::failed("node does not accept interactive input"))
    }

    /// The pass committed; `outputs` are this node's recorded entries
    fn on_committed(&mut self, _outputs: &[Option<IdentityRef>]) {}

    /// The pass did not commit for this node's document
    fn on_rolled_back(&mut self) {}
}

/// Write only the parameters whose value differs
///
/// Returns the number of parameters written, so an unchanged description
/// costs no mutations.
pub fn sync_parameters<D: HostDocument + ?Sized>(
    document: &mut D,
    element: &ElementId,
    parameters: &Parameters,
) -> Result<usize, HostError> {
    let mut written = 0;
    for (name, value) in parameters {
        if document.parameter(element, name).as_ref() != Some(value) {
            document.set_parameter(element, name, value.clone())?;
            written += 1;
        }
    }
    Ok(written)
}
