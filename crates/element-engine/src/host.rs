//! The host document seam
//!
//! The engine never talks to a modeling application directly. Everything it
//! needs from the host is expressed by [`HostDocument`], and everything the
//! host hands back while finalizing a transaction is expressed by
//! [`FailureAccessor`]. Implementations must be driven from the host's main
//! thread; none of these traits are `Send`.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::HostError;
use crate::identity::{DocumentId, ElementHandle, ElementId, IdentityRef};

/// Named parameter values of an element
pub type Parameters = BTreeMap<String, serde_json::Value>;

/// Category tag of an element or of a node's desired description
///
/// The engine dispatches on this tag instead of probing the element's concrete
/// type: an existing element is only offered for reuse to a description with
/// the same tag.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementCategory {
    /// Free-form geometry container
    DirectShape,
    /// Elevation datum
    Level,
    /// Planar grid line
    Grid,
    Wall,
    Floor,
    Roof,
    Beam,
    Column,
    /// Placed instance of a loadable component type
    FamilyInstance,
    CurtainSystem,
    /// Annotation tag
    Tag,
    /// Element group (used by materialization)
    Group,
    /// Anything the fixed tags do not cover
    Other(String),
}

impl fmt::Display for ElementCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Other(name) => write!(f, "{}", name),
            other => write!(f, "{:?}", other),
        }
    }
}

/// Status of a host transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Uninitialized,
    Started,
    Committed,
    RolledBack,
    Error,
}

impl TransactionStatus {
    /// Whether this status means the transaction did not go through
    ///
    /// Anything other than a not-yet-run, running or committed transaction
    /// counts as aborted.
    pub fn is_aborted(&self) -> bool {
        !matches!(self, Self::Uninitialized | Self::Started | Self::Committed)
    }
}

/// Severity of a failure raised by the host while validating a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureSeverity {
    Remark,
    Warning,
    Error,
    DocumentCorruption,
}

/// Per-instance identifier of a failure within one commit attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FailureId(pub u64);

/// The host's failure definition (e.g. "overlapping-walls")
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FailureKind(pub String);

impl FailureKind {
    pub fn new(kind: impl Into<String>) -> Self {
        Self(kind.into())
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One failure reported by the host during commit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureRecord {
    pub id: FailureId,
    pub kind: FailureKind,
    pub severity: FailureSeverity,
    pub description: String,
    pub affected: Vec<ElementId>,
    /// Whether the host offers a default resolution
    pub has_resolution: bool,
    /// Whether a resolution was already attempted for this instance
    pub resolution_attempted: bool,
}

/// Decision returned to the host from failure processing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureProcessingResult {
    /// No unresolved issues; finalize as is
    Continue,
    /// Something was resolved; re-validate and call back
    ProceedWithCommit,
    /// Unrecoverable; roll the transaction back
    ProceedWithRollback,
}

/// A modal dialog the host is about to show
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostDialog {
    pub dialog_id: String,
    pub message: String,
}

/// How a pre-empted dialog should be answered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DialogResponse {
    /// Let the host show the dialog
    Show,
    /// Suppress it and take the host's default answer
    Suppress,
}

/// Outstanding failures of the transaction being finalized
pub trait FailureAccessor {
    /// Highest severity among the outstanding failures
    fn severity(&self) -> FailureSeverity;

    /// Outstanding failures, in the order the host reported them
    fn failures(&self) -> Vec<FailureRecord>;

    /// Apply the host's default resolution. Returns `false` if none applied.
    fn resolve(&mut self, failure: FailureId) -> bool;

    /// Resolve by deleting the affected elements
    fn delete_affected(&mut self, failure: FailureId) -> bool;

    /// Dismiss a warning-level failure
    fn dismiss_warning(&mut self, failure: FailureId) -> bool;
}

/// Callback the host invokes while finalizing a transaction
pub trait FailureHandler {
    /// Inspect and possibly resolve the outstanding failures
    fn process_failures(&mut self, accessor: &mut dyn FailureAccessor) -> FailureProcessingResult;

    /// Intercept a dialog the host is about to pop up during commit
    fn on_dialog(&mut self, _dialog: &HostDialog) -> DialogResponse {
        DialogResponse::Show
    }
}

/// Everything the engine needs from a host document
///
/// All mutating calls are only valid inside a started transaction.
pub trait HostDocument {
    /// Durable identity of this document
    fn id(&self) -> DocumentId;

    /// Human-readable title for diagnostics
    fn title(&self) -> &str;

    /// Open a transaction
    fn begin_transaction(&mut self, name: &str) -> std::result::Result<(), HostError>;

    /// Finalize the open transaction, calling `handler` for any failures
    fn commit_transaction(
        &mut self,
        handler: &mut dyn FailureHandler,
    ) -> std::result::Result<TransactionStatus, HostError>;

    /// Discard the open transaction
    fn rollback_transaction(&mut self) -> std::result::Result<(), HostError>;

    /// Status of the current (or last) transaction
    fn transaction_status(&self) -> TransactionStatus;

    /// Resolve a persistent identity to a live handle
    fn resolve(&self, element: &ElementId) -> Option<ElementHandle>;

    /// Whether the element is editable in the current evaluation context
    ///
    /// Elements in closed worksets or inactive variants are not.
    fn is_editable(&self, element: &ElementId) -> bool;

    /// Category tag of a live element
    fn element_category(&self, element: &ElementId) -> Option<ElementCategory>;

    /// Create a new element
    fn create_element(
        &mut self,
        category: &ElementCategory,
        parameters: &Parameters,
    ) -> std::result::Result<IdentityRef, HostError>;

    /// Read one parameter value
    fn parameter(&self, element: &ElementId, name: &str) -> Option<serde_json::Value>;

    /// Write one parameter value
    fn set_parameter(
        &mut self,
        element: &ElementId,
        name: &str,
        value: serde_json::Value,
    ) -> std::result::Result<(), HostError>;

    /// Delete elements, returning how many were removed
    fn delete_elements(&mut self, elements: &[ElementId]) -> std::result::Result<usize, HostError>;

    /// Copy every parameter from `from` to `to` except the excluded names
    fn copy_parameters(
        &mut self,
        from: &ElementId,
        to: &ElementId,
        exclusions: &[String],
    ) -> std::result::Result<usize, HostError>;

    /// Pin state of a live element
    fn is_pinned(&self, element: &ElementId) -> Option<bool>;

    /// Pin or unpin an element
    fn set_pinned(
        &mut self,
        element: &ElementId,
        pinned: bool,
    ) -> std::result::Result<(), HostError>;

    /// Group elements under a new group element
    fn create_group(
        &mut self,
        name: &str,
        members: &[ElementId],
    ) -> std::result::Result<IdentityRef, HostError>;

    /// Identity reference for an element of this document
    fn identity(&self, element: ElementId) -> IdentityRef {
        let identity = IdentityRef::new(self.id(), element);
        match self.resolve(&element) {
            Some(handle) => identity.with_handle(handle),
            None => identity,
        }
    }

    /// Whether the identity resolves to a live element of this document
    fn is_live(&self, identity: &IdentityRef) -> bool {
        identity.document() == self.id() && self.resolve(&identity.element()).is_some()
    }
}
