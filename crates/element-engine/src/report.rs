//! Outcome types produced by a solution pass

use serde::{Deserialize, Serialize};

use crate::host::TransactionStatus;
use crate::identity::{DocumentId, ElementId, IdentityRef, NodeId};

/// Severity of a diagnostic attached to a node or a pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticLevel {
    Remark,
    Warning,
    Error,
}

/// A user-facing message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Diagnostic {
    pub level: DiagnosticLevel,
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub elements: Vec<ElementId>,
}

impl Diagnostic {
    pub fn remark(message: impl Into<String>) -> Self {
        Self::new(DiagnosticLevel::Remark, message)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(DiagnosticLevel::Warning, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(DiagnosticLevel::Error, message)
    }

    fn new(level: DiagnosticLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
            elements: Vec::new(),
        }
    }

    /// Attach the elements this diagnostic refers to
    pub fn with_elements(mut self, elements: Vec<ElementId>) -> Self {
        self.elements = elements;
        self
    }
}

/// Reconciliation decision for one node invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Decision {
    /// The existing element was updated in place
    Reuse { element: IdentityRef },
    /// A new element was created; the old one (if any) was deleted after grafting
    Replace {
        old: Option<IdentityRef>,
        new: IdentityRef,
    },
    /// Nothing is described any more; the old element was deleted
    Delete { old: IdentityRef },
    /// Nothing described and nothing existed
    NoOp,
}

impl Decision {
    /// The element this decision leaves behind, if any
    pub fn output(&self) -> Option<IdentityRef> {
        match self {
            Self::Reuse { element } => Some(*element),
            Self::Replace { new, .. } => Some(*new),
            Self::Delete { .. } | Self::NoOp => None,
        }
    }
}

/// What a node's output slot holds after the pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SlotOutput {
    Element { element: IdentityRef },
    Absent,
    Failed { message: String },
}

impl SlotOutput {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
        }
    }

    pub fn element(&self) -> Option<IdentityRef> {
        match self {
            Self::Element { element } => Some(*element),
            _ => None,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

/// Per-node result of a pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeReport {
    pub node_id: NodeId,
    pub document: DocumentId,
    pub decisions: Vec<Decision>,
    pub outputs: Vec<SlotOutput>,
    pub diagnostics: Vec<Diagnostic>,
    /// The node abandoned its own contribution this pass
    pub cancelled: bool,
}

impl NodeReport {
    pub fn new(node_id: impl Into<NodeId>, document: DocumentId) -> Self {
        Self {
            node_id: node_id.into(),
            document,
            decisions: Vec::new(),
            outputs: Vec::new(),
            diagnostics: Vec::new(),
            cancelled: false,
        }
    }

    /// Whether any slot ended up failed
    pub fn has_failures(&self) -> bool {
        self.outputs.iter().any(SlotOutput::is_failed)
    }

    /// Replace every reported output with a failure
    ///
    /// Used when the document transaction did not commit: the identities the
    /// node produced were never realized.
    pub fn mark_failed(&mut self, message: &str) {
        for output in &mut self.outputs {
            *output = SlotOutput::failed(message);
        }
        self.diagnostics.push(Diagnostic::error(message));
    }
}

/// Transaction outcome for one document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentOutcome {
    pub document: DocumentId,
    pub status: TransactionStatus,
    pub diagnostics: Vec<Diagnostic>,
}

impl DocumentOutcome {
    pub fn committed(&self) -> bool {
        self.status == TransactionStatus::Committed
    }
}

/// Overall outcome of a pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PassOutcome {
    /// Every touched document committed
    Committed,
    /// Some documents committed, others rolled back or failed to start
    PartiallyCommitted,
    /// Nothing was committed
    RolledBack,
    /// The host cancelled the pass; everything was rolled back
    Cancelled,
}

/// Full result of a pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PassReport {
    pub pass_id: String,
    pub outcome: PassOutcome,
    pub nodes: Vec<NodeReport>,
    pub documents: Vec<DocumentOutcome>,
    /// Stale tracked elements deleted during cleanup
    pub stale_deleted: Vec<IdentityRef>,
    /// Pass-level messages
    pub diagnostics: Vec<Diagnostic>,
}

impl PassReport {
    /// Find the report of a node
    pub fn node(&self, node_id: &str) -> Option<&NodeReport> {
        self.nodes.iter().find(|n| n.node_id == node_id)
    }

    /// Find the outcome of a document
    pub fn document(&self, document: DocumentId) -> Option<&DocumentOutcome> {
        self.documents.iter().find(|d| d.document == document)
    }

    pub fn committed(&self) -> bool {
        self.outcome == PassOutcome::Committed
    }
}
