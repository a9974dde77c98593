//! Error types for the element engine

use thiserror::Error;

use crate::identity::{DocumentId, ElementId};

/// Result type alias using EngineError
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors that can occur in the element engine
#[derive(Debug, Error)]
pub enum EngineError {
    /// The host refused to open a transaction (locked or read-only document)
    #[error("Failed to start transaction '{name}' on document {document}: {reason}")]
    TransactionStart {
        document: DocumentId,
        name: String,
        reason: String,
    },

    /// A commit or rollback was requested on a scope that is not open
    #[error("Transaction on document {0} is not open")]
    TransactionNotOpen(DocumentId),

    /// A node targeted a document that was not handed to the pass
    #[error("Unknown document: {0}")]
    UnknownDocument(DocumentId),

    /// Error raised by the host document
    #[error("Host error: {0}")]
    Host(#[from] HostError),

    /// Input was provided while the pass was not waiting for any
    #[error("Pass is not awaiting input")]
    NotAwaitingInput,

    /// The pass already finished
    #[error("Pass already finished")]
    PassFinished,

    /// Node type has no registered metadata
    #[error("Unknown node type: {0}")]
    UnknownNodeType(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Compression error
    #[error("Compression error: {0}")]
    Compression(String),

    /// Unsupported persisted record version
    #[error("Unsupported record version {0}")]
    RecordVersion(u32),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors reported by a host document implementation
#[derive(Debug, Clone, PartialEq, Error)]
pub enum HostError {
    /// Document cannot be modified right now
    #[error("Document {0} is read-only")]
    ReadOnly(DocumentId),

    /// A transaction is already open on the document
    #[error("A transaction is already open on document {0}")]
    TransactionAlreadyOpen(DocumentId),

    /// A mutation was attempted outside of a transaction
    #[error("No transaction is open on document {0}")]
    NoTransaction(DocumentId),

    /// The element does not resolve in the document
    #[error("Element {0} not found")]
    ElementNotFound(ElementId),

    /// The element lives in a workset or variant that is not editable
    #[error("Element {0} is not editable in the current context")]
    NotEditable(ElementId),

    /// Anything else the host refused
    #[error("{0}")]
    Rejected(String),
}

/// Errors raised by a node while running its contract
#[derive(Debug, Clone, PartialEq, Error)]
pub enum NodeError {
    /// The node could not produce or update its element
    #[error("{0}")]
    Failed(String),

    /// The desired description is missing something the node needs
    #[error("Invalid description: {0}")]
    InvalidDescription(String),

    /// The node abandoned its own contribution
    #[error("Cancelled")]
    Cancelled,

    /// A host call made by the node failed
    #[error(transparent)]
    Host(#[from] HostError),
}

impl NodeError {
    /// Create a failed error with a message
    pub fn failed(msg: impl Into<String>) -> Self {
        Self::Failed(msg.into())
    }

    /// Create an invalid description error with a message
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidDescription(msg.into())
    }
}
