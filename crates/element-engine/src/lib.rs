//! Element Engine - keeps host-document elements in sync with a node graph
//!
//! Every time the graph is evaluated, nodes describe the elements they want
//! in one or more host documents. This crate decides per element whether to
//! reuse, replace or delete what the previous pass left behind, performs the
//! changes inside host transactions, resolves the failures the host raises
//! while committing, and remembers what each node produced for the next
//! pass.
//!
//! # Architecture
//!
//! - [`HostDocument`]: the seam to the modeling application
//! - [`TransactionScope`] / [`MultiDocumentTransactionManager`]: RAII host
//!   transactions, passed explicitly
//! - [`FailureResolutionPolicy`]: auto-fix and rollback decisions at commit
//! - [`ElementNode`]: the contract a node implements to own elements
//! - [`PassController`] / [`Pass`]: one resumable solution pass
//! - [`PreviousOutputRecord`]: identities per node, persisted with the graph
//! - [`NodeTypeRegistry`]: statically declared slot tables, collected with
//!   `inventory`
//!
//! # Example
//!
//! ```ignore
//! use element_engine::{EngineConfig, NodeRun, PassController};
//!
//! let mut controller = PassController::new(EngineConfig::load("engine.json")?);
//! let report = controller.run_pass(
//!     [&mut document],
//!     vec![NodeRun::new("box-1", document_id, &mut box_node, invocations)],
//! )?;
//! ```

pub mod bake;
pub mod config;
pub mod contract;
pub mod controller;
pub mod descriptor;
pub mod error;
pub mod events;
pub mod failure;
pub mod host;
pub mod identity;
pub mod memory;
pub mod prompt;
pub mod reconcile;
pub mod record;
pub mod registry;
pub mod report;
pub mod transaction;

// Re-export key types
pub use bake::{MaterializeOptions, MaterializeOutcome};
pub use config::{EngineConfig, ExpectedFailure, FailurePolicyConfig, ResolutionAction};
pub use contract::{sync_parameters, ElementDescription, ElementNode, Invocation};
pub use controller::{CancellationFlag, NodeRun, Pass, PassController, PassProgress, PassState};
pub use descriptor::{DescriptorFn, NodeDescriptor, NodeGroup, NodeTypeMetadata, SlotMetadata};
pub use error::{EngineError, HostError, NodeError, Result};
pub use events::{ChannelEventSink, EventSink, NullEventSink, PassEvent, VecEventSink};
pub use failure::FailureResolutionPolicy;
pub use host::{
    DialogResponse, ElementCategory, FailureAccessor, FailureHandler, FailureId, FailureKind,
    FailureProcessingResult, FailureRecord, FailureSeverity, HostDialog, HostDocument, Parameters,
    TransactionStatus,
};
pub use identity::{DocumentId, ElementHandle, ElementId, IdentityRef, NodeId};
pub use memory::{MemoryDocument, MemoryElement, ScriptedFailure};
pub use prompt::{
    ChannelInputSource, InputKind, InputRequest, InputResponse, InputSource, PendingInput,
};
pub use record::PreviousOutputRecord;
pub use registry::NodeTypeRegistry;
pub use report::{
    Decision, Diagnostic, DiagnosticLevel, DocumentOutcome, NodeReport, PassOutcome, PassReport,
    SlotOutput,
};
pub use transaction::{MultiDocumentTransactionManager, TransactionManager, TransactionScope};
