//! Evaluation pass controller
//!
//! A [`PassController`] owns the previous-output record and the engine
//! configuration across passes. Each solution pass is a [`Pass`]: a
//! resumable state machine that walks the scheduled nodes in order,
//! reconciles each invocation inside the target document's transaction,
//! deletes stale elements, commits every touched document and finally
//! replaces the record for the documents that committed.
//!
//! ```text
//! TransactionsOpen -> NodesReconciled -> CleanupStale -> Committing -> Committed | RolledBack
//! ```
//!
//! Dropping a [`Pass`] before it finishes rolls back every transaction it
//! opened and leaves the record untouched.

use std::collections::{BTreeMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::config::EngineConfig;
use crate::contract::{ElementNode, Invocation};
use crate::error::{EngineError, NodeError, Result};
use crate::events::{EventSink, NullEventSink, PassEvent};
use crate::failure::FailureResolutionPolicy;
use crate::host::{HostDocument, TransactionStatus};
use crate::identity::{DocumentId, IdentityRef, NodeId};
use crate::prompt::{InputRequest, InputResponse, InputSource};
use crate::reconcile::{reconcile, Desired};
use crate::record::PreviousOutputRecord;
use crate::registry::NodeTypeRegistry;
use crate::report::{
    Decision, Diagnostic, DocumentOutcome, NodeReport, PassOutcome, PassReport, SlotOutput,
};
use crate::transaction::MultiDocumentTransactionManager;

/// Host-settable flag checked between node evaluations
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation of the running pass
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// One scheduled node, as handed over by the graph scheduler
pub struct NodeRun<'n, D: HostDocument + ?Sized> {
    pub node_id: NodeId,
    /// Registered node type, used for slot validation
    pub node_type: Option<String>,
    /// Document the node materializes into
    pub document: DocumentId,
    pub node: &'n mut dyn ElementNode<D>,
    /// One entry per output slot element, in slot order
    pub invocations: Vec<Invocation>,
}

impl<'n, D: HostDocument + ?Sized> NodeRun<'n, D> {
    pub fn new(
        node_id: impl Into<NodeId>,
        document: DocumentId,
        node: &'n mut dyn ElementNode<D>,
        invocations: Vec<Invocation>,
    ) -> Self {
        Self {
            node_id: node_id.into(),
            node_type: None,
            document,
            node,
            invocations,
        }
    }

    pub fn of_type(mut self, node_type: impl Into<String>) -> Self {
        self.node_type = Some(node_type.into());
        self
    }
}

/// Where a pass is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassState {
    TransactionsOpen,
    NodesReconciled,
    CleanupStale,
    Committing,
    Committed,
    RolledBack,
}

/// Result of advancing a pass by one step
#[derive(Debug, Clone, PartialEq)]
pub enum PassProgress {
    /// A node finished reconciling
    Advanced { node_id: NodeId },
    /// The pass is suspended until [`Pass::provide_input`] is called
    AwaitingInput {
        node_id: NodeId,
        request: InputRequest,
    },
    /// The pass is over
    Finished(PassReport),
}

/// Owns the record and configuration across solution passes
pub struct PassController {
    pub(crate) record: PreviousOutputRecord,
    pub(crate) config: EngineConfig,
    events: Arc<dyn EventSink>,
    registry: Option<Arc<NodeTypeRegistry>>,
    cancel: CancellationFlag,
}

impl PassController {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            record: PreviousOutputRecord::new(),
            config,
            events: Arc::new(NullEventSink),
            registry: None,
            cancel: CancellationFlag::new(),
        }
    }

    /// Start from a record persisted with the graph
    pub fn with_record(mut self, record: PreviousOutputRecord) -> Self {
        self.record = record;
        self
    }

    pub fn with_events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    /// Validate invocations against declared slot tables
    pub fn with_registry(mut self, registry: Arc<NodeTypeRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn record(&self) -> &PreviousOutputRecord {
        &self.record
    }

    /// Swap in a different record (e.g. after the graph document reloads)
    pub fn replace_record(&mut self, record: PreviousOutputRecord) -> PreviousOutputRecord {
        std::mem::replace(&mut self.record, record)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// A handle the host can use to cancel a running pass
    ///
    /// The flag is cleared whenever a pass finishes.
    pub fn cancellation(&self) -> CancellationFlag {
        self.cancel.clone()
    }

    pub(crate) fn emit(&self, event: PassEvent) {
        if let Err(e) = self.events.send(event) {
            log::warn!("Dropping pass event: {}", e);
        }
    }

    /// Start a pass over `documents` for the scheduled `runs`
    ///
    /// Nothing touches a document until the pass is stepped.
    pub fn begin_pass<'p, D: HostDocument + ?Sized>(
        &'p mut self,
        documents: impl IntoIterator<Item = &'p mut D>,
        runs: Vec<NodeRun<'p, D>>,
    ) -> Pass<'p, D> {
        let pass_id = format!("pass-{}", uuid::Uuid::new_v4());
        log::info!("Starting {} with {} node(s)", pass_id, runs.len());
        self.emit(PassEvent::PassStarted {
            pass_id: pass_id.clone(),
            node_count: runs.len(),
        });

        let manager =
            MultiDocumentTransactionManager::new(self.config.transaction_name.clone(), documents);
        Pass {
            pass_id,
            controller: self,
            manager,
            runs,
            state: PassState::TransactionsOpen,
            next_node: 0,
            cursor: None,
            pending: None,
            results: Vec::new(),
            stale: Vec::new(),
            diagnostics: Vec::new(),
        }
    }

    /// Run a whole pass without interactive input
    pub fn run_pass<'p, D: HostDocument + ?Sized>(
        &'p mut self,
        documents: impl IntoIterator<Item = &'p mut D>,
        runs: Vec<NodeRun<'p, D>>,
    ) -> Result<PassReport> {
        self.begin_pass(documents, runs).run()
    }
}

/// Progress through one node's invocations
struct NodeCursor {
    index: usize,
    invocation: usize,
    previous: VecDeque<Option<IdentityRef>>,
    entries: Vec<Option<IdentityRef>>,
    exclusions: Vec<String>,
    report: NodeReport,
}

/// A finished node, waiting for the commit outcome
struct NodeResult {
    index: usize,
    report: NodeReport,
    /// New record entries; `None` leaves the record untouched
    entries: Option<Vec<Option<IdentityRef>>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StaleState {
    Pending,
    Deleted,
    /// Already gone from the document
    Gone,
    Kept,
}

/// A tracked identity no node claimed this pass
struct StaleEntry {
    node_id: NodeId,
    identity: IdentityRef,
    state: StaleState,
}

/// One solution pass
pub struct Pass<'p, D: HostDocument + ?Sized> {
    pass_id: String,
    controller: &'p mut PassController,
    manager: MultiDocumentTransactionManager<'p, D>,
    runs: Vec<NodeRun<'p, D>>,
    state: PassState,
    next_node: usize,
    cursor: Option<NodeCursor>,
    pending: Option<InputRequest>,
    results: Vec<NodeResult>,
    stale: Vec<StaleEntry>,
    diagnostics: Vec<Diagnostic>,
}

impl<'p, D: HostDocument + ?Sized> Pass<'p, D> {
    pub fn pass_id(&self) -> &str {
        &self.pass_id
    }

    pub fn state(&self) -> PassState {
        self.state
    }

    pub fn is_finished(&self) -> bool {
        matches!(self.state, PassState::Committed | PassState::RolledBack)
    }

    /// Request currently blocking the pass, if any
    pub fn pending_input(&self) -> Option<&InputRequest> {
        self.pending.as_ref()
    }

    /// Advance by one node, or finish the pass once every node ran
    pub fn step(&mut self) -> Result<PassProgress> {
        if self.is_finished() {
            return Err(EngineError::PassFinished);
        }
        if let (Some(request), Some(cursor)) = (&self.pending, &self.cursor) {
            return Ok(PassProgress::AwaitingInput {
                node_id: cursor.report.node_id.clone(),
                request: request.clone(),
            });
        }
        if self.controller.cancel.is_cancelled() {
            return Ok(PassProgress::Finished(self.finish_cancelled()));
        }

        let cursor = match self.cursor.take() {
            Some(cursor) => cursor,
            None => {
                if self.next_node >= self.runs.len() {
                    return Ok(PassProgress::Finished(self.finish()));
                }
                let index = self.next_node;
                match self.start_node(index) {
                    Some(cursor) => cursor,
                    None => {
                        return Ok(PassProgress::Advanced {
                            node_id: self.runs[index].node_id.clone(),
                        })
                    }
                }
            }
        };
        Ok(self.continue_node(cursor))
    }

    /// Answer the request the pass is suspended on
    pub fn provide_input(&mut self, response: InputResponse) -> Result<()> {
        if self.is_finished() {
            return Err(EngineError::PassFinished);
        }
        let request = self.pending.take().ok_or(EngineError::NotAwaitingInput)?;
        let cursor = self.cursor.take().ok_or(EngineError::NotAwaitingInput)?;

        if response == InputResponse::Cancelled {
            log::debug!("Input for '{}' was cancelled", cursor.report.node_id);
            self.cancel_node(cursor, None);
            return Ok(());
        }

        let run = &mut self.runs[cursor.index];
        match run.node.accept_input(&request, response) {
            Ok(invocation) => run.invocations[cursor.invocation] = invocation,
            Err(NodeError::Cancelled) => {
                self.cancel_node(cursor, None);
                return Ok(());
            }
            Err(e) => run.invocations[cursor.invocation] = Invocation::Failed(e.to_string()),
        }
        self.cursor = Some(cursor);
        Ok(())
    }

    /// Drive the pass to completion, cancelling any input requests
    pub fn run(mut self) -> Result<PassReport> {
        loop {
            match self.step()? {
                PassProgress::Finished(report) => return Ok(report),
                PassProgress::AwaitingInput { node_id, .. } => {
                    log::debug!("No input source for '{}', cancelling its request", node_id);
                    self.provide_input(InputResponse::Cancelled)?;
                }
                PassProgress::Advanced { .. } => {}
            }
        }
    }

    /// Drive the pass to completion, asking `source` whenever a node needs input
    pub async fn run_interactive(mut self, source: &mut dyn InputSource) -> Result<PassReport> {
        loop {
            match self.step()? {
                PassProgress::Finished(report) => return Ok(report),
                PassProgress::AwaitingInput { node_id, request } => {
                    let response = source.request_input(&node_id, &request).await;
                    self.provide_input(response)?;
                }
                PassProgress::Advanced { .. } => {}
            }
        }
    }

    /// Open the node's document and set up its cursor
    ///
    /// Returns `None` when the node was finished right away because its
    /// document transaction could not be started.
    fn start_node(&mut self, index: usize) -> Option<NodeCursor> {
        let run = &self.runs[index];
        let node_id = run.node_id.clone();
        let document = run.document;
        self.controller.emit(PassEvent::NodeStarted {
            pass_id: self.pass_id.clone(),
            node_id: node_id.clone(),
        });

        let mut report = NodeReport::new(node_id.clone(), document);
        let mut exclusions = run.node.excluded_parameters();
        if let (Some(registry), Some(node_type)) = (&self.controller.registry, &run.node_type) {
            match registry.get_metadata(node_type) {
                Some(metadata) => exclusions.extend(metadata.excluded_parameters.iter().cloned()),
                None => report
                    .diagnostics
                    .push(Diagnostic::warning(format!("Unknown node type '{}'", node_type))),
            }
        }

        if self.runs[..index].iter().any(|r| r.node_id == node_id) {
            let message = format!(
                "Duplicate node id '{}'; only its first run is reconciled",
                node_id
            );
            self.skip_node(index, report, message);
            return None;
        }

        let opened = self.manager.document(document).map(|_| ());
        if let Err(e) = opened {
            self.skip_node(index, report, e.to_string());
            return None;
        }

        let previous = self
            .controller
            .record
            .get(&node_id)
            .map(|entries| entries.iter().copied().collect())
            .unwrap_or_default();
        Some(NodeCursor {
            index,
            invocation: 0,
            previous,
            entries: Vec::new(),
            exclusions,
            report,
        })
    }

    /// Finish a node without running it; its record entries stay as they were
    fn skip_node(&mut self, index: usize, mut report: NodeReport, message: String) {
        let run = &self.runs[index];
        log::warn!("Node '{}' skipped: {}", run.node_id, message);
        for _ in &run.invocations {
            report.decisions.push(Decision::NoOp);
            report.outputs.push(SlotOutput::failed(message.clone()));
        }
        report.diagnostics.push(Diagnostic::error(message.clone()));
        self.controller.emit(PassEvent::NodeFailed {
            pass_id: self.pass_id.clone(),
            node_id: run.node_id.clone(),
            error: message,
        });
        self.push_result(index, report, None);
    }

    /// Reconcile invocations until the node is done or needs input
    fn continue_node(&mut self, mut cursor: NodeCursor) -> PassProgress {
        loop {
            let run = &mut self.runs[cursor.index];
            let Some(invocation) = run.invocations.get(cursor.invocation).cloned() else {
                break;
            };

            let desired = match invocation {
                Invocation::AwaitInput(ref request) => {
                    let node_id = run.node_id.clone();
                    log::debug!("Node '{}' is waiting for input: {}", node_id, request.prompt);
                    self.controller.emit(PassEvent::WaitingForInput {
                        pass_id: self.pass_id.clone(),
                        node_id: node_id.clone(),
                        prompt: request.prompt.clone(),
                    });
                    self.pending = Some(request.clone());
                    self.cursor = Some(cursor);
                    return PassProgress::AwaitingInput {
                        node_id,
                        request: request.clone(),
                    };
                }
                Invocation::Describe(ref description) => Desired::Describe(description.clone()),
                Invocation::Absent => Desired::Absent,
                Invocation::Failed(ref message) => Desired::Failed(message.clone()),
            };

            let desired = match (&self.controller.registry, &run.node_type) {
                (Some(registry), Some(node_type)) => {
                    match registry.check_invocation(node_type, cursor.invocation, &invocation) {
                        Ok(Some(problem)) => Desired::Failed(problem),
                        _ => desired,
                    }
                }
                _ => desired,
            };

            let previous = match cursor.previous.pop_front().flatten() {
                Some(identity) if identity.document() != run.document => {
                    // The node moved to another document; its old element is stale
                    self.stale.push(StaleEntry {
                        node_id: run.node_id.clone(),
                        identity,
                        state: StaleState::Pending,
                    });
                    None
                }
                other => other,
            };

            let document = match self.manager.document(run.document) {
                Ok(document) => document,
                Err(e) => {
                    cursor.report.diagnostics.push(Diagnostic::error(e.to_string()));
                    cursor.report.decisions.push(Decision::NoOp);
                    cursor.report.outputs.push(SlotOutput::failed(e.to_string()));
                    cursor.entries.push(previous);
                    cursor.invocation += 1;
                    continue;
                }
            };

            match reconcile(
                document,
                &mut *run.node,
                previous,
                desired,
                &cursor.exclusions,
                &self.controller.config,
                &mut cursor.report,
            ) {
                Ok(reconciled) => {
                    if let Some(identity) = reconciled.kept {
                        // Out of reach this pass; cleaned up once it is editable again
                        self.stale.push(StaleEntry {
                            node_id: run.node_id.clone(),
                            identity,
                            state: StaleState::Kept,
                        });
                    }
                    if let SlotOutput::Failed { message } = &reconciled.output {
                        self.controller.emit(PassEvent::NodeFailed {
                            pass_id: self.pass_id.clone(),
                            node_id: run.node_id.clone(),
                            error: message.clone(),
                        });
                    }
                    cursor.report.decisions.push(reconciled.decision);
                    cursor.report.outputs.push(reconciled.output);
                    cursor.entries.push(reconciled.entry);
                    cursor.invocation += 1;
                }
                Err(_) => {
                    let node_id = cursor.report.node_id.clone();
                    self.cancel_node(cursor, Some(previous));
                    return PassProgress::Advanced { node_id };
                }
            }
        }

        let node_id = cursor.report.node_id.clone();
        self.complete_node(cursor);
        PassProgress::Advanced { node_id }
    }

    fn complete_node(&mut self, mut cursor: NodeCursor) {
        let node_id = cursor.report.node_id.clone();
        // Entries past the last invocation belong to slots that no longer exist
        for identity in cursor.previous.drain(..).flatten() {
            self.stale.push(StaleEntry {
                node_id: node_id.clone(),
                identity,
                state: StaleState::Pending,
            });
        }

        log::debug!(
            "Node '{}' reconciled: {} decision(s)",
            node_id,
            cursor.report.decisions.len()
        );
        self.controller.emit(PassEvent::NodeReconciled {
            pass_id: self.pass_id.clone(),
            node_id,
            decisions: cursor.report.decisions.clone(),
        });
        let entries = std::mem::take(&mut cursor.entries);
        self.push_result(cursor.index, cursor.report, Some(entries));
    }

    /// Abandon the node's remaining contribution
    ///
    /// Entries already reconciled stay, everything not yet consumed is
    /// carried forward untouched.
    fn cancel_node(&mut self, mut cursor: NodeCursor, in_flight: Option<Option<IdentityRef>>) {
        let node_id = cursor.report.node_id.clone();
        log::info!("Node '{}' cancelled its contribution", node_id);

        let mut entries = std::mem::take(&mut cursor.entries);
        if let Some(entry) = in_flight {
            entries.push(entry);
        }
        entries.extend(cursor.previous.drain(..));

        let total = self.runs[cursor.index].invocations.len();
        for _ in cursor.invocation..total {
            cursor.report.decisions.push(Decision::NoOp);
            cursor.report.outputs.push(SlotOutput::failed("cancelled"));
        }
        cursor.report.cancelled = true;
        cursor
            .report
            .diagnostics
            .push(Diagnostic::remark("Node cancelled; previous elements kept"));

        self.controller.emit(PassEvent::NodeCancelled {
            pass_id: self.pass_id.clone(),
            node_id,
        });
        self.push_result(cursor.index, cursor.report, Some(entries));
    }

    fn push_result(
        &mut self,
        index: usize,
        report: NodeReport,
        entries: Option<Vec<Option<IdentityRef>>>,
    ) {
        self.results.push(NodeResult {
            index,
            report,
            entries,
        });
        self.next_node = index + 1;
    }

    /// Delete elements no node claims any more
    fn cleanup_stale(&mut self) {
        self.state = PassState::CleanupStale;

        let active: HashSet<&str> = self.runs.iter().map(|r| r.node_id.as_str()).collect();
        for node_id in self.controller.record.node_ids() {
            if active.contains(node_id) {
                continue;
            }
            let entries = self.controller.record.get(node_id).unwrap_or_default();
            for identity in entries.iter().flatten() {
                self.stale.push(StaleEntry {
                    node_id: node_id.to_string(),
                    identity: *identity,
                    state: StaleState::Pending,
                });
            }
        }

        for stale in &mut self.stale {
            if stale.state != StaleState::Pending {
                continue;
            }
            let document = match self.manager.document(stale.identity.document()) {
                Ok(document) => document,
                Err(e) => {
                    log::warn!("Keeping stale element {}: {}", stale.identity, e);
                    self.diagnostics.push(
                        Diagnostic::warning(format!("Stale element kept: {}", e))
                            .with_elements(vec![stale.identity.element()]),
                    );
                    stale.state = StaleState::Kept;
                    continue;
                }
            };

            if !document.is_live(&stale.identity) {
                stale.state = StaleState::Gone;
                continue;
            }
            if !document.is_editable(&stale.identity.element()) {
                self.diagnostics.push(
                    Diagnostic::warning("Stale element is not editable and was kept")
                        .with_elements(vec![stale.identity.element()]),
                );
                stale.state = StaleState::Kept;
                continue;
            }
            stale.state = match document.delete_elements(&[stale.identity.element()]) {
                Ok(_) => {
                    log::debug!("Deleted stale element {} of '{}'", stale.identity, stale.node_id);
                    StaleState::Deleted
                }
                Err(e) => {
                    self.diagnostics.push(
                        Diagnostic::warning(format!("Stale element could not be deleted: {}", e))
                            .with_elements(vec![stale.identity.element()]),
                    );
                    StaleState::Kept
                }
            };
        }
    }

    /// Clean up, commit, update the record and build the report
    fn finish(&mut self) -> PassReport {
        self.state = PassState::NodesReconciled;
        self.cleanup_stale();

        if self.controller.cancel.is_cancelled() {
            return self.finish_cancelled();
        }

        self.state = PassState::Committing;
        let mut policy = FailureResolutionPolicy::new(self.controller.config.failure.clone());
        let mut documents = self.manager.commit_all(&mut policy);
        for (document, reason) in self.manager.failed_documents() {
            documents.push(DocumentOutcome {
                document: *document,
                status: TransactionStatus::Error,
                diagnostics: vec![Diagnostic::error(reason.clone())],
            });
        }
        if policy.corruption_detected() {
            self.diagnostics.push(Diagnostic::error(
                "Document corruption reported during commit; the pass was rolled back",
            ));
        }

        let committed: HashSet<DocumentId> = documents
            .iter()
            .filter(|d| d.committed())
            .map(|d| d.document)
            .collect();

        let mut record = self.controller.record.clone();
        let mut accepted: HashSet<NodeId> = HashSet::new();
        let mut nodes = Vec::with_capacity(self.results.len());
        for mut result in std::mem::take(&mut self.results) {
            let run = &mut self.runs[result.index];
            match result.entries {
                Some(entries) if committed.contains(&run.document) => {
                    run.node.on_committed(&entries);
                    record.set(run.node_id.clone(), entries);
                    accepted.insert(run.node_id.clone());
                }
                Some(_) => {
                    result.report.mark_failed("Transaction rolled back; changes discarded");
                    run.node.on_rolled_back();
                }
                None => run.node.on_rolled_back(),
            }
            nodes.push(result.report);
        }

        let mut removed_kept: BTreeMap<NodeId, Vec<Option<IdentityRef>>> = BTreeMap::new();
        let mut stale_deleted = Vec::new();
        for stale in std::mem::take(&mut self.stale) {
            let resolved = match stale.state {
                StaleState::Gone => true,
                StaleState::Deleted => committed.contains(&stale.identity.document()),
                StaleState::Pending | StaleState::Kept => false,
            };
            if resolved {
                if stale.state == StaleState::Deleted {
                    stale_deleted.push(stale.identity);
                }
                continue;
            }

            if accepted.contains(&stale.node_id) {
                // Trailing entries are picked up again as stale next pass
                let mut entries = record.get(&stale.node_id).unwrap_or_default().to_vec();
                entries.push(Some(stale.identity));
                record.set(stale.node_id, entries);
            } else if !self.runs.iter().any(|r| r.node_id == stale.node_id) {
                removed_kept
                    .entry(stale.node_id)
                    .or_default()
                    .push(Some(stale.identity));
            }
        }

        let active: HashSet<NodeId> = self.runs.iter().map(|r| r.node_id.clone()).collect();
        let removed: Vec<NodeId> = record
            .node_ids()
            .filter(|id| !active.contains(*id))
            .map(str::to_string)
            .collect();
        for node_id in removed {
            match removed_kept.remove(&node_id) {
                Some(kept) => record.set(node_id, kept),
                None => {
                    record.remove(&node_id);
                }
            }
        }
        self.controller.record = record;

        if !stale_deleted.is_empty() {
            log::info!("Deleted {} stale element(s)", stale_deleted.len());
            self.controller.emit(PassEvent::StaleDeleted {
                pass_id: self.pass_id.clone(),
                elements: stale_deleted.clone(),
            });
        }

        let outcome = if documents.iter().all(DocumentOutcome::committed) {
            PassOutcome::Committed
        } else if committed.is_empty() {
            PassOutcome::RolledBack
        } else {
            PassOutcome::PartiallyCommitted
        };
        self.state = match outcome {
            PassOutcome::Committed | PassOutcome::PartiallyCommitted => PassState::Committed,
            PassOutcome::RolledBack | PassOutcome::Cancelled => PassState::RolledBack,
        };

        self.report(outcome, nodes, documents, stale_deleted)
    }

    /// Roll everything back; the record is untouched
    fn finish_cancelled(&mut self) -> PassReport {
        log::info!("{} cancelled, rolling back", self.pass_id);
        self.pending = None;
        if let Some(cursor) = self.cursor.take() {
            self.push_result(cursor.index, cursor.report, None);
        }

        let mut documents = self.manager.rollback_all();
        for (document, reason) in self.manager.failed_documents() {
            documents.push(DocumentOutcome {
                document: *document,
                status: TransactionStatus::Error,
                diagnostics: vec![Diagnostic::error(reason.clone())],
            });
        }

        let mut nodes = Vec::with_capacity(self.runs.len());
        let mut seen = HashSet::new();
        for mut result in std::mem::take(&mut self.results) {
            seen.insert(result.index);
            result.report.mark_failed("Pass cancelled");
            self.runs[result.index].node.on_rolled_back();
            nodes.push(result.report);
        }
        for (index, run) in self.runs.iter().enumerate() {
            if seen.contains(&index) {
                continue;
            }
            let mut report = NodeReport::new(run.node_id.clone(), run.document);
            for _ in &run.invocations {
                report.decisions.push(Decision::NoOp);
                report.outputs.push(SlotOutput::failed("Pass cancelled"));
            }
            nodes.push(report);
        }

        self.stale.clear();
        self.diagnostics.push(Diagnostic::warning("Pass cancelled by the host"));
        self.state = PassState::RolledBack;
        self.report(PassOutcome::Cancelled, nodes, documents, Vec::new())
    }

    fn report(
        &mut self,
        outcome: PassOutcome,
        nodes: Vec<NodeReport>,
        documents: Vec<DocumentOutcome>,
        stale_deleted: Vec<IdentityRef>,
    ) -> PassReport {
        for document in &documents {
            self.controller.emit(PassEvent::DocumentFinished {
                pass_id: self.pass_id.clone(),
                document: document.document,
                status: document.status,
            });
        }
        self.controller.emit(PassEvent::PassCompleted {
            pass_id: self.pass_id.clone(),
            outcome,
        });
        self.controller.cancel.reset();
        log::info!("{} finished: {:?}", self.pass_id, outcome);

        PassReport {
            pass_id: self.pass_id.clone(),
            outcome,
            nodes,
            documents,
            stale_deleted,
            diagnostics: std::mem::take(&mut self.diagnostics),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::{sync_parameters, ElementDescription};
    use crate::events::VecEventSink;
    use crate::host::ElementCategory;
    use crate::memory::MemoryDocument;
    use serde_json::json;

    /// Grid line node; reuses while the name matches
    #[derive(Default)]
    struct GridNode {
        committed: usize,
        rolled_back: usize,
    }

    impl ElementNode<MemoryDocument> for GridNode {
        fn reuse(
            &mut self,
            document: &mut MemoryDocument,
            previous: &IdentityRef,
            desired: &ElementDescription,
        ) -> std::result::Result<bool, NodeError> {
            let current = document.parameter(&previous.element(), "name");
            if current.as_ref() != desired.parameter("name") {
                return Ok(false);
            }
            sync_parameters(document, &previous.element(), &desired.parameters)?;
            Ok(true)
        }

        fn create(
            &mut self,
            document: &mut MemoryDocument,
            desired: &ElementDescription,
        ) -> std::result::Result<IdentityRef, NodeError> {
            Ok(document.create_element(&desired.category, &desired.parameters)?)
        }

        fn accept_input(
            &mut self,
            _request: &InputRequest,
            response: InputResponse,
        ) -> std::result::Result<Invocation, NodeError> {
            match response {
                InputResponse::Text(name) => Ok(Invocation::Describe(grid(&name))),
                _ => Err(NodeError::Cancelled),
            }
        }

        fn on_committed(&mut self, _outputs: &[Option<IdentityRef>]) {
            self.committed += 1;
        }

        fn on_rolled_back(&mut self) {
            self.rolled_back += 1;
        }
    }

    fn grid(name: &str) -> ElementDescription {
        ElementDescription::new(ElementCategory::Grid).with_parameter("name", json!(name))
    }

    fn describe(names: &[&str]) -> Vec<Invocation> {
        names.iter().map(|n| Invocation::Describe(grid(n))).collect()
    }

    #[test]
    fn test_pass_commits_and_records() {
        let mut doc = MemoryDocument::new("Model");
        let doc_id = doc.id();
        let mut node = GridNode::default();
        let mut controller = PassController::new(EngineConfig::default());

        let report = controller
            .run_pass(
                [&mut doc],
                vec![NodeRun::new("grids", doc_id, &mut node, describe(&["A", "B"]))],
            )
            .unwrap();

        assert_eq!(report.outcome, PassOutcome::Committed);
        assert!(report.pass_id.starts_with("pass-"));
        assert_eq!(doc.element_count(), 2);
        assert_eq!(controller.record().get("grids").unwrap().len(), 2);
        assert_eq!(node.committed, 1);
    }

    #[test]
    fn test_step_by_step() {
        let mut doc = MemoryDocument::new("Model");
        let doc_id = doc.id();
        let (mut a, mut b) = (GridNode::default(), GridNode::default());
        let mut controller = PassController::new(EngineConfig::default());

        {
            let mut pass = controller.begin_pass(
                [&mut doc],
                vec![
                    NodeRun::new("a", doc_id, &mut a, describe(&["A"])),
                    NodeRun::new("b", doc_id, &mut b, describe(&["B"])),
                ],
            );
            assert_eq!(pass.state(), PassState::TransactionsOpen);
            assert_eq!(
                pass.step().unwrap(),
                PassProgress::Advanced { node_id: "a".to_string() }
            );
            assert_eq!(
                pass.step().unwrap(),
                PassProgress::Advanced { node_id: "b".to_string() }
            );
            assert!(matches!(pass.step().unwrap(), PassProgress::Finished(_)));
            assert_eq!(pass.state(), PassState::Committed);
            assert!(matches!(pass.step(), Err(EngineError::PassFinished)));
        }
        assert_eq!(doc.element_count(), 2);
    }

    #[test]
    fn test_interactive_input_resumes_pass() {
        let mut doc = MemoryDocument::new("Model");
        let doc_id = doc.id();
        let mut node = GridNode::default();
        let mut controller = PassController::new(EngineConfig::default());

        {
            let mut pass = controller.begin_pass(
                [&mut doc],
                vec![NodeRun::new(
                    "picked",
                    doc_id,
                    &mut node,
                    vec![Invocation::AwaitInput(InputRequest::text("Grid name"))],
                )],
            );
            assert!(matches!(
                pass.provide_input(InputResponse::Text("X".into())),
                Err(EngineError::NotAwaitingInput)
            ));

            match pass.step().unwrap() {
                PassProgress::AwaitingInput { node_id, request } => {
                    assert_eq!(node_id, "picked");
                    assert_eq!(request.prompt, "Grid name");
                }
                other => panic!("unexpected progress {:?}", other),
            }
            // Still suspended until input arrives
            assert!(matches!(pass.step().unwrap(), PassProgress::AwaitingInput { .. }));
            pass.provide_input(InputResponse::Text("C".to_string())).unwrap();
            assert!(matches!(pass.step().unwrap(), PassProgress::Advanced { .. }));
            let PassProgress::Finished(report) = pass.step().unwrap() else {
                panic!("expected the pass to finish");
            };
            assert!(report.committed());
        }

        let element = controller.record().get("picked").unwrap()[0].unwrap();
        assert_eq!(doc.parameter(&element.element(), "name"), Some(json!("C")));
    }

    #[test]
    fn test_run_cancels_input_and_carries_previous_forward() {
        let mut doc = MemoryDocument::new("Model");
        let doc_id = doc.id();
        let mut node = GridNode::default();
        let mut controller = PassController::new(EngineConfig::default());
        controller
            .run_pass([&mut doc], vec![NodeRun::new("g", doc_id, &mut node, describe(&["A"]))])
            .unwrap();
        let before = controller.record().clone();

        let report = controller
            .run_pass(
                [&mut doc],
                vec![NodeRun::new(
                    "g",
                    doc_id,
                    &mut node,
                    vec![Invocation::AwaitInput(InputRequest::text("Name"))],
                )],
            )
            .unwrap();

        let node_report = report.node("g").unwrap();
        assert!(node_report.cancelled);
        assert!(node_report.outputs[0].is_failed());
        assert_eq!(controller.record(), &before);
        assert_eq!(doc.element_count(), 1);
    }

    #[test]
    fn test_cancellation_flag_rolls_back() {
        let mut doc = MemoryDocument::new("Model");
        let doc_id = doc.id();
        let (mut a, mut b) = (GridNode::default(), GridNode::default());
        let sink = Arc::new(VecEventSink::new());
        let mut controller =
            PassController::new(EngineConfig::default()).with_events(sink.clone());
        let flag = controller.cancellation();

        let report = {
            let mut pass = controller.begin_pass(
                [&mut doc],
                vec![
                    NodeRun::new("a", doc_id, &mut a, describe(&["A"])),
                    NodeRun::new("b", doc_id, &mut b, describe(&["B"])),
                ],
            );
            pass.step().unwrap();
            flag.cancel();
            match pass.step().unwrap() {
                PassProgress::Finished(report) => report,
                other => panic!("unexpected progress {:?}", other),
            }
        };

        assert_eq!(report.outcome, PassOutcome::Cancelled);
        assert_eq!(report.nodes.len(), 2);
        assert!(report.nodes.iter().all(|n| n.has_failures()));
        assert_eq!(doc.element_count(), 0);
        assert!(controller.record().is_empty());
        assert!(!flag.is_cancelled());
        assert_eq!(a.rolled_back, 1);
        assert!(sink
            .events()
            .iter()
            .any(|e| matches!(
                e,
                PassEvent::PassCompleted { outcome: PassOutcome::Cancelled, .. }
            )));
    }

    #[test]
    fn test_dropping_unfinished_pass_rolls_back() {
        let mut doc = MemoryDocument::new("Model");
        let doc_id = doc.id();
        let mut node = GridNode::default();
        let mut controller = PassController::new(EngineConfig::default());
        {
            let mut pass = controller.begin_pass(
                [&mut doc],
                vec![NodeRun::new("g", doc_id, &mut node, describe(&["A"]))],
            );
            pass.step().unwrap();
        }
        assert_eq!(doc.element_count(), 0);
        assert_eq!(doc.transaction_status(), TransactionStatus::RolledBack);
        assert!(controller.record().is_empty());
    }

    #[test]
    fn test_transaction_start_failure_leaves_record() {
        let mut doc = MemoryDocument::new("Model");
        let doc_id = doc.id();
        let mut node = GridNode::default();
        let mut controller = PassController::new(EngineConfig::default());
        controller
            .run_pass([&mut doc], vec![NodeRun::new("g", doc_id, &mut node, describe(&["A"]))])
            .unwrap();
        let before = controller.record().clone();

        doc.set_read_only(true);
        let report = controller
            .run_pass([&mut doc], vec![NodeRun::new("g", doc_id, &mut node, describe(&["B"]))])
            .unwrap();

        assert_eq!(report.outcome, PassOutcome::RolledBack);
        assert!(report.node("g").unwrap().has_failures());
        assert_eq!(report.document(doc_id).unwrap().status, TransactionStatus::Error);
        assert_eq!(controller.record(), &before);
    }

    #[test]
    fn test_registry_rejects_wrong_category() {
        use crate::descriptor::{NodeGroup, NodeTypeMetadata, SlotMetadata};

        let mut registry = NodeTypeRegistry::new();
        registry.register(NodeTypeMetadata {
            node_type: "level".to_string(),
            group: NodeGroup::Datum,
            label: "Level".to_string(),
            description: "Elevation datum".to_string(),
            outputs: vec![SlotMetadata::single("level", "Level", ElementCategory::Level)],
            excluded_parameters: Vec::new(),
        });

        let mut doc = MemoryDocument::new("Model");
        let doc_id = doc.id();
        let mut node = GridNode::default();
        let mut controller =
            PassController::new(EngineConfig::default()).with_registry(Arc::new(registry));

        let report = controller
            .run_pass(
                [&mut doc],
                vec![NodeRun::new("g", doc_id, &mut node, describe(&["A"])).of_type("level")],
            )
            .unwrap();

        assert!(report.node("g").unwrap().outputs[0].is_failed());
        assert_eq!(doc.element_count(), 0);
    }
}
