//! In-memory host document
//!
//! A complete [`HostDocument`] that keeps its elements in a map and rolls back
//! by restoring a snapshot taken when the transaction started. It is what the
//! engine's tests run against, and a reasonable reference for embedders
//! writing an adapter for a real modeling application.
//!
//! Failures can be scripted to fire on the next commit, which is how the
//! failure resolution paths are exercised.

use std::collections::BTreeMap;

use crate::error::HostError;
use crate::host::{
    DialogResponse, ElementCategory, FailureAccessor, FailureHandler, FailureId, FailureKind,
    FailureProcessingResult, FailureRecord, FailureSeverity, HostDialog, HostDocument, Parameters,
    TransactionStatus,
};
use crate::identity::{DocumentId, ElementHandle, ElementId, IdentityRef};

/// Host-side validation rounds before the document gives up on its own
const MAX_HOST_ROUNDS: usize = 32;

/// One element stored in a [`MemoryDocument`]
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryElement {
    pub category: ElementCategory,
    pub parameters: Parameters,
    pub pinned: bool,
    /// False when the element's workset is closed
    pub editable: bool,
    handle: u64,
}

/// A failure that will be raised on the next commit
#[derive(Debug, Clone)]
pub struct ScriptedFailure {
    pub kind: FailureKind,
    pub severity: FailureSeverity,
    pub description: String,
    pub has_resolution: bool,
    /// Comes back under a new id after being resolved
    pub recurs: bool,
    /// Affected elements; `None` means "everything created in the transaction"
    pub affected: Option<Vec<ElementId>>,
    pub dialog: Option<HostDialog>,
}

impl ScriptedFailure {
    pub fn new(kind: impl Into<String>, severity: FailureSeverity) -> Self {
        let kind = kind.into();
        Self {
            description: format!("Scripted {} failure", kind),
            kind: FailureKind::new(kind),
            severity,
            has_resolution: true,
            recurs: false,
            affected: None,
            dialog: None,
        }
    }

    pub fn without_resolution(mut self) -> Self {
        self.has_resolution = false;
        self
    }

    pub fn recurring(mut self) -> Self {
        self.recurs = true;
        self
    }

    pub fn affecting(mut self, elements: Vec<ElementId>) -> Self {
        self.affected = Some(elements);
        self
    }

    pub fn with_dialog(mut self, dialog_id: impl Into<String>, message: impl Into<String>) -> Self {
        self.dialog = Some(HostDialog {
            dialog_id: dialog_id.into(),
            message: message.into(),
        });
        self
    }
}

#[derive(Debug, Clone)]
struct ActiveFailure {
    record: FailureRecord,
    recurs: bool,
}

/// In-process host document
#[derive(Debug)]
pub struct MemoryDocument {
    id: DocumentId,
    title: String,
    read_only: bool,
    status: TransactionStatus,
    elements: BTreeMap<ElementId, MemoryElement>,
    snapshot: Option<BTreeMap<ElementId, MemoryElement>>,
    created_in_transaction: Vec<ElementId>,
    scripted: Vec<ScriptedFailure>,
    reject_commit: Option<String>,
    next_handle: u64,
    next_failure: u64,
    mutations: usize,
    dialogs: Vec<(HostDialog, DialogResponse)>,
}

impl MemoryDocument {
    pub fn new(title: impl Into<String>) -> Self {
        Self::with_id(DocumentId::new(), title)
    }

    /// Create a document with a known identity (e.g. after reload)
    pub fn with_id(id: DocumentId, title: impl Into<String>) -> Self {
        Self {
            id,
            title: title.into(),
            read_only: false,
            status: TransactionStatus::Uninitialized,
            elements: BTreeMap::new(),
            snapshot: None,
            created_in_transaction: Vec::new(),
            scripted: Vec::new(),
            reject_commit: None,
            next_handle: 1,
            next_failure: 1,
            mutations: 0,
            dialogs: Vec::new(),
        }
    }

    /// Refuse new transactions
    pub fn set_read_only(&mut self, read_only: bool) {
        self.read_only = read_only;
    }

    /// Raise `failure` on the next commit
    pub fn script_failure(&mut self, failure: ScriptedFailure) {
        self.scripted.push(failure);
    }

    /// Make the next commit fail outright, leaving the transaction open
    pub fn reject_next_commit(&mut self, reason: impl Into<String>) {
        self.reject_commit = Some(reason.into());
    }

    /// Number of elements in the document
    pub fn element_count(&self) -> usize {
        self.elements.len()
    }

    /// Number of element mutations issued so far
    pub fn mutation_count(&self) -> usize {
        self.mutations
    }

    /// Look at an element
    pub fn element(&self, id: &ElementId) -> Option<&MemoryElement> {
        self.elements.get(id)
    }

    /// Identities of every element, in identity order
    pub fn element_ids(&self) -> Vec<ElementId> {
        self.elements.keys().copied().collect()
    }

    /// Copy of the full element state, for before/after comparisons
    pub fn contents(&self) -> BTreeMap<ElementId, MemoryElement> {
        self.elements.clone()
    }

    /// Dialogs raised during commits and how they were answered
    pub fn dialogs(&self) -> &[(HostDialog, DialogResponse)] {
        &self.dialogs
    }

    /// Simulate a user editing a parameter by hand, outside the graph
    pub fn user_edit(&mut self, element: &ElementId, name: &str, value: serde_json::Value) -> bool {
        match self.elements.get_mut(element) {
            Some(el) => {
                el.parameters.insert(name.to_string(), value);
                true
            }
            None => false,
        }
    }

    /// Simulate a user deleting an element by hand
    pub fn user_delete(&mut self, element: &ElementId) -> bool {
        self.elements.remove(element).is_some()
    }

    /// Simulate closing or opening the workset an element lives in
    pub fn set_editable(&mut self, element: &ElementId, editable: bool) -> bool {
        match self.elements.get_mut(element) {
            Some(el) => {
                el.editable = editable;
                true
            }
            None => false,
        }
    }

    /// Simulate a regeneration: every in-session handle changes
    pub fn regenerate(&mut self) {
        for el in self.elements.values_mut() {
            el.handle = self.next_handle;
            self.next_handle += 1;
        }
    }

    fn require_transaction(&self) -> Result<(), HostError> {
        if self.status != TransactionStatus::Started {
            return Err(HostError::NoTransaction(self.id));
        }
        Ok(())
    }

    fn require_editable(&self, element: &ElementId) -> Result<&MemoryElement, HostError> {
        let el = self
            .elements
            .get(element)
            .ok_or(HostError::ElementNotFound(*element))?;
        if !el.editable {
            return Err(HostError::NotEditable(*element));
        }
        Ok(el)
    }

    fn restore_snapshot(&mut self) {
        if let Some(snapshot) = self.snapshot.take() {
            self.elements = snapshot;
        }
        self.created_in_transaction.clear();
        self.status = TransactionStatus::RolledBack;
    }

    fn finalize(&mut self) -> TransactionStatus {
        self.snapshot = None;
        self.created_in_transaction.clear();
        self.status = TransactionStatus::Committed;
        self.status
    }

    fn post_scripted_failures(&mut self) -> Vec<ActiveFailure> {
        let mut active = Vec::new();
        for scripted in std::mem::take(&mut self.scripted) {
            let id = FailureId(self.next_failure);
            self.next_failure += 1;
            let affected = scripted
                .affected
                .clone()
                .unwrap_or_else(|| self.created_in_transaction.clone());
            active.push(ActiveFailure {
                record: FailureRecord {
                    id,
                    kind: scripted.kind.clone(),
                    severity: scripted.severity,
                    description: scripted.description.clone(),
                    affected,
                    has_resolution: scripted.has_resolution,
                    resolution_attempted: false,
                },
                recurs: scripted.recurs,
            });
        }
        active
    }
}

/// Accessor handed to the failure handler during [`MemoryDocument`] commits
struct MemoryFailureAccessor<'a> {
    elements: &'a mut BTreeMap<ElementId, MemoryElement>,
    failures: &'a mut Vec<ActiveFailure>,
    reposted: Vec<ActiveFailure>,
    next_failure: &'a mut u64,
    mutations: &'a mut usize,
}

impl MemoryFailureAccessor<'_> {
    fn take(&mut self, failure: FailureId) -> Option<ActiveFailure> {
        let pos = self.failures.iter().position(|f| f.record.id == failure)?;
        Some(self.failures.remove(pos))
    }

    fn repost_if_recurring(&mut self, failure: ActiveFailure) {
        if failure.recurs {
            let mut again = failure;
            again.record.id = FailureId(*self.next_failure);
            again.record.resolution_attempted = true;
            *self.next_failure += 1;
            self.reposted.push(again);
        }
    }
}

impl FailureAccessor for MemoryFailureAccessor<'_> {
    fn severity(&self) -> FailureSeverity {
        self.failures
            .iter()
            .map(|f| f.record.severity)
            .max()
            .unwrap_or(FailureSeverity::Remark)
    }

    fn failures(&self) -> Vec<FailureRecord> {
        self.failures.iter().map(|f| f.record.clone()).collect()
    }

    fn resolve(&mut self, failure: FailureId) -> bool {
        let resolvable = self
            .failures
            .iter()
            .any(|f| f.record.id == failure && f.record.has_resolution);
        if !resolvable {
            return false;
        }
        match self.take(failure) {
            Some(resolved) => {
                self.repost_if_recurring(resolved);
                true
            }
            None => false,
        }
    }

    fn delete_affected(&mut self, failure: FailureId) -> bool {
        let Some(resolved) = self.take(failure) else {
            return false;
        };
        for element in &resolved.record.affected {
            if self.elements.remove(element).is_some() {
                *self.mutations += 1;
            }
        }
        self.repost_if_recurring(resolved);
        true
    }

    fn dismiss_warning(&mut self, failure: FailureId) -> bool {
        let is_warning = self
            .failures
            .iter()
            .any(|f| f.record.id == failure && f.record.severity <= FailureSeverity::Warning);
        is_warning && self.take(failure).is_some()
    }
}

impl HostDocument for MemoryDocument {
    fn id(&self) -> DocumentId {
        self.id
    }

    fn title(&self) -> &str {
        &self.title
    }

    fn begin_transaction(&mut self, name: &str) -> Result<(), HostError> {
        if self.read_only {
            return Err(HostError::ReadOnly(self.id));
        }
        if self.status == TransactionStatus::Started {
            return Err(HostError::TransactionAlreadyOpen(self.id));
        }
        log::trace!("MemoryDocument '{}': begin '{}'", self.title, name);
        self.snapshot = Some(self.elements.clone());
        self.created_in_transaction.clear();
        self.status = TransactionStatus::Started;
        Ok(())
    }

    fn commit_transaction(
        &mut self,
        handler: &mut dyn FailureHandler,
    ) -> Result<TransactionStatus, HostError> {
        self.require_transaction()?;
        if let Some(reason) = self.reject_commit.take() {
            return Err(HostError::Rejected(reason));
        }

        let scripted_dialogs: Vec<HostDialog> =
            self.scripted.iter().filter_map(|s| s.dialog.clone()).collect();
        for dialog in scripted_dialogs {
            let response = handler.on_dialog(&dialog);
            self.dialogs.push((dialog, response));
        }

        let mut failures = self.post_scripted_failures();
        for _ in 0..MAX_HOST_ROUNDS {
            if failures.is_empty() {
                return Ok(self.finalize());
            }

            let (result, reposted) = {
                let mut accessor = MemoryFailureAccessor {
                    elements: &mut self.elements,
                    failures: &mut failures,
                    reposted: Vec::new(),
                    next_failure: &mut self.next_failure,
                    mutations: &mut self.mutations,
                };
                let result = handler.process_failures(&mut accessor);
                (result, accessor.reposted)
            };

            match result {
                FailureProcessingResult::Continue => {
                    let blocking = failures
                        .iter()
                        .any(|f| f.record.severity >= FailureSeverity::Error);
                    if blocking {
                        self.restore_snapshot();
                        return Ok(self.status);
                    }
                    return Ok(self.finalize());
                }
                FailureProcessingResult::ProceedWithCommit => {
                    failures.extend(reposted);
                }
                FailureProcessingResult::ProceedWithRollback => {
                    self.restore_snapshot();
                    return Ok(self.status);
                }
            }
        }

        log::warn!(
            "MemoryDocument '{}': failures did not settle after {} rounds",
            self.title,
            MAX_HOST_ROUNDS
        );
        self.restore_snapshot();
        Ok(self.status)
    }

    fn rollback_transaction(&mut self) -> Result<(), HostError> {
        self.require_transaction()?;
        self.restore_snapshot();
        Ok(())
    }

    fn transaction_status(&self) -> TransactionStatus {
        self.status
    }

    fn resolve(&self, element: &ElementId) -> Option<ElementHandle> {
        self.elements.get(element).map(|el| ElementHandle(el.handle))
    }

    fn is_editable(&self, element: &ElementId) -> bool {
        self.elements.get(element).map_or(false, |el| el.editable)
    }

    fn element_category(&self, element: &ElementId) -> Option<ElementCategory> {
        self.elements.get(element).map(|el| el.category.clone())
    }

    fn create_element(
        &mut self,
        category: &ElementCategory,
        parameters: &Parameters,
    ) -> Result<IdentityRef, HostError> {
        self.require_transaction()?;
        let element = ElementId::new();
        let handle = self.next_handle;
        self.next_handle += 1;
        self.elements.insert(
            element,
            MemoryElement {
                category: category.clone(),
                parameters: parameters.clone(),
                pinned: false,
                editable: true,
                handle,
            },
        );
        self.created_in_transaction.push(element);
        self.mutations += 1;
        Ok(IdentityRef::new(self.id, element).with_handle(ElementHandle(handle)))
    }

    fn parameter(&self, element: &ElementId, name: &str) -> Option<serde_json::Value> {
        self.elements.get(element)?.parameters.get(name).cloned()
    }

    fn set_parameter(
        &mut self,
        element: &ElementId,
        name: &str,
        value: serde_json::Value,
    ) -> Result<(), HostError> {
        self.require_transaction()?;
        self.require_editable(element)?;
        if let Some(el) = self.elements.get_mut(element) {
            el.parameters.insert(name.to_string(), value);
            self.mutations += 1;
        }
        Ok(())
    }

    fn delete_elements(&mut self, elements: &[ElementId]) -> Result<usize, HostError> {
        self.require_transaction()?;
        let mut deleted = 0;
        for element in elements {
            if self.elements.remove(element).is_some() {
                deleted += 1;
                self.mutations += 1;
            }
        }
        Ok(deleted)
    }

    fn copy_parameters(
        &mut self,
        from: &ElementId,
        to: &ElementId,
        exclusions: &[String],
    ) -> Result<usize, HostError> {
        self.require_transaction()?;
        let source = self
            .elements
            .get(from)
            .ok_or(HostError::ElementNotFound(*from))?
            .parameters
            .clone();
        let target = self
            .elements
            .get_mut(to)
            .ok_or(HostError::ElementNotFound(*to))?;

        let mut copied = 0;
        for (name, value) in source {
            if exclusions.iter().any(|e| *e == name) {
                continue;
            }
            target.parameters.insert(name, value);
            copied += 1;
        }
        if copied > 0 {
            self.mutations += 1;
        }
        Ok(copied)
    }

    fn is_pinned(&self, element: &ElementId) -> Option<bool> {
        self.elements.get(element).map(|el| el.pinned)
    }

    fn set_pinned(&mut self, element: &ElementId, pinned: bool) -> Result<(), HostError> {
        self.require_transaction()?;
        self.require_editable(element)?;
        if let Some(el) = self.elements.get_mut(element) {
            el.pinned = pinned;
            self.mutations += 1;
        }
        Ok(())
    }

    fn create_group(
        &mut self,
        name: &str,
        members: &[ElementId],
    ) -> Result<IdentityRef, HostError> {
        self.require_transaction()?;
        for member in members {
            if !self.elements.contains_key(member) {
                return Err(HostError::ElementNotFound(*member));
            }
        }
        let mut parameters = Parameters::new();
        parameters.insert("name".to_string(), serde_json::json!(name));
        parameters.insert(
            "members".to_string(),
            serde_json::to_value(members).map_err(|e| HostError::Rejected(e.to_string()))?,
        );
        self.create_element(&ElementCategory::Group, &parameters)
    }
}
