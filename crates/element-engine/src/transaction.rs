//! Host transaction scopes and managers
//!
//! [`TransactionScope`] is an RAII wrapper: a scope that is dropped while
//! still started rolls the host transaction back. This is what guarantees
//! that a cancelled or abandoned pass never leaves a transaction half-open.
//!
//! Managers own the scopes for the duration of a pass and are passed
//! explicitly to everything that mutates a document; there is no ambient
//! "current transaction".

use std::collections::HashMap;

use crate::error::{EngineError, Result};
use crate::failure::FailureResolutionPolicy;
use crate::host::{HostDocument, TransactionStatus};
use crate::identity::DocumentId;
use crate::report::{Diagnostic, DocumentOutcome};

/// One open host transaction on one document
pub struct TransactionScope<'a, D: HostDocument + ?Sized> {
    document: &'a mut D,
    name: String,
    status: TransactionStatus,
}

impl<'a, D: HostDocument + ?Sized> TransactionScope<'a, D> {
    /// Open a transaction on `document`
    ///
    /// If the host refuses, the scope is never handed out. Should the host
    /// report a started transaction despite the error, it is rolled back so
    /// nothing is left half-open.
    pub fn begin(document: &'a mut D, name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        match document.begin_transaction(&name) {
            Ok(()) => {
                log::debug!("Started transaction '{}' on '{}'", name, document.title());
                Ok(Self {
                    document,
                    name,
                    status: TransactionStatus::Started,
                })
            }
            Err(e) => {
                if document.transaction_status() == TransactionStatus::Started {
                    if let Err(rollback_err) = document.rollback_transaction() {
                        log::error!(
                            "Failed to dispose half-open transaction '{}': {}",
                            name,
                            rollback_err
                        );
                    }
                }
                log::warn!(
                    "Could not start transaction '{}' on '{}': {}",
                    name,
                    document.title(),
                    e
                );
                Err(EngineError::TransactionStart {
                    document: document.id(),
                    name,
                    reason: e.to_string(),
                })
            }
        }
    }

    /// Transaction name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current status
    pub fn status(&self) -> TransactionStatus {
        self.status
    }

    /// Document this scope mutates
    pub fn document(&self) -> &D {
        &*self.document
    }

    /// Mutable access to the document; only valid while started
    pub fn document_mut(&mut self) -> Result<&mut D> {
        if self.status != TransactionStatus::Started {
            return Err(EngineError::TransactionNotOpen(self.document.id()));
        }
        Ok(&mut *self.document)
    }

    /// Finalize the transaction with `policy` handling host failures
    pub fn commit(&mut self, policy: &mut FailureResolutionPolicy) -> Result<TransactionStatus> {
        if self.status != TransactionStatus::Started {
            return Err(EngineError::TransactionNotOpen(self.document.id()));
        }

        policy.begin_commit(self.document.id());
        match self.document.commit_transaction(policy) {
            Ok(status) => {
                self.status = status;
                log::debug!("Transaction '{}' finished as {:?}", self.name, status);
                Ok(status)
            }
            Err(e) => {
                self.status = TransactionStatus::Error;
                if self.document.transaction_status() == TransactionStatus::Started {
                    if let Err(rollback_err) = self.document.rollback_transaction() {
                        log::error!(
                            "Failed to roll back '{}' after commit error: {}",
                            self.name,
                            rollback_err
                        );
                    }
                }
                Err(e.into())
            }
        }
    }

    /// Discard every change made in this transaction
    pub fn rollback(&mut self) -> Result<TransactionStatus> {
        if self.status != TransactionStatus::Started {
            return Err(EngineError::TransactionNotOpen(self.document.id()));
        }
        match self.document.rollback_transaction() {
            Ok(()) => {
                self.status = TransactionStatus::RolledBack;
                log::debug!("Transaction '{}' rolled back", self.name);
                Ok(self.status)
            }
            Err(e) => {
                self.status = TransactionStatus::Error;
                Err(e.into())
            }
        }
    }
}

impl<D: HostDocument + ?Sized> Drop for TransactionScope<'_, D> {
    fn drop(&mut self) {
        if self.status == TransactionStatus::Started {
            log::warn!(
                "Transaction '{}' on '{}' dropped while open, rolling back",
                self.name,
                self.document.title()
            );
            // Best-effort rollback; ignore errors since we're in drop.
            let _ = self.document.rollback_transaction();
        }
    }
}

/// Owns the single open scope for one document
pub struct TransactionManager<'a, D: HostDocument + ?Sized> {
    name: String,
    document_id: DocumentId,
    idle: Option<&'a mut D>,
    scope: Option<TransactionScope<'a, D>>,
}

impl<'a, D: HostDocument + ?Sized> TransactionManager<'a, D> {
    pub fn new(document: &'a mut D, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            document_id: document.id(),
            idle: Some(document),
            scope: None,
        }
    }

    /// The managed document's identity
    pub fn document_id(&self) -> DocumentId {
        self.document_id
    }

    /// Whether a transaction is currently open
    pub fn is_open(&self) -> bool {
        self.scope.is_some()
    }

    /// Mutable document access, opening the transaction on first use
    pub fn document(&mut self) -> Result<&mut D> {
        if self.scope.is_none() {
            let document = self
                .idle
                .take()
                .ok_or(EngineError::TransactionNotOpen(self.document_id))?;
            self.scope = Some(TransactionScope::begin(document, self.name.clone())?);
        }
        match self.scope.as_mut() {
            Some(scope) => scope.document_mut(),
            None => Err(EngineError::TransactionNotOpen(self.document_id)),
        }
    }

    /// Commit the open transaction; the scope is disposed either way
    pub fn commit(&mut self, policy: &mut FailureResolutionPolicy) -> Result<TransactionStatus> {
        let mut scope = self
            .scope
            .take()
            .ok_or(EngineError::TransactionNotOpen(self.document_id))?;
        let status = scope.commit(policy)?;
        if status.is_aborted() {
            log::warn!("Transaction '{}' aborted with status {:?}", self.name, status);
        }
        Ok(status)
    }

    /// Roll the open transaction back, if any
    pub fn rollback(&mut self) -> Result<TransactionStatus> {
        match self.scope.take() {
            Some(mut scope) => scope.rollback(),
            None => Ok(TransactionStatus::Uninitialized),
        }
    }
}

/// Owns one open scope per document for a multi-document pass
///
/// Documents are handed over up front and a scope is only opened the first
/// time something touches a document.
pub struct MultiDocumentTransactionManager<'a, D: HostDocument + ?Sized> {
    name: String,
    idle: HashMap<DocumentId, &'a mut D>,
    open: HashMap<DocumentId, TransactionScope<'a, D>>,
    /// Open order, so commits run in a deterministic order
    order: Vec<DocumentId>,
    failed: HashMap<DocumentId, String>,
}

impl<'a, D: HostDocument + ?Sized> MultiDocumentTransactionManager<'a, D> {
    pub fn new(name: impl Into<String>, documents: impl IntoIterator<Item = &'a mut D>) -> Self {
        let idle = documents.into_iter().map(|d| (d.id(), d)).collect();
        Self {
            name: name.into(),
            idle,
            open: HashMap::new(),
            order: Vec::new(),
            failed: HashMap::new(),
        }
    }

    /// Documents whose transaction could not be started, with the reason
    pub fn failed_documents(&self) -> &HashMap<DocumentId, String> {
        &self.failed
    }

    /// Mutable document access, lazily opening its transaction
    ///
    /// A document that failed to start once is not retried within the pass.
    pub fn document(&mut self, document: DocumentId) -> Result<&mut D> {
        if let Some(reason) = self.failed.get(&document) {
            return Err(EngineError::TransactionStart {
                document,
                name: self.name.clone(),
                reason: reason.clone(),
            });
        }

        if !self.open.contains_key(&document) {
            let doc = self
                .idle
                .remove(&document)
                .ok_or(EngineError::UnknownDocument(document))?;
            match TransactionScope::begin(doc, self.name.clone()) {
                Ok(scope) => {
                    self.open.insert(document, scope);
                    self.order.push(document);
                }
                Err(e) => {
                    let reason = match &e {
                        EngineError::TransactionStart { reason, .. } => reason.clone(),
                        other => other.to_string(),
                    };
                    self.failed.insert(document, reason);
                    return Err(e);
                }
            }
        }

        match self.open.get_mut(&document) {
            Some(scope) => scope.document_mut(),
            None => Err(EngineError::TransactionNotOpen(document)),
        }
    }

    /// Commit every open scope with the same policy
    ///
    /// Errors on one document do not stop the others from being committed
    /// or disposed. Once corruption has been seen, remaining scopes are
    /// rolled back instead.
    pub fn commit_all(&mut self, policy: &mut FailureResolutionPolicy) -> Vec<DocumentOutcome> {
        let mut outcomes = Vec::new();
        for document in std::mem::take(&mut self.order) {
            let Some(mut scope) = self.open.remove(&document) else {
                continue;
            };

            let result = if policy.corruption_detected() {
                log::warn!(
                    "Rolling back '{}' because another document reported corruption",
                    scope.document().title()
                );
                scope.rollback()
            } else {
                scope.commit(policy)
            };

            let mut diagnostics = policy.take_diagnostics_for(document);
            let status = match result {
                Ok(status) => status,
                Err(e) => {
                    log::error!("Commit of document {} failed: {}", document, e);
                    diagnostics.push(Diagnostic::error(e.to_string()));
                    TransactionStatus::Error
                }
            };
            if status.is_aborted() {
                log::warn!("Transaction aborted on document {} ({:?})", document, status);
                diagnostics.push(Diagnostic::error(format!(
                    "Transaction '{}' aborted ({:?})",
                    self.name, status
                )));
            }
            outcomes.push(DocumentOutcome {
                document,
                status,
                diagnostics,
            });
        }
        outcomes
    }

    /// Roll back every open scope
    pub fn rollback_all(&mut self) -> Vec<DocumentOutcome> {
        let mut outcomes = Vec::new();
        for document in std::mem::take(&mut self.order) {
            let Some(mut scope) = self.open.remove(&document) else {
                continue;
            };
            let (status, diagnostics) = match scope.rollback() {
                Ok(status) => (status, Vec::new()),
                Err(e) => (TransactionStatus::Error, vec![Diagnostic::error(e.to_string())]),
            };
            outcomes.push(DocumentOutcome {
                document,
                status,
                diagnostics,
            });
        }
        outcomes
    }
}
