//! Failure resolution policy
//!
//! The host calls [`FailureResolutionPolicy::process_failures`] while it
//! finalizes a transaction. The policy decides whether the transaction can be
//! committed, needs another validation round after some auto-fixes, or must be
//! rolled back.
//!
//! # Resolution order
//!
//! 1. `DocumentCorruption` always rolls back, nothing is attempted.
//! 2. For `Error` severity, expected failure kinds are tried first in the
//!    configured order, then the remaining failures grouped by kind in the
//!    order the host reported them. The first group that resolves anything
//!    returns `ProceedWithCommit` so the host re-validates.
//! 3. Warnings are dismissed and recorded as diagnostics.
//!
//! A kind is auto-resolved at most once per commit attempt, so the number of
//! re-validation rounds is bounded by the number of distinct kinds. The
//! `max_retry_cycles` cap bounds it independently of host behavior.

use std::collections::HashSet;

use crate::config::{FailurePolicyConfig, ResolutionAction};
use crate::host::{
    DialogResponse, FailureAccessor, FailureHandler, FailureId, FailureKind,
    FailureProcessingResult, FailureRecord, FailureSeverity, HostDialog,
};
use crate::identity::DocumentId;
use crate::report::Diagnostic;

/// Auto-fix and rollback decision logic used during commit
#[derive(Debug)]
pub struct FailureResolutionPolicy {
    config: FailurePolicyConfig,
    document: Option<DocumentId>,
    attempted_instances: HashSet<FailureId>,
    attempted_kinds: HashSet<FailureKind>,
    retry_cycles: u32,
    corruption_detected: bool,
    diagnostics: Vec<(Option<DocumentId>, Diagnostic)>,
}

impl FailureResolutionPolicy {
    /// Create a policy from configuration
    pub fn new(config: FailurePolicyConfig) -> Self {
        Self {
            config,
            document: None,
            attempted_instances: HashSet::new(),
            attempted_kinds: HashSet::new(),
            retry_cycles: 0,
            corruption_detected: false,
            diagnostics: Vec::new(),
        }
    }

    /// Reset per-attempt state before committing a document's transaction
    ///
    /// Diagnostics and the corruption flag survive across documents.
    pub fn begin_commit(&mut self, document: DocumentId) {
        self.document = Some(document);
        self.attempted_instances.clear();
        self.attempted_kinds.clear();
        self.retry_cycles = 0;
    }

    /// Whether any commit so far reported document corruption
    pub fn corruption_detected(&self) -> bool {
        self.corruption_detected
    }

    /// Number of re-validation rounds requested in the current commit
    pub fn retry_cycles(&self) -> u32 {
        self.retry_cycles
    }

    /// All diagnostics recorded so far
    pub fn diagnostics(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().map(|(_, d)| d)
    }

    /// Take the diagnostics recorded for one document
    pub fn take_diagnostics_for(&mut self, document: DocumentId) -> Vec<Diagnostic> {
        let (mine, rest): (Vec<_>, Vec<_>) = std::mem::take(&mut self.diagnostics)
            .into_iter()
            .partition(|(doc, _)| *doc == Some(document));
        self.diagnostics = rest;
        mine.into_iter().map(|(_, d)| d).collect()
    }

    fn record(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push((self.document, diagnostic));
    }

    fn record_failure(&mut self, failure: &FailureRecord) {
        let message = format!("{} ({})", failure.description, failure.kind);
        let diagnostic = match failure.severity {
            FailureSeverity::Remark => Diagnostic::remark(message),
            FailureSeverity::Warning => Diagnostic::warning(message),
            FailureSeverity::Error | FailureSeverity::DocumentCorruption => {
                Diagnostic::error(message)
            }
        };
        self.record(diagnostic.with_elements(failure.affected.clone()));
    }

    fn is_candidate(&self, failure: &FailureRecord) -> bool {
        failure.severity >= FailureSeverity::Error
            && !failure.resolution_attempted
            && !self.attempted_instances.contains(&failure.id)
            && !self.attempted_kinds.contains(&failure.kind)
    }

    /// Apply one action to a group of failures of the same kind
    fn resolve_group(
        &mut self,
        accessor: &mut dyn FailureAccessor,
        kind: &FailureKind,
        group: &[&FailureRecord],
        action: ResolutionAction,
    ) -> usize {
        self.attempted_kinds.insert(kind.clone());
        let mut resolved = 0;
        for failure in group {
            self.attempted_instances.insert(failure.id);
            let ok = match action {
                ResolutionAction::DefaultResolution => {
                    failure.has_resolution && accessor.resolve(failure.id)
                }
                ResolutionAction::DeleteAffected => accessor.delete_affected(failure.id),
            };
            if ok {
                resolved += 1;
                log::debug!("Resolved failure {:?} ({}) via {:?}", failure.id, kind, action);
            }
        }
        resolved
    }

    /// Try the caller-declared expected kinds in order
    fn resolve_expected(
        &mut self,
        accessor: &mut dyn FailureAccessor,
        failures: &[FailureRecord],
    ) -> usize {
        for expected in self.config.expected.clone() {
            let group: Vec<&FailureRecord> = failures
                .iter()
                .filter(|f| f.kind == expected.kind && self.is_candidate(f))
                .collect();
            if group.is_empty() {
                continue;
            }
            let resolved = self.resolve_group(accessor, &expected.kind, &group, expected.action);
            if resolved > 0 {
                return resolved;
            }
        }
        0
    }

    /// Try the remaining failures grouped by kind, in host order
    fn resolve_remaining(
        &mut self,
        accessor: &mut dyn FailureAccessor,
        failures: &[FailureRecord],
    ) -> usize {
        let mut kinds: Vec<&FailureKind> = Vec::new();
        for failure in failures {
            if self.is_candidate(failure) && !kinds.contains(&&failure.kind) {
                kinds.push(&failure.kind);
            }
        }

        for kind in kinds {
            let group: Vec<&FailureRecord> = failures
                .iter()
                .filter(|f| &f.kind == kind && self.is_candidate(f))
                .collect();
            let resolved = self.resolve_group(
                accessor,
                kind,
                &group,
                ResolutionAction::DefaultResolution,
            );
            if resolved > 0 {
                return resolved;
            }
        }
        0
    }
}

impl Default for FailureResolutionPolicy {
    fn default() -> Self {
        Self::new(FailurePolicyConfig::default())
    }
}

impl FailureHandler for FailureResolutionPolicy {
    fn process_failures(&mut self, accessor: &mut dyn FailureAccessor) -> FailureProcessingResult {
        let failures = accessor.failures();
        if failures.is_empty() {
            return FailureProcessingResult::Continue;
        }

        let severity = accessor.severity();
        if severity >= FailureSeverity::DocumentCorruption {
            log::error!("Document corruption reported during commit, rolling back");
            self.corruption_detected = true;
            for failure in failures.iter().filter(|f| f.severity >= FailureSeverity::Error) {
                self.record_failure(failure);
            }
            return FailureProcessingResult::ProceedWithRollback;
        }

        if severity >= FailureSeverity::Error {
            if self.retry_cycles >= self.config.max_retry_cycles {
                log::warn!(
                    "Giving up on failure resolution after {} cycles",
                    self.retry_cycles
                );
                self.record(Diagnostic::error(format!(
                    "Failures still unresolved after {} resolution cycles",
                    self.retry_cycles
                )));
                for failure in failures.iter().filter(|f| f.severity >= FailureSeverity::Error) {
                    self.record_failure(failure);
                }
                return FailureProcessingResult::ProceedWithRollback;
            }

            let resolved = match self.resolve_expected(accessor, &failures) {
                0 => self.resolve_remaining(accessor, &failures),
                n => n,
            };
            if resolved > 0 {
                self.retry_cycles += 1;
                log::debug!(
                    "Resolved {} failure(s), requesting re-validation (cycle {})",
                    resolved,
                    self.retry_cycles
                );
                return FailureProcessingResult::ProceedWithCommit;
            }

            log::warn!("Unresolvable failures during commit, rolling back");
            for failure in failures.iter().filter(|f| f.severity >= FailureSeverity::Error) {
                self.record_failure(failure);
            }
            return FailureProcessingResult::ProceedWithRollback;
        }

        for failure in &failures {
            self.record_failure(failure);
            if self.config.dismiss_warnings && !accessor.dismiss_warning(failure.id) {
                log::debug!("Host kept warning {:?} ({})", failure.id, failure.kind);
            }
        }
        FailureProcessingResult::Continue
    }

    fn on_dialog(&mut self, dialog: &HostDialog) -> DialogResponse {
        log::debug!("Suppressing host dialog '{}'", dialog.dialog_id);
        self.record(Diagnostic::remark(format!(
            "Suppressed host dialog '{}': {}",
            dialog.dialog_id, dialog.message
        )));
        DialogResponse::Suppress
    }
}
