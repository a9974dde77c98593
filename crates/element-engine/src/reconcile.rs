//! Per-invocation reconciliation
//!
//! For one node invocation, compare the previously recorded identity with
//! what the node now describes and pick exactly one [`Decision`]:
//!
//! | previous (live) | description | decision |
//! |-----------------|-------------|----------|
//! | yes, same tag, `reuse` accepts | some | Reuse |
//! | yes, otherwise | some | Replace (create, graft, then delete old) |
//! | no | some | Replace with no old element |
//! | yes | none | Delete |
//! | no | none | NoOp |
//!
//! A previous identity that no longer resolves, or that is not editable in
//! the current context, counts as "no previous". One that is alive but not
//! editable is handed back in [`Reconciled::kept`] so it stays tracked.

use crate::config::EngineConfig;
use crate::contract::{ElementDescription, ElementNode};
use crate::error::NodeError;
use crate::host::HostDocument;
use crate::identity::IdentityRef;
use crate::report::{Decision, Diagnostic, NodeReport, SlotOutput};

/// What one invocation resolved to, after any input was gathered
#[derive(Debug, Clone, PartialEq)]
pub enum Desired {
    Describe(ElementDescription),
    Absent,
    Failed(String),
}

/// Result of reconciling one invocation
#[derive(Debug, Clone, PartialEq)]
pub struct Reconciled {
    pub decision: Decision,
    pub output: SlotOutput,
    /// Entry to record for the slot
    pub entry: Option<IdentityRef>,
    /// Previous element that still exists but could not be touched
    pub kept: Option<IdentityRef>,
}

/// Reconcile one invocation against its previous entry
///
/// Node errors are turned into a failed slot here. Only
/// [`NodeError::Cancelled`] is returned, so the caller can abandon the
/// node's contribution.
pub fn reconcile<D: HostDocument + ?Sized>(
    document: &mut D,
    node: &mut dyn ElementNode<D>,
    previous: Option<IdentityRef>,
    desired: Desired,
    exclusions: &[String],
    config: &EngineConfig,
    report: &mut NodeReport,
) -> Result<Reconciled, NodeError> {
    let (live, kept) = match previous {
        Some(identity) => match usability(&*document, &identity, report) {
            Usability::Usable => (Some(identity), None),
            Usability::Gone => (None, None),
            Usability::Locked => (None, Some(identity)),
        },
        None => (None, None),
    };

    let result = match desired {
        Desired::Describe(description) => {
            describe(document, node, live, &description, exclusions, config, report)
        }
        Desired::Absent => Ok(remove(document, node, live, report)),
        Desired::Failed(message) => Ok(fail(document, node, live, &message, config, report)),
    };

    let mut reconciled = match result {
        Err(NodeError::Cancelled) => return Err(NodeError::Cancelled),
        Err(e) => fail(document, node, live, &e.to_string(), config, report),
        Ok(reconciled) => reconciled,
    };
    reconciled.kept = kept;
    Ok(reconciled)
}

enum Usability {
    Usable,
    /// No longer resolves in this document
    Gone,
    /// Alive but not editable (closed workset, inactive variant)
    Locked,
}

fn usability<D: HostDocument + ?Sized>(
    document: &D,
    identity: &IdentityRef,
    report: &mut NodeReport,
) -> Usability {
    if !document.is_live(identity) {
        log::debug!("Previous element {} no longer resolves, treating as absent", identity);
        return Usability::Gone;
    }
    if !document.is_editable(&identity.element()) {
        log::warn!("Previous element {} is not editable, treating as absent", identity);
        report.diagnostics.push(
            Diagnostic::warning("Previous element is not editable in the current context")
                .with_elements(vec![identity.element()]),
        );
        return Usability::Locked;
    }
    Usability::Usable
}

fn describe<D: HostDocument + ?Sized>(
    document: &mut D,
    node: &mut dyn ElementNode<D>,
    live: Option<IdentityRef>,
    desired: &ElementDescription,
    exclusions: &[String],
    config: &EngineConfig,
    report: &mut NodeReport,
) -> Result<Reconciled, NodeError> {
    if let Some(previous) = live {
        let same_category =
            document.element_category(&previous.element()).as_ref() == Some(&desired.category);
        if same_category && node.reuse(document, &previous, desired)? {
            pin(document, &previous, config, report);
            let element = document.identity(previous.element());
            log::debug!("Reusing {} for node '{}'", element, report.node_id);
            return Ok(Reconciled {
                decision: Decision::Reuse { element },
                output: SlotOutput::Element { element },
                entry: Some(element),
                kept: None,
            });
        }
    }

    let created = node.create(document, desired)?;
    if created.document() != document.id() {
        return Err(NodeError::failed(format!(
            "created element {} belongs to another document",
            created
        )));
    }

    if let Some(previous) = live {
        graft(document, &previous, &created, desired, exclusions, report);
    }
    pin(document, &created, config, report);

    // Never delete before the replacement exists
    if let Some(previous) = live {
        if let Err(e) = node.delete(document, &previous) {
            log::warn!("Could not delete replaced element {}: {}", previous, e);
            report.diagnostics.push(
                Diagnostic::warning(format!("Replaced element could not be deleted: {}", e))
                    .with_elements(vec![previous.element()]),
            );
        }
    }

    log::debug!(
        "Replaced {:?} with {} for node '{}'",
        live.map(|p| p.to_string()),
        created,
        report.node_id
    );
    Ok(Reconciled {
        decision: Decision::Replace {
            old: live,
            new: created,
        },
        output: SlotOutput::Element { element: created },
        entry: Some(created),
        kept: None,
    })
}

/// Carry user attributes from the replaced element over to its successor
fn graft<D: HostDocument + ?Sized>(
    document: &mut D,
    previous: &IdentityRef,
    created: &IdentityRef,
    desired: &ElementDescription,
    exclusions: &[String],
    report: &mut NodeReport,
) {
    let mut excluded: Vec<String> = exclusions.to_vec();
    excluded.extend(desired.parameters.keys().cloned());

    match document.copy_parameters(&previous.element(), &created.element(), &excluded) {
        Ok(copied) => log::trace!("Grafted {} parameter(s) onto {}", copied, created),
        Err(e) => {
            log::warn!("Could not copy parameters onto {}: {}", created, e);
            report.diagnostics.push(
                Diagnostic::warning(format!("User parameters were not carried over: {}", e))
                    .with_elements(vec![created.element()]),
            );
        }
    }
}

fn pin<D: HostDocument + ?Sized>(
    document: &mut D,
    element: &IdentityRef,
    config: &EngineConfig,
    report: &mut NodeReport,
) {
    if !config.pin_elements || document.is_pinned(&element.element()) != Some(false) {
        return;
    }
    if let Err(e) = document.set_pinned(&element.element(), true) {
        log::warn!("Could not pin {}: {}", element, e);
        report.diagnostics.push(
            Diagnostic::warning(format!("Element could not be pinned: {}", e))
                .with_elements(vec![element.element()]),
        );
    }
}

fn remove<D: HostDocument + ?Sized>(
    document: &mut D,
    node: &mut dyn ElementNode<D>,
    live: Option<IdentityRef>,
    report: &mut NodeReport,
) -> Reconciled {
    let Some(previous) = live else {
        return Reconciled {
            decision: Decision::NoOp,
            output: SlotOutput::Absent,
            entry: None,
            kept: None,
        };
    };

    match node.delete(document, &previous) {
        Ok(()) => {
            log::debug!("Deleted {} for node '{}'", previous, report.node_id);
            Reconciled {
                decision: Decision::Delete { old: previous },
                output: SlotOutput::Absent,
                entry: None,
                kept: None,
            }
        }
        Err(e) => {
            // Keep tracking it so the next pass tries again
            report
                .diagnostics
                .push(Diagnostic::error(format!("Could not delete element: {}", e)));
            Reconciled {
                decision: Decision::NoOp,
                output: SlotOutput::failed(e.to_string()),
                entry: Some(previous),
                kept: None,
            }
        }
    }
}

/// Failure path: the slot fails and the previous element is not orphaned
fn fail<D: HostDocument + ?Sized>(
    document: &mut D,
    node: &mut dyn ElementNode<D>,
    live: Option<IdentityRef>,
    message: &str,
    config: &EngineConfig,
    report: &mut NodeReport,
) -> Reconciled {
    log::warn!("Node '{}' failed: {}", report.node_id, message);
    report.diagnostics.push(Diagnostic::error(message));

    let (decision, entry) = match live {
        Some(previous) if config.delete_on_node_failure => {
            match node.delete(document, &previous) {
                Ok(()) => (Decision::Delete { old: previous }, None),
                Err(e) => {
                    report.diagnostics.push(Diagnostic::warning(format!(
                        "Previous element of failed node could not be deleted: {}",
                        e
                    )));
                    (Decision::NoOp, Some(previous))
                }
            }
        }
        Some(previous) => (Decision::NoOp, Some(previous)),
        None => (Decision::NoOp, None),
    };

    Reconciled {
        decision,
        output: SlotOutput::failed(message),
        entry,
        kept: None,
    }
}
