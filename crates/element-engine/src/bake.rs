//! Materialization ("bake")
//!
//! Hands a node's elements over to the user: they are unpinned, optionally
//! grouped, and released from the previous-output record so later passes
//! neither reuse nor delete them. The node keeps its slot positions as
//! empty markers and will create fresh elements on its next pass.

use serde::{Deserialize, Serialize};

use crate::controller::PassController;
use crate::error::Result;
use crate::events::PassEvent;
use crate::failure::FailureResolutionPolicy;
use crate::host::{HostDocument, TransactionStatus};
use crate::identity::IdentityRef;
use crate::report::Diagnostic;
use crate::transaction::TransactionManager;

/// Options for [`PassController::materialize`]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MaterializeOptions {
    /// Group the released elements under a group with this name
    #[serde(default)]
    pub group_name: Option<String>,
}

/// What a materialization did
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MaterializeOutcome {
    pub status: TransactionStatus,
    /// Elements handed over to the user
    pub elements: Vec<IdentityRef>,
    pub group: Option<IdentityRef>,
    pub diagnostics: Vec<Diagnostic>,
}

impl MaterializeOutcome {
    pub fn committed(&self) -> bool {
        self.status == TransactionStatus::Committed
    }
}

impl PassController {
    /// Whether `node_id` holds at least one live element in `document`
    pub fn can_materialize<D: HostDocument + ?Sized>(&self, document: &D, node_id: &str) -> bool {
        self.record
            .identities_in(node_id, document.id())
            .iter()
            .any(|identity| document.is_live(identity))
    }

    /// Release a node's elements in `document` from engine management
    ///
    /// Runs in its own transaction. The record is only changed once that
    /// transaction has committed.
    pub fn materialize<D: HostDocument + ?Sized>(
        &mut self,
        document: &mut D,
        node_id: &str,
        options: &MaterializeOptions,
    ) -> Result<MaterializeOutcome> {
        let document_id = document.id();
        let elements: Vec<IdentityRef> = self
            .record
            .identities_in(node_id, document_id)
            .into_iter()
            .filter(|identity| document.is_live(identity))
            .collect();

        if elements.is_empty() {
            log::debug!("Nothing to materialize for '{}'", node_id);
            return Ok(MaterializeOutcome {
                status: TransactionStatus::Uninitialized,
                elements,
                group: None,
                diagnostics: Vec::new(),
            });
        }

        let mut manager = TransactionManager::new(document, format!("Bake {}", node_id));
        let mut group = None;
        {
            let doc = manager.document()?;
            for identity in &elements {
                if doc.is_pinned(&identity.element()) == Some(true) {
                    doc.set_pinned(&identity.element(), false)?;
                }
            }
            if let Some(name) = &options.group_name {
                let members: Vec<_> = elements.iter().map(IdentityRef::element).collect();
                group = Some(doc.create_group(name, &members)?);
            }
        }

        let mut policy = FailureResolutionPolicy::new(self.config.failure.clone());
        let status = manager.commit(&mut policy)?;
        let diagnostics = policy.take_diagnostics_for(document_id);

        if status != TransactionStatus::Committed {
            log::warn!("Materializing '{}' did not commit ({:?})", node_id, status);
            return Ok(MaterializeOutcome {
                status,
                elements: Vec::new(),
                group: None,
                diagnostics,
            });
        }

        let released = self.record.release(node_id, document_id);
        log::info!("Materialized {} element(s) of '{}'", released.len(), node_id);
        self.emit(PassEvent::Materialized {
            node_id: node_id.to_string(),
            document: document_id,
            elements: elements.clone(),
        });
        Ok(MaterializeOutcome {
            status,
            elements,
            group,
            diagnostics,
        })
    }
}
