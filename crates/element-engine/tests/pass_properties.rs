//! End-to-end properties of solution passes against the in-memory host

use std::sync::Arc;

use element_engine::{
    sync_parameters, ChannelInputSource, Decision, ElementCategory,
    ElementDescription, ElementNode, EngineConfig, ExpectedFailure, FailureSeverity,
    HostDocument, IdentityRef, InputRequest, InputResponse, Invocation, MaterializeOptions,
    MemoryDocument, NodeError, NodeRun, PassController, PassEvent, PassOutcome, PassReport,
    PreviousOutputRecord, ResolutionAction, ScriptedFailure, SlotOutput, TransactionStatus,
    VecEventSink,
};
use serde_json::json;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Direct shape box; geometry changes are applied in place
#[derive(Default)]
struct BoxNode;

impl ElementNode<MemoryDocument> for BoxNode {
    fn reuse(
        &mut self,
        document: &mut MemoryDocument,
        previous: &IdentityRef,
        desired: &ElementDescription,
    ) -> Result<bool, NodeError> {
        sync_parameters(document, &previous.element(), &desired.parameters)?;
        Ok(true)
    }

    fn create(
        &mut self,
        document: &mut MemoryDocument,
        desired: &ElementDescription,
    ) -> Result<IdentityRef, NodeError> {
        Ok(document.create_element(&desired.category, &desired.parameters)?)
    }
}

/// Component placement; a different family type forces a replacement
#[derive(Default)]
struct FamilyNode;

impl ElementNode<MemoryDocument> for FamilyNode {
    fn reuse(
        &mut self,
        document: &mut MemoryDocument,
        previous: &IdentityRef,
        desired: &ElementDescription,
    ) -> Result<bool, NodeError> {
        let current = document.parameter(&previous.element(), "family_type");
        if current.as_ref() != desired.parameter("family_type") {
            return Ok(false);
        }
        sync_parameters(document, &previous.element(), &desired.parameters)?;
        Ok(true)
    }

    fn create(
        &mut self,
        document: &mut MemoryDocument,
        desired: &ElementDescription,
    ) -> Result<IdentityRef, NodeError> {
        let family = desired
            .parameter("family_type")
            .and_then(|v| v.as_str())
            .ok_or_else(|| NodeError::invalid("family_type is required"))?;
        let mut parameters = desired.parameters.clone();
        parameters.insert("type_id".to_string(), json!(format!("{}-type", family)));
        Ok(document.create_element(&desired.category, &parameters)?)
    }

    fn excluded_parameters(&self) -> Vec<String> {
        vec!["type_id".to_string()]
    }
}

fn box_desc(width: f64) -> ElementDescription {
    ElementDescription::new(ElementCategory::DirectShape)
        .with_parameter("shape", json!("box"))
        .with_parameter("width", json!(width))
        .with_parameter("depth", json!(1.0))
        .with_parameter("height", json!(1.0))
}

fn one_box(width: f64) -> Vec<Invocation> {
    vec![Invocation::Describe(box_desc(width))]
}

fn family_desc(family: &str, x: f64) -> ElementDescription {
    ElementDescription::new(ElementCategory::FamilyInstance)
        .with_parameter("family_type", json!(family))
        .with_parameter("x", json!(x))
}

fn run<N: ElementNode<MemoryDocument>>(
    controller: &mut PassController,
    document: &mut MemoryDocument,
    node_id: &str,
    node: &mut N,
    invocations: Vec<Invocation>,
) -> PassReport {
    let document_id = document.id();
    controller
        .run_pass(
            [document],
            vec![NodeRun::new(node_id, document_id, node, invocations)],
        )
        .unwrap()
}

fn element_of(report: &PassReport, node_id: &str, slot: usize) -> IdentityRef {
    report.node(node_id).unwrap().outputs[slot]
        .element()
        .expect("slot should hold an element")
}

#[test]
fn unchanged_pass_reuses_everything_without_mutations() {
    init_logging();
    let mut doc = MemoryDocument::new("Model");
    let mut controller = PassController::new(EngineConfig::default());
    let mut node = BoxNode;
    let invocations = || {
        vec![
            Invocation::Describe(box_desc(1.0)),
            Invocation::Describe(box_desc(2.0)),
            Invocation::Absent,
        ]
    };

    let first = run(&mut controller, &mut doc, "boxes", &mut node, invocations());
    assert!(first.committed());
    let mutations = doc.mutation_count();

    let second = run(&mut controller, &mut doc, "boxes", &mut node, invocations());
    assert!(second.committed());
    assert_eq!(doc.mutation_count(), mutations);

    let decisions = &second.node("boxes").unwrap().decisions;
    assert!(matches!(decisions[0], Decision::Reuse { .. }));
    assert!(matches!(decisions[1], Decision::Reuse { .. }));
    assert_eq!(decisions[2], Decision::NoOp);
    assert_eq!(element_of(&first, "boxes", 0), element_of(&second, "boxes", 0));
}

#[test]
fn corruption_rolls_back_document_and_record() {
    init_logging();
    let mut doc = MemoryDocument::new("Model");
    let doc_id = doc.id();
    let mut controller = PassController::new(EngineConfig::default());
    let (mut boxes, mut family) = (BoxNode, FamilyNode);

    controller
        .run_pass(
            [&mut doc],
            vec![
                NodeRun::new("box", doc_id, &mut boxes, one_box(1.0)),
                NodeRun::new(
                    "desk",
                    doc_id,
                    &mut family,
                    vec![Invocation::Describe(family_desc("Desk", 0.0))],
                ),
            ],
        )
        .unwrap();
    let contents = doc.contents();
    let record = controller.record().clone();

    // "box" dropped out of the graph and "desk" changed type
    doc.script_failure(ScriptedFailure::new("corrupt", FailureSeverity::DocumentCorruption));
    let report = run(
        &mut controller,
        &mut doc,
        "desk",
        &mut family,
        vec![Invocation::Describe(family_desc("Chair", 5.0))],
    );

    assert_eq!(report.outcome, PassOutcome::RolledBack);
    assert!(report.node("desk").unwrap().has_failures());
    assert!(report.stale_deleted.is_empty());
    assert!(!report.diagnostics.is_empty());
    assert_eq!(doc.contents(), contents);
    assert_eq!(controller.record(), &record);
}

#[test]
fn removed_nodes_and_shrunk_outputs_leave_no_orphans() {
    init_logging();
    let mut doc = MemoryDocument::new("Model");
    let doc_id = doc.id();
    let mut controller = PassController::new(EngineConfig::default());
    let (mut a, mut b) = (BoxNode, BoxNode);

    controller
        .run_pass(
            [&mut doc],
            vec![
                NodeRun::new(
                    "a",
                    doc_id,
                    &mut a,
                    vec![
                        Invocation::Describe(box_desc(1.0)),
                        Invocation::Describe(box_desc(2.0)),
                        Invocation::Describe(box_desc(3.0)),
                    ],
                ),
                NodeRun::new("b", doc_id, &mut b, one_box(4.0)),
            ],
        )
        .unwrap();
    assert_eq!(doc.element_count(), 4);

    // "b" is gone from the graph and "a" now produces a single box
    let report = run(&mut controller, &mut doc, "a", &mut a, one_box(1.0));

    assert!(report.committed());
    assert_eq!(report.stale_deleted.len(), 3);
    assert_eq!(doc.element_count(), 1);
    assert!(!controller.record().contains("b"));
    assert_eq!(controller.record().get("a").unwrap().len(), 1);
    let tracked = controller.record().tracked_identities();
    assert!(doc.element_ids().iter().all(|id| tracked.iter().any(|t| t.element() == *id)));
}

#[test]
fn reuse_keeps_user_edits() {
    init_logging();
    let mut doc = MemoryDocument::new("Model");
    let mut controller = PassController::new(EngineConfig::default());
    let mut node = BoxNode;

    let first = run(&mut controller, &mut doc, "box", &mut node, one_box(1.0));
    let element = element_of(&first, "box", 0);
    doc.user_edit(&element.element(), "mark", json!("B-101"));
    doc.user_edit(&element.element(), "comments", json!("do not move"));

    let second = run(&mut controller, &mut doc, "box", &mut node, one_box(2.5));

    assert_eq!(element_of(&second, "box", 0), element);
    assert_eq!(doc.parameter(&element.element(), "width"), Some(json!(2.5)));
    assert_eq!(doc.parameter(&element.element(), "mark"), Some(json!("B-101")));
    assert_eq!(doc.parameter(&element.element(), "comments"), Some(json!("do not move")));
}

#[test]
fn replace_creates_new_identity_and_copies_user_attributes() {
    init_logging();
    let mut doc = MemoryDocument::new("Model");
    let mut controller = PassController::new(EngineConfig::default());
    let mut node = FamilyNode;

    let first = run(
        &mut controller,
        &mut doc,
        "seat",
        &mut node,
        vec![Invocation::Describe(family_desc("Desk", 0.0))],
    );
    let old = element_of(&first, "seat", 0);
    doc.user_edit(&old.element(), "comments", json!("reviewed"));

    let second = run(
        &mut controller,
        &mut doc,
        "seat",
        &mut node,
        vec![Invocation::Describe(family_desc("Chair", 0.0))],
    );
    let new = element_of(&second, "seat", 0);

    assert_ne!(new.element(), old.element());
    assert!(matches!(
        second.node("seat").unwrap().decisions[0],
        Decision::Replace { old: Some(o), .. } if o == old
    ));
    assert!(doc.element(&old.element()).is_none());
    assert_eq!(doc.parameter(&new.element(), "comments"), Some(json!("reviewed")));
    assert_eq!(doc.parameter(&new.element(), "type_id"), Some(json!("Chair-type")));
    assert_eq!(doc.parameter(&new.element(), "family_type"), Some(json!("Chair")));
    assert!(doc.element(&new.element()).unwrap().pinned);
}

#[test]
fn box_lifecycle_create_reuse_delete() {
    init_logging();
    let mut doc = MemoryDocument::new("Model");
    let mut controller = PassController::new(EngineConfig::default());
    let mut node = BoxNode;

    let created = run(&mut controller, &mut doc, "box", &mut node, one_box(1.0));
    assert!(matches!(
        created.node("box").unwrap().decisions[0],
        Decision::Replace { old: None, .. }
    ));
    let element = element_of(&created, "box", 0);

    let reused = run(&mut controller, &mut doc, "box", &mut node, one_box(1.0));
    assert_eq!(reused.node("box").unwrap().decisions[0], Decision::Reuse { element });

    let deleted = run(&mut controller, &mut doc, "box", &mut node, vec![Invocation::Absent]);
    assert_eq!(deleted.node("box").unwrap().decisions[0], Decision::Delete { old: element });
    assert_eq!(deleted.node("box").unwrap().outputs[0], SlotOutput::Absent);
    assert_eq!(doc.element_count(), 0);
    assert_eq!(controller.record().get("box").unwrap(), &[None]);
}

#[test]
fn failing_document_only_aborts_itself() {
    init_logging();
    let mut a = MemoryDocument::new("A");
    let mut b = MemoryDocument::new("B");
    let (a_id, b_id) = (a.id(), b.id());
    b.script_failure(ScriptedFailure::new("overlap", FailureSeverity::Error).without_resolution());

    let mut controller = PassController::new(EngineConfig::default());
    let (mut in_a, mut in_b) = (BoxNode, BoxNode);
    let report = controller
        .run_pass(
            [&mut a, &mut b],
            vec![
                NodeRun::new("in-a", a_id, &mut in_a, one_box(1.0)),
                NodeRun::new("in-b", b_id, &mut in_b, one_box(1.0)),
            ],
        )
        .unwrap();

    assert_eq!(report.outcome, PassOutcome::PartiallyCommitted);
    assert_eq!(report.document(a_id).unwrap().status, TransactionStatus::Committed);
    assert_eq!(report.document(b_id).unwrap().status, TransactionStatus::RolledBack);
    assert!(!report.node("in-a").unwrap().has_failures());
    assert!(report.node("in-b").unwrap().has_failures());
    assert_eq!(a.element_count(), 1);
    assert_eq!(b.element_count(), 0);
    assert!(controller.record().contains("in-a"));
    assert!(!controller.record().contains("in-b"));
}

#[test]
fn corruption_in_one_document_aborts_the_pass() {
    init_logging();
    let mut a = MemoryDocument::new("A");
    let mut b = MemoryDocument::new("B");
    let (a_id, b_id) = (a.id(), b.id());
    a.script_failure(ScriptedFailure::new("corrupt", FailureSeverity::DocumentCorruption));

    let mut controller = PassController::new(EngineConfig::default());
    let (mut in_a, mut in_b) = (BoxNode, BoxNode);
    let report = controller
        .run_pass(
            [&mut a, &mut b],
            vec![
                NodeRun::new("in-a", a_id, &mut in_a, one_box(1.0)),
                NodeRun::new("in-b", b_id, &mut in_b, one_box(1.0)),
            ],
        )
        .unwrap();

    assert_eq!(report.outcome, PassOutcome::RolledBack);
    assert_eq!(a.element_count(), 0);
    assert_eq!(b.element_count(), 0);
    assert!(controller.record().is_empty());
}

#[test]
fn corruption_in_a_later_document_keeps_earlier_commits() {
    init_logging();
    let mut a = MemoryDocument::new("A");
    let mut b = MemoryDocument::new("B");
    let (a_id, b_id) = (a.id(), b.id());
    b.script_failure(ScriptedFailure::new("corrupt", FailureSeverity::DocumentCorruption));

    let mut controller = PassController::new(EngineConfig::default());
    let (mut in_a, mut in_b) = (BoxNode, BoxNode);
    let report = controller
        .run_pass(
            [&mut a, &mut b],
            vec![
                NodeRun::new("in-a", a_id, &mut in_a, one_box(1.0)),
                NodeRun::new("in-b", b_id, &mut in_b, one_box(1.0)),
            ],
        )
        .unwrap();

    // "A" was already committed when "B" reported the corruption
    assert_eq!(report.outcome, PassOutcome::PartiallyCommitted);
    assert_eq!(report.document(a_id).unwrap().status, TransactionStatus::Committed);
    assert!(!report.document(b_id).unwrap().committed());
    assert!(!report.diagnostics.is_empty());
    assert!(report.node("in-b").unwrap().has_failures());
    assert_eq!(a.element_count(), 1);
    assert_eq!(b.element_count(), 0);
    assert!(controller.record().contains("in-a"));
    assert!(!controller.record().contains("in-b"));
}

#[test]
fn duplicate_node_ids_only_reconcile_the_first_run() {
    init_logging();
    let mut doc = MemoryDocument::new("Model");
    let doc_id = doc.id();
    let mut controller = PassController::new(EngineConfig::default());
    let (mut first, mut second) = (BoxNode, FamilyNode);

    let report = controller
        .run_pass(
            [&mut doc],
            vec![
                NodeRun::new("n", doc_id, &mut first, one_box(1.0)),
                NodeRun::new(
                    "n",
                    doc_id,
                    &mut second,
                    vec![Invocation::Describe(family_desc("Desk", 0.0))],
                ),
            ],
        )
        .unwrap();

    assert!(report.committed());
    assert_eq!(report.nodes.len(), 2);
    let duplicate = &report.nodes[1];
    assert_eq!(duplicate.decisions, vec![Decision::NoOp]);
    assert!(duplicate.has_failures());
    assert!(!duplicate.diagnostics.is_empty());

    assert_eq!(doc.element_count(), 1);
    let box_id = element_of(&report, "n", 0);
    assert_eq!(controller.record().get("n").unwrap(), &[Some(box_id)]);
    assert_eq!(doc.parameter(&box_id.element(), "shape"), Some(json!("box")));
}

#[test]
fn locked_elements_stay_tracked_until_they_can_be_cleaned_up() {
    init_logging();
    let mut doc = MemoryDocument::new("Model");
    let mut controller = PassController::new(EngineConfig::default());
    let mut node = BoxNode;

    let first = run(&mut controller, &mut doc, "box", &mut node, one_box(1.0));
    let locked = element_of(&first, "box", 0);
    assert!(doc.set_editable(&locked.element(), false));

    let second = run(&mut controller, &mut doc, "box", &mut node, one_box(1.0));
    assert!(second.committed());
    assert!(matches!(
        second.node("box").unwrap().decisions[0],
        Decision::Replace { old: None, .. }
    ));
    let replacement = element_of(&second, "box", 0);
    assert_eq!(doc.element_count(), 2);
    assert_eq!(
        controller.record().get("box").unwrap(),
        &[Some(replacement), Some(locked)]
    );

    // Unlocked and the node removed from the graph: nothing may be left behind
    assert!(doc.set_editable(&locked.element(), true));
    let report = controller.run_pass([&mut doc], Vec::new()).unwrap();
    assert!(report.committed());
    assert_eq!(report.stale_deleted.len(), 2);
    assert_eq!(doc.element_count(), 0);
    assert!(controller.record().is_empty());
}

#[test]
fn expected_failures_are_resolved_by_policy() {
    init_logging();
    let mut config = EngineConfig::default();
    config
        .failure
        .expected
        .push(ExpectedFailure::new("duplicate-mark", ResolutionAction::DefaultResolution));
    let mut controller = PassController::new(config);

    let mut doc = MemoryDocument::new("Model");
    doc.script_failure(
        ScriptedFailure::new("duplicate-mark", FailureSeverity::Error)
            .with_dialog("duplicate-mark-dialog", "Elements have duplicate marks"),
    );
    doc.script_failure(ScriptedFailure::new("slightly-off-axis", FailureSeverity::Warning));

    let mut node = BoxNode;
    let report = run(&mut controller, &mut doc, "box", &mut node, one_box(1.0));

    assert!(report.committed());
    assert_eq!(doc.element_count(), 1);
    let diagnostics = &report.document(doc.id()).unwrap().diagnostics;
    assert!(diagnostics.iter().any(|d| d.message.contains("duplicate-mark-dialog")));
    assert!(diagnostics.iter().any(|d| d.message.contains("slightly-off-axis")));
}

#[test]
fn delete_affected_resolution_removes_offending_elements() {
    init_logging();
    let mut config = EngineConfig::default();
    config
        .failure
        .expected
        .push(ExpectedFailure::new("overlap", ResolutionAction::DeleteAffected));
    let mut controller = PassController::new(config);

    let mut doc = MemoryDocument::new("Model");
    doc.script_failure(
        ScriptedFailure::new("overlap", FailureSeverity::Error).without_resolution(),
    );
    let mut node = BoxNode;
    let report = run(&mut controller, &mut doc, "box", &mut node, one_box(1.0));

    assert!(report.committed());
    assert_eq!(doc.element_count(), 0);

    // The recorded identity no longer resolves, so the next pass recreates it
    let again = run(&mut controller, &mut doc, "box", &mut node, one_box(1.0));
    assert!(matches!(
        again.node("box").unwrap().decisions[0],
        Decision::Replace { old: None, .. }
    ));
    assert_eq!(doc.element_count(), 1);
}

#[test]
fn materialized_elements_are_left_alone() {
    init_logging();
    let mut doc = MemoryDocument::new("Model");
    let mut controller = PassController::new(EngineConfig::default());
    let mut node = BoxNode;

    let first = run(&mut controller, &mut doc, "box", &mut node, one_box(1.0));
    let baked = element_of(&first, "box", 0);

    assert!(controller.can_materialize(&doc, "box"));
    let outcome = controller
        .materialize(&mut doc, "box", &MaterializeOptions::default())
        .unwrap();
    assert!(outcome.committed());
    assert!(!doc.element(&baked.element()).unwrap().pinned);

    let second = run(&mut controller, &mut doc, "box", &mut node, one_box(1.0));
    let fresh = element_of(&second, "box", 0);
    assert_ne!(fresh, baked);
    assert_eq!(doc.element_count(), 2);

    // Removing the node only deletes what it still owns
    let doc_id = doc.id();
    controller
        .run_pass([&mut doc], Vec::new())
        .unwrap();
    assert!(doc.element(&baked.element()).is_some());
    assert!(doc.element(&fresh.element()).is_none());
    assert!(controller.record().identities_in("box", doc_id).is_empty());
}

#[test]
fn record_survives_save_and_reload() {
    init_logging();
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("graph.record.json");

    let mut doc = MemoryDocument::new("Model");
    let mut node = BoxNode;
    let element = {
        let mut controller = PassController::new(EngineConfig::default());
        let report = run(&mut controller, &mut doc, "box", &mut node, one_box(1.0));
        controller.record().save(&path).unwrap();
        element_of(&report, "box", 0)
    };

    // New session: handles are stale, identities are not
    doc.regenerate();
    let record = PreviousOutputRecord::load(&path).unwrap();
    let mut controller = PassController::new(EngineConfig::default()).with_record(record);
    let report = run(&mut controller, &mut doc, "box", &mut node, one_box(1.0));

    assert_eq!(report.node("box").unwrap().decisions[0], Decision::Reuse { element });
}

#[test]
fn node_moved_to_another_document_cleans_up_the_old_one() {
    init_logging();
    let mut a = MemoryDocument::new("A");
    let mut b = MemoryDocument::new("B");
    let (a_id, b_id) = (a.id(), b.id());
    let mut controller = PassController::new(EngineConfig::default());
    let mut node = BoxNode;

    controller
        .run_pass(
            [&mut a, &mut b],
            vec![NodeRun::new("box", a_id, &mut node, one_box(1.0))],
        )
        .unwrap();
    assert_eq!(a.element_count(), 1);

    let report = controller
        .run_pass(
            [&mut a, &mut b],
            vec![NodeRun::new("box", b_id, &mut node, one_box(1.0))],
        )
        .unwrap();

    assert!(report.committed());
    assert_eq!(a.element_count(), 0);
    assert_eq!(b.element_count(), 1);
    assert_eq!(report.stale_deleted.len(), 1);
}

#[test]
fn stale_elements_in_absent_documents_are_kept_tracked() {
    init_logging();
    let mut a = MemoryDocument::new("A");
    let mut b = MemoryDocument::new("B");
    let a_id = a.id();
    let mut controller = PassController::new(EngineConfig::default());
    let mut node = BoxNode;

    run(&mut controller, &mut a, "box", &mut node, one_box(1.0));

    // Node removed while its document is not part of the pass
    let report = controller.run_pass([&mut b], Vec::new()).unwrap();
    assert!(!report.diagnostics.is_empty());
    assert_eq!(controller.record().identities_in("box", a_id).len(), 1);

    // Once the document is back, cleanup goes through
    let report = controller.run_pass([&mut a], Vec::new()).unwrap();
    assert_eq!(report.stale_deleted.len(), 1);
    assert_eq!(a.element_count(), 0);
    assert!(controller.record().is_empty());
}

#[test]
fn events_follow_the_pass() {
    init_logging();
    let sink = Arc::new(VecEventSink::new());
    let mut controller = PassController::new(EngineConfig::default()).with_events(sink.clone());
    let mut doc = MemoryDocument::new("Model");
    let mut node = BoxNode;

    run(&mut controller, &mut doc, "box", &mut node, one_box(1.0));

    let events = sink.events();
    assert!(matches!(events.first(), Some(PassEvent::PassStarted { node_count: 1, .. })));
    assert!(events.iter().any(|e| matches!(
        e,
        PassEvent::NodeReconciled { node_id, .. } if node_id == "box"
    )));
    assert!(events.iter().any(|e| matches!(
        e,
        PassEvent::DocumentFinished { status: TransactionStatus::Committed, .. }
    )));
    assert!(matches!(
        events.last(),
        Some(PassEvent::PassCompleted { outcome: PassOutcome::Committed, .. })
    ));
}

/// Point-picking node that builds a box wherever the user clicks
#[derive(Default)]
struct PickedBoxNode;

impl ElementNode<MemoryDocument> for PickedBoxNode {
    fn reuse(
        &mut self,
        document: &mut MemoryDocument,
        previous: &IdentityRef,
        desired: &ElementDescription,
    ) -> Result<bool, NodeError> {
        BoxNode.reuse(document, previous, desired)
    }

    fn create(
        &mut self,
        document: &mut MemoryDocument,
        desired: &ElementDescription,
    ) -> Result<IdentityRef, NodeError> {
        BoxNode.create(document, desired)
    }

    fn accept_input(
        &mut self,
        _request: &InputRequest,
        response: InputResponse,
    ) -> Result<Invocation, NodeError> {
        match response {
            InputResponse::Point([x, y, _]) => Ok(Invocation::Describe(
                box_desc(1.0)
                    .with_parameter("x", json!(x))
                    .with_parameter("y", json!(y)),
            )),
            other => Err(NodeError::failed(format!("expected a point, got {:?}", other))),
        }
    }
}

#[tokio::test]
async fn interactive_pass_waits_for_the_input_source() {
    init_logging();
    let mut doc = MemoryDocument::new("Model");
    let doc_id = doc.id();
    let mut controller = PassController::new(EngineConfig::default());
    let mut node = PickedBoxNode;

    let (mut source, mut requests) = ChannelInputSource::new(1);
    let ui = tokio::spawn(async move {
        let pending = requests.recv().await.unwrap();
        assert_eq!(pending.node_id, "picked");
        pending.respond(InputResponse::Point([4.0, 2.0, 0.0]));
    });

    let pass = controller.begin_pass(
        [&mut doc],
        vec![NodeRun::new(
            "picked",
            doc_id,
            &mut node,
            vec![Invocation::AwaitInput(InputRequest::pick_point("Pick the box origin"))],
        )],
    );
    let report = pass.run_interactive(&mut source).await.unwrap();
    ui.await.unwrap();

    assert!(report.committed());
    let element = element_of(&report, "picked", 0);
    assert_eq!(doc.parameter(&element.element(), "x"), Some(json!(4.0)));
}

#[test]
fn wrong_input_fails_only_that_slot() {
    init_logging();
    let mut doc = MemoryDocument::new("Model");
    let doc_id = doc.id();
    let mut controller = PassController::new(EngineConfig::default());
    let mut node = PickedBoxNode;

    let report = {
        let mut pass = controller.begin_pass(
            [&mut doc],
            vec![NodeRun::new(
                "picked",
                doc_id,
                &mut node,
                vec![
                    Invocation::AwaitInput(InputRequest::pick_point("Origin")),
                    Invocation::Describe(box_desc(2.0)),
                ],
            )],
        );
        pass.step().unwrap();
        pass.provide_input(InputResponse::Text("oops".to_string())).unwrap();
        pass.run().unwrap()
    };

    let node_report = report.node("picked").unwrap();
    assert!(node_report.outputs[0].is_failed());
    assert!(node_report.outputs[1].element().is_some());
    assert!(report.committed());
    assert_eq!(doc.element_count(), 1);
}
