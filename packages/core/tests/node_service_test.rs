//! Integration tests for NodeService
//!
//! Tests cover:
//! - Save/load round trips and version monotonicity
//! - Stale version detection
//! - Required attribute and linkage completeness (no store calls)
//! - Linkage target type enforcement
//! - Private data isolation
//! - Delete invalidation and ambiguous write outcomes
//! - Subtype stability
//! - Re-validation and targets deleted by other clients

use ihmp_core::models::{Node, NodeState};
use ihmp_core::schema::SchemaRegistry;
use ihmp_core::services::{NodeService, NodeServiceError};
use ihmp_core::transport::{MemoryStore, NodeStore, StoreError};
use ihmp_core::validation::{LinkageViolationKind, ViolationKind};
use serde_json::{json, Map};
use std::sync::Arc;

fn registry() -> Arc<SchemaRegistry> {
    Arc::new(SchemaRegistry::builtin().unwrap())
}

fn create_test_service() -> (NodeService, MemoryStore) {
    let store = MemoryStore::new("ihmp");
    (NodeService::new(Arc::new(store.clone()), registry()), store)
}

fn tagged(mut node: Node) -> Node {
    node.add_tag("test");
    node
}

async fn save_project(service: &NodeService) -> Node {
    let mut project = tagged(
        Node::new("project")
            .with_attribute("name", "iHMP")
            .with_attribute("description", "Integrative Human Microbiome Project"),
    );
    service.save(&mut project).await.unwrap();
    project
}

async fn save_study(service: &NodeService, project: &Node) -> Node {
    let mut study = tagged(
        Node::new("study")
            .with_attribute("name", "IBDMDB")
            .with_attribute("description", "Inflammatory bowel disease")
            .with_attribute("center", "Broad Institute")
            .with_attribute("contact", "Jane Doe"),
    );
    study.set_subtype("ibd");
    study.link("part_of", project.id().unwrap());
    service.save(&mut study).await.unwrap();
    study
}

async fn save_subject(service: &NodeService, study: &Node) -> Node {
    let mut subject = tagged(
        Node::new("subject")
            .with_attribute("rand_subject_id", "S-001")
            .with_attribute("gender", "female"),
    );
    subject.link("participates_in", study.id().unwrap());
    service.save(&mut subject).await.unwrap();
    subject
}

fn visit_for(subject: &Node) -> Node {
    let mut visit = tagged(
        Node::new("visit")
            .with_attribute("visit_id", "S-001-V1")
            .with_attribute("visit_number", 1)
            .with_attribute("interval", 0)
            .with_attribute("date", "2015-06-01"),
    );
    visit.link("by", subject.id().unwrap());
    visit
}

async fn hierarchy(service: &NodeService) -> (Node, Node, Node) {
    let project = save_project(service).await;
    let study = save_study(service, &project).await;
    let subject = save_subject(service, &study).await;
    (project, study, subject)
}

// =========================================================================
// Round Trip and Versions
// =========================================================================

#[tokio::test]
async fn test_save_then_load_round_trip() {
    let (service, _store) = create_test_service();
    let (_, _, subject) = hierarchy(&service).await;

    let mut visit = visit_for(&subject);
    service.save(&mut visit).await.unwrap();

    let loaded = service.load(visit.id().unwrap()).await.unwrap();
    assert_eq!(loaded.attributes, visit.attributes);
    assert_eq!(loaded.linkages, visit.linkages);
    assert_eq!(loaded.version(), Some(1));
    assert_eq!(loaded.state(), NodeState::Persisted);
}

#[tokio::test]
async fn test_versions_increase_with_every_update() {
    let (service, store) = create_test_service();
    let mut project = save_project(&service).await;

    let mut previous = project.version().unwrap();
    for n in 0..3 {
        project.set_attribute("funding_agency", format!("NIH-{n}"));
        service.save(&mut project).await.unwrap();
        let current = project.version().unwrap();
        assert!(current > previous);
        previous = current;
    }
    assert_eq!(store.stored_version(project.id().unwrap()).await, Some(4));
}

#[tokio::test]
async fn test_stale_update_is_refused() {
    let (service, store) = create_test_service();
    let project = save_project(&service).await;
    let id = project.id().unwrap().to_string();

    let mut first = service.load(&id).await.unwrap();
    let mut second = service.load(&id).await.unwrap();

    first.set_attribute("funding_agency", "NIH");
    service.save(&mut first).await.unwrap();

    second.set_attribute("funding_agency", "NSF");
    let err = service.save(&mut second).await.unwrap_err();
    assert!(matches!(
        err,
        NodeServiceError::StaleNode { expected: 1, actual: Some(2), .. }
    ));
    assert!(err.is_domain());
    assert_eq!(second.version(), Some(1));

    let stored = service.load(&id).await.unwrap();
    assert_eq!(stored.attribute("funding_agency").unwrap(), "NIH");
    assert_eq!(store.stored_version(&id).await, Some(2));
}

// =========================================================================
// Validation Before I/O
// =========================================================================

#[tokio::test]
async fn test_missing_required_attribute_makes_no_store_call() {
    let (service, store) = create_test_service();
    let (_, _, subject) = hierarchy(&service).await;
    let before = store.counters();

    for required in ["visit_id", "visit_number", "interval", "tags"] {
        let mut visit = visit_for(&subject);
        visit.remove_attribute(required);

        let err = service.save(&mut visit).await.unwrap_err();
        match err {
            NodeServiceError::SchemaViolation { violations, .. } => {
                assert!(violations
                    .iter()
                    .any(|v| v.field == required && v.kind == ViolationKind::Missing));
            }
            other => panic!("expected schema violation, got {other:?}"),
        }
        assert!(!visit.is_saved());
    }

    assert_eq!(store.counters(), before);
}

#[tokio::test]
async fn test_missing_required_linkage_makes_no_store_call() {
    let (service, store) = create_test_service();
    let (_, _, subject) = hierarchy(&service).await;
    let before = store.counters();

    let mut visit = visit_for(&subject);
    visit.unlink("by", subject.id().unwrap());

    let err = service.save(&mut visit).await.unwrap_err();
    assert!(matches!(
        err,
        NodeServiceError::SchemaViolation { ref linkages, .. }
            if linkages.iter().any(|l| l.linkage == "by" && l.kind == LinkageViolationKind::Missing)
    ));
    assert_eq!(store.counters(), before);
}

#[tokio::test]
async fn test_every_problem_is_reported_at_once() {
    let (service, _store) = create_test_service();
    let mut visit = Node::new("visit")
        .with_attribute("visit_number", 0)
        .with_attribute("date", "2999-01-01")
        .with_attribute("colour", "blue");

    let report = service.validate(&visit).await.unwrap();
    assert!(!report.is_valid());
    let fields: Vec<_> = report.attributes.iter().map(|v| v.field.as_str()).collect();
    for field in ["visit_id", "visit_number", "interval", "date", "tags", "colour"] {
        assert!(fields.contains(&field), "{field} not reported in {fields:?}");
    }
    assert_eq!(report.linkages.len(), 1);

    assert!(!service.is_valid(&visit).await.unwrap());
    assert!(service.save(&mut visit).await.unwrap_err().is_validation());
}

// =========================================================================
// Linkage Enforcement
// =========================================================================

#[tokio::test]
async fn test_linkage_to_wrong_type_is_rejected() {
    let (service, store) = create_test_service();
    let (project, _, subject) = hierarchy(&service).await;

    let mut visit = visit_for(&subject);
    visit.unlink("by", subject.id().unwrap());
    visit.link("by", project.id().unwrap());

    let err = service.save(&mut visit).await.unwrap_err();
    match err {
        NodeServiceError::LinkageViolation { violations, .. } => {
            assert_eq!(violations.len(), 1);
            assert_eq!(violations[0].linkage, "by");
            assert_eq!(violations[0].target_id.as_deref(), project.id());
            assert!(matches!(
                &violations[0].kind,
                LinkageViolationKind::WrongTargetType { actual, .. } if actual == "project"
            ));
        }
        other => panic!("expected linkage violation, got {other:?}"),
    }
    assert_eq!(store.counters().inserts, 3);
}

#[tokio::test]
async fn test_linkage_to_missing_node_is_rejected() {
    let (service, _store) = create_test_service();
    let (_, _, subject) = hierarchy(&service).await;

    let mut visit = visit_for(&subject);
    visit.link("by", "does-not-exist");

    let err = service.save(&mut visit).await.unwrap_err();
    assert!(matches!(
        err,
        NodeServiceError::LinkageViolation { ref violations, .. }
            if violations.iter().any(|v| v.target_id.as_deref() == Some("does-not-exist")
                && v.kind == LinkageViolationKind::TargetNotFound)
    ));
}

#[tokio::test]
async fn test_validate_answers_from_cache_but_save_rechecks() {
    let (service, store) = create_test_service();
    let (_, _, subject) = hierarchy(&service).await;
    let before = store.counters();

    let mut visit = visit_for(&subject);
    assert!(service.is_valid(&visit).await.unwrap());
    assert_eq!(store.counters().gets, before.gets);

    service.save(&mut visit).await.unwrap();
    assert_eq!(store.counters().gets, before.gets + 1);
}

#[tokio::test]
async fn test_target_deleted_by_another_client_is_rejected() {
    let store = MemoryStore::new("ihmp");
    let first = NodeService::new(Arc::new(store.clone()), registry());
    let second = NodeService::new(Arc::new(store.clone()), registry());

    let project = save_project(&first).await;
    let id = project.id().unwrap().to_string();

    let mut theirs = second.load(&id).await.unwrap();
    second.delete(&mut theirs).await.unwrap();

    let mut study = tagged(
        Node::new("study")
            .with_attribute("name", "IBDMDB")
            .with_attribute("description", "Inflammatory bowel disease")
            .with_attribute("center", "Broad Institute")
            .with_attribute("contact", "Jane Doe"),
    );
    study.set_subtype("ibd");
    study.link("part_of", &id);

    let err = first.save(&mut study).await.unwrap_err();
    assert!(matches!(
        err,
        NodeServiceError::LinkageViolation { ref violations, .. }
            if violations.iter().any(|v| v.target_id.as_deref() == Some(id.as_str())
                && v.kind == LinkageViolationKind::TargetNotFound)
    ));
    assert!(study.id().is_none());
    assert!(first.type_cache().is_empty().await);
}

// =========================================================================
// Re-validation
// =========================================================================

#[tokio::test]
async fn test_validating_twice_gives_the_same_report() {
    let (service, store) = create_test_service();
    let (_, study, subject) = hierarchy(&service).await;

    let mut bad_attributes = visit_for(&subject);
    bad_attributes.remove_attribute("visit_id");
    bad_attributes.set_attribute("interval", -3);

    let mut wrong_target = visit_for(&subject);
    wrong_target.unlink("by", subject.id().unwrap());
    wrong_target.link("by", study.id().unwrap());

    for node in [&bad_attributes, &wrong_target] {
        let first = service.validate(node).await.unwrap();
        let calls = store.counters();
        let second = service.validate(node).await.unwrap();

        assert!(!first.is_valid());
        assert_eq!(first, second);
        assert_eq!(store.counters(), calls);
    }
}

// =========================================================================
// Private Data
// =========================================================================

#[tokio::test]
async fn test_private_data_hidden_from_other_principals() {
    let store = MemoryStore::new("ihmp");
    let service = NodeService::new(Arc::new(store.clone()), registry());
    let (_, study, _) = hierarchy(&service).await;

    let mut subject = tagged(
        Node::new("subject")
            .with_attribute("rand_subject_id", "S-002")
            .with_attribute("gender", "male"),
    );
    subject.link("participates_in", study.id().unwrap());
    let mut private = Map::new();
    private.insert("name".to_string(), json!("John Smith"));
    private.insert("birth_date".to_string(), json!("1970-01-01"));
    subject.set_private(private);
    service.save(&mut subject).await.unwrap();
    let id = subject.id().unwrap();

    let owner = service.load(id).await.unwrap();
    assert_eq!(owner.private.as_ref().unwrap()["name"], json!("John Smith"));

    let guest = NodeService::new(Arc::new(store.as_principal("guest")), registry());
    let seen = guest.load(id).await.unwrap();
    assert!(seen.private.is_none());
    assert!(seen.attribute("name").is_none());
    assert!(seen.attribute("birth_date").is_none());
    assert_eq!(seen.attribute("rand_subject_id").unwrap(), "S-002");
}

#[tokio::test]
async fn test_private_data_refused_for_public_types() {
    let (service, store) = create_test_service();
    let mut project = tagged(
        Node::new("project")
            .with_attribute("name", "iHMP")
            .with_attribute("description", "HMP2"),
    );
    project.set_private(Map::new());

    let err = service.save(&mut project).await.unwrap_err();
    assert!(matches!(
        err,
        NodeServiceError::SchemaViolation { ref violations, .. }
            if violations.iter().any(|v| v.kind == ViolationKind::PrivateDataNotAllowed)
    ));
    assert_eq!(store.counters().total(), 0);
}

// =========================================================================
// Delete and Ambiguous Outcomes
// =========================================================================

#[tokio::test]
async fn test_deleted_node_cannot_be_reused() {
    let (service, _store) = create_test_service();
    let mut project = save_project(&service).await;
    let id = project.id().unwrap().to_string();

    service.delete(&mut project).await.unwrap();
    assert!(project.is_deleted());

    assert!(matches!(
        service.save(&mut project).await,
        Err(NodeServiceError::InvalidState { .. })
    ));
    assert!(matches!(
        service.delete(&mut project).await,
        Err(NodeServiceError::InvalidState { .. })
    ));
    assert!(matches!(
        service.load(&id).await,
        Err(NodeServiceError::NotFound { .. })
    ));
}

#[tokio::test]
async fn test_stale_delete_is_refused() {
    let (service, _store) = create_test_service();
    let project = save_project(&service).await;
    let id = project.id().unwrap().to_string();

    let mut old = service.load(&id).await.unwrap();
    let mut current = service.load(&id).await.unwrap();
    current.set_attribute("funding_agency", "NIH");
    service.save(&mut current).await.unwrap();

    let err = service.delete(&mut old).await.unwrap_err();
    assert!(matches!(err, NodeServiceError::StaleNode { .. }));
    assert_eq!(old.state(), NodeState::Persisted);
}

#[tokio::test]
async fn test_ambiguous_write_leaves_node_untouched() {
    let (service, store) = create_test_service();
    let mut project = save_project(&service).await;
    let id = project.id().unwrap().to_string();
    let modified = project.modified_at();

    project.set_attribute("funding_agency", "NIH");
    store
        .fail_next(StoreError::ambiguous("update", Some(id.as_str()), "connection reset"))
        .await;

    let err = service.save(&mut project).await.unwrap_err();
    assert!(matches!(
        err,
        NodeServiceError::AmbiguousWriteOutcome { operation: "update", .. }
    ));
    assert_eq!(project.version(), Some(1));
    assert_eq!(project.modified_at(), modified);
    assert_eq!(project.attribute("funding_agency").unwrap(), "NIH");

    // Reconcile, then retry with the store's version
    let mut reloaded = service.load(&id).await.unwrap();
    reloaded.set_attribute("funding_agency", "NIH");
    service.save(&mut reloaded).await.unwrap();
    assert_eq!(reloaded.version(), Some(2));
}

#[tokio::test]
async fn test_ambiguous_insert_assigns_no_id() {
    let (service, store) = create_test_service();
    store
        .fail_next(StoreError::ambiguous("insert", None, "timed out"))
        .await;

    let mut project = tagged(
        Node::new("project")
            .with_attribute("name", "iHMP")
            .with_attribute("description", "HMP2"),
    );
    let err = service.save(&mut project).await.unwrap_err();
    assert!(matches!(err, NodeServiceError::AmbiguousWriteOutcome { id: None, .. }));
    assert!(project.id().is_none());
    assert_eq!(project.state(), NodeState::New);
}

// =========================================================================
// Subtypes
// =========================================================================

#[tokio::test]
async fn test_subtype_is_stable_once_saved() {
    let (service, _store) = create_test_service();
    let project = save_project(&service).await;
    let mut study = save_study(&service, &project).await;
    assert_eq!(study.saved_subtype(), Some("ibd"));

    study.set_subtype("prediabetes");
    let err = service.save(&mut study).await.unwrap_err();
    assert!(matches!(
        err,
        NodeServiceError::SchemaViolation { ref violations, .. }
            if violations.iter().any(|v| matches!(v.kind, ViolationKind::SubtypeChanged { .. }))
    ));
    assert_eq!(study.version(), Some(1));
}

#[tokio::test]
async fn test_resolved_subtype_is_stored_in_meta() {
    let (service, store) = create_test_service();
    let project = save_project(&service).await;
    let study = save_study(&service, &project).await;

    let doc = store.get(study.id().unwrap()).await.unwrap();
    assert_eq!(doc.subtype(), Some("ibd"));

    let loaded = service.load(study.id().unwrap()).await.unwrap();
    assert_eq!(loaded.subtype(), Some("ibd"));
    assert!(loaded.attribute("subtype").is_none());
}

#[tokio::test]
async fn test_controlled_subtype_must_be_chosen() {
    let (service, store) = create_test_service();
    let project = save_project(&service).await;
    let before = store.counters();

    let mut study = tagged(
        Node::new("study")
            .with_attribute("name", "T2D")
            .with_attribute("description", "Prediabetes")
            .with_attribute("center", "Stanford University")
            .with_attribute("contact", "John Doe"),
    );
    study.link("part_of", project.id().unwrap());

    let err = service.save(&mut study).await.unwrap_err();
    assert!(matches!(
        err,
        NodeServiceError::SchemaViolation { ref violations, .. }
            if violations.iter().any(|v| v.field == "subtype")
    ));
    assert_eq!(store.counters(), before);
}

#[tokio::test]
async fn test_stray_subtype_on_untyped_node_does_not_block_saves() {
    let (service, store) = create_test_service();
    let project = save_project(&service).await;
    let id = project.id().unwrap().to_string();

    let mut doc = store.get(&id).await.unwrap();
    doc.meta.insert("subtype".to_string(), json!("ibd"));
    store.update(&id, 1, &doc).await.unwrap();

    let mut loaded = service.load(&id).await.unwrap();
    assert_eq!(loaded.saved_subtype(), None);

    loaded.set_attribute("funding_agency", "NIH");
    service.save(&mut loaded).await.unwrap();
    assert_eq!(loaded.version(), Some(3));
    assert_eq!(store.get(&id).await.unwrap().subtype(), None);
}

// =========================================================================
// Concurrency
// =========================================================================

#[tokio::test]
async fn test_concurrent_saves_of_distinct_nodes() {
    let (service, store) = create_test_service();
    let service = Arc::new(service);

    let handles: Vec<_> = (0..8)
        .map(|n| {
            let service = Arc::clone(&service);
            tokio::spawn(async move {
                let mut project = tagged(
                    Node::new("project")
                        .with_attribute("name", format!("P{n}"))
                        .with_attribute("description", "parallel"),
                );
                service.save(&mut project).await.map(|_| project)
            })
        })
        .collect();

    let mut ids = std::collections::HashSet::new();
    for handle in handles {
        let project = handle.await.unwrap().unwrap();
        ids.insert(project.id().unwrap().to_string());
    }

    assert_eq!(ids.len(), 8);
    assert_eq!(store.len().await, 8);
}
