//! Event Store Integration Tests
//!
//! Runs the orchestrator against the file-backed store and checks what
//! lands on disk.

use std::sync::Arc;

use bizcase::adapters::{
    ProducerError, ProducerOutput, ProducerRegistry, StageProducer, TemplateProducer,
};
use bizcase::core::{
    ApprovalCache, ApprovalRules, CaseStore, EventStore, StatusWrite, StoreError,
    TransitionTable, WorkflowError, WorkflowOrchestrator,
};
use bizcase::domain::{Actor, CaseContext, CaseStatus, HistoryAction, HistoryDraft, RoleId, Stage};
use tempfile::TempDir;

struct FailingProducer;

#[async_trait::async_trait]
impl StageProducer for FailingProducer {
    fn name(&self) -> &str {
        "failing"
    }

    async fn produce(
        &self,
        _stage: Stage,
        _context: &CaseContext,
    ) -> Result<ProducerOutput, ProducerError> {
        Err(ProducerError::failed("backend exploded"))
    }
}

fn owner() -> Actor {
    Actor::new("alice", RoleId::BusinessAnalyst)
}

fn admin() -> Actor {
    Actor::new("root", RoleId::Superuser)
}

fn orchestrator(store: EventStore, registry: ProducerRegistry) -> WorkflowOrchestrator {
    WorkflowOrchestrator::new(
        Arc::new(store),
        Arc::new(ApprovalCache::fixed(ApprovalRules::standard())),
        registry,
    )
    .with_table(TransitionTable::standard().with_auto_chain(Stage::Prd, false))
}

fn template_registry() -> ProducerRegistry {
    ProducerRegistry::uniform(Arc::new(TemplateProducer::new()))
}

#[tokio::test]
async fn test_workflow_state_survives_reopen() {
    let temp_dir = TempDir::new().unwrap();
    let first = orchestrator(EventStore::new(temp_dir.path()), template_registry());

    let case = first.intake("Warehouse scanners", "Picking errors", &owner()).await.unwrap();
    first.request_stage(case.id, Stage::Prd, &owner()).await.unwrap();
    first.approve_stage(case.id, Stage::Prd, &admin(), Some(1)).await.unwrap();
    first
        .request_stage(case.id, Stage::SystemDesign, &owner())
        .await
        .unwrap();
    let expected = first.case(case.id).await.unwrap();
    let expected_history = first.history(case.id).await.unwrap();

    // A fresh process sees the same case
    let reopened = orchestrator(EventStore::new(temp_dir.path()), template_registry());
    let case_now = reopened.case(case.id).await.unwrap();

    assert_eq!(case_now.status, CaseStatus::SystemDesignDrafted);
    assert_eq!(case_now.artifacts, expected.artifacts);
    assert_eq!(reopened.history(case.id).await.unwrap(), expected_history);
    assert!(case_now.artifact(Stage::Prd).unwrap().verify());

    let artifact_file = temp_dir
        .path()
        .join(case.id.to_string())
        .join("artifacts")
        .join("system_design-v1.json");
    assert!(artifact_file.exists());
}

#[tokio::test]
async fn test_history_file_only_grows() {
    let temp_dir = TempDir::new().unwrap();
    let orchestrator = orchestrator(EventStore::new(temp_dir.path()), template_registry());
    let case = orchestrator.intake("CRM", "Leads are lost", &owner()).await.unwrap();
    let history_path = temp_dir
        .path()
        .join(case.id.to_string())
        .join("history.jsonl");

    let mut previous = std::fs::read(&history_path).unwrap();
    for step in 0..3 {
        if step == 2 {
            orchestrator
                .approve_stage(case.id, Stage::Prd, &admin(), None)
                .await
                .unwrap();
        } else {
            orchestrator
                .request_stage(case.id, Stage::Prd, &owner())
                .await
                .unwrap();
        }

        let current = std::fs::read(&history_path).unwrap();
        assert!(current.len() > previous.len());
        assert_eq!(&current[..previous.len()], &previous[..]);
        previous = current;
    }

    let text = String::from_utf8(previous).unwrap();
    assert!(text.ends_with('\n'));
    // Create, then two regenerations of two entries each, then the approval
    assert_eq!(text.lines().count(), 6);
}

#[tokio::test]
async fn test_rollback_is_persisted() {
    let temp_dir = TempDir::new().unwrap();
    let orchestrator = orchestrator(
        EventStore::new(temp_dir.path()),
        ProducerRegistry::new().with(Stage::Prd, Arc::new(FailingProducer)),
    );
    let case = orchestrator.intake("CRM", "Leads are lost", &owner()).await.unwrap();

    let err = orchestrator
        .request_stage(case.id, Stage::Prd, &owner())
        .await
        .unwrap_err();
    assert!(matches!(err, WorkflowError::ProducerFailure { .. }));

    let store = EventStore::new(temp_dir.path());
    assert_eq!(store.read_case(case.id).await.unwrap().status, CaseStatus::Intake);

    let history = store.history(case.id).await.unwrap();
    let actions: Vec<_> = history.iter().map(|e| e.action).collect();
    assert_eq!(
        actions,
        vec![
            HistoryAction::Create,
            HistoryAction::Regenerate,
            HistoryAction::SystemRollback
        ]
    );

    let raw = std::fs::read_to_string(
        temp_dir
            .path()
            .join(case.id.to_string())
            .join("history.jsonl"),
    )
    .unwrap();
    assert!(raw.contains("\"system-rollback\""));
    assert!(raw.contains("backend exploded"));
}

#[tokio::test]
async fn test_competing_stores_commit_once() {
    let temp_dir = TempDir::new().unwrap();
    let setup = orchestrator(EventStore::new(temp_dir.path()), template_registry());
    let case = setup.intake("CRM", "Leads are lost", &owner()).await.unwrap();

    // Two independent store handles, as two processes would hold
    let mut handles = Vec::new();
    for actor in ["alice", "bob"] {
        let store = EventStore::new(temp_dir.path());
        let case_id = case.id;
        handles.push(tokio::spawn(async move {
            store
                .conditional_write(
                    case_id,
                    StatusWrite::new(HistoryDraft::new(
                        actor,
                        HistoryAction::Regenerate,
                        Some(Stage::Prd),
                        CaseStatus::Intake,
                        CaseStatus::PrdDrafting,
                    )),
                )
                .await
        }));
    }

    let mut committed = 0;
    let mut rejected = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => committed += 1,
            Err(StoreError::PreconditionFailed { actual, .. }) => {
                assert_eq!(actual, CaseStatus::PrdDrafting);
                rejected += 1;
            }
            Err(other) => panic!("unexpected store error: {other}"),
        }
    }
    assert_eq!((committed, rejected), (1, 1));

    let history = EventStore::new(temp_dir.path()).history(case.id).await.unwrap();
    assert_eq!(history.len(), 2);
}

#[tokio::test]
async fn test_recovery_after_crash() {
    let temp_dir = TempDir::new().unwrap();
    let store = EventStore::new(temp_dir.path());
    let setup = orchestrator(store.clone(), template_registry());
    let case = setup.intake("CRM", "Leads are lost", &owner()).await.unwrap();

    // Claimed by a process that died before the producer returned
    store
        .conditional_write(
            case.id,
            StatusWrite::new(HistoryDraft::new(
                "alice",
                HistoryAction::Regenerate,
                Some(Stage::Prd),
                CaseStatus::Intake,
                CaseStatus::PrdDrafting,
            )),
        )
        .await
        .unwrap();

    let restarted = orchestrator(EventStore::new(temp_dir.path()), template_registry());
    let recovered = restarted.recover_interrupted().await.unwrap();
    assert_eq!(recovered.len(), 1);
    assert_eq!(recovered[0].status, CaseStatus::Intake);

    // The stage can be requested normally again
    let case_now = restarted
        .request_stage(case.id, Stage::Prd, &owner())
        .await
        .unwrap();
    assert_eq!(case_now.status, CaseStatus::PrdReview);
}

#[tokio::test]
async fn test_recovery_skips_unreadable_cases() {
    let temp_dir = TempDir::new().unwrap();
    let store = EventStore::new(temp_dir.path());
    let setup = orchestrator(store.clone(), template_registry());

    let mut stuck = Vec::new();
    for title in ["CRM", "Payroll"] {
        let case = setup.intake(title, "Manual work", &owner()).await.unwrap();
        store
            .conditional_write(
                case.id,
                StatusWrite::new(HistoryDraft::new(
                    "alice",
                    HistoryAction::Regenerate,
                    Some(Stage::Prd),
                    CaseStatus::Intake,
                    CaseStatus::PrdDrafting,
                )),
            )
            .await
            .unwrap();
        stuck.push(case.id);
    }

    // A create interrupted before case.json was written
    let orphan = temp_dir.path().join(uuid::Uuid::new_v4().to_string());
    std::fs::create_dir_all(&orphan).unwrap();
    std::fs::write(orphan.join(".lock"), b"").unwrap();

    // A case whose history cannot be parsed
    let corrupt = setup.intake("Fleet", "Paper logs", &owner()).await.unwrap();
    std::fs::write(
        temp_dir
            .path()
            .join(corrupt.id.to_string())
            .join("history.jsonl"),
        "not json\n{also not json}\n",
    )
    .unwrap();

    let restarted = orchestrator(EventStore::new(temp_dir.path()), template_registry());
    let recovered = restarted.recover_interrupted().await.unwrap();
    assert_eq!(recovered.len(), 2);

    for case_id in stuck {
        assert_eq!(
            restarted.case(case_id).await.unwrap().status,
            CaseStatus::Intake
        );
    }
}
