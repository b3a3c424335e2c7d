//! Approval Policy Integration Tests
//!
//! Approval rules read from a YAML file through the TTL cache.

use std::sync::Arc;
use std::time::Duration;

use bizcase::adapters::{ProducerRegistry, TemplateProducer};
use bizcase::core::{
    is_authorized, ApprovalCache, ApprovalPolicy, FileApprovalPolicy, MemoryCaseStore,
    TransitionTable, WorkflowError, WorkflowOrchestrator,
};
use bizcase::domain::{Actor, CaseStatus, RoleId, Stage};
use tempfile::TempDir;

const FINANCE_ONLY: &str = r#"
version: "1.0"
approvals:
  cost: [FINANCE_APPROVER]
"#;

const FINANCE_AND_DEVELOPER: &str = r#"
version: "1.0"
approvals:
  cost: [FINANCE_APPROVER, DEVELOPER]
"#;

fn admin() -> Actor {
    Actor::new("root", RoleId::Superuser)
}

#[tokio::test]
async fn test_file_policy_loads_approvals_section() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("config.yaml");
    std::fs::write(&path, FINANCE_ONLY).unwrap();

    let rules = FileApprovalPolicy::new(&path).load().await.unwrap();
    assert_eq!(rules.roles_for(Stage::Cost), &[RoleId::FinanceApprover]);
    assert!(rules.roles_for(Stage::Prd).is_empty());
}

#[tokio::test]
async fn test_snapshots_are_versioned() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("config.yaml");
    std::fs::write(&path, FINANCE_ONLY).unwrap();

    let cache = ApprovalCache::new(Arc::new(FileApprovalPolicy::new(&path)), Duration::ZERO);
    let first = cache.snapshot().await.unwrap();
    assert!(!is_authorized(RoleId::Developer, Stage::Cost, &first));

    std::fs::write(&path, FINANCE_AND_DEVELOPER).unwrap();
    let second = cache.snapshot().await.unwrap();

    assert!(second.version > first.version);
    assert!(is_authorized(RoleId::Developer, Stage::Cost, &second));
    // A snapshot already handed out never changes underneath its holder
    assert!(!is_authorized(RoleId::Developer, Stage::Cost, &first));
}

#[tokio::test]
async fn test_rule_changes_apply_and_missing_file_fails_closed() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("config.yaml");
    std::fs::write(&path, FINANCE_ONLY).unwrap();

    let orchestrator = WorkflowOrchestrator::new(
        Arc::new(MemoryCaseStore::new()),
        Arc::new(ApprovalCache::new(
            Arc::new(FileApprovalPolicy::new(&path)),
            Duration::ZERO,
        )),
        ProducerRegistry::uniform(Arc::new(TemplateProducer::new())),
    )
    .with_table(TransitionTable::standard().with_auto_chain(Stage::Prd, false));

    let owner = Actor::new("alice", RoleId::BusinessAnalyst);
    let case = orchestrator.intake("CRM", "Leads are lost", &owner).await.unwrap();
    for stage in [Stage::Prd, Stage::SystemDesign, Stage::Effort] {
        orchestrator.request_stage(case.id, stage, &admin()).await.unwrap();
        orchestrator
            .approve_stage(case.id, stage, &admin(), None)
            .await
            .unwrap();
    }
    orchestrator.request_stage(case.id, Stage::Cost, &owner).await.unwrap();

    let developer = Actor::new("dev", RoleId::Developer);
    let err = orchestrator
        .approve_stage(case.id, Stage::Cost, &developer, None)
        .await
        .unwrap_err();
    assert!(matches!(err, WorkflowError::Unauthorized { .. }));

    std::fs::remove_file(&path).unwrap();
    let err = orchestrator
        .approve_stage(case.id, Stage::Cost, &admin(), None)
        .await
        .unwrap_err();
    assert!(matches!(err, WorkflowError::ConfigUnavailable(_)));

    std::fs::write(&path, FINANCE_AND_DEVELOPER).unwrap();
    let outcome = orchestrator
        .approve_stage(case.id, Stage::Cost, &developer, None)
        .await
        .unwrap();
    assert_eq!(outcome.case.status, CaseStatus::CostApproved);
}
