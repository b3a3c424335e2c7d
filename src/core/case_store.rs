//! Case store contract and the in-memory backend.
//!
//! Every status change goes through `conditional_write`, which commits the
//! new status, the optional artifact and the history entry together, and
//! only if the case still holds the expected status.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use thiserror::Error;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::domain::{Artifact, Case, CaseStatus, HistoryDraft, HistoryEntry, Stage};

/// Errors returned by case store backends
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Case not found: {0}")]
    NotFound(Uuid),

    #[error("Case already exists: {0}")]
    AlreadyExists(Uuid),

    #[error("Status precondition failed for case {case_id}: expected {expected}, found {actual}")]
    PreconditionFailed {
        case_id: Uuid,
        expected: CaseStatus,
        actual: CaseStatus,
    },

    #[error("Artifact for stage '{stage}' on case {case_id} changed: expected version {expected}, found {actual}")]
    ArtifactChanged {
        case_id: Uuid,
        stage: Stage,
        expected: u64,
        actual: u64,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Corrupt case record {case_id}: {detail}")]
    Corrupt { case_id: Uuid, detail: String },

    #[error("Store task failed: {0}")]
    Task(String),
}

/// A guarded status change
#[derive(Debug, Clone)]
pub struct StatusWrite {
    /// Status the case must still hold
    pub expected: CaseStatus,

    /// Status to set
    pub new_status: CaseStatus,

    /// Artifact to store alongside the status (replaces the stage's latest)
    pub artifact: Option<Artifact>,

    /// Latest artifact version the stage must still hold (0 for none)
    pub expected_artifact: Option<(Stage, u64)>,

    /// History entry recording the change
    pub entry: HistoryDraft,
}

impl StatusWrite {
    pub fn new(entry: HistoryDraft) -> Self {
        Self {
            expected: entry.from_status,
            new_status: entry.to_status,
            artifact: None,
            expected_artifact: None,
            entry,
        }
    }

    pub fn with_artifact(mut self, artifact: Artifact) -> Self {
        self.artifact = Some(artifact);
        self
    }

    /// Also require the stage's latest artifact to be at `version`
    pub fn with_expected_artifact(mut self, stage: Stage, version: u64) -> Self {
        self.expected_artifact = Some((stage, version));
        self
    }

    /// Check the artifact guard against the version currently stored
    pub(crate) fn check_artifact(
        &self,
        case_id: Uuid,
        current: impl Fn(Stage) -> u64,
    ) -> Result<(), StoreError> {
        match self.expected_artifact {
            Some((stage, expected)) if current(stage) != expected => {
                Err(StoreError::ArtifactChanged {
                    case_id,
                    stage,
                    expected,
                    actual: current(stage),
                })
            }
            _ => Ok(()),
        }
    }
}

/// Durable per-case record with compare-and-swap status writes
#[async_trait]
pub trait CaseStore: Send + Sync {
    /// Persist a new case together with its first history entry
    async fn create_case(&self, case: &Case, entry: HistoryDraft)
        -> Result<HistoryEntry, StoreError>;

    /// Load the current case snapshot
    async fn read_case(&self, case_id: Uuid) -> Result<Case, StoreError>;

    /// Set status (and artifact) only if the case still holds `write.expected`
    async fn conditional_write(
        &self,
        case_id: Uuid,
        write: StatusWrite,
    ) -> Result<(Case, HistoryEntry), StoreError>;

    /// Append a history entry without changing status
    async fn append_history(
        &self,
        case_id: Uuid,
        entry: HistoryDraft,
    ) -> Result<HistoryEntry, StoreError>;

    /// All history entries in sequence order
    async fn history(&self, case_id: Uuid) -> Result<Vec<HistoryEntry>, StoreError>;

    /// All case ids known to the store
    async fn list_cases(&self) -> Result<Vec<Uuid>, StoreError>;
}

#[derive(Debug)]
struct CaseRecord {
    case: Case,
    history: Vec<HistoryEntry>,
}

impl CaseRecord {
    fn append(&mut self, entry: HistoryDraft) -> HistoryEntry {
        let sequence = self.history.last().map(|e| e.sequence).unwrap_or(0) + 1;
        let committed = entry.commit(self.case.id, sequence);
        self.history.push(committed.clone());
        committed
    }
}

/// In-memory case store, for embedding and tests
#[derive(Debug, Default)]
pub struct MemoryCaseStore {
    records: Mutex<HashMap<Uuid, CaseRecord>>,
}

impl MemoryCaseStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CaseStore for MemoryCaseStore {
    async fn create_case(
        &self,
        case: &Case,
        entry: HistoryDraft,
    ) -> Result<HistoryEntry, StoreError> {
        let mut records = self.records.lock().await;
        if records.contains_key(&case.id) {
            return Err(StoreError::AlreadyExists(case.id));
        }

        let mut record = CaseRecord {
            case: case.clone(),
            history: Vec::new(),
        };
        let committed = record.append(entry);
        records.insert(case.id, record);
        Ok(committed)
    }

    async fn read_case(&self, case_id: Uuid) -> Result<Case, StoreError> {
        let records = self.records.lock().await;
        records
            .get(&case_id)
            .map(|r| r.case.clone())
            .ok_or(StoreError::NotFound(case_id))
    }

    async fn conditional_write(
        &self,
        case_id: Uuid,
        write: StatusWrite,
    ) -> Result<(Case, HistoryEntry), StoreError> {
        let mut records = self.records.lock().await;
        let record = records
            .get_mut(&case_id)
            .ok_or(StoreError::NotFound(case_id))?;

        if record.case.status != write.expected {
            return Err(StoreError::PreconditionFailed {
                case_id,
                expected: write.expected,
                actual: record.case.status,
            });
        }
        write.check_artifact(case_id, |stage| record.case.source_version(stage))?;

        record.case.status = write.new_status;
        record.case.updated_at = Utc::now();
        if let Some(artifact) = write.artifact {
            record.case.artifacts.insert(artifact.stage, artifact);
        }
        let committed = record.append(write.entry);

        Ok((record.case.clone(), committed))
    }

    async fn append_history(
        &self,
        case_id: Uuid,
        entry: HistoryDraft,
    ) -> Result<HistoryEntry, StoreError> {
        let mut records = self.records.lock().await;
        let record = records
            .get_mut(&case_id)
            .ok_or(StoreError::NotFound(case_id))?;
        Ok(record.append(entry))
    }

    async fn history(&self, case_id: Uuid) -> Result<Vec<HistoryEntry>, StoreError> {
        let records = self.records.lock().await;
        records
            .get(&case_id)
            .map(|r| r.history.clone())
            .ok_or(StoreError::NotFound(case_id))
    }

    async fn list_cases(&self) -> Result<Vec<Uuid>, StoreError> {
        let records = self.records.lock().await;
        Ok(records.keys().copied().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::HistoryAction;
    use serde_json::json;

    fn intake_entry() -> HistoryDraft {
        HistoryDraft::new(
            "alice",
            HistoryAction::Create,
            None,
            CaseStatus::Intake,
            CaseStatus::Intake,
        )
    }

    #[tokio::test]
    async fn test_conditional_write_guards_status() {
        let store = MemoryCaseStore::new();
        let case = Case::new("title", "problem", "alice");
        store.create_case(&case, intake_entry()).await.unwrap();

        let start = HistoryDraft::new(
            "alice",
            HistoryAction::Regenerate,
            Some(Stage::Prd),
            CaseStatus::Intake,
            CaseStatus::PrdDrafting,
        );

        let (updated, entry) = store
            .conditional_write(case.id, StatusWrite::new(start.clone()))
            .await
            .unwrap();
        assert_eq!(updated.status, CaseStatus::PrdDrafting);
        assert_eq!(entry.sequence, 2);

        // Same expectation again loses the compare-and-swap
        let err = store
            .conditional_write(case.id, StatusWrite::new(start))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::PreconditionFailed {
                actual: CaseStatus::PrdDrafting,
                ..
            }
        ));
        assert_eq!(store.history(case.id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_artifact_written_with_status() {
        let store = MemoryCaseStore::new();
        let case = Case::new("title", "problem", "alice");
        store.create_case(&case, intake_entry()).await.unwrap();

        let artifact = Artifact::new(Stage::Prd, json!({"markdown": "# PRD"}), 1, "template");
        let write = StatusWrite::new(HistoryDraft::new(
            "alice",
            HistoryAction::ArtifactProduced,
            Some(Stage::Prd),
            CaseStatus::Intake,
            CaseStatus::PrdReview,
        ))
        .with_artifact(artifact.clone());

        let (updated, _) = store.conditional_write(case.id, write).await.unwrap();
        assert_eq!(updated.artifact(Stage::Prd), Some(&artifact));
    }

    #[tokio::test]
    async fn test_artifact_guard_rejects_newer_version() {
        let store = MemoryCaseStore::new();
        let case = Case::new("title", "problem", "alice");
        store.create_case(&case, intake_entry()).await.unwrap();

        let artifact = Artifact::new(Stage::Prd, json!({"markdown": "# PRD v2"}), 2, "template");
        let produce = StatusWrite::new(HistoryDraft::new(
            "alice",
            HistoryAction::ArtifactProduced,
            Some(Stage::Prd),
            CaseStatus::Intake,
            CaseStatus::PrdReview,
        ))
        .with_artifact(artifact);
        store.conditional_write(case.id, produce).await.unwrap();

        let approve = StatusWrite::new(HistoryDraft::new(
            "root",
            HistoryAction::Approve,
            Some(Stage::Prd),
            CaseStatus::PrdReview,
            CaseStatus::PrdApproved,
        ))
        .with_expected_artifact(Stage::Prd, 1);
        let err = store.conditional_write(case.id, approve).await.unwrap_err();
        assert!(matches!(
            err,
            StoreError::ArtifactChanged {
                expected: 1,
                actual: 2,
                ..
            }
        ));

        let unchanged = store.read_case(case.id).await.unwrap();
        assert_eq!(unchanged.status, CaseStatus::PrdReview);
        assert_eq!(store.history(case.id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_missing_case() {
        let store = MemoryCaseStore::new();
        let err = store.read_case(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_duplicate_create_rejected() {
        let store = MemoryCaseStore::new();
        let case = Case::new("title", "problem", "alice");
        store.create_case(&case, intake_entry()).await.unwrap();
        let err = store.create_case(&case, intake_entry()).await.unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists(_)));
    }
}
