//! Error taxonomy for workflow operations.
//!
//! Validation errors carry no side effects. `ProducerFailure` is only
//! returned after the rollback and its history entry have been committed.

use thiserror::Error;
use uuid::Uuid;

use crate::adapters::ProducerError;
use crate::domain::{CaseStatus, HistoryAction, RoleId, Stage};

use super::case_store::StoreError;

/// Errors surfaced by the workflow orchestrator
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("Case not found: {0}")]
    CaseNotFound(Uuid),

    #[error("Cannot {action} stage '{stage}' while case {case_id} is in status {status}")]
    InvalidStatusForAction {
        case_id: Uuid,
        stage: Stage,
        action: HistoryAction,
        status: CaseStatus,
    },

    #[error("Actor '{actor}' with role {role} is not authorized to {action} stage '{stage}'")]
    Unauthorized {
        actor: String,
        role: RoleId,
        stage: Stage,
        action: HistoryAction,
    },

    #[error("Concurrent update on case {case_id}: expected status {expected}, found {actual:?}")]
    Conflict {
        case_id: Uuid,
        expected: CaseStatus,
        actual: Option<CaseStatus>,
    },

    #[error("Producer for stage '{stage}' failed (rolled back to {rolled_back_to}): {source}")]
    ProducerFailure {
        stage: Stage,
        rolled_back_to: CaseStatus,
        #[source]
        source: ProducerError,
    },

    #[error("Stale artifact for stage '{stage}': approval targets version {expected}, latest is {actual:?}")]
    StaleArtifact {
        stage: Stage,
        expected: u64,
        actual: Option<u64>,
    },

    #[error("Approval configuration unavailable: {0}")]
    ConfigUnavailable(String),

    #[error("Rejecting stage '{stage}' requires a reason")]
    ReasonRequired { stage: Stage },

    #[error("No producer registered for stage '{stage}'")]
    ProducerUnavailable { stage: Stage },

    #[error("Stage '{0}' is not part of the workflow")]
    UnknownStage(Stage),

    #[error("Storage error: {0}")]
    Storage(StoreError),
}

impl WorkflowError {
    /// True for errors raised before any write was attempted
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            WorkflowError::CaseNotFound(_)
                | WorkflowError::InvalidStatusForAction { .. }
                | WorkflowError::Unauthorized { .. }
                | WorkflowError::StaleArtifact { .. }
                | WorkflowError::ConfigUnavailable(_)
                | WorkflowError::ReasonRequired { .. }
                | WorkflowError::ProducerUnavailable { .. }
                | WorkflowError::UnknownStage(_)
        )
    }

    /// True for errors the caller may resolve by retrying
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            WorkflowError::Conflict { .. }
                | WorkflowError::ConfigUnavailable(_)
                | WorkflowError::ProducerFailure { .. }
        )
    }
}

impl From<StoreError> for WorkflowError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(case_id) => WorkflowError::CaseNotFound(case_id),
            StoreError::PreconditionFailed {
                case_id,
                expected,
                actual,
            } => WorkflowError::Conflict {
                case_id,
                expected,
                actual: Some(actual),
            },
            StoreError::ArtifactChanged {
                stage,
                expected,
                actual,
                ..
            } => WorkflowError::StaleArtifact {
                stage,
                expected,
                actual: (actual > 0).then_some(actual),
            },
            other => WorkflowError::Storage(other),
        }
    }
}
