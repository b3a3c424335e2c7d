//! Append-only audit history for a case.
//!
//! History entries are never mutated or deleted. The sequence number is
//! assigned by the case store at commit time and is strictly increasing
//! per case.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::status::{CaseStatus, Stage};

/// Kind of action recorded in history
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HistoryAction {
    /// Case created at intake
    Create,

    /// Stage production requested (status moved to in-progress)
    Regenerate,

    /// Stage producer succeeded and its artifact was committed
    ArtifactProduced,

    /// Drafted artifact formally submitted for review
    SubmitForReview,

    /// Stage approved by an authorized reviewer
    Approve,

    /// Stage rejected by an authorized reviewer
    Reject,

    /// Status reverted after a producer failure or interruption
    SystemRollback,
}

impl HistoryAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            HistoryAction::Create => "create",
            HistoryAction::Regenerate => "regenerate",
            HistoryAction::ArtifactProduced => "artifact-produced",
            HistoryAction::SubmitForReview => "submit-for-review",
            HistoryAction::Approve => "approve",
            HistoryAction::Reject => "reject",
            HistoryAction::SystemRollback => "system-rollback",
        }
    }
}

impl std::fmt::Display for HistoryAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A committed history entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Monotonic per case, starting at 1
    pub sequence: u64,

    /// The case this entry belongs to
    pub case_id: Uuid,

    /// Who performed the action
    pub actor: String,

    /// What happened
    pub action: HistoryAction,

    /// Stage the action targeted (absent for intake)
    pub stage: Option<Stage>,

    /// Status before the action
    pub from_status: CaseStatus,

    /// Status after the action
    pub to_status: CaseStatus,

    /// Rejection reason or failure detail
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    /// Artifact version the action refers to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_version: Option<u64>,

    /// When the entry was committed
    pub timestamp: DateTime<Utc>,
}

/// A history entry waiting for its sequence number
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryDraft {
    pub actor: String,
    pub action: HistoryAction,
    pub stage: Option<Stage>,
    pub from_status: CaseStatus,
    pub to_status: CaseStatus,
    pub reason: Option<String>,
    pub source_version: Option<u64>,
}

impl HistoryDraft {
    /// Create a draft for a status transition
    pub fn new(
        actor: impl Into<String>,
        action: HistoryAction,
        stage: Option<Stage>,
        from_status: CaseStatus,
        to_status: CaseStatus,
    ) -> Self {
        Self {
            actor: actor.into(),
            action,
            stage,
            from_status,
            to_status,
            reason: None,
            source_version: None,
        }
    }

    /// Attach a reason (rejection text, failure detail)
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Attach the artifact version the action refers to
    pub fn with_source_version(mut self, version: u64) -> Self {
        self.source_version = Some(version);
        self
    }

    /// Seal the draft with its sequence number and commit timestamp
    pub fn commit(self, case_id: Uuid, sequence: u64) -> HistoryEntry {
        HistoryEntry {
            sequence,
            case_id,
            actor: self.actor,
            action: self.action,
            stage: self.stage,
            from_status: self.from_status,
            to_status: self.to_status,
            reason: self.reason,
            source_version: self.source_version,
            timestamp: Utc::now(),
        }
    }
}
