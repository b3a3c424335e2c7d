//! The business case record.
//!
//! A Case is created once at intake and then only ever changed by the
//! workflow orchestrator through status transitions.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::artifact::Artifact;
use super::status::{CaseStatus, Stage};

/// A business case moving through the drafting pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Case {
    /// Unique identifier
    pub id: Uuid,

    /// Short title
    pub title: String,

    /// Problem the case argues for solving
    pub problem_statement: String,

    /// Identity of the case owner
    pub owner: String,

    /// Current workflow status
    pub status: CaseStatus,

    /// Latest artifact per stage
    #[serde(default)]
    pub artifacts: BTreeMap<Stage, Artifact>,

    /// When the case was created
    pub created_at: DateTime<Utc>,

    /// When the case status last changed
    pub updated_at: DateTime<Utc>,
}

impl Case {
    /// Create a new case at intake
    pub fn new(
        title: impl Into<String>,
        problem_statement: impl Into<String>,
        owner: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            problem_statement: problem_statement.into(),
            owner: owner.into(),
            status: CaseStatus::Intake,
            artifacts: BTreeMap::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Latest artifact for a stage
    pub fn artifact(&self, stage: Stage) -> Option<&Artifact> {
        self.artifacts.get(&stage)
    }

    /// Version of the latest artifact for a stage (0 if never produced)
    pub fn source_version(&self, stage: Stage) -> u64 {
        self.artifact(stage).map(|a| a.source_version).unwrap_or(0)
    }

    pub fn is_owned_by(&self, actor_id: &str) -> bool {
        self.owner == actor_id
    }
}

/// Read-only view of a case handed to stage producers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseContext {
    pub case_id: Uuid,
    pub title: String,
    pub problem_statement: String,
    pub owner: String,

    /// Stage being produced
    pub stage: Stage,

    /// Artifacts of earlier stages, for producers that build on them
    pub prior_artifacts: BTreeMap<Stage, Artifact>,
}

impl CaseContext {
    /// Build the producer context for a stage from a case snapshot
    pub fn for_stage(case: &Case, stage: Stage) -> Self {
        let prior_artifacts = case
            .artifacts
            .iter()
            .filter(|(s, _)| **s < stage)
            .map(|(s, a)| (*s, a.clone()))
            .collect();

        Self {
            case_id: case.id,
            title: case.title.clone(),
            problem_statement: case.problem_statement.clone(),
            owner: case.owner.clone(),
            stage,
            prior_artifacts,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_case_creation() {
        let case = Case::new("CRM rollout", "Sales tracks leads in spreadsheets", "alice");

        assert_eq!(case.status, CaseStatus::Intake);
        assert!(case.artifacts.is_empty());
        assert!(case.is_owned_by("alice"));
        assert_eq!(case.source_version(Stage::Prd), 0);
    }

    #[test]
    fn test_context_only_carries_earlier_stages() {
        let mut case = Case::new("CRM rollout", "problem", "alice");
        case.artifacts.insert(
            Stage::Prd,
            Artifact::new(Stage::Prd, json!({"markdown": "prd"}), 1, "template"),
        );
        case.artifacts.insert(
            Stage::Cost,
            Artifact::new(Stage::Cost, json!({"total": 1}), 2, "template"),
        );

        let context = CaseContext::for_stage(&case, Stage::Effort);
        assert!(context.prior_artifacts.contains_key(&Stage::Prd));
        assert!(!context.prior_artifacts.contains_key(&Stage::Cost));
    }
}
