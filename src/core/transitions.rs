//! Static transition table for the business case workflow.
//!
//! Each stage declares which statuses allow production to start, the
//! status held while its producer runs, where a successful production
//! lands, and the review outcomes. Approval only ever unlocks the next
//! stage's production; `auto_chain_to_next` is the single switch that lets
//! an approval start that production immediately, and it never carries
//! through a second approval.

use std::collections::{HashMap, HashSet};

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::domain::{CaseStatus, Stage};

/// Transition declaration for a single stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageTransition {
    /// Stage this entry describes
    pub stage: Stage,

    /// Whether a stage producer generates an artifact for this stage
    pub produces_artifact: bool,

    /// Statuses from which production may be requested
    #[serde(default)]
    pub preconditions: Vec<CaseStatus>,

    /// Status held while the producer runs
    pub in_progress: Option<CaseStatus>,

    /// Status set when production succeeds (awaiting human review)
    pub success: CaseStatus,

    /// Formal review status, for stages that have one
    pub review_pending: Option<CaseStatus>,

    /// Status set on approval; doubles as the next stage's precondition
    pub approved: CaseStatus,

    /// Status set on rejection, for stages that can be rejected
    pub rejected: Option<CaseStatus>,

    /// Approval starts the next stage's production (never its approval)
    #[serde(default)]
    pub auto_chain_to_next: bool,

    /// Rejection must carry a reason
    #[serde(default = "default_reason_required")]
    pub reason_required: bool,
}

fn default_reason_required() -> bool {
    true
}

impl StageTransition {
    /// True if production may start from `status`
    pub fn accepts_request_from(&self, status: CaseStatus) -> bool {
        self.produces_artifact && self.in_progress.is_some() && self.preconditions.contains(&status)
    }

    /// True if approve/reject may act on `status`
    pub fn is_reviewable(&self, status: CaseStatus) -> bool {
        status == self.success || Some(status) == self.review_pending
    }

    /// Every status this entry references
    fn statuses(&self) -> Vec<CaseStatus> {
        let mut statuses = vec![self.success, self.approved];
        statuses.extend(self.in_progress);
        statuses.extend(self.review_pending);
        statuses.extend(self.rejected);
        statuses
    }
}

/// The full, ordered transition table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionTable {
    stages: Vec<StageTransition>,
}

impl Default for TransitionTable {
    fn default() -> Self {
        Self::standard()
    }
}

impl TransitionTable {
    /// Build a table from explicit entries, validating it
    pub fn new(stages: Vec<StageTransition>) -> Result<Self> {
        let table = Self { stages };
        table.validate()?;
        Ok(table)
    }

    /// The standard business case pipeline
    pub fn standard() -> Self {
        use CaseStatus::*;

        let producing = |stage: Stage,
                         preconditions: Vec<CaseStatus>,
                         in_progress: CaseStatus,
                         success: CaseStatus,
                         review_pending: Option<CaseStatus>,
                         approved: CaseStatus,
                         rejected: Option<CaseStatus>| StageTransition {
            stage,
            produces_artifact: true,
            preconditions,
            in_progress: Some(in_progress),
            success,
            review_pending,
            approved,
            rejected,
            auto_chain_to_next: false,
            reason_required: true,
        };

        let mut prd = producing(
            Stage::Prd,
            vec![Intake, PrdRejected, PrdReview],
            PrdDrafting,
            PrdReview,
            None,
            PrdApproved,
            Some(PrdRejected),
        );
        prd.auto_chain_to_next = true;

        let stages = vec![
            prd,
            producing(
                Stage::SystemDesign,
                vec![PrdApproved, SystemDesignRejected, SystemDesignDrafted],
                SystemDesignDrafting,
                SystemDesignDrafted,
                Some(SystemDesignPendingReview),
                SystemDesignApproved,
                Some(SystemDesignRejected),
            ),
            producing(
                Stage::Effort,
                vec![SystemDesignApproved, EffortRejected, EffortComplete],
                EffortInProgress,
                EffortComplete,
                Some(EffortPendingReview),
                EffortApproved,
                Some(EffortRejected),
            ),
            producing(
                Stage::Cost,
                vec![EffortApproved, CostRejected, CostComplete],
                CostInProgress,
                CostComplete,
                Some(CostPendingReview),
                CostApproved,
                Some(CostRejected),
            ),
            producing(
                Stage::Value,
                vec![CostApproved, ValueRejected, ValueComplete],
                ValueInProgress,
                ValueComplete,
                Some(ValuePendingReview),
                ValueApproved,
                Some(ValueRejected),
            ),
            producing(
                Stage::FinancialModel,
                vec![ValueApproved, FinancialModelComplete],
                FinancialModelInProgress,
                FinancialModelComplete,
                None,
                FinalReview,
                None,
            ),
            StageTransition {
                stage: Stage::Final,
                produces_artifact: false,
                preconditions: Vec::new(),
                in_progress: None,
                success: FinalReview,
                review_pending: Some(PendingFinalApproval),
                approved: Approved,
                rejected: Some(Rejected),
                auto_chain_to_next: false,
                reason_required: true,
            },
        ];

        Self { stages }
    }

    /// Apply per-stage overrides (from config) for auto-chain and reason policy
    pub fn with_overrides(
        mut self,
        auto_chain: &HashMap<Stage, bool>,
        reason_required: &HashMap<Stage, bool>,
    ) -> Self {
        for entry in &mut self.stages {
            if let Some(flag) = auto_chain.get(&entry.stage) {
                entry.auto_chain_to_next = *flag;
            }
            if let Some(flag) = reason_required.get(&entry.stage) {
                entry.reason_required = *flag;
            }
        }
        self
    }

    /// Set the auto-chain flag for a single stage
    pub fn with_auto_chain(mut self, stage: Stage, enabled: bool) -> Self {
        if let Some(entry) = self.stages.iter_mut().find(|e| e.stage == stage) {
            entry.auto_chain_to_next = enabled;
        }
        self
    }

    /// Validate the table definition
    pub fn validate(&self) -> Result<()> {
        if self.stages.is_empty() {
            anyhow::bail!("Transition table must declare at least one stage");
        }

        let mut seen = HashSet::new();
        for entry in &self.stages {
            if !seen.insert(entry.stage) {
                anyhow::bail!("Stage '{}' is declared more than once", entry.stage);
            }

            if entry.produces_artifact && entry.in_progress.is_none() {
                anyhow::bail!(
                    "Stage '{}' produces an artifact but declares no in-progress status",
                    entry.stage
                );
            }

            if let Some(in_progress) = entry.in_progress {
                if !in_progress.is_in_progress() {
                    anyhow::bail!(
                        "Stage '{}' uses '{}' as its in-progress status",
                        entry.stage,
                        in_progress
                    );
                }
                if entry.preconditions.contains(&in_progress) {
                    anyhow::bail!(
                        "Stage '{}' lists its in-progress status as a precondition",
                        entry.stage
                    );
                }
            }

            // Approved statuses may belong to the next stage (financial model
            // approval lands in final review); everything else is stage-local.
            for status in entry.statuses() {
                if status == entry.approved {
                    continue;
                }
                if status.stage() != Some(entry.stage) {
                    anyhow::bail!(
                        "Stage '{}' references status '{}' of another stage",
                        entry.stage,
                        status
                    );
                }
            }
        }

        Ok(())
    }

    /// Get the entry for a stage
    pub fn get(&self, stage: Stage) -> Option<&StageTransition> {
        self.stages.iter().find(|e| e.stage == stage)
    }

    /// Entry for the stage following `stage`
    pub fn next_after(&self, stage: Stage) -> Option<&StageTransition> {
        let idx = self.stages.iter().position(|e| e.stage == stage)?;
        self.stages.get(idx + 1)
    }

    /// Entry whose in-progress status is `status`
    pub fn by_in_progress(&self, status: CaseStatus) -> Option<&StageTransition> {
        self.stages.iter().find(|e| e.in_progress == Some(status))
    }

    /// All entries in order
    pub fn stages(&self) -> &[StageTransition] {
        &self.stages
    }
}
