//! Stages and case statuses.
//!
//! Both enums are closed and ordered. `CaseStatus` carries the canonical
//! wire names used in history logs and the case store (`PRD_Approved`,
//! `SystemDesign_Drafted`, ...).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised when parsing stage, status or role names
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("Unknown stage: {0}")]
    UnknownStage(String),

    #[error("Unknown case status: {0}")]
    UnknownStatus(String),

    #[error("Unknown role: {0}")]
    UnknownRole(String),
}

/// One phase of the business case pipeline
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Product requirements document
    Prd,

    /// System design document
    SystemDesign,

    /// Effort estimation
    Effort,

    /// Cost model
    Cost,

    /// Projected value scenarios
    Value,

    /// Financial summary
    FinancialModel,

    /// Final review of the whole case (no producer)
    Final,
}

impl Stage {
    /// All stages in pipeline order
    pub const ALL: [Stage; 7] = [
        Stage::Prd,
        Stage::SystemDesign,
        Stage::Effort,
        Stage::Cost,
        Stage::Value,
        Stage::FinancialModel,
        Stage::Final,
    ];

    /// Snake-case name used in config files and logs
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Prd => "prd",
            Stage::SystemDesign => "system_design",
            Stage::Effort => "effort",
            Stage::Cost => "cost",
            Stage::Value => "value",
            Stage::FinancialModel => "financial_model",
            Stage::Final => "final",
        }
    }

    /// The stage that follows this one, if any
    pub fn next(&self) -> Option<Stage> {
        let idx = Self::ALL.iter().position(|s| s == self)?;
        Self::ALL.get(idx + 1).copied()
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stage {
    type Err = ParseError;

    /// Accepts `SystemDesign`, `system_design` and `system-design`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .chars()
            .filter(|c| *c != '_' && *c != '-' && !c.is_whitespace())
            .flat_map(char::to_lowercase)
            .collect();

        let stage = match normalized.as_str() {
            "prd" => Stage::Prd,
            "systemdesign" | "design" => Stage::SystemDesign,
            "effort" | "effortestimation" => Stage::Effort,
            "cost" => Stage::Cost,
            "value" => Stage::Value,
            "financialmodel" | "financialsummary" => Stage::FinancialModel,
            "final" | "finalreview" => Stage::Final,
            _ => return Err(ParseError::UnknownStage(s.to_string())),
        };
        Ok(stage)
    }
}

/// Status of a case. Grouped by stage, in pipeline order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum CaseStatus {
    Intake,

    PrdDrafting,
    PrdReview,
    PrdApproved,
    PrdRejected,

    SystemDesignDrafting,
    SystemDesignDrafted,
    SystemDesignPendingReview,
    SystemDesignApproved,
    SystemDesignRejected,

    EffortInProgress,
    EffortComplete,
    EffortPendingReview,
    EffortApproved,
    EffortRejected,

    CostInProgress,
    CostComplete,
    CostPendingReview,
    CostApproved,
    CostRejected,

    ValueInProgress,
    ValueComplete,
    ValuePendingReview,
    ValueApproved,
    ValueRejected,

    FinancialModelInProgress,
    FinancialModelComplete,

    FinalReview,
    PendingFinalApproval,
    Approved,
    Rejected,
}

impl CaseStatus {
    /// Every status, in lifecycle order
    pub const ALL: [CaseStatus; 31] = [
        CaseStatus::Intake,
        CaseStatus::PrdDrafting,
        CaseStatus::PrdReview,
        CaseStatus::PrdApproved,
        CaseStatus::PrdRejected,
        CaseStatus::SystemDesignDrafting,
        CaseStatus::SystemDesignDrafted,
        CaseStatus::SystemDesignPendingReview,
        CaseStatus::SystemDesignApproved,
        CaseStatus::SystemDesignRejected,
        CaseStatus::EffortInProgress,
        CaseStatus::EffortComplete,
        CaseStatus::EffortPendingReview,
        CaseStatus::EffortApproved,
        CaseStatus::EffortRejected,
        CaseStatus::CostInProgress,
        CaseStatus::CostComplete,
        CaseStatus::CostPendingReview,
        CaseStatus::CostApproved,
        CaseStatus::CostRejected,
        CaseStatus::ValueInProgress,
        CaseStatus::ValueComplete,
        CaseStatus::ValuePendingReview,
        CaseStatus::ValueApproved,
        CaseStatus::ValueRejected,
        CaseStatus::FinancialModelInProgress,
        CaseStatus::FinancialModelComplete,
        CaseStatus::FinalReview,
        CaseStatus::PendingFinalApproval,
        CaseStatus::Approved,
        CaseStatus::Rejected,
    ];

    /// Canonical wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            CaseStatus::Intake => "INTAKE",
            CaseStatus::PrdDrafting => "PRD_Drafting",
            CaseStatus::PrdReview => "PRD_Review",
            CaseStatus::PrdApproved => "PRD_Approved",
            CaseStatus::PrdRejected => "PRD_Rejected",
            CaseStatus::SystemDesignDrafting => "SystemDesign_Drafting",
            CaseStatus::SystemDesignDrafted => "SystemDesign_Drafted",
            CaseStatus::SystemDesignPendingReview => "SystemDesign_PendingReview",
            CaseStatus::SystemDesignApproved => "SystemDesign_Approved",
            CaseStatus::SystemDesignRejected => "SystemDesign_Rejected",
            CaseStatus::EffortInProgress => "Effort_InProgress",
            CaseStatus::EffortComplete => "Effort_Complete",
            CaseStatus::EffortPendingReview => "Effort_PendingReview",
            CaseStatus::EffortApproved => "Effort_Approved",
            CaseStatus::EffortRejected => "Effort_Rejected",
            CaseStatus::CostInProgress => "Cost_InProgress",
            CaseStatus::CostComplete => "Cost_Complete",
            CaseStatus::CostPendingReview => "Cost_PendingReview",
            CaseStatus::CostApproved => "Cost_Approved",
            CaseStatus::CostRejected => "Cost_Rejected",
            CaseStatus::ValueInProgress => "Value_InProgress",
            CaseStatus::ValueComplete => "Value_Complete",
            CaseStatus::ValuePendingReview => "Value_PendingReview",
            CaseStatus::ValueApproved => "Value_Approved",
            CaseStatus::ValueRejected => "Value_Rejected",
            CaseStatus::FinancialModelInProgress => "FinancialModel_InProgress",
            CaseStatus::FinancialModelComplete => "FinancialModel_Complete",
            CaseStatus::FinalReview => "FinalReview",
            CaseStatus::PendingFinalApproval => "PendingFinalApproval",
            CaseStatus::Approved => "APPROVED",
            CaseStatus::Rejected => "REJECTED",
        }
    }

    /// Stage this status belongs to (`None` for intake)
    pub fn stage(&self) -> Option<Stage> {
        use CaseStatus::*;
        match self {
            Intake => None,
            PrdDrafting | PrdReview | PrdApproved | PrdRejected => Some(Stage::Prd),
            SystemDesignDrafting
            | SystemDesignDrafted
            | SystemDesignPendingReview
            | SystemDesignApproved
            | SystemDesignRejected => Some(Stage::SystemDesign),
            EffortInProgress | EffortComplete | EffortPendingReview | EffortApproved
            | EffortRejected => Some(Stage::Effort),
            CostInProgress | CostComplete | CostPendingReview | CostApproved | CostRejected => {
                Some(Stage::Cost)
            }
            ValueInProgress | ValueComplete | ValuePendingReview | ValueApproved
            | ValueRejected => Some(Stage::Value),
            FinancialModelInProgress | FinancialModelComplete => Some(Stage::FinancialModel),
            FinalReview | PendingFinalApproval | Approved | Rejected => Some(Stage::Final),
        }
    }

    /// True while a stage producer is running for the case
    pub fn is_in_progress(&self) -> bool {
        matches!(
            self,
            CaseStatus::PrdDrafting
                | CaseStatus::SystemDesignDrafting
                | CaseStatus::EffortInProgress
                | CaseStatus::CostInProgress
                | CaseStatus::ValueInProgress
                | CaseStatus::FinancialModelInProgress
        )
    }

    /// Soft-terminal statuses: the case is never touched again
    pub fn is_terminal(&self) -> bool {
        matches!(self, CaseStatus::Approved | CaseStatus::Rejected)
    }
}

impl fmt::Display for CaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CaseStatus {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s))
            .copied()
            .ok_or_else(|| ParseError::UnknownStatus(s.to_string()))
    }
}

impl From<CaseStatus> for String {
    fn from(status: CaseStatus) -> Self {
        status.as_str().to_string()
    }
}

impl TryFrom<String> for CaseStatus {
    type Error = ParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}
