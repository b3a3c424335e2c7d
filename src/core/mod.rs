//! Core workflow logic.
//!
//! This module contains:
//! - Transitions: the stage transition table
//! - CaseStore: conditional-write storage (in-memory and file-backed)
//! - Approvals: approval rules and the TTL snapshot cache
//! - Limits: producer deadlines and artifact size caps
//! - Orchestrator: the workflow engine

pub mod approvals;
pub mod case_store;
pub mod error;
pub mod event_store;
pub mod limits;
pub mod orchestrator;
pub mod transitions;

// Re-export commonly used types
pub use approvals::{
    is_authorized, ApprovalCache, ApprovalConfig, ApprovalPolicy, ApprovalRules,
    FileApprovalPolicy, PolicyError, StaticApprovalPolicy,
};
pub use case_store::{CaseStore, MemoryCaseStore, StatusWrite, StoreError};
pub use error::WorkflowError;
pub use event_store::EventStore;
pub use limits::{LimitViolation, ProducerLimits};
pub use orchestrator::{ApprovalOutcome, ChainOutcome, WorkflowOrchestrator};
pub use transitions::{StageTransition, TransitionTable};
