//! bizcase - Human-gated business case workflow orchestrator
//!
//! A business case moves through a fixed sequence of stages (PRD, system
//! design, effort, cost, value, financial model, final review). Each stage
//! is drafted by a producer and gated by a human approval.
//!
//! # Architecture
//!
//! - Every status change is a conditional write against the expected
//!   current status, committed together with its history entry
//! - Producer calls run under a deadline; failures roll the case back
//! - Approval rules are read through a TTL snapshot cache that fails closed
//! - The file store derives status by replaying an append-only history
//!
//! # Modules
//!
//! - `adapters`: Stage producers (template, Fabric, HTTP)
//! - `core`: Orchestrator, transition table, stores, approvals
//! - `domain`: Data structures (Case, Artifact, HistoryEntry, roles)
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! export BIZCASE_ACTOR=alice BIZCASE_ROLE=BUSINESS_ANALYST
//! bizcase intake "Warehouse scanners" --problem "Picking errors cost $2M/yr"
//! bizcase request <case-id> prd
//! bizcase approve <case-id> prd --actor paula --role PRODUCT_OWNER
//! bizcase history <case-id>
//! ```

pub mod adapters;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;

// Re-export main types at crate root for convenience
pub use crate::core::{
    ApprovalCache, ApprovalOutcome, CaseStore, ChainOutcome, EventStore, MemoryCaseStore,
    TransitionTable, WorkflowError, WorkflowOrchestrator,
};
pub use adapters::{ProducerError, ProducerOutput, ProducerRegistry, StageProducer};
pub use domain::{Actor, Artifact, Case, CaseStatus, HistoryAction, HistoryEntry, RoleId, Stage};
