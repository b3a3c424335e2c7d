//! Domain types for the business case workflow.
//!
//! This module contains the core data structures:
//! - Status: Stages and the closed case status enum
//! - Case: The business case record and producer context
//! - Artifact: Stage outputs
//! - History: Append-only audit entries
//! - Role: Roles and actors

pub mod artifact;
pub mod case;
pub mod history;
pub mod role;
pub mod status;

// Re-export commonly used types
pub use artifact::{content_digest, Artifact};
pub use case::{Case, CaseContext};
pub use history::{HistoryAction, HistoryDraft, HistoryEntry};
pub use role::{Actor, RoleId};
pub use status::{CaseStatus, ParseError, Stage};
