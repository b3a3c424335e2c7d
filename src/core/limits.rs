//! Deadlines and size limits for stage producers.
//!
//! Every producer call carries a bounded deadline, enforced by the
//! orchestrator whether or not the producer honours cancellation.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::Stage;

/// Limits applied to stage producer invocations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProducerLimits {
    /// Default per-call deadline in seconds (default: 120)
    #[serde(default = "default_producer_timeout")]
    pub producer_timeout_seconds: u64,

    /// Per-stage deadline overrides in seconds
    #[serde(default)]
    pub stage_timeouts: HashMap<Stage, u64>,

    /// Maximum serialized artifact size in bytes (default: 10MB)
    #[serde(default = "default_max_artifact_bytes")]
    pub max_artifact_bytes: u64,
}

fn default_producer_timeout() -> u64 {
    120
}
fn default_max_artifact_bytes() -> u64 {
    10 * 1024 * 1024
} // 10MB

impl Default for ProducerLimits {
    fn default() -> Self {
        Self {
            producer_timeout_seconds: default_producer_timeout(),
            stage_timeouts: HashMap::new(),
            max_artifact_bytes: default_max_artifact_bytes(),
        }
    }
}

impl ProducerLimits {
    /// Effective deadline for a stage
    pub fn timeout_for(&self, stage: Stage) -> Duration {
        let seconds = self
            .stage_timeouts
            .get(&stage)
            .copied()
            .unwrap_or(self.producer_timeout_seconds);
        Duration::from_secs(seconds)
    }

    /// Validate a produced artifact against the size limit
    pub fn validate_artifact(&self, size_bytes: u64) -> Result<(), LimitViolation> {
        if size_bytes > self.max_artifact_bytes {
            return Err(LimitViolation::MaxArtifactBytes {
                actual: size_bytes,
                limit: self.max_artifact_bytes,
            });
        }
        Ok(())
    }
}

/// Limit violations
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LimitViolation {
    #[error("Maximum artifact bytes exceeded: {actual} > {limit}")]
    MaxArtifactBytes { actual: u64, limit: u64 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_limits() {
        let limits = ProducerLimits::default();
        assert_eq!(limits.producer_timeout_seconds, 120);
        assert_eq!(limits.max_artifact_bytes, 10 * 1024 * 1024);
        assert_eq!(limits.timeout_for(Stage::Cost), Duration::from_secs(120));
    }

    #[test]
    fn test_stage_timeout_override() {
        let limits: ProducerLimits = serde_yaml::from_str(
            r#"
producer_timeout_seconds: 30
stage_timeouts:
  system_design: 300
"#,
        )
        .unwrap();

        assert_eq!(limits.timeout_for(Stage::SystemDesign), Duration::from_secs(300));
        assert_eq!(limits.timeout_for(Stage::Effort), Duration::from_secs(30));
    }

    #[test]
    fn test_artifact_size_validation() {
        let limits = ProducerLimits {
            max_artifact_bytes: 100,
            ..Default::default()
        };

        assert!(limits.validate_artifact(100).is_ok());
        assert_eq!(
            limits.validate_artifact(200),
            Err(LimitViolation::MaxArtifactBytes {
                actual: 200,
                limit: 100
            })
        );
    }
}
