//! Fabric producer for AI-drafted stage documents.
//!
//! Subprocess mode: runs `fabric -p <pattern>` with the case context as
//! JSON on stdin and stores stdout as the artifact's markdown.

use std::collections::HashMap;
use std::process::Stdio;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::json;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::time::timeout;

use crate::domain::{CaseContext, Stage};

use super::{ProducerError, ProducerOutput, StageProducer};

/// Default Fabric pattern per stage
pub fn default_patterns() -> HashMap<Stage, String> {
    [
        (Stage::Prd, "create_prd"),
        (Stage::SystemDesign, "create_design_document"),
        (Stage::Effort, "create_effort_estimate"),
        (Stage::Cost, "create_cost_breakdown"),
        (Stage::Value, "create_value_projection"),
        (Stage::FinancialModel, "create_financial_summary"),
    ]
    .into_iter()
    .map(|(stage, pattern)| (stage, pattern.to_string()))
    .collect()
}

/// Fabric producer using subprocess mode
pub struct FabricProducer {
    /// Path to the fabric binary (default: "fabric")
    binary_path: String,

    /// Stage → pattern name
    patterns: HashMap<Stage, String>,

    /// Hard cap on the subprocess, independent of the orchestrator deadline
    process_timeout: Duration,
}

impl Default for FabricProducer {
    fn default() -> Self {
        Self::new()
    }
}

impl FabricProducer {
    /// Create a producer with the default binary and patterns
    ///
    /// Looks for fabric-ai first (Homebrew install), falls back to fabric
    pub fn new() -> Self {
        let binary_path = if std::process::Command::new("fabric-ai")
            .arg("--help")
            .output()
            .is_ok()
        {
            "fabric-ai".to_string()
        } else {
            "fabric".to_string()
        };

        Self::with_binary_path(binary_path)
    }

    /// Create a producer with a custom binary path
    pub fn with_binary_path(binary_path: impl Into<String>) -> Self {
        Self {
            binary_path: binary_path.into(),
            patterns: default_patterns(),
            process_timeout: Duration::from_secs(600),
        }
    }

    /// Override stage patterns (missing stages keep their defaults)
    pub fn with_patterns(mut self, patterns: HashMap<Stage, String>) -> Self {
        self.patterns.extend(patterns);
        self
    }

    /// Pattern used for a stage
    pub fn pattern_for(&self, stage: Stage) -> Option<&str> {
        self.patterns.get(&stage).map(String::as_str)
    }

    /// Run a pattern via subprocess
    async fn execute_subprocess(&self, pattern: &str, input: &str) -> Result<String> {
        let mut child = Command::new(&self.binary_path)
            .args(["-p", pattern])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("Failed to spawn fabric process for pattern '{}'", pattern))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(input.as_bytes())
                .await
                .context("Failed to write to fabric stdin")?;
            // Drop stdin to signal EOF
        }

        let output = timeout(self.process_timeout, child.wait_with_output())
            .await
            .with_context(|| {
                format!(
                    "Fabric pattern '{}' timed out after {:?}",
                    pattern, self.process_timeout
                )
            })?
            .with_context(|| format!("Failed to wait for fabric process for pattern '{}'", pattern))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let exit_code = output.status.code().unwrap_or(-1);
            anyhow::bail!(
                "Fabric pattern '{}' failed with exit code {}: {}",
                pattern,
                exit_code,
                stderr.trim()
            );
        }

        String::from_utf8(output.stdout).context("Fabric output is not valid UTF-8")
    }
}

#[async_trait]
impl StageProducer for FabricProducer {
    fn name(&self) -> &str {
        "fabric"
    }

    async fn produce(
        &self,
        stage: Stage,
        context: &CaseContext,
    ) -> Result<ProducerOutput, ProducerError> {
        let pattern = self.pattern_for(stage).ok_or_else(|| {
            ProducerError::unavailable(format!("no fabric pattern configured for stage '{}'", stage))
        })?;

        let input = serde_json::to_string_pretty(context)
            .map_err(|e| ProducerError::failed(format!("failed to encode case context: {}", e)))?;

        let markdown = self.execute_subprocess(pattern, &input).await?;
        if markdown.trim().is_empty() {
            return Err(ProducerError::invalid_output(format!(
                "fabric pattern '{}' returned no content",
                pattern
            )));
        }

        Ok(ProducerOutput::new(json!({
            "pattern": pattern,
            "markdown": markdown,
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Case;

    #[test]
    fn test_custom_binary_path() {
        let producer = FabricProducer::with_binary_path("/custom/path/fabric");
        assert_eq!(producer.binary_path, "/custom/path/fabric");
        assert_eq!(producer.name(), "fabric");
    }

    #[test]
    fn test_pattern_overrides() {
        let producer = FabricProducer::with_binary_path("fabric").with_patterns(
            [(Stage::Cost, "my_cost_pattern".to_string())]
                .into_iter()
                .collect(),
        );
        assert_eq!(producer.pattern_for(Stage::Cost), Some("my_cost_pattern"));
        assert_eq!(producer.pattern_for(Stage::Prd), Some("create_prd"));
        assert_eq!(producer.pattern_for(Stage::Final), None);
    }

    #[tokio::test]
    async fn test_missing_binary_is_a_producer_failure() {
        let producer = FabricProducer::with_binary_path("/nonexistent/fabric-binary");
        let case = Case::new("t", "p", "o");
        let context = CaseContext::for_stage(&case, Stage::Prd);

        let err = producer.produce(Stage::Prd, &context).await.unwrap_err();
        assert!(err.detail.contains("Failed to spawn"));
    }
}
