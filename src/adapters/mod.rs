//! Stage producer interfaces.
//!
//! A stage producer generates one stage's artifact from the case context.
//! Producers may be slow and may fail; the orchestrator bounds every call
//! with a deadline and never retries on its own.

pub mod fabric;
pub mod http;
pub mod template;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{CaseContext, Stage};

// Re-export the producers
pub use fabric::FabricProducer;
pub use http::HttpProducer;
pub use template::TemplateProducer;

/// Output from a successful production
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProducerOutput {
    /// Structured artifact payload
    pub content: serde_json::Value,

    /// Version hint reported by the producer (the stored version is
    /// always strictly greater than the previous one)
    #[serde(default)]
    pub source_version: Option<u64>,
}

impl ProducerOutput {
    /// Create an output with just content
    pub fn new(content: serde_json::Value) -> Self {
        Self {
            content,
            source_version: None,
        }
    }

    pub fn with_source_version(mut self, version: u64) -> Self {
        self.source_version = Some(version);
        self
    }
}

/// Category of producer failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProducerErrorKind {
    /// The producer reported a failure
    Failed,

    /// The producer could not be reached
    Unavailable,

    /// The producer returned something unusable
    InvalidOutput,

    /// The deadline elapsed
    Timeout,

    /// The producer task panicked
    Crashed,
}

impl ProducerErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProducerErrorKind::Failed => "failed",
            ProducerErrorKind::Unavailable => "unavailable",
            ProducerErrorKind::InvalidOutput => "invalid_output",
            ProducerErrorKind::Timeout => "timeout",
            ProducerErrorKind::Crashed => "crashed",
        }
    }
}

impl fmt::Display for ProducerErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A producer failure: `{kind, detail}`
#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize, Deserialize)]
#[error("{kind}: {detail}")]
pub struct ProducerError {
    pub kind: ProducerErrorKind,
    pub detail: String,
}

impl ProducerError {
    pub fn new(kind: ProducerErrorKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }

    pub fn failed(detail: impl Into<String>) -> Self {
        Self::new(ProducerErrorKind::Failed, detail)
    }

    pub fn unavailable(detail: impl Into<String>) -> Self {
        Self::new(ProducerErrorKind::Unavailable, detail)
    }

    pub fn invalid_output(detail: impl Into<String>) -> Self {
        Self::new(ProducerErrorKind::InvalidOutput, detail)
    }

    pub fn timeout(deadline: Duration) -> Self {
        Self::new(
            ProducerErrorKind::Timeout,
            format!("no result within {:?}", deadline),
        )
    }

    pub fn crashed(detail: impl Into<String>) -> Self {
        Self::new(ProducerErrorKind::Crashed, detail)
    }
}

impl From<anyhow::Error> for ProducerError {
    fn from(err: anyhow::Error) -> Self {
        Self::failed(format!("{:#}", err))
    }
}

/// Trait for stage producers
#[async_trait]
pub trait StageProducer: Send + Sync {
    /// Human-readable producer name (recorded on artifacts)
    fn name(&self) -> &str;

    /// Generate the artifact for `stage`
    async fn produce(
        &self,
        stage: Stage,
        context: &CaseContext,
    ) -> Result<ProducerOutput, ProducerError>;
}

/// Stage → producer lookup
#[derive(Clone, Default)]
pub struct ProducerRegistry {
    producers: HashMap<Stage, Arc<dyn StageProducer>>,
}

impl ProducerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a producer for one stage
    pub fn register(&mut self, stage: Stage, producer: Arc<dyn StageProducer>) {
        self.producers.insert(stage, producer);
    }

    /// Builder form of `register`
    pub fn with(mut self, stage: Stage, producer: Arc<dyn StageProducer>) -> Self {
        self.register(stage, producer);
        self
    }

    /// Register the same producer for every stage
    pub fn uniform(producer: Arc<dyn StageProducer>) -> Self {
        let mut registry = Self::new();
        for stage in Stage::ALL {
            registry.register(stage, producer.clone());
        }
        registry
    }

    pub fn get(&self, stage: Stage) -> Option<Arc<dyn StageProducer>> {
        self.producers.get(&stage).cloned()
    }
}

impl fmt::Debug for ProducerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (stage, producer) in &self.producers {
            map.entry(stage, &producer.name());
        }
        map.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ProducerError::failed("model quota exceeded");
        assert_eq!(err.to_string(), "failed: model quota exceeded");

        let err = ProducerError::timeout(Duration::from_secs(5));
        assert_eq!(err.kind, ProducerErrorKind::Timeout);
    }

    #[test]
    fn test_registry_lookup() {
        let registry = ProducerRegistry::uniform(Arc::new(TemplateProducer::new()));
        assert_eq!(registry.get(Stage::Cost).unwrap().name(), "template");

        let empty = ProducerRegistry::new();
        assert!(empty.get(Stage::Cost).is_none());
    }
}
