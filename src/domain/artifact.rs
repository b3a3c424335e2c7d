//! Artifacts produced by stage producers.
//!
//! Each stage keeps only its latest artifact on the case. `source_version`
//! increments on every regeneration so approvals can be pinned to the
//! content the reviewer actually saw.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::status::Stage;

/// Output of a stage producer, as stored on the case
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    /// Stage that produced this artifact
    pub stage: Stage,

    /// Free-form structured payload (document text, breakdowns, scenarios)
    pub content: serde_json::Value,

    /// Monotonic per stage, starting at 1
    pub source_version: u64,

    /// Content digest (first 16 hex chars of SHA256)
    pub digest: String,

    /// Name of the producer that generated it
    pub producer: String,

    /// When the producer returned
    pub generated_at: DateTime<Utc>,
}

impl Artifact {
    /// Create a new artifact, computing its digest
    pub fn new(
        stage: Stage,
        content: serde_json::Value,
        source_version: u64,
        producer: impl Into<String>,
    ) -> Self {
        let digest = content_digest(&content);
        Self {
            stage,
            content,
            source_version,
            digest,
            producer: producer.into(),
            generated_at: Utc::now(),
        }
    }

    /// Size of the serialized content in bytes
    pub fn size_bytes(&self) -> u64 {
        serde_json::to_vec(&self.content)
            .map(|bytes| bytes.len() as u64)
            .unwrap_or(0)
    }

    /// Check the stored digest against the content
    pub fn verify(&self) -> bool {
        self.digest == content_digest(&self.content)
    }
}

/// Hash artifact content (first 16 chars of SHA256 over its JSON form)
pub fn content_digest(content: &serde_json::Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.to_string().as_bytes());
    let result = hasher.finalize();
    hex::encode(&result[..8])
}
