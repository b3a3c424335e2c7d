//! HTTP producer for a remote generation service.
//!
//! Endpoint: POST <endpoint>/<stage>
//! Auth: optional Bearer token
//!
//! Request body is the case context. A 2xx response must carry
//! `{"content": ..., "source_version": N?}`; an error response may carry
//! `{"error_kind": "...", "detail": "..."}`.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;

use crate::domain::{CaseContext, Stage};

use super::{ProducerError, ProducerErrorKind, ProducerOutput, StageProducer};

/// Error body returned by the generation service
#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error_kind: Option<ProducerErrorKind>,
    #[serde(default)]
    detail: Option<String>,
}

/// Generation service client
pub struct HttpProducer {
    endpoint: String,
    token: Option<String>,
    client: reqwest::Client,
}

impl HttpProducer {
    /// Create a new client
    pub fn new(endpoint: impl Into<String>, token: Option<String>) -> Self {
        Self {
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            token,
            client: reqwest::Client::new(),
        }
    }

    /// Create from environment variables
    pub fn from_env() -> Result<Self> {
        let endpoint = std::env::var("BIZCASE_PRODUCER_ENDPOINT")
            .context("BIZCASE_PRODUCER_ENDPOINT environment variable required")?;
        let token = std::env::var("BIZCASE_PRODUCER_TOKEN").ok();
        Ok(Self::new(endpoint, token))
    }

    /// URL for a stage
    pub fn stage_url(&self, stage: Stage) -> String {
        format!("{}/{}", self.endpoint, stage.as_str())
    }
}

#[async_trait]
impl StageProducer for HttpProducer {
    fn name(&self) -> &str {
        "http"
    }

    async fn produce(
        &self,
        stage: Stage,
        context: &CaseContext,
    ) -> Result<ProducerOutput, ProducerError> {
        let mut request = self.client.post(self.stage_url(stage)).json(context);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|e| {
            ProducerError::unavailable(format!("failed to reach generation service: {}", e))
        })?;

        let status = response.status();
        if status.is_success() {
            return response.json::<ProducerOutput>().await.map_err(|e| {
                ProducerError::invalid_output(format!("unparseable producer response: {}", e))
            });
        }

        let text = response.text().await.unwrap_or_default();
        let body: Option<ErrorBody> = serde_json::from_str(&text).ok();
        let kind = body
            .as_ref()
            .and_then(|b| b.error_kind)
            .unwrap_or(if status.is_server_error() {
                ProducerErrorKind::Unavailable
            } else {
                ProducerErrorKind::Failed
            });
        let detail = body
            .and_then(|b| b.detail)
            .unwrap_or_else(|| format!("generation service error ({}): {}", status, text));

        Err(ProducerError::new(kind, detail))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_url() {
        let producer = HttpProducer::new("http://localhost:8080/produce/", None);
        assert_eq!(
            producer.stage_url(Stage::SystemDesign),
            "http://localhost:8080/produce/system_design"
        );
    }

    #[test]
    fn test_error_body_parsing() {
        let body: ErrorBody =
            serde_json::from_str(r#"{"error_kind": "timeout", "detail": "model busy"}"#).unwrap();
        assert_eq!(body.error_kind, Some(ProducerErrorKind::Timeout));
        assert_eq!(body.detail.as_deref(), Some("model busy"));
    }

    #[tokio::test]
    async fn test_unreachable_service_is_unavailable() {
        // Port 9 (discard) on localhost is not expected to serve HTTP
        let producer = HttpProducer::new("http://127.0.0.1:9", None);
        let case = crate::domain::Case::new("t", "p", "o");
        let context = CaseContext::for_stage(&case, Stage::Prd);

        let err = producer.produce(Stage::Prd, &context).await.unwrap_err();
        assert_eq!(err.kind, ProducerErrorKind::Unavailable);
    }
}
