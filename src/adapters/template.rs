//! Offline template producer.
//!
//! Builds a deterministic skeleton artifact from the case fields so the
//! workflow can be driven end to end without any generation service.

use async_trait::async_trait;
use serde_json::json;

use crate::domain::{CaseContext, Stage};

use super::{ProducerError, ProducerOutput, StageProducer};

/// Template-based producer (no external calls)
#[derive(Debug, Default, Clone)]
pub struct TemplateProducer;

impl TemplateProducer {
    pub fn new() -> Self {
        Self
    }

    fn heading(stage: Stage) -> &'static str {
        match stage {
            Stage::Prd => "Product Requirements",
            Stage::SystemDesign => "System Design",
            Stage::Effort => "Effort Estimate",
            Stage::Cost => "Cost Breakdown",
            Stage::Value => "Value Projection",
            Stage::FinancialModel => "Financial Summary",
            Stage::Final => "Final Review",
        }
    }

    fn markdown(stage: Stage, context: &CaseContext) -> String {
        let mut doc = format!(
            "# {}: {}\n\n## Problem\n\n{}\n",
            Self::heading(stage),
            context.title,
            context.problem_statement
        );

        if !context.prior_artifacts.is_empty() {
            doc.push_str("\n## Builds on\n\n");
            for (prior, artifact) in &context.prior_artifacts {
                doc.push_str(&format!(
                    "- {} (v{}, {})\n",
                    Self::heading(*prior),
                    artifact.source_version,
                    artifact.digest
                ));
            }
        }

        doc
    }
}

#[async_trait]
impl StageProducer for TemplateProducer {
    fn name(&self) -> &str {
        "template"
    }

    async fn produce(
        &self,
        stage: Stage,
        context: &CaseContext,
    ) -> Result<ProducerOutput, ProducerError> {
        if stage == Stage::Final {
            return Err(ProducerError::invalid_output(
                "final review has no generated artifact",
            ));
        }

        let mut content = json!({
            "title": format!("{}: {}", Self::heading(stage), context.title),
            "markdown": Self::markdown(stage, context),
        });

        // Structured sections the later stages fill in by hand or via a
        // real producer
        let sections = match stage {
            Stage::Effort => Some(json!({"roles": [], "total_hours": null})),
            Stage::Cost => Some(json!({"line_items": [], "total": null, "currency": "USD"})),
            Stage::Value => Some(json!({"scenarios": {"low": null, "base": null, "high": null}})),
            Stage::FinancialModel => Some(json!({"npv": null, "roi": null, "payback_months": null})),
            _ => None,
        };
        if let Some(sections) = sections {
            content["data"] = sections;
        }

        Ok(ProducerOutput::new(content))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Artifact, Case};

    #[tokio::test]
    async fn test_template_output_mentions_case() {
        let case = Case::new("Warehouse scanners", "Picking errors cost $2M/yr", "alice");
        let context = CaseContext::for_stage(&case, Stage::Prd);

        let output = TemplateProducer::new()
            .produce(Stage::Prd, &context)
            .await
            .unwrap();

        let markdown = output.content["markdown"].as_str().unwrap();
        assert!(markdown.contains("Warehouse scanners"));
        assert!(markdown.contains("Picking errors"));
    }

    #[tokio::test]
    async fn test_template_lists_prior_artifacts() {
        let mut case = Case::new("Warehouse scanners", "problem", "alice");
        case.artifacts.insert(
            Stage::Prd,
            Artifact::new(Stage::Prd, json!({"markdown": "prd"}), 2, "template"),
        );
        let context = CaseContext::for_stage(&case, Stage::Cost);

        let output = TemplateProducer::new()
            .produce(Stage::Cost, &context)
            .await
            .unwrap();

        assert!(output.content["markdown"].as_str().unwrap().contains("(v2,"));
        assert_eq!(output.content["data"]["currency"], "USD");
    }

    #[tokio::test]
    async fn test_final_stage_not_produced() {
        let case = Case::new("t", "p", "o");
        let context = CaseContext::for_stage(&case, Stage::Final);
        assert!(TemplateProducer::new()
            .produce(Stage::Final, &context)
            .await
            .is_err());
    }
}
