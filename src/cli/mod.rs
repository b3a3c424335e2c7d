//! Command-line interface for bizcase.
//!
//! Provides commands for opening cases, driving stages through
//! production and review, and inspecting case status and history.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use uuid::Uuid;

use crate::adapters::{
    FabricProducer, HttpProducer, ProducerRegistry, StageProducer, TemplateProducer,
};
use crate::config::{self, ProducerBackend, ResolvedConfig};
use crate::core::{
    ApprovalCache, ApprovalPolicy, ApprovalRules, ChainOutcome, EventStore, FileApprovalPolicy,
    StaticApprovalPolicy, TransitionTable, WorkflowOrchestrator,
};
use crate::domain::{Actor, Case, RoleId, Stage};

/// bizcase - Human-gated business case workflow
#[derive(Parser, Debug)]
#[command(name = "bizcase")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Acting user id
    #[arg(long, global = true, env = "BIZCASE_ACTOR")]
    pub actor: Option<String>,

    /// Acting user's role (e.g. PRODUCT_OWNER, FINANCE_APPROVER)
    #[arg(long, global = true, env = "BIZCASE_ROLE")]
    pub role: Option<RoleId>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Open a new business case
    Intake {
        /// Case title
        title: String,

        /// Problem statement
        #[arg(short, long, conflicts_with = "problem_file")]
        problem: Option<String>,

        /// Read the problem statement from a file
        #[arg(long)]
        problem_file: Option<PathBuf>,
    },

    /// Produce (or regenerate) a stage's artifact
    Request {
        /// Case ID (UUID)
        case_id: Uuid,

        /// Stage (prd, system_design, effort, cost, value, financial_model)
        stage: Stage,
    },

    /// Move a drafted stage into formal review
    Submit {
        case_id: Uuid,
        stage: Stage,
    },

    /// Approve a stage awaiting review
    Approve {
        case_id: Uuid,
        stage: Stage,

        /// Artifact version being approved; rejects the approval if stale
        #[arg(long = "expect-version")]
        expect_version: Option<u64>,
    },

    /// Reject a stage awaiting review
    Reject {
        case_id: Uuid,
        stage: Stage,

        /// Why the artifact was rejected
        #[arg(short, long)]
        reason: Option<String>,
    },

    /// Show a case's status and artifacts
    Status {
        case_id: Uuid,

        /// Print artifact content
        #[arg(long)]
        full: bool,
    },

    /// Show a case's history
    History { case_id: Uuid },

    /// List recent cases
    Cases {
        /// Maximum number of cases to show
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },

    /// Roll back productions interrupted by a crash
    Recover,

    /// Show resolved configuration
    Config,
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<()> {
        if let Commands::Config = self.command {
            return show_config().await;
        }

        let orchestrator = build_orchestrator()?;

        match &self.command {
            Commands::Intake {
                title,
                problem,
                problem_file,
            } => {
                let problem = match (problem, problem_file) {
                    (Some(problem), _) => problem.clone(),
                    (None, Some(path)) => std::fs::read_to_string(path).with_context(|| {
                        format!("Failed to read problem statement: {}", path.display())
                    })?,
                    (None, None) => anyhow::bail!("Provide --problem or --problem-file"),
                };
                if problem.trim().is_empty() {
                    anyhow::bail!("Problem statement is empty");
                }

                let case = orchestrator.intake(title, &problem, &self.acting()?).await?;
                println!("{}", case.id);
                eprintln!("[Case '{}' opened at {}]", case.title, case.status);
            }
            Commands::Request { case_id, stage } => {
                let case = orchestrator
                    .request_stage(*case_id, *stage, &self.acting()?)
                    .await?;
                print_artifact_summary(&case, *stage);
                eprintln!("[Case {} now {}]", case.id, case.status);
            }
            Commands::Submit { case_id, stage } => {
                let case = orchestrator
                    .submit_for_review(*case_id, *stage, &self.acting()?)
                    .await?;
                eprintln!("[Case {} now {}]", case.id, case.status);
            }
            Commands::Approve {
                case_id,
                stage,
                expect_version,
            } => {
                let outcome = orchestrator
                    .approve_stage(*case_id, *stage, &self.acting()?, *expect_version)
                    .await?;

                match &outcome.chained {
                    Some(ChainOutcome::Produced { stage: next, case }) => {
                        print_artifact_summary(case, *next);
                        eprintln!("[Approved {}; {} drafted automatically]", stage, next);
                    }
                    Some(ChainOutcome::Failed { stage: next, error }) => {
                        eprintln!(
                            "[Approved {}; automatic {} production failed: {}]",
                            stage, next, error
                        );
                    }
                    None => eprintln!("[Approved {}]", stage),
                }
                eprintln!("[Case {} now {}]", outcome.case.id, outcome.case.status);
            }
            Commands::Reject {
                case_id,
                stage,
                reason,
            } => {
                let case = orchestrator
                    .reject_stage(*case_id, *stage, &self.acting()?, reason.as_deref())
                    .await?;
                eprintln!("[Case {} now {}]", case.id, case.status);
            }
            Commands::Status { case_id, full } => {
                let case = orchestrator.case(*case_id).await?;
                show_status(&case, *full)?;
            }
            Commands::History { case_id } => {
                let history = orchestrator.history(*case_id).await?;

                println!(
                    "{:<5} {:<20} {:<12} {:<18} {:<16} {}",
                    "SEQ", "TIME", "ACTOR", "ACTION", "STAGE", "TRANSITION"
                );
                println!("{}", "-".repeat(110));
                for entry in history {
                    println!(
                        "{:<5} {:<20} {:<12} {:<18} {:<16} {} -> {}",
                        entry.sequence,
                        entry.timestamp.format("%Y-%m-%d %H:%M:%S"),
                        entry.actor,
                        entry.action.as_str(),
                        entry.stage.map(|s| s.to_string()).unwrap_or_else(|| "-".into()),
                        entry.from_status,
                        entry.to_status,
                    );
                    if let Some(reason) = &entry.reason {
                        println!("      reason: {}", reason);
                    }
                }
            }
            Commands::Cases { limit } => {
                let cases = orchestrator.cases(*limit).await?;
                if cases.is_empty() {
                    println!("No cases found");
                    return Ok(());
                }

                println!("{:<38} {:<28} {:<12} {}", "CASE ID", "STATUS", "OWNER", "TITLE");
                println!("{}", "-".repeat(100));
                for case in cases {
                    println!(
                        "{:<38} {:<28} {:<12} {}",
                        case.id,
                        case.status.as_str(),
                        case.owner,
                        case.title
                    );
                }
            }
            Commands::Recover => {
                let recovered = orchestrator.recover_interrupted().await?;
                if recovered.is_empty() {
                    println!("No interrupted productions found");
                }
                for case in recovered {
                    println!("{} restored to {}", case.id, case.status);
                }
            }
            Commands::Config => return show_config().await,
        }

        Ok(())
    }

    /// The acting user from --actor/--role
    fn acting(&self) -> Result<Actor> {
        let id = self
            .actor
            .clone()
            .context("No actor given. Use --actor or set BIZCASE_ACTOR")?;
        let role = self
            .role
            .context("No role given. Use --role or set BIZCASE_ROLE")?;
        Ok(Actor::new(id, role))
    }
}

/// Wire the orchestrator from resolved configuration
fn build_orchestrator() -> Result<WorkflowOrchestrator> {
    let cfg = config::config()?;

    let store = EventStore::open_default()?;

    let policy: Arc<dyn ApprovalPolicy> = match &cfg.config_file {
        Some(path) => Arc::new(FileApprovalPolicy::new(path)),
        None => Arc::new(StaticApprovalPolicy::new(ApprovalRules::standard())),
    };
    let approvals = Arc::new(ApprovalCache::new(policy, cfg.approval_cache_ttl));

    let table = TransitionTable::standard()
        .with_overrides(&cfg.workflow.auto_chain, &cfg.workflow.reason_required);
    table.validate()?;

    Ok(
        WorkflowOrchestrator::new(Arc::new(store), approvals, build_registry(cfg)?)
            .with_table(table)
            .with_limits(cfg.limits.clone()),
    )
}

fn build_registry(cfg: &ResolvedConfig) -> Result<ProducerRegistry> {
    let producer: Arc<dyn StageProducer> = match cfg.producers.backend {
        ProducerBackend::Template => Arc::new(TemplateProducer::new()),
        ProducerBackend::Fabric => {
            let fabric = match &cfg.producers.fabric_binary {
                Some(binary) => FabricProducer::with_binary_path(binary),
                None => FabricProducer::new(),
            };
            Arc::new(fabric.with_patterns(cfg.producers.patterns.clone()))
        }
        ProducerBackend::Http => match &cfg.producers.endpoint {
            Some(endpoint) => Arc::new(HttpProducer::new(
                endpoint.clone(),
                std::env::var("BIZCASE_PRODUCER_TOKEN").ok(),
            )),
            None => Arc::new(HttpProducer::from_env()?),
        },
    };

    let mut registry = ProducerRegistry::new();
    for stage in Stage::ALL {
        if stage != Stage::Final {
            registry.register(stage, producer.clone());
        }
    }
    Ok(registry)
}

fn print_artifact_summary(case: &Case, stage: Stage) {
    if let Some(artifact) = case.artifact(stage) {
        println!(
            "{} v{} ({} bytes, digest {}, by {})",
            stage,
            artifact.source_version,
            artifact.size_bytes(),
            artifact.digest,
            artifact.producer
        );
    }
}

fn show_status(case: &Case, full: bool) -> Result<()> {
    println!("Case ID: {}", case.id);
    println!("Title: {}", case.title);
    println!("Owner: {}", case.owner);
    println!("Status: {}", case.status);
    println!("Created: {}", case.created_at);
    println!("Updated: {}", case.updated_at);

    if case.artifacts.is_empty() {
        println!("\nNo artifacts yet");
        return Ok(());
    }

    println!("\nArtifacts:");
    for (stage, artifact) in &case.artifacts {
        println!(
            "  {:<16} v{:<3} {} ({})",
            stage.as_str(),
            artifact.source_version,
            artifact.digest,
            artifact.generated_at
        );
        if full {
            let content = match artifact.content.get("markdown").and_then(|m| m.as_str()) {
                Some(markdown) => markdown.to_string(),
                None => serde_json::to_string_pretty(&artifact.content)?,
            };
            println!("\n{}\n", content);
        }
    }

    Ok(())
}

/// Show resolved configuration
async fn show_config() -> Result<()> {
    let cfg = config::config()?;

    println!("bizcase configuration");
    println!();
    println!(
        "Config file: {}",
        cfg.config_file
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(none - using defaults)".to_string())
    );
    println!();
    println!("Paths:");
    println!("  Home:  {}", cfg.home.display());
    println!("  Cases: {}", config::cases_dir()?.display());
    println!();
    println!("Producers:");
    println!("  Backend: {}", cfg.producers.backend);
    if let Some(endpoint) = &cfg.producers.endpoint {
        println!("  Endpoint: {}", endpoint);
    }
    println!();
    println!("Limits:");
    println!("  Producer timeout:   {}s", cfg.limits.producer_timeout_seconds);
    for (stage, seconds) in &cfg.limits.stage_timeouts {
        println!("    {}: {}s", stage, seconds);
    }
    println!("  Max artifact size:  {} bytes", cfg.limits.max_artifact_bytes);
    println!("  Approval cache TTL: {}s", cfg.approval_cache_ttl.as_secs());
    println!();

    let table = TransitionTable::standard()
        .with_overrides(&cfg.workflow.auto_chain, &cfg.workflow.reason_required);
    println!("Stages:");
    for transition in table.stages() {
        println!(
            "  {:<16} auto-chain: {:<5} reason required: {}",
            transition.stage.as_str(),
            transition.auto_chain_to_next,
            transition.reason_required
        );
    }

    Ok(())
}
