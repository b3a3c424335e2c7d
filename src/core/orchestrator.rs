//! Workflow orchestrator for business cases.
//!
//! Validates requested transitions against the transition table and the
//! approval policy, runs stage producers under a deadline, and commits
//! every status change as a compare-and-swap on the case store. A case is
//! never left in an in-progress status when an operation returns.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::adapters::{ProducerError, ProducerOutput, ProducerRegistry, StageProducer};
use crate::domain::{
    Actor, Artifact, Case, CaseContext, CaseStatus, HistoryAction, HistoryDraft, HistoryEntry,
    Stage,
};

use super::approvals::{is_authorized, ApprovalCache, ApprovalConfig};
use super::case_store::{CaseStore, StatusWrite, StoreError};
use super::error::WorkflowError;
use super::limits::ProducerLimits;
use super::transitions::{StageTransition, TransitionTable};

/// Attempts made to commit a rollback before giving up to recovery
const ROLLBACK_ATTEMPTS: u32 = 3;

/// Result of an auto-chained production triggered by an approval
#[derive(Debug)]
pub enum ChainOutcome {
    /// The next stage's artifact was produced and awaits review
    Produced { stage: Stage, case: Case },

    /// The next stage's production failed; only that stage was rolled back
    Failed { stage: Stage, error: WorkflowError },
}

/// Result of a successful approval
#[derive(Debug)]
pub struct ApprovalOutcome {
    /// Latest case snapshot
    pub case: Case,

    /// Auto-chained production, if the stage is configured for it
    pub chained: Option<ChainOutcome>,
}

impl ApprovalOutcome {
    /// True if an auto-chained production failed after the approval committed
    pub fn is_partial_failure(&self) -> bool {
        matches!(self.chained, Some(ChainOutcome::Failed { .. }))
    }
}

/// Removes a case from the in-flight set when production ends
struct InFlightGuard<'a> {
    set: &'a Mutex<HashSet<Uuid>>,
    case_id: Uuid,
}

impl<'a> InFlightGuard<'a> {
    fn new(set: &'a Mutex<HashSet<Uuid>>, case_id: Uuid) -> Self {
        set.lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(case_id);
        Self { set, case_id }
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.set
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(&self.case_id);
    }
}

/// The business case workflow orchestrator
pub struct WorkflowOrchestrator {
    store: Arc<dyn CaseStore>,
    approvals: Arc<ApprovalCache>,
    producers: ProducerRegistry,
    table: TransitionTable,
    limits: ProducerLimits,

    /// Cases whose producer is running in this process
    in_flight: Mutex<HashSet<Uuid>>,
}

impl WorkflowOrchestrator {
    /// Create an orchestrator with the standard transition table
    pub fn new(
        store: Arc<dyn CaseStore>,
        approvals: Arc<ApprovalCache>,
        producers: ProducerRegistry,
    ) -> Self {
        Self {
            store,
            approvals,
            producers,
            table: TransitionTable::standard(),
            limits: ProducerLimits::default(),
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    pub fn with_table(mut self, table: TransitionTable) -> Self {
        self.table = table;
        self
    }

    pub fn with_limits(mut self, limits: ProducerLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn table(&self) -> &TransitionTable {
        &self.table
    }

    // ========================================================================
    // Intake
    // ========================================================================

    /// Create a new case at INTAKE
    #[instrument(skip(self, problem_statement, owner), fields(owner = %owner.id))]
    pub async fn intake(
        &self,
        title: &str,
        problem_statement: &str,
        owner: &Actor,
    ) -> Result<Case, WorkflowError> {
        let case = Case::new(title, problem_statement, owner.id.clone());
        let entry = HistoryDraft::new(
            owner.id.clone(),
            HistoryAction::Create,
            None,
            CaseStatus::Intake,
            CaseStatus::Intake,
        );
        self.store.create_case(&case, entry).await?;

        info!(case_id = %case.id, "Case created");
        Ok(case)
    }

    // ========================================================================
    // Stage production
    // ========================================================================

    /// Run the producer for `stage` and leave the case awaiting review.
    ///
    /// On producer failure or timeout the case is rolled back to the
    /// status it held before this call and `ProducerFailure` is returned.
    #[instrument(skip(self, actor), fields(case_id = %case_id, stage = %stage, actor = %actor.id))]
    pub async fn request_stage(
        &self,
        case_id: Uuid,
        stage: Stage,
        actor: &Actor,
    ) -> Result<Case, WorkflowError> {
        let transition = self.transition(stage)?;
        let case = self.store.read_case(case_id).await?;

        if !transition.accepts_request_from(case.status) {
            return Err(WorkflowError::InvalidStatusForAction {
                case_id,
                stage,
                action: HistoryAction::Regenerate,
                status: case.status,
            });
        }

        let producer = self
            .producers
            .get(stage)
            .ok_or(WorkflowError::ProducerUnavailable { stage })?;

        // Production may be requested by the owner or by a stage reviewer
        let config = self.approval_snapshot().await?;
        if !case.is_owned_by(&actor.id) && !is_authorized(actor.role, stage, &config) {
            return Err(WorkflowError::Unauthorized {
                actor: actor.id.clone(),
                role: actor.role,
                stage,
                action: HistoryAction::Regenerate,
            });
        }

        self.produce(case, transition, producer, actor, None).await
    }

    /// Claim the in-progress status, invoke the producer, then commit or roll back
    async fn produce(
        &self,
        case: Case,
        transition: &StageTransition,
        producer: Arc<dyn StageProducer>,
        actor: &Actor,
        note: Option<String>,
    ) -> Result<Case, WorkflowError> {
        let stage = transition.stage;
        let restore_to = case.status;
        let in_progress = transition
            .in_progress
            .ok_or(WorkflowError::ProducerUnavailable { stage })?;

        let mut start = HistoryDraft::new(
            actor.id.clone(),
            HistoryAction::Regenerate,
            Some(stage),
            restore_to,
            in_progress,
        );
        if let Some(note) = note {
            start = start.with_reason(note);
        }

        // Losing this compare-and-swap means another request got here first;
        // the producer is not invoked.
        let (claimed, _) = self
            .store
            .conditional_write(case.id, StatusWrite::new(start))
            .await?;
        let _guard = InFlightGuard::new(&self.in_flight, case.id);

        info!(case_id = %case.id, %stage, producer = producer.name(), "Stage production started");

        let producer_name = producer.name().to_string();
        let context = CaseContext::for_stage(&claimed, stage);
        let deadline = self.limits.timeout_for(stage);

        let result = self
            .invoke(producer, stage, context, deadline)
            .await
            .and_then(|output| self.validate_output(output));

        match result {
            Ok(output) => {
                self.commit_artifact(&claimed, transition, in_progress, restore_to, &producer_name, output, actor)
                    .await
            }
            Err(failure) => Err(self
                .rollback(case.id, stage, in_progress, restore_to, actor, failure)
                .await),
        }
    }

    /// Invoke a producer with a deadline.
    ///
    /// The producer runs on its own task. If the deadline passes the task is
    /// detached: whatever it eventually returns is dropped unread.
    async fn invoke(
        &self,
        producer: Arc<dyn StageProducer>,
        stage: Stage,
        context: CaseContext,
        deadline: Duration,
    ) -> Result<ProducerOutput, ProducerError> {
        let started = Instant::now();
        let case_id = context.case_id;
        let handle = tokio::spawn(async move { producer.produce(stage, &context).await });

        match tokio::time::timeout(deadline, handle).await {
            Ok(Ok(result)) => {
                debug!(
                    %case_id,
                    %stage,
                    duration_ms = started.elapsed().as_millis() as u64,
                    ok = result.is_ok(),
                    "Producer returned"
                );
                result
            }
            Ok(Err(join_error)) => Err(ProducerError::crashed(join_error.to_string())),
            Err(_) => {
                warn!(%case_id, %stage, ?deadline, "Producer deadline elapsed, detaching late result");
                Err(ProducerError::timeout(deadline))
            }
        }
    }

    fn validate_output(&self, output: ProducerOutput) -> Result<ProducerOutput, ProducerError> {
        let size = serde_json::to_vec(&output.content)
            .map(|bytes| bytes.len() as u64)
            .map_err(|e| ProducerError::invalid_output(e.to_string()))?;

        self.limits
            .validate_artifact(size)
            .map_err(|violation| ProducerError::invalid_output(violation.to_string()))?;

        Ok(output)
    }

    /// Commit a produced artifact together with the success status
    #[allow(clippy::too_many_arguments)]
    async fn commit_artifact(
        &self,
        claimed: &Case,
        transition: &StageTransition,
        in_progress: CaseStatus,
        restore_to: CaseStatus,
        producer_name: &str,
        output: ProducerOutput,
        actor: &Actor,
    ) -> Result<Case, WorkflowError> {
        let stage = transition.stage;
        let version = (claimed.source_version(stage) + 1).max(output.source_version.unwrap_or(0));
        let artifact = Artifact::new(stage, output.content, version, producer_name);

        let write = StatusWrite::new(
            HistoryDraft::new(
                actor.id.clone(),
                HistoryAction::ArtifactProduced,
                Some(stage),
                in_progress,
                transition.success,
            )
            .with_source_version(version),
        )
        .with_artifact(artifact);

        match self.store.conditional_write(claimed.id, write).await {
            Ok((case, _)) => {
                info!(case_id = %case.id, %stage, version, status = %case.status, "Stage artifact committed");
                Ok(case)
            }
            Err(StoreError::PreconditionFailed {
                case_id,
                expected,
                actual,
            }) => {
                // The case moved on (e.g. recovered) while the producer ran
                warn!(%case_id, %stage, %actual, "Discarding producer result for a case that moved on");
                Err(WorkflowError::Conflict {
                    case_id,
                    expected,
                    actual: Some(actual),
                })
            }
            Err(e) => {
                let failure = ProducerError::failed(format!("failed to commit artifact: {}", e));
                Err(self
                    .rollback(claimed.id, stage, in_progress, restore_to, actor, failure)
                    .await)
            }
        }
    }

    /// Revert an in-progress status and record why. Returns the error to surface.
    async fn rollback(
        &self,
        case_id: Uuid,
        stage: Stage,
        in_progress: CaseStatus,
        restore_to: CaseStatus,
        actor: &Actor,
        failure: ProducerError,
    ) -> WorkflowError {
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            let entry = HistoryDraft::new(
                actor.id.clone(),
                HistoryAction::SystemRollback,
                Some(stage),
                in_progress,
                restore_to,
            )
            .with_reason(failure.to_string());

            match self
                .store
                .conditional_write(case_id, StatusWrite::new(entry))
                .await
            {
                Ok(_) => {
                    warn!(%case_id, %stage, %restore_to, error = %failure, "Stage production rolled back");
                    return WorkflowError::ProducerFailure {
                        stage,
                        rolled_back_to: restore_to,
                        source: failure,
                    };
                }
                Err(err @ StoreError::PreconditionFailed { .. }) => {
                    // Someone else already moved the case out of in-progress
                    warn!(%case_id, %stage, error = %err, "Rollback skipped, case already moved on");
                    return err.into();
                }
                Err(err) if attempt < ROLLBACK_ATTEMPTS => {
                    warn!(%case_id, %stage, attempt, error = %err, "Rollback write failed, retrying");
                    tokio::time::sleep(Duration::from_millis(100 * attempt as u64)).await;
                }
                Err(err) => {
                    error!(
                        %case_id,
                        %stage,
                        error = %err,
                        "Rollback failed; case stays in progress until recovery"
                    );
                    return WorkflowError::Storage(err);
                }
            }
        }
    }

    // ========================================================================
    // Review
    // ========================================================================

    /// Move a drafted artifact into its stage's formal review status
    #[instrument(skip(self, actor), fields(case_id = %case_id, stage = %stage, actor = %actor.id))]
    pub async fn submit_for_review(
        &self,
        case_id: Uuid,
        stage: Stage,
        actor: &Actor,
    ) -> Result<Case, WorkflowError> {
        let transition = self.transition(stage)?;
        let case = self.store.read_case(case_id).await?;

        let pending = match transition.review_pending {
            Some(pending) if case.status == transition.success => pending,
            _ => {
                return Err(WorkflowError::InvalidStatusForAction {
                    case_id,
                    stage,
                    action: HistoryAction::SubmitForReview,
                    status: case.status,
                })
            }
        };

        let config = self.approval_snapshot().await?;
        if !case.is_owned_by(&actor.id) && !is_authorized(actor.role, stage, &config) {
            return Err(WorkflowError::Unauthorized {
                actor: actor.id.clone(),
                role: actor.role,
                stage,
                action: HistoryAction::SubmitForReview,
            });
        }

        let mut entry = HistoryDraft::new(
            actor.id.clone(),
            HistoryAction::SubmitForReview,
            Some(stage),
            case.status,
            pending,
        );
        if let Some(artifact) = case.artifact(stage) {
            entry = entry.with_source_version(artifact.source_version);
        }

        let (case, _) = self
            .store
            .conditional_write(case_id, StatusWrite::new(entry))
            .await?;

        info!(%case_id, %stage, "Stage submitted for review");
        Ok(case)
    }

    /// Approve a stage awaiting review.
    ///
    /// When `expected_source_version` is given it must match the latest
    /// artifact version, so reviewers cannot approve content that was
    /// regenerated after they read it. If the stage auto-chains, the next
    /// stage's production runs afterwards; its failure never undoes this
    /// approval and is reported in `ApprovalOutcome::chained`.
    #[instrument(skip(self, actor), fields(case_id = %case_id, stage = %stage, actor = %actor.id))]
    pub async fn approve_stage(
        &self,
        case_id: Uuid,
        stage: Stage,
        actor: &Actor,
        expected_source_version: Option<u64>,
    ) -> Result<ApprovalOutcome, WorkflowError> {
        let transition = self.transition(stage)?;
        let case = self.store.read_case(case_id).await?;

        if !transition.is_reviewable(case.status) {
            return Err(WorkflowError::InvalidStatusForAction {
                case_id,
                stage,
                action: HistoryAction::Approve,
                status: case.status,
            });
        }

        let config = self.approval_snapshot().await?;
        self.authorize_review(actor, stage, HistoryAction::Approve, &config)?;

        let current_version = case.artifact(stage).map(|a| a.source_version);
        if let Some(expected) = expected_source_version {
            if current_version != Some(expected) {
                return Err(WorkflowError::StaleArtifact {
                    stage,
                    expected,
                    actual: current_version,
                });
            }
        }

        let mut entry = HistoryDraft::new(
            actor.id.clone(),
            HistoryAction::Approve,
            Some(stage),
            case.status,
            transition.approved,
        );
        if let Some(version) = current_version {
            entry = entry.with_source_version(version);
        }

        // The approved content must still be the content checked above
        let write =
            StatusWrite::new(entry).with_expected_artifact(stage, case.source_version(stage));
        let (approved, _) = self.store.conditional_write(case_id, write).await?;

        info!(%case_id, %stage, status = %approved.status, "Stage approved");

        if !transition.auto_chain_to_next {
            return Ok(ApprovalOutcome {
                case: approved,
                chained: None,
            });
        }

        let chained = self.auto_chain(approved.clone(), stage, actor).await;
        let case = match &chained {
            Some(ChainOutcome::Produced { case, .. }) => case.clone(),
            Some(ChainOutcome::Failed { .. }) => match self.store.read_case(case_id).await {
                Ok(latest) => latest,
                Err(_) => approved,
            },
            None => approved,
        };

        Ok(ApprovalOutcome { case, chained })
    }

    /// Start the next stage's production after an approval (production only)
    async fn auto_chain(&self, approved: Case, stage: Stage, actor: &Actor) -> Option<ChainOutcome> {
        let next = self.table.next_after(stage)?;
        if !next.accepts_request_from(approved.status) {
            debug!(%stage, next = %next.stage, "Next stage cannot start from approved status");
            return None;
        }

        let Some(producer) = self.producers.get(next.stage) else {
            return Some(ChainOutcome::Failed {
                stage: next.stage,
                error: WorkflowError::ProducerUnavailable { stage: next.stage },
            });
        };

        info!(case_id = %approved.id, from = %stage, to = %next.stage, "Auto-chaining production");
        let note = format!("auto-chained from {} approval", stage);

        Some(match self.produce(approved, next, producer, actor, Some(note)).await {
            Ok(case) => ChainOutcome::Produced {
                stage: next.stage,
                case,
            },
            Err(error) => {
                warn!(next = %next.stage, error = %error, "Auto-chained production failed");
                ChainOutcome::Failed {
                    stage: next.stage,
                    error,
                }
            }
        })
    }

    /// Reject a stage awaiting review
    #[instrument(skip(self, actor, reason), fields(case_id = %case_id, stage = %stage, actor = %actor.id))]
    pub async fn reject_stage(
        &self,
        case_id: Uuid,
        stage: Stage,
        actor: &Actor,
        reason: Option<&str>,
    ) -> Result<Case, WorkflowError> {
        let transition = self.transition(stage)?;
        let case = self.store.read_case(case_id).await?;

        let rejected = match transition.rejected {
            Some(rejected) if transition.is_reviewable(case.status) => rejected,
            _ => {
                return Err(WorkflowError::InvalidStatusForAction {
                    case_id,
                    stage,
                    action: HistoryAction::Reject,
                    status: case.status,
                })
            }
        };

        let config = self.approval_snapshot().await?;
        self.authorize_review(actor, stage, HistoryAction::Reject, &config)?;

        let reason = reason.map(str::trim).filter(|r| !r.is_empty());
        if transition.reason_required && reason.is_none() {
            return Err(WorkflowError::ReasonRequired { stage });
        }

        let mut entry = HistoryDraft::new(
            actor.id.clone(),
            HistoryAction::Reject,
            Some(stage),
            case.status,
            rejected,
        );
        if let Some(reason) = reason {
            entry = entry.with_reason(reason);
        }
        if let Some(artifact) = case.artifact(stage) {
            entry = entry.with_source_version(artifact.source_version);
        }

        let write =
            StatusWrite::new(entry).with_expected_artifact(stage, case.source_version(stage));
        let (case, _) = self.store.conditional_write(case_id, write).await?;

        info!(%case_id, %stage, "Stage rejected");
        Ok(case)
    }

    // ========================================================================
    // Recovery and reads
    // ========================================================================

    /// Roll back cases left in progress by an interrupted process.
    ///
    /// Cases whose producer is running in this orchestrator are skipped, as
    /// are cases that cannot be read; the sweep always covers every case.
    #[instrument(skip(self))]
    pub async fn recover_interrupted(&self) -> Result<Vec<Case>, WorkflowError> {
        let mut recovered = Vec::new();

        for case_id in self.store.list_cases().await? {
            let case = match self.store.read_case(case_id).await {
                Ok(case) => case,
                Err(e) => {
                    warn!(%case_id, error = %e, "Skipping unreadable case during recovery");
                    continue;
                }
            };
            if !case.status.is_in_progress() || self.is_in_flight(case_id) {
                continue;
            }

            let history = match self.store.history(case_id).await {
                Ok(history) => history,
                Err(e) => {
                    warn!(%case_id, error = %e, "Skipping case with unreadable history");
                    continue;
                }
            };
            let Some(started) = history
                .iter()
                .rev()
                .find(|e| e.action == HistoryAction::Regenerate && e.to_status == case.status)
            else {
                warn!(%case_id, status = %case.status, "No regenerate entry found, cannot recover");
                continue;
            };

            let stage = self
                .table
                .by_in_progress(case.status)
                .map(|t| t.stage)
                .or(started.stage);
            let entry = HistoryDraft::new(
                Actor::system().id,
                HistoryAction::SystemRollback,
                stage,
                case.status,
                started.from_status,
            )
            .with_reason("interrupted production recovered");

            match self
                .store
                .conditional_write(case_id, StatusWrite::new(entry))
                .await
            {
                Ok((case, _)) => {
                    warn!(%case_id, status = %case.status, "Recovered interrupted production");
                    recovered.push(case);
                }
                Err(StoreError::PreconditionFailed { .. }) => continue,
                Err(e) => {
                    warn!(%case_id, error = %e, "Recovery write failed, leaving case for the next sweep");
                }
            }
        }

        Ok(recovered)
    }

    /// Current case snapshot
    pub async fn case(&self, case_id: Uuid) -> Result<Case, WorkflowError> {
        Ok(self.store.read_case(case_id).await?)
    }

    /// Full history of a case
    pub async fn history(&self, case_id: Uuid) -> Result<Vec<HistoryEntry>, WorkflowError> {
        Ok(self.store.history(case_id).await?)
    }

    /// Most recently updated cases first
    pub async fn cases(&self, limit: usize) -> Result<Vec<Case>, WorkflowError> {
        let mut cases = Vec::new();
        for case_id in self.store.list_cases().await? {
            match self.store.read_case(case_id).await {
                Ok(case) => cases.push(case),
                Err(e) => warn!(%case_id, error = %e, "Skipping unreadable case"),
            }
        }

        cases.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        cases.truncate(limit);
        Ok(cases)
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    fn transition(&self, stage: Stage) -> Result<&StageTransition, WorkflowError> {
        self.table.get(stage).ok_or(WorkflowError::UnknownStage(stage))
    }

    async fn approval_snapshot(&self) -> Result<Arc<ApprovalConfig>, WorkflowError> {
        self.approvals
            .snapshot()
            .await
            .map_err(|e| WorkflowError::ConfigUnavailable(e.to_string()))
    }

    fn authorize_review(
        &self,
        actor: &Actor,
        stage: Stage,
        action: HistoryAction,
        config: &ApprovalConfig,
    ) -> Result<(), WorkflowError> {
        if is_authorized(actor.role, stage, config) {
            return Ok(());
        }
        Err(WorkflowError::Unauthorized {
            actor: actor.id.clone(),
            role: actor.role,
            stage,
            action,
        })
    }

    fn is_in_flight(&self, case_id: Uuid) -> bool {
        self.in_flight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .contains(&case_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::TemplateProducer;
    use crate::core::approvals::ApprovalRules;
    use crate::core::case_store::MemoryCaseStore;
    use crate::domain::RoleId;

    fn orchestrator() -> WorkflowOrchestrator {
        WorkflowOrchestrator::new(
            Arc::new(MemoryCaseStore::new()),
            Arc::new(ApprovalCache::fixed(ApprovalRules::standard())),
            ProducerRegistry::uniform(Arc::new(TemplateProducer::new())),
        )
    }

    #[tokio::test]
    async fn test_intake_records_create_entry() {
        let orchestrator = orchestrator();
        let owner = Actor::new("alice", RoleId::BusinessAnalyst);

        let case = orchestrator.intake("CRM", "Leads are lost", &owner).await.unwrap();
        let history = orchestrator.history(case.id).await.unwrap();

        assert_eq!(history.len(), 1);
        assert_eq!(history[0].action, HistoryAction::Create);
        assert_eq!(history[0].sequence, 1);
    }

    #[tokio::test]
    async fn test_prd_request_and_auto_chain() {
        let orchestrator = orchestrator();
        let owner = Actor::new("alice", RoleId::BusinessAnalyst);
        let po = Actor::new("paula", RoleId::ProductOwner);

        let case = orchestrator.intake("CRM", "Leads are lost", &owner).await.unwrap();
        let drafted = orchestrator
            .request_stage(case.id, Stage::Prd, &owner)
            .await
            .unwrap();
        assert_eq!(drafted.status, CaseStatus::PrdReview);

        let outcome = orchestrator
            .approve_stage(case.id, Stage::Prd, &po, Some(1))
            .await
            .unwrap();
        assert!(matches!(
            outcome.chained,
            Some(ChainOutcome::Produced {
                stage: Stage::SystemDesign,
                ..
            })
        ));
        assert_eq!(outcome.case.status, CaseStatus::SystemDesignDrafted);
    }

    #[tokio::test]
    async fn test_final_stage_cannot_be_requested() {
        let orchestrator = orchestrator();
        let owner = Actor::new("alice", RoleId::BusinessAnalyst);
        let case = orchestrator.intake("CRM", "Leads are lost", &owner).await.unwrap();

        let err = orchestrator
            .request_stage(case.id, Stage::Final, &owner)
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::InvalidStatusForAction { .. }));
    }
}
