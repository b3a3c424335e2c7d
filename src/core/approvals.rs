//! Approval policy: which roles may review which stage.
//!
//! The orchestrator never reads ambient configuration. Each operation takes
//! one `ApprovalConfig` snapshot from the `ApprovalCache` and uses it for
//! its whole duration. Snapshots may be up to one TTL stale; that is an
//! accepted trade-off. A failed load with no fresh snapshot fails closed.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::domain::{RoleId, Stage};

/// Errors raised while loading approval rules
#[derive(Debug, Clone, Error)]
pub enum PolicyError {
    #[error("Failed to read approval policy {path}: {detail}")]
    Read { path: String, detail: String },

    #[error("Failed to parse approval policy: {0}")]
    Parse(String),

    #[error("Approval policy backend unavailable: {0}")]
    Unavailable(String),
}

/// Mapping stage → roles allowed to approve or reject it.
///
/// The superuser role is implicit for every stage and cannot be removed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ApprovalRules {
    roles: BTreeMap<Stage, Vec<RoleId>>,
}

impl Default for ApprovalRules {
    fn default() -> Self {
        Self::standard()
    }
}

impl ApprovalRules {
    /// Default reviewer roles per stage
    pub fn standard() -> Self {
        let roles = [
            (Stage::Prd, vec![RoleId::ProductOwner]),
            (Stage::SystemDesign, vec![RoleId::TechnicalArchitect]),
            (Stage::Effort, vec![RoleId::TechnicalArchitect]),
            (Stage::Cost, vec![RoleId::FinanceApprover]),
            (Stage::Value, vec![RoleId::SalesManager, RoleId::BusinessAnalyst]),
            (Stage::FinancialModel, vec![RoleId::FinanceApprover]),
            (Stage::Final, vec![RoleId::FinanceApprover]),
        ]
        .into_iter()
        .collect();

        Self { roles }
    }

    pub fn empty() -> Self {
        Self {
            roles: BTreeMap::new(),
        }
    }

    /// Set the roles for a stage
    pub fn with_stage(mut self, stage: Stage, roles: Vec<RoleId>) -> Self {
        self.roles.insert(stage, roles);
        self
    }

    /// Primary role configured for a stage
    pub fn role_for(&self, stage: Stage) -> Option<RoleId> {
        self.roles.get(&stage).and_then(|r| r.first()).copied()
    }

    /// All roles configured for a stage (superuser excluded)
    pub fn roles_for(&self, stage: Stage) -> &[RoleId] {
        self.roles.get(&stage).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Parse rules from YAML (`stage: [ROLE, ...]`)
    pub fn from_yaml(content: &str) -> Result<Self, PolicyError> {
        serde_yaml::from_str(content).map_err(|e| PolicyError::Parse(e.to_string()))
    }
}

/// Versioned, immutable approval snapshot
#[derive(Debug, Clone)]
pub struct ApprovalConfig {
    /// Increments on every successful reload
    pub version: u64,

    pub rules: ApprovalRules,

    /// When the snapshot was loaded
    pub loaded_at: DateTime<Utc>,
}

impl ApprovalConfig {
    pub fn new(version: u64, rules: ApprovalRules) -> Self {
        Self {
            version,
            rules,
            loaded_at: Utc::now(),
        }
    }

    pub fn role_for(&self, stage: Stage) -> Option<RoleId> {
        self.rules.role_for(stage)
    }

    pub fn is_superuser(&self, role: RoleId) -> bool {
        role.is_superuser()
    }
}

/// May `role` approve or reject `stage` under `config`?
pub fn is_authorized(role: RoleId, stage: Stage, config: &ApprovalConfig) -> bool {
    config.is_superuser(role) || config.rules.roles_for(stage).contains(&role)
}

/// Source of approval rules
#[async_trait]
pub trait ApprovalPolicy: Send + Sync {
    /// Human-readable source name
    fn name(&self) -> &str;

    /// Load the current rules
    async fn load(&self) -> Result<ApprovalRules, PolicyError>;
}

/// Fixed rules held in memory
pub struct StaticApprovalPolicy {
    rules: ApprovalRules,
}

impl StaticApprovalPolicy {
    pub fn new(rules: ApprovalRules) -> Self {
        Self { rules }
    }
}

#[async_trait]
impl ApprovalPolicy for StaticApprovalPolicy {
    fn name(&self) -> &str {
        "static"
    }

    async fn load(&self) -> Result<ApprovalRules, PolicyError> {
        Ok(self.rules.clone())
    }
}

/// Rules read from the `approvals:` section of a YAML config file on
/// every load, so edits take effect at the next refresh
pub struct FileApprovalPolicy {
    path: PathBuf,
}

#[derive(Deserialize)]
struct ApprovalsSection {
    #[serde(default)]
    approvals: Option<ApprovalRules>,
}

impl FileApprovalPolicy {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl ApprovalPolicy for FileApprovalPolicy {
    fn name(&self) -> &str {
        "file"
    }

    async fn load(&self) -> Result<ApprovalRules, PolicyError> {
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| PolicyError::Read {
                path: self.path.display().to_string(),
                detail: e.to_string(),
            })?;

        let section: ApprovalsSection =
            serde_yaml::from_str(&content).map_err(|e| PolicyError::Parse(e.to_string()))?;

        Ok(section.approvals.unwrap_or_default())
    }
}

struct CachedSnapshot {
    config: Arc<ApprovalConfig>,
    fetched_at: Instant,
}

/// Deadline for a single policy load
const DEFAULT_LOAD_TIMEOUT: Duration = Duration::from_secs(10);

/// TTL cache over an approval policy
pub struct ApprovalCache {
    policy: Arc<dyn ApprovalPolicy>,
    ttl: Duration,
    load_timeout: Duration,
    current: RwLock<Option<CachedSnapshot>>,
    reload: Mutex<()>,
    next_version: AtomicU64,
}

impl ApprovalCache {
    pub fn new(policy: Arc<dyn ApprovalPolicy>, ttl: Duration) -> Self {
        Self {
            policy,
            ttl,
            load_timeout: DEFAULT_LOAD_TIMEOUT,
            current: RwLock::new(None),
            reload: Mutex::new(()),
            next_version: AtomicU64::new(1),
        }
    }

    pub fn with_load_timeout(mut self, load_timeout: Duration) -> Self {
        self.load_timeout = load_timeout;
        self
    }

    /// Cache over fixed rules (never fails)
    pub fn fixed(rules: ApprovalRules) -> Self {
        Self::new(
            Arc::new(StaticApprovalPolicy::new(rules)),
            Duration::from_secs(3600),
        )
    }

    /// A consistent snapshot, reloading if the cached one has expired
    pub async fn snapshot(&self) -> Result<Arc<ApprovalConfig>, PolicyError> {
        {
            let current = self.current.read().await;
            if let Some(cached) = current.as_ref() {
                if cached.fetched_at.elapsed() < self.ttl {
                    return Ok(cached.config.clone());
                }
            }
        }

        self.refresh().await
    }

    /// Reload from the policy unless a snapshot was loaded moments ago.
    ///
    /// Readers keep getting a fresh cached snapshot while a load is running.
    pub async fn refresh(&self) -> Result<Arc<ApprovalConfig>, PolicyError> {
        let _reload = self.reload.lock().await;

        // Another caller may have refreshed while we waited for the lock
        if let Some(cached) = self.current.read().await.as_ref() {
            if cached.fetched_at.elapsed() < self.ttl / 2 {
                return Ok(cached.config.clone());
            }
        }

        let loaded = match tokio::time::timeout(self.load_timeout, self.policy.load()).await {
            Ok(result) => result,
            Err(_) => Err(PolicyError::Unavailable(format!(
                "{} policy did not answer within {:?}",
                self.policy.name(),
                self.load_timeout
            ))),
        };

        let mut current = self.current.write().await;
        match loaded {
            Ok(rules) => {
                let version = self.next_version.fetch_add(1, Ordering::SeqCst);
                let config = Arc::new(ApprovalConfig::new(version, rules));
                debug!(version, policy = self.policy.name(), "Approval policy loaded");
                *current = Some(CachedSnapshot {
                    config: config.clone(),
                    fetched_at: Instant::now(),
                });
                Ok(config)
            }
            Err(e) => {
                warn!(error = %e, policy = self.policy.name(), "Approval policy reload failed");
                // Expired snapshots are never reused: fail closed
                let expired = current
                    .as_ref()
                    .map(|cached| cached.fetched_at.elapsed() >= self.ttl)
                    .unwrap_or(true);
                if expired {
                    *current = None;
                }
                Err(e)
            }
        }
    }

    /// Refresh on a timer, independent of case operations
    pub fn spawn_refresh(self: Arc<Self>, period: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                if let Err(e) = self.refresh().await {
                    warn!(error = %e, "Scheduled approval policy refresh failed");
                }
            }
        })
    }
}
