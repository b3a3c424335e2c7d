//! Configuration for bizcase.
//!
//! Configuration sources (highest priority first):
//! 1. Environment variables (BIZCASE_HOME, BIZCASE_CONFIG)
//! 2. Config file (.bizcase/config.yaml)
//! 3. Defaults (~/.bizcase)
//!
//! Config file discovery:
//! - BIZCASE_CONFIG names the file explicitly
//! - Otherwise searches current directory and parents for .bizcase/config.yaml
//! - `paths.home` is relative to the .bizcase/ directory
//!
//! Approval rules also live in the config file but are not cached here;
//! they are reloaded through the approval cache so edits apply without a
//! restart.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::core::ProducerLimits;
use crate::domain::Stage;

/// Global cached configuration (stores Result to handle init errors)
static CONFIG: OnceLock<Result<ResolvedConfig, String>> = OnceLock::new();

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigFile {
    pub version: String,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub limits: Option<ProducerLimits>,
    #[serde(default)]
    pub approval_cache_ttl_seconds: Option<u64>,
    #[serde(default)]
    pub workflow: WorkflowConfig,
    #[serde(default)]
    pub producers: ProducersConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PathsConfig {
    /// Case store directory (relative to .bizcase/)
    pub home: Option<String>,
}

/// Per-stage overrides of the transition table flags
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WorkflowConfig {
    #[serde(default)]
    pub auto_chain: HashMap<Stage, bool>,
    #[serde(default)]
    pub reason_required: HashMap<Stage, bool>,
}

/// Which producer implementation backs the stages
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProducerBackend {
    #[default]
    Template,
    Fabric,
    Http,
}

impl std::fmt::Display for ProducerBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ProducerBackend::Template => "template",
            ProducerBackend::Fabric => "fabric",
            ProducerBackend::Http => "http",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProducersConfig {
    #[serde(default)]
    pub backend: ProducerBackend,
    pub fabric_binary: Option<String>,
    #[serde(default)]
    pub patterns: HashMap<Stage, String>,
    pub endpoint: Option<String>,
}

/// Resolved configuration with absolute paths
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// Absolute path to bizcase home (case store)
    pub home: PathBuf,
    /// Path to config file (if found)
    pub config_file: Option<PathBuf>,
    /// Producer deadlines and size caps
    pub limits: ProducerLimits,
    /// Approval snapshot lifetime
    pub approval_cache_ttl: Duration,
    /// Transition table overrides
    pub workflow: WorkflowConfig,
    /// Producer selection
    pub producers: ProducersConfig,
}

const DEFAULT_APPROVAL_TTL_SECONDS: u64 = 60;

/// Find config file by searching current directory and parents
fn find_config_file() -> Option<PathBuf> {
    if let Ok(explicit) = std::env::var("BIZCASE_CONFIG") {
        return Some(PathBuf::from(explicit));
    }

    let mut current = std::env::current_dir().ok()?;

    loop {
        let config_path = current.join(".bizcase").join("config.yaml");
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            break;
        }
    }

    None
}

/// Load and parse config file
fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Resolve a path that may be relative to a base directory
fn resolve_path(base: &Path, path_str: &str) -> PathBuf {
    let path = PathBuf::from(path_str);
    if path.is_absolute() {
        path
    } else {
        base.join(path)
            .canonicalize()
            .unwrap_or_else(|_| base.join(path_str))
    }
}

/// Build the resolved config from an optional parsed file
fn resolve(
    config_file: Option<PathBuf>,
    parsed: Option<ConfigFile>,
    env_home: Option<PathBuf>,
    default_home: PathBuf,
) -> ResolvedConfig {
    let Some(config) = parsed else {
        return ResolvedConfig {
            home: env_home.unwrap_or(default_home),
            config_file,
            limits: ProducerLimits::default(),
            approval_cache_ttl: Duration::from_secs(DEFAULT_APPROVAL_TTL_SECONDS),
            workflow: WorkflowConfig::default(),
            producers: ProducersConfig::default(),
        };
    };

    let home = match (env_home, &config.paths.home, &config_file) {
        (Some(home), _, _) => home,
        (None, Some(home_path), Some(config_path)) => {
            let bizcase_dir = config_path.parent().unwrap_or(Path::new("."));
            resolve_path(bizcase_dir, home_path)
        }
        _ => default_home,
    };

    ResolvedConfig {
        home,
        config_file,
        limits: config.limits.unwrap_or_default(),
        approval_cache_ttl: Duration::from_secs(
            config
                .approval_cache_ttl_seconds
                .unwrap_or(DEFAULT_APPROVAL_TTL_SECONDS),
        ),
        workflow: config.workflow,
        producers: config.producers,
    }
}

/// Load configuration from all sources
fn load_config() -> Result<ResolvedConfig> {
    let default_home = dirs::home_dir()
        .context("Failed to determine home directory")?
        .join(".bizcase");
    let env_home = std::env::var("BIZCASE_HOME").ok().map(PathBuf::from);

    let config_file = find_config_file();
    let parsed = match config_file {
        Some(ref path) => Some(load_config_file(path)?),
        None => None,
    };

    Ok(resolve(config_file, parsed, env_home, default_home))
}

/// Get the global configuration (loads once, then cached)
pub fn config() -> Result<&'static ResolvedConfig> {
    let result = CONFIG.get_or_init(|| load_config().map_err(|e| e.to_string()));

    match result {
        Ok(config) => Ok(config),
        Err(e) => anyhow::bail!("{}", e),
    }
}

// ============================================================================
// Convenience functions
// ============================================================================

/// Get the cases directory ($BIZCASE_HOME/cases)
pub fn cases_dir() -> Result<PathBuf> {
    Ok(config()?.home.join("cases"))
}
