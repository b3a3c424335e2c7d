//! File-backed case store with event-sourced status.
//!
//! Layout per case:
//!
//! ```text
//! <base>/<case-id>/case.json                        intake record (immutable)
//! <base>/<case-id>/history.jsonl                    append-only history
//! <base>/<case-id>/artifacts/<stage>-v<N>.json      artifact versions
//! <base>/<case-id>/.lock                            fs2 lock file
//! ```
//!
//! Current status and the artifact index are derived by replaying
//! `history.jsonl`. The appended history line is the commit point: an
//! artifact file written before a failed commit is never referenced.

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::domain::{Artifact, Case, CaseStatus, HistoryAction, HistoryDraft, HistoryEntry, Stage};

use super::case_store::{CaseStore, StatusWrite, StoreError};

/// Immutable intake record stored in `case.json`
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CaseHeader {
    id: Uuid,
    title: String,
    problem_statement: String,
    owner: String,
    created_at: DateTime<Utc>,
}

impl From<&Case> for CaseHeader {
    fn from(case: &Case) -> Self {
        Self {
            id: case.id,
            title: case.title.clone(),
            problem_statement: case.problem_statement.clone(),
            owner: case.owner.clone(),
            created_at: case.created_at,
        }
    }
}

/// File-based case store using JSONL history
#[derive(Debug, Clone)]
pub struct EventStore {
    /// Directory containing one subdirectory per case
    base_dir: PathBuf,
}

impl EventStore {
    /// Create a store rooted at `base_dir`
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// Open the store under the configured home ($BIZCASE_HOME/cases)
    pub fn open_default() -> anyhow::Result<Self> {
        let base_dir = crate::config::cases_dir()?;
        fs::create_dir_all(&base_dir).with_context(|| {
            format!("Failed to create cases directory: {}", base_dir.display())
        })?;
        Ok(Self::new(base_dir))
    }

    fn files(&self, case_id: Uuid) -> CaseFiles {
        CaseFiles::new(case_id, self.base_dir.join(case_id.to_string()))
    }

    /// Run blocking file work off the async runtime
    async fn blocking<T, F>(&self, case_id: Uuid, work: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(CaseFiles) -> Result<T, StoreError> + Send + 'static,
    {
        let files = self.files(case_id);
        tokio::task::spawn_blocking(move || work(files))
            .await
            .map_err(|e| StoreError::Task(e.to_string()))?
    }
}

/// Paths and synchronous operations for a single case directory
struct CaseFiles {
    case_id: Uuid,
    dir: PathBuf,
    header_path: PathBuf,
    history_path: PathBuf,
    artifacts_dir: PathBuf,
    lock_path: PathBuf,
}

impl CaseFiles {
    fn new(case_id: Uuid, dir: PathBuf) -> Self {
        Self {
            case_id,
            header_path: dir.join("case.json"),
            history_path: dir.join("history.jsonl"),
            artifacts_dir: dir.join("artifacts"),
            lock_path: dir.join(".lock"),
            dir,
        }
    }

    fn exists(&self) -> bool {
        self.header_path.exists()
    }

    fn ensure_exists(&self) -> Result<(), StoreError> {
        if self.exists() {
            Ok(())
        } else {
            Err(StoreError::NotFound(self.case_id))
        }
    }

    fn open_lock(&self) -> Result<File, StoreError> {
        Ok(OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(&self.lock_path)?)
    }

    /// Exclusive lock; released when the returned file is dropped
    fn lock_exclusive(&self) -> Result<File, StoreError> {
        let lock = self.open_lock()?;
        lock.lock_exclusive()?;
        Ok(lock)
    }

    fn lock_shared(&self) -> Result<File, StoreError> {
        let lock = self.open_lock()?;
        lock.lock_shared()?;
        Ok(lock)
    }

    fn corrupt(&self, detail: impl Into<String>) -> StoreError {
        StoreError::Corrupt {
            case_id: self.case_id,
            detail: detail.into(),
        }
    }

    /// Replay all history entries in order
    fn replay(&self) -> Result<Vec<HistoryEntry>, StoreError> {
        if !self.history_path.exists() {
            return Ok(Vec::new());
        }

        let file = File::open(&self.history_path)?;
        let lines: Vec<String> = BufReader::new(file).lines().collect::<Result<_, _>>()?;
        let ends_with_newline = fs::read(&self.history_path)?
            .last()
            .map(|b| *b == b'\n')
            .unwrap_or(true);

        let mut entries: Vec<HistoryEntry> = Vec::with_capacity(lines.len());
        let last_idx = lines.len().saturating_sub(1);

        for (idx, line) in lines.iter().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<HistoryEntry>(line) {
                Ok(entry) => {
                    if let Some(prev) = entries.last() {
                        if entry.sequence <= prev.sequence {
                            return Err(self.corrupt(format!(
                                "history sequence {} follows {}",
                                entry.sequence, prev.sequence
                            )));
                        }
                    }
                    entries.push(entry);
                }
                // A torn final write never committed; ignore it
                Err(e) if idx == last_idx && !ends_with_newline => {
                    warn!(case_id = %self.case_id, error = %e, "Ignoring torn history line");
                }
                Err(e) => {
                    return Err(self.corrupt(format!("unparseable history line {}: {}", idx + 1, e)))
                }
            }
        }

        Ok(entries)
    }

    /// Drop a torn (newline-less) tail left by an interrupted append
    fn repair_tail(&self) -> Result<(), StoreError> {
        if !self.history_path.exists() {
            return Ok(());
        }
        let bytes = fs::read(&self.history_path)?;
        if bytes.last().map(|b| *b == b'\n').unwrap_or(true) {
            return Ok(());
        }

        let keep = bytes
            .iter()
            .rposition(|b| *b == b'\n')
            .map(|pos| pos + 1)
            .unwrap_or(0);
        let file = OpenOptions::new().write(true).open(&self.history_path)?;
        file.set_len(keep as u64)?;
        warn!(case_id = %self.case_id, dropped = bytes.len() - keep, "Truncated torn history tail");
        Ok(())
    }

    fn append(&self, entry: &HistoryEntry) -> Result<(), StoreError> {
        self.repair_tail()?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.history_path)?;

        let json = serde_json::to_string(entry)?;
        file.write_all(format!("{}\n", json).as_bytes())?;
        file.sync_data()?;
        Ok(())
    }

    fn artifact_path(&self, stage: Stage, version: u64) -> PathBuf {
        self.artifacts_dir
            .join(format!("{}-v{}.json", stage.as_str(), version))
    }

    /// Write an artifact version atomically (temp file + rename)
    fn write_artifact(&self, artifact: &Artifact) -> Result<(), StoreError> {
        fs::create_dir_all(&self.artifacts_dir)?;
        let path = self.artifact_path(artifact.stage, artifact.source_version);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(artifact)?)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn read_artifact(&self, stage: Stage, version: u64) -> Result<Artifact, StoreError> {
        let path = self.artifact_path(stage, version);
        let bytes = fs::read(&path).map_err(|e| {
            self.corrupt(format!("missing artifact {}: {}", path.display(), e))
        })?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    fn read_header(&self) -> Result<CaseHeader, StoreError> {
        let bytes = fs::read(&self.header_path)?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Reconstruct the case from its header and history
    fn load_case(&self, history: &[HistoryEntry]) -> Result<Case, StoreError> {
        let header = self.read_header()?;

        let mut case = Case {
            id: header.id,
            title: header.title,
            problem_statement: header.problem_statement,
            owner: header.owner,
            status: CaseStatus::Intake,
            artifacts: Default::default(),
            created_at: header.created_at,
            updated_at: header.created_at,
        };

        let mut latest_versions = std::collections::BTreeMap::new();
        for entry in history {
            case.status = entry.to_status;
            case.updated_at = entry.timestamp;
            if entry.action == HistoryAction::ArtifactProduced {
                if let (Some(stage), Some(version)) = (entry.stage, entry.source_version) {
                    latest_versions.insert(stage, version);
                }
            }
        }

        for (stage, version) in latest_versions {
            case.artifacts.insert(stage, self.read_artifact(stage, version)?);
        }

        Ok(case)
    }

    fn next_sequence(history: &[HistoryEntry]) -> u64 {
        history.last().map(|e| e.sequence).unwrap_or(0) + 1
    }

    /// Latest committed artifact version for a stage (0 if none)
    fn latest_version(history: &[HistoryEntry], stage: Stage) -> u64 {
        history
            .iter()
            .rev()
            .filter(|e| e.action == HistoryAction::ArtifactProduced && e.stage == Some(stage))
            .find_map(|e| e.source_version)
            .unwrap_or(0)
    }
}

#[async_trait]
impl CaseStore for EventStore {
    async fn create_case(
        &self,
        case: &Case,
        entry: HistoryDraft,
    ) -> Result<HistoryEntry, StoreError> {
        let header = CaseHeader::from(case);
        self.blocking(case.id, move |files| {
            fs::create_dir_all(&files.dir)?;
            let _lock = files.lock_exclusive()?;

            if files.exists() {
                return Err(StoreError::AlreadyExists(files.case_id));
            }

            let tmp = files.header_path.with_extension("json.tmp");
            fs::write(&tmp, serde_json::to_vec_pretty(&header)?)?;
            fs::rename(&tmp, &files.header_path)?;

            let committed = entry.commit(files.case_id, 1);
            files.append(&committed)?;
            debug!(case_id = %files.case_id, "Case created");
            Ok(committed)
        })
        .await
    }

    async fn read_case(&self, case_id: Uuid) -> Result<Case, StoreError> {
        self.blocking(case_id, |files| {
            files.ensure_exists()?;
            let _lock = files.lock_shared()?;
            let history = files.replay()?;
            files.load_case(&history)
        })
        .await
    }

    async fn conditional_write(
        &self,
        case_id: Uuid,
        write: StatusWrite,
    ) -> Result<(Case, HistoryEntry), StoreError> {
        self.blocking(case_id, move |files| {
            files.ensure_exists()?;
            let _lock = files.lock_exclusive()?;

            let mut history = files.replay()?;
            let current = history
                .last()
                .map(|e| e.to_status)
                .unwrap_or(CaseStatus::Intake);

            if current != write.expected {
                return Err(StoreError::PreconditionFailed {
                    case_id,
                    expected: write.expected,
                    actual: current,
                });
            }
            write.check_artifact(case_id, |stage| CaseFiles::latest_version(&history, stage))?;

            if let Some(artifact) = &write.artifact {
                files.write_artifact(artifact)?;
            }

            let committed = write
                .entry
                .commit(case_id, CaseFiles::next_sequence(&history));
            files.append(&committed)?;
            history.push(committed.clone());

            let case = files.load_case(&history)?;
            Ok((case, committed))
        })
        .await
    }

    async fn append_history(
        &self,
        case_id: Uuid,
        entry: HistoryDraft,
    ) -> Result<HistoryEntry, StoreError> {
        self.blocking(case_id, move |files| {
            files.ensure_exists()?;
            let _lock = files.lock_exclusive()?;
            let history = files.replay()?;
            let committed = entry.commit(case_id, CaseFiles::next_sequence(&history));
            files.append(&committed)?;
            Ok(committed)
        })
        .await
    }

    async fn history(&self, case_id: Uuid) -> Result<Vec<HistoryEntry>, StoreError> {
        self.blocking(case_id, |files| {
            files.ensure_exists()?;
            let _lock = files.lock_shared()?;
            files.replay()
        })
        .await
    }

    async fn list_cases(&self) -> Result<Vec<Uuid>, StoreError> {
        if !self.base_dir.exists() {
            return Ok(Vec::new());
        }

        let mut cases = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.base_dir).await?;

        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_dir() {
                if let Some(name) = entry.file_name().to_str() {
                    if let Ok(uuid) = Uuid::parse_str(name) {
                        cases.push(uuid);
                    }
                }
            }
        }

        Ok(cases)
    }
}
