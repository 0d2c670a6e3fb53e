//! Checkpointing — durable run progress for crash recovery.
//!
//! The checkpoint is the single source of truth for "what has completed".
//! It is mutated only by the scheduler, after each sub-problem boundary,
//! and all completion writes are idempotent: replaying a completion after
//! a crash/retry is a no-op.
//!
//! Storage is a pluggable key-value store keyed by session id, with an
//! in-memory implementation for tests and a JSON-file implementation for
//! durable runs.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::deliberator::SubProblemResult;
use crate::problem::{SubProblem, SubProblemId};

/// Error type for checkpoint store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("i/o error: {0}")]
    Io(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("deserialization error: {0}")]
    Deserialization(String),

    #[error("schema version mismatch: expected <= {expected}, found {found}")]
    VersionMismatch { expected: u32, found: u32 },

    #[error("lock poisoned")]
    LockPoisoned,
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Durable record of run progress.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Schema version for forward compatibility.
    pub version: u32,
    pub session_id: String,
    pub total_sub_problems: usize,
    /// Completed sub-problem results, keyed by id.
    pub completed: BTreeMap<SubProblemId, SubProblemResult>,
    /// Terminally failed sub-problems, id → reason.
    pub failed: BTreeMap<SubProblemId, String>,
    /// When the checkpoint was last updated.
    pub updated_at: DateTime<Utc>,
}

impl Checkpoint {
    /// Current schema version.
    pub const CURRENT_VERSION: u32 = 1;

    pub fn new(session_id: &str, total_sub_problems: usize) -> Self {
        Self {
            version: Self::CURRENT_VERSION,
            session_id: session_id.to_string(),
            total_sub_problems,
            completed: BTreeMap::new(),
            failed: BTreeMap::new(),
            updated_at: Utc::now(),
        }
    }

    /// Record a completed result. Idempotent: a second write for the same
    /// sub-problem is a no-op.
    pub fn record_result(&mut self, result: SubProblemResult) {
        if self.completed.contains_key(&result.sub_problem_id) {
            return;
        }
        self.failed.remove(&result.sub_problem_id);
        self.completed
            .insert(result.sub_problem_id.clone(), result);
        self.updated_at = Utc::now();
    }

    /// Record a terminal failure. Idempotent, and never overwrites a
    /// completed result.
    pub fn record_failure(&mut self, sub_problem_id: &str, reason: &str) {
        if self.completed.contains_key(sub_problem_id) || self.failed.contains_key(sub_problem_id)
        {
            return;
        }
        self.failed
            .insert(sub_problem_id.to_string(), reason.to_string());
        self.updated_at = Utc::now();
    }

    /// Whether the sub-problem is resolved (completed or failed).
    pub fn is_resolved(&self, sub_problem_id: &str) -> bool {
        self.completed.contains_key(sub_problem_id) || self.failed.contains_key(sub_problem_id)
    }

    pub fn resolved_count(&self) -> usize {
        self.completed.len() + self.failed.len()
    }

    /// External record with the high-water completed index: the largest
    /// index such that every sub-problem at or before it is resolved.
    pub fn external_record(&self, order: &[SubProblemId]) -> CheckpointRecord {
        let mut last = None;
        for (index, id) in order.iter().enumerate() {
            if self.is_resolved(id) {
                last = Some(index);
            } else {
                break;
            }
        }
        CheckpointRecord {
            session_id: self.session_id.clone(),
            last_completed_sub_problem_index: last,
            sub_problem_checkpoint_timestamp: self.updated_at,
            total_sub_problems: self.total_sub_problems,
        }
    }
}

/// Compact external checkpoint record, consumed on resume.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointRecord {
    pub session_id: String,
    pub last_completed_sub_problem_index: Option<usize>,
    pub sub_problem_checkpoint_timestamp: DateTime<Utc>,
    pub total_sub_problems: usize,
}

/// Integrity of a checkpoint relative to the current decomposition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntegrityStatus {
    Valid,
    Recoverable { warnings: Vec<String> },
    Corrupted { errors: Vec<String> },
}

impl IntegrityStatus {
    pub fn can_resume(&self) -> bool {
        matches!(self, Self::Valid | Self::Recoverable { .. })
    }
}

/// Validate a checkpoint before resuming against it.
pub fn validate_checkpoint(checkpoint: &Checkpoint, subs: &[SubProblem]) -> IntegrityStatus {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    if checkpoint.version > Checkpoint::CURRENT_VERSION {
        errors.push(format!(
            "version {} > current {}",
            checkpoint.version,
            Checkpoint::CURRENT_VERSION
        ));
    }

    if checkpoint.total_sub_problems != subs.len() {
        errors.push(format!(
            "checkpoint covers {} sub-problems, decomposition has {}",
            checkpoint.total_sub_problems,
            subs.len()
        ));
    }

    for id in checkpoint.completed.keys().chain(checkpoint.failed.keys()) {
        if !subs.iter().any(|s| &s.id == id) {
            errors.push(format!("checkpoint references unknown sub-problem '{id}'"));
        }
    }

    if checkpoint.resolved_count() == 0 {
        warnings.push("checkpoint is empty, full replay".to_string());
    }

    if !errors.is_empty() {
        IntegrityStatus::Corrupted { errors }
    } else if !warnings.is_empty() {
        IntegrityStatus::Recoverable { warnings }
    } else {
        IntegrityStatus::Valid
    }
}

/// Transactional key-value store for checkpoints, keyed by session id.
pub trait CheckpointStore: Send + Sync {
    fn load(&self, session_id: &str) -> StoreResult<Option<Checkpoint>>;
    fn save(&self, checkpoint: &Checkpoint) -> StoreResult<()>;
    fn clear(&self, session_id: &str) -> StoreResult<()>;
}

/// In-memory store for tests and ephemeral runs.
#[derive(Default)]
pub struct MemoryCheckpointStore {
    inner: RwLock<BTreeMap<String, Checkpoint>>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CheckpointStore for MemoryCheckpointStore {
    fn load(&self, session_id: &str) -> StoreResult<Option<Checkpoint>> {
        let inner = self.inner.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(inner.get(session_id).cloned())
    }

    fn save(&self, checkpoint: &Checkpoint) -> StoreResult<()> {
        let mut inner = self.inner.write().map_err(|_| StoreError::LockPoisoned)?;
        inner.insert(checkpoint.session_id.clone(), checkpoint.clone());
        Ok(())
    }

    fn clear(&self, session_id: &str) -> StoreResult<()> {
        let mut inner = self.inner.write().map_err(|_| StoreError::LockPoisoned)?;
        inner.remove(session_id);
        Ok(())
    }
}

/// JSON-file-backed store: one file per session under a directory.
pub struct JsonFileCheckpointStore {
    dir: PathBuf,
}

impl JsonFileCheckpointStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, session_id: &str) -> PathBuf {
        self.dir.join(format!("{session_id}.checkpoint.json"))
    }
}

impl CheckpointStore for JsonFileCheckpointStore {
    fn load(&self, session_id: &str) -> StoreResult<Option<Checkpoint>> {
        let path = self.path_for(session_id);
        if !path.exists() {
            return Ok(None);
        }
        let json =
            std::fs::read_to_string(&path).map_err(|e| StoreError::Io(e.to_string()))?;
        let checkpoint: Checkpoint = serde_json::from_str(&json)
            .map_err(|e| StoreError::Deserialization(e.to_string()))?;
        if checkpoint.version > Checkpoint::CURRENT_VERSION {
            return Err(StoreError::VersionMismatch {
                expected: Checkpoint::CURRENT_VERSION,
                found: checkpoint.version,
            });
        }
        Ok(Some(checkpoint))
    }

    fn save(&self, checkpoint: &Checkpoint) -> StoreResult<()> {
        std::fs::create_dir_all(&self.dir).map_err(|e| StoreError::Io(e.to_string()))?;
        let json = serde_json::to_string_pretty(checkpoint)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        std::fs::write(self.path_for(&checkpoint.session_id), json)
            .map_err(|e| StoreError::Io(e.to_string()))
    }

    fn clear(&self, session_id: &str) -> StoreResult<()> {
        let path = self.path_for(session_id);
        if path.exists() {
            std::fs::remove_file(path).map_err(|e| StoreError::Io(e.to_string()))?;
        }
        Ok(())
    }
}
