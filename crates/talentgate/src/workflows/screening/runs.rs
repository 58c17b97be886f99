use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::domain::JobId;

/// Identifier for a screening run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(pub Uuid);

impl RunId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn parse(value: &str) -> Option<Self> {
        Uuid::parse_str(value.trim()).ok().map(Self)
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    pub const fn label(self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
        }
    }
}

/// Durable record of one screening cycle. The record is the only
/// synchronization point between the triggering request and the background
/// worker; pollers read it, the worker mutates it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScreeningRun {
    pub run_id: RunId,
    pub job_id: JobId,
    pub total: u32,
    pub processed: u32,
    pub indexing_failures: u32,
    pub dropped_matches: u32,
    pub status: RunStatus,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ScreeningRun {
    pub fn is_terminal(&self) -> bool {
        matches!(self.status, RunStatus::Completed | RunStatus::Failed)
    }

    pub fn progress(&self) -> RunProgress {
        let percent = if self.total == 0 {
            0
        } else {
            (self.processed.min(self.total) * 100) / self.total
        };
        RunProgress {
            run_id: self.run_id,
            processed: self.processed,
            total: self.total,
            percent,
            status: self.status.label(),
            error: self.error.clone(),
        }
    }
}

/// Poller-facing view of a run.
#[derive(Debug, Clone, Serialize)]
pub struct RunProgress {
    pub run_id: RunId,
    pub processed: u32,
    pub total: u32,
    pub percent: u32,
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Partial counter update; unset fields keep their stored value.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunPatch {
    pub processed: Option<u32>,
    pub indexing_failures: Option<u32>,
    pub dropped_matches: Option<u32>,
}

#[derive(Debug, thiserror::Error)]
pub enum RunStoreError {
    #[error("run not found")]
    NotFound,
    #[error("run store unavailable: {0}")]
    Unavailable(String),
}

/// Persistence seam for run records.
///
/// Terminal records are immutable: `update`, `mark_completed`, and
/// `mark_failed` against a completed or failed run are ignored and return the
/// stored record unchanged.
pub trait RunStore: Send + Sync {
    fn create(&self, job_id: &JobId, total: u32) -> Result<ScreeningRun, RunStoreError>;
    fn update(&self, run_id: &RunId, patch: RunPatch) -> Result<ScreeningRun, RunStoreError>;
    fn mark_completed(&self, run_id: &RunId) -> Result<ScreeningRun, RunStoreError>;
    fn mark_failed(&self, run_id: &RunId, message: &str) -> Result<ScreeningRun, RunStoreError>;
    fn get(&self, run_id: &RunId) -> Result<Option<ScreeningRun>, RunStoreError>;

    /// Running records whose last update is older than `older_than`. A crash
    /// mid-run leaves a permanently running record; this is the operator's
    /// way to find them.
    fn stale_running(&self, older_than: Duration) -> Result<Vec<ScreeningRun>, RunStoreError>;
}

/// Default store backed by a mutex-guarded map. Durable backends implement
/// the same trait; everything above the seam is storage-agnostic.
#[derive(Default, Clone)]
pub struct InMemoryRunStore {
    runs: Arc<Mutex<HashMap<RunId, ScreeningRun>>>,
}

impl InMemoryRunStore {
    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<RunId, ScreeningRun>>, RunStoreError>
    {
        self.runs
            .lock()
            .map_err(|_| RunStoreError::Unavailable("run store mutex poisoned".to_string()))
    }

    fn mutate<F>(&self, run_id: &RunId, apply: F) -> Result<ScreeningRun, RunStoreError>
    where
        F: FnOnce(&mut ScreeningRun),
    {
        let mut guard = self.lock()?;
        let run = guard.get_mut(run_id).ok_or(RunStoreError::NotFound)?;
        if !run.is_terminal() {
            apply(run);
            run.updated_at = Utc::now();
        }
        Ok(run.clone())
    }
}

impl RunStore for InMemoryRunStore {
    fn create(&self, job_id: &JobId, total: u32) -> Result<ScreeningRun, RunStoreError> {
        let now = Utc::now();
        let run = ScreeningRun {
            run_id: RunId::generate(),
            job_id: job_id.clone(),
            total,
            processed: 0,
            indexing_failures: 0,
            dropped_matches: 0,
            status: RunStatus::Running,
            error: None,
            started_at: now,
            updated_at: now,
        };
        self.lock()?.insert(run.run_id, run.clone());
        Ok(run)
    }

    fn update(&self, run_id: &RunId, patch: RunPatch) -> Result<ScreeningRun, RunStoreError> {
        self.mutate(run_id, |run| {
            if let Some(processed) = patch.processed {
                run.processed = processed;
            }
            if let Some(failures) = patch.indexing_failures {
                run.indexing_failures = failures;
            }
            if let Some(dropped) = patch.dropped_matches {
                run.dropped_matches = dropped;
            }
        })
    }

    fn mark_completed(&self, run_id: &RunId) -> Result<ScreeningRun, RunStoreError> {
        self.mutate(run_id, |run| {
            run.status = RunStatus::Completed;
            run.error = None;
        })
    }

    fn mark_failed(&self, run_id: &RunId, message: &str) -> Result<ScreeningRun, RunStoreError> {
        self.mutate(run_id, |run| {
            run.status = RunStatus::Failed;
            run.error = Some(message.to_string());
        })
    }

    fn get(&self, run_id: &RunId) -> Result<Option<ScreeningRun>, RunStoreError> {
        Ok(self.lock()?.get(run_id).cloned())
    }

    fn stale_running(&self, older_than: Duration) -> Result<Vec<ScreeningRun>, RunStoreError> {
        let cutoff = Utc::now() - older_than;
        let guard = self.lock()?;
        let mut stale: Vec<ScreeningRun> = guard
            .values()
            .filter(|run| run.status == RunStatus::Running && run.updated_at < cutoff)
            .cloned()
            .collect();
        stale.sort_by_key(|run| run.updated_at);
        Ok(stale)
    }
}
