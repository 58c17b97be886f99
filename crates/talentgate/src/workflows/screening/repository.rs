use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{
    ApplicationId, CandidateApplication, CandidateId, JobId, JobPosting, PipelineStage,
    ScoreBreakdown, ScoringContext,
};

/// Error enumeration for repository failures.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

/// Score fields written back by the reconciliation engine for one
/// attribution. Applying it also sets `processed` and clears the error
/// marker on the record.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreUpdate {
    pub application_id: ApplicationId,
    pub score: u8,
    pub breakdown: ScoreBreakdown,
    pub processed_at: DateTime<Utc>,
}

/// Storage abstraction over candidate applications so the engine and
/// pipeline can be exercised against in-memory fakes.
pub trait ApplicationRepository: Send + Sync {
    fn insert(
        &self,
        application: CandidateApplication,
    ) -> Result<CandidateApplication, RepositoryError>;

    fn get(&self, id: &ApplicationId) -> Result<Option<CandidateApplication>, RepositoryError>;

    /// Non-deleted applications for a job, ascending by creation time. This
    /// ordering is the positional-fallback contract: callers snapshot it once
    /// per run and never re-read mid-cycle.
    fn for_job(&self, job_id: &JobId) -> Result<Vec<CandidateApplication>, RepositoryError>;

    /// Non-deleted applications among `ids`, ascending by creation time.
    /// Unknown ids are skipped, not errored.
    fn fetch_many(
        &self,
        ids: &[ApplicationId],
    ) -> Result<Vec<CandidateApplication>, RepositoryError>;

    /// Persist one attribution. Unknown id is an error; the engine only
    /// writes ids taken from its own input snapshot.
    fn record_score(&self, update: ScoreUpdate) -> Result<(), RepositoryError>;

    /// Move every matching non-deleted application to `stage`, returning the
    /// affected records.
    fn set_stage(
        &self,
        ids: &[ApplicationId],
        stage: PipelineStage,
    ) -> Result<Vec<CandidateApplication>, RepositoryError>;

    /// Applications for a job at a stage, score descending then most
    /// recently updated first.
    fn by_stage(
        &self,
        job_id: &JobId,
        stage: PipelineStage,
    ) -> Result<Vec<CandidateApplication>, RepositoryError>;
}

/// Storage abstraction over job postings; the screening workflow only ever
/// reads postings and persists freshly created scoring contexts.
pub trait JobRepository: Send + Sync {
    fn get(&self, id: &JobId) -> Result<Option<JobPosting>, RepositoryError>;

    fn set_scoring_context(
        &self,
        id: &JobId,
        context: ScoringContext,
    ) -> Result<(), RepositoryError>;
}

/// Intent emitted when an application changes stage. Delivery is owned by a
/// separate worker; the state machine only enqueues.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageChangeNotice {
    pub application_id: ApplicationId,
    pub candidate_id: CandidateId,
    pub job_id: JobId,
    pub stage: PipelineStage,
}

/// Notification dispatch error.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("notification transport unavailable: {0}")]
    Transport(String),
}

/// Trait describing the outbound notification queue.
pub trait NotificationQueue: Send + Sync {
    fn enqueue(&self, notice: StageChangeNotice) -> Result<(), NotifyError>;
}
