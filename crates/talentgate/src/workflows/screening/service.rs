use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use serde::Serialize;
use tracing::error;

use super::domain::{ApplicationId, CandidateApplication, CandidateProfile, JobId, PipelineStage};
use super::eligibility::{self, EligibilityReport};
use super::pipeline::{AdvanceOutcome, PipelineError, PipelineStateMachine};
use super::reconcile::{EngineError, ReconciliationEngine};
use super::repository::{
    ApplicationRepository, JobRepository, NotificationQueue, RepositoryError,
};
use super::runs::{RunId, RunProgress, RunStore, RunStoreError, ScreeningRun};
use super::scoring::{ScoringBackend, ScoringError};

/// Immediate response to a run request; the cycle itself continues in a
/// background task and is observed by polling the run record.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct RunReceipt {
    pub run_id: RunId,
    pub total: u32,
}

/// Error raised by the screening service facade.
#[derive(Debug, thiserror::Error)]
pub enum ScreeningServiceError {
    #[error("job {0} not found")]
    UnknownJob(JobId),
    #[error("run {0} not found")]
    UnknownRun(RunId),
    #[error("a screening run is already in progress for job {0}")]
    RunInProgress(JobId),
    #[error(transparent)]
    Scoring(#[from] ScoringError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    RunStore(#[from] RunStoreError),
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}

impl From<EngineError> for ScreeningServiceError {
    fn from(value: EngineError) -> Self {
        match value {
            EngineError::Scoring(err) => Self::Scoring(err),
            EngineError::Repository(err) => Self::Repository(err),
            EngineError::RunStore(err) => Self::RunStore(err),
        }
    }
}

/// Facade composing the reconciliation engine, run tracker, eligibility
/// evaluator, and pipeline state machine behind one interface.
pub struct ScreeningService<J, R, S, B, N> {
    jobs: Arc<J>,
    runs: Arc<S>,
    engine: Arc<ReconciliationEngine<J, R, S, B>>,
    pipeline: PipelineStateMachine<R, N>,
    applications: Arc<R>,
    /// Advisory per-job lock: two concurrent runs against the same job would
    /// corrupt each other's positional-fallback bounds, so the second is
    /// refused outright.
    active_jobs: Arc<Mutex<HashSet<JobId>>>,
}

impl<J, R, S, B, N> ScreeningService<J, R, S, B, N>
where
    J: JobRepository + 'static,
    R: ApplicationRepository + 'static,
    S: RunStore + 'static,
    B: ScoringBackend + 'static,
    N: NotificationQueue + 'static,
{
    pub fn new(
        jobs: Arc<J>,
        applications: Arc<R>,
        runs: Arc<S>,
        backend: Arc<B>,
        notifications: Arc<N>,
    ) -> Self {
        let engine = Arc::new(ReconciliationEngine::new(
            Arc::clone(&jobs),
            Arc::clone(&applications),
            Arc::clone(&runs),
            backend,
        ));
        let pipeline = PipelineStateMachine::new(Arc::clone(&applications), notifications);

        Self {
            jobs,
            runs,
            engine,
            pipeline,
            applications,
            active_jobs: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Create a run record and kick off the reconciliation cycle in the
    /// background, returning immediately.
    ///
    /// The scoring context is ensured here, before the run record exists, so
    /// configuration and rejection failures abort this request synchronously
    /// rather than surfacing from a detached task.
    pub async fn start_run(
        &self,
        job_id: &JobId,
        application_ids: Option<Vec<ApplicationId>>,
    ) -> Result<RunReceipt, ScreeningServiceError> {
        let job = self
            .jobs
            .get(job_id)?
            .ok_or_else(|| ScreeningServiceError::UnknownJob(job_id.clone()))?;

        {
            let mut active = self.active_jobs.lock().expect("job lock mutex poisoned");
            if !active.insert(job_id.clone()) {
                return Err(ScreeningServiceError::RunInProgress(job_id.clone()));
            }
        }

        let prepared: Result<_, ScreeningServiceError> = async {
            let context = self.engine.ensure_context(&job).await?;
            let input = self.run_input(job_id, application_ids)?;
            let run = self.runs.create(job_id, input.len() as u32)?;
            Ok((context, input, run))
        }
        .await;

        let (context, input, run) = match prepared {
            Ok(values) => values,
            Err(err) => {
                self.release_job(job_id);
                return Err(err);
            }
        };

        let receipt = RunReceipt {
            run_id: run.run_id,
            total: run.total,
        };

        let engine = Arc::clone(&self.engine);
        let runs = Arc::clone(&self.runs);
        let active_jobs = Arc::clone(&self.active_jobs);
        let job_id = job_id.clone();
        let run_id = run.run_id;
        tokio::spawn(async move {
            if let Err(err) = engine.execute(run_id, context, input).await {
                error!(%run_id, error = %err, "screening run aborted");
                if let Err(store_err) = runs.mark_failed(&run_id, &err.to_string()) {
                    error!(%run_id, error = %store_err, "unable to record run failure");
                }
            }
            active_jobs
                .lock()
                .expect("job lock mutex poisoned")
                .remove(&job_id);
        });

        Ok(receipt)
    }

    /// Poller-facing run progress.
    pub fn run_progress(&self, run_id: &RunId) -> Result<RunProgress, ScreeningServiceError> {
        let run = self
            .runs
            .get(run_id)?
            .ok_or(ScreeningServiceError::UnknownRun(*run_id))?;
        Ok(run.progress())
    }

    /// Running records untouched for longer than `older_than`; the operator
    /// view over runs orphaned by a crash.
    pub fn stale_runs(
        &self,
        older_than: chrono::Duration,
    ) -> Result<Vec<ScreeningRun>, ScreeningServiceError> {
        Ok(self.runs.stale_running(older_than)?)
    }

    /// Synchronous eligibility check of a profile against a job's rule set.
    pub fn evaluate_eligibility(
        &self,
        job_id: &JobId,
        profile: &CandidateProfile,
    ) -> Result<EligibilityReport, ScreeningServiceError> {
        let job = self
            .jobs
            .get(job_id)?
            .ok_or_else(|| ScreeningServiceError::UnknownJob(job_id.clone()))?;
        Ok(eligibility::evaluate(&job.eligibility, profile))
    }

    pub fn advance_stage(
        &self,
        ids: &[ApplicationId],
        target: PipelineStage,
    ) -> Result<AdvanceOutcome, ScreeningServiceError> {
        Ok(self.pipeline.advance_bulk(ids, target)?)
    }

    pub fn reject(&self, ids: &[ApplicationId]) -> Result<AdvanceOutcome, ScreeningServiceError> {
        Ok(self.pipeline.reject(ids)?)
    }

    pub fn list_stage(
        &self,
        job_id: &JobId,
        stage: PipelineStage,
    ) -> Result<Vec<CandidateApplication>, ScreeningServiceError> {
        Ok(self.pipeline.list_by_stage(job_id, stage)?)
    }

    /// The run's input snapshot: ascending creation time, non-deleted, and
    /// scoped to the job even when explicit ids were supplied.
    fn run_input(
        &self,
        job_id: &JobId,
        application_ids: Option<Vec<ApplicationId>>,
    ) -> Result<Vec<CandidateApplication>, ScreeningServiceError> {
        let input = match application_ids {
            Some(ids) => {
                // A repeated id would hold two snapshot positions and let one
                // application absorb two attributions; first occurrence wins.
                let mut seen = HashSet::new();
                let ids: Vec<ApplicationId> =
                    ids.into_iter().filter(|id| seen.insert(id.clone())).collect();
                let mut applications = self.applications.fetch_many(&ids)?;
                applications.retain(|application| &application.job_id == job_id);
                applications
            }
            None => self.applications.for_job(job_id)?,
        };
        Ok(input)
    }

    fn release_job(&self, job_id: &JobId) {
        self.active_jobs
            .lock()
            .expect("job lock mutex poisoned")
            .remove(job_id);
    }
}
