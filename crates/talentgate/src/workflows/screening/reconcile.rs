//! One full screening cycle: clear the stale index, re-index the run's
//! applications, fetch ranked matches, and attribute each match back to a
//! local record while updating the run record incrementally.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use super::domain::{ApplicationId, CandidateApplication, JobPosting, ScoringContext};
use super::repository::{ApplicationRepository, JobRepository, RepositoryError, ScoreUpdate};
use super::runs::{RunId, RunPatch, RunStore, RunStoreError, ScreeningRun};
use super::scoring::{JobContextRequest, RankedMatch, ScoringBackend, ScoringError};

/// Progress is flushed to the run store every this many attributions, and
/// once more at completion. Trades write volume against poller staleness.
const PROGRESS_FLUSH_INTERVAL: u32 = 5;

/// Infrastructure failure inside a cycle. Scoring fetch failures are not
/// errors at this level; they terminate the run as Failed instead.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Scoring(#[from] ScoringError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    RunStore(#[from] RunStoreError),
}

/// Phase labels for run-lifecycle logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunPhase {
    Clearing,
    Indexing,
    Fetching,
    Reconciling,
}

impl RunPhase {
    const fn label(self) -> &'static str {
        match self {
            RunPhase::Clearing => "clearing",
            RunPhase::Indexing => "indexing",
            RunPhase::Fetching => "fetching",
            RunPhase::Reconciling => "reconciling",
        }
    }
}

/// Drives screening cycles against the repository, run store, and scoring
/// backend seams.
pub struct ReconciliationEngine<J, R, S, B> {
    jobs: Arc<J>,
    applications: Arc<R>,
    runs: Arc<S>,
    backend: Arc<B>,
}

impl<J, R, S, B> ReconciliationEngine<J, R, S, B>
where
    J: JobRepository + 'static,
    R: ApplicationRepository + 'static,
    S: RunStore + 'static,
    B: ScoringBackend + 'static,
{
    pub fn new(jobs: Arc<J>, applications: Arc<R>, runs: Arc<S>, backend: Arc<B>) -> Self {
        Self {
            jobs,
            applications,
            runs,
            backend,
        }
    }

    /// Return the job's scoring context, creating and persisting one when
    /// absent. Called before the run record exists so context-creation
    /// failures abort the triggering request instead of a background task.
    pub async fn ensure_context(&self, job: &JobPosting) -> Result<ScoringContext, EngineError> {
        if let Some(context) = &job.scoring_context {
            return Ok(context.clone());
        }

        let request = JobContextRequest::from_posting(job);
        let context = self.backend.create_context(&request).await?;
        self.jobs.set_scoring_context(&job.job_id, context.clone())?;
        info!(job_id = %job.job_id, "scoring context created");
        Ok(context)
    }

    /// Execute one cycle for an already-created run.
    ///
    /// `input` is the run's application snapshot, ascending by creation
    /// time, captured once by the caller. Its ordering is load-bearing: the
    /// positional fallback during reconciliation resolves indices against
    /// exactly this list, so it is never re-read mid-cycle.
    pub async fn execute(
        &self,
        run_id: RunId,
        context: ScoringContext,
        input: Vec<CandidateApplication>,
    ) -> Result<ScreeningRun, EngineError> {
        // Clearing: best-effort removal of results from earlier cycles.
        debug!(%run_id, phase = RunPhase::Clearing.label(), "run phase");
        if let Err(err) = self.backend.clear_index(&context).await {
            warn!(%run_id, error = %err, "clear-index failed, continuing with stale index");
        }

        let indexing_failures = self.index_documents(run_id, &context, &input).await;

        debug!(%run_id, phase = RunPhase::Fetching.label(), "run phase");
        let matches = match self.backend.fetch_ranked_matches(&context).await {
            Ok(results) if results.is_empty() => {
                let message = "scoring service returned no matches".to_string();
                warn!(%run_id, "{message}");
                return Ok(self.runs.mark_failed(&run_id, &message)?);
            }
            Ok(results) => results,
            Err(err) => {
                warn!(%run_id, error = %err, "fetch-matches failed, marking run failed");
                return Ok(self.runs.mark_failed(&run_id, &err.to_string())?);
            }
        };

        let (processed, dropped) = self.reconcile_matches(run_id, &input, matches)?;

        self.runs.update(
            &run_id,
            RunPatch {
                processed: Some(processed),
                indexing_failures: Some(indexing_failures),
                dropped_matches: Some(dropped),
            },
        )?;
        let run = self.runs.mark_completed(&run_id)?;
        info!(
            %run_id,
            processed,
            total = run.total,
            indexing_failures,
            dropped,
            "screening run completed"
        );
        Ok(run)
    }

    /// Indexing phase. Strictly sequential: the positional fallback depends
    /// on the ordinal order of `input`, so documents are sent one at a time
    /// in snapshot order. Per-document failures are counted, never fatal,
    /// and a durable id is sent at most once.
    async fn index_documents(
        &self,
        run_id: RunId,
        context: &ScoringContext,
        input: &[CandidateApplication],
    ) -> u32 {
        debug!(%run_id, phase = RunPhase::Indexing.label(), "run phase");
        let mut failures = 0u32;
        let mut sent: HashSet<&ApplicationId> = HashSet::with_capacity(input.len());

        for application in input {
            if !sent.insert(&application.application_id) {
                continue;
            }

            let text = match application.resume_text.as_deref() {
                Some(text) if !text.trim().is_empty() => text,
                _ => {
                    debug!(
                        %run_id,
                        application_id = %application.application_id,
                        "skipping application without cached text"
                    );
                    failures += 1;
                    continue;
                }
            };

            if let Err(err) = self
                .backend
                .index_document(context, text, &application.application_id)
                .await
            {
                warn!(
                    %run_id,
                    application_id = %application.application_id,
                    error = %err,
                    "failed to index document"
                );
                failures += 1;
            }
        }

        failures
    }

    /// Reconciling phase: attribute each match to at most one application
    /// from the run's snapshot. Durable-id lookup wins; the positional
    /// fallback applies only when the index is within the snapshot's bounds,
    /// which stops stale matches from a differently-sized earlier run from
    /// being misattributed. Unresolved matches are dropped and counted.
    fn reconcile_matches(
        &self,
        run_id: RunId,
        input: &[CandidateApplication],
        matches: Vec<RankedMatch>,
    ) -> Result<(u32, u32), EngineError> {
        debug!(%run_id, phase = RunPhase::Reconciling.label(), "run phase");

        let by_durable_id: HashMap<&str, usize> = input
            .iter()
            .enumerate()
            .map(|(position, application)| (application.application_id.0.as_str(), position))
            .collect();

        let mut attributed: HashSet<usize> = HashSet::new();
        let mut processed = 0u32;
        let mut dropped = 0u32;

        for matched in matches {
            let position = matched
                .durable_id
                .as_deref()
                .and_then(|id| by_durable_id.get(id).copied())
                .or_else(|| {
                    matched
                        .resume_index
                        .and_then(|index| usize::try_from(index).ok())
                        .filter(|index| *index < input.len())
                });

            let Some(position) = position else {
                debug!(
                    %run_id,
                    durable_id = matched.durable_id.as_deref().unwrap_or("-"),
                    resume_index = matched.resume_index.unwrap_or(-1),
                    "dropping unattributable match"
                );
                dropped += 1;
                continue;
            };

            if !attributed.insert(position) {
                dropped += 1;
                continue;
            }

            let application = &input[position];
            self.applications.record_score(ScoreUpdate {
                application_id: application.application_id.clone(),
                score: matched.clamped_score(),
                breakdown: matched.breakdown,
                processed_at: Utc::now(),
            })?;
            processed += 1;

            if processed % PROGRESS_FLUSH_INTERVAL == 0 {
                self.runs.update(
                    &run_id,
                    RunPatch {
                        processed: Some(processed),
                        ..RunPatch::default()
                    },
                )?;
            }
        }

        Ok((processed, dropped))
    }
}
