//! Hiring pipeline state machine: bulk stage advancement, the rejected sink,
//! and stage-scoped queries.
//!
//! Bulk advancement deliberately does not enforce forward-only order; the
//! upstream workflow relies on recruiters re-staging applications in either
//! direction. Documented rather than restricted.

use std::sync::Arc;

use serde::Serialize;
use tracing::warn;

use super::domain::{ApplicationId, CandidateApplication, JobId, PipelineStage};
use super::repository::{
    ApplicationRepository, NotificationQueue, RepositoryError, StageChangeNotice,
};

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("applications move to '{}' through rejection, not advancement", PipelineStage::Rejected.label())]
    RejectionViaAdvance,
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Result of a bulk stage change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AdvanceOutcome {
    pub advanced_count: usize,
    pub notifications_sent: usize,
}

/// Applies stage transitions and emits notification intents. Notification
/// failures are logged and never propagate into the transition result.
pub struct PipelineStateMachine<R, N> {
    repository: Arc<R>,
    notifications: Arc<N>,
}

impl<R, N> PipelineStateMachine<R, N>
where
    R: ApplicationRepository + 'static,
    N: NotificationQueue + 'static,
{
    pub fn new(repository: Arc<R>, notifications: Arc<N>) -> Self {
        Self {
            repository,
            notifications,
        }
    }

    /// Move every matching non-deleted application to `target`, regardless
    /// of its current stage. `target` must be in the ordered chain; the
    /// rejected sink is reached through [`reject`](Self::reject).
    pub fn advance_bulk(
        &self,
        ids: &[ApplicationId],
        target: PipelineStage,
    ) -> Result<AdvanceOutcome, PipelineError> {
        if target == PipelineStage::Rejected {
            return Err(PipelineError::RejectionViaAdvance);
        }
        self.apply(ids, target)
    }

    /// Absorbing transition: rejected applications stay rejected.
    pub fn reject(&self, ids: &[ApplicationId]) -> Result<AdvanceOutcome, PipelineError> {
        self.apply(ids, PipelineStage::Rejected)
    }

    /// Applications at `stage` for a job, best score first, ties broken by
    /// recency.
    pub fn list_by_stage(
        &self,
        job_id: &JobId,
        stage: PipelineStage,
    ) -> Result<Vec<CandidateApplication>, PipelineError> {
        Ok(self.repository.by_stage(job_id, stage)?)
    }

    fn apply(
        &self,
        ids: &[ApplicationId],
        target: PipelineStage,
    ) -> Result<AdvanceOutcome, PipelineError> {
        let affected = self.repository.set_stage(ids, target)?;

        let mut notifications_sent = 0usize;
        for application in &affected {
            let notice = StageChangeNotice {
                application_id: application.application_id.clone(),
                candidate_id: application.candidate_id.clone(),
                job_id: application.job_id.clone(),
                stage: target,
            };
            match self.notifications.enqueue(notice) {
                Ok(()) => notifications_sent += 1,
                Err(err) => warn!(
                    application_id = %application.application_id,
                    stage = target.label(),
                    error = %err,
                    "stage notification not enqueued"
                ),
            }
        }

        Ok(AdvanceOutcome {
            advanced_count: affected.len(),
            notifications_sent,
        })
    }
}
