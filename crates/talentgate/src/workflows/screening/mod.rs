//! Candidate screening orchestration: scoring runs against the external
//! ranking service, run-progress tracking, eligibility checks, and the hiring
//! pipeline state machine.
//!
//! The workflow is storage- and transport-agnostic. Repositories, the run
//! store, the scoring backend, and the notification queue are traits; the
//! hosting binary wires concrete adapters in.

pub mod domain;
pub mod eligibility;
pub mod pipeline;
pub(crate) mod reconcile;
pub mod repository;
pub mod router;
pub mod runs;
pub mod scoring;
pub mod service;

#[cfg(test)]
mod tests;

pub use domain::{
    ApplicationId, CandidateApplication, CandidateId, CandidateProfile, EducationLevel,
    EligibilityRuleSet, JobId, JobPosting, JobStatus, PipelineStage, ScoreBreakdown,
    ScoringContext, SkillList,
};
pub use eligibility::EligibilityReport;
pub use pipeline::{AdvanceOutcome, PipelineError, PipelineStateMachine};
pub use repository::{
    ApplicationRepository, JobRepository, NotificationQueue, NotifyError, RepositoryError,
    ScoreUpdate, StageChangeNotice,
};
pub use router::screening_router;
pub use runs::{
    InMemoryRunStore, RunId, RunProgress, RunStatus, RunStore, RunStoreError, ScreeningRun,
};
pub use scoring::{HttpScoringClient, JobContextRequest, RankedMatch, ScoringBackend, ScoringError, TextProvider};
pub use service::{RunReceipt, ScreeningService, ScreeningServiceError};
