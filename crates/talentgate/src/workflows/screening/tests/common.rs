use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::response::Response;
use chrono::{Duration, Utc};
use serde_json::Value;

use crate::workflows::screening::domain::{
    ApplicationId, CandidateApplication, CandidateId, EducationLevel, EligibilityRuleSet, JobId,
    JobPosting, JobStatus, PipelineStage, ScoreBreakdown, ScoringContext, SkillList,
};
use crate::workflows::screening::repository::{
    ApplicationRepository, JobRepository, NotificationQueue, NotifyError, RepositoryError,
    ScoreUpdate, StageChangeNotice,
};
use crate::workflows::screening::runs::{InMemoryRunStore, RunId, RunStore, ScreeningRun};
use crate::workflows::screening::scoring::{
    JobContextRequest, RankedMatch, ScoringBackend, ScoringError,
};
use crate::workflows::screening::service::ScreeningService;

pub(super) fn job_id() -> JobId {
    JobId("job-1".to_string())
}

pub(super) fn context() -> ScoringContext {
    ScoringContext {
        company_ref: "co-9".to_string(),
        job_ref: "ctx-job-1".to_string(),
    }
}

pub(super) fn rules() -> EligibilityRuleSet {
    EligibilityRuleSet {
        accepted_education: vec![EducationLevel::Bachelors],
        min_experience_years: Some(2.0),
        ..EligibilityRuleSet::default()
    }
}

pub(super) fn posting() -> JobPosting {
    JobPosting {
        scoring_context: Some(context()),
        ..posting_without_context()
    }
}

pub(super) fn posting_without_context() -> JobPosting {
    JobPosting {
        job_id: job_id(),
        title: "Backend Engineer".to_string(),
        status: JobStatus::Open,
        required_skills: SkillList::Listed(vec!["Rust".to_string(), "SQL".to_string()]),
        preferred_skills: SkillList::default(),
        eligibility: rules(),
        scoring_context: None,
    }
}

/// Application with a cached resume, created `offset_secs` after a fixed
/// origin so snapshot ordering is deterministic.
pub(super) fn application(suffix: &str, offset_secs: i64) -> CandidateApplication {
    let created_at = Utc::now() - Duration::hours(1) + Duration::seconds(offset_secs);
    CandidateApplication::submitted(
        ApplicationId(format!("app-{suffix}")),
        CandidateId(format!("cand-{suffix}")),
        job_id(),
        Some(format!("resume text for {suffix}")),
        created_at,
    )
}

pub(super) fn ranked(
    durable_id: Option<&str>,
    resume_index: Option<i64>,
    total_score: f32,
) -> RankedMatch {
    RankedMatch {
        durable_id: durable_id.map(str::to_string),
        resume_index,
        total_score,
        breakdown: ScoreBreakdown::default(),
    }
}

#[derive(Default)]
pub(super) struct MemoryJobs {
    postings: Mutex<HashMap<JobId, JobPosting>>,
}

impl MemoryJobs {
    pub(super) fn with(posting: JobPosting) -> Arc<Self> {
        let jobs = Self::default();
        jobs.postings
            .lock()
            .expect("job mutex poisoned")
            .insert(posting.job_id.clone(), posting);
        Arc::new(jobs)
    }

    pub(super) fn context_of(&self, id: &JobId) -> Option<ScoringContext> {
        self.postings
            .lock()
            .expect("job mutex poisoned")
            .get(id)
            .and_then(|posting| posting.scoring_context.clone())
    }
}

impl JobRepository for MemoryJobs {
    fn get(&self, id: &JobId) -> Result<Option<JobPosting>, RepositoryError> {
        Ok(self
            .postings
            .lock()
            .expect("job mutex poisoned")
            .get(id)
            .cloned())
    }

    fn set_scoring_context(
        &self,
        id: &JobId,
        context: ScoringContext,
    ) -> Result<(), RepositoryError> {
        let mut guard = self.postings.lock().expect("job mutex poisoned");
        let posting = guard.get_mut(id).ok_or(RepositoryError::NotFound)?;
        posting.scoring_context = Some(context);
        Ok(())
    }
}

#[derive(Default)]
pub(super) struct MemoryApplications {
    records: Mutex<HashMap<ApplicationId, CandidateApplication>>,
}

impl MemoryApplications {
    pub(super) fn with(applications: Vec<CandidateApplication>) -> Arc<Self> {
        let repository = Self::default();
        {
            let mut guard = repository.records.lock().expect("repository mutex poisoned");
            for application in applications {
                guard.insert(application.application_id.clone(), application);
            }
        }
        Arc::new(repository)
    }

    pub(super) fn stored(&self, id: &ApplicationId) -> CandidateApplication {
        self.records
            .lock()
            .expect("repository mutex poisoned")
            .get(id)
            .cloned()
            .expect("application present")
    }
}

impl ApplicationRepository for MemoryApplications {
    fn insert(
        &self,
        application: CandidateApplication,
    ) -> Result<CandidateApplication, RepositoryError> {
        let mut guard = self.records.lock().expect("repository mutex poisoned");
        if guard.contains_key(&application.application_id) {
            return Err(RepositoryError::Conflict);
        }
        guard.insert(application.application_id.clone(), application.clone());
        Ok(application)
    }

    fn get(&self, id: &ApplicationId) -> Result<Option<CandidateApplication>, RepositoryError> {
        Ok(self
            .records
            .lock()
            .expect("repository mutex poisoned")
            .get(id)
            .cloned())
    }

    fn for_job(&self, job_id: &JobId) -> Result<Vec<CandidateApplication>, RepositoryError> {
        let guard = self.records.lock().expect("repository mutex poisoned");
        let mut applications: Vec<CandidateApplication> = guard
            .values()
            .filter(|application| !application.deleted && &application.job_id == job_id)
            .cloned()
            .collect();
        applications.sort_by_key(|application| application.created_at);
        Ok(applications)
    }

    fn fetch_many(
        &self,
        ids: &[ApplicationId],
    ) -> Result<Vec<CandidateApplication>, RepositoryError> {
        let guard = self.records.lock().expect("repository mutex poisoned");
        let mut applications: Vec<CandidateApplication> = ids
            .iter()
            .filter_map(|id| guard.get(id))
            .filter(|application| !application.deleted)
            .cloned()
            .collect();
        applications.sort_by_key(|application| application.created_at);
        Ok(applications)
    }

    fn record_score(&self, update: ScoreUpdate) -> Result<(), RepositoryError> {
        let mut guard = self.records.lock().expect("repository mutex poisoned");
        let application = guard
            .get_mut(&update.application_id)
            .ok_or(RepositoryError::NotFound)?;
        application.score = Some(update.score);
        application.breakdown = Some(update.breakdown);
        application.processed = true;
        application.processed_at = Some(update.processed_at);
        application.error = None;
        application.updated_at = update.processed_at;
        Ok(())
    }

    fn set_stage(
        &self,
        ids: &[ApplicationId],
        stage: PipelineStage,
    ) -> Result<Vec<CandidateApplication>, RepositoryError> {
        let mut guard = self.records.lock().expect("repository mutex poisoned");
        let mut affected = Vec::new();
        for id in ids {
            if let Some(application) = guard.get_mut(id) {
                if application.deleted {
                    continue;
                }
                application.stage = stage;
                application.updated_at = Utc::now();
                affected.push(application.clone());
            }
        }
        Ok(affected)
    }

    fn by_stage(
        &self,
        job_id: &JobId,
        stage: PipelineStage,
    ) -> Result<Vec<CandidateApplication>, RepositoryError> {
        let guard = self.records.lock().expect("repository mutex poisoned");
        let mut applications: Vec<CandidateApplication> = guard
            .values()
            .filter(|application| {
                !application.deleted && &application.job_id == job_id && application.stage == stage
            })
            .cloned()
            .collect();
        applications.sort_by(|a, b| {
            b.score
                .cmp(&a.score)
                .then_with(|| b.updated_at.cmp(&a.updated_at))
        });
        Ok(applications)
    }
}

/// What the fake backend answers to `fetch-matches`.
pub(super) enum FetchScript {
    Matches(Vec<RankedMatch>),
    Timeout,
    /// Stall before answering so a test can observe the run mid-flight.
    Stalled(std::time::Duration, Vec<RankedMatch>),
}

#[derive(Default)]
pub(super) struct FakeScoringBackend {
    script: Mutex<Option<FetchScript>>,
    indexed: Mutex<Vec<String>>,
    cleared: Mutex<u32>,
    contexts_created: Mutex<u32>,
    failing_index_ids: Mutex<Vec<String>>,
}

impl FakeScoringBackend {
    pub(super) fn returning(matches: Vec<RankedMatch>) -> Arc<Self> {
        Self::scripted(FetchScript::Matches(matches))
    }

    pub(super) fn timing_out() -> Arc<Self> {
        Self::scripted(FetchScript::Timeout)
    }

    pub(super) fn scripted(script: FetchScript) -> Arc<Self> {
        let backend = Self::default();
        *backend.script.lock().expect("script mutex poisoned") = Some(script);
        Arc::new(backend)
    }

    pub(super) fn fail_indexing(&self, durable_id: &str) {
        self.failing_index_ids
            .lock()
            .expect("script mutex poisoned")
            .push(durable_id.to_string());
    }

    pub(super) fn indexed_ids(&self) -> Vec<String> {
        self.indexed.lock().expect("script mutex poisoned").clone()
    }

    pub(super) fn clear_calls(&self) -> u32 {
        *self.cleared.lock().expect("script mutex poisoned")
    }

    pub(super) fn contexts_created(&self) -> u32 {
        *self.contexts_created.lock().expect("script mutex poisoned")
    }
}

#[async_trait]
impl ScoringBackend for FakeScoringBackend {
    async fn create_context(
        &self,
        request: &JobContextRequest,
    ) -> Result<ScoringContext, ScoringError> {
        *self
            .contexts_created
            .lock()
            .expect("script mutex poisoned") += 1;
        Ok(ScoringContext {
            company_ref: "co-9".to_string(),
            job_ref: format!("ctx-{}", request.job_id),
        })
    }

    async fn index_document(
        &self,
        _context: &ScoringContext,
        _text: &str,
        durable_id: &ApplicationId,
    ) -> Result<(), ScoringError> {
        if self
            .failing_index_ids
            .lock()
            .expect("script mutex poisoned")
            .contains(&durable_id.0)
        {
            return Err(ScoringError::Rejected(format!(
                "document {durable_id} refused"
            )));
        }
        self.indexed
            .lock()
            .expect("script mutex poisoned")
            .push(durable_id.0.clone());
        Ok(())
    }

    async fn clear_index(&self, _context: &ScoringContext) -> Result<(), ScoringError> {
        *self.cleared.lock().expect("script mutex poisoned") += 1;
        Ok(())
    }

    async fn fetch_ranked_matches(
        &self,
        _context: &ScoringContext,
    ) -> Result<Vec<RankedMatch>, ScoringError> {
        let script = self.script.lock().expect("script mutex poisoned").take();
        match script {
            Some(FetchScript::Matches(matches)) => Ok(matches),
            Some(FetchScript::Timeout) | None => Err(ScoringError::Unreachable(
                "fetch-matches timed out".to_string(),
            )),
            Some(FetchScript::Stalled(pause, matches)) => {
                tokio::time::sleep(pause).await;
                Ok(matches)
            }
        }
    }
}

#[derive(Default)]
pub(super) struct MemoryNotifications {
    notices: Mutex<Vec<StageChangeNotice>>,
}

impl MemoryNotifications {
    pub(super) fn notices(&self) -> Vec<StageChangeNotice> {
        self.notices.lock().expect("notice mutex poisoned").clone()
    }
}

impl NotificationQueue for MemoryNotifications {
    fn enqueue(&self, notice: StageChangeNotice) -> Result<(), NotifyError> {
        self.notices
            .lock()
            .expect("notice mutex poisoned")
            .push(notice);
        Ok(())
    }
}

pub(super) struct FailingNotifications;

impl NotificationQueue for FailingNotifications {
    fn enqueue(&self, _notice: StageChangeNotice) -> Result<(), NotifyError> {
        Err(NotifyError::Transport("queue offline".to_string()))
    }
}

pub(super) type TestService = ScreeningService<
    MemoryJobs,
    MemoryApplications,
    InMemoryRunStore,
    FakeScoringBackend,
    MemoryNotifications,
>;

pub(super) struct Harness {
    pub(super) service: Arc<TestService>,
    pub(super) jobs: Arc<MemoryJobs>,
    pub(super) applications: Arc<MemoryApplications>,
    pub(super) runs: Arc<InMemoryRunStore>,
    pub(super) backend: Arc<FakeScoringBackend>,
    pub(super) notifications: Arc<MemoryNotifications>,
}

pub(super) fn harness_with(
    posting: JobPosting,
    applications: Vec<CandidateApplication>,
    backend: Arc<FakeScoringBackend>,
) -> Harness {
    let jobs = MemoryJobs::with(posting);
    let applications = MemoryApplications::with(applications);
    let runs = Arc::new(InMemoryRunStore::default());
    let notifications = Arc::new(MemoryNotifications::default());
    let service = Arc::new(ScreeningService::new(
        jobs.clone(),
        applications.clone(),
        runs.clone(),
        backend.clone(),
        notifications.clone(),
    ));
    Harness {
        service,
        jobs,
        applications,
        runs,
        backend,
        notifications,
    }
}

pub(super) async fn wait_for_terminal(runs: &InMemoryRunStore, run_id: &RunId) -> ScreeningRun {
    for _ in 0..400 {
        if let Some(run) = runs.get(run_id).expect("run lookup") {
            if run.is_terminal() {
                return run;
            }
        }
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }
    panic!("run never reached a terminal status");
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
