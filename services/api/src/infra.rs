use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use talentgate::workflows::screening::{
    ApplicationId, ApplicationRepository, CandidateApplication, CandidateId, EducationLevel,
    EligibilityRuleSet, JobId, JobPosting, JobRepository, JobStatus, NotificationQueue,
    NotifyError, PipelineStage, RepositoryError, ScoreUpdate, ScoringContext, SkillList,
    StageChangeNotice, TextProvider,
};

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

#[derive(Default, Clone)]
pub(crate) struct InMemoryJobRepository {
    postings: Arc<Mutex<HashMap<JobId, JobPosting>>>,
}

impl InMemoryJobRepository {
    pub(crate) fn insert(&self, posting: JobPosting) {
        self.postings
            .lock()
            .expect("job mutex poisoned")
            .insert(posting.job_id.clone(), posting);
    }
}

impl JobRepository for InMemoryJobRepository {
    fn get(&self, id: &JobId) -> Result<Option<JobPosting>, RepositoryError> {
        let guard = self.postings.lock().expect("job mutex poisoned");
        Ok(guard.get(id).cloned())
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

#[derive(Default, Clone)]
pub(crate) struct InMemoryApplicationRepository {
    records: Arc<Mutex<HashMap<ApplicationId, CandidateApplication>>>,
}

impl ApplicationRepository for InMemoryApplicationRepository {
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
        let guard = self.records.lock().expect("repository mutex poisoned");
        Ok(guard.get(id).cloned())
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

/// Notification queue backed by an in-process channel. A drain worker owns
/// the receiving side; the pipeline state machine only ever enqueues.
#[derive(Clone)]
pub(crate) struct ChannelNotificationQueue {
    sender: UnboundedSender<StageChangeNotice>,
}

impl ChannelNotificationQueue {
    pub(crate) fn channel() -> (Self, UnboundedReceiver<StageChangeNotice>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl NotificationQueue for ChannelNotificationQueue {
    fn enqueue(&self, notice: StageChangeNotice) -> Result<(), NotifyError> {
        self.sender
            .send(notice)
            .map_err(|err| NotifyError::Transport(err.to_string()))
    }
}

/// Text provider for documents submitted as plain UTF-8 bytes. Extraction is
/// a straight decode; undecodable input yields the empty string the contract
/// prescribes for failures.
pub(crate) struct PlainTextProvider;

impl TextProvider for PlainTextProvider {
    fn extract_text(&self, bytes: &[u8], _mime_type: &str, _filename: &str) -> String {
        match std::str::from_utf8(bytes) {
            Ok(text) => text.trim().to_string(),
            Err(_) => String::new(),
        }
    }
}

/// Sample posting and applications for trying the API without a backing
/// store, enabled with `--seed-demo`.
pub(crate) fn demo_dataset() -> (JobPosting, Vec<CandidateApplication>) {
    let job_id = JobId("demo-backend-engineer".to_string());
    let posting = JobPosting {
        job_id: job_id.clone(),
        title: "Backend Engineer".to_string(),
        status: JobStatus::Open,
        required_skills: SkillList::Delimited("Rust, SQL, Kubernetes".to_string()),
        preferred_skills: SkillList::Listed(vec!["gRPC".to_string()]),
        eligibility: EligibilityRuleSet {
            accepted_education: vec![EducationLevel::Bachelors],
            min_experience_years: Some(2.0),
            ..EligibilityRuleSet::default()
        },
        scoring_context: None,
    };

    let extractor = PlainTextProvider;
    let now = Utc::now();
    let applications = (1..=3)
        .map(|n| {
            let resume = format!("Sample resume {n}: Rust services and SQL schemas.");
            let text = extractor.extract_text(
                resume.as_bytes(),
                "text/plain",
                &format!("resume-{n}.txt"),
            );
            CandidateApplication::submitted(
                ApplicationId(format!("demo-app-{n}")),
                CandidateId(format!("demo-cand-{n}")),
                job_id.clone(),
                Some(text).filter(|cached| !cached.is_empty()),
                now + chrono::Duration::seconds(n),
            )
        })
        .collect();

    (posting, applications)
}
