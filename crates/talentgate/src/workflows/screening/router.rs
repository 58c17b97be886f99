use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::domain::{ApplicationId, CandidateApplication, CandidateProfile, JobId, PipelineStage};
use super::pipeline::PipelineError;
use super::repository::{ApplicationRepository, JobRepository, NotificationQueue};
use super::runs::{RunId, ScreeningRun, RunStore};
use super::scoring::{ScoringBackend, ScoringError};
use super::service::{ScreeningService, ScreeningServiceError};

/// Router builder exposing the screening workflow over HTTP.
pub fn screening_router<J, R, S, B, N>(service: Arc<ScreeningService<J, R, S, B, N>>) -> Router
where
    J: JobRepository + 'static,
    R: ApplicationRepository + 'static,
    S: RunStore + 'static,
    B: ScoringBackend + 'static,
    N: NotificationQueue + 'static,
{
    Router::new()
        .route(
            "/api/v1/jobs/:job_id/screening/runs",
            post(start_run_handler::<J, R, S, B, N>),
        )
        .route(
            "/api/v1/screening/runs",
            get(stale_runs_handler::<J, R, S, B, N>),
        )
        .route(
            "/api/v1/screening/runs/:run_id",
            get(run_progress_handler::<J, R, S, B, N>),
        )
        .route(
            "/api/v1/jobs/:job_id/eligibility",
            post(eligibility_handler::<J, R, S, B, N>),
        )
        .route(
            "/api/v1/applications/stage",
            post(advance_stage_handler::<J, R, S, B, N>),
        )
        .route(
            "/api/v1/applications/reject",
            post(reject_handler::<J, R, S, B, N>),
        )
        .route(
            "/api/v1/jobs/:job_id/applications/:stage",
            get(list_stage_handler::<J, R, S, B, N>),
        )
        .with_state(service)
}

#[derive(Debug, Default, Deserialize)]
pub struct StartRunRequest {
    /// Restrict the run to these applications; defaults to every non-deleted
    /// application on the job.
    #[serde(default)]
    pub application_ids: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
pub struct AdvanceStageRequest {
    pub application_ids: Vec<String>,
    pub target_stage: String,
}

#[derive(Debug, Deserialize)]
pub struct RejectRequest {
    pub application_ids: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct StaleRunsQuery {
    /// Runs untouched for at least this long count as stale.
    pub stale_after_secs: Option<u64>,
}

/// Sanitized listing entry for stage-scoped queries.
#[derive(Debug, Clone, Serialize)]
pub struct ApplicationStageView {
    pub application_id: ApplicationId,
    pub candidate_id: String,
    pub stage: &'static str,
    pub score: Option<u8>,
    pub processed: bool,
}

impl ApplicationStageView {
    fn from_application(application: &CandidateApplication) -> Self {
        Self {
            application_id: application.application_id.clone(),
            candidate_id: application.candidate_id.0.clone(),
            stage: application.stage.label(),
            score: application.score,
            processed: application.processed,
        }
    }
}

/// Operator view of a possibly-orphaned run.
#[derive(Debug, Clone, Serialize)]
pub struct StaleRunView {
    pub run_id: RunId,
    pub job_id: JobId,
    pub processed: u32,
    pub total: u32,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl StaleRunView {
    fn from_run(run: &ScreeningRun) -> Self {
        Self {
            run_id: run.run_id,
            job_id: run.job_id.clone(),
            processed: run.processed,
            total: run.total,
            updated_at: run.updated_at,
        }
    }
}

fn error_response(error: ScreeningServiceError) -> Response {
    let status = match &error {
        ScreeningServiceError::UnknownJob(_) | ScreeningServiceError::UnknownRun(_) => {
            StatusCode::NOT_FOUND
        }
        ScreeningServiceError::RunInProgress(_) => StatusCode::CONFLICT,
        ScreeningServiceError::Scoring(
            ScoringError::Unreachable(_) | ScoringError::Rejected(_) | ScoringError::Protocol(_),
        ) => StatusCode::BAD_GATEWAY,
        ScreeningServiceError::Pipeline(PipelineError::RejectionViaAdvance) => {
            StatusCode::BAD_REQUEST
        }
        ScreeningServiceError::Pipeline(PipelineError::Repository(_))
        | ScreeningServiceError::Repository(_)
        | ScreeningServiceError::RunStore(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };

    let payload = json!({ "error": error.to_string() });
    (status, axum::Json(payload)).into_response()
}

fn bad_request(message: String) -> Response {
    let payload = json!({ "error": message });
    (StatusCode::BAD_REQUEST, axum::Json(payload)).into_response()
}

fn to_application_ids(raw: Vec<String>) -> Vec<ApplicationId> {
    raw.into_iter().map(ApplicationId).collect()
}

pub(crate) async fn start_run_handler<J, R, S, B, N>(
    State(service): State<Arc<ScreeningService<J, R, S, B, N>>>,
    Path(job_id): Path<String>,
    axum::Json(request): axum::Json<StartRunRequest>,
) -> Response
where
    J: JobRepository + 'static,
    R: ApplicationRepository + 'static,
    S: RunStore + 'static,
    B: ScoringBackend + 'static,
    N: NotificationQueue + 'static,
{
    let job_id = JobId(job_id);
    let application_ids = request.application_ids.map(to_application_ids);

    match service.start_run(&job_id, application_ids).await {
        Ok(receipt) => (StatusCode::ACCEPTED, axum::Json(receipt)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn run_progress_handler<J, R, S, B, N>(
    State(service): State<Arc<ScreeningService<J, R, S, B, N>>>,
    Path(run_id): Path<String>,
) -> Response
where
    J: JobRepository + 'static,
    R: ApplicationRepository + 'static,
    S: RunStore + 'static,
    B: ScoringBackend + 'static,
    N: NotificationQueue + 'static,
{
    let Some(run_id) = RunId::parse(&run_id) else {
        return bad_request(format!("'{run_id}' is not a valid run id"));
    };

    match service.run_progress(&run_id) {
        Ok(progress) => (StatusCode::OK, axum::Json(progress)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn stale_runs_handler<J, R, S, B, N>(
    State(service): State<Arc<ScreeningService<J, R, S, B, N>>>,
    Query(query): Query<StaleRunsQuery>,
) -> Response
where
    J: JobRepository + 'static,
    R: ApplicationRepository + 'static,
    S: RunStore + 'static,
    B: ScoringBackend + 'static,
    N: NotificationQueue + 'static,
{
    // Default matches the worst tolerable poller staleness for a crashed run.
    let stale_after_secs = query.stale_after_secs.unwrap_or(900);
    let older_than = chrono::Duration::seconds(stale_after_secs.min(i64::MAX as u64) as i64);

    match service.stale_runs(older_than) {
        Ok(runs) => {
            let views: Vec<StaleRunView> = runs.iter().map(StaleRunView::from_run).collect();
            (StatusCode::OK, axum::Json(views)).into_response()
        }
        Err(err) => error_response(err),
    }
}

pub(crate) async fn eligibility_handler<J, R, S, B, N>(
    State(service): State<Arc<ScreeningService<J, R, S, B, N>>>,
    Path(job_id): Path<String>,
    axum::Json(profile): axum::Json<CandidateProfile>,
) -> Response
where
    J: JobRepository + 'static,
    R: ApplicationRepository + 'static,
    S: RunStore + 'static,
    B: ScoringBackend + 'static,
    N: NotificationQueue + 'static,
{
    let job_id = JobId(job_id);
    match service.evaluate_eligibility(&job_id, &profile) {
        Ok(report) => (StatusCode::OK, axum::Json(report)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn advance_stage_handler<J, R, S, B, N>(
    State(service): State<Arc<ScreeningService<J, R, S, B, N>>>,
    axum::Json(request): axum::Json<AdvanceStageRequest>,
) -> Response
where
    J: JobRepository + 'static,
    R: ApplicationRepository + 'static,
    S: RunStore + 'static,
    B: ScoringBackend + 'static,
    N: NotificationQueue + 'static,
{
    let Some(target) = PipelineStage::from_label(&request.target_stage) else {
        return bad_request(format!(
            "'{}' is not a pipeline stage",
            request.target_stage
        ));
    };

    let ids = to_application_ids(request.application_ids);
    match service.advance_stage(&ids, target) {
        Ok(outcome) => (StatusCode::OK, axum::Json(outcome)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn reject_handler<J, R, S, B, N>(
    State(service): State<Arc<ScreeningService<J, R, S, B, N>>>,
    axum::Json(request): axum::Json<RejectRequest>,
) -> Response
where
    J: JobRepository + 'static,
    R: ApplicationRepository + 'static,
    S: RunStore + 'static,
    B: ScoringBackend + 'static,
    N: NotificationQueue + 'static,
{
    let ids = to_application_ids(request.application_ids);
    match service.reject(&ids) {
        Ok(outcome) => (StatusCode::OK, axum::Json(outcome)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn list_stage_handler<J, R, S, B, N>(
    State(service): State<Arc<ScreeningService<J, R, S, B, N>>>,
    Path((job_id, stage)): Path<(String, String)>,
) -> Response
where
    J: JobRepository + 'static,
    R: ApplicationRepository + 'static,
    S: RunStore + 'static,
    B: ScoringBackend + 'static,
    N: NotificationQueue + 'static,
{
    let Some(stage) = PipelineStage::from_label(&stage) else {
        return bad_request(format!("'{stage}' is not a pipeline stage"));
    };

    let job_id = JobId(job_id);
    match service.list_stage(&job_id, stage) {
        Ok(applications) => {
            let views: Vec<ApplicationStageView> = applications
                .iter()
                .map(ApplicationStageView::from_application)
                .collect();
            (StatusCode::OK, axum::Json(views)).into_response()
        }
        Err(err) => error_response(err),
    }
}
