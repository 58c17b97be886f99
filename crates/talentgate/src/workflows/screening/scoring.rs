use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::config::ScoringConfig;

use super::domain::{ApplicationId, JobPosting, ScoreBreakdown, ScoringContext};

/// Failure taxonomy for the scoring boundary. `Unreachable` covers transport
/// problems (connect, timeout), `Rejected` covers auth and validation
/// refusals, `Protocol` covers undecodable payloads.
#[derive(Debug, thiserror::Error)]
pub enum ScoringError {
    #[error("scoring service unreachable: {0}")]
    Unreachable(String),
    #[error("scoring service rejected the request: {0}")]
    Rejected(String),
    #[error("scoring service returned an undecodable payload: {0}")]
    Protocol(String),
}

/// Job metadata sent when creating a context. Skill lists are already in
/// canonical form by the time this struct exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobContextRequest {
    pub job_id: String,
    pub title: String,
    pub required_skills: Vec<String>,
    pub preferred_skills: Vec<String>,
}

impl JobContextRequest {
    pub fn from_posting(job: &JobPosting) -> Self {
        Self {
            job_id: job.job_id.0.clone(),
            title: job.title.clone(),
            required_skills: job.required_skills.normalized(),
            preferred_skills: job.preferred_skills.normalized(),
        }
    }
}

/// One ranked result from `fetch-matches`. Either correlation key may be
/// missing; attribution policy lives in the reconciliation engine.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RankedMatch {
    pub durable_id: Option<String>,
    pub resume_index: Option<i64>,
    pub total_score: f32,
    #[serde(flatten)]
    pub breakdown: ScoreBreakdown,
}

impl RankedMatch {
    /// Scores arrive as floats and occasionally drift outside 0-100.
    pub fn clamped_score(&self) -> u8 {
        self.total_score.clamp(0.0, 100.0).round() as u8
    }
}

/// Capability interface over the external scoring service so tests can
/// substitute a deterministic backend.
#[async_trait]
pub trait ScoringBackend: Send + Sync {
    /// Create a job context. Any failure here aborts the caller; nothing
    /// downstream works without a context.
    async fn create_context(
        &self,
        request: &JobContextRequest,
    ) -> Result<ScoringContext, ScoringError>;

    /// Index one document under its durable id. Non-fatal to a run.
    async fn index_document(
        &self,
        context: &ScoringContext,
        text: &str,
        durable_id: &ApplicationId,
    ) -> Result<(), ScoringError>;

    /// Drop previously indexed documents for the context. Best-effort.
    async fn clear_index(&self, context: &ScoringContext) -> Result<(), ScoringError>;

    /// Ranked matches for the context. Failure here is fatal to a run.
    async fn fetch_ranked_matches(
        &self,
        context: &ScoringContext,
    ) -> Result<Vec<RankedMatch>, ScoringError>;
}

/// Consumed contract for document text extraction: plain text out, empty
/// string on failure. Called once per application at submission; the result
/// is cached on the record.
pub trait TextProvider: Send + Sync {
    fn extract_text(&self, bytes: &[u8], mime_type: &str, filename: &str) -> String;
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateContextResponse {
    company_ref: String,
    job_ref: String,
}

#[derive(Deserialize)]
struct FetchMatchesResponse {
    #[serde(default)]
    results: Vec<RankedMatch>,
}

/// HTTP adapter for the scoring service.
pub struct HttpScoringClient {
    http: reqwest::Client,
    base_url: String,
}

impl HttpScoringClient {
    pub fn from_config(config: &ScoringConfig) -> Result<Self, ScoringError> {
        let mut headers = reqwest::header::HeaderMap::new();
        let mut auth = reqwest::header::HeaderValue::from_str(&format!(
            "Bearer {}",
            config.api_key
        ))
        .map_err(|err| ScoringError::Rejected(format!("invalid api key: {err}")))?;
        auth.set_sensitive(true);
        headers.insert(reqwest::header::AUTHORIZATION, auth);

        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .default_headers(headers)
            .build()
            .map_err(|err| ScoringError::Unreachable(err.to_string()))?;

        Ok(Self {
            http,
            base_url: config.endpoint.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    fn map_transport(err: reqwest::Error) -> ScoringError {
        if err.is_timeout() || err.is_connect() {
            ScoringError::Unreachable(err.to_string())
        } else if err.is_decode() {
            ScoringError::Protocol(err.to_string())
        } else {
            ScoringError::Unreachable(err.to_string())
        }
    }

    async fn post_json(
        &self,
        path: &str,
        body: serde_json::Value,
    ) -> Result<reqwest::Response, ScoringError> {
        let response = self
            .http
            .post(self.url(path))
            .json(&body)
            .send()
            .await
            .map_err(Self::map_transport)?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let detail = response.text().await.unwrap_or_default();
        let message = if detail.trim().is_empty() {
            format!("{path} returned {status}")
        } else {
            format!("{path} returned {status}: {detail}")
        };

        if status.is_client_error() {
            Err(ScoringError::Rejected(message))
        } else {
            Err(ScoringError::Unreachable(message))
        }
    }
}

#[async_trait]
impl ScoringBackend for HttpScoringClient {
    async fn create_context(
        &self,
        request: &JobContextRequest,
    ) -> Result<ScoringContext, ScoringError> {
        let response = self
            .post_json(
                "create-context",
                serde_json::to_value(request)
                    .map_err(|err| ScoringError::Protocol(err.to_string()))?,
            )
            .await?;

        let body: CreateContextResponse = response
            .json()
            .await
            .map_err(|err| ScoringError::Protocol(err.to_string()))?;

        Ok(ScoringContext {
            company_ref: body.company_ref,
            job_ref: body.job_ref,
        })
    }

    async fn index_document(
        &self,
        context: &ScoringContext,
        text: &str,
        durable_id: &ApplicationId,
    ) -> Result<(), ScoringError> {
        self.post_json(
            "index",
            json!({
                "companyRef": context.company_ref,
                "jobRef": context.job_ref,
                "resumeText": text,
                "resumeId": durable_id.0,
            }),
        )
        .await
        .map(|_| ())
    }

    async fn clear_index(&self, context: &ScoringContext) -> Result<(), ScoringError> {
        self.post_json(
            "clear-index",
            json!({
                "companyRef": context.company_ref,
                "jobRef": context.job_ref,
            }),
        )
        .await
        .map(|_| ())
    }

    async fn fetch_ranked_matches(
        &self,
        context: &ScoringContext,
    ) -> Result<Vec<RankedMatch>, ScoringError> {
        let response = self
            .post_json(
                "fetch-matches",
                json!({
                    "companyRef": context.company_ref,
                    "jobRef": context.job_ref,
                }),
            )
            .await?;

        let body: FetchMatchesResponse = response
            .json()
            .await
            .map_err(|err| ScoringError::Protocol(err.to_string()))?;

        Ok(body.results)
    }
}
