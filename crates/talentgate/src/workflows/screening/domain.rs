use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Durable identifier for a candidate application. This is the only key ever
/// sent to the scoring service for the application's document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ApplicationId(pub String);

/// Identifier wrapper for job postings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(pub String);

/// Identifier wrapper for candidates.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CandidateId(pub String);

impl std::fmt::Display for ApplicationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque reference pair handed back by the scoring service when a job
/// context is created. Stored on the posting and reused for every later call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoringContext {
    pub company_ref: String,
    pub job_ref: String,
}

/// Skill lists arrive either as arrays or as comma/semicolon-delimited
/// strings depending on the upstream form. Normalization happens once at the
/// scoring boundary so external calls always see the canonical shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SkillList {
    Listed(Vec<String>),
    Delimited(String),
}

impl SkillList {
    /// Canonical form: lowercase, trimmed, order-preserving, deduplicated.
    pub fn normalized(&self) -> Vec<String> {
        let raw: Vec<String> = match self {
            SkillList::Listed(items) => items.clone(),
            SkillList::Delimited(joined) => joined
                .split([',', ';'])
                .map(|item| item.to_string())
                .collect(),
        };

        let mut seen = BTreeSet::new();
        let mut normalized = Vec::new();
        for item in raw {
            let skill = item.trim().to_lowercase();
            if skill.is_empty() {
                continue;
            }
            if seen.insert(skill.clone()) {
                normalized.push(skill);
            }
        }
        normalized
    }
}

impl Default for SkillList {
    fn default() -> Self {
        SkillList::Listed(Vec::new())
    }
}

/// Lifecycle status of a posting. Eligibility rules are mutable until closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Open,
    Closed,
}

/// Job posting snapshot used by the screening workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobPosting {
    pub job_id: JobId,
    pub title: String,
    pub status: JobStatus,
    #[serde(default)]
    pub required_skills: SkillList,
    #[serde(default)]
    pub preferred_skills: SkillList,
    pub eligibility: EligibilityRuleSet,
    pub scoring_context: Option<ScoringContext>,
}

/// Ordered education ranks. A higher rank always satisfies a lower one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EducationLevel {
    HighSchool,
    Diploma,
    Bachelors,
    Masters,
    Phd,
}

impl EducationLevel {
    pub const fn label(self) -> &'static str {
        match self {
            EducationLevel::HighSchool => "high_school",
            EducationLevel::Diploma => "diploma",
            EducationLevel::Bachelors => "bachelors",
            EducationLevel::Masters => "masters",
            EducationLevel::Phd => "phd",
        }
    }
}

/// Job-defined gate a candidate profile is checked against. Every field is
/// optional; an unconfigured rule auto-passes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EligibilityRuleSet {
    /// Accepted minimum levels; a candidate passes by meeting any one.
    #[serde(default)]
    pub accepted_education: Vec<EducationLevel>,
    pub min_experience_years: Option<f32>,
    pub required_specialization: Option<String>,
    pub required_qualification: Option<String>,
    /// Free-form criteria, each requiring explicit per-index acknowledgment.
    #[serde(default)]
    pub custom_criteria: Vec<String>,
}

/// Candidate-supplied facts evaluated against an [`EligibilityRuleSet`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CandidateProfile {
    pub education_level: Option<EducationLevel>,
    pub experience_years: Option<f32>,
    pub specialization: Option<String>,
    pub qualification: Option<String>,
    /// Indices into the job's custom criteria the candidate acknowledged.
    #[serde(default)]
    pub acknowledged_criteria: BTreeSet<usize>,
}

/// Component scores returned by the scoring service alongside the total.
/// Field names follow the scoring wire format so the struct can be flattened
/// straight out of a ranked match.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreBreakdown {
    pub semantic_score: Option<f32>,
    pub skill_score: Option<f32>,
    pub experience_score: Option<f32>,
    pub metrics_score: Option<f32>,
    pub complexity_score: Option<f32>,
    #[serde(default)]
    pub matched_skills: Vec<String>,
    #[serde(default)]
    pub missing_skills: Vec<String>,
}

/// Hiring workflow stage. The chain below is ordered; `Rejected` is an
/// absorbing sink reachable from any stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Screening,
    Assessment,
    Interview,
    Offer,
    Hired,
    Rejected,
}

impl PipelineStage {
    /// The forward-moving chain, excluding the rejected sink.
    pub const ORDERED: [PipelineStage; 5] = [
        PipelineStage::Screening,
        PipelineStage::Assessment,
        PipelineStage::Interview,
        PipelineStage::Offer,
        PipelineStage::Hired,
    ];

    pub const fn label(self) -> &'static str {
        match self {
            PipelineStage::Screening => "screening",
            PipelineStage::Assessment => "assessment",
            PipelineStage::Interview => "interview",
            PipelineStage::Offer => "offer",
            PipelineStage::Hired => "hired",
            PipelineStage::Rejected => "rejected",
        }
    }

    pub fn from_label(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "screening" => Some(PipelineStage::Screening),
            "assessment" => Some(PipelineStage::Assessment),
            "interview" => Some(PipelineStage::Interview),
            "offer" => Some(PipelineStage::Offer),
            "hired" => Some(PipelineStage::Hired),
            "rejected" => Some(PipelineStage::Rejected),
            _ => None,
        }
    }
}

/// A candidate's application to a specific posting.
///
/// Score fields are mutated only by the reconciliation engine and the stage
/// only by the pipeline state machine. Records are never hard-deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateApplication {
    pub application_id: ApplicationId,
    pub candidate_id: CandidateId,
    pub job_id: JobId,
    /// Extracted document text, cached once at submission.
    pub resume_text: Option<String>,
    /// 0-100 once processed.
    pub score: Option<u8>,
    pub breakdown: Option<ScoreBreakdown>,
    pub processed: bool,
    pub processed_at: Option<DateTime<Utc>>,
    pub stage: PipelineStage,
    pub deleted: bool,
    /// Diagnostic from a prior failed cycle, cleared on attribution.
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CandidateApplication {
    /// Fresh record for a submitted application.
    pub fn submitted(
        application_id: ApplicationId,
        candidate_id: CandidateId,
        job_id: JobId,
        resume_text: Option<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            application_id,
            candidate_id,
            job_id,
            resume_text,
            score: None,
            breakdown: None,
            processed: false,
            processed_at: None,
            stage: PipelineStage::Screening,
            deleted: false,
            error: None,
            created_at,
            updated_at: created_at,
        }
    }
}
