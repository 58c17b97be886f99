//! Pure rule evaluation of a candidate profile against a job's eligibility
//! rule set. Every rule is evaluated independently so the report names all
//! failures at once instead of stopping at the first.

use serde::Serialize;

use super::domain::{CandidateProfile, EligibilityRuleSet};

pub const RULE_EDUCATION: &str = "educationLevel";
pub const RULE_EXPERIENCE: &str = "experienceYears";
pub const RULE_SPECIALIZATION: &str = "specialization";
pub const RULE_QUALIFICATION: &str = "qualification";
pub const RULE_CUSTOM: &str = "customCriteria";

/// Outcome of an eligibility check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EligibilityReport {
    pub eligible: bool,
    pub failed_rules: Vec<String>,
    /// Informational only, set when the job has no criteria configured.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// Evaluate `profile` against `rules`. Pure function; failures accumulate.
pub fn evaluate(rules: &EligibilityRuleSet, profile: &CandidateProfile) -> EligibilityReport {
    if !has_criteria(rules) {
        return EligibilityReport {
            eligible: true,
            failed_rules: Vec::new(),
            note: Some("no eligibility criteria configured for this job".to_string()),
        };
    }

    let mut failed_rules = Vec::new();

    if !education_passes(rules, profile) {
        failed_rules.push(RULE_EDUCATION.to_string());
    }
    if !experience_passes(rules, profile) {
        failed_rules.push(RULE_EXPERIENCE.to_string());
    }
    if !exact_match_passes(
        rules.required_specialization.as_deref(),
        profile.specialization.as_deref(),
    ) {
        failed_rules.push(RULE_SPECIALIZATION.to_string());
    }
    if !exact_match_passes(
        rules.required_qualification.as_deref(),
        profile.qualification.as_deref(),
    ) {
        failed_rules.push(RULE_QUALIFICATION.to_string());
    }
    if !custom_criteria_pass(rules, profile) {
        failed_rules.push(RULE_CUSTOM.to_string());
    }

    EligibilityReport {
        eligible: failed_rules.is_empty(),
        failed_rules,
        note: None,
    }
}

fn has_criteria(rules: &EligibilityRuleSet) -> bool {
    !rules.accepted_education.is_empty()
        || rules.min_experience_years.is_some()
        || rules
            .required_specialization
            .as_deref()
            .is_some_and(|value| !value.trim().is_empty())
        || rules
            .required_qualification
            .as_deref()
            .is_some_and(|value| !value.trim().is_empty())
        || !rules.custom_criteria.is_empty()
}

/// Passes when the candidate's rank meets or exceeds any one accepted level.
fn education_passes(rules: &EligibilityRuleSet, profile: &CandidateProfile) -> bool {
    if rules.accepted_education.is_empty() {
        return true;
    }
    match profile.education_level {
        Some(level) => rules
            .accepted_education
            .iter()
            .any(|accepted| level >= *accepted),
        None => false,
    }
}

/// Missing or non-numeric experience fails a configured minimum.
fn experience_passes(rules: &EligibilityRuleSet, profile: &CandidateProfile) -> bool {
    match rules.min_experience_years {
        None => true,
        Some(minimum) => match profile.experience_years {
            Some(years) if years.is_finite() => years >= minimum,
            _ => false,
        },
    }
}

/// Exact case-insensitive comparison; an empty rule auto-passes.
fn exact_match_passes(required: Option<&str>, provided: Option<&str>) -> bool {
    match required {
        None => true,
        Some(required) if required.trim().is_empty() => true,
        Some(required) => provided
            .is_some_and(|value| value.trim().eq_ignore_ascii_case(required.trim())),
    }
}

/// All-or-nothing: every criterion index must be acknowledged.
fn custom_criteria_pass(rules: &EligibilityRuleSet, profile: &CandidateProfile) -> bool {
    (0..rules.custom_criteria.len()).all(|index| profile.acknowledged_criteria.contains(&index))
}
