use std::time::Duration;

use crate::workflows::screening::domain::{ApplicationId, CandidateProfile, EducationLevel, JobId, PipelineStage};
use crate::workflows::screening::runs::{RunId, RunStatus};
use crate::workflows::screening::service::ScreeningServiceError;

use super::common::*;

#[tokio::test]
async fn start_run_snapshots_the_job_and_completes_in_the_background() {
    let harness = harness_with(
        posting(),
        vec![application("1", 0), application("2", 10)],
        FakeScoringBackend::returning(vec![
            ranked(Some("app-1"), None, 61.0),
            ranked(Some("app-2"), None, 77.0),
        ]),
    );

    let receipt = harness
        .service
        .start_run(&job_id(), None)
        .await
        .expect("run accepted");
    assert_eq!(receipt.total, 2);

    let run = wait_for_terminal(&harness.runs, &receipt.run_id).await;
    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.processed, 2);

    let scored = harness
        .applications
        .stored(&ApplicationId("app-2".to_string()));
    assert_eq!(scored.score, Some(77));
}

#[tokio::test]
async fn start_run_rejects_unknown_jobs() {
    let harness = harness_with(posting(), Vec::new(), FakeScoringBackend::timing_out());

    match harness
        .service
        .start_run(&JobId("job-ghost".to_string()), None)
        .await
    {
        Err(ScreeningServiceError::UnknownJob(id)) => assert_eq!(id.0, "job-ghost"),
        other => panic!("expected unknown job, got {other:?}"),
    }
}

#[tokio::test]
async fn concurrent_runs_for_one_job_are_refused() {
    let harness = harness_with(
        posting(),
        vec![application("1", 0)],
        FakeScoringBackend::scripted(FetchScript::Stalled(
            Duration::from_millis(150),
            vec![ranked(Some("app-1"), None, 50.0)],
        )),
    );

    let receipt = harness
        .service
        .start_run(&job_id(), None)
        .await
        .expect("first run accepted");

    match harness.service.start_run(&job_id(), None).await {
        Err(ScreeningServiceError::RunInProgress(id)) => assert_eq!(id, job_id()),
        other => panic!("expected in-progress refusal, got {other:?}"),
    }

    // Once the first run settles the job is available again.
    let run = wait_for_terminal(&harness.runs, &receipt.run_id).await;
    assert_eq!(run.status, RunStatus::Completed);
    let second = harness.service.start_run(&job_id(), None).await;
    assert!(second.is_ok(), "lock released after terminal run");
}

#[tokio::test]
async fn start_run_creates_a_missing_scoring_context_before_spawning() {
    let harness = harness_with(
        posting_without_context(),
        vec![application("1", 0)],
        FakeScoringBackend::returning(vec![ranked(Some("app-1"), None, 45.0)]),
    );

    let receipt = harness
        .service
        .start_run(&job_id(), None)
        .await
        .expect("run accepted");
    wait_for_terminal(&harness.runs, &receipt.run_id).await;

    assert_eq!(harness.backend.contexts_created(), 1);
    let stored = harness.jobs.context_of(&job_id()).expect("context persisted");
    assert_eq!(stored.job_ref, "ctx-job-1");
}

#[tokio::test]
async fn explicit_application_ids_are_scoped_to_the_job() {
    let mut foreign = application("foreign", 30);
    foreign.job_id = JobId("job-2".to_string());

    let harness = harness_with(
        posting(),
        vec![application("1", 0), application("2", 10), foreign],
        FakeScoringBackend::returning(vec![ranked(Some("app-1"), None, 52.0)]),
    );

    let receipt = harness
        .service
        .start_run(
            &job_id(),
            Some(vec![
                ApplicationId("app-1".to_string()),
                ApplicationId("app-foreign".to_string()),
                ApplicationId("app-unknown".to_string()),
            ]),
        )
        .await
        .expect("run accepted");

    assert_eq!(receipt.total, 1, "foreign and unknown ids are filtered out");
    let run = wait_for_terminal(&harness.runs, &receipt.run_id).await;
    assert_eq!(run.status, RunStatus::Completed);
}

#[tokio::test]
async fn repeated_application_ids_collapse_to_one_snapshot_entry() {
    let harness = harness_with(
        posting(),
        vec![application("1", 0)],
        FakeScoringBackend::returning(vec![
            ranked(Some("app-1"), None, 90.0),
            ranked(None, Some(0), 55.0),
        ]),
    );

    let receipt = harness
        .service
        .start_run(
            &job_id(),
            Some(vec![
                ApplicationId("app-1".to_string()),
                ApplicationId("app-1".to_string()),
            ]),
        )
        .await
        .expect("run accepted");
    assert_eq!(receipt.total, 1, "the repeated id counts once");

    let run = wait_for_terminal(&harness.runs, &receipt.run_id).await;
    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.processed, 1);
    assert_eq!(
        run.dropped_matches, 1,
        "the positional match lands on the already-scored application"
    );

    let scored = harness
        .applications
        .stored(&ApplicationId("app-1".to_string()));
    assert_eq!(scored.score, Some(90), "the durable-id score is kept");
}

#[tokio::test]
async fn failed_fetch_surfaces_through_run_progress() {
    let harness = harness_with(
        posting(),
        vec![application("1", 0)],
        FakeScoringBackend::timing_out(),
    );

    let receipt = harness
        .service
        .start_run(&job_id(), None)
        .await
        .expect("run accepted");
    wait_for_terminal(&harness.runs, &receipt.run_id).await;

    let progress = harness
        .service
        .run_progress(&receipt.run_id)
        .expect("progress available");
    assert_eq!(progress.status, "failed");
    assert!(progress.error.is_some());
}

#[tokio::test]
async fn run_progress_rejects_unknown_runs() {
    let harness = harness_with(posting(), Vec::new(), FakeScoringBackend::timing_out());

    match harness.service.run_progress(&RunId::generate()) {
        Err(ScreeningServiceError::UnknownRun(_)) => {}
        other => panic!("expected unknown run, got {other:?}"),
    }
}

#[tokio::test]
async fn stale_runs_reports_long_running_records() {
    use crate::workflows::screening::runs::RunStore;

    let harness = harness_with(posting(), Vec::new(), FakeScoringBackend::timing_out());
    harness.runs.create(&job_id(), 4).expect("run created");

    let stale = harness
        .service
        .stale_runs(chrono::Duration::zero())
        .expect("query succeeds");
    assert_eq!(stale.len(), 1);

    let stale = harness
        .service
        .stale_runs(chrono::Duration::hours(1))
        .expect("query succeeds");
    assert!(stale.is_empty());
}

#[tokio::test]
async fn eligibility_is_evaluated_against_the_job_rules() {
    let harness = harness_with(posting(), Vec::new(), FakeScoringBackend::timing_out());

    let strong = CandidateProfile {
        education_level: Some(EducationLevel::Masters),
        experience_years: Some(4.0),
        ..CandidateProfile::default()
    };
    let report = harness
        .service
        .evaluate_eligibility(&job_id(), &strong)
        .expect("evaluation succeeds");
    assert!(report.eligible);

    let junior = CandidateProfile {
        education_level: Some(EducationLevel::Bachelors),
        experience_years: Some(0.5),
        ..CandidateProfile::default()
    };
    let report = harness
        .service
        .evaluate_eligibility(&job_id(), &junior)
        .expect("evaluation succeeds");
    assert_eq!(report.failed_rules, vec!["experienceYears".to_string()]);
}

#[tokio::test]
async fn stage_changes_flow_through_the_service() {
    let harness = harness_with(
        posting(),
        vec![application("1", 0), application("2", 10)],
        FakeScoringBackend::timing_out(),
    );

    let outcome = harness
        .service
        .advance_stage(
            &[ApplicationId("app-1".to_string())],
            PipelineStage::Assessment,
        )
        .expect("advance succeeds");
    assert_eq!(outcome.advanced_count, 1);

    harness
        .service
        .reject(&[ApplicationId("app-2".to_string())])
        .expect("reject succeeds");

    let assessment = harness
        .service
        .list_stage(&job_id(), PipelineStage::Assessment)
        .expect("listing succeeds");
    assert_eq!(assessment.len(), 1);

    let rejected = harness
        .service
        .list_stage(&job_id(), PipelineStage::Rejected)
        .expect("listing succeeds");
    assert_eq!(rejected.len(), 1);
    assert_eq!(harness.notifications.notices().len(), 2);
}
