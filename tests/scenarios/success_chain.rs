//! Test: Success Chain - linear fetch / build / deploy execution

use crate::helpers::*;
use pushdeploy::{ExecutionEvent, ExecutionStatus, StepOutcome};
use std::sync::{Arc, Mutex};

/// All three steps succeed in declared order
#[tokio::test]
async fn test_success_chain() {
    let root = tempfile::tempdir().unwrap();
    let runner = MockRunner::new()
        .output("curl", 0, "", "")
        .output("hugo", 0, "Total in 412 ms\n", "")
        .output("firebase", 0, "Deploy complete!\n", "");
    let engine = engine(runner.clone(), root.path());

    let run = run_with(&engine, &hugo_pipeline(), &[("PROJECT_ID", "my-site")]).await;

    assert_succeeded(&run);
    assert_execution_order(&run, &["fetch", "build", "deploy"]);
    assert!(run.results.iter().all(|r| r.exit_code == Some(0)));
    assert_eq!(runner.programs(), vec!["curl", "hugo", "firebase"]);
    assert_eq!(run.results[1].stdout, "Total in 412 ms\n");
    assert_eq!(run.results[2].stdout, "Deploy complete!\n");
    assert_eq!(run.progress(), 1.0);
}

/// Step results carry the resolved command line and their index
#[tokio::test]
async fn test_results_record_resolved_commands() {
    let root = tempfile::tempdir().unwrap();
    let engine = engine(MockRunner::new(), root.path());

    let run = run_with(&engine, &hugo_pipeline(), &[("PROJECT_ID", "my-site")]).await;

    let deploy = &run.results[2];
    assert_eq!(deploy.index, 2);
    assert_eq!(deploy.command, vec!["firebase", "deploy", "--project=my-site"]);
    assert!(!deploy.allow_failure);
}

/// Every step runs in the run's working directory
#[tokio::test]
async fn test_steps_share_working_directory() {
    let root = tempfile::tempdir().unwrap();
    let runner = MockRunner::new();
    let engine = engine(runner.clone(), root.path());

    let run = run_with(&engine, &hugo_pipeline(), &[("PROJECT_ID", "my-site")]).await;

    let working_dir = run.working_dir.clone().expect("run should have a working directory");
    assert!(working_dir.starts_with(root.path()));
    assert!(runner.invocations().iter().all(|i| i.working_dir == working_dir));
}

/// Same spec and context twice gives the same statuses
#[tokio::test]
async fn test_repeat_runs_are_deterministic() {
    let root = tempfile::tempdir().unwrap();
    let engine = engine(MockRunner::new().exit_with("firebase", 1), root.path());
    let pipeline = hugo_pipeline();

    let first = run_with(&engine, &pipeline, &[("PROJECT_ID", "my-site")]).await;
    let second = run_with(&engine, &pipeline, &[("PROJECT_ID", "my-site")]).await;

    assert_ne!(first.run_id, second.run_id);
    assert_eq!(first.status, second.status);
    let outcomes = |run: &pushdeploy::PipelineRun| {
        run.results
            .iter()
            .map(|r| (r.outcome, r.exit_code))
            .collect::<Vec<_>>()
    };
    assert_eq!(outcomes(&first), outcomes(&second));
}

/// Console events arrive in run order
#[tokio::test]
async fn test_events_follow_execution() {
    let root = tempfile::tempdir().unwrap();
    let engine = engine(MockRunner::new(), root.path());
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    engine
        .add_event_handler(move |event| sink.lock().unwrap().push(event))
        .await;

    let run = run_with(&engine, &hugo_pipeline(), &[("PROJECT_ID", "my-site")]).await;

    let events = events.lock().unwrap();
    assert_eq!(events.len(), 8);
    assert!(matches!(
        &events[0],
        ExecutionEvent::PipelineStarted { total_steps: 3, .. }
    ));
    assert!(matches!(
        &events[2],
        ExecutionEvent::StepFinished { result, .. } if result.outcome == StepOutcome::Succeeded
    ));
    assert!(matches!(
        &events[7],
        ExecutionEvent::PipelineFinished { run_id, status: ExecutionStatus::Succeeded, error: None }
            if *run_id == run.run_id
    ));
}
