//! Test: Failure Handling - fail-fast, best-effort steps and timeouts

use crate::helpers::*;
use pushdeploy::{PipelineError, StepOutcome};

/// A failing build stops the run before deploy
#[tokio::test]
async fn test_failure_stops_remaining_steps() {
    let root = tempfile::tempdir().unwrap();
    let runner = MockRunner::new().output("hugo", 1, "", "Error: template not found\n");
    let engine = engine(runner.clone(), root.path());

    let run = run_with(&engine, &hugo_pipeline(), &[("PROJECT_ID", "my-site")]).await;

    assert_failed(&run);
    assert_execution_order(&run, &["fetch", "build"]);
    assert_step_outcome(&run, "build", StepOutcome::Failed);
    assert_eq!(run.results[1].stderr, "Error: template not found\n");
    assert_eq!(
        run.error,
        Some(PipelineError::StepFailed {
            step_index: 1,
            step_id: "build".to_string(),
            exit_code: Some(1),
        })
    );
    assert!(!runner.programs().contains(&"firebase".to_string()));
}

/// A failing first step leaves exactly one result
#[tokio::test]
async fn test_first_step_failure() {
    let root = tempfile::tempdir().unwrap();
    let runner = MockRunner::new().exit_with("curl", 22);
    let engine = engine(runner.clone(), root.path());

    let run = run_with(&engine, &hugo_pipeline(), &[("PROJECT_ID", "my-site")]).await;

    assert_failed(&run);
    assert_eq!(run.results.len(), 1);
    assert_eq!(run.error.as_ref().and_then(|e| e.step_index()), Some(0));
    assert_eq!(runner.programs(), vec!["curl"]);
}

/// A best-effort failure is recorded and later steps still run
#[tokio::test]
async fn test_allow_failure_continues() {
    let root = tempfile::tempdir().unwrap();
    let pipeline = pipeline_from_yaml(
        r#"
name: best-effort
steps:
  - id: warm-cache
    name: curl
    allowFailure: true
  - id: build
    name: hugo
"#,
    );
    let engine = engine(MockRunner::new().exit_with("curl", 7), root.path());

    let run = run_with(&engine, &pipeline, &[]).await;

    assert_succeeded(&run);
    assert_execution_order(&run, &["warm-cache", "build"]);
    assert_step_outcome(&run, "warm-cache", StepOutcome::Failed);
    assert!(run.results[0].allow_failure);
    assert_eq!(run.failed_steps().count(), 1);
}

/// A timed-out step is reported with the step's own timeout
#[tokio::test]
async fn test_step_timeout() {
    let root = tempfile::tempdir().unwrap();
    let pipeline = pipeline_from_yaml(
        r#"
name: slow-fetch
timeout: 10m
steps:
  - id: fetch
    name: curl
    timeout: 2m
  - id: build
    name: hugo
"#,
    );
    let runner = MockRunner::new().time_out("curl", "  3%  downloading\n");
    let engine = engine(runner.clone(), root.path());

    let run = run_with(&engine, &pipeline, &[]).await;

    assert_failed(&run);
    assert_step_outcome(&run, "fetch", StepOutcome::TimedOut);
    assert_eq!(run.results[0].exit_code, None);
    assert_eq!(run.results[0].stdout, "  3%  downloading\n");
    assert_eq!(
        run.error,
        Some(PipelineError::StepTimeout {
            step_index: 0,
            step_id: "fetch".to_string(),
            timeout_secs: 120,
        })
    );
    assert_eq!(runner.programs(), vec!["curl"]);
}

/// Steps without their own timeout fall back to the pipeline timeout
#[tokio::test]
async fn test_pipeline_timeout_fallback() {
    let root = tempfile::tempdir().unwrap();
    let pipeline = pipeline_from_yaml(
        r#"
name: slow-build
timeout: 10m
steps:
  - name: hugo
"#,
    );
    let engine = engine(MockRunner::new().time_out("hugo", ""), root.path());

    let run = run_with(&engine, &pipeline, &[]).await;

    assert!(matches!(
        run.error,
        Some(PipelineError::StepTimeout { timeout_secs: 600, ref step_id, .. }) if step_id == "step-0"
    ));
}

/// A missing executable fails the step with no exit code
#[tokio::test]
async fn test_missing_tool() {
    let root = tempfile::tempdir().unwrap();
    let engine = engine(MockRunner::new().not_found("hugo"), root.path());

    let run = run_with(&engine, &hugo_pipeline(), &[("PROJECT_ID", "my-site")]).await;

    assert_failed(&run);
    assert_step_outcome(&run, "build", StepOutcome::Failed);
    assert_eq!(run.results[1].exit_code, None);
    assert!(run.results[1].stderr.contains("failed to launch 'hugo'"));
    assert_eq!(
        run.error,
        Some(PipelineError::StepFailed {
            step_index: 1,
            step_id: "build".to_string(),
            exit_code: None,
        })
    );
}

/// A working directory is kept after a failure
#[tokio::test]
async fn test_working_directory_survives_failure() {
    let root = tempfile::tempdir().unwrap();
    let engine = engine(MockRunner::new().exit_with("hugo", 1), root.path());

    let run = run_with(&engine, &hugo_pipeline(), &[("PROJECT_ID", "my-site")]).await;

    assert_failed(&run);
    let dir = run.working_dir.expect("working directory recorded");
    assert!(dir.is_dir());
}
