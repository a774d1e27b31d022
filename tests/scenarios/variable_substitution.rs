//! Test: Variable Substitution in step arguments, env and dir

use crate::helpers::*;
use pushdeploy::{ExecutionStatus, PipelineError};

/// Defaults resolve `${NAME}` placeholders
#[tokio::test]
async fn test_default_substitution() {
    let root = tempfile::tempdir().unwrap();
    let pipeline = pipeline_from_yaml(
        r#"
name: fetch
substitutions:
  _HUGO_VERSION: "0.96.0"
steps:
  - name: echo
    args: ["fetch v${_HUGO_VERSION}"]
"#,
    );
    let runner = MockRunner::new();
    let engine = engine(runner.clone(), root.path());

    let run = run_with(&engine, &pipeline, &[]).await;

    assert_succeeded(&run);
    assert_eq!(runner.invocations()[0].args, vec!["fetch v0.96.0"]);
}

/// Caller overrides win over defaults
#[tokio::test]
async fn test_override_wins() {
    let root = tempfile::tempdir().unwrap();
    let runner = MockRunner::new();
    let engine = engine(runner.clone(), root.path());

    let run = run_with(
        &engine,
        &hugo_pipeline(),
        &[("_HUGO_VERSION", "0.120.0"), ("PROJECT_ID", "my-site")],
    )
    .await;

    assert_succeeded(&run);
    assert_eq!(
        runner.invocations()[0].args[2],
        "https://example.com/hugo_0.120.0_Linux-64bit.tar.gz"
    );
    assert_eq!(run.context.get("_HUGO_VERSION"), Some("0.120.0"));
}

/// An undefined variable fails the run before any step executes
#[tokio::test]
async fn test_unresolved_variable_runs_nothing() {
    let root = tempfile::tempdir().unwrap();
    let runner = MockRunner::new();
    let engine = engine(runner.clone(), root.path());

    let run = run_with(&engine, &hugo_pipeline(), &[]).await;

    assert_eq!(run.status, ExecutionStatus::Failed);
    assert_eq!(
        run.error,
        Some(PipelineError::UnresolvedVariable {
            step_index: 2,
            name: "PROJECT_ID".to_string(),
        })
    );
    assert!(run.results.is_empty());
    assert!(runner.invocations().is_empty());
    assert!(run.started_at.is_none());
}

/// Substituted values are never scanned again
#[tokio::test]
async fn test_substitution_is_not_recursive() {
    let root = tempfile::tempdir().unwrap();
    let pipeline = pipeline_from_yaml(
        r#"
name: literal
substitutions:
  _MESSAGE: "${_SECRET}"
  _SECRET: hunter2
steps:
  - name: echo
    args: ["${_MESSAGE}", "cost: $$5", "$HOME"]
"#,
    );
    let runner = MockRunner::new();
    let engine = engine(runner.clone(), root.path());

    let run = run_with(&engine, &pipeline, &[]).await;

    assert_succeeded(&run);
    assert_eq!(runner.invocations()[0].args, vec!["${_SECRET}", "cost: $5", "$HOME"]);
}

/// Env values and dir are substituted too
#[tokio::test]
async fn test_env_and_dir_substitution() {
    let root = tempfile::tempdir().unwrap();
    let pipeline = pipeline_from_yaml(
        r#"
name: env
substitutions:
  _SITE: blog
steps:
  - name: hugo
    dir: sites/${_SITE}
    env: ["HUGO_ENV=${_ENV}", "SITE=${_SITE}"]
"#,
    );
    let runner = MockRunner::new();
    let engine = engine(runner.clone(), root.path());

    let run = run_with(&engine, &pipeline, &[("_ENV", "production")]).await;

    assert_succeeded(&run);
    let invocation = &runner.invocations()[0];
    assert_eq!(
        invocation.env,
        vec![
            ("HUGO_ENV".to_string(), "production".to_string()),
            ("SITE".to_string(), "blog".to_string()),
        ]
    );
    let working_dir = run.working_dir.expect("working directory recorded");
    assert_eq!(invocation.working_dir, working_dir.join("sites/blog"));
    assert!(working_dir.join("sites/blog").is_dir());
}

/// Variables without defaults are reported before running
#[test]
fn test_variables_without_default() {
    let pipeline = hugo_pipeline();
    assert_eq!(pipeline.variables_without_default(), vec!["PROJECT_ID"]);
}
