//! Test: Trigger matching and push-driven runs

use crate::helpers::*;
use pushdeploy::execution::{EngineConfig, ExecutionEngine};
use pushdeploy::{ExecutionStatus, PushEvent, TriggerError, TriggerListener, TriggerOutcome, TriggerRule};
use std::path::{Path, PathBuf};
use std::sync::Arc;

const PIPELINE: &str = r#"
name: hugo-site
substitutions:
  _HUGO_VERSION: "0.96.0"
  _CHANNEL: live
steps:
  - id: build
    name: hugo
    args: ["--baseURL=https://${_CHANNEL}.example.com"]
  - id: deploy
    name: firebase
    args: ["deploy", "--project=${PROJECT_ID}", "--message=${BRANCH_NAME}@${SHORT_SHA}"]
"#;

fn write_pipeline(dir: &Path) -> PathBuf {
    let path = dir.join("cloudbuild.yaml");
    std::fs::write(&path, PIPELINE).unwrap();
    path
}

fn listener(root: &Path, runner: MockRunner, rules: Vec<TriggerRule>) -> TriggerListener<MockRunner> {
    let engine = ExecutionEngine::new(runner, EngineConfig::new().with_workspace_root(root.join("work")));
    TriggerListener::new(Arc::new(engine), rules).unwrap()
}

/// `main` matches only the branch named exactly main
#[tokio::test]
async fn test_anchored_branch_match() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = write_pipeline(dir.path());
    let runner = MockRunner::new();
    let listener = listener(
        dir.path(),
        runner.clone(),
        vec![TriggerRule::new("deploy-main", "main", pipeline, "my-site")],
    );

    for branch in ["main-2", "feature/main", "MAIN"] {
        let outcome = listener.handle_push(&PushEvent::new(branch, "abc1234")).await.unwrap();
        assert!(matches!(outcome, TriggerOutcome::Ignored), "{} should be ignored", branch);
    }
    assert!(runner.invocations().is_empty());

    let outcome = listener.handle_push(&PushEvent::new("main", "abc1234")).await.unwrap();
    assert!(matches!(outcome, TriggerOutcome::Fired { ref rule, .. } if rule == "deploy-main"));
}

/// Built-ins beat rule substitutions, which beat pipeline defaults
#[tokio::test]
async fn test_context_precedence() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = write_pipeline(dir.path());
    let runner = MockRunner::new();
    let rule = TriggerRule::new("preview", "feature/.*", pipeline, "my-site-preview")
        .with_substitution("_CHANNEL", "preview")
        .with_substitution("PROJECT_ID", "ignored-by-builtins");
    let listener = listener(dir.path(), runner.clone(), vec![rule]);

    let outcome = listener
        .handle_push(&PushEvent::new("feature/login", "9f8e7d6c5b4a3210"))
        .await
        .unwrap();

    let TriggerOutcome::Fired { run, .. } = outcome else {
        panic!("expected the preview trigger to fire");
    };
    assert_succeeded(&run);
    assert_eq!(run.trigger.as_deref(), Some("preview"));
    assert_eq!(run.build_id(), Some("9f8e7d6c5b4a3210"));
    assert_eq!(run.context.get("_HUGO_VERSION"), Some("0.96.0"));
    assert_eq!(run.context.get("TRIGGER_NAME"), Some("preview"));

    let invocations = runner.invocations();
    assert_eq!(invocations[0].args, vec!["--baseURL=https://preview.example.com"]);
    assert_eq!(
        invocations[1].args,
        vec!["deploy", "--project=my-site-preview", "--message=feature/login@9f8e7d6"]
    );
}

/// Overlapping rules refuse to pick one
#[tokio::test]
async fn test_ambiguous_match() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = write_pipeline(dir.path());
    let runner = MockRunner::new();
    let listener = listener(
        dir.path(),
        runner.clone(),
        vec![
            TriggerRule::new("releases", "release/.*", &pipeline, "prod"),
            TriggerRule::new("release-1x", "release/1\\..*", &pipeline, "prod"),
        ],
    );

    let err = listener
        .handle_push(&PushEvent::new("release/1.4", "abc"))
        .await
        .unwrap_err();
    match err {
        TriggerError::Ambiguous { branch, rules } => {
            assert_eq!(branch, "release/1.4");
            assert_eq!(rules, vec!["releases", "release-1x"]);
        }
        other => panic!("expected ambiguity, got {}", other),
    }
    assert!(runner.invocations().is_empty());

    let outcome = listener.handle_push(&PushEvent::new("release/2.0", "abc")).await.unwrap();
    assert!(matches!(outcome, TriggerOutcome::Fired { ref rule, .. } if rule == "releases"));
}

/// A failing deploy still reports the fired rule with a failed run
#[tokio::test]
async fn test_fired_run_can_fail() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = write_pipeline(dir.path());
    let listener = listener(
        dir.path(),
        MockRunner::new().exit_with("firebase", 1),
        vec![TriggerRule::new("deploy-main", "main", pipeline, "my-site")],
    );

    let outcome = listener.handle_push(&PushEvent::new("main", "abc")).await.unwrap();

    let TriggerOutcome::Fired { run, .. } = outcome else {
        panic!("expected the trigger to fire");
    };
    assert_eq!(run.status, ExecutionStatus::Failed);
    assert_eq!(run.results.len(), 2);
}

/// A broken pipeline file is a trigger error, not a run
#[tokio::test]
async fn test_invalid_pipeline_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cloudbuild.yaml");
    std::fs::write(&path, "steps: []\n").unwrap();
    let listener = listener(
        dir.path(),
        MockRunner::new(),
        vec![TriggerRule::new("deploy-main", "main", path, "my-site")],
    );

    let err = listener.handle_push(&PushEvent::new("main", "abc")).await.unwrap_err();
    assert!(matches!(err, TriggerError::Pipeline { .. }));
}
