//! Test utility functions for pipeline scenarios

use async_trait::async_trait;
use pushdeploy::core::config::PipelineConfig;
use pushdeploy::execution::{EngineConfig, ExecutionEngine};
use pushdeploy::process::{Invocation, ProcessError, ProcessOutput, ProcessRunner};
use pushdeploy::{ExecutionStatus, Pipeline, PipelineRun, StepOutcome};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Scripted result for one program
#[derive(Debug, Clone)]
pub enum MockOutcome {
    Exit {
        code: i32,
        stdout: String,
        stderr: String,
    },
    TimedOut {
        partial_stdout: String,
    },
    NotFound,
}

/// Side effect run when a program is invoked
pub type Hook = Arc<dyn Fn(&Invocation) + Send + Sync>;

#[derive(Default)]
struct MockState {
    outcomes: HashMap<String, MockOutcome>,
    hooks: HashMap<String, Hook>,
    invocations: Vec<Invocation>,
}

/// Process runner with scripted outcomes keyed by program name
///
/// Programs without a script exit 0 with no output. Clones share state, so
/// a test can keep a handle after moving the runner into an engine.
#[derive(Clone, Default)]
pub struct MockRunner {
    state: Arc<Mutex<MockState>>,
}

impl MockRunner {
    pub fn new() -> Self {
        Self::default()
    }

    fn script(self, program: &str, outcome: MockOutcome) -> Self {
        self.state
            .lock()
            .unwrap()
            .outcomes
            .insert(program.to_string(), outcome);
        self
    }

    pub fn exit_with(self, program: &str, code: i32) -> Self {
        self.script(
            program,
            MockOutcome::Exit {
                code,
                stdout: String::new(),
                stderr: String::new(),
            },
        )
    }

    pub fn output(self, program: &str, code: i32, stdout: &str, stderr: &str) -> Self {
        self.script(
            program,
            MockOutcome::Exit {
                code,
                stdout: stdout.to_string(),
                stderr: stderr.to_string(),
            },
        )
    }

    pub fn time_out(self, program: &str, partial_stdout: &str) -> Self {
        self.script(
            program,
            MockOutcome::TimedOut {
                partial_stdout: partial_stdout.to_string(),
            },
        )
    }

    pub fn not_found(self, program: &str) -> Self {
        self.script(program, MockOutcome::NotFound)
    }

    pub fn on_run<F>(self, program: &str, hook: F) -> Self
    where
        F: Fn(&Invocation) + Send + Sync + 'static,
    {
        self.state
            .lock()
            .unwrap()
            .hooks
            .insert(program.to_string(), Arc::new(hook));
        self
    }

    /// Every invocation received, in order
    pub fn invocations(&self) -> Vec<Invocation> {
        self.state.lock().unwrap().invocations.clone()
    }

    /// Programs invoked, in order
    pub fn programs(&self) -> Vec<String> {
        self.invocations().into_iter().map(|i| i.program).collect()
    }
}

#[async_trait]
impl ProcessRunner for MockRunner {
    async fn run(&self, invocation: &Invocation, _timeout: Duration) -> Result<ProcessOutput, ProcessError> {
        let (outcome, hook) = {
            let mut state = self.state.lock().unwrap();
            state.invocations.push(invocation.clone());
            (
                state.outcomes.get(&invocation.program).cloned(),
                state.hooks.get(&invocation.program).cloned(),
            )
        };

        if let Some(hook) = hook {
            hook(invocation);
        }

        match outcome {
            None => Ok(ProcessOutput::exited(0)),
            Some(MockOutcome::Exit { code, stdout, stderr }) => Ok(ProcessOutput::exited(code)
                .with_stdout(stdout)
                .with_stderr(stderr)),
            Some(MockOutcome::TimedOut { partial_stdout }) => Ok(ProcessOutput {
                stdout: partial_stdout,
                timed_out: true,
                ..ProcessOutput::default()
            }),
            Some(MockOutcome::NotFound) => Err(ProcessError::Spawn {
                program: invocation.program.clone(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "No such file or directory"),
            }),
        }
    }
}

/// Parse a pipeline from YAML string
pub fn pipeline_from_yaml(yaml: &str) -> Pipeline {
    PipelineConfig::from_yaml(yaml)
        .expect("pipeline YAML should parse")
        .to_pipeline()
        .expect("pipeline should convert")
}

/// The fetch / build / deploy pipeline most scenarios use
pub fn hugo_pipeline() -> Pipeline {
    pipeline_from_yaml(
        r#"
name: hugo-site
substitutions:
  _HUGO_VERSION: "0.96.0"
steps:
  - id: fetch
    name: curl
    args: ["-sSLo", "hugo.tar.gz", "https://example.com/hugo_${_HUGO_VERSION}_Linux-64bit.tar.gz"]
  - id: build
    name: hugo
    args: ["--minify"]
  - id: deploy
    name: firebase
    args: ["deploy", "--project=${PROJECT_ID}"]
"#,
    )
}

/// Engine with workspaces under `root`
pub fn engine(runner: MockRunner, root: &Path) -> ExecutionEngine<MockRunner> {
    ExecutionEngine::new(runner, EngineConfig::new().with_workspace_root(root))
}

/// Run with pipeline defaults plus `overrides` and no cancellation
pub async fn run_with(
    engine: &ExecutionEngine<MockRunner>,
    pipeline: &Pipeline,
    overrides: &[(&str, &str)],
) -> PipelineRun {
    let context = pipeline.context_with(overrides.iter().map(|(k, v)| (k.to_string(), v.to_string())));
    engine
        .run(pipeline, context, Arc::new(AtomicBool::new(false)))
        .await
}

pub fn assert_succeeded(run: &PipelineRun) {
    assert_eq!(
        run.status,
        ExecutionStatus::Succeeded,
        "expected success, got {:?} with error {:?}",
        run.status,
        run.error
    );
    assert!(run.error.is_none());
}

pub fn assert_failed(run: &PipelineRun) {
    assert_eq!(run.status, ExecutionStatus::Failed, "expected failure, got {:?}", run.status);
    assert!(run.error.is_some(), "failed run should carry an error");
}

/// Assert the outcome of a recorded step
pub fn assert_step_outcome(run: &PipelineRun, step_id: &str, expected: StepOutcome) {
    let result = run
        .results
        .iter()
        .find(|r| r.step_id == step_id)
        .unwrap_or_else(|| panic!("step '{}' was not executed", step_id));
    assert_eq!(
        result.outcome, expected,
        "step '{}' outcome: expected {:?}, got {:?}",
        step_id, expected, result.outcome
    );
}

/// Assert recorded steps, in order
pub fn assert_execution_order(run: &PipelineRun, expected: &[&str]) {
    let actual: Vec<&str> = run.results.iter().map(|r| r.step_id.as_str()).collect();
    assert_eq!(actual, expected, "execution order mismatch");
}
