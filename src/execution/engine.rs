//! Main execution engine - orchestrates the entire pipeline run

use crate::{
    core::{
        ExecutionStatus, Pipeline, PipelineError, PipelineRun, ResolvedStep, StepOutcome, StepResult,
        SubstitutionContext,
    },
    execution::{EngineConfig, StepExecutor, Workspace},
    process::ProcessRunner,
};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Events that can occur during pipeline execution
#[derive(Debug, Clone)]
pub enum ExecutionEvent {
    PipelineStarted {
        run_id: Uuid,
        pipeline_name: String,
        total_steps: usize,
        working_dir: PathBuf,
    },
    StepStarted {
        run_id: Uuid,
        index: usize,
        step_id: String,
        command: Vec<String>,
    },
    StepFinished {
        run_id: Uuid,
        result: StepResult,
    },
    PipelineFinished {
        run_id: Uuid,
        status: ExecutionStatus,
        error: Option<PipelineError>,
    },
}

/// Type for event handlers
pub type EventHandler = Arc<dyn Fn(ExecutionEvent) + Send + Sync>;

/// Main pipeline execution engine
///
/// Runs steps strictly in order and stops at the first failure of a step
/// that is not marked best-effort.
pub struct ExecutionEngine<R> {
    executor: StepExecutor<R>,
    config: EngineConfig,
    event_handlers: Arc<Mutex<Vec<EventHandler>>>,
}

impl<R: ProcessRunner> ExecutionEngine<R> {
    pub fn new(runner: R, config: EngineConfig) -> Self {
        Self {
            executor: StepExecutor::new(runner),
            config,
            event_handlers: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn runner(&self) -> &R {
        self.executor.runner()
    }

    /// Add an event handler
    pub async fn add_event_handler<F>(&self, handler: F)
    where
        F: Fn(ExecutionEvent) + Send + Sync + 'static,
    {
        self.event_handlers.lock().await.push(Arc::new(handler));
    }

    /// Emit an event to all handlers
    async fn emit_event(&self, event: ExecutionEvent) {
        let handlers = self.event_handlers.lock().await;
        for handler in handlers.iter() {
            handler(event.clone());
        }
    }

    /// Run a pipeline in a freshly allocated `<workspace_root>/<run id>` directory
    pub async fn run(
        &self,
        pipeline: &Pipeline,
        context: SubstitutionContext,
        cancel: Arc<AtomicBool>,
    ) -> PipelineRun {
        let run = PipelineRun::new(&pipeline.name, pipeline.steps.len(), context);

        let resolved = match pipeline.resolve_all(&run.context) {
            Ok(resolved) => resolved,
            Err(e) => return self.abort(run, e).await,
        };

        let workspace = match Workspace::allocate(&self.config.workspace_root, run.run_id) {
            Ok(workspace) => workspace,
            Err(e) => return self.abort(run, e).await,
        };

        self.execute(pipeline, run, &resolved, &workspace, cancel).await
    }

    /// Run a pipeline in a workspace the caller has already claimed
    pub async fn run_in(
        &self,
        pipeline: &Pipeline,
        context: SubstitutionContext,
        workspace: &Workspace,
        cancel: Arc<AtomicBool>,
    ) -> PipelineRun {
        let run = PipelineRun::new(&pipeline.name, pipeline.steps.len(), context);

        let resolved = match pipeline.resolve_all(&run.context) {
            Ok(resolved) => resolved,
            Err(e) => return self.abort(run, e).await,
        };

        self.execute(pipeline, run, &resolved, workspace, cancel).await
    }

    /// Fail a run that never got to execute a step
    async fn abort(&self, mut run: PipelineRun, err: PipelineError) -> PipelineRun {
        error!("Pipeline {} could not start: {}", run.pipeline_name, err);
        run.fail(err);
        self.finish(run).await
    }

    async fn execute(
        &self,
        pipeline: &Pipeline,
        mut run: PipelineRun,
        resolved: &[ResolvedStep],
        workspace: &Workspace,
        cancel: Arc<AtomicBool>,
    ) -> PipelineRun {
        run.working_dir = Some(workspace.path().to_path_buf());
        run.start();

        info!(
            "Starting pipeline {} (run {}) in {}",
            pipeline.name,
            run.run_id,
            workspace.path().display()
        );
        self.emit_event(ExecutionEvent::PipelineStarted {
            run_id: run.run_id,
            pipeline_name: pipeline.name.clone(),
            total_steps: pipeline.steps.len(),
            working_dir: workspace.path().to_path_buf(),
        })
        .await;

        for (index, (step, resolved)) in pipeline.steps.iter().zip(resolved).enumerate() {
            if cancel.load(Ordering::SeqCst) {
                warn!("Run {} cancelled before step {} ({})", run.run_id, index, step.id);
                run.cancel(index);
                return self.finish(run).await;
            }

            let timeout = pipeline.step_timeout(step, self.config.default_timeout);

            self.emit_event(ExecutionEvent::StepStarted {
                run_id: run.run_id,
                index,
                step_id: step.id.clone(),
                command: resolved.command_line(),
            })
            .await;

            let result = self
                .executor
                .execute(index, step, resolved, workspace.path(), timeout)
                .await;
            let halt = result.halts_pipeline().then(|| halt_error(&result, timeout));

            self.emit_event(ExecutionEvent::StepFinished {
                run_id: run.run_id,
                result: result.clone(),
            })
            .await;
            run.record(result);

            if let Some(err) = halt {
                error!("Pipeline {} failed: {}", pipeline.name, err);
                run.fail(err);
                return self.finish(run).await;
            }
        }

        run.succeed();
        info!(
            "Pipeline {} succeeded ({} steps)",
            pipeline.name,
            run.results.len()
        );
        self.finish(run).await
    }

    async fn finish(&self, run: PipelineRun) -> PipelineRun {
        self.emit_event(ExecutionEvent::PipelineFinished {
            run_id: run.run_id,
            status: run.status,
            error: run.error.clone(),
        })
        .await;
        run
    }
}

/// Terminal error for a step result that halts the run
fn halt_error(result: &StepResult, timeout: Duration) -> PipelineError {
    match result.outcome {
        StepOutcome::TimedOut => PipelineError::StepTimeout {
            step_index: result.index,
            step_id: result.step_id.clone(),
            timeout_secs: timeout.as_secs(),
        },
        _ => PipelineError::StepFailed {
            step_index: result.index,
            step_id: result.step_id.clone(),
            exit_code: result.exit_code,
        },
    }
}
