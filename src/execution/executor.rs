//! Step executor - runs individual steps through a process runner

use crate::{
    core::{config::is_contained_dir, ResolvedStep, Step, StepOutcome, StepResult},
    process::{Invocation, ProcessOutput, ProcessRunner},
};
use chrono::Utc;
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Executes a single step
pub struct StepExecutor<R> {
    runner: R,
}

impl<R: ProcessRunner> StepExecutor<R> {
    pub fn new(runner: R) -> Self {
        Self { runner }
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    /// Execute a resolved step inside `workspace` and capture its result
    ///
    /// Never fails: launch errors are reported as a `Failed` outcome with no
    /// exit code and the error text in stderr.
    pub async fn execute(
        &self,
        index: usize,
        step: &Step,
        resolved: &ResolvedStep,
        workspace: &Path,
        timeout: Duration,
    ) -> StepResult {
        info!("Executing step {} ({})", index, step.id);

        let command = resolved.command_line();
        debug!("Resolved command for step {}: {:?}", step.id, command);

        let started_at = Utc::now();
        let clock = Instant::now();

        let output = match self.launch(resolved, workspace, timeout).await {
            Ok(output) => output,
            Err(message) => {
                error!("Could not run step {}: {}", step.id, message);
                ProcessOutput {
                    stderr: message,
                    ..ProcessOutput::default()
                }
            }
        };

        let outcome = if output.timed_out {
            StepOutcome::TimedOut
        } else if output.exit_code == Some(0) {
            StepOutcome::Succeeded
        } else {
            StepOutcome::Failed
        };

        match outcome {
            StepOutcome::Succeeded => info!("Step {} succeeded", step.id),
            _ if step.allow_failure => {
                warn!("Step {} {:?} (exit {:?}), continuing", step.id, outcome, output.exit_code)
            }
            StepOutcome::TimedOut => warn!("Step {} timed out after {}s", step.id, timeout.as_secs()),
            StepOutcome::Failed => warn!("Step {} failed with exit code {:?}", step.id, output.exit_code),
        }

        StepResult {
            index,
            step_id: step.id.clone(),
            command,
            stdout: output.stdout,
            stderr: output.stderr,
            exit_code: output.exit_code,
            outcome,
            allow_failure: step.allow_failure,
            started_at,
            duration_ms: clock.elapsed().as_millis() as u64,
        }
    }

    async fn launch(
        &self,
        resolved: &ResolvedStep,
        workspace: &Path,
        timeout: Duration,
    ) -> Result<ProcessOutput, String> {
        if let Some(dir) = &resolved.dir {
            if !is_contained_dir(dir) {
                return Err(format!(
                    "step directory '{}' escapes the working directory",
                    dir.display()
                ));
            }
        }

        let invocation = Invocation::for_step(resolved, workspace);
        tokio::fs::create_dir_all(&invocation.working_dir)
            .await
            .map_err(|e| format!("cannot create {}: {}", invocation.working_dir.display(), e))?;

        self.runner
            .run(&invocation, timeout)
            .await
            .map_err(|e| e.to_string())
    }
}
