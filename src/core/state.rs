//! Execution state models

use crate::core::{context::SubstitutionContext, error::PipelineError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

/// Overall pipeline run status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionStatus {
    /// Run has not started
    Pending,
    /// Run is executing steps
    Running,
    /// Every step succeeded or was tolerated
    Succeeded,
    /// A required step failed, or the run could not start
    Failed,
    /// Cancelled between steps
    Cancelled,
}

impl ExecutionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ExecutionStatus::Succeeded | ExecutionStatus::Failed | ExecutionStatus::Cancelled
        )
    }

    /// Parse the stored `Debug` form back into a status
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "Pending" => Some(ExecutionStatus::Pending),
            "Running" => Some(ExecutionStatus::Running),
            "Succeeded" => Some(ExecutionStatus::Succeeded),
            "Failed" => Some(ExecutionStatus::Failed),
            "Cancelled" => Some(ExecutionStatus::Cancelled),
            _ => None,
        }
    }
}

/// How a single step ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepOutcome {
    /// Exit status zero
    Succeeded,
    /// Non-zero exit, killed by a signal, or could not be launched
    Failed,
    /// Exceeded its timeout and was killed
    TimedOut,
}

impl StepOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, StepOutcome::Succeeded)
    }
}

/// Captured result of one executed step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepResult {
    /// Position of the step in the pipeline
    pub index: usize,

    pub step_id: String,

    /// Resolved program and arguments
    pub command: Vec<String>,

    pub stdout: String,

    pub stderr: String,

    /// Exit code; `None` when killed or never started
    pub exit_code: Option<i32>,

    pub outcome: StepOutcome,

    /// Whether the step was marked best-effort
    pub allow_failure: bool,

    pub started_at: DateTime<Utc>,

    pub duration_ms: u64,
}

impl StepResult {
    /// Whether this result stops the pipeline
    pub fn halts_pipeline(&self) -> bool {
        !self.outcome.is_success() && !self.allow_failure
    }
}

/// One execution attempt of a pipeline
///
/// Created at run start and terminated at the first required-step failure,
/// on cancellation, or after the last step. Never resumed: re-running means
/// a new `PipelineRun`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineRun {
    /// Unique run ID
    pub run_id: Uuid,

    pub pipeline_name: String,

    /// Trigger that started this run, if any
    pub trigger: Option<String>,

    pub status: ExecutionStatus,

    /// Variables the run resolved its steps against
    pub context: SubstitutionContext,

    /// Working directory shared by the run's steps
    pub working_dir: Option<PathBuf>,

    /// Step results in execution order
    pub results: Vec<StepResult>,

    /// Number of steps in the pipeline
    pub total_steps: usize,

    /// Terminal error for failed or cancelled runs
    pub error: Option<PipelineError>,

    pub started_at: Option<DateTime<Utc>>,

    pub completed_at: Option<DateTime<Utc>>,
}

impl PipelineRun {
    /// Create a pending run
    pub fn new(pipeline_name: impl Into<String>, total_steps: usize, context: SubstitutionContext) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            pipeline_name: pipeline_name.into(),
            trigger: None,
            status: ExecutionStatus::Pending,
            context,
            working_dir: None,
            results: Vec::new(),
            total_steps,
            error: None,
            started_at: None,
            completed_at: None,
        }
    }

    /// Mark run as started
    pub fn start(&mut self) {
        self.status = ExecutionStatus::Running;
        self.started_at = Some(Utc::now());
    }

    /// Record a finished step
    pub fn record(&mut self, result: StepResult) {
        self.results.push(result);
    }

    /// Mark run as succeeded
    pub fn succeed(&mut self) {
        self.status = ExecutionStatus::Succeeded;
        self.completed_at = Some(Utc::now());
    }

    /// Mark run as failed
    pub fn fail(&mut self, error: PipelineError) {
        self.status = ExecutionStatus::Failed;
        self.error = Some(error);
        self.completed_at = Some(Utc::now());
    }

    /// Mark run as cancelled
    pub fn cancel(&mut self, step_index: usize) {
        self.status = ExecutionStatus::Cancelled;
        self.error = Some(PipelineError::Cancelled { step_index });
        self.completed_at = Some(Utc::now());
    }

    /// Build ID the run was started with
    pub fn build_id(&self) -> Option<&str> {
        self.context.get("BUILD_ID")
    }

    pub fn is_success(&self) -> bool {
        self.status == ExecutionStatus::Succeeded
    }

    /// Step results that did not succeed
    pub fn failed_steps(&self) -> impl Iterator<Item = &StepResult> {
        self.results.iter().filter(|r| !r.outcome.is_success())
    }

    /// Calculate progress (0.0 to 1.0)
    pub fn progress(&self) -> f64 {
        if self.total_steps == 0 {
            return 0.0;
        }
        self.results.len() as f64 / self.total_steps as f64
    }

    /// Elapsed wall time, once the run has finished
    pub fn duration(&self) -> Option<std::time::Duration> {
        let started = self.started_at?;
        let completed = self.completed_at?;
        completed.signed_duration_since(started).to_std().ok()
    }
}
