//! pushdeploy - build-and-deploy pipelines triggered by branch pushes

pub mod cli;
pub mod core;
pub mod execution;
pub mod persistence;
pub mod process;
pub mod trigger;

// Re-export commonly used types
pub use core::{
    ExecutionStatus, Pipeline, PipelineError, PipelineRun, Step, StepOutcome, StepResult,
    SubstitutionContext,
};
pub use execution::{EngineConfig, ExecutionEngine, ExecutionEvent, Workspace};
pub use process::{HostProcessRunner, Invocation, ProcessError, ProcessOutput, ProcessRunner};
pub use trigger::{PushEvent, TriggerError, TriggerListener, TriggerOutcome, TriggerRule};
