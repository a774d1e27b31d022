//! Error types for pipeline loading and execution

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that halt a pipeline before or during a run
///
/// Serializable so a failed run's terminal error is kept in history
/// alongside its step log.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum PipelineError {
    #[error("invalid pipeline spec: {0}")]
    SpecParse(String),

    #[error("step {step_index} references undefined substitution ${{{name}}}")]
    UnresolvedVariable { step_index: usize, name: String },

    #[error("step {step_index} ({step_id}) failed with exit code {}", display_exit_code(.exit_code))]
    StepFailed {
        step_index: usize,
        step_id: String,
        exit_code: Option<i32>,
    },

    #[error("step {step_index} ({step_id}) timed out after {timeout_secs}s")]
    StepTimeout {
        step_index: usize,
        step_id: String,
        timeout_secs: u64,
    },

    #[error("run cancelled before step {step_index}")]
    Cancelled { step_index: usize },

    #[error("workspace error: {0}")]
    Workspace(String),
}

fn display_exit_code(code: &Option<i32>) -> String {
    match code {
        Some(code) => code.to_string(),
        None => "none".to_string(),
    }
}

impl PipelineError {
    /// Index of the step the error is attributed to, if any
    pub fn step_index(&self) -> Option<usize> {
        match self {
            PipelineError::UnresolvedVariable { step_index, .. }
            | PipelineError::StepFailed { step_index, .. }
            | PipelineError::StepTimeout { step_index, .. }
            | PipelineError::Cancelled { step_index } => Some(*step_index),
            PipelineError::SpecParse(_) | PipelineError::Workspace(_) => None,
        }
    }
}
