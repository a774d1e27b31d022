//! External process execution for build steps

pub mod host;
pub mod output;

use crate::core::ResolvedStep;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub use host::HostProcessRunner;
pub use output::{ProcessError, ProcessOutput};

/// A fully resolved command to launch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
    pub working_dir: PathBuf,
}

impl Invocation {
    /// Build an invocation for a resolved step rooted at `workspace`
    pub fn for_step(step: &ResolvedStep, workspace: &Path) -> Self {
        let working_dir = match &step.dir {
            Some(dir) => workspace.join(dir),
            None => workspace.to_path_buf(),
        };
        Self {
            program: step.program.clone(),
            args: step.args.clone(),
            env: step.env.clone(),
            working_dir,
        }
    }
}

/// Trait for process execution - allows for different implementations
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    /// Run the invocation to completion or until `timeout` elapses
    ///
    /// A timeout is not an error: the process is killed and the output
    /// captured so far is returned with `timed_out` set.
    async fn run(&self, invocation: &Invocation, timeout: Duration) -> Result<ProcessOutput, ProcessError>;
}
