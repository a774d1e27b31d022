//! Command-line interface

pub mod commands;
pub mod output;

use crate::core::{ExecutionStatus, PipelineError, PipelineRun};
use clap::{Parser, Subcommand};
use commands::{HistoryCommand, PushCommand, RunCommand, TriggerCommand, ValidateCommand};
use std::ffi::OsString;
use std::path::PathBuf;

/// Process exit codes
pub mod exit_code {
    pub const SUCCESS: i32 = 0;
    /// Step failure, step timeout or cancellation
    pub const FAILED: i32 = 1;
    pub const SPEC_PARSE: i32 = 3;
    pub const UNRESOLVED_VARIABLE: i32 = 4;
    /// I/O, database and trigger errors
    pub const OTHER: i32 = 5;
}

/// Build-and-deploy pipelines triggered by branch pushes
#[derive(Debug, Parser, Clone)]
#[command(name = "pushdeploy")]
#[command(version)]
#[command(about = "Run build-and-deploy pipelines, by hand or on branch pushes", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Directory for run history and working directories
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,
}

/// Available commands
#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run a pipeline
    Run(RunCommand),

    /// Validate a pipeline configuration
    Validate(ValidateCommand),

    /// Show run history
    History(HistoryCommand),

    /// Manage push triggers
    Trigger(TriggerCommand),

    /// Deliver a branch push to the registered triggers
    Push(PushCommand),
}

impl Cli {
    /// Parse CLI arguments from environment
    pub fn from_args() -> Self {
        Self::parse()
    }

    /// Parse CLI arguments from a slice
    pub fn try_parse_from<I, T>(itr: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        <Self as Parser>::try_parse_from(itr)
    }
}

/// Exit code for a finished run
pub fn exit_code_for_run(run: &PipelineRun) -> i32 {
    if run.status == ExecutionStatus::Succeeded {
        return exit_code::SUCCESS;
    }
    match &run.error {
        Some(err) => exit_code_for_pipeline_error(err),
        None => exit_code::FAILED,
    }
}

fn exit_code_for_pipeline_error(err: &PipelineError) -> i32 {
    match err {
        PipelineError::SpecParse(_) => exit_code::SPEC_PARSE,
        PipelineError::UnresolvedVariable { .. } => exit_code::UNRESOLVED_VARIABLE,
        PipelineError::StepFailed { .. }
        | PipelineError::StepTimeout { .. }
        | PipelineError::Cancelled { .. } => exit_code::FAILED,
        PipelineError::Workspace(_) => exit_code::OTHER,
    }
}

/// Exit code for an error that ended a command
pub fn exit_code_for_error(err: &anyhow::Error) -> i32 {
    match err.downcast_ref::<PipelineError>() {
        Some(err) => exit_code_for_pipeline_error(err),
        None => exit_code::OTHER,
    }
}
