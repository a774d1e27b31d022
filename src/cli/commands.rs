//! CLI command definitions

use clap::{ArgGroup, Args, Subcommand};
use std::path::PathBuf;

/// Run a pipeline once
#[derive(Debug, Args, Clone)]
pub struct RunCommand {
    /// Path to pipeline YAML file
    #[arg(short, long)]
    pub file: PathBuf,

    /// Substitution overrides (KEY=VALUE)
    #[arg(long = "sub", value_name = "KEY=VALUE", value_parser = parse_key_value)]
    pub substitutions: Vec<(String, String)>,

    /// Run in this directory instead of a fresh one under the data dir
    #[arg(long)]
    pub workdir: Option<PathBuf>,

    /// Don't save the run to history
    #[arg(long)]
    pub no_history: bool,
}

/// Validate a pipeline configuration
#[derive(Debug, Args, Clone)]
pub struct ValidateCommand {
    /// Path to pipeline YAML file
    #[arg(short, long)]
    pub file: PathBuf,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Show run history
#[derive(Debug, Args, Clone)]
pub struct HistoryCommand {
    /// Pipeline name to filter by
    #[arg(short, long)]
    pub pipeline: Option<String>,

    /// Number of recent runs to show
    #[arg(short, long, default_value_t = 10)]
    pub limit: usize,

    /// Show the step log of one run
    #[arg(long)]
    pub run_id: Option<String>,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Manage push triggers
#[derive(Debug, Args, Clone)]
pub struct TriggerCommand {
    #[command(subcommand)]
    pub action: TriggerAction,
}

#[derive(Debug, Subcommand, Clone)]
pub enum TriggerAction {
    /// Register a new trigger
    Create(TriggerCreateCommand),

    /// Show one trigger
    Describe {
        name: String,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Remove a trigger
    Delete { name: String },

    /// List all triggers
    List {
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },
}

#[derive(Debug, Args, Clone)]
pub struct TriggerCreateCommand {
    /// Unique trigger name
    pub name: String,

    /// Branch regular expression, matched against the whole branch name
    #[arg(long)]
    pub branch: String,

    /// Pipeline spec file to run
    #[arg(long)]
    pub pipeline: PathBuf,

    /// Deploy identity, available to steps as ${PROJECT_ID}
    #[arg(long)]
    pub service_identity: String,

    /// Extra substitutions (KEY=VALUE)
    #[arg(long = "sub", value_name = "KEY=VALUE", value_parser = parse_key_value)]
    pub substitutions: Vec<(String, String)>,

    #[arg(long)]
    pub description: Option<String>,
}

/// Deliver a push notification to the registered triggers
#[derive(Debug, Args, Clone)]
#[command(group(ArgGroup::new("source").required(true).args(["branch", "payload"])))]
pub struct PushCommand {
    /// Branch that was pushed
    #[arg(long, requires = "commit")]
    pub branch: Option<String>,

    /// Commit ID at the branch head
    #[arg(long, requires = "branch")]
    pub commit: Option<String>,

    /// GitHub push webhook payload (JSON file)
    #[arg(long, conflicts_with_all = ["branch", "commit"])]
    pub payload: Option<PathBuf>,

    /// Don't save the run to history
    #[arg(long)]
    pub no_history: bool,
}

/// Parse key=value pairs
pub fn parse_key_value(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("Invalid key=value pair: {}", s)),
    }
}
