//! Persistence layer for run history and trigger rules

#[cfg(feature = "sqlite")]
pub mod store;

#[cfg(feature = "sqlite")]
pub use store::SqliteStore;

pub use crate::core::ExecutionStatus;
use crate::core::PipelineRun;
use crate::trigger::{TriggerError, TriggerRule};
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Summary of a pipeline run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Unique run ID
    pub run_id: Uuid,

    pub pipeline_name: String,

    /// Trigger that started the run, if any
    pub trigger: Option<String>,

    pub status: ExecutionStatus,

    pub build_id: Option<String>,

    pub started_at: Option<DateTime<Utc>>,

    pub completed_at: Option<DateTime<Utc>>,

    /// Number of steps that ran
    pub completed_steps: usize,

    /// Total number of steps
    pub total_steps: usize,

    /// Terminal error message
    pub error: Option<String>,
}

/// Trait for persistence backends
#[async_trait::async_trait]
pub trait PersistenceBackend: Send + Sync {
    /// Save a run with its full step log, replacing any earlier copy
    async fn save_run(&self, run: &PipelineRun) -> Result<()>;

    /// Load a run by ID
    async fn load_run(&self, run_id: Uuid) -> Result<Option<PipelineRun>>;

    /// Most recent runs first, optionally for one pipeline
    async fn list_runs(&self, pipeline_name: Option<&str>, limit: usize) -> Result<Vec<RunSummary>>;

    /// List all pipeline names with recorded runs
    async fn list_pipelines(&self) -> Result<Vec<String>>;

    /// Register a trigger; fails if the name is taken or the rule is invalid
    async fn create_trigger(&self, rule: &TriggerRule) -> Result<()>;

    async fn load_trigger(&self, name: &str) -> Result<Option<TriggerRule>>;

    /// Remove a trigger; fails if it does not exist
    async fn delete_trigger(&self, name: &str) -> Result<()>;

    /// All triggers ordered by name
    async fn list_triggers(&self) -> Result<Vec<TriggerRule>>;
}

/// In-memory persistence (for testing or ephemeral use)
pub struct InMemoryPersistence {
    runs: RwLock<HashMap<Uuid, PipelineRun>>,
    triggers: RwLock<HashMap<String, TriggerRule>>,
}

impl InMemoryPersistence {
    pub fn new() -> Self {
        Self {
            runs: RwLock::new(HashMap::new()),
            triggers: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryPersistence {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl PersistenceBackend for InMemoryPersistence {
    async fn save_run(&self, run: &PipelineRun) -> Result<()> {
        self.runs.write().await.insert(run.run_id, run.clone());
        Ok(())
    }

    async fn load_run(&self, run_id: Uuid) -> Result<Option<PipelineRun>> {
        Ok(self.runs.read().await.get(&run_id).cloned())
    }

    async fn list_runs(&self, pipeline_name: Option<&str>, limit: usize) -> Result<Vec<RunSummary>> {
        let runs = self.runs.read().await;
        let mut summaries: Vec<RunSummary> = runs
            .values()
            .filter(|run| pipeline_name.map_or(true, |name| run.pipeline_name == name))
            .map(create_summary)
            .collect();
        summaries.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        summaries.truncate(limit);
        Ok(summaries)
    }

    async fn list_pipelines(&self) -> Result<Vec<String>> {
        let runs = self.runs.read().await;
        let mut names: Vec<String> = runs.values().map(|r| r.pipeline_name.clone()).collect();
        names.sort();
        names.dedup();
        Ok(names)
    }

    async fn create_trigger(&self, rule: &TriggerRule) -> Result<()> {
        rule.validate()?;
        let mut triggers = self.triggers.write().await;
        if triggers.contains_key(&rule.name) {
            return Err(TriggerError::DuplicateName(rule.name.clone()).into());
        }
        triggers.insert(rule.name.clone(), rule.clone());
        Ok(())
    }

    async fn load_trigger(&self, name: &str) -> Result<Option<TriggerRule>> {
        Ok(self.triggers.read().await.get(name).cloned())
    }

    async fn delete_trigger(&self, name: &str) -> Result<()> {
        match self.triggers.write().await.remove(name) {
            Some(_) => Ok(()),
            None => Err(TriggerError::NotFound(name.to_string()).into()),
        }
    }

    async fn list_triggers(&self) -> Result<Vec<TriggerRule>> {
        let mut rules: Vec<TriggerRule> = self.triggers.read().await.values().cloned().collect();
        rules.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(rules)
    }
}

/// Create a summary from a run
pub fn create_summary(run: &PipelineRun) -> RunSummary {
    RunSummary {
        run_id: run.run_id,
        pipeline_name: run.pipeline_name.clone(),
        trigger: run.trigger.clone(),
        status: run.status,
        build_id: run.build_id().map(str::to_string),
        started_at: run.started_at,
        completed_at: run.completed_at,
        completed_steps: run.results.len(),
        total_steps: run.total_steps,
        error: run.error.as_ref().map(|e| e.to_string()),
    }
}
