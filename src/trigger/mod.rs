//! Branch-push triggers
//!
//! A trigger rule binds a branch pattern to a pipeline file and a service
//! identity. The listener turns push notifications into pipeline runs.

pub mod listener;

pub use listener::{push_substitutions, TriggerListener, TriggerOutcome};

use crate::core::{substitution::is_valid_variable_name, PipelineError};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use thiserror::Error;

/// Errors from trigger management and push handling
#[derive(Debug, Error)]
pub enum TriggerError {
    #[error("trigger '{name}' has invalid branch pattern '{pattern}': {message}")]
    InvalidPattern {
        name: String,
        pattern: String,
        message: String,
    },

    #[error("invalid trigger name '{name}': {message}")]
    InvalidName { name: String, message: String },

    #[error("trigger '{name}' has invalid substitution name '{key}'")]
    InvalidSubstitution { name: String, key: String },

    #[error("branch '{branch}' matches more than one trigger: {}", .rules.join(", "))]
    Ambiguous { branch: String, rules: Vec<String> },

    #[error("trigger '{name}' could not load its pipeline: {source}")]
    Pipeline {
        name: String,
        #[source]
        source: PipelineError,
    },

    #[error("trigger '{0}' already exists")]
    DuplicateName(String),

    #[error("trigger '{0}' not found")]
    NotFound(String),
}

/// A registered push trigger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerRule {
    /// Unique trigger name
    pub name: String,

    /// Regular expression matched against the whole branch name
    pub branch_pattern: String,

    /// Pipeline spec file to run
    pub pipeline: PathBuf,

    /// Deploy identity, exposed to steps as `PROJECT_ID`
    pub service_identity: String,

    /// Extra substitutions layered over the pipeline defaults
    #[serde(default)]
    pub substitutions: BTreeMap<String, String>,

    #[serde(default)]
    pub description: Option<String>,
}

impl TriggerRule {
    pub fn new(
        name: impl Into<String>,
        branch_pattern: impl Into<String>,
        pipeline: impl Into<PathBuf>,
        service_identity: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            branch_pattern: branch_pattern.into(),
            pipeline: pipeline.into(),
            service_identity: service_identity.into(),
            substitutions: BTreeMap::new(),
            description: None,
        }
    }

    pub fn with_substitution(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.substitutions.insert(key.into(), value.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Compile the branch pattern anchored at both ends
    ///
    /// `main` matches exactly `main`, never `main-2` or `feature/main`.
    pub fn branch_matcher(&self) -> Result<Regex, TriggerError> {
        Regex::new(&format!("^(?:{})$", self.branch_pattern)).map_err(|e| {
            TriggerError::InvalidPattern {
                name: self.name.clone(),
                pattern: self.branch_pattern.clone(),
                message: e.to_string(),
            }
        })
    }

    /// Check the rule can be registered
    pub fn validate(&self) -> Result<(), TriggerError> {
        if self.name.trim().is_empty() {
            return Err(TriggerError::InvalidName {
                name: self.name.clone(),
                message: "must not be empty".to_string(),
            });
        }
        self.branch_matcher()?;
        if let Some(key) = self.substitutions.keys().find(|k| !is_valid_variable_name(k)) {
            return Err(TriggerError::InvalidSubstitution {
                name: self.name.clone(),
                key: key.clone(),
            });
        }
        Ok(())
    }
}

/// A push to a branch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushEvent {
    pub branch: String,
    pub commit: String,
}

impl PushEvent {
    pub fn new(branch: impl Into<String>, commit: impl Into<String>) -> Self {
        Self {
            branch: branch.into(),
            commit: commit.into(),
        }
    }

    /// First seven characters of the commit id
    pub fn short_sha(&self) -> &str {
        match self.commit.char_indices().nth(7) {
            Some((end, _)) => &self.commit[..end],
            None => &self.commit,
        }
    }

    /// Read a GitHub `push` webhook payload
    ///
    /// Returns `None` for tag pushes and branch deletions.
    pub fn from_github_payload(payload: &serde_json::Value) -> Option<Self> {
        let git_ref = payload.get("ref")?.as_str()?;
        let branch = git_ref.strip_prefix("refs/heads/")?;
        if payload.get("deleted").and_then(|d| d.as_bool()) == Some(true) {
            return None;
        }
        let commit = payload.get("after")?.as_str()?;
        if branch.is_empty() || commit.is_empty() {
            return None;
        }
        Some(Self::new(branch, commit))
    }
}
