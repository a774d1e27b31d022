//! Pipeline configuration from YAML
//!
//! The file layout follows `cloudbuild.yaml`: a `steps` list where each step
//! names the tool to launch plus its `args`, and a `substitutions` map of
//! default variable values.

use crate::core::{
    error::PipelineError,
    pipeline::Pipeline,
    step::Step,
    substitution::is_valid_variable_name,
};
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use std::collections::{BTreeMap, HashSet};
use std::path::{Component, Path};
use std::time::Duration;

const DEFAULT_PIPELINE_NAME: &str = "pipeline";

/// Top-level pipeline configuration loaded from YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineConfig {
    /// Pipeline name (defaults to the file stem)
    #[serde(default)]
    pub name: Option<String>,

    /// Default timeout for steps, e.g. `600s` or `10m`
    #[serde(default)]
    pub timeout: Option<String>,

    /// Default substitution values
    #[serde(default)]
    substitutions: BTreeMap<String, Value>,

    /// Pipeline steps, executed in order
    pub steps: Vec<StepConfig>,
}

/// Step configuration as defined in YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StepConfig {
    /// Optional step identifier
    #[serde(default)]
    pub id: Option<String>,

    /// Tool reference - the executable to run
    pub name: String,

    /// Executable override
    #[serde(default)]
    pub entrypoint: Option<String>,

    /// Argument templates
    #[serde(default)]
    pub args: Vec<String>,

    /// Environment entries in `KEY=VALUE` form
    #[serde(default)]
    pub env: Vec<String>,

    /// Subdirectory of the working directory
    #[serde(default)]
    pub dir: Option<String>,

    /// Timeout for this step (overrides the pipeline default)
    #[serde(default)]
    pub timeout: Option<String>,

    /// Keep going when this step fails
    #[serde(default, alias = "allowFailure")]
    pub allow_failure: bool,
}

impl StepConfig {
    fn effective_id(&self, index: usize) -> String {
        self.id.clone().unwrap_or_else(|| format!("step-{}", index))
    }
}

fn spec_error(message: impl Into<String>) -> PipelineError {
    PipelineError::SpecParse(message.into())
}

/// Parse a timeout such as `600s`, `10m` or a bare number of seconds
pub fn parse_timeout(value: &str) -> Result<Duration, PipelineError> {
    let value = value.trim();
    let duration = match value.parse::<u64>() {
        Ok(secs) => Duration::from_secs(secs),
        Err(_) => humantime::parse_duration(value)
            .map_err(|e| spec_error(format!("invalid timeout '{}': {}", value, e)))?,
    };
    if duration.is_zero() {
        return Err(spec_error(format!("timeout '{}' must be greater than zero", value)));
    }
    Ok(duration)
}

/// Split a `KEY=VALUE` env entry
fn parse_env_entry(entry: &str) -> Option<(String, String)> {
    let (key, value) = entry.split_once('=')?;
    if !is_valid_variable_name(key) {
        return None;
    }
    Some((key.to_string(), value.to_string()))
}

/// A step directory must stay inside the working directory
pub fn is_contained_dir(dir: impl AsRef<Path>) -> bool {
    dir.as_ref()
        .components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

impl PipelineConfig {
    /// Load pipeline configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, PipelineError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| spec_error(format!("cannot read {}: {}", path.display(), e)))?;
        let mut config = Self::from_yaml(&content)
            .map_err(|e| match e {
                PipelineError::SpecParse(msg) => spec_error(format!("{}: {}", path.display(), msg)),
                other => other,
            })?;

        if config.name.is_none() {
            config.name = path
                .file_stem()
                .and_then(|s| s.to_str())
                .map(str::to_string);
        }
        Ok(config)
    }

    /// Parse pipeline configuration from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self, PipelineError> {
        let config: PipelineConfig = serde_yaml::from_str(yaml).map_err(|e| spec_error(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the pipeline configuration
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.steps.is_empty() {
            return Err(spec_error("pipeline has no steps"));
        }

        if let Some(timeout) = &self.timeout {
            parse_timeout(timeout)?;
        }

        for (key, value) in &self.substitutions {
            if !is_valid_variable_name(key) {
                return Err(spec_error(format!("invalid substitution name '{}'", key)));
            }
            if scalar_to_string(value).is_none() {
                return Err(spec_error(format!("substitution '{}' must be a scalar value", key)));
            }
        }

        let mut seen_ids = HashSet::new();
        for (index, step) in self.steps.iter().enumerate() {
            let id = step.effective_id(index);
            if !seen_ids.insert(id.clone()) {
                return Err(spec_error(format!("duplicate step id: {}", id)));
            }

            if step.name.trim().is_empty() {
                return Err(spec_error(format!("step '{}' has an empty name", id)));
            }

            if let Some(timeout) = &step.timeout {
                parse_timeout(timeout)
                    .map_err(|e| spec_error(format!("step '{}': {}", id, e)))?;
            }

            for entry in &step.env {
                if parse_env_entry(entry).is_none() {
                    return Err(spec_error(format!(
                        "step '{}' has malformed env entry '{}' (expected KEY=VALUE)",
                        id, entry
                    )));
                }
            }

            if let Some(dir) = &step.dir {
                if !is_contained_dir(dir) {
                    return Err(spec_error(format!(
                        "step '{}' dir '{}' must be a relative path inside the working directory",
                        id, dir
                    )));
                }
            }
        }

        Ok(())
    }

    /// Get substitution defaults as strings
    pub fn substitutions(&self) -> BTreeMap<String, String> {
        self.substitutions
            .iter()
            .filter_map(|(k, v)| scalar_to_string(v).map(|v| (k.clone(), v)))
            .collect()
    }

    /// Convert config to a Pipeline domain model
    pub fn to_pipeline(&self) -> Result<Pipeline, PipelineError> {
        let timeout = self.timeout.as_deref().map(parse_timeout).transpose()?;

        let steps = self
            .steps
            .iter()
            .enumerate()
            .map(|(index, config)| {
                let env = config
                    .env
                    .iter()
                    .map(|entry| {
                        parse_env_entry(entry)
                            .ok_or_else(|| spec_error(format!("malformed env entry '{}'", entry)))
                    })
                    .collect::<Result<Vec<_>, _>>()?;

                Ok(Step {
                    id: config.effective_id(index),
                    tool: config.name.clone(),
                    entrypoint: config.entrypoint.clone(),
                    args: config.args.clone(),
                    env,
                    dir: config.dir.clone(),
                    timeout: config.timeout.as_deref().map(parse_timeout).transpose()?,
                    allow_failure: config.allow_failure,
                })
            })
            .collect::<Result<Vec<_>, PipelineError>>()?;

        Ok(Pipeline {
            name: self.name.clone().unwrap_or_else(|| DEFAULT_PIPELINE_NAME.to_string()),
            substitutions: self.substitutions(),
            steps,
            timeout,
        })
    }
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
