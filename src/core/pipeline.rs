//! Pipeline domain model

use crate::core::{
    config::PipelineConfig,
    context::SubstitutionContext,
    error::PipelineError,
    step::{ResolvedStep, Step},
};
use std::collections::BTreeMap;
use std::time::Duration;

/// Step timeout used when neither the step nor the pipeline sets one
pub const DEFAULT_STEP_TIMEOUT: Duration = Duration::from_secs(600);

/// A pipeline definition: ordered steps plus substitution defaults
///
/// Immutable once loaded; runs borrow it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pipeline {
    /// Pipeline name
    pub name: String,

    /// Default values for substitution variables
    pub substitutions: BTreeMap<String, String>,

    /// Steps in execution order
    pub steps: Vec<Step>,

    /// Default per-step timeout
    pub timeout: Option<Duration>,
}

impl Pipeline {
    /// Create a pipeline from configuration
    pub fn from_config(config: &PipelineConfig) -> Result<Self, PipelineError> {
        config.to_pipeline()
    }

    /// Create an empty pipeline
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            substitutions: BTreeMap::new(),
            steps: Vec::new(),
            timeout: None,
        }
    }

    pub fn with_step(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }

    pub fn with_substitution(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.substitutions.insert(key.into(), value.into());
        self
    }

    /// Get a step by ID
    pub fn step(&self, id: &str) -> Option<&Step> {
        self.steps.iter().find(|s| s.id == id)
    }

    /// Build a context from this pipeline's defaults layered with `overrides`
    pub fn context_with<I, K, V>(&self, overrides: I) -> SubstitutionContext
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        SubstitutionContext::from_defaults(self.substitutions.clone()).with_overrides(overrides)
    }

    /// Resolve every step up front
    ///
    /// Fails on the first step with an undefined variable so that nothing
    /// runs when any template cannot be satisfied.
    pub fn resolve_all(&self, ctx: &SubstitutionContext) -> Result<Vec<ResolvedStep>, PipelineError> {
        self.steps
            .iter()
            .enumerate()
            .map(|(index, step)| step.resolve(index, ctx))
            .collect()
    }

    /// Effective timeout for a step, falling back to the pipeline and then `fallback`
    pub fn step_timeout(&self, step: &Step, fallback: Duration) -> Duration {
        step.timeout.or(self.timeout).unwrap_or(fallback)
    }

    /// Variables referenced by steps that have no default value
    pub fn variables_without_default(&self) -> Vec<String> {
        let mut missing = Vec::new();
        for step in &self.steps {
            for name in step.referenced_variables() {
                if !self.substitutions.contains_key(&name) && !missing.contains(&name) {
                    missing.push(name);
                }
            }
        }
        missing
    }
}
