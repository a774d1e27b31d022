//! Step domain model

use crate::core::{
    context::SubstitutionContext,
    error::PipelineError,
    substitution::{referenced_variables, substitute, MissingVariable},
};
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;

/// A single build step: one external command invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    /// Step identifier (explicit, or `step-<index>`)
    pub id: String,

    /// Tool reference - the executable to launch
    pub tool: String,

    /// Executable override; `tool` stays the display name when set
    pub entrypoint: Option<String>,

    /// Argument templates, may contain `${VAR}` placeholders
    pub args: Vec<String>,

    /// Environment entries as (name, value template)
    pub env: Vec<(String, String)>,

    /// Subdirectory of the working directory to run in
    pub dir: Option<String>,

    /// Per-step timeout override
    pub timeout: Option<Duration>,

    /// Best-effort: a failure is recorded but does not halt the run
    pub allow_failure: bool,
}

/// A step with every template expanded, ready to launch
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedStep {
    pub program: String,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
    pub dir: Option<PathBuf>,
}

impl ResolvedStep {
    /// Program followed by its arguments
    pub fn command_line(&self) -> Vec<String> {
        std::iter::once(self.program.clone())
            .chain(self.args.iter().cloned())
            .collect()
    }
}

impl Step {
    /// Create a step running `tool` with literal arguments
    pub fn new(id: impl Into<String>, tool: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            tool: tool.into(),
            entrypoint: None,
            args: Vec::new(),
            env: Vec::new(),
            dir: None,
            timeout: None,
            allow_failure: false,
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn allow_failure(mut self) -> Self {
        self.allow_failure = true;
        self
    }

    /// Expand all templates against `ctx`
    ///
    /// `index` is the step's position, reported in `UnresolvedVariable`.
    pub fn resolve(&self, index: usize, ctx: &SubstitutionContext) -> Result<ResolvedStep, PipelineError> {
        let unresolved = |MissingVariable(name)| PipelineError::UnresolvedVariable {
            step_index: index,
            name,
        };

        let args = self
            .args
            .iter()
            .map(|arg| substitute(arg, ctx))
            .collect::<Result<Vec<_>, _>>()
            .map_err(unresolved)?;

        let env = self
            .env
            .iter()
            .map(|(key, value)| substitute(value, ctx).map(|v| (key.clone(), v)))
            .collect::<Result<Vec<_>, _>>()
            .map_err(unresolved)?;

        let dir = self
            .dir
            .as_deref()
            .map(|dir| substitute(dir, ctx).map(PathBuf::from))
            .transpose()
            .map_err(unresolved)?;

        Ok(ResolvedStep {
            program: self.entrypoint.clone().unwrap_or_else(|| self.tool.clone()),
            args,
            env,
            dir,
        })
    }

    /// Every variable name this step's templates reference
    pub fn referenced_variables(&self) -> Vec<String> {
        let mut names = Vec::new();
        let templates = self
            .args
            .iter()
            .chain(self.env.iter().map(|(_, v)| v))
            .chain(self.dir.iter());
        for template in templates {
            for name in referenced_variables(template) {
                if !names.contains(&name) {
                    names.push(name);
                }
            }
        }
        names
    }
}
