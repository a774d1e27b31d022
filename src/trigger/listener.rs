//! Trigger listener - turns branch pushes into pipeline runs

use crate::{
    core::{config::PipelineConfig, PipelineRun},
    execution::ExecutionEngine,
    process::ProcessRunner,
    trigger::{PushEvent, TriggerError, TriggerRule},
};
use regex::Regex;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::{debug, info};

/// Result of delivering a push to the listener
#[derive(Debug)]
pub enum TriggerOutcome {
    /// No rule matched the branch
    Ignored,
    /// Exactly one rule matched and its pipeline ran
    Fired { rule: String, run: PipelineRun },
}

struct CompiledRule {
    rule: TriggerRule,
    matcher: Regex,
}

/// Built-in substitutions every triggered run receives
///
/// These take precedence over both pipeline defaults and rule substitutions.
pub fn push_substitutions(event: &PushEvent, rule: &TriggerRule) -> Vec<(&'static str, String)> {
    vec![
        ("BUILD_ID", event.commit.clone()),
        ("COMMIT_SHA", event.commit.clone()),
        ("SHORT_SHA", event.short_sha().to_string()),
        ("BRANCH_NAME", event.branch.clone()),
        ("PROJECT_ID", rule.service_identity.clone()),
        ("TRIGGER_NAME", rule.name.clone()),
    ]
}

/// Matches pushes against registered rules and runs the selected pipeline
pub struct TriggerListener<R> {
    engine: Arc<ExecutionEngine<R>>,
    rules: Vec<CompiledRule>,
    cancel: Arc<AtomicBool>,
}

impl<R: ProcessRunner> TriggerListener<R> {
    /// Compile every rule's branch pattern
    pub fn new(engine: Arc<ExecutionEngine<R>>, rules: Vec<TriggerRule>) -> Result<Self, TriggerError> {
        let rules = rules
            .into_iter()
            .map(|rule| {
                let matcher = rule.branch_matcher()?;
                Ok(CompiledRule { rule, matcher })
            })
            .collect::<Result<Vec<_>, TriggerError>>()?;

        Ok(Self {
            engine,
            rules,
            cancel: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Share a cancellation flag with the runs this listener starts
    pub fn with_cancel_flag(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn rules(&self) -> impl Iterator<Item = &TriggerRule> {
        self.rules.iter().map(|c| &c.rule)
    }

    /// Rules whose pattern matches `branch`, in registration order
    pub fn matching_rules(&self, branch: &str) -> Vec<&TriggerRule> {
        self.rules
            .iter()
            .filter(|c| c.matcher.is_match(branch))
            .map(|c| &c.rule)
            .collect()
    }

    /// Handle one push notification
    pub async fn handle_push(&self, event: &PushEvent) -> Result<TriggerOutcome, TriggerError> {
        let rule = match self.matching_rules(&event.branch).as_slice() {
            [] => {
                debug!("Push to {} matched no trigger", event.branch);
                return Ok(TriggerOutcome::Ignored);
            }
            [rule] => (*rule).clone(),
            many => {
                return Err(TriggerError::Ambiguous {
                    branch: event.branch.clone(),
                    rules: many.iter().map(|r| r.name.clone()).collect(),
                })
            }
        };

        info!(
            "Push to {} ({}) matched trigger {}",
            event.branch,
            event.short_sha(),
            rule.name
        );

        let pipeline = PipelineConfig::from_file(&rule.pipeline)
            .and_then(|config| config.to_pipeline())
            .map_err(|source| TriggerError::Pipeline {
                name: rule.name.clone(),
                source,
            })?;

        let mut context = pipeline.context_with(rule.substitutions.clone());
        context.apply_overrides(push_substitutions(event, &rule));

        let mut run = self.engine.run(&pipeline, context, self.cancel.clone()).await;
        run.trigger = Some(rule.name.clone());

        Ok(TriggerOutcome::Fired {
            rule: rule.name,
            run,
        })
    }
}
