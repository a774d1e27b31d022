//! Substitution context - the variable set a run resolves step arguments against

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Resolved substitution variables for one pipeline run
///
/// Built from the pipeline's defaults, then layered with caller overrides.
/// An override always wins over a default.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubstitutionContext {
    variables: BTreeMap<String, String>,
}

impl SubstitutionContext {
    /// Create an empty context
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a context seeded with pipeline defaults
    pub fn from_defaults<I, K, V>(defaults: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut ctx = Self::new();
        ctx.apply_overrides(defaults);
        ctx
    }

    /// Layer overrides on top of the current values
    pub fn apply_overrides<I, K, V>(&mut self, overrides: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (key, value) in overrides {
            self.variables.insert(key.into(), value.into());
        }
    }

    /// Builder-style variant of [`apply_overrides`](Self::apply_overrides)
    pub fn with_overrides<I, K, V>(mut self, overrides: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.apply_overrides(overrides);
        self
    }

    /// Set a single variable
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.variables.insert(key.into(), value.into());
    }

    /// Set a variable only if it has no value yet
    pub fn set_if_absent(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.variables.entry(key.into()).or_insert_with(|| value.into());
    }

    /// Get a variable
    pub fn get(&self, key: &str) -> Option<&str> {
        self.variables.get(key).map(String::as_str)
    }

    /// Check whether a variable is defined
    pub fn contains(&self, key: &str) -> bool {
        self.variables.contains_key(key)
    }

    /// Iterate variables in name order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.variables.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.variables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }
}
