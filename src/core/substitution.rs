//! Placeholder substitution for step templates
//!
//! Templates reference variables as `${NAME}`. `$$` produces a literal `$`.
//! Substitution is a single textual pass: inserted values are never scanned
//! again, so a value containing `${OTHER}` stays as-is.

use crate::core::context::SubstitutionContext;
use regex::Regex;
use std::collections::BTreeSet;
use std::sync::LazyLock;

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\$|\$\{(?P<name>[A-Za-z_][A-Za-z0-9_]*)\}").expect("placeholder regex is valid")
});

static VARIABLE_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("variable name regex is valid"));

/// A template referenced a variable the context does not define
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingVariable(pub String);

/// Replace every `${NAME}` in `template` with its value from `ctx`
pub fn substitute(template: &str, ctx: &SubstitutionContext) -> Result<String, MissingVariable> {
    let mut out = String::with_capacity(template.len());
    let mut last = 0;

    for caps in PLACEHOLDER.captures_iter(template) {
        let Some(whole) = caps.get(0) else { continue };
        out.push_str(&template[last..whole.start()]);

        match caps.name("name") {
            Some(name) => {
                let value = ctx
                    .get(name.as_str())
                    .ok_or_else(|| MissingVariable(name.as_str().to_string()))?;
                out.push_str(value);
            }
            None => out.push('$'),
        }

        last = whole.end();
    }

    out.push_str(&template[last..]);
    Ok(out)
}

/// Names referenced by `template`, in first-seen order without duplicates
pub fn referenced_variables(template: &str) -> Vec<String> {
    let mut seen = BTreeSet::new();
    PLACEHOLDER
        .captures_iter(template)
        .filter_map(|caps| caps.name("name").map(|m| m.as_str().to_string()))
        .filter(|name| seen.insert(name.clone()))
        .collect()
}

/// Check a substitution variable name
pub fn is_valid_variable_name(name: &str) -> bool {
    VARIABLE_NAME.is_match(name)
}
