use crate::VariableError;
use regex::{Captures, Regex};
use std::collections::BTreeMap;
use std::sync::OnceLock;

fn placeholder_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::([^}]*))?\}")
            .unwrap_or_else(|err| panic!("placeholder pattern is valid: {err}"))
    })
}

/// Replaces every `${NAME}` and `${NAME:default}` in `raw`.
///
/// Substitution is a single left-to-right pass: text produced by a value or
/// a default is never rescanned, so a default that itself looks like a
/// placeholder is inserted verbatim.
pub fn resolve_variables(
    raw: &str,
    env: &BTreeMap<String, String>,
) -> Result<String, VariableError> {
    let mut missing: Option<String> = None;
    let resolved = placeholder_pattern().replace_all(raw, |caps: &Captures<'_>| {
        let name = &caps[1];
        if let Some(value) = env.get(name) {
            return value.clone();
        }
        match caps.get(2) {
            Some(default) => default.as_str().to_string(),
            None => {
                missing.get_or_insert_with(|| name.to_string());
                String::new()
            }
        }
    });

    match missing {
        Some(name) => Err(VariableError::MissingRequiredVariable(name)),
        None => Ok(resolved.into_owned()),
    }
}
