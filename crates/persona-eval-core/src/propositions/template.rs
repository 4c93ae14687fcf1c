//! `{{var}}` placeholder substitution in proposition claims.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

/// Variables available to claim templates (e.g. `agent_name`).
pub type TemplateVars = HashMap<String, String>;

static PLACEHOLDER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\{\{\s*([A-Za-z0-9_]+)\s*\}\}").expect("Invalid placeholder regex")
});

/// Replace every `{{name}}` whose `name` is in `vars`.
///
/// Unknown placeholders are left verbatim; substitution never fails.
pub fn fill_template_variables(text: &str, vars: &TemplateVars) -> String {
    if vars.is_empty() || !text.contains("{{") {
        return text.to_string();
    }
    PLACEHOLDER.replace_all(text, |caps: &Captures| match vars.get(&caps[1]) {
        Some(value) => value.clone(),
        None => caps[0].to_string(),
    })
    .into_owned()
}
