//! Proposition loader: rule files, overrides, templates and score arithmetic.

pub mod loader;
pub mod schema;
pub mod scoring;
pub mod template;

pub use loader::{
    load_override_file, load_proposition_file, merge, PropositionLoader, PropositionOverride,
    RULES_DIR_ENV,
};
pub use scoring::{
    apply_hard_mode_penalty, apply_inverted_score, clamp_score, weighted_average,
    HARD_MODE_FACTOR, MAX_SCORE,
};
pub use template::{fill_template_variables, TemplateVars};
