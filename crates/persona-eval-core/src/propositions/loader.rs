//! Rule-file loading and merging.
//!
//! Layout on disk:
//!
//! ```text
//! <root>/<dimension>/_default.yaml   base rule set (required)
//! <root>/<dimension>/<agent_id>.yaml per-agent override (optional)
//! ```

use std::path::{Path, PathBuf};

use persona_state::Dimension;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::domain::{EvalError, Proposition, PropositionFile, Result, TargetType};
use crate::propositions::schema::validate_rule_document;
use crate::propositions::template::{fill_template_variables, TemplateVars};

/// Environment variable naming the rules root directory.
pub const RULES_DIR_ENV: &str = "PERSONA_RULES_DIR";
const DEFAULT_RULES_DIR: &str = "rules";
const DEFAULT_FILE_NAME: &str = "_default.yaml";

/// A rule document as written: every scalar is optional so that an override
/// only replaces what it actually sets.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PropositionOverride {
    pub dimension: Dimension,
    #[serde(default)]
    pub target_type: Option<TargetType>,
    #[serde(default)]
    pub include_personas: Option<bool>,
    #[serde(default)]
    pub hard: Option<bool>,
    #[serde(default)]
    pub first_n: Option<usize>,
    #[serde(default)]
    pub last_n: Option<usize>,
    pub propositions: Vec<Proposition>,
}

impl PropositionOverride {
    /// Apply defaults. An absent `target_type` follows the dimension's scope.
    pub fn into_file(self) -> PropositionFile {
        let target_type = self
            .target_type
            .unwrap_or_else(|| default_target_type(self.dimension));
        PropositionFile {
            dimension: self.dimension,
            target_type,
            include_personas: self.include_personas.unwrap_or(true),
            hard: self.hard.unwrap_or(false),
            first_n: self.first_n,
            last_n: self.last_n,
            propositions: self.propositions,
        }
    }

    fn fill_templates(mut self, vars: &TemplateVars) -> Self {
        for p in &mut self.propositions {
            p.claim = fill_template_variables(&p.claim, vars);
        }
        self
    }
}

fn default_target_type(dimension: Dimension) -> TargetType {
    match dimension {
        Dimension::Convergence | Dimension::IdeasQuantity => TargetType::Environment,
        _ => TargetType::Agent,
    }
}

/// Parse and validate one YAML rule document without applying defaults.
fn read_rule_document(path: &Path, vars: &TemplateVars) -> Result<PropositionOverride> {
    let origin = path.display().to_string();
    let raw = std::fs::read_to_string(path)?;
    let document: serde_json::Value = serde_yaml::from_str(&raw)
        .map_err(|e| EvalError::validation(&origin, format!("invalid YAML: {e}")))?;
    validate_rule_document(&origin, &document)?;
    let parsed: PropositionOverride = serde_json::from_value(document)
        .map_err(|e| EvalError::validation(&origin, e.to_string()))?;
    Ok(parsed.fill_templates(vars))
}

/// Load one rule file: validate, apply defaults, fill `{{var}}` placeholders.
pub fn load_proposition_file(path: &Path, vars: &TemplateVars) -> Result<PropositionFile> {
    Ok(read_rule_document(path, vars)?.into_file())
}

/// Load a rule file as an override (defaults not applied).
pub fn load_override_file(path: &Path, vars: &TemplateVars) -> Result<PropositionOverride> {
    read_rule_document(path, vars)
}

/// Merge an agent override onto a base rule set.
///
/// Scalars the override sets win; proposition lists concatenate with the
/// base first. An override for a different dimension is ignored.
pub fn merge(base: PropositionFile, over: PropositionOverride) -> PropositionFile {
    if over.dimension != base.dimension {
        warn!(
            base = %base.dimension,
            override_dimension = %over.dimension,
            "ignoring rule override for a different dimension"
        );
        return base;
    }
    let mut propositions = base.propositions;
    propositions.extend(over.propositions);
    PropositionFile {
        dimension: base.dimension,
        target_type: over.target_type.unwrap_or(base.target_type),
        include_personas: over.include_personas.unwrap_or(base.include_personas),
        hard: over.hard.unwrap_or(base.hard),
        first_n: over.first_n.or(base.first_n),
        last_n: over.last_n.or(base.last_n),
        propositions,
    }
}

/// Resolves rule files under a root directory.
#[derive(Debug, Clone)]
pub struct PropositionLoader {
    root: PathBuf,
}

impl PropositionLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root from `PERSONA_RULES_DIR`, falling back to `./rules`.
    pub fn from_env() -> Self {
        let root = std::env::var(RULES_DIR_ENV).unwrap_or_else(|_| DEFAULT_RULES_DIR.to_string());
        Self::new(root)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn default_path(&self, dimension: Dimension) -> PathBuf {
        self.root.join(dimension.as_str()).join(DEFAULT_FILE_NAME)
    }

    /// Path of an agent override. Agent ids may not escape the dimension directory.
    pub fn agent_path(&self, dimension: Dimension, agent_id: &str) -> Result<PathBuf> {
        if agent_id.is_empty()
            || agent_id.starts_with('.')
            || agent_id.contains(|c| c == '/' || c == '\\')
            || agent_id.starts_with('_')
        {
            return Err(EvalError::InvalidConfig(format!(
                "invalid agent id for rule lookup: {agent_id:?}"
            )));
        }
        Ok(self
            .root
            .join(dimension.as_str())
            .join(format!("{agent_id}.yaml")))
    }

    /// Load the dimension's default rule set and merge the agent's override
    /// when one exists.
    pub fn load_propositions_for_dimension(
        &self,
        dimension: Dimension,
        agent_id: Option<&str>,
        vars: &TemplateVars,
    ) -> Result<PropositionFile> {
        let default_path = self.default_path(dimension);
        let base = load_proposition_file(&default_path, vars)?;
        if base.dimension != dimension {
            return Err(EvalError::validation(
                default_path.display().to_string(),
                format!(
                    "file declares dimension {} but lives under {}",
                    base.dimension, dimension
                ),
            ));
        }

        let Some(agent_id) = agent_id else {
            return Ok(base);
        };
        let agent_path = self.agent_path(dimension, agent_id)?;
        if !agent_path.is_file() {
            debug!(%dimension, agent_id, "no agent rule override");
            return Ok(base);
        }
        let over = load_override_file(&agent_path, vars)?;
        debug!(%dimension, agent_id, added = over.propositions.len(), "merged agent rule override");
        Ok(merge(base, over))
    }
}
