//! Propositions and proposition files.

use persona_state::Dimension;
use serde::{Deserialize, Serialize};

use crate::domain::digest::compute_digest;
use crate::domain::error::Result;

fn default_weight() -> f64 {
    1.0
}

/// A weighted, optionally inverted claim about expected agent behaviour.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Proposition {
    pub id: String,
    pub claim: String,

    #[serde(default = "default_weight")]
    pub weight: f64,

    /// When true the claim describes undesired behaviour and the judge's
    /// score is flipped (`9 - raw`).
    #[serde(default)]
    pub inverted: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recommendations_for_improvement: Option<String>,
}

impl Proposition {
    pub fn new(id: impl Into<String>, claim: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            claim: claim.into(),
            weight: default_weight(),
            inverted: false,
            recommendations_for_improvement: None,
        }
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    pub fn inverted(mut self) -> Self {
        self.inverted = true;
        self
    }
}

/// Whether a dimension is judged per agent or per channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetType {
    Agent,
    Environment,
}

/// One dimension's rule set after defaults, merge and template filling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropositionFile {
    pub dimension: Dimension,
    pub target_type: TargetType,
    pub include_personas: bool,
    pub hard: bool,
    pub first_n: Option<usize>,
    pub last_n: Option<usize>,
    pub propositions: Vec<Proposition>,
}

impl PropositionFile {
    /// SHA-256 of the canonical JSON form; recorded on evaluation runs.
    pub fn digest(&self) -> Result<String> {
        compute_digest(&serde_json::to_value(self)?)
    }

    pub fn total_weight(&self) -> f64 {
        self.propositions.iter().map(|p| p.weight).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file() -> PropositionFile {
        PropositionFile {
            dimension: Dimension::Adherence,
            target_type: TargetType::Agent,
            include_personas: true,
            hard: false,
            first_n: None,
            last_n: None,
            propositions: vec![
                Proposition::new("p1", "speaks like a salesman"),
                Proposition::new("p2", "breaks character").with_weight(0.5).inverted(),
            ],
        }
    }

    #[test]
    fn proposition_defaults_from_json() {
        let p: Proposition =
            serde_json::from_value(serde_json::json!({"id": "x", "claim": "y"})).unwrap();
        assert_eq!(p.weight, 1.0);
        assert!(!p.inverted);
        assert!(p.recommendations_for_improvement.is_none());
    }

    #[test]
    fn digest_changes_with_content() {
        let a = file();
        let mut b = file();
        b.hard = true;
        assert_eq!(a.digest().unwrap(), file().digest().unwrap());
        assert_ne!(a.digest().unwrap(), b.digest().unwrap());
    }

    #[test]
    fn total_weight_sums() {
        assert_eq!(file().total_weight(), 1.5);
    }
}
