//! Correction pipeline configuration.

use serde::{Deserialize, Serialize};

use crate::domain::{EvalError, Result};
use crate::propositions::MAX_SCORE;

/// A per-dimension gate: the candidate must score at least `threshold`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GateConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_gate_threshold")]
    pub threshold: f64,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            threshold: default_gate_threshold(),
        }
    }
}

impl GateConfig {
    pub fn enabled(threshold: f64) -> Self {
        Self {
            enabled: true,
            threshold,
        }
    }
}

/// Maximum allowed word-set similarity to the agent's own recent messages.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SimilarityGateConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_similarity_threshold")]
    pub threshold: f64,
}

impl Default for SimilarityGateConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            threshold: default_similarity_threshold(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrectionPipelineConfig {
    #[serde(default)]
    pub persona_adherence: GateConfig,
    #[serde(default)]
    pub self_consistency: GateConfig,
    #[serde(default)]
    pub fluency: GateConfig,
    #[serde(default)]
    pub suitability: GateConfig,
    #[serde(default)]
    pub similarity: SimilarityGateConfig,
    /// Upper bound for regeneration round-trips and, separately, for direct
    /// corrections.
    #[serde(default = "default_max_attempts")]
    pub max_correction_attempts: u32,
    /// Send the best candidate instead of blocking once attempts run out.
    #[serde(default = "default_true")]
    pub continue_on_failure: bool,
    #[serde(default = "default_true")]
    pub enable_regeneration: bool,
    #[serde(default)]
    pub enable_direct_correction: bool,
    /// Prior messages the agent must have before history-based gates
    /// (self-consistency, similarity) are applied.
    #[serde(default)]
    pub minimum_required_qty_of_actions: usize,
    /// Bound on a single direct-correction call.
    #[serde(default = "default_rewrite_timeout_ms")]
    pub rewrite_timeout_ms: u64,
}

impl Default for CorrectionPipelineConfig {
    fn default() -> Self {
        Self {
            persona_adherence: GateConfig::default(),
            self_consistency: GateConfig::default(),
            fluency: GateConfig::default(),
            suitability: GateConfig::default(),
            similarity: SimilarityGateConfig::default(),
            max_correction_attempts: default_max_attempts(),
            continue_on_failure: true,
            enable_regeneration: true,
            enable_direct_correction: false,
            minimum_required_qty_of_actions: 0,
            rewrite_timeout_ms: default_rewrite_timeout_ms(),
        }
    }
}

impl CorrectionPipelineConfig {
    /// Whether any gate would run. With none the pipeline is a pass-through.
    pub fn any_gate_enabled(&self) -> bool {
        self.persona_adherence.enabled
            || self.self_consistency.enabled
            || self.fluency.enabled
            || self.suitability.enabled
            || self.similarity.enabled
    }

    pub fn validate(&self) -> Result<()> {
        for (name, gate) in [
            ("persona_adherence", &self.persona_adherence),
            ("self_consistency", &self.self_consistency),
            ("fluency", &self.fluency),
            ("suitability", &self.suitability),
        ] {
            if !(0.0..=MAX_SCORE).contains(&gate.threshold) {
                return Err(EvalError::InvalidConfig(format!(
                    "{name} threshold {} outside [0, {MAX_SCORE}]",
                    gate.threshold
                )));
            }
        }
        if !(0.0..=1.0).contains(&self.similarity.threshold) {
            return Err(EvalError::InvalidConfig(format!(
                "similarity threshold {} outside [0, 1]",
                self.similarity.threshold
            )));
        }
        if self.rewrite_timeout_ms == 0 {
            return Err(EvalError::InvalidConfig(
                "rewrite_timeout_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_gate_threshold() -> f64 {
    7.0
}

fn default_similarity_threshold() -> f64 {
    0.85
}

fn default_max_attempts() -> u32 {
    2
}

fn default_true() -> bool {
    true
}

fn default_rewrite_timeout_ms() -> u64 {
    30_000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_disable_every_gate() {
        let config = CorrectionPipelineConfig::default();
        assert!(!config.any_gate_enabled());
        assert_eq!(config.persona_adherence.threshold, 7.0);
        assert_eq!(config.similarity.threshold, 0.85);
        assert_eq!(config.max_correction_attempts, 2);
        assert!(config.continue_on_failure);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config: CorrectionPipelineConfig = serde_json::from_str(
            r#"{"fluency": {"enabled": true}, "continue_on_failure": false}"#,
        )
        .unwrap();
        assert!(config.fluency.enabled);
        assert_eq!(config.fluency.threshold, 7.0);
        assert!(!config.continue_on_failure);
        assert!(config.enable_regeneration);
        assert!(config.any_gate_enabled());
    }

    #[test]
    fn out_of_range_thresholds_rejected() {
        let mut config = CorrectionPipelineConfig::default();
        config.fluency.threshold = 9.5;
        assert!(matches!(config.validate(), Err(EvalError::InvalidConfig(_))));

        let mut config = CorrectionPipelineConfig::default();
        config.similarity.threshold = 1.2;
        assert!(config.validate().is_err());
    }
}
