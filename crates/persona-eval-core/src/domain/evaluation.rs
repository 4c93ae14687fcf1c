//! Results produced by the dimension scorers.

use chrono::{DateTime, Utc};
use persona_state::{Dimension, RunId, TokenUsage};
use serde::{Deserialize, Serialize};

/// Inclusive time window evidence is drawn from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl EvaluationWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }
}

/// Aggregated outcome for one proposition across every sampled item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropositionOutcome {
    pub proposition_id: String,
    pub weight: f64,
    /// Mean of the judge's raw scores, before inversion and penalty.
    pub mean_raw_score: f64,
    /// Mean after inversion then hard-mode penalty; always in `[0, 9]`.
    pub final_score: f64,
    pub worst_score: f64,
    pub worst_reasoning: String,
    pub samples: usize,
}

/// Result of one 0–9 dimension scorer invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DimensionEvaluation {
    /// `None` when no run row was created (empty environment input).
    pub run_id: Option<RunId>,
    pub dimension: Dimension,
    /// `None` is a cold start: nothing to compare against.
    pub overall_score: Option<f64>,
    pub sample_size: usize,
    pub token_usage: TokenUsage,
    pub propositions: Vec<PropositionOutcome>,
}

impl DimensionEvaluation {
    /// Fixed perfect score for an empty sample.
    pub fn empty(run_id: Option<RunId>, dimension: Dimension) -> Self {
        Self {
            run_id,
            dimension,
            overall_score: Some(crate::MAX_SCORE),
            sample_size: 0,
            token_usage: TokenUsage::default(),
            propositions: Vec::new(),
        }
    }

    /// Null score: no evidence to judge against.
    pub fn cold_start(run_id: Option<RunId>, dimension: Dimension) -> Self {
        Self {
            run_id,
            dimension,
            overall_score: None,
            sample_size: 0,
            token_usage: TokenUsage::default(),
            propositions: Vec::new(),
        }
    }
}

/// A distinct idea surfaced in a channel transcript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Idea {
    pub id: String,
    pub description: String,
}

/// Result of the ideas-quantity count metric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdeasEvaluation {
    pub run_id: Option<RunId>,
    pub count: u64,
    pub ideas: Vec<Idea>,
    pub token_usage: TokenUsage,
}
