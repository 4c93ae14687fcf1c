//! Deterministic judge for offline and CI runs.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use persona_state::TokenUsage;

use crate::domain::{Proposition, Result, ScoringContext};
use crate::judge::{
    BatchScoreResult, IdeasExtractor, JudgeClient, PropositionCheck, RawIdeasResponse,
    ScorePropositionResult,
};
use crate::metrics::METRICS;

/// Score returned for proposition ids with no recorded response.
pub const MOCK_FALLBACK_SCORE: f64 = 7.0;

/// Minimum recorded score for `check_proposition` to report `true`.
pub const MOCK_CHECK_PASS_SCORE: f64 = 5.0;

/// Pre-recorded judge answer for one proposition id.
#[derive(Debug, Clone, PartialEq)]
pub struct MockResponse {
    pub score: f64,
    pub reasoning: String,
}

impl MockResponse {
    pub fn new(score: f64, reasoning: impl Into<String>) -> Self {
        Self {
            score,
            reasoning: reasoning.into(),
        }
    }
}

/// Judge that answers from a fixed table keyed by proposition id.
///
/// Zero token usage, no I/O, same answer every time.
#[derive(Debug, Default)]
pub struct MockJudgeClient {
    responses: HashMap<String, MockResponse>,
    ideas: Option<serde_json::Value>,
    calls: AtomicU64,
}

impl MockJudgeClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_responses(responses: HashMap<String, MockResponse>) -> Self {
        Self {
            responses,
            ..Self::default()
        }
    }

    pub fn with_response(mut self, id: impl Into<String>, score: f64, reasoning: &str) -> Self {
        self.responses
            .insert(id.into(), MockResponse::new(score, reasoning));
        self
    }

    /// Body returned by `extract_ideas`.
    pub fn with_ideas(mut self, body: serde_json::Value) -> Self {
        self.ideas = Some(body);
        self
    }

    /// Number of judge operations served so far.
    pub fn call_count(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }

    fn answer(&self, proposition: &Proposition) -> MockResponse {
        self.responses
            .get(&proposition.id)
            .cloned()
            .unwrap_or_else(|| {
                MockResponse::new(
                    MOCK_FALLBACK_SCORE,
                    format!("No recorded response for {}; using default.", proposition.id),
                )
            })
    }

    fn record_call(&self) {
        self.calls.fetch_add(1, Ordering::Relaxed);
        METRICS.inc_judge_calls();
    }

    fn score_one(&self, proposition: &Proposition) -> ScorePropositionResult {
        let answer = self.answer(proposition);
        ScorePropositionResult {
            score: answer.score,
            reasoning: answer.reasoning,
            confidence: 1.0,
            token_usage: TokenUsage::default(),
        }
    }
}

#[async_trait]
impl JudgeClient for MockJudgeClient {
    async fn check_proposition(
        &self,
        proposition: &Proposition,
        _context: &ScoringContext,
    ) -> Result<PropositionCheck> {
        self.record_call();
        let answer = self.answer(proposition);
        Ok(PropositionCheck {
            result: answer.score >= MOCK_CHECK_PASS_SCORE,
            reasoning: answer.reasoning,
            confidence: 1.0,
            token_usage: TokenUsage::default(),
        })
    }

    async fn score_proposition(
        &self,
        proposition: &Proposition,
        _context: &ScoringContext,
    ) -> Result<ScorePropositionResult> {
        self.record_call();
        Ok(self.score_one(proposition))
    }

    async fn score_propositions(
        &self,
        propositions: &[Proposition],
        _context: &ScoringContext,
    ) -> Result<BatchScoreResult> {
        self.record_call();
        Ok(BatchScoreResult {
            results: propositions.iter().map(|p| self.score_one(p)).collect(),
            token_usage: TokenUsage::default(),
        })
    }
}

#[async_trait]
impl IdeasExtractor for MockJudgeClient {
    async fn extract_ideas(&self, _transcript: &ScoringContext) -> Result<RawIdeasResponse> {
        self.record_call();
        let body = self
            .ideas
            .clone()
            .unwrap_or_else(|| serde_json::json!({ "count": 0, "ideas": [] }));
        Ok(RawIdeasResponse {
            body,
            token_usage: TokenUsage::default(),
        })
    }
}
