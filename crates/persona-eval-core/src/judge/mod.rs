//! Judge client boundary.
//!
//! The engine touches an LLM only through these traits:
//! - `JudgeClient`: boolean check, single score, batched scores
//! - `IdeasExtractor`: structured idea extraction for the count metric
//! - `MessageRewriter`: the direct-correction pass of the correction pipeline
//!
//! `MockJudgeClient` is the deterministic offline implementation;
//! `HttpJudgeClient` talks to a chat-completions style endpoint.

pub mod http;
pub mod mock;
pub mod prompt;

use async_trait::async_trait;
use persona_state::TokenUsage;
use serde::{Deserialize, Serialize};

use crate::domain::{Proposition, Result, ScoringContext};

pub use http::{HttpJudgeClient, HttpJudgeConfig};
pub use mock::{MockJudgeClient, MockResponse, MOCK_CHECK_PASS_SCORE, MOCK_FALLBACK_SCORE};

/// Outcome of a boolean proposition check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropositionCheck {
    pub result: bool,
    pub reasoning: String,
    pub confidence: f64,
    pub token_usage: TokenUsage,
}

/// Outcome of scoring one proposition. `score` is in `[0, 9]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScorePropositionResult {
    pub score: f64,
    pub reasoning: String,
    pub confidence: f64,
    pub token_usage: TokenUsage,
}

/// Batched scores; `results` mirrors the input propositions' order and length.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchScoreResult {
    pub results: Vec<ScorePropositionResult>,
    pub token_usage: TokenUsage,
}

#[async_trait]
pub trait JudgeClient: Send + Sync {
    async fn check_proposition(
        &self,
        proposition: &Proposition,
        context: &ScoringContext,
    ) -> Result<PropositionCheck>;

    async fn score_proposition(
        &self,
        proposition: &Proposition,
        context: &ScoringContext,
    ) -> Result<ScorePropositionResult>;

    /// Score every proposition in one judge call.
    async fn score_propositions(
        &self,
        propositions: &[Proposition],
        context: &ScoringContext,
    ) -> Result<BatchScoreResult>;
}

/// Unparsed structured response from the ideas extractor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawIdeasResponse {
    pub body: serde_json::Value,
    pub token_usage: TokenUsage,
}

/// One LLM call over a whole transcript, answering `{count, ideas: [{id, description}]}`.
#[async_trait]
pub trait IdeasExtractor: Send + Sync {
    async fn extract_ideas(&self, transcript: &ScoringContext) -> Result<RawIdeasResponse>;
}

/// Input to a direct-correction rewrite.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RewriteRequest {
    pub candidate: String,
    pub feedback: String,
    pub context: ScoringContext,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RewriteResult {
    pub text: String,
    pub token_usage: TokenUsage,
}

/// A single bounded corrective LLM pass over a candidate message.
#[async_trait]
pub trait MessageRewriter: Send + Sync {
    async fn rewrite(&self, request: &RewriteRequest) -> Result<RewriteResult>;
}
