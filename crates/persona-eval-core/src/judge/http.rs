//! Judge client over a JSON chat-completions style HTTP endpoint.

use std::time::Duration;

use async_trait::async_trait;
use persona_state::TokenUsage;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::domain::{EvalError, Proposition, Result, ScoringContext};
use crate::judge::prompt;
use crate::judge::{
    BatchScoreResult, IdeasExtractor, JudgeClient, MessageRewriter, PropositionCheck,
    RawIdeasResponse, RewriteRequest, RewriteResult, ScorePropositionResult,
};
use crate::metrics::METRICS;

const DEFAULT_URL: &str = "http://localhost:11434/v1/chat/completions";
const DEFAULT_MODEL: &str = "gpt-4o-mini";
const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// HTTP judge configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpJudgeConfig {
    /// Full URL of the chat-completions endpoint
    pub url: String,
    pub model: String,
    /// Sent as a bearer token when present
    pub api_key: Option<String>,
    pub timeout_secs: u64,
}

impl Default for HttpJudgeConfig {
    fn default() -> Self {
        HttpJudgeConfig {
            url: DEFAULT_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            api_key: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl HttpJudgeConfig {
    /// Reads `PERSONA_JUDGE_URL`, `PERSONA_JUDGE_MODEL`, `PERSONA_JUDGE_API_KEY`
    /// and `PERSONA_JUDGE_TIMEOUT_SECS`, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        HttpJudgeConfig {
            url: std::env::var("PERSONA_JUDGE_URL").unwrap_or(defaults.url),
            model: std::env::var("PERSONA_JUDGE_MODEL").unwrap_or(defaults.model),
            api_key: std::env::var("PERSONA_JUDGE_API_KEY").ok(),
            timeout_secs: std::env::var("PERSONA_JUDGE_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.timeout_secs),
        }
    }

    pub fn new(url: &str, model: &str) -> Self {
        HttpJudgeConfig {
            url: url.to_string(),
            model: model.to_string(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
    #[serde(default)]
    usage: Option<CompletionUsage>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Debug, Deserialize)]
struct CompletionMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CompletionUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

/// LLM judge, idea extractor and message rewriter backed by one endpoint.
pub struct HttpJudgeClient {
    config: HttpJudgeConfig,
    http_client: reqwest::Client,
}

impl HttpJudgeClient {
    pub fn new(config: HttpJudgeConfig) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(concat!("persona-eval/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| EvalError::InvalidConfig(format!("failed to build HTTP client: {e}")))?;
        Ok(HttpJudgeClient {
            config,
            http_client,
        })
    }

    pub fn from_env() -> Result<Self> {
        Self::new(HttpJudgeConfig::from_env())
    }

    pub fn config(&self) -> &HttpJudgeConfig {
        &self.config
    }

    /// One completion call; returns the parsed JSON reply and its token usage.
    async fn complete_json(&self, system: &str, user: String) -> Result<(Value, TokenUsage)> {
        let body = json!({
            "model": self.config.model,
            "temperature": 0,
            "response_format": { "type": "json_object" },
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": user },
            ],
        });

        let mut request = self.http_client.post(&self.config.url).json(&body);
        if let Some(key) = &self.config.api_key {
            request = request.bearer_auth(key);
        }

        METRICS.inc_judge_calls();
        let response = request
            .send()
            .await
            .map_err(|e| EvalError::Judge(format!("judge request failed: {e}")))?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            warn!(%status, "judge endpoint returned an error");
            return Err(EvalError::Judge(format!("judge returned {status}: {text}")));
        }
        let parsed: CompletionResponse = response
            .json()
            .await
            .map_err(|e| EvalError::Judge(format!("malformed judge response: {e}")))?;

        let usage = parsed
            .usage
            .map(|u| TokenUsage::new(u.prompt_tokens, u.completion_tokens))
            .unwrap_or_default();
        METRICS.add_tokens(usage.total());

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| EvalError::Judge("judge response had no content".to_string()))?;
        debug!(tokens = usage.total(), "judge call complete");
        Ok((prompt::extract_json_object(&content)?, usage))
    }
}

#[async_trait]
impl JudgeClient for HttpJudgeClient {
    async fn check_proposition(
        &self,
        proposition: &Proposition,
        context: &ScoringContext,
    ) -> Result<PropositionCheck> {
        let (reply, token_usage) = self
            .complete_json(
                prompt::JUDGE_SYSTEM_PROMPT,
                prompt::check_prompt(proposition, context),
            )
            .await?;
        let (result, reasoning, confidence) = prompt::parse_check(&reply)?;
        Ok(PropositionCheck {
            result,
            reasoning,
            confidence,
            token_usage,
        })
    }

    async fn score_proposition(
        &self,
        proposition: &Proposition,
        context: &ScoringContext,
    ) -> Result<ScorePropositionResult> {
        let (reply, token_usage) = self
            .complete_json(
                prompt::JUDGE_SYSTEM_PROMPT,
                prompt::score_prompt(proposition, context),
            )
            .await?;
        let (score, reasoning, confidence) = prompt::parse_score(&reply)?;
        Ok(ScorePropositionResult {
            score,
            reasoning,
            confidence,
            token_usage,
        })
    }

    async fn score_propositions(
        &self,
        propositions: &[Proposition],
        context: &ScoringContext,
    ) -> Result<BatchScoreResult> {
        if propositions.is_empty() {
            return Ok(BatchScoreResult {
                results: Vec::new(),
                token_usage: TokenUsage::default(),
            });
        }
        let (reply, token_usage) = self
            .complete_json(
                prompt::JUDGE_SYSTEM_PROMPT,
                prompt::batch_score_prompt(propositions, context),
            )
            .await?;
        let parsed = prompt::parse_batch(&reply, propositions.len())?;
        // The call's usage is reported once on the batch, not per item.
        let results = parsed
            .into_iter()
            .map(|(score, reasoning, confidence)| ScorePropositionResult {
                score,
                reasoning,
                confidence,
                token_usage: TokenUsage::default(),
            })
            .collect();
        Ok(BatchScoreResult {
            results,
            token_usage,
        })
    }
}

#[async_trait]
impl IdeasExtractor for HttpJudgeClient {
    async fn extract_ideas(&self, transcript: &ScoringContext) -> Result<RawIdeasResponse> {
        let (body, token_usage) = self
            .complete_json(prompt::JUDGE_SYSTEM_PROMPT, prompt::ideas_prompt(transcript))
            .await?;
        Ok(RawIdeasResponse { body, token_usage })
    }
}

#[async_trait]
impl MessageRewriter for HttpJudgeClient {
    async fn rewrite(&self, request: &RewriteRequest) -> Result<RewriteResult> {
        let (reply, token_usage) = self
            .complete_json(
                prompt::REWRITE_SYSTEM_PROMPT,
                prompt::rewrite_prompt(&request.candidate, &request.feedback, &request.context),
            )
            .await?;
        Ok(RewriteResult {
            text: prompt::parse_rewrite(&reply)?,
            token_usage,
        })
    }
}
