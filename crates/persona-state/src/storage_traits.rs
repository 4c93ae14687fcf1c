//! Storage and collaborator trait definitions
//!
//! These traits define the narrow contracts the evaluation engine has with
//! the surrounding system:
//! - `MessageSource`: read-only access to sent chat messages
//! - `AgentDirectory`: agent profiles (name, persona system prompt)
//! - `EvaluationStore`: evaluation run lifecycle and per-proposition scores
//! - `CorrectionLogStore`: one row per correction-pipeline attempt
//!
//! All traits are async and backend-agnostic. In-memory fakes are provided
//! for testing via the `fakes` module.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StorageError;

/// Result type for storage operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;

// ---------------------------------------------------------------------------
// Shared value types
// ---------------------------------------------------------------------------

/// Evaluation dimension.
///
/// `IdeasQuantity` is a count metric; every other dimension is scored on the
/// closed `[0, 9]` scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    Adherence,
    Consistency,
    Fluency,
    Convergence,
    IdeasQuantity,
}

impl Dimension {
    /// Every known dimension, in canonical order.
    pub const ALL: [Dimension; 5] = [
        Dimension::Adherence,
        Dimension::Consistency,
        Dimension::Fluency,
        Dimension::Convergence,
        Dimension::IdeasQuantity,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Dimension::Adherence => "adherence",
            Dimension::Consistency => "consistency",
            Dimension::Fluency => "fluency",
            Dimension::Convergence => "convergence",
            Dimension::IdeasQuantity => "ideas_quantity",
        }
    }

    /// Whether this dimension produces a count instead of a 0–9 score.
    pub fn is_count(&self) -> bool {
        matches!(self, Dimension::IdeasQuantity)
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Dimension {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Dimension::ALL
            .iter()
            .copied()
            .find(|d| d.as_str() == s)
            .ok_or_else(|| format!("unknown dimension: {s}"))
    }
}

/// Token accounting for judge / LLM calls.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl TokenUsage {
    pub fn new(input_tokens: u64, output_tokens: u64) -> Self {
        Self {
            input_tokens,
            output_tokens,
        }
    }

    pub fn total(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }

    pub fn is_zero(&self) -> bool {
        self.total() == 0
    }
}

impl std::ops::Add for TokenUsage {
    type Output = TokenUsage;

    fn add(self, rhs: TokenUsage) -> TokenUsage {
        TokenUsage {
            input_tokens: self.input_tokens + rhs.input_tokens,
            output_tokens: self.output_tokens + rhs.output_tokens,
        }
    }
}

impl std::ops::AddAssign for TokenUsage {
    fn add_assign(&mut self, rhs: TokenUsage) {
        self.input_tokens += rhs.input_tokens;
        self.output_tokens += rhs.output_tokens;
    }
}

impl std::iter::Sum for TokenUsage {
    fn sum<I: Iterator<Item = TokenUsage>>(iter: I) -> Self {
        iter.fold(TokenUsage::default(), |acc, u| acc + u)
    }
}

// ---------------------------------------------------------------------------
// MessageSource — sent chat messages (read-only evidence)
// ---------------------------------------------------------------------------

/// Payload of a sent message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessagePayload {
    pub text: String,
    pub channel_id: String,
}

/// A message an agent sent to a channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRecord {
    pub id: String,
    pub agent_id: String,
    pub payload: MessagePayload,
    pub created_at: DateTime<Utc>,
}

impl MessageRecord {
    pub fn new(
        agent_id: impl Into<String>,
        channel_id: impl Into<String>,
        text: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            agent_id: agent_id.into(),
            payload: MessagePayload {
                text: text.into(),
                channel_id: channel_id.into(),
            },
            created_at,
        }
    }

    pub fn text(&self) -> &str {
        &self.payload.text
    }

    pub fn channel_id(&self) -> &str {
        &self.payload.channel_id
    }
}

/// Read-only source of sent messages.
///
/// Guarantees:
/// - Windows are inclusive on both ends.
/// - Results are ordered oldest first.
#[async_trait]
pub trait MessageSource: Send + Sync {
    /// Messages sent by `agent_id` within `[start, end]`.
    async fn get_agent_send_messages(
        &self,
        agent_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> StorageResult<Vec<MessageRecord>>;

    /// Messages sent by any agent to `channel_id` within `[start, end]`.
    async fn get_channel_send_messages(
        &self,
        channel_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> StorageResult<Vec<MessageRecord>>;
}

// ---------------------------------------------------------------------------
// AgentDirectory — persona profiles
// ---------------------------------------------------------------------------

/// An agent and its persona system prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentProfile {
    pub id: String,
    pub name: String,
    pub system_prompt: String,
}

impl AgentProfile {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        system_prompt: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            system_prompt: system_prompt.into(),
        }
    }
}

/// Lookup of agent profiles. Unknown ids yield `Ok(None)`.
#[async_trait]
pub trait AgentDirectory: Send + Sync {
    async fn get_agent(&self, agent_id: &str) -> StorageResult<Option<AgentProfile>>;

    async fn list_agents(&self) -> StorageResult<Vec<AgentProfile>>;
}

// ---------------------------------------------------------------------------
// EvaluationStore — evaluation run lifecycle
// ---------------------------------------------------------------------------

/// Unique identifier for an evaluation run
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(pub String);

impl RunId {
    /// Generate a new random RunId
    pub fn new() -> Self {
        RunId(uuid::Uuid::new_v4().to_string())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Status of an evaluation run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvaluationRunStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl EvaluationRunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EvaluationRunStatus::Pending => "pending",
            EvaluationRunStatus::Running => "running",
            EvaluationRunStatus::Completed => "completed",
            EvaluationRunStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            EvaluationRunStatus::Completed | EvaluationRunStatus::Failed
        )
    }

    /// Allowed transitions: pending → running | failed, running → completed | failed.
    pub fn can_transition_to(&self, next: EvaluationRunStatus) -> bool {
        use EvaluationRunStatus::*;
        matches!(
            (self, next),
            (Pending, Running) | (Pending, Failed) | (Running, Completed) | (Running, Failed)
        )
    }
}

impl FromStr for EvaluationRunStatus {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(EvaluationRunStatus::Pending),
            "running" => Ok(EvaluationRunStatus::Running),
            "completed" => Ok(EvaluationRunStatus::Completed),
            "failed" => Ok(EvaluationRunStatus::Failed),
            other => Err(StorageError::Backend(format!(
                "unknown evaluation run status: {other}"
            ))),
        }
    }
}

/// Fields supplied when an evaluation run is created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewEvaluationRun {
    /// Agent being evaluated. Environment-scoped dimensions use a proxy agent id.
    pub agent_id: String,
    pub dimensions: Vec<Dimension>,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    /// SHA-256 of the proposition file used, if any.
    pub rules_digest: Option<String>,
}

/// Status change plus the figures known at that point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationRunUpdate {
    pub status: EvaluationRunStatus,
    pub sample_size: usize,
    pub overall_score: Option<f64>,
    pub token_usage: TokenUsage,
    pub error: Option<String>,
}

impl EvaluationRunUpdate {
    pub fn running() -> Self {
        Self {
            status: EvaluationRunStatus::Running,
            sample_size: 0,
            overall_score: None,
            token_usage: TokenUsage::default(),
            error: None,
        }
    }

    pub fn completed(sample_size: usize, overall_score: Option<f64>, usage: TokenUsage) -> Self {
        Self {
            status: EvaluationRunStatus::Completed,
            sample_size,
            overall_score,
            token_usage: usage,
            error: None,
        }
    }

    pub fn failed(usage: TokenUsage, error: impl Into<String>) -> Self {
        Self {
            status: EvaluationRunStatus::Failed,
            sample_size: 0,
            overall_score: None,
            token_usage: usage,
            error: Some(error.into()),
        }
    }
}

/// Full evaluation run record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationRunRecord {
    pub run_id: RunId,
    pub agent_id: String,
    pub dimensions: Vec<Dimension>,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub rules_digest: Option<String>,
    pub status: EvaluationRunStatus,
    pub sample_size: usize,
    pub overall_score: Option<f64>,
    pub token_usage: TokenUsage,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// One score row per proposition per run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationScore {
    pub run_id: RunId,
    pub dimension: Dimension,
    pub proposition_id: String,
    /// Final score in `[0, 9]` after inversion and hard-mode penalty.
    pub score: f64,
    pub reasoning: String,
    pub context_snippet: Option<String>,
}

/// Evaluation run persistence.
///
/// Guarantees:
/// - A run is created `pending` and transitions
///   pending → running → completed | failed.
/// - Terminal runs are immutable.
#[async_trait]
pub trait EvaluationStore: Send + Sync {
    /// Create a new run in `pending` state, returning its id.
    async fn create_evaluation_run(&self, run: NewEvaluationRun) -> StorageResult<RunId>;

    /// Move a run to a new status. Fails with `InvalidRunState` on a
    /// disallowed transition.
    async fn update_evaluation_run_status(
        &self,
        run_id: &RunId,
        update: EvaluationRunUpdate,
    ) -> StorageResult<()>;

    /// Persist one proposition score for a run.
    async fn record_score(&self, score: EvaluationScore) -> StorageResult<()>;

    /// Retrieve a run record by id.
    async fn get_evaluation_run(&self, run_id: &RunId) -> StorageResult<EvaluationRunRecord>;

    /// All scores recorded for a run, in insertion order.
    async fn list_scores(&self, run_id: &RunId) -> StorageResult<Vec<EvaluationScore>>;
}

// ---------------------------------------------------------------------------
// CorrectionLogStore — correction pipeline audit trail
// ---------------------------------------------------------------------------

/// Stage of the correction pipeline an attempt belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorrectionStage {
    Original,
    Regeneration,
    DirectCorrection,
}

impl CorrectionStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            CorrectionStage::Original => "original",
            CorrectionStage::Regeneration => "regeneration",
            CorrectionStage::DirectCorrection => "direct_correction",
        }
    }
}

/// Terminal outcome of a correction attempt.
///
/// Attempts that fail a gate and hand control to another stage carry no
/// outcome (`None` on the log row).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorrectionOutcome {
    Passed,
    RegenerationSuccess,
    DirectCorrectionSuccess,
    ForcedThrough,
    TimeoutPassThrough,
}

impl CorrectionOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            CorrectionOutcome::Passed => "passed",
            CorrectionOutcome::RegenerationSuccess => "regeneration_success",
            CorrectionOutcome::DirectCorrectionSuccess => "direct_correction_success",
            CorrectionOutcome::ForcedThrough => "forced_through",
            CorrectionOutcome::TimeoutPassThrough => "timeout_pass_through",
        }
    }
}

/// One row per correction attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrectionLog {
    pub id: String,
    pub agent_id: String,
    pub channel_id: String,
    pub stage: CorrectionStage,
    pub attempt_number: u32,
    pub outcome: Option<CorrectionOutcome>,
    /// Gate name → score in `[0, 9]`.
    pub dimension_scores: BTreeMap<String, f64>,
    pub similarity_score: Option<f64>,
    pub total_score: f64,
    pub token_usage: TokenUsage,
    pub duration_ms: u64,
    pub candidate_text: String,
    pub feedback: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Correction attempt persistence.
#[async_trait]
pub trait CorrectionLogStore: Send + Sync {
    async fn record_correction_log(&self, log: CorrectionLog) -> StorageResult<()>;

    /// Logs for an agent, oldest first.
    async fn list_correction_logs(&self, agent_id: &str) -> StorageResult<Vec<CorrectionLog>>;
}
