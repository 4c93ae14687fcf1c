//! Row definitions for persona-state SurrealDB tables
//!
//! Tables:
//! - evaluation_runs: one row per dimension-scorer invocation
//! - evaluation_scores: one row per proposition per run
//! - correction_logs: one row per correction-pipeline attempt
//! - messages: sent chat messages (read-only evidence for the engine)
//! - agents: agent profiles with persona system prompts

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::storage_traits::{
    AgentProfile, CorrectionLog, CorrectionOutcome, CorrectionStage, Dimension,
    EvaluationRunRecord, EvaluationRunStatus, EvaluationRunUpdate, EvaluationScore,
    MessagePayload, MessageRecord, NewEvaluationRun, RunId, TokenUsage,
};

/// Module for serializing chrono DateTime to SurrealDB datetime format
mod surreal_datetime {
    use chrono::{DateTime, Utc};
    use serde::{self, Deserialize, Deserializer, Serializer};
    use surrealdb::sql::Datetime as SurrealDatetime;

    pub fn serialize<S>(date: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let sd = SurrealDatetime::from(*date);
        serde::Serialize::serialize(&sd, serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let sd = SurrealDatetime::deserialize(deserializer)?;
        Ok(DateTime::from(sd))
    }
}

/// Module for serializing optional chrono DateTime to SurrealDB datetime format
mod surreal_datetime_opt {
    use chrono::{DateTime, Utc};
    use serde::{self, Deserialize, Deserializer, Serializer};
    use surrealdb::sql::Datetime as SurrealDatetime;

    pub fn serialize<S>(date: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match date {
            Some(d) => {
                let sd = SurrealDatetime::from(*d);
                serde::Serialize::serialize(&Some(sd), serializer)
            }
            None => serde::Serialize::serialize(&None::<SurrealDatetime>, serializer),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let sd = Option::<SurrealDatetime>::deserialize(deserializer)?;
        Ok(sd.map(DateTime::from))
    }
}

/// `evaluation_runs` row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationRunRow {
    /// SurrealDB record ID
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<surrealdb::sql::Thing>,
    pub run_id: String,
    pub agent_id: String,
    pub dimensions: Vec<Dimension>,
    #[serde(with = "surreal_datetime")]
    pub window_start: DateTime<Utc>,
    #[serde(with = "surreal_datetime")]
    pub window_end: DateTime<Utc>,
    pub rules_digest: Option<String>,
    pub status: EvaluationRunStatus,
    pub sample_size: u64,
    pub overall_score: Option<f64>,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub error: Option<String>,
    #[serde(with = "surreal_datetime")]
    pub created_at: DateTime<Utc>,
    #[serde(default, with = "surreal_datetime_opt")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl EvaluationRunRow {
    /// Create a new row in `pending` state
    pub fn new(run_id: &RunId, run: NewEvaluationRun) -> Self {
        EvaluationRunRow {
            id: None,
            run_id: run_id.0.clone(),
            agent_id: run.agent_id,
            dimensions: run.dimensions,
            window_start: run.window_start,
            window_end: run.window_end,
            rules_digest: run.rules_digest,
            status: EvaluationRunStatus::Pending,
            sample_size: 0,
            overall_score: None,
            input_tokens: 0,
            output_tokens: 0,
            error: None,
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    pub fn into_record(self) -> EvaluationRunRecord {
        EvaluationRunRecord {
            run_id: RunId(self.run_id),
            agent_id: self.agent_id,
            dimensions: self.dimensions,
            window_start: self.window_start,
            window_end: self.window_end,
            rules_digest: self.rules_digest,
            status: self.status,
            sample_size: self.sample_size as usize,
            overall_score: self.overall_score,
            token_usage: TokenUsage::new(self.input_tokens, self.output_tokens),
            error: self.error,
            created_at: self.created_at,
            completed_at: self.completed_at,
        }
    }
}

/// Partial update merged into an `evaluation_runs` row
#[derive(Debug, Clone, Serialize)]
pub struct EvaluationRunPatch {
    pub status: EvaluationRunStatus,
    pub sample_size: u64,
    pub overall_score: Option<f64>,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub error: Option<String>,
    #[serde(with = "surreal_datetime_opt")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<EvaluationRunUpdate> for EvaluationRunPatch {
    fn from(update: EvaluationRunUpdate) -> Self {
        let completed_at = update.status.is_terminal().then(Utc::now);
        EvaluationRunPatch {
            status: update.status,
            sample_size: update.sample_size as u64,
            overall_score: update.overall_score,
            input_tokens: update.token_usage.input_tokens,
            output_tokens: update.token_usage.output_tokens,
            error: update.error,
            completed_at,
        }
    }
}

/// `evaluation_scores` row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationScoreRow {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<surrealdb::sql::Thing>,
    pub run_id: String,
    pub dimension: Dimension,
    pub proposition_id: String,
    pub score: f64,
    pub reasoning: String,
    pub context_snippet: Option<String>,
    #[serde(with = "surreal_datetime")]
    pub created_at: DateTime<Utc>,
}

impl From<EvaluationScore> for EvaluationScoreRow {
    fn from(score: EvaluationScore) -> Self {
        EvaluationScoreRow {
            id: None,
            run_id: score.run_id.0,
            dimension: score.dimension,
            proposition_id: score.proposition_id,
            score: score.score,
            reasoning: score.reasoning,
            context_snippet: score.context_snippet,
            created_at: Utc::now(),
        }
    }
}

impl From<EvaluationScoreRow> for EvaluationScore {
    fn from(row: EvaluationScoreRow) -> Self {
        EvaluationScore {
            run_id: RunId(row.run_id),
            dimension: row.dimension,
            proposition_id: row.proposition_id,
            score: row.score,
            reasoning: row.reasoning,
            context_snippet: row.context_snippet,
        }
    }
}

/// `correction_logs` row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrectionLogRow {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<surrealdb::sql::Thing>,
    pub log_id: String,
    pub agent_id: String,
    pub channel_id: String,
    pub stage: CorrectionStage,
    pub attempt_number: u32,
    pub outcome: Option<CorrectionOutcome>,
    pub dimension_scores: BTreeMap<String, f64>,
    pub similarity_score: Option<f64>,
    pub total_score: f64,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub duration_ms: u64,
    pub candidate_text: String,
    pub feedback: Option<String>,
    #[serde(with = "surreal_datetime")]
    pub created_at: DateTime<Utc>,
}

impl From<CorrectionLog> for CorrectionLogRow {
    fn from(log: CorrectionLog) -> Self {
        CorrectionLogRow {
            id: None,
            log_id: log.id,
            agent_id: log.agent_id,
            channel_id: log.channel_id,
            stage: log.stage,
            attempt_number: log.attempt_number,
            outcome: log.outcome,
            dimension_scores: log.dimension_scores,
            similarity_score: log.similarity_score,
            total_score: log.total_score,
            input_tokens: log.token_usage.input_tokens,
            output_tokens: log.token_usage.output_tokens,
            duration_ms: log.duration_ms,
            candidate_text: log.candidate_text,
            feedback: log.feedback,
            created_at: log.created_at,
        }
    }
}

impl From<CorrectionLogRow> for CorrectionLog {
    fn from(row: CorrectionLogRow) -> Self {
        CorrectionLog {
            id: row.log_id,
            agent_id: row.agent_id,
            channel_id: row.channel_id,
            stage: row.stage,
            attempt_number: row.attempt_number,
            outcome: row.outcome,
            dimension_scores: row.dimension_scores,
            similarity_score: row.similarity_score,
            total_score: row.total_score,
            token_usage: TokenUsage::new(row.input_tokens, row.output_tokens),
            duration_ms: row.duration_ms,
            candidate_text: row.candidate_text,
            feedback: row.feedback,
            created_at: row.created_at,
        }
    }
}

/// `messages` row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageRow {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<surrealdb::sql::Thing>,
    pub message_id: String,
    pub agent_id: String,
    pub channel_id: String,
    pub text: String,
    #[serde(with = "surreal_datetime")]
    pub created_at: DateTime<Utc>,
}

impl From<&MessageRecord> for MessageRow {
    fn from(m: &MessageRecord) -> Self {
        MessageRow {
            id: None,
            message_id: m.id.clone(),
            agent_id: m.agent_id.clone(),
            channel_id: m.payload.channel_id.clone(),
            text: m.payload.text.clone(),
            created_at: m.created_at,
        }
    }
}

impl From<MessageRow> for MessageRecord {
    fn from(row: MessageRow) -> Self {
        MessageRecord {
            id: row.message_id,
            agent_id: row.agent_id,
            payload: MessagePayload {
                text: row.text,
                channel_id: row.channel_id,
            },
            created_at: row.created_at,
        }
    }
}

/// `agents` row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRow {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<surrealdb::sql::Thing>,
    pub agent_id: String,
    pub name: String,
    pub system_prompt: String,
}

impl From<&AgentProfile> for AgentRow {
    fn from(a: &AgentProfile) -> Self {
        AgentRow {
            id: None,
            agent_id: a.id.clone(),
            name: a.name.clone(),
            system_prompt: a.system_prompt.clone(),
        }
    }
}

impl From<AgentRow> for AgentProfile {
    fn from(row: AgentRow) -> Self {
        AgentProfile {
            id: row.agent_id,
            name: row.name,
            system_prompt: row.system_prompt,
        }
    }
}
