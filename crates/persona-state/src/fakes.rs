//! In-memory fakes for storage traits (testing and offline runs)
//!
//! Provides `MemoryMessageSource`, `MemoryAgentDirectory`,
//! `MemoryEvaluationStore` and `MemoryCorrectionLogStore` that satisfy the
//! trait contracts without any external dependencies.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::StorageError;
use crate::storage_traits::*;

fn lock<T>(mutex: &Mutex<T>) -> StorageResult<MutexGuard<'_, T>> {
    mutex
        .lock()
        .map_err(|e| StorageError::Backend(format!("lock poisoned: {e}")))
}

// ---------------------------------------------------------------------------
// MemoryMessageSource
// ---------------------------------------------------------------------------

/// In-memory message log.
#[derive(Debug, Default)]
pub struct MemoryMessageSource {
    messages: Mutex<Vec<MessageRecord>>,
}

impl MemoryMessageSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_messages(messages: Vec<MessageRecord>) -> Self {
        Self {
            messages: Mutex::new(messages),
        }
    }

    pub fn push(&self, message: MessageRecord) -> StorageResult<()> {
        lock(&self.messages)?.push(message);
        Ok(())
    }

    fn select<F>(&self, start: DateTime<Utc>, end: DateTime<Utc>, keep: F) -> StorageResult<Vec<MessageRecord>>
    where
        F: Fn(&MessageRecord) -> bool,
    {
        let messages = lock(&self.messages)?;
        let mut selected: Vec<MessageRecord> = messages
            .iter()
            .filter(|m| m.created_at >= start && m.created_at <= end && keep(m))
            .cloned()
            .collect();
        selected.sort_by_key(|m| m.created_at);
        Ok(selected)
    }
}

#[async_trait]
impl MessageSource for MemoryMessageSource {
    async fn get_agent_send_messages(
        &self,
        agent_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> StorageResult<Vec<MessageRecord>> {
        self.select(start, end, |m| m.agent_id == agent_id)
    }

    async fn get_channel_send_messages(
        &self,
        channel_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> StorageResult<Vec<MessageRecord>> {
        self.select(start, end, |m| m.payload.channel_id == channel_id)
    }
}

// ---------------------------------------------------------------------------
// MemoryAgentDirectory
// ---------------------------------------------------------------------------

/// In-memory agent directory keyed by agent id.
#[derive(Debug, Default)]
pub struct MemoryAgentDirectory {
    agents: Mutex<HashMap<String, AgentProfile>>,
}

impl MemoryAgentDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_agents(agents: Vec<AgentProfile>) -> Self {
        Self {
            agents: Mutex::new(agents.into_iter().map(|a| (a.id.clone(), a)).collect()),
        }
    }

    pub fn insert(&self, agent: AgentProfile) -> StorageResult<()> {
        lock(&self.agents)?.insert(agent.id.clone(), agent);
        Ok(())
    }
}

#[async_trait]
impl AgentDirectory for MemoryAgentDirectory {
    async fn get_agent(&self, agent_id: &str) -> StorageResult<Option<AgentProfile>> {
        Ok(lock(&self.agents)?.get(agent_id).cloned())
    }

    async fn list_agents(&self) -> StorageResult<Vec<AgentProfile>> {
        let mut agents: Vec<AgentProfile> = lock(&self.agents)?.values().cloned().collect();
        agents.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(agents)
    }
}

// ---------------------------------------------------------------------------
// MemoryEvaluationStore
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct RunState {
    record: EvaluationRunRecord,
    scores: Vec<EvaluationScore>,
}

/// In-memory evaluation store backed by a `HashMap<RunId, RunState>`.
#[derive(Debug, Default)]
pub struct MemoryEvaluationStore {
    runs: Mutex<HashMap<String, RunState>>,
}

impl MemoryEvaluationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every run record currently held, newest first.
    pub fn runs(&self) -> StorageResult<Vec<EvaluationRunRecord>> {
        let runs = lock(&self.runs)?;
        let mut records: Vec<EvaluationRunRecord> =
            runs.values().map(|s| s.record.clone()).collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(records)
    }
}

#[async_trait]
impl EvaluationStore for MemoryEvaluationStore {
    async fn create_evaluation_run(&self, run: NewEvaluationRun) -> StorageResult<RunId> {
        let run_id = RunId::new();
        let record = EvaluationRunRecord {
            run_id: run_id.clone(),
            agent_id: run.agent_id,
            dimensions: run.dimensions,
            window_start: run.window_start,
            window_end: run.window_end,
            rules_digest: run.rules_digest,
            status: EvaluationRunStatus::Pending,
            sample_size: 0,
            overall_score: None,
            token_usage: TokenUsage::default(),
            error: None,
            created_at: Utc::now(),
            completed_at: None,
        };
        lock(&self.runs)?.insert(
            run_id.0.clone(),
            RunState {
                record,
                scores: Vec::new(),
            },
        );
        Ok(run_id)
    }

    async fn update_evaluation_run_status(
        &self,
        run_id: &RunId,
        update: EvaluationRunUpdate,
    ) -> StorageResult<()> {
        let mut runs = lock(&self.runs)?;
        let state = runs
            .get_mut(&run_id.0)
            .ok_or_else(|| StorageError::RunNotFound {
                run_id: run_id.0.clone(),
            })?;
        let current = state.record.status;
        if !current.can_transition_to(update.status) {
            return Err(StorageError::InvalidRunState {
                run_id: run_id.0.clone(),
                status: current.as_str().to_string(),
                expected: format!("a status that may become {}", update.status.as_str()),
            });
        }
        let record = &mut state.record;
        record.status = update.status;
        record.sample_size = update.sample_size;
        record.overall_score = update.overall_score;
        record.token_usage = update.token_usage;
        record.error = update.error;
        if update.status.is_terminal() {
            record.completed_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn record_score(&self, score: EvaluationScore) -> StorageResult<()> {
        let mut runs = lock(&self.runs)?;
        let state = runs
            .get_mut(&score.run_id.0)
            .ok_or_else(|| StorageError::RunNotFound {
                run_id: score.run_id.0.clone(),
            })?;
        if state.record.status.is_terminal() {
            return Err(StorageError::InvalidRunState {
                run_id: score.run_id.0.clone(),
                status: state.record.status.as_str().to_string(),
                expected: "running".to_string(),
            });
        }
        state.scores.push(score);
        Ok(())
    }

    async fn get_evaluation_run(&self, run_id: &RunId) -> StorageResult<EvaluationRunRecord> {
        let runs = lock(&self.runs)?;
        runs.get(&run_id.0)
            .map(|s| s.record.clone())
            .ok_or_else(|| StorageError::RunNotFound {
                run_id: run_id.0.clone(),
            })
    }

    async fn list_scores(&self, run_id: &RunId) -> StorageResult<Vec<EvaluationScore>> {
        let runs = lock(&self.runs)?;
        runs.get(&run_id.0)
            .map(|s| s.scores.clone())
            .ok_or_else(|| StorageError::RunNotFound {
                run_id: run_id.0.clone(),
            })
    }
}

// ---------------------------------------------------------------------------
// MemoryCorrectionLogStore
// ---------------------------------------------------------------------------

/// In-memory correction log, append-only.
#[derive(Debug, Default)]
pub struct MemoryCorrectionLogStore {
    logs: Mutex<Vec<CorrectionLog>>,
}

impl MemoryCorrectionLogStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every log row, in insertion order.
    pub fn all(&self) -> StorageResult<Vec<CorrectionLog>> {
        Ok(lock(&self.logs)?.clone())
    }
}

#[async_trait]
impl CorrectionLogStore for MemoryCorrectionLogStore {
    async fn record_correction_log(&self, log: CorrectionLog) -> StorageResult<()> {
        lock(&self.logs)?.push(log);
        Ok(())
    }

    async fn list_correction_logs(&self, agent_id: &str) -> StorageResult<Vec<CorrectionLog>> {
        Ok(lock(&self.logs)?
            .iter()
            .filter(|l| l.agent_id == agent_id)
            .cloned()
            .collect())
    }
}
