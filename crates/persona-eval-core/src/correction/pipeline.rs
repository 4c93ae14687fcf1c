//! Pre-send correction pipeline.
//!
//! Gates one candidate message before it is persisted. Each assessment
//! writes one correction-log row; the state machine in `state` decides what
//! happens next.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::future::join_all;
use persona_state::{
    AgentDirectory, AgentProfile, CorrectionLog, CorrectionLogStore, CorrectionOutcome,
    CorrectionStage, Dimension, MessageRecord, MessageSource, TokenUsage,
};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::correction::config::CorrectionPipelineConfig;
use crate::correction::state::{next_step, CorrectionStep, StepInput};
use crate::domain::{EvalError, Proposition, Result, ScoringContext, TrajectoryEntry};
use crate::judge::{JudgeClient, MessageRewriter, RewriteRequest};
use crate::metrics::METRICS;
use crate::obs;
use crate::propositions::{clamp_score, PropositionLoader, MAX_SCORE};
use crate::scorers::aggregate::aggregate;
use crate::scorers::agent_template_vars;
use crate::scorers::text_stats::text_similarity;

/// How far back recent messages are gathered for gate context.
pub const CONTEXT_LOOKBACK_HOURS: i64 = 24;
/// Recent messages kept per source.
pub const CONTEXT_MESSAGES: usize = 10;
pub const SUITABILITY_PROPOSITION_ID: &str = "suitability";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Gate {
    PersonaAdherence,
    SelfConsistency,
    Fluency,
    Suitability,
}

impl Gate {
    pub fn as_str(&self) -> &'static str {
        match self {
            Gate::PersonaAdherence => "persona_adherence",
            Gate::SelfConsistency => "self_consistency",
            Gate::Fluency => "fluency",
            Gate::Suitability => "suitability",
        }
    }

    /// Rule set a gate is scored with; suitability uses a built-in claim.
    pub fn rules_dimension(&self) -> Option<Dimension> {
        match self {
            Gate::PersonaAdherence => Some(Dimension::Adherence),
            Gate::SelfConsistency => Some(Dimension::Consistency),
            Gate::Fluency => Some(Dimension::Fluency),
            Gate::Suitability => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateScore {
    pub gate: Gate,
    pub score: f64,
    pub threshold: f64,
    pub passed: bool,
    pub reasoning: String,
}

/// Every enabled gate's verdict on one candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assessment {
    pub gates: Vec<GateScore>,
    pub similarity: Option<f64>,
    pub similarity_passed: bool,
    /// Mean of gate scores; `9 × (1 − similarity)` when only the similarity
    /// gate ran; 9 when nothing ran.
    pub total_score: f64,
    pub token_usage: TokenUsage,
    pub passed: bool,
}

impl Assessment {
    /// Feedback describing each failed gate, for the generating agent or the
    /// rewriter.
    pub fn feedback(&self, similarity_threshold: f64) -> String {
        let mut parts: Vec<String> = self
            .gates
            .iter()
            .filter(|g| !g.passed)
            .map(|g| {
                let mut line = format!(
                    "{} scored {:.1} (needs {:.1})",
                    g.gate.as_str(),
                    g.score,
                    g.threshold
                );
                if !g.reasoning.is_empty() {
                    line.push_str(": ");
                    line.push_str(&g.reasoning);
                }
                line
            })
            .collect();
        if let (Some(s), false) = (self.similarity, self.similarity_passed) {
            parts.push(format!(
                "too similar to your recent messages ({s:.2}, max {similarity_threshold:.2}); say something new"
            ));
        }
        format!("Message did not pass review. {}", parts.join("; "))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum CorrectionDecision {
    /// Persist and send `text`.
    Send {
        text: String,
        outcome: CorrectionOutcome,
    },
    /// Nothing is sent; the caller regenerates using `feedback`.
    Regenerate { feedback: String },
}

/// Per-message state carried across regeneration round-trips.
#[derive(Debug, Clone)]
pub struct CorrectionSession {
    agent_id: String,
    channel_id: String,
    regenerations_used: u32,
    corrections_used: u32,
    attempts: u32,
    best: Option<(String, f64)>,
    deadline: Option<Instant>,
    finished: bool,
}

impl CorrectionSession {
    pub fn new(agent_id: impl Into<String>, channel_id: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            channel_id: channel_id.into(),
            regenerations_used: 0,
            corrections_used: 0,
            attempts: 0,
            best: None,
            deadline: None,
            finished: false,
        }
    }

    /// Impose a wall-clock budget for the whole message.
    pub fn with_deadline(mut self, budget: Duration) -> Self {
        self.deadline = Some(Instant::now() + budget);
        self
    }

    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    pub fn channel_id(&self) -> &str {
        &self.channel_id
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn regenerations_used(&self) -> u32 {
        self.regenerations_used
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    fn deadline_expired(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    fn record_candidate(&mut self, text: &str, total_score: f64) {
        if self.best.as_ref().map_or(true, |(_, best)| total_score > *best) {
            self.best = Some((text.to_string(), total_score));
        }
    }
}

/// Collaborators the pipeline calls out to.
#[derive(Clone)]
pub struct CorrectionDeps {
    pub judge: Arc<dyn JudgeClient>,
    pub rewriter: Arc<dyn MessageRewriter>,
    pub messages: Arc<dyn MessageSource>,
    pub agents: Arc<dyn AgentDirectory>,
    pub logs: Arc<dyn CorrectionLogStore>,
    pub loader: PropositionLoader,
}

struct Evidence {
    agent: AgentProfile,
    /// Messages the agent sent in the lookback, before truncation.
    prior_actions: usize,
    own_recent: Vec<MessageRecord>,
    channel_recent: Vec<MessageRecord>,
}

impl Evidence {
    fn speaker(&self, m: &MessageRecord) -> String {
        if m.agent_id == self.agent.id {
            self.agent.name.clone()
        } else {
            m.agent_id.clone()
        }
    }

    fn channel_context(&self, candidate: &str) -> ScoringContext {
        let mut trajectory: Vec<TrajectoryEntry> = self
            .channel_recent
            .iter()
            .map(|m| TrajectoryEntry::stimulus(self.speaker(m), m.text()))
            .collect();
        trajectory.push(TrajectoryEntry::action(self.agent.name.clone(), candidate));
        ScoringContext::new(trajectory)
    }

    fn history_context(&self, candidate: &str) -> ScoringContext {
        let mut trajectory: Vec<TrajectoryEntry> = self
            .own_recent
            .iter()
            .map(|m| {
                TrajectoryEntry::stimulus(
                    self.agent.name.clone(),
                    format!("[Earlier message] {}", m.text()),
                )
            })
            .collect();
        trajectory.push(TrajectoryEntry::action(
            self.agent.name.clone(),
            format!("[Recent message] {candidate}"),
        ));
        ScoringContext::new(trajectory)
    }
}

/// Highest word-set similarity between `candidate` and any prior message.
pub fn max_similarity(candidate: &str, prior: &[MessageRecord]) -> f64 {
    prior
        .iter()
        .map(|m| text_similarity(candidate, m.text()))
        .fold(0.0, f64::max)
}

fn suitability_proposition(agent_name: &str) -> Proposition {
    Proposition::new(
        SUITABILITY_PROPOSITION_ID,
        format!(
            "{agent_name}'s latest message is a relevant, appropriate reply to the conversation so far"
        ),
    )
}

fn last_n(mut messages: Vec<MessageRecord>, n: usize) -> Vec<MessageRecord> {
    if messages.len() > n {
        messages.drain(..messages.len() - n);
    }
    messages
}

pub struct CorrectionPipeline {
    config: CorrectionPipelineConfig,
    deps: CorrectionDeps,
}

impl CorrectionPipeline {
    pub fn new(config: CorrectionPipelineConfig, deps: CorrectionDeps) -> Result<Self> {
        config.validate()?;
        Ok(Self { config, deps })
    }

    pub fn config(&self) -> &CorrectionPipelineConfig {
        &self.config
    }

    /// Gate `candidate` for the session's agent and channel.
    ///
    /// Runs to completion, including any direct-correction passes, before
    /// returning. A blocked send is `Err(EvalError::MessageBlocked)`.
    pub async fn evaluate(
        &self,
        session: &mut CorrectionSession,
        candidate: &str,
    ) -> Result<CorrectionDecision> {
        if session.finished {
            return Err(EvalError::InvalidConfig(
                "correction session already finished".to_string(),
            ));
        }
        if !self.config.any_gate_enabled() {
            session.finished = true;
            return Ok(CorrectionDecision::Send {
                text: candidate.to_string(),
                outcome: CorrectionOutcome::Passed,
            });
        }

        let evidence = self.gather(&session.agent_id, &session.channel_id).await?;
        let mut stage = if session.regenerations_used > 0 {
            CorrectionStage::Regeneration
        } else {
            CorrectionStage::Original
        };
        let mut text = candidate.to_string();
        let mut carried = TokenUsage::default();

        loop {
            let started = Instant::now();
            let mut assessment = self.assess(&evidence, &text).await?;
            assessment.token_usage += carried;
            carried = TokenUsage::default();
            session.attempts += 1;
            session.record_candidate(&text, assessment.total_score);
            METRICS.inc_corrections_attempted();

            let step = next_step(
                &self.config,
                &StepInput {
                    passed: assessment.passed,
                    deadline_expired: session.deadline_expired(),
                    regenerations_used: session.regenerations_used,
                    corrections_used: session.corrections_used,
                },
            );
            let outcome = step.outcome(stage);
            let feedback =
                (!assessment.passed).then(|| assessment.feedback(self.config.similarity.threshold));
            debug!(
                agent_id = %session.agent_id,
                attempt = session.attempts,
                ?step,
                total_score = assessment.total_score,
                "correction step"
            );
            // A correction attempt is logged once its rewrite resolves.
            if step != CorrectionStep::Correct {
                self.write_log(
                    session,
                    stage,
                    outcome,
                    &assessment,
                    &text,
                    feedback.clone(),
                    started.elapsed(),
                )
                .await;
            }

            match step {
                CorrectionStep::Pass | CorrectionStep::Timeout => {
                    session.finished = true;
                    return Ok(CorrectionDecision::Send {
                        text,
                        outcome: outcome.unwrap_or(CorrectionOutcome::Passed),
                    });
                }
                CorrectionStep::Force => {
                    session.finished = true;
                    let text = session.best.take().map(|(best, _)| best).unwrap_or(text);
                    return Ok(CorrectionDecision::Send {
                        text,
                        outcome: CorrectionOutcome::ForcedThrough,
                    });
                }
                CorrectionStep::Fail => {
                    session.finished = true;
                    METRICS.inc_messages_blocked();
                    let reason = feedback.unwrap_or_default();
                    warn!(agent_id = %session.agent_id, attempt = session.attempts, "message blocked");
                    return Err(EvalError::MessageBlocked(reason));
                }
                CorrectionStep::Retry => {
                    session.regenerations_used += 1;
                    return Ok(CorrectionDecision::Regenerate {
                        feedback: feedback.unwrap_or_default(),
                    });
                }
                CorrectionStep::Correct => {
                    session.corrections_used += 1;
                    let feedback = feedback.unwrap_or_default();
                    let request = RewriteRequest {
                        candidate: text.clone(),
                        feedback: feedback.clone(),
                        context: evidence.channel_context(&text),
                    };
                    let budget = self.rewrite_budget(session);
                    let rewritten =
                        tokio::time::timeout(budget, self.deps.rewriter.rewrite(&request)).await;
                    let outcome = match rewritten {
                        Err(_) => Some(CorrectionOutcome::TimeoutPassThrough),
                        Ok(_) => None,
                    };
                    self.write_log(
                        session,
                        stage,
                        outcome,
                        &assessment,
                        &text,
                        Some(feedback),
                        started.elapsed(),
                    )
                    .await;

                    match rewritten {
                        Ok(Ok(rewritten)) => {
                            carried = rewritten.token_usage;
                            text = rewritten.text;
                            stage = CorrectionStage::DirectCorrection;
                        }
                        Ok(Err(e)) => {
                            session.finished = true;
                            return Err(e);
                        }
                        Err(_) => {
                            warn!(
                                agent_id = %session.agent_id,
                                budget_ms = budget.as_millis() as u64,
                                "direct correction timed out; sending last candidate"
                            );
                            session.finished = true;
                            return Ok(CorrectionDecision::Send {
                                text,
                                outcome: CorrectionOutcome::TimeoutPassThrough,
                            });
                        }
                    }
                }
            }
        }
    }

    fn rewrite_budget(&self, session: &CorrectionSession) -> Duration {
        let configured = Duration::from_millis(self.config.rewrite_timeout_ms);
        session
            .remaining()
            .map_or(configured, |left| left.min(configured))
    }

    async fn gather(&self, agent_id: &str, channel_id: &str) -> Result<Evidence> {
        let agent = self
            .deps
            .agents
            .get_agent(agent_id)
            .await?
            .ok_or_else(|| EvalError::NotFound(format!("agent {agent_id}")))?;
        let end = Utc::now();
        let start = end - chrono::Duration::hours(CONTEXT_LOOKBACK_HOURS);
        let own = self
            .deps
            .messages
            .get_agent_send_messages(agent_id, start, end)
            .await?;
        let channel = self
            .deps
            .messages
            .get_channel_send_messages(channel_id, start, end)
            .await?;
        Ok(Evidence {
            agent,
            prior_actions: own.len(),
            own_recent: last_n(own, CONTEXT_MESSAGES),
            channel_recent: last_n(channel, CONTEXT_MESSAGES),
        })
    }

    async fn assess(&self, evidence: &Evidence, text: &str) -> Result<Assessment> {
        let has_history =
            evidence.prior_actions >= self.config.minimum_required_qty_of_actions;

        let mut enabled: Vec<(Gate, f64)> = Vec::new();
        if self.config.persona_adherence.enabled {
            enabled.push((Gate::PersonaAdherence, self.config.persona_adherence.threshold));
        }
        // Nothing to be inconsistent with yet.
        if self.config.self_consistency.enabled && has_history && !evidence.own_recent.is_empty()
        {
            enabled.push((Gate::SelfConsistency, self.config.self_consistency.threshold));
        }
        if self.config.fluency.enabled {
            enabled.push((Gate::Fluency, self.config.fluency.threshold));
        }
        if self.config.suitability.enabled {
            enabled.push((Gate::Suitability, self.config.suitability.threshold));
        }

        let results = join_all(
            enabled
                .iter()
                .map(|(gate, threshold)| self.score_gate(*gate, *threshold, evidence, text)),
        )
        .await;
        let mut gates = Vec::with_capacity(results.len());
        let mut token_usage = TokenUsage::default();
        for result in results {
            let (score, usage) = result?;
            token_usage += usage;
            gates.push(score);
        }

        let similarity = (self.config.similarity.enabled && has_history)
            .then(|| max_similarity(text, &evidence.own_recent));
        let similarity_passed = similarity.map_or(true, |s| s <= self.config.similarity.threshold);

        let total_score = if !gates.is_empty() {
            gates.iter().map(|g| g.score).sum::<f64>() / gates.len() as f64
        } else if let Some(s) = similarity {
            MAX_SCORE * (1.0 - s)
        } else {
            MAX_SCORE
        };
        let passed = gates.iter().all(|g| g.passed) && similarity_passed;

        Ok(Assessment {
            gates,
            similarity,
            similarity_passed,
            total_score,
            token_usage,
            passed,
        })
    }

    async fn score_gate(
        &self,
        gate: Gate,
        threshold: f64,
        evidence: &Evidence,
        text: &str,
    ) -> Result<(GateScore, TokenUsage)> {
        let (score, reasoning, usage) = match gate.rules_dimension() {
            Some(dimension) => {
                let file = self.deps.loader.load_propositions_for_dimension(
                    dimension,
                    Some(&evidence.agent.id),
                    &agent_template_vars(&evidence.agent),
                )?;
                let context = match gate {
                    Gate::SelfConsistency => evidence.history_context(text),
                    Gate::PersonaAdherence => evidence
                        .channel_context(text)
                        .with_persona(evidence.agent.system_prompt.clone()),
                    _ if file.include_personas => evidence
                        .channel_context(text)
                        .with_persona(evidence.agent.system_prompt.clone()),
                    _ => evidence.channel_context(text),
                }
                .windowed(file.first_n, file.last_n);
                let batch = self
                    .deps
                    .judge
                    .score_propositions(&file.propositions, &context)
                    .await?;
                let usage = batch.token_usage;
                let aggregated = aggregate(&file, std::slice::from_ref(&batch))?;
                let reasoning = aggregated
                    .outcomes
                    .iter()
                    .min_by(|a, b| a.final_score.total_cmp(&b.final_score))
                    .map(|o| o.worst_reasoning.clone())
                    .unwrap_or_default();
                (aggregated.overall_score, reasoning, usage)
            }
            None => {
                let proposition = suitability_proposition(&evidence.agent.name);
                let result = self
                    .deps
                    .judge
                    .score_proposition(&proposition, &evidence.channel_context(text))
                    .await?;
                (clamp_score(result.score), result.reasoning, result.token_usage)
            }
        };
        Ok((
            GateScore {
                gate,
                score,
                threshold,
                passed: score >= threshold,
                reasoning,
            },
            usage,
        ))
    }

    #[allow(clippy::too_many_arguments)]
    async fn write_log(
        &self,
        session: &CorrectionSession,
        stage: CorrectionStage,
        outcome: Option<CorrectionOutcome>,
        assessment: &Assessment,
        text: &str,
        feedback: Option<String>,
        elapsed: Duration,
    ) {
        obs::emit_correction_attempt(
            &session.agent_id,
            stage.as_str(),
            session.attempts,
            outcome.map(|o| o.as_str()),
            assessment.total_score,
        );
        let dimension_scores: BTreeMap<String, f64> = assessment
            .gates
            .iter()
            .map(|g| (g.gate.as_str().to_string(), g.score))
            .collect();
        let log = CorrectionLog {
            id: uuid::Uuid::new_v4().to_string(),
            agent_id: session.agent_id.clone(),
            channel_id: session.channel_id.clone(),
            stage,
            attempt_number: session.attempts,
            outcome,
            dimension_scores,
            similarity_score: assessment.similarity,
            total_score: assessment.total_score,
            token_usage: assessment.token_usage,
            duration_ms: elapsed.as_millis() as u64,
            candidate_text: text.to_string(),
            feedback,
            created_at: Utc::now(),
        };
        if let Err(e) = self.deps.logs.record_correction_log(log).await {
            warn!(agent_id = %session.agent_id, error = %e, "could not record correction log");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn similarity_is_max_over_history() {
        let now = Utc::now();
        let prior = vec![
            MessageRecord::new("jim", "c", "totally different words", now),
            MessageRecord::new("jim", "c", "bears beets battlestar", now),
        ];
        assert_eq!(max_similarity("bears beets battlestar", &prior), 1.0);
        assert_eq!(max_similarity("anything", &[]), 0.0);
    }

    #[test]
    fn last_n_keeps_newest() {
        let now = Utc::now();
        let msgs: Vec<MessageRecord> = (0..5)
            .map(|i| MessageRecord::new("pam", "c", format!("m{i}"), now))
            .collect();
        let kept = last_n(msgs, 2);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].text(), "m3");
    }

    #[test]
    fn feedback_names_failed_gates() {
        let assessment = Assessment {
            gates: vec![
                GateScore {
                    gate: Gate::Fluency,
                    score: 4.0,
                    threshold: 7.0,
                    passed: false,
                    reasoning: "stilted".to_string(),
                },
                GateScore {
                    gate: Gate::PersonaAdherence,
                    score: 8.0,
                    threshold: 7.0,
                    passed: true,
                    reasoning: String::new(),
                },
            ],
            similarity: Some(0.9),
            similarity_passed: false,
            total_score: 6.0,
            token_usage: TokenUsage::default(),
            passed: false,
        };
        let feedback = assessment.feedback(0.85);
        assert!(feedback.contains("fluency scored 4.0 (needs 7.0): stilted"));
        assert!(!feedback.contains("persona_adherence"));
        assert!(feedback.contains("too similar"));
    }

    #[test]
    fn session_keeps_best_candidate() {
        let mut session = CorrectionSession::new("pam", "c");
        session.record_candidate("first", 5.0);
        session.record_candidate("second", 6.5);
        session.record_candidate("third", 6.0);
        assert_eq!(session.best.as_ref().map(|(t, _)| t.as_str()), Some("second"));
    }
}
