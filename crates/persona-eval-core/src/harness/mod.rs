//! Offline evaluation harness.
//!
//! Iterates every `(agent, dimension)` pair, scores it with one batched judge
//! call, and rolls the results up into a `HarnessResult` that the CI
//! reporter renders. Mock mode is fully deterministic; live mode pulls
//! messages for the window from the message source.

pub mod baseline;
pub mod mock_scores;
pub mod window;

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use persona_state::{AgentProfile, Dimension, TokenUsage};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::domain::{EvalError, EvaluationWindow, Result, ScoringContext, TrajectoryEntry};
use crate::judge::{IdeasExtractor, JudgeClient};
use crate::metrics::METRICS;
use crate::obs::{self, EvaluationSpan};
use crate::propositions::{PropositionLoader, MAX_SCORE};
use crate::scorers::aggregate::aggregate;
use crate::scorers::{agent_template_vars, parse_ideas_response, ScorerDeps};

pub use baseline::{apply_baseline, Regression};
pub use mock_scores::{display_name, is_known_character, mock_judge_for, ROSTER};
pub use window::{parse_window, parse_window_at};

/// Result for one 0–9 dimension.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DimensionResult {
    pub score: Option<f64>,
    pub pass: bool,
    pub sample_size: usize,
    pub token_usage: TokenUsage,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DimensionOutcome {
    Scored(DimensionResult),
    /// Count metrics never fail and never enter the overall average.
    Count { count: u64 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentResult {
    pub overall: f64,
    pub pass: bool,
    pub dimensions: BTreeMap<String, DimensionOutcome>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub baseline_delta: BTreeMap<String, f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub regressions: Vec<Regression>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HarnessSummary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub regressions: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HarnessResult {
    pub timestamp: DateTime<Utc>,
    pub threshold: f64,
    pub agents: BTreeMap<String, AgentResult>,
    pub summary: HarnessSummary,
}

#[derive(Debug, Clone)]
pub struct HarnessOptions {
    /// Agent ids; `all` expands to the roster.
    pub agents: Vec<String>,
    pub dimensions: Vec<Dimension>,
    pub threshold: f64,
    pub window: EvaluationWindow,
    pub baseline: Option<HarnessResult>,
    pub regression_threshold: f64,
}

impl HarnessOptions {
    pub fn new(agents: Vec<String>, window: EvaluationWindow) -> Self {
        Self {
            agents,
            dimensions: Dimension::ALL.to_vec(),
            threshold: 5.0,
            window,
            baseline: None,
            regression_threshold: 1.0,
        }
    }
}

/// Expand `all` to the fixed roster; otherwise keep the list as given.
pub fn expand_agents(agents: &[String]) -> Vec<String> {
    if agents.iter().any(|a| a == "all") {
        ROSTER.iter().map(|a| a.to_string()).collect()
    } else {
        agents.to_vec()
    }
}

enum Mode {
    Mock,
    Live(ScorerDeps),
}

/// Collaborators used for one agent.
struct AgentScoring {
    judge: Arc<dyn JudgeClient>,
    extractor: Arc<dyn IdeasExtractor>,
    profile: AgentProfile,
    trajectory: Vec<TrajectoryEntry>,
    sample_size: usize,
}

pub struct Harness {
    loader: PropositionLoader,
    mode: Mode,
}

impl Harness {
    /// Deterministic per-character judge tables and a placeholder trajectory.
    pub fn mock(loader: PropositionLoader) -> Self {
        Self {
            loader,
            mode: Mode::Mock,
        }
    }

    /// Real judge and message source.
    pub fn live(deps: ScorerDeps) -> Self {
        Self {
            loader: deps.loader.clone(),
            mode: Mode::Live(deps),
        }
    }

    pub async fn run_evaluation(&self, options: &HarnessOptions) -> Result<HarnessResult> {
        let agents = expand_agents(&options.agents);
        let mut results = BTreeMap::new();

        for agent_id in &agents {
            let scoring = self.prepare(agent_id, options.window).await?;
            let mut dimensions = BTreeMap::new();
            for dimension in &options.dimensions {
                let outcome = EvaluationSpan::new(agent_id, dimension.as_str())
                    .instrument(self.score_dimension(&scoring, *dimension, options.threshold))
                    .await?;
                dimensions.insert(dimension.as_str().to_string(), outcome);
            }
            results.insert(agent_id.clone(), roll_up(dimensions));
        }

        let passed = results.values().filter(|a| a.pass).count();
        let mut result = HarnessResult {
            timestamp: Utc::now(),
            threshold: options.threshold,
            summary: HarnessSummary {
                total: results.len(),
                passed,
                failed: results.len() - passed,
                regressions: 0,
            },
            agents: results,
        };
        if let Some(baseline) = &options.baseline {
            apply_baseline(&mut result, baseline, options.regression_threshold);
        }

        obs::emit_harness_finished(
            result.summary.total,
            result.summary.passed,
            result.summary.failed,
            result.summary.regressions,
        );
        METRICS.flush();
        Ok(result)
    }

    async fn prepare(&self, agent_id: &str, window: EvaluationWindow) -> Result<AgentScoring> {
        match &self.mode {
            Mode::Mock => {
                if !is_known_character(agent_id) {
                    return Err(EvalError::NotFound(format!("agent {agent_id}")));
                }
                let name = display_name(agent_id);
                let judge = Arc::new(mock_judge_for(agent_id));
                Ok(AgentScoring {
                    judge: judge.clone(),
                    extractor: judge,
                    profile: AgentProfile::new(agent_id, name.clone(), format!("You are {name}.")),
                    trajectory: vec![placeholder(&name)],
                    sample_size: 1,
                })
            }
            Mode::Live(deps) => {
                let profile = deps.require_agent(agent_id).await?;
                let messages = deps
                    .messages
                    .get_agent_send_messages(agent_id, window.start, window.end)
                    .await?;
                let (trajectory, sample_size) = if messages.is_empty() {
                    warn!(agent_id, "no messages in window; scoring placeholder trajectory");
                    (vec![placeholder(&profile.name)], 0)
                } else {
                    let count = messages.len();
                    let entries = messages
                        .iter()
                        .map(|m| TrajectoryEntry::action(profile.name.clone(), m.text()))
                        .collect();
                    (entries, count)
                };
                Ok(AgentScoring {
                    judge: deps.judge.clone(),
                    extractor: deps.extractor.clone(),
                    profile,
                    trajectory,
                    sample_size,
                })
            }
        }
    }

    async fn score_dimension(
        &self,
        scoring: &AgentScoring,
        dimension: Dimension,
        threshold: f64,
    ) -> Result<DimensionOutcome> {
        let context = ScoringContext::new(scoring.trajectory.clone());
        if dimension.is_count() {
            let raw = scoring.extractor.extract_ideas(&context).await?;
            let (count, _) = parse_ideas_response(&raw.body)?;
            return Ok(DimensionOutcome::Count { count });
        }

        let file = self.loader.load_propositions_for_dimension(
            dimension,
            Some(&scoring.profile.id),
            &agent_template_vars(&scoring.profile),
        )?;
        let context = if file.include_personas {
            context.with_persona(scoring.profile.system_prompt.clone())
        } else {
            context
        }
        .windowed(file.first_n, file.last_n);

        let batch = scoring
            .judge
            .score_propositions(&file.propositions, &context)
            .await?;
        let aggregated = aggregate(&file, std::slice::from_ref(&batch))?;
        let score = aggregated.overall_score;
        info!(
            agent_id = %scoring.profile.id,
            %dimension,
            score,
            "dimension scored"
        );
        Ok(DimensionOutcome::Scored(DimensionResult {
            score: Some(score),
            pass: score >= threshold,
            sample_size: scoring.sample_size,
            token_usage: batch.token_usage,
        }))
    }
}

fn placeholder(name: &str) -> TrajectoryEntry {
    TrajectoryEntry::action(name, format!("[No messages from {name} in the evaluation window]"))
}

/// Overall is the mean of scored 0–9 dimensions (9 when there are none);
/// the agent passes when every scored dimension passes.
fn roll_up(dimensions: BTreeMap<String, DimensionOutcome>) -> AgentResult {
    let mut scores = Vec::new();
    let mut pass = true;
    for outcome in dimensions.values() {
        if let DimensionOutcome::Scored(r) = outcome {
            pass &= r.pass;
            if let Some(s) = r.score {
                scores.push(s);
            }
        }
    }
    let overall = if scores.is_empty() {
        MAX_SCORE
    } else {
        scores.iter().sum::<f64>() / scores.len() as f64
    };
    AgentResult {
        overall,
        pass,
        dimensions,
        baseline_delta: BTreeMap::new(),
        regressions: Vec::new(),
    }
}
