//! Dimension scorers.
//!
//! Every scorer has the same shape: fetch messages for a window, build one
//! or more `ScoringContext`s, fan the judge calls out as independent tokio
//! tasks, join them all, then aggregate:
//! - `adherence` / `fluency`: random sample of the agent's own messages
//! - `consistency`: current × historical message pairs within a channel
//! - `convergence`: the whole channel plus vocabulary statistics
//! - `ideas`: one structured extraction over the channel transcript

pub mod adherence;
pub mod aggregate;
pub mod consistency;
pub mod convergence;
pub mod ideas;
pub mod lifecycle;
pub mod text_stats;

use std::sync::Arc;

use persona_state::{
    AgentDirectory, AgentProfile, Dimension, EvaluationStore, MessageSource, NewEvaluationRun,
    TokenUsage,
};
use rand::seq::SliceRandom;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::domain::{
    DimensionEvaluation, EvalError, EvaluationWindow, Proposition, PropositionFile, Result,
    ScoringContext,
};
use crate::judge::{BatchScoreResult, IdeasExtractor, JudgeClient};
use crate::propositions::{PropositionLoader, TemplateVars};
use crate::scorers::aggregate::aggregate;
use crate::scorers::lifecycle::RunLifecycle;

pub use adherence::{score_adherence, score_fluency, MAX_AGENT_SAMPLES};
pub use aggregate::Aggregate;
pub use consistency::{score_consistency, HISTORY_LOOKBACK_DAYS, MAX_CONSISTENCY_PAIRS};
pub use convergence::score_convergence;
pub use ideas::{parse_ideas_response, score_ideas_quantity};

/// Collaborators shared by every scorer.
#[derive(Clone)]
pub struct ScorerDeps {
    pub judge: Arc<dyn JudgeClient>,
    pub extractor: Arc<dyn IdeasExtractor>,
    pub messages: Arc<dyn MessageSource>,
    pub agents: Arc<dyn AgentDirectory>,
    pub store: Arc<dyn EvaluationStore>,
    pub loader: PropositionLoader,
}

impl ScorerDeps {
    /// Look up an agent, mapping an unknown id to `NotFound`.
    pub async fn require_agent(&self, agent_id: &str) -> Result<AgentProfile> {
        self.agents
            .get_agent(agent_id)
            .await?
            .ok_or_else(|| EvalError::NotFound(format!("agent {agent_id}")))
    }
}

/// Template variables every agent-scoped rule file can use.
pub fn agent_template_vars(agent: &AgentProfile) -> TemplateVars {
    let mut vars = TemplateVars::new();
    vars.insert("agent_name".to_string(), agent.name.clone());
    vars.insert("agent_id".to_string(), agent.id.clone());
    vars
}

/// Uniform random sample of at most `limit` items.
pub(crate) fn sample<T>(mut items: Vec<T>, limit: usize) -> Vec<T> {
    items.shuffle(&mut rand::thread_rng());
    items.truncate(limit);
    items
}

pub(crate) fn new_run(
    agent_id: &str,
    dimension: Dimension,
    window: EvaluationWindow,
    file: &PropositionFile,
) -> NewEvaluationRun {
    NewEvaluationRun {
        agent_id: agent_id.to_string(),
        dimensions: vec![dimension],
        window_start: window.start,
        window_end: window.end,
        rules_digest: file.digest().ok(),
    }
}

/// Score every context concurrently and join before returning.
///
/// On failure the first error is returned together with the token usage of
/// every call that did succeed.
pub(crate) async fn fan_out(
    judge: Arc<dyn JudgeClient>,
    propositions: Arc<Vec<Proposition>>,
    contexts: Vec<ScoringContext>,
) -> std::result::Result<(Vec<BatchScoreResult>, TokenUsage), (EvalError, TokenUsage)> {
    let mut tasks: Vec<JoinHandle<Result<BatchScoreResult>>> = Vec::new();
    for context in contexts {
        let judge = Arc::clone(&judge);
        let propositions = Arc::clone(&propositions);
        tasks.push(tokio::spawn(async move {
            judge.score_propositions(&propositions, &context).await
        }));
    }

    let mut batches = Vec::with_capacity(tasks.len());
    let mut usage = TokenUsage::default();
    let mut first_error: Option<EvalError> = None;
    for task in tasks {
        match task.await {
            Ok(Ok(batch)) => {
                usage += batch.token_usage;
                batches.push(batch);
            }
            Ok(Err(e)) => {
                first_error.get_or_insert(e);
            }
            Err(join_err) => {
                first_error.get_or_insert(EvalError::Judge(format!(
                    "scoring task failed: {join_err}"
                )));
            }
        }
    }

    match first_error {
        Some(e) => Err((e, usage)),
        None => Ok((batches, usage)),
    }
}

/// Judge the contexts, aggregate and finalise the run.
///
/// `sample_size` is what the run reports; it defaults to the number of
/// contexts.
pub(crate) async fn judge_and_complete(
    deps: &ScorerDeps,
    lifecycle: RunLifecycle,
    file: &PropositionFile,
    contexts: Vec<ScoringContext>,
    sample_size: Option<usize>,
) -> Result<DimensionEvaluation> {
    let sample_size = sample_size.unwrap_or(contexts.len());
    debug!(
        run_id = %lifecycle.run_id(),
        samples = sample_size,
        propositions = file.propositions.len(),
        "fanning out judge calls"
    );
    let propositions = Arc::new(file.propositions.clone());
    let (batches, usage) =
        match fan_out(Arc::clone(&deps.judge), propositions, contexts).await {
            Ok(done) => done,
            Err((e, usage)) => return Err(lifecycle.fail(usage, e).await),
        };
    let aggregate = match aggregate(file, &batches) {
        Ok(a) => a,
        Err(e) => return Err(lifecycle.fail(usage, e).await),
    };
    lifecycle
        .complete_with_aggregate(aggregate, sample_size, usage)
        .await
}
