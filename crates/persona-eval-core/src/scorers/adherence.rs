//! Agent-scoped scorers over the agent's own messages: adherence and fluency.

use persona_state::{Dimension, TokenUsage};
use tracing::debug;

use crate::domain::{DimensionEvaluation, EvaluationWindow, Result, ScoringContext, TrajectoryEntry};
use crate::scorers::lifecycle::RunLifecycle;
use crate::scorers::{agent_template_vars, judge_and_complete, new_run, sample, ScorerDeps};

/// Upper bound on messages judged per agent-scoped evaluation.
pub const MAX_AGENT_SAMPLES: usize = 20;

/// Persona adherence: does the agent sound and act like its persona?
pub async fn score_adherence(
    deps: &ScorerDeps,
    agent_id: &str,
    window: EvaluationWindow,
) -> Result<DimensionEvaluation> {
    score_own_messages(deps, agent_id, window, Dimension::Adherence).await
}

/// Fluency: natural, non-repetitive language. The persona is shown to the
/// judge only when the rule file asks for it.
pub async fn score_fluency(
    deps: &ScorerDeps,
    agent_id: &str,
    window: EvaluationWindow,
) -> Result<DimensionEvaluation> {
    score_own_messages(deps, agent_id, window, Dimension::Fluency).await
}

async fn score_own_messages(
    deps: &ScorerDeps,
    agent_id: &str,
    window: EvaluationWindow,
    dimension: Dimension,
) -> Result<DimensionEvaluation> {
    let agent = deps.require_agent(agent_id).await?;
    let file = deps.loader.load_propositions_for_dimension(
        dimension,
        Some(agent_id),
        &agent_template_vars(&agent),
    )?;

    let lifecycle =
        RunLifecycle::begin(deps.store.clone(), new_run(agent_id, dimension, window, &file))
            .await?;

    let messages = match deps
        .messages
        .get_agent_send_messages(agent_id, window.start, window.end)
        .await
    {
        Ok(m) => m,
        Err(e) => return Err(lifecycle.fail(TokenUsage::default(), e.into()).await),
    };
    if messages.is_empty() {
        debug!(agent_id, %dimension, "no messages in window");
        return lifecycle
            .complete(Some(crate::MAX_SCORE), 0, TokenUsage::default(), Vec::new())
            .await;
    }

    let contexts: Vec<ScoringContext> = sample(messages, MAX_AGENT_SAMPLES)
        .into_iter()
        .map(|m| {
            let context =
                ScoringContext::new(vec![TrajectoryEntry::action(agent.name.clone(), m.text())]);
            let context = if file.include_personas {
                context.with_persona(agent.system_prompt.clone())
            } else {
                context
            };
            context.windowed(file.first_n, file.last_n)
        })
        .collect();

    judge_and_complete(deps, lifecycle, &file, contexts, None).await
}
