//! Self-consistency: do the agent's recent messages contradict what it said
//! earlier in the same channel?

use std::collections::BTreeMap;

use chrono::Duration;
use persona_state::{Dimension, MessageRecord, TokenUsage};
use tracing::debug;

use crate::domain::{DimensionEvaluation, EvaluationWindow, Result, ScoringContext, TrajectoryEntry};
use crate::scorers::lifecycle::RunLifecycle;
use crate::scorers::{agent_template_vars, judge_and_complete, new_run, sample, ScorerDeps};

/// Maximum (historical, current) pairs judged per evaluation.
pub const MAX_CONSISTENCY_PAIRS: usize = 10;

/// How far before the window start history is drawn from.
pub const HISTORY_LOOKBACK_DAYS: i64 = 30;

pub async fn score_consistency(
    deps: &ScorerDeps,
    agent_id: &str,
    window: EvaluationWindow,
) -> Result<DimensionEvaluation> {
    let agent = deps.require_agent(agent_id).await?;
    let file = deps.loader.load_propositions_for_dimension(
        Dimension::Consistency,
        Some(agent_id),
        &agent_template_vars(&agent),
    )?;

    let lifecycle = RunLifecycle::begin(
        deps.store.clone(),
        new_run(agent_id, Dimension::Consistency, window, &file),
    )
    .await?;

    let (current, historical) = match fetch_current_and_history(deps, agent_id, window).await {
        Ok(found) => found,
        Err(e) => return Err(lifecycle.fail(TokenUsage::default(), e).await),
    };

    if current.is_empty() {
        debug!(agent_id, "no current messages; nothing contradicts history");
        return lifecycle
            .complete(Some(crate::MAX_SCORE), 0, TokenUsage::default(), Vec::new())
            .await;
    }
    if historical.is_empty() {
        debug!(agent_id, "cold start: no history to compare against");
        return lifecycle
            .complete(None, 0, TokenUsage::default(), Vec::new())
            .await;
    }

    let pairs = channel_pairs(&historical, &current);
    if pairs.is_empty() {
        debug!(agent_id, "no channel overlap between history and window");
        return lifecycle
            .complete(None, 0, TokenUsage::default(), Vec::new())
            .await;
    }

    let contexts: Vec<ScoringContext> = sample(pairs, MAX_CONSISTENCY_PAIRS)
        .into_iter()
        .map(|(earlier, recent)| {
            ScoringContext::new(vec![
                TrajectoryEntry::stimulus(
                    agent.name.clone(),
                    format!("[Earlier message] {}", earlier.text()),
                ),
                TrajectoryEntry::action(
                    agent.name.clone(),
                    format!("[Recent message] {}", recent.text()),
                ),
            ])
            .windowed(file.first_n, file.last_n)
        })
        .collect();

    judge_and_complete(deps, lifecycle, &file, contexts, None).await
}

async fn fetch_current_and_history(
    deps: &ScorerDeps,
    agent_id: &str,
    window: EvaluationWindow,
) -> Result<(Vec<MessageRecord>, Vec<MessageRecord>)> {
    let current = deps
        .messages
        .get_agent_send_messages(agent_id, window.start, window.end)
        .await?;
    // The source window is inclusive; history stops strictly before the
    // current window starts.
    let historical = deps
        .messages
        .get_agent_send_messages(
            agent_id,
            window.start - Duration::days(HISTORY_LOOKBACK_DAYS),
            window.start,
        )
        .await?
        .into_iter()
        .filter(|m| m.created_at < window.start)
        .collect();
    Ok((current, historical))
}

/// Cross product of historical × current messages, restricted to pairs in
/// the same channel.
fn channel_pairs<'a>(
    historical: &'a [MessageRecord],
    current: &'a [MessageRecord],
) -> Vec<(&'a MessageRecord, &'a MessageRecord)> {
    let mut by_channel: BTreeMap<&str, Vec<&MessageRecord>> = BTreeMap::new();
    for m in historical {
        by_channel.entry(m.channel_id()).or_default().push(m);
    }
    current
        .iter()
        .flat_map(|recent| {
            by_channel
                .get(recent.channel_id())
                .into_iter()
                .flatten()
                .map(move |earlier| (*earlier, recent))
        })
        .collect()
}
