//! Ideas quantity: how many distinct ideas a channel produced.

use persona_state::{Dimension, TokenUsage};
use serde_json::Value;
use tracing::debug;

use crate::domain::{
    EvalError, EvaluationWindow, Idea, IdeasEvaluation, Result, ScoringContext, TrajectoryEntry,
};
use crate::propositions::TemplateVars;
use crate::scorers::lifecycle::RunLifecycle;
use crate::scorers::{new_run, ScorerDeps};

/// Count distinct ideas with a single extraction call over the transcript.
pub async fn score_ideas_quantity(
    deps: &ScorerDeps,
    channel_id: &str,
    window: EvaluationWindow,
) -> Result<IdeasEvaluation> {
    let messages = deps
        .messages
        .get_channel_send_messages(channel_id, window.start, window.end)
        .await?;
    let Some(proxy_agent) = messages.first().map(|m| m.agent_id.clone()) else {
        debug!(channel_id, "no channel messages in window");
        return Ok(IdeasEvaluation {
            run_id: None,
            count: 0,
            ideas: Vec::new(),
            token_usage: TokenUsage::default(),
        });
    };

    let mut vars = TemplateVars::new();
    vars.insert("channel_id".to_string(), channel_id.to_string());
    let file = deps
        .loader
        .load_propositions_for_dimension(Dimension::IdeasQuantity, None, &vars)?;
    let lifecycle = RunLifecycle::begin(
        deps.store.clone(),
        new_run(&proxy_agent, Dimension::IdeasQuantity, window, &file),
    )
    .await?;

    let transcript = ScoringContext::new(
        messages
            .iter()
            .map(|m| TrajectoryEntry::action(m.agent_id.clone(), m.text()))
            .collect(),
    );
    let raw = match deps.extractor.extract_ideas(&transcript).await {
        Ok(r) => r,
        Err(e) => return Err(lifecycle.fail(TokenUsage::default(), e).await),
    };
    let (count, ideas) = match parse_ideas_response(&raw.body) {
        Ok(parsed) => parsed,
        Err(e) => return Err(lifecycle.fail(raw.token_usage, e).await),
    };

    let done = lifecycle
        .complete(None, messages.len(), raw.token_usage, Vec::new())
        .await?;
    Ok(IdeasEvaluation {
        run_id: done.run_id,
        count,
        ideas,
        token_usage: raw.token_usage,
    })
}

/// Defensive parse of `{count, ideas: [{id, description}]}`.
///
/// A non-empty `ideas` array is authoritative over `count`. Without one,
/// `count` is trusted, clamped to a non-negative integer.
pub fn parse_ideas_response(body: &Value) -> Result<(u64, Vec<Idea>)> {
    let obj = body
        .as_object()
        .ok_or_else(|| EvalError::Judge(format!("ideas response is not an object: {body}")))?;

    let ideas: Vec<Idea> = obj
        .get("ideas")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .enumerate()
                .map(|(i, item)| parse_idea(i, item))
                .collect()
        })
        .unwrap_or_default();

    if !ideas.is_empty() {
        return Ok((ideas.len() as u64, ideas));
    }

    let count = match obj.get("count") {
        Some(Value::Number(n)) => n
            .as_f64()
            .filter(|c| c.is_finite())
            .map(|c| c.max(0.0).round() as u64)
            .unwrap_or(0),
        Some(Value::String(s)) => s.trim().parse::<f64>().map_or(0, |c| c.max(0.0).round() as u64),
        _ => 0,
    };
    Ok((count, ideas))
}

fn parse_idea(index: usize, item: &Value) -> Idea {
    match item {
        Value::String(s) => Idea {
            id: format!("idea-{}", index + 1),
            description: s.clone(),
        },
        other => Idea {
            id: other
                .get("id")
                .map(|v| match v {
                    Value::String(s) => s.clone(),
                    v => v.to_string(),
                })
                .unwrap_or_else(|| format!("idea-{}", index + 1)),
            description: other
                .get("description")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        },
    }
}
