//! Convergence: are the agents in a channel drifting into one shared voice?
//!
//! Vocabulary statistics are handed to the judge as supplementary evidence;
//! the judge still makes the call.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt::Write as _;

use persona_state::{Dimension, MessageRecord, TokenUsage};
use tracing::debug;

use crate::domain::{DimensionEvaluation, EvaluationWindow, Result, ScoringContext, TrajectoryEntry};
use crate::propositions::TemplateVars;
use crate::scorers::lifecycle::RunLifecycle;
use crate::scorers::text_stats::{jaccard, vocabulary_stats, word_set};
use crate::scorers::{judge_and_complete, new_run, ScorerDeps};

/// Author of the supplementary statistics entry.
pub const ANALYSIS_AUTHOR: &str = "analysis";

pub async fn score_convergence(
    deps: &ScorerDeps,
    channel_id: &str,
    window: EvaluationWindow,
) -> Result<DimensionEvaluation> {
    let mut vars = TemplateVars::new();
    vars.insert("channel_id".to_string(), channel_id.to_string());
    let file = deps
        .loader
        .load_propositions_for_dimension(Dimension::Convergence, None, &vars)?;

    let messages = deps
        .messages
        .get_channel_send_messages(channel_id, window.start, window.end)
        .await?;
    // Runs are keyed by agent; with no messages there is no author to key on.
    let Some(proxy_agent) = messages.first().map(|m| m.agent_id.clone()) else {
        debug!(channel_id, "no channel messages in window");
        return Ok(DimensionEvaluation::empty(None, Dimension::Convergence));
    };

    let lifecycle = RunLifecycle::begin(
        deps.store.clone(),
        new_run(&proxy_agent, Dimension::Convergence, window, &file),
    )
    .await?;

    let names = match resolve_names(deps, &messages).await {
        Ok(n) => n,
        Err(e) => return Err(lifecycle.fail(TokenUsage::default(), e).await),
    };

    let mut trajectory: Vec<TrajectoryEntry> = messages
        .iter()
        .map(|m| TrajectoryEntry::action(display_name(&names, &m.agent_id), m.text()))
        .collect();
    trajectory.push(TrajectoryEntry::stimulus(
        ANALYSIS_AUTHOR,
        vocabulary_report(&messages, &names),
    ));
    let context = ScoringContext::new(trajectory).windowed(file.first_n, file.last_n);

    judge_and_complete(deps, lifecycle, &file, vec![context], Some(messages.len())).await
}

async fn resolve_names(
    deps: &ScorerDeps,
    messages: &[MessageRecord],
) -> Result<HashMap<String, String>> {
    let mut names = HashMap::new();
    for m in messages {
        if names.contains_key(&m.agent_id) {
            continue;
        }
        let name = deps
            .agents
            .get_agent(&m.agent_id)
            .await?
            .map(|a| a.name)
            .unwrap_or_else(|| m.agent_id.clone());
        names.insert(m.agent_id.clone(), name);
    }
    Ok(names)
}

fn display_name(names: &HashMap<String, String>, agent_id: &str) -> String {
    names
        .get(agent_id)
        .cloned()
        .unwrap_or_else(|| agent_id.to_string())
}

/// Per-agent vocabulary statistics and pairwise Jaccard similarity, rendered
/// as one block of text.
pub fn vocabulary_report(messages: &[MessageRecord], names: &HashMap<String, String>) -> String {
    let mut texts: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for m in messages {
        texts.entry(m.agent_id.as_str()).or_default().push(m.text());
    }

    let mut out = String::from("Vocabulary statistics per agent:\n");
    for (agent_id, agent_texts) in &texts {
        let stats = vocabulary_stats(agent_texts);
        let _ = writeln!(
            out,
            "- {}: unique word ratio {:.2}, average sentence length {:.1}, punctuation density {:.2}",
            display_name(names, agent_id),
            stats.unique_word_ratio,
            stats.avg_sentence_length,
            stats.punctuation_density
        );
    }

    let vocab: Vec<(&str, HashSet<String>)> = texts
        .iter()
        .map(|(agent_id, agent_texts)| {
            let set = agent_texts.iter().flat_map(|t| word_set(t)).collect();
            (*agent_id, set)
        })
        .collect();
    if vocab.len() > 1 {
        out.push_str("Pairwise vocabulary similarity (Jaccard):\n");
        for (i, (a, a_set)) in vocab.iter().enumerate() {
            for (b, b_set) in &vocab[i + 1..] {
                let _ = writeln!(
                    out,
                    "- {} / {}: {:.2}",
                    display_name(names, a),
                    display_name(names, b),
                    jaccard(a_set, b_set)
                );
            }
        }
    }
    out
}
