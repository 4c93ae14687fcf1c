//! Per-proposition aggregation of judged samples.
//!
//! Runs single-threaded, and only after every judge task has resolved.

use persona_state::{Dimension, EvaluationScore, RunId};

use crate::domain::{EvalError, PropositionFile, PropositionOutcome, Result};
use crate::judge::BatchScoreResult;
use crate::propositions::{apply_hard_mode_penalty, apply_inverted_score, weighted_average};

/// Aggregated scores for one dimension.
#[derive(Debug, Clone, PartialEq)]
pub struct Aggregate {
    pub outcomes: Vec<PropositionOutcome>,
    pub overall_score: f64,
}

/// Fold one batch per sampled item into per-proposition outcomes.
///
/// For each proposition: mean of raw scores, then inversion, then hard-mode
/// penalty. The worst sample is the one with the lowest post-inversion score.
/// The overall score is the weight-weighted mean of final scores.
pub fn aggregate(file: &PropositionFile, batches: &[BatchScoreResult]) -> Result<Aggregate> {
    for batch in batches {
        if batch.results.len() != file.propositions.len() {
            return Err(EvalError::Judge(format!(
                "judge returned {} results for {} propositions",
                batch.results.len(),
                file.propositions.len()
            )));
        }
    }

    let outcomes: Vec<PropositionOutcome> = file
        .propositions
        .iter()
        .enumerate()
        .map(|(i, proposition)| {
            let mut sum = 0.0;
            let mut worst: Option<(f64, f64, &str)> = None;
            for batch in batches {
                let r = &batch.results[i];
                sum += r.score;
                let adjusted = apply_inverted_score(r.score, proposition.inverted);
                if worst.map_or(true, |(w, _, _)| adjusted < w) {
                    worst = Some((adjusted, r.score, r.reasoning.as_str()));
                }
            }
            let samples = batches.len();
            let mean = if samples == 0 { 0.0 } else { sum / samples as f64 };
            let final_score =
                apply_hard_mode_penalty(apply_inverted_score(mean, proposition.inverted), file.hard);
            let (worst_score, worst_reasoning) = worst
                .map(|(_, raw, reasoning)| (raw, reasoning.to_string()))
                .unwrap_or((mean, String::new()));
            PropositionOutcome {
                proposition_id: proposition.id.clone(),
                weight: proposition.weight,
                mean_raw_score: mean,
                final_score,
                worst_score,
                worst_reasoning,
                samples,
            }
        })
        .collect();

    let overall_score = weighted_average(outcomes.iter().map(|o| (o.final_score, o.weight)));
    Ok(Aggregate {
        outcomes,
        overall_score,
    })
}

/// Score rows for persistence: one per proposition.
pub fn score_rows(run_id: &RunId, dimension: Dimension, aggregate: &Aggregate) -> Vec<EvaluationScore> {
    aggregate
        .outcomes
        .iter()
        .map(|o| EvaluationScore {
            run_id: run_id.clone(),
            dimension,
            proposition_id: o.proposition_id.clone(),
            score: o.final_score,
            reasoning: format!(
                "mean raw score {:.2} over {} sample(s); worst {:.1}",
                o.mean_raw_score, o.samples, o.worst_score
            ),
            context_snippet: (!o.worst_reasoning.is_empty()).then(|| o.worst_reasoning.clone()),
        })
        .collect()
}
