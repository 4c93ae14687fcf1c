//! Baseline comparison between two harness results.

use serde::{Deserialize, Serialize};

use crate::harness::{DimensionOutcome, HarnessResult};

/// Float slack so a drop of exactly the threshold still counts.
const DELTA_EPSILON: f64 = 1e-9;

/// A scored dimension that dropped by at least the regression threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Regression {
    pub dimension: String,
    pub baseline: f64,
    pub current: f64,
    pub delta: f64,
}

/// Fill per-dimension deltas against `baseline` and collect regressions.
///
/// Only dimensions scored in both results are compared; agents or
/// dimensions missing from the baseline get no delta.
pub fn apply_baseline(result: &mut HarnessResult, baseline: &HarnessResult, threshold: f64) {
    let mut total = 0;
    for (agent_id, agent) in result.agents.iter_mut() {
        let Some(previous) = baseline.agents.get(agent_id) else {
            continue;
        };
        agent.baseline_delta.clear();
        agent.regressions.clear();
        for (dimension, outcome) in &agent.dimensions {
            let (Some(current), Some(before)) = (
                scored(outcome),
                previous.dimensions.get(dimension).and_then(scored),
            ) else {
                continue;
            };
            let delta = current - before;
            agent.baseline_delta.insert(dimension.clone(), delta);
            if delta <= -threshold + DELTA_EPSILON {
                agent.regressions.push(Regression {
                    dimension: dimension.clone(),
                    baseline: before,
                    current,
                    delta,
                });
            }
        }
        total += agent.regressions.len();
    }
    result.summary.regressions = total;
}

fn scored(outcome: &DimensionOutcome) -> Option<f64> {
    match outcome {
        DimensionOutcome::Scored(r) => r.score,
        DimensionOutcome::Count { .. } => None,
    }
}
