//! Score-domain arithmetic.
//!
//! Every score the engine produces lives on the closed `[0, 9]` scale, and
//! every function here maps that interval into itself.

/// Upper bound of the score domain.
pub const MAX_SCORE: f64 = 9.0;

/// Multiplier applied to imperfect scores in hard mode.
pub const HARD_MODE_FACTOR: f64 = 0.8;

/// Flip a raw judge score for a claim that describes undesired behaviour.
pub fn apply_inverted_score(raw: f64, inverted: bool) -> f64 {
    if inverted {
        MAX_SCORE - raw
    } else {
        raw
    }
}

/// Hard mode takes 20% off anything short of a perfect score.
pub fn apply_hard_mode_penalty(score: f64, hard: bool) -> f64 {
    if hard && score < MAX_SCORE {
        score * HARD_MODE_FACTOR
    } else {
        score
    }
}

/// Clamp an externally supplied score into `[0, 9]`. NaN maps to 0.
pub fn clamp_score(score: f64) -> f64 {
    if score.is_nan() {
        0.0
    } else {
        score.clamp(0.0, MAX_SCORE)
    }
}

/// `Σ score·weight / Σ weight`, or a perfect score when the total weight is 0.
pub fn weighted_average<I>(scored: I) -> f64
where
    I: IntoIterator<Item = (f64, f64)>,
{
    let (sum, total_weight) = scored
        .into_iter()
        .fold((0.0, 0.0), |(sum, tw), (score, weight)| {
            (sum + score * weight, tw + weight)
        });
    if total_weight == 0.0 {
        MAX_SCORE
    } else {
        sum / total_weight
    }
}
