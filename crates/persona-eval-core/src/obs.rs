//! Structured observability hooks for evaluation and correction events.
//!
//! This module provides:
//! - Run-scoped tracing spans via the `EvaluationSpan` RAII guard
//! - Emission functions for lifecycle events: evaluation start/finish/failure,
//!   correction attempts, harness completion
//!
//! Events are emitted at `info!` level (filter with `RUST_LOG`).

use std::future::Future;

use tracing::instrument::Instrumented;
use tracing::{info, Instrument};

/// Evaluation-scoped tracing span.
///
/// Scorers are async, so the span is attached to the scorer future rather
/// than entered on the current thread.
///
/// # Example
///
/// ```ignore
/// EvaluationSpan::new("dwight", "adherence")
///     .instrument(score_adherence(&deps, "dwight", window))
///     .await?;
/// ```
#[derive(Debug, Clone)]
pub struct EvaluationSpan {
    span: tracing::Span,
}

impl EvaluationSpan {
    /// Create a span tagged with the agent and dimension.
    pub fn new(agent_id: &str, dimension: &str) -> Self {
        Self {
            span: tracing::info_span!("persona.evaluation", agent_id = %agent_id, dimension = %dimension),
        }
    }

    /// Run `future` inside the span.
    pub fn instrument<F: Future>(self, future: F) -> Instrumented<F> {
        future.instrument(self.span)
    }
}

/// Emit event: evaluation run started.
pub fn emit_evaluation_started(run_id: &str, agent_id: &str, dimension: &str) {
    info!(
        event = "evaluation.started",
        run_id = %run_id,
        agent_id = %agent_id,
        dimension = %dimension,
    );
}

/// Emit event: evaluation run finished with its score and sample size.
pub fn emit_evaluation_finished(
    run_id: &str,
    dimension: &str,
    overall_score: Option<f64>,
    sample_size: usize,
    tokens: u64,
) {
    info!(
        event = "evaluation.finished",
        run_id = %run_id,
        dimension = %dimension,
        overall_score = ?overall_score,
        sample_size = sample_size,
        tokens = tokens,
    );
}

/// Emit event: evaluation run failed (warning level).
pub fn emit_evaluation_failed(run_id: &str, dimension: &str, error: &dyn std::fmt::Display) {
    tracing::warn!(
        event = "evaluation.failed",
        run_id = %run_id,
        dimension = %dimension,
        error = %error,
    );
}

/// Emit event: one correction pipeline attempt.
pub fn emit_correction_attempt(
    agent_id: &str,
    stage: &str,
    attempt: u32,
    outcome: Option<&str>,
    total_score: f64,
) {
    info!(
        event = "correction.attempt",
        agent_id = %agent_id,
        stage = %stage,
        attempt = attempt,
        outcome = outcome.unwrap_or("pending"),
        total_score = total_score,
    );
}

/// Emit event: harness run finished.
pub fn emit_harness_finished(total: usize, passed: usize, failed: usize, regressions: usize) {
    info!(
        event = "harness.finished",
        total = total,
        passed = passed,
        failed = failed,
        regressions = regressions,
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emitters_do_not_panic() {
        emit_evaluation_started("run-1", "dwight", "adherence");
        emit_evaluation_finished("run-1", "adherence", Some(7.5), 3, 0);
        emit_correction_attempt("dwight", "original", 1, None, 6.0);
    }

    #[tokio::test]
    async fn test_span_instruments_future() {
        let value = EvaluationSpan::new("dwight", "adherence")
            .instrument(async { 7 })
            .await;
        assert_eq!(value, 7);
    }
}
