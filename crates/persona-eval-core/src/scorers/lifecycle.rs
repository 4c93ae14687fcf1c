//! Evaluation run lifecycle guard.
//!
//! A run is created `pending`, moved to `running` on entry, and finalised
//! exactly once: `complete` and `fail` both consume the guard.

use std::sync::Arc;

use persona_state::{
    Dimension, EvaluationRunUpdate, EvaluationStore, NewEvaluationRun, RunId, TokenUsage,
};
use tracing::warn;

use crate::domain::{DimensionEvaluation, EvalError, PropositionOutcome, Result};
use crate::metrics::METRICS;
use crate::obs;
use crate::scorers::aggregate::{score_rows, Aggregate};

pub struct RunLifecycle {
    store: Arc<dyn EvaluationStore>,
    run_id: RunId,
    dimension: Dimension,
}

impl RunLifecycle {
    /// Create the run row and mark it running.
    pub async fn begin(store: Arc<dyn EvaluationStore>, run: NewEvaluationRun) -> Result<Self> {
        let dimension = run.dimensions.first().copied().unwrap_or(Dimension::Adherence);
        let agent_id = run.agent_id.clone();
        let run_id = store.create_evaluation_run(run).await?;
        let lifecycle = Self {
            store,
            run_id,
            dimension,
        };
        if let Err(e) = lifecycle
            .store
            .update_evaluation_run_status(&lifecycle.run_id, EvaluationRunUpdate::running())
            .await
        {
            return Err(lifecycle.fail(TokenUsage::default(), e.into()).await);
        }
        obs::emit_evaluation_started(&lifecycle.run_id.0, &agent_id, dimension.as_str());
        Ok(lifecycle)
    }

    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }

    /// Persist per-proposition rows, then complete the run.
    pub async fn complete_with_aggregate(
        self,
        aggregate: Aggregate,
        sample_size: usize,
        token_usage: TokenUsage,
    ) -> Result<DimensionEvaluation> {
        for row in score_rows(&self.run_id, self.dimension, &aggregate) {
            if let Err(e) = self.store.record_score(row).await {
                return Err(self.fail(token_usage, e.into()).await);
            }
        }
        self.complete(
            Some(aggregate.overall_score),
            sample_size,
            token_usage,
            aggregate.outcomes,
        )
        .await
    }

    /// Complete the run with a fixed result (empty sample, cold start, count metric).
    pub async fn complete(
        self,
        overall_score: Option<f64>,
        sample_size: usize,
        token_usage: TokenUsage,
        propositions: Vec<PropositionOutcome>,
    ) -> Result<DimensionEvaluation> {
        if let Err(e) = self
            .store
            .update_evaluation_run_status(
                &self.run_id,
                EvaluationRunUpdate::completed(sample_size, overall_score, token_usage),
            )
            .await
        {
            return Err(self.fail(token_usage, e.into()).await);
        }
        METRICS.inc_evaluations_completed();
        obs::emit_evaluation_finished(
            &self.run_id.0,
            self.dimension.as_str(),
            overall_score,
            sample_size,
            token_usage.total(),
        );
        Ok(DimensionEvaluation {
            run_id: Some(self.run_id),
            dimension: self.dimension,
            overall_score,
            sample_size,
            token_usage,
            propositions,
        })
    }

    /// Mark the run failed with best-effort token usage and hand the error
    /// back for the caller to propagate.
    pub async fn fail(self, token_usage: TokenUsage, error: EvalError) -> EvalError {
        METRICS.inc_evaluations_failed();
        obs::emit_evaluation_failed(&self.run_id.0, self.dimension.as_str(), &error);
        if let Err(e) = self
            .store
            .update_evaluation_run_status(
                &self.run_id,
                EvaluationRunUpdate::failed(token_usage, error.to_string()),
            )
            .await
        {
            warn!(run_id = %self.run_id, error = %e, "could not mark evaluation run failed");
        }
        error
    }
}
