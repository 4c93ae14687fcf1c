//! Intervention preconditions.
//!
//! A precondition decides whether an intervention is needed. The strategy is
//! chosen by the variant; only the textual and propositional strategies call
//! the judge.

use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use persona_state::TokenUsage;
use serde::{Deserialize, Serialize};

use crate::domain::{Proposition, Result, ScoringContext};
use crate::judge::JudgeClient;

/// Predicate over the intervention's target ids.
pub type TargetPredicate = Arc<dyn Fn(&[String]) -> bool + Send + Sync>;

#[derive(Clone)]
pub enum Precondition {
    /// Free-text claim checked by the judge.
    Textual { claim: String },
    /// Plain predicate; no judge call.
    Functional { predicate: TargetPredicate },
    /// Caller-supplied proposition. With a threshold the judge scores it and
    /// the intervention is needed only while the score stays below it.
    Propositional {
        proposition: Proposition,
        threshold: Option<f64>,
    },
}

impl fmt::Debug for Precondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Precondition::Textual { claim } => {
                f.debug_struct("Textual").field("claim", claim).finish()
            }
            Precondition::Functional { .. } => f.debug_struct("Functional").finish_non_exhaustive(),
            Precondition::Propositional {
                proposition,
                threshold,
            } => f
                .debug_struct("Propositional")
                .field("proposition", proposition)
                .field("threshold", threshold)
                .finish(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PreconditionResult {
    Textual {
        passed: bool,
        reasoning: String,
        confidence: f64,
        token_usage: TokenUsage,
    },
    Functional {
        passed: bool,
    },
    Propositional {
        passed: bool,
        /// Set only when a threshold was given.
        score: Option<f64>,
        reasoning: String,
        confidence: f64,
        token_usage: TokenUsage,
    },
}

impl PreconditionResult {
    pub fn passed(&self) -> bool {
        match self {
            PreconditionResult::Textual { passed, .. }
            | PreconditionResult::Functional { passed }
            | PreconditionResult::Propositional { passed, .. } => *passed,
        }
    }

    /// `None` for functional preconditions, which never call the judge.
    pub fn token_usage(&self) -> Option<TokenUsage> {
        match self {
            PreconditionResult::Textual { token_usage, .. }
            | PreconditionResult::Propositional { token_usage, .. } => Some(*token_usage),
            PreconditionResult::Functional { .. } => None,
        }
    }
}

impl Precondition {
    pub fn textual(claim: impl Into<String>) -> Self {
        Precondition::Textual {
            claim: claim.into(),
        }
    }

    pub fn functional<F>(predicate: F) -> Self
    where
        F: Fn(&[String]) -> bool + Send + Sync + 'static,
    {
        Precondition::Functional {
            predicate: Arc::new(predicate),
        }
    }

    pub fn propositional(proposition: Proposition, threshold: Option<f64>) -> Self {
        Precondition::Propositional {
            proposition,
            threshold,
        }
    }

    pub async fn evaluate(
        &self,
        judge: &dyn JudgeClient,
        context: &ScoringContext,
        targets: &[String],
    ) -> Result<PreconditionResult> {
        match self {
            Precondition::Textual { claim } => {
                let proposition = Proposition::new(
                    format!("precondition-{}", Utc::now().timestamp_millis()),
                    claim.clone(),
                );
                let check = judge.check_proposition(&proposition, context).await?;
                Ok(PreconditionResult::Textual {
                    passed: check.result,
                    reasoning: check.reasoning,
                    confidence: check.confidence,
                    token_usage: check.token_usage,
                })
            }
            Precondition::Functional { predicate } => Ok(PreconditionResult::Functional {
                passed: predicate(targets),
            }),
            Precondition::Propositional {
                proposition,
                threshold: None,
            } => {
                let check = judge.check_proposition(proposition, context).await?;
                Ok(PreconditionResult::Propositional {
                    passed: check.result,
                    score: None,
                    reasoning: check.reasoning,
                    confidence: check.confidence,
                    token_usage: check.token_usage,
                })
            }
            Precondition::Propositional {
                proposition,
                threshold: Some(threshold),
            } => {
                let scored = judge.score_proposition(proposition, context).await?;
                // A score at or above the threshold means the healthy
                // condition already holds.
                Ok(PreconditionResult::Propositional {
                    passed: scored.score < *threshold,
                    score: Some(scored.score),
                    reasoning: scored.reasoning,
                    confidence: scored.confidence,
                    token_usage: scored.token_usage,
                })
            }
        }
    }
}
