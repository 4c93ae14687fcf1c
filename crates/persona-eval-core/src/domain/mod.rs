//! Domain models for persona evaluation.
//!
//! Canonical definitions for the core entities:
//! - `Proposition` / `PropositionFile`: behavioural claims and their rule set
//! - `TrajectoryEntry` / `ScoringContext`: evidence shown to the judge
//! - `DimensionEvaluation` / `IdeasEvaluation`: scorer results

pub mod digest;
pub mod error;
pub mod evaluation;
pub mod proposition;
pub mod trajectory;

pub use error::{EvalError, Result};
pub use evaluation::{
    DimensionEvaluation, EvaluationWindow, Idea, IdeasEvaluation, PropositionOutcome,
};
pub use proposition::{Proposition, PropositionFile, TargetType};
pub use trajectory::{EntryType, ScoringContext, TrajectoryEntry};
