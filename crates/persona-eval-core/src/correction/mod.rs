//! Correction pipeline: gate an outbound message before it is sent.
//!
//! - `config`: gate thresholds and attempt limits
//! - `state`: the closed `CorrectionStep` enum and its transition function
//! - `pipeline`: assessment, logging, regeneration and direct correction

pub mod config;
pub mod pipeline;
pub mod state;

pub use config::{CorrectionPipelineConfig, GateConfig, SimilarityGateConfig};
pub use pipeline::{
    max_similarity, Assessment, CorrectionDecision, CorrectionDeps, CorrectionPipeline,
    CorrectionSession, Gate, GateScore, CONTEXT_LOOKBACK_HOURS, CONTEXT_MESSAGES,
    SUITABILITY_PROPOSITION_ID,
};
pub use state::{next_step, CorrectionStep, StepInput};
