//! Correction state machine.
//!
//! One assessment of a candidate yields exactly one `CorrectionStep`; the
//! pipeline acts on it and never branches on gate results directly.

use persona_state::{CorrectionOutcome, CorrectionStage};
use serde::{Deserialize, Serialize};

use crate::correction::config::CorrectionPipelineConfig;

/// What the pipeline does after assessing one candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorrectionStep {
    /// Every enabled gate passed: send the candidate.
    Pass,
    /// Hand feedback back to the generating agent for another try.
    Retry,
    /// Rewrite the candidate directly and re-assess.
    Correct,
    /// Out of attempts: send the best candidate seen.
    Force,
    /// Out of attempts and not allowed to degrade: block the send.
    Fail,
    /// The external deadline expired: send the last candidate.
    Timeout,
}

impl CorrectionStep {
    /// Outcome recorded on the log row. Steps that hand control to another
    /// stage carry none.
    pub fn outcome(&self, stage: CorrectionStage) -> Option<CorrectionOutcome> {
        match self {
            CorrectionStep::Pass => Some(match stage {
                CorrectionStage::Original => CorrectionOutcome::Passed,
                CorrectionStage::Regeneration => CorrectionOutcome::RegenerationSuccess,
                CorrectionStage::DirectCorrection => CorrectionOutcome::DirectCorrectionSuccess,
            }),
            CorrectionStep::Force => Some(CorrectionOutcome::ForcedThrough),
            CorrectionStep::Timeout => Some(CorrectionOutcome::TimeoutPassThrough),
            CorrectionStep::Retry | CorrectionStep::Correct | CorrectionStep::Fail => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, CorrectionStep::Retry | CorrectionStep::Correct)
    }
}

/// Facts about the current attempt the transition depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepInput {
    pub passed: bool,
    pub deadline_expired: bool,
    pub regenerations_used: u32,
    pub corrections_used: u32,
}

/// Transition function, checked in order: pass, deadline, regeneration,
/// direct correction, then force or fail.
pub fn next_step(config: &CorrectionPipelineConfig, input: &StepInput) -> CorrectionStep {
    if input.passed {
        return CorrectionStep::Pass;
    }
    if input.deadline_expired {
        return CorrectionStep::Timeout;
    }
    if config.enable_regeneration && input.regenerations_used < config.max_correction_attempts {
        return CorrectionStep::Retry;
    }
    if config.enable_direct_correction && input.corrections_used < config.max_correction_attempts
    {
        return CorrectionStep::Correct;
    }
    if config.continue_on_failure {
        CorrectionStep::Force
    } else {
        CorrectionStep::Fail
    }
}
