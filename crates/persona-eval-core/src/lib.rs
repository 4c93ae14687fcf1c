//! Persona Evaluation Core Library
//!
//! Proposition-based persona scoring for autonomous chat agents, a pre-send
//! correction pipeline, and an offline regression harness.
//!
//! ## Key Components
//!
//! - `propositions`: rule-file loading, overrides, templates, score arithmetic
//! - `judge`: the LLM judge boundary, with mock and HTTP implementations
//! - `scorers`: adherence, consistency, fluency, convergence, ideas quantity
//! - `correction`: gate one outbound message, regenerate or rewrite it
//! - `precondition`: textual / functional / propositional intervention checks
//! - `harness` + `reporter`: batch evaluation and CI-grade reports

pub mod correction;
pub mod domain;
pub mod harness;
pub mod judge;
pub mod metrics;
pub mod obs;
pub mod precondition;
pub mod propositions;
pub mod reporter;
pub mod scorers;
pub mod telemetry;

pub use domain::{
    DimensionEvaluation, EntryType, EvalError, EvaluationWindow, Idea, IdeasEvaluation,
    Proposition, PropositionFile, PropositionOutcome, Result, ScoringContext, TargetType,
    TrajectoryEntry,
};

pub use propositions::{
    apply_hard_mode_penalty, apply_inverted_score, fill_template_variables,
    load_proposition_file, merge, PropositionLoader, TemplateVars, MAX_SCORE,
};

pub use judge::{
    BatchScoreResult, HttpJudgeClient, HttpJudgeConfig, IdeasExtractor, JudgeClient,
    MessageRewriter, MockJudgeClient, PropositionCheck, ScorePropositionResult,
};

pub use scorers::{
    score_adherence, score_consistency, score_convergence, score_fluency, score_ideas_quantity,
    ScorerDeps,
};

pub use correction::{
    CorrectionDecision, CorrectionDeps, CorrectionPipeline, CorrectionPipelineConfig,
    CorrectionSession, CorrectionStep,
};

pub use precondition::{Precondition, PreconditionResult};

pub use harness::{
    parse_window, AgentResult, DimensionOutcome, DimensionResult, Harness, HarnessOptions,
    HarnessResult, HarnessSummary, Regression,
};

pub use reporter::{format_pr_comment, write_harness_result_json, COMMENT_MARKER};

pub use metrics::METRICS;
pub use obs::EvaluationSpan;
pub use telemetry::init_tracing;
