//! persona-state: storage layer for the persona evaluation engine
//!
//! Holds the narrow contracts the engine has with its surroundings (sent
//! messages, agent profiles, evaluation runs, correction logs) plus two
//! implementations: in-memory fakes and a SurrealDB store.
//!
//! ## Key Components
//!
//! - `storage_traits`: `MessageSource`, `AgentDirectory`, `EvaluationStore`,
//!   `CorrectionLogStore` and their value types
//! - `fakes`: `Mutex`-backed implementations for tests and mock runs
//! - `SurrealStore`: persistent implementation (mem://, surrealkv://, ws/wss)

mod error;
pub mod fakes;
mod migrations;
mod schema;
pub mod storage_traits;
pub mod surreal_store;

pub use error::{StateError, StorageError};
pub use storage_traits::{
    AgentDirectory, AgentProfile, CorrectionLog, CorrectionLogStore, CorrectionOutcome,
    CorrectionStage, Dimension, EvaluationRunRecord, EvaluationRunStatus, EvaluationRunUpdate,
    EvaluationScore, EvaluationStore, MessagePayload, MessageRecord, MessageSource,
    NewEvaluationRun, RunId, StorageResult, TokenUsage,
};
pub use surreal_store::{CloudConfig, SurrealStore};

/// Result type for persona-state connection and schema operations
pub type Result<T> = std::result::Result<T, StateError>;
