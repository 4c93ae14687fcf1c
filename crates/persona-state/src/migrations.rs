//! SurrealDB schema migrations and initialization
//!
//! Sets up every persona-state table with its indexes. Safe to call on every
//! connection (all statements are idempotent `DEFINE`s).

use crate::Result;
use surrealdb::engine::any::Any;
use surrealdb::Surreal;
use tracing::{debug, info};

/// Initialize all persona-state tables in SurrealDB
pub async fn init_schema(db: &Surreal<Any>) -> Result<()> {
    info!("Initializing persona-state SurrealDB schema");

    init_evaluation_runs_table(db).await?;
    init_evaluation_scores_table(db).await?;
    init_correction_logs_table(db).await?;
    init_messages_table(db).await?;
    init_agents_table(db).await?;

    info!("persona-state schema initialization complete");
    Ok(())
}

async fn run_definition(db: &Surreal<Any>, table: &str, sql: &str) -> Result<()> {
    debug!("Initializing {} table", table);
    db.query(sql).await.map_err(|e| {
        crate::StateError::SchemaSetup(format!("Failed to define table {table}: {e}"))
    })?;
    Ok(())
}

/// Initialize `evaluation_runs`
///
/// Schema:
/// ```text
/// TABLE evaluation_runs {
///   run_id:         STRING (unique)
///   agent_id:       STRING (indexed; proxy author id for environment dimensions)
///   dimensions:     ARRAY<STRING>
///   window_start:   DATETIME
///   window_end:     DATETIME
///   rules_digest:   STRING?
///   status:         STRING (pending | running | completed | failed)
///   sample_size:    INT
///   overall_score:  FLOAT?
///   input_tokens:   INT
///   output_tokens:  INT
///   error:          STRING?
///   created_at:     DATETIME (indexed)
///   completed_at:   DATETIME?
/// }
/// ```
///
/// Status transitions are enforced by the store, not the database.
async fn init_evaluation_runs_table(db: &Surreal<Any>) -> Result<()> {
    let sql = r#"
        DEFINE TABLE evaluation_runs SCHEMALESS;
        DEFINE INDEX idx_eval_run_id ON TABLE evaluation_runs COLUMNS run_id UNIQUE;
        DEFINE INDEX idx_eval_agent_id ON TABLE evaluation_runs COLUMNS agent_id;
        DEFINE INDEX idx_eval_created_at ON TABLE evaluation_runs COLUMNS created_at;
    "#;
    run_definition(db, "evaluation_runs", sql).await
}

/// Initialize `evaluation_scores` (one row per proposition per run)
async fn init_evaluation_scores_table(db: &Surreal<Any>) -> Result<()> {
    let sql = r#"
        DEFINE TABLE evaluation_scores SCHEMALESS;
        DEFINE INDEX idx_score_run_id ON TABLE evaluation_scores COLUMNS run_id;
    "#;
    run_definition(db, "evaluation_scores", sql).await
}

/// Initialize `correction_logs` (append-only)
async fn init_correction_logs_table(db: &Surreal<Any>) -> Result<()> {
    let sql = r#"
        DEFINE TABLE correction_logs SCHEMALESS
            PERMISSIONS
                FOR create FULL
                FOR select FULL
                FOR update NONE
                FOR delete NONE;
        DEFINE INDEX idx_correction_log_id ON TABLE correction_logs COLUMNS log_id UNIQUE;
        DEFINE INDEX idx_correction_agent_id ON TABLE correction_logs COLUMNS agent_id;
    "#;
    run_definition(db, "correction_logs", sql).await
}

/// Initialize `messages`
async fn init_messages_table(db: &Surreal<Any>) -> Result<()> {
    let sql = r#"
        DEFINE TABLE messages SCHEMALESS;
        DEFINE INDEX idx_message_id ON TABLE messages COLUMNS message_id UNIQUE;
        DEFINE INDEX idx_message_agent ON TABLE messages COLUMNS agent_id, created_at;
        DEFINE INDEX idx_message_channel ON TABLE messages COLUMNS channel_id, created_at;
    "#;
    run_definition(db, "messages", sql).await
}

/// Initialize `agents`
async fn init_agents_table(db: &Surreal<Any>) -> Result<()> {
    let sql = r#"
        DEFINE TABLE agents SCHEMALESS;
        DEFINE INDEX idx_agent_id ON TABLE agents COLUMNS agent_id UNIQUE;
    "#;
    run_definition(db, "agents", sql).await
}
