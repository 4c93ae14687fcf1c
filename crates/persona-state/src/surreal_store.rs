//! SurrealDB-backed implementation of every persona-state trait
//!
//! Uses the rows in `schema` for persistence, converting to/from
//! `storage_traits` types at the boundary.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use surrealdb::engine::any::Any;
use surrealdb::opt::auth::{Database, Root};
use surrealdb::sql::Datetime as SurrealDatetime;
use surrealdb::Surreal;
use tracing::{debug, info, instrument};

use crate::error::{StateError, StorageError};
use crate::migrations;
use crate::schema::{
    AgentRow, CorrectionLogRow, EvaluationRunPatch, EvaluationRunRow, EvaluationScoreRow,
    MessageRow,
};
use crate::storage_traits::{
    AgentDirectory, AgentProfile, CorrectionLog, CorrectionLogStore, EvaluationRunRecord,
    EvaluationRunUpdate, EvaluationScore, EvaluationStore, MessageRecord, MessageSource,
    NewEvaluationRun, RunId, StorageResult,
};

const DEFAULT_NAMESPACE: &str = "persona";
const DEFAULT_DATABASE: &str = "main";
const DEFAULT_LOCAL_PATH: &str = ".persona/db";

/// Configuration for a remote (WebSocket) SurrealDB connection
#[derive(Debug, Clone)]
pub struct CloudConfig {
    /// WebSocket endpoint URL (e.g., "wss://xxx.aws-use1.surrealdb.cloud")
    pub endpoint: String,
    pub username: String,
    pub password: String,
    /// Namespace (default: "persona")
    pub namespace: String,
    /// Database name (default: "main")
    pub database: String,
    /// Whether this is a root user (true) or database user (false)
    pub is_root: bool,
}

impl CloudConfig {
    /// Create from environment variables
    ///
    /// Reads:
    /// - SURREALDB_ENDPOINT (required)
    /// - SURREALDB_USERNAME (required)
    /// - SURREALDB_PASSWORD (required)
    /// - SURREALDB_NAMESPACE (optional, default: "persona")
    /// - SURREALDB_DATABASE (optional, default: "main")
    /// - SURREALDB_ROOT (optional, default: "false")
    pub fn from_env() -> std::result::Result<Self, String> {
        let endpoint =
            std::env::var("SURREALDB_ENDPOINT").map_err(|_| "SURREALDB_ENDPOINT not set")?;
        let username =
            std::env::var("SURREALDB_USERNAME").map_err(|_| "SURREALDB_USERNAME not set")?;
        let password =
            std::env::var("SURREALDB_PASSWORD").map_err(|_| "SURREALDB_PASSWORD not set")?;
        let namespace = std::env::var("SURREALDB_NAMESPACE")
            .unwrap_or_else(|_| DEFAULT_NAMESPACE.to_string());
        let database =
            std::env::var("SURREALDB_DATABASE").unwrap_or_else(|_| DEFAULT_DATABASE.to_string());
        let is_root = std::env::var("SURREALDB_ROOT")
            .map(|v| v.to_lowercase() == "true")
            .unwrap_or(false);

        Ok(Self {
            endpoint,
            username,
            password,
            namespace,
            database,
            is_root,
        })
    }
}

/// SurrealDB-backed message source, agent directory, evaluation store and
/// correction log store.
#[derive(Clone)]
pub struct SurrealStore {
    db: Surreal<Any>,
}

fn backend(e: surrealdb::Error) -> StorageError {
    StorageError::Backend(e.to_string())
}

impl SurrealStore {
    /// Create an in-memory instance for testing.
    ///
    /// Connects to `mem://`, selects `persona/main`, and runs `init_schema`.
    pub async fn in_memory() -> crate::Result<Self> {
        Self::connect("mem://", DEFAULT_NAMESPACE, DEFAULT_DATABASE).await
    }

    /// Create from environment variables.
    ///
    /// Resolution order: `CloudConfig::from_env`, then `SURREALDB_URL`, then
    /// local SurrealKV persistence under `.persona/db`.
    pub async fn from_env() -> crate::Result<Self> {
        if let Ok(config) = CloudConfig::from_env() {
            return Self::connect_cloud(config).await;
        }

        if let Ok(url) = std::env::var("SURREALDB_URL") {
            return Self::connect(&url, DEFAULT_NAMESPACE, DEFAULT_DATABASE).await;
        }

        std::fs::create_dir_all(DEFAULT_LOCAL_PATH).map_err(|e| {
            StateError::Connection(format!(
                "Failed to create database directory {}: {}",
                DEFAULT_LOCAL_PATH, e
            ))
        })?;
        let url = format!("surrealkv://{}", DEFAULT_LOCAL_PATH);
        info!(
            "No cloud config or SURREALDB_URL found, using local persistence: {}",
            url
        );
        Self::connect(&url, DEFAULT_NAMESPACE, DEFAULT_DATABASE).await
    }

    /// Connect to `url` without authentication and prepare the schema.
    pub async fn connect(url: &str, namespace: &str, database: &str) -> crate::Result<Self> {
        let db = surrealdb::engine::any::connect(url)
            .await
            .map_err(|e| StateError::Connection(format!("Failed to connect to {}: {}", url, e)))?;

        db.use_ns(namespace)
            .use_db(database)
            .await
            .map_err(|e| StateError::Connection(e.to_string()))?;

        migrations::init_schema(&db).await?;
        info!("SurrealStore connected ({})", url);
        Ok(Self { db })
    }

    #[instrument(skip(config), fields(endpoint = %config.endpoint, namespace = %config.namespace))]
    async fn connect_cloud(config: CloudConfig) -> crate::Result<Self> {
        let db = surrealdb::engine::any::connect(&config.endpoint)
            .await
            .map_err(|e| StateError::Connection(e.to_string()))?;

        if config.is_root {
            db.signin(Root {
                username: &config.username,
                password: &config.password,
            })
            .await
            .map_err(|e| StateError::Connection(format!("Root auth failed: {e}")))?;
        } else {
            db.signin(Database {
                namespace: &config.namespace,
                database: &config.database,
                username: &config.username,
                password: &config.password,
            })
            .await
            .map_err(|e| StateError::Connection(format!("DB auth failed: {e}")))?;
        }

        db.use_ns(&config.namespace)
            .use_db(&config.database)
            .await
            .map_err(|e| StateError::Connection(e.to_string()))?;

        migrations::init_schema(&db).await?;
        info!("SurrealStore connected (cloud)");
        Ok(Self { db })
    }

    /// Persist a sent message.
    pub async fn save_message(&self, message: &MessageRecord) -> StorageResult<()> {
        let _created: Option<MessageRow> = self
            .db
            .create("messages")
            .content(MessageRow::from(message))
            .await
            .map_err(backend)?;
        Ok(())
    }

    /// Insert or replace an agent profile.
    pub async fn save_agent(&self, agent: &AgentProfile) -> StorageResult<()> {
        let aid = agent.id.clone();
        self.db
            .query("DELETE agents WHERE agent_id = $aid")
            .bind(("aid", aid))
            .await
            .map_err(backend)?;
        let _created: Option<AgentRow> = self
            .db
            .create("agents")
            .content(AgentRow::from(agent))
            .await
            .map_err(backend)?;
        Ok(())
    }

    // -- private helpers -----------------------------------------------------

    async fn fetch_run(&self, rid: &str) -> StorageResult<EvaluationRunRow> {
        let rid_owned = rid.to_string();
        let mut res = self
            .db
            .query("SELECT * FROM evaluation_runs WHERE run_id = $rid")
            .bind(("rid", rid_owned))
            .await
            .map_err(backend)?;

        let rows: Vec<EvaluationRunRow> = res.take(0).map_err(backend)?;

        rows.into_iter()
            .next()
            .ok_or_else(|| StorageError::RunNotFound {
                run_id: rid.to_string(),
            })
    }

    async fn select_messages(
        &self,
        field: &'static str,
        key: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> StorageResult<Vec<MessageRecord>> {
        let sql = format!(
            "SELECT * FROM messages WHERE {field} = $key \
             AND created_at >= $start AND created_at <= $end \
             ORDER BY created_at ASC"
        );
        let mut res = self
            .db
            .query(sql)
            .bind(("key", key.to_string()))
            .bind(("start", SurrealDatetime::from(start)))
            .bind(("end", SurrealDatetime::from(end)))
            .await
            .map_err(backend)?;

        let rows: Vec<MessageRow> = res.take(0).map_err(backend)?;
        Ok(rows.into_iter().map(MessageRecord::from).collect())
    }
}

#[async_trait]
impl MessageSource for SurrealStore {
    async fn get_agent_send_messages(
        &self,
        agent_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> StorageResult<Vec<MessageRecord>> {
        self.select_messages("agent_id", agent_id, start, end).await
    }

    async fn get_channel_send_messages(
        &self,
        channel_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> StorageResult<Vec<MessageRecord>> {
        self.select_messages("channel_id", channel_id, start, end)
            .await
    }
}

#[async_trait]
impl AgentDirectory for SurrealStore {
    async fn get_agent(&self, agent_id: &str) -> StorageResult<Option<AgentProfile>> {
        let aid = agent_id.to_string();
        let mut res = self
            .db
            .query("SELECT * FROM agents WHERE agent_id = $aid")
            .bind(("aid", aid))
            .await
            .map_err(backend)?;
        let rows: Vec<AgentRow> = res.take(0).map_err(backend)?;
        Ok(rows.into_iter().next().map(AgentProfile::from))
    }

    async fn list_agents(&self) -> StorageResult<Vec<AgentProfile>> {
        let mut res = self
            .db
            .query("SELECT * FROM agents ORDER BY agent_id ASC")
            .await
            .map_err(backend)?;
        let rows: Vec<AgentRow> = res.take(0).map_err(backend)?;
        Ok(rows.into_iter().map(AgentProfile::from).collect())
    }
}

#[async_trait]
impl EvaluationStore for SurrealStore {
    async fn create_evaluation_run(&self, run: NewEvaluationRun) -> StorageResult<RunId> {
        let run_id = RunId::new();
        let row = EvaluationRunRow::new(&run_id, run);

        debug!(run_id = %run_id, agent_id = %row.agent_id, "creating evaluation run");

        let _created: Option<EvaluationRunRow> = self
            .db
            .create("evaluation_runs")
            .content(row)
            .await
            .map_err(backend)?;

        Ok(run_id)
    }

    async fn update_evaluation_run_status(
        &self,
        run_id: &RunId,
        update: EvaluationRunUpdate,
    ) -> StorageResult<()> {
        let row = self.fetch_run(&run_id.0).await?;
        if !row.status.can_transition_to(update.status) {
            return Err(StorageError::InvalidRunState {
                run_id: run_id.0.clone(),
                status: row.status.as_str().to_string(),
                expected: format!("a status that may become {}", update.status.as_str()),
            });
        }

        let patch = EvaluationRunPatch::from(update);
        let rid_owned = run_id.0.clone();

        self.db
            .query("UPDATE evaluation_runs MERGE $patch WHERE run_id = $rid")
            .bind(("patch", patch))
            .bind(("rid", rid_owned))
            .await
            .map_err(backend)?;

        Ok(())
    }

    async fn record_score(&self, score: EvaluationScore) -> StorageResult<()> {
        let row = self.fetch_run(&score.run_id.0).await?;
        if row.status.is_terminal() {
            return Err(StorageError::InvalidRunState {
                run_id: score.run_id.0.clone(),
                status: row.status.as_str().to_string(),
                expected: "running".to_string(),
            });
        }

        let _created: Option<EvaluationScoreRow> = self
            .db
            .create("evaluation_scores")
            .content(EvaluationScoreRow::from(score))
            .await
            .map_err(backend)?;
        Ok(())
    }

    async fn get_evaluation_run(&self, run_id: &RunId) -> StorageResult<EvaluationRunRecord> {
        Ok(self.fetch_run(&run_id.0).await?.into_record())
    }

    async fn list_scores(&self, run_id: &RunId) -> StorageResult<Vec<EvaluationScore>> {
        // Verify run exists
        self.fetch_run(&run_id.0).await?;

        let rid_owned = run_id.0.clone();
        let mut res = self
            .db
            .query("SELECT * FROM evaluation_scores WHERE run_id = $rid ORDER BY created_at ASC")
            .bind(("rid", rid_owned))
            .await
            .map_err(backend)?;
        let rows: Vec<EvaluationScoreRow> = res.take(0).map_err(backend)?;
        Ok(rows.into_iter().map(EvaluationScore::from).collect())
    }
}

#[async_trait]
impl CorrectionLogStore for SurrealStore {
    async fn record_correction_log(&self, log: CorrectionLog) -> StorageResult<()> {
        let _created: Option<CorrectionLogRow> = self
            .db
            .create("correction_logs")
            .content(CorrectionLogRow::from(log))
            .await
            .map_err(backend)?;
        Ok(())
    }

    async fn list_correction_logs(&self, agent_id: &str) -> StorageResult<Vec<CorrectionLog>> {
        let aid = agent_id.to_string();
        let mut res = self
            .db
            .query("SELECT * FROM correction_logs WHERE agent_id = $aid ORDER BY created_at ASC")
            .bind(("aid", aid))
            .await
            .map_err(backend)?;
        let rows: Vec<CorrectionLogRow> = res.take(0).map_err(backend)?;
        Ok(rows.into_iter().map(CorrectionLog::from).collect())
    }
}
