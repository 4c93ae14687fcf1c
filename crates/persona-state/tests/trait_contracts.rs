//! Trait contract tests for MessageSource, AgentDirectory, EvaluationStore
//! and CorrectionLogStore.
//!
//! The same assertions run against the in-memory fakes and the SurrealDB
//! store (in-memory engine). Any conforming implementation must pass these.

use std::collections::BTreeMap;

use chrono::{Duration, TimeZone, Utc};
use persona_state::fakes::{
    MemoryAgentDirectory, MemoryCorrectionLogStore, MemoryEvaluationStore, MemoryMessageSource,
};
use persona_state::storage_traits::*;
use persona_state::{StorageError, SurrealStore};

fn new_run(agent: &str) -> NewEvaluationRun {
    let end = Utc.with_ymd_and_hms(2024, 5, 8, 0, 0, 0).unwrap();
    NewEvaluationRun {
        agent_id: agent.to_string(),
        dimensions: vec![Dimension::Adherence],
        window_start: end - Duration::days(7),
        window_end: end,
        rules_digest: Some("abc123".to_string()),
    }
}

fn score(run_id: &RunId, proposition: &str, value: f64) -> EvaluationScore {
    EvaluationScore {
        run_id: run_id.clone(),
        dimension: Dimension::Adherence,
        proposition_id: proposition.to_string(),
        score: value,
        reasoning: format!("{proposition} reasoning"),
        context_snippet: None,
    }
}

fn correction_log(agent: &str, attempt: u32, outcome: Option<CorrectionOutcome>) -> CorrectionLog {
    let mut dimension_scores = BTreeMap::new();
    dimension_scores.insert("persona_adherence".to_string(), 6.0);
    CorrectionLog {
        id: uuid_like(agent, attempt),
        agent_id: agent.to_string(),
        channel_id: "general".to_string(),
        stage: CorrectionStage::Original,
        attempt_number: attempt,
        outcome,
        dimension_scores,
        similarity_score: Some(0.2),
        total_score: 6.0,
        token_usage: TokenUsage::new(10, 5),
        duration_ms: 12,
        candidate_text: "hello".to_string(),
        feedback: None,
        created_at: Utc::now() + Duration::milliseconds(attempt as i64),
    }
}

fn uuid_like(agent: &str, attempt: u32) -> String {
    format!("{agent}-{attempt}")
}

// ===========================================================================
// MessageSource
// ===========================================================================

fn seeded_messages() -> Vec<MessageRecord> {
    let base = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
    vec![
        MessageRecord::new("dwight", "sales", "third", base + Duration::hours(2)),
        MessageRecord::new("dwight", "sales", "first", base),
        MessageRecord::new("jim", "sales", "jim speaks", base + Duration::hours(1)),
        MessageRecord::new("dwight", "beets", "second", base + Duration::hours(1)),
        MessageRecord::new("dwight", "sales", "too late", base + Duration::days(3)),
    ]
}

async fn assert_message_source_contract<S: MessageSource>(source: &S) {
    let start = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
    let end = start + Duration::hours(2);

    let by_agent = source
        .get_agent_send_messages("dwight", start, end)
        .await
        .unwrap();
    let texts: Vec<&str> = by_agent.iter().map(|m| m.text()).collect();
    // Inclusive on both ends, oldest first
    assert_eq!(texts, vec!["first", "second", "third"]);

    let by_channel = source
        .get_channel_send_messages("sales", start, end)
        .await
        .unwrap();
    let texts: Vec<&str> = by_channel.iter().map(|m| m.text()).collect();
    assert_eq!(texts, vec!["first", "jim speaks", "third"]);

    let nobody = source
        .get_agent_send_messages("creed", start, end)
        .await
        .unwrap();
    assert!(nobody.is_empty());
}

#[tokio::test]
async fn memory_message_source_contract() {
    let source = MemoryMessageSource::with_messages(seeded_messages());
    assert_message_source_contract(&source).await;
}

#[tokio::test]
async fn surreal_message_source_contract() {
    let store = SurrealStore::in_memory().await.unwrap();
    for m in seeded_messages() {
        store.save_message(&m).await.unwrap();
    }
    assert_message_source_contract(&store).await;
}

// ===========================================================================
// AgentDirectory
// ===========================================================================

async fn assert_agent_directory_contract<D: AgentDirectory>(dir: &D) {
    let dwight = dir.get_agent("dwight").await.unwrap().unwrap();
    assert_eq!(dwight.name, "Dwight Schrute");
    assert!(dir.get_agent("nobody").await.unwrap().is_none());

    let ids: Vec<String> = dir
        .list_agents()
        .await
        .unwrap()
        .into_iter()
        .map(|a| a.id)
        .collect();
    assert_eq!(ids, vec!["dwight".to_string(), "jim".to_string()]);
}

fn agents() -> Vec<AgentProfile> {
    vec![
        AgentProfile::new("jim", "Jim Halpert", "You are Jim."),
        AgentProfile::new("dwight", "Dwight Schrute", "You are Dwight."),
    ]
}

#[tokio::test]
async fn memory_agent_directory_contract() {
    let dir = MemoryAgentDirectory::with_agents(agents());
    assert_agent_directory_contract(&dir).await;
}

#[tokio::test]
async fn surreal_agent_directory_contract() {
    let store = SurrealStore::in_memory().await.unwrap();
    for a in agents() {
        store.save_agent(&a).await.unwrap();
    }
    // Saving twice replaces rather than duplicates
    store.save_agent(&agents()[1]).await.unwrap();
    assert_agent_directory_contract(&store).await;
}

// ===========================================================================
// EvaluationStore
// ===========================================================================

async fn assert_run_lifecycle<S: EvaluationStore>(store: &S) {
    let run_id = store.create_evaluation_run(new_run("dwight")).await.unwrap();

    let run = store.get_evaluation_run(&run_id).await.unwrap();
    assert_eq!(run.status, EvaluationRunStatus::Pending);
    assert_eq!(run.rules_digest.as_deref(), Some("abc123"));
    assert!(run.completed_at.is_none());

    store
        .update_evaluation_run_status(&run_id, EvaluationRunUpdate::running())
        .await
        .unwrap();

    store.record_score(score(&run_id, "adh-voice", 7.0)).await.unwrap();
    store.record_score(score(&run_id, "adh-break", 8.0)).await.unwrap();

    store
        .update_evaluation_run_status(
            &run_id,
            EvaluationRunUpdate::completed(3, Some(7.5), TokenUsage::new(100, 20)),
        )
        .await
        .unwrap();

    let run = store.get_evaluation_run(&run_id).await.unwrap();
    assert_eq!(run.status, EvaluationRunStatus::Completed);
    assert_eq!(run.sample_size, 3);
    assert_eq!(run.overall_score, Some(7.5));
    assert_eq!(run.token_usage, TokenUsage::new(100, 20));
    assert!(run.completed_at.is_some());

    let scores = store.list_scores(&run_id).await.unwrap();
    let ids: Vec<&str> = scores.iter().map(|s| s.proposition_id.as_str()).collect();
    assert_eq!(ids, vec!["adh-voice", "adh-break"]);
}

async fn assert_terminal_runs_are_immutable<S: EvaluationStore>(store: &S) {
    let run_id = store.create_evaluation_run(new_run("jim")).await.unwrap();
    store
        .update_evaluation_run_status(&run_id, EvaluationRunUpdate::failed(TokenUsage::new(5, 0), "judge down"))
        .await
        .unwrap();

    let run = store.get_evaluation_run(&run_id).await.unwrap();
    assert_eq!(run.status, EvaluationRunStatus::Failed);
    assert_eq!(run.error.as_deref(), Some("judge down"));

    let err = store
        .update_evaluation_run_status(&run_id, EvaluationRunUpdate::running())
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::InvalidRunState { .. }));

    let err = store.record_score(score(&run_id, "adh-voice", 1.0)).await.unwrap_err();
    assert!(matches!(err, StorageError::InvalidRunState { .. }));
}

async fn assert_unknown_run<S: EvaluationStore>(store: &S) {
    let bogus = RunId::new();
    let err = store.get_evaluation_run(&bogus).await.unwrap_err();
    assert!(matches!(err, StorageError::RunNotFound { .. }));

    let err = store
        .update_evaluation_run_status(&bogus, EvaluationRunUpdate::running())
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::RunNotFound { .. }));
}

#[tokio::test]
async fn memory_evaluation_store_lifecycle() {
    let store = MemoryEvaluationStore::new();
    assert_run_lifecycle(&store).await;
    assert_terminal_runs_are_immutable(&store).await;
    assert_unknown_run(&store).await;
    assert_eq!(store.runs().unwrap().len(), 2);
}

#[tokio::test]
async fn surreal_evaluation_store_lifecycle() {
    let store = SurrealStore::in_memory().await.unwrap();
    assert_run_lifecycle(&store).await;
    assert_terminal_runs_are_immutable(&store).await;
    assert_unknown_run(&store).await;
}

#[tokio::test]
async fn pending_run_cannot_complete_directly() {
    let store = MemoryEvaluationStore::new();
    let run_id = store.create_evaluation_run(new_run("pam")).await.unwrap();
    let err = store
        .update_evaluation_run_status(
            &run_id,
            EvaluationRunUpdate::completed(0, None, TokenUsage::default()),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::InvalidRunState { .. }));
}

// ===========================================================================
// CorrectionLogStore
// ===========================================================================

async fn assert_correction_log_contract<S: CorrectionLogStore>(store: &S) {
    store
        .record_correction_log(correction_log("dwight", 1, None))
        .await
        .unwrap();
    store
        .record_correction_log(correction_log("dwight", 2, Some(CorrectionOutcome::RegenerationSuccess)))
        .await
        .unwrap();
    store
        .record_correction_log(correction_log("jim", 1, Some(CorrectionOutcome::Passed)))
        .await
        .unwrap();

    let logs = store.list_correction_logs("dwight").await.unwrap();
    assert_eq!(logs.len(), 2);
    assert_eq!(logs[0].attempt_number, 1);
    assert_eq!(logs[0].outcome, None);
    assert_eq!(logs[1].outcome, Some(CorrectionOutcome::RegenerationSuccess));
    assert_eq!(logs[1].token_usage, TokenUsage::new(10, 5));
    assert_eq!(logs[1].dimension_scores.get("persona_adherence"), Some(&6.0));

    assert!(store.list_correction_logs("nobody").await.unwrap().is_empty());
}

#[tokio::test]
async fn memory_correction_log_contract() {
    let store = MemoryCorrectionLogStore::new();
    assert_correction_log_contract(&store).await;
    assert_eq!(store.all().unwrap().len(), 3);
}

#[tokio::test]
async fn surreal_correction_log_contract() {
    let store = SurrealStore::in_memory().await.unwrap();
    assert_correction_log_contract(&store).await;
}

// ===========================================================================
// Value types
// ===========================================================================

#[test]
fn dimension_parses_canonical_names() {
    for d in Dimension::ALL {
        assert_eq!(d.as_str().parse::<Dimension>().unwrap(), d);
    }
    assert!("vibes".parse::<Dimension>().is_err());
    assert!(Dimension::IdeasQuantity.is_count());
    assert!(!Dimension::Adherence.is_count());
}

#[test]
fn token_usage_sums() {
    let total: TokenUsage = vec![TokenUsage::new(1, 2), TokenUsage::new(3, 4)]
        .into_iter()
        .sum();
    assert_eq!(total, TokenUsage::new(4, 6));
    assert_eq!(total.total(), 10);
    assert!(TokenUsage::default().is_zero());
}
