//! Dimension scorer behaviour against in-memory collaborators and the
//! repository's default rule files.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{Duration, TimeZone, Utc};
use persona_eval_core::judge::{
    BatchScoreResult, JudgeClient, MockJudgeClient, PropositionCheck, ScorePropositionResult,
};
use persona_eval_core::{
    score_adherence, score_consistency, score_convergence, score_fluency, score_ideas_quantity,
    EvalError, EvaluationWindow, IdeasExtractor, Proposition, PropositionLoader, ScorerDeps,
    ScoringContext,
};
use persona_state::fakes::{MemoryAgentDirectory, MemoryEvaluationStore, MemoryMessageSource};
use persona_state::{
    AgentProfile, EvaluationRunRecord, EvaluationRunStatus, EvaluationRunUpdate, EvaluationScore,
    EvaluationStore, MessageRecord, NewEvaluationRun, RunId, StorageError, StorageResult,
    TokenUsage,
};
use serde_json::json;

fn rules() -> PropositionLoader {
    PropositionLoader::new(Path::new(env!("CARGO_MANIFEST_DIR")).join("../../rules"))
}

fn window() -> EvaluationWindow {
    let end = Utc.with_ymd_and_hms(2024, 6, 8, 12, 0, 0).unwrap();
    EvaluationWindow::new(end - Duration::days(7), end)
}

/// Message `hours` after the window start (negative for history).
fn msg(agent: &str, channel: &str, text: &str, hours: i64) -> MessageRecord {
    MessageRecord::new(agent, channel, text, window().start + Duration::hours(hours))
}

struct Fixture {
    deps: ScorerDeps,
    store: Arc<MemoryEvaluationStore>,
}

fn fixture<J>(judge: Arc<J>, messages: Vec<MessageRecord>) -> Fixture
where
    J: JudgeClient + IdeasExtractor + 'static,
{
    let store = Arc::new(MemoryEvaluationStore::new());
    let deps = ScorerDeps {
        judge: judge.clone(),
        extractor: judge,
        messages: Arc::new(MemoryMessageSource::with_messages(messages)),
        agents: Arc::new(MemoryAgentDirectory::with_agents(vec![
            AgentProfile::new("dwight", "Dwight", "You are Dwight Schrute."),
            AgentProfile::new("jim", "Jim", "You are Jim Halpert."),
        ])),
        store: store.clone(),
        loader: rules(),
    };
    Fixture { deps, store }
}

#[tokio::test]
async fn adherence_empty_window_scores_nine_without_judge_calls() {
    let judge = Arc::new(MockJudgeClient::new());
    let f = fixture(judge.clone(), Vec::new());

    let eval = score_adherence(&f.deps, "dwight", window()).await.unwrap();
    assert_eq!(eval.overall_score, Some(9.0));
    assert_eq!(eval.sample_size, 0);
    assert!(eval.token_usage.is_zero());
    assert_eq!(judge.call_count(), 0);

    let runs = f.store.runs().unwrap();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].status, EvaluationRunStatus::Completed);
    assert_eq!(runs[0].overall_score, Some(9.0));
}

#[tokio::test]
async fn adherence_samples_at_most_twenty_and_weights_scores() {
    let judge = Arc::new(
        MockJudgeClient::new()
            .with_response("adh-voice", 8.0, "sounds right")
            .with_response("adh-values", 6.0, "a bit soft")
            .with_response("adh-knowledge", 8.0, "plausible")
            .with_response("adh-break", 1.0, "never breaks")
            .with_response("adh-dwight-authority", 8.0, "asserts rank"),
    );
    let messages = (0..25)
        .map(|i| msg("dwight", "sales", &format!("Bears eat beets {i}"), i))
        .collect();
    let f = fixture(judge.clone(), messages);

    let eval = score_adherence(&f.deps, "dwight", window()).await.unwrap();
    assert_eq!(eval.sample_size, 20);
    assert_eq!(judge.call_count(), 20);
    // (8 + 6 + 8×0.5 + (9−1) + 8×0.5) / 4
    let overall = eval.overall_score.unwrap();
    assert!((overall - 7.5).abs() < 1e-9, "overall {overall}");

    let run_id = eval.run_id.clone().unwrap();
    let scores = f.store.list_scores(&run_id).await.unwrap();
    assert_eq!(scores.len(), 5);
    let run = f.store.get_evaluation_run(&run_id).await.unwrap();
    assert_eq!(run.status, EvaluationRunStatus::Completed);
    assert_eq!(run.sample_size, 20);
    assert!(run.rules_digest.is_some());
}

#[tokio::test]
async fn unknown_agent_is_not_found() {
    let judge = Arc::new(MockJudgeClient::new());
    let f = fixture(judge, Vec::new());
    let err = score_adherence(&f.deps, "toby", window()).await.unwrap_err();
    assert!(matches!(err, EvalError::NotFound(_)));
    assert!(f.store.runs().unwrap().is_empty());
}

#[tokio::test]
async fn consistency_cold_start_is_null() {
    let judge = Arc::new(MockJudgeClient::new());
    let f = fixture(judge.clone(), vec![msg("jim", "sales", "Nice tie", 5)]);

    let eval = score_consistency(&f.deps, "jim", window()).await.unwrap();
    assert_eq!(eval.overall_score, None);
    assert_eq!(eval.sample_size, 0);
    assert_eq!(judge.call_count(), 0);
    assert_eq!(
        f.store.runs().unwrap()[0].status,
        EvaluationRunStatus::Completed
    );
}

#[tokio::test]
async fn consistency_without_current_messages_is_nine() {
    let judge = Arc::new(MockJudgeClient::new());
    let f = fixture(judge.clone(), vec![msg("jim", "sales", "old news", -48)]);
    let eval = score_consistency(&f.deps, "jim", window()).await.unwrap();
    assert_eq!(eval.overall_score, Some(9.0));
    assert_eq!(judge.call_count(), 0);
}

#[tokio::test]
async fn consistency_without_shared_channels_is_null() {
    let judge = Arc::new(MockJudgeClient::new());
    let f = fixture(
        judge.clone(),
        vec![
            msg("jim", "annex", "earlier", -24),
            msg("jim", "sales", "later", 24),
        ],
    );
    let eval = score_consistency(&f.deps, "jim", window()).await.unwrap();
    assert_eq!(eval.overall_score, None);
    assert_eq!(judge.call_count(), 0);
}

#[tokio::test]
async fn consistency_judges_at_most_ten_pairs() {
    let judge = Arc::new(MockJudgeClient::new());
    let mut messages: Vec<MessageRecord> = (1..=3)
        .map(|i| msg("jim", "sales", &format!("earlier {i}"), -24 * i))
        .collect();
    messages.extend((1..=5).map(|i| msg("jim", "sales", &format!("recent {i}"), i)));
    // Older than the lookback: ignored
    messages.push(msg("jim", "sales", "ancient", -24 * 40));
    let f = fixture(judge.clone(), messages);

    let eval = score_consistency(&f.deps, "jim", window()).await.unwrap();
    assert_eq!(eval.sample_size, 10);
    assert_eq!(judge.call_count(), 10);
    assert!(eval.overall_score.is_some());
}

#[tokio::test]
async fn convergence_empty_channel_has_no_run() {
    let judge = Arc::new(MockJudgeClient::new());
    let f = fixture(judge.clone(), Vec::new());
    let eval = score_convergence(&f.deps, "sales", window()).await.unwrap();
    assert_eq!(eval.overall_score, Some(9.0));
    assert_eq!(eval.sample_size, 0);
    assert!(eval.run_id.is_none());
    assert_eq!(judge.call_count(), 0);
    assert!(f.store.runs().unwrap().is_empty());
}

#[tokio::test]
async fn convergence_uses_first_author_as_run_agent() {
    let judge = Arc::new(MockJudgeClient::new());
    let f = fixture(
        judge.clone(),
        vec![
            msg("jim", "sales", "Question", 1),
            msg("dwight", "sales", "False.", 2),
            msg("jim", "sales", "Identity theft is not a joke", 3),
        ],
    );
    let eval = score_convergence(&f.deps, "sales", window()).await.unwrap();
    assert_eq!(eval.sample_size, 3);
    assert_eq!(judge.call_count(), 1);
    let runs = f.store.runs().unwrap();
    assert_eq!(runs[0].agent_id, "jim");
    assert_eq!(runs[0].sample_size, 3);
}

#[tokio::test]
async fn ideas_quantity_counts_listed_ideas() {
    let judge = Arc::new(MockJudgeClient::new().with_ideas(json!({
        "count": 5,
        "ideas": [
            {"id": "i1", "description": "Dunder Mifflin Infinity"},
            {"id": "i2", "description": "Michael Scott Paper Company"}
        ]
    })));
    let f = fixture(judge.clone(), vec![msg("michael", "sales", "Hear me out", 1)]);
    let eval = score_ideas_quantity(&f.deps, "sales", window()).await.unwrap();
    assert_eq!(eval.count, 2);
    assert_eq!(eval.ideas.len(), 2);
    assert_eq!(judge.call_count(), 1);
    assert!(eval.run_id.is_some());
}

#[tokio::test]
async fn ideas_quantity_empty_makes_no_call() {
    let judge = Arc::new(MockJudgeClient::new());
    let f = fixture(judge.clone(), Vec::new());
    let eval = score_ideas_quantity(&f.deps, "sales", window()).await.unwrap();
    assert_eq!(eval.count, 0);
    assert!(eval.run_id.is_none());
    assert_eq!(judge.call_count(), 0);
}

/// Judge that rejects every call.
struct DownJudge;

#[async_trait]
impl JudgeClient for DownJudge {
    async fn check_proposition(
        &self,
        _p: &Proposition,
        _c: &ScoringContext,
    ) -> persona_eval_core::Result<PropositionCheck> {
        Err(EvalError::Judge("judge offline".to_string()))
    }

    async fn score_proposition(
        &self,
        _p: &Proposition,
        _c: &ScoringContext,
    ) -> persona_eval_core::Result<ScorePropositionResult> {
        Err(EvalError::Judge("judge offline".to_string()))
    }

    async fn score_propositions(
        &self,
        _p: &[Proposition],
        _c: &ScoringContext,
    ) -> persona_eval_core::Result<BatchScoreResult> {
        Err(EvalError::Judge("judge offline".to_string()))
    }
}

#[async_trait]
impl IdeasExtractor for DownJudge {
    async fn extract_ideas(
        &self,
        _t: &ScoringContext,
    ) -> persona_eval_core::Result<persona_eval_core::judge::RawIdeasResponse> {
        Err(EvalError::Judge("judge offline".to_string()))
    }
}

#[tokio::test]
async fn judge_failure_marks_run_failed_and_propagates() {
    let f = fixture(
        Arc::new(DownJudge),
        vec![msg("dwight", "sales", "Bears", 1)],
    );
    let err = score_adherence(&f.deps, "dwight", window()).await.unwrap_err();
    assert!(matches!(err, EvalError::Judge(_)));

    let runs = f.store.runs().unwrap();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].status, EvaluationRunStatus::Failed);
    assert!(runs[0].error.as_deref().unwrap_or_default().contains("judge offline"));
    assert_eq!(runs[0].token_usage, TokenUsage::default());
}

/// Evaluation store whose `completed` transition always fails.
#[derive(Default)]
struct RejectsCompletion {
    inner: MemoryEvaluationStore,
}

#[async_trait]
impl EvaluationStore for RejectsCompletion {
    async fn create_evaluation_run(&self, run: NewEvaluationRun) -> StorageResult<RunId> {
        self.inner.create_evaluation_run(run).await
    }

    async fn update_evaluation_run_status(
        &self,
        run_id: &RunId,
        update: EvaluationRunUpdate,
    ) -> StorageResult<()> {
        if update.status == EvaluationRunStatus::Completed {
            return Err(StorageError::Backend("write timeout".to_string()));
        }
        self.inner.update_evaluation_run_status(run_id, update).await
    }

    async fn record_score(&self, score: EvaluationScore) -> StorageResult<()> {
        self.inner.record_score(score).await
    }

    async fn get_evaluation_run(&self, run_id: &RunId) -> StorageResult<EvaluationRunRecord> {
        self.inner.get_evaluation_run(run_id).await
    }

    async fn list_scores(&self, run_id: &RunId) -> StorageResult<Vec<EvaluationScore>> {
        self.inner.list_scores(run_id).await
    }
}

#[tokio::test]
async fn completion_write_failure_marks_run_failed() {
    let store = Arc::new(RejectsCompletion::default());
    let mut deps = fixture(
        Arc::new(MockJudgeClient::new()),
        vec![msg("dwight", "sales", "Bears", 1)],
    )
    .deps;
    deps.store = store.clone() as Arc<dyn EvaluationStore>;

    let err = score_adherence(&deps, "dwight", window()).await.unwrap_err();
    assert!(matches!(err, EvalError::Storage(_)));

    let runs = store.inner.runs().unwrap();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].status, EvaluationRunStatus::Failed);
    assert!(runs[0].error.as_deref().unwrap_or_default().contains("write timeout"));
}

/// Mock judge that remembers every context it was shown.
#[derive(Default)]
struct RecordingJudge {
    inner: MockJudgeClient,
    seen: Mutex<Vec<ScoringContext>>,
}

#[async_trait]
impl JudgeClient for RecordingJudge {
    async fn check_proposition(
        &self,
        p: &Proposition,
        c: &ScoringContext,
    ) -> persona_eval_core::Result<PropositionCheck> {
        self.inner.check_proposition(p, c).await
    }

    async fn score_proposition(
        &self,
        p: &Proposition,
        c: &ScoringContext,
    ) -> persona_eval_core::Result<ScorePropositionResult> {
        self.inner.score_proposition(p, c).await
    }

    async fn score_propositions(
        &self,
        p: &[Proposition],
        c: &ScoringContext,
    ) -> persona_eval_core::Result<BatchScoreResult> {
        self.seen.lock().unwrap().push(c.clone());
        self.inner.score_propositions(p, c).await
    }
}

#[async_trait]
impl IdeasExtractor for RecordingJudge {
    async fn extract_ideas(
        &self,
        t: &ScoringContext,
    ) -> persona_eval_core::Result<persona_eval_core::judge::RawIdeasResponse> {
        self.inner.extract_ideas(t).await
    }
}

#[tokio::test]
async fn persona_shown_for_adherence_but_not_fluency() {
    let judge = Arc::new(RecordingJudge::default());
    let f = fixture(judge.clone(), vec![msg("dwight", "sales", "Bears eat beets", 1)]);

    score_adherence(&f.deps, "dwight", window()).await.unwrap();
    score_fluency(&f.deps, "dwight", window()).await.unwrap();

    let seen = judge.seen.lock().unwrap();
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[0].persona.as_deref(), Some("You are Dwight Schrute."));
    assert_eq!(seen[1].persona, None);
    assert_eq!(seen[1].trajectory[0].agent_name, "Dwight");
}

#[tokio::test]
async fn consistency_pairs_are_labelled() {
    let judge = Arc::new(RecordingJudge::default());
    let f = fixture(
        judge.clone(),
        vec![
            msg("jim", "sales", "I love this job", -24),
            msg("jim", "sales", "I hate this job", 24),
        ],
    );
    score_consistency(&f.deps, "jim", window()).await.unwrap();

    let seen = judge.seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    let t = &seen[0].trajectory;
    assert_eq!(t[0].text, "[Earlier message] I love this job");
    assert_eq!(t[1].text, "[Recent message] I hate this job");
    assert_eq!(seen[0].persona, None);
}

#[tokio::test]
async fn convergence_appends_vocabulary_analysis() {
    let judge = Arc::new(RecordingJudge::default());
    let f = fixture(
        judge.clone(),
        vec![
            msg("jim", "sales", "Bears. Beets.", 1),
            msg("dwight", "sales", "Battlestar Galactica.", 2),
        ],
    );
    score_convergence(&f.deps, "sales", window()).await.unwrap();

    let seen = judge.seen.lock().unwrap();
    let t = &seen[0].trajectory;
    assert_eq!(t.len(), 3);
    assert_eq!(t[0].agent_name, "Jim");
    let analysis = &t[2];
    assert_eq!(analysis.agent_name, "analysis");
    assert!(analysis.text.contains("Pairwise vocabulary similarity"));
}
