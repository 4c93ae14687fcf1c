//! Harness runs (mock and live) and the CI report built from them.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use chrono::{Duration, Utc};
use persona_eval_core::harness::{apply_baseline, ROSTER};
use persona_eval_core::reporter::{
    format_console_summary, read_harness_result_json, write_pr_comment,
};
use persona_eval_core::{
    format_pr_comment, parse_window, write_harness_result_json, AgentResult, DimensionOutcome,
    DimensionResult, EvalError, Harness, HarnessOptions, HarnessResult, HarnessSummary,
    MockJudgeClient, PropositionLoader, ScorerDeps, COMMENT_MARKER,
};
use persona_state::fakes::{MemoryAgentDirectory, MemoryEvaluationStore, MemoryMessageSource};
use persona_state::{AgentProfile, Dimension, MessageRecord, TokenUsage};

fn rules() -> PropositionLoader {
    PropositionLoader::new(Path::new(env!("CARGO_MANIFEST_DIR")).join("../../rules"))
}

fn options(agents: &[&str], threshold: f64) -> HarnessOptions {
    let mut options = HarnessOptions::new(
        agents.iter().map(|a| a.to_string()).collect(),
        parse_window("7d").unwrap(),
    );
    options.threshold = threshold;
    options
}

fn scored(score: f64, threshold: f64) -> DimensionOutcome {
    DimensionOutcome::Scored(DimensionResult {
        score: Some(score),
        pass: score >= threshold,
        sample_size: 4,
        token_usage: TokenUsage::default(),
    })
}

fn single_agent(agent_id: &str, adherence: f64) -> HarnessResult {
    let mut dimensions = BTreeMap::new();
    dimensions.insert("adherence".to_string(), scored(adherence, 5.0));
    dimensions.insert("ideas_quantity".to_string(), DimensionOutcome::Count { count: 3 });
    let mut agents = BTreeMap::new();
    agents.insert(
        agent_id.to_string(),
        AgentResult {
            overall: adherence,
            pass: adherence >= 5.0,
            dimensions,
            baseline_delta: BTreeMap::new(),
            regressions: Vec::new(),
        },
    );
    HarnessResult {
        timestamp: Utc::now(),
        threshold: 5.0,
        agents,
        summary: HarnessSummary {
            total: 1,
            passed: usize::from(adherence >= 5.0),
            failed: usize::from(adherence < 5.0),
            regressions: 0,
        },
    }
}

#[tokio::test]
async fn mock_run_covers_whole_roster() {
    let harness = Harness::mock(rules());
    let result = harness.run_evaluation(&options(&["all"], 5.0)).await.unwrap();

    assert_eq!(result.summary.total, ROSTER.len());
    assert_eq!(result.summary.failed, 0);
    let dwight = &result.agents["dwight"];
    assert_eq!(dwight.dimensions.len(), Dimension::ALL.len());
    assert_eq!(
        dwight.dimensions["ideas_quantity"],
        DimensionOutcome::Count { count: 3 }
    );
    assert!(dwight.overall > 6.0 && dwight.overall < 8.5);
}

#[tokio::test]
async fn mock_run_is_deterministic() {
    let harness = Harness::mock(rules());
    let opts = options(&["jim", "pam"], 5.0);
    let first = harness.run_evaluation(&opts).await.unwrap();
    let second = harness.run_evaluation(&opts).await.unwrap();
    assert_eq!(first.agents, second.agents);
}

#[tokio::test]
async fn threshold_decides_pass() {
    let harness = Harness::mock(rules());
    let strict = harness.run_evaluation(&options(&["all"], 9.0)).await.unwrap();
    assert_eq!(strict.summary.failed, ROSTER.len());
    let lenient = harness.run_evaluation(&options(&["all"], 1.0)).await.unwrap();
    assert_eq!(lenient.summary.passed, ROSTER.len());
}

#[tokio::test]
async fn mock_rejects_unknown_agent() {
    let harness = Harness::mock(rules());
    let err = harness
        .run_evaluation(&options(&["bob-vance"], 5.0))
        .await
        .unwrap_err();
    assert!(matches!(err, EvalError::NotFound(_)));
}

#[tokio::test]
async fn baseline_regressions_flow_into_summary() {
    let harness = Harness::mock(rules());
    let mut opts = options(&["dwight"], 5.0);
    opts.dimensions = vec![Dimension::Adherence];
    let current = harness.run_evaluation(&opts).await.unwrap();
    let score = match &current.agents["dwight"].dimensions["adherence"] {
        DimensionOutcome::Scored(r) => r.score.unwrap(),
        other => panic!("unexpected outcome {other:?}"),
    };

    opts.baseline = Some(single_agent("dwight", score + 2.0));
    let compared = harness.run_evaluation(&opts).await.unwrap();
    assert_eq!(compared.summary.regressions, 1);
    let regression = &compared.agents["dwight"].regressions[0];
    assert_eq!(regression.dimension, "adherence");
    assert!((regression.delta + 2.0).abs() < 1e-9);
}

#[tokio::test]
async fn live_run_reads_window_messages() {
    let now = Utc::now();
    let judge = Arc::new(
        MockJudgeClient::new()
            .with_response("adh-break", 2.0, "stays in character")
            .with_ideas(serde_json::json!({"count": 2, "ideas": []})),
    );
    let deps = ScorerDeps {
        judge: judge.clone(),
        extractor: judge.clone(),
        messages: Arc::new(MemoryMessageSource::with_messages(vec![
            MessageRecord::new("dwight", "sales", "Identity theft is not a joke.", now - Duration::hours(2)),
            MessageRecord::new("dwight", "sales", "Bears eat beets.", now - Duration::hours(1)),
            MessageRecord::new("dwight", "sales", "Too old to count.", now - Duration::days(30)),
        ])),
        agents: Arc::new(MemoryAgentDirectory::with_agents(vec![
            AgentProfile::new("dwight", "Dwight", "You are Dwight Schrute."),
            AgentProfile::new("jim", "Jim", "You are Jim Halpert."),
        ])),
        store: Arc::new(MemoryEvaluationStore::new()),
        loader: rules(),
    };
    let harness = Harness::live(deps);
    let mut opts = options(&["dwight", "jim"], 5.0);
    opts.dimensions = vec![Dimension::Adherence, Dimension::IdeasQuantity];
    let result = harness.run_evaluation(&opts).await.unwrap();

    let DimensionOutcome::Scored(dwight) = &result.agents["dwight"].dimensions["adherence"] else {
        panic!("adherence should be scored");
    };
    assert_eq!(dwight.sample_size, 2);
    assert_eq!(dwight.score, Some(7.0));

    // Jim has no messages: placeholder trajectory, sample size zero.
    let DimensionOutcome::Scored(jim) = &result.agents["jim"].dimensions["adherence"] else {
        panic!("adherence should be scored");
    };
    assert_eq!(jim.sample_size, 0);
    assert_eq!(
        result.agents["jim"].dimensions["ideas_quantity"],
        DimensionOutcome::Count { count: 2 }
    );
    // One batched call plus one extraction per agent.
    assert_eq!(judge.call_count(), 4);
}

#[tokio::test]
async fn live_run_rejects_unknown_agent() {
    let judge = Arc::new(MockJudgeClient::new());
    let deps = ScorerDeps {
        judge: judge.clone(),
        extractor: judge,
        messages: Arc::new(MemoryMessageSource::new()),
        agents: Arc::new(MemoryAgentDirectory::new()),
        store: Arc::new(MemoryEvaluationStore::new()),
        loader: rules(),
    };
    let err = Harness::live(deps)
        .run_evaluation(&options(&["dwight"], 5.0))
        .await
        .unwrap_err();
    assert!(matches!(err, EvalError::NotFound(_)));
}

#[test]
fn comment_reports_all_passed() {
    let comment = format_pr_comment(&single_agent("jim", 7.3));
    assert_eq!(comment.lines().next(), Some(COMMENT_MARKER));
    assert!(comment.contains("## Persona Evaluation Report"));
    assert!(comment.contains("| Agent | Adherence | Ideas quantity | Overall | Status |"));
    assert!(comment.contains("| Jim | 7.3 | 3 | 7.3 | ✅ Pass |"));
    assert!(comment.contains("All 1 agents passed. No regressions detected."));
}

#[test]
fn comment_reports_failures() {
    let comment = format_pr_comment(&single_agent("kevin", 3.0));
    assert!(comment.contains("❌ Fail"));
    assert!(comment.contains("1 of 1 agents below threshold. No regressions detected."));
}

#[test]
fn comment_reports_regressions_with_deltas() {
    let mut current = single_agent("dwight", 5.5);
    apply_baseline(&mut current, &single_agent("dwight", 7.0), 1.0);
    let comment = format_pr_comment(&current);
    assert!(comment.contains("5.5 (-1.5)"));
    assert!(comment.contains("1 regression detected."));
    assert!(comment.contains("Dwight's adherence dropped 1.5 points (7.0 → 5.5)."));
}

#[test]
fn small_drops_are_deltas_not_regressions() {
    let mut current = single_agent("pam", 6.5);
    apply_baseline(&mut current, &single_agent("pam", 7.0), 1.0);
    assert_eq!(current.summary.regressions, 0);
    let comment = format_pr_comment(&current);
    assert!(comment.contains("6.5 (-0.5)"));
    assert!(comment.contains("No regressions detected."));
}

#[test]
fn json_report_round_trips_through_disk() {
    let dir = tempfile::tempdir().unwrap();
    let json = dir.path().join("persona-eval.json");
    let markdown = dir.path().join("comment.md");
    let result = single_agent("oscar", 8.0);

    write_harness_result_json(&json, &result).unwrap();
    write_pr_comment(&markdown, &result).unwrap();

    assert_eq!(read_harness_result_json(&json).unwrap(), result);
    let raw: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&json).unwrap()).unwrap();
    assert_eq!(raw["agents"]["oscar"]["dimensions"]["ideas_quantity"]["count"], 3);
    assert!(raw["agents"]["oscar"].get("regressions").is_none());
    assert!(std::fs::read_to_string(&markdown)
        .unwrap()
        .starts_with(COMMENT_MARKER));
}

#[test]
fn console_summary_counts() {
    let line = format_console_summary(&single_agent("toby", 4.0));
    assert!(line.contains("1 agents, 0 passed, 1 failed, 0 regressions"));
}
