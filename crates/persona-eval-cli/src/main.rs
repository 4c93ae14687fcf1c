//! Persona Evaluation CLI
//!
//! The `persona-eval` command scores agents across persona dimensions and
//! prints a JSON report. Exits 0 iff no agent fell below the threshold.
//!
//! ## Modes
//!
//! - `--mock-judge`: deterministic per-character scores, no network or DB
//! - default: messages from SurrealDB, judge over HTTP

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use persona_eval_core::reporter::{format_console_summary, read_harness_result_json, write_pr_comment};
use persona_eval_core::{
    init_tracing, parse_window, write_harness_result_json, Harness, HarnessOptions,
    HttpJudgeClient, PropositionLoader, ScorerDeps,
};
use persona_state::{Dimension, SurrealStore};
use tracing::{info, Level};

const DEFAULT_DIMENSIONS: &str = "adherence,consistency,fluency,convergence,ideas_quantity";

#[derive(Parser, Debug)]
#[command(name = "persona-eval")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Score chat agents against their personas", long_about = None)]
struct Cli {
    /// Comma-separated agent ids, or `all` for the full roster
    #[arg(long, default_value = "all")]
    agents: String,

    /// Comma-separated dimensions to score
    #[arg(long, default_value = DEFAULT_DIMENSIONS)]
    dimensions: String,

    /// Minimum passing score per dimension (0-9)
    #[arg(long, default_value_t = 5.0)]
    threshold: f64,

    /// Use the deterministic mock judge instead of the live stack
    #[arg(long)]
    mock_judge: bool,

    /// Write the JSON report here instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Evaluation window ending now: `Nh`, `Nd` or `Nw`
    #[arg(long, default_value = "7d")]
    window: String,

    /// Root of the rule files
    #[arg(long, env = "PERSONA_RULES_DIR", default_value = "rules")]
    rules_dir: PathBuf,

    /// Previous JSON report to compare against
    #[arg(long)]
    baseline: Option<PathBuf>,

    /// Drop (in points) that counts as a regression
    #[arg(long, default_value_t = 1.0)]
    regression_threshold: f64,

    /// Also write the Markdown PR comment to this file
    #[arg(long)]
    comment: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    init_tracing(cli.json, level);

    match run(cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

/// Run one evaluation; `Ok(true)` when every agent passed.
async fn run(cli: Cli) -> Result<bool> {
    let dimensions = parse_dimensions(&cli.dimensions)?;
    let window = parse_window(&cli.window)?;
    let loader = PropositionLoader::new(cli.rules_dir.clone());

    let mut options = HarnessOptions::new(split_list(&cli.agents), window);
    options.dimensions = dimensions;
    options.threshold = cli.threshold;
    options.regression_threshold = cli.regression_threshold;
    if let Some(path) = &cli.baseline {
        options.baseline = Some(read_harness_result_json(path)?);
    }

    let harness = if cli.mock_judge {
        Harness::mock(loader)
    } else {
        live_harness(loader).await?
    };

    info!(
        agents = %cli.agents,
        dimensions = %cli.dimensions,
        mock = cli.mock_judge,
        "starting persona evaluation"
    );
    let result = harness
        .run_evaluation(&options)
        .await
        .context("Persona evaluation failed")?;

    match &cli.output {
        Some(path) => write_harness_result_json(path, &result)?,
        None => println!(
            "{}",
            serde_json::to_string_pretty(&result).context("serialize harness result")?
        ),
    }
    if let Some(path) = &cli.comment {
        write_pr_comment(path, &result)?;
    }
    eprintln!("{}", format_console_summary(&result));

    Ok(result.summary.failed == 0)
}

async fn live_harness(loader: PropositionLoader) -> Result<Harness> {
    let store = Arc::new(
        SurrealStore::from_env()
            .await
            .context("Failed to connect to persona database")?,
    );
    let judge = Arc::new(HttpJudgeClient::from_env().context("Failed to configure judge")?);
    Ok(Harness::live(ScorerDeps {
        judge: judge.clone(),
        extractor: judge,
        messages: store.clone(),
        agents: store.clone(),
        store,
        loader,
    }))
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_dimensions(raw: &str) -> Result<Vec<Dimension>> {
    let dimensions = split_list(raw)
        .iter()
        .map(|d| {
            d.parse::<Dimension>().map_err(|_| {
                anyhow::anyhow!(
                    "Invalid dimension '{d}'. Valid dimensions: {}",
                    DEFAULT_DIMENSIONS.replace(',', ", ")
                )
            })
        })
        .collect::<Result<Vec<_>>>()?;
    if dimensions.is_empty() {
        anyhow::bail!("No dimensions given");
    }
    Ok(dimensions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn rules_root() -> PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR")).join("../../rules")
    }

    fn parse(args: &[&str]) -> Cli {
        let mut argv = vec!["persona-eval"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap()
    }

    #[test]
    fn defaults() {
        let cli = parse(&[]);
        assert_eq!(cli.agents, "all");
        assert_eq!(cli.threshold, 5.0);
        assert_eq!(cli.window, "7d");
        assert_eq!(cli.regression_threshold, 1.0);
        assert!(!cli.mock_judge);
        assert!(cli.output.is_none());
        assert_eq!(parse_dimensions(&cli.dimensions).unwrap(), Dimension::ALL.to_vec());
    }

    #[test]
    fn dimension_list_is_validated() {
        assert_eq!(
            parse_dimensions("fluency, adherence").unwrap(),
            vec![Dimension::Fluency, Dimension::Adherence]
        );
        let err = parse_dimensions("adherence,charisma").unwrap_err();
        assert!(err.to_string().contains("Invalid dimension 'charisma'"));
        assert!(parse_dimensions(" , ").is_err());
    }

    #[test]
    fn agent_lists_are_trimmed() {
        assert_eq!(split_list("jim, pam,,dwight "), vec!["jim", "pam", "dwight"]);
    }

    #[tokio::test]
    async fn mock_run_writes_report_and_comment() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("report.json");
        let comment = dir.path().join("comment.md");
        let cli = parse(&[
            "--agents",
            "jim,dwight",
            "--mock-judge",
            "--output",
            output.to_str().unwrap(),
            "--comment",
            comment.to_str().unwrap(),
            "--rules-dir",
            rules_root().to_str().unwrap(),
        ]);

        assert!(run(cli).await.unwrap());
        let report = read_harness_result_json(&output).unwrap();
        assert_eq!(report.summary.total, 2);
        assert!(std::fs::read_to_string(&comment)
            .unwrap()
            .contains("| Dwight |"));
    }

    #[tokio::test]
    async fn failing_agents_exit_nonzero() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("report.json");
        let cli = parse(&[
            "--agents",
            "kevin",
            "--mock-judge",
            "--threshold",
            "9",
            "--output",
            output.to_str().unwrap(),
            "--rules-dir",
            rules_root().to_str().unwrap(),
        ]);
        assert!(!run(cli).await.unwrap());
    }

    #[tokio::test]
    async fn bad_window_is_an_error() {
        let cli = parse(&["--mock-judge", "--window", "soon"]);
        let err = run(cli).await.unwrap_err();
        assert!(err.to_string().contains("Invalid window format"));
    }
}
