//! CI reporting: the pull-request comment and the JSON report file.

use std::collections::BTreeSet;
use std::path::Path;

use anyhow::{Context, Result};

use crate::harness::{display_name, AgentResult, DimensionOutcome, HarnessResult};

/// First line of every report; lets CI find and update its own comment.
pub const COMMENT_MARKER: &str = "<!-- persona-evaluation-report -->";

/// Render the Markdown PR comment.
pub fn format_pr_comment(result: &HarnessResult) -> String {
    let dimensions: BTreeSet<&str> = result
        .agents
        .values()
        .flat_map(|a| a.dimensions.keys().map(String::as_str))
        .collect();

    let mut out = String::new();
    out.push_str(COMMENT_MARKER);
    out.push('\n');
    out.push_str("## Persona Evaluation Report\n\n");

    out.push_str("| Agent |");
    for d in &dimensions {
        out.push_str(&format!(" {} |", column_title(d)));
    }
    out.push_str(" Overall | Status |\n");
    out.push_str("|---|");
    for _ in &dimensions {
        out.push_str("---|");
    }
    out.push_str("---|---|\n");

    for (agent_id, agent) in &result.agents {
        out.push_str(&format!("| {} |", display_name(agent_id)));
        for d in &dimensions {
            out.push_str(&format!(" {} |", cell(agent, d)));
        }
        let status = if agent.pass { "✅ Pass" } else { "❌ Fail" };
        out.push_str(&format!(" {:.1} | {} |\n", agent.overall, status));
    }

    out.push('\n');
    out.push_str(&summary_line(result));
    out.push('\n');
    out
}

fn column_title(dimension: &str) -> String {
    display_name(&dimension.replace('_', " "))
}

fn cell(agent: &AgentResult, dimension: &str) -> String {
    match agent.dimensions.get(dimension) {
        None => "—".to_string(),
        Some(DimensionOutcome::Count { count }) => count.to_string(),
        Some(DimensionOutcome::Scored(r)) => match r.score {
            None => "n/a".to_string(),
            Some(score) => match agent.baseline_delta.get(dimension) {
                Some(delta) => format!("{score:.1} ({})", format_delta(*delta)),
                None => format!("{score:.1}"),
            },
        },
    }
}

/// `+0.3`, `-1.5`, or `=` when the delta rounds to zero at one decimal.
pub fn format_delta(delta: f64) -> String {
    let rounded = (delta * 10.0).round() / 10.0;
    if rounded == 0.0 {
        "=".to_string()
    } else if rounded > 0.0 {
        format!("+{rounded:.1}")
    } else {
        format!("{rounded:.1}")
    }
}

fn summary_line(result: &HarnessResult) -> String {
    let total = result.summary.total;
    let regressions: Vec<String> = result
        .agents
        .iter()
        .flat_map(|(agent_id, agent)| {
            agent.regressions.iter().map(move |r| {
                format!(
                    "{}'s {} dropped {:.1} points ({:.1} → {:.1})",
                    display_name(agent_id),
                    r.dimension,
                    r.delta.abs(),
                    r.baseline,
                    r.current
                )
            })
        })
        .collect();

    if !regressions.is_empty() {
        let head = if regressions.len() == 1 {
            "1 regression detected.".to_string()
        } else {
            format!("{} regressions detected.", regressions.len())
        };
        let details: Vec<String> = regressions.into_iter().map(|r| format!("{r}.")).collect();
        return format!("{head} {}", details.join(" "));
    }
    if result.summary.failed == 0 {
        format!("All {total} agents passed. No regressions detected.")
    } else {
        format!(
            "{} of {total} agents below threshold. No regressions detected.",
            result.summary.failed
        )
    }
}

/// One line for stderr after a CLI run.
pub fn format_console_summary(result: &HarnessResult) -> String {
    format!(
        "Persona evaluation: {} agents, {} passed, {} failed, {} regressions (threshold {:.1})",
        result.summary.total,
        result.summary.passed,
        result.summary.failed,
        result.summary.regressions,
        result.threshold
    )
}

/// Write the harness result as pretty JSON.
pub fn write_harness_result_json(path: &Path, result: &HarnessResult) -> Result<()> {
    let content = serde_json::to_string_pretty(result).context("serialize harness result")?;
    std::fs::write(path, content).with_context(|| format!("write {:?}", path))?;
    Ok(())
}

/// Read a previous harness result, e.g. a baseline.
pub fn read_harness_result_json(path: &Path) -> Result<HarnessResult> {
    let content = std::fs::read_to_string(path).with_context(|| format!("read {:?}", path))?;
    serde_json::from_str(&content).with_context(|| format!("parse harness result {:?}", path))
}

/// Write the PR comment Markdown.
pub fn write_pr_comment(path: &Path, result: &HarnessResult) -> Result<()> {
    std::fs::write(path, format_pr_comment(result)).with_context(|| format!("write {:?}", path))?;
    Ok(())
}
