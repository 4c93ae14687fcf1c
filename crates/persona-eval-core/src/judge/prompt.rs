//! Prompt rendering and defensive response parsing for LLM judges.

use serde_json::Value;

use crate::domain::{EvalError, Proposition, Result, ScoringContext};
use crate::propositions::clamp_score;

pub const JUDGE_SYSTEM_PROMPT: &str = "You are a strict evaluator of chat agent behaviour. \
Judge only the evidence shown. Respond with a single JSON object and nothing else.";

pub const REWRITE_SYSTEM_PROMPT: &str = "You rewrite chat messages so they satisfy reviewer \
feedback while keeping the author's voice and intent. Respond with a single JSON object and \
nothing else.";

/// Render persona and trajectory as plain text evidence.
pub fn render_context(context: &ScoringContext) -> String {
    let mut out = String::new();
    if let Some(persona) = &context.persona {
        out.push_str("## Persona\n");
        out.push_str(persona.trim());
        out.push_str("\n\n");
    }
    out.push_str("## Trajectory\n");
    if context.trajectory.is_empty() {
        out.push_str("(empty)\n");
    }
    for entry in &context.trajectory {
        out.push_str(&format!(
            "[{}] {}: {}\n",
            entry.entry_type.as_str(),
            entry.agent_name,
            entry.text
        ));
    }
    out
}

pub fn check_prompt(proposition: &Proposition, context: &ScoringContext) -> String {
    format!(
        "{}\n## Claim\n{}\n\nDoes the claim hold for the trajectory above? Answer as \
         {{\"result\": true|false, \"reasoning\": string, \"confidence\": number between 0 and 1}}.",
        render_context(context),
        proposition.claim
    )
}

pub fn score_prompt(proposition: &Proposition, context: &ScoringContext) -> String {
    format!(
        "{}\n## Claim\n{}\n\nRate how strongly the claim holds on a 0-9 scale (9 = fully holds). \
         Answer as {{\"score\": integer 0-9, \"reasoning\": string, \"confidence\": number between 0 and 1}}.",
        render_context(context),
        proposition.claim
    )
}

pub fn batch_score_prompt(propositions: &[Proposition], context: &ScoringContext) -> String {
    let mut claims = String::new();
    for (i, p) in propositions.iter().enumerate() {
        claims.push_str(&format!("{}. {}\n", i + 1, p.claim));
    }
    format!(
        "{}\n## Claims\n{}\nRate how strongly each claim holds on a 0-9 scale (9 = fully holds). \
         Answer as {{\"results\": [{{\"score\": integer 0-9, \"reasoning\": string, \"confidence\": number}}]}} \
         with exactly {} entries in claim order.",
        render_context(context),
        claims,
        propositions.len()
    )
}

pub fn ideas_prompt(transcript: &ScoringContext) -> String {
    format!(
        "{}\nCount the distinct, substantive ideas proposed in this conversation. Merge restatements \
         of the same idea. Answer as {{\"count\": integer, \"ideas\": [{{\"id\": string, \"description\": string}}]}}.",
        render_context(transcript)
    )
}

pub fn rewrite_prompt(candidate: &str, feedback: &str, context: &ScoringContext) -> String {
    format!(
        "{}\n## Draft message\n{}\n\n## Reviewer feedback\n{}\n\nRewrite the draft so it addresses the \
         feedback. Answer as {{\"text\": string}}.",
        render_context(context),
        candidate,
        feedback
    )
}

/// Pull the first JSON object out of a model reply, tolerating code fences
/// and surrounding prose.
pub fn extract_json_object(reply: &str) -> Result<Value> {
    let trimmed = reply.trim();
    if let Ok(v) = serde_json::from_str::<Value>(trimmed) {
        return Ok(v);
    }
    let start = trimmed.find('{');
    let end = trimmed.rfind('}');
    match (start, end) {
        (Some(s), Some(e)) if e > s => serde_json::from_str(&trimmed[s..=e])
            .map_err(|err| EvalError::Judge(format!("unparseable judge reply: {err}"))),
        _ => Err(EvalError::Judge(format!(
            "judge reply contained no JSON object: {}",
            truncate(trimmed, 120)
        ))),
    }
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        let cut: String = text.chars().take(max).collect();
        format!("{cut}…")
    }
}

fn reasoning_of(v: &Value) -> String {
    v.get("reasoning")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn confidence_of(v: &Value) -> f64 {
    v.get("confidence")
        .and_then(Value::as_f64)
        .map(|c| c.clamp(0.0, 1.0))
        .unwrap_or(0.5)
}

/// `(result, reasoning, confidence)` from a check reply.
pub fn parse_check(v: &Value) -> Result<(bool, String, f64)> {
    let result = match v.get("result") {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => matches!(s.to_ascii_lowercase().as_str(), "true" | "yes"),
        _ => return Err(EvalError::Judge("check reply missing boolean `result`".to_string())),
    };
    Ok((result, reasoning_of(v), confidence_of(v)))
}

/// `(score, reasoning, confidence)` from a score reply; the score is clamped to `[0, 9]`.
pub fn parse_score(v: &Value) -> Result<(f64, String, f64)> {
    let score = match v.get("score") {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .ok_or_else(|| EvalError::Judge("score reply missing numeric `score`".to_string()))?;
    Ok((clamp_score(score), reasoning_of(v), confidence_of(v)))
}

/// Parse a batch reply, which must hold exactly `expected` results.
pub fn parse_batch(v: &Value, expected: usize) -> Result<Vec<(f64, String, f64)>> {
    let items = v
        .get("results")
        .and_then(Value::as_array)
        .ok_or_else(|| EvalError::Judge("batch reply missing `results` array".to_string()))?;
    if items.len() != expected {
        return Err(EvalError::Judge(format!(
            "batch reply has {} results, expected {}",
            items.len(),
            expected
        )));
    }
    items.iter().map(parse_score).collect()
}

pub fn parse_rewrite(v: &Value) -> Result<String> {
    v.get("text")
        .and_then(Value::as_str)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| EvalError::Judge("rewrite reply missing `text`".to_string()))
}
