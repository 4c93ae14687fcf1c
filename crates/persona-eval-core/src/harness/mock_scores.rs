//! Deterministic judge answers for offline harness runs.
//!
//! A shared default table keyed by proposition id, with small per-character
//! adjustments layered on top. Raw scores for inverted propositions are low
//! so that their final scores land in the same 6–8 band as the rest.

use std::collections::HashMap;

use crate::judge::{MockJudgeClient, MockResponse};

/// Fixed 16-member roster `--agents all` expands to.
pub const ROSTER: [&str; 16] = [
    "michael", "dwight", "jim", "pam", "ryan", "andy", "angela", "kevin", "oscar", "stanley",
    "phyllis", "meredith", "creed", "kelly", "toby", "darryl",
];

/// Ideas counted per agent in mock mode.
pub const MOCK_IDEAS_COUNT: u64 = 3;

const DEFAULT_SCORES: &[(&str, f64)] = &[
    ("adh-voice", 7.0),
    ("adh-values", 7.0),
    ("adh-knowledge", 7.5),
    ("adh-break", 2.0),
    ("con-stance", 7.5),
    ("con-facts", 7.0),
    ("con-flipflop", 1.5),
    ("flu-natural", 7.0),
    ("flu-repetition", 2.0),
    ("flu-concise", 6.5),
    ("cnv-distinct", 7.0),
    ("cnv-echo", 2.5),
    ("cnv-disagreement", 6.5),
];

const CHARACTER_SCORES: &[(&str, &[(&str, f64)])] = &[
    ("michael", &[("adh-voice", 8.0), ("flu-concise", 5.5), ("adh-michael-bits", 7.5)]),
    ("dwight", &[("adh-voice", 8.0), ("adh-break", 1.0), ("adh-dwight-authority", 8.0)]),
    ("jim", &[("flu-natural", 8.0), ("adh-break", 1.5)]),
    ("pam", &[("adh-values", 7.5), ("con-stance", 7.0)]),
    ("ryan", &[("con-flipflop", 3.0), ("adh-values", 6.0)]),
    ("andy", &[("flu-repetition", 3.0), ("adh-voice", 7.5)]),
    ("angela", &[("adh-values", 8.0), ("con-stance", 8.0)]),
    ("kevin", &[("flu-natural", 6.0), ("flu-concise", 7.5)]),
    ("oscar", &[("adh-knowledge", 8.0), ("con-facts", 8.0)]),
    ("stanley", &[("flu-concise", 8.0), ("adh-voice", 6.5)]),
    ("phyllis", &[("adh-values", 7.5)]),
    ("meredith", &[("adh-break", 2.5), ("flu-natural", 6.5)]),
    ("creed", &[("con-facts", 6.0), ("con-flipflop", 2.5)]),
    ("kelly", &[("flu-concise", 6.0), ("flu-repetition", 2.5)]),
    ("toby", &[("adh-voice", 6.5), ("con-stance", 7.0)]),
    ("darryl", &[("flu-natural", 7.5), ("adh-knowledge", 7.0)]),
];

pub fn is_known_character(agent_id: &str) -> bool {
    ROSTER.contains(&agent_id)
}

/// Score table for one character: the default map with its overrides merged in.
pub fn scores_for(agent_id: &str) -> HashMap<String, MockResponse> {
    let mut table: HashMap<String, MockResponse> = DEFAULT_SCORES
        .iter()
        .map(|(id, score)| {
            (
                id.to_string(),
                MockResponse::new(*score, format!("Mock score for {id}.")),
            )
        })
        .collect();
    if let Some((_, overrides)) = CHARACTER_SCORES.iter().find(|(name, _)| *name == agent_id) {
        for (id, score) in overrides.iter() {
            table.insert(
                id.to_string(),
                MockResponse::new(*score, format!("Mock score for {id} as {agent_id}.")),
            );
        }
    }
    table
}

/// Mock judge answering with `agent_id`'s table.
pub fn mock_judge_for(agent_id: &str) -> MockJudgeClient {
    MockJudgeClient::with_responses(scores_for(agent_id)).with_ideas(serde_json::json!({
        "count": MOCK_IDEAS_COUNT,
        "ideas": [],
    }))
}

/// `dwight` → `Dwight`.
pub fn display_name(agent_id: &str) -> String {
    let mut chars = agent_id.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roster_has_sixteen_unique_members() {
        let mut sorted = ROSTER.to_vec();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(sorted.len(), 16);
        assert!(CHARACTER_SCORES
            .iter()
            .all(|(name, _)| is_known_character(name)));
    }

    #[test]
    fn overrides_layer_on_defaults() {
        let dwight = scores_for("dwight");
        assert_eq!(dwight["adh-voice"].score, 8.0);
        assert_eq!(dwight["adh-values"].score, 7.0);
        let unknown = scores_for("nobody");
        assert_eq!(unknown.len(), DEFAULT_SCORES.len());
    }

    #[test]
    fn every_raw_score_is_in_range() {
        for (_, s) in DEFAULT_SCORES {
            assert!((0.0..=9.0).contains(s));
        }
        for (_, overrides) in CHARACTER_SCORES {
            for (_, s) in overrides.iter() {
                assert!((0.0..=9.0).contains(s));
            }
        }
    }

    #[test]
    fn capitalises() {
        assert_eq!(display_name("dwight"), "Dwight");
        assert_eq!(display_name(""), "");
    }
}
