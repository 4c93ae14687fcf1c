//! Trajectories: the evidence window handed to the judge.

use serde::{Deserialize, Serialize};

/// Whether an entry is context the agent reacted to, or the agent's own output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryType {
    Stimulus,
    Action,
}

impl EntryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryType::Stimulus => "stimulus",
            EntryType::Action => "action",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrajectoryEntry {
    #[serde(rename = "type")]
    pub entry_type: EntryType,
    pub agent_name: String,
    pub text: String,
}

impl TrajectoryEntry {
    pub fn stimulus(agent_name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            entry_type: EntryType::Stimulus,
            agent_name: agent_name.into(),
            text: text.into(),
        }
    }

    pub fn action(agent_name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            entry_type: EntryType::Action,
            agent_name: agent_name.into(),
            text: text.into(),
        }
    }
}

/// Everything one judge call sees.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoringContext {
    pub trajectory: Vec<TrajectoryEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persona: Option<String>,
}

impl ScoringContext {
    pub fn new(trajectory: Vec<TrajectoryEntry>) -> Self {
        Self {
            trajectory,
            persona: None,
        }
    }

    pub fn with_persona(mut self, persona: impl Into<String>) -> Self {
        self.persona = Some(persona.into());
        self
    }

    /// Restrict the trajectory to its first `first_n` and/or last `last_n`
    /// entries. When both are given the kept ranges are unioned in order.
    pub fn windowed(mut self, first_n: Option<usize>, last_n: Option<usize>) -> Self {
        let len = self.trajectory.len();
        let keep: Vec<bool> = (0..len)
            .map(|i| match (first_n, last_n) {
                (None, None) => true,
                (Some(f), None) => i < f,
                (None, Some(l)) => i + l >= len,
                (Some(f), Some(l)) => i < f || i + l >= len,
            })
            .collect();
        let mut idx = 0;
        self.trajectory.retain(|_| {
            let k = keep[idx];
            idx += 1;
            k
        });
        self
    }
}
