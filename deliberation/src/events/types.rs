//! Progress event types published by the orchestration engine.
//!
//! Events are append-only and delivered at-least-once. Ordering is
//! guaranteed only within a single sub-problem's stream; consumers route
//! by `sub_problem_index`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// All deliberation progress events.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DeliberationEvent {
    /// A deliberation session started.
    SessionStarted {
        session_id: String,
        total_sub_problems: usize,
        timestamp: DateTime<Utc>,
    },

    /// A panel was selected for a sub-problem phase.
    PersonaSelected {
        sub_problem_index: usize,
        sub_problem_id: String,
        persona_codes: Vec<String>,
        phase: String,
        timestamp: DateTime<Utc>,
    },

    /// A debate round started.
    RoundStarted {
        sub_problem_index: usize,
        sub_problem_id: String,
        round: u32,
        panel_size: usize,
        timestamp: DateTime<Utc>,
    },

    /// A debate round collected all contributions.
    RoundComplete {
        sub_problem_index: usize,
        sub_problem_id: String,
        round: u32,
        contributions: usize,
        timestamp: DateTime<Utc>,
    },

    /// Voting began for a sub-problem.
    VotingStarted {
        sub_problem_index: usize,
        sub_problem_id: String,
        timestamp: DateTime<Utc>,
    },

    /// All votes were collected.
    VotingComplete {
        sub_problem_index: usize,
        sub_problem_id: String,
        votes: usize,
        timestamp: DateTime<Utc>,
    },

    /// Synthesis of a sub-problem's debate began.
    SynthesisStarted {
        sub_problem_index: usize,
        sub_problem_id: String,
        timestamp: DateTime<Utc>,
    },

    /// Synthesis completed.
    SynthesisComplete {
        sub_problem_index: usize,
        sub_problem_id: String,
        timestamp: DateTime<Utc>,
    },

    /// A sub-problem terminally failed; siblings are unaffected.
    SubProblemFailed {
        sub_problem_index: usize,
        sub_problem_id: String,
        reason: String,
        timestamp: DateTime<Utc>,
    },

    /// A sub-problem produced its result.
    SubProblemComplete {
        sub_problem_index: usize,
        sub_problem_id: String,
        rounds: u32,
        timestamp: DateTime<Utc>,
    },

    /// The session finished; `partial` is true when any sub-problem failed.
    SessionComplete {
        session_id: String,
        completed: usize,
        failed: usize,
        partial: bool,
        timestamp: DateTime<Utc>,
    },
}

impl DeliberationEvent {
    /// Event type as a wire-stable string.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::SessionStarted { .. } => "session_started",
            Self::PersonaSelected { .. } => "persona_selected",
            Self::RoundStarted { .. } => "round_started",
            Self::RoundComplete { .. } => "round_complete",
            Self::VotingStarted { .. } => "voting_started",
            Self::VotingComplete { .. } => "voting_complete",
            Self::SynthesisStarted { .. } => "synthesis_started",
            Self::SynthesisComplete { .. } => "synthesis_complete",
            Self::SubProblemFailed { .. } => "subproblem_failed",
            Self::SubProblemComplete { .. } => "subproblem_complete",
            Self::SessionComplete { .. } => "session_complete",
        }
    }

    /// The sub-problem index, for sub-problem-scoped events.
    pub fn sub_problem_index(&self) -> Option<usize> {
        match self {
            Self::PersonaSelected {
                sub_problem_index, ..
            }
            | Self::RoundStarted {
                sub_problem_index, ..
            }
            | Self::RoundComplete {
                sub_problem_index, ..
            }
            | Self::VotingStarted {
                sub_problem_index, ..
            }
            | Self::VotingComplete {
                sub_problem_index, ..
            }
            | Self::SynthesisStarted {
                sub_problem_index, ..
            }
            | Self::SynthesisComplete {
                sub_problem_index, ..
            }
            | Self::SubProblemFailed {
                sub_problem_index, ..
            }
            | Self::SubProblemComplete {
                sub_problem_index, ..
            } => Some(*sub_problem_index),
            Self::SessionStarted { .. } | Self::SessionComplete { .. } => None,
        }
    }

    /// When the event was emitted.
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::SessionStarted { timestamp, .. }
            | Self::PersonaSelected { timestamp, .. }
            | Self::RoundStarted { timestamp, .. }
            | Self::RoundComplete { timestamp, .. }
            | Self::VotingStarted { timestamp, .. }
            | Self::VotingComplete { timestamp, .. }
            | Self::SynthesisStarted { timestamp, .. }
            | Self::SynthesisComplete { timestamp, .. }
            | Self::SubProblemFailed { timestamp, .. }
            | Self::SubProblemComplete { timestamp, .. }
            | Self::SessionComplete { timestamp, .. } => *timestamp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serialization() {
        let event = DeliberationEvent::RoundStarted {
            sub_problem_index: 2,
            sub_problem_id: "sp-3".into(),
            round: 1,
            panel_size: 4,
            timestamp: Utc::now(),
        };

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"round_started\""));

        let parsed: DeliberationEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.event_type(), "round_started");
        assert_eq!(parsed.sub_problem_index(), Some(2));
    }

    #[test]
    fn test_session_events_have_no_index() {
        let event = DeliberationEvent::SessionStarted {
            session_id: "s-1".into(),
            total_sub_problems: 3,
            timestamp: Utc::now(),
        };
        assert_eq!(event.sub_problem_index(), None);
        assert_eq!(event.event_type(), "session_started");
    }

    #[test]
    fn test_failed_event_carries_reason() {
        let event = DeliberationEvent::SubProblemFailed {
            sub_problem_index: 0,
            sub_problem_id: "sp-1".into(),
            reason: "retries exhausted after 3 attempts".into(),
            timestamp: Utc::now(),
        };
        assert_eq!(event.event_type(), "subproblem_failed");
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("retries exhausted"));
    }
}
