//! Convergence detection — decides continue/stop after each debate round.
//!
//! The composite formula is a policy object, not a hard-coded rule: three
//! weighted sub-scores (agreement, remaining exploration, remaining
//! novelty — the latter two inverted, since low remaining exploration
//! means the debate has settled) against a configurable stop threshold.
//!
//! When the composite crosses the threshold in the same round the cap is
//! reached, convergence takes precedence: the result carries the stronger
//! signal. The round cap only applies when the detector votes to continue.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::providers::{JudgmentClient, PromptContext, RawConvergence};

/// Configurable composite weights and stop threshold.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConvergencePolicy {
    pub agreement_weight: f64,
    pub exploration_weight: f64,
    pub novelty_weight: f64,
    /// Composite value at or above which the debate stops.
    pub stop_threshold: f64,
}

impl Default for ConvergencePolicy {
    fn default() -> Self {
        Self {
            agreement_weight: 0.5,
            exploration_weight: 0.3,
            novelty_weight: 0.2,
            stop_threshold: 0.75,
        }
    }
}

impl ConvergencePolicy {
    /// Derive a per-round score from raw provider output.
    ///
    /// Missing sub-scores default to a neutral 0.5; out-of-range values
    /// are clamped.
    pub fn score(&self, sub_problem_id: &str, round: u32, raw: &RawConvergence) -> ConvergenceScore {
        let clamp = |v: Option<f64>| {
            v.filter(|x| x.is_finite())
                .map(|x| x.clamp(0.0, 1.0))
                .unwrap_or(0.5)
        };
        let agreement = clamp(raw.agreement);
        let exploration = clamp(raw.exploration);
        let novelty = clamp(raw.novelty);

        let weight_sum = self.agreement_weight + self.exploration_weight + self.novelty_weight;
        let composite = if weight_sum > 0.0 {
            (self.agreement_weight * agreement
                + self.exploration_weight * (1.0 - exploration)
                + self.novelty_weight * (1.0 - novelty))
                / weight_sum
        } else {
            0.0
        };

        ConvergenceScore {
            sub_problem_id: sub_problem_id.to_string(),
            round,
            agreement,
            exploration,
            novelty,
            composite,
        }
    }
}

/// Per-round convergence score. Derived, not persisted beyond the run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConvergenceScore {
    pub sub_problem_id: String,
    pub round: u32,
    pub agreement: f64,
    /// How much of the solution space still looks unexplored.
    pub exploration: f64,
    /// How much genuinely new material the round introduced.
    pub novelty: f64,
    /// Weighted composite in [0.0, 1.0].
    pub composite: f64,
}

/// Decision after scoring a round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoundDecision {
    /// Debate another round.
    Continue,
    /// Composite crossed the stop threshold.
    Converged,
    /// Round cap reached without convergence.
    MaxRoundsReached,
}

impl std::fmt::Display for RoundDecision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Continue => write!(f, "continue"),
            Self::Converged => write!(f, "converged"),
            Self::MaxRoundsReached => write!(f, "max_rounds_reached"),
        }
    }
}

/// Scores debate state after each round and decides continue/stop.
pub struct ConvergenceDetector {
    client: Arc<dyn JudgmentClient>,
    policy: ConvergencePolicy,
}

impl ConvergenceDetector {
    pub fn new(client: Arc<dyn JudgmentClient>, policy: ConvergencePolicy) -> Self {
        Self { client, policy }
    }

    /// Evaluate the current round.
    ///
    /// A failed judgment call is not fatal: with no signal the debate
    /// continues until the round cap.
    pub async fn evaluate(
        &self,
        ctx: &PromptContext,
        max_rounds: u32,
    ) -> (Option<ConvergenceScore>, RoundDecision) {
        match self.client.score_convergence(ctx).await {
            Ok(raw) => {
                let score = self.policy.score(&ctx.sub_problem_id, ctx.round, &raw);
                debug!(
                    sub_problem = %ctx.sub_problem_id,
                    round = ctx.round,
                    composite = score.composite,
                    "convergence scored"
                );
                // Convergence takes precedence over the round cap.
                let decision = if score.composite >= self.policy.stop_threshold {
                    RoundDecision::Converged
                } else if ctx.round >= max_rounds {
                    RoundDecision::MaxRoundsReached
                } else {
                    RoundDecision::Continue
                };
                (Some(score), decision)
            }
            Err(e) => {
                warn!(
                    sub_problem = %ctx.sub_problem_id,
                    round = ctx.round,
                    error = %e,
                    "convergence judgment failed, continuing without signal"
                );
                let decision = if ctx.round >= max_rounds {
                    RoundDecision::MaxRoundsReached
                } else {
                    RoundDecision::Continue
                };
                (None, decision)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderError;
    use crate::persona::DeliberationPhase;
    use crate::problem::{Problem, SubProblem};
    use crate::providers::RawComplexity;
    use async_trait::async_trait;

    struct FixedConvergence {
        raw: Option<RawConvergence>,
    }

    #[async_trait]
    impl JudgmentClient for FixedConvergence {
        async fn assess_complexity(
            &self,
            _problem: &Problem,
            _subs: &[SubProblem],
        ) -> Result<RawComplexity, ProviderError> {
            Ok(RawComplexity::default())
        }

        async fn score_convergence(
            &self,
            _ctx: &PromptContext,
        ) -> Result<RawConvergence, ProviderError> {
            self.raw
                .clone()
                .ok_or_else(|| ProviderError::Timeout("judge down".into()))
        }
    }

    fn ctx(round: u32) -> PromptContext {
        PromptContext {
            sub_problem_id: "sp-1".into(),
            goal: "goal".into(),
            round,
            phase: DeliberationPhase::Challenge,
            transcript: vec![],
            dependency_context: vec![],
        }
    }

    fn raw(agreement: f64, exploration: f64, novelty: f64) -> RawConvergence {
        RawConvergence {
            agreement: Some(agreement),
            exploration: Some(exploration),
            novelty: Some(novelty),
        }
    }

    #[test]
    fn test_composite_formula() {
        let policy = ConvergencePolicy::default();
        // Full agreement, nothing left to explore, nothing new.
        let score = policy.score("sp-1", 2, &raw(1.0, 0.0, 0.0));
        assert!((score.composite - 1.0).abs() < 1e-9);

        // No agreement, everything unexplored and novel.
        let score = policy.score("sp-1", 2, &raw(0.0, 1.0, 1.0));
        assert!(score.composite.abs() < 1e-9);
    }

    #[test]
    fn test_missing_subscores_neutral() {
        let policy = ConvergencePolicy::default();
        let score = policy.score("sp-1", 2, &RawConvergence::default());
        assert_eq!(score.agreement, 0.5);
        assert_eq!(score.exploration, 0.5);
        assert_eq!(score.novelty, 0.5);
        assert!((score.composite - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_out_of_range_clamped() {
        let policy = ConvergencePolicy::default();
        let score = policy.score("sp-1", 2, &raw(2.0, -1.0, 0.5));
        assert_eq!(score.agreement, 1.0);
        assert_eq!(score.exploration, 0.0);
        assert!((0.0..=1.0).contains(&score.composite));
    }

    #[tokio::test]
    async fn test_converged_decision() {
        let detector = ConvergenceDetector::new(
            Arc::new(FixedConvergence {
                raw: Some(raw(0.95, 0.1, 0.1)),
            }),
            ConvergencePolicy::default(),
        );
        let (score, decision) = detector.evaluate(&ctx(2), 5).await;
        assert!(score.is_some());
        assert_eq!(decision, RoundDecision::Converged);
    }

    #[tokio::test]
    async fn test_continue_decision() {
        let detector = ConvergenceDetector::new(
            Arc::new(FixedConvergence {
                raw: Some(raw(0.2, 0.9, 0.9)),
            }),
            ConvergencePolicy::default(),
        );
        let (_, decision) = detector.evaluate(&ctx(2), 5).await;
        assert_eq!(decision, RoundDecision::Continue);
    }

    #[tokio::test]
    async fn test_max_rounds_decision() {
        let detector = ConvergenceDetector::new(
            Arc::new(FixedConvergence {
                raw: Some(raw(0.2, 0.9, 0.9)),
            }),
            ConvergencePolicy::default(),
        );
        let (_, decision) = detector.evaluate(&ctx(5), 5).await;
        assert_eq!(decision, RoundDecision::MaxRoundsReached);
    }

    #[tokio::test]
    async fn test_convergence_beats_round_cap() {
        // Both conditions true in the same round: convergence wins.
        let detector = ConvergenceDetector::new(
            Arc::new(FixedConvergence {
                raw: Some(raw(1.0, 0.0, 0.0)),
            }),
            ConvergencePolicy::default(),
        );
        let (_, decision) = detector.evaluate(&ctx(5), 5).await;
        assert_eq!(decision, RoundDecision::Converged);
    }

    #[tokio::test]
    async fn test_judgment_failure_continues() {
        let detector = ConvergenceDetector::new(
            Arc::new(FixedConvergence { raw: None }),
            ConvergencePolicy::default(),
        );
        let (score, decision) = detector.evaluate(&ctx(2), 5).await;
        assert!(score.is_none());
        assert_eq!(decision, RoundDecision::Continue);

        let (_, decision) = detector.evaluate(&ctx(5), 5).await;
        assert_eq!(decision, RoundDecision::MaxRoundsReached);
    }

    #[test]
    fn test_decision_display() {
        assert_eq!(RoundDecision::Continue.to_string(), "continue");
        assert_eq!(RoundDecision::Converged.to_string(), "converged");
        assert_eq!(
            RoundDecision::MaxRoundsReached.to_string(),
            "max_rounds_reached"
        );
    }
}
