//! Complexity assessment — weighted dimension scoring with clamping and a
//! moderate-complexity fallback.
//!
//! The judgment provider rates a problem along five dimensions; fixed
//! weights combine them into an overall score which maps to adaptive
//! round and expert-count targets through fixed breakpoints. A failed or
//! incomplete judgment call never aborts the session: it falls back to the
//! moderate default and records that the fallback occurred.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::problem::{Problem, SubProblem};
use crate::providers::{JudgmentClient, RawComplexity};

/// Fixed dimension weights (must sum to 1.0).
pub const WEIGHT_SCOPE_BREADTH: f64 = 0.25;
pub const WEIGHT_DEPENDENCIES: f64 = 0.25;
pub const WEIGHT_AMBIGUITY: f64 = 0.20;
pub const WEIGHT_STAKEHOLDERS: f64 = 0.15;
pub const WEIGHT_NOVELTY: f64 = 0.15;

/// Five dimension scores, each in [0.0, 1.0].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DimensionScores {
    pub scope_breadth: f64,
    pub dependencies: f64,
    pub ambiguity: f64,
    pub stakeholders: f64,
    pub novelty: f64,
}

impl DimensionScores {
    /// Clamp every dimension into [0.0, 1.0].
    pub fn clamped(self) -> Self {
        Self {
            scope_breadth: self.scope_breadth.clamp(0.0, 1.0),
            dependencies: self.dependencies.clamp(0.0, 1.0),
            ambiguity: self.ambiguity.clamp(0.0, 1.0),
            stakeholders: self.stakeholders.clamp(0.0, 1.0),
            novelty: self.novelty.clamp(0.0, 1.0),
        }
    }

    /// Weighted overall complexity.
    pub fn weighted_overall(&self) -> f64 {
        WEIGHT_SCOPE_BREADTH * self.scope_breadth
            + WEIGHT_DEPENDENCIES * self.dependencies
            + WEIGHT_AMBIGUITY * self.ambiguity
            + WEIGHT_STAKEHOLDERS * self.stakeholders
            + WEIGHT_NOVELTY * self.novelty
    }

    /// Build from the raw provider struct; `None` if any dimension is
    /// missing or non-finite (the caller then falls back wholesale).
    pub fn try_from_raw(raw: &RawComplexity) -> Option<Self> {
        let pick = |v: Option<f64>| v.filter(|x| x.is_finite());
        Some(
            Self {
                scope_breadth: pick(raw.scope_breadth)?,
                dependencies: pick(raw.dependencies)?,
                ambiguity: pick(raw.ambiguity)?,
                stakeholders: pick(raw.stakeholders)?,
                novelty: pick(raw.novelty)?,
            }
            .clamped(),
        )
    }
}

/// Complexity assessment with derived deliberation targets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComplexityAssessment {
    pub dimensions: DimensionScores,
    /// Weighted overall complexity in [0.0, 1.0].
    pub overall_complexity: f64,
    /// Adaptive round target in [3, 6].
    pub recommended_rounds: u32,
    /// Adaptive panel size target in [3, 5].
    pub recommended_experts: u32,
    /// Whether the moderate-complexity fallback was applied.
    pub fallback_applied: bool,
}

impl ComplexityAssessment {
    /// Derive an assessment from clamped dimension scores.
    pub fn from_dimensions(dimensions: DimensionScores) -> Self {
        let dimensions = dimensions.clamped();
        let overall = dimensions.weighted_overall().clamp(0.0, 1.0);
        Self {
            dimensions,
            overall_complexity: overall,
            recommended_rounds: recommended_rounds(overall),
            recommended_experts: recommended_experts(overall),
            fallback_applied: false,
        }
    }

    /// The fixed moderate-complexity default used when judgment fails.
    pub fn moderate_fallback() -> Self {
        let dimensions = DimensionScores {
            scope_breadth: 0.38,
            dependencies: 0.38,
            ambiguity: 0.38,
            stakeholders: 0.38,
            novelty: 0.38,
        };
        Self {
            dimensions,
            overall_complexity: 0.38,
            recommended_rounds: 4,
            recommended_experts: 4,
            fallback_applied: true,
        }
    }
}

/// Breakpoints: <0.3 → 3, 0.3–0.5 → 4, 0.5–0.7 → 5, ≥0.7 → 6.
fn recommended_rounds(overall: f64) -> u32 {
    if overall < 0.3 {
        3
    } else if overall < 0.5 {
        4
    } else if overall < 0.7 {
        5
    } else {
        6
    }
}

/// Breakpoints: <0.3 → 3, 0.3–0.7 → 4, ≥0.7 → 5.
fn recommended_experts(overall: f64) -> u32 {
    if overall < 0.3 {
        3
    } else if overall < 0.7 {
        4
    } else {
        5
    }
}

/// Rates a problem via the pluggable judgment provider.
pub struct ComplexityScorer {
    client: Arc<dyn JudgmentClient>,
}

impl ComplexityScorer {
    pub fn new(client: Arc<dyn JudgmentClient>) -> Self {
        Self { client }
    }

    /// Assess a problem. Infallible by contract: provider failures and
    /// incomplete scores degrade to the moderate fallback.
    pub async fn assess(&self, problem: &Problem, subs: &[SubProblem]) -> ComplexityAssessment {
        match self.client.assess_complexity(problem, subs).await {
            Ok(raw) => match DimensionScores::try_from_raw(&raw) {
                Some(dimensions) => ComplexityAssessment::from_dimensions(dimensions),
                None => {
                    warn!("judgment returned incomplete dimensions, using moderate fallback");
                    ComplexityAssessment::moderate_fallback()
                }
            },
            Err(e) => {
                warn!(error = %e, "complexity judgment failed, using moderate fallback");
                ComplexityAssessment::moderate_fallback()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderError;
    use crate::providers::{PromptContext, RawConvergence};
    use async_trait::async_trait;

    struct FixedJudgment {
        raw: Option<RawComplexity>,
    }

    #[async_trait]
    impl JudgmentClient for FixedJudgment {
        async fn assess_complexity(
            &self,
            _problem: &Problem,
            _subs: &[SubProblem],
        ) -> Result<RawComplexity, ProviderError> {
            self.raw
                .clone()
                .ok_or_else(|| ProviderError::Timeout("judge down".into()))
        }

        async fn score_convergence(
            &self,
            _ctx: &PromptContext,
        ) -> Result<RawConvergence, ProviderError> {
            Ok(RawConvergence::default())
        }
    }

    fn raw(scores: [f64; 5]) -> RawComplexity {
        RawComplexity {
            scope_breadth: Some(scores[0]),
            dependencies: Some(scores[1]),
            ambiguity: Some(scores[2]),
            stakeholders: Some(scores[3]),
            novelty: Some(scores[4]),
        }
    }

    #[test]
    fn test_weights_sum_to_one() {
        let sum = WEIGHT_SCOPE_BREADTH
            + WEIGHT_DEPENDENCIES
            + WEIGHT_AMBIGUITY
            + WEIGHT_STAKEHOLDERS
            + WEIGHT_NOVELTY;
        assert!((sum - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_low_complexity_example() {
        // Worked example: single-domain, low-ambiguity problem.
        let dims = DimensionScores {
            scope_breadth: 0.1,
            dependencies: 0.2,
            ambiguity: 0.2,
            stakeholders: 0.1,
            novelty: 0.2,
        };
        let assessment = ComplexityAssessment::from_dimensions(dims);
        assert!((assessment.overall_complexity - 0.16).abs() < 1e-9);
        assert_eq!(assessment.recommended_rounds, 3);
        assert_eq!(assessment.recommended_experts, 3);
        assert!(!assessment.fallback_applied);
    }

    #[test]
    fn test_breakpoints() {
        for (overall, rounds, experts) in [
            (0.0, 3, 3),
            (0.29, 3, 3),
            (0.3, 4, 4),
            (0.49, 4, 4),
            (0.5, 5, 4),
            (0.69, 5, 4),
            (0.7, 6, 5),
            (1.0, 6, 5),
        ] {
            assert_eq!(recommended_rounds(overall), rounds, "overall={overall}");
            assert_eq!(recommended_experts(overall), experts, "overall={overall}");
        }
    }

    #[test]
    fn test_out_of_range_dimensions_clamped() {
        let dims = DimensionScores {
            scope_breadth: 1.8,
            dependencies: -0.4,
            ambiguity: 0.5,
            stakeholders: 0.5,
            novelty: 0.5,
        };
        let assessment = ComplexityAssessment::from_dimensions(dims);
        assert_eq!(assessment.dimensions.scope_breadth, 1.0);
        assert_eq!(assessment.dimensions.dependencies, 0.0);
        assert!((0.0..=1.0).contains(&assessment.overall_complexity));
        assert!((3..=6).contains(&assessment.recommended_rounds));
        assert!((3..=5).contains(&assessment.recommended_experts));
    }

    #[test]
    fn test_moderate_fallback_values() {
        let fb = ComplexityAssessment::moderate_fallback();
        assert!((fb.overall_complexity - 0.38).abs() < f64::EPSILON);
        assert_eq!(fb.recommended_rounds, 4);
        assert_eq!(fb.recommended_experts, 4);
        assert!(fb.fallback_applied);
    }

    #[tokio::test]
    async fn test_scorer_happy_path() {
        let scorer = ComplexityScorer::new(Arc::new(FixedJudgment {
            raw: Some(raw([0.8, 0.9, 0.7, 0.8, 0.9])),
        }));
        let assessment = scorer
            .assess(&Problem::new("hard", "ctx"), &[])
            .await;
        assert!(assessment.overall_complexity >= 0.7);
        assert_eq!(assessment.recommended_rounds, 6);
        assert_eq!(assessment.recommended_experts, 5);
        assert!(!assessment.fallback_applied);
    }

    #[tokio::test]
    async fn test_scorer_falls_back_on_provider_failure() {
        let scorer = ComplexityScorer::new(Arc::new(FixedJudgment { raw: None }));
        let assessment = scorer.assess(&Problem::new("p", "c"), &[]).await;
        assert!(assessment.fallback_applied);
        assert_eq!(assessment.recommended_rounds, 4);
    }

    #[tokio::test]
    async fn test_scorer_falls_back_on_missing_dimension() {
        let mut incomplete = raw([0.5; 5]);
        incomplete.novelty = None;
        let scorer = ComplexityScorer::new(Arc::new(FixedJudgment {
            raw: Some(incomplete),
        }));
        let assessment = scorer.assess(&Problem::new("p", "c"), &[]).await;
        assert!(assessment.fallback_applied);
    }

    #[tokio::test]
    async fn test_scorer_falls_back_on_nan() {
        let mut bad = raw([0.5; 5]);
        bad.ambiguity = Some(f64::NAN);
        let scorer = ComplexityScorer::new(Arc::new(FixedJudgment { raw: Some(bad) }));
        let assessment = scorer.assess(&Problem::new("p", "c"), &[]).await;
        assert!(assessment.fallback_applied);
    }
}
