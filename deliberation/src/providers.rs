//! Collaborator contracts for the external providers this engine calls.
//!
//! Two traits: a persona-response provider (contributions, votes,
//! synthesis) and a judgment-call provider (complexity and convergence
//! scoring). Both may fail transiently or permanently per the
//! `ProviderError` taxonomy.
//!
//! Judgment results come back as raw, optional-field structs: clamping and
//! fallback happen at the call boundary inside this crate, so any scoring
//! implementation (rule-based, model-based) satisfies the same contract.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ProviderError;
use crate::persona::{DeliberationPhase, PersonaProfile};
use crate::problem::{Problem, SubProblem};
use crate::round::Contribution;

/// Context handed to a persona for a contribution or vote.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptContext {
    pub sub_problem_id: String,
    pub goal: String,
    pub round: u32,
    pub phase: DeliberationPhase,
    /// Transcript so far, all rounds.
    pub transcript: Vec<Contribution>,
    /// Result summaries from dependency sub-problems available at start.
    pub dependency_context: Vec<String>,
}

/// A persona's terminal recommendation for a sub-problem.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vote {
    pub persona_code: String,
    pub recommendation: String,
    pub confidence: f64,
}

/// Condensed output of a deliberation (per sub-problem or meta).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Synthesis {
    pub recommendation: String,
    pub key_insights: Vec<String>,
}

/// Context for a synthesis call.
///
/// `sub_problem_id` is `None` for the meta-synthesis across all
/// sub-problem results; `missing` then names the sub-problems that failed
/// and must be acknowledged as gaps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthesisContext {
    pub sub_problem_id: Option<String>,
    pub goal: String,
    pub transcript: Vec<Contribution>,
    pub votes: Vec<Vote>,
    pub prior_results: Vec<crate::deliberator::SubProblemResult>,
    pub missing: Vec<String>,
}

/// Raw complexity dimensions from the judgment provider.
///
/// Fields are optional on purpose: the scorer treats missing values as a
/// contract miss and falls back rather than guessing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawComplexity {
    pub scope_breadth: Option<f64>,
    pub dependencies: Option<f64>,
    pub ambiguity: Option<f64>,
    pub stakeholders: Option<f64>,
    pub novelty: Option<f64>,
}

/// Raw convergence sub-scores from the judgment provider.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawConvergence {
    pub agreement: Option<f64>,
    pub exploration: Option<f64>,
    pub novelty: Option<f64>,
}

/// Persona-response provider.
#[async_trait]
pub trait PersonaClient: Send + Sync {
    /// One contribution from one persona for the current round.
    async fn contribute(
        &self,
        persona: &PersonaProfile,
        ctx: &PromptContext,
    ) -> Result<String, ProviderError>;

    /// The persona's terminal vote.
    async fn vote(
        &self,
        persona: &PersonaProfile,
        ctx: &PromptContext,
    ) -> Result<Vote, ProviderError>;

    /// Condense a transcript (and votes, or prior results) into a synthesis.
    async fn synthesize(&self, ctx: &SynthesisContext) -> Result<Synthesis, ProviderError>;
}

/// Judgment-call provider for complexity and convergence scoring.
#[async_trait]
pub trait JudgmentClient: Send + Sync {
    async fn assess_complexity(
        &self,
        problem: &Problem,
        subs: &[SubProblem],
    ) -> Result<RawComplexity, ProviderError>;

    async fn score_convergence(
        &self,
        ctx: &PromptContext,
    ) -> Result<RawConvergence, ProviderError>;
}
