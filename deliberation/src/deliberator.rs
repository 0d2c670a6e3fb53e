//! Per-sub-problem deliberation state machine.
//!
//! One deliberator owns one sub-problem's full lifecycle: panel
//! selection, the initial round, iterative debate, convergence, voting,
//! and synthesis. Phase transitions follow a fixed table and are recorded
//! with reasons; any provider failure or timeout moves the machine to
//! `Failed` without touching sibling sub-problems.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::complexity::ComplexityAssessment;
use crate::convergence::{ConvergenceDetector, RoundDecision};
use crate::error::ProviderError;
use crate::events::EventBridge;
use crate::persona::{DeliberationPhase, PanelSelector, PersonaProfile};
use crate::problem::SubProblem;
use crate::providers::{PromptContext, SynthesisContext, Vote};
use crate::round::{Contribution, RoundRunner};
use crate::speculation::ProgressTracker;

/// Default wall-clock budget for one sub-problem's deliberation.
pub const DEFAULT_SUB_PROBLEM_TIMEOUT_SECS: u64 = 300;

/// Lifecycle phase of a sub-problem deliberation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SubProblemPhase {
    SelectingPanel,
    InitialRound,
    Debating,
    Converged,
    Voting,
    Synthesizing,
    Done,
    Failed,
}

impl SubProblemPhase {
    /// Phases reachable from this one.
    pub fn valid_transitions(&self) -> Vec<SubProblemPhase> {
        match self {
            Self::SelectingPanel => vec![Self::InitialRound, Self::Failed],
            Self::InitialRound => vec![Self::Debating, Self::Failed],
            Self::Debating => vec![Self::Debating, Self::Converged, Self::Failed],
            Self::Converged => vec![Self::Voting, Self::Failed],
            Self::Voting => vec![Self::Synthesizing, Self::Failed],
            Self::Synthesizing => vec![Self::Done, Self::Failed],
            Self::Done | Self::Failed => vec![],
        }
    }

    pub fn can_transition_to(&self, next: SubProblemPhase) -> bool {
        self.valid_transitions().contains(&next)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

impl std::fmt::Display for SubProblemPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SelectingPanel => write!(f, "selecting_panel"),
            Self::InitialRound => write!(f, "initial_round"),
            Self::Debating => write!(f, "debating"),
            Self::Converged => write!(f, "converged"),
            Self::Voting => write!(f, "voting"),
            Self::Synthesizing => write!(f, "synthesizing"),
            Self::Done => write!(f, "done"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// One recorded phase transition with its reason.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseTransition {
    pub from: SubProblemPhase,
    pub to: SubProblemPhase,
    pub reason: String,
    pub at: DateTime<Utc>,
}

/// Final output of a successful sub-problem deliberation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubProblemResult {
    pub sub_problem_id: String,
    pub recommendation: String,
    pub key_insights: Vec<String>,
    pub contributions: Vec<Contribution>,
    pub votes: Vec<Vote>,
}

/// Terminal failure of one sub-problem. Siblings are unaffected.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubProblemFailure {
    pub sub_problem_id: String,
    pub phase: SubProblemPhase,
    pub reason: String,
}

/// Barrier a speculatively started deliberation must clear before voting:
/// all named dependencies fully resolved.
pub struct VoteBarrier {
    pub tracker: ProgressTracker,
    pub dependency_ids: Vec<String>,
}

/// Drives one sub-problem from panel selection through synthesis.
pub struct SubProblemDeliberator {
    sub_problem: SubProblem,
    assessment: ComplexityAssessment,
    selector: PanelSelector,
    runner: RoundRunner,
    detector: ConvergenceDetector,
    bridge: EventBridge,
    dependency_context: Vec<String>,
    vote_barrier: Option<VoteBarrier>,
    progress: Option<ProgressTracker>,
    timeout: Duration,
    phase: SubProblemPhase,
    history: Vec<PhaseTransition>,
    rounds_completed: u32,
}

impl SubProblemDeliberator {
    pub fn new(
        sub_problem: SubProblem,
        assessment: ComplexityAssessment,
        selector: PanelSelector,
        runner: RoundRunner,
        detector: ConvergenceDetector,
        bridge: EventBridge,
    ) -> Self {
        Self {
            sub_problem,
            assessment,
            selector,
            runner,
            detector,
            bridge,
            dependency_context: Vec::new(),
            vote_barrier: None,
            progress: None,
            timeout: Duration::from_secs(DEFAULT_SUB_PROBLEM_TIMEOUT_SECS),
            phase: SubProblemPhase::SelectingPanel,
            history: Vec::new(),
            rounds_completed: 0,
        }
    }

    /// Result summaries from already-resolved dependencies.
    pub fn with_dependency_context(mut self, context: Vec<String>) -> Self {
        self.dependency_context = context;
        self
    }

    /// Require dependencies to be fully resolved before voting. Used by
    /// speculative starts.
    pub fn with_vote_barrier(mut self, barrier: VoteBarrier) -> Self {
        self.vote_barrier = Some(barrier);
        self
    }

    /// Report round progress so dependents may start speculatively.
    pub fn with_progress(mut self, tracker: ProgressTracker) -> Self {
        self.progress = Some(tracker);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn phase(&self) -> SubProblemPhase {
        self.phase
    }

    pub fn history(&self) -> &[PhaseTransition] {
        &self.history
    }

    fn transition(&mut self, to: SubProblemPhase, reason: &str) {
        if !self.phase.can_transition_to(to) {
            warn!(
                sub_problem = %self.sub_problem.id,
                from = %self.phase,
                to = %to,
                "invalid phase transition requested"
            );
            return;
        }
        debug!(
            sub_problem = %self.sub_problem.id,
            from = %self.phase,
            to = %to,
            reason,
            "phase transition"
        );
        self.history.push(PhaseTransition {
            from: self.phase,
            to,
            reason: reason.to_string(),
            at: Utc::now(),
        });
        self.phase = to;
    }

    fn prompt_context(
        &self,
        round: u32,
        phase: DeliberationPhase,
        transcript: &[Contribution],
    ) -> PromptContext {
        PromptContext {
            sub_problem_id: self.sub_problem.id.clone(),
            goal: self.sub_problem.goal.clone(),
            round,
            phase,
            transcript: transcript.to_vec(),
            dependency_context: self.dependency_context.clone(),
        }
    }

    /// Run the deliberation to a terminal phase.
    ///
    /// The whole lifecycle runs under one wall-clock timeout; on expiry
    /// the sub-problem fails like any other permanent error.
    pub async fn run(mut self) -> Result<SubProblemResult, SubProblemFailure> {
        let budget = self.timeout;
        match tokio::time::timeout(budget, self.deliberate()).await {
            Ok(Ok(result)) => {
                self.transition(SubProblemPhase::Done, "synthesis complete");
                self.bridge.sub_problem_complete(self.rounds_completed);
                if let Some(tracker) = &self.progress {
                    tracker.note_complete(&self.sub_problem.id);
                }
                info!(
                    sub_problem = %self.sub_problem.id,
                    rounds = self.rounds_completed,
                    "sub-problem deliberation complete"
                );
                Ok(result)
            }
            Ok(Err(e)) => Err(self.fail(&e.to_string())),
            Err(_) => Err(self.fail(&format!(
                "deliberation timed out after {}s",
                budget.as_secs()
            ))),
        }
    }

    fn fail(&mut self, reason: &str) -> SubProblemFailure {
        let phase = self.phase;
        self.transition(SubProblemPhase::Failed, reason);
        self.bridge.sub_problem_failed(reason);
        if let Some(tracker) = &self.progress {
            tracker.note_complete(&self.sub_problem.id);
        }
        warn!(
            sub_problem = %self.sub_problem.id,
            phase = %phase,
            reason,
            "sub-problem deliberation failed"
        );
        SubProblemFailure {
            sub_problem_id: self.sub_problem.id.clone(),
            phase,
            reason: reason.to_string(),
        }
    }

    async fn deliberate(&mut self) -> Result<SubProblemResult, ProviderError> {
        let max_rounds = self.assessment.recommended_rounds;
        let experts = self.assessment.recommended_experts;

        let mut transcript: Vec<Contribution> = Vec::new();
        let mut previous_phase: Option<DeliberationPhase> = None;
        let mut panel: Vec<PersonaProfile> = Vec::new();
        let mut round = 1u32;

        loop {
            let phase = DeliberationPhase::for_round(round, max_rounds);

            // Reseat the panel whenever the phase changes.
            if previous_phase != Some(phase) {
                panel = self.selector.select(phase, experts, round);
                if panel.is_empty() {
                    return Err(ProviderError::Validation(
                        "persona catalog is empty, cannot seat a panel".into(),
                    ));
                }
                self.bridge.persona_selected(&panel, phase);
                previous_phase = Some(phase);
            }
            if round == 1 {
                self.transition(SubProblemPhase::InitialRound, "panel selected");
            }

            let ctx = self.prompt_context(round, phase, &transcript);
            self.bridge.round_started(round, panel.len());
            let contributions = self.runner.run_round(&panel, &ctx).await?;
            self.bridge.round_complete(round, contributions.len());
            transcript.extend(contributions);
            self.rounds_completed = round;
            if let Some(tracker) = &self.progress {
                tracker.note_round(&self.sub_problem.id, round);
            }

            // The initial round seeds the debate; convergence is scored
            // only on rounds past the first.
            if round == 1 {
                self.transition(SubProblemPhase::Debating, "initial round complete");
                round += 1;
                continue;
            }

            let ctx = self.prompt_context(round, phase, &transcript);
            let (score, decision) = self.detector.evaluate(&ctx, max_rounds).await;
            if let Some(score) = &score {
                debug!(
                    sub_problem = %self.sub_problem.id,
                    round,
                    composite = score.composite,
                    decision = %decision,
                    "round evaluated"
                );
            }

            match decision {
                RoundDecision::Continue => {
                    self.transition(SubProblemPhase::Debating, "debate continuing");
                    round += 1;
                }
                RoundDecision::Converged => {
                    self.transition(SubProblemPhase::Converged, "composite crossed threshold");
                    break;
                }
                RoundDecision::MaxRoundsReached => {
                    self.transition(SubProblemPhase::Converged, "round cap reached");
                    break;
                }
            }
        }

        // Speculative starts must not vote until dependencies are final.
        if let Some(barrier) = &self.vote_barrier {
            barrier.tracker.wait_resolved(&barrier.dependency_ids).await;
        }

        self.transition(SubProblemPhase::Voting, "collecting terminal votes");
        self.bridge.voting_started();
        let final_phase = DeliberationPhase::for_round(self.rounds_completed, max_rounds);
        let ctx = self.prompt_context(self.rounds_completed, final_phase, &transcript);
        let votes = self.runner.collect_votes(&panel, &ctx).await?;
        self.bridge.voting_complete(votes.len());

        self.transition(SubProblemPhase::Synthesizing, "votes collected");
        self.bridge.synthesis_started();
        let synthesis = self
            .runner
            .synthesize(&SynthesisContext {
                sub_problem_id: Some(self.sub_problem.id.clone()),
                goal: self.sub_problem.goal.clone(),
                transcript: transcript.clone(),
                votes: votes.clone(),
                prior_results: Vec::new(),
                missing: Vec::new(),
            })
            .await?;
        self.bridge.synthesis_complete();

        Ok(SubProblemResult {
            sub_problem_id: self.sub_problem.id.clone(),
            recommendation: synthesis.recommendation,
            key_insights: synthesis.key_insights,
            contributions: transcript,
            votes,
        })
    }
}
