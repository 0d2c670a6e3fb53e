//! Session scheduler — decompose, batch, execute, synthesize.
//!
//! The scheduler owns a whole deliberation session: it asks the
//! decomposer for sub-problems, validates and layers them into execution
//! batches, runs each batch's members concurrently, checkpoints after
//! every completion, and closes with a meta-synthesis across all
//! sub-problem results. A failed sub-problem is recorded as a gap and
//! never blocks its siblings; only configuration-level errors (cycle,
//! empty decomposition, rejected checkpoint) abort the session.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use futures::stream::{FuturesUnordered, StreamExt};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::checkpoint::{
    validate_checkpoint, Checkpoint, CheckpointRecord, CheckpointStore, IntegrityStatus,
    JsonFileCheckpointStore, MemoryCheckpointStore,
};
use crate::complexity::{ComplexityAssessment, ComplexityScorer};
use crate::config::EngineConfig;
use crate::convergence::ConvergenceDetector;
use crate::dag::{DependencyAnalyzer, ExecutionBatch};
use crate::deliberator::{SubProblemDeliberator, SubProblemFailure, SubProblemResult, VoteBarrier};
use crate::error::{OrchestrationError, OrchestrationResult};
use crate::events::{DeliberationEvent, EventBridge, EventBus, SharedEventBus};
use crate::persona::{PanelSelector, PersonaCatalog};
use crate::problem::{Decomposer, Problem, SubProblem, SubProblemId};
use crate::providers::{JudgmentClient, PersonaClient, Synthesis, SynthesisContext};
use crate::retry::RetryExecutor;
use crate::round::RoundRunner;
use crate::speculation::ProgressTracker;

/// Final output of a session.
#[derive(Debug, Clone)]
pub struct SessionReport {
    pub session_id: String,
    pub sub_problems: Vec<SubProblem>,
    pub assessment: ComplexityAssessment,
    /// Completed results in decomposition order.
    pub results: Vec<SubProblemResult>,
    /// Terminally failed sub-problems, id → reason.
    pub failed: BTreeMap<SubProblemId, String>,
    /// Meta-synthesis across all completed results.
    pub synthesis: Synthesis,
    /// True when any sub-problem failed.
    pub partial: bool,
    pub checkpoint: CheckpointRecord,
}

/// Orchestrates deliberation sessions end to end.
pub struct DeliberationScheduler {
    decomposer: Arc<dyn Decomposer>,
    personas: Arc<dyn PersonaClient>,
    judge: Arc<dyn JudgmentClient>,
    store: Arc<dyn CheckpointStore>,
    catalog: PersonaCatalog,
    config: EngineConfig,
    bus: SharedEventBus,
}

impl DeliberationScheduler {
    pub fn new(
        decomposer: Arc<dyn Decomposer>,
        personas: Arc<dyn PersonaClient>,
        judge: Arc<dyn JudgmentClient>,
    ) -> Self {
        Self {
            decomposer,
            personas,
            judge,
            store: Arc::new(MemoryCheckpointStore::new()),
            catalog: PersonaCatalog::builtin(),
            config: EngineConfig::default(),
            bus: EventBus::new().shared(),
        }
    }

    pub fn with_store(mut self, store: Arc<dyn CheckpointStore>) -> Self {
        self.store = store;
        self
    }

    pub fn with_catalog(mut self, catalog: PersonaCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    /// A configured `checkpoint_dir` switches the scheduler to the
    /// JSON-file store; a later `with_store` call overrides it.
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        if let Some(dir) = &config.checkpoint_dir {
            self.store = Arc::new(JsonFileCheckpointStore::new(dir));
        }
        self.config = config;
        self
    }

    /// Bus handle for progress subscriptions.
    pub fn event_bus(&self) -> SharedEventBus {
        self.bus.clone()
    }

    /// Run a fresh session.
    pub async fn run(&self, problem: &Problem) -> OrchestrationResult<SessionReport> {
        let session_id = Uuid::new_v4().to_string();
        self.run_session(problem, &session_id, None).await
    }

    /// Resume a previously checkpointed session. Already-resolved
    /// sub-problems are skipped; an unknown session id starts fresh.
    pub async fn resume(
        &self,
        problem: &Problem,
        session_id: &str,
    ) -> OrchestrationResult<SessionReport> {
        let prior = self.store.load(session_id)?;
        if prior.is_none() {
            warn!(session_id, "no checkpoint found, starting fresh");
        }
        self.run_session(problem, session_id, prior).await
    }

    async fn run_session(
        &self,
        problem: &Problem,
        session_id: &str,
        prior: Option<Checkpoint>,
    ) -> OrchestrationResult<SessionReport> {
        let retry = RetryExecutor::new(self.config.retry.clone());

        let subs = retry
            .run("decompose", || self.decomposer.decompose(problem))
            .await
            .map_err(|e| OrchestrationError::DecompositionFailed(e.to_string()))?;
        crate::problem::validate_decomposition(&subs)?;
        // A single sub-problem has nothing to analyze; it runs alone.
        let batches = if let [only] = subs.as_slice() {
            vec![ExecutionBatch {
                index: 0,
                sub_problem_ids: vec![only.id.clone()],
            }]
        } else {
            DependencyAnalyzer::batches(&subs)?
        };

        let assessment = ComplexityScorer::new(self.judge.clone())
            .assess(problem, &subs)
            .await;
        info!(
            session_id,
            sub_problems = subs.len(),
            batches = batches.len(),
            overall_complexity = assessment.overall_complexity,
            rounds = assessment.recommended_rounds,
            experts = assessment.recommended_experts,
            "session planned"
        );

        let mut checkpoint = match prior {
            Some(cp) => match validate_checkpoint(&cp, &subs) {
                IntegrityStatus::Corrupted { errors } => {
                    return Err(OrchestrationError::CheckpointRejected { errors });
                }
                IntegrityStatus::Recoverable { warnings } => {
                    for warning in &warnings {
                        warn!(session_id, warning, "resuming with degraded checkpoint");
                    }
                    cp
                }
                IntegrityStatus::Valid => {
                    info!(
                        session_id,
                        resolved = cp.resolved_count(),
                        "resuming from checkpoint"
                    );
                    cp
                }
            },
            None => Checkpoint::new(session_id, subs.len()),
        };

        self.bus.publish(DeliberationEvent::SessionStarted {
            session_id: session_id.to_string(),
            total_sub_problems: subs.len(),
            timestamp: chrono::Utc::now(),
        });

        let index_of: HashMap<&str, usize> = subs
            .iter()
            .enumerate()
            .map(|(i, s)| (s.id.as_str(), i))
            .collect();

        if self.config.speculation.enabled {
            self.run_speculative(&subs, &index_of, &assessment, &mut checkpoint, &retry)
                .await?;
        } else {
            self.run_batched(&subs, &batches, &index_of, &assessment, &mut checkpoint, &retry)
                .await?;
        }

        let order: Vec<SubProblemId> = subs.iter().map(|s| s.id.clone()).collect();
        let results: Vec<SubProblemResult> = order
            .iter()
            .filter_map(|id| checkpoint.completed.get(id).cloned())
            .collect();
        let failed = checkpoint.failed.clone();
        let missing: Vec<SubProblemId> = order
            .iter()
            .filter(|id| failed.contains_key(*id))
            .cloned()
            .collect();

        let synthesis = self
            .meta_synthesis(problem, &results, &missing, &retry)
            .await;

        let partial = !failed.is_empty();
        self.bus.publish(DeliberationEvent::SessionComplete {
            session_id: session_id.to_string(),
            completed: results.len(),
            failed: failed.len(),
            partial,
            timestamp: chrono::Utc::now(),
        });

        let record = checkpoint.external_record(&order);
        if !partial {
            // Fully resolved sessions have nothing to resume.
            self.store.clear(session_id)?;
        }
        info!(
            session_id,
            completed = results.len(),
            failed = failed.len(),
            partial,
            "session complete"
        );

        Ok(SessionReport {
            session_id: session_id.to_string(),
            sub_problems: subs,
            assessment,
            results,
            failed,
            synthesis,
            partial,
            checkpoint: record,
        })
    }

    /// Batch-barrier execution: batch *i+1* starts only once batch *i* is
    /// fully resolved.
    async fn run_batched(
        &self,
        subs: &[SubProblem],
        batches: &[ExecutionBatch],
        index_of: &HashMap<&str, usize>,
        assessment: &ComplexityAssessment,
        checkpoint: &mut Checkpoint,
        retry: &RetryExecutor,
    ) -> OrchestrationResult<()> {
        for batch in batches {
            let mut running = FuturesUnordered::new();
            for id in &batch.sub_problem_ids {
                if checkpoint.is_resolved(id) {
                    debug!(sub_problem = %id, "already resolved, skipping");
                    continue;
                }
                let index = index_of[id.as_str()];
                let sub = subs[index].clone();
                let context = self.dependency_context(&sub, &checkpoint.completed);
                let deliberator = self
                    .deliberator_for(sub, index, assessment, retry)
                    .with_dependency_context(context);
                running.push(deliberator.run());
            }

            while let Some(outcome) = running.next().await {
                self.record(checkpoint, outcome)?;
            }
        }
        Ok(())
    }

    /// Speculative execution: every sub-problem starts as soon as each of
    /// its dependencies has debated past the configured round threshold,
    /// with a barrier before voting until those dependencies are final.
    async fn run_speculative(
        &self,
        subs: &[SubProblem],
        index_of: &HashMap<&str, usize>,
        assessment: &ComplexityAssessment,
        checkpoint: &mut Checkpoint,
        retry: &RetryExecutor,
    ) -> OrchestrationResult<()> {
        let tracker = ProgressTracker::new();
        for id in checkpoint.completed.keys().chain(checkpoint.failed.keys()) {
            tracker.note_complete(id);
        }
        let completed = Arc::new(Mutex::new(checkpoint.completed.clone()));
        let min_rounds = self.config.speculation.min_dependency_rounds;

        let mut running = FuturesUnordered::new();
        for sub in subs {
            if checkpoint.is_resolved(&sub.id) {
                continue;
            }
            let index = index_of[sub.id.as_str()];
            let deps: Vec<SubProblemId> = sub.depends_on.iter().cloned().collect();
            let tracker = tracker.clone();
            let completed = completed.clone();
            let deliberator = self
                .deliberator_for(sub.clone(), index, assessment, retry)
                .with_progress(tracker.clone());

            running.push(async move {
                tracker.wait_ready(&deps, min_rounds).await;
                let context: Vec<String> = {
                    let map = completed
                        .lock()
                        .unwrap_or_else(|poisoned| poisoned.into_inner());
                    deps.iter()
                        .filter_map(|d| map.get(d))
                        .map(|r| format!("{}: {}", r.sub_problem_id, r.recommendation))
                        .collect()
                };
                deliberator
                    .with_dependency_context(context)
                    .with_vote_barrier(VoteBarrier {
                        tracker,
                        dependency_ids: deps,
                    })
                    .run()
                    .await
            });
        }

        while let Some(outcome) = running.next().await {
            if let Ok(result) = &outcome {
                completed
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner())
                    .insert(result.sub_problem_id.clone(), result.clone());
            }
            self.record(checkpoint, outcome)?;
        }
        Ok(())
    }

    fn deliberator_for(
        &self,
        sub: SubProblem,
        index: usize,
        assessment: &ComplexityAssessment,
        retry: &RetryExecutor,
    ) -> SubProblemDeliberator {
        let bridge = EventBridge::new(self.bus.clone(), index, &sub.id);
        // Panel sizing comes from the session-level assessment; siblings
        // deliberate under the same targets.
        SubProblemDeliberator::new(
            sub,
            assessment.clone(),
            PanelSelector::new(self.catalog.clone()),
            RoundRunner::new(self.personas.clone(), retry.clone()),
            ConvergenceDetector::new(self.judge.clone(), self.config.convergence.clone()),
            bridge,
        )
        .with_timeout(self.config.sub_problem_timeout)
    }

    /// Result summaries from the sub-problem's resolved dependencies.
    /// Failed dependencies contribute nothing; the dependent still runs.
    fn dependency_context(
        &self,
        sub: &SubProblem,
        completed: &BTreeMap<SubProblemId, SubProblemResult>,
    ) -> Vec<String> {
        sub.depends_on
            .iter()
            .filter_map(|dep| completed.get(dep))
            .map(|r| format!("{}: {}", r.sub_problem_id, r.recommendation))
            .collect()
    }

    fn record(
        &self,
        checkpoint: &mut Checkpoint,
        outcome: Result<SubProblemResult, SubProblemFailure>,
    ) -> OrchestrationResult<()> {
        match outcome {
            Ok(result) => checkpoint.record_result(result),
            Err(failure) => {
                checkpoint.record_failure(&failure.sub_problem_id, &failure.reason)
            }
        }
        self.store.save(checkpoint)?;
        Ok(())
    }

    /// Combine all sub-problem results into one recommendation.
    ///
    /// A failed synthesis call degrades to a mechanical concatenation so
    /// the session still returns everything the debates produced.
    async fn meta_synthesis(
        &self,
        problem: &Problem,
        results: &[SubProblemResult],
        missing: &[SubProblemId],
        retry: &RetryExecutor,
    ) -> Synthesis {
        let ctx = SynthesisContext {
            sub_problem_id: None,
            goal: problem.statement.clone(),
            transcript: Vec::new(),
            votes: Vec::new(),
            prior_results: results.to_vec(),
            missing: missing.to_vec(),
        };
        match retry
            .run("meta_synthesize", || self.personas.synthesize(&ctx))
            .await
        {
            Ok(synthesis) => synthesis,
            Err(e) => {
                warn!(error = %e, "meta-synthesis failed, falling back to concatenation");
                let mut lines: Vec<String> = results
                    .iter()
                    .map(|r| format!("{}: {}", r.sub_problem_id, r.recommendation))
                    .collect();
                for id in missing {
                    lines.push(format!("{id}: unresolved (deliberation failed)"));
                }
                Synthesis {
                    recommendation: lines.join("\n"),
                    key_insights: results
                        .iter()
                        .flat_map(|r| r.key_insights.iter().cloned())
                        .collect(),
                }
            }
        }
    }
}
