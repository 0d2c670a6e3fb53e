//! Deliberation orchestration engine.
//!
//! Decomposes a problem into a dependency DAG of sub-problems, deliberates
//! each one through a multi-persona debate (adaptive rounds, convergence
//! detection, voting, synthesis), and combines the results into a single
//! recommendation. Sub-problems with satisfied dependencies run
//! concurrently; progress is checkpointed for crash recovery and streamed
//! as broadcast events.
//!
//! External collaborators (decomposer, persona responses, judgment calls)
//! plug in through async traits, so the engine itself stays deterministic
//! and fully testable with scripted providers.

pub mod checkpoint;
pub mod complexity;
pub mod config;
pub mod convergence;
pub mod dag;
pub mod deliberator;
pub mod error;
pub mod events;
pub mod persona;
pub mod problem;
pub mod providers;
pub mod retry;
pub mod round;
pub mod scheduler;
pub mod speculation;
pub mod telemetry;

pub use checkpoint::{
    Checkpoint, CheckpointRecord, CheckpointStore, IntegrityStatus, JsonFileCheckpointStore,
    MemoryCheckpointStore, StoreError,
};
pub use complexity::{ComplexityAssessment, ComplexityScorer, DimensionScores};
pub use config::EngineConfig;
pub use convergence::{ConvergenceDetector, ConvergencePolicy, ConvergenceScore, RoundDecision};
pub use dag::{DependencyAnalyzer, ExecutionBatch};
pub use deliberator::{
    PhaseTransition, SubProblemDeliberator, SubProblemFailure, SubProblemPhase, SubProblemResult,
};
pub use error::{OrchestrationError, OrchestrationResult, ProviderError};
pub use events::{DeliberationEvent, EventBridge, EventBus, EventBusExt, EventFilter};
pub use persona::{DeliberationPhase, PanelSelector, PersonaCatalog, PersonaProfile};
pub use problem::{Decomposer, Problem, SubProblem, SubProblemId};
pub use providers::{
    JudgmentClient, PersonaClient, PromptContext, RawComplexity, RawConvergence, Synthesis,
    SynthesisContext, Vote,
};
pub use retry::{RetryExecutor, RetryPolicy};
pub use round::{Contribution, RoundRunner};
pub use scheduler::{DeliberationScheduler, SessionReport};
pub use speculation::{ProgressTracker, SpeculativeConfig};
pub use telemetry::{init_telemetry, SessionStats};
