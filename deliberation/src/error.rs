//! Error taxonomy for the orchestration engine.
//!
//! Three tiers:
//! - `ProviderError` — failures from external collaborators (persona and
//!   judgment providers). Transient variants are retryable; the rest are
//!   permanent and scoped to the unit that failed.
//! - `OrchestrationError` — fatal configuration errors that abort the whole
//!   run (dependency cycle, empty decomposition). These indicate an upstream
//!   contract violation and are never worked around.
//! - Sub-problem failures are not errors at the run boundary: they are
//!   recorded as gaps in the result set.

use crate::checkpoint::StoreError;

/// Fatal, run-aborting errors.
#[derive(Debug, thiserror::Error)]
pub enum OrchestrationError {
    #[error("empty decomposition: decomposer produced no sub-problems")]
    EmptyDecomposition,

    #[error("invalid decomposition: {0}")]
    InvalidDecomposition(String),

    #[error("dependency cycle among sub-problems: {remaining:?}")]
    DependencyCycle { remaining: Vec<String> },

    #[error("decomposition failed: {0}")]
    DecompositionFailed(String),

    #[error("checkpoint store error: {0}")]
    Store(#[from] StoreError),

    #[error("checkpoint rejected: {errors:?}")]
    CheckpointRejected { errors: Vec<String> },
}

/// Result type for run-level operations.
pub type OrchestrationResult<T> = Result<T, OrchestrationError>;

/// Failures surfaced by external collaborators.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ProviderError {
    #[error("timeout: {0}")]
    Timeout(String),

    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("transient i/o failure: {0}")]
    TransientIo(String),

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("retries exhausted after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: String },
}

impl ProviderError {
    /// Whether this failure is safe to retry.
    ///
    /// Malformed/validation failures come from a call that completed;
    /// retrying them would repeat the same bad answer.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Timeout(_) | Self::RateLimited(_) | Self::TransientIo(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(ProviderError::Timeout("30s".into()).is_transient());
        assert!(ProviderError::RateLimited("429".into()).is_transient());
        assert!(ProviderError::TransientIo("reset".into()).is_transient());

        assert!(!ProviderError::Malformed("bad json".into()).is_transient());
        assert!(!ProviderError::Validation("schema".into()).is_transient());
        assert!(!ProviderError::Exhausted {
            attempts: 3,
            last: "timeout".into()
        }
        .is_transient());
    }

    #[test]
    fn test_display() {
        let err = OrchestrationError::DependencyCycle {
            remaining: vec!["sp-2".into(), "sp-3".into()],
        };
        assert!(err.to_string().contains("dependency cycle"));
        assert!(err.to_string().contains("sp-2"));

        let err = ProviderError::Exhausted {
            attempts: 3,
            last: "timeout: 30s".into(),
        };
        assert!(err.to_string().contains("3 attempts"));
    }
}
