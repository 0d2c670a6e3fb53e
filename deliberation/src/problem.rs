//! Problem and sub-problem inputs, plus decomposition validation.
//!
//! A `Problem` is immutable input. The `Decomposer` collaborator splits it
//! into an ordered set of `SubProblem`s whose `depends_on` sets may only
//! reference earlier sub-problems — `validate_decomposition` enforces that
//! standing invariant before anything is scheduled.

use std::collections::BTreeSet;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{OrchestrationError, OrchestrationResult, ProviderError};

/// Identifier for a sub-problem, assigned by the decomposer.
pub type SubProblemId = String;

/// The problem under deliberation. Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Problem {
    /// The problem statement.
    pub statement: String,
    /// Supporting context supplied by the caller.
    pub context: String,
}

impl Problem {
    pub fn new(statement: &str, context: &str) -> Self {
        Self {
            statement: statement.to_string(),
            context: context.to_string(),
        }
    }
}

/// An independently deliberatable fragment of the problem.
///
/// Created once by the decomposer and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubProblem {
    /// Unique identifier within the decomposition.
    pub id: SubProblemId,
    /// What this fragment must answer.
    pub goal: String,
    /// Sub-problems whose results feed into this one.
    /// May only reference earlier sub-problem ids.
    #[serde(default)]
    pub depends_on: BTreeSet<SubProblemId>,
}

impl SubProblem {
    pub fn new(id: &str, goal: &str) -> Self {
        Self {
            id: id.to_string(),
            goal: goal.to_string(),
            depends_on: BTreeSet::new(),
        }
    }

    /// Builder-style dependency declaration.
    pub fn depends_on(mut self, ids: &[&str]) -> Self {
        self.depends_on.extend(ids.iter().map(|s| s.to_string()));
        self
    }
}

/// Collaborator that splits a problem into sub-problems.
#[async_trait]
pub trait Decomposer: Send + Sync {
    async fn decompose(&self, problem: &Problem) -> Result<Vec<SubProblem>, ProviderError>;
}

/// Check the decomposer's output contract: non-empty, unique ids, and
/// backward-only dependencies (no forward or self references).
pub fn validate_decomposition(subs: &[SubProblem]) -> OrchestrationResult<()> {
    if subs.is_empty() {
        return Err(OrchestrationError::EmptyDecomposition);
    }

    let mut seen: BTreeSet<&str> = BTreeSet::new();
    for sub in subs {
        if !seen.insert(&sub.id) {
            return Err(OrchestrationError::InvalidDecomposition(format!(
                "duplicate sub-problem id '{}'",
                sub.id
            )));
        }
        for dep in &sub.depends_on {
            if dep == &sub.id {
                return Err(OrchestrationError::InvalidDecomposition(format!(
                    "sub-problem '{}' depends on itself",
                    sub.id
                )));
            }
            if !seen.contains(dep.as_str()) {
                return Err(OrchestrationError::InvalidDecomposition(format!(
                    "sub-problem '{}' depends on '{}' which is not an earlier sub-problem",
                    sub.id, dep
                )));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_decomposition() {
        let subs = vec![
            SubProblem::new("sp-1", "scope"),
            SubProblem::new("sp-2", "risks"),
            SubProblem::new("sp-3", "plan").depends_on(&["sp-1", "sp-2"]),
        ];
        assert!(validate_decomposition(&subs).is_ok());
    }

    #[test]
    fn test_empty_decomposition_rejected() {
        let err = validate_decomposition(&[]).unwrap_err();
        assert!(matches!(err, OrchestrationError::EmptyDecomposition));
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let subs = vec![SubProblem::new("sp-1", "a"), SubProblem::new("sp-1", "b")];
        let err = validate_decomposition(&subs).unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn test_forward_reference_rejected() {
        let subs = vec![
            SubProblem::new("sp-1", "a").depends_on(&["sp-2"]),
            SubProblem::new("sp-2", "b"),
        ];
        let err = validate_decomposition(&subs).unwrap_err();
        assert!(err.to_string().contains("not an earlier sub-problem"));
    }

    #[test]
    fn test_self_reference_rejected() {
        let subs = vec![SubProblem::new("sp-1", "a").depends_on(&["sp-1"])];
        let err = validate_decomposition(&subs).unwrap_err();
        assert!(err.to_string().contains("depends on itself"));
    }
}
