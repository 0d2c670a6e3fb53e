//! Dependency analysis — topological layering of sub-problems into
//! execution batches.
//!
//! Standard Kahn-style generalization over a petgraph DAG: repeatedly
//! collect every not-yet-batched sub-problem whose dependencies are all
//! already batched. Each batch is maximal, so members can run concurrently
//! and batch *i+1* only starts once batch *i* is fully resolved.
//!
//! A cycle should be impossible given the decomposer's backward-only
//! dependency construction, but the analyzer detects and rejects one
//! rather than looping forever.

use std::collections::{BTreeSet, HashMap};

use petgraph::graphmap::DiGraphMap;
use petgraph::Direction;
use serde::{Deserialize, Serialize};

use crate::error::{OrchestrationError, OrchestrationResult};
use crate::problem::{SubProblem, SubProblemId};

/// A set of sub-problems whose dependencies are fully resolved,
/// eligible to run concurrently.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionBatch {
    pub index: usize,
    /// Member ids in decomposition order.
    pub sub_problem_ids: Vec<SubProblemId>,
}

/// Builds the dependency DAG and partitions it into ordered batches.
pub struct DependencyAnalyzer;

impl DependencyAnalyzer {
    /// Partition sub-problems into maximal topological layers.
    pub fn batches(subs: &[SubProblem]) -> OrchestrationResult<Vec<ExecutionBatch>> {
        if subs.is_empty() {
            return Err(OrchestrationError::EmptyDecomposition);
        }

        let position: HashMap<&str, usize> = subs
            .iter()
            .enumerate()
            .map(|(i, s)| (s.id.as_str(), i))
            .collect();

        // Edge dep → dependent.
        let mut graph: DiGraphMap<usize, ()> = DiGraphMap::new();
        for (i, _) in subs.iter().enumerate() {
            graph.add_node(i);
        }
        for (i, sub) in subs.iter().enumerate() {
            for dep in &sub.depends_on {
                let dep_pos = *position.get(dep.as_str()).ok_or_else(|| {
                    OrchestrationError::InvalidDecomposition(format!(
                        "sub-problem '{}' depends on unknown id '{}'",
                        sub.id, dep
                    ))
                })?;
                if dep_pos == i {
                    return Err(OrchestrationError::InvalidDecomposition(format!(
                        "sub-problem '{}' depends on itself",
                        sub.id
                    )));
                }
                graph.add_edge(dep_pos, i, ());
            }
        }

        let mut batched: BTreeSet<usize> = BTreeSet::new();
        let mut remaining: BTreeSet<usize> = (0..subs.len()).collect();
        let mut batches = Vec::new();

        while !remaining.is_empty() {
            let ready: Vec<usize> = remaining
                .iter()
                .copied()
                .filter(|&i| {
                    graph
                        .neighbors_directed(i, Direction::Incoming)
                        .all(|dep| batched.contains(&dep))
                })
                .collect();

            if ready.is_empty() {
                let stuck = remaining
                    .iter()
                    .map(|&i| subs[i].id.clone())
                    .collect::<Vec<_>>();
                return Err(OrchestrationError::DependencyCycle { remaining: stuck });
            }

            for &i in &ready {
                remaining.remove(&i);
                batched.insert(i);
            }
            batches.push(ExecutionBatch {
                index: batches.len(),
                sub_problem_ids: ready.iter().map(|&i| subs[i].id.clone()).collect(),
            });
        }

        Ok(batches)
    }
}
