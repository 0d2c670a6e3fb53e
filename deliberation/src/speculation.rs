//! Speculative execution — optional early start of dependent sub-problems.
//!
//! Off by default. When enabled, a dependent sub-problem may begin its
//! exploration rounds once every dependency has progressed past a minimum
//! round count, instead of waiting for full completion. The dependent
//! still blocks before voting until all dependency results are final, so
//! speculation changes latency, never outcomes.

use std::collections::HashMap;

use tokio::sync::watch;
use tracing::debug;

/// Configuration for speculative starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpeculativeConfig {
    pub enabled: bool,
    /// Rounds a dependency must have completed before dependents may start.
    pub min_dependency_rounds: u32,
}

impl Default for SpeculativeConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            min_dependency_rounds: 2,
        }
    }
}

impl SpeculativeConfig {
    /// Read overrides from `DELIB_SPECULATION_*` environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(v) = std::env::var("DELIB_SPECULATION_ENABLED") {
            config.enabled = matches!(v.to_lowercase().as_str(), "1" | "true" | "yes");
        }
        if let Ok(v) = std::env::var("DELIB_SPECULATION_MIN_ROUNDS") {
            if let Ok(n) = v.parse::<u32>() {
                config.min_dependency_rounds = n.max(1);
            }
        }
        config
    }
}

/// Per-sub-problem progress: (rounds completed, finished).
type ProgressMap = HashMap<String, (u32, bool)>;

/// Shared progress signal between running deliberators and waiters.
///
/// Writers call `note_round` / `note_complete`; waiters block on
/// `wait_ready` until every named dependency has either finished or
/// passed the round threshold. Completion is noted for failures too, so
/// a failed dependency never wedges its dependents.
#[derive(Clone)]
pub struct ProgressTracker {
    sender: watch::Sender<ProgressMap>,
}

impl ProgressTracker {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(ProgressMap::new());
        Self { sender }
    }

    /// Record that a sub-problem finished a round.
    pub fn note_round(&self, sub_problem_id: &str, round: u32) {
        self.sender.send_modify(|map| {
            let entry = map.entry(sub_problem_id.to_string()).or_insert((0, false));
            entry.0 = entry.0.max(round);
        });
    }

    /// Record that a sub-problem is resolved (completed or failed).
    pub fn note_complete(&self, sub_problem_id: &str) {
        self.sender.send_modify(|map| {
            let entry = map.entry(sub_problem_id.to_string()).or_insert((0, false));
            entry.1 = true;
        });
    }

    fn ready(map: &ProgressMap, deps: &[String], min_rounds: u32) -> bool {
        deps.iter().all(|dep| {
            map.get(dep)
                .map(|(rounds, done)| *done || *rounds >= min_rounds)
                .unwrap_or(false)
        })
    }

    /// Block until every dependency is resolved or past `min_rounds`.
    pub async fn wait_ready(&self, deps: &[String], min_rounds: u32) {
        if deps.is_empty() {
            return;
        }
        let mut rx = self.sender.subscribe();
        loop {
            {
                let map = rx.borrow();
                if Self::ready(&map, deps, min_rounds) {
                    return;
                }
            }
            if rx.changed().await.is_err() {
                debug!("progress tracker dropped while waiting");
                return;
            }
        }
    }

    /// Block until every dependency is fully resolved.
    pub async fn wait_resolved(&self, deps: &[String]) {
        if deps.is_empty() {
            return;
        }
        let mut rx = self.sender.subscribe();
        loop {
            {
                let map = rx.borrow();
                let all_done = deps
                    .iter()
                    .all(|dep| map.get(dep).map(|(_, done)| *done).unwrap_or(false));
                if all_done {
                    return;
                }
            }
            if rx.changed().await.is_err() {
                return;
            }
        }
    }
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new()
    }
}
