//! Engine configuration with environment overrides.
//!
//! Defaults are production values; every knob can be overridden through a
//! `DELIB_*` environment variable. Unparseable values fall back to the
//! default with a warning rather than aborting.

use std::path::PathBuf;
use std::time::Duration;

use tracing::warn;

use crate::convergence::ConvergencePolicy;
use crate::deliberator::DEFAULT_SUB_PROBLEM_TIMEOUT_SECS;
use crate::retry::RetryPolicy;
use crate::speculation::SpeculativeConfig;

/// Top-level engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Wall-clock budget per sub-problem deliberation.
    pub sub_problem_timeout: Duration,
    pub retry: RetryPolicy,
    pub convergence: ConvergencePolicy,
    pub speculation: SpeculativeConfig,
    /// Directory for durable checkpoints; `None` keeps them in memory.
    pub checkpoint_dir: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sub_problem_timeout: Duration::from_secs(DEFAULT_SUB_PROBLEM_TIMEOUT_SECS),
            retry: RetryPolicy::default(),
            convergence: ConvergencePolicy::default(),
            speculation: SpeculativeConfig::default(),
            checkpoint_dir: None,
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    match raw.parse() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!(key, raw = %raw, "unparseable environment override ignored");
            None
        }
    }
}

impl EngineConfig {
    /// Defaults overridden by `DELIB_*` environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(secs) = env_parse::<u64>("DELIB_SUB_PROBLEM_TIMEOUT_SECS") {
            config.sub_problem_timeout = Duration::from_secs(secs.max(1));
        }
        if let Some(attempts) = env_parse::<u32>("DELIB_RETRY_MAX_ATTEMPTS") {
            config.retry.max_attempts = attempts.max(1);
        }
        if let Some(secs) = env_parse::<f64>("DELIB_RETRY_INITIAL_BACKOFF_SECS") {
            if secs.is_finite() && secs >= 0.0 {
                config.retry.initial_backoff_secs = secs;
            }
        }
        if let Some(threshold) = env_parse::<f64>("DELIB_CONVERGENCE_THRESHOLD") {
            if threshold.is_finite() {
                config.convergence.stop_threshold = threshold.clamp(0.0, 1.0);
            }
        }
        if let Ok(dir) = std::env::var("DELIB_CHECKPOINT_DIR") {
            if !dir.is_empty() {
                config.checkpoint_dir = Some(PathBuf::from(dir));
            }
        }
        config.speculation = SpeculativeConfig::from_env();

        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.sub_problem_timeout, Duration::from_secs(300));
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.convergence.stop_threshold, 0.75);
        assert!(!config.speculation.enabled);
        assert!(config.checkpoint_dir.is_none());
    }
}
