//! Tracing setup and per-session stats.
//!
//! `init_telemetry` installs the global subscriber with an env-filter
//! (`RUST_LOG` wins over the default). `SessionStats` condenses a
//! finished report into one structured tracing event, compatible with
//! OpenTelemetry exporters via `tracing-opentelemetry`.

use tracing_subscriber::EnvFilter;

use crate::scheduler::SessionReport;

/// Install the global tracing subscriber. Safe to call once per process;
/// a second call is a no-op.
pub fn init_telemetry() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("deliberation=info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

/// Compact per-session stats emitted as a structured tracing event.
#[derive(Debug, Clone)]
pub struct SessionStats {
    pub session_id: String,
    pub sub_problems: usize,
    pub completed: usize,
    pub failed: usize,
    pub total_contributions: usize,
    pub total_votes: usize,
    pub overall_complexity: f64,
    pub partial: bool,
}

impl SessionStats {
    pub fn from_report(report: &SessionReport) -> Self {
        Self {
            session_id: report.session_id.clone(),
            sub_problems: report.sub_problems.len(),
            completed: report.results.len(),
            failed: report.failed.len(),
            total_contributions: report.results.iter().map(|r| r.contributions.len()).sum(),
            total_votes: report.results.iter().map(|r| r.votes.len()).sum(),
            overall_complexity: report.assessment.overall_complexity,
            partial: report.partial,
        }
    }

    /// Emit this as a structured tracing event.
    pub fn emit(&self) {
        tracing::info!(
            target: "deliberation.metrics",
            session_id = %self.session_id,
            sub_problems = self.sub_problems,
            completed = self.completed,
            failed = self.failed,
            contributions = self.total_contributions,
            votes = self.total_votes,
            overall_complexity = self.overall_complexity,
            partial = self.partial,
            "session_complete"
        );
    }
}
