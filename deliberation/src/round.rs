//! Round execution — one contribution per panel member, in parallel.
//!
//! Contributions are append-only records. Each persona call is wrapped in
//! the retry executor; a permanent failure from any panel member fails the
//! round, which in turn fails only its own sub-problem.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ProviderError;
use crate::persona::PersonaProfile;
use crate::providers::{PersonaClient, PromptContext, Synthesis, SynthesisContext, Vote};
use crate::retry::RetryExecutor;

/// A single persona's output for one round. Never edited after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contribution {
    pub sub_problem_id: String,
    pub round: u32,
    pub persona_code: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// Executes rounds, votes, and synthesis calls against the persona provider.
#[derive(Clone)]
pub struct RoundRunner {
    client: Arc<dyn PersonaClient>,
    retry: RetryExecutor,
}

impl RoundRunner {
    pub fn new(client: Arc<dyn PersonaClient>, retry: RetryExecutor) -> Self {
        Self { client, retry }
    }

    /// Collect one contribution per panel member, fanned out concurrently.
    ///
    /// The round succeeds only if every member produces a contribution;
    /// the first permanent failure is returned.
    pub async fn run_round(
        &self,
        panel: &[PersonaProfile],
        ctx: &PromptContext,
    ) -> Result<Vec<Contribution>, ProviderError> {
        let futures = panel.iter().map(|persona| async move {
            let label = format!("contribute:{}", persona.code);
            let content = self
                .retry
                .run(&label, || self.client.contribute(persona, ctx))
                .await?;
            Ok::<_, ProviderError>(Contribution {
                sub_problem_id: ctx.sub_problem_id.clone(),
                round: ctx.round,
                persona_code: persona.code.clone(),
                content,
                created_at: Utc::now(),
            })
        });

        let results = join_all(futures).await;
        let mut contributions = Vec::with_capacity(results.len());
        for result in results {
            contributions.push(result?);
        }
        debug!(
            sub_problem = %ctx.sub_problem_id,
            round = ctx.round,
            contributions = contributions.len(),
            "round collected"
        );
        Ok(contributions)
    }

    /// Collect one vote per panel member.
    pub async fn collect_votes(
        &self,
        panel: &[PersonaProfile],
        ctx: &PromptContext,
    ) -> Result<Vec<Vote>, ProviderError> {
        let futures = panel.iter().map(|persona| async move {
            let label = format!("vote:{}", persona.code);
            self.retry
                .run(&label, || self.client.vote(persona, ctx))
                .await
        });

        let results = join_all(futures).await;
        let mut votes = Vec::with_capacity(results.len());
        for result in results {
            let mut vote = result?;
            vote.confidence = vote.confidence.clamp(0.0, 1.0);
            votes.push(vote);
        }
        Ok(votes)
    }

    /// Retry-wrapped synthesis call.
    pub async fn synthesize(&self, ctx: &SynthesisContext) -> Result<Synthesis, ProviderError> {
        self.retry
            .run("synthesize", || self.client.synthesize(ctx))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persona::DeliberationPhase;
    use crate::retry::RetryPolicy;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct ScriptedClient {
        /// Persona code that fails permanently, if any.
        poison: Option<String>,
        calls: AtomicU32,
    }

    #[async_trait]
    impl PersonaClient for ScriptedClient {
        async fn contribute(
            &self,
            persona: &PersonaProfile,
            ctx: &PromptContext,
        ) -> Result<String, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.poison.as_deref() == Some(persona.code.as_str()) {
                return Err(ProviderError::Malformed("unparseable".into()));
            }
            Ok(format!("{} on {} r{}", persona.code, ctx.goal, ctx.round))
        }

        async fn vote(
            &self,
            persona: &PersonaProfile,
            _ctx: &PromptContext,
        ) -> Result<Vote, ProviderError> {
            Ok(Vote {
                persona_code: persona.code.clone(),
                recommendation: "adopt".into(),
                confidence: 1.7, // deliberately out of range
            })
        }

        async fn synthesize(&self, _ctx: &SynthesisContext) -> Result<Synthesis, ProviderError> {
            Ok(Synthesis {
                recommendation: "combined".into(),
                key_insights: vec!["insight".into()],
            })
        }
    }

    fn ctx() -> PromptContext {
        PromptContext {
            sub_problem_id: "sp-1".into(),
            goal: "scope".into(),
            round: 1,
            phase: DeliberationPhase::Exploration,
            transcript: vec![],
            dependency_context: vec![],
        }
    }

    fn panel() -> Vec<PersonaProfile> {
        vec![
            PersonaProfile::new("a", "A", "x"),
            PersonaProfile::new("b", "B", "y"),
            PersonaProfile::new("c", "C", "z"),
        ]
    }

    fn runner(poison: Option<&str>) -> RoundRunner {
        RoundRunner::new(
            Arc::new(ScriptedClient {
                poison: poison.map(String::from),
                calls: AtomicU32::new(0),
            }),
            RetryExecutor::new(RetryPolicy::immediate(3)),
        )
    }

    #[tokio::test]
    async fn test_round_collects_all_contributions() {
        let contributions = runner(None).run_round(&panel(), &ctx()).await.unwrap();
        assert_eq!(contributions.len(), 3);
        assert!(contributions.iter().all(|c| c.round == 1));
        assert!(contributions.iter().all(|c| c.sub_problem_id == "sp-1"));
    }

    #[tokio::test]
    async fn test_round_fails_on_permanent_member_failure() {
        let err = runner(Some("b")).run_round(&panel(), &ctx()).await.unwrap_err();
        assert!(matches!(err, ProviderError::Malformed(_)));
    }

    #[tokio::test]
    async fn test_votes_are_clamped() {
        let votes = runner(None).collect_votes(&panel(), &ctx()).await.unwrap();
        assert_eq!(votes.len(), 3);
        assert!(votes.iter().all(|v| v.confidence <= 1.0));
    }
}
