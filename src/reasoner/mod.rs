pub mod delegated;
pub mod heuristic;
pub mod prompt;
pub mod provider;
pub mod tools;
pub mod types;

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::ReasonerConfig;
use crate::probe::types::AttemptOutcome;
use crate::reasoner::delegated::DelegatedReasoner;
use crate::reasoner::heuristic::HeuristicReasoner;
use crate::reasoner::types::RetryDecision;

/// Decides what to do after a failed attempt. Never fails: any internal
/// problem degrades to the heuristic decision.
#[async_trait]
pub trait FailureReasoner: Send + Sync {
    async fn decide(&self, outcome: &AttemptOutcome, attempt: u32, max_attempts: u32) -> RetryDecision;
}

pub fn build_reasoner(config: &ReasonerConfig, retry_delay_seconds: u64) -> Arc<dyn FailureReasoner> {
    let heuristic = HeuristicReasoner::new(retry_delay_seconds);
    if !config.enabled {
        return Arc::new(heuristic);
    }

    match provider::build_provider(config) {
        Ok(provider) => {
            tracing::info!(provider = provider.name(), model = %config.model, "Delegated reasoning enabled");
            Arc::new(DelegatedReasoner::new(provider, heuristic, config.max_delay_seconds))
        }
        Err(e) => {
            tracing::warn!(error = %e, "Reasoning provider unavailable, decisions will use the heuristic");
            Arc::new(DelegatedReasoner::unavailable(
                e.to_string(),
                heuristic,
                config.max_delay_seconds,
            ))
        }
    }
}
