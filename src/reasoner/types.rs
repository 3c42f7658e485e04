use serde::{Deserialize, Serialize};

use crate::probe::types::{AttemptOutcome, Verdict};

/// Where a retry decision came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecisionSource {
    Heuristic,
    Delegated,
}

/// Failure buckets recognised by the heuristic rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureCategory {
    DuplicateIdentity,
    Timeout,
    Captcha,
    ServerError,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryDecision {
    pub next_action_text: String,
    pub should_retry: bool,
    pub retry_delay_seconds: u64,
    pub source: DecisionSource,
    /// Heuristic classification of the failure, kept for audit even when
    /// the advice came from the provider.
    pub category: FailureCategory,
    /// Set when delegation was attempted and did not produce the decision.
    pub provider_error: Option<String>,
    pub raw_response: Option<String>,
}

impl RetryDecision {
    pub fn with_provider_error(mut self, error: impl Into<String>) -> Self {
        self.provider_error = Some(error.into());
        self
    }
}

/// Flat description of a failed attempt handed to a reasoning provider.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailureSummary {
    pub attempt: u32,
    pub max_retries: u32,
    pub reason: Option<String>,
    pub final_url: Option<String>,
    pub verification_detail: Option<Verdict>,
}

impl FailureSummary {
    pub fn new(outcome: &AttemptOutcome, attempt: u32, max_retries: u32) -> Self {
        Self {
            attempt,
            max_retries,
            reason: outcome.failure_reason.clone(),
            final_url: outcome.final_url.clone(),
            verification_detail: outcome.verification_detail.clone(),
        }
    }
}
