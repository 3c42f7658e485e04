use async_trait::async_trait;

use crate::probe::types::AttemptOutcome;
use crate::reasoner::types::{DecisionSource, FailureCategory, RetryDecision};
use crate::reasoner::FailureReasoner;

struct Rule {
    category: FailureCategory,
    markers: &'static [&'static str],
    /// Match markers only as standalone tokens (status codes inside longer
    /// numbers such as `15000ms` must not count).
    whole_token: bool,
}

/// Checked in order; the first rule with a matching marker wins.
const RULES: &[Rule] = &[
    Rule {
        category: FailureCategory::DuplicateIdentity,
        markers: &["already", "duplicate", "существ"],
        whole_token: false,
    },
    Rule {
        category: FailureCategory::Timeout,
        markers: &["timeout", "timed out"],
        whole_token: false,
    },
    Rule {
        category: FailureCategory::Captcha,
        markers: &["captcha"],
        whole_token: false,
    },
    Rule {
        category: FailureCategory::ServerError,
        markers: &["500", "502", "503", "504"],
        whole_token: true,
    },
];

impl Rule {
    fn matches(&self, reason: &str) -> bool {
        if self.whole_token {
            reason
                .split(|c: char| !c.is_alphanumeric())
                .any(|token| self.markers.contains(&token))
        } else {
            self.markers.iter().any(|marker| reason.contains(marker))
        }
    }
}

impl FailureCategory {
    /// Case-insensitive classification of a failure reason.
    pub fn classify(reason: &str) -> Self {
        let reason = reason.to_lowercase();
        RULES
            .iter()
            .find(|rule| rule.matches(&reason))
            .map(|rule| rule.category)
            .unwrap_or(FailureCategory::Unknown)
    }

    pub fn next_action(self) -> &'static str {
        match self {
            FailureCategory::DuplicateIdentity => {
                "Email probably already exists; generate a new identity and retry."
            }
            FailureCategory::Timeout => "Server response looks slow; increase wait and retry.",
            FailureCategory::Captcha => {
                "CAPTCHA detected; needs a test-environment bypass or manual verification."
            }
            FailureCategory::ServerError => {
                "Server error; retry after a delay and keep the artifacts."
            }
            FailureCategory::Unknown => {
                "Retry with fresh data and collect more diagnostic artifacts."
            }
        }
    }
}

/// Deterministic reasoner and the fallback for delegated reasoning.
#[derive(Debug, Clone)]
pub struct HeuristicReasoner {
    retry_delay_seconds: u64,
}

impl HeuristicReasoner {
    pub fn new(retry_delay_seconds: u64) -> Self {
        Self {
            retry_delay_seconds,
        }
    }

    pub fn evaluate(&self, outcome: &AttemptOutcome, attempt: u32, max_attempts: u32) -> RetryDecision {
        let category = FailureCategory::classify(outcome.failure_reason.as_deref().unwrap_or(""));

        // CAPTCHA is advisory only; the attempt bound is what stops retries.
        RetryDecision {
            next_action_text: category.next_action().to_string(),
            should_retry: attempt < max_attempts,
            retry_delay_seconds: self.retry_delay_seconds,
            source: DecisionSource::Heuristic,
            category,
            provider_error: None,
            raw_response: None,
        }
    }
}

#[async_trait]
impl FailureReasoner for HeuristicReasoner {
    async fn decide(&self, outcome: &AttemptOutcome, attempt: u32, max_attempts: u32) -> RetryDecision {
        self.evaluate(outcome, attempt, max_attempts)
    }
}
