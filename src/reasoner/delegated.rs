use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::{AppError, Result};
use crate::probe::types::AttemptOutcome;
use crate::reasoner::heuristic::HeuristicReasoner;
use crate::reasoner::provider::ReasoningProvider;
use crate::reasoner::types::{DecisionSource, FailureSummary, RetryDecision};
use crate::reasoner::FailureReasoner;

enum ProviderSlot {
    Ready(Arc<dyn ReasoningProvider>),
    Unavailable(String),
}

/// Asks a language model for the retry decision and falls back to the
/// heuristic whenever the provider fails or replies with something unusable.
pub struct DelegatedReasoner {
    provider: ProviderSlot,
    heuristic: HeuristicReasoner,
    max_delay_seconds: u64,
}

impl DelegatedReasoner {
    pub fn new(
        provider: Arc<dyn ReasoningProvider>,
        heuristic: HeuristicReasoner,
        max_delay_seconds: u64,
    ) -> Self {
        Self {
            provider: ProviderSlot::Ready(provider),
            heuristic,
            max_delay_seconds,
        }
    }

    /// A reasoner whose provider could not be built; every decision falls
    /// back and records why.
    pub fn unavailable(
        reason: impl Into<String>,
        heuristic: HeuristicReasoner,
        max_delay_seconds: u64,
    ) -> Self {
        Self {
            provider: ProviderSlot::Unavailable(reason.into()),
            heuristic,
            max_delay_seconds,
        }
    }
}

#[async_trait]
impl FailureReasoner for DelegatedReasoner {
    async fn decide(&self, outcome: &AttemptOutcome, attempt: u32, max_attempts: u32) -> RetryDecision {
        let fallback = self.heuristic.evaluate(outcome, attempt, max_attempts);

        let provider = match &self.provider {
            ProviderSlot::Ready(provider) => provider,
            ProviderSlot::Unavailable(reason) => {
                return fallback.with_provider_error(format!("Reasoning provider unavailable: {reason}"));
            }
        };

        let summary = FailureSummary::new(outcome, attempt, max_attempts);
        let raw = match provider.send(&summary).await {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(provider = provider.name(), error = %e, "Reasoning provider call failed, using heuristic");
                return fallback.with_provider_error(format!("{} call failed: {e}", provider.name()));
            }
        };

        let reply = match parse_reply(&raw) {
            Ok(reply) => reply,
            Err(e) => {
                tracing::warn!(provider = provider.name(), error = %e, "Unusable provider reply, using heuristic");
                return fallback.with_provider_error(e.to_string());
            }
        };

        RetryDecision {
            next_action_text: reply.next_action.unwrap_or(fallback.next_action_text),
            should_retry: reply.should_retry.unwrap_or(fallback.should_retry) && attempt < max_attempts,
            retry_delay_seconds: reply
                .retry_delay_seconds
                .map_or(fallback.retry_delay_seconds, |delay| delay.min(self.max_delay_seconds)),
            source: DecisionSource::Delegated,
            category: fallback.category,
            provider_error: None,
            raw_response: Some(raw),
        }
    }
}

/// Decision fields recovered from a provider reply. Missing fields are
/// filled from the heuristic decision.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ProviderReply {
    pub next_action: Option<String>,
    pub should_retry: Option<bool>,
    pub retry_delay_seconds: Option<u64>,
}

pub fn parse_reply(raw: &str) -> Result<ProviderReply> {
    let object = extract_json_object(raw).ok_or_else(|| {
        AppError::ProviderResponse("no JSON object in provider reply".to_string())
    })?;

    let reply = ProviderReply {
        next_action: object.get("next_action").and_then(text_field),
        should_retry: object.get("should_retry").and_then(bool_field),
        retry_delay_seconds: object.get("retry_delay_seconds").and_then(seconds_field),
    };

    if reply.next_action.is_none() && reply.should_retry.is_none() {
        return Err(AppError::ProviderResponse(
            "reply has neither next_action nor should_retry".to_string(),
        ));
    }
    Ok(reply)
}

/// First JSON object in free-form text: the whole reply if it parses,
/// otherwise the first `{` from which a complete object can be read.
pub fn extract_json_object(raw: &str) -> Option<Map<String, Value>> {
    let raw = raw.trim();
    if let Ok(Value::Object(object)) = serde_json::from_str(raw) {
        return Some(object);
    }

    raw.match_indices('{').find_map(|(start, _)| {
        let mut stream = serde_json::Deserializer::from_str(&raw[start..]).into_iter::<Value>();
        match stream.next() {
            Some(Ok(Value::Object(object))) => Some(object),
            _ => None,
        }
    })
}

fn text_field(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
        other => Some(other.to_string()),
    }
}

fn bool_field(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.trim().to_lowercase().as_str() {
            "true" | "yes" => Some(true),
            "false" | "no" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn seconds_field(value: &Value) -> Option<u64> {
    let seconds = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    (seconds.is_finite() && seconds >= 0.0).then(|| seconds.round() as u64)
}
