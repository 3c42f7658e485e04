pub mod claude;
pub mod openai;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};

use crate::config::{ProviderKind, ReasonerConfig};
use crate::error::{AppError, Result};
use crate::reasoner::types::FailureSummary;

/// A language model that turns a failure summary into free-form text
/// (expected, but not guaranteed, to contain a JSON decision).
#[async_trait]
pub trait ReasoningProvider: Send + Sync {
    fn name(&self) -> &str;
    async fn send(&self, summary: &FailureSummary) -> Result<String>;
}

pub fn build_provider(config: &ReasonerConfig) -> Result<Arc<dyn ReasoningProvider>> {
    match config.provider {
        ProviderKind::OpenAi => Ok(Arc::new(openai::OpenAiProvider::new(config)?)),
        ProviderKind::Anthropic => Ok(Arc::new(claude::ClaudeProvider::new(config)?)),
    }
}

fn http_client(timeout_secs: u64) -> Result<Client> {
    Ok(Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()?)
}

/// Map a non-success HTTP status to the matching provider error.
async fn check_status(provider: &str, response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    if status == StatusCode::TOO_MANY_REQUESTS {
        return Err(AppError::ProviderRateLimited(format!("{provider}: {body}")));
    }
    Err(AppError::Provider(format!(
        "{provider} API returned {status}: {body}"
    )))
}
