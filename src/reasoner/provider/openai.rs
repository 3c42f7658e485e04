use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::config::ReasonerConfig;
use crate::error::{AppError, Result};
use crate::reasoner::prompt;
use crate::reasoner::provider::{check_status, http_client, ReasoningProvider};
use crate::reasoner::types::FailureSummary;

/// OpenAI-compatible chat completions endpoint (vLLM, Ollama, ...).
pub struct OpenAiProvider {
    client: Client,
    endpoint: String,
    api_key: String,
    model: String,
    max_tokens: u32,
    enable_thinking: bool,
}

impl OpenAiProvider {
    pub fn new(config: &ReasonerConfig) -> Result<Self> {
        let base = config.model_server.trim().trim_end_matches('/');
        if base.is_empty() {
            return Err(AppError::Config("reasoner.model_server is empty".to_string()));
        }

        Ok(Self {
            client: http_client(config.timeout_secs)?,
            endpoint: format!("{base}/chat/completions"),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            enable_thinking: config.enable_thinking,
        })
    }

    fn request<'a>(&'a self, system: &'a str, user: &'a str) -> ChatRequest<'a> {
        ChatRequest {
            model: &self.model,
            max_tokens: self.max_tokens,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: user,
                },
            ],
            chat_template_kwargs: TemplateKwargs {
                enable_thinking: self.enable_thinking,
            },
        }
    }
}

#[async_trait]
impl ReasoningProvider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    async fn send(&self, summary: &FailureSummary) -> Result<String> {
        let system = prompt::system_prompt(false);
        let user = prompt::failure_message(summary)?;

        tracing::debug!(endpoint = %self.endpoint, model = %self.model, "Requesting chat completion");

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&self.request(&system, &user))
            .send()
            .await?;
        let body: ChatResponse = check_status(self.name(), response).await?.json().await?;

        completion_text(body)
    }
}

fn completion_text(body: ChatResponse) -> Result<String> {
    let content = body
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .unwrap_or_default();

    // Thinking models may prepend their reasoning in a <think> block
    let answer = match content.rfind("</think>") {
        Some(end) => &content[end + "</think>".len()..],
        None => content.as_str(),
    }
    .trim();

    if answer.is_empty() {
        return Err(AppError::ProviderResponse(
            "completion contained no answer text".to_string(),
        ));
    }
    Ok(answer.to_string())
}

// --- Request types ---

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<ChatMessage<'a>>,
    chat_template_kwargs: TemplateKwargs,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct TemplateKwargs {
    enable_thinking: bool,
}

// --- Response types ---

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}
