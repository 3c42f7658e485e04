use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::config::ReasonerConfig;
use crate::error::{AppError, Result};
use crate::reasoner::prompt;
use crate::reasoner::provider::{check_status, http_client, ReasoningProvider};
use crate::reasoner::tools::{AnalyzeFailureTool, ToolOutput};
use crate::reasoner::types::FailureSummary;

const CLAUDE_API_URL: &str = "https://api.anthropic.com/v1/messages";
const API_VERSION: &str = "2023-06-01";

pub struct ClaudeClient {
    client: Client,
    api_url: String,
    api_key: String,
    model: String,
    max_tokens: u32,
}

impl ClaudeClient {
    pub fn new(client: Client, api_key: &str, model: &str, max_tokens: u32) -> Self {
        Self {
            client,
            api_url: CLAUDE_API_URL.to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
            max_tokens,
        }
    }

    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into();
        self
    }

    pub async fn send_message(&self, request: &MessagesRequest) -> Result<MessagesResponse> {
        let response = self
            .client
            .post(&self.api_url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .header("content-type", "application/json")
            .json(request)
            .send()
            .await?;

        let body = check_status("anthropic", response)
            .await?
            .json::<MessagesResponse>()
            .await?;
        Ok(body)
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn max_tokens(&self) -> u32 {
        self.max_tokens
    }
}

/// Messages API with a bounded tool-use loop around `analyze_failure`.
pub struct ClaudeProvider {
    client: ClaudeClient,
    tool: AnalyzeFailureTool,
    max_turns: u32,
}

impl ClaudeProvider {
    pub fn new(config: &ReasonerConfig) -> Result<Self> {
        let api_key = config.api_key.trim();
        if api_key.is_empty() || api_key == "EMPTY" {
            return Err(AppError::Config(
                "reasoner.api_key is required for the anthropic provider".to_string(),
            ));
        }

        let client = ClaudeClient::new(
            http_client(config.timeout_secs)?,
            api_key,
            &config.model,
            config.max_tokens,
        );
        Ok(Self::with_client(client, config.max_turns))
    }

    pub fn with_client(client: ClaudeClient, max_turns: u32) -> Self {
        Self {
            client,
            tool: AnalyzeFailureTool,
            max_turns: max_turns.max(1),
        }
    }

    fn run_tool(&self, id: &str, name: &str, input: &serde_json::Value) -> ContentBlock {
        let output = if name == self.tool.name() {
            self.tool.execute(input)
        } else {
            ToolOutput::Error(format!("Unknown tool: {name}"))
        };

        match output {
            ToolOutput::Success(content) => {
                tracing::debug!(tool = %name, "Tool succeeded");
                ContentBlock::ToolResult {
                    tool_use_id: id.to_string(),
                    content,
                    is_error: None,
                }
            }
            ToolOutput::Error(error) => {
                tracing::warn!(tool = %name, error = %error, "Tool error");
                ContentBlock::ToolResult {
                    tool_use_id: id.to_string(),
                    content: error,
                    is_error: Some(true),
                }
            }
        }
    }
}

#[async_trait]
impl ReasoningProvider for ClaudeProvider {
    fn name(&self) -> &str {
        "anthropic"
    }

    async fn send(&self, summary: &FailureSummary) -> Result<String> {
        let system = prompt::system_prompt(true);
        let tools = vec![self.tool.definition()];
        let mut messages = vec![Message {
            role: "user".to_string(),
            content: MessageContent::Text(prompt::failure_message(summary)?),
        }];

        for turn in 0..self.max_turns {
            let request = MessagesRequest {
                model: self.client.model().to_string(),
                max_tokens: self.client.max_tokens(),
                system: system.clone(),
                messages: messages.clone(),
                tools: tools.clone(),
            };

            let response = self.client.send_message(&request).await?;

            tracing::debug!(
                turn,
                input_tokens = response.usage.input_tokens,
                output_tokens = response.usage.output_tokens,
                stop_reason = ?response.stop_reason,
                "Claude response"
            );

            match response.stop_reason.as_deref().unwrap_or("unknown") {
                "end_turn" | "stop_sequence" => return Ok(extract_text(&response.content)),
                "tool_use" => {
                    let tool_results: Vec<ContentBlock> = response
                        .content
                        .iter()
                        .filter_map(|block| match block {
                            ContentBlock::ToolUse { id, name, input } => {
                                Some(self.run_tool(id, name, input))
                            }
                            _ => None,
                        })
                        .collect();

                    messages.push(Message {
                        role: "assistant".to_string(),
                        content: MessageContent::Blocks(response.content),
                    });
                    messages.push(Message {
                        role: "user".to_string(),
                        content: MessageContent::Blocks(tool_results),
                    });
                }
                "max_tokens" => {
                    tracing::warn!("Claude response hit max_tokens limit");
                    messages.push(Message {
                        role: "assistant".to_string(),
                        content: MessageContent::Blocks(response.content),
                    });
                    messages.push(Message {
                        role: "user".to_string(),
                        content: MessageContent::Text("Please continue.".to_string()),
                    });
                }
                other => {
                    return Err(AppError::ProviderResponse(format!(
                        "Unexpected stop reason: {other}"
                    )));
                }
            }
        }

        Err(AppError::ProviderResponse(format!(
            "no final answer within {} turns",
            self.max_turns
        )))
    }
}

fn extract_text(content: &[ContentBlock]) -> String {
    content
        .iter()
        .filter_map(|block| {
            if let ContentBlock::Text { text } = block {
                Some(text.as_str())
            } else {
                None
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

// --- Request types ---

#[derive(Debug, Serialize)]
pub struct MessagesRequest {
    pub model: String,
    pub max_tokens: u32,
    pub system: String,
    pub messages: Vec<Message>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDefinition>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: MessageContent,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "tool_use")]
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    #[serde(rename = "tool_result")]
    ToolResult {
        tool_use_id: String,
        content: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        is_error: Option<bool>,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
}

// --- Response types ---

#[derive(Debug, Deserialize)]
pub struct MessagesResponse {
    pub id: String,
    pub content: Vec<ContentBlock>,
    pub stop_reason: Option<String>,
    pub usage: Usage,
}

#[derive(Debug, Deserialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}
