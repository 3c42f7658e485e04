use serde_json::{json, Value};

use crate::reasoner::provider::claude::ToolDefinition;
use crate::reasoner::types::FailureCategory;

pub enum ToolOutput {
    /// Normal JSON result returned to the model.
    Success(String),
    /// Error result returned to the model (it can recover).
    Error(String),
}

/// Classifies a failed attempt for the model during the tool-use loop.
pub struct AnalyzeFailureTool;

impl AnalyzeFailureTool {
    pub const NAME: &'static str = "analyze_failure";

    pub fn name(&self) -> &str {
        Self::NAME
    }

    pub fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: Self::NAME.to_string(),
            description: "Analyze a registration attempt and dashboard verification outcome. \
                Returns a failure category and a suggested next action for the retry strategy."
                .to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "action": {
                        "type": "string",
                        "enum": ["register", "verify", "analyze_failure"],
                        "description": "analyze_failure classifies the reason; register and verify echo normalized state"
                    },
                    "reason": {
                        "type": "string",
                        "description": "Failure reason recorded for the attempt"
                    },
                    "dashboard_ok": { "type": "boolean" },
                    "register_success": { "type": "boolean" },
                    "attempt": { "type": "integer" },
                    "max_retries": { "type": "integer" }
                },
                "required": ["action"]
            }),
        }
    }

    pub fn execute(&self, input: &Value) -> ToolOutput {
        let action = input
            .get("action")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_lowercase();
        let flag = |key: &str| input.get(key).and_then(Value::as_bool).unwrap_or(false);

        let result = match action.as_str() {
            "register" => json!({
                "register_success": flag("register_success"),
                "message": "Registration state normalized.",
            }),
            "verify" => json!({
                "dashboard_ok": flag("dashboard_ok"),
                "message": "Dashboard verification state normalized.",
            }),
            "" | "analyze_failure" => analyze(input, flag("dashboard_ok")),
            other => return ToolOutput::Error(format!("Unknown action: {other}")),
        };

        ToolOutput::Success(result.to_string())
    }
}

fn analyze(input: &Value, dashboard_ok: bool) -> Value {
    if dashboard_ok {
        return json!({
            "category": "post_registration_validation",
            "next_action": "Retry with the same flow and capture extra screenshots.",
        });
    }

    let reason = input.get("reason").and_then(Value::as_str).unwrap_or("");
    let attempt = input.get("attempt").and_then(Value::as_u64).unwrap_or(1);
    let max_retries = input.get("max_retries").and_then(Value::as_u64).unwrap_or(3);

    let category = FailureCategory::classify(reason);
    if category == FailureCategory::Unknown && attempt >= max_retries {
        return json!({
            "category": "max_retries_reached",
            "next_action": "Stop retries and escalate with the report artifacts.",
        });
    }

    json!({ "category": tool_category(category), "next_action": category.next_action() })
}

// Category names as the tool reports them
fn tool_category(category: FailureCategory) -> &'static str {
    match category {
        FailureCategory::DuplicateIdentity => "duplicate_email",
        FailureCategory::Timeout => "timeout",
        FailureCategory::Captcha => "captcha",
        FailureCategory::ServerError => "server_error",
        FailureCategory::Unknown => "unknown",
    }
}
