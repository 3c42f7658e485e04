use crate::error::Result;
use crate::reasoner::types::FailureSummary;

pub fn system_prompt(tools_available: bool) -> String {
    format!(
        r#"You are an autonomous tester of a website's user registration flow. You analyze a failed registration attempt and propose the next action.

## Guidelines
- Each retry uses a fresh synthetic identity; the same email is never reused.
- Recommend stopping only when retrying cannot help (for example a CAPTCHA with no test bypass).
- Keep the next action short and concrete.
{tools_section}
## Answer format
Reply with a single JSON object and nothing else:
{{"next_action": "<text>", "should_retry": <true|false>, "retry_delay_seconds": <integer>}}"#,
        tools_section = if tools_available {
            "- You may call the analyze_failure tool with action=analyze_failure to classify the failure.\n"
        } else {
            ""
        }
    )
}

pub fn failure_message(summary: &FailureSummary) -> Result<String> {
    Ok(format!(
        "Analyze the failed registration attempt and propose the next action.\nData: {}",
        serde_json::to_string(summary)?
    ))
}
