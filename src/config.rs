use regex::Regex;
use serde::Deserialize;
use std::path::PathBuf;

use crate::error::{AppError, Result};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub probe: ProbeConfig,
    #[serde(default)]
    pub browser: BrowserConfig,
    #[serde(default)]
    pub artifacts: ArtifactsConfig,
    #[serde(default)]
    pub selectors: SelectorsConfig,
    #[serde(default)]
    pub dashboard: DashboardConfig,
    #[serde(default)]
    pub identity: IdentityConfig,
    #[serde(default)]
    pub reasoner: ReasonerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ProbeConfig {
    #[serde(default)]
    pub base_url: String,
    #[serde(default = "default_register_path")]
    pub register_path: String,
    #[serde(default = "default_generate_url_pattern")]
    pub generate_url_pattern: String,
    #[serde(default = "default_register_path")]
    pub register_url_pattern: String,
    #[serde(default = "default_generate_url_pattern")]
    pub dashboard_url_pattern: String,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_delay_seconds")]
    pub retry_delay_seconds: u64,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Pause after network-idle so client-side redirects can land.
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BrowserConfig {
    #[serde(default = "default_node_binary")]
    pub node_binary: String,
    #[serde(default = "default_true")]
    pub headless: bool,
    #[serde(default = "default_viewport_width")]
    pub viewport_width: u32,
    #[serde(default = "default_viewport_height")]
    pub viewport_height: u32,
    /// Directory the Playwright sidecar runs in; `playwright` is resolved from here.
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ArtifactsConfig {
    #[serde(default = "default_artifact_dir")]
    pub artifact_dir: PathBuf,
    #[serde(default = "default_video_dir")]
    pub video_dir: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SelectorsConfig {
    #[serde(default = "default_email_selector")]
    pub email: String,
    #[serde(default = "default_password_selector")]
    pub password: String,
    #[serde(default = "default_name_selector")]
    pub name: String,
    #[serde(default = "default_submit_selector")]
    pub submit: String,
    #[serde(default = "default_error_selector")]
    pub error: String,
}

/// Structural contract the dashboard must satisfy after a successful signup.
#[derive(Debug, Deserialize, Clone)]
pub struct DashboardConfig {
    #[serde(default = "default_primary_selector")]
    pub primary: String,
    #[serde(default = "default_secondary_selector")]
    pub secondary: String,
    #[serde(default = "default_action_selector")]
    pub action: String,
    #[serde(default = "default_fallback_items_selector")]
    pub fallback_items: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct IdentityConfig {
    #[serde(default = "default_email_prefix")]
    pub email_prefix: String,
    #[serde(default = "default_email_domain")]
    pub email_domain: String,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// OpenAI-compatible `/chat/completions` endpoint (vLLM, Ollama, ...).
    #[default]
    OpenAi,
    /// Anthropic Messages API.
    Anthropic,
}

#[derive(Deserialize, Clone)]
pub struct ReasonerConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub provider: ProviderKind,
    #[serde(default = "default_model_server")]
    pub model_server: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_api_key")]
    pub api_key: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_true")]
    pub enable_thinking: bool,
    #[serde(default = "default_max_turns")]
    pub max_turns: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Upper bound applied to provider-suggested retry delays.
    #[serde(default = "default_max_delay_seconds")]
    pub max_delay_seconds: u64,
}

// Manual Debug impl to avoid leaking the API key
impl std::fmt::Debug for ReasonerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReasonerConfig")
            .field("enabled", &self.enabled)
            .field("provider", &self.provider)
            .field("model_server", &self.model_server)
            .field("model", &self.model)
            .field("api_key", &"[REDACTED]")
            .field("max_tokens", &self.max_tokens)
            .field("enable_thinking", &self.enable_thinking)
            .field("max_turns", &self.max_turns)
            .field("timeout_secs", &self.timeout_secs)
            .field("max_delay_seconds", &self.max_delay_seconds)
            .finish()
    }
}

/// Values given on the command line; they win over file and environment.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub base_url: Option<String>,
    pub register_path: Option<String>,
    pub max_retries: Option<u32>,
    pub timeout_ms: Option<u64>,
    pub headed: bool,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            register_path: default_register_path(),
            generate_url_pattern: default_generate_url_pattern(),
            register_url_pattern: default_register_path(),
            dashboard_url_pattern: default_generate_url_pattern(),
            max_retries: default_max_retries(),
            retry_delay_seconds: default_retry_delay_seconds(),
            timeout_ms: default_timeout_ms(),
            settle_ms: default_settle_ms(),
        }
    }
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            node_binary: default_node_binary(),
            headless: true,
            viewport_width: default_viewport_width(),
            viewport_height: default_viewport_height(),
            working_dir: None,
        }
    }
}

impl Default for ArtifactsConfig {
    fn default() -> Self {
        Self {
            artifact_dir: default_artifact_dir(),
            video_dir: default_video_dir(),
        }
    }
}

impl Default for SelectorsConfig {
    fn default() -> Self {
        Self {
            email: default_email_selector(),
            password: default_password_selector(),
            name: default_name_selector(),
            submit: default_submit_selector(),
            error: default_error_selector(),
        }
    }
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            primary: default_primary_selector(),
            secondary: default_secondary_selector(),
            action: default_action_selector(),
            fallback_items: default_fallback_items_selector(),
        }
    }
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            email_prefix: default_email_prefix(),
            email_domain: default_email_domain(),
        }
    }
}

impl Default for ReasonerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            provider: ProviderKind::default(),
            model_server: default_model_server(),
            model: default_model(),
            api_key: default_api_key(),
            max_tokens: default_max_tokens(),
            enable_thinking: true,
            max_turns: default_max_turns(),
            timeout_secs: default_timeout_secs(),
            max_delay_seconds: default_max_delay_seconds(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_register_path() -> String {
    "/en/user/register".to_string()
}

fn default_generate_url_pattern() -> String {
    "/en/generate".to_string()
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay_seconds() -> u64 {
    3
}

fn default_timeout_ms() -> u64 {
    30_000
}

fn default_settle_ms() -> u64 {
    1_500
}

fn default_node_binary() -> String {
    "node".to_string()
}

fn default_viewport_width() -> u32 {
    1366
}

fn default_viewport_height() -> u32 {
    768
}

fn default_artifact_dir() -> PathBuf {
    PathBuf::from("artifacts")
}

fn default_video_dir() -> PathBuf {
    PathBuf::from("test_recordings")
}

fn default_email_selector() -> String {
    r#"input[name="email"]"#.to_string()
}

fn default_password_selector() -> String {
    r#"input[name="password"]"#.to_string()
}

fn default_name_selector() -> String {
    r#"input[name="name"]"#.to_string()
}

fn default_submit_selector() -> String {
    r#"button[type="submit"]"#.to_string()
}

fn default_error_selector() -> String {
    ".error-message, .alert-danger, [role='alert']".to_string()
}

fn default_primary_selector() -> String {
    "div.model-select.dropdown".to_string()
}

fn default_secondary_selector() -> String {
    ".dropdown-menu".to_string()
}

fn default_action_selector() -> String {
    "button#generateButton".to_string()
}

fn default_fallback_items_selector() -> String {
    "li, a, button, div".to_string()
}

fn default_email_prefix() -> String {
    "test".to_string()
}

fn default_email_domain() -> String {
    "example.com".to_string()
}

fn default_model_server() -> String {
    "http://localhost:11434/v1".to_string()
}

fn default_model() -> String {
    "Qwen/Qwen3-14B".to_string()
}

fn default_api_key() -> String {
    "EMPTY".to_string()
}

fn default_max_tokens() -> u32 {
    512
}

fn default_max_turns() -> u32 {
    4
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_max_delay_seconds() -> u64 {
    300
}

impl AppConfig {
    /// Load configuration from an optional file, `REGPROBE__*` environment
    /// variables and command-line overrides, then validate it.
    pub fn load(config_path: Option<&str>, overrides: &Overrides) -> Result<Self> {
        let mut builder = config::Config::builder();

        // Load from file if specified
        if let Some(path) = config_path {
            builder = builder.add_source(config::File::with_name(path));
        } else {
            // Try default paths
            builder = builder.add_source(config::File::with_name("regprobe").required(false));
        }

        // Environment variable overrides with REGPROBE__ prefix
        builder = builder.add_source(
            config::Environment::with_prefix("REGPROBE")
                .separator("__")
                .try_parsing(true),
        );

        builder = builder
            .set_override_option("probe.base_url", overrides.base_url.clone())
            .and_then(|b| b.set_override_option("probe.register_path", overrides.register_path.clone()))
            .and_then(|b| b.set_override_option("probe.max_retries", overrides.max_retries.map(i64::from)))
            .and_then(|b| {
                b.set_override_option(
                    "probe.timeout_ms",
                    overrides.timeout_ms.and_then(|v| i64::try_from(v).ok()),
                )
            })
            .map_err(|e| AppError::Config(e.to_string()))?;

        if overrides.headed {
            builder = builder
                .set_override("browser.headless", false)
                .map_err(|e| AppError::Config(e.to_string()))?;
        }

        let config: AppConfig = builder
            .build()
            .map_err(|e| AppError::Config(e.to_string()))?
            .try_deserialize()
            .map_err(|e| AppError::Config(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Reject settings that would make every attempt meaningless.
    pub fn validate(&self) -> Result<()> {
        let base_url = self.probe.base_url.trim();
        if base_url.is_empty() {
            return Err(AppError::Config(
                "probe.base_url is required (config file, REGPROBE__PROBE__BASE_URL or --base-url)"
                    .to_string(),
            ));
        }
        reqwest::Url::parse(base_url)
            .map_err(|e| AppError::Config(format!("probe.base_url is not a valid URL: {e}")))?;

        if self.probe.max_retries == 0 {
            return Err(AppError::Config(
                "probe.max_retries must be at least 1".to_string(),
            ));
        }
        if self.probe.timeout_ms == 0 {
            return Err(AppError::Config(
                "probe.timeout_ms must be greater than 0".to_string(),
            ));
        }

        for (key, pattern) in [
            ("probe.generate_url_pattern", &self.probe.generate_url_pattern),
            ("probe.register_url_pattern", &self.probe.register_url_pattern),
            ("probe.dashboard_url_pattern", &self.probe.dashboard_url_pattern),
        ] {
            Regex::new(pattern).map_err(|e| AppError::Config(format!("{key}: {e}")))?;
        }

        Ok(())
    }

    pub fn base_url(&self) -> &str {
        self.probe.base_url.trim().trim_end_matches('/')
    }

    pub fn register_url(&self) -> String {
        format!("{}{}", self.base_url(), self.probe.register_path)
    }
}
