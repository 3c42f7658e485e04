use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Browser error: {0}")]
    Browser(String),

    #[error("Browser timeout: {0}")]
    BrowserTimeout(String),

    #[error("Element not found: {0}")]
    ElementNotFound(String),

    #[error("Reasoning provider error: {0}")]
    Provider(String),

    #[error("Reasoning provider rate limited: {0}")]
    ProviderRateLimited(String),

    #[error("Unusable provider response: {0}")]
    ProviderResponse(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<regex::Error> for AppError {
    fn from(e: regex::Error) -> Self {
        AppError::Config(format!("Invalid URL pattern: {e}"))
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
