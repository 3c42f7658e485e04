pub mod locator;
pub mod playwright;

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::error::Result;

pub use locator::{click_first_match, Locator};

/// Page load milestones a session can wait for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    DomContentLoaded,
    NetworkIdle,
}

impl LoadState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoadState::DomContentLoaded => "domcontentloaded",
            LoadState::NetworkIdle => "networkidle",
        }
    }
}

/// Settings for one isolated browser session.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub headless: bool,
    pub viewport_width: u32,
    pub viewport_height: u32,
    /// Directory the engine records the session video into.
    pub video_dir: PathBuf,
    /// Default bound for every wait inside the page.
    pub timeout_ms: u64,
}

/// Launches isolated browser sessions.
#[async_trait]
pub trait BrowserDriver: Send + Sync {
    /// Open a fresh session with its own profile; nothing is shared with
    /// previously opened sessions.
    async fn open(&self, options: &SessionOptions) -> Result<Box<dyn BrowserSession>>;
}

/// The page-level capabilities the registration flow relies on.
#[async_trait]
pub trait BrowserSession: Send {
    async fn goto(&mut self, url: &str) -> Result<()>;

    /// Number of elements currently matching `locator`.
    async fn count(&mut self, locator: &Locator) -> Result<usize>;

    /// Click the first element matching `locator`.
    async fn click(&mut self, locator: &Locator) -> Result<()>;

    /// Fill the first element matching `locator`.
    async fn fill(&mut self, locator: &Locator, value: &str) -> Result<()>;

    /// Text of the first match, or `None` when nothing matches.
    async fn text_content(&mut self, locator: &Locator) -> Result<Option<String>>;

    async fn current_url(&mut self) -> Result<String>;

    async fn screenshot(&mut self, path: &Path) -> Result<()>;

    /// Wait until the page URL matches the regex `pattern`.
    async fn wait_for_url(&mut self, pattern: &str, timeout_ms: u64) -> Result<()>;

    async fn wait_for_load_state(&mut self, state: LoadState) -> Result<()>;

    /// Release the session. Returns the raw video file, if one was recorded.
    /// Calling it again after a successful close is a no-op.
    async fn close(&mut self) -> Result<Option<PathBuf>>;
}
