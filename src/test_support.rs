use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use regex::Regex;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use crate::browser::{BrowserDriver, BrowserSession, LoadState, Locator, SessionOptions};
use crate::config::{AppConfig, DashboardConfig};
use crate::error::{AppError, Result};
use crate::probe::executor::{landing_entry_points, registration_entry_points, AttemptRunner};
use crate::probe::types::{ArtifactRefs, AttemptOutcome, FailureKind, Identity, Verdict};
use crate::reasoner::provider::ReasoningProvider;
use crate::reasoner::types::{
    DecisionSource, FailureCategory, FailureSummary, RetryDecision,
};
use crate::reasoner::FailureReasoner;

pub fn probe_config(dir: &Path) -> AppConfig {
    let mut config = AppConfig::default();
    config.probe.base_url = "https://probe.test".to_string();
    config.probe.retry_delay_seconds = 0;
    config.probe.settle_ms = 0;
    config.probe.timeout_ms = 1_000;
    config.artifacts.artifact_dir = dir.join("artifacts");
    config.artifacts.video_dir = dir.join("videos");
    config
}

// --- Browser fakes ---

/// Scripted page: element counts, texts and click-triggered navigation,
/// all keyed by the locator's display form.
#[derive(Debug, Clone, Default)]
pub struct FakePage {
    counts: HashMap<String, usize>,
    texts: HashMap<String, String>,
    navigation: HashMap<String, String>,
    broken_clicks: HashSet<String>,
    stalled: bool,
}

impl FakePage {
    pub fn with_count(mut self, locator: &Locator, count: usize) -> Self {
        self.counts.insert(locator.to_string(), count);
        self
    }

    pub fn with_text(mut self, locator: &Locator, text: &str) -> Self {
        self.texts.insert(locator.to_string(), text.to_string());
        self
    }

    /// Clicking `locator` moves the page to `url`.
    pub fn with_navigation(mut self, locator: &Locator, url: &str) -> Self {
        self.navigation.insert(locator.to_string(), url.to_string());
        self
    }

    pub fn with_broken_click(mut self, locator: &Locator) -> Self {
        self.broken_clicks.insert(locator.to_string());
        self
    }

    /// Only the first click-triggered navigation happens.
    pub fn stalled(mut self) -> Self {
        self.stalled = true;
        self
    }

    /// A dashboard satisfying `contract` with `direct_children` menu items.
    pub fn dashboard(contract: &DashboardConfig, direct_children: usize) -> Self {
        let primary = Locator::css(&contract.primary);
        let menu = primary.within(&contract.secondary);
        Self::default()
            .with_count(&primary, 1)
            .with_count(&menu, 1)
            .with_count(&menu.within(":scope > *"), direct_children)
            .with_count(&Locator::css(&contract.action), 1)
    }

    /// The whole happy path: landing, login, signup form, then `post_submit_url`.
    pub fn registration_flow(config: &AppConfig, post_submit_url: &str) -> Self {
        let landing = landing_entry_points().remove(0);
        let registration = registration_entry_points().remove(0);
        let submit = Locator::css(&config.selectors.submit);

        Self::dashboard(&config.dashboard, 3)
            .with_count(&landing, 1)
            .with_navigation(&landing, &format!("{}/en/generate", config.base_url()))
            .with_count(&registration, 1)
            .with_navigation(&registration, &config.register_url())
            .with_count(&Locator::css(&config.selectors.email), 1)
            .with_count(&Locator::css(&config.selectors.password), 1)
            .with_count(&Locator::css(&config.selectors.name), 1)
            .with_count(&submit, 1)
            .with_navigation(&submit, post_submit_url)
    }
}

#[derive(Debug, Clone, Default)]
pub struct FakeLog {
    pub opened: u32,
    pub closed: u32,
    pub clicks: Vec<String>,
    pub fills: Vec<(String, String)>,
    pub screenshots: Vec<PathBuf>,
}

pub struct FakeDriver {
    pages: Mutex<VecDeque<FakePage>>,
    log: Arc<Mutex<FakeLog>>,
    fail_launch: bool,
}

impl FakeDriver {
    pub fn new(pages: Vec<FakePage>) -> Self {
        Self {
            pages: Mutex::new(pages.into()),
            log: Arc::new(Mutex::new(FakeLog::default())),
            fail_launch: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            fail_launch: true,
            ..Self::new(Vec::new())
        }
    }

    pub fn log(&self) -> FakeLog {
        self.log.lock().unwrap().clone()
    }
}

#[async_trait]
impl BrowserDriver for FakeDriver {
    async fn open(&self, options: &SessionOptions) -> Result<Box<dyn BrowserSession>> {
        if self.fail_launch {
            return Err(AppError::Browser("browser executable not found".to_string()));
        }

        let index = {
            let mut log = self.log.lock().unwrap();
            log.opened += 1;
            log.opened
        };
        let page = self.pages.lock().unwrap().pop_front().unwrap_or_default();

        Ok(Box::new(FakeSession {
            page,
            url: "about:blank".to_string(),
            navigations: 0,
            video: options.video_dir.join(format!("raw-{index}.webm")),
            log: Arc::clone(&self.log),
            closed: false,
        }))
    }
}

struct FakeSession {
    page: FakePage,
    url: String,
    navigations: u32,
    video: PathBuf,
    log: Arc<Mutex<FakeLog>>,
    closed: bool,
}

impl FakeSession {
    fn count_of(&self, locator: &Locator) -> usize {
        self.page.counts.get(&locator.to_string()).copied().unwrap_or(0)
    }

    fn require(&self, locator: &Locator) -> Result<()> {
        if self.count_of(locator) == 0 {
            return Err(AppError::ElementNotFound(locator.to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl BrowserSession for FakeSession {
    async fn goto(&mut self, url: &str) -> Result<()> {
        self.url = url.to_string();
        Ok(())
    }

    async fn count(&mut self, locator: &Locator) -> Result<usize> {
        Ok(self.count_of(locator))
    }

    async fn click(&mut self, locator: &Locator) -> Result<()> {
        let key = locator.to_string();
        if self.page.broken_clicks.contains(&key) {
            return Err(AppError::Browser(format!("element detached: {key}")));
        }
        self.require(locator)?;
        self.log.lock().unwrap().clicks.push(key.clone());

        if let Some(url) = self.page.navigation.get(&key) {
            if !(self.page.stalled && self.navigations > 0) {
                self.url = url.clone();
                self.navigations += 1;
            }
        }
        Ok(())
    }

    async fn fill(&mut self, locator: &Locator, value: &str) -> Result<()> {
        self.require(locator)?;
        self.log
            .lock()
            .unwrap()
            .fills
            .push((locator.to_string(), value.to_string()));
        Ok(())
    }

    async fn text_content(&mut self, locator: &Locator) -> Result<Option<String>> {
        Ok(self.page.texts.get(&locator.to_string()).cloned())
    }

    async fn current_url(&mut self) -> Result<String> {
        Ok(self.url.clone())
    }

    async fn screenshot(&mut self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, b"\x89PNG").await?;
        self.log.lock().unwrap().screenshots.push(path.to_path_buf());
        Ok(())
    }

    async fn wait_for_url(&mut self, pattern: &str, timeout_ms: u64) -> Result<()> {
        if Regex::new(pattern)?.is_match(&self.url) {
            return Ok(());
        }
        Err(AppError::BrowserTimeout(format!(
            "waiting for URL matching {pattern}: Timeout {timeout_ms}ms exceeded."
        )))
    }

    async fn wait_for_load_state(&mut self, _state: LoadState) -> Result<()> {
        Ok(())
    }

    async fn close(&mut self) -> Result<Option<PathBuf>> {
        if self.closed {
            return Ok(None);
        }
        self.closed = true;
        self.log.lock().unwrap().closed += 1;

        if let Some(parent) = self.video.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&self.video, b"webm").await?;
        Ok(Some(self.video.clone()))
    }
}

// --- Probe and reasoner fakes ---

pub fn failed_outcome(attempt: u32, reason: &str) -> AttemptOutcome {
    AttemptOutcome::failure(
        attempt,
        &identity(attempt),
        FailureKind::UnhandledError,
        reason,
        Some("https://probe.test/en/user/register".to_string()),
        None,
        ArtifactRefs::default(),
    )
}

pub fn timeout_summary() -> FailureSummary {
    FailureSummary::new(&failed_outcome(1, "Timeout: slow"), 1, 3)
}

fn identity(n: u32) -> Identity {
    Identity {
        display_name: "Test User".to_string(),
        email: format!("test+{n:010}@example.com"),
        password: "Aa1!aaaaaaaaaa".to_string(),
    }
}

/// Plays back a fixed list of attempt results; `None` means success.
pub struct ScriptedRunner {
    script: Vec<Option<String>>,
    calls: AtomicU32,
}

impl ScriptedRunner {
    pub fn new(script: Vec<Option<&str>>) -> Self {
        Self {
            script: script.into_iter().map(|s| s.map(str::to_string)).collect(),
            calls: AtomicU32::new(0),
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AttemptRunner for ScriptedRunner {
    async fn run_attempt(&self, _run_id: &str, attempt_number: u32, identity: &Identity) -> AttemptOutcome {
        let index = self.calls.fetch_add(1, Ordering::SeqCst) as usize;
        match self.script.get(index) {
            Some(None) => AttemptOutcome::success(
                attempt_number,
                identity,
                "https://probe.test/en/generate".to_string(),
                Verdict {
                    ok: true,
                    ..Default::default()
                },
                ArtifactRefs::default(),
            ),
            Some(Some(reason)) => AttemptOutcome::failure(
                attempt_number,
                identity,
                FailureKind::UnhandledError,
                reason.as_str(),
                None,
                None,
                ArtifactRefs::default(),
            ),
            None => AttemptOutcome::failure(
                attempt_number,
                identity,
                FailureKind::UnhandledError,
                "script exhausted",
                None,
                None,
                ArtifactRefs::default(),
            ),
        }
    }
}

/// Always returns the same decision.
pub struct FixedReasoner(RetryDecision);

impl FixedReasoner {
    pub fn retry_after(delay_seconds: u64) -> Self {
        Self(RetryDecision {
            next_action_text: "Wait and retry.".to_string(),
            should_retry: true,
            retry_delay_seconds: delay_seconds,
            source: DecisionSource::Delegated,
            category: FailureCategory::Unknown,
            provider_error: None,
            raw_response: None,
        })
    }

    pub fn stop(next_action: &str) -> Self {
        Self(RetryDecision {
            next_action_text: next_action.to_string(),
            should_retry: false,
            retry_delay_seconds: 0,
            source: DecisionSource::Delegated,
            category: FailureCategory::Unknown,
            provider_error: None,
            raw_response: None,
        })
    }
}

#[async_trait]
impl FailureReasoner for FixedReasoner {
    async fn decide(&self, _outcome: &AttemptOutcome, _attempt: u32, _max_attempts: u32) -> RetryDecision {
        self.0.clone()
    }
}

pub struct ScriptedProvider(std::result::Result<String, String>);

impl ScriptedProvider {
    pub fn replying(text: &str) -> Self {
        Self(Ok(text.to_string()))
    }

    pub fn failing(error: &str) -> Self {
        Self(Err(error.to_string()))
    }
}

#[async_trait]
impl ReasoningProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn send(&self, _summary: &FailureSummary) -> Result<String> {
        self.0.clone().map_err(AppError::Provider)
    }
}

// --- HTTP responder ---

/// Serve one canned response per connection, in order. The handle yields
/// the raw requests that were received.
pub async fn serve_sequence(responses: Vec<(u16, String)>) -> (String, JoinHandle<Vec<String>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}", listener.local_addr().unwrap());

    let handle = tokio::spawn(async move {
        let mut requests = Vec::new();
        for (status, body) in responses {
            let (mut stream, _) = listener.accept().await.unwrap();
            requests.push(read_request(&mut stream).await);

            let response = format!(
                "HTTP/1.1 {status} Canned\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            stream.write_all(response.as_bytes()).await.unwrap();
            stream.shutdown().await.ok();
        }
        requests
    });

    (url, handle)
}

pub async fn serve_once(status: u16, body: &str) -> (String, JoinHandle<String>) {
    let (url, sequence) = serve_sequence(vec![(status, body.to_string())]).await;
    let handle = tokio::spawn(async move {
        sequence.await.unwrap().into_iter().next().unwrap_or_default()
    });
    (url, handle)
}

async fn read_request(stream: &mut tokio::net::TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];

    loop {
        let n = stream.read(&mut chunk).await.unwrap();
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);

        let text = String::from_utf8_lossy(&buf);
        if let Some(header_end) = text.find("\r\n\r\n") {
            let body_len = text[..header_end]
                .lines()
                .find_map(|line| {
                    let (name, value) = line.split_once(':')?;
                    name.trim()
                        .eq_ignore_ascii_case("content-length")
                        .then(|| value.trim().parse::<usize>().ok())
                        .flatten()
                })
                .unwrap_or(0);
            if buf.len() >= header_end + 4 + body_len {
                break;
            }
        }
    }

    String::from_utf8_lossy(&buf).into_owned()
}
