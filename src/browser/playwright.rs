use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};

use super::{BrowserDriver, BrowserSession, LoadState, Locator, SessionOptions};
use crate::config::BrowserConfig;
use crate::error::{AppError, Result};

const BRIDGE_SCRIPT: &str = include_str!("bridge.js");
const OPTIONS_ENV: &str = "REGPROBE_BRIDGE_OPTIONS";

/// Slack on top of in-page timeouts before the sidecar is considered hung.
const RESPONSE_GRACE: Duration = Duration::from_secs(10);
const LAUNCH_TIMEOUT: Duration = Duration::from_secs(60);

/// Playwright-backed sessions. Each session is a Node.js sidecar running the
/// embedded bridge script with its own browser and context, so sessions never
/// share cookies or storage. Requests and replies are single JSON lines on the
/// sidecar's stdin/stdout; its stderr is passed through.
pub struct PlaywrightDriver {
    node_binary: String,
    working_dir: Option<PathBuf>,
}

impl PlaywrightDriver {
    pub fn new(config: &BrowserConfig) -> Self {
        Self {
            node_binary: config.node_binary.clone(),
            working_dir: config.working_dir.clone(),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct BridgeOptions<'a> {
    headless: bool,
    viewport_width: u32,
    viewport_height: u32,
    video_dir: &'a Path,
    timeout_ms: u64,
}

#[async_trait]
impl BrowserDriver for PlaywrightDriver {
    async fn open(&self, options: &SessionOptions) -> Result<Box<dyn BrowserSession>> {
        // The sidecar may run in another directory, so hand it absolute paths.
        let video_dir = absolute(&options.video_dir)?;
        tokio::fs::create_dir_all(&video_dir).await?;

        let bridge_options = serde_json::to_string(&BridgeOptions {
            headless: options.headless,
            viewport_width: options.viewport_width,
            viewport_height: options.viewport_height,
            video_dir: &video_dir,
            timeout_ms: options.timeout_ms,
        })?;

        let mut command = Command::new(&self.node_binary);
        command
            .arg("-e")
            .arg(BRIDGE_SCRIPT)
            .env(OPTIONS_ENV, bridge_options)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        if let Some(dir) = &self.working_dir {
            command.current_dir(dir);
        }

        let mut child = command.spawn().map_err(|e| {
            AppError::Browser(format!("Failed to spawn `{}`: {e}", self.node_binary))
        })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| AppError::Browser("Sidecar stdin unavailable".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| AppError::Browser("Sidecar stdout unavailable".to_string()))?;

        let mut session = PlaywrightSession {
            child,
            stdin,
            lines: BufReader::new(stdout).lines(),
            next_id: 0,
            response_timeout: Duration::from_millis(options.timeout_ms) + RESPONSE_GRACE,
            closed: false,
        };
        session.wait_ready().await?;

        tracing::debug!(pid = ?session.child.id(), "Playwright session ready");
        Ok(Box::new(session))
    }
}

// --- Wire types ---

#[derive(Debug, Serialize)]
#[serde(tag = "op", rename_all = "camelCase")]
enum Request<'a> {
    Goto {
        url: &'a str,
    },
    Count {
        locator: &'a Locator,
    },
    Click {
        locator: &'a Locator,
    },
    Fill {
        locator: &'a Locator,
        value: &'a str,
    },
    TextContent {
        locator: &'a Locator,
    },
    CurrentUrl,
    Screenshot {
        path: &'a Path,
    },
    WaitForUrl {
        pattern: &'a str,
        #[serde(rename = "timeoutMs")]
        timeout_ms: u64,
    },
    WaitForLoadState {
        state: &'static str,
    },
    Close,
}

#[derive(Debug, Serialize)]
struct Envelope<'a> {
    id: u64,
    #[serde(flatten)]
    request: Request<'a>,
}

#[derive(Debug, Deserialize)]
struct Reply {
    #[serde(default)]
    id: Option<u64>,
    #[serde(default)]
    ready: Option<bool>,
    #[serde(default)]
    ok: bool,
    #[serde(default)]
    value: serde_json::Value,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    timeout: bool,
}

pub struct PlaywrightSession {
    child: Child,
    stdin: ChildStdin,
    lines: Lines<BufReader<ChildStdout>>,
    next_id: u64,
    response_timeout: Duration,
    closed: bool,
}

impl PlaywrightSession {
    async fn wait_ready(&mut self) -> Result<()> {
        let reply = self.read_reply(LAUNCH_TIMEOUT).await?;
        match reply.ready {
            Some(true) => Ok(()),
            _ => Err(AppError::Browser(format!(
                "Browser failed to launch: {}",
                reply.error.unwrap_or_else(|| "no ready signal".to_string())
            ))),
        }
    }

    async fn read_reply(&mut self, limit: Duration) -> Result<Reply> {
        loop {
            let line = tokio::time::timeout(limit, self.lines.next_line())
                .await
                .map_err(|_| {
                    AppError::BrowserTimeout(format!(
                        "No response from browser sidecar within {}ms",
                        limit.as_millis()
                    ))
                })??
                .ok_or_else(|| AppError::Browser("Browser sidecar exited unexpectedly".to_string()))?;

            match serde_json::from_str::<Reply>(&line) {
                Ok(reply) => return Ok(reply),
                Err(_) => tracing::debug!(line = %line, "Ignoring non-protocol sidecar output"),
            }
        }
    }

    async fn call(&mut self, request: Request<'_>) -> Result<serde_json::Value> {
        if self.closed {
            return Err(AppError::Browser("Session already closed".to_string()));
        }

        self.next_id += 1;
        let id = self.next_id;
        let mut line = serde_json::to_string(&Envelope { id, request })?;
        line.push('\n');
        self.stdin.write_all(line.as_bytes()).await?;
        self.stdin.flush().await?;

        loop {
            let reply = self.read_reply(self.response_timeout).await?;
            if reply.id != Some(id) {
                tracing::debug!(expected = id, got = ?reply.id, "Skipping stale sidecar reply");
                continue;
            }
            if reply.ok {
                return Ok(reply.value);
            }

            let message = reply
                .error
                .unwrap_or_else(|| "Unknown sidecar error".to_string());
            return Err(if reply.timeout {
                AppError::BrowserTimeout(message)
            } else {
                AppError::Browser(message)
            });
        }
    }
}

#[async_trait]
impl BrowserSession for PlaywrightSession {
    async fn goto(&mut self, url: &str) -> Result<()> {
        self.call(Request::Goto { url }).await.map(|_| ())
    }

    async fn count(&mut self, locator: &Locator) -> Result<usize> {
        let value = self.call(Request::Count { locator }).await?;
        value
            .as_u64()
            .map(|n| n as usize)
            .ok_or_else(|| AppError::Browser(format!("Unexpected count reply: {value}")))
    }

    async fn click(&mut self, locator: &Locator) -> Result<()> {
        self.call(Request::Click { locator }).await.map(|_| ())
    }

    async fn fill(&mut self, locator: &Locator, value: &str) -> Result<()> {
        self.call(Request::Fill { locator, value }).await.map(|_| ())
    }

    async fn text_content(&mut self, locator: &Locator) -> Result<Option<String>> {
        let value = self.call(Request::TextContent { locator }).await?;
        Ok(value.as_str().map(str::to_string))
    }

    async fn current_url(&mut self) -> Result<String> {
        let value = self.call(Request::CurrentUrl).await?;
        value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| AppError::Browser(format!("Unexpected URL reply: {value}")))
    }

    async fn screenshot(&mut self, path: &Path) -> Result<()> {
        let path = absolute(path)?;
        self.call(Request::Screenshot { path: &path }).await.map(|_| ())
    }

    async fn wait_for_url(&mut self, pattern: &str, timeout_ms: u64) -> Result<()> {
        self.call(Request::WaitForUrl {
            pattern,
            timeout_ms,
        })
        .await
        .map(|_| ())
    }

    async fn wait_for_load_state(&mut self, state: LoadState) -> Result<()> {
        self.call(Request::WaitForLoadState {
            state: state.as_str(),
        })
        .await
        .map(|_| ())
    }

    async fn close(&mut self) -> Result<Option<PathBuf>> {
        if self.closed {
            return Ok(None);
        }

        let result = self.call(Request::Close).await;
        self.closed = true;

        match tokio::time::timeout(RESPONSE_GRACE, self.child.wait()).await {
            Ok(Ok(status)) => tracing::debug!(%status, "Browser sidecar exited"),
            _ => {
                tracing::warn!("Browser sidecar did not exit cleanly, killing it");
                let _ = self.child.kill().await;
            }
        }

        let value = result?;
        Ok(value.as_str().map(PathBuf::from))
    }
}

fn absolute(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}
