use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;

use crate::browser::{click_first_match, BrowserDriver, BrowserSession, LoadState, Locator, SessionOptions};
use crate::config::{AppConfig, SelectorsConfig};
use crate::error::{AppError, Result};
use crate::probe::types::{ArtifactRefs, AttemptOutcome, FailureKind, Identity, Verdict};
use crate::probe::verifier::DashboardVerifier;

const DEFAULT_VIDEO_EXTENSION: &str = "webm";

/// Runs one registration attempt and reports what happened. Failures inside
/// the attempt are folded into the returned outcome, never raised.
#[async_trait]
pub trait AttemptRunner: Send + Sync {
    async fn run_attempt(&self, run_id: &str, attempt_number: u32, identity: &Identity) -> AttemptOutcome;
}

/// Entry points on the landing page, most specific first.
pub fn landing_entry_points() -> Vec<Locator> {
    vec![
        Locator::role("button", "Generate Image"),
        Locator::role("link", "Generate Image"),
        Locator::role("button", "Generate Video"),
        Locator::role("link", "Generate Video"),
        Locator::text("Generate Image"),
        Locator::text("Generate Video"),
    ]
}

/// Links from the login screen to the signup form, most specific first.
pub fn registration_entry_points() -> Vec<Locator> {
    vec![
        Locator::role("link", "Registration"),
        Locator::css("a:has-text('Registration')"),
        Locator::text("Registration"),
    ]
}

/// What the page looked like right after the form was submitted.
struct Submission {
    final_url: String,
    url_matched: bool,
    verdict: Verdict,
    error_text: Option<String>,
}

pub struct AttemptExecutor {
    driver: Arc<dyn BrowserDriver>,
    verifier: DashboardVerifier,
    base_url: String,
    generate_url_pattern: String,
    register_url_pattern: String,
    dashboard_url: Regex,
    selectors: SelectorsConfig,
    timeout_ms: u64,
    settle: Duration,
    session_options: SessionOptions,
    artifact_dir: PathBuf,
    video_dir: PathBuf,
}

impl AttemptExecutor {
    pub fn new(config: &AppConfig, driver: Arc<dyn BrowserDriver>) -> Result<Self> {
        Ok(Self {
            driver,
            verifier: DashboardVerifier::new(&config.dashboard),
            base_url: config.base_url().to_string(),
            generate_url_pattern: config.probe.generate_url_pattern.clone(),
            register_url_pattern: config.probe.register_url_pattern.clone(),
            dashboard_url: Regex::new(&config.probe.dashboard_url_pattern)?,
            selectors: config.selectors.clone(),
            timeout_ms: config.probe.timeout_ms,
            settle: Duration::from_millis(config.probe.settle_ms),
            session_options: SessionOptions {
                headless: config.browser.headless,
                viewport_width: config.browser.viewport_width,
                viewport_height: config.browser.viewport_height,
                video_dir: config.artifacts.video_dir.clone(),
                timeout_ms: config.probe.timeout_ms,
            },
            artifact_dir: config.artifacts.artifact_dir.clone(),
            video_dir: config.artifacts.video_dir.clone(),
        })
    }

    /// Steps from the landing page through form submission.
    async fn drive(
        &self,
        session: &mut dyn BrowserSession,
        identity: &Identity,
        artifacts: &mut ArtifactRefs,
    ) -> Result<Submission> {
        session.goto(&self.base_url).await?;

        if click_first_match(session, &landing_entry_points()).await.is_none() {
            return Err(AppError::ElementNotFound(
                "Cannot find 'Generate Image' or 'Generate Video' on landing page.".to_string(),
            ));
        }
        session.wait_for_load_state(LoadState::DomContentLoaded).await?;
        session
            .wait_for_url(&self.generate_url_pattern, self.timeout_ms)
            .await?;

        if click_first_match(session, &registration_entry_points()).await.is_none() {
            return Err(AppError::ElementNotFound(
                "Cannot find 'Registration' link on login screen.".to_string(),
            ));
        }
        session.wait_for_load_state(LoadState::DomContentLoaded).await?;
        session
            .wait_for_url(&self.register_url_pattern, self.timeout_ms)
            .await?;

        tracing::debug!(email = %identity.email, "Filling registration form");
        session
            .fill(&Locator::css(&self.selectors.email), &identity.email)
            .await?;
        session
            .fill(&Locator::css(&self.selectors.password), &identity.password)
            .await?;
        session
            .fill(&Locator::css(&self.selectors.name), &identity.display_name)
            .await?;
        screenshot(session, artifacts, "before_submit.png").await?;

        session.click(&Locator::css(&self.selectors.submit)).await?;
        session.wait_for_load_state(LoadState::NetworkIdle).await?;
        // Client-side redirects may land after the idle signal
        tokio::time::sleep(self.settle).await;
        screenshot(session, artifacts, "after_submit.png").await?;

        let final_url = session.current_url().await?;
        let url_matched = self.dashboard_url.is_match(&final_url);
        let verdict = self.verifier.verify(session).await?;

        let error_text = if url_matched {
            None
        } else {
            session
                .text_content(&Locator::css(&self.selectors.error))
                .await
                .ok()
                .flatten()
                .map(|text| text.trim().to_string())
                .filter(|text| !text.is_empty())
        };

        Ok(Submission {
            final_url,
            url_matched,
            verdict,
            error_text,
        })
    }

    /// Close the session and move the recording to its deterministic name.
    async fn release(&self, session: &mut dyn BrowserSession, prefix: &str, artifacts: &mut ArtifactRefs) {
        match session.close().await {
            Ok(Some(raw)) => {
                let extension = raw
                    .extension()
                    .and_then(|ext| ext.to_str())
                    .unwrap_or(DEFAULT_VIDEO_EXTENSION)
                    .to_string();
                let target = self.video_dir.join(format!("{prefix}.{extension}"));
                match finalize_video(&raw, &target).await {
                    Ok(()) => artifacts.video = Some(target),
                    Err(e) => tracing::warn!(
                        raw = %raw.display(),
                        error = %e,
                        "Failed to finalize session video"
                    ),
                }
            }
            Ok(None) => tracing::debug!("Session produced no video"),
            Err(e) => tracing::warn!(error = %e, "Failed to close browser session"),
        }
    }
}

#[async_trait]
impl AttemptRunner for AttemptExecutor {
    async fn run_attempt(&self, run_id: &str, attempt_number: u32, identity: &Identity) -> AttemptOutcome {
        let prefix = format!("{run_id}_attempt{attempt_number}");
        let mut artifacts = ArtifactRefs {
            directory: self.artifact_dir.join(&prefix),
            ..Default::default()
        };

        if let Err(e) = tokio::fs::create_dir_all(&artifacts.directory).await {
            let (kind, reason) = classify_error(&AppError::Io(e));
            return AttemptOutcome::failure(attempt_number, identity, kind, reason, None, None, artifacts);
        }

        let mut session = match self.driver.open(&self.session_options).await {
            Ok(session) => session,
            Err(e) => {
                tracing::error!(attempt = attempt_number, error = %e, "Could not open browser session");
                let (kind, reason) = classify_error(&e);
                return AttemptOutcome::failure(attempt_number, identity, kind, reason, None, None, artifacts);
            }
        };

        let result = match self.drive(session.as_mut(), identity, &mut artifacts).await {
            Ok(submission) => Ok(submission),
            Err(e) => {
                let path = artifacts.directory.join("error.png");
                match session.screenshot(&path).await {
                    Ok(()) => artifacts.screenshots.push(path),
                    Err(shot_err) => {
                        tracing::warn!(error = %shot_err, "Failed to capture error screenshot")
                    }
                }
                let url = session.current_url().await.ok();
                Err((e, url))
            }
        };

        self.release(session.as_mut(), &prefix, &mut artifacts).await;

        match result {
            Ok(submission) => judge(attempt_number, identity, submission, artifacts),
            Err((e, url)) => {
                let (kind, reason) = classify_error(&e);
                tracing::warn!(attempt = attempt_number, kind = ?kind, reason = %reason, "Attempt failed");
                AttemptOutcome::failure(attempt_number, identity, kind, reason, url, None, artifacts)
            }
        }
    }
}

fn judge(
    attempt_number: u32,
    identity: &Identity,
    submission: Submission,
    artifacts: ArtifactRefs,
) -> AttemptOutcome {
    let Submission {
        final_url,
        url_matched,
        verdict,
        error_text,
    } = submission;

    if url_matched && verdict.ok {
        tracing::info!(attempt = attempt_number, url = %final_url, "Registration landed on dashboard");
        return AttemptOutcome::success(attempt_number, identity, final_url, verdict, artifacts);
    }

    let (kind, reason) = if !url_matched {
        (
            FailureKind::DashboardRedirectMissing,
            error_text.unwrap_or_else(|| "Registration did not redirect to dashboard URL.".to_string()),
        )
    } else {
        (
            FailureKind::VerifierFailed,
            verdict
                .reason_if_failed
                .clone()
                .unwrap_or_else(|| "Dashboard checks failed.".to_string()),
        )
    };

    tracing::warn!(attempt = attempt_number, kind = ?kind, reason = %reason, "Attempt failed");
    AttemptOutcome::failure(
        attempt_number,
        identity,
        kind,
        reason,
        Some(final_url),
        Some(verdict),
        artifacts,
    )
}

fn classify_error(error: &AppError) -> (FailureKind, String) {
    match error {
        AppError::ElementNotFound(msg) => (
            FailureKind::NavigationElementNotFound,
            format!("Navigation element not found: {msg}"),
        ),
        AppError::BrowserTimeout(msg) => (FailureKind::Timeout, format!("Timeout: {msg}")),
        other => (FailureKind::UnhandledError, format!("Unhandled error: {other}")),
    }
}

async fn screenshot(
    session: &mut dyn BrowserSession,
    artifacts: &mut ArtifactRefs,
    name: &str,
) -> Result<()> {
    let path = artifacts.directory.join(name);
    session.screenshot(&path).await?;
    artifacts.screenshots.push(path);
    Ok(())
}

/// Move `raw` to `target`, copying when a rename cannot cross filesystems.
async fn finalize_video(raw: &Path, target: &Path) -> Result<()> {
    if let Some(parent) = target.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    if tokio::fs::rename(raw, target).await.is_err() {
        tokio::fs::copy(raw, target).await?;
        tokio::fs::remove_file(raw).await?;
    }
    Ok(())
}
