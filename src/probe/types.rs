use std::path::PathBuf;

use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};

use crate::reasoner::types::{DecisionSource, RetryDecision};

/// Synthetic identity used for one attempt.
#[derive(Clone)]
pub struct Identity {
    pub display_name: String,
    pub email: String,
    pub password: String,
}

// Manual Debug impl to avoid leaking the password into logs
impl std::fmt::Debug for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Identity")
            .field("display_name", &self.display_name)
            .field("email", &self.email)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// The part of an identity that is safe to put in a report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmittedIdentity {
    pub display_name: String,
    pub email: String,
}

impl From<&Identity> for SubmittedIdentity {
    fn from(identity: &Identity) -> Self {
        Self {
            display_name: identity.display_name.clone(),
            email: identity.email.clone(),
        }
    }
}

/// Machine-readable bucket for a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    NavigationElementNotFound,
    Timeout,
    DashboardRedirectMissing,
    VerifierFailed,
    UnhandledError,
}

/// Itemized result of the dashboard structure checks.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationDetails {
    pub has_primary_selector: bool,
    pub has_secondary_container: bool,
    pub item_count_in_secondary_container: usize,
    pub has_action_control: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    pub ok: bool,
    pub reason_if_failed: Option<String>,
    pub details: VerificationDetails,
}

/// Evidence captured during an attempt. Written once by the executor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRefs {
    pub directory: PathBuf,
    pub screenshots: Vec<PathBuf>,
    pub video: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptOutcome {
    pub attempt_number: u32,
    pub timestamp: DateTime<Utc>,
    pub submitted_identity: SubmittedIdentity,
    pub succeeded: bool,
    pub failure_kind: Option<FailureKind>,
    pub failure_reason: Option<String>,
    pub final_url: Option<String>,
    pub verification_detail: Option<Verdict>,
    pub artifact_refs: ArtifactRefs,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_action_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_action_source: Option<DecisionSource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_error: Option<String>,
}

impl AttemptOutcome {
    pub fn success(
        attempt_number: u32,
        identity: &Identity,
        final_url: String,
        verdict: Verdict,
        artifact_refs: ArtifactRefs,
    ) -> Self {
        Self {
            attempt_number,
            timestamp: Utc::now(),
            submitted_identity: identity.into(),
            succeeded: true,
            failure_kind: None,
            failure_reason: None,
            final_url: Some(final_url),
            verification_detail: Some(verdict),
            artifact_refs,
            next_action_text: None,
            next_action_source: None,
            provider_error: None,
        }
    }

    pub fn failure(
        attempt_number: u32,
        identity: &Identity,
        kind: FailureKind,
        reason: impl Into<String>,
        final_url: Option<String>,
        verdict: Option<Verdict>,
        artifact_refs: ArtifactRefs,
    ) -> Self {
        Self {
            attempt_number,
            timestamp: Utc::now(),
            submitted_identity: identity.into(),
            succeeded: false,
            failure_kind: Some(kind),
            failure_reason: Some(reason.into()),
            final_url,
            verification_detail: verdict,
            artifact_refs,
            next_action_text: None,
            next_action_source: None,
            provider_error: None,
        }
    }

    /// Attach the reasoner's advice. Only the advisory fields change.
    pub fn annotate(&mut self, decision: &RetryDecision) {
        self.next_action_text = Some(decision.next_action_text.clone());
        self.next_action_source = Some(decision.source);
        self.provider_error = decision.provider_error.clone();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Success,
    Failed,
}

/// Terminal states of the retry loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Running,
    Success { attempt: u32 },
    Exhausted,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: String,
    pub start_time: DateTime<Local>,
    pub end_time: DateTime<Local>,
    pub base_url: String,
    pub register_url: String,
    pub max_retries: u32,
    pub reasoner_enabled: bool,
    pub attempts: Vec<AttemptOutcome>,
    pub status: RunStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub successful_attempt_index: Option<u32>,
}

/// Accumulates attempts while the loop runs; `finish` consumes it, so a
/// report can only be finalized once.
#[derive(Debug)]
pub struct ReportBuilder {
    run_id: String,
    start_time: DateTime<Local>,
    base_url: String,
    register_url: String,
    max_retries: u32,
    reasoner_enabled: bool,
    attempts: Vec<AttemptOutcome>,
}

impl ReportBuilder {
    pub fn new(
        run_id: impl Into<String>,
        base_url: impl Into<String>,
        register_url: impl Into<String>,
        max_retries: u32,
        reasoner_enabled: bool,
    ) -> Self {
        Self {
            run_id: run_id.into(),
            start_time: Local::now(),
            base_url: base_url.into(),
            register_url: register_url.into(),
            max_retries,
            reasoner_enabled,
            attempts: Vec::new(),
        }
    }

    pub fn push(&mut self, outcome: AttemptOutcome) {
        self.attempts.push(outcome);
    }

    pub fn finish(self, state: RunState) -> RunReport {
        let (status, successful_attempt_index) = match state {
            RunState::Success { attempt } => (RunStatus::Success, Some(attempt)),
            RunState::Running | RunState::Exhausted => (RunStatus::Failed, None),
        };

        RunReport {
            run_id: self.run_id,
            start_time: self.start_time,
            end_time: Local::now(),
            base_url: self.base_url,
            register_url: self.register_url,
            max_retries: self.max_retries,
            reasoner_enabled: self.reasoner_enabled,
            attempts: self.attempts,
            status,
            successful_attempt_index,
        }
    }
}
