use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local};
use uuid::Uuid;

use crate::config::{AppConfig, IdentityConfig};
use crate::error::Result;
use crate::probe::executor::AttemptRunner;
use crate::probe::identity::IdentityGenerator;
use crate::probe::types::{ReportBuilder, RunReport, RunState};
use crate::reasoner::FailureReasoner;

/// Run id: the wall clock at run start plus a random suffix, so runs started
/// within the same second never share artifact names.
pub fn run_id_for(start: DateTime<Local>) -> String {
    let token = Uuid::new_v4().simple().to_string();
    format!(
        "registration_test_{}_{}",
        start.format("%Y%m%d_%H%M%S"),
        &token[..8]
    )
}

/// Drives attempts one at a time until one succeeds, the reasoner says stop,
/// or `max_retries` attempts have been made.
pub struct RetryOrchestrator {
    runner: Arc<dyn AttemptRunner>,
    reasoner: Arc<dyn FailureReasoner>,
    identity: IdentityConfig,
    max_retries: u32,
    base_url: String,
    register_url: String,
    artifact_dir: PathBuf,
    reasoner_enabled: bool,
}

impl RetryOrchestrator {
    pub fn new(
        config: &AppConfig,
        runner: Arc<dyn AttemptRunner>,
        reasoner: Arc<dyn FailureReasoner>,
    ) -> Self {
        Self {
            runner,
            reasoner,
            identity: config.identity.clone(),
            max_retries: config.probe.max_retries,
            base_url: config.base_url().to_string(),
            register_url: config.register_url(),
            artifact_dir: config.artifacts.artifact_dir.clone(),
            reasoner_enabled: config.reasoner.enabled,
        }
    }

    /// Drive the attempt loop to a terminal state. Never fails; use
    /// [`RetryOrchestrator::save_report`] to persist the result.
    pub async fn run(&self) -> RunReport {
        let run_id = run_id_for(Local::now());
        let mut report = ReportBuilder::new(
            run_id.as_str(),
            self.base_url.as_str(),
            self.register_url.as_str(),
            self.max_retries,
            self.reasoner_enabled,
        );
        let mut identities = IdentityGenerator::new(&self.identity);
        let mut state = RunState::Running;

        tracing::info!(run_id = %run_id, max_retries = self.max_retries, "Starting registration run");

        for attempt in 1..=self.max_retries {
            tracing::info!(attempt, max_retries = self.max_retries, "Starting registration attempt");

            let identity = identities.next_identity();
            let mut outcome = self.runner.run_attempt(&run_id, attempt, &identity).await;

            if outcome.succeeded {
                report.push(outcome);
                state = RunState::Success { attempt };
                break;
            }

            if attempt == self.max_retries {
                report.push(outcome);
                state = RunState::Exhausted;
                break;
            }

            let decision = self
                .reasoner
                .decide(&outcome, attempt, self.max_retries)
                .await;
            outcome.annotate(&decision);
            report.push(outcome);

            tracing::info!(
                attempt,
                source = ?decision.source,
                should_retry = decision.should_retry,
                delay_seconds = decision.retry_delay_seconds,
                next_action = %decision.next_action_text,
                "Retry decision"
            );

            if !decision.should_retry {
                state = RunState::Exhausted;
                break;
            }

            tokio::time::sleep(Duration::from_secs(decision.retry_delay_seconds)).await;
        }

        let report = report.finish(state);
        tracing::info!(
            status = ?report.status,
            attempts = report.attempts.len(),
            "Registration run finished"
        );
        report
    }

    /// Write `{artifact_dir}/{run_id}_report.json`.
    pub async fn save_report(&self, report: &RunReport) -> Result<PathBuf> {
        tokio::fs::create_dir_all(&self.artifact_dir).await?;
        let path = self
            .artifact_dir
            .join(format!("{}_report.json", report.run_id));
        tokio::fs::write(&path, serde_json::to_vec_pretty(report)?).await?;
        tracing::info!(path = %path.display(), "Report saved");
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    use chrono::TimeZone;

    use crate::probe::types::RunStatus;
    use crate::reasoner::heuristic::HeuristicReasoner;
    use crate::reasoner::types::DecisionSource;
    use crate::test_support::{probe_config, FixedReasoner, ScriptedRunner};

    fn orchestrator(
        config: &AppConfig,
        runner: &Arc<ScriptedRunner>,
        reasoner: Arc<dyn FailureReasoner>,
    ) -> RetryOrchestrator {
        RetryOrchestrator::new(config, Arc::clone(runner) as Arc<dyn AttemptRunner>, reasoner)
    }

    fn heuristic(config: &AppConfig) -> Arc<dyn FailureReasoner> {
        Arc::new(HeuristicReasoner::new(config.probe.retry_delay_seconds))
    }

    #[test]
    fn test_run_id_format() {
        let start = Local.with_ymd_and_hms(2026, 3, 9, 14, 5, 7).unwrap();
        let pattern = regex::Regex::new(r"^registration_test_20260309_140507_[0-9a-f]{8}$").unwrap();
        let run_id = run_id_for(start);
        assert!(pattern.is_match(&run_id), "unexpected run id: {run_id}");
    }

    #[test]
    fn test_run_ids_differ_within_one_second() {
        let start = Local.with_ymd_and_hms(2026, 3, 9, 14, 5, 7).unwrap();
        assert_ne!(run_id_for(start), run_id_for(start));
    }

    #[tokio::test]
    async fn test_back_to_back_runs_keep_separate_reports() {
        let dir = tempfile::tempdir().unwrap();
        let config = probe_config(dir.path());

        let first_runner = Arc::new(ScriptedRunner::new(vec![None]));
        let first = orchestrator(&config, &first_runner, heuristic(&config));
        let first_report = first.run().await;
        first.save_report(&first_report).await.unwrap();

        let second_runner = Arc::new(ScriptedRunner::new(vec![Some("boom"); 3]));
        let second = orchestrator(&config, &second_runner, heuristic(&config));
        let second_report = second.run().await;
        second.save_report(&second_report).await.unwrap();

        assert_ne!(first_report.run_id, second_report.run_id);
        let saved = std::fs::read_dir(&config.artifacts.artifact_dir)
            .unwrap()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_name().to_string_lossy().ends_with("_report.json"))
            .count();
        assert_eq!(saved, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sleeps_retry_delay_between_attempts() {
        let dir = tempfile::tempdir().unwrap();
        let config = probe_config(dir.path());
        let runner = Arc::new(ScriptedRunner::new(vec![Some("boom"), None]));
        let reasoner: Arc<dyn FailureReasoner> = Arc::new(FixedReasoner::retry_after(30));

        let started = tokio::time::Instant::now();
        let report = orchestrator(&config, &runner, reasoner).run().await;

        assert_eq!(report.status, RunStatus::Success);
        assert!(started.elapsed() >= Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_delay_after_success_on_first_attempt() {
        let dir = tempfile::tempdir().unwrap();
        let config = probe_config(dir.path());
        let runner = Arc::new(ScriptedRunner::new(vec![None]));
        let reasoner: Arc<dyn FailureReasoner> = Arc::new(FixedReasoner::retry_after(30));

        let started = tokio::time::Instant::now();
        orchestrator(&config, &runner, reasoner).run().await;

        assert!(started.elapsed() < Duration::from_secs(30));
    }

    #[tokio::test]
    async fn test_timeouts_then_success() {
        let dir = tempfile::tempdir().unwrap();
        let config = probe_config(dir.path());
        let runner = Arc::new(ScriptedRunner::new(vec![
            Some("Timeout: page.waitForURL: Timeout 30000ms exceeded."),
            Some("Timeout: page.waitForURL: Timeout 30000ms exceeded."),
            None,
        ]));

        let report = orchestrator(&config, &runner, heuristic(&config))
            .run()
            .await;

        assert_eq!(report.status, RunStatus::Success);
        assert_eq!(report.successful_attempt_index, Some(3));
        assert_eq!(report.attempts.len(), 3);
        for attempt in &report.attempts[..2] {
            let advice = attempt.next_action_text.as_deref().unwrap();
            assert!(advice.contains("increase wait"), "unexpected advice: {advice}");
            assert_eq!(attempt.next_action_source, Some(DecisionSource::Heuristic));
        }
        assert!(report.attempts[2].next_action_text.is_none());

        let saved = orchestrator(&config, &runner, heuristic(&config))
            .save_report(&report)
            .await
            .unwrap();
        assert_eq!(
            saved,
            config
                .artifacts
                .artifact_dir
                .join(format!("{}_report.json", report.run_id))
        );
        let on_disk: RunReport =
            serde_json::from_slice(&std::fs::read(saved).unwrap()).unwrap();
        assert_eq!(on_disk.attempts.len(), 3);
        assert_eq!(on_disk.status, RunStatus::Success);
    }

    #[tokio::test]
    async fn test_unwritable_artifact_dir_keeps_report() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = probe_config(dir.path());
        let blocker = dir.path().join("not_a_dir");
        std::fs::write(&blocker, b"").unwrap();
        config.artifacts.artifact_dir = blocker;
        let runner = Arc::new(ScriptedRunner::new(vec![Some("boom"), None]));

        let orchestrator = orchestrator(&config, &runner, heuristic(&config));
        let report = orchestrator.run().await;

        assert!(orchestrator.save_report(&report).await.is_err());
        assert_eq!(report.status, RunStatus::Success);
        assert_eq!(report.attempts.len(), 2);
        let rendered = serde_json::to_value(&report).unwrap();
        assert_eq!(rendered["attempts"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_first_success_stops_the_loop() {
        let dir = tempfile::tempdir().unwrap();
        let config = probe_config(dir.path());
        let runner = Arc::new(ScriptedRunner::new(vec![Some("Unhandled error: boom"), None, None]));

        let report = orchestrator(&config, &runner, heuristic(&config))
            .run()
            .await;

        assert_eq!(report.attempts.len(), 2);
        assert_eq!(report.successful_attempt_index, Some(2));
        assert_eq!(runner.calls(), 2);
    }

    #[tokio::test]
    async fn test_all_failures_exhaust_the_bound() {
        let dir = tempfile::tempdir().unwrap();
        let config = probe_config(dir.path());
        let runner = Arc::new(ScriptedRunner::new(vec![
            Some("duplicate email"),
            Some("HTTP 502 Bad Gateway"),
            Some("captcha required"),
        ]));

        let report = orchestrator(&config, &runner, heuristic(&config))
            .run()
            .await;

        assert_eq!(report.status, RunStatus::Failed);
        assert_eq!(report.attempts.len(), 3);
        assert!(report.successful_attempt_index.is_none());
        // The final attempt is not sent to the reasoner
        assert!(report.attempts[2].next_action_text.is_none());
    }

    #[tokio::test]
    async fn test_reasoner_can_stop_early() {
        let dir = tempfile::tempdir().unwrap();
        let config = probe_config(dir.path());
        let runner = Arc::new(ScriptedRunner::new(vec![Some("fatal"), None]));
        let reasoner: Arc<dyn FailureReasoner> = Arc::new(FixedReasoner::stop("Escalate to a human."));

        let report = orchestrator(&config, &runner, reasoner).run().await;

        assert_eq!(report.status, RunStatus::Failed);
        assert_eq!(report.attempts.len(), 1);
        assert_eq!(
            report.attempts[0].next_action_text.as_deref(),
            Some("Escalate to a human.")
        );
        assert_eq!(runner.calls(), 1);
    }

    #[tokio::test]
    async fn test_each_attempt_gets_a_fresh_email() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = probe_config(dir.path());
        config.probe.max_retries = 5;
        let runner = Arc::new(ScriptedRunner::new(vec![Some("nope"); 5]));

        let report = orchestrator(&config, &runner, heuristic(&config))
            .run()
            .await;

        let emails: HashSet<_> = report
            .attempts
            .iter()
            .map(|a| a.submitted_identity.email.clone())
            .collect();
        assert_eq!(emails.len(), 5);
        let numbers: Vec<u32> = report.attempts.iter().map(|a| a.attempt_number).collect();
        assert_eq!(numbers, vec![1, 2, 3, 4, 5]);
    }

    #[tokio::test]
    async fn test_single_attempt_budget() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = probe_config(dir.path());
        config.probe.max_retries = 1;
        let runner = Arc::new(ScriptedRunner::new(vec![Some("Timeout: slow"), None]));

        let report = orchestrator(&config, &runner, heuristic(&config))
            .run()
            .await;

        assert_eq!(report.attempts.len(), 1);
        assert_eq!(report.status, RunStatus::Failed);
    }
}
