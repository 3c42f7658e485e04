use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use regprobe::browser::playwright::PlaywrightDriver;
use regprobe::browser::BrowserDriver;
use regprobe::config::{AppConfig, Overrides};
use regprobe::exit_codes;
use regprobe::probe::types::{RunReport, RunStatus};
use regprobe::probe::{AttemptExecutor, RetryOrchestrator};
use regprobe::reasoner::build_reasoner;

#[derive(Parser)]
#[command(
    name = "regprobe",
    about = "Probe a website's signup flow with synthetic users and verify the dashboard"
)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<String>,

    /// Site root, e.g. https://staging.example.com
    #[arg(long)]
    base_url: Option<String>,

    /// Path of the signup page, relative to the site root
    #[arg(long)]
    register_path: Option<String>,

    /// Maximum number of attempts
    #[arg(long)]
    max_retries: Option<u32>,

    /// Per-step browser timeout in milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Show the browser window
    #[arg(long)]
    headed: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // stdout carries the report; logs go to stderr
    let json_layer = cli
        .json_logs
        .then(|| tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr));
    let text_layer = (!cli.json_logs)
        .then(|| tracing_subscriber::fmt::layer().with_writer(std::io::stderr));
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(json_layer)
        .with(text_layer)
        .init();

    let overrides = Overrides {
        base_url: cli.base_url,
        register_path: cli.register_path,
        max_retries: cli.max_retries,
        timeout_ms: cli.timeout_ms,
        headed: cli.headed,
    };

    let config = match AppConfig::load(cli.config.as_deref(), &overrides) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "Invalid configuration");
            return ExitCode::from(exit_codes::CONFIG);
        }
    };

    tracing::info!(
        base_url = %config.base_url(),
        register_url = %config.register_url(),
        max_retries = config.probe.max_retries,
        reasoner_enabled = config.reasoner.enabled,
        "Starting regprobe"
    );

    let orchestrator = match build_orchestrator(&config) {
        Ok(orchestrator) => orchestrator,
        Err(e) => {
            tracing::error!(error = ?e, "Run aborted");
            return ExitCode::from(exit_codes::FAILED);
        }
    };

    let report = orchestrator.run().await;
    match serde_json::to_string_pretty(&report) {
        Ok(json) => println!("{json}"),
        Err(e) => tracing::error!(error = %e, "Failed to render report"),
    }

    if let Err(e) = orchestrator.save_report(&report).await {
        tracing::error!(error = %e, run_id = %report.run_id, "Failed to write the run report");
        return ExitCode::from(exit_codes::FAILED);
    }
    exit_code(&report)
}

fn build_orchestrator(config: &AppConfig) -> anyhow::Result<RetryOrchestrator> {
    let driver: Arc<dyn BrowserDriver> = Arc::new(PlaywrightDriver::new(&config.browser));
    let executor = AttemptExecutor::new(config, driver).context("Failed to build attempt executor")?;
    let reasoner = build_reasoner(&config.reasoner, config.probe.retry_delay_seconds);

    Ok(RetryOrchestrator::new(config, Arc::new(executor), reasoner))
}

fn exit_code(report: &RunReport) -> ExitCode {
    match report.status {
        RunStatus::Success => ExitCode::from(exit_codes::SUCCESS),
        RunStatus::Failed => ExitCode::from(exit_codes::FAILED),
    }
}
