//! Shipwright - Entry Point
//!
//! Builds and deploys the components of a configuration document across an
//! environment's servers, then writes a JSON report.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use serde_json::json;
use tracing::{error, info, warn};

use shipwright::app::options::RunOptions;
use shipwright::app::run::run;
use shipwright::logs::{init_logging, LogLevel, LogOptions};
use shipwright::models::run::{Phase, Strategy};
use shipwright::utils::version_info;

#[derive(Parser, Debug)]
#[command(name = "shipwright", version, about = "Pipeline orchestration engine")]
struct Cli {
    /// Configuration document
    #[arg(long, short = 'c')]
    config: PathBuf,

    /// Environment key or display name
    #[arg(long, short = 'e')]
    environment: String,

    /// by-component, by-server or rolling
    #[arg(long)]
    strategy: Option<Strategy>,

    /// build or deploy
    #[arg(long, default_value = "deploy")]
    phase: Phase,

    /// Comma-separated globs over component names
    #[arg(long)]
    component_filter: Option<String>,

    /// Comma-separated globs over categories
    #[arg(long)]
    category_filter: Option<String>,

    /// Comma-separated globs over server names
    #[arg(long)]
    server_filter: Option<String>,

    /// Record the commands without running them
    #[arg(long)]
    dry_run: bool,

    #[arg(long)]
    skip_health_check: bool,

    /// Defaults to <workspace>/reports
    #[arg(long)]
    reports_dir: Option<PathBuf>,

    /// Overrides project.workspace
    #[arg(long, env = "WORKSPACE")]
    workspace: Option<PathBuf>,

    /// Units running at once
    #[arg(long)]
    parallel: Option<usize>,

    #[arg(long)]
    stop_on_failure: bool,

    /// Per-action timeout in seconds
    #[arg(long)]
    action_timeout: Option<u64>,

    #[arg(long, default_value = "info")]
    log_level: LogLevel,

    /// JSON log lines on stderr
    #[arg(long)]
    log_json: bool,

    /// Also write JSON logs to this file
    #[arg(long)]
    log_file: Option<PathBuf>,
}

impl Cli {
    fn run_options(&self) -> RunOptions {
        RunOptions {
            config_path: self.config.clone(),
            environment: self.environment.clone(),
            workspace: self.workspace.clone(),
            reports_dir: self.reports_dir.clone(),
            phase: self.phase,
            strategy: self.strategy,
            component_filter: self.component_filter.clone(),
            category_filter: self.category_filter.clone(),
            server_filter: self.server_filter.clone(),
            dry_run: self.dry_run,
            skip_health_check: self.skip_health_check,
            max_parallel: self.parallel,
            stop_on_failure: self.stop_on_failure,
            action_timeout: self.action_timeout.map(Duration::from_secs),
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging
    let log_options = LogOptions {
        log_level: cli.log_level.clone(),
        json_format: cli.log_json,
        log_file: cli.log_file.clone(),
        ..Default::default()
    };
    let _log_guard = match init_logging(log_options) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {e}");
            None
        }
    };

    info!("shipwright {}", version_info());
    let options = cli.run_options();

    match run(options, await_shutdown_signal()).await {
        Ok(output) => {
            let report = &output.report;
            let line = json!({
                "deploymentId": report.deployment_id,
                "environment": report.environment,
                "phase": report.phase,
                "strategy": report.strategy,
                "status": report.status,
                "summary": report.summary,
                "haltReason": report.halt_reason,
                "reportPath": output.report_path,
                "exitCode": output.exit_code,
            });
            println!("{line}");
            ExitCode::from(output.exit_code)
        }
        Err(e) => {
            error!("{e}");
            let line = json!({
                "status": "error",
                "error": e.to_string(),
                "exitCode": e.exit_code(),
            });
            println!("{line}");
            ExitCode::from(e.exit_code())
        }
    }
}

async fn await_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = sigterm.recv() => {
                        info!("SIGTERM received, cancelling...");
                    }
                    result = tokio::signal::ctrl_c() => match result {
                        Ok(()) => info!("Ctrl+C received, cancelling..."),
                        Err(e) => {
                            warn!("Unable to listen for Ctrl+C: {e}");
                            std::future::pending::<()>().await;
                        }
                    },
                }
            }
            Err(e) => {
                warn!("Unable to listen for SIGTERM: {e}");
                match tokio::signal::ctrl_c().await {
                    Ok(()) => info!("Ctrl+C received, cancelling..."),
                    Err(_) => std::future::pending::<()>().await,
                }
            }
        }
    }

    #[cfg(not(unix))]
    {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Ctrl+C received, cancelling..."),
            Err(e) => {
                warn!("Unable to listen for Ctrl+C: {e}");
                std::future::pending::<()>().await;
            }
        }
    }
}
