//! Top-level run
//!
//! Composes catalog loading, target resolution, scheduling and reporting for
//! one invocation. Configuration errors surface as `Err` before any action
//! runs; everything after that point ends in a written report.

use std::future::Future;
use std::path::PathBuf;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::app::options::RunOptions;
use crate::catalog::{Catalog, Environment};
use crate::deploy::executor::{ActionRunner, ProcessExecutor};
use crate::deploy::fsm::{RunEvent, RunFsm};
use crate::deploy::health::{HealthProbe, HttpProber};
use crate::deploy::scheduler::Scheduler;
use crate::errors::OrchestratorError;
use crate::models::component::Component;
use crate::models::report::DeploymentReport;
use crate::models::run::{Phase, RunStatus};
use crate::report::{self, ReportHeader, ReportWriter};
use crate::utils::generate_deployment_id;

/// Result of a run that got past configuration
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub report: DeploymentReport,
    pub report_path: PathBuf,
    pub exit_code: u8,
}

/// Run the orchestrator with the process executor and HTTP prober.
///
/// `shutdown_signal` resolving cancels the run.
pub async fn run(
    options: RunOptions,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> Result<RunOutput, OrchestratorError> {
    let cancel = CancellationToken::new();
    let watcher = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            shutdown_signal.await;
            warn!("Shutdown signal received, cancelling run...");
            cancel.cancel();
        })
    };

    let executor = ProcessExecutor::new();
    let result = match HttpProber::new() {
        Ok(prober) => execute(&options, &executor, &prober, cancel).await,
        Err(e) => Err(e),
    };

    watcher.abort();
    result
}

/// Run with caller-supplied executor and prober
pub async fn execute(
    options: &RunOptions,
    runner: &dyn ActionRunner,
    prober: &dyn HealthProbe,
    cancel: CancellationToken,
) -> Result<RunOutput, OrchestratorError> {
    let started_at = Utc::now();
    let deployment_id = generate_deployment_id();
    let mut fsm = RunFsm::new();
    transition(&mut fsm, RunEvent::Resolve)?;

    info!(
        "Starting {} run {} for environment '{}'",
        options.phase, deployment_id, options.environment
    );

    let catalog = match Catalog::load(&options.config_path, options.workspace.clone()).await {
        Ok(catalog) => catalog,
        Err(e) => return Err(abort(&mut fsm, e)),
    };
    let targets = match resolve_targets(options, &catalog) {
        Ok(targets) => targets,
        Err(e) => return Err(abort(&mut fsm, e)),
    };
    let schedule_options = match options.schedule_options(&catalog.document().deploy) {
        Ok(schedule_options) => schedule_options,
        Err(e) => return Err(abort(&mut fsm, e)),
    };
    transition(&mut fsm, RunEvent::Resolved)?;

    let header = ReportHeader {
        deployment_id,
        project: catalog.project_name().to_string(),
        environment: targets.environment.name.clone(),
        phase: options.phase,
        strategy: schedule_options.strategy,
        dry_run: options.dry_run,
        started_at,
    };
    let writer = ReportWriter::new(
        options
            .reports_dir
            .clone()
            .unwrap_or_else(|| catalog.workspace().join("reports")),
    );

    if cancel.is_cancelled() {
        transition(&mut fsm, RunEvent::Cancel)?;
        let report = report::aggregate(header, Vec::new(), Vec::new(), RunStatus::Cancelled, None);
        return finish(&writer, report).await;
    }

    let scheduler = Scheduler::new(
        &catalog,
        Some(&targets.environment),
        targets.components,
        targets.servers,
        runner,
        prober,
        schedule_options,
        cancel,
    )
    .map_err(|e| abort(&mut fsm, e))?;

    transition(&mut fsm, RunEvent::Dispatch)?;
    let result = scheduler.run().await;

    let event = if result.cancelled {
        RunEvent::Cancel
    } else if let Some(reason) = &result.halt_reason {
        RunEvent::Halt(reason.clone())
    } else {
        RunEvent::UnitsFinished
    };
    transition(&mut fsm, event)?;

    let summary = report::summarize(&result.outcomes, &result.health_checks);
    transition(&mut fsm, RunEvent::Aggregated { failed: summary.has_failures() })?;
    let status = fsm
        .run_status()
        .ok_or_else(|| OrchestratorError::Internal(format!("run ended in {:?}", fsm.state())))?;

    let report = report::aggregate(
        header,
        result.outcomes,
        result.health_checks,
        status,
        result.halt_reason,
    );
    finish(&writer, report).await
}

struct Targets<'a> {
    environment: Environment,
    components: Vec<&'a Component>,
    servers: Vec<String>,
}

fn resolve_targets<'a>(
    options: &RunOptions,
    catalog: &'a Catalog,
) -> Result<Targets<'a>, OrchestratorError> {
    let environment = catalog.environment(&options.environment)?;

    // Build actions do not target servers
    let servers = match options.phase {
        Phase::Deploy => environment.resolve_servers(options.server_filter.as_deref())?,
        Phase::Build => Vec::new(),
    };

    let components = catalog.filter(
        options.component_filter.as_deref(),
        options.category_filter.as_deref(),
    );
    if components.is_empty() {
        warn!("No enabled components match the given filters");
    }

    if !options.dry_run {
        // Every unit is known here, so templated paths are checked per unit
        let missing = catalog.missing_scripts(
            Some(&environment),
            components.iter().copied(),
            &servers,
            options.phase,
        );
        if !missing.is_empty() {
            let listing: Vec<String> = missing
                .iter()
                .map(|(component, path)| format!("{} ({})", component, path.display()))
                .collect();
            return Err(OrchestratorError::ConfigError(format!(
                "{} script(s) not found: {}",
                options.phase,
                listing.join(", ")
            )));
        }
    }

    info!(
        "Resolved {} component(s) and {} server(s) in '{}'",
        components.len(),
        servers.len(),
        environment.name
    );
    Ok(Targets {
        environment,
        components,
        servers,
    })
}

async fn finish(writer: &ReportWriter, report: DeploymentReport) -> Result<RunOutput, OrchestratorError> {
    let report_path = writer.write(&report).await?;
    let exit_code = report::exit_code(&report);

    let summary = &report.summary;
    info!(
        "Run {} {:?}: {} total, {} succeeded, {} failed, {} skipped, {} timed out, {} health check failure(s)",
        report.deployment_id,
        report.status,
        summary.total,
        summary.success,
        summary.failed,
        summary.skipped,
        summary.timed_out,
        summary.health_check_failures
    );
    if let Some(reason) = &report.halt_reason {
        warn!("Run halted: {}", reason);
    }

    Ok(RunOutput {
        report,
        report_path,
        exit_code,
    })
}

fn transition(fsm: &mut RunFsm, event: RunEvent) -> Result<(), OrchestratorError> {
    fsm.process(event).map_err(OrchestratorError::Internal)
}

fn abort(fsm: &mut RunFsm, err: OrchestratorError) -> OrchestratorError {
    error!("Run aborted: {}", err);
    if let Err(e) = fsm.process(RunEvent::Abort(err.to_string())) {
        warn!("{}", e);
    }
    err
}
