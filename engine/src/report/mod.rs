//! Report aggregation
//!
//! Folds outcomes into a [`DeploymentReport`] and maps it to a process exit
//! code.

pub mod writer;

use chrono::{DateTime, Utc};

use crate::models::outcome::{ActionOutcome, ActionStatus, ServerHealthCheck};
use crate::models::report::{DeploymentReport, Summary};
use crate::models::run::{Phase, RunStatus, Strategy};
use crate::utils::version_info;

pub use writer::ReportWriter;

/// Run-level fields of a report
#[derive(Debug, Clone)]
pub struct ReportHeader {
    pub deployment_id: String,
    pub project: String,
    pub environment: String,
    pub phase: Phase,
    pub strategy: Strategy,
    pub dry_run: bool,
    pub started_at: DateTime<Utc>,
}

impl Summary {
    /// Whether anything counts against the run
    pub fn has_failures(&self) -> bool {
        self.failed > 0 || self.timed_out > 0 || self.health_check_failures > 0
    }
}

/// Count outcomes and failed probes
pub fn summarize(outcomes: &[ActionOutcome], health_checks: &[ServerHealthCheck]) -> Summary {
    let mut summary = outcomes.iter().fold(Summary::default(), |mut summary, outcome| {
        summary.total += 1;
        match outcome.status {
            ActionStatus::Success => summary.success += 1,
            ActionStatus::DryRun => {
                summary.success += 1;
                summary.dry_run += 1;
            }
            ActionStatus::Failed => summary.failed += 1,
            ActionStatus::Cancelled => {
                summary.failed += 1;
                summary.cancelled += 1;
            }
            ActionStatus::Skipped => summary.skipped += 1,
            ActionStatus::TimedOut => summary.timed_out += 1,
        }
        if outcome.health_check.as_ref().is_some_and(|h| !h.success) {
            summary.health_check_failures += 1;
        }
        summary
    });

    summary.health_check_failures += health_checks.iter().filter(|h| !h.result.success).count();
    summary
}

/// Wall clock from the earliest start to the latest finish, in milliseconds
pub fn wall_clock_ms(outcomes: &[ActionOutcome]) -> u64 {
    let first = outcomes.iter().map(|o| o.started_at).min();
    let last = outcomes.iter().map(ActionOutcome::finished_at).max();
    match (first, last) {
        (Some(first), Some(last)) => (last - first).num_milliseconds().max(0) as u64,
        _ => 0,
    }
}

/// Build the final report
pub fn aggregate(
    header: ReportHeader,
    outcomes: Vec<ActionOutcome>,
    health_checks: Vec<ServerHealthCheck>,
    status: RunStatus,
    halt_reason: Option<String>,
) -> DeploymentReport {
    let summary = summarize(&outcomes, &health_checks);
    DeploymentReport {
        deployment_id: header.deployment_id,
        project: header.project,
        environment: header.environment,
        phase: header.phase,
        strategy: header.strategy,
        dry_run: header.dry_run,
        status,
        halt_reason,
        started_at: header.started_at,
        finished_at: Utc::now(),
        duration_ms: wall_clock_ms(&outcomes),
        summary,
        outcomes,
        health_checks,
        engine_version: version_info().version,
    }
}

/// 0 for a clean completed run, 1 otherwise
pub fn exit_code(report: &DeploymentReport) -> u8 {
    if report.status == RunStatus::Completed && !report.summary.has_failures() {
        0
    } else {
        1
    }
}
