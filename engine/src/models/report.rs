//! Deployment report models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::outcome::{ActionOutcome, ServerHealthCheck};
use crate::models::run::{Phase, RunStatus, Strategy};

/// Outcome counts.
///
/// `success + failed + skipped + timed_out == total`. Dry-run outcomes are
/// counted in `success` and cancelled outcomes in `failed`; `dry_run` and
/// `cancelled` break those buckets down further.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub total: usize,
    pub success: usize,
    pub failed: usize,
    pub skipped: usize,
    pub timed_out: usize,
    pub dry_run: usize,
    pub cancelled: usize,

    /// Failed probes, per-unit and server-level
    pub health_check_failures: usize,
}

/// The aggregate record of one scheduling run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentReport {
    pub deployment_id: String,
    pub project: String,
    pub environment: String,
    pub phase: Phase,
    pub strategy: Strategy,
    pub dry_run: bool,
    pub status: RunStatus,

    /// Set when the run stopped before covering every unit
    #[serde(skip_serializing_if = "Option::is_none")]
    pub halt_reason: Option<String>,

    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,

    /// Wall clock from the first outcome's start to the last outcome's end
    pub duration_ms: u64,

    pub summary: Summary,
    pub outcomes: Vec<ActionOutcome>,
    pub health_checks: Vec<ServerHealthCheck>,
    pub engine_version: String,
}
