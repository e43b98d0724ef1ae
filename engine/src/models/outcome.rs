//! Action outcome models

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};

use crate::models::component::{Category, Parameters};
use crate::models::run::Phase;

/// Result status of one action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ActionStatus {
    Success,
    Failed,
    Skipped,
    TimedOut,
    DryRun,
    Cancelled,
}

impl ActionStatus {
    /// Whether this status counts against the run
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            ActionStatus::Failed | ActionStatus::TimedOut | ActionStatus::Cancelled
        )
    }
}

/// Result of one health probe
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthCheckResult {
    pub url: String,
    pub success: bool,

    /// Status code of the last response, if any response arrived
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,

    /// Latency of the last request
    pub response_time_ms: u64,
    pub attempts: u32,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

/// Server-level health record, used by strategies that probe once per server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerHealthCheck {
    pub server: String,
    pub checked_at: DateTime<Utc>,

    #[serde(flatten)]
    pub result: HealthCheckResult,
}

/// Identity of one logical unit of work
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UnitKey {
    pub phase: Phase,
    pub category: Category,
    pub component: String,
    pub server: Option<String>,
}

impl std::fmt::Display for UnitKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}/{}", self.phase, self.category, self.component)?;
        if let Some(server) = &self.server {
            write!(f, "@{}", server)?;
        }
        Ok(())
    }
}

/// The record of one action's result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionOutcome {
    pub component_name: String,
    pub category: Category,
    pub phase: Phase,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub server: Option<String>,

    /// Script path after substitution
    pub script: String,

    /// Audit rendering of the full command line
    pub command_line: String,

    pub resolved_parameters: Parameters,
    pub status: ActionStatus,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,

    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub stdout: String,
    pub stderr: String,

    /// Engine-side explanation for non-process failures and skips
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub health_check: Option<HealthCheckResult>,
}

impl ActionOutcome {
    /// Attach a per-unit probe result
    pub fn with_health_check(mut self, result: HealthCheckResult) -> Self {
        self.health_check = Some(result);
        self
    }

    pub fn finished_at(&self) -> DateTime<Utc> {
        self.started_at + ChronoDuration::milliseconds(self.duration_ms as i64)
    }

    pub fn unit_key(&self) -> UnitKey {
        UnitKey {
            phase: self.phase,
            category: self.category,
            component: self.component_name.clone(),
            server: self.server.clone(),
        }
    }

    /// Whether the action itself failed or its health check did
    pub fn is_failure(&self) -> bool {
        self.status.is_failure() || self.health_check.as_ref().is_some_and(|h| !h.success)
    }
}
