//! Run options

use std::path::PathBuf;
use std::time::Duration;

use crate::deploy::scheduler::ScheduleOptions;
use crate::errors::OrchestratorError;
use crate::models::config::DeploySection;
use crate::models::run::{Phase, Strategy};

/// Default per-action timeout
pub const DEFAULT_ACTION_TIMEOUT: Duration = Duration::from_secs(1800);

/// Default number of units running at once
pub const DEFAULT_MAX_PARALLEL: usize = 1;

/// Options for one run, as given by the caller.
///
/// `None` and `false` defer to the configuration document, which defers to
/// the built-in defaults.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Path of the configuration document
    pub config_path: PathBuf,

    /// Environment key or display name
    pub environment: String,

    /// Overrides `project.workspace`
    pub workspace: Option<PathBuf>,

    /// Report directory; defaults to `<workspace>/reports`
    pub reports_dir: Option<PathBuf>,

    pub phase: Phase,
    pub strategy: Option<Strategy>,

    /// Comma-separated globs over component names
    pub component_filter: Option<String>,

    /// Comma-separated globs over category keys
    pub category_filter: Option<String>,

    /// Comma-separated globs over server names
    pub server_filter: Option<String>,

    pub dry_run: bool,
    pub skip_health_check: bool,
    pub max_parallel: Option<usize>,
    pub stop_on_failure: bool,
    pub action_timeout: Option<Duration>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            config_path: PathBuf::from("pipeline.json"),
            environment: String::new(),
            workspace: None,
            reports_dir: None,
            phase: Phase::Deploy,
            strategy: None,
            component_filter: None,
            category_filter: None,
            server_filter: None,
            dry_run: false,
            skip_health_check: false,
            max_parallel: None,
            stop_on_failure: false,
            action_timeout: None,
        }
    }
}

impl RunOptions {
    /// Layer these options over the document's `deploy` section.
    ///
    /// A zero action timeout is rejected.
    pub fn schedule_options(&self, deploy: &DeploySection) -> Result<ScheduleOptions, OrchestratorError> {
        let action_timeout = self
            .action_timeout
            .or(deploy.timeout_seconds.map(Duration::from_secs))
            .unwrap_or(DEFAULT_ACTION_TIMEOUT);
        if action_timeout.is_zero() {
            return Err(OrchestratorError::ValidationError(
                "action timeout must be greater than zero".to_string(),
            ));
        }

        Ok(ScheduleOptions {
            phase: self.phase,
            strategy: self.strategy.or(deploy.strategy).unwrap_or_default(),
            max_parallel: self
                .max_parallel
                .or(deploy.max_parallel)
                .unwrap_or(DEFAULT_MAX_PARALLEL)
                .max(1),
            stop_on_first_failure: self.stop_on_failure
                || deploy.stop_on_first_failure.unwrap_or(false),
            action_timeout,
            dry_run: self.dry_run,
            skip_health_check: self.skip_health_check,
        })
    }
}
