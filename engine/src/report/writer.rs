//! Report persistence

use std::path::PathBuf;

use tracing::info;

use crate::errors::OrchestratorError;
use crate::filesys::dir::Dir;
use crate::models::report::DeploymentReport;
use crate::utils::{file_safe, short_id};

/// Name of the copy that always holds the most recent report
pub const LATEST_REPORT: &str = "latest.json";

/// Writes reports into one directory
#[derive(Debug, Clone)]
pub struct ReportWriter {
    dir: Dir,
}

impl ReportWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: Dir::new(dir) }
    }

    /// File name for a report: environment, start time and short id
    pub fn file_name(report: &DeploymentReport) -> String {
        format!(
            "deployment-{}-{}-{}.json",
            file_safe(&report.environment),
            report.started_at.format("%Y%m%d-%H%M%S"),
            short_id(&report.deployment_id)
        )
    }

    /// Write the report and refresh `latest.json`; returns the report path
    pub async fn write(&self, report: &DeploymentReport) -> Result<PathBuf, OrchestratorError> {
        self.dir.create().await.map_err(|e| {
            OrchestratorError::ReportError(format!(
                "cannot create {}: {}",
                self.dir.path().display(),
                e
            ))
        })?;

        let file = self.dir.file(&Self::file_name(report));
        file.write_json(report).await.map_err(|e| {
            OrchestratorError::ReportError(format!("cannot write {}: {}", file.path().display(), e))
        })?;

        let latest = self.dir.file(LATEST_REPORT);
        file.copy_to(&latest).await.map_err(|e| {
            OrchestratorError::ReportError(format!(
                "cannot update {}: {}",
                latest.path().display(),
                e
            ))
        })?;

        info!("Report written to {}", file.path().display());
        Ok(file.path().to_path_buf())
    }
}
