//! Error types for the orchestration engine

use thiserror::Error;

/// Main error type for the orchestration engine
#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Environment error: {0}")]
    EnvironmentError(String),

    #[error("No target servers resolved: {0}")]
    NoServers(String),

    #[error("Duplicate component '{name}' in category '{category}'")]
    DuplicateComponent { category: String, name: String },

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Report error: {0}")]
    ReportError(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl OrchestratorError {
    /// Whether this error belongs to the fatal configuration tier.
    ///
    /// Configuration errors abort the run before any action executes.
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            OrchestratorError::JsonError(_)
                | OrchestratorError::ConfigError(_)
                | OrchestratorError::EnvironmentError(_)
                | OrchestratorError::NoServers(_)
                | OrchestratorError::DuplicateComponent { .. }
                | OrchestratorError::ValidationError(_)
        )
    }

    /// Process exit code for a run that ended with this error
    pub fn exit_code(&self) -> u8 {
        if self.is_configuration_error() {
            2
        } else {
            1
        }
    }
}
