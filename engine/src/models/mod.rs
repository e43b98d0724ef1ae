//! Data models

pub mod component;
pub mod config;
pub mod outcome;
pub mod report;
pub mod run;

pub use component::{ActionSpec, Category, Component, ParamValue, Parameters};
pub use config::{ConfigDocument, HealthCheckSettings};
pub use outcome::{ActionOutcome, ActionStatus, HealthCheckResult, ServerHealthCheck, UnitKey};
pub use report::{DeploymentReport, Summary};
pub use run::{Phase, RunStatus, Strategy};
