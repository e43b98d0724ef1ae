//! HTTP health probing
//!
//! A probe polls one URL until the expected status (and optional body
//! pattern) is seen, the overall deadline passes or the run is cancelled.
//! Every failure is folded into the [`HealthCheckResult`].

use std::time::{Duration, Instant};

use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::errors::OrchestratorError;
use crate::models::config::HealthCheckSettings;
use crate::models::outcome::HealthCheckResult;
use crate::resolver::{resolve, VarContext, Vars};

const DEFAULT_SCHEME: &str = "http";
const DEFAULT_PORT: u16 = 80;
const DEFAULT_ENDPOINT: &str = "/health";
const DEFAULT_STATUS: u16 = 200;
const DEFAULT_TIMEOUT_SECS: u64 = 60;
const DEFAULT_RETRY_INTERVAL_SECS: u64 = 5;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;

/// Effective probe settings after layering and defaults
#[derive(Debug, Clone)]
pub struct HealthCheckSpec {
    /// URL template, resolved per server
    pub url_template: String,
    pub expected_status: u16,
    pub expected_body: Option<Regex>,

    /// Overall deadline for the probe
    pub timeout: Duration,
    pub retry_interval: Duration,

    /// Deadline for a single request
    pub request_timeout: Duration,
}

impl HealthCheckSpec {
    /// Build a spec from layered settings; `None` when probing is disabled
    pub fn from_settings(settings: &HealthCheckSettings) -> Result<Option<Self>, OrchestratorError> {
        if settings.enabled == Some(false) {
            return Ok(None);
        }

        let url_template = match &settings.url {
            Some(url) => url.clone(),
            None => {
                let endpoint = settings.endpoint.as_deref().unwrap_or(DEFAULT_ENDPOINT);
                format!(
                    "{}://${{{}}}:{}{}{}",
                    settings.scheme.as_deref().unwrap_or(DEFAULT_SCHEME),
                    Vars::SERVER,
                    settings.port.unwrap_or(DEFAULT_PORT),
                    if endpoint.starts_with('/') { "" } else { "/" },
                    endpoint
                )
            }
        };

        let expected_body = settings
            .expected_body
            .as_deref()
            .map(Regex::new)
            .transpose()
            .map_err(|e| OrchestratorError::ConfigError(format!("invalid expectedBody pattern: {}", e)))?;

        Ok(Some(Self {
            url_template,
            expected_status: settings.expected_status.unwrap_or(DEFAULT_STATUS),
            expected_body,
            timeout: Duration::from_secs(settings.timeout_seconds.unwrap_or(DEFAULT_TIMEOUT_SECS)),
            retry_interval: Duration::from_secs(
                settings.retry_interval_seconds.unwrap_or(DEFAULT_RETRY_INTERVAL_SECS),
            ),
            request_timeout: Duration::from_secs(
                settings.request_timeout_seconds.unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS),
            ),
        }))
    }

    /// Concrete URL for one server
    pub fn url_for(&self, context: &VarContext) -> String {
        resolve(&self.url_template, context)
    }
}

/// Polls a health endpoint
#[async_trait]
pub trait HealthProbe: Send + Sync {
    async fn probe(
        &self,
        url: &str,
        check: &HealthCheckSpec,
        cancel: &CancellationToken,
    ) -> HealthCheckResult;
}

/// Health prober backed by `reqwest`
#[derive(Debug, Clone)]
pub struct HttpProber {
    client: Client,
}

impl HttpProber {
    pub fn new() -> Result<Self, OrchestratorError> {
        let client = Client::builder().no_proxy().build()?;
        Ok(Self { client })
    }

    /// One request; `Err` carries the observed status, if any, and a message
    async fn attempt(
        &self,
        url: &str,
        check: &HealthCheckSpec,
        timeout: Duration,
    ) -> Result<u16, (Option<u16>, String)> {
        let response = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| (None, describe(&e)))?;

        let status = response.status().as_u16();
        if status != check.expected_status {
            return Err((
                Some(status),
                format!("unexpected status {} (expected {})", status, check.expected_status),
            ));
        }

        if let Some(pattern) = &check.expected_body {
            let body = response
                .text()
                .await
                .map_err(|e| (Some(status), format!("failed to read body: {}", e)))?;
            if !pattern.is_match(&body) {
                return Err((
                    Some(status),
                    format!("response body does not match /{}/", pattern.as_str()),
                ));
            }
        }

        Ok(status)
    }
}

#[async_trait]
impl HealthProbe for HttpProber {
    async fn probe(
        &self,
        url: &str,
        check: &HealthCheckSpec,
        cancel: &CancellationToken,
    ) -> HealthCheckResult {
        let deadline = Instant::now() + check.timeout;
        let mut result = HealthCheckResult {
            url: url.to_string(),
            success: false,
            status_code: None,
            response_time_ms: 0,
            attempts: 0,
            last_error: None,
        };

        debug!("Probing {} (timeout {:?})", url, check.timeout);
        loop {
            result.attempts += 1;

            // The first attempt always gets its full request budget
            let remaining = deadline.saturating_duration_since(Instant::now());
            let budget = if result.attempts == 1 || remaining.is_zero() {
                check.request_timeout
            } else {
                check.request_timeout.min(remaining)
            };

            let started = Instant::now();
            let attempt = tokio::select! {
                attempt = self.attempt(url, check, budget) => attempt,
                _ = cancel.cancelled() => return cancelled(result),
            };
            result.response_time_ms = started.elapsed().as_millis() as u64;

            match attempt {
                Ok(status) => {
                    result.success = true;
                    result.status_code = Some(status);
                    result.last_error = None;
                    info!("{} healthy after {} attempt(s)", url, result.attempts);
                    return result;
                }
                Err((status, error)) => {
                    debug!("Probe attempt {} for {} failed: {}", result.attempts, url, error);
                    result.status_code = status;
                    result.last_error = Some(error);
                }
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            tokio::select! {
                _ = tokio::time::sleep(check.retry_interval.min(remaining)) => {}
                _ = cancel.cancelled() => return cancelled(result),
            }
            if Instant::now() >= deadline {
                break;
            }
        }

        warn!(
            "{} unhealthy after {} attempt(s): {}",
            url,
            result.attempts,
            result.last_error.as_deref().unwrap_or("unknown error")
        );
        result
    }
}

fn cancelled(mut result: HealthCheckResult) -> HealthCheckResult {
    result.success = false;
    result.last_error = Some("cancelled".to_string());
    result
}

fn describe(error: &reqwest::Error) -> String {
    if error.is_timeout() {
        "request timed out".to_string()
    } else if error.is_connect() {
        format!("connection failed: {}", error)
    } else {
        error.to_string()
    }
}
