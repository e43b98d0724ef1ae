//! Strategy scheduler
//!
//! Every strategy is a traversal over (component x server) built on one
//! per-unit step: build a fresh context, resolve the action, run it,
//! optionally probe, then append the outcome to the sink.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures::stream::{self, StreamExt};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::catalog::{Catalog, Environment};
use crate::deploy::executor::{ActionRequest, ActionRunner};
use crate::deploy::health::{HealthCheckSpec, HealthProbe};
use crate::errors::OrchestratorError;
use crate::models::component::{Category, Component};
use crate::models::outcome::{ActionOutcome, ActionStatus, ServerHealthCheck, UnitKey};
use crate::models::run::{Phase, Strategy};

/// Scheduler options
#[derive(Debug, Clone)]
pub struct ScheduleOptions {
    pub phase: Phase,
    pub strategy: Strategy,

    /// Units running at once; rolling never runs two servers at once
    pub max_parallel: usize,

    /// Stop starting new units after the first failure
    pub stop_on_first_failure: bool,

    /// Per-action timeout
    pub action_timeout: Duration,

    pub dry_run: bool,
    pub skip_health_check: bool,
}

impl Default for ScheduleOptions {
    fn default() -> Self {
        Self {
            phase: Phase::Deploy,
            strategy: Strategy::ByComponent,
            max_parallel: 1,
            stop_on_first_failure: false,
            action_timeout: Duration::from_secs(1800),
            dry_run: false,
            skip_health_check: false,
        }
    }
}

/// Everything a scheduling run produced
#[derive(Debug, Clone, Default)]
pub struct ScheduleResult {
    /// Outcomes in schedule order
    pub outcomes: Vec<ActionOutcome>,

    /// Server-level probes (by-server and rolling)
    pub health_checks: Vec<ServerHealthCheck>,

    pub halt_reason: Option<String>,
    pub cancelled: bool,
}

/// Append-only outcome collection shared by concurrent units.
///
/// A second outcome for the same unit is rejected.
#[derive(Debug, Default)]
pub struct OutcomeSink {
    inner: Mutex<SinkInner>,
    halted: AtomicBool,
}

#[derive(Debug, Default)]
struct SinkInner {
    outcomes: Vec<(usize, ActionOutcome)>,
    seen: HashSet<UnitKey>,
    health_checks: Vec<ServerHealthCheck>,
    halt_reason: Option<String>,
}

impl OutcomeSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an outcome; returns false if its unit already has one
    pub async fn push(&self, seq: usize, outcome: ActionOutcome) -> bool {
        let mut inner = self.inner.lock().await;
        if !inner.seen.insert(outcome.unit_key()) {
            error!("Rejected duplicate outcome for {}", outcome.unit_key());
            return false;
        }
        inner.outcomes.push((seq, outcome));
        true
    }

    pub async fn record_health(&self, check: ServerHealthCheck) {
        self.inner.lock().await.health_checks.push(check);
    }

    /// Stop further units from starting. The first reason is kept.
    pub async fn halt(&self, reason: String) {
        let mut inner = self.inner.lock().await;
        if inner.halt_reason.is_none() {
            warn!("Halting: {}", reason);
            inner.halt_reason = Some(reason);
        }
        self.halted.store(true, Ordering::SeqCst);
    }

    pub fn is_halted(&self) -> bool {
        self.halted.load(Ordering::SeqCst)
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.outcomes.len()
    }

    /// Outcomes sorted into schedule order, probes and halt reason
    pub fn into_parts(self) -> (Vec<ActionOutcome>, Vec<ServerHealthCheck>, Option<String>) {
        let mut inner = self.inner.into_inner();
        inner.outcomes.sort_by_key(|(seq, _)| *seq);
        (
            inner.outcomes.into_iter().map(|(_, outcome)| outcome).collect(),
            inner.health_checks,
            inner.halt_reason,
        )
    }
}

struct Unit<'a> {
    seq: usize,
    component: &'a Component,
    server: Option<String>,
}

/// Drives one scheduling run
pub struct Scheduler<'a> {
    catalog: &'a Catalog,
    environment: Option<&'a Environment>,
    components: Vec<&'a Component>,
    servers: Vec<String>,
    runner: &'a dyn ActionRunner,
    prober: &'a dyn HealthProbe,
    options: ScheduleOptions,
    cancel: CancellationToken,

    /// Environment-level probe, used once per server
    server_probe: Option<HealthCheckSpec>,

    /// Per-unit probes with component overrides applied
    unit_probes: HashMap<(Category, String), Option<HealthCheckSpec>>,
}

impl<'a> Scheduler<'a> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        catalog: &'a Catalog,
        environment: Option<&'a Environment>,
        components: Vec<&'a Component>,
        servers: Vec<String>,
        runner: &'a dyn ActionRunner,
        prober: &'a dyn HealthProbe,
        options: ScheduleOptions,
        cancel: CancellationToken,
    ) -> Result<Self, OrchestratorError> {
        if options.phase == Phase::Deploy && servers.is_empty() {
            return Err(OrchestratorError::NoServers(
                "deploy scheduling requires at least one target server".to_string(),
            ));
        }

        let mut server_probe = None;
        let mut unit_probes = HashMap::new();
        if let (Phase::Deploy, Some(environment)) = (options.phase, environment) {
            server_probe = HealthCheckSpec::from_settings(&environment.health_check)?;
            for component in &components {
                let settings = match &component.health_check {
                    Some(overrides) => environment.health_check.overlay(overrides),
                    None => environment.health_check.clone(),
                };
                unit_probes.insert(
                    (component.category, component.name.clone()),
                    HealthCheckSpec::from_settings(&settings)?,
                );
            }
        }

        Ok(Self {
            catalog,
            environment,
            components,
            servers,
            runner,
            prober,
            options,
            cancel,
            server_probe,
            unit_probes,
        })
    }

    fn probes_enabled(&self) -> bool {
        self.options.phase == Phase::Deploy && !self.options.dry_run && !self.options.skip_health_check
    }

    /// Run the selected strategy to completion, halt or cancellation
    pub async fn run(&self) -> ScheduleResult {
        let sink = OutcomeSink::new();
        info!(
            "Scheduling {} of {} component(s) across {} server(s) using {}",
            self.options.phase,
            self.components.len(),
            self.servers.len(),
            self.options.strategy
        );

        match (self.options.phase, self.options.strategy) {
            (Phase::Build, _) => {
                let units = self
                    .components
                    .iter()
                    .enumerate()
                    .map(|(seq, component)| Unit {
                        seq,
                        component,
                        server: None,
                    })
                    .collect();
                self.run_batch(units, &sink, false).await;
            }
            (Phase::Deploy, Strategy::ByComponent) => {
                let units = self
                    .components
                    .iter()
                    .flat_map(|component| {
                        self.servers.iter().map(move |server| (component, server))
                    })
                    .enumerate()
                    .map(|(seq, (component, server))| Unit {
                        seq,
                        component,
                        server: Some(server.clone()),
                    })
                    .collect();
                self.run_batch(units, &sink, true).await;
            }
            (Phase::Deploy, Strategy::ByServer) => self.run_by_server(&sink, false).await,
            (Phase::Deploy, Strategy::Rolling) => self.run_by_server(&sink, true).await,
        }

        let cancelled = self.cancel.is_cancelled();
        if cancelled {
            warn!("Run cancelled after {} outcome(s)", sink.len().await);
        }
        let (outcomes, health_checks, halt_reason) = sink.into_parts();
        ScheduleResult {
            outcomes,
            health_checks,
            halt_reason,
            cancelled,
        }
    }

    /// Servers outer, components inner. Rolling stops at the first server
    /// that fails a unit or its probe.
    async fn run_by_server(&self, sink: &OutcomeSink, rolling: bool) {
        let mut seq = 0;
        for (index, server) in self.servers.iter().enumerate() {
            if self.cancel.is_cancelled() || sink.is_halted() {
                break;
            }
            let next = self.servers.get(index + 1).map(|next| (index + 2, next));

            info!("Server {}/{}: {}", index + 1, self.servers.len(), server);
            let units: Vec<Unit> = self
                .components
                .iter()
                .map(|component| {
                    seq += 1;
                    Unit {
                        seq,
                        component,
                        server: Some(server.clone()),
                    }
                })
                .collect();
            let failures = self.run_batch(units, sink, false).await;

            if self.cancel.is_cancelled() || sink.is_halted() {
                break;
            }

            if rolling && failures > 0 {
                if let Some((number, next)) = next {
                    sink.halt(format!(
                        "halted before server {} ({}): {} unit(s) failed on {}",
                        number, next, failures, server
                    ))
                    .await;
                }
                break;
            }

            let Some(check) = self.server_probe.as_ref().filter(|_| self.probes_enabled()) else {
                continue;
            };
            let Some(environment) = self.environment else {
                continue;
            };

            let url = check.url_for(&self.catalog.server_context(environment, server));
            let result = self.prober.probe(&url, check, &self.cancel).await;
            let healthy = result.success;
            sink.record_health(ServerHealthCheck {
                server: server.clone(),
                checked_at: chrono::Utc::now(),
                result,
            })
            .await;

            if rolling && !healthy {
                let reason = match next {
                    Some((number, next)) => format!(
                        "halted before server {} ({}): health check failed on {}",
                        number, next, server
                    ),
                    None => format!("health check failed on {} (last server)", server),
                };
                sink.halt(reason).await;
                break;
            }
        }
    }

    /// Run units with bounded parallelism; returns the number of failures
    async fn run_batch(&self, units: Vec<Unit<'_>>, sink: &OutcomeSink, probe_units: bool) -> usize {
        stream::iter(units)
            .map(|unit| self.run_unit(unit, sink, probe_units))
            .buffered(self.options.max_parallel.max(1))
            .fold(0, |failures, failed| async move { failures + usize::from(failed) })
            .await
    }

    /// The per-unit primitive. Returns true when the unit failed.
    async fn run_unit(&self, unit: Unit<'_>, sink: &OutcomeSink, probe_unit: bool) -> bool {
        if self.cancel.is_cancelled() || sink.is_halted() {
            return false;
        }

        let component = unit.component;
        let (context, spec) = self.catalog.unit_action(
            self.environment,
            component,
            unit.server.as_deref(),
            self.options.phase,
        );

        let request = ActionRequest {
            component: component.name.clone(),
            category: component.category,
            phase: self.options.phase,
            server: unit.server.clone(),
            workspace: self.catalog.workspace().to_path_buf(),
            spec,
            timeout: self.options.action_timeout,
            dry_run: self.options.dry_run,
        };
        let mut outcome = self.runner.run(request, &self.cancel).await;

        if probe_unit && outcome.status == ActionStatus::Success && self.probes_enabled() {
            let check = self
                .unit_probes
                .get(&(component.category, component.name.clone()))
                .and_then(Option::as_ref);
            if let Some(check) = check {
                let url = check.url_for(&context);
                let result = self.prober.probe(&url, check, &self.cancel).await;
                outcome = outcome.with_health_check(result);
            }
        }

        let failed = outcome.is_failure();
        let key = outcome.unit_key();
        debug!("{} -> {:?}", key, outcome.status);
        sink.push(unit.seq, outcome).await;

        if failed && self.options.stop_on_first_failure {
            sink.halt(format!("stopped after first failure: {}", key)).await;
        }
        failed
    }
}
