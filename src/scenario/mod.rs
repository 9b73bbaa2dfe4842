//! Scenario runner.
//!
//! A scenario walks a fixed phase sequence
//! (`Idle → ProvisioningCerts? → Launching → Warmup → Executing → Verifying →
//! LogCollection → Teardown → Idle`) against the local node and a target node.
//! The target is the remote node when one is configured and the local node
//! otherwise, so scenario bodies never branch on node kind.
//!
//! [`run_guarded`] races the body against a shutdown future and drains the
//! run context's teardown list whichever way the body ends.

mod health;
mod proxy_chain;
mod seal;

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::artifacts::Artifacts;
use crate::config::HarnessConfig;
use crate::error::{HarnessError, Result};
use crate::node::Node;
use crate::teardown::Teardown;

pub use health::{
    CheckResult, HealthCheck, HealthOptions, HealthSummary, DEFAULT_HEALTH_PORT, HEALTH_CHECKS,
    HEALTH_CID,
};
pub use proxy_chain::{ProxyChainOptions, ProxyChainReport};
pub use seal::{SealOptions, SealReport, DEFAULT_VSOCK_PORT};

/// Scenarios in the order the driver runs them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Scenario {
    SealedStorage,
    HealthMonitor,
    ProxyChain,
}

impl Scenario {
    pub fn name(&self) -> &'static str {
        match self {
            Self::SealedStorage => "seal",
            Self::HealthMonitor => "health",
            Self::ProxyChain => "proxy",
        }
    }
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Orchestration phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Building,
    ProvisioningCerts,
    Launching,
    Warmup,
    Executing,
    Verifying,
    LogCollection,
    Teardown,
}

/// Phase tracker for one scenario execution.
#[derive(Debug, Clone)]
pub struct ScenarioRun {
    scenario: Scenario,
    phase: Phase,
    history: Vec<Phase>,
}

impl ScenarioRun {
    pub fn new(scenario: Scenario) -> Self {
        Self {
            scenario,
            phase: Phase::Idle,
            history: vec![Phase::Idle],
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Every phase entered so far, in order.
    pub fn history(&self) -> &[Phase] {
        &self.history
    }

    pub fn enter(&mut self, phase: Phase) {
        info!(scenario = %self.scenario, from = ?self.phase, to = ?phase, "phase transition");
        self.phase = phase;
        self.history.push(phase);
    }
}

/// Everything a scenario needs, shared by every scenario of one run.
pub struct RunContext {
    pub local: Arc<dyn Node>,
    pub remote: Option<Arc<dyn Node>>,
    pub config: HarnessConfig,
    pub artifacts: Artifacts,
    pub teardown: Teardown,
    /// Scenario verification failures fail the run.
    pub strict: bool,
}

impl RunContext {
    pub fn new(local: Arc<dyn Node>, remote: Option<Arc<dyn Node>>, config: HarnessConfig) -> Self {
        let artifacts = Artifacts::new(config.root.clone());
        Self {
            local,
            remote,
            config,
            artifacts,
            teardown: Teardown::new(),
            strict: false,
        }
    }

    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Node hosting the scenario's remote half.
    pub fn target(&self) -> &Arc<dyn Node> {
        self.remote.as_ref().unwrap_or(&self.local)
    }

    pub fn has_remote(&self) -> bool {
        self.remote.is_some()
    }

    async fn pause(&self, duration: Duration) {
        if !duration.is_zero() {
            tokio::time::sleep(duration).await;
        }
    }
}

/// A scenario together with its parameters.
#[derive(Debug, Clone)]
pub enum ScenarioSpec {
    SealedStorage(SealOptions),
    HealthMonitor(HealthOptions),
    ProxyChain(ProxyChainOptions),
}

impl ScenarioSpec {
    pub fn scenario(&self) -> Scenario {
        match self {
            Self::SealedStorage(_) => Scenario::SealedStorage,
            Self::HealthMonitor(_) => Scenario::HealthMonitor,
            Self::ProxyChain(_) => Scenario::ProxyChain,
        }
    }
}

#[derive(Debug, Clone)]
pub enum ScenarioOutcome {
    SealedStorage(SealReport),
    HealthMonitor(HealthSummary),
    ProxyChain(ProxyChainReport),
}

#[derive(Debug, Clone)]
pub struct ScenarioReport {
    pub scenario: Scenario,
    pub phases: Vec<Phase>,
    pub outcome: ScenarioOutcome,
}

/// Run `spec` to completion, then drain teardown.
pub async fn run(spec: &ScenarioSpec, ctx: &RunContext) -> Result<ScenarioReport> {
    run_guarded(spec, ctx, std::future::pending()).await
}

/// Run `spec` until it finishes or `shutdown` resolves, then drain teardown.
///
/// A resolved `shutdown` cancels the body at its current await point and
/// yields [`HarnessError::Interrupted`] once teardown has completed.
pub async fn run_guarded<F>(
    spec: &ScenarioSpec,
    ctx: &RunContext,
    shutdown: F,
) -> Result<ScenarioReport>
where
    F: Future<Output = ()>,
{
    let scenario = spec.scenario();
    let mut run = ScenarioRun::new(scenario);
    info!(%scenario, "scenario started");

    let outcome = tokio::select! {
        result = execute(spec, ctx, &mut run) => result,
        _ = shutdown => {
            warn!(%scenario, "termination signal received");
            Err(HarnessError::Interrupted)
        }
    };

    run.enter(Phase::Teardown);
    ctx.teardown.drain().await;
    run.enter(Phase::Idle);

    match &outcome {
        Ok(_) => info!(%scenario, "scenario finished"),
        Err(e) => warn!(%scenario, error = %e, "scenario failed"),
    }
    outcome.map(|outcome| ScenarioReport {
        scenario,
        phases: run.history,
        outcome,
    })
}

async fn execute(
    spec: &ScenarioSpec,
    ctx: &RunContext,
    run: &mut ScenarioRun,
) -> Result<ScenarioOutcome> {
    match spec {
        ScenarioSpec::SealedStorage(opts) => seal::run(opts, ctx, run)
            .await
            .map(ScenarioOutcome::SealedStorage),
        ScenarioSpec::HealthMonitor(opts) => health::run(opts, ctx, run)
            .await
            .map(ScenarioOutcome::HealthMonitor),
        ScenarioSpec::ProxyChain(opts) => proxy_chain::run(opts, ctx, run)
            .await
            .map(ScenarioOutcome::ProxyChain),
    }
}
