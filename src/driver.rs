//! Top-level run: build, node setup, scenarios, orphan sweep, close.
//!
//! Everything after node setup happens inside one guaranteed-release scope:
//! whatever the scenarios do (finish, fail, or get interrupted by SIGINT or
//! SIGTERM) the teardown list is drained, both nodes are swept for orphaned
//! daemons and the remote session is closed before the result is returned.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use dialoguer::Password;
use tracing::{info, warn};

use crate::artifacts;
use crate::cli::Cli;
use crate::config::HarnessConfig;
use crate::error::{HarnessError, Result};
use crate::node::{LocalNode, Node, RemoteNode, RemoteTarget, SshAuth};
use crate::scenario::{self, RunContext, ScenarioReport, ScenarioSpec};
use crate::teardown::Teardown;

/// Daemons the local node may have left behind.
pub const LOCAL_SWEEP_PATTERN: &str = "router|seal-server|health-client";
/// Daemons the target node may have left behind.
pub const TARGET_SWEEP_PATTERN: &str = "router|http-echo.py|seal-client|health-monitor";

/// Run the harness as described by `cli`.
pub async fn run(cli: &Cli, config: HarnessConfig) -> Result<Vec<ScenarioReport>> {
    let local: Arc<dyn Node> = Arc::new(LocalNode::new());

    if cli.skip_build {
        info!("skipping build");
    } else {
        info!(phase = ?scenario::Phase::Building, "building");
        artifacts::build(local.as_ref(), &config.build_tool).await?;
    }

    let remote: Option<Arc<dyn Node>> = match &cli.remote {
        Some(target) => {
            let auth = resolve_auth(target, &cli.password).await?;
            let node = RemoteNode::connect(target.clone(), cli.ssh_port, auth).await?;
            Some(Arc::new(node))
        }
        None => None,
    };

    let ctx = RunContext::new(local, remote, config).strict(cli.strict);
    execute(&cli.plan(), &ctx, shutdown_signal()).await
}

/// Run `plan` in order, stopping at the first failure or when `shutdown`
/// resolves, then release everything the run touched.
pub async fn execute<F>(
    plan: &[ScenarioSpec],
    ctx: &RunContext,
    shutdown: F,
) -> Result<Vec<ScenarioReport>>
where
    F: Future<Output = ()>,
{
    tokio::pin!(shutdown);
    let mut reports = Vec::with_capacity(plan.len());
    let mut failure = None;

    for spec in plan {
        match scenario::run_guarded(spec, ctx, shutdown.as_mut()).await {
            Ok(report) => reports.push(report),
            Err(e) => {
                failure = Some(e);
                break;
            }
        }
    }

    release(ctx).await;

    if failure.is_none() && signalled(shutdown.as_mut()).await {
        warn!("termination signal received during release");
        failure = Some(HarnessError::Interrupted);
    }

    match failure {
        Some(e) => Err(e),
        None => Ok(reports),
    }
}

/// Drain leftovers, sweep both nodes and close the remote session.
async fn release(ctx: &RunContext) {
    ctx.teardown.drain().await;

    let sweep = Teardown::new();
    sweep.register_pattern(&ctx.local, LOCAL_SWEEP_PATTERN);
    sweep.register_pattern(ctx.target(), TARGET_SWEEP_PATTERN);
    sweep.drain().await;

    if let Some(remote) = &ctx.remote {
        if let Err(e) = remote.close().await {
            warn!(node = remote.label(), error = %e, "closing remote session failed");
        }
    }
}

/// Whether `shutdown` has already resolved, without waiting for it.
async fn signalled<F>(shutdown: Pin<&mut F>) -> bool
where
    F: Future<Output = ()>,
{
    tokio::select! {
        biased;
        _ = shutdown => true,
        _ = std::future::ready(()) => false,
    }
}

/// Password from the command line, or prompted for. An empty answer falls
/// back to the ssh-agent.
async fn resolve_auth(target: &RemoteTarget, password: &str) -> Result<SshAuth> {
    if !password.is_empty() {
        return Ok(SshAuth::Password(password.to_string()));
    }
    let prompt = format!("SSH password for {target}");
    let answer = tokio::task::spawn_blocking(move || {
        Password::new()
            .with_prompt(prompt)
            .allow_empty_password(true)
            .interact()
    })
    .await
    .map_err(|e| HarnessError::Session(format!("password prompt failed: {e}")))?
    .map_err(|e| HarnessError::Session(format!("password prompt failed: {e}")))?;

    if answer.is_empty() {
        info!(remote = %target, "no password given, using ssh-agent");
        Ok(SshAuth::Agent)
    } else {
        Ok(SshAuth::Password(answer))
    }
}

/// Resolves on SIGINT or SIGTERM. If a handler cannot be installed the
/// corresponding signal is never reported.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
