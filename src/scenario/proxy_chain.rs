//! Proxy-chain scenario.
//!
//! ```text
//! client → SOCKS5 router (local :8116) → reverse router (target :8117/:8115)
//!        → HTTP echo (target :8118)
//! ```
//!
//! The local node always runs the forward router. The target node runs the
//! reverse router and the echo responder.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;

use super::{Phase, RunContext, ScenarioRun};
use crate::artifacts::{ECHO_SCRIPT, ROUTER_BINARY};
use crate::certs::{generate_certificate, AttestationMode, GEN_CERT_BINARY};
use crate::error::{HarnessError, Result};
use crate::logs::print_log;
use crate::node::{Node, NodeCommand};
use crate::probe::{proxy_url, target_url, Probe, ProbeResponse};
use crate::proxy_config::{
    self, reverse_proxy_port, NodeConfig, ReversePolicy, FORWARD_CONFIG_FILE, HTTP_TARGET_PORT,
    REVERSE_CONFIG_FILE, SOCKS5_PORT,
};

const LOCAL_PROXY_LOG: &str = "local-proxy.log";
const TARGET_PROXY_LOG: &str = "target-proxy.log";
const ECHO_LOG: &str = "http.log";
const ECHO_INTERPRETER: &str = "python3";

const REQUEST_COUNT: usize = 2;

/// Stale daemons swept on the target node.
const TARGET_PATTERN: &str = "router|http-echo.py";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyChainOptions {
    pub fwd_tdx: AttestationMode,
    pub rev_tdx: AttestationMode,
    pub rev_policy: ReversePolicy,
    /// Forward policy; empty selects `any` and sends no proxy credentials.
    pub fwd_policy: String,
    pub local_config: Option<PathBuf>,
    pub remote_config: Option<PathBuf>,
}

impl Default for ProxyChainOptions {
    fn default() -> Self {
        Self {
            fwd_tdx: AttestationMode::FakeTdx,
            rev_tdx: AttestationMode::FakeTdx,
            rev_policy: ReversePolicy::Any,
            fwd_policy: String::new(),
            local_config: None,
            remote_config: None,
        }
    }
}

impl ProxyChainOptions {
    pub fn local_cert_name(&self) -> String {
        format!("local_proxy_{}", self.fwd_tdx)
    }

    pub fn target_cert_name(&self) -> String {
        format!("target_proxy_{}", self.rev_tdx)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyChainReport {
    pub target_address: String,
    pub reverse_port: u16,
    /// Responses received, in request order.
    pub responses: Vec<ProbeResponse>,
    /// Error that ended the request loop early.
    pub error: Option<String>,
}

impl ProxyChainReport {
    pub fn all_succeeded(&self) -> bool {
        self.error.is_none()
            && self.responses.len() == REQUEST_COUNT
            && self.responses.iter().all(ProbeResponse::is_success)
    }
}

/// Place router, gen-cert and the echo responder on a remote target.
async fn stage_remote(ctx: &RunContext, target: &Arc<dyn Node>) -> Result<PathBuf> {
    let staging = ctx.config.staging_dir.clone();
    println!("Copying binaries to {}...", target.label());
    target
        .copy(&ctx.artifacts.router(), &staging.join(ROUTER_BINARY))
        .await?;
    target
        .copy(&ctx.artifacts.gen_cert(), &staging.join(GEN_CERT_BINARY))
        .await?;
    target
        .copy(&ctx.config.echo_script, &staging.join(ECHO_SCRIPT))
        .await?;
    Ok(staging)
}

async fn send_requests(probe: &Probe, url: &str, report: &mut ProxyChainReport) {
    for i in 1..=REQUEST_COUNT {
        match probe.get(url).await {
            Ok(response) => {
                println!("→ Request {i}: {}: {}", response.status, response.body.trim());
                report.responses.push(response);
            }
            Err(e) => {
                report.error = Some(e.to_string());
                return;
            }
        }
    }
}

pub(super) async fn run(
    opts: &ProxyChainOptions,
    ctx: &RunContext,
    run: &mut ScenarioRun,
) -> Result<ProxyChainReport> {
    println!("=== Running Proxy Test ===");

    let local = &ctx.local;
    let target = ctx.target();
    let address = target.address().to_string();
    let rev_port = reverse_proxy_port(ctx.has_remote());

    println!("Local SOCKS5 proxy: localhost:{SOCKS5_PORT}");
    println!("Target reverse proxy: {address}:{rev_port} -> {address}:{HTTP_TARGET_PORT}");
    println!(
        "Target is {}",
        if ctx.has_remote() { "remote" } else { "local" }
    );

    run.enter(Phase::ProvisioningCerts);
    let target_dir = if ctx.has_remote() {
        stage_remote(ctx, target).await?
    } else {
        ctx.artifacts.root().to_path_buf()
    };
    let local_cert = opts.local_cert_name();
    let target_cert = opts.target_cert_name();
    println!("Generating local certificate: {local_cert}");
    generate_certificate(local.as_ref(), ctx.artifacts.root(), opts.fwd_tdx, &local_cert).await?;
    println!("Generating target certificate: {target_cert}");
    generate_certificate(target.as_ref(), &target_dir, opts.rev_tdx, &target_cert).await?;

    run.enter(Phase::Launching);
    println!("Killing existing processes");
    local.kill(ROUTER_BINARY).await;
    target.kill(TARGET_PATTERN).await;
    ctx.teardown.register_pattern(local, ROUTER_BINARY);
    ctx.teardown.register_pattern(target, TARGET_PATTERN);

    let forward = proxy_config::resolve(
        opts.local_config.as_deref(),
        &ctx.config.config_dir.join(FORWARD_CONFIG_FILE),
        || NodeConfig::forward(&local_cert, &opts.fwd_policy),
    )?;
    let local_cmd = NodeCommand::path(&ctx.artifacts.router())
        .arg("--config")
        .arg(forward.display().to_string());
    println!("Local command: {local_cmd}");
    let pid = local.spawn(&local_cmd, Path::new(LOCAL_PROXY_LOG)).await?;
    ctx.teardown.register_process(local, pid);

    let reverse = proxy_config::resolve(
        opts.remote_config.as_deref(),
        &ctx.config.config_dir.join(REVERSE_CONFIG_FILE),
        || NodeConfig::reverse(&target_cert, opts.rev_policy.as_str(), rev_port),
    )?;
    target.copy(&reverse, &reverse).await?;
    let target_cmd = NodeCommand::path(&target_dir.join(ROUTER_BINARY))
        .arg("--config")
        .arg(reverse.display().to_string());
    println!("Target command: {target_cmd}");
    let pid = target.spawn(&target_cmd, Path::new(TARGET_PROXY_LOG)).await?;
    ctx.teardown.register_process(target, pid);

    println!("Starting HTTP echo server on target node (port {HTTP_TARGET_PORT})");
    let echo_cmd = NodeCommand::new(ECHO_INTERPRETER)
        .arg(target_dir.join(ECHO_SCRIPT).display().to_string());
    let pid = target.spawn(&echo_cmd, Path::new(ECHO_LOG)).await?;
    ctx.teardown.register_process(target, pid);

    run.enter(Phase::Warmup);
    println!("Waiting for services to start...");
    ctx.pause(ctx.config.warmups.proxy_startup).await;

    run.enter(Phase::Executing);
    println!("Testing proxy chain...");
    println!(
        "Route: Client -> SOCKS5(localhost:{SOCKS5_PORT}) -> Reverse({address}:{rev_port}) -> HTTP({address}:{HTTP_TARGET_PORT})"
    );
    let mut report = ProxyChainReport {
        target_address: address.clone(),
        reverse_port: rev_port,
        responses: Vec::new(),
        error: None,
    };
    let url = target_url(&address, rev_port);
    let proxy = proxy_url(&opts.fwd_policy);
    debug!(%url, %proxy, "probing proxy chain");
    match Probe::new(&proxy, ctx.config.request_timeout) {
        Ok(probe) => send_requests(&probe, &url, &mut report).await,
        Err(e) => report.error = Some(e.to_string()),
    }

    run.enter(Phase::Verifying);
    if let Some(err) = &report.error {
        println!("Request failed: {err}");
        run.enter(Phase::LogCollection);
        let lines = ctx.config.log_tail_lines;
        print_log("Local SOCKS5 Proxy", Path::new(LOCAL_PROXY_LOG), local.as_ref(), lines).await;
        print_log(
            "Target Reverse Proxy",
            Path::new(TARGET_PROXY_LOG),
            target.as_ref(),
            lines,
        )
        .await;
    }

    if ctx.strict {
        if let Some(err) = &report.error {
            return Err(HarnessError::Request(err.clone()));
        }
        if let Some(bad) = report.responses.iter().find(|r| !r.is_success()) {
            return Err(HarnessError::Request(format!(
                "proxy chain answered with status {}",
                bad.status
            )));
        }
    }
    Ok(report)
}
