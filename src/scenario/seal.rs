//! Sealed-storage scenario: seal server on the local node, seal client on
//! the target node, both talking over a vsock port.

use std::path::Path;

use super::{Phase, RunContext, ScenarioRun};
use crate::artifacts::{SEAL_CLIENT_BINARY, SEAL_SERVER_BINARY};
use crate::error::Result;
use crate::logs::print_log;
use crate::node::{NodeCommand, ProcessId};

pub const DEFAULT_VSOCK_PORT: u16 = 12345;

const SERVER_LOG: &str = "seal-server.log";
const CLIENT_LOG: &str = "seal-client.log";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealOptions {
    pub vsock_port: u16,
}

impl Default for SealOptions {
    fn default() -> Self {
        Self {
            vsock_port: DEFAULT_VSOCK_PORT,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealReport {
    pub vsock_port: u16,
    pub server: ProcessId,
    pub client: ProcessId,
}

pub(super) async fn run(
    opts: &SealOptions,
    ctx: &RunContext,
    run: &mut ScenarioRun,
) -> Result<SealReport> {
    println!("=== Running Seal Test ===");
    println!("Using VSOCK port: {}", opts.vsock_port);

    let local = &ctx.local;
    let target = ctx.target();
    let port = opts.vsock_port.to_string();

    run.enter(Phase::Launching);
    local.kill(SEAL_SERVER_BINARY).await;
    target.kill(SEAL_CLIENT_BINARY).await;
    ctx.teardown.register_pattern(local, SEAL_SERVER_BINARY);
    ctx.teardown.register_pattern(target, SEAL_CLIENT_BINARY);

    println!("Starting seal-server locally on port {port}...");
    let server_cmd = NodeCommand::path(&ctx.artifacts.seal_server())
        .args(["--port", port.as_str()])
        .elevated();
    let server = local.spawn(&server_cmd, Path::new(SERVER_LOG)).await?;
    ctx.teardown.register_process(local, server);

    run.enter(Phase::Warmup);
    ctx.pause(ctx.config.warmups.seal_settle).await;

    run.enter(Phase::Executing);
    println!("Running seal-client on {} on port {port}...", target.label());
    let staged = ctx.config.staging_dir.join(SEAL_CLIENT_BINARY);
    target.copy(&ctx.artifacts.seal_client(), &staged).await?;
    let client_cmd = NodeCommand::path(&staged)
        .args(["--port", port.as_str(), "--skip-validation"])
        .elevated();
    let client = target.spawn(&client_cmd, Path::new(CLIENT_LOG)).await?;
    ctx.teardown.register_process(target, client);
    ctx.pause(ctx.config.warmups.seal_complete).await;

    run.enter(Phase::LogCollection);
    let lines = ctx.config.log_tail_lines;
    print_log("Seal Server", Path::new(SERVER_LOG), local.as_ref(), lines).await;
    print_log("Seal Client", Path::new(CLIENT_LOG), target.as_ref(), lines).await;

    Ok(SealReport {
        vsock_port: opts.vsock_port,
        server,
        client,
    })
}
