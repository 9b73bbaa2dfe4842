//! Collaborator executables: one build per run and their on-disk layout.

use std::path::{Path, PathBuf};

use tracing::info;

use crate::certs::GEN_CERT_BINARY;
use crate::error::Result;
use crate::node::{Node, NodeCommand};

/// Targets handed to the build tool, built in a single invocation.
pub const BUILD_TARGETS: &[&str] = &[
    GEN_CERT_BINARY,
    ROUTER_BINARY,
    SEAL_SERVER_BINARY,
    SEAL_CLIENT_BINARY,
    HEALTH_MONITOR_BINARY,
    HEALTH_CLIENT_BINARY,
];

pub const ROUTER_BINARY: &str = "router";
pub const SEAL_SERVER_BINARY: &str = "seal-server";
pub const SEAL_CLIENT_BINARY: &str = "seal-client";
pub const HEALTH_MONITOR_BINARY: &str = "health-monitor";
pub const HEALTH_CLIENT_BINARY: &str = "health-client";
pub const ECHO_SCRIPT: &str = "http-echo.py";

const ENCLAVE_DIR: &str = "sgx-enclave";

/// Paths of the built executables below one build root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifacts {
    root: PathBuf,
}

impl Artifacts {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn router(&self) -> PathBuf {
        self.root.join(ROUTER_BINARY)
    }

    pub fn gen_cert(&self) -> PathBuf {
        self.root.join(GEN_CERT_BINARY)
    }

    pub fn seal_server(&self) -> PathBuf {
        self.root.join(ENCLAVE_DIR).join(SEAL_SERVER_BINARY)
    }

    pub fn seal_client(&self) -> PathBuf {
        self.root.join(ENCLAVE_DIR).join(SEAL_CLIENT_BINARY)
    }

    pub fn health_monitor(&self) -> PathBuf {
        self.root.join(HEALTH_MONITOR_BINARY)
    }

    pub fn health_client(&self) -> PathBuf {
        self.root.join(HEALTH_CLIENT_BINARY)
    }
}

/// Run `tool` once on `node` for every entry of [`BUILD_TARGETS`].
pub async fn build(node: &dyn Node, tool: &str) -> Result<()> {
    info!(tool, targets = BUILD_TARGETS.len(), "building collaborator executables");
    let cmd = NodeCommand::new(tool).args(BUILD_TARGETS.iter().copied());
    node.run(&cmd).await
}
