//! Router configuration descriptors.
//!
//! The router executable reads one JSON file describing the certificate to
//! present and the listeners to open. The harness writes a forward
//! descriptor for the local node (SOCKS5 ingress) and a reverse descriptor
//! for the target node (attested reverse proxy in front of the HTTP echo
//! service). Files are left on disk after the run for inspection.

use std::path::{Path, PathBuf};

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{HarnessError, Result};

/// Local SOCKS5 listener.
pub const SOCKS5_PORT: u16 = 8116;
/// Reverse proxy listener when the target is a remote node.
pub const REMOTE_REVERSE_PORT: u16 = 8117;
/// Reverse proxy listener when the target is the local node. Distinct from
/// [`REMOTE_REVERSE_PORT`] so both proxies can share one host.
pub const LOCAL_REVERSE_PORT: u16 = 8115;
/// HTTP echo service behind the reverse proxy.
pub const HTTP_TARGET_PORT: u16 = 8118;
/// Host the reverse proxy forwards to, as seen from the target node.
pub const HTTP_TARGET_HOST: &str = "localhost";

/// Policy applied when the forward policy is left empty.
pub const DEFAULT_POLICY: &str = "any";

pub const FORWARD_CONFIG_FILE: &str = "local-proxy-config.json";
pub const REVERSE_CONFIG_FILE: &str = "remote-proxy-config.json";

const ROUTER_THREADS: u32 = 1;

/// Policy the reverse proxy enforces on incoming connections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
#[value(rename_all = "snake_case")]
pub enum ReversePolicy {
    Any,
    FakeTdx,
    Tdx,
}

impl ReversePolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Any => "any",
            Self::FakeTdx => "fake_tdx",
            Self::Tdx => "tdx",
        }
    }
}

/// Reverse proxy listener port for the configured target.
pub fn reverse_proxy_port(remote_target: bool) -> u16 {
    if remote_target {
        REMOTE_REVERSE_PORT
    } else {
        LOCAL_REVERSE_PORT
    }
}

/// One router listener.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum PortSpec {
    Socks5 {
        port: u16,
        policy_name: String,
        allow_policy_from_username: bool,
    },
    Reverse {
        port: u16,
        policy_name: String,
        destination_host: String,
        destination_port: u16,
    },
}

impl PortSpec {
    pub fn port(&self) -> u16 {
        match self {
            Self::Socks5 { port, .. } | Self::Reverse { port, .. } => *port,
        }
    }

    pub fn policy_name(&self) -> &str {
        match self {
            Self::Socks5 { policy_name, .. } | Self::Reverse { policy_name, .. } => policy_name,
        }
    }
}

/// Complete router descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeConfig {
    pub cert_base_name: String,
    pub threads: u32,
    pub ports: Vec<PortSpec>,
}

impl NodeConfig {
    /// SOCKS5 ingress for the local node. An empty policy means `any`;
    /// clients may pick another policy through their proxy username.
    pub fn forward(cert_base_name: &str, policy: &str) -> Self {
        let policy_name = if policy.is_empty() {
            DEFAULT_POLICY
        } else {
            policy
        };
        Self {
            cert_base_name: cert_base_name.to_string(),
            threads: ROUTER_THREADS,
            ports: vec![PortSpec::Socks5 {
                port: SOCKS5_PORT,
                policy_name: policy_name.to_string(),
                allow_policy_from_username: true,
            }],
        }
    }

    /// Reverse proxy on the target node in front of the HTTP echo service.
    pub fn reverse(cert_base_name: &str, policy: &str, listen_port: u16) -> Self {
        Self {
            cert_base_name: cert_base_name.to_string(),
            threads: ROUTER_THREADS,
            ports: vec![PortSpec::Reverse {
                port: listen_port,
                policy_name: policy.to_string(),
                destination_host: HTTP_TARGET_HOST.to_string(),
                destination_port: HTTP_TARGET_PORT,
            }],
        }
    }

    /// Write the descriptor as pretty JSON.
    pub fn write(&self, path: &Path) -> Result<PathBuf> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| HarnessError::Config(format!("serialize router config: {e}")))?;
        std::fs::write(path, json)?;
        info!(path = %path.display(), ports = self.ports.len(), "wrote router config");
        Ok(path.to_path_buf())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        serde_json::from_str(&raw)
            .map_err(|e| HarnessError::Config(format!("{}: {e}", path.display())))
    }
}

/// Use a supplied config file or write a generated one to `default_path`.
pub fn resolve(
    supplied: Option<&Path>,
    default_path: &Path,
    generate: impl FnOnce() -> NodeConfig,
) -> Result<PathBuf> {
    match supplied {
        Some(path) => {
            info!(path = %path.display(), "using supplied router config");
            Ok(path.to_path_buf())
        }
        None => generate().write(default_path),
    }
}
