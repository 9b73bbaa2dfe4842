//! Certificate provisioning through the external `gen-cert` tool.
//!
//! Hardware-backed generation must run elevated, which leaves the key and
//! certificate owned by root. The router runs unprivileged, so ownership is
//! handed back to the node's user once generation has finished.

use std::fmt;
use std::path::Path;

use clap::ValueEnum;
use tracing::info;

use crate::error::Result;
use crate::node::{Node, NodeCommand};

pub const GEN_CERT_BINARY: &str = "gen-cert";

/// Trust evidence backing a certificate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum)]
#[value(rename_all = "snake_case")]
pub enum AttestationMode {
    None,
    FakeTdx,
    Tdx,
}

impl AttestationMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::FakeTdx => "fake_tdx",
            Self::Tdx => "tdx",
        }
    }

    /// Mode handed to `gen-cert`. It has no unattested mode, so `none`
    /// issues a simulated certificate.
    pub fn effective(self) -> Self {
        match self {
            Self::None => Self::FakeTdx,
            other => other,
        }
    }

    pub fn requires_elevation(&self) -> bool {
        matches!(self, Self::Tdx)
    }
}

impl fmt::Display for AttestationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Private key written for `cert_name`.
pub fn key_file(cert_name: &str) -> String {
    format!("{cert_name}_key.pem")
}

/// Certificate written for `cert_name`.
pub fn cert_file(cert_name: &str) -> String {
    format!("{cert_name}_cert.pem")
}

/// Generate `<cert_name>_key.pem` and `<cert_name>_cert.pem` on `node`.
///
/// `tool_dir` is the directory holding `gen-cert` on that node. Existing
/// files are overwritten.
pub async fn generate_certificate(
    node: &dyn Node,
    tool_dir: &Path,
    mode: AttestationMode,
    cert_name: &str,
) -> Result<()> {
    let mode = mode.effective();
    info!(node = node.label(), cert = cert_name, %mode, "generating certificate");

    let mut generate = NodeCommand::path(&tool_dir.join(GEN_CERT_BINARY))
        .args(["--tdx", mode.as_str(), "--name", cert_name, "--force"]);
    if mode.requires_elevation() {
        generate = generate.elevated();
    }
    node.run(&generate).await?;

    if mode.requires_elevation() {
        let owner = format!("{0}:{0}", node.user());
        for file in [key_file(cert_name), cert_file(cert_name)] {
            let chown = NodeCommand::new("chown")
                .args([owner.as_str(), file.as_str()])
                .elevated();
            node.run(&chown).await?;
        }
    }
    Ok(())
}
