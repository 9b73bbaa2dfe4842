//! Command-line surface of the harness.
//!
//! ## Usage
//!
//! ```bash
//! cocoon-harness                                  # proxy chain on this host
//! cocoon-harness --remote ubuntu@10.0.0.5 --seal-test --health-test
//! cocoon-harness --rev-tdx tdx --rev-policy tdx --fwd-policy tdx
//! ```

use std::path::PathBuf;

use clap::Parser;

use crate::certs::AttestationMode;
use crate::node::{RemoteTarget, DEFAULT_SSH_PORT};
use crate::proxy_config::ReversePolicy;
use crate::scenario::{
    HealthOptions, ProxyChainOptions, ScenarioSpec, SealOptions, DEFAULT_HEALTH_PORT,
    DEFAULT_VSOCK_PORT,
};
use crate::telemetry::{LogConfig, LogFormat};

#[derive(Parser, Debug, Clone)]
#[command(
    name = "cocoon-harness",
    version,
    about = "End-to-end test harness for the confidential proxy stack"
)]
pub struct Cli {
    /// Remote node for the reverse proxy, seal client and health monitor
    #[arg(long, value_name = "USER@HOST")]
    pub remote: Option<RemoteTarget>,

    /// SSH port of the remote node
    #[arg(long, default_value_t = DEFAULT_SSH_PORT)]
    pub ssh_port: u16,

    /// Attestation mode of the forward proxy certificate
    #[arg(long, value_enum, default_value_t = AttestationMode::FakeTdx)]
    pub fwd_tdx: AttestationMode,

    /// Attestation mode of the reverse proxy certificate
    #[arg(long, value_enum, default_value_t = AttestationMode::FakeTdx)]
    pub rev_tdx: AttestationMode,

    /// Policy enforced by the reverse proxy
    #[arg(long, value_enum, default_value_t = ReversePolicy::Any)]
    pub rev_policy: ReversePolicy,

    /// Policy for the forward proxy (empty for 'any')
    #[arg(long, default_value = "")]
    pub fwd_policy: String,

    /// SSH password for the remote node (prompted when empty)
    #[arg(
        long,
        env = "COCOON_HARNESS_SSH_PASSWORD",
        default_value = "",
        hide_env_values = true
    )]
    pub password: String,

    /// Pre-built configuration for the local SOCKS5 proxy
    #[arg(long, value_name = "PATH")]
    pub local_config: Option<PathBuf>,

    /// Pre-built configuration for the target reverse proxy
    #[arg(long, value_name = "PATH")]
    pub remote_config: Option<PathBuf>,

    /// Run seal-server locally and seal-client on the target
    #[arg(long)]
    pub seal_test: bool,

    /// Run health-monitor on the target and health-client locally
    #[arg(long)]
    pub health_test: bool,

    /// Run the proxy chain test (default if no other test is selected)
    #[arg(long)]
    pub proxy_test: bool,

    /// VSOCK port for seal-server/seal-client
    #[arg(long, default_value_t = DEFAULT_VSOCK_PORT)]
    pub vsock_port: u16,

    /// VSOCK port for health-monitor
    #[arg(long, default_value_t = DEFAULT_HEALTH_PORT)]
    pub health_port: u16,

    /// Enable debug logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Use binaries from a previous build
    #[arg(long)]
    pub skip_build: bool,

    /// Fail the run when a scenario's checks fail
    #[arg(long)]
    pub strict: bool,

    /// Diagnostic log format
    #[arg(long, value_enum, default_value_t = LogFormat::Pretty)]
    pub log_format: LogFormat,

    /// Write diagnostic logs to a file instead of stderr
    #[arg(long, value_name = "PATH")]
    pub log_file: Option<PathBuf>,
}

impl Cli {
    /// Selected scenarios in run order. The proxy chain runs when nothing
    /// is selected.
    pub fn plan(&self) -> Vec<ScenarioSpec> {
        let mut plan = Vec::new();
        if self.seal_test {
            plan.push(ScenarioSpec::SealedStorage(SealOptions {
                vsock_port: self.vsock_port,
            }));
        }
        if self.health_test {
            plan.push(ScenarioSpec::HealthMonitor(HealthOptions {
                port: self.health_port,
            }));
        }
        if self.proxy_test || plan.is_empty() {
            plan.push(ScenarioSpec::ProxyChain(ProxyChainOptions {
                fwd_tdx: self.fwd_tdx,
                rev_tdx: self.rev_tdx,
                rev_policy: self.rev_policy,
                fwd_policy: self.fwd_policy.clone(),
                local_config: self.local_config.clone(),
                remote_config: self.remote_config.clone(),
            }));
        }
        plan
    }

    pub fn log_config(&self) -> LogConfig {
        LogConfig {
            format: self.log_format,
            output_path: self.log_file.clone(),
            ..LogConfig::default()
        }
        .with_verbosity(self.verbose)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenario::Scenario;

    fn parse(args: &[&str]) -> Cli {
        let mut argv = vec!["cocoon-harness"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap()
    }

    fn scenarios(cli: &Cli) -> Vec<Scenario> {
        cli.plan().iter().map(ScenarioSpec::scenario).collect()
    }

    #[test]
    fn test_defaults() {
        let cli = parse(&[]);
        assert!(cli.remote.is_none());
        assert_eq!(cli.ssh_port, 22);
        assert_eq!(cli.fwd_tdx, AttestationMode::FakeTdx);
        assert_eq!(cli.rev_tdx, AttestationMode::FakeTdx);
        assert_eq!(cli.rev_policy, ReversePolicy::Any);
        assert_eq!(cli.vsock_port, 12345);
        assert_eq!(cli.health_port, 9999);
        assert_eq!(cli.log_format, LogFormat::Pretty);
    }

    #[test]
    fn test_proxy_is_default_scenario() {
        assert_eq!(scenarios(&parse(&[])), vec![Scenario::ProxyChain]);
    }

    #[test]
    fn test_plan_keeps_fixed_order() {
        let cli = parse(&["--proxy-test", "--health-test", "--seal-test"]);
        assert_eq!(
            scenarios(&cli),
            vec![
                Scenario::SealedStorage,
                Scenario::HealthMonitor,
                Scenario::ProxyChain
            ]
        );
    }

    #[test]
    fn test_seal_only_skips_proxy() {
        let cli = parse(&["--seal-test", "--vsock-port", "54321"]);
        let plan = cli.plan();
        assert_eq!(plan.len(), 1);
        match &plan[0] {
            ScenarioSpec::SealedStorage(opts) => assert_eq!(opts.vsock_port, 54321),
            other => panic!("unexpected scenario {other:?}"),
        }
    }

    #[test]
    fn test_remote_and_modes_parse() {
        let cli = parse(&[
            "--remote",
            "ubuntu@10.0.0.5",
            "--fwd-tdx",
            "none",
            "--rev-tdx",
            "tdx",
            "--rev-policy",
            "fake_tdx",
        ]);
        let remote = cli.remote.unwrap();
        assert_eq!(remote.user, "ubuntu");
        assert_eq!(remote.host, "10.0.0.5");
        assert_eq!(cli.fwd_tdx, AttestationMode::None);
        assert_eq!(cli.rev_tdx, AttestationMode::Tdx);
        assert_eq!(cli.rev_policy, ReversePolicy::FakeTdx);
    }

    #[test]
    fn test_malformed_remote_rejected() {
        let argv = ["cocoon-harness", "--remote", "no-user-here"];
        assert!(Cli::try_parse_from(argv).is_err());
    }

    #[test]
    fn test_invalid_mode_rejected() {
        let argv = ["cocoon-harness", "--fwd-tdx", "sgx"];
        assert!(Cli::try_parse_from(argv).is_err());
    }

    #[test]
    fn test_verbose_selects_debug() {
        assert_eq!(parse(&["-v"]).log_config().level, "debug");
        assert_eq!(parse(&[]).log_config().level, "info");
    }
}
