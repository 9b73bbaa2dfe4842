//! Cocoon test harness
//!
//! Orchestrates end-to-end scenarios for the confidential proxy stack across
//! the local host and an optional remote host reached over SSH.
//!
//! # Scenarios
//!
//! - **Sealed storage**: seal server locally, seal client on the target
//! - **Health monitor**: monitor daemon on the target, every client
//!   subcommand issued locally
//! - **Proxy chain**: local SOCKS5 router → target reverse router → HTTP echo
//!
//! The target is the remote node when one is configured and the local node
//! otherwise. Every scenario runs inside a teardown scope that stops what it
//! started, including when the run is interrupted.

pub mod artifacts;
pub mod certs;
pub mod cli;
pub mod config;
pub mod driver;
pub mod error;
pub mod logs;
pub mod node;
pub mod probe;
pub mod proxy_config;
pub mod scenario;
pub mod teardown;
pub mod telemetry;

pub use error::{HarnessError, Result};
