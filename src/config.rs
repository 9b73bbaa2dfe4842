//! Harness configuration loading from environment variables.
//!
//! All tunables are read from `COCOON_HARNESS_*` environment variables with
//! sensible defaults. Invalid values fall back to defaults without crashing.
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |---|---|---|
//! | `COCOON_HARNESS_ROOT` | `./tee` | Build output directory holding the binaries |
//! | `COCOON_HARNESS_BUILD_TOOL` | `ninja` | Build tool invoked once per run |
//! | `COCOON_HARNESS_ECHO_SCRIPT` | `../tee/cocoon/http-echo.py` | HTTP echo responder staged to remote targets |
//! | `COCOON_HARNESS_STAGING_DIR` | `/tmp` | Where binaries are placed on a remote node |
//! | `COCOON_HARNESS_CONFIG_DIR` | `.` | Where generated router configs are written |
//! | `COCOON_HARNESS_SEAL_SETTLE_SECS` | 2 | Wait after starting the seal server |
//! | `COCOON_HARNESS_SEAL_COMPLETE_SECS` | 5 | Wait for the seal client to finish |
//! | `COCOON_HARNESS_HEALTH_STARTUP_SECS` | 2 | Wait after starting the health monitor |
//! | `COCOON_HARNESS_HEALTH_RATE_WINDOW_SECS` | 12 | Gap before the second metrics call |
//! | `COCOON_HARNESS_PROXY_STARTUP_SECS` | 3 | Wait after starting routers and echo service |
//! | `COCOON_HARNESS_REQUEST_TIMEOUT_SECS` | 10 | Per-request timeout through the proxy chain |
//! | `COCOON_HARNESS_LOG_TAIL_LINES` | 50 | Lines shown from each collected log |

use std::path::PathBuf;
use std::time::Duration;

/// Fixed pauses used as the only synchronization with spawned daemons.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Warmups {
    pub seal_settle: Duration,
    pub seal_complete: Duration,
    pub health_startup: Duration,
    pub health_rate_window: Duration,
    pub proxy_startup: Duration,
}

impl Default for Warmups {
    fn default() -> Self {
        Self {
            seal_settle: Duration::from_secs(2),
            seal_complete: Duration::from_secs(5),
            health_startup: Duration::from_secs(2),
            health_rate_window: Duration::from_secs(12),
            proxy_startup: Duration::from_secs(3),
        }
    }
}

impl Warmups {
    /// All pauses zero; for tests against recording nodes.
    pub fn none() -> Self {
        Self {
            seal_settle: Duration::ZERO,
            seal_complete: Duration::ZERO,
            health_startup: Duration::ZERO,
            health_rate_window: Duration::ZERO,
            proxy_startup: Duration::ZERO,
        }
    }
}

/// All harness configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct HarnessConfig {
    pub root: PathBuf,
    pub build_tool: String,
    pub echo_script: PathBuf,
    pub staging_dir: PathBuf,
    pub config_dir: PathBuf,
    pub warmups: Warmups,
    pub request_timeout: Duration,
    pub log_tail_lines: usize,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("./tee"),
            build_tool: "ninja".to_string(),
            echo_script: PathBuf::from("../tee/cocoon/http-echo.py"),
            staging_dir: PathBuf::from("/tmp"),
            config_dir: PathBuf::from("."),
            warmups: Warmups::default(),
            request_timeout: Duration::from_secs(10),
            log_tail_lines: 50,
        }
    }
}

/// Parse a `usize` env var, returning `default` on missing or invalid.
fn parse_usize(key: &str, default: usize) -> usize {
    match std::env::var(key) {
        Ok(val) => val.parse::<usize>().unwrap_or(default),
        Err(_) => default,
    }
}

/// Parse a `u64` env var, returning `default` on missing or invalid.
fn parse_u64(key: &str, default: u64) -> u64 {
    match std::env::var(key) {
        Ok(val) => val.parse::<u64>().unwrap_or(default),
        Err(_) => default,
    }
}

fn parse_secs(key: &str, default: Duration) -> Duration {
    Duration::from_secs(parse_u64(key, default.as_secs()))
}

fn parse_string(key: &str, default: &str) -> String {
    std::env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

/// Load warmup durations from environment.
fn load_warmups() -> Warmups {
    let d = Warmups::default();
    Warmups {
        seal_settle: parse_secs("COCOON_HARNESS_SEAL_SETTLE_SECS", d.seal_settle),
        seal_complete: parse_secs("COCOON_HARNESS_SEAL_COMPLETE_SECS", d.seal_complete),
        health_startup: parse_secs("COCOON_HARNESS_HEALTH_STARTUP_SECS", d.health_startup),
        health_rate_window: parse_secs(
            "COCOON_HARNESS_HEALTH_RATE_WINDOW_SECS",
            d.health_rate_window,
        ),
        proxy_startup: parse_secs("COCOON_HARNESS_PROXY_STARTUP_SECS", d.proxy_startup),
    }
}

/// Load all configuration from environment variables.
///
/// Missing or invalid values fall back to safe defaults without panicking.
pub fn load() -> HarnessConfig {
    let d = HarnessConfig::default();
    let request_secs = parse_u64("COCOON_HARNESS_REQUEST_TIMEOUT_SECS", 10).max(1);
    let tail = parse_usize("COCOON_HARNESS_LOG_TAIL_LINES", d.log_tail_lines).max(1);

    HarnessConfig {
        root: PathBuf::from(parse_string("COCOON_HARNESS_ROOT", "./tee")),
        build_tool: parse_string("COCOON_HARNESS_BUILD_TOOL", &d.build_tool),
        echo_script: PathBuf::from(parse_string(
            "COCOON_HARNESS_ECHO_SCRIPT",
            "../tee/cocoon/http-echo.py",
        )),
        staging_dir: PathBuf::from(parse_string("COCOON_HARNESS_STAGING_DIR", "/tmp")),
        config_dir: PathBuf::from(parse_string("COCOON_HARNESS_CONFIG_DIR", ".")),
        warmups: load_warmups(),
        request_timeout: Duration::from_secs(request_secs),
        log_tail_lines: tail,
    }
}
