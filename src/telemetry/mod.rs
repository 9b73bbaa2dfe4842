//! Diagnostic logging for the harness.
//!
//! Diagnostics go to stderr (or a file) through `tracing`. Operator-facing
//! scenario output (request results, summaries, log tails) is printed to
//! stdout separately.

mod logging;

pub use logging::{init_logging, LogConfig, LogError, LogFormat};
