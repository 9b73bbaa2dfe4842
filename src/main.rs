//! cocoon-harness entry point.
//!
//! Parses the command line, initializes logging, runs the selected
//! scenarios and maps the outcome to the process exit status:
//! 0 on success, 1 on failure, 130 when interrupted by a signal.

use std::process::ExitCode;

use clap::Parser;

use cocoon_harness::cli::Cli;
use cocoon_harness::config;
use cocoon_harness::driver;
use cocoon_harness::telemetry::init_logging;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = init_logging(&cli.log_config()) {
        eprintln!("Failed to initialize logging: {}", e);
        return ExitCode::FAILURE;
    }

    match driver::run(&cli, config::load()).await {
        Ok(reports) => {
            tracing::info!(scenarios = reports.len(), "run complete");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::from(e.exit_code())
        }
    }
}
