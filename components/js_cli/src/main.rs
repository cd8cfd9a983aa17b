//! jsrt
//!
//! Entry point for the JavaScript runtime. Parses CLI arguments, sets up
//! logging and delegates to the Runtime for execution.

use clap::Parser as ClapParser;
use js_cli::{Cli, CliResult, Runtime};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

fn init_logging(level: Option<&str>) {
    let filter = level
        .and_then(|level| EnvFilter::try_new(level).ok())
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: Cli) -> CliResult<()> {
    let runtime = Runtime::with_config(cli.runtime_config())?;
    match &cli.file {
        Some(file) => runtime.execute_file(file),
        None => runtime.repl(),
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.log_level.as_deref());

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {}", err);
            ExitCode::FAILURE
        }
    }
}
