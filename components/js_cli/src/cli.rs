//! Command-line arguments

use crate::config::RuntimeConfig;
use clap::{ArgAction, Parser};
use std::path::PathBuf;

const AFTER_HELP: &str = "\
Features:
  - Event loop with macrotasks and microtasks
  - Promise support (async/await)
  - Timers (setTimeout, setInterval, setImmediate)
  - Node.js-style modules (require, fs, path)
  - Console API

Examples:
  jsrt test.js       # Run test.js
  jsrt               # Start REPL";

/// A JavaScript runtime with an event loop, promises and CommonJS modules
#[derive(Parser, Debug)]
#[command(name = "jsrt", version, after_help = AFTER_HELP, disable_version_flag = true)]
pub struct Cli {
    /// JavaScript file to run; starts the REPL when omitted
    pub file: Option<PathBuf>,

    /// Log filter (e.g. `debug`, `async_runtime=trace`); overrides RUST_LOG
    #[arg(long, value_name = "FILTER")]
    pub log_level: Option<String>,

    /// Directory searched for bare module specifiers
    #[arg(long, value_name = "NAME", default_value = "node_modules")]
    pub modules_dir: String,

    /// Print version
    #[arg(short = 'v', long = "version", action = ArgAction::Version)]
    version: Option<bool>,
}

impl Cli {
    /// Runtime settings selected by these arguments
    pub fn runtime_config(&self) -> RuntimeConfig {
        RuntimeConfig::default().with_dependency_dir(self.modules_dir.clone())
    }
}
