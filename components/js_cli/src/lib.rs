//! JavaScript Runtime CLI Library
//!
//! Binds the scheduling core in `async_runtime` to the QuickJS engine and
//! provides the Runtime struct the `jsrt` binary drives.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cli;
pub mod config;
pub mod error;
pub mod globals;
pub mod host;
pub mod promise_global;
pub mod repl;
pub mod runtime;

pub use cli::Cli;
pub use config::{ConsoleSink, RuntimeConfig};
pub use error::{CliError, CliResult};
pub use host::{HostState, JsValue, QuickJsHost};
pub use runtime::{Runtime, RuntimeStats};
