//! Error types for the CLI

use core_types::JsError;
use std::path::PathBuf;
use thiserror::Error;

/// CLI-specific errors
#[derive(Debug, Error)]
pub enum CliError {
    /// Script evaluation threw
    #[error("{0}")]
    JsError(#[from] JsError),

    /// A script file could not be read
    #[error("error reading file {}: {source}", .path.display())]
    IoError {
        /// File that failed
        path: PathBuf,
        /// Underlying OS error
        #[source]
        source: std::io::Error,
    },

    /// The engine could not be created or set up
    #[error("engine error: {0}")]
    EngineError(String),

    /// Line editor failure
    #[error("REPL error: {0}")]
    ReplError(String),
}

impl From<rquickjs::Error> for CliError {
    fn from(err: rquickjs::Error) -> Self {
        CliError::EngineError(err.to_string())
    }
}

/// Result type for CLI operations
pub type CliResult<T> = Result<T, CliError>;
