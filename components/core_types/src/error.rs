//! JavaScript error types and error handling.
//!
//! This module provides the host-side view of a script failure: which kind of
//! error was raised, its message, and the engine's stack trace when one was
//! available.

use std::fmt;

/// The kind of JavaScript error.
///
/// These correspond to JavaScript's built-in error constructors, plus
/// [`ErrorKind::Thrown`] for scripts that throw something that is not an
/// error object at all (`throw 42`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Plain `Error`
    Error,
    /// Syntax error in JavaScript code
    SyntaxError,
    /// Type error (e.g., calling a non-function)
    TypeError,
    /// Reference to an undefined variable
    ReferenceError,
    /// Value out of allowed range
    RangeError,
    /// Error in eval() function
    EvalError,
    /// Error in URI handling functions
    URIError,
    /// Internal engine error
    InternalError,
    /// A non-error value was thrown
    Thrown,
}

impl ErrorKind {
    /// Returns the name of the global constructor for this kind.
    ///
    /// [`ErrorKind::Thrown`] has no constructor of its own and maps to
    /// `Error`.
    pub fn constructor_name(self) -> &'static str {
        match self {
            ErrorKind::Error | ErrorKind::Thrown => "Error",
            ErrorKind::SyntaxError => "SyntaxError",
            ErrorKind::TypeError => "TypeError",
            ErrorKind::ReferenceError => "ReferenceError",
            ErrorKind::RangeError => "RangeError",
            ErrorKind::EvalError => "EvalError",
            ErrorKind::URIError => "URIError",
            ErrorKind::InternalError => "InternalError",
        }
    }

    /// Maps an error object's `name` back to a kind.
    ///
    /// Unknown names (user-defined subclasses) map to [`ErrorKind::Error`].
    ///
    /// # Examples
    ///
    /// ```
    /// use core_types::ErrorKind;
    ///
    /// assert_eq!(ErrorKind::from_name("TypeError"), ErrorKind::TypeError);
    /// assert_eq!(ErrorKind::from_name("ValidationError"), ErrorKind::Error);
    /// ```
    pub fn from_name(name: &str) -> Self {
        match name {
            "SyntaxError" => ErrorKind::SyntaxError,
            "TypeError" => ErrorKind::TypeError,
            "ReferenceError" => ErrorKind::ReferenceError,
            "RangeError" => ErrorKind::RangeError,
            "EvalError" => ErrorKind::EvalError,
            "URIError" => ErrorKind::URIError,
            "InternalError" => ErrorKind::InternalError,
            _ => ErrorKind::Error,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Thrown => f.write_str("Uncaught"),
            other => f.write_str(other.constructor_name()),
        }
    }
}

/// A JavaScript error with message and stack trace.
///
/// This struct represents a JavaScript exception after it has crossed back
/// into the host: the event loop logs it, the CLI prints it.
///
/// # Examples
///
/// ```
/// use core_types::{JsError, ErrorKind};
///
/// let error = JsError::new(ErrorKind::TypeError, "undefined is not a function")
///     .with_stack("    at <eval> (main.js:1)");
///
/// assert_eq!(error.message, "undefined is not a function");
/// assert!(error.stack.is_some());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct JsError {
    /// The type of error
    pub kind: ErrorKind,
    /// Human-readable error message
    pub message: String,
    /// Stack trace as rendered by the engine
    pub stack: Option<String>,
}

impl JsError {
    /// Creates an error without a stack trace.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            stack: None,
        }
    }

    /// Attaches the engine's stack trace.
    pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
        let stack = stack.into();
        self.stack = if stack.trim().is_empty() {
            None
        } else {
            Some(stack)
        };
        self
    }

    /// Shorthand for an [`ErrorKind::InternalError`].
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InternalError, message)
    }

    /// Returns true if this error came from malformed source text.
    pub fn is_syntax_error(&self) -> bool {
        self.kind == ErrorKind::SyntaxError
    }
}
