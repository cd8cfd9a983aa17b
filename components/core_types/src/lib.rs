//! Error types shared by every runtime component.
//!
//! The scheduler, the promise engine and the module loader all report
//! failures that originate in script code. This crate gives those failures
//! one host-side shape so the event loop can log them and the CLI can print
//! them without knowing which engine produced them.
//!
//! - [`JsError`] - a script failure as seen from the host
//! - [`ErrorKind`] - which built-in error constructor it corresponds to
//!
//! # Examples
//!
//! ```
//! use core_types::{ErrorKind, JsError};
//!
//! let error = JsError::new(ErrorKind::TypeError, "undefined is not a function");
//! assert_eq!(error.to_string(), "TypeError: undefined is not a function");
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

mod error;

pub use error::{ErrorKind, JsError};
