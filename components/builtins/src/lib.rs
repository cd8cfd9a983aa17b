//! Host objects for the embedded script runtime
//!
//! This crate provides the objects scripts reach without loading any file:
//! - `console` with leveled output and timers
//! - the synchronous `fs` module
//! - the POSIX `path` module
//!
//! The logic of each module lives in plain Rust functions so it can be used
//! and tested without an engine; each module's `create` builds the
//! script-visible object for a QuickJS context.
//!
//! # Example
//!
//! ```
//! use builtins::{path, ConsoleObject};
//! use std::cell::RefCell;
//! use std::rc::Rc;
//!
//! assert_eq!(path::join(&["/srv", "app", "../lib", "main.js"]), "/srv/lib/main.js");
//! assert_eq!(path::extname("main.js"), ".js");
//!
//! let output = Rc::new(RefCell::new(Vec::new()));
//! let console = ConsoleObject::new_with_output(output.clone());
//! console.warn("disk almost full");
//! assert_eq!(output.borrow()[0], "[WARN] disk almost full");
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod console;
pub mod fs;
pub mod path;

use rquickjs::{Ctx, Object};

// Re-export main types for convenience
pub use console::{CaptureWriter, ConsoleObject, ConsoleWriter, StdoutWriter};
pub use fs::{FileContents, FileStat, FsError, FsResult};
pub use path::ParsedPath;

/// Names of the modules `require` resolves without touching the filesystem
pub const BUILTIN_MODULES: [&str; 2] = ["fs", "path"];

/// Build the exports object of a built-in module, if `name` is one
pub fn create_module<'js>(ctx: &Ctx<'js>, name: &str) -> rquickjs::Result<Option<Object<'js>>> {
    match name {
        "fs" => fs::create(ctx).map(Some),
        "path" => path::create(ctx).map(Some),
        _ => Ok(None),
    }
}
