//! Runtime configuration

use async_runtime::{Clock, MonotonicClock, ResolveOptions};
use builtins::{ConsoleObject, ConsoleWriter, StdoutWriter};
use std::cell::RefCell;
use std::fmt;
use std::path::PathBuf;
use std::rc::Rc;

/// Where `console` output goes
#[derive(Clone, Default)]
pub enum ConsoleSink {
    /// Standard output
    #[default]
    Stdout,
    /// An in-memory line buffer
    Capture(Rc<RefCell<Vec<String>>>),
    /// Any other writer
    Custom(Rc<dyn Fn() -> Box<dyn ConsoleWriter>>),
}

impl ConsoleSink {
    pub(crate) fn console(&self) -> ConsoleObject {
        match self {
            ConsoleSink::Stdout => ConsoleObject::with_writer(Box::new(StdoutWriter)),
            ConsoleSink::Capture(lines) => ConsoleObject::new_with_output(lines.clone()),
            ConsoleSink::Custom(make) => ConsoleObject::with_writer(make()),
        }
    }
}

impl fmt::Debug for ConsoleSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConsoleSink::Stdout => f.write_str("Stdout"),
            ConsoleSink::Capture(lines) => f
                .debug_tuple("Capture")
                .field(&lines.borrow().len())
                .finish(),
            ConsoleSink::Custom(_) => f.write_str("Custom"),
        }
    }
}

/// Settings for one [`Runtime`](crate::Runtime)
///
/// # Example
///
/// ```
/// use js_cli::RuntimeConfig;
/// use std::cell::RefCell;
/// use std::rc::Rc;
///
/// let output = Rc::new(RefCell::new(Vec::new()));
/// let config = RuntimeConfig::default()
///     .with_base_dir("/srv/app")
///     .with_captured_console(output.clone());
/// assert_eq!(config.base_dir.to_str(), Some("/srv/app"));
/// ```
#[derive(Clone)]
pub struct RuntimeConfig {
    /// Directory the global `require` resolves relative specifiers against
    pub base_dir: PathBuf,
    /// Module resolution settings
    pub resolve: ResolveOptions,
    /// Console destination
    pub console: ConsoleSink,
    /// Time source for timers
    pub clock: Rc<dyn Clock>,
}

impl RuntimeConfig {
    /// Set the base directory of the global `require`
    pub fn with_base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.base_dir = dir.into();
        self
    }

    /// Set the dependency directory searched for bare specifiers
    pub fn with_dependency_dir(mut self, name: impl Into<String>) -> Self {
        self.resolve.dependency_dir = name.into();
        self
    }

    /// Set the extension appended to extensionless specifiers
    pub fn with_default_extension(mut self, extension: impl Into<String>) -> Self {
        self.resolve.default_extension = extension.into();
        self
    }

    /// Send console output to `sink`
    pub fn with_console(mut self, sink: ConsoleSink) -> Self {
        self.console = sink;
        self
    }

    /// Capture console output into `lines`
    pub fn with_captured_console(self, lines: Rc<RefCell<Vec<String>>>) -> Self {
        self.with_console(ConsoleSink::Capture(lines))
    }

    /// Drive timers from `clock`
    pub fn with_clock(mut self, clock: Rc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            base_dir: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            resolve: ResolveOptions::default(),
            console: ConsoleSink::default(),
            clock: Rc::new(MonotonicClock),
        }
    }
}

impl fmt::Debug for RuntimeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuntimeConfig")
            .field("base_dir", &self.base_dir)
            .field("resolve", &self.resolve)
            .field("console", &self.console)
            .finish_non_exhaustive()
    }
}
