//! Runtime orchestration for JavaScript execution
//!
//! The Runtime struct ties one QuickJS engine to the scheduling core:
//! - a context with the host globals installed
//! - the event loop driving timers and microtasks
//! - the module loader behind `require`
//! - the engine's own job queue, pumped after the microtask queue

use crate::config::RuntimeConfig;
use crate::error::{CliError, CliResult};
use crate::globals;
use crate::host::{error_from_value, eval_named, HostState};
use async_runtime::{module, EventLoop, ModuleLoader};
use builtins::console;
use rquickjs::{Context, Value};
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use tracing::{debug, error};

/// One isolated script runtime: its own engine, globals, timers and module
/// cache
pub struct Runtime {
    state: Rc<HostState>,
    engine: rquickjs::Runtime,
}

impl Runtime {
    /// Create a runtime with default settings
    ///
    /// # Example
    /// ```
    /// use js_cli::Runtime;
    ///
    /// let runtime = Runtime::new().unwrap();
    /// assert_eq!(runtime.execute_string("6 * 7").unwrap().as_deref(), Some("42"));
    /// ```
    pub fn new() -> CliResult<Self> {
        Self::with_config(RuntimeConfig::default())
    }

    /// Create a runtime from `config`
    ///
    /// # Errors
    /// Returns `CliError::EngineError` if the engine cannot be created and
    /// `CliError::JsError` if installing the globals throws.
    pub fn with_config(config: RuntimeConfig) -> CliResult<Self> {
        let engine = rquickjs::Runtime::new()?;
        let context = Context::full(&engine)?;

        let event_loop = Rc::new(EventLoop::with_clock(config.clock.clone()));
        let loader = ModuleLoader::with_options(config.resolve.clone());
        let console = Rc::new(config.console.console());
        let state = HostState::new(context, event_loop, loader, console);

        let jobs = engine.clone();
        state
            .event_loop
            .set_external_jobs(Rc::new(move || run_engine_job(&jobs)));

        let base_dir = absolute(&config.base_dir);
        state.with_host(|host| globals::install(host, base_dir))?;
        debug!(?config, "runtime ready");

        Ok(Self { state, engine })
    }

    /// Execute a JavaScript file, then run the event loop until idle
    ///
    /// The file is loaded as the main module: it is cached under its
    /// resolved path and gets its own `module`, `exports`, `require`,
    /// `__filename` and `__dirname`.
    ///
    /// # Errors
    /// Returns `CliError::IoError` if the file cannot be read and
    /// `CliError::JsError` if the module throws while loading.
    ///
    /// # Example
    /// ```no_run
    /// use js_cli::Runtime;
    ///
    /// let runtime = Runtime::new().unwrap();
    /// runtime.execute_file("example.js").unwrap();
    /// ```
    pub fn execute_file(&self, path: impl AsRef<Path>) -> CliResult<()> {
        let path = path.as_ref();
        let absolute_path = absolute(path);
        let metadata = fs::metadata(&absolute_path).map_err(|source| CliError::IoError {
            path: path.to_path_buf(),
            source,
        })?;
        if metadata.is_dir() {
            return Err(CliError::IoError {
                path: path.to_path_buf(),
                source: std::io::Error::new(std::io::ErrorKind::Other, "is a directory"),
            });
        }

        debug!(path = %absolute_path.display(), "running main module");
        self.state.with_host(|host| {
            self.state
                .loader
                .load_path(host, &absolute_path)
                .map(|_| ())
                .map_err(|thrown| host.js_error(&thrown))
        })?;

        self.run_event_loop();
        Ok(())
    }

    /// Evaluate a JavaScript source string and drain the microtask queue
    ///
    /// Returns the completion value rendered for display, or `None` when it
    /// is `undefined`. Timers are left queued.
    ///
    /// # Errors
    /// Returns `CliError::JsError` if the script throws.
    pub fn execute_string(&self, source: &str) -> CliResult<Option<String>> {
        let rendered = self.evaluate("<eval>", source)?;
        self.run_microtasks();
        Ok(rendered)
    }

    /// Point the global `require` at `dir`
    pub fn set_base_dir(&self, dir: impl AsRef<Path>) -> CliResult<()> {
        let dir = absolute(dir.as_ref());
        self.state
            .with_host(|host| globals::install_require(host, dir))?;
        Ok(())
    }

    /// Run the event loop until no macrotasks remain
    pub fn run_event_loop(&self) {
        self.state.event_loop.run();
    }

    /// Drain the microtask queue and the engine's job queue
    pub fn run_microtasks(&self) -> usize {
        self.state.event_loop.run_microtasks()
    }

    /// The event loop of this runtime
    pub fn event_loop(&self) -> &EventLoop {
        &self.state.event_loop
    }

    /// Start the REPL (Read-Eval-Print Loop)
    ///
    /// # Errors
    /// Returns `CliError` if REPL encounters a fatal error
    ///
    /// # Example
    /// ```no_run
    /// use js_cli::Runtime;
    ///
    /// let runtime = Runtime::new().unwrap();
    /// runtime.repl().unwrap();
    /// ```
    pub fn repl(&self) -> CliResult<()> {
        crate::repl::run_repl(self)
    }

    /// Get runtime statistics
    pub fn stats(&self) -> RuntimeStats {
        let event_loop = &self.state.event_loop;
        RuntimeStats {
            active_timers: event_loop.active_timers(),
            pending_macrotasks: event_loop.pending_macrotasks(),
            pending_microtasks: event_loop.pending_microtasks(),
            cached_modules: self.state.loader.cached_modules(),
            live_promises: self.state.live_promises(),
        }
    }

    fn evaluate(&self, filename: &str, source: &str) -> CliResult<Option<String>> {
        debug!(filename, bytes = source.len(), "evaluating");
        let rendered = self.state.with_host(|host| {
            let value = host.check(eval_named(host.ctx(), filename, source))?;
            Ok::<_, core_types::JsError>(render_result(host.ctx(), value))
        })?;
        Ok(rendered)
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        self.state.teardown();
        self.engine.run_gc();
    }
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

/// Counters describing what a runtime currently holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RuntimeStats {
    /// Registered timers
    pub active_timers: usize,
    /// Macrotasks waiting in the queue
    pub pending_macrotasks: usize,
    /// Microtasks waiting in the queue
    pub pending_microtasks: usize,
    /// Modules in the require cache
    pub cached_modules: usize,
    /// Promise records still referenced
    pub live_promises: usize,
}

fn absolute(path: &Path) -> PathBuf {
    if path.is_absolute() {
        module::normalize(path)
    } else {
        let cwd = std::env::current_dir().unwrap_or_default();
        module::normalize(&cwd.join(path))
    }
}

fn render_result<'js>(ctx: &rquickjs::Ctx<'js>, value: Value<'js>) -> Option<String> {
    if value.is_undefined() {
        return None;
    }
    if let Some(text) = value.as_string() {
        return Some(format!("'{}'", text.to_string().unwrap_or_default()));
    }
    Some(console::format_value(ctx, value))
}

// Runs one job from the engine's own queue (async functions, native
// promise reactions). Returns false once the queue is empty.
fn run_engine_job(engine: &rquickjs::Runtime) -> bool {
    match engine.execute_pending_job() {
        Ok(ran) => ran,
        Err(exception) => {
            let failure = exception.0.with(|ctx| {
                let thrown = ctx.catch();
                error_from_value(&ctx, thrown)
            });
            error!(error = %failure, "uncaught error in engine job");
            true
        }
    }
}
