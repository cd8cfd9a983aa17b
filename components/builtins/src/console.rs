//! Console object methods

use rquickjs::function::{Func, Opt, Rest};
use rquickjs::{Coerced, Ctx, FromJs, Object, Value};
use std::cell::RefCell;
use std::collections::HashMap;
use std::io::Write;
use std::rc::Rc;
use std::time::Instant;
use tracing::debug;

/// Label used by `time`/`timeEnd` when none is given.
pub const DEFAULT_TIMER_LABEL: &str = "default";

/// Console output writer trait
pub trait ConsoleWriter {
    /// Write one line of console output
    fn write_line(&self, line: &str);

    /// Clear the output, if the writer supports it
    fn clear(&self) {}
}

/// Default console writer that prints to stdout
#[derive(Debug, Default, Clone, Copy)]
pub struct StdoutWriter;

impl ConsoleWriter for StdoutWriter {
    fn write_line(&self, line: &str) {
        let mut stdout = std::io::stdout().lock();
        let _ = writeln!(stdout, "{line}");
        let _ = stdout.flush();
    }

    fn clear(&self) {
        let mut stdout = std::io::stdout().lock();
        let _ = write!(stdout, "\x1b[H\x1b[2J");
        let _ = stdout.flush();
    }
}

/// Writer that captures output lines in memory
#[derive(Debug, Default, Clone)]
pub struct CaptureWriter {
    lines: Rc<RefCell<Vec<String>>>,
}

impl CaptureWriter {
    /// Create a writer appending to `lines`
    pub fn new(lines: Rc<RefCell<Vec<String>>>) -> Self {
        Self { lines }
    }

    /// Lines written so far
    pub fn lines(&self) -> Vec<String> {
        self.lines.borrow().clone()
    }
}

impl ConsoleWriter for CaptureWriter {
    fn write_line(&self, line: &str) {
        self.lines.borrow_mut().push(line.to_string());
    }

    fn clear(&self) {
        self.lines.borrow_mut().clear();
    }
}

/// Console object
pub struct ConsoleObject {
    timers: RefCell<HashMap<String, Instant>>,
    writer: Box<dyn ConsoleWriter>,
}

impl ConsoleObject {
    /// Create a new console with default stdout output
    pub fn new() -> Self {
        Self::with_writer(Box::new(StdoutWriter))
    }

    /// Create a console writing through `writer`
    pub fn with_writer(writer: Box<dyn ConsoleWriter>) -> Self {
        ConsoleObject {
            timers: RefCell::new(HashMap::new()),
            writer,
        }
    }

    /// Create a console with custom output capture
    pub fn new_with_output(output: Rc<RefCell<Vec<String>>>) -> Self {
        Self::with_writer(Box::new(CaptureWriter::new(output)))
    }

    /// Join already-formatted arguments the way every console method does
    pub fn format_values<S: AsRef<str>>(values: &[S]) -> String {
        values
            .iter()
            .map(AsRef::as_ref)
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// console.log(...values)
    pub fn log(&self, message: &str) {
        self.writer.write_line(message);
    }

    /// console.info(...values)
    pub fn info(&self, message: &str) {
        self.writer.write_line(message);
    }

    /// console.warn(...values)
    pub fn warn(&self, message: &str) {
        self.prefixed("[WARN]", message);
    }

    /// console.error(...values)
    pub fn error(&self, message: &str) {
        self.prefixed("[ERROR]", message);
    }

    /// console.debug(...values)
    pub fn debug(&self, message: &str) {
        self.prefixed("[DEBUG]", message);
    }

    /// console.trace(...values)
    pub fn trace(&self, message: &str) {
        self.prefixed("[TRACE]", message);
    }

    /// console.dir(value)
    pub fn dir(&self, rendered: &str) {
        self.writer.write_line(rendered);
    }

    /// console.assert(condition, ...message)
    pub fn assert(&self, condition: bool, message: Option<&str>) {
        if condition {
            return;
        }
        match message {
            Some(message) if !message.is_empty() => {
                self.writer
                    .write_line(&format!("[ASSERT] Assertion failed: {message}"));
            }
            _ => self.writer.write_line("[ASSERT] Assertion failed"),
        }
    }

    /// console.clear()
    pub fn clear(&self) {
        self.writer.clear();
    }

    /// console.time(label)
    pub fn time(&self, label: &str) {
        self.timers
            .borrow_mut()
            .insert(label.to_string(), Instant::now());
    }

    /// console.timeEnd(label)
    pub fn time_end(&self, label: &str) {
        let started = self.timers.borrow_mut().remove(label);
        match started {
            Some(start) => {
                let elapsed = start.elapsed().as_secs_f64() * 1000.0;
                self.writer.write_line(&format!("{label}: {elapsed:.3}ms"));
            }
            None => debug!(label, "timeEnd for unknown timer"),
        }
    }

    fn prefixed(&self, prefix: &str, message: &str) {
        if message.is_empty() {
            self.writer.write_line(prefix);
        } else {
            self.writer.write_line(&format!("{prefix} {message}"));
        }
    }
}

impl Default for ConsoleObject {
    fn default() -> Self {
        Self::new()
    }
}

/// Render one script value for console output.
///
/// Strings print raw, arrays and plain objects as JSON, everything else
/// through string coercion.
pub fn format_value<'js>(ctx: &Ctx<'js>, value: Value<'js>) -> String {
    if let Some(text) = value.as_string() {
        return text.to_string().unwrap_or_default();
    }
    if value.is_undefined() {
        return "undefined".to_string();
    }
    if value.is_null() {
        return "null".to_string();
    }
    let structured = value.is_array()
        || (value.is_object() && !value.is_function() && !value.is_error());
    if structured {
        match ctx.json_stringify(value.clone()) {
            Ok(Some(json)) => {
                if let Ok(text) = json.to_string() {
                    return text;
                }
            }
            Ok(None) => {}
            Err(_) => {
                // cyclic structures; fall back to String(value)
                let _ = ctx.catch();
            }
        }
    }
    match Coerced::<String>::from_js(ctx, value) {
        Ok(text) => text.0,
        Err(_) => {
            let _ = ctx.catch();
            "[unprintable]".to_string()
        }
    }
}

fn format_args<'js>(ctx: &Ctx<'js>, values: Vec<Value<'js>>) -> String {
    let rendered: Vec<String> = values
        .into_iter()
        .map(|value| format_value(ctx, value))
        .collect();
    ConsoleObject::format_values(&rendered)
}

fn label_of(label: Opt<Coerced<String>>) -> String {
    label
        .0
        .map(|label| label.0)
        .unwrap_or_else(|| DEFAULT_TIMER_LABEL.to_string())
}

/// Build the script-visible `console` object backed by `console`.
pub fn create<'js>(ctx: &Ctx<'js>, console: Rc<ConsoleObject>) -> rquickjs::Result<Object<'js>> {
    let object = Object::new(ctx.clone())?;

    macro_rules! line_method {
        ($name:literal, $method:ident) => {{
            let console = console.clone();
            object.set(
                $name,
                Func::from(move |ctx: Ctx<'js>, values: Rest<Value<'js>>| {
                    console.$method(&format_args(&ctx, values.0));
                }),
            )?;
        }};
    }

    line_method!("log", log);
    line_method!("info", info);
    line_method!("warn", warn);
    line_method!("error", error);
    line_method!("debug", debug);
    line_method!("trace", trace);

    {
        let console = console.clone();
        object.set(
            "dir",
            Func::from(move |ctx: Ctx<'js>, value: Opt<Value<'js>>| {
                if let Some(value) = value.0 {
                    console.dir(&format_value(&ctx, value));
                }
            }),
        )?;
    }
    {
        let console = console.clone();
        object.set(
            "assert",
            Func::from(move |ctx: Ctx<'js>, values: Rest<Value<'js>>| {
                let mut values = values.0.into_iter();
                let Some(condition) = values.next() else {
                    return;
                };
                let holds = Coerced::<bool>::from_js(&ctx, condition)
                    .map(|holds| holds.0)
                    .unwrap_or(false);
                let message = format_args(&ctx, values.collect());
                console.assert(holds, Some(&message));
            }),
        )?;
    }
    {
        let console = console.clone();
        object.set("clear", Func::from(move || console.clear()))?;
    }
    {
        let console = console.clone();
        object.set(
            "time",
            Func::from(move |label: Opt<Coerced<String>>| console.time(&label_of(label))),
        )?;
    }
    object.set(
        "timeEnd",
        Func::from(move |label: Opt<Coerced<String>>| console.time_end(&label_of(label))),
    )?;

    Ok(object)
}
