//! In-memory script host for exercising the scheduling core without an engine.
//!
//! Values are a small enum. Module "source" is not parsed: `evaluate` looks up
//! a body registered for the filename with [`FakeHost::define_module`], and
//! treats any source containing `@syntax-error` as a compile failure.

#![allow(dead_code)]

use async_runtime::{
    native_fn, EventLoop, HostJob, ManualClock, MicroTask, NativeFn, Promise, ScriptHost,
};
use core_types::{ErrorKind, JsError};
use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::Path;
use std::rc::{Rc, Weak};

pub type Host<'a> = &'a dyn ScriptHost<TestValue>;

#[derive(Clone)]
pub enum TestValue {
    Undefined,
    Number(f64),
    Str(String),
    Array(Vec<TestValue>),
    Object(Rc<RefCell<BTreeMap<String, TestValue>>>),
    Function(NativeFn<TestValue>),
    Promise(Promise<TestValue>),
    Error(ErrorKind, String),
}

impl TestValue {
    pub fn object() -> Self {
        TestValue::Object(Rc::new(RefCell::new(BTreeMap::new())))
    }

    pub fn str(text: &str) -> Self {
        TestValue::Str(text.to_string())
    }

    pub fn number(&self) -> Option<f64> {
        match self {
            TestValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            TestValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn items(&self) -> Vec<TestValue> {
        match self {
            TestValue::Array(items) => items.clone(),
            _ => Vec::new(),
        }
    }

    pub fn prop(&self, key: &str) -> TestValue {
        match self {
            TestValue::Object(map) => map.borrow().get(key).cloned().unwrap_or(TestValue::Undefined),
            _ => TestValue::Undefined,
        }
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            TestValue::Error(kind, _) => Some(*kind),
            _ => None,
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        match self {
            TestValue::Error(_, message) => Some(message),
            _ => None,
        }
    }

    pub fn same_object(&self, other: &TestValue) -> bool {
        match (self, other) {
            (TestValue::Object(a), TestValue::Object(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    fn render(&self) -> String {
        match self {
            TestValue::Undefined => "undefined".to_string(),
            TestValue::Number(n) if n.fract() == 0.0 => format!("{}", *n as i64),
            TestValue::Number(n) => n.to_string(),
            TestValue::Str(s) => s.clone(),
            TestValue::Array(items) => items.iter().map(TestValue::render).collect::<Vec<_>>().join(","),
            TestValue::Object(_) => "[object Object]".to_string(),
            TestValue::Function(_) => "function".to_string(),
            TestValue::Promise(_) => "[object Promise]".to_string(),
            TestValue::Error(kind, message) => format!("{}: {message}", kind.constructor_name()),
        }
    }
}

impl fmt::Debug for TestValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TestValue::Object(map) => f.debug_map().entries(map.borrow().iter()).finish(),
            TestValue::Array(items) => f.debug_list().entries(items.iter()).finish(),
            TestValue::Promise(promise) => write!(f, "{promise:?}"),
            other => f.write_str(&other.render()),
        }
    }
}

pub struct FakeHost {
    me: Weak<FakeHost>,
    pub clock: Rc<ManualClock>,
    pub event_loop: Rc<EventLoop>,
    modules: RefCell<HashMap<String, NativeFn<TestValue>>>,
    evaluations: RefCell<HashMap<String, usize>>,
    tracked: Cell<usize>,
    promise_ids: Cell<u64>,
    log: RefCell<Vec<String>>,
}

impl FakeHost {
    pub fn new() -> Rc<Self> {
        let clock = Rc::new(ManualClock::new());
        Rc::new_cyclic(|me| FakeHost {
            me: me.clone(),
            clock: clock.clone(),
            event_loop: Rc::new(EventLoop::with_clock(clock)),
            modules: RefCell::new(HashMap::new()),
            evaluations: RefCell::new(HashMap::new()),
            tracked: Cell::new(0),
            promise_ids: Cell::new(0),
            log: RefCell::new(Vec::new()),
        })
    }

    pub fn as_host(&self) -> Host<'_> {
        self
    }

    pub fn function<F>(f: F) -> TestValue
    where
        F: Fn(Host<'_>, Vec<TestValue>) -> Result<TestValue, TestValue> + 'static,
    {
        TestValue::Function(native_fn(f))
    }

    /// Registers the body run when the module at `path` is evaluated. The
    /// body receives `[exports, require, module, __filename, __dirname]`.
    pub fn define_module<F>(&self, path: &Path, body: F)
    where
        F: Fn(Host<'_>, Vec<TestValue>) -> Result<TestValue, TestValue> + 'static,
    {
        self.modules
            .borrow_mut()
            .insert(path.to_string_lossy().into_owned(), native_fn(body));
    }

    pub fn evaluations(&self, path: &Path) -> usize {
        self.evaluations
            .borrow()
            .get(path.to_string_lossy().as_ref())
            .copied()
            .unwrap_or(0)
    }

    pub fn record(&self, entry: impl Into<String>) {
        self.log.borrow_mut().push(entry.into());
    }

    pub fn recorded(&self) -> Vec<String> {
        self.log.borrow().clone()
    }

    /// A function that logs `label:<first argument>` and returns the argument.
    pub fn recorder(&self, label: &str) -> TestValue {
        let me = self.me.clone();
        let label = label.to_string();
        FakeHost::function(move |host, args| {
            let value = args.into_iter().next().unwrap_or(TestValue::Undefined);
            if let Some(me) = me.upgrade() {
                me.record(format!("{label}:{}", host.coerce_string(&value)?));
            }
            Ok(value)
        })
    }

    pub fn drain(&self) -> usize {
        self.event_loop.run_microtasks()
    }

    pub fn tracked_promises(&self) -> usize {
        self.tracked.get()
    }
}

impl ScriptHost<TestValue> for FakeHost {
    fn undefined(&self) -> TestValue {
        TestValue::Undefined
    }

    fn string(&self, text: &str) -> Result<TestValue, TestValue> {
        Ok(TestValue::str(text))
    }

    fn error(&self, kind: ErrorKind, message: &str) -> TestValue {
        TestValue::Error(kind, message.to_string())
    }

    fn new_object(&self) -> Result<TestValue, TestValue> {
        Ok(TestValue::object())
    }

    fn array(&self, items: Vec<TestValue>) -> Result<TestValue, TestValue> {
        Ok(TestValue::Array(items))
    }

    fn is_undefined(&self, value: &TestValue) -> bool {
        matches!(value, TestValue::Undefined)
    }

    fn coerce_string(&self, value: &TestValue) -> Result<String, TestValue> {
        Ok(value.render())
    }

    fn get(&self, target: &TestValue, key: &str) -> Result<TestValue, TestValue> {
        Ok(match (target, key) {
            (TestValue::Object(_), _) => target.prop(key),
            (TestValue::Error(_, message), "message") => TestValue::str(message),
            (TestValue::Error(kind, _), "name") => TestValue::str(kind.constructor_name()),
            (TestValue::Array(items), "length") => TestValue::Number(items.len() as f64),
            _ => TestValue::Undefined,
        })
    }

    fn set(&self, target: &TestValue, key: &str, value: TestValue) -> Result<(), TestValue> {
        match target {
            TestValue::Object(map) => {
                map.borrow_mut().insert(key.to_string(), value);
                Ok(())
            }
            other => Err(self.error(
                ErrorKind::TypeError,
                &format!("Cannot set property '{key}' of {}", other.render()),
            )),
        }
    }

    fn is_callable(&self, value: &TestValue) -> bool {
        matches!(value, TestValue::Function(_))
    }

    fn call(
        &self,
        callee: &TestValue,
        _this: &TestValue,
        args: Vec<TestValue>,
    ) -> Result<TestValue, TestValue> {
        match callee {
            TestValue::Function(function) => function(self, args),
            other => Err(self.error(
                ErrorKind::TypeError,
                &format!("{} is not a function", other.render()),
            )),
        }
    }

    fn native_function(
        &self,
        _name: &str,
        function: NativeFn<TestValue>,
    ) -> Result<TestValue, TestValue> {
        Ok(TestValue::Function(function))
    }

    fn evaluate(&self, filename: &str, source: &str) -> Result<TestValue, TestValue> {
        *self
            .evaluations
            .borrow_mut()
            .entry(filename.to_string())
            .or_insert(0) += 1;
        if source.contains("@syntax-error") {
            return Err(self.error(ErrorKind::SyntaxError, "Unexpected token"));
        }
        let body = self.modules.borrow().get(filename).cloned();
        match body {
            Some(body) => Ok(TestValue::Function(body)),
            None => Err(self.error(
                ErrorKind::ReferenceError,
                &format!("no module body registered for {filename}"),
            )),
        }
    }

    fn as_promise(&self, value: &TestValue) -> Option<Promise<TestValue>> {
        match value {
            TestValue::Promise(promise) => Some(promise.clone()),
            _ => None,
        }
    }

    fn wrap_promise(&self, promise: &Promise<TestValue>) -> Result<TestValue, TestValue> {
        Ok(TestValue::Promise(promise.clone()))
    }

    fn next_promise_id(&self) -> u64 {
        self.promise_ids.set(self.promise_ids.get() + 1);
        self.promise_ids.get()
    }

    fn track_promise(&self, _promise: &Promise<TestValue>) {
        self.tracked.set(self.tracked.get() + 1);
    }

    fn enqueue_job(&self, job: HostJob<TestValue>) {
        let me = self.me.clone();
        self.event_loop.queue_microtask(MicroTask::new(move || {
            let Some(host) = me.upgrade() else {
                return Ok(());
            };
            job(host.as_host()).map_err(|reason| JsError::new(ErrorKind::Thrown, reason.render()))
        }));
    }
}
