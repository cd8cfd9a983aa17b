//! QuickJS behind the [`ScriptHost`] seam
//!
//! [`JsValue`] keeps an engine value alive outside any engine scope so the
//! scheduling core can store it in queues, promise records and the module
//! cache. [`QuickJsHost`] is the short-lived view the core talks to while a
//! context is entered. [`HostState`] is everything one runtime instance
//! shares between its natives, its queued jobs and its timers.

use async_runtime::{
    EventLoop, HostJob, MicroTask, ModuleLoader, NativeFn, Promise, ScriptHost, WeakPromise,
};
use builtins::ConsoleObject;
use core_types::{ErrorKind, JsError};
use rquickjs::function::{Constructor, Rest, This};
use rquickjs::{qjs, Array, Coerced, Context, Ctx, Exception, FromJs, Function, Object, Persistent, Value};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::ffi::CString;
use std::fmt;
use std::rc::{Rc, Weak};
use tracing::{debug, trace};

/// A script value that outlives the scope it was created in.
#[derive(Clone)]
pub struct JsValue(Persistent<Value<'static>>);

impl JsValue {
    /// Keeps `value` alive beyond the current scope.
    pub fn save<'js>(ctx: &Ctx<'js>, value: Value<'js>) -> Self {
        JsValue(Persistent::save(ctx, value))
    }

    /// Brings the value back into the scope of `ctx`.
    pub fn restore<'js>(&self, ctx: &Ctx<'js>) -> rquickjs::Result<Value<'js>> {
        self.0.clone().restore(ctx)
    }
}

impl fmt::Debug for JsValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("JsValue(..)")
    }
}

/// The `idOf`/`wrap` helpers of the script-side `Promise` shell.
pub(crate) struct PromiseShell {
    pub(crate) id_of: JsValue,
    pub(crate) wrap: JsValue,
}

/// Per-runtime state shared by every native function and queued job.
pub struct HostState {
    me: Weak<HostState>,
    pub(crate) context: Context,
    pub(crate) event_loop: Rc<EventLoop>,
    pub(crate) loader: Rc<ModuleLoader<JsValue>>,
    pub(crate) console: Rc<ConsoleObject>,
    promises: RefCell<HashMap<u64, WeakPromise<JsValue>>>,
    last_promise_id: Cell<u64>,
    prune_at: Cell<usize>,
    pub(crate) shell: RefCell<Option<PromiseShell>>,
}

const INITIAL_PRUNE_AT: usize = 256;

impl HostState {
    pub(crate) fn new(
        context: Context,
        event_loop: Rc<EventLoop>,
        loader: Rc<ModuleLoader<JsValue>>,
        console: Rc<ConsoleObject>,
    ) -> Rc<Self> {
        Rc::new_cyclic(|me| HostState {
            me: me.clone(),
            context,
            event_loop,
            loader,
            console,
            promises: RefCell::new(HashMap::new()),
            last_promise_id: Cell::new(0),
            prune_at: Cell::new(INITIAL_PRUNE_AT),
            shell: RefCell::new(None),
        })
    }

    /// A weak handle for closures stored inside the engine.
    pub fn weak(&self) -> Weak<HostState> {
        self.me.clone()
    }

    /// Enters the context and runs `f` against a host view of it.
    ///
    /// Must not be called while the context is already entered.
    pub fn with_host<R>(self: &Rc<Self>, f: impl FnOnce(&QuickJsHost<'_>) -> R) -> R {
        self.context
            .with(|ctx| f(&QuickJsHost::new(ctx, self.clone())))
    }

    /// Calls a script callback with `undefined` as receiver.
    pub fn invoke(self: &Rc<Self>, callback: &JsValue, args: &[JsValue]) -> Result<(), JsError> {
        self.with_host(|host| {
            let undefined = host.undefined();
            host.call(callback, &undefined, args.to_vec())
                .map(drop)
                .map_err(|thrown| host.js_error(&thrown))
        })
    }

    /// Number of promise records still alive.
    pub fn live_promises(&self) -> usize {
        self.promises
            .borrow()
            .values()
            .filter(|promise| !promise.is_dead())
            .count()
    }

    fn next_promise_id(&self) -> u64 {
        let id = self.last_promise_id.get() + 1;
        self.last_promise_id.set(id);
        id
    }

    fn track(&self, promise: &Promise<JsValue>) {
        let mut promises = self.promises.borrow_mut();
        promises.insert(promise.id(), promise.downgrade());
        if promises.len() >= self.prune_at.get() {
            promises.retain(|_, promise| !promise.is_dead());
            self.prune_at
                .set((promises.len() * 2).max(INITIAL_PRUNE_AT));
        }
    }

    fn promise(&self, id: u64) -> Option<Promise<JsValue>> {
        self.promises.borrow().get(&id).and_then(WeakPromise::upgrade)
    }

    /// Releases every engine value held on the host side.
    ///
    /// Queued work is dropped, the module cache emptied and every live
    /// promise cleared, so the engine can be freed without dangling
    /// references.
    pub fn teardown(&self) {
        self.event_loop.clear();
        self.loader.clear();
        let promises = std::mem::take(&mut *self.promises.borrow_mut());
        for promise in promises.values().filter_map(WeakPromise::upgrade) {
            promise.clear();
        }
        self.shell.borrow_mut().take();
        debug!(promises = promises.len(), "host state released");
    }
}

impl fmt::Debug for HostState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostState")
            .field("event_loop", &self.event_loop)
            .field("loader", &self.loader)
            .field("promises", &self.promises.borrow().len())
            .finish_non_exhaustive()
    }
}

/// Builds an error object of `kind` through the global constructor.
pub fn error_value<'js>(ctx: &Ctx<'js>, kind: ErrorKind, message: &str) -> Value<'js> {
    let constructed = ctx
        .globals()
        .get::<_, Constructor<'js>>(kind.constructor_name())
        .and_then(|constructor| constructor.construct::<_, Value<'js>>((message,)));
    match constructed {
        Ok(error) => error,
        Err(_) => {
            let _ = ctx.catch();
            rquickjs::String::from_str(ctx.clone(), message)
                .map(|text| text.into_value())
                .unwrap_or_else(|_| Value::new_undefined(ctx.clone()))
        }
    }
}

/// Converts a thrown script value into a host error.
pub fn error_from_value<'js>(ctx: &Ctx<'js>, thrown: Value<'js>) -> JsError {
    if let Some(object) = thrown.as_object() {
        if let Some(exception) = Exception::from_object(object.clone()) {
            let kind = object
                .get::<_, Option<String>>("name")
                .ok()
                .flatten()
                .map(|name| ErrorKind::from_name(&name))
                .unwrap_or(ErrorKind::Error);
            let error = JsError::new(kind, exception.message().unwrap_or_default());
            return match exception.stack() {
                Some(stack) => error.with_stack(stack),
                None => error,
            };
        }
    }
    let text = match Coerced::<String>::from_js(ctx, thrown) {
        Ok(text) => text.0,
        Err(_) => {
            let _ = ctx.catch();
            "<unprintable value>".to_string()
        }
    };
    JsError::new(ErrorKind::Thrown, text)
}

/// The [`ScriptHost`] view of one entered QuickJS context.
pub struct QuickJsHost<'js> {
    ctx: Ctx<'js>,
    state: Rc<HostState>,
}

impl<'js> QuickJsHost<'js> {
    /// Wraps an entered context.
    pub fn new(ctx: Ctx<'js>, state: Rc<HostState>) -> Self {
        Self { ctx, state }
    }

    /// The entered context.
    pub fn ctx(&self) -> &Ctx<'js> {
        &self.ctx
    }

    /// The runtime state this host belongs to.
    pub fn state(&self) -> &Rc<HostState> {
        &self.state
    }

    /// Saves a scoped value.
    pub fn save(&self, value: Value<'js>) -> JsValue {
        JsValue::save(&self.ctx, value)
    }

    /// Restores a saved value into this scope.
    pub fn restore(&self, value: &JsValue) -> Result<Value<'js>, JsValue> {
        value.restore(&self.ctx).map_err(|err| self.thrown(err))
    }

    /// The script value behind an engine error: the pending exception if
    /// there is one, otherwise a new `InternalError` describing it.
    pub fn thrown(&self, err: rquickjs::Error) -> JsValue {
        let value = if err.is_exception() {
            self.ctx.catch()
        } else {
            error_value(&self.ctx, ErrorKind::InternalError, &err.to_string())
        };
        self.save(value)
    }

    /// Rethrows a saved value into the engine.
    pub fn throw(&self, thrown: JsValue) -> rquickjs::Error {
        match thrown.restore(&self.ctx) {
            Ok(value) => self.ctx.throw(value),
            Err(err) => err,
        }
    }

    /// Converts a saved thrown value into a host error.
    pub fn js_error(&self, thrown: &JsValue) -> JsError {
        match thrown.restore(&self.ctx) {
            Ok(value) => error_from_value(&self.ctx, value),
            Err(err) => JsError::internal(err.to_string()),
        }
    }

    /// Maps an engine result onto the thrown-value convention.
    pub fn lift<T>(&self, result: rquickjs::Result<T>) -> Result<T, JsValue> {
        result.map_err(|err| self.thrown(err))
    }

    /// Maps an engine result onto a host error.
    pub fn check<T>(&self, result: rquickjs::Result<T>) -> Result<T, JsError> {
        result.map_err(|err| {
            let thrown = self.thrown(err);
            self.js_error(&thrown)
        })
    }

    fn shell_function(&self, pick: fn(&PromiseShell) -> &JsValue) -> Result<Function<'js>, JsValue> {
        let saved = self
            .state
            .shell
            .borrow()
            .as_ref()
            .map(|shell| pick(shell).clone())
            .ok_or_else(|| self.error(ErrorKind::InternalError, "Promise global is not installed"))?;
        let value = self.restore(&saved)?;
        value
            .into_function()
            .ok_or_else(|| self.error(ErrorKind::InternalError, "Promise shell helper is not a function"))
    }
}

impl<'js> ScriptHost<JsValue> for QuickJsHost<'js> {
    fn undefined(&self) -> JsValue {
        self.save(Value::new_undefined(self.ctx.clone()))
    }

    fn string(&self, text: &str) -> Result<JsValue, JsValue> {
        let text = self.lift(rquickjs::String::from_str(self.ctx.clone(), text))?;
        Ok(self.save(text.into_value()))
    }

    fn error(&self, kind: ErrorKind, message: &str) -> JsValue {
        self.save(error_value(&self.ctx, kind, message))
    }

    fn new_object(&self) -> Result<JsValue, JsValue> {
        let object = self.lift(Object::new(self.ctx.clone()))?;
        Ok(self.save(object.into_value()))
    }

    fn array(&self, items: Vec<JsValue>) -> Result<JsValue, JsValue> {
        let array = self.lift(Array::new(self.ctx.clone()))?;
        for (index, item) in items.iter().enumerate() {
            let item = self.restore(item)?;
            self.lift(array.set(index, item))?;
        }
        Ok(self.save(array.into_value()))
    }

    fn is_undefined(&self, value: &JsValue) -> bool {
        self.restore(value)
            .map(|value| value.is_undefined())
            .unwrap_or(false)
    }

    fn coerce_string(&self, value: &JsValue) -> Result<String, JsValue> {
        let value = self.restore(value)?;
        self.lift(Coerced::<String>::from_js(&self.ctx, value))
            .map(|text| text.0)
    }

    fn get(&self, target: &JsValue, key: &str) -> Result<JsValue, JsValue> {
        let target = self.restore(target)?;
        match target.as_object() {
            Some(object) => {
                let value: Value<'js> = self.lift(object.get(key))?;
                Ok(self.save(value))
            }
            None => Ok(self.undefined()),
        }
    }

    fn set(&self, target: &JsValue, key: &str, value: JsValue) -> Result<(), JsValue> {
        let target = self.restore(target)?;
        let value = self.restore(&value)?;
        match target.as_object() {
            Some(object) => self.lift(object.set(key, value)),
            None => Err(self.error(
                ErrorKind::TypeError,
                &format!("Cannot set property '{key}' of a primitive"),
            )),
        }
    }

    fn is_callable(&self, value: &JsValue) -> bool {
        self.restore(value)
            .map(|value| value.is_function())
            .unwrap_or(false)
    }

    fn call(&self, callee: &JsValue, this: &JsValue, args: Vec<JsValue>) -> Result<JsValue, JsValue> {
        let Some(function) = self.restore(callee)?.into_function() else {
            return Err(self.error(ErrorKind::TypeError, "value is not a function"));
        };
        let this = self.restore(this)?;
        let args = args
            .iter()
            .map(|arg| self.restore(arg))
            .collect::<Result<Vec<_>, _>>()?;
        let result: Value<'js> = self.lift(function.call((This(this), Rest(args))))?;
        Ok(self.save(result))
    }

    fn native_function(&self, name: &str, function: NativeFn<JsValue>) -> Result<JsValue, JsValue> {
        trace!(name, "native function");
        let state = self.state.weak();
        let native = Function::new(
            self.ctx.clone(),
            move |ctx: Ctx<'js>, args: Rest<Value<'js>>| -> rquickjs::Result<Value<'js>> {
                let Some(state) = state.upgrade() else {
                    return Ok(Value::new_undefined(ctx));
                };
                let host = QuickJsHost::new(ctx.clone(), state);
                let args = args.0.into_iter().map(|arg| host.save(arg)).collect();
                match function(&host, args) {
                    Ok(result) => result.restore(&ctx),
                    Err(thrown) => Err(host.throw(thrown)),
                }
            },
        );
        let native = self.lift(native)?;
        Ok(self.save(native.into_value()))
    }

    fn evaluate(&self, filename: &str, source: &str) -> Result<JsValue, JsValue> {
        trace!(filename, "evaluating script");
        let value = self.lift(eval_named(&self.ctx, filename, source))?;
        Ok(self.save(value))
    }

    fn as_promise(&self, value: &JsValue) -> Option<Promise<JsValue>> {
        let value = self.restore(value).ok()?;
        if !value.is_object() {
            return None;
        }
        let id_of = self.shell_function(|shell| &shell.id_of).ok()?;
        match id_of.call::<_, Option<f64>>((value,)) {
            Ok(id) => self.state.promise(id? as u64),
            Err(_) => {
                let _ = self.ctx.catch();
                None
            }
        }
    }

    fn wrap_promise(&self, promise: &Promise<JsValue>) -> Result<JsValue, JsValue> {
        let wrap = self.shell_function(|shell| &shell.wrap)?;
        // The wrapper owns the record through this function.
        let record = promise.clone();
        let keepalive = self.lift(Function::new(self.ctx.clone(), move || record.id() as f64))?;
        let wrapper: Value<'js> = self.lift(wrap.call((promise.id() as f64, keepalive)))?;
        Ok(self.save(wrapper))
    }

    fn next_promise_id(&self) -> u64 {
        self.state.next_promise_id()
    }

    fn track_promise(&self, promise: &Promise<JsValue>) {
        self.state.track(promise);
    }

    fn enqueue_job(&self, job: HostJob<JsValue>) {
        let state = self.state.weak();
        self.state.event_loop.queue_microtask(MicroTask::new(move || {
            let Some(state) = state.upgrade() else {
                return Ok(());
            };
            state.with_host(|host| job(host).map_err(|thrown| host.js_error(&thrown)))
        }));
    }
}

/// Evaluates `source` as global strict-mode script code, reporting
/// `filename` in stack traces and syntax errors.
///
/// `Ctx::eval` names every script `eval_script`.
pub(crate) fn eval_named<'js>(ctx: &Ctx<'js>, filename: &str, source: &str) -> rquickjs::Result<Value<'js>> {
    let name = CString::new(filename)?;
    let len = source.len();
    let source = CString::new(source)?;
    let flags = (qjs::JS_EVAL_TYPE_GLOBAL | qjs::JS_EVAL_FLAG_STRICT) as i32;
    // SAFETY: the context pointer is live for 'js, both strings are
    // NUL-terminated and outlive the call, and the returned value is owned.
    unsafe {
        let raw = qjs::JS_Eval(ctx.as_raw().as_ptr(), source.as_ptr(), len as _, name.as_ptr(), flags);
        if qjs::JS_IsException(raw) {
            return Err(rquickjs::Error::Exception);
        }
        Ok(Value::from_raw(ctx.clone(), raw))
    }
}
