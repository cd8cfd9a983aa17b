//! The seam between the scheduling core and a script engine.
//!
//! The promise engine and the module loader never touch engine types
//! directly. They work with an opaque value type `V` and ask a
//! [`ScriptHost`] to create, inspect and call values on their behalf. The
//! CLI implements this trait over a real engine; tests implement it over a
//! small in-memory value model.
//!
//! Fallible operations return `Result<V, V>`: the error side is the thrown
//! script value, so it can be handed straight to a rejection without
//! conversion.

use crate::promise::Promise;
use core_types::ErrorKind;
use std::rc::Rc;

/// A host function callable from scripts. Receives the host and the call
/// arguments; `Err` throws the contained value.
pub type NativeFn<V> = Rc<dyn Fn(&dyn ScriptHost<V>, Vec<V>) -> Result<V, V>>;

/// A unit of work queued on the microtask queue through
/// [`ScriptHost::enqueue_job`].
pub type HostJob<V> = Box<dyn FnOnce(&dyn ScriptHost<V>) -> Result<(), V>>;

/// Wraps a closure as a [`NativeFn`].
pub fn native_fn<V, F>(f: F) -> NativeFn<V>
where
    F: Fn(&dyn ScriptHost<V>, Vec<V>) -> Result<V, V> + 'static,
{
    Rc::new(f)
}

/// Wraps a closure as a [`HostJob`].
pub fn host_job<V, F>(f: F) -> HostJob<V>
where
    F: FnOnce(&dyn ScriptHost<V>) -> Result<(), V> + 'static,
{
    Box::new(f)
}

/// Operations the core needs from a script engine.
pub trait ScriptHost<V> {
    /// The `undefined` value.
    fn undefined(&self) -> V;

    /// A string value.
    fn string(&self, text: &str) -> Result<V, V>;

    /// A new error object of the given kind.
    fn error(&self, kind: ErrorKind, message: &str) -> V;

    /// A new empty plain object.
    fn new_object(&self) -> Result<V, V>;

    /// A new array holding `items` in order.
    fn array(&self, items: Vec<V>) -> Result<V, V>;

    /// Returns true for `undefined`.
    fn is_undefined(&self, value: &V) -> bool;

    /// Converts a value to a string the way `String(value)` would.
    fn coerce_string(&self, value: &V) -> Result<String, V>;

    /// Reads a property. Primitives yield `undefined`; getters may throw.
    fn get(&self, target: &V, key: &str) -> Result<V, V>;

    /// Writes a property.
    fn set(&self, target: &V, key: &str, value: V) -> Result<(), V>;

    /// Returns true if the value can be called.
    fn is_callable(&self, value: &V) -> bool;

    /// Calls `callee` with the given receiver and arguments.
    fn call(&self, callee: &V, this: &V, args: Vec<V>) -> Result<V, V>;

    /// Exposes a host closure as a script function.
    fn native_function(&self, name: &str, function: NativeFn<V>) -> Result<V, V>;

    /// Compiles and runs `source` as a script, returning its completion value.
    fn evaluate(&self, filename: &str, source: &str) -> Result<V, V>;

    /// Returns the host promise behind a value, if it is one.
    fn as_promise(&self, value: &V) -> Option<Promise<V>>;

    /// Returns the script object for a host promise, creating it on first use.
    fn wrap_promise(&self, promise: &Promise<V>) -> Result<V, V>;

    /// Allocates the id of a new promise. Ids are unique per host and never
    /// reused.
    fn next_promise_id(&self) -> u64;

    /// Called for every promise the core creates. Hosts that keep engine
    /// handles alive inside promises use this to release them at teardown.
    fn track_promise(&self, _promise: &Promise<V>) {}

    /// Queues `job` on the microtask queue.
    fn enqueue_job(&self, job: HostJob<V>);
}
