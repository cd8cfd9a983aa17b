//! Promise engine.
//!
//! A [`Promise`] is a shared, single-threaded state machine: it starts
//! pending and settles at most once. Reactions registered with
//! [`Promise::then`] never run synchronously; settling a promise (or
//! subscribing to one that has already settled) queues each reaction as a
//! microtask through [`ScriptHost::enqueue_job`], in registration order.
//!
//! Resolution follows the usual rules:
//! - resolving a promise with itself rejects it with a `TypeError`
//! - resolving with another host promise adopts that promise's outcome
//! - resolving with a thenable calls its `then` with resolve/reject
//!   functions, of which only the first call counts
//! - anything else fulfills the promise

use crate::host::{host_job, native_fn, ScriptHost};
use core_types::ErrorKind;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};
use tracing::trace;

/// The state of a Promise.
///
/// Once settled (Fulfilled or Rejected), a Promise cannot change state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromiseState {
    /// The initial state; the promise is neither fulfilled nor rejected.
    Pending,
    /// The promise has been fulfilled with a value.
    Fulfilled,
    /// The promise has been rejected with a reason.
    Rejected,
}

/// The outcome of a settled promise.
#[derive(Debug, Clone)]
pub enum Settlement<V> {
    /// Fulfilled with a value
    Fulfilled(V),
    /// Rejected with a reason
    Rejected(V),
}

impl<V> Settlement<V> {
    /// The state this outcome puts a promise in.
    pub fn state(&self) -> PromiseState {
        match self {
            Settlement::Fulfilled(_) => PromiseState::Fulfilled,
            Settlement::Rejected(_) => PromiseState::Rejected,
        }
    }

    /// The value or reason.
    pub fn value(&self) -> &V {
        match self {
            Settlement::Fulfilled(value) | Settlement::Rejected(value) => value,
        }
    }

    /// Consumes the outcome, returning the value or reason.
    pub fn into_value(self) -> V {
        match self {
            Settlement::Fulfilled(value) | Settlement::Rejected(value) => value,
        }
    }
}

/// A host-side reaction handler. Receives the settled value; `Err` throws.
pub type NativeHandler<V> = Rc<dyn Fn(&dyn ScriptHost<V>, V) -> Result<V, V>>;

/// Wraps a closure as a [`NativeHandler`].
pub fn native_handler<V, F>(f: F) -> NativeHandler<V>
where
    F: Fn(&dyn ScriptHost<V>, V) -> Result<V, V> + 'static,
{
    Rc::new(f)
}

/// A `then` handler: either a script function or a host closure.
#[derive(Clone)]
pub enum Handler<V> {
    /// A callable script value, invoked with `this = undefined`
    Script(V),
    /// A host closure
    Native(NativeHandler<V>),
}

impl<V: Clone> Handler<V> {
    fn invoke(&self, host: &dyn ScriptHost<V>, argument: V) -> Result<V, V> {
        match self {
            Handler::Script(callee) => host.call(callee, &host.undefined(), vec![argument]),
            Handler::Native(handler) => handler(host, argument),
        }
    }
}

impl<V> fmt::Debug for Handler<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Handler::Script(_) => f.write_str("Handler::Script"),
            Handler::Native(_) => f.write_str("Handler::Native"),
        }
    }
}

/// A reaction to be triggered when a Promise settles.
///
/// This represents the handlers registered via `.then()`. A missing handler
/// passes the outcome through to the derived promise unchanged.
pub struct PromiseReaction<V> {
    /// Handler for the fulfilled state
    pub on_fulfilled: Option<Handler<V>>,
    /// Handler for the rejected state
    pub on_rejected: Option<Handler<V>>,
    /// Promise settled with the handler's outcome
    pub derived: Option<Promise<V>>,
}

impl<V: Clone + 'static> PromiseReaction<V> {
    fn fire(self, host: &dyn ScriptHost<V>, settlement: Settlement<V>) {
        let outcome = match settlement {
            Settlement::Fulfilled(value) => match self.on_fulfilled {
                Some(handler) => handler.invoke(host, value),
                None => Ok(value),
            },
            Settlement::Rejected(reason) => match self.on_rejected {
                Some(handler) => handler.invoke(host, reason),
                None => Err(reason),
            },
        };
        if let Some(derived) = self.derived {
            match outcome {
                Ok(value) => derived.resolve(host, value),
                Err(reason) => derived.reject(host, reason),
            }
        }
    }
}

struct PromiseRecord<V> {
    id: u64,
    state: PromiseState,
    value: Option<V>,
    reactions: Vec<PromiseReaction<V>>,
}

/// A shared handle to a promise record.
///
/// Cloning the handle shares the record; use [`Promise::ptr_eq`] for
/// identity.
pub struct Promise<V> {
    record: Rc<RefCell<PromiseRecord<V>>>,
}

impl<V> Clone for Promise<V> {
    fn clone(&self) -> Self {
        Self {
            record: self.record.clone(),
        }
    }
}

impl<V> fmt::Debug for Promise<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let record = self.record.borrow();
        f.debug_struct("Promise")
            .field("id", &record.id)
            .field("state", &record.state)
            .field("reactions", &record.reactions.len())
            .finish()
    }
}

/// A non-owning handle to a promise record.
pub struct WeakPromise<V> {
    record: Weak<RefCell<PromiseRecord<V>>>,
}

impl<V> Clone for WeakPromise<V> {
    fn clone(&self) -> Self {
        Self {
            record: self.record.clone(),
        }
    }
}

impl<V> WeakPromise<V> {
    /// Returns the promise if it is still alive.
    pub fn upgrade(&self) -> Option<Promise<V>> {
        self.record.upgrade().map(|record| Promise { record })
    }

    /// Returns true if the promise has been dropped.
    pub fn is_dead(&self) -> bool {
        self.record.strong_count() == 0
    }
}

/// The one-shot resolve/reject pair handed to executors and thenables.
///
/// Both functions share one `already_resolved` flag, so only the first call
/// to either has any effect.
pub struct ResolvingFunctions<V> {
    /// Script function resolving the promise
    pub resolve: V,
    /// Script function rejecting the promise
    pub reject: V,
    already_resolved: Rc<Cell<bool>>,
}

impl<V> ResolvingFunctions<V> {
    /// Returns true once either function has been called.
    pub fn is_resolved(&self) -> bool {
        self.already_resolved.get()
    }

    /// Marks the pair as used. Returns true if it already was.
    fn claim(&self) -> bool {
        self.already_resolved.replace(true)
    }
}

impl<V: Clone + 'static> Promise<V> {
    /// Creates a pending promise and registers it with the host.
    pub fn new(host: &dyn ScriptHost<V>) -> Self {
        let promise = Promise {
            record: Rc::new(RefCell::new(PromiseRecord {
                id: host.next_promise_id(),
                state: PromiseState::Pending,
                value: None,
                reactions: Vec::new(),
            })),
        };
        host.track_promise(&promise);
        promise
    }

    /// Runs `executor(resolve, reject)` synchronously against a new promise.
    ///
    /// A throwing executor rejects the promise, unless it already called one
    /// of the resolving functions. A non-callable executor is a `TypeError`
    /// and no promise is created.
    pub fn construct(host: &dyn ScriptHost<V>, executor: &V) -> Result<Self, V> {
        if !host.is_callable(executor) {
            return Err(host.error(ErrorKind::TypeError, "Promise resolver is not a function"));
        }
        let promise = Promise::new(host);
        let functions = promise.resolving_functions(host)?;
        let args = vec![functions.resolve.clone(), functions.reject.clone()];
        if let Err(reason) = host.call(executor, &host.undefined(), args) {
            if !functions.claim() {
                promise.reject(host, reason);
            }
        }
        Ok(promise)
    }

    /// `Promise.resolve(value)`: returns `value` itself if it already is a
    /// host promise, otherwise a new promise resolved with it.
    pub fn resolved(host: &dyn ScriptHost<V>, value: V) -> Self {
        if let Some(existing) = host.as_promise(&value) {
            return existing;
        }
        let promise = Promise::new(host);
        promise.resolve(host, value);
        promise
    }

    /// `Promise.reject(reason)`.
    pub fn rejected(host: &dyn ScriptHost<V>, reason: V) -> Self {
        let promise = Promise::new(host);
        promise.reject(host, reason);
        promise
    }

    /// Unique id of this record.
    pub fn id(&self) -> u64 {
        self.record.borrow().id
    }

    /// Current state.
    pub fn state(&self) -> PromiseState {
        self.record.borrow().state
    }

    /// Returns true while the promise is pending.
    pub fn is_pending(&self) -> bool {
        self.state() == PromiseState::Pending
    }

    /// The settled value or reason, if settled.
    pub fn settled_value(&self) -> Option<V> {
        self.settlement().map(Settlement::into_value)
    }

    /// The outcome, if settled.
    pub fn settlement(&self) -> Option<Settlement<V>> {
        let record = self.record.borrow();
        match record.state {
            PromiseState::Pending => None,
            PromiseState::Fulfilled => record.value.clone().map(Settlement::Fulfilled),
            PromiseState::Rejected => record.value.clone().map(Settlement::Rejected),
        }
    }

    /// Number of reactions waiting for this promise to settle.
    pub fn pending_reactions(&self) -> usize {
        self.record.borrow().reactions.len()
    }

    /// Returns true if both handles share one record.
    pub fn ptr_eq(&self, other: &Promise<V>) -> bool {
        Rc::ptr_eq(&self.record, &other.record)
    }

    /// Creates a non-owning handle.
    pub fn downgrade(&self) -> WeakPromise<V> {
        WeakPromise {
            record: Rc::downgrade(&self.record),
        }
    }

    /// Resolves the promise with `value`, following promises and thenables.
    ///
    /// Has no effect on a promise that is already settled.
    pub fn resolve(&self, host: &dyn ScriptHost<V>, value: V) {
        if !self.is_pending() {
            return;
        }

        if let Some(other) = host.as_promise(&value) {
            if other.ptr_eq(self) {
                let error = host.error(ErrorKind::TypeError, "Chaining cycle detected for promise");
                self.reject(host, error);
                return;
            }
            trace!(promise = self.id(), source = other.id(), "adopting promise");
            other.subscribe(
                host,
                PromiseReaction {
                    on_fulfilled: None,
                    on_rejected: None,
                    derived: Some(self.clone()),
                },
            );
            return;
        }

        let then = match host.get(&value, "then") {
            Ok(then) => then,
            Err(reason) => {
                self.reject(host, reason);
                return;
            }
        };
        if host.is_callable(&then) {
            self.adopt_thenable(host, value, then);
            return;
        }

        self.settle(host, Settlement::Fulfilled(value));
    }

    /// Rejects the promise. Has no effect on a promise that is already settled.
    pub fn reject(&self, host: &dyn ScriptHost<V>, reason: V) {
        self.settle(host, Settlement::Rejected(reason));
    }

    /// Registers handlers and returns the derived promise.
    ///
    /// The derived promise resolves with the handler's return value, or is
    /// rejected with whatever the handler throws. A missing handler passes
    /// the outcome through.
    pub fn then(
        &self,
        host: &dyn ScriptHost<V>,
        on_fulfilled: Option<Handler<V>>,
        on_rejected: Option<Handler<V>>,
    ) -> Promise<V> {
        let derived = Promise::new(host);
        self.subscribe(
            host,
            PromiseReaction {
                on_fulfilled,
                on_rejected,
                derived: Some(derived.clone()),
            },
        );
        derived
    }

    /// `then(None, on_rejected)`.
    pub fn catch(&self, host: &dyn ScriptHost<V>, on_rejected: Option<Handler<V>>) -> Promise<V> {
        self.then(host, None, on_rejected)
    }

    /// Runs `on_finally` with no arguments once settled, then passes the
    /// original outcome through.
    ///
    /// If `on_finally` throws, or returns a promise that rejects, the derived
    /// promise rejects with that reason instead. A non-callable value behaves
    /// like a missing handler.
    pub fn finally(&self, host: &dyn ScriptHost<V>, on_finally: Option<V>) -> Promise<V> {
        let Some(callback) = on_finally.filter(|callback| host.is_callable(callback)) else {
            return self.then(host, None, None);
        };

        let on_fulfilled = {
            let callback = callback.clone();
            native_handler(move |host: &dyn ScriptHost<V>, value: V| {
                let outcome = host.call(&callback, &host.undefined(), Vec::new())?;
                let restore = native_handler(move |_: &dyn ScriptHost<V>, _: V| Ok(value.clone()));
                let chained =
                    Promise::resolved(host, outcome).then(host, Some(Handler::Native(restore)), None);
                host.wrap_promise(&chained)
            })
        };
        let on_rejected = native_handler(move |host: &dyn ScriptHost<V>, reason: V| {
            let outcome = host.call(&callback, &host.undefined(), Vec::new())?;
            let restore = native_handler(move |_: &dyn ScriptHost<V>, _: V| Err(reason.clone()));
            let chained =
                Promise::resolved(host, outcome).then(host, Some(Handler::Native(restore)), None);
            host.wrap_promise(&chained)
        });

        self.then(
            host,
            Some(Handler::Native(on_fulfilled)),
            Some(Handler::Native(on_rejected)),
        )
    }

    /// Creates the guarded resolve/reject pair for this promise.
    pub fn resolving_functions(&self, host: &dyn ScriptHost<V>) -> Result<ResolvingFunctions<V>, V> {
        let already_resolved = Rc::new(Cell::new(false));

        let resolve = {
            let promise = self.clone();
            let already_resolved = already_resolved.clone();
            native_fn(move |host: &dyn ScriptHost<V>, args: Vec<V>| {
                if !already_resolved.replace(true) {
                    let value = args.into_iter().next().unwrap_or_else(|| host.undefined());
                    promise.resolve(host, value);
                }
                Ok(host.undefined())
            })
        };
        let reject = {
            let promise = self.clone();
            let already_resolved = already_resolved.clone();
            native_fn(move |host: &dyn ScriptHost<V>, args: Vec<V>| {
                if !already_resolved.replace(true) {
                    let reason = args.into_iter().next().unwrap_or_else(|| host.undefined());
                    promise.reject(host, reason);
                }
                Ok(host.undefined())
            })
        };

        Ok(ResolvingFunctions {
            resolve: host.native_function("resolve", resolve)?,
            reject: host.native_function("reject", reject)?,
            already_resolved,
        })
    }

    /// Drops the stored value and every pending reaction.
    ///
    /// Hosts call this at teardown to break reference cycles between
    /// promises and engine handles. The state is left as is.
    pub fn clear(&self) {
        let (value, reactions) = {
            let mut record = self.record.borrow_mut();
            (record.value.take(), std::mem::take(&mut record.reactions))
        };
        drop(reactions);
        drop(value);
    }

    /// Observes the outcome with host handlers, without a derived promise.
    pub(crate) fn observe(
        &self,
        host: &dyn ScriptHost<V>,
        on_fulfilled: NativeHandler<V>,
        on_rejected: NativeHandler<V>,
    ) {
        self.subscribe(
            host,
            PromiseReaction {
                on_fulfilled: Some(Handler::Native(on_fulfilled)),
                on_rejected: Some(Handler::Native(on_rejected)),
                derived: None,
            },
        );
    }

    fn subscribe(&self, host: &dyn ScriptHost<V>, reaction: PromiseReaction<V>) {
        match self.settlement() {
            Some(settlement) => schedule_reaction(host, reaction, settlement),
            None => self.record.borrow_mut().reactions.push(reaction),
        }
    }

    fn adopt_thenable(&self, host: &dyn ScriptHost<V>, thenable: V, then: V) {
        let functions = match self.resolving_functions(host) {
            Ok(functions) => functions,
            Err(reason) => {
                self.reject(host, reason);
                return;
            }
        };
        trace!(promise = self.id(), "adopting thenable");
        let args = vec![functions.resolve.clone(), functions.reject.clone()];
        if let Err(reason) = host.call(&then, &thenable, args) {
            if !functions.claim() {
                self.reject(host, reason);
            }
        }
    }

    fn settle(&self, host: &dyn ScriptHost<V>, settlement: Settlement<V>) {
        let (id, reactions) = {
            let mut record = self.record.borrow_mut();
            if record.state != PromiseState::Pending {
                return;
            }
            record.state = settlement.state();
            record.value = Some(settlement.value().clone());
            (record.id, std::mem::take(&mut record.reactions))
        };
        trace!(promise = id, state = ?settlement.state(), reactions = reactions.len(), "promise settled");
        for reaction in reactions {
            schedule_reaction(host, reaction, settlement.clone());
        }
    }
}

fn schedule_reaction<V: Clone + 'static>(
    host: &dyn ScriptHost<V>,
    reaction: PromiseReaction<V>,
    settlement: Settlement<V>,
) {
    host.enqueue_job(host_job(move |host: &dyn ScriptHost<V>| {
        reaction.fire(host, settlement);
        Ok(())
    }));
}
