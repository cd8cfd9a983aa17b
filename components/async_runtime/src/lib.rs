//! Scheduling substrate for an embedded JavaScript engine.
//!
//! This crate holds everything that decides *when* script code runs:
//! - [`EventLoop`] - timers, macrotasks and microtasks on one thread
//! - [`Promise`] - the promise state machine and its combinators
//! - [`ModuleLoader`] - CommonJS `require` with a circular-safe cache
//!
//! None of it depends on a particular engine. The promise engine and the
//! module loader talk to scripts through the [`ScriptHost`] trait, over an
//! opaque value type chosen by the host.
//!
//! # Examples
//!
//! ## Event Loop Usage
//!
//! ```
//! use async_runtime::{EventLoop, ManualClock};
//! use std::cell::RefCell;
//! use std::rc::Rc;
//! use std::time::Duration;
//!
//! let clock = Rc::new(ManualClock::new());
//! let event_loop = EventLoop::with_clock(clock.clone());
//! let fired = Rc::new(RefCell::new(Vec::new()));
//!
//! for (label, ms) in [("slow", 50), ("fast", 10)] {
//!     let fired = fired.clone();
//!     event_loop.set_timeout(move || { fired.borrow_mut().push(label); Ok(()) }, Duration::from_millis(ms));
//! }
//!
//! event_loop.run();
//! assert_eq!(*fired.borrow(), vec!["fast", "slow"]);
//! assert_eq!(clock.elapsed(), Duration::from_millis(50));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod clock;
pub mod combinators;
pub mod event_loop;
pub mod host;
pub mod module;
pub mod promise;
pub mod task_queue;
pub mod timer;

// Re-export main types at crate root
pub use clock::{Clock, ManualClock, MonotonicClock};
pub use event_loop::{EventLoop, JobPump, LoopPhase};
pub use host::{host_job, native_fn, HostJob, NativeFn, ScriptHost};
pub use module::{LoadState, ModuleCacheEntry, ModuleLoader, ResolveOptions};
pub use promise::{
    native_handler, Handler, NativeHandler, Promise, PromiseReaction, PromiseState,
    ResolvingFunctions, Settlement, WeakPromise,
};
pub use task_queue::{MacrotaskQueue, MicroTask, MicrotaskQueue, ScheduledTask, TaskCallback, TaskHandle};
pub use timer::{TimerHandle, TimerId, TimerKind, TimerRegistry};
