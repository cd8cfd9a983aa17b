//! Event loop implementation.
//!
//! Each turn of the loop:
//! 1. Drains the microtask queue to empty, including microtasks enqueued by
//!    microtasks and any pending engine jobs
//! 2. Pops the earliest macrotask, sleeping until it is due
//! 3. Runs it and re-arms it if it belongs to a live interval
//!
//! The loop halts when no macrotasks remain or [`EventLoop::stop`] is called.
//! Errors escaping a callback are logged and never stop the loop.
//!
//! Callbacks run while no internal borrow is held, so a callback may freely
//! schedule or cancel timers and enqueue microtasks on the same loop.

use crate::clock::{Clock, MonotonicClock};
use crate::task_queue::{MacrotaskQueue, MicroTask, MicrotaskQueue};
use crate::timer::{TimerId, TimerRegistry};
use core_types::JsError;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;
use std::time::{Duration, Instant};
use tracing::{debug, error, trace};

/// Runs one pending job from an external queue (the engine's own job queue,
/// used for `async` functions). Returns false when that queue is empty.
pub type JobPump = Rc<dyn Fn() -> bool>;

/// Where the loop currently is in its turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopPhase {
    /// Not running
    Idle,
    /// Running microtasks
    DrainingMicrotasks,
    /// Waiting for the earliest macrotask to become due
    AwaitingNextMacrotask,
    /// Running a macrotask callback
    ExecutingMacrotask,
    /// `run` has returned
    Stopped,
}

#[derive(Debug, Default)]
struct LoopQueues {
    timers: TimerRegistry,
    macrotasks: MacrotaskQueue,
    microtasks: MicrotaskQueue,
}

/// The host event loop.
///
/// All methods take `&self`; the loop is meant to be shared behind an
/// [`Rc`] with every native function that schedules work.
///
/// # Examples
///
/// ```
/// use async_runtime::{EventLoop, MicroTask};
/// use std::cell::RefCell;
/// use std::rc::Rc;
/// use std::time::Duration;
///
/// let event_loop = EventLoop::new();
/// let order = Rc::new(RefCell::new(Vec::new()));
///
/// let o = order.clone();
/// event_loop.set_timeout(move || { o.borrow_mut().push("timeout"); Ok(()) }, Duration::ZERO);
/// let o = order.clone();
/// event_loop.queue_microtask(MicroTask::new(move || { o.borrow_mut().push("microtask"); Ok(()) }));
///
/// event_loop.run();
/// assert_eq!(*order.borrow(), vec!["microtask", "timeout"]);
/// ```
pub struct EventLoop {
    queues: RefCell<LoopQueues>,
    clock: Rc<dyn Clock>,
    phase: Cell<LoopPhase>,
    stop_requested: Cell<bool>,
    external_jobs: RefCell<Option<JobPump>>,
}

impl Default for EventLoop {
    fn default() -> Self {
        Self::new()
    }
}

impl EventLoop {
    /// Creates a loop driven by the real monotonic clock.
    pub fn new() -> Self {
        Self::with_clock(Rc::new(MonotonicClock))
    }

    /// Creates a loop driven by `clock`.
    pub fn with_clock(clock: Rc<dyn Clock>) -> Self {
        Self {
            queues: RefCell::new(LoopQueues::default()),
            clock,
            phase: Cell::new(LoopPhase::Idle),
            stop_requested: Cell::new(false),
            external_jobs: RefCell::new(None),
        }
    }

    /// Schedules `callback` to run once after `delay`.
    pub fn set_timeout<F>(&self, callback: F, delay: Duration) -> TimerId
    where
        F: Fn() -> Result<(), JsError> + 'static,
    {
        let now = self.clock.now();
        let mut queues = self.queues.borrow_mut();
        let queues = &mut *queues;
        let id = queues
            .timers
            .set_timeout(&mut queues.macrotasks, now, Rc::new(callback), delay);
        trace!(timer = %id, delay_ms = delay.as_millis() as u64, "timeout scheduled");
        id
    }

    /// Schedules `callback` to run every `interval` until cleared.
    pub fn set_interval<F>(&self, callback: F, interval: Duration) -> TimerId
    where
        F: Fn() -> Result<(), JsError> + 'static,
    {
        let now = self.clock.now();
        let mut queues = self.queues.borrow_mut();
        let queues = &mut *queues;
        let id = queues
            .timers
            .set_interval(&mut queues.macrotasks, now, Rc::new(callback), interval);
        trace!(timer = %id, interval_ms = interval.as_millis() as u64, "interval scheduled");
        id
    }

    /// Schedules `callback` as a zero-delay timer.
    pub fn set_immediate<F>(&self, callback: F) -> TimerId
    where
        F: Fn() -> Result<(), JsError> + 'static,
    {
        self.set_timeout(callback, Duration::ZERO)
    }

    /// Cancels a timer. Unknown ids are ignored.
    pub fn clear_timeout(&self, id: TimerId) {
        self.cancel(id);
    }

    /// Cancels an interval. Accepts any timer id, like `clear_timeout`.
    pub fn clear_interval(&self, id: TimerId) {
        self.cancel(id);
    }

    /// Cancels an immediate. Accepts any timer id, like `clear_timeout`.
    pub fn clear_immediate(&self, id: TimerId) {
        self.cancel(id);
    }

    /// Adds a microtask to the back of the microtask queue.
    pub fn queue_microtask(&self, microtask: MicroTask) {
        self.queues.borrow_mut().microtasks.enqueue(microtask);
    }

    /// Installs a pump for an external job queue, drained whenever the
    /// microtask queue runs dry.
    pub fn set_external_jobs(&self, pump: JobPump) {
        *self.external_jobs.borrow_mut() = Some(pump);
    }

    /// Removes the external job pump.
    pub fn clear_external_jobs(&self) {
        self.external_jobs.borrow_mut().take();
    }

    /// Runs microtasks until both the microtask queue and the external job
    /// queue are empty. Returns how many jobs ran.
    pub fn run_microtasks(&self) -> usize {
        let previous = self.phase.replace(LoopPhase::DrainingMicrotasks);
        let mut ran = 0;
        loop {
            let next = self.queues.borrow_mut().microtasks.dequeue();
            if let Some(microtask) = next {
                if let Err(err) = microtask.run() {
                    error!(error = %err, "uncaught error in microtask");
                }
                ran += 1;
                continue;
            }
            let pump = self.external_jobs.borrow().clone();
            match pump {
                Some(pump) if pump() => ran += 1,
                _ => break,
            }
        }
        self.phase.set(previous);
        ran
    }

    /// Runs the loop until no macrotasks remain or [`stop`](Self::stop) is
    /// called.
    pub fn run(&self) {
        self.stop_requested.set(false);
        debug!("event loop started");
        loop {
            self.run_microtasks();
            if self.stop_requested.get() {
                debug!(pending = self.pending_macrotasks(), "event loop stopped on request");
                break;
            }
            if !self.run_next_macrotask() {
                break;
            }
        }
        self.phase.set(LoopPhase::Stopped);
        debug!("event loop finished");
    }

    /// Pops and runs the earliest macrotask, sleeping until it is due.
    /// Returns false if there was nothing to run.
    pub fn run_next_macrotask(&self) -> bool {
        let next = self.queues.borrow_mut().macrotasks.pop_earliest();
        let Some((_, task)) = next else {
            return false;
        };

        self.phase.set(LoopPhase::AwaitingNextMacrotask);
        self.clock.sleep_until(task.due_time);

        let registration = self.queues.borrow_mut().timers.begin_run(task.timer);
        if registration.is_none() {
            trace!(timer = %task.timer, "skipping task for cleared timer");
            return true;
        }

        self.phase.set(LoopPhase::ExecutingMacrotask);
        if let Err(err) = task.run() {
            error!(timer = %task.timer, error = %err, "uncaught error in timer callback");
        }

        let now = self.clock.now();
        let mut queues = self.queues.borrow_mut();
        let queues = &mut *queues;
        queues.timers.rearm(&mut queues.macrotasks, now, task.timer);
        true
    }

    /// Asks a running loop to halt after the current step. Pending tasks
    /// stay queued.
    pub fn stop(&self) {
        self.stop_requested.set(true);
    }

    /// Current phase.
    pub fn phase(&self) -> LoopPhase {
        self.phase.get()
    }

    /// Current time according to the loop's clock.
    pub fn now(&self) -> Instant {
        self.clock.now()
    }

    /// Number of live timer registrations.
    pub fn active_timers(&self) -> usize {
        self.queues.borrow().timers.len()
    }

    /// Number of queued macrotasks.
    pub fn pending_macrotasks(&self) -> usize {
        self.queues.borrow().macrotasks.len()
    }

    /// Number of queued microtasks.
    pub fn pending_microtasks(&self) -> usize {
        self.queues.borrow().microtasks.len()
    }

    /// Due time of the earliest macrotask.
    pub fn next_due(&self) -> Option<Instant> {
        self.queues.borrow().macrotasks.peek_due()
    }

    /// Drops every queued task, timer and the external pump.
    ///
    /// Used at teardown: queued closures may hold engine handles that must
    /// be released before the engine itself.
    pub fn clear(&self) {
        let (timers, macrotasks, microtasks) = {
            let mut queues = self.queues.borrow_mut();
            let queues = &mut *queues;
            queues.timers.clear_all(&mut queues.macrotasks);
            (
                std::mem::take(&mut queues.timers),
                std::mem::take(&mut queues.macrotasks),
                std::mem::take(&mut queues.microtasks),
            )
        };
        drop((timers, macrotasks, microtasks));
        self.clear_external_jobs();
    }

    fn cancel(&self, id: TimerId) {
        let mut queues = self.queues.borrow_mut();
        let queues = &mut *queues;
        if queues.timers.clear(&mut queues.macrotasks, id) {
            trace!(timer = %id, "timer cleared");
        }
    }
}

impl fmt::Debug for EventLoop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventLoop")
            .field("phase", &self.phase.get())
            .field("queues", &self.queues)
            .finish_non_exhaustive()
    }
}
