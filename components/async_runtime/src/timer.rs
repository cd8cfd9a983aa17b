//! Timer registry.
//!
//! Maps script-visible timer ids to the macrotask currently scheduled for
//! them. One-shot timers (`setTimeout`, `setImmediate`) are forgotten as soon
//! as they fire; repeating timers (`setInterval`) are re-armed after each run
//! for as long as they stay registered.

use crate::task_queue::{MacrotaskQueue, ScheduledTask, TaskCallback, TaskHandle};
use std::collections::HashMap;
use std::fmt;
use std::time::{Duration, Instant};

/// Script-visible timer identifier. Issued from 1 upward and never reused
/// within one registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(u32);

impl TimerId {
    /// The raw id handed to scripts.
    pub fn get(self) -> u32 {
        self.0
    }
}

impl From<u32> for TimerId {
    fn from(id: u32) -> Self {
        TimerId(id)
    }
}

impl fmt::Display for TimerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Whether a timer fires once or repeatedly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    /// Fires once, then the registration is discarded
    OneShot,
    /// Fires every `interval` until cleared
    Repeating {
        /// Delay between the end of one run and the next due time
        interval: Duration,
    },
}

/// A live timer registration.
#[derive(Clone)]
pub struct TimerHandle {
    /// Script-visible id
    pub id: TimerId,
    /// One-shot or repeating
    pub kind: TimerKind,
    /// Callback shared by every run of this timer
    pub callback: TaskCallback,
    /// Queue entry for the next run, if one is scheduled
    pub active_task: Option<TaskHandle>,
}

impl fmt::Debug for TimerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimerHandle")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("active_task", &self.active_task)
            .finish_non_exhaustive()
    }
}

/// Owns every live timer registration.
#[derive(Debug)]
pub struct TimerRegistry {
    next_id: u32,
    timers: HashMap<TimerId, TimerHandle>,
}

impl Default for TimerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TimerRegistry {
    /// Creates an empty registry whose first id is 1.
    pub fn new() -> Self {
        Self {
            next_id: 1,
            timers: HashMap::new(),
        }
    }

    /// Registers a one-shot timer due at `now + delay`.
    pub fn set_timeout(
        &mut self,
        queue: &mut MacrotaskQueue,
        now: Instant,
        callback: TaskCallback,
        delay: Duration,
    ) -> TimerId {
        self.register(queue, now, TimerKind::OneShot, callback, delay)
    }

    /// Registers a repeating timer whose first run is due at `now + interval`.
    pub fn set_interval(
        &mut self,
        queue: &mut MacrotaskQueue,
        now: Instant,
        callback: TaskCallback,
        interval: Duration,
    ) -> TimerId {
        self.register(
            queue,
            now,
            TimerKind::Repeating { interval },
            callback,
            interval,
        )
    }

    /// Cancels a timer of any kind. Unknown or already-fired ids are ignored.
    pub fn clear(&mut self, queue: &mut MacrotaskQueue, id: TimerId) -> bool {
        let Some(timer) = self.timers.remove(&id) else {
            return false;
        };
        if let Some(task) = timer.active_task {
            queue.remove(task);
        }
        true
    }

    /// Bookkeeping for a task that was just popped from the queue.
    ///
    /// One-shot registrations are removed before their callback runs, so a
    /// callback clearing its own id is a no-op. Returns the registration as
    /// it was, or `None` if the timer had already been cleared.
    pub fn begin_run(&mut self, id: TimerId) -> Option<TimerHandle> {
        let timer = self.timers.get_mut(&id)?;
        timer.active_task = None;
        if timer.kind == TimerKind::OneShot {
            return self.timers.remove(&id);
        }
        Some(timer.clone())
    }

    /// Schedules the next run of a repeating timer at `now + interval`.
    ///
    /// Does nothing if the timer was cleared while its callback ran.
    pub fn rearm(&mut self, queue: &mut MacrotaskQueue, now: Instant, id: TimerId) -> bool {
        let Some(timer) = self.timers.get_mut(&id) else {
            return false;
        };
        let TimerKind::Repeating { interval } = timer.kind else {
            return false;
        };
        if timer.active_task.is_some() {
            return false;
        }
        let task = ScheduledTask::new(id, now + interval, timer.callback.clone());
        timer.active_task = Some(queue.insert(task));
        true
    }

    /// Looks up a live registration.
    pub fn get(&self, id: TimerId) -> Option<&TimerHandle> {
        self.timers.get(&id)
    }

    /// Returns true if `id` is still registered.
    pub fn contains(&self, id: TimerId) -> bool {
        self.timers.contains_key(&id)
    }

    /// Number of live registrations.
    pub fn len(&self) -> usize {
        self.timers.len()
    }

    /// Returns true if no timers are registered.
    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }

    /// Forgets every registration. Ids keep counting upward.
    pub fn clear_all(&mut self, queue: &mut MacrotaskQueue) {
        for (_, timer) in self.timers.drain() {
            if let Some(task) = timer.active_task {
                queue.remove(task);
            }
        }
    }

    fn register(
        &mut self,
        queue: &mut MacrotaskQueue,
        now: Instant,
        kind: TimerKind,
        callback: TaskCallback,
        delay: Duration,
    ) -> TimerId {
        let id = TimerId(self.next_id);
        self.next_id = self.next_id.wrapping_add(1).max(1);
        let handle = queue.insert(ScheduledTask::new(id, now + delay, callback.clone()));
        self.timers.insert(
            id,
            TimerHandle {
                id,
                kind,
                callback,
                active_task: Some(handle),
            },
        );
        id
    }
}
