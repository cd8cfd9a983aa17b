//! Macrotask and microtask queue management.
//!
//! Macrotasks (timer callbacks) live in a binary min-heap keyed by due time.
//! Each entry also carries an insertion sequence number, which breaks ties
//! between equal due times in insertion order and doubles as the entry's
//! [`TaskHandle`]. A side table maps handles to heap slots so cancellation
//! is `O(log n)`.
//!
//! Microtasks are a plain FIFO drained to empty after every macrotask.

use crate::timer::TimerId;
use core_types::JsError;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::rc::Rc;
use std::time::Instant;
use tracing::trace;

/// A reusable timer callback. Repeating timers run the same callback many
/// times, so it is reference counted rather than boxed.
pub type TaskCallback = Rc<dyn Fn() -> Result<(), JsError>>;

/// Identifies one entry in the [`MacrotaskQueue`].
///
/// Handles are never reused. Removing a handle that was already popped or
/// removed is a no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskHandle(u64);

/// A macrotask waiting for its due time.
#[derive(Clone)]
pub struct ScheduledTask {
    /// Callback to run once the task is due
    pub callback: TaskCallback,
    /// Earliest instant at which the task may run
    pub due_time: Instant,
    /// Timer registration that produced this task
    pub timer: TimerId,
}

impl ScheduledTask {
    /// Creates a task for `timer` due at `due_time`.
    pub fn new(timer: TimerId, due_time: Instant, callback: TaskCallback) -> Self {
        Self {
            callback,
            due_time,
            timer,
        }
    }

    /// Runs the callback.
    pub fn run(&self) -> Result<(), JsError> {
        (self.callback)()
    }
}

impl fmt::Debug for ScheduledTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScheduledTask")
            .field("due_time", &self.due_time)
            .field("timer", &self.timer)
            .finish_non_exhaustive()
    }
}

struct HeapEntry {
    due_time: Instant,
    seq: u64,
    task: ScheduledTask,
}

impl HeapEntry {
    fn key(&self) -> (Instant, u64) {
        (self.due_time, self.seq)
    }
}

/// Min-heap of [`ScheduledTask`]s ordered by `(due_time, insertion order)`.
///
/// # Examples
///
/// ```
/// use async_runtime::{MacrotaskQueue, ScheduledTask, TimerId};
/// use std::rc::Rc;
/// use std::time::{Duration, Instant};
///
/// let now = Instant::now();
/// let mut queue = MacrotaskQueue::new();
/// let late = queue.insert(ScheduledTask::new(TimerId::from(1), now + Duration::from_millis(5), Rc::new(|| Ok(()))));
/// queue.insert(ScheduledTask::new(TimerId::from(2), now, Rc::new(|| Ok(()))));
///
/// assert!(queue.remove(late).is_some());
/// let (_, first) = queue.pop_earliest().unwrap();
/// assert_eq!(first.timer, TimerId::from(2));
/// assert!(queue.is_empty());
/// ```
#[derive(Default)]
pub struct MacrotaskQueue {
    heap: Vec<HeapEntry>,
    positions: HashMap<u64, usize>,
    next_seq: u64,
}

impl MacrotaskQueue {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a task and returns its handle.
    pub fn insert(&mut self, task: ScheduledTask) -> TaskHandle {
        let seq = self.next_seq;
        self.next_seq += 1;
        let slot = self.heap.len();
        self.heap.push(HeapEntry {
            due_time: task.due_time,
            seq,
            task,
        });
        self.positions.insert(seq, slot);
        self.sift_up(slot);
        trace!(seq, queued = self.heap.len(), "macrotask queued");
        TaskHandle(seq)
    }

    /// Removes and returns the task with the smallest `(due_time, seq)`.
    pub fn pop_earliest(&mut self) -> Option<(TaskHandle, ScheduledTask)> {
        if self.heap.is_empty() {
            return None;
        }
        let last = self.heap.len() - 1;
        self.swap(0, last);
        let entry = self.heap.pop()?;
        self.positions.remove(&entry.seq);
        if !self.heap.is_empty() {
            self.sift_down(0);
        }
        Some((TaskHandle(entry.seq), entry.task))
    }

    /// Due time of the earliest task, if any.
    pub fn peek_due(&self) -> Option<Instant> {
        self.heap.first().map(|entry| entry.due_time)
    }

    /// Removes an arbitrary task by handle.
    pub fn remove(&mut self, handle: TaskHandle) -> Option<ScheduledTask> {
        let slot = *self.positions.get(&handle.0)?;
        trace!(seq = handle.0, "macrotask removed");
        let last = self.heap.len() - 1;
        self.swap(slot, last);
        let entry = self.heap.pop()?;
        self.positions.remove(&entry.seq);
        if slot < self.heap.len() {
            self.sift_down(slot);
            self.sift_up(slot);
        }
        Some(entry.task)
    }

    /// Returns true if `handle` is still queued.
    pub fn contains(&self, handle: TaskHandle) -> bool {
        self.positions.contains_key(&handle.0)
    }

    /// Current heap slot of `handle`.
    pub fn position(&self, handle: TaskHandle) -> Option<usize> {
        self.positions.get(&handle.0).copied()
    }

    /// Number of queued tasks.
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    /// Returns true if no tasks are queued.
    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Drops every queued task.
    pub fn clear(&mut self) {
        self.heap.clear();
        self.positions.clear();
    }

    fn swap(&mut self, a: usize, b: usize) {
        if a == b {
            return;
        }
        self.heap.swap(a, b);
        self.positions.insert(self.heap[a].seq, a);
        self.positions.insert(self.heap[b].seq, b);
    }

    fn sift_up(&mut self, mut slot: usize) {
        while slot > 0 {
            let parent = (slot - 1) / 2;
            if self.heap[slot].key() >= self.heap[parent].key() {
                break;
            }
            self.swap(slot, parent);
            slot = parent;
        }
    }

    fn sift_down(&mut self, mut slot: usize) {
        let len = self.heap.len();
        loop {
            let left = 2 * slot + 1;
            let right = left + 1;
            let mut smallest = slot;
            if left < len && self.heap[left].key() < self.heap[smallest].key() {
                smallest = left;
            }
            if right < len && self.heap[right].key() < self.heap[smallest].key() {
                smallest = right;
            }
            if smallest == slot {
                break;
            }
            self.swap(slot, smallest);
            slot = smallest;
        }
    }
}

impl fmt::Debug for MacrotaskQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MacrotaskQueue")
            .field("len", &self.heap.len())
            .field("next_due", &self.peek_due())
            .finish()
    }
}

/// A microtask to be executed by the event loop.
///
/// Microtasks are promise reactions, `queueMicrotask` callbacks, and any
/// other job that must run before the next macrotask.
pub struct MicroTask {
    callback: Box<dyn FnOnce() -> Result<(), JsError>>,
}

impl MicroTask {
    /// Creates a new MicroTask from a closure.
    pub fn new<F>(f: F) -> Self
    where
        F: FnOnce() -> Result<(), JsError> + 'static,
    {
        Self {
            callback: Box::new(f),
        }
    }

    /// Executes the microtask.
    pub fn run(self) -> Result<(), JsError> {
        (self.callback)()
    }
}

impl fmt::Debug for MicroTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MicroTask {{ ... }}")
    }
}

/// FIFO queue of microtasks.
#[derive(Debug, Default)]
pub struct MicrotaskQueue {
    microtasks: VecDeque<MicroTask>,
}

impl MicrotaskQueue {
    /// Creates a new empty MicrotaskQueue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a microtask to the back of the queue.
    pub fn enqueue(&mut self, microtask: MicroTask) {
        self.microtasks.push_back(microtask);
        trace!(queued = self.microtasks.len(), "microtask queued");
    }

    /// Removes and returns the oldest microtask.
    pub fn dequeue(&mut self) -> Option<MicroTask> {
        self.microtasks.pop_front()
    }

    /// Returns true if the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.microtasks.is_empty()
    }

    /// Returns the number of queued microtasks.
    pub fn len(&self) -> usize {
        self.microtasks.len()
    }

    /// Drops every queued microtask.
    pub fn clear(&mut self) {
        self.microtasks.clear();
    }
}
