//! Time sources for the event loop.
//!
//! The loop never reads the system clock directly. It asks a [`Clock`] for
//! the current instant and asks it to block until a deadline, so tests can
//! drive timers deterministically with a [`ManualClock`].

use std::cell::Cell;
use std::time::{Duration, Instant};

/// A monotonic time source that can block the current thread.
pub trait Clock {
    /// Returns the current instant.
    fn now(&self) -> Instant;

    /// Blocks until `deadline` has passed. Returns immediately if it already has.
    fn sleep_until(&self, deadline: Instant);
}

/// The real clock, backed by [`Instant::now`] and [`std::thread::sleep`].
#[derive(Debug, Default, Clone, Copy)]
pub struct MonotonicClock;

impl Clock for MonotonicClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep_until(&self, deadline: Instant) {
        let now = Instant::now();
        if deadline > now {
            std::thread::sleep(deadline - now);
        }
    }
}

/// A clock that only moves when told to.
///
/// `sleep_until` jumps straight to the deadline instead of blocking, which
/// keeps timer tests fast while still exercising due-time ordering.
///
/// # Examples
///
/// ```
/// use async_runtime::{Clock, ManualClock};
/// use std::time::Duration;
///
/// let clock = ManualClock::new();
/// let start = clock.now();
/// clock.advance(Duration::from_millis(250));
/// assert_eq!(clock.elapsed(), Duration::from_millis(250));
/// assert_eq!(clock.now() - start, Duration::from_millis(250));
/// ```
#[derive(Debug)]
pub struct ManualClock {
    origin: Instant,
    now: Cell<Instant>,
}

impl ManualClock {
    /// Creates a clock frozen at the current real instant.
    pub fn new() -> Self {
        let origin = Instant::now();
        Self {
            origin,
            now: Cell::new(origin),
        }
    }

    /// Moves the clock forward by `step`.
    pub fn advance(&self, step: Duration) {
        self.now.set(self.now.get() + step);
    }

    /// Total time this clock has been advanced since creation.
    pub fn elapsed(&self) -> Duration {
        self.now.get() - self.origin
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.now.get()
    }

    fn sleep_until(&self, deadline: Instant) {
        if deadline > self.now.get() {
            self.now.set(deadline);
        }
    }
}
