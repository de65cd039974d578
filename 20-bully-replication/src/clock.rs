//! Lamport logical clock.
//!
//! Each node owns one [`LamportClock`]. The leader calls [`LamportClock::increment`]
//! right before it stamps a new message, and followers call
//! [`LamportClock::observe`] when a replicated message arrives. The counter is never
//! shared across nodes except by value inside a [`crate::message::Message`].

use std::fmt;

use parking_lot::Mutex;

/// Thread-safe Lamport counter.
///
/// All three operations take the same lock, so `increment` and `observe` are
/// mutually exclusive with each other and with `read`.
#[derive(Debug, Default)]
pub struct LamportClock {
    time: Mutex<u64>,
}

impl LamportClock {
    /// Creates a clock starting at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a clock starting at `initial`.
    pub fn starting_at(initial: u64) -> Self {
        Self {
            time: Mutex::new(initial),
        }
    }

    /// Records a local event and returns the new time.
    ///
    /// Must run before the event's effects become visible on another node.
    pub fn increment(&self) -> u64 {
        let mut time = self.time.lock();
        *time += 1;
        *time
    }

    /// Merges a remote timestamp: `time = max(time, remote) + 1`.
    pub fn observe(&self, remote: u64) -> u64 {
        let mut time = self.time.lock();
        *time = (*time).max(remote) + 1;
        *time
    }

    /// Returns the current time without advancing it.
    pub fn read(&self) -> u64 {
        *self.time.lock()
    }
}

impl fmt::Display for LamportClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LamportClock(time={})", self.read())
    }
}
