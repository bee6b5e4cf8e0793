//! Single-flight completion state machine.
//!
//! The interface moves `Quiescent -> Running -> Completed -> Quiescent`.
//! Every transition is a compare-and-swap on one atomic word, so exactly one
//! caller wins `acquire` and exactly one wins `complete` per request, no
//! matter how many threads or event contexts race for them. Waiters park on
//! a condvar that is signalled after each successful transition.

#[cfg(feature = "loom")]
use loom::sync::atomic::{AtomicU32, Ordering};
#[cfg(not(feature = "loom"))]
use std::sync::atomic::{AtomicU32, Ordering};

use parking_lot::{Condvar, Mutex};
use std::time::{Duration, Instant};

/// Observable lifecycle state of the interface.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum McdiState {
    /// No request in flight.
    Quiescent,
    /// A request owns the interface.
    Running,
    /// The in-flight request has been completed but not yet released.
    Completed,
}

impl McdiState {
    const fn raw(self) -> u32 {
        match self {
            McdiState::Quiescent => 0,
            McdiState::Running => 1,
            McdiState::Completed => 2,
        }
    }

    fn from_raw(raw: u32) -> Self {
        match raw {
            1 => McdiState::Running,
            2 => McdiState::Completed,
            _ => McdiState::Quiescent,
        }
    }
}

#[derive(Debug)]
struct StateCell {
    raw: AtomicU32,
}

impl StateCell {
    fn new() -> Self {
        Self {
            raw: AtomicU32::new(McdiState::Quiescent.raw()),
        }
    }

    fn transition(&self, from: McdiState, to: McdiState) -> bool {
        self.raw
            .compare_exchange(from.raw(), to.raw(), Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn store(&self, state: McdiState) {
        self.raw.store(state.raw(), Ordering::Release);
    }

    fn load(&self) -> McdiState {
        McdiState::from_raw(self.raw.load(Ordering::Acquire))
    }
}

/// Atomic state word plus the wait queue parked on it.
#[derive(Debug)]
pub struct Completion {
    cell: StateCell,
    lock: Mutex<()>,
    cond: Condvar,
}

impl Default for Completion {
    fn default() -> Self {
        Self::new()
    }
}

impl Completion {
    /// Creates a quiescent state machine.
    pub fn new() -> Self {
        Self {
            cell: StateCell::new(),
            lock: Mutex::new(()),
            cond: Condvar::new(),
        }
    }

    /// Current state.
    pub fn state(&self) -> McdiState {
        self.cell.load()
    }

    /// Blocks until this caller moves the interface from quiescent to running.
    pub fn acquire(&self) {
        if self.cell.transition(McdiState::Quiescent, McdiState::Running) {
            return;
        }
        let mut guard = self.lock.lock();
        while !self.cell.transition(McdiState::Quiescent, McdiState::Running) {
            self.cond.wait(&mut guard);
        }
    }

    /// Moves running to completed. Returns true only for the single winner;
    /// callers that lose must not touch the response slot.
    ///
    /// Never sleeps beyond the short condvar-lock handoff, so it may be
    /// called from event context.
    pub fn complete(&self) -> bool {
        if !self.cell.transition(McdiState::Running, McdiState::Completed) {
            return false;
        }
        self.wake();
        true
    }

    /// Returns the interface to quiescent and wakes anyone waiting on it.
    pub fn release(&self) {
        self.cell.store(McdiState::Quiescent);
        self.wake();
    }

    /// Waits until the state reads completed or `timeout` elapses.
    pub fn wait_completed(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut guard = self.lock.lock();
        loop {
            if self.cell.load() == McdiState::Completed {
                return true;
            }
            if self.cond.wait_until(&mut guard, deadline).timed_out() {
                return self.cell.load() == McdiState::Completed;
            }
        }
    }

    fn wake(&self) {
        let _guard = self.lock.lock();
        self.cond.notify_all();
    }
}
