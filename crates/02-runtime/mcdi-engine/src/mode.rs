//! Completion delivery modes and the two-phase poller.

use std::fmt;
use std::hint;
use std::sync::atomic::{AtomicU8, Ordering};
use std::thread;
use std::time::{Duration, Instant};

/// How completions reach the waiting requester.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DeliveryMode {
    /// The requester checks the transport for a response itself.
    Poll,
    /// The controller raises a completion event that wakes the requester.
    Events,
}

impl fmt::Display for DeliveryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeliveryMode::Poll => f.write_str("poll"),
            DeliveryMode::Events => f.write_str("events"),
        }
    }
}

#[derive(Debug)]
pub(crate) struct ModeCell(AtomicU8);

impl ModeCell {
    pub(crate) fn new(mode: DeliveryMode) -> Self {
        Self(AtomicU8::new(Self::raw(mode)))
    }

    pub(crate) fn load(&self) -> DeliveryMode {
        match self.0.load(Ordering::Acquire) {
            1 => DeliveryMode::Events,
            _ => DeliveryMode::Poll,
        }
    }

    pub(crate) fn store(&self, mode: DeliveryMode) {
        self.0.store(Self::raw(mode), Ordering::Release);
    }

    const fn raw(mode: DeliveryMode) -> u8 {
        match mode {
            DeliveryMode::Poll => 0,
            DeliveryMode::Events => 1,
        }
    }
}

/// One poll budget: busy-spin for `spin_window`, then sleep `interval`
/// between probes until `deadline`.
#[derive(Clone, Copy, Debug)]
pub struct PollWait {
    spin_until: Instant,
    deadline: Instant,
    interval: Duration,
}

impl PollWait {
    /// Starts a budget at the current instant.
    pub fn start(spin_window: Duration, interval: Duration, timeout: Duration) -> Self {
        let now = Instant::now();
        Self {
            spin_until: now + spin_window,
            deadline: now + timeout,
            interval,
        }
    }

    /// Delays then probes until `ready` reports true or the deadline passes.
    ///
    /// The probe always runs once more after the final delay, so a response
    /// that lands just before expiry is still seen.
    pub fn wait_ready(&self, mut ready: impl FnMut() -> bool) -> bool {
        loop {
            if Instant::now() < self.spin_until {
                hint::spin_loop();
            } else {
                thread::sleep(self.interval);
            }
            if ready() {
                return true;
            }
            if Instant::now() > self.deadline {
                return false;
            }
        }
    }
}
