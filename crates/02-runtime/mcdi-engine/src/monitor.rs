//! Controller death reasons and the reboot-status drain.

use crate::transport::Transport;
use mcdi_wire::Errno;
use std::hint;
use std::time::{Duration, Instant};

/// Why the controller stopped serving requests.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeathReason {
    /// The controller restarted.
    Reboot,
    /// The controller hit an assertion or watchdog.
    Assertion {
        /// Faulting address reported with the event.
        addr: u32,
    },
}

impl DeathReason {
    /// Failure reported to a request terminated by this death.
    pub const fn errno(self) -> Errno {
        match self {
            DeathReason::Reboot => Errno::Io,
            DeathReason::Assertion { .. } => Errno::Intr,
        }
    }
}

/// Probes the reboot flag up to `count` times, busy-waiting `delay` between
/// probes, so stale reboot status is consumed before the next request.
/// Never sleeps. Returns true if the flag was seen.
pub(crate) fn drain_reboot_status<T: Transport + ?Sized>(
    transport: &T,
    count: u32,
    delay: Duration,
) -> bool {
    for _ in 0..count {
        if transport.poll_reboot() {
            return true;
        }
        spin_for(delay);
    }
    false
}

fn spin_for(delay: Duration) {
    let until = Instant::now() + delay;
    while Instant::now() < until {
        hint::spin_loop();
    }
}
