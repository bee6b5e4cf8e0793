//! Recovery requests handed to the device owner.
//!
//! The engine never resets the function itself; it only asks. Requests go
//! through a small bounded channel and a full channel means a reset is
//! already pending, so the request is coalesced rather than queued twice.

use crossbeam_channel::{Receiver, Sender, TrySendError};
use mcdi_wire::Errno;
use smallvec::SmallVec;
use tracing::{debug, warn};

/// Why the engine wants the function reset.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecoveryReason {
    /// A command failed with a fatal error.
    CommandFailed {
        /// Command code that failed.
        cmd: u32,
        /// Failure observed.
        errno: Errno,
    },
    /// The controller rebooted with no request outstanding.
    UnprovokedReboot,
    /// The controller asserted with no request outstanding.
    UnprovokedAssertion {
        /// Faulting address reported by the controller.
        addr: u32,
    },
}

/// Request for an MC-failure reset of the function.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RecoveryRequest {
    /// Trigger of the request.
    pub reason: RecoveryReason,
}

/// Result of handing a request to the owner.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScheduleOutcome {
    /// Queued for the owner.
    Accepted,
    /// A reset is already pending; this request folds into it.
    Coalesced,
    /// The owner dropped its receiver.
    Closed,
}

#[derive(Debug)]
pub(crate) struct RecoveryScheduler {
    tx: Sender<RecoveryRequest>,
}

impl RecoveryScheduler {
    pub(crate) fn new(depth: usize) -> (Self, Receiver<RecoveryRequest>) {
        let (tx, rx) = crossbeam_channel::bounded(depth);
        (Self { tx }, rx)
    }

    pub(crate) fn schedule(&self, reason: RecoveryReason) -> ScheduleOutcome {
        match self.tx.try_send(RecoveryRequest { reason }) {
            Ok(()) => {
                debug!(?reason, "scheduled MC failure reset");
                ScheduleOutcome::Accepted
            }
            Err(TrySendError::Full(_)) => {
                debug!(?reason, "MC failure reset already pending");
                ScheduleOutcome::Coalesced
            }
            Err(TrySendError::Disconnected(_)) => {
                warn!(?reason, "no owner listening for MC failure resets");
                ScheduleOutcome::Closed
            }
        }
    }
}

/// Drains up to `max` pending recovery requests without blocking.
pub fn drain_recovery(
    rx: &Receiver<RecoveryRequest>,
    max: usize,
) -> SmallVec<[RecoveryRequest; 4]> {
    rx.try_iter().take(max).collect()
}
