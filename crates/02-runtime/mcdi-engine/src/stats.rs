//! Engine counters.

use crate::recovery::ScheduleOutcome;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub(crate) struct EngineStats {
    requests: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    timeouts: AtomicU64,
    stale_discarded: AtomicU64,
    seq_anomalies: AtomicU64,
    reboots: AtomicU64,
    assertions: AtomicU64,
    recoveries: AtomicU64,
    recoveries_coalesced: AtomicU64,
    mode_switches: AtomicU64,
}

#[derive(Clone, Copy, Debug)]
pub(crate) enum Counter {
    Request,
    Succeeded,
    Failed,
    Timeout,
    StaleDiscarded,
    SeqAnomaly,
    Reboot,
    Assertion,
    ModeSwitch,
}

impl EngineStats {
    pub(crate) fn bump(&self, counter: Counter) {
        let slot = match counter {
            Counter::Request => &self.requests,
            Counter::Succeeded => &self.succeeded,
            Counter::Failed => &self.failed,
            Counter::Timeout => &self.timeouts,
            Counter::StaleDiscarded => &self.stale_discarded,
            Counter::SeqAnomaly => &self.seq_anomalies,
            Counter::Reboot => &self.reboots,
            Counter::Assertion => &self.assertions,
            Counter::ModeSwitch => &self.mode_switches,
        };
        slot.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_recovery(&self, outcome: ScheduleOutcome) {
        match outcome {
            ScheduleOutcome::Accepted => {
                self.recoveries.fetch_add(1, Ordering::Relaxed);
            }
            ScheduleOutcome::Coalesced => {
                self.recoveries_coalesced.fetch_add(1, Ordering::Relaxed);
            }
            ScheduleOutcome::Closed => {}
        }
    }

    pub(crate) fn snapshot(&self, notifications_dropped: u64) -> EngineStatsSnapshot {
        EngineStatsSnapshot {
            requests: self.requests.load(Ordering::Relaxed),
            succeeded: self.succeeded.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            stale_discarded: self.stale_discarded.load(Ordering::Relaxed),
            seq_anomalies: self.seq_anomalies.load(Ordering::Relaxed),
            reboots: self.reboots.load(Ordering::Relaxed),
            assertions: self.assertions.load(Ordering::Relaxed),
            recoveries: self.recoveries.load(Ordering::Relaxed),
            recoveries_coalesced: self.recoveries_coalesced.load(Ordering::Relaxed),
            mode_switches: self.mode_switches.load(Ordering::Relaxed),
            notifications_dropped,
        }
    }
}

/// Point-in-time copy of the engine counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EngineStatsSnapshot {
    /// Requests handed to the transport.
    pub requests: u64,
    /// Requests that finished with success.
    pub succeeded: u64,
    /// Requests that finished with a controller or engine error, timeouts
    /// included.
    pub failed: u64,
    /// Requests abandoned after the RPC timeout.
    pub timeouts: u64,
    /// Late responses absorbed by a credit.
    pub stale_discarded: u64,
    /// Sequence mismatches with no credit to absorb them.
    pub seq_anomalies: u64,
    /// Controller reboots observed.
    pub reboots: u64,
    /// Controller assertions observed.
    pub assertions: u64,
    /// Recovery requests queued for the owner.
    pub recoveries: u64,
    /// Recovery requests folded into one already pending.
    pub recoveries_coalesced: u64,
    /// Delivery-mode changes.
    pub mode_switches: u64,
    /// Notifications lost to a full channel.
    pub notifications_dropped: u64,
}
