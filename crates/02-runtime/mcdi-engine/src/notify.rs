//! Forwarding of controller events the engine does not consume.

use crossbeam_channel::{Receiver, Sender, TrySendError};
use mcdi_wire::McdiEvent;
use smallvec::SmallVec;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::warn;

/// Controller event forwarded to the device owner because the engine does
/// not act on it.
pub type Notification = McdiEvent;

/// Forwards events the engine does not consume itself (link changes, sensor
/// alerts and the like) to the device owner. Lossy: a full channel drops
/// the newest event and counts it.
#[derive(Debug)]
pub(crate) struct NotificationSink {
    tx: Sender<Notification>,
    dropped: AtomicU64,
}

impl NotificationSink {
    pub(crate) fn new(depth: usize) -> (Self, Receiver<Notification>) {
        let (tx, rx) = crossbeam_channel::bounded(depth);
        (
            Self {
                tx,
                dropped: AtomicU64::new(0),
            },
            rx,
        )
    }

    pub(crate) fn forward(&self, event: Notification) {
        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(?event, "notification channel full; dropping event");
            }
            Err(TrySendError::Disconnected(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    pub(crate) fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Drains up to `max` pending notifications without blocking.
pub fn drain_notifications(
    rx: &Receiver<Notification>,
    max: usize,
) -> SmallVec<[Notification; 8]> {
    rx.try_iter().take(max).collect()
}
