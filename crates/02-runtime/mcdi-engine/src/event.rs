//! Hand-off from the event-delivery context to the engine.
//!
//! Interrupt-side code owns an [`EventPoster`]: posting is a single
//! non-blocking `try_send`, so it is safe where sleeping is not. An
//! [`EventPump`] on an ordinary thread drains the queue into
//! [`McdiIface::process_event`].

use crate::iface::McdiIface;
use crate::transport::Transport;
use crossbeam_channel::{Receiver, Sender, TrySendError};
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, trace};

/// Raw event word as delivered by the controller.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RawEvent {
    /// Event code.
    pub code: u8,
    /// Event data word.
    pub data: u32,
}

/// Outcome of posting an event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PostOutcome {
    /// Queued for the pump.
    Accepted,
    /// Queue full; the event was dropped and counted.
    Dropped,
    /// The pump side is gone.
    Closed,
}

/// Creates a bounded event queue of `depth` entries.
pub fn event_queue(depth: usize) -> (EventPoster, EventQueue) {
    let (tx, rx) = crossbeam_channel::bounded(depth);
    let dropped = Arc::new(AtomicU64::new(0));
    (
        EventPoster {
            tx,
            dropped: Arc::clone(&dropped),
        },
        EventQueue { rx, dropped },
    )
}

/// Producer half of the event queue. Cheap to clone.
#[derive(Clone, Debug)]
pub struct EventPoster {
    tx: Sender<RawEvent>,
    dropped: Arc<AtomicU64>,
}

impl EventPoster {
    /// Posts `(code, data)` without blocking.
    pub fn post(&self, code: u8, data: u32) -> PostOutcome {
        match self.tx.try_send(RawEvent { code, data }) {
            Ok(()) => PostOutcome::Accepted,
            Err(TrySendError::Full(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                PostOutcome::Dropped
            }
            Err(TrySendError::Disconnected(_)) => PostOutcome::Closed,
        }
    }
}

/// Consumer half of the event queue.
#[derive(Debug)]
pub struct EventQueue {
    rx: Receiver<RawEvent>,
    dropped: Arc<AtomicU64>,
}

impl EventQueue {
    /// Events lost to a full queue so far.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Binds the queue to the interface it feeds.
    pub fn into_pump<T: Transport>(self, iface: Arc<McdiIface<T>>) -> EventPump<T> {
        EventPump { queue: self, iface }
    }
}

/// Drains an [`EventQueue`] into an interface.
pub struct EventPump<T> {
    queue: EventQueue,
    iface: Arc<McdiIface<T>>,
}

impl<T: Transport> EventPump<T> {
    /// Processes up to `max` queued events without blocking. Returns the
    /// number processed.
    pub fn pump_pending(&self, max: usize) -> usize {
        let mut processed = 0;
        while processed < max {
            match self.queue.rx.try_recv() {
                Ok(event) => {
                    self.dispatch(event);
                    processed += 1;
                }
                Err(_) => break,
            }
        }
        processed
    }

    /// Blocks on the queue until every poster is dropped. Returns the number
    /// of events processed.
    pub fn run(self) -> u64 {
        let mut processed = 0u64;
        while let Ok(event) = self.queue.rx.recv() {
            self.dispatch(event);
            processed += 1;
        }
        debug!(processed, dropped = self.queue.dropped(), "MCDI event pump stopped");
        processed
    }

    fn dispatch(&self, event: RawEvent) {
        trace!(code = event.code, data = event.data, "dispatching MCDI event");
        self.iface.process_event(event.code, event.data);
    }
}

impl<T: Transport + 'static> EventPump<T> {
    /// Runs the pump on a named thread.
    pub fn spawn(self) -> io::Result<JoinHandle<u64>> {
        thread::Builder::new()
            .name("mcdi-events".into())
            .spawn(move || self.run())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn poster_drops_when_full() {
        let (poster, queue) = event_queue(1);
        assert_eq!(poster.post(3, 0), PostOutcome::Accepted);
        assert_eq!(poster.post(3, 1), PostOutcome::Dropped);
        assert_eq!(queue.dropped(), 1);
        drop(queue);
        assert_eq!(poster.post(3, 2), PostOutcome::Closed);
    }
}
