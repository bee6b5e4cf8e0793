//! The per-device MCDI interface.
//!
//! One [`McdiIface`] exists per managed function. It frames requests, waits
//! for their completion in the current [`DeliveryMode`], matches responses
//! against the sequence tracker and turns controller deaths into failed
//! requests plus recovery requests for the owner.
//!
//! Lock order is `slot` before the completion condvar lock. The slot lock is
//! only ever held for short non-sleeping sections so the event path can take
//! it.

use crate::completion::{Completion, McdiState};
use crate::config::EngineConfig;
use crate::error::{McdiError, McdiResult};
use crate::mode::{DeliveryMode, ModeCell, PollWait};
use crate::monitor::{drain_reboot_status, DeathReason};
use crate::notify::{drain_notifications, Notification, NotificationSink};
use crate::recovery::{drain_recovery, RecoveryReason, RecoveryRequest, RecoveryScheduler};
use crate::seq::{SeqCheck, SeqTracker};
use crate::stats::{Counter, EngineStats, EngineStatsSnapshot};
use crate::transport::Transport;
use crossbeam_channel::Receiver;
use mcdi_wire::{
    check_request, decode_response_header, decode_status_word, translate, Errno, McdiEvent,
    RequestHeader, WireVersion, CMD_REBOOT, HEADER_LEN_V1, XFLAG_EVREQ,
};
use parking_lot::Mutex;
use smallvec::SmallVec;
use std::thread;
use tracing::{debug, error, info, trace, warn};

/// Token for a request between [`McdiIface::rpc_start`] and
/// [`McdiIface::rpc_finish`].
#[must_use = "a started request holds the interface until it is finished"]
#[derive(Debug)]
pub struct RpcHandle {
    cmd: u32,
    inlen: usize,
    preempted: bool,
}

impl RpcHandle {
    /// Command code of the request.
    pub fn cmd(&self) -> u32 {
        self.cmd
    }

    /// Payload length sent with the request.
    pub fn inlen(&self) -> usize {
        self.inlen
    }
}

/// Receivers the device owner drains.
#[derive(Debug)]
pub struct OwnerChannels {
    /// Requests for an MC-failure reset of the function.
    pub recovery: Receiver<RecoveryRequest>,
    /// Controller events the engine does not consume.
    pub notifications: Receiver<Notification>,
}

impl OwnerChannels {
    /// Drains up to `max` pending recovery requests.
    pub fn drain_recovery(&self, max: usize) -> SmallVec<[RecoveryRequest; 4]> {
        drain_recovery(&self.recovery, max)
    }

    /// Drains up to `max` pending notifications.
    pub fn drain_notifications(&self, max: usize) -> SmallVec<[Notification; 8]> {
        drain_notifications(&self.notifications, max)
    }
}

#[derive(Debug)]
struct ResponseSlot {
    tracker: SeqTracker,
    resprc: Result<(), Errno>,
    hdr_len: usize,
    data_len: usize,
    new_epoch: bool,
}

impl ResponseSlot {
    fn record(&mut self, resprc: Result<(), Errno>, hdr_len: usize, data_len: usize) {
        self.resprc = resprc;
        self.hdr_len = hdr_len;
        self.data_len = data_len;
    }
}

enum Wait {
    Completed,
    TimedOut,
}

/// Request/response engine bound to one transport.
pub struct McdiIface<T> {
    transport: T,
    config: EngineConfig,
    version: Option<WireVersion>,
    completion: Completion,
    mode: ModeCell,
    slot: Mutex<ResponseSlot>,
    recovery: RecoveryScheduler,
    notifications: NotificationSink,
    stats: EngineStats,
}

impl<T: Transport> McdiIface<T> {
    /// Attaches an interface to `transport`.
    ///
    /// A `max_version` of 0 yields an interface on which every request fails
    /// with [`McdiError::Unsupported`].
    pub fn new(transport: T, config: EngineConfig) -> McdiResult<(Self, OwnerChannels)> {
        config.validate()?;
        let version = match config.max_version {
            0 => None,
            raw => Some(WireVersion::from_raw(raw)?),
        };
        let (recovery, recovery_rx) = RecoveryScheduler::new(config.recovery_depth);
        let (notifications, notification_rx) = NotificationSink::new(config.notification_depth);
        let iface = Self {
            transport,
            version,
            completion: Completion::new(),
            mode: ModeCell::new(config.initial_mode),
            slot: Mutex::new(ResponseSlot {
                tracker: SeqTracker::new(),
                resprc: Ok(()),
                hdr_len: 0,
                data_len: 0,
                new_epoch: true,
            }),
            recovery,
            notifications,
            stats: EngineStats::default(),
            config,
        };
        Ok((
            iface,
            OwnerChannels {
                recovery: recovery_rx,
                notifications: notification_rx,
            },
        ))
    }

    /// Issues `cmd` and waits for its response, copying at most `out.len()`
    /// payload bytes. Returns the number of bytes copied.
    pub fn rpc(&self, cmd: u32, payload: &[u8], out: &mut [u8]) -> McdiResult<usize> {
        let handle = self.rpc_start(cmd, payload)?;
        self.rpc_finish(handle, out)
    }

    /// Validates and sends a request, taking exclusive ownership of the
    /// interface until [`rpc_finish`](Self::rpc_finish).
    ///
    /// Blocks while another request is in flight. Framing errors are
    /// returned before the interface is acquired. If the controller has
    /// rebooted since the last request nothing is sent and
    /// [`rpc_finish`](Self::rpc_finish) reports the I/O failure.
    pub fn rpc_start(&self, cmd: u32, payload: &[u8]) -> McdiResult<RpcHandle> {
        let max = self.version.ok_or(McdiError::Unsupported)?;
        check_request(cmd, payload.len(), max)?;

        self.completion.acquire();
        if self.transport.poll_reboot() {
            debug!(cmd, "MC reboot pending, request not sent");
            self.synthesize_reboot();
            return Ok(RpcHandle {
                cmd,
                inlen: payload.len(),
                preempted: true,
            });
        }
        let mode = self.mode.load();
        let (seq, not_epoch) = {
            let mut slot = self.slot.lock();
            (slot.tracker.next(), !slot.new_epoch)
        };
        let header = RequestHeader {
            cmd,
            payload_len: payload.len(),
            seq,
            xflags: match mode {
                DeliveryMode::Events => XFLAG_EVREQ,
                DeliveryMode::Poll => 0,
            },
            not_epoch,
        }
        .encode(max);
        let header = match header {
            Ok(header) => header,
            Err(err) => {
                self.completion.release();
                return Err(err.into());
            }
        };

        trace!(
            cmd,
            seq,
            inlen = payload.len(),
            version = header.version().as_u8(),
            %mode,
            "sending MC request"
        );
        self.transport.send_request(header.as_bytes(), payload);
        self.slot.lock().new_epoch = false;
        self.stats.bump(Counter::Request);

        Ok(RpcHandle {
            cmd,
            inlen: payload.len(),
            preempted: false,
        })
    }

    /// Waits for the response to `handle`, copies its payload into `out` and
    /// releases the interface whatever the outcome.
    ///
    /// I/O and interrupted failures additionally ask the owner for a reset,
    /// except when the command was the MC reboot request itself.
    pub fn rpc_finish(&self, handle: RpcHandle, out: &mut [u8]) -> McdiResult<usize> {
        let mode = self.mode.load();
        let waited = if handle.preempted {
            Wait::Completed
        } else if self.transport.poll_reboot() {
            self.synthesize_reboot();
            Wait::Completed
        } else {
            match mode {
                DeliveryMode::Poll => self.poll(),
                DeliveryMode::Events => self.await_completion(),
            }
        };

        let result = match waited {
            Wait::Completed => self.collect(&handle, out),
            Wait::TimedOut => {
                self.slot.lock().tracker.abandon();
                self.stats.bump(Counter::Timeout);
                error!(
                    cmd = handle.cmd,
                    inlen = handle.inlen,
                    %mode,
                    "MC command timed out"
                );
                Err(Errno::TimedOut)
            }
        };

        match result {
            Ok(_) => self.stats.bump(Counter::Succeeded),
            Err(errno) => {
                self.stats.bump(Counter::Failed);
                if errno.is_fatal() {
                    self.settle_after_failure(&handle, errno);
                }
            }
        }

        self.completion.release();
        result.map_err(McdiError::from)
    }

    /// Switches to polled completions. A requester parked in the event wait
    /// is woken and finishes by polling.
    pub fn mode_poll(&self) {
        if self.mode.load() == DeliveryMode::Poll {
            return;
        }
        self.mode.store(DeliveryMode::Poll);
        self.stats.bump(Counter::ModeSwitch);
        debug!("MCDI completions switched to polling");
        self.completion.complete();
    }

    /// Switches to event completions once the interface is idle.
    pub fn mode_event(&self) {
        if self.mode.load() == DeliveryMode::Events {
            return;
        }
        self.completion.acquire();
        self.mode.store(DeliveryMode::Events);
        self.completion.release();
        self.stats.bump(Counter::ModeSwitch);
        debug!("MCDI completions switched to events");
    }

    /// Routes one controller event. Safe to call from event context.
    pub fn process_event(&self, code: u8, data: u32) {
        match McdiEvent::decode(code, data) {
            McdiEvent::CmdDone {
                seq,
                datalen,
                status,
            } => self.ev_cpl(seq, datalen, status),
            McdiEvent::BadAssert { addr } => {
                error!("MC watchdog or assertion failure at {addr:#x}");
                self.ev_death(DeathReason::Assertion { addr });
            }
            McdiEvent::Reboot => {
                info!("MC reboot detected");
                self.ev_death(DeathReason::Reboot);
            }
            McdiEvent::Unknown { code, data } => {
                error!(code, data, "unknown MCDI event");
            }
            other => self.notifications.forward(other),
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> McdiState {
        self.completion.state()
    }

    /// Current delivery mode.
    pub fn mode(&self) -> DeliveryMode {
        self.mode.load()
    }

    /// Negotiated header version, if the device speaks MCDI.
    pub fn version(&self) -> Option<WireVersion> {
        self.version
    }

    /// Host sequence counter.
    pub fn seqno(&self) -> u64 {
        self.slot.lock().tracker.seqno()
    }

    /// Outstanding stale-response credits.
    pub fn credits(&self) -> u32 {
        self.slot.lock().tracker.credits()
    }

    /// True when the next request will be sent without the not-epoch bit.
    pub fn is_new_epoch(&self) -> bool {
        self.slot.lock().new_epoch
    }

    /// Active configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Underlying transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Counter snapshot.
    pub fn stats(&self) -> EngineStatsSnapshot {
        self.stats.snapshot(self.notifications.dropped())
    }

    fn poll(&self) -> Wait {
        if self.transport.poll_reboot() {
            self.synthesize_reboot();
            return Wait::Completed;
        }
        let wait = PollWait::start(
            self.config.spin_window,
            self.config.poll_interval,
            self.config.rpc_timeout,
        );
        loop {
            if !wait.wait_ready(|| self.transport.response_ready()) {
                return Wait::TimedOut;
            }
            let recorded = self.read_response(&mut self.slot.lock());
            if recorded {
                return Wait::Completed;
            }
            self.transport.consume_response();
        }
    }

    fn await_completion(&self) -> Wait {
        if !self.completion.wait_completed(self.config.rpc_timeout) {
            return self.reap_missed_completion();
        }
        if self.mode.load() == DeliveryMode::Poll {
            return self.poll();
        }
        Wait::Completed
    }

    /// The completion event may have been lost while the response sits in
    /// the window; read it once before giving up.
    fn reap_missed_completion(&self) -> Wait {
        let mut slot = self.slot.lock();
        if self.completion.state() == McdiState::Completed {
            return Wait::Completed;
        }
        if !self.read_current(&mut slot) {
            return Wait::TimedOut;
        }
        if self.completion.complete() {
            warn!(
                seq = slot.tracker.wire_seq(),
                "MC command completed without its completion event"
            );
        }
        Wait::Completed
    }

    fn synthesize_reboot(&self) {
        warn!("MC reboot detected with a request outstanding");
        self.stats.bump(Counter::Reboot);
        self.slot.lock().record(Err(Errno::Io), 0, 0);
    }

    /// Decodes the response in the transport window into `slot`. Returns
    /// false when the response was stale and has been discarded.
    fn read_response(&self, slot: &mut ResponseSlot) -> bool {
        let header = decode_response_header(|offset, buf| self.transport.read_response(offset, buf));

        if header.is_reboot_marker() {
            error!(cmd = header.cmd, "MC rebooted under the request");
            self.stats.bump(Counter::Reboot);
            slot.record(Err(Errno::Io), header.hdr_len, 0);
            return true;
        }

        match slot.tracker.check(header.seq) {
            SeqCheck::Match => {
                let resprc = if header.error {
                    let mut word = [0u8; 4];
                    self.transport.read_response(header.hdr_len, &mut word);
                    translate(decode_status_word(word))
                } else {
                    Ok(())
                };
                slot.record(resprc, header.hdr_len, header.data_len);
                true
            }
            SeqCheck::Stale => {
                debug!(
                    rx_seq = header.seq,
                    tx_seq = slot.tracker.wire_seq(),
                    credits = slot.tracker.credits(),
                    "discarding stale MC response"
                );
                self.stats.bump(Counter::StaleDiscarded);
                false
            }
            SeqCheck::Anomaly => {
                error!(
                    tx_seq = slot.tracker.wire_seq(),
                    rx_seq = header.seq,
                    "MC response mismatch"
                );
                self.stats.bump(Counter::SeqAnomaly);
                slot.record(Err(Errno::Io), header.hdr_len, header.data_len);
                true
            }
        }
    }

    /// Reads past stale responses to the first one that settles the current
    /// request. Returns false if the window runs dry first.
    fn read_current(&self, slot: &mut ResponseSlot) -> bool {
        while self.transport.response_ready() {
            if self.read_response(slot) {
                return true;
            }
            self.transport.consume_response();
        }
        false
    }

    fn collect(&self, handle: &RpcHandle, out: &mut [u8]) -> Result<usize, Errno> {
        let (resprc, hdr_len, data_len) = {
            let slot = self.slot.lock();
            (slot.resprc, slot.hdr_len, slot.data_len)
        };
        let result = match resprc {
            Ok(()) => {
                let copied = out.len().min(data_len);
                if copied > 0 {
                    self.transport.read_response(hdr_len, &mut out[..copied]);
                }
                if copied < data_len {
                    debug!(
                        cmd = handle.cmd,
                        data_len,
                        copied,
                        "MC response truncated to caller buffer"
                    );
                }
                Ok(copied)
            }
            Err(errno) => {
                if handle.cmd == CMD_REBOOT && errno == Errno::Io {
                    debug!("MC reboot request completed with the expected I/O error");
                } else {
                    debug!(
                        cmd = handle.cmd,
                        inlen = handle.inlen,
                        rc = errno.raw(),
                        "MC command failed"
                    );
                }
                Err(errno)
            }
        };
        self.transport.consume_response();
        result
    }

    fn settle_after_failure(&self, handle: &RpcHandle, errno: Errno) {
        if handle.cmd != CMD_REBOOT {
            let outcome = self.recovery.schedule(RecoveryReason::CommandFailed {
                cmd: handle.cmd,
                errno,
            });
            self.stats.record_recovery(outcome);
        }
        thread::sleep(self.config.status_sleep);
        self.transport.poll_reboot();
        self.slot.lock().new_epoch = true;
    }

    fn ev_cpl(&self, seq: u32, datalen: usize, status: u32) {
        let wake = {
            let mut slot = self.slot.lock();
            match slot.tracker.check(seq) {
                SeqCheck::Match => {
                    if self.version == Some(WireVersion::V2) {
                        // v2 responses do not fit in an event; read the header.
                        if !self.read_current(&mut slot) {
                            warn!(seq, "completion event found no response in the window");
                            slot.record(Err(Errno::Io), 0, 0);
                        }
                    } else {
                        slot.record(translate(status), HEADER_LEN_V1, datalen);
                    }
                    true
                }
                SeqCheck::Stale => {
                    debug!(
                        rx_seq = seq,
                        credits = slot.tracker.credits(),
                        "ignoring stale MC completion event"
                    );
                    self.stats.bump(Counter::StaleDiscarded);
                    self.transport.consume_response();
                    false
                }
                SeqCheck::Anomaly => {
                    error!(
                        tx_seq = slot.tracker.wire_seq(),
                        rx_seq = seq,
                        "MC response mismatch"
                    );
                    self.stats.bump(Counter::SeqAnomaly);
                    false
                }
            }
        };
        if wake && !self.completion.complete() {
            debug!(seq, "MC completion arrived with no request waiting");
        }
    }

    fn ev_death(&self, reason: DeathReason) {
        match reason {
            DeathReason::Reboot => self.stats.bump(Counter::Reboot),
            DeathReason::Assertion { .. } => self.stats.bump(Counter::Assertion),
        }

        let mut slot = self.slot.lock();
        if self.completion.complete() {
            if self.mode.load() == DeliveryMode::Events {
                slot.record(Err(reason.errno()), 0, 0);
                slot.tracker.grant_credit();
            }
            debug!(?reason, "MC death completed the outstanding request");
            return;
        }

        let seen = drain_reboot_status(
            &self.transport,
            self.config.status_delay_count,
            self.config.status_delay,
        );
        slot.new_epoch = true;
        drop(slot);

        warn!(?reason, reboot_flag = seen, "MC died with no request outstanding");
        let recovery = match reason {
            DeathReason::Reboot => RecoveryReason::UnprovokedReboot,
            DeathReason::Assertion { addr } => RecoveryReason::UnprovokedAssertion { addr },
        };
        let outcome = self.recovery.schedule(recovery);
        self.stats.record_recovery(outcome);
    }
}

impl<T> Drop for McdiIface<T> {
    fn drop(&mut self) {
        let state = self.completion.state();
        if state != McdiState::Quiescent {
            error!(?state, "MCDI interface dropped with a request outstanding");
            if !thread::panicking() {
                debug_assert_eq!(state, McdiState::Quiescent);
            }
        }
    }
}
