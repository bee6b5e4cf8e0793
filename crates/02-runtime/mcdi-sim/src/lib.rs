#![deny(missing_docs)]
//! In-memory management controller for exercising the MCDI engine.
//!
//! [`SimController`] implements [`Transport`] with a response mailbox: each
//! reply is appended under a write sequence and stays ready until the engine
//! consumes it, advancing the read sequence. What the controller does with a
//! request is scripted per request ([`Behavior`]) or per command
//! ([`SimController::on_command`]); anything unscripted is echoed back.
//! When the request asks for event completion and an [`EventPoster`] is
//! attached, completions are raised as CMDDONE events as well.

use log::{debug, trace, warn};
use mcdi_engine::{EventPoster, PostOutcome, Transport};
use mcdi_wire::{
    decode_request_header, encode_response, McdiEvent, WireVersion, MAX_CMD_V1,
    SDU_LEN_MAX_V1, XFLAG_EVREQ,
};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::thread;
use std::time::{Duration, Instant};

/// Simulator tunables.
#[derive(Clone, Debug)]
pub struct SimConfig {
    /// Delay between a request and its response becoming visible.
    pub response_delay: Duration,
    /// Raise CMDDONE and REBOOT events when a poster is attached.
    pub raise_events: bool,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            response_delay: Duration::ZERO,
            raise_events: true,
        }
    }
}

/// Canned controller answer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Reply {
    /// Controller status word; non-zero marks an error response.
    pub status: u32,
    /// Payload returned on success.
    pub payload: Vec<u8>,
}

impl Reply {
    /// Successful reply carrying `payload`.
    pub fn ok(payload: &[u8]) -> Self {
        Self {
            status: 0,
            payload: payload.to_vec(),
        }
    }

    /// Error reply carrying controller status `status`.
    pub fn error(status: u32) -> Self {
        Self {
            status,
            payload: Vec::new(),
        }
    }
}

/// What the controller does with one request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Behavior {
    /// Answer with the given reply.
    Respond(Reply),
    /// Swallow the request, holding the reply for [`SimController::deliver_late`].
    Silent(Reply),
    /// Deliver the held reply of an earlier silent request, then answer.
    StaleReplay(Reply),
    /// Reboot instead of answering.
    Reboot,
    /// Assert at `addr` instead of answering.
    Assert {
        /// Faulting address reported in the event.
        addr: u32,
    },
}

/// One request as the controller received it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SimRequest {
    /// Command code.
    pub cmd: u32,
    /// Wire sequence.
    pub seq: u32,
    /// Request payload.
    pub payload: Vec<u8>,
    /// Header version used by the host.
    pub version: WireVersion,
    /// Host asked for an event completion.
    pub evreq: bool,
    /// Not-epoch flag as sent.
    pub not_epoch: bool,
}

#[derive(Clone, Debug)]
struct Pending {
    seq: u32,
    cmd: u32,
    reply: Reply,
    evreq: bool,
}

#[derive(Debug)]
struct Slot {
    bytes: Vec<u8>,
    ready_at: Instant,
}

#[derive(Debug, Default)]
struct SimState {
    mailbox: VecDeque<Slot>,
    write_seq: u64,
    read_seq: u64,
    reboot_flag: bool,
    script: VecDeque<Behavior>,
    handlers: HashMap<u32, Reply>,
    held: Option<Pending>,
    requests: Vec<SimRequest>,
}

/// Scriptable controller behind a shared response mailbox.
#[derive(Debug, Default)]
pub struct SimController {
    config: SimConfig,
    state: Mutex<SimState>,
    poster: Mutex<Option<EventPoster>>,
}

impl SimController {
    /// Creates a controller with `config`.
    pub fn new(config: SimConfig) -> Self {
        Self {
            config,
            state: Mutex::new(SimState::default()),
            poster: Mutex::new(None),
        }
    }

    /// Attaches the event queue completions and reboots are raised on.
    pub fn attach_events(&self, poster: EventPoster) {
        *self.poster.lock() = Some(poster);
    }

    /// Drops the attached poster so an event pump can drain and stop.
    pub fn detach_events(&self) {
        self.poster.lock().take();
    }

    /// Queues the behaviour for the next unscripted request.
    pub fn script(&self, behavior: Behavior) {
        self.state.lock().script.push_back(behavior);
    }

    /// Answers every request for `cmd` with `reply` unless a script entry
    /// takes precedence.
    pub fn on_command(&self, cmd: u32, reply: Reply) {
        self.state.lock().handlers.insert(cmd, reply);
    }

    /// Requests received so far.
    pub fn requests(&self) -> Vec<SimRequest> {
        self.state.lock().requests.clone()
    }

    /// Most recent request.
    pub fn last_request(&self) -> Option<SimRequest> {
        self.state.lock().requests.last().cloned()
    }

    /// Responses written but not yet consumed.
    pub fn pending_responses(&self) -> usize {
        let state = self.state.lock();
        (state.write_seq - state.read_seq) as usize
    }

    /// Delivers the reply held back by a [`Behavior::Silent`] request.
    /// Returns false when nothing was held.
    pub fn deliver_late(&self) -> bool {
        let held = {
            let mut state = self.state.lock();
            let Some(held) = state.held.take() else {
                return false;
            };
            debug!("sim: delivering late reply for seq {}", held.seq);
            self.post_reply(&mut state, &held);
            held
        };
        self.raise_completion(&held);
        true
    }

    /// Reboots the controller out of band: pending replies are lost and the
    /// reboot flag is raised (plus a REBOOT event when enabled).
    pub fn trigger_reboot(&self) {
        {
            let mut state = self.state.lock();
            Self::reboot_locked(&mut state);
        }
        if self.config.raise_events {
            self.raise(McdiEvent::Reboot);
        }
    }

    /// Raises an arbitrary event if a poster is attached.
    pub fn raise(&self, event: McdiEvent) -> Option<PostOutcome> {
        let poster = self.poster.lock().clone()?;
        let (code, data) = event.encode();
        let outcome = poster.post(code, data);
        if outcome != PostOutcome::Accepted {
            warn!("sim: event {event:?} not queued: {outcome:?}");
        }
        Some(outcome)
    }

    fn reboot_locked(state: &mut SimState) {
        debug!("sim: controller reboot");
        state.reboot_flag = true;
        state.held = None;
        state.read_seq = state.write_seq;
        state.mailbox.clear();
    }

    fn post_reply(&self, state: &mut SimState, pending: &Pending) {
        let error = pending.reply.status != 0;
        let body = if error {
            pending.reply.status.to_le_bytes().to_vec()
        } else {
            pending.reply.payload.clone()
        };
        let version = if pending.cmd > MAX_CMD_V1 || body.len() > SDU_LEN_MAX_V1 {
            WireVersion::V2
        } else {
            WireVersion::V1
        };
        let header = encode_response(pending.seq, pending.cmd, error, body.len(), version);
        let mut bytes = Vec::with_capacity(header.len() + body.len());
        bytes.extend_from_slice(header.as_bytes());
        bytes.extend_from_slice(&body);
        state.mailbox.push_back(Slot {
            bytes,
            ready_at: Instant::now() + self.config.response_delay,
        });
        state.write_seq += 1;
        trace!(
            "sim: reply seq {} cmd {:#x} status {:#x} ({} bytes)",
            pending.seq,
            pending.cmd,
            pending.reply.status,
            body.len()
        );
    }

    fn raise_completion(&self, pending: &Pending) {
        if !pending.evreq || !self.config.raise_events {
            return;
        }
        let Some(poster) = self.poster.lock().clone() else {
            return;
        };
        let datalen = if pending.reply.status != 0 {
            4
        } else {
            pending.reply.payload.len()
        };
        let (code, data) = McdiEvent::CmdDone {
            seq: pending.seq,
            datalen,
            status: pending.reply.status,
        }
        .encode();
        let delay = self.config.response_delay;
        if delay.is_zero() {
            poster.post(code, data);
        } else {
            thread::spawn(move || {
                thread::sleep(delay);
                poster.post(code, data);
            });
        }
    }
}

impl Transport for SimController {
    fn send_request(&self, header: &[u8], payload: &[u8]) {
        let request = match decode_request_header(header) {
            Ok(request) => request,
            Err(err) => {
                warn!("sim: dropping malformed request header: {err}");
                return;
            }
        };
        let evreq = request.xflags & XFLAG_EVREQ != 0;
        let version = if header.len() > 4 {
            WireVersion::V2
        } else {
            WireVersion::V1
        };
        trace!(
            "sim: request cmd {:#x} seq {} len {} evreq {}",
            request.cmd,
            request.seq,
            payload.len(),
            evreq
        );

        let mut completions: Vec<Pending> = Vec::with_capacity(2);
        let mut raise_death = None;
        {
            let mut state = self.state.lock();
            state.requests.push(SimRequest {
                cmd: request.cmd,
                seq: request.seq,
                payload: payload.to_vec(),
                version,
                evreq,
                not_epoch: request.not_epoch,
            });
            let behavior = state.script.pop_front().unwrap_or_else(|| {
                let reply = state
                    .handlers
                    .get(&request.cmd)
                    .cloned()
                    .unwrap_or_else(|| Reply::ok(payload));
                Behavior::Respond(reply)
            });
            let pending = |reply: Reply| Pending {
                seq: request.seq,
                cmd: request.cmd,
                reply,
                evreq,
            };
            match behavior {
                Behavior::Respond(reply) => {
                    let reply = pending(reply);
                    self.post_reply(&mut state, &reply);
                    completions.push(reply);
                }
                Behavior::Silent(reply) => {
                    debug!("sim: holding reply for seq {}", request.seq);
                    state.held = Some(pending(reply));
                }
                Behavior::StaleReplay(reply) => {
                    if let Some(held) = state.held.take() {
                        self.post_reply(&mut state, &held);
                        completions.push(held);
                    }
                    let reply = pending(reply);
                    self.post_reply(&mut state, &reply);
                    completions.push(reply);
                }
                Behavior::Reboot => {
                    Self::reboot_locked(&mut state);
                    raise_death = Some(McdiEvent::Reboot);
                }
                Behavior::Assert { addr } => {
                    debug!("sim: assertion at {addr:#x}");
                    raise_death = Some(McdiEvent::BadAssert { addr });
                }
            }
        }

        for completion in &completions {
            self.raise_completion(completion);
        }
        if let Some(event) = raise_death {
            if self.config.raise_events {
                self.raise(event);
            }
        }
    }

    fn read_response(&self, offset: usize, out: &mut [u8]) {
        out.fill(0);
        let state = self.state.lock();
        let Some(slot) = state.mailbox.front() else {
            return;
        };
        let end = slot.bytes.len().min(offset + out.len());
        if offset < end {
            out[..end - offset].copy_from_slice(&slot.bytes[offset..end]);
        }
    }

    fn response_ready(&self) -> bool {
        let state = self.state.lock();
        state.write_seq != state.read_seq
            && state
                .mailbox
                .front()
                .is_some_and(|slot| slot.ready_at <= Instant::now())
    }

    fn poll_reboot(&self) -> bool {
        std::mem::take(&mut self.state.lock().reboot_flag)
    }

    fn consume_response(&self) {
        let mut state = self.state.lock();
        if state.mailbox.pop_front().is_some() {
            state.read_seq += 1;
        }
    }
}
