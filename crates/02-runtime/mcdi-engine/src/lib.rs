#![deny(missing_docs)]
//! MCDI request/response engine.
//!
//! [`McdiIface`] gives a host driver single-flight RPC access to a
//! management controller over any [`Transport`]:
//!
//! * requests are framed by `mcdi-wire` and matched to responses by sequence
//!   number, with credits absorbing late replies to abandoned requests;
//! * completions are either polled or delivered as events, switchable while
//!   a request is in flight;
//! * controller reboots and assertions fail the outstanding request and ask
//!   the owner for recovery through [`OwnerChannels`].
//!
//! Events enter through [`EventPoster`] (non-blocking, usable from interrupt
//! context) and are applied by an [`EventPump`].

mod completion;
mod config;
mod error;
mod event;
mod iface;
mod mode;
mod monitor;
mod notify;
mod recovery;
mod seq;
mod stats;
mod transport;

pub use completion::{Completion, McdiState};
pub use config::{
    EngineConfig, EngineConfigBuilder, DEFAULT_EVENT_DEPTH, DEFAULT_NOTIFICATION_DEPTH,
    DEFAULT_POLL_INTERVAL, DEFAULT_RECOVERY_DEPTH, DEFAULT_RPC_TIMEOUT, DEFAULT_SPIN_WINDOW,
    DEFAULT_STATUS_DELAY, DEFAULT_STATUS_DELAY_COUNT, DEFAULT_STATUS_SLEEP, MAX_RPC_TIMEOUT,
};
pub use error::{McdiError, McdiResult};
pub use event::{event_queue, EventPoster, EventPump, EventQueue, PostOutcome, RawEvent};
pub use iface::{McdiIface, OwnerChannels, RpcHandle};
pub use mode::{DeliveryMode, PollWait};
pub use monitor::DeathReason;
pub use notify::{drain_notifications, Notification};
pub use recovery::{drain_recovery, RecoveryReason, RecoveryRequest, ScheduleOutcome};
pub use seq::{SeqCheck, SeqTracker};
pub use stats::EngineStatsSnapshot;
pub use transport::Transport;

pub use mcdi_wire::{Errno, McdiEvent, WireVersion};
