//! Engine tunables.
//!
//! Defaults mirror the controller contract: a ten second RPC budget, a
//! short busy-spin window before the poller starts sleeping, and a 10 ms
//! settle delay after a fatal failure.

use crate::error::{McdiError, McdiResult};
use crate::mode::DeliveryMode;
use std::time::Duration;

/// Time the host waits for any single response.
pub const DEFAULT_RPC_TIMEOUT: Duration = Duration::from_secs(10);
/// Longest accepted RPC timeout. Deadlines are computed from `Instant::now()`
/// and must not overflow.
pub const MAX_RPC_TIMEOUT: Duration = Duration::from_secs(3600);
/// Busy-spin window at the start of every poll.
pub const DEFAULT_SPIN_WINDOW: Duration = Duration::from_millis(1);
/// Sleep between readiness checks once the spin window has elapsed.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1);
/// Settle delay after an I/O or assertion failure.
pub const DEFAULT_STATUS_SLEEP: Duration = Duration::from_millis(10);
/// Busy-wait between reboot-status probes when draining an unprovoked death.
pub const DEFAULT_STATUS_DELAY: Duration = Duration::from_micros(100);
/// Number of reboot-status probes when draining an unprovoked death.
pub const DEFAULT_STATUS_DELAY_COUNT: u32 = 100;
/// Default capacity of the notification channel.
pub const DEFAULT_NOTIFICATION_DEPTH: usize = 64;
/// Default capacity of the recovery channel.
pub const DEFAULT_RECOVERY_DEPTH: usize = 4;
/// Default capacity of the raw event queue.
pub const DEFAULT_EVENT_DEPTH: usize = 64;

/// Configuration consumed by [`McdiIface::new`](crate::McdiIface::new).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EngineConfig {
    /// Highest header version the device negotiated: 0 (no MCDI), 1 or 2.
    pub max_version: u8,
    /// Per-request response timeout.
    pub rpc_timeout: Duration,
    /// Initial busy-spin window of the poller.
    pub spin_window: Duration,
    /// Sleep between polls after the spin window.
    pub poll_interval: Duration,
    /// Delay after a fatal failure before the reboot flag is drained.
    pub status_sleep: Duration,
    /// Busy-wait per reboot-status probe on unprovoked death.
    pub status_delay: Duration,
    /// Probe count on unprovoked death.
    pub status_delay_count: u32,
    /// Delivery mode at bring-up.
    pub initial_mode: DeliveryMode,
    /// Capacity of the notification channel.
    pub notification_depth: usize,
    /// Capacity of the recovery channel.
    pub recovery_depth: usize,
    /// Capacity of the raw event queue.
    pub event_depth: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_version: 2,
            rpc_timeout: DEFAULT_RPC_TIMEOUT,
            spin_window: DEFAULT_SPIN_WINDOW,
            poll_interval: DEFAULT_POLL_INTERVAL,
            status_sleep: DEFAULT_STATUS_SLEEP,
            status_delay: DEFAULT_STATUS_DELAY,
            status_delay_count: DEFAULT_STATUS_DELAY_COUNT,
            initial_mode: DeliveryMode::Poll,
            notification_depth: DEFAULT_NOTIFICATION_DEPTH,
            recovery_depth: DEFAULT_RECOVERY_DEPTH,
            event_depth: DEFAULT_EVENT_DEPTH,
        }
    }
}

impl EngineConfig {
    /// Starts a builder seeded with the defaults.
    pub fn builder() -> EngineConfigBuilder {
        EngineConfigBuilder {
            config: EngineConfig::default(),
        }
    }

    /// Checks the invariants the engine relies on.
    pub fn validate(&self) -> McdiResult<()> {
        if self.max_version > 2 {
            return Err(McdiError::InvalidConfig("max_version must be 0, 1 or 2"));
        }
        if self.rpc_timeout.is_zero() {
            return Err(McdiError::InvalidConfig("rpc_timeout must be non-zero"));
        }
        if self.rpc_timeout > MAX_RPC_TIMEOUT {
            return Err(McdiError::InvalidConfig("rpc_timeout must not exceed one hour"));
        }
        if self.spin_window > self.rpc_timeout {
            return Err(McdiError::InvalidConfig("spin_window must not exceed rpc_timeout"));
        }
        if self.status_delay > DEFAULT_STATUS_SLEEP {
            return Err(McdiError::InvalidConfig("status_delay must not exceed 10 ms"));
        }
        if self.poll_interval.is_zero() {
            return Err(McdiError::InvalidConfig("poll_interval must be non-zero"));
        }
        if self.notification_depth == 0 || self.recovery_depth == 0 || self.event_depth == 0 {
            return Err(McdiError::InvalidConfig("channel depths must be at least 1"));
        }
        Ok(())
    }
}

/// Fluent builder for [`EngineConfig`].
#[derive(Clone, Debug)]
pub struct EngineConfigBuilder {
    config: EngineConfig,
}

impl EngineConfigBuilder {
    /// Sets the negotiated header version.
    pub fn max_version(mut self, version: u8) -> Self {
        self.config.max_version = version;
        self
    }

    /// Sets the per-request timeout.
    pub fn rpc_timeout(mut self, timeout: Duration) -> Self {
        self.config.rpc_timeout = timeout;
        self
    }

    /// Sets the busy-spin window.
    pub fn spin_window(mut self, window: Duration) -> Self {
        self.config.spin_window = window;
        self
    }

    /// Sets the sleep between polls.
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.config.poll_interval = interval;
        self
    }

    /// Sets the settle delay after fatal failures.
    pub fn status_sleep(mut self, sleep: Duration) -> Self {
        self.config.status_sleep = sleep;
        self
    }

    /// Sets the reboot drain probe delay and count.
    pub fn status_drain(mut self, delay: Duration, count: u32) -> Self {
        self.config.status_delay = delay;
        self.config.status_delay_count = count;
        self
    }

    /// Sets the delivery mode at bring-up.
    pub fn initial_mode(mut self, mode: DeliveryMode) -> Self {
        self.config.initial_mode = mode;
        self
    }

    /// Sets the notification channel depth.
    pub fn notification_depth(mut self, depth: usize) -> Self {
        self.config.notification_depth = depth;
        self
    }

    /// Sets the recovery channel depth.
    pub fn recovery_depth(mut self, depth: usize) -> Self {
        self.config.recovery_depth = depth;
        self
    }

    /// Sets the raw event queue depth.
    pub fn event_depth(mut self, depth: usize) -> Self {
        self.config.event_depth = depth;
        self
    }

    /// Validates and returns the configuration.
    pub fn build(self) -> McdiResult<EngineConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
