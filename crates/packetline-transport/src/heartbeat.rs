//! Keep-alive timer bookkeeping.
//!
//! The host scheduler owns the clock: it calls [`HeartbeatState::update`] with
//! the time elapsed since its last tick and acts on the returned
//! [`HeartbeatTick`]. Inbound traffic resets the miss counter.

use std::time::Duration;

/// Heartbeat timing configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeartbeatConfig {
    /// Interval between keep-alive messages. Zero disables heartbeats.
    pub interval: Duration,
    /// Restart the interval whenever a packet is received.
    pub reset_on_receive: bool,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            reset_on_receive: true,
        }
    }
}

/// What the scheduler should do after an [`HeartbeatState::update`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HeartbeatTick {
    /// A keep-alive message is due now.
    pub send: bool,
    /// Consecutive intervals that passed without inbound traffic, reported
    /// once the due heartbeat has been sent.
    pub missed: Option<u32>,
}

/// Elapsed time and miss count for one channel.
#[derive(Debug, Clone)]
pub struct HeartbeatState {
    config: HeartbeatConfig,
    elapsed: Duration,
    miss_count: u32,
}

impl HeartbeatState {
    /// Create a timer with explicit configuration.
    pub fn new(config: HeartbeatConfig) -> Self {
        Self {
            config,
            elapsed: Duration::ZERO,
            miss_count: 0,
        }
    }

    /// Advance the timer by `delta`.
    pub fn update(&mut self, delta: Duration) -> HeartbeatTick {
        if self.config.interval.is_zero() {
            return HeartbeatTick::default();
        }

        self.elapsed = self.elapsed.saturating_add(delta);
        if self.elapsed < self.config.interval {
            return HeartbeatTick::default();
        }

        let missed = self.miss_count;
        self.elapsed = Duration::ZERO;
        self.miss_count = self.miss_count.saturating_add(1);

        HeartbeatTick {
            send: true,
            missed: (missed > 0).then_some(missed),
        }
    }

    /// Record inbound traffic.
    pub fn on_packet_received(&mut self) {
        if self.config.reset_on_receive {
            self.elapsed = Duration::ZERO;
        }
        self.miss_count = 0;
    }

    /// Consecutive intervals without inbound traffic so far.
    pub fn miss_count(&self) -> u32 {
        self.miss_count
    }

    /// Time accumulated since the last due heartbeat.
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// Active configuration.
    pub fn config(&self) -> &HeartbeatConfig {
        &self.config
    }
}

impl Default for HeartbeatState {
    fn default() -> Self {
        Self::new(HeartbeatConfig::default())
    }
}
