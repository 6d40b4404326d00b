//! # Link Status
//!
//! The decoder only trusts receiver-relayed values while the link is
//! streaming. A valid RSSI frame re-arms the timeout; the periodic tick
//! counts it down.

use tracing::debug;

/// Link streaming state as seen by the decoder
#[cfg_attr(test, mockall::automock)]
pub trait LinkStatus {
    /// Whether valid frames arrived recently
    fn is_streaming(&self) -> bool;

    /// Re-arm the streaming timeout
    fn reset_link_timeout(&mut self);
}

/// Countdown link monitor
#[derive(Debug, Clone)]
pub struct LinkMonitor {
    timeout_ticks: u16,
    remaining: u16,
}

impl LinkMonitor {
    /// Create a monitor that drops the link after `timeout_ticks` silent ticks
    pub fn new(timeout_ticks: u16) -> Self {
        Self {
            timeout_ticks: timeout_ticks.max(1),
            remaining: 0,
        }
    }

    /// Count one tick down
    pub fn tick(&mut self) {
        if self.remaining == 1 {
            debug!("Telemetry link lost");
        }
        self.remaining = self.remaining.saturating_sub(1);
    }

    /// Force the link down
    pub fn reset(&mut self) {
        self.remaining = 0;
    }
}

impl LinkStatus for LinkMonitor {
    fn is_streaming(&self) -> bool {
        self.remaining > 0
    }

    fn reset_link_timeout(&mut self) {
        if self.remaining == 0 {
            debug!("Telemetry link up");
        }
        self.remaining = self.timeout_ticks;
    }
}
