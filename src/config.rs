//! Engine-wide defaults and the client configuration built from them.

use std::time::Duration;

/// Discoveries weaker than this (dBm) are ignored.
pub const DEFAULT_MIN_RSSI: i16 = -90;

/// Time allowed for any single adapter operation.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Length of a scan session started without an explicit duration.
/// Zero means scan continuously.
pub const DEFAULT_SCAN_DURATION: Duration = Duration::from_secs(30);

/// How long a peripheral stays connected after its last operation.
/// Zero means stay connected and reconnect on drop.
pub const DEFAULT_IDLE_DURATION: Duration = Duration::from_secs(10);

/// Extra attempts granted to an operation failing with a transient BLE error.
pub const DEFAULT_RETRY_BUDGET: u32 = 5;

/// Pause before a continuous scan is restarted after the adapter ended it.
pub const SCAN_RESTART_GRACE: Duration = Duration::from_secs(1);

/// Capacity of the upward broadcast channels.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub min_rssi: i16,
    pub timeout: Duration,
    pub scan_duration: Duration,
    pub idle_duration: Duration,
    pub retry_budget: u32,
    pub scan_restart_grace: Duration,
    pub notification_timeout: Duration,
    pub event_capacity: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            min_rssi: DEFAULT_MIN_RSSI,
            timeout: DEFAULT_TIMEOUT,
            scan_duration: DEFAULT_SCAN_DURATION,
            idle_duration: DEFAULT_IDLE_DURATION,
            retry_budget: DEFAULT_RETRY_BUDGET,
            scan_restart_grace: SCAN_RESTART_GRACE,
            notification_timeout: DEFAULT_TIMEOUT,
            event_capacity: EVENT_CHANNEL_CAPACITY,
        }
    }
}

impl ClientConfig {
    pub fn with_min_rssi(mut self, min_rssi: i16) -> Self {
        self.min_rssi = min_rssi;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_scan_duration(mut self, duration: Duration) -> Self {
        self.scan_duration = duration;
        self
    }

    pub fn with_idle_duration(mut self, duration: Duration) -> Self {
        self.idle_duration = duration;
        self
    }

    pub fn with_retry_budget(mut self, budget: u32) -> Self {
        self.retry_budget = budget;
        self
    }

    pub fn with_scan_restart_grace(mut self, grace: Duration) -> Self {
        self.scan_restart_grace = grace;
        self
    }

    pub fn with_notification_timeout(mut self, timeout: Duration) -> Self {
        self.notification_timeout = timeout;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_overrides_defaults() {
        let config = ClientConfig::default()
            .with_min_rssi(-80)
            .with_retry_budget(2)
            .with_idle_duration(Duration::ZERO);

        assert_eq!(config.min_rssi, -80);
        assert_eq!(config.retry_budget, 2);
        assert_eq!(config.idle_duration, Duration::ZERO);
        assert_eq!(config.timeout, DEFAULT_TIMEOUT);
    }
}
