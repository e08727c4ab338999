//! Connection configuration and protocol timing constants.

use std::time::Duration;

/// Well-known Ember Link TCP port.
pub const DEFAULT_PORT: u16 = 6053;

/// Identity string declared in the greeting.
pub const CLIENT_INFO: &str = "ember";

/// How often the watchdog probes the device.
pub const PING_INTERVAL: Duration = Duration::from_secs(10);

/// Unanswered probes tolerated before the link is declared dead.
pub const MAX_MISSED_PINGS: u32 = 4;

/// Bound on the TCP connect attempt.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(20);

// ── DeviceConfig ─────────────────────────────────────────────────

/// Where and how to reach one device. Read once per connection
/// attempt; changing it while connected has no effect until the next
/// attempt.
#[derive(Debug, Clone)]
pub struct DeviceConfig {
    /// Hostname or IP address. Required — an empty hostname is
    /// reported as a configuration error without attempting to
    /// connect.
    pub hostname: String,
    pub port: u16,
    /// Shared secret; `None` logs in anonymously.
    pub password: Option<String>,
    /// Identity string sent in the greeting.
    pub client_info: String,
}

impl DeviceConfig {
    pub fn new(hostname: impl Into<String>) -> Self {
        Self {
            hostname: hostname.into(),
            port: DEFAULT_PORT,
            password: None,
            client_info: CLIENT_INFO.to_string(),
        }
    }
}

// ── ProtocolTimings ──────────────────────────────────────────────

/// Timing knobs for the watchdog and reconnection scheduler.
///
/// `Default` yields the production constants; tests shrink these to
/// milliseconds to exercise the timeout paths quickly.
#[derive(Debug, Clone)]
pub struct ProtocolTimings {
    /// Watchdog probe period.
    pub ping_interval: Duration,
    /// Unanswered probes before forcing a disconnect.
    pub max_missed_pings: u32,
    /// TCP connect deadline.
    pub connect_timeout: Duration,
    /// Reconnect delay after connect failures and rejected
    /// credentials.
    pub reconnect_delay: Duration,
    /// Reconnect delay after mid-session drops (stream end, parse
    /// error, remote disconnect, watchdog).
    pub short_reconnect_delay: Duration,
}

impl Default for ProtocolTimings {
    fn default() -> Self {
        Self {
            ping_interval: PING_INTERVAL,
            max_missed_pings: MAX_MISSED_PINGS,
            connect_timeout: CONNECT_TIMEOUT,
            reconnect_delay: CONNECT_TIMEOUT * 2,
            short_reconnect_delay: Duration::from_secs(10),
        }
    }
}

impl ProtocolTimings {
    /// Elapsed time without a pong after which the link counts as
    /// dead.
    pub fn liveness_deadline(&self) -> Duration {
        self.ping_interval * self.max_missed_pings
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults() {
        let cfg = DeviceConfig::new("greenhouse.local");
        assert_eq!(cfg.port, DEFAULT_PORT);
        assert!(cfg.password.is_none());
        assert_eq!(cfg.client_info, CLIENT_INFO);
    }

    #[test]
    fn default_timings_match_constants() {
        let t = ProtocolTimings::default();
        assert_eq!(t.ping_interval, PING_INTERVAL);
        assert_eq!(t.liveness_deadline(), Duration::from_secs(40));
        assert_eq!(t.reconnect_delay, Duration::from_secs(40));
        assert_eq!(t.short_reconnect_delay, Duration::from_secs(10));
    }
}
