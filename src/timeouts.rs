//! Timeout configuration for cloud connections.
//!
//! Centralizes the socket-level timeouts used by the connection task: the
//! upgrade/handshake deadline, per-frame send deadline and keepalive timing.

use std::time::Duration;

/// Timeout configuration for a [`CloudConnection`](crate::CloudConnection).
///
/// # Examples
///
/// ```rust
/// use cloud_link::CloudLinkTimeouts;
/// use std::time::Duration;
///
/// // Use defaults (recommended for most cases)
/// let timeouts = CloudLinkTimeouts::default();
///
/// // Custom timeouts for high-latency environments
/// let timeouts = CloudLinkTimeouts::builder()
///     .connection_timeout(Duration::from_secs(60))
///     .keepalive_interval_secs(0)
///     .build();
///
/// // Aggressive timeouts for local development
/// let timeouts = CloudLinkTimeouts::fast();
/// ```
#[derive(Debug, Clone)]
pub struct CloudLinkTimeouts {
    /// Timeout for establishing the connection (TCP + TLS + WebSocket upgrade).
    /// Default: 10 seconds
    pub connection_timeout: Duration,

    /// Timeout for writing one frame to the socket.
    /// A send that exceeds it is treated as a lost connection.
    /// Default: 10 seconds
    pub send_timeout: Duration,

    /// Keep-alive ping interval.
    /// Set to 0 to disable keep-alive pings.
    /// Default: 15 seconds
    pub keepalive_interval: Duration,

    /// Maximum time to wait for any frame after sending a keepalive Ping.
    /// Set to 0 to disable pong timeout checking.
    /// Default: 10 seconds
    pub pong_timeout: Duration,
}

impl Default for CloudLinkTimeouts {
    fn default() -> Self {
        Self {
            connection_timeout: Duration::from_secs(10),
            send_timeout: Duration::from_secs(10),
            keepalive_interval: Duration::from_secs(15),
            pong_timeout: Duration::from_secs(10),
        }
    }
}

impl CloudLinkTimeouts {
    /// Create a new builder for custom timeout configuration.
    pub fn builder() -> CloudLinkTimeoutsBuilder {
        CloudLinkTimeoutsBuilder::new()
    }

    /// Shorter timeouts suitable for localhost connections.
    pub fn fast() -> Self {
        Self {
            connection_timeout: Duration::from_secs(2),
            send_timeout: Duration::from_secs(2),
            keepalive_interval: Duration::from_secs(5),
            pong_timeout: Duration::from_secs(3),
        }
    }

    /// Longer timeouts for unreliable networks.
    pub fn relaxed() -> Self {
        Self {
            connection_timeout: Duration::from_secs(30),
            send_timeout: Duration::from_secs(30),
            keepalive_interval: Duration::from_secs(30),
            pong_timeout: Duration::from_secs(20),
        }
    }

    /// Check if a duration represents "no timeout" (zero or very large).
    pub fn is_no_timeout(duration: Duration) -> bool {
        duration.is_zero() || duration > Duration::from_secs(86400 * 365)
    }
}

/// Builder for custom [`CloudLinkTimeouts`] configurations.
#[derive(Debug, Clone)]
pub struct CloudLinkTimeoutsBuilder {
    timeouts: CloudLinkTimeouts,
}

impl CloudLinkTimeoutsBuilder {
    fn new() -> Self {
        Self {
            timeouts: CloudLinkTimeouts::default(),
        }
    }

    /// Set the connection timeout (TCP + TLS + upgrade).
    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts.connection_timeout = timeout;
        self
    }

    pub fn connection_timeout_secs(self, secs: u64) -> Self {
        self.connection_timeout(Duration::from_secs(secs))
    }

    /// Set the per-frame send timeout.
    pub fn send_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts.send_timeout = timeout;
        self
    }

    pub fn send_timeout_secs(self, secs: u64) -> Self {
        self.send_timeout(Duration::from_secs(secs))
    }

    /// Set the keepalive ping interval.
    /// Set to 0 to disable keepalive pings.
    pub fn keepalive_interval(mut self, interval: Duration) -> Self {
        self.timeouts.keepalive_interval = interval;
        self
    }

    pub fn keepalive_interval_secs(self, secs: u64) -> Self {
        self.keepalive_interval(Duration::from_secs(secs))
    }

    /// Set the pong timeout (max wait for traffic after a Ping).
    /// Set to 0 to disable pong timeout checking.
    pub fn pong_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts.pong_timeout = timeout;
        self
    }

    pub fn pong_timeout_secs(self, secs: u64) -> Self {
        self.pong_timeout(Duration::from_secs(secs))
    }

    pub fn build(self) -> CloudLinkTimeouts {
        self.timeouts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_timeouts() {
        let timeouts = CloudLinkTimeouts::default();
        assert_eq!(timeouts.connection_timeout, Duration::from_secs(10));
        assert_eq!(timeouts.send_timeout, Duration::from_secs(10));
        assert_eq!(timeouts.keepalive_interval, Duration::from_secs(15));
    }

    #[test]
    fn test_builder() {
        let timeouts = CloudLinkTimeouts::builder()
            .connection_timeout_secs(60)
            .keepalive_interval_secs(0)
            .pong_timeout(Duration::from_millis(500))
            .build();

        assert_eq!(timeouts.connection_timeout, Duration::from_secs(60));
        assert!(timeouts.keepalive_interval.is_zero());
        assert_eq!(timeouts.pong_timeout, Duration::from_millis(500));
    }

    #[test]
    fn test_presets() {
        assert!(CloudLinkTimeouts::fast().connection_timeout <= Duration::from_secs(5));
        assert!(CloudLinkTimeouts::relaxed().connection_timeout >= Duration::from_secs(30));
    }

    #[test]
    fn test_is_no_timeout() {
        assert!(CloudLinkTimeouts::is_no_timeout(Duration::ZERO));
        assert!(!CloudLinkTimeouts::is_no_timeout(Duration::from_secs(1)));
        assert!(CloudLinkTimeouts::is_no_timeout(Duration::from_secs(86400 * 400)));
    }
}
