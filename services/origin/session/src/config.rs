//! Client configuration.

use crate::metrics::DEFAULT_HISTORY_LEN;
use origin_wire::{endpoint_url, CLIENT_SOURCE};
use std::time::Duration;

/// Configuration of an [`OriginClient`](crate::OriginClient)
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// WebSocket URL of the mount control endpoint
    pub url: String,
    /// Source identity stamped on outbound commands
    pub source: String,
    /// Default deadline for a command response
    pub command_timeout: Duration,
    /// Deadline for the verification reply during connect
    pub verify_timeout: Duration,
    /// Deadline for opening the socket
    pub connect_timeout: Duration,
    /// Pause between heartbeats
    pub heartbeat_interval: Duration,
    /// Deadline for a heartbeat reply
    pub heartbeat_timeout: Duration,
    /// Backoff before the first reconnect attempt
    pub backoff_base: Duration,
    /// Upper bound on the un-jittered reconnect backoff
    pub backoff_max: Duration,
    /// Reconnect attempts before automatic recovery gives up
    pub max_reconnect_attempts: u32,
    /// Reconnect automatically after an unexpected loss
    pub auto_reconnect: bool,
    /// Length of the latency and error histories
    pub history_len: usize,
}

impl ClientConfig {
    /// Configuration for the controller at `host` (optionally `host:port`)
    pub fn for_host(host: &str) -> Self {
        Self {
            url: endpoint_url(host),
            ..Self::default()
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            url: endpoint_url("127.0.0.1"),
            source: CLIENT_SOURCE.to_string(),
            command_timeout: Duration::from_secs(10),
            verify_timeout: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(10),
            heartbeat_interval: Duration::from_secs(5),
            heartbeat_timeout: Duration::from_secs(5),
            backoff_base: Duration::from_secs(1),
            backoff_max: Duration::from_secs(30),
            max_reconnect_attempts: 10,
            auto_reconnect: true,
            history_len: DEFAULT_HISTORY_LEN,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_for_host() {
        let config = ClientConfig::for_host("10.0.0.5");
        assert_eq!(
            config.url,
            "ws://10.0.0.5/SmartScope-1.0/mountControlEndpoint"
        );
        assert_eq!(config.source, "WebApp");
        assert_eq!(config.max_reconnect_attempts, 10);
        assert_eq!(config.heartbeat_interval, Duration::from_secs(5));
    }
}
