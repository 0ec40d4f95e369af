// Copyright (c) 2024 Omerta Mesh Contributors

//! Relay manager configuration.

use std::time::Duration;

/// Configuration for one [`crate::manager::RelayManager`].
#[derive(Debug, Clone, Copy)]
pub struct RelayConfig {
    /// Minimum live relay connections to maintain (§4.6 default 3).
    pub min_relays: usize,
    /// Maximum live relay connections to maintain (§4.6 default 5).
    pub max_relays: usize,
    /// How often a connection pings its relay (§4.6 default 30 s).
    pub heartbeat_interval: Duration,
    /// Missed heartbeats, in multiples of `heartbeat_interval`, before a
    /// connection is declared unhealthy (§4.6: "2x the interval").
    pub heartbeat_miss_threshold: u32,
    /// Minimum interval between candidate rescoring passes (§4.6 default
    /// 60 s).
    pub candidate_refresh_interval: Duration,
    /// A session with no traffic for this long is closed (§4.7 default
    /// 5 min).
    pub idle_session_timeout: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            min_relays: 3,
            max_relays: 5,
            heartbeat_interval: Duration::from_secs(30),
            heartbeat_miss_threshold: 2,
            candidate_refresh_interval: Duration::from_secs(60),
            idle_session_timeout: Duration::from_secs(5 * 60),
        }
    }
}

/// Builder for [`RelayConfig`].
#[derive(Debug, Default)]
pub struct RelayConfigBuilder {
    config: RelayConfig,
}

impl RelayConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn min_relays(mut self, min_relays: usize) -> Self {
        self.config.min_relays = min_relays;
        self
    }

    pub fn max_relays(mut self, max_relays: usize) -> Self {
        self.config.max_relays = max_relays;
        self
    }

    pub fn heartbeat_interval(mut self, interval: Duration) -> Self {
        self.config.heartbeat_interval = interval;
        self
    }

    pub fn idle_session_timeout(mut self, timeout: Duration) -> Self {
        self.config.idle_session_timeout = timeout;
        self
    }

    pub fn build(self) -> RelayConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_component_design() {
        let config = RelayConfig::default();
        assert_eq!(config.min_relays, 3);
        assert_eq!(config.max_relays, 5);
        assert_eq!(config.heartbeat_interval, Duration::from_secs(30));
        assert_eq!(config.idle_session_timeout, Duration::from_secs(300));
    }
}
