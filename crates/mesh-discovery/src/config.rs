// Copyright (c) 2024 Omerta Mesh Contributors

//! Discovery engine configuration.

use crate::bootstrap::BootstrapPeer;
use std::time::Duration;

/// Configuration for one [`crate::engine::DiscoveryEngine`].
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    pub bootstrap_peers: Vec<BootstrapPeer>,
    /// How often to ping a random subset of known peers (§4.4 default 30 s).
    pub ping_interval: Duration,
    /// How many known peers to ping per round.
    pub fanout: usize,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            bootstrap_peers: Vec::new(),
            ping_interval: Duration::from_secs(30),
            fanout: 3,
        }
    }
}

/// Builder for [`DiscoveryConfig`].
#[derive(Debug, Default)]
pub struct DiscoveryConfigBuilder {
    config: DiscoveryConfig,
}

impl DiscoveryConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bootstrap_peers(mut self, peers: Vec<BootstrapPeer>) -> Self {
        self.config.bootstrap_peers = peers;
        self
    }

    pub fn ping_interval(mut self, interval: Duration) -> Self {
        self.config.ping_interval = interval;
        self
    }

    pub fn fanout(mut self, fanout: usize) -> Self {
        self.config.fanout = fanout;
        self
    }

    pub fn build(self) -> DiscoveryConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_component_design() {
        let config = DiscoveryConfig::default();
        assert_eq!(config.ping_interval, Duration::from_secs(30));
        assert_eq!(config.fanout, 3);
    }
}
