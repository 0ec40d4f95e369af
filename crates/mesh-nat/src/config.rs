// Copyright (c) 2024 Omerta Mesh Contributors

//! NAT detector configuration.

use std::net::SocketAddr;
use std::time::Duration;

/// Configuration for one [`crate::detector::NatDetector`].
#[derive(Debug, Clone)]
pub struct NatConfig {
    /// At least two independent rendezvous servers, per §4.3.
    pub rendezvous_servers: Vec<SocketAddr>,
    /// How long to wait for a single probe reply.
    pub probe_timeout: Duration,
    /// Retries per server before giving up on it.
    pub retries: u8,
    /// Window after the initial probe round during which an unsolicited
    /// probe from a third address upgrades the classification to
    /// `full-cone` (§4.3's "unsolicited probe from a third address").
    pub unsolicited_probe_window: Duration,
}

impl Default for NatConfig {
    fn default() -> Self {
        Self {
            rendezvous_servers: Vec::new(),
            probe_timeout: Duration::from_secs(3),
            retries: 2,
            unsolicited_probe_window: Duration::from_secs(2),
        }
    }
}

impl NatConfig {
    pub fn with_rendezvous_servers(servers: Vec<SocketAddr>) -> Self {
        Self {
            rendezvous_servers: servers,
            ..Default::default()
        }
    }
}

/// Builder for [`NatConfig`].
#[derive(Debug, Default)]
pub struct NatConfigBuilder {
    config: NatConfig,
}

impl NatConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rendezvous_servers(mut self, servers: Vec<SocketAddr>) -> Self {
        self.config.rendezvous_servers = servers;
        self
    }

    pub fn add_rendezvous_server(mut self, server: SocketAddr) -> Self {
        self.config.rendezvous_servers.push(server);
        self
    }

    pub fn probe_timeout(mut self, timeout: Duration) -> Self {
        self.config.probe_timeout = timeout;
        self
    }

    pub fn retries(mut self, retries: u8) -> Self {
        self.config.retries = retries;
        self
    }

    pub fn build(self) -> NatConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_overrides_defaults() {
        let config = NatConfigBuilder::new()
            .add_rendezvous_server("203.0.113.1:3478".parse().unwrap())
            .add_rendezvous_server("203.0.113.2:3478".parse().unwrap())
            .retries(5)
            .build();
        assert_eq!(config.rendezvous_servers.len(), 2);
        assert_eq!(config.retries, 5);
    }
}
