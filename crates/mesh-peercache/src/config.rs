// Copyright (c) 2024 Omerta Mesh Contributors

//! Peer cache configuration.

/// Configuration for a [`crate::store::PeerCache`].
#[derive(Debug, Clone)]
pub struct PeerCacheConfig {
    /// A record not touched in this many seconds is purged on next access.
    pub freshness_ttl_secs: u64,
    /// Maximum gossip entries carried in one `ping`/`pong` payload.
    pub max_gossip_entries: usize,
    /// Upper bound on tracked peers; oldest-by-`last_seen` is evicted past it.
    pub max_peers: usize,
}

impl Default for PeerCacheConfig {
    fn default() -> Self {
        Self {
            freshness_ttl_secs: 30 * 60,
            max_gossip_entries: 16,
            max_peers: 5_000,
        }
    }
}

/// Builder for [`PeerCacheConfig`].
#[derive(Debug, Default)]
pub struct PeerCacheConfigBuilder {
    config: PeerCacheConfig,
}

impl PeerCacheConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn freshness_ttl_secs(mut self, secs: u64) -> Self {
        self.config.freshness_ttl_secs = secs;
        self
    }

    pub fn max_gossip_entries(mut self, n: usize) -> Self {
        self.config.max_gossip_entries = n;
        self
    }

    pub fn max_peers(mut self, n: usize) -> Self {
        self.config.max_peers = n;
        self
    }

    pub fn build(self) -> PeerCacheConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_overrides_defaults() {
        let config = PeerCacheConfigBuilder::new().max_peers(10).build();
        assert_eq!(config.max_peers, 10);
        assert_eq!(config.max_gossip_entries, 16);
    }
}
