// Copyright (c) 2024 Omerta Mesh Contributors

//! Top-level node configuration: the bind address plus every
//! collaborator's config, assembled the way `GossipConfigBuilder`
//! assembles `GossipConfig`.

use mesh_channel::ChannelConfig;
use mesh_discovery::{BootstrapPeer, DiscoveryConfig};
use mesh_holepunch::HolePunchConfig;
use mesh_nat::NatConfig;
use mesh_peercache::PeerCacheConfig;
use mesh_relay::RelayConfig;
use mesh_session::{AutoAccept, TunnelConfig, TunnelPolicy};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use crate::error::{MeshError, Result};

/// Configuration for one [`crate::node::MeshNode`].
#[derive(Clone)]
pub struct MeshConfig {
    /// Local address to bind the node's one UDP socket to.
    pub bind_addr: SocketAddr,
    /// If `true`, a hole-punch failure automatically retries via relay
    /// rather than surfacing `peer_unreachable` (§4.5, §8 scenario 3's
    /// `force_relay_only`).
    pub allow_relay_fallback: bool,
    /// Skip hole punching entirely and always route new sessions through a
    /// relay (§8 scenario 3).
    pub force_relay_only: bool,
    /// Optional warm-start peer-cache file (§6, §2b).
    pub peer_cache_file: Option<PathBuf>,
    pub nat: NatConfig,
    pub discovery: DiscoveryConfig,
    pub hole_punch: HolePunchConfig,
    pub relay: RelayConfig,
    pub channel: ChannelConfig,
    pub tunnel: TunnelConfig,
    pub peer_cache: PeerCacheConfig,
    /// Decides whether an incoming tunnel request is accepted (§4.9:
    /// "rejects via policy callback"). Defaults to [`AutoAccept`].
    pub tunnel_policy: Arc<dyn TunnelPolicy>,
}

impl std::fmt::Debug for MeshConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MeshConfig")
            .field("bind_addr", &self.bind_addr)
            .field("allow_relay_fallback", &self.allow_relay_fallback)
            .field("force_relay_only", &self.force_relay_only)
            .field("peer_cache_file", &self.peer_cache_file)
            .field("nat", &self.nat)
            .field("discovery", &self.discovery)
            .field("hole_punch", &self.hole_punch)
            .field("relay", &self.relay)
            .field("channel", &self.channel)
            .field("tunnel", &self.tunnel)
            .field("peer_cache", &self.peer_cache)
            .finish_non_exhaustive()
    }
}

impl Default for MeshConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:0".parse().expect("literal address"),
            allow_relay_fallback: true,
            force_relay_only: false,
            peer_cache_file: None,
            nat: NatConfig::default(),
            discovery: DiscoveryConfig::default(),
            hole_punch: HolePunchConfig::default(),
            relay: RelayConfig::default(),
            channel: ChannelConfig::default(),
            tunnel: TunnelConfig::default(),
            peer_cache: PeerCacheConfig::default(),
            tunnel_policy: Arc::new(AutoAccept),
        }
    }
}

/// Builder for [`MeshConfig`].
#[derive(Default)]
pub struct MeshConfigBuilder {
    config: MeshConfig,
}

impl std::fmt::Debug for MeshConfigBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MeshConfigBuilder").finish_non_exhaustive()
    }
}

impl MeshConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind_addr(mut self, addr: SocketAddr) -> Self {
        self.config.bind_addr = addr;
        self
    }

    pub fn allow_relay_fallback(mut self, allow: bool) -> Self {
        self.config.allow_relay_fallback = allow;
        self
    }

    pub fn force_relay_only(mut self, force: bool) -> Self {
        self.config.force_relay_only = force;
        self
    }

    pub fn peer_cache_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.peer_cache_file = Some(path.into());
        self
    }

    pub fn bootstrap_peers(mut self, peers: Vec<BootstrapPeer>) -> Self {
        self.config.discovery.bootstrap_peers = peers;
        self
    }

    /// Parse and add bootstrap peers from `peer_id_hex16@host:port` strings
    /// (§6), rejecting the whole batch on the first malformed entry.
    pub fn bootstrap_peer_strings<I, S>(mut self, peers: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for raw in peers {
            let parsed: BootstrapPeer = raw.as_ref().parse().map_err(MeshError::Discovery)?;
            self.config.discovery.bootstrap_peers.push(parsed);
        }
        Ok(self)
    }

    pub fn rendezvous_servers(mut self, servers: Vec<SocketAddr>) -> Self {
        self.config.nat.rendezvous_servers = servers;
        self
    }

    pub fn nat(mut self, nat: NatConfig) -> Self {
        self.config.nat = nat;
        self
    }

    pub fn discovery(mut self, discovery: DiscoveryConfig) -> Self {
        self.config.discovery = discovery;
        self
    }

    pub fn hole_punch(mut self, hole_punch: HolePunchConfig) -> Self {
        self.config.hole_punch = hole_punch;
        self
    }

    pub fn relay(mut self, relay: RelayConfig) -> Self {
        self.config.relay = relay;
        self
    }

    pub fn channel(mut self, channel: ChannelConfig) -> Self {
        self.config.channel = channel;
        self
    }

    pub fn tunnel(mut self, tunnel: TunnelConfig) -> Self {
        self.config.tunnel = tunnel;
        self
    }

    pub fn peer_cache(mut self, peer_cache: PeerCacheConfig) -> Self {
        self.config.peer_cache = peer_cache;
        self
    }

    pub fn tunnel_policy(mut self, policy: Arc<dyn TunnelPolicy>) -> Self {
        self.config.tunnel_policy = policy;
        self
    }

    pub fn build(self) -> MeshConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_bind_to_an_ephemeral_port_and_allow_relay_fallback() {
        let config = MeshConfig::default();
        assert_eq!(config.bind_addr.port(), 0);
        assert!(config.allow_relay_fallback);
        assert!(!config.force_relay_only);
    }

    #[test]
    fn bootstrap_peer_strings_parses_valid_entries() {
        let config = MeshConfigBuilder::new()
            .bootstrap_peer_strings(["aaaaaaaaaaaaaaaa@203.0.113.9:9000"])
            .unwrap()
            .build();
        assert_eq!(config.discovery.bootstrap_peers.len(), 1);
    }

    #[test]
    fn bootstrap_peer_strings_rejects_malformed_entries() {
        let err = MeshConfigBuilder::new()
            .bootstrap_peer_strings(["not-a-bootstrap-string"])
            .unwrap_err();
        assert!(matches!(err, MeshError::Discovery(_)));
    }
}
