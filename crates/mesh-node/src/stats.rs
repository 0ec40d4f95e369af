// Copyright (c) 2024 Omerta Mesh Contributors

//! The node-wide statistics snapshot, matching `bth_gossip::store::PeerStoreStats`:
//! a plain, `Default`-derived struct of counters returned by value.

use mesh_channel::ChannelStats;
use mesh_net::TransportStats;
use mesh_peercache::PeerCacheStats;
use mesh_relay::RelayManagerStats;
use mesh_session::TunnelManagerStats;

/// Snapshot of every collaborator's counters plus node-level rollups,
/// returned by [`crate::node::MeshNode::statistics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MeshStatistics {
    pub transport: TransportStats,
    pub peer_cache: PeerCacheStats,
    pub relay: RelayManagerStats,
    pub channel: ChannelStats,
    pub tunnel: TunnelManagerStats,
    /// Peers currently reachable over a confirmed direct (not hole-punched,
    /// not relayed) path (§8 scenario 1's `direct_connections`).
    pub direct_connections: usize,
    /// Open relay sessions this node is a party to (§8 scenario 3's
    /// `relay_session_count`).
    pub relay_session_count: usize,
    /// Inbound datagrams that failed to authenticate under any known
    /// network key (§4.2, §2b: "metrics counters for dropped/undecryptable
    /// datagrams").
    pub undecryptable_datagrams: u64,
    /// Inbound datagrams whose frame tag was not recognized, or that
    /// otherwise could not be routed to a collaborator.
    pub dropped_datagrams: u64,
}
