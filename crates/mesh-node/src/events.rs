// Copyright (c) 2024 Omerta Mesh Contributors

//! The node's lifecycle event stream (§6), matching the
//! `GossipEvent`/`GossipCommand` handle pattern: a tagged enum pushed
//! through an `mpsc` channel to every subscriber.

use mesh_common::{Endpoint, NatType, PeerId};
use std::time::Duration;

/// One lifecycle event surfaced through [`crate::node::MeshNode::events`].
#[derive(Debug, Clone)]
pub enum MeshEvent {
    /// The node finished startup and is ready to serve requests.
    Started,
    /// NAT classification completed or was refreshed.
    NatDetected { nat_type: NatType, public_endpoint: Option<Endpoint> },
    /// A new peer was learned, either from bootstrap or gossip.
    PeerDiscovered { peer_id: PeerId },
    /// A hole-punch attempt to `peer_id` began.
    HolePunchStarted { peer_id: PeerId },
    /// A hole-punch attempt to `peer_id` produced a direct path.
    HolePunchSucceeded { peer_id: PeerId, rtt: Duration },
    /// A hole-punch attempt to `peer_id` failed.
    HolePunchFailed { peer_id: PeerId, reason: String },
    /// A reachability path to `peer_id` was confirmed usable.
    PeerConnected { peer_id: PeerId },
    /// The last known path to `peer_id` was lost.
    PeerDisconnected { peer_id: PeerId },
    /// A recoverable condition worth surfacing (dropped datagram, relay
    /// churn, stale record purge).
    Warning { message: String },
    /// An error the caller's intent could not route around.
    Error { message: String },
}
