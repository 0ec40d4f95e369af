// Copyright (c) 2024 Omerta Mesh Contributors

//! The shapes held in the peer cache.

use mesh_common::{Endpoint, NatType, PeerId};
use mesh_identity::PeerPublicKey;
use serde::{Deserialize, Serialize};

/// How a peer can currently be reached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReachabilityPath {
    /// A direct UDP path, confirmed by an authenticated packet exchange.
    Direct(Endpoint),
    /// Reachable only by relaying through `relay_peer_id` at `relay_endpoint`.
    Relay {
        relay_peer_id: PeerId,
        relay_endpoint: Endpoint,
    },
    /// Reachable via a coordinated hole punch brokered by `coordinator_peer_id`.
    HolePunch { coordinator_peer_id: PeerId },
}

/// One candidate path plus the bookkeeping used to rank and expire it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathEntry {
    pub path: ReachabilityPath,
    /// Unix timestamp (seconds) this path was last confirmed live.
    pub freshness: u64,
    /// Higher is better; direct paths start above hole-punched paths,
    /// which start above relayed paths.
    pub liveness_score: f64,
}

impl PathEntry {
    pub fn new(path: ReachabilityPath, now: u64) -> Self {
        let liveness_score = match &path {
            ReachabilityPath::Direct(_) => 1.0,
            ReachabilityPath::HolePunch { .. } => 0.6,
            ReachabilityPath::Relay { .. } => 0.3,
        };
        Self {
            path,
            freshness: now,
            liveness_score,
        }
    }
}

/// Advertised relay capacity for a peer willing to act as a relay.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RelayCapacity {
    pub max_sessions: u32,
    pub active_sessions: u32,
}

/// Everything the cache knows about one peer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerRecord {
    pub peer_id: PeerId,
    pub public_key: Option<PeerPublicKey>,
    /// Endpoints this peer has been observed at, most recent last.
    pub observed_endpoints: Vec<Endpoint>,
    /// Candidate paths, best-first (see [`PeerRecord::best_path`]).
    pub reachability: Vec<PathEntry>,
    /// Unix timestamp (seconds) of the last authenticated reception from
    /// this peer, or the gossip announcement time if never directly heard
    /// from.
    pub last_seen: u64,
    pub predicted_nat_type: NatType,
    pub relay_capacity: Option<RelayCapacity>,
    pub is_relay_capable: bool,
    /// Whether this peer has advertised willingness to broker hole-punch
    /// attempts between two other peers.
    pub can_coordinate_hole_punch: bool,
    /// Per §4.4: gossip-sourced records start `unverified` and may not be
    /// used as direct-dial targets until an authenticated packet arrives
    /// from the peer's own endpoint.
    pub verified: bool,
}

impl PeerRecord {
    pub fn new_unverified(peer_id: PeerId, endpoint: Endpoint, nat_type: NatType, last_seen: u64) -> Self {
        Self {
            peer_id,
            public_key: None,
            observed_endpoints: vec![endpoint],
            reachability: Vec::new(),
            last_seen,
            predicted_nat_type: nat_type,
            relay_capacity: None,
            is_relay_capable: false,
            can_coordinate_hole_punch: false,
            verified: false,
        }
    }

    /// Re-sort `reachability` best-first by liveness score, highest first.
    pub fn resort_paths(&mut self) {
        self.reachability
            .sort_by(|a, b| b.liveness_score.partial_cmp(&a.liveness_score).unwrap());
    }

    /// The best path, if any, that a verified peer may be dialed on.
    /// Unverified peers never expose a direct path as dialable (§4.4
    /// invariant) even if one happens to be cached.
    pub fn best_path(&self) -> Option<&PathEntry> {
        self.reachability.iter().find(|entry| {
            self.verified || !matches!(entry.path, ReachabilityPath::Direct(_))
        })
    }

    /// Insert or refresh a path, keeping the list best-first.
    pub fn upsert_path(&mut self, path: ReachabilityPath, now: u64) {
        if let Some(existing) = self.reachability.iter_mut().find(|e| e.path == path) {
            existing.freshness = now;
        } else {
            self.reachability.push(PathEntry::new(path, now));
        }
        self.resort_paths();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn peer_id() -> PeerId {
        PeerId::from_hex("aaaaaaaaaaaaaaaa").unwrap()
    }

    #[test]
    fn unverified_record_hides_direct_path() {
        let mut record = PeerRecord::new_unverified(
            peer_id(),
            Endpoint::from_str("203.0.113.5:9000").unwrap(),
            NatType::Unknown,
            1000,
        );
        record.upsert_path(
            ReachabilityPath::Direct(Endpoint::from_str("203.0.113.5:9000").unwrap()),
            1000,
        );
        assert!(record.best_path().is_none());
    }

    #[test]
    fn verified_record_prefers_direct_over_relay() {
        let mut record = PeerRecord::new_unverified(
            peer_id(),
            Endpoint::from_str("203.0.113.5:9000").unwrap(),
            NatType::Unknown,
            1000,
        );
        record.verified = true;
        record.upsert_path(
            ReachabilityPath::Relay {
                relay_peer_id: peer_id(),
                relay_endpoint: Endpoint::from_str("203.0.113.9:9000").unwrap(),
            },
            1000,
        );
        record.upsert_path(
            ReachabilityPath::Direct(Endpoint::from_str("203.0.113.5:9000").unwrap()),
            1000,
        );
        assert!(matches!(
            record.best_path().unwrap().path,
            ReachabilityPath::Direct(_)
        ));
    }
}
