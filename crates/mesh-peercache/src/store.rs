// Copyright (c) 2024 Omerta Mesh Contributors

//! The peer cache: an authoritative, in-memory map of every peer this node
//! currently knows about, shared by reference across every component that
//! needs to look up a reachability path.

use crate::config::PeerCacheConfig;
use crate::error::{PeerCacheError, Result};
use crate::record::{PathEntry, PeerRecord, ReachabilityPath, RelayCapacity};
use mesh_common::{Endpoint, NatType, PeerId};
use mesh_wire::GossipEntry;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, RwLock};

/// Point-in-time counters describing the cache's contents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PeerCacheStats {
    pub total_peers: usize,
    pub verified_peers: usize,
    pub relay_capable_peers: usize,
    pub oldest_last_seen: u64,
    pub newest_last_seen: u64,
}

/// One row of the opportunistic warm-start peer cache file (§6): `peer_id
/// → {endpoint, nat_type, last_seen}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct WarmStartEntry {
    endpoint: Endpoint,
    nat_type: NatType,
    last_seen: u64,
}

/// Thread-safe store of [`PeerRecord`]s. Reads are lock-free with respect to
/// other readers; writers serialize (§5: "RwLock-style structures: many
/// concurrent readers, writers serialize").
#[derive(Debug)]
pub struct PeerCache {
    config: PeerCacheConfig,
    peers: RwLock<HashMap<PeerId, PeerRecord>>,
}

impl PeerCache {
    pub fn new(config: PeerCacheConfig) -> Self {
        Self {
            config,
            peers: RwLock::new(HashMap::new()),
        }
    }

    pub fn shared(config: PeerCacheConfig) -> Arc<Self> {
        Arc::new(Self::new(config))
    }

    /// Record a peer we are about to dial directly (a configured bootstrap
    /// peer). Not yet `verified`; becomes so the first time [`Self::touch`]
    /// observes an authenticated reception from it.
    pub fn insert_bootstrap(&self, peer_id: PeerId, endpoint: Endpoint, now: u64) {
        let mut peers = self.peers.write().unwrap();
        peers
            .entry(peer_id)
            .or_insert_with(|| PeerRecord::new_unverified(peer_id, endpoint, NatType::Unknown, now));
    }

    /// Mark `peer_id` verified and refresh its direct path, called whenever
    /// a packet from it authenticates under the network key.
    pub fn touch(&self, peer_id: PeerId, endpoint: Endpoint, now: u64) {
        let mut peers = self.peers.write().unwrap();
        let record = peers
            .entry(peer_id)
            .or_insert_with(|| PeerRecord::new_unverified(peer_id, endpoint, NatType::Unknown, now));
        record.verified = true;
        record.last_seen = now;
        if record.observed_endpoints.last() != Some(&endpoint) {
            record.observed_endpoints.push(endpoint);
        }
        record.upsert_path(ReachabilityPath::Direct(endpoint), now);
    }

    /// Install a non-direct path (hole-punched or relayed) for a peer that
    /// must already be known.
    pub fn upsert_path(&self, peer_id: PeerId, path: ReachabilityPath, now: u64) {
        let mut peers = self.peers.write().unwrap();
        if let Some(record) = peers.get_mut(&peer_id) {
            record.upsert_path(path, now);
        }
    }

    /// Record whether `peer_id` advertises willingness to broker
    /// hole-punch attempts between two other peers.
    pub fn set_hole_punch_coordinator(&self, peer_id: PeerId, can_coordinate: bool) {
        let mut peers = self.peers.write().unwrap();
        if let Some(record) = peers.get_mut(&peer_id) {
            record.can_coordinate_hole_punch = can_coordinate;
        }
    }

    /// Record `peer_id`'s advertised relay capacity and mark it
    /// relay-capable. A peer with no recorded capacity is never returned by
    /// [`PeerCache::relay_capable_peers`].
    pub fn set_relay_capacity(&self, peer_id: PeerId, capacity: RelayCapacity) {
        let mut peers = self.peers.write().unwrap();
        if let Some(record) = peers.get_mut(&peer_id) {
            record.is_relay_capable = true;
            record.relay_capacity = Some(capacity);
        }
    }

    /// Merge one gossiped announcement: add if unknown, otherwise update
    /// only if strictly newer (§4.4). New entries are `unverified`.
    pub fn merge_gossip(&self, entry: &GossipEntry) -> bool {
        let mut peers = self.peers.write().unwrap();
        match peers.get_mut(&entry.peer_id) {
            Some(existing) => {
                if entry.last_seen <= existing.last_seen {
                    return false;
                }
                existing.last_seen = entry.last_seen;
                existing.predicted_nat_type = entry.nat_type;
                if existing.observed_endpoints.last() != Some(&entry.last_known_endpoint) {
                    existing
                        .observed_endpoints
                        .push(entry.last_known_endpoint.clone());
                }
                true
            }
            None => {
                if peers.len() >= self.config.max_peers {
                    evict_oldest(&mut peers);
                }
                peers.insert(
                    entry.peer_id,
                    PeerRecord::new_unverified(
                        entry.peer_id,
                        entry.last_known_endpoint.clone(),
                        entry.nat_type,
                        entry.last_seen,
                    ),
                );
                true
            }
        }
    }

    /// A snapshot of one peer's record.
    pub fn get(&self, peer_id: &PeerId) -> Option<PeerRecord> {
        self.peers.read().unwrap().get(peer_id).cloned()
    }

    /// The peer, if any, whose most recently observed endpoint is
    /// `endpoint`. Used to attribute an inbound direct datagram to a
    /// `PeerId` from its source address.
    pub fn peer_id_for_endpoint(&self, endpoint: &Endpoint) -> Option<PeerId> {
        self.peers
            .read()
            .unwrap()
            .values()
            .find(|r| r.observed_endpoints.last() == Some(endpoint))
            .map(|r| r.peer_id)
    }

    /// Up to `config.max_gossip_entries` recent, verified-or-not entries
    /// suitable for inclusion in an outgoing `ping`/`pong` gossip payload.
    pub fn gossip_sample(&self) -> Vec<GossipEntry> {
        let peers = self.peers.read().unwrap();
        let mut entries: Vec<_> = peers
            .values()
            .filter_map(|record| {
                record.observed_endpoints.last().map(|endpoint| GossipEntry {
                    peer_id: record.peer_id,
                    last_known_endpoint: endpoint.clone(),
                    nat_type: record.predicted_nat_type,
                    last_seen: record.last_seen,
                })
            })
            .collect();
        entries.sort_by(|a, b| b.last_seen.cmp(&a.last_seen));
        entries.truncate(self.config.max_gossip_entries);
        entries
    }

    /// Peers that advertise relay capability, for the relay selector.
    pub fn relay_capable_peers(&self) -> Vec<PeerRecord> {
        self.peers
            .read()
            .unwrap()
            .values()
            .filter(|r| r.is_relay_capable)
            .cloned()
            .collect()
    }

    /// Every peer id currently held, for `mesh-node`'s `known_peers()`
    /// surface.
    pub fn all_peer_ids(&self) -> Vec<PeerId> {
        self.peers.read().unwrap().keys().copied().collect()
    }

    /// Peers currently reachable over a confirmed direct path (§8
    /// scenario 1's `direct_connections`).
    pub fn direct_peers(&self) -> Vec<PeerRecord> {
        self.peers
            .read()
            .unwrap()
            .values()
            .filter(|r| r.reachability.iter().any(|p| matches!(p.path, ReachabilityPath::Direct(_))))
            .cloned()
            .collect()
    }

    /// Verified peers willing to broker a hole-punch between two others.
    pub fn hole_punch_coordinators(&self) -> Vec<PeerRecord> {
        self.peers
            .read()
            .unwrap()
            .values()
            .filter(|r| r.can_coordinate_hole_punch && r.verified)
            .cloned()
            .collect()
    }

    /// Remove records untouched for longer than `freshness_ttl_secs`.
    /// Called opportunistically on access per the cache's staleness
    /// invariant (§3: "stale records are purged on access").
    pub fn purge_stale(&self, now: u64) -> usize {
        let mut peers = self.peers.write().unwrap();
        let ttl = self.config.freshness_ttl_secs;
        let before = peers.len();
        peers.retain(|_, record| now.saturating_sub(record.last_seen) <= ttl);
        before - peers.len()
    }

    pub fn stats(&self) -> PeerCacheStats {
        let peers = self.peers.read().unwrap();
        let mut stats = PeerCacheStats {
            total_peers: peers.len(),
            ..Default::default()
        };
        for record in peers.values() {
            if record.verified {
                stats.verified_peers += 1;
            }
            if record.is_relay_capable {
                stats.relay_capable_peers += 1;
            }
            if stats.oldest_last_seen == 0 || record.last_seen < stats.oldest_last_seen {
                stats.oldest_last_seen = record.last_seen;
            }
            stats.newest_last_seen = stats.newest_last_seen.max(record.last_seen);
        }
        stats
    }

    pub fn len(&self) -> usize {
        self.peers.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Persist a warm-start snapshot to `path` (§6 peer cache file).
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let peers = self.peers.read().unwrap();
        let snapshot: HashMap<String, WarmStartEntry> = peers
            .values()
            .filter_map(|record| {
                record.observed_endpoints.last().map(|endpoint| {
                    (
                        record.peer_id.to_string(),
                        WarmStartEntry {
                            endpoint: endpoint.clone(),
                            nat_type: record.predicted_nat_type,
                            last_seen: record.last_seen,
                        },
                    )
                })
            })
            .collect();
        let json = serde_json::to_vec_pretty(&snapshot).map_err(PeerCacheError::Malformed)?;
        let path = path.as_ref();
        std::fs::write(path, json)
            .map_err(|e| PeerCacheError::WriteFile(path.display().to_string(), e))
    }

    /// Load a warm-start snapshot. Per §6, every loaded entry is always
    /// re-validated: it is inserted `unverified` regardless of what the
    /// file said, so a stale or tampered cache file can only ever suggest
    /// hole-punch candidates, never a trusted direct-dial target.
    pub fn load_from_file(&self, path: impl AsRef<Path>, now: u64) -> Result<usize> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)
            .map_err(|e| PeerCacheError::ReadFile(path.display().to_string(), e))?;
        let snapshot: HashMap<String, WarmStartEntry> =
            serde_json::from_slice(&bytes).map_err(PeerCacheError::Malformed)?;

        let mut peers = self.peers.write().unwrap();
        let mut loaded = 0;
        for (peer_id_hex, entry) in snapshot {
            let Ok(peer_id) = peer_id_hex.parse::<PeerId>() else {
                continue;
            };
            peers.entry(peer_id).or_insert_with(|| {
                loaded += 1;
                PeerRecord::new_unverified(peer_id, entry.endpoint, entry.nat_type, now.min(entry.last_seen))
            });
        }
        Ok(loaded)
    }
}

fn evict_oldest(peers: &mut HashMap<PeerId, PeerRecord>) {
    if let Some(oldest) = peers
        .values()
        .min_by_key(|r| r.last_seen)
        .map(|r| r.peer_id)
    {
        peers.remove(&oldest);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn peer_id(tag: u8) -> PeerId {
        PeerId::from_bytes([tag; 8])
    }

    fn endpoint() -> Endpoint {
        Endpoint::from_str("203.0.113.5:9000").unwrap()
    }

    #[test]
    fn touch_marks_a_peer_verified_with_a_direct_path() {
        let cache = PeerCache::new(PeerCacheConfig::default());
        cache.touch(peer_id(1), endpoint(), 1000);
        let record = cache.get(&peer_id(1)).unwrap();
        assert!(record.verified);
        assert!(record.best_path().is_some());
    }

    #[test]
    fn peer_id_for_endpoint_finds_the_owning_peer() {
        let cache = PeerCache::new(PeerCacheConfig::default());
        cache.touch(peer_id(1), endpoint(), 1000);
        assert_eq!(cache.peer_id_for_endpoint(&endpoint()), Some(peer_id(1)));

        let other = Endpoint::from_str("203.0.113.9:9000").unwrap();
        assert_eq!(cache.peer_id_for_endpoint(&other), None);
    }

    #[test]
    fn gossip_merge_rejects_stale_updates() {
        let cache = PeerCache::new(PeerCacheConfig::default());
        let entry = GossipEntry {
            peer_id: peer_id(2),
            last_known_endpoint: endpoint(),
            nat_type: NatType::Public,
            last_seen: 2000,
        };
        assert!(cache.merge_gossip(&entry));

        let stale = GossipEntry {
            last_seen: 1000,
            ..entry.clone()
        };
        assert!(!cache.merge_gossip(&stale));
        assert_eq!(cache.get(&peer_id(2)).unwrap().last_seen, 2000);

        let fresher = GossipEntry {
            last_seen: 3000,
            ..entry
        };
        assert!(cache.merge_gossip(&fresher));
        assert_eq!(cache.get(&peer_id(2)).unwrap().last_seen, 3000);
    }

    #[test]
    fn gossiped_peers_stay_unverified() {
        let cache = PeerCache::new(PeerCacheConfig::default());
        cache.merge_gossip(&GossipEntry {
            peer_id: peer_id(3),
            last_known_endpoint: endpoint(),
            nat_type: NatType::Public,
            last_seen: 1000,
        });
        assert!(!cache.get(&peer_id(3)).unwrap().verified);
    }

    #[test]
    fn purge_stale_removes_old_entries_only() {
        let cache = PeerCache::new(PeerCacheConfig {
            freshness_ttl_secs: 100,
            ..Default::default()
        });
        cache.touch(peer_id(4), endpoint(), 100);
        cache.touch(peer_id(5), endpoint(), 900);
        let removed = cache.purge_stale(1000);
        assert_eq!(removed, 1);
        assert!(cache.get(&peer_id(4)).is_none());
        assert!(cache.get(&peer_id(5)).is_some());
    }

    #[test]
    fn hole_punch_coordinators_excludes_unverified_candidates() {
        let cache = PeerCache::new(PeerCacheConfig::default());
        cache.touch(peer_id(7), endpoint(), 1000);
        cache.merge_gossip(&GossipEntry {
            peer_id: peer_id(8),
            last_known_endpoint: endpoint(),
            nat_type: NatType::Public,
            last_seen: 1000,
        });
        cache.set_hole_punch_coordinator(peer_id(7), true);
        cache.set_hole_punch_coordinator(peer_id(8), true);
        let coordinators = cache.hole_punch_coordinators();
        assert_eq!(coordinators.len(), 1);
        assert_eq!(coordinators[0].peer_id, peer_id(7));
    }

    #[test]
    fn save_and_load_round_trip_as_unverified() {
        let cache = PeerCache::new(PeerCacheConfig::default());
        cache.touch(peer_id(6), endpoint(), 1000);
        assert!(cache.get(&peer_id(6)).unwrap().verified);

        let dir = std::env::temp_dir().join(format!("omerta-peercache-test-{}", std::process::id()));
        cache.save_to_file(&dir).unwrap();

        let restored = PeerCache::new(PeerCacheConfig::default());
        let loaded = restored.load_from_file(&dir, 1500).unwrap();
        assert_eq!(loaded, 1);
        assert!(!restored.get(&peer_id(6)).unwrap().verified);

        std::fs::remove_file(&dir).ok();
    }
}
