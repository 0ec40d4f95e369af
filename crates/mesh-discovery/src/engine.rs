// Copyright (c) 2024 Omerta Mesh Contributors

//! The discovery actor: bootstraps against configured peers, runs the
//! periodic ping/gossip round, and folds inbound ping/pong/endpoint-report
//! frames back into the shared peer cache.

use crate::bootstrap::BootstrapPeer;
use crate::config::DiscoveryConfig;
use mesh_common::{Endpoint, NatType, PeerId};
use mesh_crypto::CryptoEnvelope;
use mesh_net::TransportHandle;
use mesh_peercache::PeerCache;
use mesh_wire::Frame;
use rand::seq::SliceRandom;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::mpsc;
use tracing::{debug, trace};

fn now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Events surfaced to `mesh-node`'s public event stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryEvent {
    PeerDiscovered(PeerId),
    EndpointLearned(Endpoint),
}

enum Command {
    BootstrapNow,
    DiscoverNow,
    /// A decoded frame addressed to discovery, forwarded by the node's
    /// frame router after envelope authentication.
    Inbound { from: SocketAddr, frame: Frame },
}

/// Handle to the running discovery engine.
#[derive(Clone)]
pub struct DiscoveryHandle {
    commands: mpsc::Sender<Command>,
    rounds_run: Arc<AtomicU32>,
}

impl DiscoveryHandle {
    /// Ping every configured bootstrap peer immediately.
    pub async fn bootstrap_now(&self) {
        let _ = self.commands.send(Command::BootstrapNow).await;
    }

    /// Trigger an immediate discovery round outside the regular interval
    /// (the node's public `discover_peers()` surface).
    pub async fn discover_now(&self) {
        let _ = self.commands.send(Command::DiscoverNow).await;
    }

    /// Hand a decoded frame to discovery for processing.
    pub async fn handle_frame(&self, from: SocketAddr, frame: Frame) {
        let _ = self.commands.send(Command::Inbound { from, frame }).await;
    }

    /// Number of discovery rounds completed, for tests and diagnostics.
    pub fn rounds_run(&self) -> u32 {
        self.rounds_run.load(Ordering::Relaxed)
    }
}

/// Spawn the discovery engine.
pub fn spawn(
    config: DiscoveryConfig,
    local_peer_id: PeerId,
    local_nat_type: Arc<RwLock<NatType>>,
    transport: TransportHandle,
    envelope: Arc<CryptoEnvelope>,
    peer_cache: Arc<PeerCache>,
) -> (DiscoveryHandle, mpsc::Receiver<DiscoveryEvent>) {
    let (command_tx, command_rx) = mpsc::channel(64);
    let (event_tx, event_rx) = mpsc::channel(64);
    let rounds_run = Arc::new(AtomicU32::new(0));

    tokio::spawn(run(
        config,
        local_peer_id,
        local_nat_type,
        transport,
        envelope,
        peer_cache,
        command_rx,
        event_tx,
        rounds_run.clone(),
    ));

    (
        DiscoveryHandle {
            commands: command_tx,
            rounds_run,
        },
        event_rx,
    )
}

#[allow(clippy::too_many_arguments)]
async fn run(
    config: DiscoveryConfig,
    local_peer_id: PeerId,
    local_nat_type: Arc<RwLock<NatType>>,
    transport: TransportHandle,
    envelope: Arc<CryptoEnvelope>,
    peer_cache: Arc<PeerCache>,
    mut commands: mpsc::Receiver<Command>,
    events: mpsc::Sender<DiscoveryEvent>,
    rounds_run: Arc<AtomicU32>,
) {
    for peer in &config.bootstrap_peers {
        peer_cache.insert_bootstrap(peer.peer_id, peer.endpoint, now());
    }

    let mut interval = tokio::time::interval(config.ping_interval);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                discover_round(&config, local_peer_id, &local_nat_type, &transport, &envelope, &peer_cache).await;
                rounds_run.fetch_add(1, Ordering::Relaxed);
            }
            command = commands.recv() => {
                let Some(command) = command else { return };
                match command {
                    Command::BootstrapNow => bootstrap_round(local_peer_id, &local_nat_type, &transport, &envelope, &peer_cache, &config.bootstrap_peers).await,
                    Command::DiscoverNow => {
                        discover_round(&config, local_peer_id, &local_nat_type, &transport, &envelope, &peer_cache).await;
                        rounds_run.fetch_add(1, Ordering::Relaxed);
                    }
                    Command::Inbound { from, frame } => {
                        handle_inbound(local_peer_id, &local_nat_type, &transport, &envelope, &peer_cache, &events, from, frame).await;
                    }
                }
            }
        }
    }
}

async fn bootstrap_round(
    local_peer_id: PeerId,
    local_nat_type: &Arc<RwLock<NatType>>,
    transport: &TransportHandle,
    envelope: &CryptoEnvelope,
    peer_cache: &PeerCache,
    bootstrap_peers: &[BootstrapPeer],
) {
    let my_nat_type = *local_nat_type.read().unwrap();
    let frame = Frame::Ping {
        sender_peer_id: local_peer_id,
        recent_peers: peer_cache.gossip_sample(),
        my_nat_type,
    };
    let Ok(datagram) = envelope.seal(&frame) else {
        return;
    };
    for peer in peer_cache_bootstrap_targets(bootstrap_peers) {
        trace!(peer_id = %peer.0, endpoint = %peer.1, "bootstrap ping");
        let _ = transport.send_to(peer.1.into(), datagram.clone()).await;
    }
}

/// The configured `peer_id@endpoint` bootstrap list, per §4.4: "on
/// startup it pings each" configured bootstrap peer. Unlike the periodic
/// gossip round, this must always cover every configured peer regardless
/// of how many entries the cache holds or how fresh they look.
fn peer_cache_bootstrap_targets(bootstrap_peers: &[BootstrapPeer]) -> Vec<(PeerId, Endpoint)> {
    bootstrap_peers.iter().map(|p| (p.peer_id, p.endpoint)).collect()
}

async fn discover_round(
    config: &DiscoveryConfig,
    local_peer_id: PeerId,
    local_nat_type: &Arc<RwLock<NatType>>,
    transport: &TransportHandle,
    envelope: &CryptoEnvelope,
    peer_cache: &PeerCache,
) {
    peer_cache.purge_stale(now());

    let my_nat_type = *local_nat_type.read().unwrap();
    let sample = peer_cache.gossip_sample();
    let frame = Frame::Ping {
        sender_peer_id: local_peer_id,
        recent_peers: sample.clone(),
        my_nat_type,
    };
    let Ok(datagram) = envelope.seal(&frame) else {
        return;
    };

    let mut targets = sample;
    targets.shuffle(&mut rand::thread_rng());
    targets.truncate(config.fanout);

    for target in targets {
        debug!(peer_id = %target.peer_id, "discovery ping");
        let _ = transport
            .send_to(target.last_known_endpoint.into(), datagram.clone())
            .await;
    }
}

#[allow(clippy::too_many_arguments)]
async fn handle_inbound(
    local_peer_id: PeerId,
    local_nat_type: &Arc<RwLock<NatType>>,
    transport: &TransportHandle,
    envelope: &CryptoEnvelope,
    peer_cache: &PeerCache,
    events: &mpsc::Sender<DiscoveryEvent>,
    from: SocketAddr,
    frame: Frame,
) {
    match frame {
        Frame::Ping {
            sender_peer_id,
            recent_peers,
            my_nat_type: _,
        } => {
            let is_new = !peer_cache_contains(peer_cache, sender_peer_id);
            peer_cache.touch(sender_peer_id, from.into(), now());
            for entry in &recent_peers {
                if entry.peer_id != local_peer_id && peer_cache.merge_gossip(entry) {
                    let _ = events
                        .send(DiscoveryEvent::PeerDiscovered(entry.peer_id))
                        .await;
                }
            }
            if is_new {
                let _ = events
                    .send(DiscoveryEvent::PeerDiscovered(sender_peer_id))
                    .await;
            }

            let my_nat = *local_nat_type.read().unwrap();
            let pong = Frame::Pong {
                sender_peer_id: local_peer_id,
                mapped_endpoint: from.into(),
                recent_peers: peer_cache.gossip_sample(),
                observed_nat_type: my_nat,
            };
            if let Ok(datagram) = envelope.seal(&pong) {
                let _ = transport.send_to(from, datagram).await;
            }
        }
        Frame::Pong {
            sender_peer_id,
            mapped_endpoint,
            recent_peers,
            observed_nat_type: _,
        } => {
            let is_new = !peer_cache_contains(peer_cache, sender_peer_id);
            peer_cache.touch(sender_peer_id, from.into(), now());
            for entry in &recent_peers {
                if entry.peer_id != local_peer_id && peer_cache.merge_gossip(entry) {
                    let _ = events
                        .send(DiscoveryEvent::PeerDiscovered(entry.peer_id))
                        .await;
                }
            }
            if is_new {
                let _ = events
                    .send(DiscoveryEvent::PeerDiscovered(sender_peer_id))
                    .await;
            }
            let _ = events
                .send(DiscoveryEvent::EndpointLearned(mapped_endpoint))
                .await;
        }
        Frame::EndpointReport {
            sender_peer_id,
            endpoint,
        } => {
            peer_cache.touch(sender_peer_id, endpoint, now());
        }
        _ => {}
    }
}

fn peer_cache_contains(peer_cache: &PeerCache, peer_id: PeerId) -> bool {
    peer_cache.get(&peer_id).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;
    use mesh_crypto::NetworkKey;
    use mesh_peercache::PeerCacheConfig;
    use std::str::FromStr;

    async fn new_transport() -> TransportHandle {
        mesh_net::spawn("127.0.0.1:0".parse().unwrap(), 32).await.unwrap().0
    }

    #[tokio::test]
    async fn bootstrap_ping_reaches_the_configured_peer() {
        let network_key = NetworkKey::from_bytes([9u8; 32]);
        let envelope_a = Arc::new(CryptoEnvelope::new(&network_key));
        let envelope_b = Arc::new(CryptoEnvelope::new(&network_key));

        let transport_a = new_transport().await;
        let (transport_b, mut inbound_b) = mesh_net::spawn("127.0.0.1:0".parse().unwrap(), 32)
            .await
            .unwrap();

        let peer_cache_a = PeerCache::shared(PeerCacheConfig::default());
        let bootstrap = crate::bootstrap::BootstrapPeer {
            peer_id: PeerId::from_bytes([2u8; 8]),
            endpoint: Endpoint::from_str(&transport_b.local_addr().to_string()).unwrap(),
        };
        let config = DiscoveryConfig {
            bootstrap_peers: vec![bootstrap],
            ..Default::default()
        };

        let local_peer_id = PeerId::from_bytes([1u8; 8]);
        let nat_type = Arc::new(RwLock::new(NatType::Public));
        let (handle, _events) = spawn(
            config,
            local_peer_id,
            nat_type,
            transport_a,
            envelope_a,
            peer_cache_a,
        );
        handle.bootstrap_now().await;

        let datagram = tokio::time::timeout(std::time::Duration::from_secs(1), inbound_b.recv())
            .await
            .unwrap()
            .unwrap();
        let (header, ciphertext) = mesh_wire::EnvelopeHeader::parse(&datagram.bytes).unwrap();
        let frame = envelope_b.open(&header, ciphertext).unwrap();
        assert!(matches!(frame, Frame::Ping { sender_peer_id, .. } if sender_peer_id == local_peer_id));
    }

    /// A bootstrap peer must be pinged even when the cache already holds
    /// more (fresher) entries than `max_gossip_entries`, since bootstrap
    /// targets come from the configured list, not the gossip sample.
    #[tokio::test]
    async fn bootstrap_ping_reaches_its_target_even_when_the_gossip_sample_is_full() {
        let network_key = NetworkKey::from_bytes([13u8; 32]);
        let envelope_a = Arc::new(CryptoEnvelope::new(&network_key));
        let envelope_b = Arc::new(CryptoEnvelope::new(&network_key));

        let transport_a = new_transport().await;
        let (transport_b, mut inbound_b) = mesh_net::spawn("127.0.0.1:0".parse().unwrap(), 32)
            .await
            .unwrap();

        let peer_cache_a = PeerCache::shared(PeerCacheConfig::default());
        // Fill the cache well past `max_gossip_entries` (16) with peers
        // fresher than the bootstrap peer, so it would be excluded from
        // `gossip_sample()`.
        for tag in 100u8..130u8 {
            peer_cache_a.touch(
                PeerId::from_bytes([tag; 8]),
                Endpoint::from_str("203.0.113.1:9000").unwrap(),
                now() + 1000,
            );
        }

        let bootstrap = crate::bootstrap::BootstrapPeer {
            peer_id: PeerId::from_bytes([2u8; 8]),
            endpoint: Endpoint::from_str(&transport_b.local_addr().to_string()).unwrap(),
        };
        let config = DiscoveryConfig {
            bootstrap_peers: vec![bootstrap],
            ..Default::default()
        };

        let local_peer_id = PeerId::from_bytes([1u8; 8]);
        let nat_type = Arc::new(RwLock::new(NatType::Public));
        let (handle, _events) = spawn(
            config,
            local_peer_id,
            nat_type,
            transport_a,
            envelope_a,
            peer_cache_a,
        );
        handle.bootstrap_now().await;

        let datagram = tokio::time::timeout(std::time::Duration::from_secs(1), inbound_b.recv())
            .await
            .unwrap()
            .unwrap();
        let (header, ciphertext) = mesh_wire::EnvelopeHeader::parse(&datagram.bytes).unwrap();
        let frame = envelope_b.open(&header, ciphertext).unwrap();
        assert!(matches!(frame, Frame::Ping { sender_peer_id, .. } if sender_peer_id == local_peer_id));
    }
}
