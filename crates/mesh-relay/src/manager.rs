// Copyright (c) 2024 Omerta Mesh Contributors

//! The relay manager actor: maintains a pool of live relay connections,
//! heartbeats them, and brokers relay sessions on behalf of the local node
//! (§4.6-4.7).

use crate::candidate::RelayCandidate;
use crate::config::RelayConfig;
use crate::connection::RelayConnection;
use crate::error::{RelayError, Result};
use crate::session::{RelaySessionManager, SessionRole};
use mesh_common::{Endpoint, NatType, PeerId};
use mesh_crypto::CryptoEnvelope;
use mesh_net::TransportHandle;
use mesh_peercache::PeerCache;
use mesh_wire::{Frame, RelayDenyReason};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};
use uuid::Uuid;

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Point-in-time snapshot of the relay manager's pool.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayManagerStats {
    pub live_connections: usize,
    pub healthy_connections: usize,
    pub endpoint_sessions: usize,
    pub forwarder_sessions: usize,
}

/// `relay_data` addressed to an open session this node is the endpoint
/// for, handed upward rather than forwarded (§4.7: forwarding only
/// applies when this node is the relay, not a party to the session).
#[derive(Debug, Clone)]
pub struct RelayDataEvent {
    pub session_id: Uuid,
    pub from_peer_id: PeerId,
    pub bytes: Vec<u8>,
}

enum Command {
    RequestSession {
        target_peer_id: PeerId,
        reply: oneshot::Sender<Result<Uuid>>,
    },
    SendData {
        session_id: Uuid,
        bytes: Vec<u8>,
        reply: oneshot::Sender<Result<()>>,
    },
    EndSession {
        session_id: Uuid,
    },
    Inbound {
        from: SocketAddr,
        frame: Frame,
    },
    Tick,
    Stats {
        reply: oneshot::Sender<RelayManagerStats>,
    },
}

/// Handle to the running relay manager.
#[derive(Clone)]
pub struct RelayHandle {
    commands: mpsc::Sender<Command>,
    sessions: Arc<RelaySessionManager>,
}

impl RelayHandle {
    /// Ask the best currently-connected relay to broker a session to
    /// `target_peer_id`.
    pub async fn request_session(&self, target_peer_id: PeerId) -> Result<Uuid> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(Command::RequestSession { target_peer_id, reply })
            .await
            .map_err(|_| RelayError::Closed)?;
        rx.await.map_err(|_| RelayError::Closed)?
    }

    /// Forward `bytes` over an already-open relay session.
    pub async fn send_data(&self, session_id: Uuid, bytes: Vec<u8>) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(Command::SendData { session_id, bytes, reply })
            .await
            .map_err(|_| RelayError::Closed)?;
        rx.await.map_err(|_| RelayError::Closed)?
    }

    pub async fn end_session(&self, session_id: Uuid) {
        let _ = self.commands.send(Command::EndSession { session_id }).await;
    }

    /// Hand a decoded frame to the manager for processing.
    pub async fn handle_frame(&self, from: SocketAddr, frame: Frame) {
        let _ = self.commands.send(Command::Inbound { from, frame }).await;
    }

    pub async fn stats(&self) -> RelayManagerStats {
        let (reply, rx) = oneshot::channel();
        if self.commands.send(Command::Stats { reply }).await.is_err() {
            return RelayManagerStats::default();
        }
        rx.await.unwrap_or_default()
    }

    /// Live count of sessions this node forwards as the relay, for another
    /// local component (e.g. a future admission check) to read directly
    /// without a round trip through the actor.
    pub fn forwarder_session_count(&self) -> usize {
        self.sessions.stats().forwarder_sessions
    }
}

/// Spawn the relay manager. `local_nat_type` drives `needs_relay`: a node
/// behind a symmetric or unknown NAT eagerly fills its connection pool on
/// startup rather than waiting for a direct-dial failure (§4.6).
pub fn spawn(
    config: RelayConfig,
    local_peer_id: PeerId,
    local_nat_type: NatType,
    transport: TransportHandle,
    envelope: Arc<CryptoEnvelope>,
    peer_cache: Arc<PeerCache>,
) -> (RelayHandle, mpsc::Receiver<RelayDataEvent>) {
    let (command_tx, command_rx) = mpsc::channel(128);
    let (events_tx, events_rx) = mpsc::channel(128);
    let sessions = RelaySessionManager::shared();
    tokio::spawn(run(
        config,
        local_peer_id,
        local_nat_type,
        transport,
        envelope,
        peer_cache,
        sessions.clone(),
        command_rx,
        command_tx.clone(),
        events_tx,
    ));
    (
        RelayHandle {
            commands: command_tx,
            sessions,
        },
        events_rx,
    )
}

#[allow(clippy::too_many_arguments)]
async fn run(
    config: RelayConfig,
    local_peer_id: PeerId,
    local_nat_type: NatType,
    transport: TransportHandle,
    envelope: Arc<CryptoEnvelope>,
    peer_cache: Arc<PeerCache>,
    sessions: Arc<RelaySessionManager>,
    mut commands: mpsc::Receiver<Command>,
    self_tx: mpsc::Sender<Command>,
    events: mpsc::Sender<RelayDataEvent>,
) {
    let mut connections: HashMap<PeerId, RelayConnection> = HashMap::new();
    let mut session_to_relay: HashMap<Uuid, PeerId> = HashMap::new();
    let mut addr_to_peer: HashMap<SocketAddr, PeerId> = HashMap::new();
    let next_heartbeat_nonce = AtomicU64::new(1);

    info!(peer_id = ?local_peer_id, nat_type = %local_nat_type, "relay manager starting");

    if local_nat_type.mandates_relay() {
        refill(&config, &peer_cache, &mut connections, &mut addr_to_peer);
    }

    let mut tick = tokio::time::interval(config.heartbeat_interval);
    loop {
        tokio::select! {
            _ = tick.tick() => {
                let _ = self_tx.try_send(Command::Tick);
            }
            command = commands.recv() => {
                let Some(command) = command else { break };
                match command {
                    Command::Tick => {
                        heartbeat_round(&transport, &envelope, &mut connections, &next_heartbeat_nonce).await;
                        evict_unhealthy(&config, &mut connections, &mut addr_to_peer, &sessions);
                        refill(&config, &peer_cache, &mut connections, &mut addr_to_peer);
                        let idle = sessions.purge_idle(now_secs(), config.idle_session_timeout.as_secs());
                        for (session_id, role) in idle {
                            session_to_relay.remove(&session_id);
                            if let SessionRole::Endpoint { relay_peer_id, .. } = role {
                                if let Some(conn) = connections.get_mut(&relay_peer_id) {
                                    conn.note_session_closed();
                                }
                            }
                        }
                    }
                    Command::RequestSession { target_peer_id, reply } => {
                        let outcome = request_session(
                            &config,
                            local_peer_id,
                            &transport,
                            &envelope,
                            &mut connections,
                            &sessions,
                            target_peer_id,
                        )
                        .await;
                        if let Ok(session_id) = &outcome {
                            if let Some(relay_peer_id) = connections
                                .values()
                                .find(|c| sessions.count_active_for_relay(c.peer_id) > 0)
                                .map(|c| c.peer_id)
                            {
                                session_to_relay.insert(*session_id, relay_peer_id);
                            }
                        }
                        let _ = reply.send(outcome);
                    }
                    Command::SendData { session_id, bytes, reply } => {
                        let outcome = send_data(&transport, &envelope, &connections, &session_to_relay, session_id, bytes).await;
                        let _ = reply.send(outcome);
                    }
                    Command::EndSession { session_id } => {
                        if let Some(role) = sessions.close(session_id) {
                            if let SessionRole::Endpoint { relay_peer_id, .. } = role {
                                if let Some(conn) = connections.get_mut(&relay_peer_id) {
                                    conn.note_session_closed();
                                }
                                if let Some(conn) = connections.get(&relay_peer_id) {
                                    let frame = Frame::RelayEnd { session_id };
                                    if let Ok(datagram) = envelope.seal(&frame) {
                                        let _ = transport.send_to(conn.endpoint.into(), datagram).await;
                                    }
                                }
                            }
                        }
                        session_to_relay.remove(&session_id);
                    }
                    Command::Inbound { from, frame } => {
                        handle_inbound(
                            &config,
                            local_peer_id,
                            &transport,
                            &envelope,
                            &peer_cache,
                            &mut connections,
                            &addr_to_peer,
                            &sessions,
                            &events,
                            from,
                            frame,
                        )
                        .await;
                    }
                    Command::Stats { reply } => {
                        let session_stats = sessions.stats();
                        let healthy = connections.values().filter(|c| c.is_healthy(config.heartbeat_miss_threshold)).count();
                        let _ = reply.send(RelayManagerStats {
                            live_connections: connections.len(),
                            healthy_connections: healthy,
                            endpoint_sessions: session_stats.endpoint_sessions,
                            forwarder_sessions: session_stats.forwarder_sessions,
                        });
                    }
                }
            }
        }
    }
}

fn refill(
    config: &RelayConfig,
    peer_cache: &PeerCache,
    connections: &mut HashMap<PeerId, RelayConnection>,
    addr_to_peer: &mut HashMap<SocketAddr, PeerId>,
) {
    if connections.len() >= config.min_relays {
        return;
    }
    let mut candidates: Vec<RelayCandidate> = peer_cache
        .relay_capable_peers()
        .into_iter()
        .filter(|r| !connections.contains_key(&r.peer_id))
        .filter_map(|r| {
            let endpoint = r.observed_endpoints.last().copied()?;
            let capacity = r.relay_capacity?;
            Some(RelayCandidate {
                peer_id: r.peer_id,
                endpoint,
                rtt: std::time::Duration::from_millis(50),
                free_capacity: capacity.max_sessions.saturating_sub(capacity.active_sessions),
                is_direct: r
                    .reachability
                    .iter()
                    .any(|p| matches!(p.path, mesh_peercache::ReachabilityPath::Direct(_))),
                nat_type: r.predicted_nat_type,
            })
        })
        .collect();
    candidates.sort_by(|a, b| b.score().partial_cmp(&a.score()).unwrap_or(std::cmp::Ordering::Equal));

    for candidate in candidates {
        if connections.len() >= config.max_relays {
            break;
        }
        addr_to_peer.insert(candidate.endpoint.into(), candidate.peer_id);
        connections.insert(
            candidate.peer_id,
            RelayConnection::new(candidate.peer_id, candidate.endpoint, candidate.free_capacity.max(1)),
        );
        info!(peer_id = ?candidate.peer_id, "added relay connection");
    }
}

fn evict_unhealthy(
    config: &RelayConfig,
    connections: &mut HashMap<PeerId, RelayConnection>,
    addr_to_peer: &mut HashMap<SocketAddr, PeerId>,
    sessions: &RelaySessionManager,
) {
    let unhealthy: Vec<PeerId> = connections
        .values()
        .filter(|c| !c.is_healthy(config.heartbeat_miss_threshold))
        .map(|c| c.peer_id)
        .collect();
    for peer_id in unhealthy {
        warn!(?peer_id, "evicting unhealthy relay connection");
        if let Some(conn) = connections.remove(&peer_id) {
            addr_to_peer.remove(&conn.endpoint.into());
        }
        let dropped = sessions.close_sessions_for_relay(peer_id);
        if !dropped.is_empty() {
            debug!(?peer_id, count = dropped.len(), "dropped sessions on unhealthy relay");
        }
    }
}

/// Probes every connection, marking any that never acked the previous
/// round's probe as having missed a heartbeat (§4.6).
async fn heartbeat_round(
    transport: &TransportHandle,
    envelope: &CryptoEnvelope,
    connections: &mut HashMap<PeerId, RelayConnection>,
    next_nonce: &AtomicU64,
) {
    for conn in connections.values_mut() {
        conn.note_probe_sent();
        let nonce = next_nonce.fetch_add(1, Ordering::Relaxed);
        let frame = Frame::Probe { nonce };
        if let Ok(datagram) = envelope.seal(&frame) {
            let _ = transport.send_to(conn.endpoint.into(), datagram).await;
        }
    }
}

async fn request_session(
    config: &RelayConfig,
    local_peer_id: PeerId,
    transport: &TransportHandle,
    envelope: &CryptoEnvelope,
    connections: &mut HashMap<PeerId, RelayConnection>,
    sessions: &RelaySessionManager,
    target_peer_id: PeerId,
) -> Result<Uuid> {
    if connections.is_empty() {
        return Err(RelayError::NoCandidates);
    }
    let Some(conn) = connections
        .values_mut()
        .filter(|c| c.is_healthy(config.heartbeat_miss_threshold) && c.has_capacity())
        .max_by(|a, b| a.free_capacity().cmp(&b.free_capacity()))
    else {
        return Err(RelayError::AllRelaysUnhealthy);
    };
    let session_id = Uuid::new_v4();
    let frame = Frame::RelayRequest {
        requester_peer_id: local_peer_id,
        target_peer_id,
        session_id,
    };
    let datagram = envelope.seal(&frame).map_err(|_| RelayError::Closed)?;
    transport
        .send_to(conn.endpoint.into(), datagram)
        .await
        .map_err(|_| RelayError::Closed)?;
    conn.note_session_opened();
    sessions.open_endpoint_session(session_id, conn.peer_id, target_peer_id, now_secs());
    Ok(session_id)
}

async fn send_data(
    transport: &TransportHandle,
    envelope: &CryptoEnvelope,
    connections: &HashMap<PeerId, RelayConnection>,
    session_to_relay: &HashMap<Uuid, PeerId>,
    session_id: Uuid,
    bytes: Vec<u8>,
) -> Result<()> {
    let relay_peer_id = session_to_relay.get(&session_id).ok_or(RelayError::SessionNotFound)?;
    let conn = connections.get(relay_peer_id).ok_or(RelayError::SessionNotFound)?;
    let frame = Frame::RelayData { session_id, bytes };
    let datagram = envelope.seal(&frame).map_err(|_| RelayError::Closed)?;
    transport
        .send_to(conn.endpoint.into(), datagram)
        .await
        .map_err(|_| RelayError::Closed)
}

#[allow(clippy::too_many_arguments)]
async fn handle_inbound(
    config: &RelayConfig,
    local_peer_id: PeerId,
    transport: &TransportHandle,
    envelope: &CryptoEnvelope,
    peer_cache: &PeerCache,
    connections: &mut HashMap<PeerId, RelayConnection>,
    addr_to_peer: &HashMap<SocketAddr, PeerId>,
    sessions: &Arc<RelaySessionManager>,
    events: &mpsc::Sender<RelayDataEvent>,
    from: SocketAddr,
    frame: Frame,
) {
    match frame {
        Frame::Probe { nonce } => {
            let frame = Frame::ProbeAck { nonce, rtt_millis: 0 };
            if let Ok(datagram) = envelope.seal(&frame) {
                let _ = transport.send_to(from, datagram).await;
            }
        }
        Frame::ProbeAck { .. } => {
            if let Some(peer_id) = addr_to_peer.get(&from) {
                if let Some(conn) = connections.get_mut(peer_id) {
                    conn.record_heartbeat_ack();
                }
            }
        }
        Frame::RelayRequest { requester_peer_id, target_peer_id, session_id } => {
            let active = sessions.stats().forwarder_sessions;
            if active >= config.max_relays * 64 {
                let deny = Frame::RelayDeny { session_id, reason: RelayDenyReason::AtCapacity };
                if let Ok(datagram) = envelope.seal(&deny) {
                    let _ = transport.send_to(from, datagram).await;
                }
                return;
            }
            let Some(target_endpoint) = peer_cache
                .get(&target_peer_id)
                .and_then(|r| r.observed_endpoints.last().copied())
            else {
                let deny = Frame::RelayDeny { session_id, reason: RelayDenyReason::TargetUnknown };
                if let Ok(datagram) = envelope.seal(&deny) {
                    let _ = transport.send_to(from, datagram).await;
                }
                return;
            };
            sessions.open_forwarder_session(session_id, Endpoint::from(from), target_endpoint, now_secs());
            let accept = Frame::RelayAccept { session_id };
            if let Ok(datagram) = envelope.seal(&accept) {
                let _ = transport.send_to(from, datagram).await;
            }
            let opened = Frame::RelayOpened {
                session_id,
                relay_peer_id: local_peer_id,
                initiator_peer_id: requester_peer_id,
            };
            if let Ok(datagram) = envelope.seal(&opened) {
                let _ = transport.send_to(target_endpoint.into(), datagram).await;
            }
        }
        Frame::RelayOpened { session_id, relay_peer_id, initiator_peer_id } => {
            sessions.open_endpoint_session(session_id, relay_peer_id, initiator_peer_id, now_secs());
        }
        Frame::RelayData { session_id, bytes } => {
            eprintln!("DEBUG relaydata entry session={:?} role={:?}", session_id, sessions.role_of(session_id));
            sessions.touch(session_id, now_secs());
            match sessions.role_of(session_id) {
                Some(SessionRole::Forwarder { .. }) => {
                    eprintln!("DEBUG forwarder from={:?}", from);
                    if let Some(target) = sessions.forward_target(session_id, Endpoint::from(from)) {
                        eprintln!("DEBUG forwarding to={:?}", target);
                        let frame = Frame::RelayData { session_id, bytes };
                        if let Ok(datagram) = envelope.seal(&frame) {
                            let res = transport.send_to(target.into(), datagram).await;
                            eprintln!("DEBUG send_to result={:?}", res);
                        }
                    } else {
                        eprintln!("DEBUG forward_target returned None");
                    }
                }
                Some(SessionRole::Endpoint { remote_peer_id, .. }) => {
                    let _ = events
                        .send(RelayDataEvent {
                            session_id,
                            from_peer_id: remote_peer_id,
                            bytes,
                        })
                        .await;
                }
                None => debug!(%session_id, "relay_data for an unknown or closed session"),
            }
        }
        Frame::RelayEnd { session_id } => {
            sessions.close(session_id);
        }
        _ => {}
    }
    debug!(%from, "relay manager processed inbound frame");
}

#[cfg(test)]
mod tests {
    use super::*;
    use mesh_crypto::NetworkKey;
    use mesh_net::Datagram;
    use mesh_peercache::{PeerCacheConfig, RelayCapacity};
    use mesh_wire::EnvelopeHeader;
    use tokio::sync::mpsc::Receiver;

    fn peer(tag: u8) -> PeerId {
        PeerId::from_bytes([tag; 8])
    }

    /// A relay that never acks a probe accumulates misses and is evicted
    /// once it crosses `heartbeat_miss_threshold`, per §4.6 and §8
    /// scenario 4.
    #[tokio::test]
    async fn an_unresponsive_relay_is_evicted_after_missing_its_heartbeats() {
        use std::str::FromStr;

        let network_key = NetworkKey::from_bytes([5u8; 32]);
        let envelope = CryptoEnvelope::new(&network_key);
        let (transport, _inbound) = mesh_net::spawn("127.0.0.1:0".parse().unwrap(), 16).await.unwrap();

        let config = RelayConfig::default();
        let relay_peer_id = peer(9);
        let relay_endpoint = Endpoint::from_str("203.0.113.5:9000").unwrap();

        let mut connections = HashMap::new();
        let mut addr_to_peer = HashMap::new();
        addr_to_peer.insert(relay_endpoint.into(), relay_peer_id);
        connections.insert(relay_peer_id, RelayConnection::new(relay_peer_id, relay_endpoint, 4));

        let next_nonce = AtomicU64::new(1);
        let sessions = RelaySessionManager::shared();

        // No `ProbeAck` ever arrives for this relay, so each tick's probe
        // round should count as a miss once the previous one goes unacked.
        for _ in 0..=config.heartbeat_miss_threshold {
            heartbeat_round(&transport, &envelope, &mut connections, &next_nonce).await;
        }
        assert!(!connections[&relay_peer_id].is_healthy(config.heartbeat_miss_threshold));

        evict_unhealthy(&config, &mut connections, &mut addr_to_peer, &sessions);
        assert!(connections.is_empty());
        assert!(addr_to_peer.is_empty());
    }

    /// A relay that keeps acking never accumulates misses and stays in
    /// the pool across many heartbeat rounds.
    #[tokio::test]
    async fn a_responsive_relay_survives_many_heartbeat_rounds() {
        use std::str::FromStr;

        let network_key = NetworkKey::from_bytes([6u8; 32]);
        let envelope = CryptoEnvelope::new(&network_key);
        let (transport, _inbound) = mesh_net::spawn("127.0.0.1:0".parse().unwrap(), 16).await.unwrap();

        let config = RelayConfig::default();
        let relay_peer_id = peer(10);
        let relay_endpoint = Endpoint::from_str("203.0.113.6:9000").unwrap();

        let mut connections = HashMap::new();
        connections.insert(relay_peer_id, RelayConnection::new(relay_peer_id, relay_endpoint, 4));
        let next_nonce = AtomicU64::new(1);

        for _ in 0..5 {
            heartbeat_round(&transport, &envelope, &mut connections, &next_nonce).await;
            connections.get_mut(&relay_peer_id).unwrap().record_heartbeat_ack();
        }
        assert!(connections[&relay_peer_id].is_healthy(config.heartbeat_miss_threshold));
    }

    async fn recv_frame(inbound: &mut Receiver<Datagram>, envelope: &CryptoEnvelope) -> (SocketAddr, Frame) {
        let datagram = tokio::time::timeout(std::time::Duration::from_secs(2), inbound.recv())
            .await
            .expect("timed out waiting for a datagram")
            .expect("inbound channel closed");
        let (header, ciphertext) = EnvelopeHeader::parse(&datagram.bytes).unwrap();
        let frame = envelope.open(&header, ciphertext).unwrap();
        eprintln!("DEBUG recv_frame from={:?} frame={:?}", datagram.from, frame);
        (datagram.from, frame)
    }

    #[tokio::test]
    async fn request_session_without_any_connection_fails_fast() {
        let network_key = NetworkKey::from_bytes([7u8; 32]);
        let envelope = Arc::new(CryptoEnvelope::new(&network_key));
        let (transport, _inbound) = mesh_net::spawn("127.0.0.1:0".parse().unwrap(), 16).await.unwrap();
        let peer_cache = PeerCache::shared(PeerCacheConfig::default());

        let (handle, _events) = spawn(
            RelayConfig::default(),
            peer(1),
            NatType::Public,
            transport,
            envelope,
            peer_cache,
        );

        let err = handle.request_session(peer(2)).await.unwrap_err();
        assert!(matches!(err, RelayError::NoCandidates));
    }

    /// Client asks a relay it has never exchanged a heartbeat with to
    /// forward to a third node; the relay learns the third node's
    /// endpoint from its own peer cache and proxies one datagram each way.
    #[tokio::test]
    async fn a_relay_session_round_trips_data_between_two_endpoints() {
        let network_key = NetworkKey::from_bytes([9u8; 32]);
        let client_envelope = Arc::new(CryptoEnvelope::new(&network_key));
        let relay_envelope = Arc::new(CryptoEnvelope::new(&network_key));
        let target_envelope = CryptoEnvelope::new(&network_key);

        let (client_transport, mut client_inbound) =
            mesh_net::spawn("127.0.0.1:0".parse().unwrap(), 16).await.unwrap();
        let (relay_transport, mut relay_inbound) =
            mesh_net::spawn("127.0.0.1:0".parse().unwrap(), 16).await.unwrap();
        let (target_transport, mut target_inbound) =
            mesh_net::spawn("127.0.0.1:0".parse().unwrap(), 16).await.unwrap();

        let relay_peer_id = peer(2);
        let target_peer_id = peer(3);

        let client_cache = PeerCache::shared(PeerCacheConfig::default());
        client_cache.insert_bootstrap(relay_peer_id, Endpoint::from(relay_transport.local_addr()), now_secs());
        client_cache.set_relay_capacity(relay_peer_id, RelayCapacity { max_sessions: 5, active_sessions: 0 });

        let relay_cache = PeerCache::shared(PeerCacheConfig::default());
        relay_cache.insert_bootstrap(target_peer_id, Endpoint::from(target_transport.local_addr()), now_secs());

        let client_peer_id = peer(1);

        // `mandates_relay` NAT types refill their connection pool
        // synchronously before the actor's command loop starts, so the
        // very first `request_session` call below is guaranteed to see a
        // live connection rather than racing the pool's startup fill.
        let (client, _client_events) = spawn(
            RelayConfig::default(),
            client_peer_id,
            NatType::Symmetric,
            client_transport.clone(),
            client_envelope.clone(),
            client_cache,
        );
        let (relay, _relay_events) = spawn(
            RelayConfig::default(),
            relay_peer_id,
            NatType::Public,
            relay_transport.clone(),
            relay_envelope.clone(),
            relay_cache,
        );
        let (target, mut target_events) = spawn(
            RelayConfig::default(),
            target_peer_id,
            NatType::Public,
            target_transport.clone(),
            Arc::new(target_envelope),
            PeerCache::shared(PeerCacheConfig::default()),
        );

        let session_id = client.request_session(target_peer_id).await.unwrap();

        let (client_addr, request) = recv_frame(&mut relay_inbound, &relay_envelope).await;
        assert!(matches!(
            request,
            Frame::RelayRequest { session_id: sid, target_peer_id: t, requester_peer_id: r }
                if sid == session_id && t == target_peer_id && r == client_peer_id
        ));
        relay.handle_frame(client_addr, request).await;

        let (_, accept) = recv_frame(&mut client_inbound, &client_envelope).await;
        assert!(matches!(accept, Frame::RelayAccept { session_id: sid } if sid == session_id));

        let (_, opened) = recv_frame(&mut target_inbound, &client_envelope).await;
        assert!(matches!(
            opened,
            Frame::RelayOpened { session_id: sid, relay_peer_id: rp, initiator_peer_id: ip }
                if sid == session_id && rp == relay_peer_id && ip == client_peer_id
        ));
        target.handle_frame(relay_transport.local_addr(), opened).await;

        client.send_data(session_id, b"ping".to_vec()).await.unwrap();
        let (from_client, data) = recv_frame(&mut relay_inbound, &relay_envelope).await;
        relay.handle_frame(from_client, data).await;

        let (from_relay, forwarded) = recv_frame(&mut target_inbound, &client_envelope).await;
        target.handle_frame(from_relay, forwarded).await;

        let event = tokio::time::timeout(std::time::Duration::from_secs(2), target_events.recv())
            .await
            .expect("timed out waiting for a relay data event")
            .expect("events channel closed");
        assert_eq!(event.session_id, session_id);
        assert_eq!(event.from_peer_id, client_peer_id);
        assert_eq!(event.bytes, b"ping");
    }
}
