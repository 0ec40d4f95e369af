// Copyright (c) 2024 Omerta Mesh Contributors

//! The hole-punch actor: brokers `hole_punch_request`/`hole_punch_coordinate`
//! as a coordinator, and runs the probe burst as either party to an
//! attempt.

use crate::attempt::{is_driver, median_rtt, port_prediction_sweep};
use crate::config::HolePunchConfig;
use crate::error::{HolePunchError, Result};
use mesh_common::{Endpoint, NatType, PeerId};
use mesh_crypto::CryptoEnvelope;
use mesh_net::TransportHandle;
use mesh_peercache::PeerCache;
use mesh_wire::{Frame, TimeSyncHint};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// How far into the future the coordinator schedules the common burst
/// start (§4.5 step 2: "~100 ms in the future").
const COORDINATE_LEAD: Duration = Duration::from_millis(100);

fn now_unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Progress of a hole-punch attempt, surfaced to `mesh-node`'s event
/// stream (§6: `hole_punch_{started,succeeded,failed}`).
#[derive(Debug, Clone, Copy)]
pub enum HolePunchEvent {
    Started { peer_id: PeerId },
    Succeeded { peer_id: PeerId, rtt: Duration },
    Failed { peer_id: PeerId, reason: HolePunchError },
}

enum Command {
    RequestPunch {
        target_peer_id: PeerId,
        reply: oneshot::Sender<Result<Duration>>,
    },
    Inbound {
        from: SocketAddr,
        frame: Frame,
    },
    AttemptFinished {
        endpoint: SocketAddr,
    },
}

/// Handle to the running hole-punch engine.
#[derive(Clone)]
pub struct HolePunchHandle {
    commands: mpsc::Sender<Command>,
}

impl HolePunchHandle {
    /// Attempt to establish a direct path to `target_peer_id`, brokered by
    /// whichever verified peer currently advertises coordination. Resolves
    /// with the measured round-trip time on success.
    pub async fn request_punch(&self, target_peer_id: PeerId) -> Result<Duration> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(Command::RequestPunch {
                target_peer_id,
                reply,
            })
            .await
            .map_err(|_| HolePunchError::Closed)?;
        rx.await.map_err(|_| HolePunchError::Closed)?
    }

    /// Hand a decoded frame to the engine for processing.
    pub async fn handle_frame(&self, from: SocketAddr, frame: Frame) {
        let _ = self.commands.send(Command::Inbound { from, frame }).await;
    }
}

/// Spawn the hole-punch engine, returning a handle and a receiver of
/// attempt-progress events for `mesh-node`'s event stream.
pub fn spawn(
    config: HolePunchConfig,
    local_peer_id: PeerId,
    transport: TransportHandle,
    envelope: Arc<CryptoEnvelope>,
    peer_cache: Arc<PeerCache>,
) -> (HolePunchHandle, mpsc::Receiver<HolePunchEvent>) {
    let (command_tx, command_rx) = mpsc::channel(64);
    let (events_tx, events_rx) = mpsc::channel(64);
    tokio::spawn(run(
        config,
        local_peer_id,
        transport,
        envelope,
        peer_cache,
        command_rx,
        command_tx.clone(),
        events_tx,
    ));
    (HolePunchHandle { commands: command_tx }, events_rx)
}

#[allow(clippy::too_many_arguments)]
async fn run(
    config: HolePunchConfig,
    local_peer_id: PeerId,
    transport: TransportHandle,
    envelope: Arc<CryptoEnvelope>,
    peer_cache: Arc<PeerCache>,
    mut commands: mpsc::Receiver<Command>,
    self_tx: mpsc::Sender<Command>,
    events: mpsc::Sender<HolePunchEvent>,
) {
    let mut pending: HashMap<PeerId, oneshot::Sender<Result<Duration>>> = HashMap::new();
    let mut attempt_routes: HashMap<SocketAddr, mpsc::Sender<Frame>> = HashMap::new();

    while let Some(command) = commands.recv().await {
        match command {
            Command::RequestPunch { target_peer_id, reply } => {
                let coordinators = peer_cache.hole_punch_coordinators();
                let Some(coordinator_endpoint) = coordinators
                    .first()
                    .and_then(|c| c.observed_endpoints.last().copied())
                else {
                    let _ = events
                        .send(HolePunchEvent::Failed { peer_id: target_peer_id, reason: HolePunchError::NoCoordinator })
                        .await;
                    let _ = reply.send(Err(HolePunchError::NoCoordinator));
                    continue;
                };
                let request = Frame::HolePunchRequest {
                    requester_peer_id: local_peer_id,
                    target_peer_id,
                };
                match envelope.seal(&request) {
                    Ok(datagram) => {
                        pending.insert(target_peer_id, reply);
                        let _ = transport
                            .send_to(coordinator_endpoint.into(), datagram)
                            .await;
                    }
                    Err(_) => {
                        let _ = reply.send(Err(HolePunchError::Closed));
                    }
                }
            }
            Command::Inbound { from, frame } => match frame {
                Frame::HolePunchRequest {
                    requester_peer_id,
                    target_peer_id,
                } => {
                    broker_request(&transport, &envelope, &peer_cache, from, requester_peer_id, target_peer_id).await;
                }
                Frame::HolePunchCoordinate {
                    peer_other_peer_id,
                    peer_other_endpoint,
                    time_sync_hint,
                } => {
                    let reply = pending.remove(&peer_other_peer_id);
                    let (route_tx, route_rx) = mpsc::channel(config.burst_size as usize * 4 + 8);
                    attempt_routes.insert(peer_other_endpoint.into(), route_tx);
                    let _ = events
                        .send(HolePunchEvent::Started { peer_id: peer_other_peer_id })
                        .await;
                    tokio::spawn(run_attempt(
                        config,
                        local_peer_id,
                        peer_other_peer_id,
                        peer_other_endpoint,
                        time_sync_hint,
                        transport.clone(),
                        envelope.clone(),
                        peer_cache.clone(),
                        route_rx,
                        reply,
                        self_tx.clone(),
                        events.clone(),
                    ));
                }
                Frame::Probe { nonce } => {
                    if let Some(route) = attempt_routes.get(&from) {
                        let _ = route.send(Frame::Probe { nonce }).await;
                    } else {
                        // No local attempt state yet (coordinate frame still
                        // in flight); ack anyway so the other side's burst
                        // doesn't spend its whole window unanswered.
                        if let Ok(datagram) = envelope.seal(&Frame::ProbeAck { nonce, rtt_millis: 0 }) {
                            let _ = transport.send_to(from, datagram).await;
                        }
                    }
                }
                Frame::ProbeAck { nonce, rtt_millis } => {
                    if let Some(route) = attempt_routes.get(&from) {
                        let _ = route.send(Frame::ProbeAck { nonce, rtt_millis }).await;
                    }
                }
                _ => {}
            },
            Command::AttemptFinished { endpoint } => {
                attempt_routes.remove(&endpoint);
            }
        }
    }
}

async fn broker_request(
    transport: &TransportHandle,
    envelope: &CryptoEnvelope,
    peer_cache: &PeerCache,
    requester_addr: SocketAddr,
    requester_peer_id: PeerId,
    target_peer_id: PeerId,
) {
    let Some(target_record) = peer_cache.get(&target_peer_id) else {
        debug!(%target_peer_id, "hole-punch coordination requested for an unknown peer");
        return;
    };
    let Some(target_endpoint) = target_record.observed_endpoints.last().copied() else {
        return;
    };
    let requester_endpoint = Endpoint::from(requester_addr);
    let hint = TimeSyncHint {
        at_unix_millis: now_unix_millis() + COORDINATE_LEAD.as_millis() as u64,
    };

    let to_requester = Frame::HolePunchCoordinate {
        peer_other_peer_id: target_peer_id,
        peer_other_endpoint: target_endpoint,
        time_sync_hint: hint,
    };
    let to_target = Frame::HolePunchCoordinate {
        peer_other_peer_id: requester_peer_id,
        peer_other_endpoint: requester_endpoint,
        time_sync_hint: hint,
    };

    if let Ok(datagram) = envelope.seal(&to_requester) {
        let _ = transport.send_to(requester_addr, datagram).await;
    }
    if let Ok(datagram) = envelope.seal(&to_target) {
        let _ = transport.send_to(target_endpoint.into(), datagram).await;
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_attempt(
    config: HolePunchConfig,
    local_peer_id: PeerId,
    peer_other_peer_id: PeerId,
    peer_other_endpoint: Endpoint,
    time_sync_hint: TimeSyncHint,
    transport: TransportHandle,
    envelope: Arc<CryptoEnvelope>,
    peer_cache: Arc<PeerCache>,
    mut inbound: mpsc::Receiver<Frame>,
    reply: Option<oneshot::Sender<Result<Duration>>>,
    self_tx: mpsc::Sender<Command>,
    events: mpsc::Sender<HolePunchEvent>,
) {
    let target_millis = time_sync_hint.at_unix_millis;
    let current_millis = now_unix_millis();
    if target_millis > current_millis {
        tokio::time::sleep(Duration::from_millis(target_millis - current_millis)).await;
    }

    let driver = is_driver(local_peer_id, peer_other_peer_id);
    let predicted_symmetric = peer_cache
        .get(&peer_other_peer_id)
        .map(|r| r.predicted_nat_type == NatType::Symmetric)
        .unwrap_or(false);

    let mut outcome = run_burst(
        &config,
        peer_other_endpoint.into(),
        &transport,
        &envelope,
        &mut inbound,
    )
    .await;

    if outcome.is_none() && driver {
        info!(%peer_other_peer_id, "first hole-punch round failed, driver persisting one more burst");
        outcome = run_burst(
            &config,
            peer_other_endpoint.into(),
            &transport,
            &envelope,
            &mut inbound,
        )
        .await;
    }

    if outcome.is_none() && driver && predicted_symmetric {
        for port in port_prediction_sweep(peer_other_endpoint.port(), config.port_prediction_window) {
            let candidate = SocketAddr::new(peer_other_endpoint.ip(), port);
            if let Some(rtt) = probe_single(&config, candidate, &transport, &envelope, &mut inbound).await {
                outcome = Some(rtt);
                break;
            }
        }
    }

    let result = match outcome {
        Some(rtt) => {
            peer_cache.touch(peer_other_peer_id, peer_other_endpoint, now_secs());
            Ok(rtt)
        }
        None => Err(if predicted_symmetric {
            HolePunchError::NatIncompatible
        } else {
            HolePunchError::Timeout
        }),
    };

    let event = match &result {
        Ok(rtt) => HolePunchEvent::Succeeded { peer_id: peer_other_peer_id, rtt: *rtt },
        Err(reason) => HolePunchEvent::Failed { peer_id: peer_other_peer_id, reason: *reason },
    };
    let _ = events.send(event).await;

    if let Some(reply) = reply {
        let _ = reply.send(result);
    } else if let Err(err) = &result {
        warn!(%peer_other_peer_id, %err, "hole-punch attempt failed");
    }

    let _ = self_tx
        .send(Command::AttemptFinished {
            endpoint: peer_other_endpoint.into(),
        })
        .await;
}

/// One probe burst: send up to `burst_size` probes spaced by
/// `burst_spacing`, answering any probe the other side sends back, until
/// a matching ack arrives or `config.timeout` elapses overall.
async fn run_burst(
    config: &HolePunchConfig,
    target: SocketAddr,
    transport: &TransportHandle,
    envelope: &CryptoEnvelope,
    inbound: &mut mpsc::Receiver<Frame>,
) -> Option<Duration> {
    let deadline = Instant::now() + config.timeout;
    let mut samples = Vec::new();
    let mut sent: Vec<(u64, Instant)> = Vec::new();

    for i in 0..config.burst_size {
        if Instant::now() >= deadline {
            break;
        }
        let nonce = burst_nonce(i);
        let sent_at = Instant::now();
        if let Ok(datagram) = envelope.seal(&Frame::Probe { nonce }) {
            let _ = transport.send_to(target, datagram).await;
        }
        sent.push((nonce, sent_at));

        let wait = config.burst_spacing.min(deadline.saturating_duration_since(Instant::now()));
        if let Ok(Some(frame)) = tokio::time::timeout(wait, inbound.recv()).await {
            handle_attempt_frame(frame, &sent, &mut samples, target, transport, envelope).await;
        }
        if !samples.is_empty() {
            break;
        }
    }

    while samples.is_empty() && Instant::now() < deadline {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match tokio::time::timeout(remaining, inbound.recv()).await {
            Ok(Some(frame)) => {
                handle_attempt_frame(frame, &sent, &mut samples, target, transport, envelope).await;
            }
            _ => break,
        }
    }

    median_rtt(samples)
}

fn burst_nonce(index: u8) -> u64 {
    ((index as u64) << 32) | (now_unix_millis() & 0xffff_ffff)
}

async fn handle_attempt_frame(
    frame: Frame,
    sent: &[(u64, Instant)],
    samples: &mut Vec<Duration>,
    target: SocketAddr,
    transport: &TransportHandle,
    envelope: &CryptoEnvelope,
) {
    match frame {
        Frame::ProbeAck { nonce, .. } => {
            if let Some((_, sent_at)) = sent.iter().find(|(n, _)| *n == nonce) {
                samples.push(sent_at.elapsed());
            }
        }
        Frame::Probe { nonce } => {
            if let Ok(datagram) = envelope.seal(&Frame::ProbeAck { nonce, rtt_millis: 0 }) {
                let _ = transport.send_to(target, datagram).await;
            }
        }
        _ => {}
    }
}

async fn probe_single(
    config: &HolePunchConfig,
    target: SocketAddr,
    transport: &TransportHandle,
    envelope: &CryptoEnvelope,
    inbound: &mut mpsc::Receiver<Frame>,
) -> Option<Duration> {
    let sent_at = Instant::now();
    let nonce = now_unix_millis();
    if let Ok(datagram) = envelope.seal(&Frame::Probe { nonce }) {
        let _ = transport.send_to(target, datagram).await;
    }
    let mut samples = Vec::new();
    let sent = [(nonce, sent_at)];
    if let Ok(Some(frame)) = tokio::time::timeout(config.burst_spacing * 4, inbound.recv()).await {
        handle_attempt_frame(frame, &sent, &mut samples, target, transport, envelope).await;
    }
    samples.into_iter().next()
}

#[cfg(test)]
mod tests {
    use super::*;
    use mesh_crypto::NetworkKey;
    use mesh_net::Datagram;
    use mesh_peercache::PeerCacheConfig;

    #[test]
    fn coordinate_lead_is_about_a_hundred_milliseconds() {
        assert_eq!(COORDINATE_LEAD, Duration::from_millis(100));
    }

    async fn node() -> (TransportHandle, mpsc::Receiver<Datagram>) {
        mesh_net::spawn("127.0.0.1:0".parse().unwrap(), 32).await.unwrap()
    }

    #[tokio::test]
    async fn request_punch_without_a_coordinator_fails_fast() {
        let network_key = NetworkKey::from_bytes([12u8; 32]);
        let envelope = Arc::new(CryptoEnvelope::new(&network_key));
        let (transport, _inbound) = node().await;
        let peer_cache = PeerCache::shared(PeerCacheConfig::default());

        let (handle, mut events) = spawn(
            HolePunchConfig::default(),
            PeerId::from_bytes([9u8; 8]),
            transport,
            envelope,
            peer_cache,
        );
        let err = handle
            .request_punch(PeerId::from_bytes([8u8; 8]))
            .await
            .unwrap_err();
        assert!(matches!(err, HolePunchError::NoCoordinator));

        let failed = events.recv().await.expect("expected a failed event");
        assert!(matches!(failed, HolePunchEvent::Failed { reason: HolePunchError::NoCoordinator, .. }));
    }
}
