// Copyright (c) 2024 Omerta Mesh Contributors

//! The top-level `MeshNode`: wires every collaborator crate together
//! behind the programmatic surface of §6, and owns the one UDP-datagram
//! router task that decrypts inbound traffic and dispatches it by frame
//! tag.

use mesh_channel::{ChannelDispatcher, ChannelMessage};
use mesh_common::{Endpoint, NatType, PeerId};
use mesh_crypto::{open_any, CryptoEnvelope, NetworkKey};
use mesh_discovery::{DiscoveryEvent, DiscoveryHandle};
use mesh_holepunch::{HolePunchEvent, HolePunchHandle};
use mesh_identity::Identity;
use mesh_nat::{NatHandle, NatObservation};
use mesh_net::{Datagram, TransportHandle};
use mesh_peercache::PeerCache;
use mesh_relay::{RelayDataEvent, RelayHandle};
use mesh_session::TunnelHandle;
use mesh_wire::Frame;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, warn};

use crate::config::MeshConfig;
use crate::error::{MeshError, Result};
use crate::events::MeshEvent;
use crate::stats::MeshStatistics;

/// Depth of the outbound UDP queue and every internal event channel.
const QUEUE_DEPTH: usize = 256;

#[derive(Default)]
struct DroppedCounters {
    undecryptable: AtomicU64,
    dropped: AtomicU64,
}

/// Everything that exists only once the node has been [`MeshNode::start`]ed.
struct Runtime {
    transport: TransportHandle,
    peer_cache: Arc<PeerCache>,
    nat: NatHandle,
    nat_type: Arc<RwLock<NatType>>,
    discovery: DiscoveryHandle,
    relay: RelayHandle,
    channel_dispatcher: Arc<ChannelDispatcher>,
    tunnel: TunnelHandle,
    counters: Arc<DroppedCounters>,
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

/// A running (or not-yet-started) mesh participant: cryptographic identity,
/// one network membership, and every collaborator singleton named in the
/// ownership model (§3).
pub struct MeshNode {
    identity: Arc<Identity>,
    peer_id: PeerId,
    network_key: NetworkKey,
    config: MeshConfig,
    started: AtomicBool,
    runtime: Mutex<Option<Runtime>>,
    events_tx: mpsc::Sender<MeshEvent>,
    events_rx: Mutex<Option<mpsc::Receiver<MeshEvent>>>,
}

/// Builder assembling a [`MeshNode`] from an [`Identity`], a [`NetworkKey`]
/// and a [`MeshConfig`] (§2b), mirroring `GossipConfigBuilder`'s shape.
pub struct MeshNodeBuilder {
    identity: Identity,
    network_key: NetworkKey,
    config: MeshConfig,
}

impl MeshNodeBuilder {
    pub fn new(identity: Identity, network_key: NetworkKey, config: MeshConfig) -> Self {
        Self {
            identity,
            network_key,
            config,
        }
    }

    pub fn build(self) -> MeshNode {
        let (events_tx, events_rx) = mpsc::channel(QUEUE_DEPTH);
        MeshNode {
            peer_id: self.identity.peer_id(),
            identity: Arc::new(self.identity),
            network_key: self.network_key,
            config: self.config,
            started: AtomicBool::new(false),
            runtime: Mutex::new(None),
            events_tx,
            events_rx: Mutex::new(Some(events_rx)),
        }
    }
}

impl MeshNode {
    pub fn peer_id(&self) -> PeerId {
        self.peer_id
    }

    /// Bind the socket, spawn every collaborator task, and run one NAT
    /// detection pass. Idempotent: calling `start()` on an already-started
    /// node returns [`MeshError::AlreadyStarted`] (§9: "cancellation points
    /// must be idempotent").
    pub async fn start(&self) -> Result<()> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(MeshError::AlreadyStarted);
        }

        let (transport, inbound_rx) = mesh_net::spawn(self.config.bind_addr, QUEUE_DEPTH).await?;
        info!(local_addr = %transport.local_addr(), peer_id = %self.peer_id, "mesh node binding");

        let envelope = Arc::new(CryptoEnvelope::new(&self.network_key));

        let peer_cache = PeerCache::shared(self.config.peer_cache.clone());
        if let Some(path) = &self.config.peer_cache_file {
            match peer_cache.load_from_file(path, now()) {
                Ok(loaded) => info!(loaded, "warm-started peer cache from file"),
                Err(e) => debug!(error = %e, "no usable peer cache warm-start file"),
            }
        }

        let (nat, nat_datagrams) = mesh_nat::spawn(self.config.nat.clone(), transport.clone());
        let nat_type = Arc::new(RwLock::new(NatType::default()));

        let (discovery, discovery_events) = mesh_discovery::spawn(
            self.config.discovery.clone(),
            self.peer_id,
            nat_type.clone(),
            transport.clone(),
            envelope.clone(),
            peer_cache.clone(),
        );

        let (holepunch, mut holepunch_events) = mesh_holepunch::spawn(
            self.config.hole_punch.clone(),
            self.peer_id,
            transport.clone(),
            envelope.clone(),
            peer_cache.clone(),
        );

        // The relay manager's initial `needs_relay` decision is made from
        // `NatType::default()` (`Unknown`, which already mandates relay):
        // detection has not completed yet and `Unknown` is the
        // conservative choice until it does.
        let (relay, mut relay_events) = mesh_relay::spawn(
            self.config.relay.clone(),
            self.peer_id,
            *nat_type.read().unwrap(),
            transport.clone(),
            envelope.clone(),
            peer_cache.clone(),
        );

        let channel_dispatcher = ChannelDispatcher::shared(
            self.config.channel.clone(),
            transport.clone(),
            envelope.clone(),
            peer_cache.clone(),
            holepunch.clone(),
            relay.clone(),
        );

        let (tunnel, mut tunnel_events) = mesh_session::spawn(
            self.config.tunnel.clone(),
            channel_dispatcher.clone(),
            self.config.tunnel_policy.clone(),
        )?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let counters = Arc::new(DroppedCounters::default());

        let mut tasks = Vec::new();

        tasks.push(tokio::spawn(route_inbound(
            inbound_rx,
            transport.clone(),
            envelope.clone(),
            peer_cache.clone(),
            self.config.nat.rendezvous_servers.clone(),
            nat_datagrams,
            discovery.clone(),
            holepunch.clone(),
            relay.clone(),
            channel_dispatcher.clone(),
            counters.clone(),
            shutdown_rx.clone(),
        )));

        tasks.push(tokio::spawn(forward_discovery_events(
            discovery_events,
            self.events_tx.clone(),
        )));

        let events_tx = self.events_tx.clone();
        let dispatcher_for_relay = channel_dispatcher.clone();
        tasks.push(tokio::spawn(async move {
            while let Some(event) = relay_events.recv().await {
                route_relay_data(event, &dispatcher_for_relay);
            }
            let _ = events_tx;
        }));

        let events_tx = self.events_tx.clone();
        tasks.push(tokio::spawn(async move {
            while let Some(event) = tunnel_events.recv().await {
                forward_tunnel_event(event, &events_tx).await;
            }
        }));

        let events_tx = self.events_tx.clone();
        tasks.push(tokio::spawn(async move {
            while let Some(event) = holepunch_events.recv().await {
                forward_holepunch_event(event, &events_tx).await;
            }
        }));

        match nat.detect().await {
            Ok(NatObservation { nat_type: detected, public_endpoint }) => {
                *nat_type.write().unwrap() = detected;
                let _ = self
                    .events_tx
                    .send(MeshEvent::NatDetected {
                        nat_type: detected,
                        public_endpoint: public_endpoint.map(Endpoint::from),
                    })
                    .await;
            }
            Err(e) => {
                warn!(error = %e, "initial NAT detection failed, continuing as unknown");
                let _ = self
                    .events_tx
                    .send(MeshEvent::Warning {
                        message: format!("NAT detection failed: {e}"),
                    })
                    .await;
            }
        }

        discovery.bootstrap_now().await;
        let _ = self.events_tx.send(MeshEvent::Started).await;

        *self.runtime.lock().unwrap_or_else(|e| e.into_inner()) = Some(Runtime {
            transport,
            peer_cache,
            nat,
            nat_type,
            discovery,
            relay,
            channel_dispatcher,
            tunnel,
            counters,
            shutdown: shutdown_tx,
            tasks,
        });
        Ok(())
    }

    /// Broadcast the cancellation signal and join every background task.
    /// A no-op if the node was never started or is already stopped (§9).
    pub async fn stop(&self) -> Result<()> {
        let runtime = self.runtime.lock().unwrap_or_else(|e| e.into_inner()).take();
        self.started.store(false, Ordering::SeqCst);
        let Some(runtime) = runtime else {
            return Ok(());
        };
        let _ = runtime.shutdown.send(true);
        for task in runtime.tasks {
            task.abort();
        }
        Ok(())
    }

    /// Manually register a peer's endpoint, as if learned from a pong
    /// (§6: `add_peer(peer_id, endpoint)`).
    pub fn add_peer(&self, peer_id: PeerId, endpoint: Endpoint) -> Result<()> {
        let guard = self.runtime.lock().unwrap_or_else(|e| e.into_inner());
        let runtime = guard.as_ref().ok_or(MeshError::NotStarted)?;
        // `touch` (rather than `insert_bootstrap`) marks the record
        // verified and installs a direct reachability path immediately,
        // matching the trust a manually-added peer is given over one
        // merely seen in gossip (§4.4).
        runtime.peer_cache.touch(peer_id, endpoint, now());
        Ok(())
    }

    /// Every peer this node currently has a record for.
    pub fn known_peers(&self) -> Result<Vec<PeerId>> {
        let guard = self.runtime.lock().unwrap_or_else(|e| e.into_inner());
        let runtime = guard.as_ref().ok_or(MeshError::NotStarted)?;
        Ok(runtime.peer_cache.all_peer_ids())
    }

    /// Snapshot every collaborator's counters plus node-level rollups
    /// (§6: `statistics()`).
    pub async fn statistics(&self) -> Result<MeshStatistics> {
        let (transport, peer_cache, relay, channel, tunnel, direct_connections, counters) = {
            let guard = self.runtime.lock().unwrap_or_else(|e| e.into_inner());
            let runtime = guard.as_ref().ok_or(MeshError::NotStarted)?;
            (
                runtime.transport.stats(),
                runtime.peer_cache.stats(),
                runtime.relay.clone(),
                runtime.channel_dispatcher.stats(),
                runtime.tunnel.clone(),
                runtime.peer_cache.direct_peers().len(),
                runtime.counters.clone(),
            )
        };
        Ok(MeshStatistics {
            transport,
            peer_cache,
            relay: relay.stats().await,
            channel,
            tunnel: tunnel.stats().await,
            direct_connections,
            relay_session_count: channel.open_relay_sessions,
            undecryptable_datagrams: counters.undecryptable.load(Ordering::Relaxed),
            dropped_datagrams: counters.dropped.load(Ordering::Relaxed),
        })
    }

    /// Take ownership of the node's event stream. Callable exactly once;
    /// later calls return `None` (§6: `events()`).
    pub fn events(&self) -> Option<ReceiverStream<MeshEvent>> {
        self.events_rx
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
            .map(ReceiverStream::new)
    }

    /// Trigger an immediate bootstrap/discovery round (§6: `discover_peers()`).
    pub async fn discover_peers(&self) -> Result<()> {
        let discovery = {
            let guard = self.runtime.lock().unwrap_or_else(|e| e.into_inner());
            guard.as_ref().ok_or(MeshError::NotStarted)?.discovery.clone()
        };
        discovery.bootstrap_now().await;
        Ok(())
    }

    /// Register a handler for `name`, returning the receiver it pushes
    /// arriving messages to (§6: `on_channel(name, handler)`).
    pub fn on_channel(&self, name: impl Into<String>) -> Result<mpsc::Receiver<ChannelMessage>> {
        let guard = self.runtime.lock().unwrap_or_else(|e| e.into_inner());
        let runtime = guard.as_ref().ok_or(MeshError::NotStarted)?;
        Ok(runtime.channel_dispatcher.on_channel(name)?)
    }

    pub fn off_channel(&self, name: &str) -> Result<()> {
        let guard = self.runtime.lock().unwrap_or_else(|e| e.into_inner());
        let runtime = guard.as_ref().ok_or(MeshError::NotStarted)?;
        runtime.channel_dispatcher.off_channel(name);
        Ok(())
    }

    pub async fn send_on_channel(&self, bytes: Vec<u8>, peer_id: PeerId, name: impl Into<String>) -> Result<()> {
        let dispatcher = {
            let guard = self.runtime.lock().unwrap_or_else(|e| e.into_inner());
            guard.as_ref().ok_or(MeshError::NotStarted)?.channel_dispatcher.clone()
        };
        dispatcher.send_on_channel(bytes, peer_id, name).await?;
        Ok(())
    }

    /// Access the tunnel manager, for applications that want
    /// session-level (rather than raw channel-level) semantics (§4.9).
    pub fn tunnel(&self) -> Result<TunnelHandle> {
        let guard = self.runtime.lock().unwrap_or_else(|e| e.into_inner());
        Ok(guard.as_ref().ok_or(MeshError::NotStarted)?.tunnel.clone())
    }
}

async fn forward_discovery_events(mut rx: mpsc::Receiver<DiscoveryEvent>, events_tx: mpsc::Sender<MeshEvent>) {
    while let Some(event) = rx.recv().await {
        let mapped = match event {
            DiscoveryEvent::PeerDiscovered(peer_id) => Some(MeshEvent::PeerDiscovered { peer_id }),
            DiscoveryEvent::EndpointLearned(_) => None,
        };
        if let Some(mapped) = mapped {
            let _ = events_tx.send(mapped).await;
        }
    }
}

async fn forward_holepunch_event(event: HolePunchEvent, events_tx: &mpsc::Sender<MeshEvent>) {
    let mapped = match event {
        HolePunchEvent::Started { peer_id } => MeshEvent::HolePunchStarted { peer_id },
        HolePunchEvent::Succeeded { peer_id, rtt } => MeshEvent::HolePunchSucceeded { peer_id, rtt },
        HolePunchEvent::Failed { peer_id, reason } => MeshEvent::HolePunchFailed {
            peer_id,
            reason: reason.to_string(),
        },
    };
    let _ = events_tx.send(mapped).await;
}

async fn forward_tunnel_event(event: mesh_session::TunnelEvent, events_tx: &mpsc::Sender<MeshEvent>) {
    let mapped = match event {
        mesh_session::TunnelEvent::SessionActive { peer_id, .. } => Some(MeshEvent::PeerConnected { peer_id }),
        mesh_session::TunnelEvent::SessionClosed { peer_id, .. } => Some(MeshEvent::PeerDisconnected { peer_id }),
        mesh_session::TunnelEvent::SessionRejected { peer_id, .. } => Some(MeshEvent::Error {
            message: format!("tunnel request to {peer_id} was rejected"),
        }),
        mesh_session::TunnelEvent::Data { .. } => None,
    };
    if let Some(mapped) = mapped {
        let _ = events_tx.send(mapped).await;
    }
}

/// Decode an already-opened `relay_data` payload as a [`Frame`] and, if it
/// is `channel_data`, hand it to the dispatcher. The relay layer forwards
/// raw CBOR-encoded frame bytes without re-sealing them under the network
/// envelope (§4.7: the relay only ever sees the outer network envelope).
fn route_relay_data(event: RelayDataEvent, dispatcher: &Arc<ChannelDispatcher>) {
    match Frame::decode(&event.bytes) {
        Ok(Frame::ChannelData { channel_name, bytes }) => {
            dispatcher.dispatch(event.from_peer_id, &channel_name, bytes);
        }
        Ok(other) => debug!(tag = other.tag(), "unexpected frame arrived over a relay session"),
        Err(e) => warn!(error = %e, "malformed frame arrived over a relay session"),
    }
}

#[allow(clippy::too_many_arguments)]
async fn route_inbound(
    mut inbound: mpsc::Receiver<Datagram>,
    transport: TransportHandle,
    envelope: Arc<CryptoEnvelope>,
    peer_cache: Arc<PeerCache>,
    rendezvous_servers: Vec<std::net::SocketAddr>,
    nat_datagrams: mpsc::Sender<Datagram>,
    discovery: DiscoveryHandle,
    holepunch: HolePunchHandle,
    relay: RelayHandle,
    dispatcher: Arc<ChannelDispatcher>,
    counters: Arc<DroppedCounters>,
    mut shutdown: watch::Receiver<bool>,
) {
    let _ = transport.local_addr();
    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    return;
                }
            }
            datagram = inbound.recv() => {
                let Some(datagram) = datagram else { return };
                if rendezvous_servers.contains(&datagram.from) {
                    let _ = nat_datagrams.send(datagram).await;
                    continue;
                }

                let frame = match open_any(&datagram.bytes, [envelope.as_ref()]) {
                    Ok(frame) => frame,
                    Err(_) => {
                        counters.undecryptable.fetch_add(1, Ordering::Relaxed);
                        continue;
                    }
                };

                match frame {
                    Frame::ChannelData { channel_name, bytes } => {
                        match peer_cache.peer_id_for_endpoint(&Endpoint::from(datagram.from)) {
                            Some(peer_id) => dispatcher.dispatch(peer_id, &channel_name, bytes),
                            None => {
                                counters.dropped.fetch_add(1, Ordering::Relaxed);
                                debug!(from = %datagram.from, "channel_data from an unattributed endpoint, dropped");
                            }
                        }
                    }
                    other => {
                        discovery.handle_frame(datagram.from, other.clone()).await;
                        holepunch.handle_frame(datagram.from, other.clone()).await;
                        relay.handle_frame(datagram.from, other).await;
                    }
                }
            }
        }
    }
}

fn now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
