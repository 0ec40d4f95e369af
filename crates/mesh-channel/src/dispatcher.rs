// Copyright (c) 2024 Omerta Mesh Contributors

//! The channel dispatcher: an `RwLock`-style handler map (§5) plus path
//! selection for outbound sends (§4.8: "direct → hole-punched direct →
//! relay session").

use crate::config::ChannelConfig;
use crate::error::{ChannelError, Result};
use crate::message::ChannelMessage;
use mesh_common::{Endpoint, PeerId};
use mesh_crypto::CryptoEnvelope;
use mesh_holepunch::HolePunchHandle;
use mesh_net::TransportHandle;
use mesh_peercache::{PeerCache, ReachabilityPath};
use mesh_relay::RelayHandle;
use mesh_wire::Frame;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

/// How a send to a given peer is currently routed.
enum SendPath {
    Direct(Endpoint),
    Relay(Uuid),
}

/// Point-in-time snapshot of the dispatcher's state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChannelStats {
    pub registered_channels: usize,
    pub open_relay_sessions: usize,
}

/// Named-channel registration and send-path selection, shared by reference
/// across the node. Not an actor: the handler map is a plain `RwLock`
/// (§5), and path selection/sending are ordinary async methods that reuse
/// the already-actor-owned hole-punch and relay handles.
pub struct ChannelDispatcher {
    config: ChannelConfig,
    transport: TransportHandle,
    envelope: Arc<CryptoEnvelope>,
    peer_cache: Arc<PeerCache>,
    holepunch: HolePunchHandle,
    relay: RelayHandle,
    handlers: RwLock<HashMap<String, mpsc::Sender<ChannelMessage>>>,
    relay_sessions: RwLock<HashMap<PeerId, Uuid>>,
}

impl ChannelDispatcher {
    pub fn new(
        config: ChannelConfig,
        transport: TransportHandle,
        envelope: Arc<CryptoEnvelope>,
        peer_cache: Arc<PeerCache>,
        holepunch: HolePunchHandle,
        relay: RelayHandle,
    ) -> Self {
        Self {
            config,
            transport,
            envelope,
            peer_cache,
            holepunch,
            relay,
            handlers: RwLock::new(HashMap::new()),
            relay_sessions: RwLock::new(HashMap::new()),
        }
    }

    pub fn shared(
        config: ChannelConfig,
        transport: TransportHandle,
        envelope: Arc<CryptoEnvelope>,
        peer_cache: Arc<PeerCache>,
        holepunch: HolePunchHandle,
        relay: RelayHandle,
    ) -> Arc<Self> {
        Arc::new(Self::new(config, transport, envelope, peer_cache, holepunch, relay))
    }

    /// Install a handler for `name`, returning the receiver it will push
    /// arriving [`ChannelMessage`]s to. At most one handler per channel
    /// name (§4.8); a second registration is refused rather than
    /// replacing the first.
    pub fn on_channel(&self, name: impl Into<String>) -> Result<mpsc::Receiver<ChannelMessage>> {
        let name = name.into();
        let mut handlers = self.handlers.write().unwrap();
        if handlers.contains_key(&name) {
            return Err(ChannelError::AlreadyRegistered);
        }
        let (tx, rx) = mpsc::channel(self.config.queue_capacity);
        handlers.insert(name, tx);
        Ok(rx)
    }

    /// Remove any handler registered for `name`. A no-op if none is
    /// registered.
    pub fn off_channel(&self, name: &str) {
        self.handlers.write().unwrap().remove(name);
    }

    /// Route an already-decoded `channel_data` payload to its registered
    /// handler, if any. Never awaits the handler: a full queue is dropped
    /// with a warning rather than blocking the caller (§5 backpressure
    /// policy), which is what lets the dispatcher keep reading the next
    /// datagram without waiting on a slow application handler.
    pub fn dispatch(&self, from_peer_id: PeerId, channel_name: &str, bytes: Vec<u8>) {
        let sender = self.handlers.read().unwrap().get(channel_name).cloned();
        match sender {
            Some(sender) => {
                if sender.try_send(ChannelMessage { from_peer_id, bytes }).is_err() {
                    warn!(channel = %channel_name, "channel queue full or closed, dropping message");
                }
            }
            None => debug!(channel = %channel_name, "no handler registered, dropping channel_data"),
        }
    }

    /// Wrap `bytes` in a `channel_data(name, bytes)` frame and send it to
    /// `peer_id` by the best available path, establishing one first if
    /// none exists yet (§4.8).
    pub async fn send_on_channel(&self, bytes: Vec<u8>, peer_id: PeerId, name: impl Into<String>) -> Result<()> {
        let frame = Frame::channel_data(name, bytes).map_err(|_| ChannelError::NameTooLong)?;
        match self.resolve_path(peer_id).await? {
            SendPath::Direct(endpoint) => {
                let datagram = self.envelope.seal(&frame).map_err(|_| ChannelError::Closed)?;
                self.transport
                    .send_to(endpoint.into(), datagram)
                    .await
                    .map_err(|_| ChannelError::Closed)
            }
            SendPath::Relay(session_id) => {
                let encoded = frame.encode().map_err(|_| ChannelError::Closed)?;
                self.relay
                    .send_data(session_id, encoded)
                    .await
                    .map_err(|_| ChannelError::NoPathEstablished)
            }
        }
    }

    pub fn stats(&self) -> ChannelStats {
        ChannelStats {
            registered_channels: self.handlers.read().unwrap().len(),
            open_relay_sessions: self.relay_sessions.read().unwrap().len(),
        }
    }

    fn direct_endpoint(&self, peer_id: PeerId) -> Option<Endpoint> {
        let record = self.peer_cache.get(&peer_id)?;
        match &record.best_path()?.path {
            ReachabilityPath::Direct(endpoint) => Some(*endpoint),
            _ => None,
        }
    }

    /// Best currently-known path first; if none exists, establish one
    /// (hole punch, then relay) bounded by `establish_timeout` for the
    /// whole attempt, not each step (§4.8).
    async fn resolve_path(&self, peer_id: PeerId) -> Result<SendPath> {
        if let Some(endpoint) = self.direct_endpoint(peer_id) {
            return Ok(SendPath::Direct(endpoint));
        }
        if let Some(session_id) = self.relay_sessions.read().unwrap().get(&peer_id).copied() {
            return Ok(SendPath::Relay(session_id));
        }
        tokio::time::timeout(self.config.establish_timeout, self.establish_path(peer_id))
            .await
            .unwrap_or(Err(ChannelError::NoPathEstablished))
    }

    async fn establish_path(&self, peer_id: PeerId) -> Result<SendPath> {
        if self.holepunch.request_punch(peer_id).await.is_ok() {
            if let Some(endpoint) = self.direct_endpoint(peer_id) {
                return Ok(SendPath::Direct(endpoint));
            }
        }
        match self.relay.request_session(peer_id).await {
            Ok(session_id) => {
                self.relay_sessions.write().unwrap().insert(peer_id, session_id);
                Ok(SendPath::Relay(session_id))
            }
            Err(_) => Err(ChannelError::NoPathEstablished),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mesh_crypto::NetworkKey;
    use mesh_holepunch::HolePunchConfig;
    use mesh_peercache::PeerCacheConfig;
    use mesh_relay::RelayConfig;
    use mesh_common::NatType;

    fn peer(tag: u8) -> PeerId {
        PeerId::from_bytes([tag; 8])
    }

    async fn dispatcher() -> Arc<ChannelDispatcher> {
        let network_key = NetworkKey::from_bytes([3u8; 32]);
        let envelope = Arc::new(CryptoEnvelope::new(&network_key));
        let (transport, _inbound) = mesh_net::spawn("127.0.0.1:0".parse().unwrap(), 16).await.unwrap();
        let peer_cache = PeerCache::shared(PeerCacheConfig::default());
        let (holepunch, _holepunch_events) = mesh_holepunch::spawn(
            HolePunchConfig::default(),
            peer(1),
            transport.clone(),
            envelope.clone(),
            peer_cache.clone(),
        );
        let (relay, _relay_events) = mesh_relay::spawn(
            RelayConfig::default(),
            peer(1),
            NatType::Public,
            transport.clone(),
            envelope.clone(),
            peer_cache.clone(),
        );
        ChannelDispatcher::shared(ChannelConfig::default(), transport, envelope, peer_cache, holepunch, relay)
    }

    #[tokio::test]
    async fn registering_the_same_channel_twice_is_refused() {
        let dispatcher = dispatcher().await;
        let _rx = dispatcher.on_channel("jobs").unwrap();
        let err = dispatcher.on_channel("jobs").unwrap_err();
        assert!(matches!(err, ChannelError::AlreadyRegistered));
    }

    #[tokio::test]
    async fn off_channel_then_re_registering_succeeds() {
        let dispatcher = dispatcher().await;
        let _rx = dispatcher.on_channel("jobs").unwrap();
        dispatcher.off_channel("jobs");
        assert!(dispatcher.on_channel("jobs").is_ok());
    }

    #[tokio::test]
    async fn dispatch_delivers_to_the_registered_handler() {
        let dispatcher = dispatcher().await;
        let mut rx = dispatcher.on_channel("jobs").unwrap();
        dispatcher.dispatch(peer(9), "jobs", b"hello".to_vec());
        let message = rx.recv().await.unwrap();
        assert_eq!(message.from_peer_id, peer(9));
        assert_eq!(message.bytes, b"hello");
    }

    #[tokio::test]
    async fn dispatch_to_an_unregistered_channel_is_dropped_silently() {
        let dispatcher = dispatcher().await;
        // No handler registered for "jobs"; this must not panic.
        dispatcher.dispatch(peer(9), "jobs", b"hello".to_vec());
    }

    #[tokio::test]
    async fn send_with_no_reachable_peer_surfaces_no_path_established() {
        let dispatcher = dispatcher().await;
        let err = dispatcher
            .send_on_channel(b"hi".to_vec(), peer(42), "jobs")
            .await
            .unwrap_err();
        assert!(matches!(err, ChannelError::NoPathEstablished));
    }

    #[tokio::test]
    async fn send_over_a_confirmed_direct_path_uses_that_path() {
        let dispatcher = dispatcher().await;
        let (target_transport, mut target_inbound) =
            mesh_net::spawn("127.0.0.1:0".parse().unwrap(), 16).await.unwrap();
        dispatcher
            .peer_cache
            .touch(peer(9), Endpoint::from(target_transport.local_addr()), 1000);

        dispatcher.send_on_channel(b"hi".to_vec(), peer(9), "jobs").await.unwrap();
        let datagram = tokio::time::timeout(std::time::Duration::from_secs(2), target_inbound.recv())
            .await
            .expect("timed out waiting for a datagram")
            .expect("inbound channel closed");
        assert!(!datagram.bytes.is_empty());
    }
}
