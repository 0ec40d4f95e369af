// Copyright (c) 2024 Omerta Mesh Contributors

//! The node-level error enum, composing every collaborator crate's error
//! with `#[from]` the way `mc-peers::error::Error` composes `ConversionError`
//! and `GrpcError` (§7).

use displaydoc::Display;
use mesh_common::kind::Classify;
use mesh_common::ErrorKind;
use thiserror::Error;

#[derive(Debug, Display, Error)]
pub enum MeshError {
    /// network key must be 32 bytes, got {0}
    InvalidNetworkKey(usize),
    /// could not bind the mesh UDP socket
    Bind(#[from] mesh_net::NetError),
    /// NAT detection failed: {0}
    Nat(#[from] mesh_nat::NatError),
    /// discovery error: {0}
    Discovery(#[from] mesh_discovery::DiscoveryError),
    /// hole punching failed: {0}
    HolePunch(#[from] mesh_holepunch::HolePunchError),
    /// relay error: {0}
    Relay(#[from] mesh_relay::RelayError),
    /// channel error: {0}
    Channel(#[from] mesh_channel::ChannelError),
    /// tunnel error: {0}
    Tunnel(#[from] mesh_session::TunnelError),
    /// identity error: {0}
    Identity(#[from] mesh_identity::error::IdentityError),
    /// peer cache error: {0}
    PeerCache(#[from] mesh_peercache::PeerCacheError),
    /// persisted state file `{0}` could not be read or parsed: {1}
    Persistence(String, String),
    /// the node has already been started
    AlreadyStarted,
    /// the node has not been started
    NotStarted,
}

impl Classify for MeshError {
    fn kind(&self) -> ErrorKind {
        match self {
            MeshError::InvalidNetworkKey(_) => ErrorKind::Configuration,
            MeshError::Bind(e) => e.kind(),
            MeshError::Nat(e) => e.kind(),
            MeshError::Discovery(e) => e.kind(),
            MeshError::HolePunch(e) => e.kind(),
            MeshError::Relay(e) => e.kind(),
            MeshError::Channel(e) => e.kind(),
            MeshError::Tunnel(e) => e.kind(),
            MeshError::Identity(e) => e.kind(),
            MeshError::PeerCache(e) => e.kind(),
            MeshError::Persistence(_, _) => ErrorKind::Configuration,
            MeshError::AlreadyStarted => ErrorKind::Resource,
            MeshError::NotStarted => ErrorKind::Resource,
        }
    }
}

pub type Result<T> = std::result::Result<T, MeshError>;
