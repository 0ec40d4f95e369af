// Copyright (c) 2024 Omerta Mesh Contributors

//! Tunnel session failure taxonomy (§4.9, §7).

use displaydoc::Display;
use mesh_common::{kind::Classify, ErrorKind};
use thiserror::Error;

#[derive(Debug, Display, Error)]
pub enum TunnelError {
    /// no session is currently active with any peer
    NoActiveSession,
    /// the remote peer rejected the session request
    Rejected,
    /// no ack or reject arrived before the handshake timeout elapsed
    HandshakeTimeout,
    /// the handshake channel could not be registered or is already in use
    ChannelUnavailable,
    /// tunnel manager has shut down
    Closed,
}

impl Classify for TunnelError {
    fn kind(&self) -> ErrorKind {
        match self {
            TunnelError::NoActiveSession => ErrorKind::Protocol,
            TunnelError::Rejected => ErrorKind::Reachability,
            TunnelError::HandshakeTimeout => ErrorKind::TransientNetwork,
            TunnelError::ChannelUnavailable => ErrorKind::Resource,
            TunnelError::Closed => ErrorKind::Resource,
        }
    }
}

pub type Result<T> = std::result::Result<T, TunnelError>;
