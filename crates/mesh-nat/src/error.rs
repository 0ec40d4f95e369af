// Copyright (c) 2024 Omerta Mesh Contributors

//! NAT detection errors.

use displaydoc::Display;
use mesh_common::{kind::Classify, ErrorKind};
use thiserror::Error;

/// Errors raised while classifying the local NAT.
#[derive(Debug, Display, Error)]
pub enum NatError {
    /// at least two rendezvous servers are required, got {0}
    NotEnoughRendezvousServers(usize),
    /// no rendezvous server answered before the detection deadline
    AllServersUnreachable,
    /// malformed probe response from {0}
    MalformedResponse(std::net::SocketAddr),
    /// NAT detector has shut down
    Closed,
}

impl Classify for NatError {
    fn kind(&self) -> ErrorKind {
        match self {
            NatError::NotEnoughRendezvousServers(_) => ErrorKind::Configuration,
            NatError::AllServersUnreachable => ErrorKind::TransientNetwork,
            NatError::MalformedResponse(_) => ErrorKind::Protocol,
            NatError::Closed => ErrorKind::Resource,
        }
    }
}

pub type Result<T> = std::result::Result<T, NatError>;
