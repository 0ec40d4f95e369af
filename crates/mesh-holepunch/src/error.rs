// Copyright (c) 2024 Omerta Mesh Contributors

//! Hole-punch failure taxonomy (§4.5: "a hole-punch failure is reported up
//! as one of `{no-coordinator, peer-unreachable, nat-incompatible,
//! timeout}`").

use displaydoc::Display;
use mesh_common::{kind::Classify, ErrorKind};
use thiserror::Error;

#[derive(Debug, Clone, Copy, Display, Error)]
pub enum HolePunchError {
    /// no verified peer currently advertises hole-punch coordination
    NoCoordinator,
    /// coordinator holds no live record for the target peer
    PeerUnreachable,
    /// both sides' NAT classifications rule out a direct path
    NatIncompatible,
    /// no probe_ack arrived before the hole-punch timeout elapsed
    Timeout,
    /// hole-punch engine has shut down
    Closed,
}

impl Classify for HolePunchError {
    fn kind(&self) -> ErrorKind {
        match self {
            HolePunchError::NoCoordinator | HolePunchError::PeerUnreachable => {
                ErrorKind::Reachability
            }
            HolePunchError::NatIncompatible => ErrorKind::Reachability,
            HolePunchError::Timeout => ErrorKind::TransientNetwork,
            HolePunchError::Closed => ErrorKind::Resource,
        }
    }
}

pub type Result<T> = std::result::Result<T, HolePunchError>;
