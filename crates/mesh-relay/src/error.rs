// Copyright (c) 2024 Omerta Mesh Contributors

//! Relay selection and session errors.

use displaydoc::Display;
use mesh_common::{kind::Classify, ErrorKind};
use mesh_wire::RelayDenyReason;
use thiserror::Error;

#[derive(Debug, Display, Error)]
pub enum RelayError {
    /// no relay-capable peer is currently known
    NoCandidates,
    /// every connected relay has missed too many heartbeats
    AllRelaysUnhealthy,
    /// relay reported it is at capacity and refused a new session
    Denied(RelayDenyReason),
    /// no live session with this id is known locally
    SessionNotFound,
    /// relay engine has shut down
    Closed,
}

impl Classify for RelayError {
    fn kind(&self) -> ErrorKind {
        match self {
            RelayError::NoCandidates | RelayError::AllRelaysUnhealthy => ErrorKind::Relay,
            RelayError::Denied(_) => ErrorKind::Relay,
            RelayError::SessionNotFound => ErrorKind::Protocol,
            RelayError::Closed => ErrorKind::Resource,
        }
    }
}

pub type Result<T> = std::result::Result<T, RelayError>;
