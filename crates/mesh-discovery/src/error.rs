// Copyright (c) 2024 Omerta Mesh Contributors

//! Discovery/bootstrap errors.

use displaydoc::Display;
use mesh_common::{kind::Classify, ErrorKind};
use thiserror::Error;

/// Errors parsing bootstrap configuration or running discovery.
#[derive(Debug, Display, Error)]
pub enum DiscoveryError {
    /// malformed bootstrap peer string {0:?}, expected peer_id_hex16@host:port
    MalformedBootstrapString(String),
    /// discovery engine has shut down
    Closed,
}

impl Classify for DiscoveryError {
    fn kind(&self) -> ErrorKind {
        match self {
            DiscoveryError::MalformedBootstrapString(_) => ErrorKind::Configuration,
            DiscoveryError::Closed => ErrorKind::Resource,
        }
    }
}

pub type Result<T> = std::result::Result<T, DiscoveryError>;
