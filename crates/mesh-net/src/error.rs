// Copyright (c) 2024 Omerta Mesh Contributors

//! Socket I/O errors.

use displaydoc::Display;
use mesh_common::{kind::Classify, ErrorKind};
use thiserror::Error;

/// Errors binding the node's socket or enqueuing an outbound datagram.
#[derive(Debug, Display, Error)]
pub enum NetError {
    /// failed to bind UDP socket on {0}: {1}
    Bind(std::net::SocketAddr, std::io::Error),
    /// outbound send queue is full, dropped datagram to {0}
    QueueFull(std::net::SocketAddr),
    /// transport has already shut down
    Closed,
}

impl Classify for NetError {
    fn kind(&self) -> ErrorKind {
        match self {
            NetError::Bind(..) => ErrorKind::Configuration,
            NetError::QueueFull(_) | NetError::Closed => ErrorKind::TransientNetwork,
        }
    }
}

pub type Result<T> = std::result::Result<T, NetError>;
