// Copyright (c) 2024 Omerta Mesh Contributors

//! Peer cache errors.

use displaydoc::Display;
use mesh_common::{kind::Classify, ErrorKind};
use thiserror::Error;

/// Errors reading or writing the peer cache's warm-start file.
#[derive(Debug, Display, Error)]
pub enum PeerCacheError {
    /// failed to read peer cache file {0}: {1}
    ReadFile(String, std::io::Error),
    /// failed to write peer cache file {0}: {1}
    WriteFile(String, std::io::Error),
    /// malformed peer cache file: {0}
    Malformed(serde_json::Error),
}

impl Classify for PeerCacheError {
    fn kind(&self) -> ErrorKind {
        match self {
            PeerCacheError::ReadFile(..) | PeerCacheError::WriteFile(..) => {
                ErrorKind::Configuration
            }
            PeerCacheError::Malformed(_) => ErrorKind::Protocol,
        }
    }
}

pub type Result<T> = std::result::Result<T, PeerCacheError>;
