// Copyright (c) 2024 Omerta Mesh Contributors

//! Crypto envelope errors.

use displaydoc::Display;
use mesh_common::{kind::Classify, ErrorKind};
use thiserror::Error;

/// Errors sealing or opening a datagram envelope.
#[derive(Debug, Display, Error)]
pub enum CryptoError {
    /// network key must be exactly 32 bytes, got {0}
    InvalidNetworkKeyLength(usize),
    /// AEAD authentication failed; datagram dropped
    AuthenticationFailed,
    /// no known network key matches this datagram's network id
    UnknownNetworkId,
    /// frame codec error: {0}
    Wire(#[from] mesh_wire::WireError),
}

impl Classify for CryptoError {
    fn kind(&self) -> ErrorKind {
        match self {
            CryptoError::InvalidNetworkKeyLength(_) => ErrorKind::Configuration,
            CryptoError::AuthenticationFailed | CryptoError::UnknownNetworkId => {
                ErrorKind::Cryptographic
            }
            CryptoError::Wire(_) => ErrorKind::Protocol,
        }
    }
}

pub type Result<T> = std::result::Result<T, CryptoError>;
