// Copyright (c) 2024 Omerta Mesh Contributors

//! Identity errors. Purely functional (no I/O) so every variant is a
//! rejected input, never a transient condition.

use displaydoc::Display;
use mesh_common::{ErrorKind, kind::Classify};
use thiserror::Error;

/// Errors that can occur deriving or verifying a node identity.
#[derive(Debug, Display, Error)]
pub enum IdentityError {
    /// invalid BIP-39 mnemonic: {0}
    InvalidMnemonic(String),
    /// malformed public key, expected 32 bytes, got {0}
    MalformedPublicKey(usize),
    /// malformed signature, expected 64 bytes, got {0}
    MalformedSignature(usize),
}

impl Classify for IdentityError {
    fn kind(&self) -> ErrorKind {
        match self {
            IdentityError::InvalidMnemonic(_) => ErrorKind::Configuration,
            IdentityError::MalformedPublicKey(_) | IdentityError::MalformedSignature(_) => {
                ErrorKind::Cryptographic
            }
        }
    }
}

/// Convenience alias for identity-module results.
pub type Result<T> = std::result::Result<T, IdentityError>;
