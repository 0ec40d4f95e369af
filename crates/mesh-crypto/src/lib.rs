// Copyright (c) 2024 Omerta Mesh Contributors

//! The per-network AEAD envelope: deriving a cipher key from a
//! [`NetworkKey`], sequencing nonces, and sealing/opening the
//! [`mesh_wire::Frame`] plaintext carried inside every datagram.

pub mod envelope;
pub mod error;
pub mod network_key;
pub mod nonce;

pub use envelope::{open_any, CryptoEnvelope};
pub use error::CryptoError;
pub use network_key::NetworkKey;
pub use nonce::NonceSequence;
