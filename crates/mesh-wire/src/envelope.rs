// Copyright (c) 2024 Omerta Mesh Contributors

//! The outer, unencrypted datagram header: version, network id and AEAD
//! nonce. Sealing/opening the AEAD body itself lives in `mesh-crypto`,
//! which depends on this module for the header layout.
//!
//! Wire layout (§6): `envelope_version (1B, =1) || network_id_len (1B) ||
//! network_id (network_id_len bytes) || aead_nonce (12B) ||
//! aead_ciphertext_and_tag`. All multi-byte integers are big-endian (the
//! only multi-byte integer in the header is absent — lengths are 1 byte —
//! so this is a statement of intent for future header fields).

use crate::error::{Result, WireError};

/// Current, and so far only, envelope version.
pub const ENVELOPE_VERSION: u8 = 1;

/// Length in bytes of the AEAD nonce carried in the header.
pub const NONCE_LEN: usize = 12;

/// Length in bytes of a `network_id` (first 8 bytes of
/// `sha256(network_key)`).
pub const NETWORK_ID_LEN: usize = 8;

/// The parsed, not-yet-decrypted header of an inbound datagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnvelopeHeader {
    pub network_id: [u8; NETWORK_ID_LEN],
    pub nonce: [u8; NONCE_LEN],
}

impl EnvelopeHeader {
    /// Serialized header length in bytes (version + len byte + id + nonce).
    pub const LEN: usize = 1 + 1 + NETWORK_ID_LEN + NONCE_LEN;

    /// Write `version || network_id_len || network_id || nonce` to `out`.
    pub fn write(&self, out: &mut Vec<u8>) {
        out.push(ENVELOPE_VERSION);
        out.push(NETWORK_ID_LEN as u8);
        out.extend_from_slice(&self.network_id);
        out.extend_from_slice(&self.nonce);
    }

    /// Parse the header from the front of `datagram`, returning the header
    /// and the remaining ciphertext-and-tag slice.
    pub fn parse(datagram: &[u8]) -> Result<(Self, &[u8])> {
        if datagram.len() < 2 {
            return Err(WireError::Decode("datagram shorter than header prefix".into()));
        }
        let version = datagram[0];
        if version != ENVELOPE_VERSION {
            return Err(WireError::Decode(format!("unsupported envelope version {version}")));
        }
        let id_len = datagram[1] as usize;
        if id_len != NETWORK_ID_LEN {
            return Err(WireError::Decode(format!("unexpected network_id_len {id_len}")));
        }
        let rest = &datagram[2..];
        if rest.len() < NETWORK_ID_LEN + NONCE_LEN {
            return Err(WireError::Decode("datagram shorter than header".into()));
        }
        let mut network_id = [0u8; NETWORK_ID_LEN];
        network_id.copy_from_slice(&rest[..NETWORK_ID_LEN]);
        let mut nonce = [0u8; NONCE_LEN];
        nonce.copy_from_slice(&rest[NETWORK_ID_LEN..NETWORK_ID_LEN + NONCE_LEN]);
        let ciphertext = &rest[NETWORK_ID_LEN + NONCE_LEN..];
        Ok((Self { network_id, nonce }, ciphertext))
    }
}
