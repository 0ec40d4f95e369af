// Copyright (c) 2024 Omerta Mesh Contributors

//! The 32-byte symmetric key shared by all members of one named network.

use crate::error::{CryptoError, Result};
use sha2::{Digest, Sha256};

/// A 32-byte symmetric key shared by every member of one named network.
/// All datagrams on that network are AEAD-sealed under a key derived from
/// this one (see [`crate::envelope::CryptoEnvelope`]).
#[derive(Clone, Copy)]
pub struct NetworkKey([u8; 32]);

impl NetworkKey {
    /// Wrap a raw 32-byte key.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Parse from an arbitrary-length byte slice (e.g. `network_key_hex32`
    /// from the networks file, or the decoded invite URL field).
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| CryptoError::InvalidNetworkKeyLength(bytes.len()))?;
        Ok(Self(arr))
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// The short `network_id` carried in the envelope header: the first 8
    /// bytes of `sha256(network_key)`.
    pub fn network_id(&self) -> [u8; 8] {
        let digest = Sha256::digest(self.0);
        let mut id = [0u8; 8];
        id.copy_from_slice(&digest[..8]);
        id
    }
}

impl std::fmt::Debug for NetworkKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "NetworkKey(network_id={})", hex::encode(self.network_id()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn network_id_is_deterministic() {
        let key = NetworkKey::from_bytes([0x42; 32]);
        assert_eq!(key.network_id(), key.network_id());
    }

    #[test]
    fn different_keys_give_different_ids() {
        let a = NetworkKey::from_bytes([1; 32]);
        let b = NetworkKey::from_bytes([2; 32]);
        assert_ne!(a.network_id(), b.network_id());
    }

    #[test]
    fn rejects_wrong_length() {
        assert!(NetworkKey::from_slice(&[0u8; 31]).is_err());
    }
}
