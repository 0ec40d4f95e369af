// Copyright (c) 2024 Omerta Mesh Contributors

//! Shared error taxonomy, endpoint type and logging glue used across every
//! mesh crate.
//!
//! Individual crates define their own error enum (see each crate's
//! `error` module) but all of them implement [`ErrorKind`] classification so
//! a caller can branch on the taxonomy from ch. 7 of the design without
//! matching every concrete variant.

pub mod endpoint;
pub mod kind;
pub mod logging;
pub mod nat_type;

pub use endpoint::Endpoint;
pub use kind::ErrorKind;
pub use nat_type::NatType;

/// A 16-lowercase-hex-character self-authenticating peer identifier.
///
/// Derivation and verification live in `mesh-identity`; this type is just
/// the wire/display representation shared by every downstream crate.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct PeerId([u8; 8]);

impl PeerId {
    /// Build a `PeerId` from raw derived bytes (the first 8 bytes of
    /// `sha256(public_key)`).
    pub fn from_bytes(bytes: [u8; 8]) -> Self {
        Self(bytes)
    }

    /// Raw 8-byte form.
    pub fn as_bytes(&self) -> &[u8; 8] {
        &self.0
    }

    /// Parse a 16-character lowercase hex string.
    pub fn from_hex(s: &str) -> Option<Self> {
        if s.len() != 16 || !s.bytes().all(|b| b.is_ascii_hexdigit() && !b.is_ascii_uppercase()) {
            return None;
        }
        let raw = hex::decode(s).ok()?;
        let arr: [u8; 8] = raw.try_into().ok()?;
        Some(Self(arr))
    }
}

impl std::fmt::Display for PeerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl std::fmt::Debug for PeerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PeerId({})", self)
    }
}

impl std::str::FromStr for PeerId {
    type Err = PeerIdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s).ok_or(PeerIdParseError)
    }
}

/// The supplied string is not 16 lowercase hex characters.
#[derive(Debug, Clone, Copy, displaydoc::Display, thiserror::Error)]
#[displaydoc("peer id must be 16 lowercase hex characters")]
pub struct PeerIdParseError;
