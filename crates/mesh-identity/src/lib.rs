// Copyright (c) 2024 Omerta Mesh Contributors

//! Node identity: Ed25519 signing keys, BIP-39 mnemonic bootstrap, and
//! `peer_id` derivation.
//!
//! `peer_id = hex(sha256(public_key)[0..8])`. The same Ed25519 key family
//! is used for both signing and — via HKDF-SHA256 — X25519 key agreement,
//! so an implementer is never tempted to reuse the signing scalar directly
//! for ECDH (see [`Identity::key_agreement_key`]).

pub mod error;

use bip39::{Language, Mnemonic, MnemonicType};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use error::{IdentityError, Result};
use hkdf::Hkdf;
use mesh_common::PeerId;
use sha2::{Digest, Sha256};
use x25519_dalek::StaticSecret;
use zeroize::Zeroizing;

/// Salt used to domain-separate the X25519 agreement key derived from the
/// Ed25519 signing key. Never used directly as an ECDH scalar.
const KEY_AGREEMENT_SALT: &[u8] = b"omerta-key-agreement";

/// A 32-byte Ed25519/X25519 public key, plus its derived [`PeerId`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct PeerPublicKey(#[serde(with = "serde_bytes32")] [u8; 32]);

impl PeerPublicKey {
    /// Wrap a raw 32-byte Ed25519 public key.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Parse from an arbitrary-length byte slice.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| IdentityError::MalformedPublicKey(bytes.len()))?;
        Ok(Self(arr))
    }

    /// The raw 32 bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Derive this key's `peer_id`: the first 8 bytes of `sha256(pubkey)`.
    pub fn peer_id(&self) -> PeerId {
        let digest = Sha256::digest(self.0);
        let mut id = [0u8; 8];
        id.copy_from_slice(&digest[..8]);
        PeerId::from_bytes(id)
    }

    fn verifying_key(&self) -> Result<VerifyingKey> {
        VerifyingKey::from_bytes(&self.0).map_err(|_| IdentityError::MalformedPublicKey(32))
    }
}

mod serde_bytes32 {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8; 32], s: S) -> Result<S::Ok, S::Error> {
        hex::encode(bytes).serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<[u8; 32], D::Error> {
        let s = String::deserialize(d)?;
        let raw = hex::decode(&s).map_err(serde::de::Error::custom)?;
        raw.try_into()
            .map_err(|_| serde::de::Error::custom("expected 32 bytes"))
    }
}

/// A node's private identity: an Ed25519 signing key plus the X25519
/// agreement key HKDF-derived from it.
pub struct Identity {
    signing_key: SigningKey,
}

impl std::fmt::Debug for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Identity").finish_non_exhaustive()
    }
}

impl Identity {
    /// Generate a fresh identity from 128 bits of OS entropy, returning the
    /// identity alongside the 12-word BIP-39 mnemonic that restores it.
    pub fn generate() -> (Self, String) {
        // `Mnemonic::new` pulls its entropy from the OS RNG internally.
        let mnemonic = Mnemonic::new(MnemonicType::Words12, Language::English);
        let entropy: [u8; 16] = mnemonic
            .entropy()
            .try_into()
            .expect("MnemonicType::Words12 is always 16 bytes of entropy");
        let identity = Self::from_entropy(&entropy);
        (identity, mnemonic.phrase().to_string())
    }

    /// Deterministically restore an identity from a 12-word BIP-39
    /// mnemonic. Returns [`IdentityError::InvalidMnemonic`] on a bad
    /// checksum or unknown word.
    pub fn derive_from(phrase: &str) -> Result<Self> {
        let mnemonic = Mnemonic::from_phrase(phrase, Language::English)
            .map_err(|e| IdentityError::InvalidMnemonic(e.to_string()))?;
        let entropy: [u8; 16] = mnemonic
            .entropy()
            .try_into()
            .map_err(|_| IdentityError::InvalidMnemonic("unexpected entropy length".into()))?;
        Ok(Self::from_entropy(&entropy))
    }

    /// Restore an identity from a raw 32-byte Ed25519 seed, as persisted in
    /// the collaborator's identity file (`private_key_hex32`).
    pub fn from_signing_seed(seed: [u8; 32]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(&seed),
        }
    }

    /// The raw 32-byte seed, for persistence by the collaborator.
    pub fn signing_seed(&self) -> [u8; 32] {
        self.signing_key.to_bytes()
    }

    fn from_entropy(entropy: &[u8; 16]) -> Self {
        // Stretch the 16-byte BIP-39 entropy into a 32-byte Ed25519 seed.
        // A single SHA-256 is sufficient domain separation since the
        // mnemonic itself is the only secret material in play.
        let seed = Sha256::digest(entropy);
        let seed: [u8; 32] = seed.into();
        Self::from_signing_seed(seed)
    }

    /// This identity's public key.
    pub fn public_key(&self) -> PeerPublicKey {
        PeerPublicKey::from_bytes(self.signing_key.verifying_key().to_bytes())
    }

    /// This identity's `peer_id`.
    pub fn peer_id(&self) -> PeerId {
        self.public_key().peer_id()
    }

    /// Sign `msg` with the Ed25519 signing key.
    pub fn sign(&self, msg: &[u8]) -> [u8; 64] {
        self.signing_key.sign(msg).to_bytes()
    }

    /// Verify a 64-byte signature over `msg` against `public_key`.
    pub fn verify(public_key: &PeerPublicKey, msg: &[u8], sig: &[u8]) -> bool {
        let Ok(verifying_key) = public_key.verifying_key() else {
            return false;
        };
        let Ok(sig_bytes): std::result::Result<[u8; 64], _> = sig.try_into() else {
            return false;
        };
        let signature = Signature::from_bytes(&sig_bytes);
        verifying_key.verify(msg, &signature).is_ok()
    }

    /// Derive the X25519 key-agreement secret via HKDF-SHA256 over the
    /// Ed25519 seed, salted with `"omerta-key-agreement"`, so the signing
    /// scalar is never used directly for ECDH.
    pub fn key_agreement_key(&self) -> StaticSecret {
        let hk = Hkdf::<Sha256>::new(Some(KEY_AGREEMENT_SALT), &self.signing_key.to_bytes());
        let mut okm = Zeroizing::new([0u8; 32]);
        hk.expand(b"x25519-agreement-key", &mut *okm)
            .expect("32 is a valid HKDF-SHA256 output length");
        StaticSecret::from(*okm)
    }
}
