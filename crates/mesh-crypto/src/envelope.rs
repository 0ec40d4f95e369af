// Copyright (c) 2024 Omerta Mesh Contributors

//! Sealing and opening the AEAD body of a datagram, tying together the
//! [`mesh_wire::EnvelopeHeader`] framing with a ChaCha20-Poly1305 cipher
//! keyed off a [`NetworkKey`].
//!
//! The cipher key is never the raw network key. It is derived with
//! HKDF-SHA256 so that compromising the derived per-direction material
//! (there is only one direction here, but the derivation leaves room for
//! that) does not hand an attacker the network key itself.

use crate::error::{CryptoError, Result};
use crate::network_key::NetworkKey;
use crate::nonce::NonceSequence;
use aead::{Aead, KeyInit, Payload};
use chacha20poly1305::{ChaCha20Poly1305, Key};
use hkdf::Hkdf;
use mesh_wire::{EnvelopeHeader, Frame};
use sha2::Sha256;

const AEAD_KEY_SALT: &[u8] = b"omerta-envelope-aead-key";

fn derive_aead_key(network_key: &NetworkKey) -> Key {
    let hk = Hkdf::<Sha256>::new(Some(AEAD_KEY_SALT), network_key.as_bytes());
    let mut okm = [0u8; 32];
    hk.expand(b"chacha20poly1305", &mut okm)
        .expect("32 bytes is a valid HKDF-SHA256 output length");
    Key::from(okm)
}

/// Seals and opens datagrams for a single known network.
///
/// One instance is created per [`NetworkKey`] a node has joined; `mesh-node`
/// keeps a map of these keyed by `network_id` so an inbound datagram can be
/// routed to the matching network without trying every key (§3: "a
/// datagram whose outer envelope does not authenticate under any known
/// network_key is silently dropped").
pub struct CryptoEnvelope {
    network_id: [u8; 8],
    cipher: ChaCha20Poly1305,
    nonces: NonceSequence,
}

impl CryptoEnvelope {
    /// Build the envelope sealer/opener for one network key.
    pub fn new(network_key: &NetworkKey) -> Self {
        let cipher = ChaCha20Poly1305::new(&derive_aead_key(network_key));
        Self {
            network_id: network_key.network_id(),
            cipher,
            nonces: NonceSequence::new(),
        }
    }

    /// The `network_id` this envelope authenticates datagrams for.
    pub fn network_id(&self) -> [u8; 8] {
        self.network_id
    }

    /// CBOR-encode `frame`, seal it, and prefix the wire header. The
    /// returned bytes are a complete outbound datagram.
    pub fn seal(&self, frame: &Frame) -> Result<Vec<u8>> {
        let plaintext = frame.encode()?;
        let nonce = self.nonces.next();
        let header = EnvelopeHeader {
            network_id: self.network_id,
            nonce,
        };

        let mut header_bytes = Vec::with_capacity(EnvelopeHeader::LEN);
        header.write(&mut header_bytes);

        let ciphertext = self
            .cipher
            .encrypt(
                chacha20poly1305::Nonce::from_slice(&nonce),
                Payload {
                    msg: &plaintext,
                    aad: &header_bytes,
                },
            )
            .map_err(|_| CryptoError::AuthenticationFailed)?;

        let mut datagram = header_bytes;
        datagram.extend_from_slice(&ciphertext);
        Ok(datagram)
    }

    /// Verify and decrypt a datagram already known (by `header.network_id`)
    /// to belong to this network, returning the decoded [`Frame`].
    ///
    /// Callers first call [`EnvelopeHeader::parse`] to pick the matching
    /// `CryptoEnvelope` out of their known-networks map, then pass the
    /// parsed header and ciphertext here.
    pub fn open(&self, header: &EnvelopeHeader, ciphertext: &[u8]) -> Result<Frame> {
        let mut header_bytes = Vec::with_capacity(EnvelopeHeader::LEN);
        header.write(&mut header_bytes);

        let plaintext = self
            .cipher
            .decrypt(
                chacha20poly1305::Nonce::from_slice(&header.nonce),
                Payload {
                    msg: ciphertext,
                    aad: &header_bytes,
                },
            )
            .map_err(|_| CryptoError::AuthenticationFailed)?;

        Ok(Frame::decode(&plaintext)?)
    }
}

/// Parse the header off `datagram` and, if `network_id` matches one of
/// `known`, open it under that envelope. Returns [`CryptoError::UnknownNetworkId`]
/// if no envelope claims the header's `network_id`.
pub fn open_any<'a>(
    datagram: &[u8],
    known: impl IntoIterator<Item = &'a CryptoEnvelope>,
) -> Result<Frame> {
    let (header, ciphertext) = EnvelopeHeader::parse(datagram)?;
    for envelope in known {
        if envelope.network_id() == header.network_id {
            return envelope.open(&header, ciphertext);
        }
    }
    Err(CryptoError::UnknownNetworkId)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_frame() -> Frame {
        Frame::channel_data("jobs", b"hello mesh".to_vec()).unwrap()
    }

    #[test]
    fn round_trips_through_seal_and_open() {
        let key = NetworkKey::from_bytes([7u8; 32]);
        let envelope = CryptoEnvelope::new(&key);
        let datagram = envelope.seal(&sample_frame()).unwrap();

        let (header, ciphertext) = EnvelopeHeader::parse(&datagram).unwrap();
        let opened = envelope.open(&header, ciphertext).unwrap();
        assert_eq!(opened, sample_frame());
    }

    #[test]
    fn open_any_picks_the_matching_network() {
        let key_a = NetworkKey::from_bytes([1u8; 32]);
        let key_b = NetworkKey::from_bytes([2u8; 32]);
        let envelope_a = CryptoEnvelope::new(&key_a);
        let envelope_b = CryptoEnvelope::new(&key_b);

        let datagram = envelope_b.seal(&sample_frame()).unwrap();
        let opened = open_any(&datagram, [&envelope_a, &envelope_b]).unwrap();
        assert_eq!(opened, sample_frame());
    }

    #[test]
    fn open_any_rejects_unknown_network() {
        let key_a = NetworkKey::from_bytes([1u8; 32]);
        let key_b = NetworkKey::from_bytes([2u8; 32]);
        let envelope_a = CryptoEnvelope::new(&key_a);
        let envelope_b = CryptoEnvelope::new(&key_b);

        let datagram = envelope_b.seal(&sample_frame()).unwrap();
        let err = open_any(&datagram, [&envelope_a]).unwrap_err();
        assert!(matches!(err, CryptoError::UnknownNetworkId));
    }

    #[test]
    fn bit_flip_in_ciphertext_fails_authentication() {
        let key = NetworkKey::from_bytes([9u8; 32]);
        let envelope = CryptoEnvelope::new(&key);
        let mut datagram = envelope.seal(&sample_frame()).unwrap();
        let last = datagram.len() - 1;
        datagram[last] ^= 0x01;

        let (header, ciphertext) = EnvelopeHeader::parse(&datagram).unwrap();
        let err = envelope.open(&header, ciphertext).unwrap_err();
        assert!(matches!(err, CryptoError::AuthenticationFailed));
    }

    #[test]
    fn bit_flip_in_nonce_fails_authentication() {
        let key = NetworkKey::from_bytes([3u8; 32]);
        let envelope = CryptoEnvelope::new(&key);
        let datagram = envelope.seal(&sample_frame()).unwrap();

        let (mut header, ciphertext) = EnvelopeHeader::parse(&datagram).unwrap();
        header.nonce[0] ^= 0x01;
        let err = envelope.open(&header, ciphertext).unwrap_err();
        assert!(matches!(err, CryptoError::AuthenticationFailed));
    }

    #[test]
    fn two_sealed_messages_never_cross_decrypt() {
        let key = NetworkKey::from_bytes([5u8; 32]);
        let envelope = CryptoEnvelope::new(&key);
        let frame_one = Frame::channel_data("a", b"one".to_vec()).unwrap();
        let frame_two = Frame::channel_data("b", b"two".to_vec()).unwrap();

        let datagram_one = envelope.seal(&frame_one).unwrap();
        let datagram_two = envelope.seal(&frame_two).unwrap();

        let (header_one, ciphertext_one) = EnvelopeHeader::parse(&datagram_one).unwrap();
        let (header_two, _) = EnvelopeHeader::parse(&datagram_two).unwrap();

        assert_eq!(envelope.open(&header_one, ciphertext_one).unwrap(), frame_one);
        // Swapping in the other message's nonce must not authenticate
        // `ciphertext_one`'s bytes.
        let err = envelope
            .open(
                &EnvelopeHeader {
                    network_id: header_one.network_id,
                    nonce: header_two.nonce,
                },
                ciphertext_one,
            )
            .unwrap_err();
        assert!(matches!(err, CryptoError::AuthenticationFailed));
    }
}
