// Copyright (c) 2024 Omerta Mesh Contributors

//! Per-message nonce generation.
//!
//! Per the design notes, nonces must never repeat under a single key. We
//! use a 4-byte random prefix fixed once at process startup, concatenated
//! with an 8-byte little-endian counter. The random prefix makes nonce
//! reuse across a restart astronomically unlikely without requiring the
//! counter itself to be persisted; this implementation does not persist
//! the counter across restarts, relying entirely on the fresh random
//! prefix, which is the documented tradeoff the design notes call out.

use std::sync::atomic::{AtomicU64, Ordering};

/// Generates the 12-byte AEAD nonces for one [`crate::envelope::CryptoEnvelope`].
pub struct NonceSequence {
    prefix: [u8; 4],
    counter: AtomicU64,
}

impl NonceSequence {
    /// Start a fresh sequence with a random 4-byte prefix.
    pub fn new() -> Self {
        let mut prefix = [0u8; 4];
        rand::Rng::fill(&mut rand::thread_rng(), &mut prefix);
        Self {
            prefix,
            counter: AtomicU64::new(0),
        }
    }

    /// Produce the next 12-byte nonce: `prefix || counter` with the
    /// counter incremented atomically so concurrent senders never collide.
    pub fn next(&self) -> [u8; 12] {
        let count = self.counter.fetch_add(1, Ordering::Relaxed);
        let mut nonce = [0u8; 12];
        nonce[..4].copy_from_slice(&self.prefix);
        nonce[4..].copy_from_slice(&count.to_le_bytes());
        nonce
    }
}

impl Default for NonceSequence {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn nonces_never_repeat_within_a_sequence() {
        let seq = NonceSequence::new();
        let mut seen = HashSet::new();
        for _ in 0..10_000 {
            assert!(seen.insert(seq.next()));
        }
    }

    #[test]
    fn two_sequences_almost_certainly_differ_in_prefix() {
        let a = NonceSequence::new();
        let b = NonceSequence::new();
        assert_ne!(a.next()[..4], b.next()[..4]);
    }
}
