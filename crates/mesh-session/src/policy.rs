// Copyright (c) 2024 Omerta Mesh Contributors

//! The accept/reject policy consulted on an inbound `request` (§4.9:
//! "auto-accepts (default policy) ... or rejects via policy callback").

use mesh_common::PeerId;

/// Decides whether an inbound tunnel request from `peer_id` is accepted.
pub trait TunnelPolicy: Send + Sync {
    fn accept(&self, peer_id: PeerId) -> bool;
}

/// The default policy: accept every request.
#[derive(Debug, Default, Clone, Copy)]
pub struct AutoAccept;

impl TunnelPolicy for AutoAccept {
    fn accept(&self, _peer_id: PeerId) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auto_accept_accepts_everyone() {
        let policy = AutoAccept;
        assert!(policy.accept(PeerId::from_bytes([1; 8])));
    }
}
