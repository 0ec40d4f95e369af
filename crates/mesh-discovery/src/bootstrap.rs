// Copyright (c) 2024 Omerta Mesh Contributors

//! The `peer_id_hex16@host:port` bootstrap-peer syntax (§6).

use crate::error::{DiscoveryError, Result};
use mesh_common::{Endpoint, PeerId};
use std::str::FromStr;

/// One configured bootstrap peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BootstrapPeer {
    pub peer_id: PeerId,
    pub endpoint: Endpoint,
}

impl FromStr for BootstrapPeer {
    type Err = DiscoveryError;

    fn from_str(s: &str) -> Result<Self> {
        let (peer_id_hex, rest) = s
            .split_once('@')
            .ok_or_else(|| DiscoveryError::MalformedBootstrapString(s.to_string()))?;
        let peer_id = PeerId::from_hex(peer_id_hex)
            .ok_or_else(|| DiscoveryError::MalformedBootstrapString(s.to_string()))?;
        let endpoint = rest
            .parse::<Endpoint>()
            .map_err(|_| DiscoveryError::MalformedBootstrapString(s.to_string()))?;
        Ok(Self { peer_id, endpoint })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_valid_bootstrap_string() {
        let parsed: BootstrapPeer = "aaaaaaaaaaaaaaaa@203.0.113.9:9000".parse().unwrap();
        assert_eq!(parsed.peer_id, PeerId::from_hex("aaaaaaaaaaaaaaaa").unwrap());
        assert_eq!(parsed.endpoint.port(), 9000);
    }

    #[test]
    fn rejects_missing_at_sign() {
        assert!("aaaaaaaaaaaaaaaa-203.0.113.9:9000"
            .parse::<BootstrapPeer>()
            .is_err());
    }

    #[test]
    fn rejects_bad_peer_id() {
        assert!("nothex@203.0.113.9:9000".parse::<BootstrapPeer>().is_err());
    }

    #[test]
    fn rejects_bad_endpoint() {
        assert!("aaaaaaaaaaaaaaaa@not-an-endpoint"
            .parse::<BootstrapPeer>()
            .is_err());
    }
}
