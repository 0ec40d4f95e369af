// Copyright (c) 2024 Omerta Mesh Contributors

//! The NAT classification shared by the NAT detector, peer cache, gossip
//! frames and relay scoring.

use serde::{Deserialize, Serialize};

/// Empirical classification of a node's outbound address-translation
/// behavior, as probed against two independent STUN-like servers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum NatType {
    /// Directly reachable; the mapped endpoint equals the local endpoint.
    Public,
    /// Any external host can reach the mapped endpoint once it is opened.
    FullCone,
    /// Only hosts the local node has sent to can reach the mapped endpoint.
    RestrictedCone,
    /// As `RestrictedCone`, further restricted to the exact source port.
    PortRestricted,
    /// The mapped endpoint differs per destination; direct dial is not
    /// possible and hole-punching requires port prediction.
    Symmetric,
    /// Classification did not complete or produced conflicting results.
    #[default]
    Unknown,
}

impl NatType {
    /// The relay-scoring bonus from the component design's scoring formula:
    /// `30` public, `20` full-cone, `10` restricted/port-restricted, `0`
    /// symmetric/unknown.
    pub fn relay_score_bonus(&self) -> f64 {
        match self {
            NatType::Public => 30.0,
            NatType::FullCone => 20.0,
            NatType::RestrictedCone | NatType::PortRestricted => 10.0,
            NatType::Symmetric | NatType::Unknown => 0.0,
        }
    }

    /// Whether this NAT type mandates relaying rather than attempting
    /// direct dial or hole-punching first.
    pub fn mandates_relay(&self) -> bool {
        matches!(self, NatType::Symmetric | NatType::Unknown)
    }
}

impl std::fmt::Display for NatType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            NatType::Public => "public",
            NatType::FullCone => "full-cone",
            NatType::RestrictedCone => "restricted-cone",
            NatType::PortRestricted => "port-restricted",
            NatType::Symmetric => "symmetric",
            NatType::Unknown => "unknown",
        };
        write!(f, "{s}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relay_bonus_matches_scoring_table() {
        assert_eq!(NatType::Public.relay_score_bonus(), 30.0);
        assert_eq!(NatType::FullCone.relay_score_bonus(), 20.0);
        assert_eq!(NatType::RestrictedCone.relay_score_bonus(), 10.0);
        assert_eq!(NatType::PortRestricted.relay_score_bonus(), 10.0);
        assert_eq!(NatType::Symmetric.relay_score_bonus(), 0.0);
        assert_eq!(NatType::Unknown.relay_score_bonus(), 0.0);
    }

    #[test]
    fn symmetric_and_unknown_mandate_relay() {
        assert!(NatType::Symmetric.mandates_relay());
        assert!(NatType::Unknown.mandates_relay());
        assert!(!NatType::Public.mandates_relay());
        assert!(!NatType::FullCone.mandates_relay());
    }
}
