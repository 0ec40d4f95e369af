// Copyright (c) 2024 Omerta Mesh Contributors

//! A scored relay candidate (§4.6).

use mesh_common::{Endpoint, NatType, PeerId};
use std::time::Duration;

/// One relay-capable peer, with enough measured and advertised data to
/// rank it against other candidates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RelayCandidate {
    pub peer_id: PeerId,
    pub endpoint: Endpoint,
    /// Measured round-trip time to this candidate.
    pub rtt: Duration,
    /// Free session slots (`max_sessions - active_sessions`), advertised
    /// by the candidate.
    pub free_capacity: u32,
    /// Whether this candidate is reachable over a confirmed direct path.
    pub is_direct: bool,
    pub nat_type: NatType,
}

impl RelayCandidate {
    /// Score per the component design's selection formula: `100 −
    /// 100·rtt_seconds + 0.5·min(capacity, 100) + 20·is_direct + nat_bonus`.
    pub fn score(&self) -> f64 {
        let rtt_penalty = 100.0 * self.rtt.as_secs_f64();
        let capacity_bonus = 0.5 * (self.free_capacity.min(100) as f64);
        let direct_bonus = if self.is_direct { 20.0 } else { 0.0 };
        100.0 - rtt_penalty + capacity_bonus + direct_bonus + self.nat_type.relay_score_bonus()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn candidate(rtt_ms: u64, free_capacity: u32, is_direct: bool, nat_type: NatType) -> RelayCandidate {
        RelayCandidate {
            peer_id: PeerId::from_bytes([1u8; 8]),
            endpoint: Endpoint::from_str("203.0.113.5:9000").unwrap(),
            rtt: Duration::from_millis(rtt_ms),
            free_capacity,
            is_direct,
            nat_type,
        }
    }

    #[test]
    fn a_fast_direct_public_candidate_scores_highest() {
        let best = candidate(10, 100, true, NatType::Public);
        let worst = candidate(400, 0, false, NatType::Symmetric);
        assert!(best.score() > worst.score());
    }

    #[test]
    fn score_matches_the_formula_for_concrete_inputs() {
        let c = candidate(100, 40, true, NatType::FullCone);
        // 100 - 100*0.1 + 0.5*40 + 20 + 20 = 100 - 10 + 20 + 20 + 20 = 150
        assert!((c.score() - 150.0).abs() < 1e-9);
    }

    #[test]
    fn free_capacity_bonus_is_capped_at_100() {
        let uncapped = candidate(0, 100, false, NatType::Unknown);
        let overcapped = candidate(0, 500, false, NatType::Unknown);
        assert_eq!(uncapped.score(), overcapped.score());
    }
}
