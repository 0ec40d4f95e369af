// Copyright (c) 2024 Omerta Mesh Contributors

//! Pure pieces of the hole-punch protocol that don't need an actor:
//! driver tie-break, RTT aggregation and the port-prediction sweep.

use mesh_common::PeerId;
use std::time::Duration;

/// The attempt with the lower `peer_id` is the "driver" and persists one
/// extra burst if the first round fails (§4.5).
pub fn is_driver(local_peer_id: PeerId, remote_peer_id: PeerId) -> bool {
    local_peer_id < remote_peer_id
}

/// The median round-trip time across a burst's successful probes, or
/// `None` if none succeeded.
pub fn median_rtt(mut samples: Vec<Duration>) -> Option<Duration> {
    if samples.is_empty() {
        return None;
    }
    samples.sort();
    Some(samples[samples.len() / 2])
}

/// Candidate source ports to try against a symmetric peer whose mapped
/// port is `observed_port`, sweeping `±window` around it (§4.5
/// port-prediction, default window 8). `observed_port` itself is excluded
/// since the first burst already tried it.
pub fn port_prediction_sweep(observed_port: u16, window: u16) -> Vec<u16> {
    let mut ports = Vec::with_capacity(window as usize * 2);
    for offset in 1..=window {
        if let Some(port) = observed_port.checked_sub(offset) {
            if port != 0 {
                ports.push(port);
            }
        }
        if let Some(port) = observed_port.checked_add(offset) {
            ports.push(port);
        }
    }
    ports
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer(tag: u8) -> PeerId {
        PeerId::from_bytes([tag; 8])
    }

    #[test]
    fn lower_peer_id_is_the_driver() {
        assert!(is_driver(peer(1), peer(2)));
        assert!(!is_driver(peer(2), peer(1)));
    }

    #[test]
    fn median_rtt_of_empty_samples_is_none() {
        assert_eq!(median_rtt(vec![]), None);
    }

    #[test]
    fn median_rtt_picks_the_middle_sample() {
        let samples = vec![
            Duration::from_millis(50),
            Duration::from_millis(10),
            Duration::from_millis(30),
        ];
        assert_eq!(median_rtt(samples), Some(Duration::from_millis(30)));
    }

    #[test]
    fn port_sweep_excludes_the_observed_port_and_stays_in_range() {
        let sweep = port_prediction_sweep(5, 8);
        assert!(!sweep.contains(&5));
        assert!(sweep.iter().all(|&p| p != 0));
        assert_eq!(sweep.len(), 12); // 8 above, only 4 below before hitting zero
    }

    #[test]
    fn port_sweep_around_a_mid_range_port_is_symmetric() {
        let sweep = port_prediction_sweep(40000, 8);
        assert_eq!(sweep.len(), 16);
        assert!(sweep.contains(&39992));
        assert!(sweep.contains(&40008));
    }
}
