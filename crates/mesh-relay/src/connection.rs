// Copyright (c) 2024 Omerta Mesh Contributors

//! One live connection to a relay: heartbeat health and session capacity
//! bookkeeping (§4.6).

use mesh_common::{Endpoint, PeerId};

/// A live connection to one relay-capable peer.
#[derive(Debug, Clone)]
pub struct RelayConnection {
    pub peer_id: PeerId,
    pub endpoint: Endpoint,
    max_sessions: u32,
    active_sessions: u32,
    missed_heartbeats: u32,
    awaiting_ack: bool,
}

impl RelayConnection {
    pub fn new(peer_id: PeerId, endpoint: Endpoint, max_sessions: u32) -> Self {
        Self {
            peer_id,
            endpoint,
            max_sessions,
            active_sessions: 0,
            missed_heartbeats: 0,
            awaiting_ack: false,
        }
    }

    pub fn active_sessions(&self) -> u32 {
        self.active_sessions
    }

    pub fn free_capacity(&self) -> u32 {
        self.max_sessions.saturating_sub(self.active_sessions)
    }

    pub fn has_capacity(&self) -> bool {
        self.active_sessions < self.max_sessions
    }

    pub fn record_heartbeat_ack(&mut self) {
        self.missed_heartbeats = 0;
        self.awaiting_ack = false;
    }

    pub fn record_heartbeat_miss(&mut self) {
        self.missed_heartbeats += 1;
    }

    /// Called each time a probe is sent. If the previous probe never got
    /// an ack, that round counts as a miss; either way, the connection is
    /// now awaiting a fresh ack.
    pub fn note_probe_sent(&mut self) {
        if self.awaiting_ack {
            self.record_heartbeat_miss();
        }
        self.awaiting_ack = true;
    }

    /// Per §4.6: "a connection with no heartbeat in 2x the interval is
    /// declared unhealthy", i.e. it has missed `miss_threshold` beats.
    pub fn is_healthy(&self, miss_threshold: u32) -> bool {
        self.missed_heartbeats < miss_threshold
    }

    pub fn note_session_opened(&mut self) {
        self.active_sessions = self.active_sessions.saturating_add(1);
    }

    pub fn note_session_closed(&mut self) {
        self.active_sessions = self.active_sessions.saturating_sub(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn connection() -> RelayConnection {
        RelayConnection::new(
            PeerId::from_bytes([4u8; 8]),
            Endpoint::from_str("203.0.113.9:9000").unwrap(),
            2,
        )
    }

    #[test]
    fn becomes_unhealthy_after_missing_the_threshold() {
        let mut conn = connection();
        assert!(conn.is_healthy(2));
        conn.record_heartbeat_miss();
        assert!(conn.is_healthy(2));
        conn.record_heartbeat_miss();
        assert!(!conn.is_healthy(2));
        conn.record_heartbeat_ack();
        assert!(conn.is_healthy(2));
    }

    #[test]
    fn unacked_probes_accumulate_misses() {
        let mut conn = connection();
        conn.note_probe_sent();
        assert!(conn.is_healthy(2));
        conn.note_probe_sent();
        assert!(conn.is_healthy(2));
        conn.note_probe_sent();
        assert!(!conn.is_healthy(2));
    }

    #[test]
    fn an_ack_between_probes_resets_the_miss_count() {
        let mut conn = connection();
        conn.note_probe_sent();
        conn.record_heartbeat_ack();
        conn.note_probe_sent();
        conn.record_heartbeat_ack();
        conn.note_probe_sent();
        assert!(conn.is_healthy(2));
    }

    #[test]
    fn capacity_tracks_opened_and_closed_sessions() {
        let mut conn = connection();
        assert!(conn.has_capacity());
        conn.note_session_opened();
        conn.note_session_opened();
        assert!(!conn.has_capacity());
        assert_eq!(conn.free_capacity(), 0);
        conn.note_session_closed();
        assert!(conn.has_capacity());
        assert_eq!(conn.free_capacity(), 1);
    }
}
