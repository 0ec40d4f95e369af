// Copyright (c) 2024 Omerta Mesh Contributors

//! The relay session table: an RwLock-style structure (§5) tracking every
//! `RelaySession` this node is a party to, whether as one of the two
//! communicating endpoints or as the relay forwarding between two others.

use mesh_common::{Endpoint, PeerId};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use uuid::Uuid;

/// This node's role in a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionRole {
    /// This node is one of the two parties exchanging data, relayed
    /// through `relay_peer_id`.
    Endpoint { relay_peer_id: PeerId, remote_peer_id: PeerId },
    /// This node IS the relay, forwarding `relay_data` between two other
    /// endpoints by session id.
    Forwarder { peer_a: Endpoint, peer_b: Endpoint },
}

#[derive(Debug, Clone)]
pub struct RelaySession {
    pub session_id: Uuid,
    pub role: SessionRole,
    pub opened_at: u64,
    pub last_active: u64,
    pub closed: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelaySessionStats {
    pub endpoint_sessions: usize,
    pub forwarder_sessions: usize,
}

/// Thread-safe table of relay sessions. Reads are lock-free with respect
/// to other readers; writers serialize, matching the peer cache's
/// concurrency shape.
#[derive(Debug, Default)]
pub struct RelaySessionManager {
    sessions: RwLock<HashMap<Uuid, RelaySession>>,
}

impl RelaySessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Open a session as one of the two communicating endpoints.
    pub fn open_endpoint_session(
        &self,
        session_id: Uuid,
        relay_peer_id: PeerId,
        remote_peer_id: PeerId,
        now: u64,
    ) {
        self.sessions.write().unwrap().insert(
            session_id,
            RelaySession {
                session_id,
                role: SessionRole::Endpoint {
                    relay_peer_id,
                    remote_peer_id,
                },
                opened_at: now,
                last_active: now,
                closed: false,
            },
        );
    }

    /// Open a session as the relay forwarding between two other endpoints.
    pub fn open_forwarder_session(&self, session_id: Uuid, peer_a: Endpoint, peer_b: Endpoint, now: u64) {
        self.sessions.write().unwrap().insert(
            session_id,
            RelaySession {
                session_id,
                role: SessionRole::Forwarder { peer_a, peer_b },
                opened_at: now,
                last_active: now,
                closed: false,
            },
        );
    }

    /// The endpoint `relay_data` arriving from `from` should be forwarded
    /// to, if this node is the relay for `session_id`.
    pub fn forward_target(&self, session_id: Uuid, from: Endpoint) -> Option<Endpoint> {
        let sessions = self.sessions.read().unwrap();
        let session = sessions.get(&session_id)?;
        if session.closed {
            return None;
        }
        match session.role {
            SessionRole::Forwarder { peer_a, peer_b } => {
                if from == peer_a {
                    Some(peer_b)
                } else if from == peer_b {
                    Some(peer_a)
                } else {
                    None
                }
            }
            SessionRole::Endpoint { .. } => None,
        }
    }

    /// The role this node plays in an open session, if any.
    pub fn role_of(&self, session_id: Uuid) -> Option<SessionRole> {
        let sessions = self.sessions.read().unwrap();
        let session = sessions.get(&session_id)?;
        (!session.closed).then_some(session.role)
    }

    /// Refresh `last_active` on data activity; `false` if the session is
    /// unknown or already closed.
    pub fn touch(&self, session_id: Uuid, now: u64) -> bool {
        let mut sessions = self.sessions.write().unwrap();
        match sessions.get_mut(&session_id) {
            Some(session) if !session.closed => {
                session.last_active = now;
                true
            }
            _ => false,
        }
    }

    /// Mark a session closed. Returns its role so the caller can
    /// decrement the owning `RelayConnection`'s `active_sessions`.
    pub fn close(&self, session_id: Uuid) -> Option<SessionRole> {
        let mut sessions = self.sessions.write().unwrap();
        let session = sessions.get_mut(&session_id)?;
        if session.closed {
            return None;
        }
        session.closed = true;
        Some(session.role)
    }

    /// Sessions idle longer than `idle_timeout_secs`; per §4.7 these are
    /// closed the same way an explicit `relay_end` would close them.
    pub fn purge_idle(&self, now: u64, idle_timeout_secs: u64) -> Vec<(Uuid, SessionRole)> {
        let mut sessions = self.sessions.write().unwrap();
        let mut closed = Vec::new();
        for session in sessions.values_mut() {
            if !session.closed && now.saturating_sub(session.last_active) > idle_timeout_secs {
                session.closed = true;
                closed.push((session.session_id, session.role));
            }
        }
        closed
    }

    /// Count of open, non-closed endpoint sessions relayed through
    /// `relay_peer_id`, used to check the invariant that a
    /// `RelayConnection.active_sessions` count matches live sessions here.
    pub fn count_active_for_relay(&self, relay_peer_id: PeerId) -> usize {
        self.sessions
            .read()
            .unwrap()
            .values()
            .filter(|s| {
                !s.closed
                    && matches!(s.role, SessionRole::Endpoint { relay_peer_id: r, .. } if r == relay_peer_id)
            })
            .count()
    }

    /// Close every open endpoint session relayed through `relay_peer_id`,
    /// used when that connection is evicted as unhealthy.
    pub fn close_sessions_for_relay(&self, relay_peer_id: PeerId) -> Vec<Uuid> {
        let mut sessions = self.sessions.write().unwrap();
        let mut closed = Vec::new();
        for session in sessions.values_mut() {
            if session.closed {
                continue;
            }
            if matches!(session.role, SessionRole::Endpoint { relay_peer_id: r, .. } if r == relay_peer_id) {
                session.closed = true;
                closed.push(session.session_id);
            }
        }
        closed
    }

    pub fn stats(&self) -> RelaySessionStats {
        let sessions = self.sessions.read().unwrap();
        let mut stats = RelaySessionStats::default();
        for session in sessions.values() {
            if session.closed {
                continue;
            }
            match session.role {
                SessionRole::Endpoint { .. } => stats.endpoint_sessions += 1,
                SessionRole::Forwarder { .. } => stats.forwarder_sessions += 1,
            }
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn peer(tag: u8) -> PeerId {
        PeerId::from_bytes([tag; 8])
    }

    fn endpoint(s: &str) -> Endpoint {
        Endpoint::from_str(s).unwrap()
    }

    #[test]
    fn role_of_reports_none_once_closed() {
        let manager = RelaySessionManager::new();
        let session_id = Uuid::new_v4();
        manager.open_endpoint_session(session_id, peer(1), peer(2), 1000);
        assert!(manager.role_of(session_id).is_some());
        manager.close(session_id);
        assert!(manager.role_of(session_id).is_none());
    }

    #[test]
    fn forwarder_session_routes_to_the_other_party() {
        let manager = RelaySessionManager::new();
        let session_id = Uuid::new_v4();
        let a = endpoint("203.0.113.1:9000");
        let b = endpoint("203.0.113.2:9000");
        manager.open_forwarder_session(session_id, a, b, 1000);

        assert_eq!(manager.forward_target(session_id, a), Some(b));
        assert_eq!(manager.forward_target(session_id, b), Some(a));
        assert_eq!(manager.forward_target(session_id, endpoint("203.0.113.3:9000")), None);
    }

    #[test]
    fn closing_a_session_stops_further_forwarding() {
        let manager = RelaySessionManager::new();
        let session_id = Uuid::new_v4();
        let a = endpoint("203.0.113.1:9000");
        let b = endpoint("203.0.113.2:9000");
        manager.open_forwarder_session(session_id, a, b, 1000);
        assert!(manager.close(session_id).is_some());
        assert!(manager.close(session_id).is_none());
        assert_eq!(manager.forward_target(session_id, a), None);
    }

    #[test]
    fn idle_sessions_are_purged_and_reported_closed() {
        let manager = RelaySessionManager::new();
        let session_id = Uuid::new_v4();
        manager.open_endpoint_session(session_id, peer(1), peer(2), 0);
        let closed = manager.purge_idle(1000, 300);
        assert_eq!(closed.len(), 1);
        assert_eq!(manager.stats().endpoint_sessions, 0);
    }

    #[test]
    fn close_sessions_for_relay_closes_only_that_relays_sessions() {
        let manager = RelaySessionManager::new();
        let relay = peer(9);
        let other_relay = peer(8);
        let s1 = Uuid::new_v4();
        let s2 = Uuid::new_v4();
        manager.open_endpoint_session(s1, relay, peer(1), 1000);
        manager.open_endpoint_session(s2, other_relay, peer(2), 1000);

        let closed = manager.close_sessions_for_relay(relay);
        assert_eq!(closed, vec![s1]);
        assert_eq!(manager.count_active_for_relay(relay), 0);
        assert_eq!(manager.count_active_for_relay(other_relay), 1);
    }

    #[test]
    fn count_active_for_relay_only_counts_open_endpoint_sessions() {
        let manager = RelaySessionManager::new();
        let relay = peer(9);
        let s1 = Uuid::new_v4();
        let s2 = Uuid::new_v4();
        manager.open_endpoint_session(s1, relay, peer(1), 1000);
        manager.open_endpoint_session(s2, relay, peer(2), 1000);
        assert_eq!(manager.count_active_for_relay(relay), 2);
        manager.close(s1);
        assert_eq!(manager.count_active_for_relay(relay), 1);
    }
}
