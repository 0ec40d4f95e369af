// Copyright (c) 2024 Omerta Mesh Contributors

//! The tunnel state machine: `connecting -> active -> (closing ->)
//! disconnected` (§4.9).

use mesh_common::PeerId;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TunnelState {
    Connecting,
    Active,
    Closing,
    Disconnected,
}

#[derive(Debug, Clone)]
pub struct TunnelSession {
    pub peer_id: PeerId,
    pub session_id: Uuid,
    pub state: TunnelState,
}

impl TunnelSession {
    pub fn connecting(peer_id: PeerId, session_id: Uuid) -> Self {
        Self {
            peer_id,
            session_id,
            state: TunnelState::Connecting,
        }
    }
}
