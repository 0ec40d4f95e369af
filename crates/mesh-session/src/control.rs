// Copyright (c) 2024 Omerta Mesh Contributors

//! The tunnel handshake's own tiny control protocol, carried as the raw
//! payload of `"tunnel-handshake"` channel messages (§4.9).

use crate::error::{Result, TunnelError};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Why a `request` was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RejectReason {
    PolicyDenied,
    AlreadyConnecting,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TunnelControl {
    Request { session_id: Uuid },
    Ack { session_id: Uuid },
    Reject { session_id: Uuid, reason: RejectReason },
    Close { session_id: Uuid },
}

impl TunnelControl {
    pub fn encode(&self) -> Result<Vec<u8>> {
        serde_cbor::to_vec(self).map_err(|_| TunnelError::Closed)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        serde_cbor::from_slice(bytes).map_err(|_| TunnelError::Closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn control_messages_round_trip() {
        let session_id = Uuid::new_v4();
        for message in [
            TunnelControl::Request { session_id },
            TunnelControl::Ack { session_id },
            TunnelControl::Reject {
                session_id,
                reason: RejectReason::PolicyDenied,
            },
            TunnelControl::Close { session_id },
        ] {
            let decoded = TunnelControl::decode(&message.encode().unwrap()).unwrap();
            assert_eq!(message, decoded);
        }
    }
}
